pub mod chunk;
pub mod position;
pub mod record;
pub mod run;
pub mod value;
