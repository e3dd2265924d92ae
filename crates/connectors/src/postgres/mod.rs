pub mod client;
pub mod cursor;
pub mod insert;
pub mod paged;
pub mod update;
