pub mod error;
pub mod file;
pub mod memory;
pub mod multi;
pub mod paged;
pub mod postgres;
pub mod reader;
pub mod writer;
