pub mod error;
pub mod orchestrator;
pub mod registry;
pub mod runner;
pub mod transform;
