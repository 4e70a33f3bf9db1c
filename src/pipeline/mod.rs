pub mod analyzer;
pub mod images;
mod orchestrator;

pub use analyzer::analyze;
pub use images::{acquire_all, ensure_complete};
pub use orchestrator::Orchestrator;
