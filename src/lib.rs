// Vigil Library - Public API

// Re-export error types
pub mod error;
pub use error::{Result, VigilError};

// Module declarations
pub mod checker;
pub mod diff;
pub mod normalize;
pub mod notify;
pub mod scheduler;
pub mod store;

// Re-export commonly used types
pub use checker::{CheckOutcome, Checker, Status};
pub use store::Store;

// Initialize logging
pub fn init_logging() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
}
