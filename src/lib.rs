// Core modules
pub mod collector;
pub mod config;
pub mod db;
pub mod gate;
pub mod indicators;
pub mod lifecycle;
pub mod market;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod rr;

// Re-export commonly used types
pub use config::AppConfig;
pub use models::*;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
