pub mod config;
pub mod error;
pub mod logger;

// Re-export commonly used types
pub use config::{AppConfig, BudgetConfig, LlmSettings, ProviderSettings};
pub use error::StudyMintError;
pub type Result<T> = std::result::Result<T, StudyMintError>;
