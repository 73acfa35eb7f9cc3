use thiserror::Error;

/// Root configuration error type. Transport- and tool-specific errors live
/// in their own crates (e.g. `muaddib_agent::error::AgentError`) and convert
/// into this where they cross a CLI boundary.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Load(_) => "config.load",
            Self::Invalid(_) => "config.invalid",
        }
    }
}

pub type Result<T> = std::result::Result<T, ConfigError>;
