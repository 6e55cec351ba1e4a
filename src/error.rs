use thiserror::Error;

#[derive(Debug, Error)]
pub enum SaigenError {
   #[error("Configuration error: {0}")]
   ConfigurationError(String),

   #[error("Authentication failed for provider {provider}: {message}")]
   AuthenticationError { provider: String, message: String },

   #[error("Rate limited by provider {provider}: {message}")]
   RateLimitError { provider: String, message: String },

   #[error("Connection to provider {provider} failed: {message}")]
   ConnectionError { provider: String, message: String },

   #[error("Generation failed: {0}")]
   GenerationError(String),

   #[error("Validation failed with {} error(s): {}", .errors.len(), .errors.join("; "))]
   ValidationFailedError { errors: Vec<String> },

   #[error("Batch processing failed for '{software_name}': {message}")]
   BatchProcessingError { software_name: String, message: String },

   #[error("RAG indexer error: {0}")]
   RagError(String),

   #[error("IO error: {0}")]
   IoError(#[from] std::io::Error),

   #[error("YAML error: {0}")]
   YamlError(#[from] serde_yaml::Error),

   #[error("JSON error: {0}")]
   JsonError(#[from] serde_json::Error),

   #[error("HTTP error: {0}")]
   HttpError(#[from] reqwest::Error),

   #[error("Template error: {0}")]
   TemplateError(String),

   #[error("{0}")]
   Other(String),
}

pub type Result<T> = std::result::Result<T, SaigenError>;
