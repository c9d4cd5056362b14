//! Cross-cutting helpers shared by every layer

pub mod errors;
pub mod retry;

pub use errors::{ConfigError, DomainError, StorageError};
pub use retry::{retry_with_backoff, Backoff, RetryConfig};
