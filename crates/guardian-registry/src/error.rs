//! Registry error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// The server document is missing or unreadable.
    #[error("Server document unavailable: {0}")]
    CatalogUnavailable(String),

    /// The server document lacks required structure.
    #[error("Server document malformed: {0}")]
    CatalogMalformed(String),

    /// The selected-server fields could not be rewritten.
    #[error("Rewrite failed: {0}")]
    RewriteFailed(String),
}

pub type RegistryResult<T> = Result<T, RegistryError>;
