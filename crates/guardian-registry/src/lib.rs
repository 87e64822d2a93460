//! Server catalog, selection and rewriting for the terminal's server document.
//!
//! Flow on a terminal restart:
//! `ServerDocument::load` → `ServerCatalog::parse` → `ServerSelector::select`
//! → `ConfigRewriter::apply`.

pub mod catalog;
pub mod document;
pub mod error;
pub mod rewriter;
pub mod selector;

pub use catalog::{CatalogPolicy, ServerCatalog};
pub use document::{CurrentSelection, SelectedServer, ServerDocument, ROOT_ELEMENT, SERVER_ELEMENT};
pub use error::{RegistryError, RegistryResult};
pub use rewriter::{ConfigRewriter, RewriteOutcome};
pub use selector::ServerSelector;
