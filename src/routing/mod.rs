//! Collection routing
//!
//! Decides which collections a query should search and how much each one counts.
//! A generation model makes the decision when one is configured; a keyword
//! heuristic covers for it when it is absent or fails. Either way the selection is
//! checked against the collections that actually exist in the vector store.

mod existence;
mod router;

pub use existence::ExistenceCache;
pub use router::{CollectionRouter, RouterSettings};
