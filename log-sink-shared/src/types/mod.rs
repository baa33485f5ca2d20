//! This module defines the core data structures shared by the publisher and the
//! indexing workers. It re-exports `IndexAction` and `CorrelatedDocument`.

pub mod correlated_document;
pub mod index_action;

pub use correlated_document::CorrelatedDocument;
pub use index_action::IndexAction;
