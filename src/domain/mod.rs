//! Domain types and DTOs for deals, their documents and analyses.

pub mod analysis;
pub mod chat;
pub mod deals;
pub mod documents;

pub use analysis::*;
pub use chat::*;
pub use deals::*;
pub use documents::*;
