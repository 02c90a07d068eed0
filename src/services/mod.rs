//! Service layer: the hosted model client, analysis runs, chat context
//! assembly and the filesystem document store.

pub mod ai_client;
pub mod analysis;
pub mod chat_context;
pub mod document_types;
pub mod storage;

pub use ai_client::AiClient;
pub use analysis::{AnalysisLocks, AnalysisService};
pub use storage::DocumentStorage;
