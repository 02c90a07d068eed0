//! Response envelopes shared by the route handlers.

pub mod response;

pub use response::{
    AnalyzeResponse, AnalyzeTextResponse, DeleteDealResponse, TextDocumentResponse,
    UploadResponse,
};
