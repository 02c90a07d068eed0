//! Tower middleware applied to every route.

pub mod request_id;

pub use request_id::{make_request_span, request_id_layer};
