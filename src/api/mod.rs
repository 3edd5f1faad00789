pub mod client;
pub mod endpoints;
pub mod errors;

pub use client::{ExamBackend, HttpBackend};
pub use endpoints::Endpoints;
pub use errors::ApiError;
