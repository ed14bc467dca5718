//! HTTP delivery for the Beacon pipeline.
//!
//! This crate provides:
//! - Endpoint: environment-aware URL construction for collection requests
//! - StreamingConfig and the record-separator body splitter
//! - NetworkClient: one POST per hit, outcome classified as success,
//!   retryable failure, or terminal failure

mod client;
mod endpoint;
mod error;
mod streaming;

pub use client::{
    NetworkClient, ResponseCallback, SendOutcome, DEFAULT_RETRY_INTERVAL,
    RECOVERABLE_STATUS_CODES,
};
pub use endpoint::{Endpoint, Environment, RequestKind};
pub use error::{NetError, NetResult};
pub use streaming::{split_documents, StreamingConfig};
