//! Reliable batched delivery of experience events with streamed response
//! correlation.
//!
//! ## Architecture
//!
//! ```text
//! host event ──▶ Gatekeeper ──▶ RequestBuilder ──▶ HitQueue (SQLite)
//!                (consent,       (payload +           │
//!                 identity,       session context)    ▼
//!                 boot guard)                    HitProcessor ──▶ NetworkClient
//!                                                     │               │ streamed
//!                                                     │               ▼ records
//!                                ClientStateStore ◀── ResponseCorrelator
//!                                                     │
//!                                      host bus ◀─────┴──▶ CallbackRegistry
//! ```
//!
//! The queue is a durable FIFO with exactly one hit in flight; recoverable
//! server conditions hold the head and retry, everything else settles the
//! hit and advances. Streamed response documents are matched back to their
//! originating events by request correlation id and zero-based event index.

mod builder;
mod callbacks;
mod config;
mod correlator;
mod error;
mod gatekeeper;
mod hit;
mod implementation;
mod pipeline;
mod processor;
mod properties;
mod queue;
mod response;

#[cfg(test)]
mod tests;

pub use builder::{BuiltRequest, RequestBuilder, RequestContext};
pub use callbacks::{CallbackRegistry, CompletionCallback, ResponseHandler};
pub use config::PipelineConfig;
pub use correlator::{CorrelatorCallback, ResponseCorrelator};
pub use error::{PipelineError, PipelineResult};
pub use gatekeeper::{Admission, Gatekeeper};
pub use hit::Hit;
pub use implementation::{implementation_details, LIBRARY_VERSION};
pub use pipeline::Pipeline;
pub use processor::{HitProcessor, HitSender, NetworkSender};
pub use properties::{SessionPropertiesState, LOCATION_HINT_KEY};
pub use queue::HitQueue;
pub use response::{
    ErrorReport, EventError, EventHandle, ResponseDocument, HANDLE_TYPE_LOCATION_HINT,
    HANDLE_TYPE_STATE_STORE,
};
