//! Pipeline test suites.
//!
//! Coverage is grouped by guarantee:
//! - ordering: FIFO delivery and single-hit-in-flight
//! - recovery: durability across restarts, malformed rows, terminal errors
//! - consent: gate decisions and queue/state coupling
//! - correlation: response records matched back to originating events


mod correlation;
