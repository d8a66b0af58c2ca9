#![forbid(unsafe_code)]

//! The progress event stream (C8): best-effort pub-sub keyed by execution
//! id, with in-memory ring retention discarded a grace window after an
//! execution's terminal event (§4.8).

pub mod event;
pub mod stream;

pub use event::{output_hash, ProgressEvent};
pub use stream::EventStream;
