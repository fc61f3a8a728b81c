//! Event log, pure reducer, and the event-sourced conductor store.
//!
//! [`ConductorStore::dispatch`] is the single mutation path: it validates the
//! envelope and payload, appends to the bounded [`EventLog`], folds through
//! [`reduce`], and fans the event out to listeners, the broadcast
//! [`EventStreamHub`], and an optional [`LineSink`] flight recorder.

pub mod log;
pub mod reducer;
pub mod sink;
pub mod store;
pub mod stream;

pub use log::{DEFAULT_RETENTION, EventLog};
pub use reducer::{reduce, replay};
pub use sink::{DEFAULT_RECORDER_LINES, JsonlFileSink, JsonlRecorder, LineSink, load_trace};
pub use store::{
    ConductorStore, DEFAULT_STREAM_BUFFER, DEFAULT_VALIDATE_STATE_EVERY, Listener, StoreConfig,
    Subscription,
};
pub use stream::EventStreamHub;
