//! Asynchronous pipeline signals
//!
//! The engine raises end-of-stream, invalid-uri and invalid-media signals on
//! its own execution context. [`SignalHub`] routes them to whoever subscribed
//! for the `(object, kind)` pair, and stops routing the moment the object is
//! released.

pub mod hub;
pub mod types;

pub use hub::{SignalCallback, SignalHub};
pub use types::{MediaEvent, SignalHandle, SignalKind};
