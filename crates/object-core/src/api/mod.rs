//! RPC-facing API surface

pub mod exceptions;
pub mod service;

pub use exceptions::{MediaServerException, ServiceResult};
pub use service::{EventSubscription, MediaServer, MediaServerService, EVENT_QUEUE_CAPACITY};

/// Interface version reported by `getVersion`
pub const VERSION: i32 = 1;
