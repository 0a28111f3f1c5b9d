//! # Mediagraph Object Core
//!
//! Control plane of a media server: the graph of media objects, the SDP
//! negotiation and URI playback state machines, and delivery of asynchronous
//! pipeline signals.
//!
//! This crate provides:
//! - A token-scoped object store with cascading release
//! - Parent/child creation and timed garbage collection
//! - Offer/answer negotiation for RTP and WebRTC endpoints
//! - Player and recorder lifecycles driven by engine signals
//! - The [`api::MediaServerService`] facade and its exception taxonomy
//!
//! ## Architecture
//!
//! Media processing itself sits behind the [`engine::MediaEngine`] trait;
//! [`engine::LoopbackEngine`] is an in-process stand-in. Everything is wired
//! through one explicit [`api::MediaServer`] context.

pub mod api;
pub mod endpoint;
pub mod engine;
pub mod errors;
pub mod gc;
pub mod graph;
pub mod signals;
pub mod store;
pub mod types;

pub use api::{
    EventSubscription, MediaServer, MediaServerException, MediaServerService, ServiceResult, EVENT_QUEUE_CAPACITY,
    VERSION,
};
pub use endpoint::{EndpointState, NegotiationState, UriState};
pub use engine::{CallGate, EngineError, LoopbackConfig, LoopbackEngine, MediaEngine, PipelineHandle};
pub use errors::{MediaError, MediaResult};
pub use gc::{GarbageCollector, SweepHook};
pub use graph::{ChildSpec, MediaObjectGraph};
pub use signals::{MediaEvent, SignalHandle, SignalHub, SignalKind};
pub use store::{ObjectInfo, ObjectStore};
pub use types::{MediaKind, MediaObjectRef, MixerType, ObjectId, SdpEndpointType, Token, UriEndpointType};
