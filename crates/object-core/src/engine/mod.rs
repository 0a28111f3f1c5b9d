//! Media-processing engine seam
//!
//! The control plane never touches media. Everything that builds pipelines,
//! synthesises SDP or moves packets sits behind [`MediaEngine`]. Engines
//! report asynchronous pipeline signals by calling
//! [`SignalHub::dispatch`](crate::signals::SignalHub::dispatch) from their own
//! execution context.
//!
//! [`LoopbackEngine`] is an in-process implementation used by tests and by
//! the default server binary.

pub mod loopback;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::types::{MediaKind, ObjectId, SdpEndpointType, UriEndpointType};

pub use loopback::{CallGate, LoopbackConfig, LoopbackEngine};

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;

/// Opaque handle to an engine-side element owned by exactly one media object
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineHandle(pub u64);

impl fmt::Display for PipelineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "element-{}", self.0)
    }
}

/// Failures reported by the engine; surfaced to callers without retry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The element backing a media object could not be built
    #[error("failed to create {kind} element: {reason}")]
    ElementCreation { kind: MediaKind, reason: String },

    /// An offer or answer could not be synthesised
    #[error("SDP synthesis failed: {reason}")]
    SdpSynthesis { reason: String },

    /// Media flow could not be started or stopped
    #[error("media flow failed: {reason}")]
    MediaFlow { reason: String },

    /// The engine does not know the handle it was given
    #[error("unknown element {0}")]
    UnknownElement(PipelineHandle),
}

/// Primitives the control plane consumes from the media-processing engine
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Build the element backing `object`
    async fn create_element(&self, object: ObjectId, kind: MediaKind) -> EngineResult<PipelineHandle>;

    /// Tear an element down. Called exactly once per handle.
    async fn release_element(&self, handle: PipelineHandle);

    /// Configure a fixed local description that bypasses negotiation
    async fn apply_fixed_sdp(&self, handle: PipelineHandle, sdp: &str) -> EngineResult<()>;

    /// Synthesise a local offer
    async fn generate_offer(
        &self,
        handle: PipelineHandle,
        endpoint_type: SdpEndpointType,
    ) -> EngineResult<String>;

    /// Synthesise an answer to a remote offer
    async fn process_offer(
        &self,
        handle: PipelineHandle,
        endpoint_type: SdpEndpointType,
        offer: &str,
    ) -> EngineResult<String>;

    /// Apply the remote answer and start media flow
    async fn process_answer(&self, handle: PipelineHandle, answer: &str) -> EngineResult<()>;

    /// Start pulling from (player) or pushing into (recorder) `uri`
    async fn start_uri(
        &self,
        handle: PipelineHandle,
        uri: &str,
        endpoint_type: UriEndpointType,
    ) -> EngineResult<()>;

    /// Stop a running URI element
    async fn stop_uri(&self, handle: PipelineHandle) -> EngineResult<()>;
}
