//! Endpoint state machines
//!
//! SDP endpoints (RTP, WebRTC) negotiate through [`sdp::SdpNegotiation`];
//! URI endpoints (Player, Recorder) run the lifecycle in [`uri::UriPlayback`].
//! [`EndpointController`] drives both against the engine.
//!
//! Each endpoint's mutable state sits in an [`EndpointCell`] held by its
//! store record. The cell's state lock is a leaf lock: nothing takes a tree
//! lock while holding it. Engine calls happen with only the cell's
//! operation lock held, which serialises operations on one endpoint.

pub mod controller;
pub mod sdp;
pub mod uri;

use parking_lot::Mutex;

use crate::errors::{MediaError, MediaResult};
use crate::types::ObjectId;

pub use controller::EndpointController;
pub use sdp::{NegotiationState, SdpNegotiation};
pub use uri::{UriPlayback, UriSignals, UriState};

/// Variant state of an endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EndpointState {
    Sdp(SdpNegotiation),
    Uri(UriPlayback),
}

impl EndpointState {
    /// Printable state name, as reported in `InvalidState` errors
    pub fn state_name(&self) -> String {
        match self {
            EndpointState::Sdp(sdp) => sdp.state.to_string(),
            EndpointState::Uri(uri) => uri.state.to_string(),
        }
    }
}

struct EndpointInner {
    released: bool,
    state: EndpointState,
}

/// Per-object endpoint state
pub struct EndpointCell {
    inner: Mutex<EndpointInner>,
    op_lock: tokio::sync::Mutex<()>,
}

impl EndpointCell {
    pub fn new(state: EndpointState) -> Self {
        Self {
            inner: Mutex::new(EndpointInner {
                released: false,
                state,
            }),
            op_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Called by the store while removing the owning record
    pub(crate) fn mark_released(&self) {
        self.inner.lock().released = true;
    }

    pub fn is_released(&self) -> bool {
        self.inner.lock().released
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> EndpointState {
        self.inner.lock().state.clone()
    }

    /// Run `f` on the state of a live endpoint, failing `NotFound` once the
    /// endpoint has been released
    pub(crate) fn with_state<R>(&self, id: ObjectId, f: impl FnOnce(&mut EndpointState) -> R) -> MediaResult<R> {
        let mut inner = self.inner.lock();
        if inner.released {
            return Err(MediaError::not_found(id));
        }
        Ok(f(&mut inner.state))
    }

    pub(crate) async fn serialize(&self) -> tokio::sync::MutexGuard<'_, ()> {
        self.op_lock.lock().await
    }
}
