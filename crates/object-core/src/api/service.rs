//! Media server facade
//!
//! [`MediaServerService`] is the operation surface exposed to remote
//! clients. [`MediaServer`] implements it over one explicit context (store,
//! graph, endpoint controller and signal hub) that callers build once and
//! share by `Arc`.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, info, warn};

use super::exceptions::ServiceResult;
use super::VERSION;
use crate::endpoint::{EndpointController, EndpointState};
use crate::engine::{LoopbackConfig, LoopbackEngine, MediaEngine};
use crate::errors::MediaError;
use crate::graph::{ChildSpec, MediaObjectGraph};
use crate::signals::{MediaEvent, SignalCallback, SignalHandle, SignalHub, SignalKind};
use crate::store::ObjectStore;
use crate::types::{MediaObjectRef, MixerType, ObjectId, SdpEndpointType, Token};

/// Events a client subscription buffers before further signals are dropped
pub const EVENT_QUEUE_CAPACITY: usize = 256;

/// A client subscription and the queue its events land in
#[derive(Debug)]
pub struct EventSubscription {
    pub handle: SignalHandle,
    pub events: mpsc::Receiver<MediaEvent>,
}

/// Operations available to remote clients.
///
/// Every call names its target by `(id, token)`; a wrong token behaves
/// exactly like a missing object.
#[async_trait]
pub trait MediaServerService: Send + Sync {
    /// Create a new ownership tree
    async fn create_media_manager(&self, garbage_period: i64) -> ServiceResult<MediaObjectRef>;

    async fn create_mixer(&self, parent: ObjectId, token: Token, mixer_type: MixerType) -> ServiceResult<MediaObjectRef>;

    async fn create_sdp_endpoint(
        &self,
        parent: ObjectId,
        token: Token,
        endpoint_type: SdpEndpointType,
    ) -> ServiceResult<MediaObjectRef>;

    /// Create an endpoint that answers with `fixed_sdp` instead of negotiating
    async fn create_sdp_endpoint_with_fixed_sdp(
        &self,
        parent: ObjectId,
        token: Token,
        endpoint_type: SdpEndpointType,
        fixed_sdp: String,
    ) -> ServiceResult<MediaObjectRef>;

    async fn create_player_endpoint(
        &self,
        parent: ObjectId,
        token: Token,
        uri: String,
        use_encoded_media: bool,
    ) -> ServiceResult<MediaObjectRef>;

    async fn create_recorder_endpoint(&self, parent: ObjectId, token: Token, uri: String) -> ServiceResult<MediaObjectRef>;

    async fn generate_offer(&self, endpoint: ObjectId, token: Token) -> ServiceResult<String>;

    async fn process_offer(&self, endpoint: ObjectId, token: Token, offer: String) -> ServiceResult<String>;

    async fn process_answer(&self, endpoint: ObjectId, token: Token, answer: String) -> ServiceResult<()>;

    async fn get_local_session_descriptor(&self, endpoint: ObjectId, token: Token) -> ServiceResult<String>;

    async fn get_remote_session_descriptor(&self, endpoint: ObjectId, token: Token) -> ServiceResult<String>;

    async fn play(&self, endpoint: ObjectId, token: Token) -> ServiceResult<()>;

    async fn record(&self, endpoint: ObjectId, token: Token) -> ServiceResult<()>;

    async fn stop(&self, endpoint: ObjectId, token: Token) -> ServiceResult<()>;

    async fn get_parent(&self, object: ObjectId, token: Token) -> ServiceResult<MediaObjectRef>;

    /// Release `object` and everything it owns
    async fn release(&self, object: ObjectId, token: Token) -> ServiceResult<()>;

    /// Queue every `kind` signal of `object` for the caller
    async fn subscribe(&self, object: ObjectId, token: Token, kind: SignalKind) -> ServiceResult<EventSubscription>;

    /// Drop a subscription of `object`.
    ///
    /// Returns false for a handle that is no longer registered. A handle
    /// owned by another object fails like a wrong token.
    async fn unsubscribe(&self, object: ObjectId, token: Token, handle: SignalHandle) -> ServiceResult<bool>;

    fn get_version(&self) -> i32;
}

/// Control-plane context
pub struct MediaServer {
    signals: Arc<SignalHub>,
    graph: Arc<MediaObjectGraph>,
    endpoints: EndpointController,
}

impl MediaServer {
    /// Build a server around `engine`, which must dispatch its signals
    /// through `signals`
    pub fn new(signals: Arc<SignalHub>, engine: Arc<dyn MediaEngine>) -> Self {
        let store = Arc::new(ObjectStore::new(Arc::clone(&signals)));
        let graph = Arc::new(MediaObjectGraph::new(Arc::clone(&store), Arc::clone(&engine)));
        let endpoints = EndpointController::new(store, engine);

        info!("Media server context created (version {})", VERSION);
        Self {
            signals,
            graph,
            endpoints,
        }
    }

    /// Server backed by a fresh loopback engine
    pub fn with_loopback(config: LoopbackConfig) -> (Self, Arc<LoopbackEngine>) {
        let signals = Arc::new(SignalHub::new());
        let engine = Arc::new(LoopbackEngine::new(config, Arc::clone(&signals)));
        (Self::new(signals, engine.clone()), engine)
    }

    pub fn graph(&self) -> &Arc<MediaObjectGraph> {
        &self.graph
    }

    pub fn signals(&self) -> &Arc<SignalHub> {
        &self.signals
    }

    /// Current endpoint state, for diagnostics
    pub fn endpoint_state(&self, endpoint: ObjectId, token: Token) -> ServiceResult<EndpointState> {
        Ok(self.endpoints.state(endpoint, token)?)
    }

    async fn create(&self, parent: ObjectId, token: Token, spec: ChildSpec) -> ServiceResult<MediaObjectRef> {
        let info = self.graph.create_child(parent, token, spec).await?;
        Ok(info.as_ref())
    }
}

#[async_trait]
impl MediaServerService for MediaServer {
    async fn create_media_manager(&self, garbage_period: i64) -> ServiceResult<MediaObjectRef> {
        let info = self.graph.create_media_manager(garbage_period).await?;
        Ok(info.as_ref())
    }

    async fn create_mixer(&self, parent: ObjectId, token: Token, mixer_type: MixerType) -> ServiceResult<MediaObjectRef> {
        self.create(parent, token, ChildSpec::Mixer { mixer_type }).await
    }

    async fn create_sdp_endpoint(
        &self,
        parent: ObjectId,
        token: Token,
        endpoint_type: SdpEndpointType,
    ) -> ServiceResult<MediaObjectRef> {
        self.create(
            parent,
            token,
            ChildSpec::SdpEndpoint {
                endpoint_type,
                fixed_sdp: None,
            },
        )
        .await
    }

    async fn create_sdp_endpoint_with_fixed_sdp(
        &self,
        parent: ObjectId,
        token: Token,
        endpoint_type: SdpEndpointType,
        fixed_sdp: String,
    ) -> ServiceResult<MediaObjectRef> {
        self.create(
            parent,
            token,
            ChildSpec::SdpEndpoint {
                endpoint_type,
                fixed_sdp: Some(fixed_sdp),
            },
        )
        .await
    }

    async fn create_player_endpoint(
        &self,
        parent: ObjectId,
        token: Token,
        uri: String,
        use_encoded_media: bool,
    ) -> ServiceResult<MediaObjectRef> {
        self.create(parent, token, ChildSpec::PlayerEndpoint { uri, use_encoded_media })
            .await
    }

    async fn create_recorder_endpoint(&self, parent: ObjectId, token: Token, uri: String) -> ServiceResult<MediaObjectRef> {
        self.create(parent, token, ChildSpec::RecorderEndpoint { uri }).await
    }

    async fn generate_offer(&self, endpoint: ObjectId, token: Token) -> ServiceResult<String> {
        Ok(self.endpoints.generate_offer(endpoint, token).await?)
    }

    async fn process_offer(&self, endpoint: ObjectId, token: Token, offer: String) -> ServiceResult<String> {
        Ok(self.endpoints.process_offer(endpoint, token, &offer).await?)
    }

    async fn process_answer(&self, endpoint: ObjectId, token: Token, answer: String) -> ServiceResult<()> {
        Ok(self.endpoints.process_answer(endpoint, token, &answer).await?)
    }

    async fn get_local_session_descriptor(&self, endpoint: ObjectId, token: Token) -> ServiceResult<String> {
        Ok(self.endpoints.local_session_descriptor(endpoint, token)?)
    }

    async fn get_remote_session_descriptor(&self, endpoint: ObjectId, token: Token) -> ServiceResult<String> {
        Ok(self.endpoints.remote_session_descriptor(endpoint, token)?)
    }

    async fn play(&self, endpoint: ObjectId, token: Token) -> ServiceResult<()> {
        Ok(self.endpoints.play(endpoint, token).await?)
    }

    async fn record(&self, endpoint: ObjectId, token: Token) -> ServiceResult<()> {
        Ok(self.endpoints.record(endpoint, token).await?)
    }

    async fn stop(&self, endpoint: ObjectId, token: Token) -> ServiceResult<()> {
        Ok(self.endpoints.stop(endpoint, token).await?)
    }

    async fn get_parent(&self, object: ObjectId, token: Token) -> ServiceResult<MediaObjectRef> {
        Ok(self.graph.get_parent(object, token)?.as_ref())
    }

    async fn release(&self, object: ObjectId, token: Token) -> ServiceResult<()> {
        let released = self.graph.release(object, token).await?;
        debug!("Client release of {} removed {} object(s)", object, released);
        Ok(())
    }

    async fn subscribe(&self, object: ObjectId, token: Token, kind: SignalKind) -> ServiceResult<EventSubscription> {
        let (sender, events) = mpsc::channel(EVENT_QUEUE_CAPACITY);
        let callback: SignalCallback = Arc::new(move |event: &MediaEvent| {
            if let Err(TrySendError::Full(event)) = sender.try_send(event.clone()) {
                warn!("Event queue of {} full, dropping {}", event.object, event.kind);
            }
        });

        let handle = self.graph.store().subscribe(object, token, kind, callback)?;
        debug!("Client subscribed {} to {} on {}", handle, kind, object);
        Ok(EventSubscription { handle, events })
    }

    async fn unsubscribe(&self, object: ObjectId, token: Token, handle: SignalHandle) -> ServiceResult<bool> {
        self.graph.store().get(object, token)?;
        match self.signals.owner(handle) {
            Some(owner) if owner != object => {
                warn!("Unsubscribe of {} rejected: not a subscription of {}", handle, object);
                Err(MediaError::not_found(object).into())
            }
            _ => Ok(self.signals.unsubscribe(handle)),
        }
    }

    fn get_version(&self) -> i32 {
        VERSION
    }
}
