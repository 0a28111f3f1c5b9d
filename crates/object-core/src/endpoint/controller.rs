use std::sync::Arc;
use tracing::{debug, info, warn};

use super::sdp::{NegotiationState, NegotiationStep, SdpNegotiation};
use super::uri::{UriPlayback, UriState};
use super::{EndpointCell, EndpointState};
use crate::engine::{EngineError, MediaEngine};
use crate::errors::{MediaError, MediaResult};
use crate::signals::{MediaEvent, SignalCallback};
use crate::store::{ObjectInfo, ObjectStore};
use crate::types::{ObjectId, Token, UriEndpointType};

/// Drives endpoint operations against the engine.
///
/// Every call resolves `id` and `token` afresh. Engine calls are made
/// without any store or state lock held; if the endpoint is released while
/// one is in flight the operation fails `NotFound` and commits nothing.
pub struct EndpointController {
    store: Arc<ObjectStore>,
    engine: Arc<dyn MediaEngine>,
}

impl EndpointController {
    pub fn new(store: Arc<ObjectStore>, engine: Arc<dyn MediaEngine>) -> Self {
        Self { store, engine }
    }

    fn resolve(
        &self,
        id: ObjectId,
        token: Token,
        operation: &'static str,
    ) -> MediaResult<(ObjectInfo, Arc<EndpointCell>)> {
        let (info, cell) = self.store.endpoint(id, token)?;
        match cell {
            Some(cell) => Ok((info, cell)),
            None => {
                warn!("{} rejected: {} {} is not an endpoint", operation, info.kind, id);
                Err(MediaError::unsupported(id, info.kind, operation))
            }
        }
    }

    /// Run `f` on the negotiation record, mapping a refused transition to
    /// `InvalidState`
    fn with_sdp<R>(
        info: &ObjectInfo,
        cell: &EndpointCell,
        operation: &'static str,
        f: impl FnOnce(&mut SdpNegotiation) -> Result<R, NegotiationState>,
    ) -> MediaResult<R> {
        let outcome = cell.with_state(info.id, |state| match state {
            EndpointState::Sdp(sdp) => Some(f(sdp)),
            EndpointState::Uri(_) => None,
        })?;

        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(state)) => {
                warn!("{} rejected on {} in state {}", operation, info.id, state);
                Err(MediaError::invalid_state(info.id, info.kind, operation, state.to_string()))
            }
            None => Err(MediaError::unsupported(info.id, info.kind, operation)),
        }
    }

    fn with_uri<R>(
        info: &ObjectInfo,
        cell: &EndpointCell,
        operation: &'static str,
        expected: Option<UriEndpointType>,
        f: impl FnOnce(&mut UriPlayback) -> Result<R, UriState>,
    ) -> MediaResult<R> {
        let outcome = cell.with_state(info.id, |state| match state {
            EndpointState::Uri(playback) if expected.map_or(true, |t| t == playback.endpoint_type) => {
                Some(f(playback))
            }
            _ => None,
        })?;

        match outcome {
            Some(Ok(value)) => Ok(value),
            Some(Err(state)) => {
                warn!("{} rejected on {} in state {}", operation, info.id, state);
                Err(MediaError::invalid_state(info.id, info.kind, operation, state.to_string()))
            }
            None => Err(MediaError::unsupported(info.id, info.kind, operation)),
        }
    }

    /// Commit a post-engine update; the endpoint may have gone meanwhile
    fn commit_sdp(info: &ObjectInfo, cell: &EndpointCell, f: impl FnOnce(&mut SdpNegotiation)) -> MediaResult<()> {
        cell.with_state(info.id, |state| {
            if let EndpointState::Sdp(sdp) = state {
                f(sdp);
            }
        })
    }

    fn commit_uri(info: &ObjectInfo, cell: &EndpointCell, f: impl FnOnce(&mut UriPlayback)) -> MediaResult<()> {
        cell.with_state(info.id, |state| {
            if let EndpointState::Uri(playback) = state {
                f(playback);
            }
        })
    }

    /// An engine error on an endpoint released meanwhile reports `NotFound`
    fn engine_error(id: ObjectId, cell: &EndpointCell, error: EngineError) -> MediaError {
        if cell.is_released() {
            debug!("Engine call on {} outlived its release: {}", id, error);
            MediaError::not_found(id)
        } else {
            error.into()
        }
    }

    pub async fn generate_offer(&self, id: ObjectId, token: Token) -> MediaResult<String> {
        const OP: &str = "generateOffer";
        let (info, cell) = self.resolve(id, token, OP)?;
        let _serial = cell.serialize().await;

        let (step, endpoint_type) =
            Self::with_sdp(&info, &cell, OP, |sdp| Ok((sdp.begin_generate_offer()?, sdp.endpoint_type)))?;
        if let NegotiationStep::Fixed(local) = step {
            return local.ok_or_else(|| MediaError::invalid_state(id, info.kind, OP, "NO_LOCAL_SDP"));
        }

        let offer = self
            .engine
            .generate_offer(info.pipeline, endpoint_type)
            .await
            .map_err(|e| Self::engine_error(id, &cell, e))?;
        Self::commit_sdp(&info, &cell, |sdp| sdp.finish_generate_offer(offer.clone()))?;

        debug!("Generated offer on {} ({})", id, info.kind);
        Ok(offer)
    }

    pub async fn process_offer(&self, id: ObjectId, token: Token, offer: &str) -> MediaResult<String> {
        const OP: &str = "processOffer";
        let (info, cell) = self.resolve(id, token, OP)?;
        let _serial = cell.serialize().await;

        let (step, endpoint_type) =
            Self::with_sdp(&info, &cell, OP, |sdp| Ok((sdp.begin_process_offer(offer)?, sdp.endpoint_type)))?;
        if let NegotiationStep::Fixed(local) = step {
            return local.ok_or_else(|| MediaError::invalid_state(id, info.kind, OP, "NO_LOCAL_SDP"));
        }

        match self.engine.process_offer(info.pipeline, endpoint_type, offer).await {
            Ok(answer) => {
                Self::commit_sdp(&info, &cell, |sdp| sdp.finish_process_offer(answer.clone()))?;
                debug!("Processed offer on {} ({})", id, info.kind);
                Ok(answer)
            }
            Err(e) => {
                warn!("Engine failed to answer offer on {}: {}", id, e);
                Self::commit_sdp(&info, &cell, SdpNegotiation::abort_process_offer)?;
                Err(e.into())
            }
        }
    }

    pub async fn process_answer(&self, id: ObjectId, token: Token, answer: &str) -> MediaResult<()> {
        const OP: &str = "processAnswer";
        let (info, cell) = self.resolve(id, token, OP)?;
        let _serial = cell.serialize().await;

        if let NegotiationStep::Fixed(_) = Self::with_sdp(&info, &cell, OP, |sdp| sdp.begin_process_answer(answer))? {
            return Ok(());
        }

        if let Err(e) = self.engine.process_answer(info.pipeline, answer).await {
            warn!("Engine failed to apply answer on {}: {}", id, e);
            Self::commit_sdp(&info, &cell, SdpNegotiation::abort_process_answer)?;
            return Err(e.into());
        }
        // Fails NotFound if released during the engine call
        cell.with_state(id, |_| ())?;

        info!("Media negotiated on {} ({})", id, info.kind);
        Ok(())
    }

    pub fn local_session_descriptor(&self, id: ObjectId, token: Token) -> MediaResult<String> {
        const OP: &str = "getLocalSessionDescriptor";
        let (info, cell) = self.resolve(id, token, OP)?;
        Self::with_sdp(&info, &cell, OP, |sdp| sdp.local_sdp.clone().ok_or(sdp.state))
    }

    pub fn remote_session_descriptor(&self, id: ObjectId, token: Token) -> MediaResult<String> {
        const OP: &str = "getRemoteSessionDescriptor";
        let (info, cell) = self.resolve(id, token, OP)?;
        Self::with_sdp(&info, &cell, OP, |sdp| sdp.remote_sdp.clone().ok_or(sdp.state))
    }

    /// Start a player pulling from its URI
    pub async fn play(&self, id: ObjectId, token: Token) -> MediaResult<()> {
        self.start(id, token, UriEndpointType::Player, "play").await
    }

    /// Start a recorder pushing into its URI
    pub async fn record(&self, id: ObjectId, token: Token) -> MediaResult<()> {
        self.start(id, token, UriEndpointType::Recorder, "record").await
    }

    async fn start(
        &self,
        id: ObjectId,
        token: Token,
        endpoint_type: UriEndpointType,
        operation: &'static str,
    ) -> MediaResult<()> {
        let (info, cell) = self.resolve(id, token, operation)?;
        let _serial = cell.serialize().await;

        let (previous, uri) = Self::with_uri(&info, &cell, operation, Some(endpoint_type), |playback| {
            let previous = playback.begin_start()?;
            Ok((previous, playback.uri.clone()))
        })?;

        self.arm_signals(&info, &cell)?;

        if let Err(e) = self.engine.start_uri(info.pipeline, &uri, endpoint_type).await {
            warn!("Engine failed to {} {} on {}: {}", operation, uri, id, e);
            Self::commit_uri(&info, &cell, |playback| playback.abort_start(previous))?;
            return Err(e.into());
        }
        cell.with_state(id, |_| ())?;

        info!("{} {} started on {}", info.kind, uri, id);
        Ok(())
    }

    /// Stop a running or finished URI endpoint
    pub async fn stop(&self, id: ObjectId, token: Token) -> MediaResult<()> {
        const OP: &str = "stop";
        let (info, cell) = self.resolve(id, token, OP)?;
        let _serial = cell.serialize().await;

        Self::with_uri(&info, &cell, OP, None, |playback| playback.can_stop())?;
        self.engine
            .stop_uri(info.pipeline)
            .await
            .map_err(|e| Self::engine_error(id, &cell, e))?;
        Self::commit_uri(&info, &cell, UriPlayback::finish_stop)?;

        info!("Stopped {} {}", info.kind, id);
        Ok(())
    }

    /// Current state of an endpoint
    pub fn state(&self, id: ObjectId, token: Token) -> MediaResult<EndpointState> {
        let (_, cell) = self.resolve(id, token, "getState")?;
        cell.with_state(id, |state| state.clone())
    }

    /// Subscribe the endpoint to every signal kind it is not yet armed for.
    ///
    /// Callbacks hold only a weak reference to the cell.
    fn arm_signals(&self, info: &ObjectInfo, cell: &Arc<EndpointCell>) -> MediaResult<()> {
        let missing = cell.with_state(info.id, |state| match state {
            EndpointState::Uri(playback) => playback.signals.missing(),
            EndpointState::Sdp(_) => Vec::new(),
        })?;

        for kind in missing {
            let weak = Arc::downgrade(cell);
            let object = info.id;
            let callback: SignalCallback = Arc::new(move |event: &MediaEvent| {
                let Some(cell) = weak.upgrade() else {
                    return;
                };
                let _ = cell.with_state(object, |state| {
                    if let EndpointState::Uri(playback) = state {
                        if playback.on_signal(event.kind) {
                            debug!("{} moved {} to {}", event.kind, object, playback.state);
                        }
                    }
                });
            });

            let handle = self.store.subscribe(info.id, info.token, kind, callback)?;
            Self::commit_uri(info, cell, |playback| playback.signals.set(kind, handle))?;
        }
        Ok(())
    }
}
