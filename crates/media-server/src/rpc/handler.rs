use dashmap::DashMap;
use mediagraph_object_core::{
    MediaError, MediaEvent, MediaObjectRef, MediaServer, MediaServerException, MediaServerService, SignalHandle,
};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, warn};

use super::wire::{RpcErrorBody, RpcRequest};

/// Code reported for malformed requests
pub const BAD_REQUEST_CODE: i32 = 5;

/// Failure of one RPC call
#[derive(Debug, Error)]
pub enum RpcFailure {
    #[error(transparent)]
    Service(#[from] MediaServerException),

    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl RpcFailure {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn to_body(&self) -> RpcErrorBody {
        match self {
            RpcFailure::Service(exception) => RpcErrorBody {
                code: exception.code(),
                exception: exception.name().to_string(),
                message: exception.message().to_string(),
            },
            RpcFailure::BadRequest(message) => RpcErrorBody {
                code: BAD_REQUEST_CODE,
                exception: "BadRequestException".to_string(),
                message: message.clone(),
            },
        }
    }
}

/// Event queue of one client subscription
struct ClientQueue {
    /// Object the subscription was opened on; every poll must name it
    object: MediaObjectRef,
    events: Mutex<Receiver<MediaEvent>>,
}

/// Executes decoded requests against a [`MediaServer`].
///
/// Client subscriptions are held here as event queues drained by
/// `pollEvents`. A queue whose object was released is dropped once it has
/// been drained or at the next [`RpcHandler::sweep_queues`], whichever comes
/// first.
pub struct RpcHandler {
    server: Arc<MediaServer>,
    queues: DashMap<SignalHandle, ClientQueue>,
}

impl RpcHandler {
    pub fn new(server: Arc<MediaServer>) -> Self {
        Self {
            server,
            queues: DashMap::new(),
        }
    }

    pub fn server(&self) -> &Arc<MediaServer> {
        &self.server
    }

    /// Number of subscription queues held for clients
    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Drop the queues of subscriptions whose object has been released.
    ///
    /// Returns the number of queues dropped.
    pub fn sweep_queues(&self) -> usize {
        let store = self.server.graph().store();
        let mut swept = 0;
        self.queues.retain(|_, queue| {
            let live = store.contains(queue.object.id);
            if !live {
                swept += 1;
            }
            live
        });
        if swept > 0 {
            debug!("Dropped {} event queue(s) of released objects", swept);
        }
        swept
    }

    pub async fn handle(&self, request: RpcRequest) -> Result<Value, RpcFailure> {
        let method = request.method();
        debug!("RPC {}", method);

        let result = self.dispatch(request).await;
        if let Err(e) = &result {
            warn!("RPC {} failed: {}", method, e);
        }
        result
    }

    async fn dispatch(&self, request: RpcRequest) -> Result<Value, RpcFailure> {
        let server = &self.server;
        let value = match request {
            RpcRequest::CreateMediaManager { garbage_period } => {
                json!(server.create_media_manager(garbage_period).await?)
            }
            RpcRequest::CreateMixer { parent, mixer_type } => {
                json!(server.create_mixer(parent.id, parent.token, mixer_type).await?)
            }
            RpcRequest::CreateSdpEndpoint {
                parent,
                sdp_endpoint_type,
            } => json!(
                server
                    .create_sdp_endpoint(parent.id, parent.token, sdp_endpoint_type)
                    .await?
            ),
            RpcRequest::CreateSdpEndpointWithFixedSdp {
                parent,
                sdp_endpoint_type,
                fixed_sdp,
            } => json!(
                server
                    .create_sdp_endpoint_with_fixed_sdp(parent.id, parent.token, sdp_endpoint_type, fixed_sdp)
                    .await?
            ),
            RpcRequest::CreatePlayerEndpoint {
                parent,
                uri,
                use_encoded_media,
            } => json!(
                server
                    .create_player_endpoint(parent.id, parent.token, uri, use_encoded_media)
                    .await?
            ),
            RpcRequest::CreateRecorderEndpoint { parent, uri } => {
                json!(server.create_recorder_endpoint(parent.id, parent.token, uri).await?)
            }
            RpcRequest::GenerateOffer { endpoint } => {
                json!(server.generate_offer(endpoint.id, endpoint.token).await?)
            }
            RpcRequest::ProcessOffer { endpoint, remote_sdp } => {
                json!(server.process_offer(endpoint.id, endpoint.token, remote_sdp).await?)
            }
            RpcRequest::ProcessAnswer { endpoint, answer_sdp } => {
                server.process_answer(endpoint.id, endpoint.token, answer_sdp).await?;
                Value::Null
            }
            RpcRequest::GetLocalSessionDescriptor { endpoint } => {
                json!(server.get_local_session_descriptor(endpoint.id, endpoint.token).await?)
            }
            RpcRequest::GetRemoteSessionDescriptor { endpoint } => {
                json!(server.get_remote_session_descriptor(endpoint.id, endpoint.token).await?)
            }
            RpcRequest::Play { endpoint } => {
                server.play(endpoint.id, endpoint.token).await?;
                Value::Null
            }
            RpcRequest::Record { endpoint } => {
                server.record(endpoint.id, endpoint.token).await?;
                Value::Null
            }
            RpcRequest::Stop { endpoint } => {
                server.stop(endpoint.id, endpoint.token).await?;
                Value::Null
            }
            RpcRequest::GetParent { object } => {
                json!(server.get_parent(object.id, object.token).await?)
            }
            RpcRequest::Release { object } => {
                server.release(object.id, object.token).await?;
                self.sweep_queues();
                Value::Null
            }
            RpcRequest::Subscribe { object, kind } => {
                let subscription = server.subscribe(object.id, object.token, kind).await?;
                self.queues.insert(
                    subscription.handle,
                    ClientQueue {
                        object,
                        events: Mutex::new(subscription.events),
                    },
                );
                json!(subscription.handle)
            }
            RpcRequest::Unsubscribe { object, handle } => {
                let cancelled = server.unsubscribe(object.id, object.token, handle).await?;
                self.queues.remove_if(&handle, |_, queue| queue.object == object);
                json!(cancelled)
            }
            RpcRequest::PollEvents { object, handle } => json!(self.poll_events(object, handle)?),
            RpcRequest::GetVersion => json!(server.get_version()),
        };
        Ok(value)
    }

    /// Drain the queue of `handle`.
    ///
    /// The caller must name the object and token the subscription was opened
    /// with; anything else, including an unknown handle, fails like a wrong
    /// token. After a release the queue can be drained until the next sweep.
    fn poll_events(&self, object: MediaObjectRef, handle: SignalHandle) -> Result<Vec<MediaEvent>, RpcFailure> {
        let (events, closed) = {
            let queue = self
                .queues
                .get(&handle)
                .filter(|queue| queue.object == object)
                .ok_or_else(|| MediaServerException::from(MediaError::not_found(object.id)))?;
            let mut receiver = queue.events.lock();

            let mut events = Vec::new();
            let closed = loop {
                match receiver.try_recv() {
                    Ok(event) => events.push(event),
                    Err(TryRecvError::Empty) => break false,
                    Err(TryRecvError::Disconnected) => break true,
                }
            };
            (events, closed)
        };

        if closed {
            debug!("Subscription {} closed by release, dropping its queue", handle);
            self.queues.remove(&handle);
        }
        Ok(events)
    }
}
