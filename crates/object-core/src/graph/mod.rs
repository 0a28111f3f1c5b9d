//! Media object graph
//!
//! Creation, parent lookup and release on top of the [`ObjectStore`]. The
//! graph owns no object data; it pairs every store mutation with the engine
//! work it implies.

use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::endpoint::{EndpointState, SdpNegotiation, UriPlayback};
use crate::engine::MediaEngine;
use crate::errors::MediaResult;
use crate::store::{NewObject, ObjectInfo, ObjectStore, ReleasedObject};
use crate::types::{MediaKind, MixerType, ObjectId, SdpEndpointType, Token, UriEndpointType};

/// What to create under a parent.
///
/// Root-only kinds have no variant here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChildSpec {
    Mixer {
        mixer_type: MixerType,
    },
    SdpEndpoint {
        endpoint_type: SdpEndpointType,
        fixed_sdp: Option<String>,
    },
    PlayerEndpoint {
        uri: String,
        use_encoded_media: bool,
    },
    RecorderEndpoint {
        uri: String,
    },
}

impl ChildSpec {
    pub fn kind(&self) -> MediaKind {
        match self {
            ChildSpec::Mixer { .. } => MediaKind::Mixer,
            ChildSpec::SdpEndpoint { endpoint_type, .. } => MediaKind::from(*endpoint_type),
            ChildSpec::PlayerEndpoint { .. } => MediaKind::PlayerEndpoint,
            ChildSpec::RecorderEndpoint { .. } => MediaKind::RecorderEndpoint,
        }
    }

    fn endpoint_state(&self) -> Option<EndpointState> {
        match self {
            ChildSpec::Mixer { .. } => None,
            ChildSpec::SdpEndpoint {
                endpoint_type,
                fixed_sdp: Some(sdp),
            } => Some(EndpointState::Sdp(SdpNegotiation::with_fixed_sdp(*endpoint_type, sdp.clone()))),
            ChildSpec::SdpEndpoint {
                endpoint_type,
                fixed_sdp: None,
            } => Some(EndpointState::Sdp(SdpNegotiation::new(*endpoint_type))),
            ChildSpec::PlayerEndpoint { uri, use_encoded_media } => Some(EndpointState::Uri(UriPlayback::new(
                UriEndpointType::Player,
                uri.clone(),
                *use_encoded_media,
            ))),
            ChildSpec::RecorderEndpoint { uri } => Some(EndpointState::Uri(UriPlayback::new(
                UriEndpointType::Recorder,
                uri.clone(),
                false,
            ))),
        }
    }
}

/// Lifecycle operations over the ownership trees
pub struct MediaObjectGraph {
    store: Arc<ObjectStore>,
    engine: Arc<dyn MediaEngine>,
}

impl MediaObjectGraph {
    pub fn new(store: Arc<ObjectStore>, engine: Arc<dyn MediaEngine>) -> Self {
        Self { store, engine }
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }

    pub fn engine(&self) -> &Arc<dyn MediaEngine> {
        &self.engine
    }

    /// Create a new tree root with a fresh token
    pub async fn create_media_manager(&self, garbage_period: i64) -> MediaResult<ObjectInfo> {
        let id = self.store.allocate_id();
        let pipeline = self.engine.create_element(id, MediaKind::MediaManager).await?;

        let info = self.store.insert_root(
            NewObject::new(id, MediaKind::MediaManager, pipeline).with_garbage_period(garbage_period),
        );
        info!("Created MediaManager {} (garbage period {}s)", info.id, garbage_period);
        Ok(info)
    }

    /// Create a child of `parent`, inheriting its token.
    ///
    /// The engine element is built before the record is inserted and torn
    /// down again if the parent vanished in the meantime.
    pub async fn create_child(&self, parent: ObjectId, token: Token, spec: ChildSpec) -> MediaResult<ObjectInfo> {
        self.store.get(parent, token)?;

        let kind = spec.kind();
        let id = self.store.allocate_id();
        let pipeline = self.engine.create_element(id, kind).await?;

        if let ChildSpec::SdpEndpoint {
            fixed_sdp: Some(sdp), ..
        } = &spec
        {
            if let Err(e) = self.engine.apply_fixed_sdp(pipeline, sdp).await {
                self.engine.release_element(pipeline).await;
                return Err(e.into());
            }
        }

        let mut object = NewObject::new(id, kind, pipeline);
        if let Some(state) = spec.endpoint_state() {
            object = object.with_endpoint(state);
        }

        match self.store.insert_child(parent, token, object) {
            Ok(info) => {
                info!("Created {} {} under {}", info.kind, info.id, parent);
                Ok(info)
            }
            Err(e) => {
                warn!("Parent {} released while creating {}: {}", parent, kind, e);
                self.engine.release_element(pipeline).await;
                Err(e)
            }
        }
    }

    pub fn get(&self, id: ObjectId, token: Token) -> MediaResult<ObjectInfo> {
        self.store.get(id, token)
    }

    /// The parent of `id`; `NoParent` for roots
    pub fn get_parent(&self, id: ObjectId, token: Token) -> MediaResult<ObjectInfo> {
        self.store.parent_of(id, token)
    }

    /// Release `id` and its subtree. Returns the number of objects removed.
    pub async fn release(&self, id: ObjectId, token: Token) -> MediaResult<usize> {
        self.store.get(id, token)?;
        let released = self.store.release(id)?;
        Ok(self.teardown(released).await)
    }

    async fn teardown(&self, released: Vec<ReleasedObject>) -> usize {
        let count = released.len();
        for object in released {
            debug!("Tearing down {} of {} {}", object.pipeline, object.kind, object.id);
            self.engine.release_element(object.pipeline).await;
        }
        count
    }

    /// Release every object idle past its garbage period as of `now`.
    ///
    /// Objects released concurrently by a client are skipped. Returns the
    /// number of objects removed, descendants included.
    pub async fn collect_garbage(&self, now: Instant) -> usize {
        let mut collected = 0;
        for id in self.store.expired(now) {
            match self.store.release_expired(id, now) {
                Ok(released) => collected += self.teardown(released).await,
                Err(e) if e.is_not_found() => {
                    debug!("Garbage collection lost release race for {}", id);
                }
                Err(e) => warn!("Garbage collection failed to release {}: {}", id, e),
            }
        }
        if collected > 0 {
            info!("Garbage collection released {} object(s)", collected);
        }
        collected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{LoopbackConfig, LoopbackEngine};
    use crate::errors::MediaError;
    use crate::signals::SignalHub;
    use std::time::Duration;

    fn graph() -> (MediaObjectGraph, Arc<LoopbackEngine>) {
        let hub = Arc::new(SignalHub::new());
        let engine = Arc::new(LoopbackEngine::new(LoopbackConfig::default(), Arc::clone(&hub)));
        let store = Arc::new(ObjectStore::new(hub));
        (MediaObjectGraph::new(store, engine.clone()), engine)
    }

    fn mixer() -> ChildSpec {
        ChildSpec::Mixer {
            mixer_type: MixerType::MainMixer,
        }
    }

    #[tokio::test]
    async fn test_create_child_under_wrong_token_builds_nothing() {
        let (graph, engine) = graph();
        let a = graph.create_media_manager(0).await.unwrap();
        let b = graph.create_media_manager(0).await.unwrap();

        let result = graph.create_child(a.id, b.token, mixer()).await;
        assert_eq!(result, Err(MediaError::not_found(a.id)));
        assert_eq!(engine.live_elements(), 2);
    }

    #[tokio::test]
    async fn test_release_tears_down_every_element() {
        let (graph, engine) = graph();
        let manager = graph.create_media_manager(0).await.unwrap();
        let mixer = graph.create_child(manager.id, manager.token, mixer()).await.unwrap();
        graph
            .create_child(
                mixer.id,
                manager.token,
                ChildSpec::SdpEndpoint {
                    endpoint_type: SdpEndpointType::Rtp,
                    fixed_sdp: None,
                },
            )
            .await
            .unwrap();

        assert_eq!(graph.release(manager.id, manager.token).await.unwrap(), 3);
        assert_eq!(engine.live_elements(), 0);
        assert_eq!(engine.released_elements(), 3);
        assert!(graph
            .release(manager.id, manager.token)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn test_fixed_sdp_reaches_engine() {
        let (graph, engine) = graph();
        let manager = graph.create_media_manager(0).await.unwrap();
        let endpoint = graph
            .create_child(
                manager.id,
                manager.token,
                ChildSpec::SdpEndpoint {
                    endpoint_type: SdpEndpointType::WebRtc,
                    fixed_sdp: Some("v=0".into()),
                },
            )
            .await
            .unwrap();

        assert_eq!(endpoint.kind, MediaKind::WebRtcEndpoint);
        assert_eq!(engine.fixed_sdp(endpoint.id).as_deref(), Some("v=0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_garbage_releases_idle_manager() {
        let (graph, engine) = graph();
        let idle = graph.create_media_manager(1).await.unwrap();
        graph.create_child(idle.id, idle.token, mixer()).await.unwrap();
        let forever = graph.create_media_manager(0).await.unwrap();

        tokio::time::advance(Duration::from_millis(1100)).await;
        assert_eq!(graph.collect_garbage(Instant::now()).await, 2);

        assert!(graph.get(idle.id, idle.token).unwrap_err().is_not_found());
        assert!(graph.get(forever.id, forever.token).is_ok());
        assert_eq!(engine.live_elements(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_collect_garbage_skips_used_object() {
        let (graph, _engine) = graph();
        let manager = graph.create_media_manager(1).await.unwrap();

        tokio::time::advance(Duration::from_millis(1100)).await;
        let sweep_time = Instant::now();
        assert_eq!(graph.store().expired(sweep_time), vec![manager.id]);

        graph.get(manager.id, manager.token).unwrap();
        tokio::time::advance(Duration::from_millis(100)).await;
        assert_eq!(graph.collect_garbage(sweep_time).await, 0);
        assert!(graph.get(manager.id, manager.token).is_ok());
    }
}
