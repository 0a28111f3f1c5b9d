//! In-process loopback engine
//!
//! Produces placeholder session descriptions, keeps a table of live elements
//! and lets the embedding code raise pipeline signals with [`LoopbackEngine::emit`].
//! No media is processed.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, info};

use super::{EngineError, EngineResult, MediaEngine, PipelineHandle};
use crate::signals::{SignalHub, SignalKind};
use crate::types::{MediaKind, ObjectId, SdpEndpointType, UriEndpointType};

const MAX_MEDIA_PORT: u32 = 65_000;

/// Loopback engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopbackConfig {
    /// Address advertised in generated descriptions
    pub media_address: String,
    /// First RTP port handed out; each endpoint takes four
    pub base_port: u16,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            media_address: "127.0.0.1".to_string(),
            base_port: 20_000,
        }
    }
}

#[derive(Debug, Clone)]
struct LoopbackElement {
    object: ObjectId,
    kind: MediaKind,
    audio_port: u16,
    fixed_sdp: Option<String>,
    media_flowing: bool,
    active_uri: Option<String>,
}

/// Holds one engine call between entry and completion.
///
/// Obtained from [`LoopbackEngine::hold_next_call`]. The next SDP or URI
/// primitive signals [`CallGate::entered`] and then waits for
/// [`CallGate::resume`] before doing any work.
#[derive(Debug, Default)]
pub struct CallGate {
    entered: Notify,
    resume: Notify,
}

impl CallGate {
    /// Wait until the held call has started
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    /// Let the held call continue
    pub fn resume(&self) {
        self.resume.notify_one();
    }
}

/// Engine that fakes every primitive in memory
pub struct LoopbackEngine {
    config: LoopbackConfig,
    signals: Arc<SignalHub>,
    next_handle: AtomicU64,
    next_port: AtomicU32,
    elements: DashMap<PipelineHandle, LoopbackElement>,
    released: AtomicU64,
    failing: AtomicBool,
    gate: Mutex<Option<Arc<CallGate>>>,
}

impl LoopbackEngine {
    pub fn new(config: LoopbackConfig, signals: Arc<SignalHub>) -> Self {
        let next_port = AtomicU32::new(u32::from(config.base_port));
        Self {
            config,
            signals,
            next_handle: AtomicU64::new(1),
            next_port,
            elements: DashMap::new(),
            released: AtomicU64::new(0),
            failing: AtomicBool::new(false),
            gate: Mutex::new(None),
        }
    }

    /// Raise a pipeline signal for `object` as a real engine would.
    ///
    /// Returns the number of subscribers reached.
    pub fn emit(&self, object: ObjectId, kind: SignalKind) -> usize {
        debug!("Loopback engine raising {} for object {}", kind, object);
        self.signals.dispatch(object, kind)
    }

    /// Make every subsequent SDP and URI primitive fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Pause the next SDP or URI primitive until the returned gate is resumed
    pub fn hold_next_call(&self) -> Arc<CallGate> {
        let gate = Arc::new(CallGate::default());
        *self.gate.lock() = Some(Arc::clone(&gate));
        gate
    }

    async fn pass_gate(&self) {
        let gate = self.gate.lock().take();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.resume.notified().await;
        }
    }

    /// Number of elements created and not yet released
    pub fn live_elements(&self) -> usize {
        self.elements.len()
    }

    /// Number of `release_element` calls served
    pub fn released_elements(&self) -> u64 {
        self.released.load(Ordering::SeqCst)
    }

    /// Whether an answer has been applied to the element backing `object`
    pub fn is_media_flowing(&self, object: ObjectId) -> bool {
        self.elements
            .iter()
            .any(|e| e.object == object && e.media_flowing)
    }

    /// The URI an element of `object` is currently playing or recording
    pub fn active_uri(&self, object: ObjectId) -> Option<String> {
        self.elements
            .iter()
            .find(|e| e.object == object)
            .and_then(|e| e.active_uri.clone())
    }

    /// The fixed description applied to the element backing `object`, if any
    pub fn fixed_sdp(&self, object: ObjectId) -> Option<String> {
        self.elements
            .iter()
            .find(|e| e.object == object)
            .and_then(|e| e.fixed_sdp.clone())
    }

    fn check_failing(&self, stage: &str) -> EngineResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::SdpSynthesis {
                reason: format!("loopback engine configured to fail ({stage})"),
            });
        }
        Ok(())
    }

    fn allocate_port(&self) -> u16 {
        let base = u32::from(self.config.base_port);
        let port = self
            .next_port
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                let next = current + 4;
                Some(if next > MAX_MEDIA_PORT { base } else { next })
            })
            .unwrap_or(base);
        u16::try_from(port).unwrap_or(self.config.base_port)
    }

    fn element(&self, handle: PipelineHandle) -> EngineResult<LoopbackElement> {
        self.elements
            .get(&handle)
            .map(|e| e.clone())
            .ok_or(EngineError::UnknownElement(handle))
    }

    fn describe(&self, element: &LoopbackElement, endpoint_type: SdpEndpointType, offer: bool) -> String {
        let address = &self.config.media_address;
        let session = rand::thread_rng().r#gen::<u32>();
        let audio = element.audio_port;
        let video = audio.saturating_add(2);

        let mut sdp = format!(
            "v=0\r\no=- {session} {session} IN IP4 {address}\r\ns=mediagraph\r\nc=IN IP4 {address}\r\nt=0 0\r\n"
        );

        match endpoint_type {
            SdpEndpointType::Rtp => {
                sdp.push_str(&format!(
                    "m=audio {audio} RTP/AVP 0 8 101\r\na=rtpmap:0 PCMU/8000\r\na=rtpmap:8 PCMA/8000\r\na=rtpmap:101 telephone-event/8000\r\na=sendrecv\r\n"
                ));
                sdp.push_str(&format!(
                    "m=video {video} RTP/AVP 96\r\na=rtpmap:96 VP8/90000\r\na=sendrecv\r\n"
                ));
            }
            SdpEndpointType::WebRtc => {
                let mut rng = rand::thread_rng();
                let ufrag: String = (0..8).map(|_| rng.sample(rand::distributions::Alphanumeric) as char).collect();
                let pwd: String = (0..24).map(|_| rng.sample(rand::distributions::Alphanumeric) as char).collect();
                let fingerprint: Vec<String> = (0..32).map(|_| format!("{:02X}", rng.r#gen::<u8>())).collect();
                let setup = if offer { "actpass" } else { "active" };

                sdp.push_str("a=group:BUNDLE audio video\r\n");
                for (mid, port, payload) in [("audio", audio, "111 0"), ("video", audio, "96")] {
                    sdp.push_str(&format!(
                        "m={mid} {port} UDP/TLS/RTP/SAVPF {payload}\r\na=mid:{mid}\r\na=rtcp-mux\r\na=ice-ufrag:{ufrag}\r\na=ice-pwd:{pwd}\r\na=fingerprint:sha-256 {}\r\na=setup:{setup}\r\na=sendrecv\r\n",
                        fingerprint.join(":")
                    ));
                }
            }
        }
        sdp
    }
}

#[async_trait]
impl MediaEngine for LoopbackEngine {
    async fn create_element(&self, object: ObjectId, kind: MediaKind) -> EngineResult<PipelineHandle> {
        let handle = PipelineHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let audio_port = if kind.is_sdp_endpoint() { self.allocate_port() } else { 0 };

        self.elements.insert(
            handle,
            LoopbackElement {
                object,
                kind,
                audio_port,
                fixed_sdp: None,
                media_flowing: false,
                active_uri: None,
            },
        );
        debug!("Loopback engine created {} ({}) for object {}", handle, kind, object);
        Ok(handle)
    }

    async fn release_element(&self, handle: PipelineHandle) {
        if let Some((_, element)) = self.elements.remove(&handle) {
            self.released.fetch_add(1, Ordering::SeqCst);
            debug!("Loopback engine released {} ({})", handle, element.kind);
        }
    }

    async fn apply_fixed_sdp(&self, handle: PipelineHandle, sdp: &str) -> EngineResult<()> {
        let mut element = self
            .elements
            .get_mut(&handle)
            .ok_or(EngineError::UnknownElement(handle))?;
        element.fixed_sdp = Some(sdp.to_string());
        element.media_flowing = true;
        Ok(())
    }

    async fn generate_offer(&self, handle: PipelineHandle, endpoint_type: SdpEndpointType) -> EngineResult<String> {
        self.pass_gate().await;
        self.check_failing("generate offer")?;
        let element = self.element(handle)?;
        Ok(self.describe(&element, endpoint_type, true))
    }

    async fn process_offer(
        &self,
        handle: PipelineHandle,
        endpoint_type: SdpEndpointType,
        _offer: &str,
    ) -> EngineResult<String> {
        self.pass_gate().await;
        self.check_failing("process offer")?;
        let element = self.element(handle)?;
        let answer = self.describe(&element, endpoint_type, false);
        if let Some(mut element) = self.elements.get_mut(&handle) {
            element.media_flowing = true;
        }
        Ok(answer)
    }

    async fn process_answer(&self, handle: PipelineHandle, _answer: &str) -> EngineResult<()> {
        self.pass_gate().await;
        self.check_failing("process answer")?;
        let mut element = self
            .elements
            .get_mut(&handle)
            .ok_or(EngineError::UnknownElement(handle))?;
        element.media_flowing = true;
        Ok(())
    }

    async fn start_uri(
        &self,
        handle: PipelineHandle,
        uri: &str,
        endpoint_type: UriEndpointType,
    ) -> EngineResult<()> {
        self.pass_gate().await;
        if self.failing.load(Ordering::SeqCst) {
            return Err(EngineError::MediaFlow {
                reason: format!("loopback engine configured to fail (start {uri})"),
            });
        }
        let mut element = self
            .elements
            .get_mut(&handle)
            .ok_or(EngineError::UnknownElement(handle))?;
        element.active_uri = Some(uri.to_string());
        info!("Loopback engine {:?} started on {}", endpoint_type, uri);
        Ok(())
    }

    async fn stop_uri(&self, handle: PipelineHandle) -> EngineResult<()> {
        let mut element = self
            .elements
            .get_mut(&handle)
            .ok_or(EngineError::UnknownElement(handle))?;
        element.active_uri = None;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn engine() -> LoopbackEngine {
        LoopbackEngine::new(LoopbackConfig::default(), Arc::new(SignalHub::new()))
    }

    #[tokio::test]
    async fn test_offer_mentions_configured_address() {
        let engine = engine();
        let handle = engine.create_element(ObjectId(1), MediaKind::RtpEndpoint).await.unwrap();

        let offer = engine.generate_offer(handle, SdpEndpointType::Rtp).await.unwrap();
        assert!(offer.starts_with("v=0\r\n"));
        assert!(offer.contains("c=IN IP4 127.0.0.1"));
        assert!(offer.contains("m=audio 2000"));
    }

    #[tokio::test]
    async fn test_webrtc_answer_is_active_setup() {
        let engine = engine();
        let handle = engine.create_element(ObjectId(2), MediaKind::WebRtcEndpoint).await.unwrap();

        let answer = engine
            .process_offer(handle, SdpEndpointType::WebRtc, "")
            .await
            .unwrap();
        assert!(answer.contains("UDP/TLS/RTP/SAVPF"));
        assert!(answer.contains("a=setup:active"));
        assert!(engine.is_media_flowing(ObjectId(2)));
    }

    #[tokio::test]
    async fn test_failing_mode() {
        let engine = engine();
        let handle = engine.create_element(ObjectId(3), MediaKind::RtpEndpoint).await.unwrap();

        engine.set_failing(true);
        assert!(matches!(
            engine.generate_offer(handle, SdpEndpointType::Rtp).await,
            Err(EngineError::SdpSynthesis { .. })
        ));
        engine.set_failing(false);
        assert!(engine.generate_offer(handle, SdpEndpointType::Rtp).await.is_ok());
    }

    #[tokio::test]
    async fn test_release_counts_once() {
        let engine = engine();
        let handle = engine.create_element(ObjectId(4), MediaKind::Mixer).await.unwrap();

        engine.release_element(handle).await;
        engine.release_element(handle).await;
        assert_eq!(engine.live_elements(), 0);
        assert_eq!(engine.released_elements(), 1);
    }
}
