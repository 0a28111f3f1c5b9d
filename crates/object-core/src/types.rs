//! Core identifier and taxonomy types
//!
//! Every media object is addressed by an [`ObjectId`] and authorised by the
//! [`Token`] of the ownership tree it belongs to. The pair travels over RPC as
//! a [`MediaObjectRef`].

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process-unique media object identifier
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ownership capability shared by every object of one tree.
///
/// A tree's token is assigned when its root is created and equals the root's
/// identifier value.
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Token(pub u64);

impl From<ObjectId> for Token {
    fn from(id: ObjectId) -> Self {
        Token(id.0)
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The `{id, token}` value echoed back to clients after every creation
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct MediaObjectRef {
    pub id: ObjectId,
    pub token: Token,
}

impl MediaObjectRef {
    pub fn new(id: ObjectId, token: Token) -> Self {
        Self { id, token }
    }
}

impl fmt::Display for MediaObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.id, self.token)
    }
}

/// Mixer flavours
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum MixerType {
    #[serde(rename = "MAIN_MIXER")]
    MainMixer,
}

/// SDP-capable endpoint flavours
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum SdpEndpointType {
    #[serde(rename = "RTP_END_POINT")]
    Rtp,
    #[serde(rename = "WEBRTC_END_POINT")]
    WebRtc,
}

/// URI endpoint flavours
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum UriEndpointType {
    /// Pulls media from its URI
    #[serde(rename = "PLAYER_END_POINT")]
    Player,
    /// Pushes media into its URI
    #[serde(rename = "RECORDER_END_POINT")]
    Recorder,
}

/// Tag over every concrete media object variant
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub enum MediaKind {
    MediaManager,
    Mixer,
    PlayerEndpoint,
    RecorderEndpoint,
    RtpEndpoint,
    WebRtcEndpoint,
}

/// Which endpoint operations a kind supports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Capabilities {
    /// generateOffer / processOffer / processAnswer
    pub negotiation: bool,
    /// play
    pub playback: bool,
    /// record
    pub recording: bool,
}

impl MediaKind {
    /// Capability table for this kind
    pub fn capabilities(&self) -> Capabilities {
        match self {
            MediaKind::MediaManager | MediaKind::Mixer => Capabilities::default(),
            MediaKind::RtpEndpoint | MediaKind::WebRtcEndpoint => Capabilities {
                negotiation: true,
                ..Default::default()
            },
            MediaKind::PlayerEndpoint => Capabilities {
                playback: true,
                ..Default::default()
            },
            MediaKind::RecorderEndpoint => Capabilities {
                recording: true,
                ..Default::default()
            },
        }
    }

    /// Only roots may have this kind
    pub fn is_root_only(&self) -> bool {
        matches!(self, MediaKind::MediaManager)
    }

    pub fn is_uri_endpoint(&self) -> bool {
        matches!(self, MediaKind::PlayerEndpoint | MediaKind::RecorderEndpoint)
    }

    pub fn is_sdp_endpoint(&self) -> bool {
        matches!(self, MediaKind::RtpEndpoint | MediaKind::WebRtcEndpoint)
    }
}

impl From<SdpEndpointType> for MediaKind {
    fn from(endpoint_type: SdpEndpointType) -> Self {
        match endpoint_type {
            SdpEndpointType::Rtp => MediaKind::RtpEndpoint,
            SdpEndpointType::WebRtc => MediaKind::WebRtcEndpoint,
        }
    }
}

impl From<UriEndpointType> for MediaKind {
    fn from(endpoint_type: UriEndpointType) -> Self {
        match endpoint_type {
            UriEndpointType::Player => MediaKind::PlayerEndpoint,
            UriEndpointType::Recorder => MediaKind::RecorderEndpoint,
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MediaKind::MediaManager => "MediaManager",
            MediaKind::Mixer => "Mixer",
            MediaKind::PlayerEndpoint => "PlayerEndpoint",
            MediaKind::RecorderEndpoint => "RecorderEndpoint",
            MediaKind::RtpEndpoint => "RtpEndpoint",
            MediaKind::WebRtcEndpoint => "WebRtcEndpoint",
        };
        f.write_str(name)
    }
}
