use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ObjectId;

/// Signals an engine can raise for a media object
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SignalKind {
    EndOfStream,
    InvalidUri,
    InvalidMedia,
}

impl SignalKind {
    pub const ALL: [SignalKind; 3] = [
        SignalKind::EndOfStream,
        SignalKind::InvalidUri,
        SignalKind::InvalidMedia,
    ];
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalKind::EndOfStream => "EndOfStream",
            SignalKind::InvalidUri => "InvalidUri",
            SignalKind::InvalidMedia => "InvalidMedia",
        };
        f.write_str(name)
    }
}

/// Opaque subscription handle
#[derive(Debug, Clone, Copy, Hash, Eq, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SignalHandle(pub u64);

impl fmt::Display for SignalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "signal-{}", self.0)
    }
}

/// A delivered signal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaEvent {
    pub object: ObjectId,
    pub kind: SignalKind,
    pub timestamp: DateTime<Utc>,
}

impl MediaEvent {
    pub fn new(object: ObjectId, kind: SignalKind) -> Self {
        Self {
            object,
            kind,
            timestamp: Utc::now(),
        }
    }
}
