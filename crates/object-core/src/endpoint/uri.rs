//! Player/Recorder lifecycle
//!
//! `IDLE → PLAYING → (EOS | ERROR)`. An end of stream can be restarted,
//! an invalid source or invalid media cannot.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::signals::{SignalHandle, SignalKind};
use crate::types::UriEndpointType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UriState {
    Idle,
    Playing,
    Eos,
    Error,
}

impl fmt::Display for UriState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            UriState::Idle => "IDLE",
            UriState::Playing => "PLAYING",
            UriState::Eos => "EOS",
            UriState::Error => "ERROR",
        };
        f.write_str(name)
    }
}

/// Hub subscriptions armed by the first start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UriSignals {
    pub eos: Option<SignalHandle>,
    pub invalid_uri: Option<SignalHandle>,
    pub invalid_media: Option<SignalHandle>,
}

impl UriSignals {
    pub fn get(&self, kind: SignalKind) -> Option<SignalHandle> {
        match kind {
            SignalKind::EndOfStream => self.eos,
            SignalKind::InvalidUri => self.invalid_uri,
            SignalKind::InvalidMedia => self.invalid_media,
        }
    }

    pub fn set(&mut self, kind: SignalKind, handle: SignalHandle) {
        let slot = match kind {
            SignalKind::EndOfStream => &mut self.eos,
            SignalKind::InvalidUri => &mut self.invalid_uri,
            SignalKind::InvalidMedia => &mut self.invalid_media,
        };
        *slot = Some(handle);
    }

    /// Kinds without a subscription yet
    pub fn missing(&self) -> Vec<SignalKind> {
        SignalKind::ALL
            .iter()
            .copied()
            .filter(|kind| self.get(*kind).is_none())
            .collect()
    }
}

/// Lifecycle record of one URI endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPlayback {
    pub endpoint_type: UriEndpointType,
    pub uri: String,
    pub use_encoded_media: bool,
    pub state: UriState,
    pub signals: UriSignals,
    pub last_error: Option<String>,
}

impl UriPlayback {
    pub fn new(endpoint_type: UriEndpointType, uri: impl Into<String>, use_encoded_media: bool) -> Self {
        Self {
            endpoint_type,
            uri: uri.into(),
            use_encoded_media,
            state: UriState::Idle,
            signals: UriSignals::default(),
            last_error: None,
        }
    }

    /// Enter `PLAYING`; returns the state to restore if the engine refuses
    pub fn begin_start(&mut self) -> Result<UriState, UriState> {
        match self.state {
            UriState::Idle | UriState::Eos => {
                let previous = self.state;
                self.state = UriState::Playing;
                Ok(previous)
            }
            other => Err(other),
        }
    }

    pub fn abort_start(&mut self, previous: UriState) {
        if self.state == UriState::Playing {
            self.state = previous;
        }
    }

    pub fn can_stop(&self) -> Result<(), UriState> {
        match self.state {
            UriState::Playing | UriState::Eos => Ok(()),
            other => Err(other),
        }
    }

    /// Back to `IDLE`, unless an error signal arrived while stopping
    pub fn finish_stop(&mut self) {
        if self.can_stop().is_ok() {
            self.state = UriState::Idle;
        }
    }

    /// Apply an engine signal. Only a running endpoint reacts.
    pub fn on_signal(&mut self, kind: SignalKind) -> bool {
        if self.state != UriState::Playing {
            return false;
        }
        match kind {
            SignalKind::EndOfStream => self.state = UriState::Eos,
            SignalKind::InvalidUri => {
                self.state = UriState::Error;
                self.last_error = Some(format!("invalid uri: {}", self.uri));
            }
            SignalKind::InvalidMedia => {
                self.state = UriState::Error;
                self.last_error = Some(format!("invalid media at {}", self.uri));
            }
        }
        true
    }
}
