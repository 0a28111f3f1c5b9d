//! SDP offer/answer negotiation state
//!
//! ```text
//! CREATED ──generateOffer──▶ OFFER_GENERATED ──processAnswer──▶ ANSWER_PROCESSED
//!    │
//!    └──processOffer──▶ OFFER_PROCESSED ──(engine answer)──▶ ANSWER_GENERATED
//! ```
//!
//! Fixed-SDP endpoints start in `ANSWER_PROCESSED` and never move.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::SdpEndpointType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NegotiationState {
    Created,
    OfferGenerated,
    AnswerProcessed,
    OfferProcessed,
    AnswerGenerated,
}

impl fmt::Display for NegotiationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NegotiationState::Created => "CREATED",
            NegotiationState::OfferGenerated => "OFFER_GENERATED",
            NegotiationState::AnswerProcessed => "ANSWER_PROCESSED",
            NegotiationState::OfferProcessed => "OFFER_PROCESSED",
            NegotiationState::AnswerGenerated => "ANSWER_GENERATED",
        };
        f.write_str(name)
    }
}

/// Outcome of starting a negotiation step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NegotiationStep {
    /// The engine must be consulted
    Engine,
    /// A fixed endpoint answered without the engine
    Fixed(Option<String>),
}

/// Negotiation record of one SDP endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SdpNegotiation {
    pub endpoint_type: SdpEndpointType,
    pub state: NegotiationState,
    pub local_sdp: Option<String>,
    pub remote_sdp: Option<String>,
    pub fixed: bool,
}

impl SdpNegotiation {
    pub fn new(endpoint_type: SdpEndpointType) -> Self {
        Self {
            endpoint_type,
            state: NegotiationState::Created,
            local_sdp: None,
            remote_sdp: None,
            fixed: false,
        }
    }

    /// Endpoint created holding a caller-supplied local description
    pub fn with_fixed_sdp(endpoint_type: SdpEndpointType, local_sdp: impl Into<String>) -> Self {
        Self {
            endpoint_type,
            state: NegotiationState::AnswerProcessed,
            local_sdp: Some(local_sdp.into()),
            remote_sdp: None,
            fixed: true,
        }
    }

    pub fn begin_generate_offer(&self) -> Result<NegotiationStep, NegotiationState> {
        if self.fixed {
            return Ok(NegotiationStep::Fixed(self.local_sdp.clone()));
        }
        match self.state {
            NegotiationState::Created => Ok(NegotiationStep::Engine),
            other => Err(other),
        }
    }

    pub fn finish_generate_offer(&mut self, offer: String) {
        self.local_sdp = Some(offer);
        self.state = NegotiationState::OfferGenerated;
    }

    /// Records `remote` and moves to `OFFER_PROCESSED` while the engine answers
    pub fn begin_process_offer(&mut self, remote: &str) -> Result<NegotiationStep, NegotiationState> {
        if self.fixed {
            self.remote_sdp = Some(remote.to_string());
            return Ok(NegotiationStep::Fixed(self.local_sdp.clone()));
        }
        match self.state {
            NegotiationState::Created => {
                self.remote_sdp = Some(remote.to_string());
                self.state = NegotiationState::OfferProcessed;
                Ok(NegotiationStep::Engine)
            }
            other => Err(other),
        }
    }

    pub fn finish_process_offer(&mut self, answer: String) {
        self.local_sdp = Some(answer);
        self.state = NegotiationState::AnswerGenerated;
    }

    pub fn abort_process_offer(&mut self) {
        self.remote_sdp = None;
        self.state = NegotiationState::Created;
    }

    /// Records `answer` and moves to `ANSWER_PROCESSED` before media starts
    pub fn begin_process_answer(&mut self, answer: &str) -> Result<NegotiationStep, NegotiationState> {
        if self.fixed {
            self.remote_sdp = Some(answer.to_string());
            return Ok(NegotiationStep::Fixed(None));
        }
        match self.state {
            NegotiationState::OfferGenerated => {
                self.remote_sdp = Some(answer.to_string());
                self.state = NegotiationState::AnswerProcessed;
                Ok(NegotiationStep::Engine)
            }
            other => Err(other),
        }
    }

    pub fn abort_process_answer(&mut self) {
        self.remote_sdp = None;
        self.state = NegotiationState::OfferGenerated;
    }
}
