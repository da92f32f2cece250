//! Transmission seam. The service decides whether a report may be sent;
//! the client does the network I/O.

use serde::{Deserialize, Serialize};

/// What the receiving authority answered
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionOutcome {
    pub success: bool,
    pub protocol_id: Option<String>,
    pub message: String,
}

impl TransmissionOutcome {
    pub fn accepted(protocol_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: true,
            protocol_id: Some(protocol_id.into()),
            message: message.into(),
        }
    }

    pub fn rejected(message: impl Into<String>) -> Self {
        Self {
            success: false,
            protocol_id: None,
            message: message.into(),
        }
    }
}

/// Sends an exported report. Must not call back into the service.
pub trait TransmissionClient {
    fn submit(&self, payload: &str, valid: bool) -> TransmissionOutcome;
}
