//! Wire envelopes.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use playground_common::BridgeError;

/// An addressed message on the bridge.
///
/// Every `Call` is answered by exactly one `Reply` or `Fault` carrying the
/// same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Envelope {
    /// Invoke a named procedure.
    Call {
        id: u64,
        method: String,
        #[serde(default)]
        args: Vec<Value>,
    },

    /// Successful completion of the call with the same id.
    Reply {
        id: u64,
        #[serde(default)]
        result: Value,
    },

    /// Failed completion of the call with the same id.
    Fault { id: u64, error: String },
}

impl Envelope {
    /// Correlation id.
    pub fn id(&self) -> u64 {
        match self {
            Self::Call { id, .. } | Self::Reply { id, .. } | Self::Fault { id, .. } => *id,
        }
    }

    /// Serialize to wire text.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Codec`] if a payload cannot be serialized.
    pub fn encode(&self) -> Result<String, BridgeError> {
        serde_json::to_string(self).map_err(|e| BridgeError::codec(e.to_string()))
    }

    /// Parse wire text.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::Malformed`] if the text is not an envelope.
    pub fn decode(text: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(text).map_err(|e| BridgeError::malformed(e.to_string()))
    }
}
