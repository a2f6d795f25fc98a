//! Named message envelopes.

use crate::BusResult;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A named message as it travels over the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    pub name: String,
    pub body: Value,
}

impl Envelope {
    pub fn new(name: impl Into<String>, body: Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }

    /// Wrap a typed message.
    pub fn from_message<M: Message>(message: &M) -> BusResult<Self> {
        Ok(Self::new(M::NAME, serde_json::to_value(message)?))
    }

    /// Decode and validate the body as `M`.
    pub fn decode<M: Message>(&self) -> Result<M, String> {
        let message: M = serde_json::from_value(self.body.clone())
            .map_err(|e| format!("{}: {e}", self.name))?;
        message.validate().map_err(|e| format!("{}: {e}", self.name))?;
        Ok(message)
    }
}

/// A typed message with a fixed wire name.
pub trait Message: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Wire name used for routing.
    const NAME: &'static str;

    /// Field constraints beyond what the type system expresses.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}
