//! Decode response bodies from the Data Plane API.

use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::errors::Error;

/// How a successful response body is laid out.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum ResponseShape {
    /// The payload is the body itself (`v3`, and transaction endpoints on every version).
    Bare,
    /// The payload sits under a `data` member (`v2` configuration endpoints).
    Wrapped,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

impl ResponseShape {
    pub fn decode<T: DeserializeOwned>(self, body: &[u8]) -> Result<T, Error> {
        match self {
            ResponseShape::Bare => Ok(serde_json::from_slice(body)?),
            ResponseShape::Wrapped => {
                let envelope: Envelope<T> = serde_json::from_slice(body)?;
                Ok(envelope.data)
            }
        }
    }

    /// Decode a collection; a `null` payload is an empty collection.
    pub fn decode_list<T: DeserializeOwned>(self, body: &[u8]) -> Result<Vec<T>, Error> {
        let list: Option<Vec<T>> = self.decode(body)?;
        Ok(list.unwrap_or_default())
    }
}

/// A transaction as returned by the transaction endpoints.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
pub struct TransactionInfo {
    pub id: String,
    #[serde(rename = "_version", default)]
    pub version: i64,
    #[serde(default)]
    pub status: Option<String>,
}
