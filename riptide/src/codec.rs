//! Pluggable payload serialization.
//!
//! The [`MessageCodec`] trait decides how a payload body is turned into bytes
//! inside an envelope. Riptide ships [`JsonCodec`], which is what most realtime
//! servers speak and is easy to inspect on the wire.
//!
//! # Example
//!
//! ```rust
//! use riptide::{MessageCodec, JsonCodec};
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, Debug, PartialEq)]
//! struct Ping { seq: u32 }
//!
//! let codec = JsonCodec;
//! let bytes = codec.encode(&Ping { seq: 1 }).unwrap();
//! assert_eq!(&bytes, br#"{"seq":1}"#);
//!
//! let decoded: Ping = codec.decode(&bytes).unwrap();
//! assert_eq!(decoded, Ping { seq: 1 });
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A payload body that could not be turned into bytes or back.
///
/// Carries the codec's content type so a failure inside an envelope names
/// the format the body was supposed to be in.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The payload could not be serialized into an envelope body.
    #[error("failed to encode {content_type} envelope body: {source}")]
    Encode {
        /// Content type of the codec that failed.
        content_type: &'static str,
        /// Underlying serializer error.
        #[source]
        source: BoxError,
    },
    /// An envelope body could not be deserialized into a payload.
    #[error("failed to decode {content_type} envelope body: {source}")]
    Decode {
        /// Content type of the codec that failed.
        content_type: &'static str,
        /// Underlying deserializer error.
        #[source]
        source: BoxError,
    },
}

impl CodecError {
    /// Content type of the codec that produced this error.
    pub fn content_type(&self) -> &'static str {
        match self {
            CodecError::Encode { content_type, .. } | CodecError::Decode { content_type, .. } => {
                *content_type
            }
        }
    }
}

/// Payload body serialization format.
///
/// Codecs are shared between the caller-side send path and the delivery task,
/// so they must be `Send + Sync`.
pub trait MessageCodec: Clone + Send + Sync + 'static {
    /// MIME type of the bodies this codec produces, e.g. `application/json`.
    fn content_type(&self) -> &'static str;

    /// Encode a payload into an envelope body.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, payload: &T) -> Result<Vec<u8>, CodecError>;

    /// Decode an envelope body into a payload.
    ///
    /// # Errors
    ///
    /// Returns `CodecError::Decode` if deserialization fails.
    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, CodecError>;
}

/// JSON bodies via serde_json.
#[derive(Clone, Default, Debug, Copy)]
pub struct JsonCodec;

impl JsonCodec {
    const CONTENT_TYPE: &'static str = "application/json";
}

impl MessageCodec for JsonCodec {
    fn content_type(&self) -> &'static str {
        Self::CONTENT_TYPE
    }

    fn encode<T: Serialize>(&self, payload: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(payload).map_err(|e| CodecError::Encode {
            content_type: Self::CONTENT_TYPE,
            source: Box::new(e),
        })
    }

    fn decode<T: DeserializeOwned>(&self, body: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(body).map_err(|e| CodecError::Decode {
            content_type: Self::CONTENT_TYPE,
            source: Box::new(e),
        })
    }
}
