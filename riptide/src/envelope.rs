//! Envelope model and its binary wire format.
//!
//! Frame format: `[checksum:4][cid_len:2][cid:N][body:M]`
//!
//! - **checksum**: CRC32C of everything after it (little-endian u32)
//! - **cid_len**: byte length of the correlation id (little-endian u16)
//! - **cid**: correlation id, UTF-8; empty for unsolicited frames
//! - **body**: the payload, encoded with the configured [`MessageCodec`]
//!
//! Framing (where one frame ends and the next begins) is the transport's job;
//! the codec always sees exactly one frame.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::codec::{CodecError, JsonCodec, MessageCodec};

/// Header size: 4 (checksum) + 2 (cid length) = 6 bytes.
pub const HEADER_SIZE: usize = 6;

/// Default upper bound on a single frame (1MB).
pub const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Errors produced while encoding or decoding a frame.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    /// Not enough bytes to hold the header or the declared correlation id.
    #[error("truncated frame: need {needed} bytes, have {have}")]
    Truncated {
        /// Minimum bytes required.
        needed: usize,
        /// Bytes available.
        have: usize,
    },

    /// Checksum verification failed.
    #[error("checksum mismatch: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// Checksum carried in the frame.
        expected: u32,
        /// Checksum computed over the received bytes.
        actual: u32,
    },

    /// Frame exceeds the configured maximum size.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge {
        /// Frame size in bytes.
        size: usize,
        /// Configured maximum.
        max: usize,
    },

    /// Correlation id does not fit the 16-bit length field.
    #[error("correlation id too long: {len} bytes")]
    CorrelationIdTooLong {
        /// Correlation id length in bytes.
        len: usize,
    },

    /// Correlation id bytes are not valid UTF-8.
    #[error("correlation id is not valid UTF-8")]
    InvalidCorrelationId,

    /// The payload body failed to encode or decode.
    #[error(transparent)]
    Body(#[from] CodecError),
}

/// One wire message: a correlation id and exactly one payload variant.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<P> {
    /// Client-assigned id linking a request to its response; empty when
    /// the message is unsolicited.
    pub correlation_id: String,
    /// The tagged payload.
    pub payload: P,
}

impl<P> Envelope<P> {
    /// Envelope carrying a correlation id.
    pub fn correlated(correlation_id: impl Into<String>, payload: P) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            payload,
        }
    }

    /// Envelope without a correlation id (notifications and server pushes).
    pub fn unsolicited(payload: P) -> Self {
        Self {
            correlation_id: String::new(),
            payload,
        }
    }

    /// Whether this envelope carries no correlation id.
    pub fn is_unsolicited(&self) -> bool {
        self.correlation_id.is_empty()
    }
}

/// Encodes and decodes [`Envelope`]s to and from single frames.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec<C: MessageCodec = JsonCodec> {
    codec: C,
    max_frame_size: usize,
}

impl Default for EnvelopeCodec<JsonCodec> {
    fn default() -> Self {
        Self::new(JsonCodec)
    }
}

impl<C: MessageCodec> EnvelopeCodec<C> {
    /// Create an envelope codec with the default frame size limit.
    pub fn new(codec: C) -> Self {
        Self {
            codec,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Override the frame size limit.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// The frame size limit.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }

    /// Content type of the payload bodies inside each frame.
    pub fn content_type(&self) -> &'static str {
        self.codec.content_type()
    }

    /// Serialize an envelope into one frame.
    ///
    /// # Errors
    ///
    /// - `CorrelationIdTooLong` if the id exceeds `u16::MAX` bytes
    /// - `Body` if the payload fails to encode
    /// - `FrameTooLarge` if the result exceeds the frame size limit
    pub fn encode<P: Serialize>(&self, envelope: &Envelope<P>) -> Result<Vec<u8>, WireError> {
        let cid = envelope.correlation_id.as_bytes();
        let cid_len = u16::try_from(cid.len())
            .map_err(|_| WireError::CorrelationIdTooLong { len: cid.len() })?;

        let body = self.codec.encode(&envelope.payload)?;

        let size = HEADER_SIZE + cid.len() + body.len();
        if size > self.max_frame_size {
            return Err(WireError::FrameTooLarge {
                size,
                max: self.max_frame_size,
            });
        }

        let mut frame = Vec::with_capacity(size);
        frame.extend_from_slice(&[0u8; 4]);
        frame.extend_from_slice(&cid_len.to_le_bytes());
        frame.extend_from_slice(cid);
        frame.extend_from_slice(&body);

        let checksum = crc32c::crc32c(&frame[4..]);
        frame[0..4].copy_from_slice(&checksum.to_le_bytes());

        Ok(frame)
    }

    /// Deserialize one frame into an envelope.
    ///
    /// # Errors
    ///
    /// - `FrameTooLarge` if the frame exceeds the size limit
    /// - `Truncated` if the frame is shorter than its header says
    /// - `ChecksumMismatch` if the frame was corrupted
    /// - `InvalidCorrelationId` if the id is not UTF-8
    /// - `Body` if the payload fails to decode
    pub fn decode<P: DeserializeOwned>(&self, frame: &[u8]) -> Result<Envelope<P>, WireError> {
        if frame.len() > self.max_frame_size {
            return Err(WireError::FrameTooLarge {
                size: frame.len(),
                max: self.max_frame_size,
            });
        }

        if frame.len() < HEADER_SIZE {
            return Err(WireError::Truncated {
                needed: HEADER_SIZE,
                have: frame.len(),
            });
        }

        let expected = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let actual = crc32c::crc32c(&frame[4..]);
        if expected != actual {
            return Err(WireError::ChecksumMismatch { expected, actual });
        }

        let cid_len = u16::from_le_bytes([frame[4], frame[5]]) as usize;
        let body_start = HEADER_SIZE + cid_len;
        if frame.len() < body_start {
            return Err(WireError::Truncated {
                needed: body_start,
                have: frame.len(),
            });
        }

        let correlation_id = std::str::from_utf8(&frame[HEADER_SIZE..body_start])
            .map_err(|_| WireError::InvalidCorrelationId)?
            .to_owned();

        let payload = self.codec.decode(&frame[body_start..])?;

        Ok(Envelope {
            correlation_id,
            payload,
        })
    }
}
