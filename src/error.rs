use num_derive::{FromPrimitive, ToPrimitive};

/// https://httpwg.org/specs/rfc7540.html#ErrorCodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum ErrorCode {
    NoError = 0x0,
    Protocol = 0x1,
    Internal = 0x2,
    FlowControl = 0x3,
    SettingsTimeout = 0x4,
    StreamClosed = 0x5,
    FrameSize = 0x6,
    RefusedStream = 0x7,
    Cancel = 0x8,
    Compression = 0x9,
    Connect = 0xa,
    EnhanceYourCalm = 0xb,
    InadequateSecurity = 0xc,
    Http11Required = 0xd,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Errors from the 9-octet framing layer: short reads, unknown types,
/// structurally invalid payloads.
#[derive(thiserror::Error, Debug)]
pub enum FrameError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("unknown frame type: {0}")]
    UnknownType(u8),
    #[error("payload shorter than the length the frame header declared")]
    PayloadTooShort,
    #[error("SETTINGS payload length {0} is not a multiple of 6")]
    SettingsNotMultipleOfSix(usize),
    #[error("ACK-flagged SETTINGS frame carried a nonempty payload")]
    SettingsAckNotEmpty,
    #[error("WINDOW_UPDATE payload must be 4 octets, got {0}")]
    WindowUpdateLength(usize),
    #[error("WINDOW_UPDATE increment must be nonzero")]
    ZeroWindowIncrement,
    #[error("GOAWAY payload shorter than the mandatory 8 octets")]
    GoawayTooShort,
    #[error("frame on stream 0 requires a connection-level frame type")]
    UnexpectedZeroStreamId,
    #[error("frame requires a nonzero stream id")]
    UnexpectedNonzeroStreamId,
}

/// Errors from the HPACK integer/string/Huffman/table codecs. Always
/// surfaced to the caller as a connection-level `Compression` error.
#[derive(thiserror::Error, Debug)]
pub enum HpackError {
    #[error("hpack integer ended without a terminating octet")]
    Integer,
    #[error("hpack string declares a length longer than the remaining buffer")]
    StringTruncated,
    #[error("huffman decoding consumed the EOS symbol before completion")]
    HuffmanEos,
    #[error("huffman decoding left a non-EOS-prefix partial code at the end of input")]
    HuffmanInvalidPadding,
    #[error("header index {0} is out of bounds")]
    IndexOutOfBounds(usize),
    #[error("dynamic table size update appeared after a header representation")]
    SizeUpdateNotAtStart,
    #[error("header block ended mid-representation")]
    Truncated,
}

/// A connection-level error: sent as GOAWAY and the read loop terminates.
#[derive(thiserror::Error, Debug)]
#[error("connection error {code} (last stream {last_stream_id}): {reason}")]
pub struct ConnectionError {
    pub code: ErrorCode,
    pub last_stream_id: u32,
    pub reason: String,
}

impl ConnectionError {
    pub fn new(code: ErrorCode, last_stream_id: u32, reason: impl Into<String>) -> Self {
        Self {
            code,
            last_stream_id,
            reason: reason.into(),
        }
    }
}

impl From<HpackError> for ConnectionError {
    fn from(err: HpackError) -> Self {
        // Decoding failures in HPACK are always Compression errors (spec §7).
        ConnectionError::new(ErrorCode::Compression, 0, err.to_string())
    }
}

/// Top-level error from [`crate::serve`]. Preface failures are kept apart
/// from [`ConnectionError`] because a peer that didn't send `h2` at all
/// cannot be answered with GOAWAY (spec §4.7/§7): a short read is a plain
/// I/O error, and a full-length-but-wrong preface is its own variant
/// rather than borrowing a GOAWAY error code that doesn't fit it.
#[derive(thiserror::Error, Debug)]
pub enum ServeError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("connection preface did not match PRI * HTTP/2.0\\r\\n\\r\\nSM\\r\\n\\r\\n")]
    UnexpectedPreface,
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// A stream-level error: sent as RST_STREAM, the connection continues.
#[derive(thiserror::Error, Debug)]
#[error("stream error {code} (stream {stream_id}): {reason}")]
pub struct StreamError {
    pub code: ErrorCode,
    pub stream_id: u32,
    pub reason: String,
}

impl StreamError {
    pub fn new(code: ErrorCode, stream_id: u32, reason: impl Into<String>) -> Self {
        Self {
            code,
            stream_id,
            reason: reason.into(),
        }
    }
}
