use bitflags::bitflags;

bitflags! {
    /// https://httpwg.org/specs/rfc7540.html#DATA
    #[repr(transparent)]
    pub struct DataFlags: u8 {
        /// This frame is the last the sender will emit for the stream.
        const END_STREAM = 0x1;
        /// The Pad Length field and trailing padding are present.
        const PADDED = 0x8;
    }

    /// https://httpwg.org/specs/rfc7540.html#HEADERS
    #[repr(transparent)]
    pub struct HeadersFlags: u8 {
        /// This frame is the last the sender will emit for the stream.
        const END_STREAM = 0x1;
        /// The header block is complete; no CONTINUATION follows.
        /// CONTINUATION is not implemented by this crate — a HEADERS frame
        /// without this flag set is a protocol error as soon as any other
        /// frame is observed on the connection (see `connection::Engine`).
        const END_HEADERS = 0x4;
        /// The Pad Length field and trailing padding are present.
        const PADDED = 0x8;
        /// The Exclusive/Stream Dependency/Weight fields are present.
        const PRIORITY = 0x20;
    }

    /// https://httpwg.org/specs/rfc7540.html#SETTINGS
    #[repr(transparent)]
    pub struct SettingsFlags: u8 {
        /// This frame acknowledges the peer's SETTINGS; payload MUST be empty.
        const ACK = 0x1;
    }
}

/// The flags belonging to a specific frame type, recovered once the
/// frame's `FrameType` is known. Unifies the otherwise-untyped `u8` on the
/// wire so stream-state transitions can match on it directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::From)]
pub enum Flags {
    Data(DataFlags),
    Headers(HeadersFlags),
    Settings(SettingsFlags),
    /// Frame types that carry no flags meaningful to the state machine
    /// (PRIORITY, RST_STREAM, PING, GOAWAY, WINDOW_UPDATE) or frame types
    /// this crate does not implement (PUSH_PROMISE, CONTINUATION).
    None,
}
