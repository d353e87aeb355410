//! Ambient per-connection configuration, separated out from `SettingsList`
//! because it governs this implementation's own behavior rather than
//! values negotiated with the peer.

/// `PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n`, the fixed connection preface every
/// client must send first (RFC 7540 §3.5).
pub const CONNECTION_PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

#[derive(Debug, Clone)]
pub struct Config {
    /// Advertised in the server's opening SETTINGS frame as
    /// SETTINGS_MAX_FRAME_SIZE; also the cap this crate applies when
    /// splitting outbound DATA frames.
    pub max_frame_size: u32,
    /// Advertised as SETTINGS_HEADER_TABLE_SIZE and used as the initial
    /// capacity of both HPACK compression contexts.
    pub header_table_size: usize,
    /// Advertised as SETTINGS_MAX_CONCURRENT_STREAMS.
    pub max_concurrent_streams: u32,
    /// Advertised as SETTINGS_INITIAL_WINDOW_SIZE. Flow control windows
    /// are tracked at this level but not enforced by this crate; see
    /// Non-goals.
    pub initial_window_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_frame_size: 16_384,
            header_table_size: crate::hpack::DEFAULT_DYNAMIC_TABLE_SIZE,
            max_concurrent_streams: 128,
            initial_window_size: 65_535,
        }
    }
}
