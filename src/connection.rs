//! The connection engine: one reader loop per connection that drives the
//! frame state machine, owns the stream map and inbound HPACK table
//! outright (no lock, since only this thread touches them), and spawns one
//! handler thread per stream once its header block is complete.

use crate::body::channel as body_channel;
use crate::config::{Config, CONNECTION_PREFACE};
use crate::error::{ConnectionError, ErrorCode, FrameError, ServeError};
use crate::frame::{
    DataPayload, Frame, GoAwayPayload, HeadersPayload, SettingsPayload, WindowUpdatePayload,
};
use crate::handler::{Handler, Outbound, Request, Response};
use crate::hpack;
use crate::settings::SettingsList;
use crate::stream::{Stream, StreamEvent};
use crate::types::{FrameType, NonZeroStreamId, U31_MAX};
use bytes::Bytes;
use log::{debug, trace, warn};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::num::NonZeroU32;
use std::sync::{Arc, Mutex};
use std::thread;

/// Drives one HTTP/2 connection to completion. `reader`/`writer` are
/// independent halves of the same byte stream (e.g. two clones of a
/// `TcpStream`'s file descriptor); the writer is moved behind the shared
/// outbound lock immediately, and the reader loop runs on the calling
/// thread.
pub fn serve<R, W>(
    mut reader: R,
    writer: W,
    config: Config,
    handler: Arc<dyn Handler>,
) -> Result<(), ServeError>
where
    R: Read,
    W: Write + Send + 'static,
{
    consume_preface(&mut reader)?;

    let outbound = Arc::new(Mutex::new(Outbound {
        writer: Box::new(writer),
        encoder: hpack::Encoder::new(config.header_table_size),
    }));

    send_settings_frame(&outbound, &config)
        .map_err(|e| ConnectionError::new(ErrorCode::Internal, 0, e.to_string()))?;

    let mut decoder = hpack::Decoder::new(config.header_table_size);
    let mut settings = SettingsList::default();
    let mut streams: HashMap<NonZeroStreamId, Stream> = HashMap::new();
    let mut last_stream_id: u32 = 0;

    let result = run_loop(
        &mut reader,
        &outbound,
        &config,
        &handler,
        &mut decoder,
        &mut settings,
        &mut streams,
        &mut last_stream_id,
    );

    if let Err(err) = &result {
        if err.code != ErrorCode::NoError || !matches!(err.reason.as_str(), "peer sent GOAWAY") {
            let mut guard = outbound.lock().expect("outbound mutex poisoned");
            let goaway = GoAwayPayload {
                last_stream_id,
                error_code: err.code,
                debug_data: Bytes::copy_from_slice(err.reason.as_bytes()),
            };
            let frame = Frame::new(FrameType::GoAway, 0, 0, encode_goaway(&goaway));
            let _ = frame.write_to(&mut guard.writer);
        }
    }
    result.map_err(ServeError::from)
}

fn encode_goaway(payload: &GoAwayPayload) -> Bytes {
    let mut buf = bytes::BytesMut::with_capacity(8 + payload.debug_data.len());
    buf.extend_from_slice(&payload.last_stream_id.to_be_bytes());
    buf.extend_from_slice(&(payload.error_code as u32).to_be_bytes());
    buf.extend_from_slice(&payload.debug_data);
    buf.freeze()
}

/// Reads the fixed 24-octet client preface. A short read surfaces as a
/// plain I/O error; a full-length read that doesn't match is
/// `ServeError::UnexpectedPreface`, a fatal condition distinct from any
/// GOAWAY-bearing connection error since the peer may not be speaking
/// HTTP/2 at all (spec §4.7, §7, testable property 7).
fn consume_preface(reader: &mut impl Read) -> Result<(), ServeError> {
    let mut buf = [0u8; 24];
    debug_assert_eq!(CONNECTION_PREFACE.len(), 24);
    reader.read_exact(&mut buf)?;
    if buf != *CONNECTION_PREFACE {
        return Err(ServeError::UnexpectedPreface);
    }
    Ok(())
}

fn send_settings_frame(out: &Arc<Mutex<Outbound>>, config: &Config) -> std::io::Result<()> {
    let mut guard = out.lock().expect("outbound mutex poisoned");
    let payload = SettingsPayload {
        ack: false,
        values: vec![
            (
                crate::types::SettingsParameter::HeaderTableSize,
                config.header_table_size as u32,
            ),
            (
                crate::types::SettingsParameter::MaxFrameSize,
                config.max_frame_size,
            ),
            (
                crate::types::SettingsParameter::MaxConcurrentStreams,
                config.max_concurrent_streams,
            ),
            (
                crate::types::SettingsParameter::InitialWindowSize,
                config.initial_window_size,
            ),
        ],
    };
    payload.encode().write_to(&mut guard.writer)
}

fn send_settings_ack(out: &Arc<Mutex<Outbound>>) -> std::io::Result<()> {
    let mut guard = out.lock().expect("outbound mutex poisoned");
    SettingsPayload {
        ack: true,
        values: Vec::new(),
    }
    .encode()
    .write_to(&mut guard.writer)
}

fn send_rst_stream(out: &Arc<Mutex<Outbound>>, stream_id: u32, code: ErrorCode) {
    let mut guard = out.lock().expect("outbound mutex poisoned");
    let mut buf = bytes::BytesMut::with_capacity(4);
    buf.extend_from_slice(&(code as u32).to_be_bytes());
    let frame = Frame::new(FrameType::ResetStream, 0, stream_id, buf.freeze());
    let _ = frame.write_to(&mut guard.writer);
}

#[allow(clippy::too_many_arguments)]
fn run_loop<R: Read>(
    reader: &mut R,
    outbound: &Arc<Mutex<Outbound>>,
    config: &Config,
    handler: &Arc<dyn Handler>,
    decoder: &mut hpack::Decoder,
    settings: &mut SettingsList,
    streams: &mut HashMap<NonZeroStreamId, Stream>,
    last_stream_id: &mut u32,
) -> Result<(), ConnectionError> {
    loop {
        let frame = match Frame::read_from(reader) {
            Ok(frame) => frame,
            Err(FrameError::Io(e))
                if matches!(
                    e.kind(),
                    std::io::ErrorKind::UnexpectedEof | std::io::ErrorKind::ConnectionReset
                ) =>
            {
                return Ok(());
            }
            Err(e) => {
                return Err(ConnectionError::new(
                    ErrorCode::Protocol,
                    *last_stream_id,
                    e.to_string(),
                ))
            }
        };

        if frame.header.length > config.max_frame_size {
            return Err(ConnectionError::new(
                ErrorCode::FrameSize,
                *last_stream_id,
                "frame exceeds locally advertised MAX_FRAME_SIZE",
            ));
        }

        let Some(typ) = frame.header.typ() else {
            trace!("discarding unknown frame type {}", frame.header.type_byte);
            continue;
        };

        match typ {
            FrameType::Settings => {
                let payload = SettingsPayload::decode(&frame).map_err(|e| {
                    ConnectionError::new(ErrorCode::FrameSize, *last_stream_id, e.to_string())
                })?;
                if payload.ack {
                    continue;
                }
                settings.apply_all(&payload.values);
                if payload
                    .values
                    .iter()
                    .any(|(param, _)| *param == crate::types::SettingsParameter::HeaderTableSize)
                {
                    // RFC 7541 §4.2: the peer's SETTINGS_HEADER_TABLE_SIZE
                    // bounds the dynamic table *this side's encoder* may
                    // use for entries it sends, since the peer's decoder
                    // is only obligated to keep that much room.
                    let new_size = settings.get(crate::types::SettingsParameter::HeaderTableSize);
                    debug!("peer's SETTINGS_HEADER_TABLE_SIZE is now {new_size}; resizing outbound HPACK table");
                    let mut guard = outbound.lock().expect("outbound mutex poisoned");
                    guard.encoder.set_max_size(new_size as usize);
                }
                send_settings_ack(outbound).map_err(|e| {
                    ConnectionError::new(ErrorCode::Internal, *last_stream_id, e.to_string())
                })?;
            }
            FrameType::Headers => {
                handle_headers(
                    &frame,
                    outbound,
                    config,
                    handler,
                    decoder,
                    streams,
                    last_stream_id,
                )?;
            }
            FrameType::Data => {
                handle_data(&frame, outbound, streams, last_stream_id)?;
            }
            FrameType::WindowUpdate => {
                let payload = WindowUpdatePayload::decode(&frame).map_err(|e| {
                    ConnectionError::new(ErrorCode::FrameSize, *last_stream_id, e.to_string())
                })?;
                debug!(
                    "peer can receive {} more octets on stream {}",
                    payload.increment, frame.header.stream_id
                );
            }
            FrameType::GoAway => {
                return Err(ConnectionError::new(
                    ErrorCode::NoError,
                    *last_stream_id,
                    "peer sent GOAWAY",
                ));
            }
            FrameType::ResetStream => {
                if let Some(id) = NonZeroStreamId::new(frame.header.stream_id) {
                    if let Some(stream) = streams.get_mut(&id) {
                        let _ = stream.transition(StreamEvent::ReceivedResetStream);
                        debug_assert!(stream.is_closed(), "RST_STREAM always transitions to Closed");
                        if let Some(body) = stream.body.take() {
                            body.close();
                        }
                    }
                }
            }
            FrameType::Priority
            | FrameType::Ping
            | FrameType::PushPromise
            | FrameType::Continuation => {
                trace!("frame type {:?} is not acted on by this engine", typ);
            }
        }

        if frame.header.stream_id != 0 {
            *last_stream_id = frame.header.stream_id.max(*last_stream_id);
        }
    }
}

fn handle_headers(
    frame: &Frame,
    outbound: &Arc<Mutex<Outbound>>,
    config: &Config,
    handler: &Arc<dyn Handler>,
    decoder: &mut hpack::Decoder,
    streams: &mut HashMap<NonZeroStreamId, Stream>,
    last_stream_id: &mut u32,
) -> Result<(), ConnectionError> {
    let id = NonZeroStreamId::new(frame.header.stream_id).ok_or_else(|| {
        ConnectionError::new(ErrorCode::Protocol, *last_stream_id, "HEADERS on stream 0")
    })?;
    if id.get() % 2 == 0 {
        return Err(ConnectionError::new(
            ErrorCode::Protocol,
            *last_stream_id,
            "HEADERS on an even (server-initiated) stream id from a client",
        ));
    }
    if !streams.contains_key(&id) && id.get() <= *last_stream_id {
        // A brand-new stream id must be numerically greater than every
        // prior id seen from this peer (spec §3 "Stream identifier").
        return Err(ConnectionError::new(
            ErrorCode::Protocol,
            *last_stream_id,
            format!("stream id {id} reuses or reorders a prior stream id"),
        ));
    }
    let payload = HeadersPayload::decode(frame)
        .map_err(|e| ConnectionError::new(ErrorCode::FrameSize, *last_stream_id, e.to_string()))?;

    let stream = streams.entry(id).or_insert_with(|| Stream::new(id));
    if let Err(err) = stream.transition(StreamEvent::ReceivedHeaders) {
        send_rst_stream(outbound, id.get(), err.code);
        return Ok(());
    }
    stream.dependency = payload.dependency;
    stream.exclusive = payload.exclusive;
    stream.weight = payload.weight;

    let headers = decoder.decode(&payload.fragment).map_err(|e| {
        ConnectionError::new(ErrorCode::Compression, *last_stream_id, e.to_string())
    })?;
    stream.headers.extend(headers);

    let crate::flags::Flags::Headers(headers_flags) = frame.flags() else {
        unreachable!("frame.header.typ() was already matched as FrameType::Headers")
    };
    let end_stream = headers_flags.contains(crate::flags::HeadersFlags::END_STREAM);
    let end_headers = headers_flags.contains(crate::flags::HeadersFlags::END_HEADERS);

    if !end_headers {
        // CONTINUATION is not implemented; a header block split across
        // frames can never be completed. Per the resolved source
        // ambiguity (spec §9 Open Questions), this is a Protocol error,
        // not Compression.
        return Err(ConnectionError::new(
            ErrorCode::Protocol,
            *last_stream_id,
            "HEADERS without END_HEADERS (CONTINUATION unsupported)",
        ));
    }

    let (body_tx, body_rx) = body_channel();
    if end_stream {
        if let Err(err) = stream.transition(StreamEvent::ReceivedEndStream) {
            send_rst_stream(outbound, id.get(), err.code);
            return Ok(());
        }
        body_tx.close();
    } else {
        stream.body = Some(body_tx);
    }
    stream.headers_closed = true;

    let request = Request {
        headers: stream.headers.clone(),
        body: body_rx,
    };
    let response = Response::new(id.get(), outbound.clone(), config.max_frame_size);
    let handler = handler.clone();
    thread::spawn(move || {
        let mut response = response;
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            handler.handle(request, &mut response);
        }));
        if outcome.is_err() {
            warn!("handler for stream {} panicked", id);
            response.abort_on_panic();
        }
    });

    Ok(())
}

fn handle_data(
    frame: &Frame,
    outbound: &Arc<Mutex<Outbound>>,
    streams: &mut HashMap<NonZeroStreamId, Stream>,
    last_stream_id: &mut u32,
) -> Result<(), ConnectionError> {
    let id = NonZeroStreamId::new(frame.header.stream_id).ok_or_else(|| {
        ConnectionError::new(ErrorCode::Protocol, *last_stream_id, "DATA on stream 0")
    })?;
    let payload = DataPayload::decode(frame)
        .map_err(|e| ConnectionError::new(ErrorCode::FrameSize, *last_stream_id, e.to_string()))?;

    let Some(stream) = streams.get_mut(&id) else {
        send_rst_stream(outbound, id.get(), ErrorCode::StreamClosed);
        return Ok(());
    };

    let Some(body) = stream.body.as_ref() else {
        warn!("DATA on stream {id} with no open body (already closed)");
        send_rst_stream(outbound, id.get(), ErrorCode::StreamClosed);
        return Ok(());
    };
    body.write(&payload.data);

    let crate::flags::Flags::Data(data_flags) = frame.flags() else {
        unreachable!("frame.header.typ() was already matched as FrameType::Data")
    };
    let end_stream = data_flags.contains(crate::flags::DataFlags::END_STREAM);
    if end_stream {
        if let Err(err) = stream.transition(StreamEvent::ReceivedEndStream) {
            send_rst_stream(outbound, id.get(), err.code);
            return Ok(());
        }
        if let Some(body) = stream.body.take() {
            body.close();
        }
    }
    Ok(())
}

/// The window increment this crate reports back to peers: since flow
/// control is not enforced (see Non-goals), the server always grants the
/// largest legal window rather than tracking real consumption.
pub const UNBOUNDED_WINDOW_INCREMENT: NonZeroU32 = U31_MAX;
