//! The application-facing interface: a `Handler` receives one `Request`
//! per stream and writes a `Response` back. Generalizes the original
//! `Handler`/`FuncHandler`/`Request`/`Response` trio from a client-request
//! builder into the server-side counterpart this crate actually needs.

use crate::body::BodyReceiver;
use crate::error::StreamError;
use crate::error::ErrorCode;
use crate::hpack::Encoder;
use crate::types::{Headers, StreamId};
use bytes::Bytes;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// One incoming request: its header list (including pseudo-headers) and a
/// blocking reader over its DATA payloads.
pub struct Request {
    pub headers: Headers,
    pub body: BodyReceiver,
}

impl Request {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn method(&self) -> Option<&str> {
        self.header(":method")
    }

    pub fn path(&self) -> Option<&str> {
        self.header(":path")
    }
}

/// Writes a response back to the peer. The first call to `write` (or an
/// explicit call to `flush_headers`) sends the HEADERS frame; every
/// subsequent `write` call sends one or more DATA frames capped at the
/// negotiated max frame size. Dropping a `Response` that never wrote a
/// body sends a single empty DATA frame carrying END_STREAM, matching the
/// no-body case called out in the framing layer.
pub struct Response {
    stream_id: StreamId,
    status: u16,
    headers: Headers,
    out: Arc<Mutex<Outbound>>,
    headers_sent: bool,
    max_frame_size: u32,
    ended: bool,
    /// Set the first time the handler calls `set_status`, `set_header`,
    /// or `write` — i.e. the handler actually shaped a response, as
    /// opposed to returning having never touched it at all. Distinguishes
    /// "handler chose 200 with no body" (spec's S2 scenario) from
    /// "handler returned without producing headers" (spec §4.7/§6, which
    /// this crate answers with a 500), since both would otherwise reach
    /// `Drop` with the identical default `status == 200`.
    touched: bool,
}

/// Shared, lock-guarded access to the connection's writer and outgoing
/// HPACK encoder. Every stream's handler thread writes through the same
/// lock so frame bytes are never interleaved mid-frame on the wire.
pub struct Outbound {
    pub writer: Box<dyn Write + Send>,
    pub encoder: Encoder,
}

impl Response {
    pub(crate) fn new(
        stream_id: StreamId,
        out: Arc<Mutex<Outbound>>,
        max_frame_size: u32,
    ) -> Self {
        Self {
            stream_id,
            status: 200,
            headers: Vec::new(),
            out,
            headers_sent: false,
            max_frame_size,
            ended: false,
            touched: false,
        }
    }

    pub fn stream_id(&self) -> StreamId {
        self.stream_id
    }

    pub fn set_status(&mut self, status: u16) {
        self.touched = true;
        self.status = status;
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.touched = true;
        self.headers.push((name.into(), value.into()));
    }

    fn flush_headers(&mut self, end_stream: bool) -> io::Result<()> {
        if self.headers_sent {
            return Ok(());
        }
        let mut headers = vec![(":status".to_owned(), self.status.to_string())];
        headers.extend(self.headers.drain(..));
        let mut guard = self.out.lock().expect("outbound mutex poisoned");
        let block = guard.encoder.encode(&headers);
        let mut flags = 0x04; // END_HEADERS
        if end_stream {
            flags |= 0x01;
        }
        write_frame(
            &mut guard.writer,
            crate::types::FrameType::Headers,
            flags,
            self.stream_id,
            &block,
        )?;
        self.headers_sent = true;
        if end_stream {
            self.ended = true;
        }
        Ok(())
    }

    /// Writes a chunk of the response body, splitting it into DATA frames
    /// no larger than the negotiated max frame size.
    pub fn write(&mut self, data: &[u8]) -> io::Result<()> {
        self.touched = true;
        self.flush_headers(false)?;
        for chunk in data.chunks(self.max_frame_size as usize) {
            let mut guard = self.out.lock().expect("outbound mutex poisoned");
            write_frame(
                &mut guard.writer,
                crate::types::FrameType::Data,
                0,
                self.stream_id,
                chunk,
            )?;
        }
        Ok(())
    }

    /// Sends END_STREAM, either on the HEADERS frame (no body was ever
    /// written) or as a trailing empty DATA frame.
    pub fn finish(&mut self) -> io::Result<()> {
        if self.ended {
            return Ok(());
        }
        if !self.headers_sent {
            self.flush_headers(true)?;
            return Ok(());
        }
        let mut guard = self.out.lock().expect("outbound mutex poisoned");
        write_frame(
            &mut guard.writer,
            crate::types::FrameType::Data,
            0x01,
            self.stream_id,
            &[],
        )?;
        self.ended = true;
        Ok(())
    }

    /// Aborts this stream with RST_STREAM instead of answering it, e.g.
    /// after [`refuse`]. A no-op if the response has already ended (spec
    /// §7: "writing to a closed stream is a stream error StreamClosed").
    pub fn reset(&mut self, err: StreamError) {
        if self.ended {
            return;
        }
        self.send_rst_stream(err.code);
        self.ended = true;
    }

    /// Called when the handler thread panicked. Per the handler contract
    /// (spec §6): if headers were never sent, the panic is converted into
    /// a plain 500 with an empty body; if headers were already on the
    /// wire, the stream is reset instead, since a body cut off mid-write
    /// would otherwise look like a truncated but "complete" response.
    pub(crate) fn abort_on_panic(&mut self) {
        if self.ended {
            return;
        }
        if self.headers_sent {
            self.send_rst_stream(ErrorCode::Internal);
            self.ended = true;
        } else {
            self.status = 500;
            self.headers.clear();
            let _ = self.finish();
        }
    }

    fn send_rst_stream(&self, code: ErrorCode) {
        let mut guard = self.out.lock().expect("outbound mutex poisoned");
        let mut buf = bytes::BytesMut::with_capacity(4);
        buf.extend_from_slice(&(code as u32).to_be_bytes());
        let frame = crate::frame::Frame::new(
            crate::types::FrameType::ResetStream,
            0,
            self.stream_id,
            buf.freeze(),
        );
        let _ = frame.write_to(&mut guard.writer);
    }
}

impl Drop for Response {
    fn drop(&mut self) {
        // A handler that returned without ever calling `set_status`,
        // `set_header`, or `write` produced no response at all (spec
        // §4.7/§6: "a handler returning without producing headers is
        // treated as a 500"), as opposed to one that explicitly chose the
        // default status with an empty body.
        if !self.headers_sent && !self.touched {
            self.status = 500;
        }
        let _ = self.finish();
    }
}

fn write_frame(
    writer: &mut (impl Write + ?Sized),
    typ: crate::types::FrameType,
    flags: u8,
    stream_id: StreamId,
    payload: &[u8],
) -> io::Result<()> {
    crate::frame::Frame::new(typ, flags, stream_id, Bytes::copy_from_slice(payload)).write_to(writer)
}

/// Application code implements `Handler` to process one request per
/// stream; `FuncHandler` adapts a plain closure to the trait, matching the
/// original `Handler`/`FuncHandler` pair.
pub trait Handler: Send + Sync {
    fn handle(&self, req: Request, resp: &mut Response);
}

pub struct FuncHandler<F>(pub F)
where
    F: Fn(Request, &mut Response) + Send + Sync;

impl<F> Handler for FuncHandler<F>
where
    F: Fn(Request, &mut Response) + Send + Sync,
{
    fn handle(&self, req: Request, resp: &mut Response) {
        (self.0)(req, resp)
    }
}

/// Raised by a handler to signal that this stream, specifically, should be
/// aborted with RST_STREAM rather than answered. Pass the result to
/// [`Response::reset`].
pub fn refuse(stream_id: StreamId, reason: impl Into<String>) -> StreamError {
    StreamError::new(ErrorCode::RefusedStream, stream_id, reason)
}
