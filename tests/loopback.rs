//! End-to-end scenarios driven over a loopback Unix socket pair: one side
//! runs the real connection engine, the other plays a minimal HTTP/2
//! client by hand, using the `hpack` crate (a different implementation)
//! to build/parse header blocks so the test exercises wire compatibility
//! rather than symmetry with this crate's own encoder.

use http2_core::{refuse, serve, Config, FuncHandler, Handler, Request, Response};
use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

const PREFACE: &[u8] = b"PRI * HTTP/2.0\r\n\r\nSM\r\n\r\n";

fn write_frame(stream: &mut UnixStream, typ: u8, flags: u8, stream_id: u32, payload: &[u8]) {
    let mut header = [0u8; 9];
    let len = payload.len() as u32;
    header[0] = (len >> 16) as u8;
    header[1] = (len >> 8) as u8;
    header[2] = len as u8;
    header[3] = typ;
    header[4] = flags;
    header[5..9].copy_from_slice(&(stream_id & 0x7fff_ffff).to_be_bytes());
    stream.write_all(&header).unwrap();
    stream.write_all(payload).unwrap();
}

fn read_frame(stream: &mut UnixStream) -> (u8, u8, u32, Vec<u8>) {
    let mut header = [0u8; 9];
    stream.read_exact(&mut header).unwrap();
    let len = ((header[0] as usize) << 16) | ((header[1] as usize) << 8) | header[2] as usize;
    let typ = header[3];
    let flags = header[4];
    let stream_id = u32::from_be_bytes([header[5], header[6], header[7], header[8]]) & 0x7fff_ffff;
    let mut payload = vec![0u8; len];
    stream.read_exact(&mut payload).unwrap();
    (typ, flags, stream_id, payload)
}

/// Reads frames, skipping SETTINGS and WINDOW_UPDATE, until it finds one
/// of the given types.
fn read_until(stream: &mut UnixStream, wanted: &[u8]) -> (u8, u8, u32, Vec<u8>) {
    loop {
        let frame = read_frame(stream);
        if wanted.contains(&frame.0) {
            return frame;
        }
    }
}

fn spawn_server(handler: Arc<dyn Handler>) -> (UnixStream, thread::JoinHandle<()>) {
    let (client, server) = UnixStream::pair().unwrap();
    let reader = server.try_clone().unwrap();
    let join = thread::spawn(move || {
        let _ = serve(reader, server, Config::default(), handler);
    });
    (client, join)
}

fn encode_headers(pairs: &[(&str, &str)]) -> Vec<u8> {
    let mut encoder = hpack::Encoder::new();
    encoder.encode(pairs.iter().map(|(k, v)| (k.as_bytes(), v.as_bytes())))
}

fn decode_headers(data: &[u8]) -> Vec<(String, String)> {
    let mut decoder = hpack::Decoder::new();
    decoder
        .decode(data)
        .unwrap()
        .into_iter()
        .map(|(k, v)| {
            (
                String::from_utf8(k).unwrap(),
                String::from_utf8(v).unwrap(),
            )
        })
        .collect()
}

#[test]
fn empty_get_returns_status_from_handler() {
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(|_req: Request, resp: &mut Response| {
        resp.set_status(204);
    }));
    let (mut client, _join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    let request_headers = encode_headers(&[
        (":method", "GET"),
        (":path", "/"),
        (":scheme", "http"),
        (":authority", "localhost"),
    ]);
    write_frame(&mut client, 1, 0x05, 1, &request_headers); // END_STREAM|END_HEADERS

    let (typ, _flags, sid, payload) = read_until(&mut client, &[1]);
    assert_eq!(typ, 1);
    assert_eq!(sid, 1);
    let headers = decode_headers(&payload);
    assert!(headers.iter().any(|(k, v)| k == ":status" && v == "204"));
}

#[test]
fn post_with_body_is_delivered_to_handler() {
    let (body_tx, body_rx) = mpsc::channel();
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(move |mut req: Request, resp: &mut Response| {
        let mut body = Vec::new();
        req.body.read_to_end(&mut body).unwrap();
        body_tx.send(body).unwrap();
        resp.set_status(200);
    }));
    let (mut client, _join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    let request_headers = encode_headers(&[
        (":method", "POST"),
        (":path", "/echo"),
        (":scheme", "http"),
        (":authority", "localhost"),
    ]);
    write_frame(&mut client, 1, 0x04, 1, &request_headers); // END_HEADERS only
    write_frame(&mut client, 0, 0x01, 1, b"hello, world"); // DATA, END_STREAM

    let body = body_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    assert_eq!(body, b"hello, world");

    let (typ, _, sid, payload) = read_until(&mut client, &[1]);
    assert_eq!((typ, sid), (1, 1));
    let headers = decode_headers(&payload);
    assert!(headers.iter().any(|(k, v)| k == ":status" && v == "200"));
}

#[test]
fn padded_data_frame_is_stripped_before_reaching_handler() {
    let (body_tx, body_rx) = mpsc::channel();
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(move |mut req: Request, resp: &mut Response| {
        let mut body = Vec::new();
        req.body.read_to_end(&mut body).unwrap();
        body_tx.send(body).unwrap();
        resp.set_status(200);
    }));
    let (mut client, _join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    let request_headers = encode_headers(&[
        (":method", "POST"),
        (":path", "/"),
        (":scheme", "http"),
        (":authority", "localhost"),
    ]);
    write_frame(&mut client, 1, 0x04, 1, &request_headers);

    // PADDED DATA frame: 1 pad-length octet + payload + padding octets.
    let mut padded = vec![3u8]; // 3 octets of padding
    padded.extend_from_slice(b"abc");
    padded.extend_from_slice(&[0, 0, 0]);
    write_frame(&mut client, 0, 0x08 | 0x01, 1, &padded); // PADDED|END_STREAM

    let body = body_rx.recv_timeout(std::time::Duration::from_secs(5)).unwrap();
    assert_eq!(body, b"abc");
}

#[test]
fn dynamic_table_indexing_persists_across_requests_on_one_connection() {
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(|_req: Request, resp: &mut Response| {
        resp.set_status(200);
    }));
    let (mut client, _join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    let headers = [
        (":method", "GET"),
        (":path", "/"),
        (":scheme", "http"),
        (":authority", "localhost"),
        ("x-session", "abc123"),
    ];
    for sid in [1u32, 3u32] {
        let mut encoder = hpack::Encoder::new();
        let block = encoder.encode(headers.iter().map(|(k, v)| (k.as_bytes(), v.as_bytes())));
        write_frame(&mut client, 1, 0x05, sid, &block);
        let (typ, _, got_sid, payload) = read_until(&mut client, &[1]);
        assert_eq!((typ, got_sid), (1, sid));
        let decoded = decode_headers(&payload);
        assert!(decoded.iter().any(|(k, v)| k == ":status" && v == "200"));
    }
}

#[test]
fn peer_header_table_size_update_shrinks_outbound_encoder_table() {
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(|_req: Request, resp: &mut Response| {
        resp.set_status(200);
        // Not present in the static table, so reuse across responses can
        // only come from this side's dynamic table.
        resp.set_header("x-cache-me", "same-value-every-time");
    }));
    let (mut client, _join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    // SETTINGS_HEADER_TABLE_SIZE = 0: the peer has no room for any
    // dynamic-table entry this side might otherwise send.
    let mut settings_payload = Vec::new();
    settings_payload.extend_from_slice(&1u16.to_be_bytes());
    settings_payload.extend_from_slice(&0u32.to_be_bytes());
    write_frame(&mut client, 4, 0x00, 0, &settings_payload);

    let request_headers = encode_headers(&[
        (":method", "GET"),
        (":path", "/"),
        (":scheme", "http"),
        (":authority", "localhost"),
    ]);
    let mut block_lens = Vec::new();
    for sid in [1u32, 3u32] {
        write_frame(&mut client, 1, 0x05, sid, &request_headers);
        let (typ, _, got_sid, payload) = read_until(&mut client, &[1]);
        assert_eq!((typ, got_sid), (1, sid));
        block_lens.push(payload.len());
    }
    // Without honoring the size update, the second response would be
    // shorter (an Indexed reference to the now-cached `x-cache-me`
    // entry). With the outbound table capped at zero, both responses
    // must encode the literal header in full.
    assert_eq!(block_lens[0], block_lens[1]);
}

#[test]
fn headers_without_end_headers_triggers_goaway() {
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(|_req: Request, resp: &mut Response| {
        resp.set_status(200);
    }));
    let (mut client, join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    let request_headers = encode_headers(&[(":method", "GET"), (":path", "/")]);
    // END_HEADERS (bit 2) deliberately not set: CONTINUATION is unsupported.
    write_frame(&mut client, 1, 0x00, 1, &request_headers);

    let (typ, _, _, _) = read_until(&mut client, &[7]);
    assert_eq!(typ, 7); // GOAWAY
    join.join().unwrap();
}

#[test]
fn handler_returning_without_touching_response_is_converted_to_500() {
    // Never calls set_status/set_header/write — distinct from the S2
    // scenario, which explicitly chooses 200 with no body.
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(|_req: Request, _resp: &mut Response| {}));
    let (mut client, _join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    let request_headers = encode_headers(&[
        (":method", "GET"),
        (":path", "/"),
        (":scheme", "http"),
        (":authority", "localhost"),
    ]);
    write_frame(&mut client, 1, 0x05, 1, &request_headers); // END_STREAM|END_HEADERS

    let (typ, _, sid, payload) = read_until(&mut client, &[1]);
    assert_eq!((typ, sid), (1, 1));
    let headers = decode_headers(&payload);
    assert!(headers.iter().any(|(k, v)| k == ":status" && v == "500"));
}

#[test]
fn panicking_handler_is_converted_to_500() {
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(|_req: Request, _resp: &mut Response| {
        panic!("handler blew up before writing anything");
    }));
    let (mut client, _join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    let request_headers = encode_headers(&[
        (":method", "GET"),
        (":path", "/"),
        (":scheme", "http"),
        (":authority", "localhost"),
    ]);
    write_frame(&mut client, 1, 0x05, 1, &request_headers); // END_STREAM|END_HEADERS

    let (typ, _, sid, payload) = read_until(&mut client, &[1]);
    assert_eq!((typ, sid), (1, 1));
    let headers = decode_headers(&payload);
    assert!(headers.iter().any(|(k, v)| k == ":status" && v == "500"));
}

#[test]
fn handler_refusal_sends_rst_stream_not_a_response() {
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(|_req: Request, resp: &mut Response| {
        resp.reset(refuse(resp.stream_id(), "over capacity"));
    }));
    let (mut client, _join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    let request_headers = encode_headers(&[
        (":method", "GET"),
        (":path", "/"),
        (":scheme", "http"),
        (":authority", "localhost"),
    ]);
    write_frame(&mut client, 1, 0x05, 1, &request_headers); // END_STREAM|END_HEADERS

    let (typ, _, sid, payload) = read_until(&mut client, &[1, 3]);
    assert_eq!(typ, 3); // RST_STREAM, never HEADERS
    assert_eq!(sid, 1);
    assert_eq!(payload.len(), 4);
}

#[test]
fn headers_on_an_even_stream_id_triggers_goaway() {
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(|_req: Request, resp: &mut Response| {
        resp.set_status(200);
    }));
    let (mut client, join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    let request_headers = encode_headers(&[(":method", "GET"), (":path", "/")]);
    write_frame(&mut client, 1, 0x05, 2, &request_headers); // even stream id, client-initiated

    let (typ, _, _, _) = read_until(&mut client, &[7]);
    assert_eq!(typ, 7); // GOAWAY
    join.join().unwrap();
}

#[test]
fn reordered_stream_id_triggers_goaway() {
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(|_req: Request, resp: &mut Response| {
        resp.set_status(200);
    }));
    let (mut client, join) = spawn_server(handler);

    client.write_all(PREFACE).unwrap();
    let request_headers = encode_headers(&[(":method", "GET"), (":path", "/")]);
    write_frame(&mut client, 1, 0x05, 5, &request_headers);
    let _ = read_until(&mut client, &[1]);
    // Stream 3 opened "new" after 5 has already been seen: must be rejected.
    write_frame(&mut client, 1, 0x05, 3, &request_headers);

    let (typ, _, _, _) = read_until(&mut client, &[7]);
    assert_eq!(typ, 7); // GOAWAY
    join.join().unwrap();
}

#[test]
fn bad_preface_is_rejected_without_panicking() {
    let (mut client, server) = UnixStream::pair().unwrap();
    let reader = server.try_clone().unwrap();
    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(|_req: Request, resp: &mut Response| {
        resp.set_status(200);
    }));
    let join = thread::spawn(move || serve(reader, server, Config::default(), handler));

    client.write_all(b"GET / HTTP/1.1\r\n\r\n").unwrap();
    drop(client);

    let result = join.join().unwrap();
    assert!(result.is_err());
}
