//! A minimal handler that echoes the request body back as the response
//! body, and mirrors the request headers as `x-echo-<name>` response
//! headers. Run against any HTTP/2 prior-knowledge (h2c) client.

use http2_core::{Config, FuncHandler, Handler, Request, Response};
use std::io::Read;
use std::net::TcpListener;
use std::sync::Arc;

fn handle(mut req: Request, resp: &mut Response) {
    for (name, value) in &req.headers {
        if name.starts_with(':') {
            continue;
        }
        resp.set_header(format!("x-echo-{name}"), value.clone());
    }
    resp.set_status(200);

    let mut body = Vec::new();
    if req.body.read_to_end(&mut body).is_err() {
        resp.set_status(500);
        return;
    }
    if let Err(e) = resp.write(&body) {
        log::warn!("failed writing response body: {e}");
    }
}

fn main() {
    env_logger::init();

    let addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:8080".to_owned());
    let listener = TcpListener::bind(&addr).expect("bind echo server address");
    log::info!("listening on {addr}");

    let handler: Arc<dyn Handler> = Arc::new(FuncHandler(handle));

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                log::warn!("accept failed: {e}");
                continue;
            }
        };
        let handler = handler.clone();
        std::thread::spawn(move || {
            let reader = match stream.try_clone() {
                Ok(s) => s,
                Err(e) => {
                    log::warn!("failed to clone socket: {e}");
                    return;
                }
            };
            if let Err(e) = http2_core::serve(reader, stream, Config::default(), handler) {
                log::warn!("connection ended: {e}");
            }
        });
    }
}
