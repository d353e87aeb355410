//! A single-producer/single-consumer byte stream carrying one stream's
//! DATA payloads from the connection's reader thread to its handler
//! thread. Generalizes the original `BodyStream` (`bytes.Buffer` guarded
//! by `sync.Mutex`/`sync.Cond`) to the std equivalents.

use std::collections::VecDeque;
use std::io::{self, Read};
use std::sync::{Arc, Condvar, Mutex};

struct Inner {
    buf: VecDeque<u8>,
    closed: bool,
}

struct Shared {
    state: Mutex<Inner>,
    ready: Condvar,
}

/// The handler-facing read half. Blocks on `read` until data is available
/// or the writer half has closed the stream.
#[derive(Clone)]
pub struct BodyReceiver {
    shared: Arc<Shared>,
}

/// The connection-reader-facing write half, fed by incoming DATA frames.
#[derive(Clone)]
pub struct BodySender {
    shared: Arc<Shared>,
}

pub fn channel() -> (BodySender, BodyReceiver) {
    let shared = Arc::new(Shared {
        state: Mutex::new(Inner {
            buf: VecDeque::new(),
            closed: false,
        }),
        ready: Condvar::new(),
    });
    (
        BodySender {
            shared: shared.clone(),
        },
        BodyReceiver { shared },
    )
}

impl BodySender {
    /// Appends bytes from a DATA frame payload to the stream.
    pub fn write(&self, data: &[u8]) {
        let mut inner = self.shared.state.lock().expect("body stream mutex poisoned");
        inner.buf.extend(data);
        drop(inner);
        self.shared.ready.notify_one();
    }

    /// Marks the body complete. Corresponds to receiving END_STREAM.
    pub fn close(&self) {
        let mut inner = self.shared.state.lock().expect("body stream mutex poisoned");
        inner.closed = true;
        drop(inner);
        self.shared.ready.notify_one();
    }
}

impl Read for BodyReceiver {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let mut inner = self.shared.state.lock().expect("body stream mutex poisoned");
        while inner.buf.is_empty() && !inner.closed {
            inner = self
                .shared
                .ready
                .wait(inner)
                .expect("body stream mutex poisoned");
        }
        if inner.buf.is_empty() {
            return Ok(0);
        }
        let n = inner.buf.len().min(out.len());
        for slot in out.iter_mut().take(n) {
            *slot = inner.buf.pop_front().expect("checked len above");
        }
        Ok(n)
    }
}
