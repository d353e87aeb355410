use crate::body::BodySender;
use crate::error::{ErrorCode, StreamError};
use crate::types::{Headers, NonZeroStreamId};
use log::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StreamState {
    Idle,
    LocalReserved,
    RemoteReserved,
    Open,
    LocalClosed,
    RemoteClosed,
    Closed,
}

/// The four flag-carried events plus the two reset events that drive
/// stream lifecycle transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEvent {
    ReceivedHeaders,
    SentHeaders,
    ReceivedEndStream,
    SentEndStream,
    ReceivedResetStream,
    SentResetStream,
}

impl StreamState {
    /// The state transition table. `None` means the event is a protocol
    /// error in this state; no implicit transitions exist.
    fn apply(self, event: StreamEvent) -> Option<StreamState> {
        use StreamEvent::*;
        use StreamState::*;
        match (self, event) {
            (_, ReceivedResetStream | SentResetStream) if self != Idle => Some(Closed),
            (Idle, ReceivedHeaders) => Some(Open),
            (Idle, SentHeaders) => Some(Open),
            (RemoteReserved, ReceivedHeaders) => Some(LocalClosed),
            (LocalReserved, SentHeaders) => Some(RemoteClosed),
            (Open, ReceivedEndStream) => Some(RemoteClosed),
            (Open, SentEndStream) => Some(LocalClosed),
            (LocalClosed, ReceivedEndStream) => Some(Closed),
            (RemoteClosed, SentEndStream) => Some(Closed),
            _ => None,
        }
    }
}

/// A record per stream id. Owned exclusively by the connection's stream
/// map; never shared behind a lock. The handler thread reaches the body
/// stream through its own `BodyReceiver` clone taken at spawn time, so it
/// needs no further access to this struct once dispatched.
pub struct Stream {
    pub id: NonZeroStreamId,
    pub state: StreamState,
    pub headers: Headers,
    pub headers_closed: bool,
    pub body: Option<BodySender>,
    pub dependency: Option<u32>,
    pub exclusive: Option<bool>,
    pub weight: Option<u8>,
}

impl Stream {
    pub fn new(id: NonZeroStreamId) -> Self {
        Self {
            id,
            state: StreamState::Idle,
            headers: Headers::new(),
            headers_closed: false,
            body: None,
            dependency: None,
            exclusive: None,
            weight: None,
        }
    }

    /// Applies a lifecycle event, returning a stream error if the event is
    /// illegal for the current state (spec invariant: every (state,
    /// event) pair is either in the table or rejected).
    pub fn transition(&mut self, event: StreamEvent) -> Result<(), StreamError> {
        match self.state.apply(event) {
            Some(next) => {
                if next != self.state {
                    trace!("stream {} {:?} -> {:?} ({:?})", self.id, self.state, next, event);
                }
                self.state = next;
                Ok(())
            }
            None => Err(StreamError::new(
                ErrorCode::StreamClosed,
                self.id.get(),
                format!("{:?} is not valid in state {:?}", event, self.state),
            )),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.state == StreamState::Closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroU32;

    fn stream() -> Stream {
        Stream::new(NonZeroU32::new(1).unwrap())
    }

    #[test]
    fn idle_to_open_on_received_headers() {
        let mut s = stream();
        s.transition(StreamEvent::ReceivedHeaders).unwrap();
        assert_eq!(s.state, StreamState::Open);
    }

    #[test]
    fn full_request_response_cycle_reaches_closed() {
        let mut s = stream();
        s.transition(StreamEvent::ReceivedHeaders).unwrap();
        s.transition(StreamEvent::ReceivedEndStream).unwrap();
        assert_eq!(s.state, StreamState::RemoteClosed);
        s.transition(StreamEvent::SentEndStream).unwrap();
        assert_eq!(s.state, StreamState::Closed);
    }

    #[test]
    fn reset_from_any_non_idle_state_closes() {
        let mut s = stream();
        s.transition(StreamEvent::ReceivedHeaders).unwrap();
        s.transition(StreamEvent::ReceivedResetStream).unwrap();
        assert_eq!(s.state, StreamState::Closed);
    }

    #[test]
    fn reset_on_idle_is_a_protocol_error() {
        let mut s = stream();
        assert!(s.transition(StreamEvent::ReceivedResetStream).is_err());
    }

    #[test]
    fn end_stream_before_headers_is_rejected() {
        let mut s = stream();
        assert!(s.transition(StreamEvent::ReceivedEndStream).is_err());
    }

    #[test]
    fn double_end_stream_on_same_side_is_rejected() {
        let mut s = stream();
        s.transition(StreamEvent::ReceivedHeaders).unwrap();
        s.transition(StreamEvent::ReceivedEndStream).unwrap();
        assert!(s.transition(StreamEvent::ReceivedEndStream).is_err());
    }
}
