//! Requests and responses exchanged with the transport.

use bytes::Bytes;

/// A segment request handed to the transport.
///
/// `token` identifies the fetch task the request belongs to; the transport
/// must echo it back on the matching [`Response`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    /// Task that sent the request.
    pub token: u32,
    /// Requested segment number.
    pub segment: u64,
    /// Set on every transmission after the first.
    pub retransmission: bool,
}

impl Request {
    /// First request for `segment`.
    pub fn new(token: u32, segment: u64) -> Self {
        Self {
            token,
            segment,
            retransmission: false,
        }
    }

    /// Repeated request for `segment` after a timeout.
    pub fn retransmit(token: u32, segment: u64) -> Self {
        Self {
            token,
            segment,
            retransmission: true,
        }
    }

    /// Answer this request with `payload`.
    pub fn respond(&self, payload: Bytes) -> Response {
        Response {
            token: self.token,
            segment: self.segment,
            congestion_mark: false,
            payload,
        }
    }
}

/// A segment response pulled off the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Token echoed from the request.
    pub token: u32,
    /// Segment number echoed from the request.
    pub segment: u64,
    /// The path signalled congestion while carrying this response.
    pub congestion_mark: bool,
    /// Segment contents.
    pub payload: Bytes,
}

impl Response {
    /// Set the congestion mark.
    pub fn with_congestion_mark(mut self) -> Self {
        self.congestion_mark = true;
        self
    }
}
