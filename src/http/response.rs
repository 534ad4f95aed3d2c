//! HTTP response type shared by the network collaborator, the cache stores,
//! and the proxy front-end.
//!
//! Provides a fluent builder API and serialization to HTTP/1.1 wire format.

use bytes::{BufMut, Bytes, BytesMut};

use super::{Headers, StatusCode};

/// An HTTP response: status, headers, and an immutable body.
///
/// Cloning is cheap since the body is a reference-counted [`Bytes`] buffer, which
/// lets a single network response be both stored and returned.
///
/// # Examples
///
/// ```
/// use reelcache::http::{Response, StatusCode};
///
/// let response = Response::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(r#"{"status":"ok"}"#);
///
/// let bytes = response.to_wire(true);
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug, Clone)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Bytes,
}

impl Response {
    /// Creates a new response with the given status and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Creates a response with a serialized JSON body.
    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status)
            .header("Content-Type", "application/json")
            .body(value.to_string())
    }

    /// Appends a response header. Multiple calls with the same name are additive.
    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Replaces the whole header map.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Replaces a header in-place. Used by the proxy to decorate a response
    /// returned by the caching layer.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.set(name, value);
    }

    /// Sets the response body from a string.
    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = Bytes::from(body.into());
        self
    }

    /// Sets the response body from raw bytes.
    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// Returns the status code of this response.
    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body_ref(&self) -> &Bytes {
        &self.body
    }

    /// Byte length of the payload.
    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    /// Serializes the response into HTTP/1.1 wire format.
    ///
    /// Connection-scoped headers carried over from upstream are dropped, then:
    /// - `Content-Type: text/plain; charset=utf-8` is added if the body is
    ///   non-empty and no `Content-Type` header was set.
    /// - `Connection: keep-alive` or `Connection: close` is written.
    /// - `Content-Length: <n>` is always written last.
    pub fn to_wire(&self, keep_alive: bool) -> BytesMut {
        let content_length = self.body.len();
        let estimated_size = 128 + self.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                self.status.as_u16(),
                self.status.canonical_reason()
            )
            .as_bytes(),
        );

        for (name, value) in self.headers.end_to_end() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }

        if content_length > 0 && !self.headers.contains("content-type") {
            buf.put(&b"Content-Type: text/plain; charset=utf-8\r\n"[..]);
        }

        let connection = if keep_alive { "keep-alive" } else { "close" };
        buf.put(format!("Connection: {connection}\r\n").as_bytes());
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());

        buf.put(&b"\r\n"[..]);

        if content_length > 0 {
            buf.put(self.body.as_ref());
        }

        buf
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::OK)
    }
}
