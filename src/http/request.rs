//! Request types: the wire-level HTTP/1.1 [`Request`] parsed with [`httparse`],
//! and the [`RequestDescriptor`] the caching layer classifies and serves.

use bytes::Bytes;
use thiserror::Error;
use url::Url;

use super::{Headers, Method};

/// Errors that can occur while parsing an HTTP/1.1 request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request is incomplete, more data needed")]
    Incomplete,

    #[error("HTTP parse error: {0}")]
    Parse(#[from] httparse::Error),

    #[error("missing required field: {field}")]
    MissingField { field: &'static str },

    #[error("invalid request target `{target}`: {source}")]
    InvalidTarget {
        target: String,
        #[source]
        source: url::ParseError,
    },
}

/// A parsed HTTP/1.1 request as received by the proxy.
///
/// Created by [`Request::parse`] from a raw byte buffer. The body is attached
/// separately with [`Request::with_body`] once `Content-Length` bytes have
/// arrived.
///
/// # Examples
///
/// ```
/// use reelcache::http::Request;
///
/// let raw = b"GET http://archive.org/metadata/reel HTTP/1.1\r\nHost: archive.org\r\n\r\n";
/// let (request, _offset) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.method().as_str(), "GET");
/// assert!(request.is_absolute_form());
/// assert_eq!(request.headers().get("host"), Some("archive.org"));
/// ```
#[derive(Debug)]
pub struct Request {
    method: Method,
    target: String,
    /// HTTP minor version: 0 for HTTP/1.0, 1 for HTTP/1.1.
    version: u8,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// Maximum number of headers we support per request.
    const MAX_HEADERS: usize = 64;

    /// Parse the request line and headers from a byte slice.
    ///
    /// Returns the parsed `Request` and the byte offset at which the body begins
    /// in `buf` (i.e. immediately after the `\r\n\r\n` header terminator).
    ///
    /// # Errors
    ///
    /// - [`RequestError::Incomplete`]: more data is needed to complete the request headers.
    /// - [`RequestError::Parse`]: the data is malformed and cannot be parsed.
    /// - [`RequestError::MissingField`]: a required field (method, path, version) is absent.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut headers = [httparse::EMPTY_HEADER; Self::MAX_HEADERS];
        let mut raw_req = httparse::Request::new(&mut headers);

        let body_offset = match raw_req.parse(buf)? {
            httparse::Status::Complete(offset) => offset,
            httparse::Status::Partial => return Err(RequestError::Incomplete),
        };

        let method = match raw_req.method {
            Some(m) => m.parse::<Method>().unwrap_or_else(|never| match never {}),
            None => return Err(RequestError::MissingField { field: "method" }),
        };

        let target = raw_req
            .path
            .ok_or(RequestError::MissingField { field: "path" })?
            .to_owned();

        let version = raw_req
            .version
            .ok_or(RequestError::MissingField { field: "version" })?;

        let mut header_map = Headers::with_capacity(raw_req.headers.len());
        for header in raw_req.headers.iter() {
            if let Ok(value) = std::str::from_utf8(header.value) {
                header_map.insert(header.name, value);
            }
        }

        Ok((
            Self {
                method,
                target,
                version,
                headers: header_map,
                body: Bytes::new(),
            },
            body_offset,
        ))
    }

    /// Attaches the request body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = body;
        self
    }

    /// Returns the HTTP method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the raw request target exactly as sent.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Returns the path of an origin-form target (without the query string).
    ///
    /// Absolute-form targets return the whole target.
    pub fn path(&self) -> &str {
        match self.target.find('?') {
            Some(pos) if !self.is_absolute_form() => &self.target[..pos],
            _ => &self.target,
        }
    }

    /// Returns `true` when the target is a full URL, as sent to a forward proxy.
    pub fn is_absolute_form(&self) -> bool {
        !self.target.starts_with('/')
    }

    /// Returns the HTTP minor version number (0 = HTTP/1.0, 1 = HTTP/1.1).
    pub fn version(&self) -> u8 {
        self.version
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Returns the request body bytes.
    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Returns `true` if the connection should be kept alive after this request.
    ///
    /// HTTP/1.1 defaults to keep-alive. HTTP/1.0 defaults to close unless
    /// `Connection: keep-alive` is explicitly set.
    pub fn is_keep_alive(&self) -> bool {
        match self.headers.get("connection") {
            Some(conn) => conn.eq_ignore_ascii_case("keep-alive"),
            None => self.version == 1,
        }
    }

    /// Returns the value of the `Content-Length` header parsed as a `usize`, if present.
    pub fn content_length(&self) -> Option<usize> {
        self.headers.get("content-length")?.trim().parse().ok()
    }

    /// Converts the wire request into a [`RequestDescriptor`].
    ///
    /// Absolute-form targets are used as-is; origin-form targets are resolved
    /// against `base`, the application origin the proxy fronts.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidTarget`] if the target is not a valid URL.
    pub fn into_descriptor(self, base: &Url) -> Result<RequestDescriptor, RequestError> {
        let parsed = if self.is_absolute_form() {
            Url::parse(&self.target)
        } else {
            base.join(&self.target)
        };
        let url = parsed.map_err(|source| RequestError::InvalidTarget {
            target: self.target.clone(),
            source,
        })?;

        let destination = self
            .headers
            .get("sec-fetch-dest")
            .map(ResourceType::from_fetch_dest)
            .unwrap_or_default();

        Ok(RequestDescriptor {
            method: self.method,
            url: normalize(url),
            destination,
            headers: self.headers,
            body: self.body,
        })
    }
}

/// Coarse resource-type hint, taken from the browser's `Sec-Fetch-Dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ResourceType {
    Document,
    Image,
    Script,
    Style,
    Manifest,
    Font,
    /// Audio, video, or text tracks.
    Media,
    #[default]
    Unknown,
}

impl ResourceType {
    /// Maps a `Sec-Fetch-Dest` value to a hint. Unrecognised values are `Unknown`.
    pub fn from_fetch_dest(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "document" | "iframe" | "frame" => Self::Document,
            "image" => Self::Image,
            "script" | "worker" | "sharedworker" => Self::Script,
            "style" => Self::Style,
            "manifest" => Self::Manifest,
            "font" => Self::Font,
            "video" | "audio" | "track" => Self::Media,
            _ => Self::Unknown,
        }
    }
}

/// An outbound request as seen by the caching layer.
///
/// Immutable once built. The URL is normalized on construction (the fragment
/// is dropped; `url` already lowercases the host and strips default ports), so
/// [`cache_key`](Self::cache_key) is stable across equivalent spellings.
///
/// # Examples
///
/// ```
/// use reelcache::http::{Method, RequestDescriptor, ResourceType};
///
/// let req = RequestDescriptor::get("HTTPS://Archive.org:443/metadata/reel#top")
///     .unwrap()
///     .with_destination(ResourceType::Unknown);
///
/// assert_eq!(req.method(), &Method::Get);
/// assert_eq!(req.cache_key(), "GET https://archive.org/metadata/reel");
/// ```
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    method: Method,
    url: Url,
    destination: ResourceType,
    headers: Headers,
    body: Bytes,
}

impl RequestDescriptor {
    /// Creates a descriptor with no headers and an `Unknown` destination.
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url: normalize(url),
            destination: ResourceType::Unknown,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Parses `url` and creates a GET descriptor.
    pub fn get(url: &str) -> Result<Self, url::ParseError> {
        Ok(Self::new(Method::Get, Url::parse(url)?))
    }

    #[must_use]
    pub fn with_destination(mut self, destination: ResourceType) -> Self {
        self.destination = destination;
        self
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn destination(&self) -> ResourceType {
        self.destination
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    /// Stable identity of the request within a store: method plus normalized URL.
    pub fn cache_key(&self) -> String {
        format!("{} {}", self.method, self.url)
    }

    /// Returns `true` if the request asks for a byte range of the resource.
    pub fn is_ranged(&self) -> bool {
        self.headers.contains("range")
    }

    /// Returns `true` if the request looks like a page load: a document
    /// destination or an `Accept` header that asks for HTML.
    pub fn is_page_load(&self) -> bool {
        self.destination == ResourceType::Document
            || self
                .headers
                .get("accept")
                .is_some_and(|accept| accept.contains("text/html"))
    }
}

fn normalize(mut url: Url) -> Url {
    url.set_fragment(None);
    url
}
