//! # Request Module
//!
//! [`HttpRequest`] is the per-request object every pipeline stage works on. It wraps
//! the `http` parts, a single-pass [`RequestBody`], and a [`RequestState`] holding
//! read-through caches: the parsed `Content-Type`, the negotiated response format,
//! the parsed form, the bind result and the authenticated principal.
//!
//! ## Body
//!
//! The body can be read once. [`HttpRequest::has_body`] peeks at it without
//! consuming anything, so a later consumer still sees every byte. A
//! [`CancellationToken`] can be attached; once cancelled, every body read fails with
//! `ConnectionAborted` so consumers stop promptly.
//!
//! ## Method helpers
//!
//! [`can_have_body`], [`allows_body`] and [`is_safe`] classify methods the same way
//! the rest of the pipeline does.

use http::header::{CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method, Uri};
use std::io::{self, BufRead, BufReader, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::binder::{BoundParams, FormData};
use crate::errors::ApiError;
use crate::ids::RequestId;
use crate::negotiate::{content_type_from_str, MediaType};
use crate::router::MatchedRoute;
use crate::security::Principal;

/// Header carrying a caller-supplied request id.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `POST`, `PUT`, `PATCH` and `DELETE` may carry a body.
#[inline]
#[must_use]
pub fn can_have_body(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Every method except `HEAD` may have a response body.
#[inline]
#[must_use]
pub fn allows_body(method: &Method) -> bool {
    *method != Method::HEAD
}

/// `GET` and `HEAD` are safe.
#[inline]
#[must_use]
pub fn is_safe(method: &Method) -> bool {
    matches!(*method, Method::GET | Method::HEAD)
}

/// Shared cancellation flag for one request.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Buffered, peekable, single-pass request body.
pub struct RequestBody {
    reader: BufReader<Box<dyn Read + Send>>,
    cancel: Option<CancellationToken>,
}

impl RequestBody {
    pub fn new<R: Read + Send + 'static>(reader: R) -> Self {
        Self {
            reader: BufReader::new(Box::new(reader)),
            cancel: None,
        }
    }

    #[must_use]
    pub fn empty() -> Self {
        Self::new(io::empty())
    }

    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self::new(io::Cursor::new(bytes))
    }

    pub fn set_cancellation(&mut self, token: CancellationToken) {
        self.cancel = Some(token);
    }

    fn check_cancelled(&self) -> io::Result<()> {
        match &self.cancel {
            Some(token) if token.is_cancelled() => Err(io::Error::new(
                io::ErrorKind::ConnectionAborted,
                "request cancelled",
            )),
            _ => Ok(()),
        }
    }

    /// Whether at least one more byte can be read, without consuming it.
    pub fn peek_has_data(&mut self) -> io::Result<bool> {
        self.check_cancelled()?;
        Ok(!self.reader.fill_buf()?.is_empty())
    }
}

impl Read for RequestBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.check_cancelled()?;
        self.reader.read(buf)
    }
}

impl std::fmt::Debug for RequestBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestBody")
            .field("buffered", &self.reader.buffer().len())
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

/// Per-request caches. Each field is filled on first successful computation.
#[derive(Debug, Default)]
pub struct RequestState {
    pub(crate) request_id: RequestId,
    pub(crate) route: Option<MatchedRoute>,
    pub(crate) content_type: Option<MediaType>,
    pub(crate) response_format: Option<String>,
    pub(crate) form: Option<Result<Arc<FormData>, String>>,
    pub(crate) bound: Option<Result<BoundParams, ApiError>>,
    pub(crate) principal: Option<Principal>,
    /// `WWW-Authenticate` challenges to send with a 401.
    pub(crate) challenges: Vec<String>,
}

impl RequestState {
    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.request_id
    }

    #[must_use]
    pub fn route(&self) -> Option<&MatchedRoute> {
        self.route.as_ref()
    }

    #[must_use]
    pub fn content_type(&self) -> Option<&MediaType> {
        self.content_type.as_ref()
    }

    #[must_use]
    pub fn response_format(&self) -> Option<&str> {
        self.response_format.as_deref()
    }

    #[must_use]
    pub fn principal(&self) -> Option<&Principal> {
        self.principal.as_ref()
    }

    #[must_use]
    pub fn challenges(&self) -> &[String] {
        &self.challenges
    }
}

/// An inbound request plus its per-request state.
#[derive(Debug)]
pub struct HttpRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    body: RequestBody,
    state: RequestState,
}

impl HttpRequest {
    /// Build a request. The id comes from `X-Request-Id` when it holds a valid ULID.
    #[must_use]
    pub fn new(method: Method, uri: Uri, headers: HeaderMap, body: RequestBody) -> Self {
        let request_id = RequestId::from_header_or_new(
            headers
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
        );
        Self {
            method,
            uri,
            headers,
            body,
            state: RequestState {
                request_id,
                ..RequestState::default()
            },
        }
    }

    pub fn from_http<B: Read + Send + 'static>(request: http::Request<B>) -> Self {
        let (parts, body) = request.into_parts();
        Self::new(parts.method, parts.uri, parts.headers, RequestBody::new(body))
    }

    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.body.set_cancellation(token);
        self
    }

    /// Request path without the query string, as sent.
    #[must_use]
    pub fn path(&self) -> &str {
        self.uri.path()
    }

    #[must_use]
    pub fn request_id(&self) -> RequestId {
        self.state.request_id
    }

    #[must_use]
    pub fn state(&self) -> &RequestState {
        &self.state
    }

    pub(crate) fn state_mut(&mut self) -> &mut RequestState {
        &mut self.state
    }

    pub fn body_mut(&mut self) -> &mut RequestBody {
        &mut self.body
    }

    /// First value of a header as UTF-8.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a header, or `None` when it is absent.
    #[must_use]
    pub fn header_values(&self, name: &str) -> Option<Vec<String>> {
        let values: Vec<String> = self
            .headers
            .get_all(name)
            .iter()
            .map(|v| String::from_utf8_lossy(v.as_bytes()).into_owned())
            .collect();
        (!values.is_empty()).then_some(values)
    }

    /// Every value of a query key, or `None` when the key is absent.
    #[must_use]
    pub fn query_values(&self, name: &str) -> Option<Vec<String>> {
        let query = self.uri.query()?;
        let values: Vec<String> = url::form_urlencoded::parse(query.as_bytes())
            .filter(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .collect();
        (!values.is_empty()).then_some(values)
    }

    /// Whether the request carries a body.
    ///
    /// A positive `Content-Length` means yes; any other `Content-Length` means no.
    /// Without the header (chunked or unknown length) the body is peeked.
    pub fn has_body(&mut self) -> bool {
        if let Some(raw) = self.headers.get(CONTENT_LENGTH) {
            return raw
                .to_str()
                .ok()
                .and_then(|s| s.trim().parse::<u64>().ok())
                .is_some_and(|n| n > 0);
        }
        match self.body.peek_has_data() {
            Ok(has_data) => has_data,
            Err(err) => {
                debug!(request_id = %self.state.request_id, error = %err, "Body peek failed");
                false
            }
        }
    }

    /// Parsed `Content-Type`, cached after the first success.
    ///
    /// # Errors
    ///
    /// [`ApiError::Parse`] for a malformed header.
    pub fn content_type(&mut self) -> Result<MediaType, ApiError> {
        if let Some(cached) = &self.state.content_type {
            return Ok(cached.clone());
        }
        let raw = match self.headers.get(CONTENT_TYPE) {
            Some(value) => value.to_str().map_err(|e| ApiError::Parse {
                name: CONTENT_TYPE.as_str().to_string(),
                location: "header".to_string(),
                value: String::from_utf8_lossy(value.as_bytes()).into_owned(),
                reason: e.to_string(),
            })?,
            None => "",
        };
        let parsed = content_type_from_str(raw)?;
        self.state.content_type = Some(parsed.clone());
        Ok(parsed)
    }

    /// The parsed form body. Parsed once; later calls return the same result.
    pub fn form(&mut self, max_memory: u64) -> Result<Arc<FormData>, String> {
        if let Some(cached) = &self.state.form {
            return cached.clone();
        }
        let result = match self.content_type() {
            Ok(media) => {
                let raw = self.header(CONTENT_TYPE.as_str()).unwrap_or_default().to_string();
                crate::binder::parse_form(&media.essence, &raw, &mut self.body, max_memory)
                    .map(Arc::new)
            }
            Err(err) => Err(err.to_string()),
        };
        if let Err(reason) = &result {
            debug!(request_id = %self.state.request_id, reason = %reason, "Form parsing failed");
        }
        self.state.form = Some(result.clone());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::HeaderValue;

    fn request(headers: &[(&str, &str)], body: &[u8]) -> HttpRequest {
        let mut map = HeaderMap::new();
        for (k, v) in headers {
            map.append(
                http::header::HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        HttpRequest::new(
            Method::POST,
            "/pets?tag=a&tag=b&name=x%20y".parse().unwrap(),
            map,
            RequestBody::from_bytes(body.to_vec()),
        )
    }

    #[test]
    fn test_method_helpers() {
        assert!(can_have_body(&Method::DELETE));
        assert!(!can_have_body(&Method::GET));
        assert!(allows_body(&Method::GET));
        assert!(!allows_body(&Method::HEAD));
        assert!(is_safe(&Method::HEAD));
        assert!(!is_safe(&Method::POST));
    }

    #[test]
    fn test_has_body_uses_content_length() {
        assert!(request(&[("content-length", "3")], b"abc").has_body());
        assert!(!request(&[("content-length", "0")], b"abc").has_body());
        assert!(!request(&[("content-length", "nope")], b"abc").has_body());
    }

    #[test]
    fn test_has_body_peeks_without_consuming() {
        let mut req = request(&[("transfer-encoding", "chunked")], b"payload");
        assert!(req.has_body());
        let mut read = String::new();
        req.body_mut().read_to_string(&mut read).unwrap();
        assert_eq!(read, "payload");

        assert!(!request(&[], b"").has_body());
    }

    #[test]
    fn test_query_and_header_values() {
        let req = request(&[("x-tag", "one"), ("x-tag", "two")], b"");
        assert_eq!(req.query_values("tag"), Some(vec!["a".into(), "b".into()]));
        assert_eq!(req.query_values("name"), Some(vec!["x y".into()]));
        assert_eq!(req.query_values("missing"), None);
        assert_eq!(req.header_values("X-Tag"), Some(vec!["one".into(), "two".into()]));
        assert_eq!(req.header_values("x-none"), None);
    }

    #[test]
    fn test_cancelled_body_aborts_reads() {
        let token = CancellationToken::new();
        let mut req = request(&[], b"data").with_cancellation(token.clone());
        token.cancel();
        let mut buf = Vec::new();
        let err = req.body_mut().read_to_end(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionAborted);
        assert!(!req.has_body());
    }

    #[test]
    fn test_form_is_memoized() {
        let mut req = request(
            &[("content-type", "application/x-www-form-urlencoded")],
            b"name=Tom",
        );
        let first = req.form(1024).unwrap();
        let second = req.form(1024).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.values("name"), Some(&["Tom".to_string()][..]));
    }

    #[test]
    fn test_request_id_from_header() {
        let id = RequestId::new().to_string();
        let req = request(&[("x-request-id", id.as_str())], b"");
        assert_eq!(req.request_id().to_string(), id);
    }
}
