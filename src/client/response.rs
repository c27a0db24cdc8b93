use http::header::CONTENT_TYPE;
use http::StatusCode;
use serde::de::DeserializeOwned;
use std::sync::Arc;

use super::ClientError;
use crate::codec::{CodecError, CodecRegistry, Consumer, Decoded, DEFAULT_MIME};
use crate::negotiate::parse_media_type;

/// Reads a typed result out of a response.
pub trait ClientResponseReader<T> {
    fn read_response(&self, response: &ClientResponse, consumer: &dyn Consumer) -> Result<T, ClientError>;
}

impl<F, T> ClientResponseReader<T> for F
where
    F: Fn(&ClientResponse, &dyn Consumer) -> Result<T, ClientError>,
{
    fn read_response(&self, response: &ClientResponse, consumer: &dyn Consumer) -> Result<T, ClientError> {
        self(response, consumer)
    }
}

/// A received response with a buffered body.
#[derive(Debug)]
pub struct ClientResponse {
    inner: http::Response<Vec<u8>>,
}

impl From<http::Response<Vec<u8>>> for ClientResponse {
    fn from(inner: http::Response<Vec<u8>>) -> Self {
        Self { inner }
    }
}

impl ClientResponse {
    #[must_use]
    pub fn code(&self) -> u16 {
        self.inner.status().as_u16()
    }

    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.inner.status()
    }

    /// Canonical reason phrase of the status, empty for unknown codes.
    #[must_use]
    pub fn message(&self) -> &'static str {
        self.inner.status().canonical_reason().unwrap_or_default()
    }

    /// First value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers().get(name).and_then(|v| v.to_str().ok())
    }

    /// Every value of a header, in received order.
    #[must_use]
    pub fn header_values(&self, name: &str) -> Vec<&str> {
        self.inner
            .headers()
            .get_all(name)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect()
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        self.inner.body()
    }

    /// Essence of the `Content-Type`; absent or unparsable headers mean a byte stream.
    #[must_use]
    pub fn media_type(&self) -> String {
        self.header(CONTENT_TYPE.as_str())
            .and_then(|raw| parse_media_type(raw).ok())
            .map_or_else(|| DEFAULT_MIME.to_string(), |m| m.essence)
    }

    /// Consumer for this response's media type, falling back to the byte stream one.
    ///
    /// # Errors
    ///
    /// [`ClientError::NoConsumer`] when neither is registered.
    pub fn consumer(&self, codecs: &CodecRegistry) -> Result<Arc<dyn Consumer>, ClientError> {
        let media_type = self.media_type();
        codecs
            .consumer_for(&media_type)
            .or_else(|| codecs.consumer_for(DEFAULT_MIME))
            .ok_or(ClientError::NoConsumer(media_type))
    }

    /// Run `reader` with the consumer selected for this response.
    pub fn read_with<T, R>(&self, reader: &R, codecs: &CodecRegistry) -> Result<T, ClientError>
    where
        R: ClientResponseReader<T> + ?Sized,
    {
        let consumer = self.consumer(codecs)?;
        reader.read_response(self, consumer.as_ref())
    }

    /// Decode the body into `T` with the consumer for its media type.
    pub fn decode<T: DeserializeOwned>(&self, codecs: &CodecRegistry) -> Result<T, ClientError> {
        let consumer = self.consumer(codecs)?;
        let mut target = Decoded::<T>::default();
        consumer.consume(&mut self.body(), &mut target)?;
        target
            .into_inner()
            .ok_or(ClientError::Codec(CodecError::EndOfInput))
    }

    /// An error for an unexpected response, carrying its status and body text.
    #[must_use]
    pub fn to_error(&self, operation: &str) -> ClientError {
        ClientError::Response {
            operation: operation.to_string(),
            code: self.code(),
            message: String::from_utf8_lossy(self.body()).trim().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    fn response(status: u16, content_type: Option<&str>, body: &[u8]) -> ClientResponse {
        let mut builder = http::Response::builder().status(status).header("Blah", "blahblah");
        if let Some(ct) = content_type {
            builder = builder.header(CONTENT_TYPE, ct);
        }
        builder.body(body.to_vec()).unwrap().into()
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct Pet {
        name: String,
    }

    #[test]
    fn test_accessors() {
        let resp = response(404, None, b"some content");
        assert_eq!(resp.code(), 404);
        assert_eq!(resp.message(), "Not Found");
        assert_eq!(resp.header("blah"), Some("blahblah"));
        assert_eq!(resp.header_values("blah"), vec!["blahblah"]);
        assert_eq!(resp.body(), b"some content");
        assert_eq!(resp.media_type(), DEFAULT_MIME);
    }

    #[test]
    fn test_decode_by_content_type() {
        let codecs = CodecRegistry::with_defaults();
        let resp = response(200, Some("application/json; charset=utf-8"), br#"{"name":"Rex"}"#);
        assert_eq!(resp.decode::<Pet>(&codecs).unwrap(), Pet { name: "Rex".into() });

        let resp = response(200, Some("application/xml"), b"<pet><name>Rex</name></pet>");
        assert_eq!(resp.decode::<Pet>(&codecs).unwrap(), Pet { name: "Rex".into() });
    }

    #[test]
    fn test_reader_closure_sees_response_and_consumer() {
        let codecs = CodecRegistry::with_defaults();
        let resp = response(490, Some("text/plain"), b"the content");
        let reader = |r: &ClientResponse, consumer: &dyn Consumer| -> Result<(u16, String), ClientError> {
            let mut text = String::new();
            consumer.consume(&mut r.body(), &mut text)?;
            Ok((r.code(), text))
        };
        let (code, text) = resp.read_with(&reader, &codecs).unwrap();
        assert_eq!(code, 490);
        assert_eq!(text, "the content");
    }

    #[test]
    fn test_reader_error_is_returned() {
        let codecs = CodecRegistry::with_defaults();
        let resp = response(490, None, b"the content");
        let reader = |r: &ClientResponse, _: &dyn Consumer| -> Result<(), ClientError> {
            Err(r.to_error("fake"))
        };
        let err = resp.read_with(&reader, &codecs).unwrap_err();
        assert_eq!(err.to_string(), "fake (status 490): the content");
    }

    #[test]
    fn test_missing_consumer() {
        let resp = response(200, Some("application/vnd.custom"), b"x");
        let err = resp.consumer(&CodecRegistry::new()).err().unwrap();
        assert!(matches!(err, ClientError::NoConsumer(m) if m == "application/vnd.custom"));

        let mut codecs = CodecRegistry::new();
        codecs.register_consumer(DEFAULT_MIME, Arc::new(crate::codec::ByteStreamConsumer::default()));
        assert!(resp.consumer(&codecs).is_ok());
    }
}
