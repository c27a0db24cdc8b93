//! # Codec Module
//!
//! Pluggable body decoders ([`Consumer`]) and encoders ([`Producer`]) keyed by MIME
//! type through a [`CodecRegistry`].
//!
//! ## Capability dispatch
//!
//! A consumer does not know the concrete type it decodes into. Destinations implement
//! [`Consumable`], advertising one or more [`Capability`] values. [`resolve_sink`]
//! evaluates them once per call in this fixed priority order:
//!
//! 1. [`Capability::Stream`]: the destination accepts the raw body as a writer
//! 2. [`Capability::Binary`]: the destination decodes itself from the raw bytes
//! 3. [`Capability::Bytes`]: a byte buffer
//! 4. [`Capability::Text`]: a UTF-8 string
//! 5. [`Capability::Structured`]: generic serde decoding in the codec's format
//!
//! A destination advertising several capabilities always resolves to the first one in
//! this list, whatever order it lists them in.
//!
//! Producers take an owned [`Payload`] whose variants follow the same order. An owned
//! reader payload is dropped after it has been copied, which closes it. The
//! destination writer is borrowed: producers flush it and never close it.
//!
//! ## Built-in codecs
//!
//! | MIME | Consumer | Producer |
//! |------|----------|----------|
//! | `application/json` | [`JsonConsumer`] | [`JsonProducer`] |
//! | `application/xml`, `text/xml` | [`XmlConsumer`] | [`XmlProducer`] |
//! | `application/x-yaml`, `application/yaml` | [`YamlConsumer`] | [`YamlProducer`] |
//! | `text/csv` | [`CsvConsumer`] | [`CsvProducer`] |
//! | `text/plain` | [`TextConsumer`] | [`TextProducer`] |
//! | `application/octet-stream` | [`ByteStreamConsumer`] | [`ByteStreamProducer`] |
//! | `application/x-www-form-urlencoded` | [`FormConsumer`] | [`FormProducer`] |

mod bytestream;
mod csv;
mod form;
mod json;
mod registry;
mod text;
mod xml;
mod yaml;

pub use self::bytestream::{ByteStreamConsumer, ByteStreamProducer};
pub use self::csv::{CsvConsumer, CsvOptions, CsvProducer};
pub use self::form::{FormConsumer, FormProducer};
pub use self::json::{JsonConsumer, JsonProducer};
pub use self::registry::CodecRegistry;
pub use self::text::{TextConsumer, TextProducer};
pub use self::xml::{XmlConsumer, XmlProducer};
pub use self::yaml::{YamlConsumer, YamlProducer};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::io::{self, BufReader, Read, Write};

pub const JSON_MIME: &str = "application/json";
pub const XML_MIME: &str = "application/xml";
pub const TEXT_XML_MIME: &str = "text/xml";
pub const TEXT_MIME: &str = "text/plain";
pub const HTML_MIME: &str = "text/html";
pub const CSV_MIME: &str = "text/csv";
pub const YAML_MIME: &str = "application/x-yaml";
pub const YAML_ALT_MIME: &str = "application/yaml";
pub const BYTE_STREAM_MIME: &str = "application/octet-stream";
pub const MULTIPART_FORM_MIME: &str = "multipart/form-data";
pub const URLENCODED_FORM_MIME: &str = "application/x-www-form-urlencoded";
pub const WILDCARD_MIME: &str = "*/*";
/// Media type assumed when a request carries no `Content-Type`.
pub const DEFAULT_MIME: &str = BYTE_STREAM_MIME;

/// Codec-internal failure.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The input was empty.
    #[error("unexpected end of input")]
    EndOfInput,

    #[error(transparent)]
    Io(#[from] io::Error),

    #[error("json: {0}")]
    Json(serde_json::Error),

    #[error("xml: {0}")]
    Xml(String),

    #[error("yaml: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("csv: {0}")]
    Csv(#[from] ::csv::Error),

    #[error("form: {0}")]
    Form(String),

    #[error("invalid utf-8 in text payload: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),

    #[error("{0}")]
    Binary(String),

    #[error("{payload} is not supported by the {codec}")]
    Unsupported {
        codec: &'static str,
        payload: &'static str,
    },
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_eof() && err.line() == 1 && err.column() == 0 {
            CodecError::EndOfInput
        } else {
            CodecError::Json(err)
        }
    }
}

impl CodecError {
    #[inline]
    #[must_use]
    pub fn is_end_of_input(&self) -> bool {
        matches!(self, CodecError::EndOfInput)
    }
}

/// Body decoder selected by request `Content-Type`.
pub trait Consumer: Send + Sync {
    fn consume(&self, reader: &mut dyn Read, target: &mut dyn Consumable) -> Result<(), CodecError>;
}

/// Body encoder selected by the negotiated response format.
pub trait Producer: Send + Sync {
    fn produce(&self, writer: &mut dyn Write, payload: Payload) -> Result<(), CodecError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Stream,
    Binary,
    Bytes,
    Text,
    Structured,
}

impl Capability {
    /// Resolution order, highest priority first.
    pub const PRIORITY: [Capability; 5] = [
        Capability::Stream,
        Capability::Binary,
        Capability::Bytes,
        Capability::Text,
        Capability::Structured,
    ];
}

/// A destination, borrowed through the capability chosen for it.
pub enum Sink<'a> {
    Stream(&'a mut dyn Write),
    Binary(&'a mut dyn BinaryDecode),
    Bytes(&'a mut Vec<u8>),
    Text(&'a mut String),
    Structured(&'a mut dyn StructuredDecode),
}

/// Something a consumer can decode into.
pub trait Consumable {
    /// Capabilities offered, in any order.
    fn capabilities(&self) -> &'static [Capability];

    /// Borrow the destination through `capability`; `None` if it was not advertised.
    fn sink(&mut self, capability: Capability) -> Option<Sink<'_>>;
}

/// Pick the highest-priority capability the target offers.
pub fn resolve_sink(target: &mut dyn Consumable) -> Option<Sink<'_>> {
    let offered = target.capabilities();
    let chosen = Capability::PRIORITY
        .iter()
        .copied()
        .find(|c| offered.contains(c))?;
    target.sink(chosen)
}

/// Types that decode themselves from raw bytes.
pub trait BinaryDecode {
    fn decode_binary(&mut self, data: &[u8]) -> Result<(), CodecError>;
}

/// Types that encode themselves to raw bytes.
pub trait BinaryEncode: Send {
    fn encode_binary(&self) -> Result<Vec<u8>, CodecError>;
}

/// Input handed to a structured destination, tagged with its wire format.
pub enum StructuredInput<'a> {
    Json(&'a mut dyn Read),
    Xml(&'a mut dyn Read),
    Yaml(&'a mut dyn Read),
    Form(Vec<u8>),
    Records(Vec<Vec<String>>),
}

/// Generic serde decoding; implemented for [`Value`] and [`Decoded`].
pub trait StructuredDecode {
    fn decode(&mut self, input: StructuredInput<'_>) -> Result<(), CodecError>;
}

/// Structured output formats a producer can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StructuredFormat {
    Json,
    Xml,
    Yaml,
    Form,
}

/// Generic serde encoding; implemented for every `Serialize + Send` type.
pub trait StructuredEncode: Send {
    fn encode(&self, format: StructuredFormat, writer: &mut dyn Write) -> Result<(), CodecError>;

    /// Rows for tabular producers: an array of arrays of scalars.
    fn to_records(&self) -> Result<Vec<Vec<String>>, CodecError>;
}

fn decode_structured<T: DeserializeOwned>(input: StructuredInput<'_>) -> Result<T, CodecError> {
    match input {
        StructuredInput::Json(reader) => Ok(serde_json::from_reader(reader)?),
        StructuredInput::Xml(reader) => quick_xml::de::from_reader(BufReader::new(reader))
            .map_err(|e| CodecError::Xml(e.to_string())),
        StructuredInput::Yaml(reader) => Ok(serde_yaml::from_reader(reader)?),
        StructuredInput::Form(body) => {
            serde_urlencoded::from_bytes(&body).map_err(|e| CodecError::Form(e.to_string()))
        }
        StructuredInput::Records(records) => {
            let value = serde_json::to_value(records)?;
            Ok(serde_json::from_value(value)?)
        }
    }
}

impl StructuredDecode for Value {
    fn decode(&mut self, input: StructuredInput<'_>) -> Result<(), CodecError> {
        *self = decode_structured(input)?;
        Ok(())
    }
}

/// Typed decode slot: `Decoded::<Pet>::default()` is filled by a structured consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded<T>(pub Option<T>);

impl<T> Default for Decoded<T> {
    fn default() -> Self {
        Decoded(None)
    }
}

impl<T> Decoded<T> {
    pub fn into_inner(self) -> Option<T> {
        self.0
    }
}

impl<T: DeserializeOwned> StructuredDecode for Decoded<T> {
    fn decode(&mut self, input: StructuredInput<'_>) -> Result<(), CodecError> {
        self.0 = Some(decode_structured(input)?);
        Ok(())
    }
}

fn value_to_cell(value: &Value) -> Result<String, CodecError> {
    match value {
        Value::Null => Ok(String::new()),
        Value::String(s) => Ok(s.clone()),
        Value::Bool(_) | Value::Number(_) => Ok(value.to_string()),
        _ => Err(CodecError::Unsupported {
            codec: "CSV producer",
            payload: "nested value",
        }),
    }
}

impl<T: Serialize + Send + ?Sized> StructuredEncode for T {
    fn encode(&self, format: StructuredFormat, writer: &mut dyn Write) -> Result<(), CodecError> {
        match format {
            StructuredFormat::Json => {
                serde_json::to_writer(&mut *writer, self)?;
                writer.write_all(b"\n")?;
            }
            StructuredFormat::Xml => {
                let xml = quick_xml::se::to_string(self).map_err(|e| CodecError::Xml(e.to_string()))?;
                writer.write_all(xml.as_bytes())?;
            }
            StructuredFormat::Yaml => serde_yaml::to_writer(&mut *writer, self)?,
            StructuredFormat::Form => {
                let form =
                    serde_urlencoded::to_string(self).map_err(|e| CodecError::Form(e.to_string()))?;
                writer.write_all(form.as_bytes())?;
            }
        }
        Ok(())
    }

    fn to_records(&self) -> Result<Vec<Vec<String>>, CodecError> {
        match serde_json::to_value(self)? {
            Value::Array(rows) => rows
                .iter()
                .map(|row| match row {
                    Value::Array(cells) => cells.iter().map(value_to_cell).collect(),
                    _ => Err(CodecError::Unsupported {
                        codec: "CSV producer",
                        payload: "non-array row",
                    }),
                })
                .collect(),
            _ => Err(CodecError::Unsupported {
                codec: "CSV producer",
                payload: "non-array value",
            }),
        }
    }
}

/// Data handed to a producer.
pub enum Payload {
    /// Nothing to write.
    Empty,
    /// Copied verbatim, then dropped.
    Reader(Box<dyn Read + Send>),
    Binary(Box<dyn BinaryEncode>),
    Bytes(Vec<u8>),
    Text(String),
    Structured(Box<dyn StructuredEncode>),
}

impl Payload {
    pub fn structured<T: Serialize + Send + 'static>(value: T) -> Self {
        Payload::Structured(Box::new(value))
    }

    pub fn reader<R: Read + Send + 'static>(reader: R) -> Self {
        Payload::Reader(Box::new(reader))
    }

    pub fn binary<B: BinaryEncode + 'static>(value: B) -> Self {
        Payload::Binary(Box::new(value))
    }

    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Reader(_) => "reader",
            Payload::Binary(_) => "binary",
            Payload::Bytes(_) => "bytes",
            Payload::Text(_) => "text",
            Payload::Structured(_) => "structured",
        }
    }
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Bytes(b) => write!(f, "Payload::Bytes({} bytes)", b.len()),
            Payload::Text(t) => write!(f, "Payload::Text({t:?})"),
            other => write!(f, "Payload::{}", other.kind()),
        }
    }
}

impl From<Vec<u8>> for Payload {
    fn from(value: Vec<u8>) -> Self {
        Payload::Bytes(value)
    }
}

impl From<String> for Payload {
    fn from(value: String) -> Self {
        Payload::Text(value)
    }
}

impl From<&str> for Payload {
    fn from(value: &str) -> Self {
        Payload::Text(value.to_string())
    }
}

impl From<Value> for Payload {
    fn from(value: Value) -> Self {
        Payload::Structured(Box::new(value))
    }
}

/// Writer wrapper that advertises the stream capability.
#[derive(Debug, Default)]
pub struct StreamTarget<W: Write>(pub W);

impl<W: Write> Consumable for StreamTarget<W> {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Stream]
    }

    fn sink(&mut self, capability: Capability) -> Option<Sink<'_>> {
        match capability {
            Capability::Stream => Some(Sink::Stream(&mut self.0)),
            _ => None,
        }
    }
}

impl Consumable for Vec<u8> {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Bytes]
    }

    fn sink(&mut self, capability: Capability) -> Option<Sink<'_>> {
        match capability {
            Capability::Bytes => Some(Sink::Bytes(self)),
            _ => None,
        }
    }
}

impl Consumable for String {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Text]
    }

    fn sink(&mut self, capability: Capability) -> Option<Sink<'_>> {
        match capability {
            Capability::Text => Some(Sink::Text(self)),
            _ => None,
        }
    }
}

impl Consumable for Value {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Structured]
    }

    fn sink(&mut self, capability: Capability) -> Option<Sink<'_>> {
        match capability {
            Capability::Structured => Some(Sink::Structured(self)),
            _ => None,
        }
    }
}

impl<T: DeserializeOwned> Consumable for Decoded<T> {
    fn capabilities(&self) -> &'static [Capability] {
        &[Capability::Structured]
    }

    fn sink(&mut self, capability: Capability) -> Option<Sink<'_>> {
        match capability {
            Capability::Structured => Some(Sink::Structured(self)),
            _ => None,
        }
    }
}

/// Resolve the target or report that it offers nothing usable.
pub(crate) fn sink_for<'a>(
    target: &'a mut dyn Consumable,
    codec: &'static str,
) -> Result<Sink<'a>, CodecError> {
    resolve_sink(target).ok_or(CodecError::Unsupported {
        codec,
        payload: "destination without capabilities",
    })
}

/// Decode a string document into a text destination.
pub(crate) fn consume_text(text: &mut String, input: StructuredInput<'_>) -> Result<(), CodecError> {
    *text = decode_structured(input)?;
    Ok(())
}

/// Handle every non-structured sink by passing the raw body through.
pub(crate) fn consume_raw(
    sink: Sink<'_>,
    reader: &mut dyn Read,
    codec: &'static str,
) -> Result<(), CodecError> {
    match sink {
        Sink::Stream(writer) => {
            io::copy(reader, writer)?;
            writer.flush()?;
        }
        Sink::Binary(target) => {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            target.decode_binary(&buf)?;
        }
        Sink::Bytes(buf) => {
            buf.clear();
            reader.read_to_end(buf)?;
        }
        Sink::Text(text) => {
            let mut buf = Vec::new();
            reader.read_to_end(&mut buf)?;
            *text = String::from_utf8(buf)?;
        }
        Sink::Structured(_) => {
            return Err(CodecError::Unsupported {
                codec,
                payload: "structured destination",
            })
        }
    }
    Ok(())
}

/// Handle every non-structured payload by writing it through.
pub(crate) fn produce_raw(
    payload: Payload,
    writer: &mut dyn Write,
    codec: &'static str,
) -> Result<(), CodecError> {
    match payload {
        Payload::Empty => {}
        Payload::Reader(mut reader) => {
            io::copy(&mut reader, writer)?;
        }
        Payload::Binary(value) => writer.write_all(&value.encode_binary()?)?,
        Payload::Bytes(bytes) => writer.write_all(&bytes)?,
        Payload::Text(text) => writer.write_all(text.as_bytes())?,
        Payload::Structured(_) => {
            return Err(CodecError::Unsupported {
                codec,
                payload: "structured payload",
            })
        }
    }
    Ok(())
}
