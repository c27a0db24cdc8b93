use std::io::{Read, Write};

use super::{
    consume_raw, consume_text, produce_raw, sink_for, CodecError, Consumable, Consumer, Payload,
    Producer, Sink, StructuredFormat, StructuredInput,
};

const CONSUMER: &str = "XML consumer";
const PRODUCER: &str = "XML producer";

/// Decodes `application/xml` and `text/xml` bodies with `quick-xml`.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlConsumer;

impl Consumer for XmlConsumer {
    fn consume(&self, reader: &mut dyn Read, target: &mut dyn Consumable) -> Result<(), CodecError> {
        match sink_for(target, CONSUMER)? {
            Sink::Structured(dest) => dest.decode(StructuredInput::Xml(reader)),
            Sink::Text(text) => consume_text(text, StructuredInput::Xml(reader)),
            other => consume_raw(other, reader, CONSUMER),
        }
    }
}

/// Encodes structured payloads as XML. The root element is named after the type.
#[derive(Debug, Clone, Copy, Default)]
pub struct XmlProducer;

impl Producer for XmlProducer {
    fn produce(&self, writer: &mut dyn Write, payload: Payload) -> Result<(), CodecError> {
        match payload {
            Payload::Structured(value) => value.encode(StructuredFormat::Xml, writer)?,
            other => produce_raw(other, writer, PRODUCER)?,
        }
        writer.flush()?;
        Ok(())
    }
}
