use std::io::{Read, Write};

use super::{
    consume_raw, produce_raw, sink_for, CodecError, Consumable, Consumer, Payload, Producer,
    StructuredFormat,
};

const CONSUMER: &str = "text consumer";
const PRODUCER: &str = "text producer";

/// Decodes `text/plain` bodies into strings, byte buffers or binary decoders.
///
/// Structured destinations are rejected; implement [`BinaryDecode`](super::BinaryDecode)
/// to parse a custom type from text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextConsumer;

impl Consumer for TextConsumer {
    fn consume(&self, reader: &mut dyn Read, target: &mut dyn Consumable) -> Result<(), CodecError> {
        consume_raw(sink_for(target, CONSUMER)?, reader, CONSUMER)
    }
}

/// Encodes `text/plain` responses. Structured payloads fall back to JSON text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextProducer;

impl Producer for TextProducer {
    fn produce(&self, writer: &mut dyn Write, payload: Payload) -> Result<(), CodecError> {
        match payload {
            Payload::Structured(value) => value.encode(StructuredFormat::Json, writer)?,
            other => produce_raw(other, writer, PRODUCER)?,
        }
        writer.flush()?;
        Ok(())
    }
}
