use std::io::{Read, Write};

use super::{
    consume_raw, produce_raw, sink_for, CodecError, Consumable, Consumer, Payload, Producer,
    StructuredFormat,
};

const CONSUMER: &str = "byte stream consumer";
const PRODUCER: &str = "byte stream producer";

/// Decodes `application/octet-stream` bodies.
///
/// `max_size` bounds how much is read into memory for byte, text and binary
/// destinations; stream destinations are copied without a bound.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteStreamConsumer {
    pub max_size: Option<u64>,
}

impl Consumer for ByteStreamConsumer {
    fn consume(&self, reader: &mut dyn Read, target: &mut dyn Consumable) -> Result<(), CodecError> {
        let sink = sink_for(target, CONSUMER)?;
        match self.max_size {
            Some(limit) => {
                let mut limited = reader.take(limit + 1);
                let mut buf = Vec::new();
                limited.read_to_end(&mut buf)?;
                if buf.len() as u64 > limit {
                    return Err(CodecError::Binary(format!(
                        "body exceeds the {limit} byte limit"
                    )));
                }
                consume_raw(sink, &mut buf.as_slice(), CONSUMER)
            }
            None => consume_raw(sink, reader, CONSUMER),
        }
    }
}

/// Encodes `application/octet-stream` responses. Structured payloads fall back to JSON.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteStreamProducer;

impl Producer for ByteStreamProducer {
    fn produce(&self, writer: &mut dyn Write, payload: Payload) -> Result<(), CodecError> {
        match payload {
            Payload::Structured(value) => value.encode(StructuredFormat::Json, writer)?,
            other => produce_raw(other, writer, PRODUCER)?,
        }
        writer.flush()?;
        Ok(())
    }
}
