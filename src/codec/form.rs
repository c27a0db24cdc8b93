use std::io::{Read, Write};

use super::{
    consume_raw, produce_raw, sink_for, CodecError, Consumable, Consumer, Payload, Producer, Sink,
    StructuredFormat, StructuredInput,
};

const CONSUMER: &str = "form consumer";
const PRODUCER: &str = "form producer";

/// Decodes `application/x-www-form-urlencoded` bodies with `serde_urlencoded`.
///
/// Parameter binding does not go through this consumer; form parameters are read from
/// the request's parsed form. This codec serves whole-body form decoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct FormConsumer;

impl Consumer for FormConsumer {
    fn consume(&self, reader: &mut dyn Read, target: &mut dyn Consumable) -> Result<(), CodecError> {
        match sink_for(target, CONSUMER)? {
            Sink::Structured(dest) => {
                let mut body = Vec::new();
                reader.read_to_end(&mut body)?;
                dest.decode(StructuredInput::Form(body))
            }
            other => consume_raw(other, reader, CONSUMER),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FormProducer;

impl Producer for FormProducer {
    fn produce(&self, writer: &mut dyn Write, payload: Payload) -> Result<(), CodecError> {
        match payload {
            Payload::Structured(value) => value.encode(StructuredFormat::Form, writer)?,
            other => produce_raw(other, writer, PRODUCER)?,
        }
        writer.flush()?;
        Ok(())
    }
}
