use std::io::{Read, Write};

use super::{
    consume_raw, consume_text, produce_raw, sink_for, CodecError, Consumable, Consumer, Payload,
    Producer, Sink, StructuredFormat, StructuredInput,
};

const CONSUMER: &str = "YAML consumer";
const PRODUCER: &str = "YAML producer";

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlConsumer;

impl Consumer for YamlConsumer {
    fn consume(&self, reader: &mut dyn Read, target: &mut dyn Consumable) -> Result<(), CodecError> {
        match sink_for(target, CONSUMER)? {
            Sink::Structured(dest) => dest.decode(StructuredInput::Yaml(reader)),
            Sink::Text(text) => consume_text(text, StructuredInput::Yaml(reader)),
            other => consume_raw(other, reader, CONSUMER),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct YamlProducer;

impl Producer for YamlProducer {
    fn produce(&self, writer: &mut dyn Write, payload: Payload) -> Result<(), CodecError> {
        match payload {
            Payload::Structured(value) => value.encode(StructuredFormat::Yaml, writer)?,
            other => produce_raw(other, writer, PRODUCER)?,
        }
        writer.flush()?;
        Ok(())
    }
}
