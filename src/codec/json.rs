use std::io::{Read, Write};

use super::{
    consume_raw, consume_text, produce_raw, sink_for, CodecError, Consumable, Consumer, Payload,
    Producer, Sink, StructuredFormat, StructuredInput,
};

const CONSUMER: &str = "JSON consumer";
const PRODUCER: &str = "JSON producer";

/// Decodes `application/json` bodies.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonConsumer;

impl Consumer for JsonConsumer {
    fn consume(&self, reader: &mut dyn Read, target: &mut dyn Consumable) -> Result<(), CodecError> {
        match sink_for(target, CONSUMER)? {
            Sink::Structured(dest) => dest.decode(StructuredInput::Json(reader)),
            Sink::Text(text) => consume_text(text, StructuredInput::Json(reader)),
            other => consume_raw(other, reader, CONSUMER),
        }
    }
}

/// Encodes structured payloads as JSON followed by a newline.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonProducer;

impl Producer for JsonProducer {
    fn produce(&self, writer: &mut dyn Write, payload: Payload) -> Result<(), CodecError> {
        match payload {
            Payload::Structured(value) => value.encode(StructuredFormat::Json, writer)?,
            other => produce_raw(other, writer, PRODUCER)?,
        }
        writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Decoded;
    use serde::{Deserialize, Serialize};
    use serde_json::{json, Value};

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Pet {
        name: String,
        age: u32,
    }

    #[test]
    fn test_consume_into_value() {
        let mut value = Value::Null;
        JsonConsumer
            .consume(&mut &br#"{"name":"toby","age":32}"#[..], &mut value)
            .unwrap();
        assert_eq!(value, json!({"name": "toby", "age": 32}));
    }

    #[test]
    fn test_consume_into_typed() {
        let mut pet = Decoded::<Pet>::default();
        JsonConsumer
            .consume(&mut &br#"{"name":"toby","age":32}"#[..], &mut pet)
            .unwrap();
        assert_eq!(
            pet.into_inner(),
            Some(Pet {
                name: "toby".into(),
                age: 32
            })
        );
    }

    #[test]
    fn test_consume_malformed() {
        let mut value = Value::Null;
        let err = JsonConsumer.consume(&mut &b"{]"[..], &mut value).unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
        assert!(err.to_string().contains("line 1"));
    }

    #[test]
    fn test_consume_empty_is_end_of_input() {
        let mut value = Value::Null;
        let err = JsonConsumer.consume(&mut &b""[..], &mut value).unwrap_err();
        assert!(err.is_end_of_input());
    }

    #[test]
    fn test_text_destination_is_decoded() {
        let mut text = String::new();
        JsonConsumer.consume(&mut &b"\"Tom\""[..], &mut text).unwrap();
        assert_eq!(text, "Tom");

        let err = JsonConsumer.consume(&mut &b"{}"[..], &mut text).unwrap_err();
        assert!(matches!(err, CodecError::Json(_)));
    }

    #[test]
    fn test_bytes_destination_gets_raw_body() {
        let mut bytes = Vec::new();
        JsonConsumer.consume(&mut &b"[1,2]"[..], &mut bytes).unwrap();
        assert_eq!(bytes, b"[1,2]");
    }

    #[test]
    fn test_produce_structured() {
        let mut out = Vec::new();
        JsonProducer
            .produce(&mut out, Payload::structured(json!({"name": "hello"})))
            .unwrap();
        assert_eq!(out, b"{\"name\":\"hello\"}\n");
    }

    #[test]
    fn test_produce_round_trip() {
        let mut out = Vec::new();
        JsonProducer
            .produce(
                &mut out,
                Payload::structured(Pet {
                    name: "rex".into(),
                    age: 3,
                }),
            )
            .unwrap();
        let mut pet = Decoded::<Pet>::default();
        JsonConsumer.consume(&mut out.as_slice(), &mut pet).unwrap();
        assert_eq!(pet.0.unwrap().name, "rex");
    }

    #[test]
    fn test_produce_reader_is_copied() {
        let mut out = Vec::new();
        JsonProducer
            .produce(&mut out, Payload::reader(std::io::Cursor::new(b"{}".to_vec())))
            .unwrap();
        assert_eq!(out, b"{}");
    }
}
