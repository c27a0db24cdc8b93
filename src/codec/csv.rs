use std::io::{Read, Write};

use super::{
    produce_raw, sink_for, CodecError, Consumable, Consumer, Payload, Producer, Sink,
    StructuredInput,
};

const PRODUCER: &str = "CSV producer";

/// Reader and writer settings shared by [`CsvConsumer`] and [`CsvProducer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CsvOptions {
    pub delimiter: u8,
    /// Lines starting with this byte are skipped when reading.
    pub comment: Option<u8>,
    /// Number of leading records dropped when reading.
    pub skip_lines: usize,
    /// Allow records with differing field counts.
    pub flexible: bool,
}

impl Default for CsvOptions {
    fn default() -> Self {
        Self {
            delimiter: b',',
            comment: None,
            skip_lines: 0,
            flexible: false,
        }
    }
}

impl CsvOptions {
    fn read_records(&self, reader: &mut dyn Read) -> Result<Vec<Vec<String>>, CodecError> {
        let mut csv_reader = ::csv::ReaderBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter)
            .comment(self.comment)
            .flexible(self.flexible)
            .from_reader(reader);

        let mut records = Vec::new();
        for (index, record) in csv_reader.records().enumerate() {
            let record = record?;
            if index < self.skip_lines {
                continue;
            }
            records.push(record.iter().map(str::to_string).collect());
        }
        Ok(records)
    }

    fn write_records(
        &self,
        writer: &mut dyn Write,
        records: &[Vec<String>],
    ) -> Result<(), CodecError> {
        let mut csv_writer = ::csv::WriterBuilder::new()
            .has_headers(false)
            .delimiter(self.delimiter)
            .flexible(self.flexible)
            .from_writer(writer);
        for record in records {
            csv_writer.write_record(record)?;
        }
        csv_writer.flush()?;
        Ok(())
    }
}

/// Decodes `text/csv` bodies.
///
/// Structured destinations receive the records as `Vec<Vec<String>>`. Raw destinations
/// receive the records re-encoded with the configured options, so comments and skipped
/// lines are stripped and the delimiter is normalized.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvConsumer {
    pub options: CsvOptions,
}

impl CsvConsumer {
    #[must_use]
    pub fn with_options(options: CsvOptions) -> Self {
        Self { options }
    }
}

impl Consumer for CsvConsumer {
    fn consume(&self, reader: &mut dyn Read, target: &mut dyn Consumable) -> Result<(), CodecError> {
        let records = self.options.read_records(reader)?;
        match sink_for(target, "CSV consumer")? {
            Sink::Structured(dest) => dest.decode(StructuredInput::Records(records)),
            Sink::Stream(writer) => self.options.write_records(writer, &records),
            Sink::Binary(dest) => {
                let mut buf = Vec::new();
                self.options.write_records(&mut buf, &records)?;
                dest.decode_binary(&buf)
            }
            Sink::Bytes(dest) => {
                dest.clear();
                self.options.write_records(dest, &records)
            }
            Sink::Text(dest) => {
                let mut buf = Vec::new();
                self.options.write_records(&mut buf, &records)?;
                *dest = String::from_utf8(buf)?;
                Ok(())
            }
        }
    }
}

/// Encodes `text/csv` responses. Structured payloads must be arrays of arrays of scalars.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvProducer {
    pub options: CsvOptions,
}

impl CsvProducer {
    #[must_use]
    pub fn with_options(options: CsvOptions) -> Self {
        Self { options }
    }
}

impl Producer for CsvProducer {
    fn produce(&self, writer: &mut dyn Write, payload: Payload) -> Result<(), CodecError> {
        match payload {
            Payload::Structured(value) => {
                let records = value.to_records()?;
                self.options.write_records(writer, &records)?;
            }
            other => produce_raw(other, writer, PRODUCER)?,
        }
        writer.flush()?;
        Ok(())
    }
}
