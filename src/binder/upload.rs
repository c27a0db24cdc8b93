use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Value};
use std::io::{self, Read};

/// Metadata of one uploaded multipart part.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FileHeader {
    pub filename: String,
    /// Part `Content-Type`, when the client sent one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    pub size: u64,
}

/// An uploaded file: its header and a reader over the part content.
///
/// The content lives in memory (bounded by the form memory limit), so the value is
/// cheap to hand over and reading it twice requires a clone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FileUpload {
    pub header: FileHeader,
    data: Vec<u8>,
    position: usize,
}

impl FileUpload {
    pub fn new(filename: impl Into<String>, content_type: Option<String>, data: Vec<u8>) -> Self {
        Self {
            header: FileHeader {
                filename: filename.into(),
                content_type,
                size: data.len() as u64,
            },
            data,
            position: 0,
        }
    }

    #[must_use]
    pub fn filename(&self) -> &str {
        &self.header.filename
    }

    /// Full content, regardless of how much has been read.
    #[must_use]
    pub fn content(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }

    /// Object form: header fields plus base64 `data`.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "filename": self.header.filename,
            "content_type": self.header.content_type,
            "size": self.header.size,
            "data": STANDARD.encode(&self.data),
        })
    }
}

impl Read for FileUpload {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.get(self.position..).unwrap_or_default();
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl Serialize for FileUpload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

#[derive(Deserialize)]
struct FileUploadRepr {
    #[serde(default)]
    filename: String,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    data: String,
}

impl<'de> Deserialize<'de> for FileUpload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let repr = FileUploadRepr::deserialize(deserializer)?;
        let data = STANDARD
            .decode(repr.data.as_bytes())
            .map_err(serde::de::Error::custom)?;
        Ok(FileUpload::new(repr.filename, repr.content_type, data))
    }
}
