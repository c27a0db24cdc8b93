//! Form bodies: `application/x-www-form-urlencoded` and `multipart/form-data`.
//!
//! Both parsers work on a fully buffered body capped at the configured form memory.
//! Parts without a `filename` are plain values; parts with one become
//! [`FileUpload`]s.

use std::collections::BTreeMap;
use std::io::Read;
use tracing::debug;

use super::upload::FileUpload;
use crate::codec::{MULTIPART_FORM_MIME, URLENCODED_FORM_MIME};

/// A parsed form body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    pub values: BTreeMap<String, Vec<String>>,
    pub files: BTreeMap<String, Vec<FileUpload>>,
}

impl FormData {
    #[must_use]
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.values.get(name).map(Vec::as_slice)
    }

    #[must_use]
    pub fn file(&self, name: &str) -> Option<&FileUpload> {
        self.files.get(name).and_then(|f| f.first())
    }

    fn push_value(&mut self, name: String, value: String) {
        self.values.entry(name).or_default().push(value);
    }
}

/// Read the body and parse it according to the request media type.
///
/// `content_type` is the raw header value (the multipart boundary lives in it),
/// `essence` the already parsed, lower-cased media type.
pub(crate) fn parse_form(
    essence: &str,
    content_type: &str,
    body: &mut dyn Read,
    max_memory: u64,
) -> Result<FormData, String> {
    let mut buf = Vec::new();
    body.take(max_memory.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|e| e.to_string())?;
    if buf.len() as u64 > max_memory {
        return Err("http: request body too large".to_string());
    }

    match essence {
        URLENCODED_FORM_MIME => parse_urlencoded(&buf),
        MULTIPART_FORM_MIME => {
            let boundary = multipart_boundary(content_type)?;
            parse_multipart(&buf, &boundary)
        }
        other => Err(format!("unsupported form content type {other:?}")),
    }
}

fn multipart_boundary(content_type: &str) -> Result<String, String> {
    let parsed: mime::Mime = content_type
        .parse()
        .map_err(|e: mime::FromStrError| e.to_string())?;
    parsed
        .get_param(mime::BOUNDARY)
        .map(|b| b.as_str().to_string())
        .filter(|b| !b.is_empty())
        .ok_or_else(|| "no multipart boundary param in Content-Type".to_string())
}

/// Reject `%` escapes that are not followed by two hex digits.
fn check_escapes(raw: &str) -> Result<(), String> {
    let bytes = raw.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let valid = bytes.get(i + 1..i + 3).is_some_and(|h| h.iter().all(u8::is_ascii_hexdigit));
            if !valid {
                let end = (i + 3).min(bytes.len());
                return Err(format!(
                    "invalid URL escape {:?}",
                    String::from_utf8_lossy(&bytes[i..end])
                ));
            }
            i += 3;
        } else {
            i += 1;
        }
    }
    Ok(())
}

fn unescape(raw: &str) -> Result<String, String> {
    check_escapes(raw)?;
    let spaced = raw.replace('+', " ");
    Ok(String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned())
}

/// Strict `application/x-www-form-urlencoded` parsing.
pub fn parse_urlencoded(body: &[u8]) -> Result<FormData, String> {
    let text = std::str::from_utf8(body).map_err(|e| e.to_string())?;
    let mut form = FormData::default();
    for pair in text.split('&').filter(|p| !p.is_empty()) {
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        form.push_value(unescape(key)?, unescape(value)?);
    }
    Ok(form)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}

fn strip_line_end(buf: &[u8]) -> &[u8] {
    buf.strip_prefix(b"\r\n")
        .or_else(|| buf.strip_prefix(b"\n"))
        .unwrap_or(buf)
}

/// Split a part into its header block and content. A part may start with the blank
/// line directly, which leaves the header block empty.
fn split_header_block(part: &[u8]) -> Option<(&[u8], &[u8])> {
    if let Some(content) = part.strip_prefix(b"\r\n").or_else(|| part.strip_prefix(b"\n")) {
        return Some((&[], content));
    }
    let crlf = find(part, b"\r\n\r\n").map(|at| (at, 4));
    let lf = find(part, b"\n\n").map(|at| (at, 2));
    let (end, len) = match (crlf, lf) {
        (Some(a), Some(b)) => a.min(b),
        (found, None) | (None, found) => found?,
    };
    Some((&part[..end], &part[end + len..]))
}

/// `name="value"` pairs of a `Content-Disposition` header.
fn disposition_params(header: &str) -> BTreeMap<String, String> {
    header
        .split(';')
        .skip(1)
        .filter_map(|p| {
            let (k, v) = p.split_once('=')?;
            let v = v.trim();
            let v = v
                .strip_prefix('"')
                .and_then(|s| s.strip_suffix('"'))
                .unwrap_or(v);
            Some((k.trim().to_ascii_lowercase(), v.to_string()))
        })
        .collect()
}

/// `multipart/form-data` parsing over a buffered body.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<FormData, String> {
    let delimiter = format!("--{boundary}");
    let part_end = format!("\n--{boundary}");
    let eof = || "multipart: NextPart: EOF".to_string();

    let start = find(body, delimiter.as_bytes()).ok_or_else(eof)?;
    let mut rest = &body[start + delimiter.len()..];
    let mut form = FormData::default();

    loop {
        if rest.starts_with(b"--") {
            break;
        }
        rest = strip_line_end(rest);

        let (headers, after_headers) = split_header_block(rest).ok_or_else(eof)?;
        let headers = std::str::from_utf8(headers).map_err(|e| e.to_string())?;
        rest = after_headers;

        let found = find(rest, part_end.as_bytes()).ok_or_else(eof)?;
        let content_end = if found > 0 && rest[found - 1] == b'\r' {
            found - 1
        } else {
            found
        };
        let content = &rest[..content_end];
        rest = &rest[found + part_end.len()..];

        let mut params = BTreeMap::new();
        let mut part_type = None;
        for line in headers.lines() {
            let Some((name, value)) = line.split_once(':') else {
                continue;
            };
            if name.trim().eq_ignore_ascii_case("content-disposition") {
                params = disposition_params(value);
            } else if name.trim().eq_ignore_ascii_case("content-type") {
                part_type = Some(value.trim().to_string());
            }
        }

        let Some(name) = params.get("name").cloned() else {
            debug!("Skipping multipart part without a name");
            continue;
        };
        match params.get("filename").filter(|f| !f.is_empty()) {
            Some(filename) => {
                let upload = FileUpload::new(filename.clone(), part_type, content.to_vec());
                form.files.entry(name).or_default().push(upload);
            }
            None => {
                let value = String::from_utf8_lossy(content).into_owned();
                form.push_value(name, value);
            }
        }
    }
    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_empty_header_block_and_bare_newlines() {
        let body = b"--B\r\n\r\nignored\r\n\
            --B\n\
            Content-Disposition: form-data; name=\"note\"\n\n\
            plain lf\n\
            --B--\n";
        let form = parse_multipart(body, "B").unwrap();
        assert_eq!(form.values("note"), Some(&["plain lf".to_string()][..]));
        assert_eq!(form.values("ignored"), None);
    }

    #[test]
    fn test_urlencoded_values() {
        let form = parse_urlencoded(b"name=the+name&age=32&tag=a&tag=b%20c&empty=").unwrap();
        assert_eq!(form.values("name"), Some(&["the name".to_string()][..]));
        assert_eq!(form.values("tag").unwrap().len(), 2);
        assert_eq!(form.values("tag").unwrap()[1], "b c");
        assert_eq!(form.values("empty"), Some(&[String::new()][..]));
    }

    #[test]
    fn test_urlencoded_rejects_bad_escape() {
        let err = parse_urlencoded(b"name=%3").unwrap_err();
        assert!(err.contains("invalid URL escape"), "{err}");
        assert!(parse_urlencoded(b"name=%zz").is_err());
    }

    #[test]
    fn test_multipart_values_and_files() {
        let body = "--XYZ\r\n\
            Content-Disposition: form-data; name=\"name\"\r\n\r\n\
            Tom\r\n\
            --XYZ\r\n\
            Content-Disposition: form-data; name=\"file\"; filename=\"plain.txt\"\r\n\
            Content-Type: text/plain\r\n\r\n\
            the file contents\r\n\
            --XYZ--\r\n";
        let form = parse_multipart(body.as_bytes(), "XYZ").unwrap();
        assert_eq!(form.values("name"), Some(&["Tom".to_string()][..]));
        let file = form.file("file").unwrap();
        assert_eq!(file.filename(), "plain.txt");
        assert_eq!(file.header.content_type.as_deref(), Some("text/plain"));
        assert_eq!(file.content(), b"the file contents");
    }

    #[test]
    fn test_multipart_without_parts_is_eof() {
        let err = parse_multipart(b"", "XYZ").unwrap_err();
        assert_eq!(err, "multipart: NextPart: EOF");
    }

    #[test]
    fn test_parse_form_memory_limit() {
        let body = b"a=1&b=2".to_vec();
        let err = parse_form(URLENCODED_FORM_MIME, URLENCODED_FORM_MIME, &mut body.as_slice(), 3)
            .unwrap_err();
        assert!(err.contains("too large"));
        let form = parse_form(URLENCODED_FORM_MIME, URLENCODED_FORM_MIME, &mut body.as_slice(), 64)
            .unwrap();
        assert_eq!(form.values("b"), Some(&["2".to_string()][..]));
    }

    #[test]
    fn test_missing_boundary() {
        let err = parse_form(MULTIPART_FORM_MIME, "multipart/form-data", &mut &b""[..], 64).unwrap_err();
        assert!(err.contains("boundary"));
    }
}
