use http::header::{HeaderName, HeaderValue, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderMap, Method};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::debug;

use super::{ClientAuthInfoWriter, ClientError, ClientRequestWriter};
use crate::binder::FileUpload;
use crate::codec::{CodecRegistry, Payload, BYTE_STREAM_MIME, MULTIPART_FORM_MIME, URLENCODED_FORM_MIME};
use crate::negotiate::parse_media_type;

type Values = BTreeMap<String, Vec<String>>;

/// An outbound request under construction.
///
/// Setters replace earlier values of the same name. Query and form values are kept
/// sorted by name, so the rendered request is deterministic.
#[derive(Debug)]
pub struct ClientRequest {
    method: Method,
    path_pattern: String,
    headers: HeaderMap,
    path_params: HashMap<String, String>,
    query: Values,
    form_fields: Values,
    file_fields: BTreeMap<String, Vec<FileUpload>>,
    payload: Option<Payload>,
}

impl ClientRequest {
    /// `path_pattern` uses `{name}` placeholders and may carry a static query string.
    pub fn new(method: Method, path_pattern: impl Into<String>) -> Self {
        Self {
            method,
            path_pattern: path_pattern.into(),
            headers: HeaderMap::new(),
            path_params: HashMap::new(),
            query: Values::new(),
            form_fields: Values::new(),
            file_fields: BTreeMap::new(),
            payload: None,
        }
    }

    /// A request with the parameters `writer` sets.
    pub fn from_writer(
        method: Method,
        path_pattern: impl Into<String>,
        writer: &dyn ClientRequestWriter,
    ) -> Result<Self, ClientError> {
        let mut request = Self::new(method, path_pattern);
        writer.write_to_request(&mut request)?;
        Ok(request)
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn path_pattern(&self) -> &str {
        &self.path_pattern
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// First value of a header.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn set_header_param(&mut self, name: &str, values: &[&str]) -> Result<(), ClientError> {
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|e| ClientError::InvalidHeader {
            name: name.to_string(),
            reason: e.to_string(),
        })?;
        let mut parsed = Vec::with_capacity(values.len());
        for value in values {
            parsed.push(HeaderValue::from_str(value).map_err(|e| ClientError::InvalidHeader {
                name: name.to_string(),
                reason: e.to_string(),
            })?);
        }
        self.headers.remove(&header);
        for value in parsed {
            self.headers.append(header.clone(), value);
        }
        Ok(())
    }

    pub fn set_path_param(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.path_params.insert(name.into(), value.into());
    }

    #[must_use]
    pub fn path_param(&self, name: &str) -> Option<&str> {
        self.path_params.get(name).map(String::as_str)
    }

    pub fn set_query_param(&mut self, name: impl Into<String>, values: &[&str]) {
        self.query.insert(name.into(), to_owned(values));
    }

    #[must_use]
    pub fn query_values(&self, name: &str) -> Option<&[String]> {
        self.query.get(name).map(Vec::as_slice)
    }

    pub fn set_form_param(&mut self, name: impl Into<String>, values: &[&str]) {
        self.form_fields.insert(name.into(), to_owned(values));
    }

    #[must_use]
    pub fn form_values(&self, name: &str) -> Option<&[String]> {
        self.form_fields.get(name).map(Vec::as_slice)
    }

    /// Attach in-memory files. Any file turns the body into `multipart/form-data`.
    pub fn set_file_param(&mut self, name: impl Into<String>, files: Vec<FileUpload>) {
        self.file_fields.insert(name.into(), files);
    }

    /// Attach files read from disk, named after their last path component.
    ///
    /// # Errors
    ///
    /// Fails when a path cannot be read as a regular file.
    pub fn set_file_param_from_paths<P: AsRef<Path>>(
        &mut self,
        name: impl Into<String>,
        paths: &[P],
    ) -> Result<(), ClientError> {
        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let path = path.as_ref();
            let file_error = |source| ClientError::File {
                path: path.display().to_string(),
                source,
            };
            let data = std::fs::read(path).map_err(file_error)?;
            let filename = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            files.push(FileUpload::new(filename, None, data));
        }
        self.set_file_param(name, files);
        Ok(())
    }

    #[must_use]
    pub fn files(&self, name: &str) -> Option<&[FileUpload]> {
        self.file_fields.get(name).map(Vec::as_slice)
    }

    /// Set the body, encoded at build time by the producer for the request media type.
    pub fn set_body_param(&mut self, payload: Payload) {
        self.payload = Some(payload);
    }

    #[must_use]
    pub fn has_body(&self) -> bool {
        self.payload.is_some()
    }

    /// Render the request.
    ///
    /// `media_type` is the operation's request media type. Form fields and files take
    /// precedence over a body parameter: files (or a multipart media type) produce a
    /// `multipart/form-data` body, plain fields a urlencoded one. Otherwise a body
    /// parameter is encoded by the producer registered for `media_type`.
    ///
    /// `base_path` is prefixed to the expanded path. Query strings on the base path,
    /// the path pattern and the query parameters merge per name in that order, the
    /// later source replacing the earlier.
    ///
    /// # Errors
    ///
    /// An unset path parameter, a media type without producer, an encoding failure,
    /// or an auth writer error.
    pub fn build_http(
        mut self,
        media_type: &str,
        base_path: &str,
        codecs: &CodecRegistry,
        auth: Option<&dyn ClientAuthInfoWriter>,
    ) -> Result<http::Request<Vec<u8>>, ClientError> {
        if let Some(auth) = auth {
            auth.authenticate_request(&mut self)?;
        }

        let essence = parse_media_type(media_type)
            .map(|m| m.essence)
            .unwrap_or_else(|_| media_type.to_string());
        let uri = self.render_uri(base_path)?;

        let body = if !self.file_fields.is_empty()
            || (!self.form_fields.is_empty() && essence == MULTIPART_FORM_MIME)
        {
            let boundary = format!("brrtr{}", ulid::Ulid::new());
            let body = write_multipart(&self.form_fields, &self.file_fields, &boundary);
            self.set_content_type(&format!("{MULTIPART_FORM_MIME}; boundary={boundary}"))?;
            Some(body)
        } else if !self.form_fields.is_empty() {
            let mut encoder = url::form_urlencoded::Serializer::new(String::new());
            for (name, values) in &self.form_fields {
                for value in values {
                    encoder.append_pair(name, value);
                }
            }
            self.set_content_type(URLENCODED_FORM_MIME)?;
            Some(encoder.finish().into_bytes())
        } else if let Some(payload) = self.payload.take() {
            let producer = codecs
                .producer_for(&essence)
                .ok_or_else(|| ClientError::NoProducer(essence.clone()))?;
            let mut body = Vec::new();
            producer.produce(&mut body, payload)?;
            if !self.headers.contains_key(CONTENT_TYPE) {
                self.set_content_type(media_type)?;
            }
            Some(body)
        } else {
            None
        };

        if let Some(body) = &body {
            self.headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        }
        debug!(
            method = %self.method,
            uri = %uri,
            content_type = ?self.header(CONTENT_TYPE.as_str()),
            body_len = body.as_ref().map_or(0, Vec::len),
            "Client request built"
        );

        let mut request = http::Request::builder()
            .method(self.method)
            .uri(uri)
            .body(body.unwrap_or_default())?;
        *request.headers_mut() = self.headers;
        Ok(request)
    }

    fn set_content_type(&mut self, value: &str) -> Result<(), ClientError> {
        self.set_header_param(CONTENT_TYPE.as_str(), &[value])
    }

    fn render_uri(&self, base_path: &str) -> Result<String, ClientError> {
        let (base, base_query) = split_query(base_path);
        let (pattern, pattern_query) = split_query(&self.path_pattern);
        let expanded = expand_path(pattern, &self.path_params)?;

        let mut path = base.trim_end_matches('/').to_string();
        if !expanded.starts_with('/') {
            path.push('/');
        }
        path.push_str(&expanded);

        let mut query = parse_query(base_query);
        query.extend(parse_query(pattern_query));
        query.extend(self.query.iter().map(|(k, v)| (k.clone(), v.clone())));
        if query.is_empty() {
            return Ok(path);
        }

        let mut encoder = url::form_urlencoded::Serializer::new(String::new());
        for (name, values) in &query {
            for value in values {
                encoder.append_pair(name, value);
            }
        }
        Ok(format!("{path}?{}", encoder.finish()))
    }
}

fn to_owned(values: &[&str]) -> Vec<String> {
    values.iter().map(|v| (*v).to_string()).collect()
}

fn split_query(raw: &str) -> (&str, Option<&str>) {
    match raw.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (raw, None),
    }
}

fn parse_query(raw: Option<&str>) -> Values {
    let mut values = Values::new();
    for (name, value) in url::form_urlencoded::parse(raw.unwrap_or_default().as_bytes()) {
        values.entry(name.into_owned()).or_default().push(value.into_owned());
    }
    values
}

/// Replace every `{name}` with its percent-encoded value.
fn expand_path(pattern: &str, params: &HashMap<String, String>) -> Result<String, ClientError> {
    let mut out = String::with_capacity(pattern.len());
    let mut rest = pattern;
    while let Some(open) = rest.find('{') {
        let Some(close) = rest[open..].find('}').map(|c| open + c) else {
            break;
        };
        let name = &rest[open + 1..close];
        let value = params
            .get(name)
            .ok_or_else(|| ClientError::MissingPathParam(name.to_string()))?;
        out.push_str(&rest[..open]);
        out.push_str(&urlencoding::encode(value));
        rest = &rest[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}

fn quote(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('"', "\\\"")
}

fn write_multipart(
    fields: &Values,
    files: &BTreeMap<String, Vec<FileUpload>>,
    boundary: &str,
) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, values) in fields {
        for value in values {
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", quote(name)).as_bytes(),
            );
            body.extend_from_slice(value.as_bytes());
            body.extend_from_slice(b"\r\n");
        }
    }
    for (name, uploads) in files {
        for upload in uploads {
            let content_type = upload.header.content_type.as_deref().unwrap_or(BYTE_STREAM_MIME);
            body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: {content_type}\r\n\r\n",
                    quote(name),
                    quote(upload.filename()),
                )
                .as_bytes(),
            );
            body.extend_from_slice(upload.content());
            body.extend_from_slice(b"\r\n");
        }
    }
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binder::parse_multipart;
    use serde::Serialize;
    use std::io::Write;

    #[derive(Serialize)]
    struct Hobbyist {
        #[serde(rename = "Name")]
        name: &'static str,
        #[serde(rename = "Hobby")]
        hobby: &'static str,
    }

    fn hobbyists() -> Vec<Hobbyist> {
        vec![
            Hobbyist { name: "Tom", hobby: "Organ trail" },
            Hobbyist { name: "John", hobby: "Bird watching" },
        ]
    }

    fn flats(req: &mut ClientRequest) -> Result<(), ClientError> {
        req.set_query_param("hello", &["world"]);
        req.set_path_param("id", "1234");
        req.set_header_param("X-Rate-Limit", &["200"])
    }

    fn codecs() -> CodecRegistry {
        CodecRegistry::with_defaults()
    }

    fn text(body: &[u8]) -> &str {
        std::str::from_utf8(body).unwrap()
    }

    #[test]
    fn test_setters_replace_values() {
        let mut req = ClientRequest::new(Method::GET, "/flats/{id}/");
        req.set_header_param("X-Rate-Limit", &["500"]).unwrap();
        req.set_header_param("X-Rate-Limit", &["400"]).unwrap();
        assert_eq!(req.header("x-rate-limit"), Some("400"));

        req.set_header_param("X-Accepts", &["json", "xml", "yaml"]).unwrap();
        let accepts: Vec<&str> = req
            .headers()
            .get_all("x-accepts")
            .iter()
            .map(|v| v.to_str().unwrap())
            .collect();
        assert_eq!(accepts, vec!["json", "xml", "yaml"]);

        req.set_query_param("goodbye", &["cruel", "world"]);
        assert_eq!(req.query_values("goodbye").unwrap(), ["cruel", "world"]);
        req.set_form_param("hello", &["world"]);
        assert_eq!(req.form_values("hello").unwrap(), ["world"]);
        req.set_path_param("id", "1345");
        assert_eq!(req.path_param("id"), Some("1345"));

        assert!(req.set_header_param("bad header", &["x"]).is_err());
    }

    #[test]
    fn test_no_payload() {
        let req = ClientRequest::from_writer(Method::POST, "/flats/{id}/", &flats).unwrap();
        let http = req.build_http("application/json", "", &codecs(), None).unwrap();
        assert_eq!(http.headers()["x-rate-limit"], "200");
        assert_eq!(http.uri(), "/flats/1234/?hello=world");
        assert!(http.body().is_empty());
        assert!(!http.headers().contains_key(CONTENT_TYPE));
    }

    #[test]
    fn test_json_payload_goes_through_producer() {
        let mut req = ClientRequest::from_writer(Method::POST, "/flats/{id}/", &flats).unwrap();
        req.set_body_param(Payload::structured(hobbyists()));
        let http = req.build_http("application/json", "", &codecs(), None).unwrap();

        let mut expected = serde_json::to_vec(&hobbyists()).unwrap();
        expected.push(b'\n');
        assert_eq!(http.body(), &expected);
        assert_eq!(http.headers()[CONTENT_TYPE], "application/json");
        assert_eq!(http.headers()[CONTENT_LENGTH], expected.len().to_string().as_str());
    }

    #[test]
    fn test_text_payload() {
        const NOTE: &str = "Tom: Organ trail; John: Bird watching";
        let mut req = ClientRequest::from_writer(Method::POST, "/flats/{id}/", &flats).unwrap();
        req.set_body_param(Payload::Text(NOTE.to_string()));
        let http = req.build_http("text/plain", "", &codecs(), None).unwrap();
        assert_eq!(text(http.body()), NOTE);
    }

    #[test]
    fn test_unknown_media_type_has_no_producer() {
        let mut req = ClientRequest::new(Method::POST, "/notes");
        req.set_body_param(Payload::Text("x".into()));
        let err = req
            .build_http("application/vnd.unknown", "", &CodecRegistry::new(), None)
            .unwrap_err();
        assert!(matches!(err, ClientError::NoProducer(m) if m == "application/vnd.unknown"));
    }

    #[test]
    fn test_form_fields_are_urlencoded() {
        let mut req = ClientRequest::from_writer(Method::POST, "/flats/{id}/", &flats).unwrap();
        req.set_form_param("something", &["some value"]);
        req.set_body_param(Payload::Text("ignored".into()));
        let http = req.build_http("application/json", "", &codecs(), None).unwrap();
        assert_eq!(text(http.body()), "something=some+value");
        assert_eq!(http.headers()[CONTENT_TYPE], URLENCODED_FORM_MIME);
        assert_eq!(http.headers()[CONTENT_LENGTH], "20");
    }

    #[test]
    fn test_multipart_form_fields() {
        let mut req = ClientRequest::new(Method::POST, "/flats");
        req.set_form_param("something", &["some value", "another value"]);
        let http = req.build_http(MULTIPART_FORM_MIME, "", &codecs(), None).unwrap();

        let content_type = http.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
        let boundary = content_type.split_once("boundary=").unwrap().1;
        let lines: Vec<&str> = text(http.body()).split("\r\n").collect();
        assert_eq!(lines.len(), 10);
        assert_eq!(lines[0], format!("--{boundary}"));
        assert_eq!(lines[1], "Content-Disposition: form-data; name=\"something\"");
        assert_eq!(lines[3], "some value");
        assert_eq!(lines[4], lines[0]);
        assert_eq!(lines[7], "another value");
        assert_eq!(lines[8], format!("--{boundary}--"));
    }

    #[test]
    fn test_files_switch_to_multipart() {
        let mut on_disk = tempfile::NamedTempFile::new().unwrap();
        on_disk.write_all(b"from disk").unwrap();

        let mut req = ClientRequest::from_writer(Method::POST, "/flats/{id}/", &flats).unwrap();
        req.set_form_param("something", &["some value"]);
        req.set_file_param(
            "file",
            vec![FileUpload::new("a.json", Some("application/json".into()), b"{}".to_vec())],
        );
        req.set_file_param_from_paths("otherfiles", &[on_disk.path()]).unwrap();
        req.set_file_param("empty", vec![FileUpload::new("empty.txt", None, Vec::new())]);
        let http = req.build_http("application/json", "", &codecs(), None).unwrap();

        let content_type = http.headers()[CONTENT_TYPE].to_str().unwrap().to_string();
        assert!(content_type.starts_with(MULTIPART_FORM_MIME));
        let boundary = content_type.split_once("boundary=").unwrap().1;
        let form = parse_multipart(http.body(), boundary).unwrap();

        assert_eq!(form.values("something"), Some(&["some value".to_string()][..]));
        let file = form.file("file").unwrap();
        assert_eq!(file.filename(), "a.json");
        assert_eq!(file.header.content_type.as_deref(), Some("application/json"));
        let other = form.file("otherfiles").unwrap();
        assert_eq!(other.content(), b"from disk");
        assert_eq!(other.header.content_type.as_deref(), Some(BYTE_STREAM_MIME));
        assert!(form.file("empty").unwrap().content().is_empty());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let mut req = ClientRequest::new(Method::POST, "/upload");
        let err = req
            .set_file_param_from_paths("file", &["./i-dont-exist"])
            .unwrap_err();
        assert!(matches!(err, ClientError::File { .. }));
    }

    #[test]
    fn test_base_path_and_escaped_path_params() {
        let mut req = ClientRequest::new(Method::GET, "/flats/{id}/");
        req.set_path_param("id", "1234/?*&^%");
        let http = req.build_http("application/json", "/basepath", &codecs(), None).unwrap();
        assert_eq!(http.uri().path(), "/basepath/flats/1234%2F%3F%2A%26%5E%25/");

        let req = ClientRequest::new(Method::GET, "/flats/{id}/");
        let err = req.build_http("application/json", "", &codecs(), None).unwrap_err();
        assert!(matches!(err, ClientError::MissingPathParam(name) if name == "id"));
    }

    #[test]
    fn test_query_sources_merge_in_order() {
        let mut req = ClientRequest::new(Method::GET, "/flats/{id}/?hello=world&foo=bar");
        req.set_path_param("id", "1");
        let http = req.build_http("application/json", "/basepath?hello=kitty&x=1", &codecs(), None).unwrap();
        assert_eq!(http.uri(), "/basepath/flats/1/?foo=bar&hello=world&x=1");

        let mut req = ClientRequest::new(Method::GET, "/flats/{id}/?hello=world");
        req.set_path_param("id", "1");
        req.set_query_param("hello", &["there"]);
        let http = req.build_http("application/json", "/basepath?hello=kitty", &codecs(), None).unwrap();
        assert_eq!(http.uri().query(), Some("hello=there"));
    }

    #[test]
    fn test_auth_writer_overrides_request_writer() {
        let auth = |req: &mut ClientRequest| -> Result<(), ClientError> {
            req.set_query_param("hello", &["world"]);
            req.set_path_param("id", "1234");
            req.set_header_param("X-Rate-Limit", &["200"])
        };
        let wrong = |req: &mut ClientRequest| -> Result<(), ClientError> {
            req.set_query_param("hello", &["wrong"]);
            req.set_path_param("id", "wrong");
            req.set_header_param("X-Rate-Limit", &["wrong"])
        };
        let req = ClientRequest::from_writer(Method::GET, "/flats/{id}/", &wrong).unwrap();
        let http = req.build_http("application/json", "", &codecs(), Some(&auth)).unwrap();
        assert_eq!(http.headers()["x-rate-limit"], "200");
        assert_eq!(http.uri(), "/flats/1234/?hello=world");
    }
}
