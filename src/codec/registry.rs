use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{
    ByteStreamConsumer, ByteStreamProducer, Consumer, CsvConsumer, CsvProducer, FormConsumer,
    FormProducer, JsonConsumer, JsonProducer, Producer, TextConsumer, TextProducer, XmlConsumer,
    XmlProducer, YamlConsumer, YamlProducer, BYTE_STREAM_MIME, CSV_MIME, JSON_MIME, TEXT_MIME,
    TEXT_XML_MIME, URLENCODED_FORM_MIME, WILDCARD_MIME, XML_MIME, YAML_ALT_MIME, YAML_MIME,
};

/// MIME type -> codec tables.
///
/// Registration takes `&mut self` and happens during setup; once the registry is
/// shared (usually inside an `Arc<Api>`) it is only read, so lookups take no lock.
#[derive(Clone, Default)]
pub struct CodecRegistry {
    consumers: HashMap<String, Arc<dyn Consumer>>,
    producers: HashMap<String, Arc<dyn Producer>>,
}

impl CodecRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the standard codecs installed.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        let json = Arc::new(JsonConsumer);
        let xml = Arc::new(XmlConsumer);
        let yaml = Arc::new(YamlConsumer);
        registry.register_consumer(JSON_MIME, json);
        registry.register_consumer(XML_MIME, Arc::clone(&xml) as Arc<dyn Consumer>);
        registry.register_consumer(TEXT_XML_MIME, xml);
        registry.register_consumer(YAML_MIME, Arc::clone(&yaml) as Arc<dyn Consumer>);
        registry.register_consumer(YAML_ALT_MIME, yaml);
        registry.register_consumer(TEXT_MIME, Arc::new(TextConsumer));
        registry.register_consumer(CSV_MIME, Arc::new(CsvConsumer::default()));
        registry.register_consumer(BYTE_STREAM_MIME, Arc::new(ByteStreamConsumer::default()));
        registry.register_consumer(URLENCODED_FORM_MIME, Arc::new(FormConsumer));

        let xml = Arc::new(XmlProducer);
        let yaml = Arc::new(YamlProducer);
        registry.register_producer(JSON_MIME, Arc::new(JsonProducer));
        registry.register_producer(XML_MIME, Arc::clone(&xml) as Arc<dyn Producer>);
        registry.register_producer(TEXT_XML_MIME, xml);
        registry.register_producer(YAML_MIME, Arc::clone(&yaml) as Arc<dyn Producer>);
        registry.register_producer(YAML_ALT_MIME, yaml);
        registry.register_producer(TEXT_MIME, Arc::new(TextProducer));
        registry.register_producer(CSV_MIME, Arc::new(CsvProducer::default()));
        registry.register_producer(BYTE_STREAM_MIME, Arc::new(ByteStreamProducer));
        registry.register_producer(URLENCODED_FORM_MIME, Arc::new(FormProducer));
        registry
    }

    /// Register (or replace) the consumer for `mime`. `*/*` registers the fallback.
    pub fn register_consumer(&mut self, mime: impl Into<String>, consumer: Arc<dyn Consumer>) {
        let mime = mime.into();
        debug!(mime = %mime, "Registered consumer");
        self.consumers.insert(mime, consumer);
    }

    /// Register (or replace) the producer for `mime`. `*/*` registers the fallback.
    pub fn register_producer(&mut self, mime: impl Into<String>, producer: Arc<dyn Producer>) {
        let mime = mime.into();
        debug!(mime = %mime, "Registered producer");
        self.producers.insert(mime, producer);
    }

    /// Exact match on the media type, then the `*/*` entry.
    #[must_use]
    pub fn consumer_for(&self, mime: &str) -> Option<Arc<dyn Consumer>> {
        self.consumers
            .get(mime)
            .or_else(|| self.consumers.get(WILDCARD_MIME))
            .cloned()
    }

    /// Exact match on the media type, then the `*/*` entry.
    #[must_use]
    pub fn producer_for(&self, mime: &str) -> Option<Arc<dyn Producer>> {
        self.producers
            .get(mime)
            .or_else(|| self.producers.get(WILDCARD_MIME))
            .cloned()
    }

    /// Consumers for each listed media type that has one (including via `*/*`).
    #[must_use]
    pub fn consumers_for(&self, mimes: &[String]) -> HashMap<String, Arc<dyn Consumer>> {
        mimes
            .iter()
            .filter_map(|m| self.consumer_for(m).map(|c| (m.clone(), c)))
            .collect()
    }

    /// Producers for each listed media type that has one (including via `*/*`).
    #[must_use]
    pub fn producers_for(&self, mimes: &[String]) -> HashMap<String, Arc<dyn Producer>> {
        mimes
            .iter()
            .filter_map(|m| self.producer_for(m).map(|p| (m.clone(), p)))
            .collect()
    }

    /// Registered consumer media types, sorted.
    #[must_use]
    pub fn consumer_mimes(&self) -> Vec<String> {
        let mut mimes: Vec<String> = self.consumers.keys().cloned().collect();
        mimes.sort();
        mimes
    }

    /// Registered producer media types, sorted.
    #[must_use]
    pub fn producer_mimes(&self) -> Vec<String> {
        let mut mimes: Vec<String> = self.producers.keys().cloned().collect();
        mimes.sort();
        mimes
    }
}

impl std::fmt::Debug for CodecRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CodecRegistry")
            .field("consumers", &self.consumer_mimes())
            .field("producers", &self.producer_mimes())
            .finish()
    }
}
