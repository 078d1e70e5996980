use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A single message from the RLP envelope stream.
///
/// Only the `counter` and `gauge` payload variants are modeled; any other
/// payload key on the wire is ignored during deserialization, which makes
/// those envelopes carry no message at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Envelope {
    /// Nanoseconds since the Unix epoch, assigned by the emitter.
    #[serde(with = "int64")]
    pub timestamp: i64,
    pub source_id: String,
    pub instance_id: String,
    pub tags: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub counter: Option<Counter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gauge: Option<Gauge>,
}

impl Envelope {
    /// The metric payload carried by this envelope, if any.
    pub fn message(&self) -> Option<Message<'_>> {
        if let Some(counter) = &self.counter {
            return Some(Message::Counter(counter));
        }
        if let Some(gauge) = &self.gauge {
            return Some(Message::Gauge(gauge));
        }
        None
    }

    /// Looks up a tag value, defaulting to the empty string when absent.
    pub fn tag(&self, name: &str) -> &str {
        self.tags.get(name).map(String::as_str).unwrap_or_default()
    }
}

/// Borrowed view over an envelope's payload variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Message<'a> {
    Counter(&'a Counter),
    Gauge(&'a Gauge),
}

/// A monotonically increasing counter sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Counter {
    pub name: String,
    #[serde(with = "uint64")]
    pub delta: u64,
    #[serde(with = "uint64")]
    pub total: u64,
}

/// A set of named point-in-time float samples.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Gauge {
    pub metrics: HashMap<String, GaugeValue>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GaugeValue {
    pub unit: String,
    pub value: f64,
}

/// One frame of the egress stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvelopeBatch {
    pub batch: Vec<Envelope>,
}

mod int64 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_i64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(i64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}

mod uint64 {
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u64, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(*value)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Repr {
            Number(u64),
            Text(String),
        }

        match Repr::deserialize(deserializer)? {
            Repr::Number(value) => Ok(value),
            Repr::Text(text) => text.parse().map_err(de::Error::custom),
        }
    }
}
