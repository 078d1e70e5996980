use crate::metric::Metric;
use nozzle_types::{tags, Envelope, Message};
use parking_lot::RwLock;
use serde::ser::{SerializeMap, SerializeStruct};
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::trace;

/// All metrics held for one emitter instance.
///
/// Identity is immutable after creation. The metric maps are guarded by the
/// resource's own lock, so readers serializing a snapshot see a
/// prefix-consistent view of every per-name sequence while other resources
/// keep accepting writes.
#[derive(Debug)]
pub struct Resource {
    deployment: String,
    job: String,
    index: String,
    ip: String,
    metrics: RwLock<MetricStore>,
}

#[derive(Debug, Default)]
struct MetricStore {
    value_metrics: HashMap<String, Vec<Metric>>,
    counter_metrics: HashMap<String, Vec<Metric>>,
}

impl Resource {
    pub fn new(
        deployment: impl Into<String>,
        job: impl Into<String>,
        index: impl Into<String>,
        ip: impl Into<String>,
    ) -> Self {
        Self {
            deployment: deployment.into(),
            job: job.into(),
            index: index.into(),
            ip: ip.into(),
            metrics: RwLock::new(MetricStore::default()),
        }
    }

    pub fn from_envelope(envelope: &Envelope) -> Self {
        Self::new(
            envelope.tag(tags::DEPLOYMENT),
            envelope.tag(tags::JOB),
            envelope.tag(tags::INDEX),
            envelope.tag(tags::IP),
        )
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn index(&self) -> &str {
        &self.index
    }

    pub fn ip(&self) -> &str {
        &self.ip
    }

    /// Appends every metric carried by the envelope.
    ///
    /// All samples from one envelope share the envelope timestamp and a
    /// single expiry instant. Envelopes without a counter or gauge payload
    /// are ignored.
    pub fn add_metric(&self, envelope: &Envelope, ttl: Duration) {
        let expires_at = Instant::now() + ttl;
        let mut store = self.metrics.write();

        match envelope.message() {
            Some(Message::Gauge(gauge)) => {
                for (name, sample) in &gauge.metrics {
                    trace!(name = %name, value = sample.value, "caching gauge metric");
                    store
                        .value_metrics
                        .entry(name.clone())
                        .or_default()
                        .push(Metric::new(sample.value, envelope.timestamp, expires_at));
                }
            }
            Some(Message::Counter(counter)) => {
                trace!(name = %counter.name, total = counter.total, "caching counter metric");
                store
                    .counter_metrics
                    .entry(counter.name.clone())
                    .or_default()
                    .push(Metric::new(
                        counter.total as f64,
                        envelope.timestamp,
                        expires_at,
                    ));
            }
            None => {}
        }
    }

    /// Drops expired metrics, preserving the arrival order of survivors.
    /// Names left without samples are removed entirely.
    pub fn cleanup(&self, now: Instant) {
        let mut guard = self.metrics.write();
        let store = &mut *guard;

        for metrics in [&mut store.value_metrics, &mut store.counter_metrics] {
            metrics.retain(|_, samples| {
                samples.retain(|metric| !metric.expired(now));
                !samples.is_empty()
            });
        }
    }

    pub fn is_empty(&self) -> bool {
        let store = self.metrics.read();
        store.value_metrics.values().all(Vec::is_empty)
            && store.counter_metrics.values().all(Vec::is_empty)
    }

    #[cfg(test)]
    pub(crate) fn value_metric_tail(&self, name: &str) -> Option<Metric> {
        let store = self.metrics.read();
        store.value_metrics.get(name)?.last().cloned()
    }

    #[cfg(test)]
    pub(crate) fn counter_metric_tail(&self, name: &str) -> Option<Metric> {
        let store = self.metrics.read();
        store.counter_metrics.get(name)?.last().cloned()
    }

    #[cfg(test)]
    pub(crate) fn value_metric_count(&self, name: &str) -> usize {
        let store = self.metrics.read();
        store.value_metrics.get(name).map_or(0, Vec::len)
    }
}

impl Serialize for Resource {
    /// Serializes under the resource's read lock so the emitted snapshot is
    /// internally consistent.
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let store = self.metrics.read();

        let mut state = serializer.serialize_struct("Resource", 6)?;
        state.serialize_field("Deployment", &self.deployment)?;
        state.serialize_field("Job", &self.job)?;
        state.serialize_field("Index", &self.index)?;
        state.serialize_field("IP", &self.ip)?;
        state.serialize_field("ValueMetrics", &MetricMap(&store.value_metrics))?;
        state.serialize_field("CounterMetrics", &MetricMap(&store.counter_metrics))?;
        state.end()
    }
}

/// Renders `name -> {"metrics": [...]}` entries.
struct MetricMap<'a>(&'a HashMap<String, Vec<Metric>>);

impl Serialize for MetricMap<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (name, samples) in self.0 {
            map.serialize_entry(name, &MetricList(samples))?;
        }
        map.end()
    }
}

struct MetricList<'a>(&'a [Metric]);

impl Serialize for MetricList<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("Metrics", 1)?;
        state.serialize_field("metrics", &self.0)?;
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nozzle_types::{Counter, Gauge, GaugeValue};

    fn gauge_envelope(timestamp: i64, samples: &[(&str, f64)]) -> Envelope {
        Envelope {
            timestamp,
            gauge: Some(Gauge {
                metrics: samples
                    .iter()
                    .map(|(name, value)| {
                        (
                            name.to_string(),
                            GaugeValue {
                                unit: String::new(),
                                value: *value,
                            },
                        )
                    })
                    .collect(),
            }),
            ..Envelope::default()
        }
    }

    fn counter_envelope(timestamp: i64, name: &str, delta: u64, total: u64) -> Envelope {
        Envelope {
            timestamp,
            counter: Some(Counter {
                name: name.to_string(),
                delta,
                total,
            }),
            ..Envelope::default()
        }
    }

    const TTL: Duration = Duration::from_secs(10);

    #[test]
    fn gauge_samples_append_in_arrival_order() {
        let resource = Resource::new("d", "j", "0", "1.2.3.4");

        resource.add_metric(&gauge_envelope(1, &[("cpu", 0.1)]), TTL);
        resource.add_metric(&gauge_envelope(2, &[("cpu", 0.2)]), TTL);

        assert_eq!(resource.value_metric_count("cpu"), 2);
        let tail = resource.value_metric_tail("cpu").unwrap();
        assert_eq!(tail.value, 0.2);
        assert_eq!(tail.timestamp, 2);
    }

    #[test]
    fn counter_stores_total_and_ignores_delta() {
        let resource = Resource::new("d", "j", "0", "1.2.3.4");

        resource.add_metric(&counter_envelope(5, "requests", 5, 100), TTL);

        let tail = resource.counter_metric_tail("requests").unwrap();
        assert_eq!(tail.value, 100.0);
        assert_eq!(tail.timestamp, 5);
        assert!(resource.value_metric_tail("requests").is_none());
    }

    #[test]
    fn multi_key_gauge_shares_timestamp() {
        let resource = Resource::new("d", "j", "0", "1.2.3.4");

        resource.add_metric(&gauge_envelope(9, &[("cpu", 0.1), ("mem", 2048.0)]), TTL);

        assert_eq!(resource.value_metric_tail("cpu").unwrap().timestamp, 9);
        assert_eq!(resource.value_metric_tail("mem").unwrap().timestamp, 9);
    }

    #[test]
    fn payload_free_envelope_is_ignored() {
        let resource = Resource::new("d", "j", "0", "1.2.3.4");
        resource.add_metric(&Envelope::default(), TTL);
        assert!(resource.is_empty());
    }

    #[test]
    fn cleanup_drops_expired_and_preserves_survivor_order() {
        let resource = Resource::new("d", "j", "0", "1.2.3.4");

        resource.add_metric(&gauge_envelope(1, &[("cpu", 0.1)]), Duration::ZERO);
        resource.add_metric(&gauge_envelope(2, &[("cpu", 0.2)]), TTL);
        resource.add_metric(&gauge_envelope(3, &[("cpu", 0.3)]), TTL);

        resource.cleanup(Instant::now());

        assert_eq!(resource.value_metric_count("cpu"), 2);
        let tail = resource.value_metric_tail("cpu").unwrap();
        assert_eq!(tail.timestamp, 3);
    }

    #[test]
    fn cleanup_empties_resource_when_everything_expired() {
        let resource = Resource::new("d", "j", "0", "1.2.3.4");

        resource.add_metric(&counter_envelope(1, "requests", 1, 1), Duration::ZERO);
        assert!(!resource.is_empty());

        resource.cleanup(Instant::now());
        assert!(resource.is_empty());
        assert!(resource.counter_metric_tail("requests").is_none());
    }

    #[test]
    fn serializes_identity_and_metric_maps() {
        let resource = Resource::new("d", "j", "0", "1.2.3.4");
        resource.add_metric(
            &gauge_envelope(1_257_894_000_000_000_000, &[("cpu", 0.42)]),
            TTL,
        );

        let json = serde_json::to_value(&resource).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "Deployment": "d",
                "Job": "j",
                "Index": "0",
                "IP": "1.2.3.4",
                "ValueMetrics": {
                    "cpu": {"metrics": [{"value": 0.42, "timestamp": 1_257_894_000_000_000_000_i64}]}
                },
                "CounterMetrics": {}
            })
        );
    }
}
