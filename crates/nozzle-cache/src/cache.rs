use crate::resource::Resource;
use nozzle_types::{tags, Envelope};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Sweep cadence of the janitor task.
pub const JANITOR_INTERVAL: Duration = Duration::from_secs(10);

/// Builds the second-level cache key from an envelope's identity tags.
///
/// The delimiter is assumed not to occur inside tag values; the resource
/// itself carries the authoritative identity tuple.
pub fn envelope_fingerprint(envelope: &Envelope) -> String {
    format!(
        "{} | {} | {} | {}",
        envelope.tag(tags::DEPLOYMENT),
        envelope.tag(tags::JOB),
        envelope.tag(tags::INDEX),
        envelope.tag(tags::IP)
    )
}

type OriginBucket = HashMap<String, Arc<Resource>>;

/// Process-wide store of recent metrics, keyed origin -> fingerprint.
///
/// A single reader-writer lock guards the two-level map; each [`Resource`]
/// carries its own lock for its metric sequences. Reads hand out clones of
/// the `Arc`ed resources, so callers iterate and serialize without holding
/// the cache lock.
#[derive(Debug)]
pub struct TtlCache {
    ttl: Duration,
    origins: RwLock<HashMap<String, OriginBucket>>,
}

impl TtlCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            origins: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Appends the envelope's metrics to the resource it fingerprints,
    /// creating the resource (and its origin bucket) on first sight.
    pub fn update(&self, envelope: &Envelope) {
        let origin = envelope.tag(tags::ORIGIN);
        let fingerprint = envelope_fingerprint(envelope);
        trace!(origin = %origin, fingerprint = %fingerprint, "caching envelope");

        let resource = self.resolve(origin, fingerprint, envelope);
        resource.add_metric(envelope, self.ttl);
    }

    fn resolve(&self, origin: &str, fingerprint: String, envelope: &Envelope) -> Arc<Resource> {
        {
            let origins = self.origins.read();
            if let Some(resource) = origins
                .get(origin)
                .and_then(|bucket| bucket.get(&fingerprint))
            {
                return Arc::clone(resource);
            }
        }

        let mut origins = self.origins.write();
        let bucket = origins.entry(origin.to_string()).or_default();
        let resource = bucket
            .entry(fingerprint)
            .or_insert_with(|| Arc::new(Resource::from_envelope(envelope)));
        Arc::clone(resource)
    }

    /// Snapshot of every resource under an origin. `None` when the origin
    /// has never been seen or has been swept away.
    pub fn get_origin(&self, origin: &str) -> Option<OriginBucket> {
        self.origins.read().get(origin).cloned()
    }

    pub fn get_resource(&self, origin: &str, fingerprint: &str) -> Option<Arc<Resource>> {
        self.origins
            .read()
            .get(origin)
            .and_then(|bucket| bucket.get(fingerprint))
            .map(Arc::clone)
    }

    /// One janitor pass: expired metrics go first, then resources left
    /// empty, then origin buckets left empty.
    pub fn sweep(&self) {
        let now = Instant::now();
        let mut origins = self.origins.write();

        origins.retain(|origin, bucket| {
            bucket.retain(|fingerprint, resource| {
                resource.cleanup(now);
                let keep = !resource.is_empty();
                if !keep {
                    debug!(origin = %origin, fingerprint = %fingerprint, "evicting empty resource");
                }
                keep
            });
            !bucket.is_empty()
        });
    }

    /// Spawns the periodic sweep task; it runs until the token is cancelled.
    pub fn spawn_janitor(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(JANITOR_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => cache.sweep(),
                }
            }
        })
    }
}
