use crate::error::IngestError;
use crate::rlp::RlpGatewayClient;
use crate::uaa::UaaClient;
use futures::{pin_mut, StreamExt};
use nozzle_config::Configuration;
use nozzle_types::Envelope;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Capacity of the envelope hand-off channel.
pub const ENVELOPE_BUFFER_SIZE: usize = 10_000;

/// Drains the RLP egress stream into a bounded in-process channel.
///
/// The channel is the backpressure boundary between the gateway transport
/// and the cache: when the consumer falls behind, envelopes are dropped
/// rather than stalling the stream. Dropped envelopes are counted.
#[derive(Debug)]
pub struct Nozzle {
    gateway: Arc<RlpGatewayClient>,
    sender: Option<mpsc::Sender<Envelope>>,
    receiver: Option<mpsc::Receiver<Envelope>>,
    cancel: CancellationToken,
    dropped: Arc<AtomicU64>,
}

impl Nozzle {
    pub fn new(config: &Configuration) -> Result<Self, IngestError> {
        let uaa = if config.disable_access_control {
            None
        } else {
            Some(UaaClient::new(
                &config.uaa_url,
                &config.uaa_username,
                &config.uaa_password,
                config.insecure_ssl_skip_verify,
            )?)
        };

        let gateway = Arc::new(RlpGatewayClient::new(
            &config.rlp_url,
            &config.subscription_id,
            uaa,
            config.insecure_ssl_skip_verify,
        )?);

        let (sender, receiver) = mpsc::channel(ENVELOPE_BUFFER_SIZE);

        Ok(Self {
            gateway,
            sender: Some(sender),
            receiver: Some(receiver),
            cancel: CancellationToken::new(),
            dropped: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Spawns the ingest task. Fetches the initial UAA token first so a
    /// misconfigured UAA fails startup. Calling `start` again is a no-op.
    ///
    /// The sender moves into the task; when the stream is cancelled the
    /// task exits and the message channel closes behind it.
    pub async fn start(&mut self) -> Result<(), IngestError> {
        let Some(sender) = self.sender.take() else {
            warn!("nozzle already started");
            return Ok(());
        };

        info!("starting firehose nozzle");
        self.gateway.prime_token().await?;

        let gateway = Arc::clone(&self.gateway);
        let dropped = Arc::clone(&self.dropped);
        let cancel = self.cancel.clone();

        tokio::spawn(async move {
            let stream = gateway.stream(cancel);
            pin_mut!(stream);

            while let Some(batch) = stream.next().await {
                for envelope in batch.batch {
                    if !enqueue(&sender, envelope, &dropped) {
                        return;
                    }
                }
            }
            debug!("ingest task exiting");
        });

        Ok(())
    }

    /// Hands out the single consumer end of the envelope channel. A second
    /// call returns an already-closed channel.
    pub fn messages(&mut self) -> mpsc::Receiver<Envelope> {
        match self.receiver.take() {
            Some(receiver) => receiver,
            None => {
                warn!("nozzle messages() called twice, returning closed channel");
                mpsc::channel(1).1
            }
        }
    }

    /// Cancels the stream; the ingest task terminates and the message
    /// channel closes.
    pub fn stop(&self) {
        info!("stopping firehose nozzle");
        self.cancel.cancel();
    }

    /// Envelopes discarded because the channel was full.
    pub fn dropped_envelopes(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Drop for Nozzle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Non-blocking enqueue with drop-on-full. Returns `false` once the
/// consumer is gone.
fn enqueue(sender: &mpsc::Sender<Envelope>, envelope: Envelope, dropped: &AtomicU64) -> bool {
    match sender.try_send(envelope) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            let total = dropped.fetch_add(1, Ordering::Relaxed) + 1;
            debug!(total_dropped = total, "envelope channel full, dropping envelope");
            true
        }
        Err(TrySendError::Closed(_)) => {
            debug!("envelope channel closed, stopping ingest");
            false
        }
    }
}
