//! Queue drainer: publishes buffered telemetry in JSON batches.
//!
//! Every delivery interval, while the network link is up, batches of up to
//! [`DELIVERY_BATCH_SIZE`] samples are popped and published.  A batch the
//! uplink rejects goes back to the front of the queue unmodified and the
//! pass stops until the next interval.

use crate::config::{
    DELIVERY_BATCH_PAUSE_MS, DELIVERY_BATCH_SIZE, DELIVERY_INTERVAL_SECS,
    DELIVERY_PAYLOAD_CAPACITY,
};
use crate::error::Error;
use crate::provisioning::NetworkLink;
use crate::telemetry::encode_batch;
use crate::telemetry::queue::{Batch, TelemetryQueue};
use embassy_time::{Duration, Timer};
use heapless::String;

/// Transport that accepts one serialized batch at a time.
#[allow(async_fn_in_trait)]
pub trait Uplink {
    async fn publish(&mut self, payload: &str) -> Result<(), Error>;
}

pub struct DeliveryWorker<'a, U, const N: usize> {
    uplink: U,
    queue: &'a TelemetryQueue<N>,
    link: &'a NetworkLink,
    interval: Duration,
    pause: Duration,
}

impl<'a, U: Uplink, const N: usize> DeliveryWorker<'a, U, N> {
    pub fn new(uplink: U, queue: &'a TelemetryQueue<N>, link: &'a NetworkLink) -> Self {
        Self {
            uplink,
            queue,
            link,
            interval: Duration::from_secs(DELIVERY_INTERVAL_SECS),
            pause: Duration::from_millis(DELIVERY_BATCH_PAUSE_MS),
        }
    }

    pub fn with_timing(mut self, interval: Duration, pause: Duration) -> Self {
        self.interval = interval;
        self.pause = pause;
        self
    }

    pub fn uplink(&self) -> &U {
        &self.uplink
    }

    pub fn uplink_mut(&mut self) -> &mut U {
        &mut self.uplink
    }

    /// Publish until the queue is empty, the link drops or a publish
    /// fails.  Returns the number of samples delivered.
    pub async fn drain(&mut self) -> Result<usize, Error> {
        let mut delivered = 0;
        loop {
            if !self.link.is_connected() {
                return if delivered > 0 {
                    Ok(delivered)
                } else {
                    Err(Error::LinkDown)
                };
            }
            let batch: Batch = self.queue.pop_batch(DELIVERY_BATCH_SIZE);
            if batch.is_empty() {
                return Ok(delivered);
            }

            let payload: String<DELIVERY_PAYLOAD_CAPACITY> = match encode_batch(&batch) {
                Ok(p) => p,
                Err(e) => {
                    self.queue.requeue_batch(&batch);
                    error!("Batch of {} does not fit the payload buffer", batch.len());
                    return Err(e);
                }
            };

            if let Err(e) = self.uplink.publish(&payload).await {
                self.queue.requeue_batch(&batch);
                warn!(
                    "Publish of {} samples failed ({:?}), requeued",
                    batch.len(),
                    e
                );
                return Err(e);
            }

            delivered += batch.len();
            info!(
                "Published {} samples ({} bytes), {} left, {} lost to overflow",
                batch.len(),
                payload.len(),
                self.queue.len(),
                self.queue.evicted()
            );

            if self.queue.is_empty() {
                return Ok(delivered);
            }
            Timer::after(self.pause).await;
        }
    }

    /// Drain on every interval, forever.
    pub async fn run(&mut self) -> ! {
        info!("Delivery worker started");
        loop {
            Timer::after(self.interval).await;
            if !self.link.is_connected() {
                debug!("Link down, {} samples waiting", self.queue.len());
                continue;
            }
            if self.queue.is_empty() {
                continue;
            }
            if let Err(e) = self.drain().await {
                debug!("Delivery pass ended early: {:?}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::telemetry::Telemetry;
    use embassy_futures::block_on;

    #[derive(Default)]
    struct RecordingUplink {
        payloads: std::vec::Vec<std::string::String>,
        /// Fail the publish with this index (0-based).
        fail_at: Option<usize>,
        attempts: usize,
    }

    impl Uplink for RecordingUplink {
        async fn publish(&mut self, payload: &str) -> Result<(), Error> {
            let attempt = self.attempts;
            self.attempts += 1;
            if self.fail_at == Some(attempt) {
                return Err(Error::Publish);
            }
            self.payloads.push(payload.into());
            Ok(())
        }
    }

    fn t(ts: i64) -> Telemetry {
        Telemetry {
            timestamp: ts,
            temperature: 20.0,
            humidity: 40.0,
            pressure: 1013.25,
            detections: 1,
        }
    }

    fn fill<const N: usize>(q: &TelemetryQueue<N>, count: i64) {
        for i in 0..count {
            q.enqueue(t(i));
        }
    }

    fn fast<'a, const N: usize>(
        uplink: RecordingUplink,
        q: &'a TelemetryQueue<N>,
        link: &'a NetworkLink,
    ) -> DeliveryWorker<'a, RecordingUplink, N> {
        DeliveryWorker::new(uplink, q, link)
            .with_timing(Duration::from_millis(10), Duration::from_millis(1))
    }

    #[test]
    fn drains_in_batches_of_fifty() {
        let q: TelemetryQueue<256> = TelemetryQueue::new();
        let link = NetworkLink::new();
        link.set_connected(true);
        fill(&q, 120);

        let mut w = fast(RecordingUplink::default(), &q, &link);
        assert_eq!(block_on(w.drain()), Ok(120));
        assert!(q.is_empty());

        let sent = &w.uplink().payloads;
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].matches("\"timestamp\"").count(), 50);
        assert_eq!(sent[1].matches("\"timestamp\"").count(), 50);
        assert_eq!(sent[2].matches("\"timestamp\"").count(), 20);
        assert!(sent[0].starts_with("[{\"timestamp\":0,"));
        assert!(sent[2].ends_with("\"personCount\":1}]"));
    }

    #[test]
    fn failed_publish_requeues_and_stops() {
        let q: TelemetryQueue<256> = TelemetryQueue::new();
        let link = NetworkLink::new();
        link.set_connected(true);
        fill(&q, 120);

        let uplink = RecordingUplink {
            fail_at: Some(1),
            ..Default::default()
        };
        let mut w = fast(uplink, &q, &link);
        assert_eq!(block_on(w.drain()), Err(Error::Publish));
        assert_eq!(w.uplink().payloads.len(), 1);
        assert_eq!(q.len(), 70);

        // The failed batch is retried first, in order.
        let head = q.pop_batch::<1>(1);
        assert_eq!(head[0].timestamp, 50);
    }

    #[test]
    fn retry_after_failure_delivers_everything_once() {
        let q: TelemetryQueue<256> = TelemetryQueue::new();
        let link = NetworkLink::new();
        link.set_connected(true);
        fill(&q, 60);

        let uplink = RecordingUplink {
            fail_at: Some(0),
            ..Default::default()
        };
        let mut w = fast(uplink, &q, &link);
        assert!(block_on(w.drain()).is_err());
        assert_eq!(q.len(), 60);
        assert_eq!(block_on(w.drain()), Ok(60));

        let all: std::string::String = w.uplink().payloads.concat();
        for i in 0..60 {
            let key = format!("\"timestamp\":{},", i);
            assert_eq!(all.matches(key.as_str()).count(), 1, "timestamp {}", i);
        }
    }

    #[test]
    fn overflow_losses_stay_counted_across_delivery() {
        let q: TelemetryQueue<8> = TelemetryQueue::new();
        let link = NetworkLink::new();
        link.set_connected(true);
        fill(&q, 11);
        assert_eq!(q.evicted(), 3);

        let mut w = fast(RecordingUplink::default(), &q, &link);
        assert_eq!(block_on(w.drain()), Ok(8));
        assert!(w.uplink().payloads[0].starts_with("[{\"timestamp\":3,"));
        assert_eq!(q.evicted(), 3);
    }

    #[test]
    fn link_down_leaves_queue_alone() {
        let q: TelemetryQueue<16> = TelemetryQueue::new();
        let link = NetworkLink::new();
        fill(&q, 5);
        let mut w = fast(RecordingUplink::default(), &q, &link);
        assert_eq!(block_on(w.drain()), Err(Error::LinkDown));
        assert_eq!(q.len(), 5);
        assert_eq!(w.uplink().attempts, 0);
    }

    #[test]
    fn empty_queue_is_nothing_to_do() {
        let q: TelemetryQueue<16> = TelemetryQueue::new();
        let link = NetworkLink::new();
        link.set_connected(true);
        let mut w = fast(RecordingUplink::default(), &q, &link);
        assert_eq!(block_on(w.drain()), Ok(0));
        assert_eq!(w.uplink().attempts, 0);
    }
}
