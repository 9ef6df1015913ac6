//! UART link to the network co-processor.
//!
//! The co-processor owns the network attach and the MQTT session.  This
//! side frames publish requests, waits for the `OK`/`ERR` reply and asks
//! for the epoch time until the clock has been synced once.  A GPIO line
//! driven by the co-processor reports whether the network is up.

use ble2mqtt::clock::EpochClock;
use ble2mqtt::config::UPLINK_ACK_TIMEOUT_MS;
use ble2mqtt::delivery::Uplink;
use ble2mqtt::provisioning::NetworkLink;
use ble2mqtt::uplink::{LineBuffer, Reply, MAX_REPLY_LEN, PUBLISH_PREFIX, TIME_QUERY};
use ble2mqtt::Error;
use defmt::{debug, info, warn};
use embassy_nrf::gpio::{AnyPin, Input, Pull};
use embassy_nrf::peripherals::UARTE0;
use embassy_nrf::uarte::Uarte;
use embassy_time::{with_timeout, Duration};

pub struct SerialUplink {
    uarte: Uarte<'static, UARTE0>,
    replies: LineBuffer<MAX_REPLY_LEN>,
    clock: &'static EpochClock,
}

impl SerialUplink {
    pub fn new(uarte: Uarte<'static, UARTE0>, clock: &'static EpochClock) -> Self {
        Self {
            uarte,
            replies: LineBuffer::new(),
            clock,
        }
    }

    /// Send `parts` back to back. EasyDMA cannot read flash, so callers
    /// pass RAM buffers only.
    async fn send(&mut self, parts: &[&[u8]]) -> Result<(), Error> {
        for part in parts {
            if part.is_empty() {
                continue;
            }
            if let Err(e) = self.uarte.write(part).await {
                warn!("UART write failed: {:?}", e);
                return Err(Error::Publish);
            }
        }
        Ok(())
    }

    /// Next complete reply line, or `Timeout`.
    async fn reply(&mut self) -> Result<Reply, Error> {
        let wait = Duration::from_millis(UPLINK_ACK_TIMEOUT_MS);
        let replies = &mut self.replies;
        let uarte = &mut self.uarte;
        let read = async {
            let mut byte = [0u8; 1];
            loop {
                if let Err(e) = uarte.read(&mut byte).await {
                    warn!("UART read failed: {:?}", e);
                    return Err(Error::Publish);
                }
                if let Some(reply) = replies.push(byte[0]) {
                    return Ok(reply);
                }
            }
        };
        with_timeout(wait, read).await.map_err(|_| Error::Timeout)?
    }

    /// Ask the co-processor for the epoch time and sync the clock.
    pub async fn sync_clock(&mut self) -> Result<(), Error> {
        let query = TIME_QUERY;
        self.send(&[&query]).await?;
        loop {
            match self.reply().await? {
                Reply::Time(epoch) => {
                    self.clock.sync(epoch);
                    info!("Clock synced to {}", epoch);
                    return Ok(());
                }
                Reply::Nak => return Err(Error::Publish),
                other => debug!("Ignoring {:?} while waiting for time", other),
            }
        }
    }
}

impl Uplink for SerialUplink {
    async fn publish(&mut self, payload: &str) -> Result<(), Error> {
        if !self.clock.is_synced() {
            if let Err(e) = self.sync_clock().await {
                warn!("Time sync failed: {:?}", e);
            }
        }

        let prefix = PUBLISH_PREFIX;
        let newline = [b'\n'];
        self.send(&[&prefix, payload.as_bytes(), &newline]).await?;
        loop {
            match self.reply().await? {
                Reply::Ack => return Ok(()),
                Reply::Nak => return Err(Error::Publish),
                other => debug!("Ignoring {:?} while waiting for ack", other),
            }
        }
    }
}

/// Mirror the co-processor's link-up line into [`NetworkLink`].
#[embassy_executor::task]
pub async fn link_task(pin: AnyPin, link: &'static NetworkLink) -> ! {
    let mut line = Input::new(pin, Pull::Down);
    loop {
        if link.set_connected(line.is_high()) {
            info!("Network link {}", if line.is_high() { "up" } else { "down" });
        }
        line.wait_for_any_edge().await;
    }
}
