//! Periodic acquisition loop.
//!
//! Once per period the worker starts one discovery cycle on the radio task,
//! waits for the completion bridge with a timeout and, when the read chain
//! ran to its end, turns the reading into a [`Telemetry`] sample.  Only one
//! cycle is ever in flight: the next one starts only after this one was
//! reported or cancelled.

use crate::ble::discovery::CycleReport;
use crate::config::{
    DEFAULT_PRESSURE_HPA, FALLBACK_HUMIDITY_PCT, FALLBACK_TEMPERATURE_C, PROVISIONING_POLL_MS,
};
use crate::settings::Settings;
use crate::shared::Shared;
use crate::telemetry::Telemetry;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Sender;
use embassy_time::{Duration, Timer};

/// Start/stop handle on the discovery machine, wherever it runs.
pub trait CycleControl {
    /// Reset the machine and start a new cycle.
    fn begin(&mut self);
    /// Cancel any outstanding scan, connection attempt or link.
    /// Must be harmless when nothing is outstanding.
    fn cancel(&mut self);
}

/// Command for the task that owns the discovery machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleCommand {
    Begin,
    Abort,
}

/// [`CycleControl`] that posts commands to the radio task over a channel.
pub struct ChannelControl<'a, const Q: usize> {
    tx: Sender<'a, CriticalSectionRawMutex, CycleCommand, Q>,
}

impl<'a, const Q: usize> ChannelControl<'a, Q> {
    pub fn new(tx: Sender<'a, CriticalSectionRawMutex, CycleCommand, Q>) -> Self {
        Self { tx }
    }

    fn post(&self, cmd: CycleCommand) {
        if self.tx.try_send(cmd).is_err() {
            error!("Radio command channel full, dropped {:?}", cmd);
        }
    }
}

impl<const Q: usize> CycleControl for ChannelControl<'_, Q> {
    fn begin(&mut self) {
        self.post(CycleCommand::Begin);
    }

    fn cancel(&mut self) {
        self.post(CycleCommand::Abort);
    }
}

/// Secondary barometer. `None` when absent or not ready.
pub trait PressureSource {
    fn pressure_hpa(&mut self) -> Option<f32>;
}

/// Board without a barometer.
pub struct NoBarometer;

impl PressureSource for NoBarometer {
    fn pressure_hpa(&mut self) -> Option<f32> {
        None
    }
}

/// What one call to [`AcquisitionWorker::run_cycle`] did.
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum CycleOutcome {
    /// Provisioning holds the radio; nothing was attempted.
    Skipped,
    /// A sample was queued.
    Enqueued(Telemetry),
    /// The link closed before the read chain finished.
    Incomplete,
    /// No report within the cycle timeout; the cycle was cancelled.
    TimedOut,
}

pub struct AcquisitionWorker<'a, C, P, const N: usize> {
    control: C,
    pressure: P,
    shared: &'a Shared<N>,
    period: Duration,
    cycle_timeout: Duration,
}

impl<'a, C: CycleControl, P: PressureSource, const N: usize> AcquisitionWorker<'a, C, P, N> {
    pub fn new(control: C, pressure: P, shared: &'a Shared<N>, settings: &Settings) -> Self {
        Self {
            control,
            pressure,
            shared,
            period: Duration::from_secs(settings.acquisition_period_secs.into()),
            cycle_timeout: Duration::from_secs(settings.cycle_timeout_secs.into()),
        }
    }

    /// Override the loop timing.
    pub fn with_timing(mut self, period: Duration, cycle_timeout: Duration) -> Self {
        self.period = period;
        self.cycle_timeout = cycle_timeout;
        self
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    pub fn control_mut(&mut self) -> &mut C {
        &mut self.control
    }

    /// Run one acquisition cycle to completion, timeout or skip.
    pub async fn run_cycle(&mut self) -> CycleOutcome {
        if self.shared.provisioning.is_active() {
            debug!("Provisioning active, acquisition paused");
            return CycleOutcome::Skipped;
        }

        // A report latched after an earlier timeout must not satisfy this
        // cycle's wait.
        self.shared.completion.reset();
        self.control.begin();

        match self.shared.completion.wait(self.cycle_timeout).await {
            Ok(report) if report.valid => {
                let sample = self.compose(&report);
                self.shared.queue.enqueue(sample);
                self.shared
                    .latest
                    .update(sample.temperature, sample.humidity, sample.pressure);
                info!(
                    "Queued sample ts={} T={} H={} P={} n={} (queue {})",
                    sample.timestamp,
                    sample.temperature,
                    sample.humidity,
                    sample.pressure,
                    sample.detections,
                    self.shared.queue.len()
                );
                CycleOutcome::Enqueued(sample)
            }
            Ok(_) => {
                warn!("Cycle ended before the read chain completed");
                CycleOutcome::Incomplete
            }
            Err(_) => {
                warn!("Cycle timed out, cancelling");
                self.control.cancel();
                CycleOutcome::TimedOut
            }
        }
    }

    fn compose(&mut self, report: &CycleReport) -> Telemetry {
        Telemetry {
            timestamp: self.shared.clock.now(),
            temperature: report.reading.temperature.unwrap_or(FALLBACK_TEMPERATURE_C),
            humidity: report.reading.humidity.unwrap_or(FALLBACK_HUMIDITY_PCT),
            pressure: self.pressure.pressure_hpa().unwrap_or(DEFAULT_PRESSURE_HPA),
            detections: self.shared.detections.take(),
        }
    }

    /// Acquire forever.
    pub async fn run(&mut self) -> ! {
        info!("Acquisition worker started");
        loop {
            let pause = match self.run_cycle().await {
                CycleOutcome::Skipped => Duration::from_millis(PROVISIONING_POLL_MS),
                _ => self.period,
            };
            Timer::after(pause).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ble::reading::SensorReading;
    use embassy_futures::block_on;
    use embassy_sync::channel::Channel;

    /// Control that answers `begin` with a canned report (or nothing).
    struct Scripted<'a> {
        shared: &'a Shared<8>,
        reply: Option<CycleReport>,
        begins: usize,
        cancels: usize,
    }

    impl CycleControl for Scripted<'_> {
        fn begin(&mut self) {
            self.begins += 1;
            if let Some(report) = self.reply {
                self.shared.completion.raise(report);
            }
        }

        fn cancel(&mut self) {
            self.cancels += 1;
        }
    }

    struct FixedBarometer(f32);

    impl PressureSource for FixedBarometer {
        fn pressure_hpa(&mut self) -> Option<f32> {
            Some(self.0)
        }
    }

    fn full_reading() -> CycleReport {
        CycleReport {
            valid: true,
            reading: SensorReading {
                temperature: Some(21.5),
                humidity: Some(65.5),
                battery: Some(90),
            },
        }
    }

    fn worker<'a, P: PressureSource>(
        shared: &'a Shared<8>,
        reply: Option<CycleReport>,
        pressure: P,
    ) -> AcquisitionWorker<'a, Scripted<'a>, P, 8> {
        let control = Scripted {
            shared,
            reply,
            begins: 0,
            cancels: 0,
        };
        AcquisitionWorker::new(control, pressure, shared, &Settings::default())
            .with_timing(Duration::from_millis(10), Duration::from_millis(50))
    }

    #[test]
    fn valid_cycle_enqueues_and_updates_latest() {
        let shared = Shared::<8>::new();
        shared.clock.sync_at(1_700_000_000, 0);
        shared.detections.increment();
        shared.detections.increment();
        let mut w = worker(&shared, Some(full_reading()), NoBarometer);

        let outcome = block_on(w.run_cycle());
        let CycleOutcome::Enqueued(sample) = outcome else {
            panic!("unexpected outcome {:?}", outcome);
        };
        assert!(sample.timestamp >= 1_700_000_000);
        assert_eq!(sample.temperature, 21.5);
        assert_eq!(sample.humidity, 65.5);
        assert_eq!(sample.pressure, 1013.25);
        assert_eq!(sample.detections, 2);
        assert_eq!(shared.detections.peek(), 0);

        assert_eq!(shared.queue.len(), 1);
        let latest = shared.latest.get();
        assert!(latest.has_value);
        assert_eq!(latest.humidity, 65.5);
        assert_eq!(w.control().cancels, 0);
    }

    #[test]
    fn unresolved_values_use_fallbacks() {
        let shared = Shared::<8>::new();
        let report = CycleReport {
            valid: true,
            reading: SensorReading {
                temperature: None,
                humidity: Some(40.0),
                battery: None,
            },
        };
        let mut w = worker(&shared, Some(report), FixedBarometer(998.5));
        let CycleOutcome::Enqueued(sample) = block_on(w.run_cycle()) else {
            panic!("expected a sample");
        };
        assert_eq!(sample.temperature, 22.0);
        assert_eq!(sample.humidity, 40.0);
        assert_eq!(sample.pressure, 998.5);
    }

    #[test]
    fn incomplete_chain_enqueues_nothing() {
        let shared = Shared::<8>::new();
        let report = CycleReport {
            valid: false,
            reading: SensorReading::empty(),
        };
        let mut w = worker(&shared, Some(report), NoBarometer);
        assert_eq!(block_on(w.run_cycle()), CycleOutcome::Incomplete);
        assert!(shared.queue.is_empty());
        assert!(!shared.latest.get().has_value);
    }

    #[test]
    fn timeout_cancels_and_enqueues_nothing() {
        let shared = Shared::<8>::new();
        shared.detections.increment();
        let mut w = worker(&shared, None, NoBarometer);
        assert_eq!(block_on(w.run_cycle()), CycleOutcome::TimedOut);
        assert_eq!(w.control().begins, 1);
        assert_eq!(w.control().cancels, 1);
        assert!(shared.queue.is_empty());
        // Detections carry over to the next good sample.
        assert_eq!(shared.detections.peek(), 1);
    }

    #[test]
    fn stale_report_does_not_satisfy_next_cycle() {
        let shared = Shared::<8>::new();
        shared.completion.raise(full_reading());
        let mut w = worker(&shared, None, NoBarometer);
        assert_eq!(block_on(w.run_cycle()), CycleOutcome::TimedOut);
        assert!(shared.queue.is_empty());
    }

    #[test]
    fn provisioning_skips_cycle() {
        let shared = Shared::<8>::new();
        shared.provisioning.set(true);
        let mut w = worker(&shared, Some(full_reading()), NoBarometer);
        assert_eq!(block_on(w.run_cycle()), CycleOutcome::Skipped);
        assert_eq!(w.control().begins, 0);
        assert!(shared.queue.is_empty());

        shared.provisioning.set(false);
        assert!(matches!(block_on(w.run_cycle()), CycleOutcome::Enqueued(_)));
    }

    #[test]
    fn channel_control_posts_commands() {
        let chan: Channel<CriticalSectionRawMutex, CycleCommand, 2> = Channel::new();
        let mut control = ChannelControl::new(chan.sender());
        control.begin();
        control.cancel();
        // Full: dropped, not blocked.
        control.begin();
        assert_eq!(chan.try_receive(), Ok(CycleCommand::Begin));
        assert_eq!(chan.try_receive(), Ok(CycleCommand::Abort));
        assert!(chan.try_receive().is_err());
    }

    #[test]
    fn timing_follows_settings() {
        let shared = Shared::<8>::new();
        let settings = Settings {
            acquisition_period_secs: 5,
            cycle_timeout_secs: 12,
            ..Settings::default()
        };
        let control = Scripted {
            shared: &shared,
            reply: None,
            begins: 0,
            cancels: 0,
        };
        let w = AcquisitionWorker::new(control, NoBarometer, &shared, &settings);
        assert_eq!(w.period, Duration::from_secs(5));
        assert_eq!(w.cycle_timeout, Duration::from_secs(12));
    }
}
