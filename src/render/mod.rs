//! Foreground render loop.
//!
//! Redraws the status screen at the display poll interval. It only reads the
//! reading slot, so sensor I/O never blocks a redraw. Failing metrics get
//! their fallback line and a failing display is retried on the next tick.

mod layout;

pub use layout::{compose, MetricHealth};

use chrono::{DateTime, Local};
use std::panic::{self, AssertUnwindSafe};

use crate::config::{Config, ConfigWatcher, SharedConfig};
use crate::display::{Frame, SharedDisplay};
use crate::scheduler::panic_message;
use crate::sensor::ReadingSlot;
use crate::shutdown::ShutdownCoordinator;
use crate::telemetry::Telemetry;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("render loop panicked: {0}")]
    Panicked(String),
}

pub struct RenderLoop<T: Telemetry> {
    display: SharedDisplay,
    telemetry: T,
    slot: ReadingSlot,
    config: SharedConfig,
    watcher: Option<ConfigWatcher>,
    health: MetricHealth,
    draw_failing: bool,
    last_sample: Option<DateTime<Local>>,
}

impl<T: Telemetry> RenderLoop<T> {
    pub fn new(display: SharedDisplay, telemetry: T, slot: ReadingSlot, config: SharedConfig) -> Self {
        Self {
            display,
            telemetry,
            slot,
            config,
            watcher: None,
            health: MetricHealth::new(),
            draw_failing: false,
            last_sample: None,
        }
    }

    /// Reloads settings from `watcher` between ticks.
    pub fn with_watcher(mut self, watcher: ConfigWatcher) -> Self {
        self.watcher = Some(watcher);
        self
    }

    fn config(&self) -> Config {
        self.config
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Composes and draws one frame, returning what was drawn.
    pub fn tick(&mut self) -> Frame {
        let config = self.config();
        let reading = self.slot.latest();
        if reading.sampled_at != self.last_sample {
            if let Some(at) = reading.sampled_at {
                log::debug!("Showing sensor reading taken at {}", at.format("%H:%M:%S"));
            }
            self.last_sample = reading.sampled_at;
        }
        let (_, height) = self.display.size();
        let frame = compose(&self.telemetry, &reading, &config, height, &mut self.health);

        match self.display.draw(&frame) {
            Ok(()) => {
                if self.draw_failing {
                    log::info!("Display recovered");
                    self.draw_failing = false;
                }
            }
            Err(e) if self.draw_failing => log::debug!("Display draw failed again: {}", e),
            Err(e) => {
                log::warn!("Display draw failed, retrying every tick: {}", e);
                self.draw_failing = true;
            }
        }
        frame
    }

    /// Runs until `shutdown` has been triggered.
    ///
    /// A panic during a tick blanks the display before it is reported, so the
    /// panel never keeps showing a frozen frame.
    pub fn run(&mut self, shutdown: &ShutdownCoordinator) -> Result<(), RenderError> {
        log::info!("Render loop started");
        while !shutdown.is_triggered() {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| self.tick())) {
                let message = panic_message(payload.as_ref());
                log::error!("Render tick panicked: {}", message);
                if let Err(e) = self.display.blank() {
                    log::error!("Failed to blank display: {}", e);
                }
                return Err(RenderError::Panicked(message));
            }

            if let Some(watcher) = &self.watcher {
                watcher.check_and_reload();
            }

            let poll = self.config().display.poll_interval();
            std::thread::sleep(poll);
        }
        log::info!("Render loop stopped");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::display::testing::{Call, RecordingDisplay};
    use crate::sensor::{reading_slot, SensorReading};
    use crate::shutdown::{Cleanup, Trigger};
    use crate::telemetry::TelemetryError;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, RwLock};
    use std::time::Duration;

    /// Telemetry with fixed values and switchable failures.
    #[derive(Default)]
    pub(crate) struct StubTelemetry {
        pub fail_network: bool,
        pub fail_disk: bool,
        pub panic_on_load: bool,
        pub network_calls: AtomicUsize,
    }

    impl Telemetry for StubTelemetry {
        fn date(&self, _format: &str) -> Result<String, TelemetryError> {
            Ok("19 Oct 2026".to_string())
        }

        fn time(&self, _format: &str) -> Result<String, TelemetryError> {
            Ok("12:34:56".to_string())
        }

        fn ip_address(&self) -> Result<String, TelemetryError> {
            Ok("IP: 192.168.1.20".to_string())
        }

        fn network(&self, interface: &str) -> Result<String, TelemetryError> {
            self.network_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_network {
                return Err(TelemetryError::InterfaceNotFound(interface.to_string()));
            }
            Ok(format!("{}: Tx: 12M, Rx: 340M", interface))
        }

        fn disk(&self, mount: &Path) -> Result<String, TelemetryError> {
            if self.fail_disk {
                return Err(TelemetryError::NotMounted(mount.to_path_buf()));
            }
            Ok("Disk: 1.2G/29G 5%".to_string())
        }

        fn cpu_temperature(&self) -> Result<String, TelemetryError> {
            Ok("CPU Temp: 48.3'C".to_string())
        }

        fn cpu_load(&self) -> Result<String, TelemetryError> {
            if self.panic_on_load {
                panic!("loadavg parser bug");
            }
            Ok("CPU Load: 0.52".to_string())
        }

        fn memory(&self) -> Result<String, TelemetryError> {
            Ok("Mem: 512/3791 MB 13.51%".to_string())
        }

        fn uptime(&self) -> Result<String, TelemetryError> {
            Ok("Uptime: 1 day, 0:00:00".to_string())
        }
    }

    fn shared_config() -> SharedConfig {
        let mut config = Config::default();
        config.display.poll_interval_ms = 5;
        Arc::new(RwLock::new(config))
    }

    fn render_loop(telemetry: StubTelemetry) -> (RenderLoop<StubTelemetry>, RecordingDisplay) {
        let recorder = RecordingDisplay::default();
        let display = SharedDisplay::new(Box::new(recorder.clone()));
        let (_publisher, slot) = reading_slot();
        (RenderLoop::new(display, telemetry, slot, shared_config()), recorder)
    }

    fn coordinator() -> Arc<ShutdownCoordinator> {
        Arc::new(ShutdownCoordinator::with_exit(Cleanup::new(), |_| {}))
    }

    #[test]
    fn tick_draws_frame_with_placeholder_atmosphere() {
        let (mut render, recorder) = render_loop(StubTelemetry::default());
        let frame = render.tick();

        assert_eq!(recorder.frames(), vec![frame.clone()]);
        assert_eq!(frame.text_at(0, 0), Some("19 Oct 2026"));
        assert_eq!(frame.text_at(80, 0), Some("12:34:56"));
        assert_eq!(frame.text_at(0, 16), Some("wlan0: Tx: 12M, Rx: 340M"));
        assert_eq!(frame.text_at(0, 56), Some("Atmo: --.--*C  --.--%"));
    }

    #[test]
    fn tick_shows_latest_reading() {
        let recorder = RecordingDisplay::default();
        let (publisher, slot) = reading_slot();
        let mut render = RenderLoop::new(
            SharedDisplay::new(Box::new(recorder)),
            StubTelemetry::default(),
            slot,
            shared_config(),
        );
        publisher.publish(SensorReading {
            temperature: Some(23.25),
            humidity: Some(51.5),
            sampled_at: None,
        });
        assert_eq!(render.tick().text_at(0, 56), Some("Atmo: 23.25*C  51.50%"));
    }

    #[test]
    fn failing_network_keeps_other_lines_and_loop_running() {
        let telemetry = StubTelemetry {
            fail_network: true,
            ..StubTelemetry::default()
        };
        let (mut render, recorder) = render_loop(telemetry);
        let shutdown = coordinator();

        let trigger = {
            let shutdown = Arc::clone(&shutdown);
            std::thread::spawn(move || {
                std::thread::sleep(Duration::from_millis(100));
                shutdown.trigger(Trigger::Signal(crate::shutdown::SignalKind::Interrupt));
            })
        };
        render.run(&shutdown).unwrap();
        trigger.join().unwrap();

        let frames = recorder.frames();
        assert!(frames.len() > 1, "loop stopped after {} frames", frames.len());
        for frame in &frames {
            assert_eq!(frame.lines().len(), 9);
            assert_eq!(frame.text_at(0, 16), Some("Check back later"));
            assert_eq!(frame.text_at(0, 8), Some("IP: 192.168.1.20"));
            assert_eq!(frame.text_at(0, 48), Some("Mem: 512/3791 MB 13.51%"));
        }
        assert!(render.telemetry.network_calls.load(Ordering::SeqCst) > 1);
    }

    #[test]
    fn draw_failure_is_retried_next_tick() {
        let (mut render, recorder) = render_loop(StubTelemetry::default());
        recorder.fail_draws.store(true, Ordering::SeqCst);
        render.tick();
        render.tick();
        assert!(recorder.frames().is_empty());

        recorder.fail_draws.store(false, Ordering::SeqCst);
        render.tick();
        assert_eq!(recorder.frames().len(), 1);
        assert!(!render.draw_failing);
    }

    #[test]
    fn panic_blanks_display_and_returns_error() {
        let telemetry = StubTelemetry {
            panic_on_load: true,
            ..StubTelemetry::default()
        };
        let (mut render, recorder) = render_loop(telemetry);
        let shutdown = coordinator();

        let result = render.run(&shutdown);

        assert!(matches!(result, Err(RenderError::Panicked(ref m)) if m.contains("loadavg")));
        assert_eq!(recorder.calls(), vec![Call::Clear]);
        assert!(render.display.is_blanked());
    }

    #[test]
    fn run_returns_immediately_after_shutdown() {
        let (mut render, recorder) = render_loop(StubTelemetry::default());
        let shutdown = coordinator();
        shutdown.trigger(Trigger::Signal(crate::shutdown::SignalKind::Terminate));
        render.run(&shutdown).unwrap();
        assert!(recorder.calls().is_empty());
    }

    #[test]
    fn no_frames_after_blank() {
        let (mut render, recorder) = render_loop(StubTelemetry::default());
        render.tick();
        render.display.blank().unwrap();
        render.tick();
        assert_eq!(recorder.frames().len(), 1);
        assert_eq!(recorder.calls().last(), Some(&Call::Clear));
    }
}
