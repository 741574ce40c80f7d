//! The display session: render, diff, deliver, repeat.
//!
//! [`SessionLoop`] keeps the device connected, redraws once per distinct
//! minute label and hands the quantized frame to [`TileTransport`]. Every
//! network failure ends in a reconnect, which forces a full frame.
//!
//! ```rust,ignore
//! use std::sync::atomic::AtomicBool;
//! use tiledisplay::{Config, SessionLoop, SystemClock, TcpConnector};
//!
//! let config = Config::load("tiledisplay.yaml")?;
//! let mut session = SessionLoop::new(
//!     &config,
//!     TcpConnector::from_config(&config),
//!     my_renderer,
//!     my_weather,
//!     SystemClock::from_config(&config),
//! );
//! session.run(&AtomicBool::new(false));
//! ```

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{Local, NaiveDateTime, Utc};
use chrono_tz::Tz;

use crate::config::Config;
use crate::pixel;
use crate::raster::RasterImage;
use crate::transport::{Connector, CycleReport, TileTransport, TransportSettings};
use crate::weather::WeatherRecord;

/// Time label format (`14:05`)
pub const TIME_FORMAT: &str = "%H:%M";

/// Date label format (`Sat, Jun 01`)
pub const DATE_FORMAT: &str = "%a, %b %d";

/// Longest single sleep while waiting, so shutdown is noticed promptly.
const SLEEP_SLICE: Duration = Duration::from_millis(100);

/// Draws a candidate frame.
///
/// Must be deterministic for the same inputs; theme selection may depend on
/// the hour embedded in `time_label`.
pub trait FrameRenderer {
    fn render(
        &self,
        time_label: &str,
        date_label: &str,
        weather: Option<&WeatherRecord>,
    ) -> RasterImage;
}

/// Supplies current weather. Failures are reported as `None`.
pub trait WeatherSource {
    fn fetch(&mut self) -> Option<WeatherRecord>;
}

/// Wall-clock time in the display's timezone.
pub trait Clock {
    fn now(&self) -> NaiveDateTime;
}

/// Reads the system clock, converted to a fixed timezone when configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    tz: Option<Tz>,
}

impl SystemClock {
    pub fn new(tz: Option<Tz>) -> Self {
        Self { tz }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.tz())
    }
}

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        match self.tz {
            Some(tz) => Utc::now().with_timezone(&tz).naive_local(),
            None => Local::now().naive_local(),
        }
    }
}

/// What one loop iteration did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The device could not be reached
    ConnectFailed,
    /// Same minute and the device is up to date
    Idle,
    /// A diff cycle completed
    Updated(CycleReport),
    /// The frame could not be tiled; the device keeps its previous image
    Skipped,
    /// The cycle failed and the connection was dropped
    Disconnected,
}

impl Tick {
    /// Whether the next iteration should wait for the reconnect delay.
    pub fn needs_reconnect(&self) -> bool {
        matches!(self, Tick::ConnectFailed | Tick::Disconnected)
    }
}

/// Single-owner orchestrator around a [`TileTransport`].
pub struct SessionLoop<C, R, W, K>
where
    C: Connector,
    R: FrameRenderer,
    W: WeatherSource,
    K: Clock,
{
    transport: TileTransport<C>,
    renderer: R,
    weather_source: W,
    clock: K,
    weather: Option<WeatherRecord>,
    last_weather_fetch: Option<NaiveDateTime>,
    last_time_label: Option<String>,
    state_image_path: PathBuf,
    weather_refresh: Duration,
    reconnect_delay: Duration,
    idle_interval: Duration,
}

impl<C, R, W, K> SessionLoop<C, R, W, K>
where
    C: Connector,
    R: FrameRenderer,
    W: WeatherSource,
    K: Clock,
{
    /// Build a session. Any state image left over from an earlier run is
    /// removed, since the device contents are unknown at start-up.
    pub fn new(config: &Config, connector: C, renderer: R, weather_source: W, clock: K) -> Self {
        match std::fs::remove_file(&config.state_image_path) {
            Ok(()) => tracing::info!(
                "Removed stale state image {}",
                config.state_image_path.display()
            ),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                "Could not remove state image {}: {}",
                config.state_image_path.display(),
                e
            ),
        }

        Self {
            transport: TileTransport::new(connector, TransportSettings::from_config(config)),
            renderer,
            weather_source,
            clock,
            weather: None,
            last_weather_fetch: None,
            last_time_label: None,
            state_image_path: config.state_image_path.clone(),
            weather_refresh: config.weather_refresh(),
            reconnect_delay: config.reconnect_delay(),
            idle_interval: config.idle_interval(),
        }
    }

    pub fn transport(&self) -> &TileTransport<C> {
        &self.transport
    }

    /// Most recent successfully fetched weather.
    pub fn weather(&self) -> Option<&WeatherRecord> {
        self.weather.as_ref()
    }

    /// Run one iteration without sleeping.
    pub fn tick(&mut self) -> Tick {
        if !self.transport.is_connected() {
            if let Err(e) = self.transport.connect() {
                tracing::warn!(
                    "Connection failed: {}; retrying in {}s",
                    e,
                    self.reconnect_delay.as_secs()
                );
                return Tick::ConnectFailed;
            }
        }

        let now = self.clock.now();
        if self.weather_due(now) {
            self.refresh_weather(now);
        }

        let time_label = now.format(TIME_FORMAT).to_string();
        if self.transport.resident().is_some()
            && self.last_time_label.as_deref() == Some(time_label.as_str())
        {
            return Tick::Idle;
        }
        let date_label = now.format(DATE_FORMAT).to_string();

        let frame = pixel::quantize(&self.renderer.render(
            &time_label,
            &date_label,
            self.weather.as_ref(),
        ));

        match self.transport.push_frame(&frame) {
            Ok(report) => {
                if let CycleReport::Updated { tiles, retries, .. } = report {
                    tracing::info!(
                        "Display updated for {} ({} tiles, {} retries)",
                        time_label,
                        tiles,
                        retries
                    );
                }
                self.last_time_label = Some(time_label);
                self.persist_resident();
                Tick::Updated(report)
            }
            Err(e) if e.is_degenerate() => {
                tracing::warn!("Skipping cycle: {}", e);
                self.last_time_label = Some(time_label);
                Tick::Skipped
            }
            Err(e) => {
                tracing::error!("Update cycle failed: {}", e);
                self.transport.close();
                Tick::Disconnected
            }
        }
    }

    /// Tick until `shutdown` is set, then release the connection.
    pub fn run(&mut self, shutdown: &AtomicBool) {
        tracing::info!("Session started");
        while !shutdown.load(Ordering::Relaxed) {
            let delay = if self.tick().needs_reconnect() {
                self.reconnect_delay
            } else {
                self.idle_interval
            };
            sleep_unless(shutdown, delay);
        }
        self.transport.close();
        tracing::info!("Session stopped");
    }

    fn weather_due(&self, now: NaiveDateTime) -> bool {
        match self.last_weather_fetch {
            None => true,
            Some(last) => (now - last)
                .to_std()
                .map(|elapsed| elapsed >= self.weather_refresh)
                // clock went backwards
                .unwrap_or(true),
        }
    }

    fn refresh_weather(&mut self, now: NaiveDateTime) {
        self.last_weather_fetch = Some(now);
        match self.weather_source.fetch() {
            Some(record) => self.weather = Some(record),
            None if self.weather.is_some() => {
                tracing::warn!("Weather unavailable, keeping previous data")
            }
            None => tracing::warn!("Weather unavailable"),
        }
        self.transport.invalidate();
    }

    fn persist_resident(&self) {
        let Some(image) = self.transport.resident() else {
            return;
        };
        if let Err(e) = image.save_png(&self.state_image_path) {
            tracing::warn!(
                "Failed to write state image {}: {}",
                self.state_image_path.display(),
                e
            );
        }
    }
}

fn sleep_unless(shutdown: &AtomicBool, delay: Duration) {
    let mut remaining = delay;
    while !remaining.is_zero() && !shutdown.load(Ordering::Relaxed) {
        let step = remaining.min(SLEEP_SLICE);
        std::thread::sleep(step);
        remaining -= step;
    }
}
