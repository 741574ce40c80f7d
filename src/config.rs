//! Static configuration for the display session.
//!
//! All settings have defaults matching the reference hardware (a 320x240
//! RGB565 panel listening on port 4242), so a config file only needs the
//! values that differ.
//!
//! # Example (YAML)
//!
//! ```yaml
//! host: "192.168.0.122"
//! port: 4242
//! tile_payload_size: 8192
//! ack_timeout_secs: 15
//! latitude: 49.4247
//! longitude: 11.0896
//! timezone: "Europe/Berlin"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono_tz::Tz;
use serde::Deserialize;

use crate::frame::{MAX_FRAME_PAYLOAD, TILE_HEADER_SIZE};
use crate::Error;

/// Immutable session configuration, passed into constructors.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Display host name or IP address
    pub host: String,
    /// Display TCP port
    pub port: u16,
    /// Panel width in pixels
    pub display_width: u16,
    /// Panel height in pixels
    pub display_height: u16,
    /// Per-frame payload ceiling in bytes, tile header included
    pub tile_payload_size: usize,
    /// Seconds to wait for a tile ACK
    pub ack_timeout_secs: u64,
    /// Attempts per tile before the cycle is abandoned
    pub max_attempts: u32,
    /// Seconds allowed for the TCP handshake
    pub connect_timeout_secs: u64,
    /// Seconds to wait before reconnecting
    pub reconnect_delay_secs: u64,
    /// Seconds between weather refreshes
    pub weather_refresh_secs: u64,
    /// Milliseconds to sleep between loop iterations
    pub idle_interval_ms: u64,
    /// Where the device-resident image is written after each cycle
    pub state_image_path: PathBuf,
    /// Weather location latitude
    pub latitude: f64,
    /// Weather location longitude
    pub longitude: f64,
    /// IANA timezone for clock labels (local time if unset)
    pub timezone: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "192.168.0.122".to_string(),
            port: 4242,
            display_width: crate::DISPLAY_WIDTH,
            display_height: crate::DISPLAY_HEIGHT,
            tile_payload_size: crate::TILE_PAYLOAD_SIZE,
            ack_timeout_secs: crate::DEFAULT_ACK_TIMEOUT_SECS,
            max_attempts: crate::DEFAULT_MAX_ATTEMPTS,
            connect_timeout_secs: 5,
            reconnect_delay_secs: 5,
            weather_refresh_secs: 15 * 60,
            idle_interval_ms: 1000,
            state_image_path: PathBuf::from("current_display.png"),
            latitude: 49.4247,
            longitude: 11.0896,
            timezone: None,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file '{}': {}",
                path.as_ref().display(),
                e
            ))
        })?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from a YAML string and validate it.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        let config: Config = serde_yaml::from_str(yaml)
            .map_err(|e| Error::Config(format!("Invalid config YAML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that the protocol limits are usable.
    pub fn validate(&self) -> Result<(), Error> {
        if self.tile_payload_size <= TILE_HEADER_SIZE {
            return Err(Error::Config(format!(
                "tile_payload_size must exceed the {}-byte tile header",
                TILE_HEADER_SIZE
            )));
        }
        if self.tile_payload_size > MAX_FRAME_PAYLOAD {
            return Err(Error::Config(format!(
                "tile_payload_size {} exceeds the 16-bit length field ({})",
                self.tile_payload_size, MAX_FRAME_PAYLOAD
            )));
        }
        if self.max_attempts == 0 {
            return Err(Error::Config("max_attempts must be at least 1".to_string()));
        }
        // sockets reject a zero timeout outright
        if self.ack_timeout_secs == 0 {
            return Err(Error::Config("ack_timeout_secs must be at least 1".to_string()));
        }
        if self.connect_timeout_secs == 0 {
            return Err(Error::Config(
                "connect_timeout_secs must be at least 1".to_string(),
            ));
        }
        if self.display_width == 0 || self.display_height == 0 {
            return Err(Error::Config("display dimensions must be non-zero".to_string()));
        }
        if let Some(tz) = &self.timezone {
            tz.parse::<Tz>()
                .map_err(|_| Error::Config(format!("Unknown timezone '{}'", tz)))?;
        }
        Ok(())
    }

    /// Set the display address.
    #[must_use]
    pub fn with_device(mut self, host: impl Into<String>, port: u16) -> Self {
        self.host = host.into();
        self.port = port;
        self
    }

    /// Set the per-frame payload ceiling.
    #[must_use]
    pub fn with_tile_payload_size(mut self, bytes: usize) -> Self {
        self.tile_payload_size = bytes;
        self
    }

    /// Set where the resident image is persisted.
    #[must_use]
    pub fn with_state_image_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_image_path = path.into();
        self
    }

    /// Set the weather location.
    #[must_use]
    pub fn with_location(mut self, latitude: f64, longitude: f64) -> Self {
        self.latitude = latitude;
        self.longitude = longitude;
        self
    }

    /// Set the timezone used for clock labels.
    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// `host:port` for the display.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Pixel bytes available in one tile.
    pub fn max_pixel_bytes(&self) -> usize {
        self.tile_payload_size.saturating_sub(TILE_HEADER_SIZE)
    }

    /// Parsed timezone, or `None` for the system local time.
    pub fn tz(&self) -> Option<Tz> {
        self.timezone.as_deref().and_then(|tz| tz.parse().ok())
    }

    pub fn ack_timeout(&self) -> Duration {
        Duration::from_secs(self.ack_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.reconnect_delay_secs)
    }

    pub fn weather_refresh(&self) -> Duration {
        Duration::from_secs(self.weather_refresh_secs)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.address(), "192.168.0.122:4242");
        assert_eq!(config.tile_payload_size, 8192);
        assert_eq!(config.max_pixel_bytes(), 8180);
        assert_eq!(config.ack_timeout(), Duration::from_secs(15));
        assert_eq!(config.max_attempts, 3);
        assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
        assert_eq!(config.weather_refresh(), Duration::from_secs(900));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_yaml_partial() {
        let yaml = r#"
host: "10.0.0.7"
port: 5000
ack_timeout_secs: 3
timezone: "Europe/Berlin"
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.address(), "10.0.0.7:5000");
        assert_eq!(config.ack_timeout(), Duration::from_secs(3));
        assert_eq!(config.tz(), Some(chrono_tz::Europe::Berlin));
        // untouched fields keep their defaults
        assert_eq!(config.display_width, 320);
        assert_eq!(config.tile_payload_size, 8192);
    }

    #[test]
    fn test_rejects_oversized_payload() {
        let err = Config::from_yaml("tile_payload_size: 70000").unwrap_err();
        assert!(err.to_string().contains("16-bit"));
    }

    #[test]
    fn test_rejects_tiny_payload() {
        assert!(Config::from_yaml("tile_payload_size: 12").is_err());
    }

    #[test]
    fn test_rejects_zero_attempts() {
        assert!(Config::from_yaml("max_attempts: 0").is_err());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        let err = Config::from_yaml("ack_timeout_secs: 0").unwrap_err();
        assert!(err.to_string().contains("ack_timeout_secs"));
        let err = Config::from_yaml("connect_timeout_secs: 0").unwrap_err();
        assert!(err.to_string().contains("connect_timeout_secs"));
        assert!(Config::from_yaml("ack_timeout_secs: 1\nconnect_timeout_secs: 1").is_ok());
    }

    #[test]
    fn test_rejects_unknown_timezone() {
        let err = Config::from_yaml("timezone: \"Mars/Olympus\"").unwrap_err();
        assert!(err.to_string().contains("Mars/Olympus"));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tiledisplay.yaml");
        std::fs::write(&path, "port: 4343\nstate_image_path: /tmp/state.png\n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.port, 4343);
        assert_eq!(config.state_image_path, PathBuf::from("/tmp/state.png"));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load("/nonexistent/tiledisplay.yaml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_builder() {
        let config = Config::default()
            .with_device("display.local", 9000)
            .with_tile_payload_size(1024)
            .with_location(1.5, -2.5)
            .with_timezone("UTC")
            .with_state_image_path("out.png");
        assert_eq!(config.address(), "display.local:9000");
        assert_eq!(config.max_pixel_bytes(), 1012);
        assert_eq!((config.latitude, config.longitude), (1.5, -2.5));
        assert_eq!(config.tz(), Some(chrono_tz::UTC));
        assert_eq!(config.state_image_path, PathBuf::from("out.png"));
    }
}
