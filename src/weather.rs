//! Weather records and Open-Meteo retrieval.
//!
//! The record type and forecast parsing are always available; the HTTP
//! client needs the `weather` feature.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Current conditions shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherRecord {
    /// Degrees Celsius, rounded
    pub temperature: i32,
    /// Relative humidity in percent
    pub humidity: u8,
    /// km/h, rounded
    pub wind_speed: u32,
    /// Short human-readable description ("Partly Cloudy")
    pub description: String,
    pub icon: WeatherIcon,
    /// Local sunrise, `HH:MM`
    pub sunrise: String,
    /// Local sunset, `HH:MM`
    pub sunset: String,
}

/// Icon shown next to the temperature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeatherIcon {
    Sun,
    Moon,
    SunCloud,
    MoonCloud,
    Cloud,
    Fog,
    Drizzle,
    FreezingRain,
    LightRain,
    Rain,
    HeavyRain,
    LightSnow,
    Snow,
    HeavySnow,
    Storm,
    StormHail,
}

/// Description for a WMO weather interpretation code.
pub fn describe(code: u16) -> &'static str {
    match code {
        0 | 1 => "Clear Sky",
        2 => "Partly Cloudy",
        3 => "Overcast",
        45 | 48 => "Fog",
        51 | 53 | 55 => "Drizzle",
        56 | 57 => "Freezing Drizzle",
        61 | 80 => "Light Rain",
        63 | 81 => "Rain",
        65 | 82 => "Heavy Rain",
        66 | 67 => "Freezing Rain",
        71 | 85 => "Light Snow",
        73 => "Snow",
        75 | 86 => "Heavy Snow",
        77 => "Snow Grains",
        95 => "Thunderstorm",
        96 | 99 => "Thunderstorm Hail",
        _ => "Cloudy",
    }
}

/// Icon for a WMO weather code; clear and partly cloudy skies depend on daylight.
pub fn icon_for(code: u16, is_day: bool) -> WeatherIcon {
    match code {
        0 | 1 if is_day => WeatherIcon::Sun,
        0 | 1 => WeatherIcon::Moon,
        2 if is_day => WeatherIcon::SunCloud,
        2 => WeatherIcon::MoonCloud,
        3 => WeatherIcon::Cloud,
        45 | 48 => WeatherIcon::Fog,
        51 | 53 | 55 => WeatherIcon::Drizzle,
        56 | 57 | 66 | 67 => WeatherIcon::FreezingRain,
        61 | 80 => WeatherIcon::LightRain,
        63 | 81 => WeatherIcon::Rain,
        65 | 82 => WeatherIcon::HeavyRain,
        71 | 77 | 85 => WeatherIcon::LightSnow,
        73 => WeatherIcon::Snow,
        75 | 86 => WeatherIcon::HeavySnow,
        95 => WeatherIcon::Storm,
        96 | 99 => WeatherIcon::StormHail,
        _ => WeatherIcon::Cloud,
    }
}

#[derive(Debug, Deserialize)]
struct Forecast {
    current: Current,
    daily: Daily,
}

#[derive(Debug, Deserialize)]
struct Current {
    temperature_2m: f64,
    relative_humidity_2m: f64,
    #[serde(default = "default_is_day")]
    is_day: u8,
    weather_code: u16,
    wind_speed_10m: f64,
}

fn default_is_day() -> u8 {
    1
}

#[derive(Debug, Deserialize)]
struct Daily {
    sunrise: Vec<String>,
    sunset: Vec<String>,
}

/// Reduce an ISO-8601 local timestamp (`2024-06-01T05:12`) to `HH:MM`.
fn clock_label(timestamp: &str) -> Result<String, Error> {
    NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M")
        .or_else(|_| NaiveDateTime::parse_from_str(timestamp, "%Y-%m-%dT%H:%M:%S"))
        .map(|dt| dt.format("%H:%M").to_string())
        .map_err(|e| Error::Weather(format!("Bad timestamp '{}': {}", timestamp, e)))
}

/// Parse an Open-Meteo forecast response body.
pub fn parse_forecast(body: &str) -> Result<WeatherRecord, Error> {
    let forecast: Forecast = serde_json::from_str(body)
        .map_err(|e| Error::Weather(format!("Invalid forecast JSON: {}", e)))?;

    let first = |values: &[String], name: &str| -> Result<String, Error> {
        values
            .first()
            .ok_or_else(|| Error::Weather(format!("Forecast has no {} entry", name)))
            .and_then(|ts| clock_label(ts))
    };

    let current = forecast.current;
    Ok(WeatherRecord {
        temperature: current.temperature_2m.round() as i32,
        humidity: current.relative_humidity_2m.clamp(0.0, 100.0) as u8,
        wind_speed: current.wind_speed_10m.max(0.0).round() as u32,
        description: describe(current.weather_code).to_string(),
        icon: icon_for(current.weather_code, current.is_day != 0),
        sunrise: first(&forecast.daily.sunrise, "sunrise")?,
        sunset: first(&forecast.daily.sunset, "sunset")?,
    })
}

#[cfg(feature = "weather")]
pub use client::OpenMeteo;

#[cfg(feature = "weather")]
mod client {
    use std::time::Duration;

    use super::{parse_forecast, WeatherRecord};
    use crate::session::WeatherSource;
    use crate::Error;

    const API_BASE_URL: &str = "https://api.open-meteo.com/v1/forecast";
    const DEFAULT_TIMEOUT_SECS: u64 = 10;

    /// Open-Meteo forecast client for one location.
    #[derive(Debug, Clone)]
    pub struct OpenMeteo {
        http: reqwest::blocking::Client,
        base_url: String,
        latitude: f64,
        longitude: f64,
    }

    impl OpenMeteo {
        pub fn new(latitude: f64, longitude: f64) -> Self {
            let http = reqwest::blocking::Client::builder()
                .timeout(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
                .build()
                .unwrap_or_else(|_| reqwest::blocking::Client::new());

            Self {
                http,
                base_url: API_BASE_URL.to_string(),
                latitude,
                longitude,
            }
        }

        /// Set a custom base URL (useful for testing).
        #[must_use]
        pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
            self.base_url = base_url.into();
            self
        }

        pub fn forecast_url(&self) -> String {
            format!(
                "{}?latitude={}&longitude={}\
                 &current=temperature_2m,relative_humidity_2m,is_day,weather_code,wind_speed_10m\
                 &daily=sunrise,sunset&timezone=auto",
                self.base_url, self.latitude, self.longitude
            )
        }

        /// Fetch current conditions.
        pub fn fetch_current(&self) -> Result<WeatherRecord, Error> {
            let response = self.http.get(self.forecast_url()).send()?;
            if !response.status().is_success() {
                return Err(Error::Weather(format!(
                    "API returned status {}",
                    response.status().as_u16()
                )));
            }
            let body = response.text()?;
            parse_forecast(&body)
        }
    }

    impl WeatherSource for OpenMeteo {
        fn fetch(&mut self) -> Option<WeatherRecord> {
            match self.fetch_current() {
                Ok(record) => {
                    tracing::info!(
                        "Weather updated: {}°C, {}, wind {} km/h",
                        record.temperature,
                        record.description,
                        record.wind_speed
                    );
                    Some(record)
                }
                Err(e) => {
                    tracing::warn!("Error fetching weather: {}", e);
                    None
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_forecast_url() {
            let client = OpenMeteo::new(49.5, 11.25).with_base_url("http://localhost:9");
            let url = client.forecast_url();
            assert!(url.starts_with("http://localhost:9?latitude=49.5&longitude=11.25"));
            assert!(url.contains("weather_code"));
            assert!(url.contains("daily=sunrise,sunset"));
        }

        #[test]
        fn test_unreachable_server_yields_none() {
            let mut client = OpenMeteo::new(0.0, 0.0).with_base_url("http://127.0.0.1:9");
            assert!(client.fetch().is_none());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "latitude": 49.42,
        "longitude": 11.08,
        "current": {
            "time": "2024-06-01T14:00",
            "temperature_2m": 21.6,
            "relative_humidity_2m": 48,
            "is_day": 1,
            "weather_code": 2,
            "wind_speed_10m": 12.4
        },
        "daily": {
            "time": ["2024-06-01"],
            "sunrise": ["2024-06-01T05:12"],
            "sunset": ["2024-06-01T21:24"]
        }
    }"#;

    #[test]
    fn test_parse_forecast() {
        let record = parse_forecast(SAMPLE).unwrap();
        assert_eq!(
            record,
            WeatherRecord {
                temperature: 22,
                humidity: 48,
                wind_speed: 12,
                description: "Partly Cloudy".to_string(),
                icon: WeatherIcon::SunCloud,
                sunrise: "05:12".to_string(),
                sunset: "21:24".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_forecast_night() {
        let body = SAMPLE.replace("\"is_day\": 1", "\"is_day\": 0");
        assert_eq!(parse_forecast(&body).unwrap().icon, WeatherIcon::MoonCloud);
    }

    #[test]
    fn test_parse_forecast_missing_daily() {
        let body = SAMPLE.replace("[\"2024-06-01T05:12\"]", "[]");
        let err = parse_forecast(&body).unwrap_err();
        assert!(err.to_string().contains("sunrise"));
    }

    #[test]
    fn test_parse_forecast_garbage() {
        assert!(matches!(parse_forecast("not json"), Err(Error::Weather(_))));
    }

    #[test]
    fn test_describe_codes() {
        assert_eq!(describe(0), "Clear Sky");
        assert_eq!(describe(48), "Fog");
        assert_eq!(describe(82), "Heavy Rain");
        assert_eq!(describe(99), "Thunderstorm Hail");
        assert_eq!(describe(42), "Cloudy");
    }

    #[test]
    fn test_icon_codes() {
        assert_eq!(icon_for(1, true), WeatherIcon::Sun);
        assert_eq!(icon_for(1, false), WeatherIcon::Moon);
        assert_eq!(icon_for(67, true), WeatherIcon::FreezingRain);
        assert_eq!(icon_for(77, true), WeatherIcon::LightSnow);
        assert_eq!(icon_for(1000, false), WeatherIcon::Cloud);
    }

    #[test]
    fn test_clock_label_with_seconds() {
        assert_eq!(clock_label("2024-01-05T07:59:30").unwrap(), "07:59");
    }

    #[test]
    fn test_record_serializes_icon_snake_case() {
        let record = parse_forecast(SAMPLE).unwrap();
        let json = serde_json::to_string(&record).unwrap();
        assert!(json.contains("\"icon\":\"sun_cloud\""));
    }
}
