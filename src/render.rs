//! Clock and weather dashboard drawn with `embedded-graphics`.
//!
//! [`RasterImage`] implements [`DrawTarget`], so any `embedded-graphics`
//! primitive or text can be drawn straight into a frame.
//!
//! # Layout (320x240)
//!
//! ```text
//! +-------------------+-------------------+
//! |      14:05        |    (icon) 21°C    |
//! |   Sat, Jun 01     |   Partly Cloudy   |
//! |---------------------------------------|  y = 155
//! |  Wind  | Humidity | Sunrise | Sunset  |
//! | 12 km/h|   48%    |  05:12  |  21:24  |
//! +---------------------------------------+
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use tiledisplay::render::DashboardRenderer;
//! use tiledisplay::session::FrameRenderer;
//!
//! let renderer = DashboardRenderer::new(320, 240);
//! let frame = renderer.render("14:05", "Sat, Jun 01", None);
//! frame.save_png("preview.png")?;
//! ```

use std::convert::Infallible;

use embedded_graphics::mono_font::iso_8859_1::{FONT_10X20, FONT_6X10, FONT_7X13};
use embedded_graphics::mono_font::{MonoFont, MonoTextStyle};
use embedded_graphics::pixelcolor::Rgb888;
use embedded_graphics::prelude::*;
use embedded_graphics::primitives::{
    Arc, Circle, Ellipse, Line, PrimitiveStyle, Polyline, Rectangle, Triangle,
};
use embedded_graphics::text::{Alignment, Baseline, Text, TextStyleBuilder};

use crate::config::Config;
use crate::raster::{RasterImage, Rgb};
use crate::session::FrameRenderer;
use crate::weather::{WeatherIcon, WeatherRecord};

/// Row of the line between the clock/weather zone and the info columns
pub const SEPARATOR_Y: u16 = 155;

/// Separator opacity over the background (out of 255)
const SEPARATOR_ALPHA: u16 = 50;

const SUN: Rgb = [255, 204, 0];
const MOON: Rgb = [240, 240, 230];
const CLOUD: Rgb = [220, 220, 220];
const RAIN: Rgb = [120, 180, 255];
const BOLT: Rgb = [255, 230, 90];

/// Colour scheme for one part of the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThemeSpec {
    pub name: &'static str,
    /// Background colour at the left edge
    pub gradient_start: Rgb,
    /// Background colour at the right edge
    pub gradient_end: Rgb,
    pub text_primary: Rgb,
    pub text_secondary: Rgb,
}

pub const MORNING_SKY: ThemeSpec = ThemeSpec {
    name: "Morning Sky",
    gradient_start: [0, 10, 60],
    gradient_end: [10, 80, 140],
    text_primary: [255, 255, 255],
    text_secondary: [230, 230, 250],
};

pub const DAYLIGHT: ThemeSpec = ThemeSpec {
    name: "Daylight",
    gradient_start: [10, 40, 100],
    gradient_end: [30, 120, 200],
    text_primary: [255, 255, 255],
    text_secondary: [210, 230, 255],
};

pub const SUNSET: ThemeSpec = ThemeSpec {
    name: "Sunset",
    gradient_start: [20, 0, 80],
    gradient_end: [255, 127, 80],
    text_primary: [255, 255, 255],
    text_secondary: [255, 220, 220],
};

pub const TWILIGHT: ThemeSpec = ThemeSpec {
    name: "Twilight",
    gradient_start: [10, 20, 80],
    gradient_end: [50, 10, 100],
    text_primary: [255, 255, 255],
    text_secondary: [200, 200, 220],
};

impl ThemeSpec {
    /// Theme for an hour of the day (0-23).
    pub fn for_hour(hour: u32) -> ThemeSpec {
        match hour {
            5..=11 => MORNING_SKY,
            12..=17 => DAYLIGHT,
            18..=20 => SUNSET,
            _ => TWILIGHT,
        }
    }

    /// Background colour of column `x` in a frame `width` pixels wide.
    pub fn gradient_at(&self, x: u16, width: u16) -> Rgb {
        let span = i32::from(width.saturating_sub(1).max(1));
        let x = i32::from(x);
        let mut color = [0u8; 3];
        for (i, c) in color.iter_mut().enumerate() {
            let start = i32::from(self.gradient_start[i]);
            let end = i32::from(self.gradient_end[i]);
            *c = (start + (end - start) * x / span) as u8;
        }
        color
    }
}

/// Hour from a `HH:MM` label; labels without one use the night theme.
fn hour_of(time_label: &str) -> u32 {
    time_label
        .split(':')
        .next()
        .and_then(|h| h.trim().parse().ok())
        .unwrap_or(0)
}

fn rgb(color: Rgb) -> Rgb888 {
    Rgb888::new(color[0], color[1], color[2])
}

impl OriginDimensions for RasterImage {
    fn size(&self) -> Size {
        Size::new(u32::from(self.width()), u32::from(self.height()))
    }
}

impl DrawTarget for RasterImage {
    type Color = Rgb888;
    type Error = Infallible;

    fn draw_iter<I>(&mut self, pixels: I) -> Result<(), Self::Error>
    where
        I: IntoIterator<Item = Pixel<Self::Color>>,
    {
        for Pixel(point, color) in pixels {
            if let (Ok(x), Ok(y)) = (u16::try_from(point.x), u16::try_from(point.y)) {
                self.set(x, y, [color.r(), color.g(), color.b()]);
            }
        }
        Ok(())
    }
}

/// Renders the clock and weather dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DashboardRenderer {
    width: u16,
    height: u16,
}

impl DashboardRenderer {
    pub fn new(width: u16, height: u16) -> Self {
        Self { width, height }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.display_width, config.display_height)
    }

    fn draw(
        &self,
        image: &mut RasterImage,
        time_label: &str,
        date_label: &str,
        weather: Option<&WeatherRecord>,
    ) -> Result<(), Infallible> {
        let theme = ThemeSpec::for_hour(hour_of(time_label));
        let width = i32::from(self.width);

        for x in 0..self.width {
            image.fill_rect(x, 0, 1, self.height, theme.gradient_at(x, self.width));
        }
        draw_separator(image);

        let top_center_y = i32::from(SEPARATOR_Y) / 2;
        let left_x = width / 4;
        centered(time_label, left_x, top_center_y - 15, &FONT_10X20, theme.text_primary)
            .draw(image)?;
        centered(date_label, left_x, top_center_y + 40, &FONT_7X13, theme.text_secondary)
            .draw(image)?;

        let Some(weather) = weather else {
            return Ok(());
        };

        let right_x = width * 3 / 4;
        draw_weather_icon(image, weather.icon, Point::new(right_x, top_center_y - 20))?;
        let temperature = format!("{}°C", weather.temperature);
        centered(&temperature, right_x, top_center_y + 30, &FONT_10X20, theme.text_primary)
            .draw(image)?;
        centered(
            &weather.description,
            right_x,
            top_center_y + 60,
            &FONT_6X10,
            theme.text_secondary,
        )
        .draw(image)?;

        let columns = [
            (InfoGlyph::Wind, "Wind", format!("{} km/h", weather.wind_speed)),
            (InfoGlyph::Humidity, "Humidity", format!("{}%", weather.humidity)),
            (InfoGlyph::Sunrise, "Sunrise", weather.sunrise.clone()),
            (InfoGlyph::Sunset, "Sunset", weather.sunset.clone()),
        ];
        let icon_y = i32::from(SEPARATOR_Y) + 28;
        let header_y = icon_y + 20;
        let value_y = header_y + 18;
        let column_width = width / columns.len() as i32;

        for (i, (glyph, header, value)) in columns.iter().enumerate() {
            let center_x = column_width * i as i32 + column_width / 2;
            draw_info_glyph(image, *glyph, Point::new(center_x, icon_y), theme.text_secondary)?;
            centered(header, center_x, header_y, &FONT_6X10, theme.text_secondary).draw(image)?;
            centered(value, center_x, value_y, &FONT_7X13, theme.text_primary).draw(image)?;
        }
        Ok(())
    }
}

impl FrameRenderer for DashboardRenderer {
    fn render(
        &self,
        time_label: &str,
        date_label: &str,
        weather: Option<&WeatherRecord>,
    ) -> RasterImage {
        let mut image = RasterImage::new(self.width, self.height);
        if let Err(never) = self.draw(&mut image, time_label, date_label, weather) {
            match never {}
        }
        image
    }
}

fn centered<'a>(
    text: &'a str,
    x: i32,
    baseline_y: i32,
    font: &'a MonoFont<'a>,
    color: Rgb,
) -> Text<'a, MonoTextStyle<'a, Rgb888>> {
    let text_style = TextStyleBuilder::new()
        .alignment(Alignment::Center)
        .baseline(Baseline::Alphabetic)
        .build();
    Text::with_text_style(
        text,
        Point::new(x, baseline_y),
        MonoTextStyle::new(font, rgb(color)),
        text_style,
    )
}

/// Translucent white line across the frame, inset 15px on both sides.
fn draw_separator(image: &mut RasterImage) {
    let width = image.width();
    if width <= 30 {
        return;
    }
    for x in 15..width - 15 {
        if let Some(below) = image.get(x, SEPARATOR_Y) {
            let blended = below.map(|c| {
                let c = u16::from(c);
                (c + (255 - c) * SEPARATOR_ALPHA / 255) as u8
            });
            image.set(x, SEPARATOR_Y, blended);
        }
    }
}

fn draw_sun(image: &mut RasterImage, center: Point) -> Result<(), Infallible> {
    let radius = 14;
    Circle::with_center(center, radius * 2)
        .into_styled(PrimitiveStyle::with_fill(rgb(SUN)))
        .draw(image)?;
    let ray = PrimitiveStyle::with_stroke(rgb(SUN), 2);
    for i in 0..12 {
        let angle = (i as f32 * 30.0).to_radians();
        let (sin, cos) = angle.sin_cos();
        let inner = radius as f32 + 3.0;
        let outer = radius as f32 + 8.0;
        Line::new(
            center + Point::new((cos * inner) as i32, (sin * inner) as i32),
            center + Point::new((cos * outer) as i32, (sin * outer) as i32),
        )
        .into_styled(ray)
        .draw(image)?;
    }
    Ok(())
}

fn draw_moon(image: &mut RasterImage, center: Point) -> Result<(), Infallible> {
    let diameter = 28;
    Circle::with_center(center, diameter)
        .into_styled(PrimitiveStyle::with_fill(rgb(MOON)))
        .draw(image)?;
    // carve the crescent with the background colour sampled next to the disc
    let shade = image
        .get(
            u16::try_from(center.x + diameter as i32).unwrap_or(0),
            u16::try_from(center.y).unwrap_or(0),
        )
        .unwrap_or([0, 0, 0]);
    Circle::with_center(center + Point::new(8, -4), diameter)
        .into_styled(PrimitiveStyle::with_fill(rgb(shade)))
        .draw(image)
}

fn draw_cloud(image: &mut RasterImage, center: Point) -> Result<(), Infallible> {
    let style = PrimitiveStyle::with_fill(rgb(CLOUD));
    Ellipse::with_center(center + Point::new(-10, 6), Size::new(40, 24))
        .into_styled(style)
        .draw(image)?;
    Ellipse::with_center(center + Point::new(8, -2), Size::new(40, 32))
        .into_styled(style)
        .draw(image)
}

/// Slanted streaks (or dots for snow) under a cloud.
fn draw_precipitation(
    image: &mut RasterImage,
    center: Point,
    count: i32,
    snow: bool,
) -> Result<(), Infallible> {
    let spacing = 10;
    let first_x = center.x - (count - 1) * spacing / 2;
    for i in 0..count {
        let top = Point::new(first_x + i * spacing, center.y + 22);
        if snow {
            Circle::with_center(top + Point::new(0, 2), 4)
                .into_styled(PrimitiveStyle::with_fill(rgb(MOON)))
                .draw(image)?;
        } else {
            Line::new(top, top + Point::new(-3, 7))
                .into_styled(PrimitiveStyle::with_stroke(rgb(RAIN), 2))
                .draw(image)?;
        }
    }
    Ok(())
}

fn draw_weather_icon(
    image: &mut RasterImage,
    icon: WeatherIcon,
    center: Point,
) -> Result<(), Infallible> {
    match icon {
        WeatherIcon::Sun => draw_sun(image, center),
        WeatherIcon::Moon => draw_moon(image, center),
        WeatherIcon::SunCloud => {
            draw_sun(image, center + Point::new(-12, -10))?;
            draw_cloud(image, center + Point::new(4, 4))
        }
        WeatherIcon::MoonCloud => {
            draw_moon(image, center + Point::new(-12, -10))?;
            draw_cloud(image, center + Point::new(4, 4))
        }
        WeatherIcon::Cloud | WeatherIcon::Fog => draw_cloud(image, center),
        WeatherIcon::Drizzle | WeatherIcon::LightRain => {
            draw_cloud(image, center)?;
            draw_precipitation(image, center, 2, false)
        }
        WeatherIcon::Rain | WeatherIcon::FreezingRain => {
            draw_cloud(image, center)?;
            draw_precipitation(image, center, 3, false)
        }
        WeatherIcon::HeavyRain => {
            draw_cloud(image, center)?;
            draw_precipitation(image, center, 4, false)
        }
        WeatherIcon::LightSnow => {
            draw_cloud(image, center)?;
            draw_precipitation(image, center, 2, true)
        }
        WeatherIcon::Snow | WeatherIcon::HeavySnow => {
            draw_cloud(image, center)?;
            draw_precipitation(image, center, 3, true)
        }
        WeatherIcon::Storm | WeatherIcon::StormHail => {
            draw_cloud(image, center)?;
            let bolt = [
                center + Point::new(2, 14),
                center + Point::new(-4, 24),
                center + Point::new(2, 24),
                center + Point::new(-4, 34),
            ];
            Polyline::new(&bolt)
                .into_styled(PrimitiveStyle::with_stroke(rgb(BOLT), 2))
                .draw(image)?;
            if icon == WeatherIcon::StormHail {
                draw_precipitation(image, center + Point::new(12, 0), 2, true)?;
            }
            Ok(())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InfoGlyph {
    Wind,
    Humidity,
    Sunrise,
    Sunset,
}

/// 20x20 line icon centred on `center`.
fn draw_info_glyph(
    image: &mut RasterImage,
    glyph: InfoGlyph,
    center: Point,
    color: Rgb,
) -> Result<(), Infallible> {
    let stroke = PrimitiveStyle::with_stroke(rgb(color), 2);
    let top_left = center - Point::new(10, 10);
    match glyph {
        InfoGlyph::Wind => {
            Arc::new(top_left, 20, Angle::from_degrees(180.0), Angle::from_degrees(90.0))
                .into_styled(stroke)
                .draw(image)?;
            Arc::new(
                top_left + Point::new(-5, 5),
                20,
                Angle::from_degrees(160.0),
                Angle::from_degrees(100.0),
            )
            .into_styled(stroke)
            .draw(image)
        }
        InfoGlyph::Humidity => {
            let fill = PrimitiveStyle::with_fill(rgb(color));
            Circle::with_center(center + Point::new(0, 3), 14)
                .into_styled(fill)
                .draw(image)?;
            Triangle::new(
                center + Point::new(0, -10),
                center + Point::new(-6, 2),
                center + Point::new(6, 2),
            )
            .into_styled(fill)
            .draw(image)
        }
        InfoGlyph::Sunrise | InfoGlyph::Sunset => {
            let horizon = center.y + 8;
            Line::new(Point::new(top_left.x, horizon), Point::new(top_left.x + 20, horizon))
                .into_styled(stroke)
                .draw(image)?;
            Arc::new(
                Point::new(top_left.x + 2, horizon - 8),
                16,
                Angle::from_degrees(180.0),
                Angle::from_degrees(180.0),
            )
            .into_styled(stroke)
            .draw(image)?;
            // arrow above the sun: up for sunrise, down for sunset
            let (tip, tail) = if glyph == InfoGlyph::Sunrise {
                (horizon - 18, horizon - 12)
            } else {
                (horizon - 12, horizon - 18)
            };
            Line::new(Point::new(center.x, tail), Point::new(center.x, tip))
                .into_styled(stroke)
                .draw(image)?;
            Rectangle::new(Point::new(center.x - 1, tip - 1), Size::new(3, 2))
                .into_styled(PrimitiveStyle::with_fill(rgb(color)))
                .draw(image)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn weather() -> WeatherRecord {
        WeatherRecord {
            temperature: 21,
            humidity: 48,
            wind_speed: 12,
            description: "Partly Cloudy".to_string(),
            icon: WeatherIcon::SunCloud,
            sunrise: "05:12".to_string(),
            sunset: "21:24".to_string(),
        }
    }

    #[test]
    fn test_theme_for_hour() {
        assert_eq!(ThemeSpec::for_hour(4).name, "Twilight");
        assert_eq!(ThemeSpec::for_hour(5).name, "Morning Sky");
        assert_eq!(ThemeSpec::for_hour(11).name, "Morning Sky");
        assert_eq!(ThemeSpec::for_hour(12).name, "Daylight");
        assert_eq!(ThemeSpec::for_hour(18).name, "Sunset");
        assert_eq!(ThemeSpec::for_hour(20).name, "Sunset");
        assert_eq!(ThemeSpec::for_hour(21).name, "Twilight");
    }

    #[test]
    fn test_gradient_endpoints() {
        assert_eq!(SUNSET.gradient_at(0, 320), [20, 0, 80]);
        assert_eq!(SUNSET.gradient_at(319, 320), [255, 127, 80]);
        // halfway, truncated towards the start colour
        assert_eq!(MORNING_SKY.gradient_at(160, 321), [5, 45, 100]);
    }

    #[test]
    fn test_hour_of_label() {
        assert_eq!(hour_of("07:30"), 7);
        assert_eq!(hour_of("garbage"), 0);
    }

    #[test]
    fn test_render_is_deterministic() {
        let renderer = DashboardRenderer::new(320, 240);
        let a = renderer.render("14:05", "Sat, Jun 01", Some(&weather()));
        let b = renderer.render("14:05", "Sat, Jun 01", Some(&weather()));
        assert_eq!(a, b);
        assert_eq!((a.width(), a.height()), (320, 240));
    }

    #[test]
    fn test_background_follows_theme() {
        let renderer = DashboardRenderer::new(320, 240);
        let frame = renderer.render("19:00", "Sat, Jun 01", None);
        assert_eq!(frame.get(0, 0), Some(SUNSET.gradient_start));
        assert_eq!(frame.get(319, 0), Some(SUNSET.gradient_end));
        assert_eq!(frame.get(0, 239), Some(SUNSET.gradient_start));
    }

    #[test]
    fn test_separator_is_lighter() {
        let renderer = DashboardRenderer::new(320, 240);
        let frame = renderer.render("02:00", "Sat, Jun 01", None);
        let line = frame.get(160, SEPARATOR_Y).unwrap();
        let above = frame.get(160, SEPARATOR_Y - 1).unwrap();
        assert!(line.iter().zip(above.iter()).all(|(l, a)| l > a));
        // inset margin untouched
        assert_eq!(frame.get(5, SEPARATOR_Y), frame.get(5, SEPARATOR_Y - 1));
    }

    #[test]
    fn test_labels_are_drawn() {
        let renderer = DashboardRenderer::new(320, 240);
        let a = renderer.render("14:05", "Sat, Jun 01", None);
        let b = renderer.render("14:06", "Sat, Jun 01", None);
        assert_ne!(a, b);
        // only the left top zone differs
        for y in 0..240 {
            for x in 160..320 {
                assert_eq!(a.get(x, y), b.get(x, y));
            }
        }
    }

    #[test]
    fn test_weather_panel_only_with_weather() {
        let renderer = DashboardRenderer::new(320, 240);
        let bare = renderer.render("14:05", "Sat, Jun 01", None);
        let full = renderer.render("14:05", "Sat, Jun 01", Some(&weather()));

        let bottom_differs = (SEPARATOR_Y + 1..240)
            .any(|y| (0..320).any(|x| bare.get(x, y) != full.get(x, y)));
        assert!(bottom_differs);

        let left_top_same =
            (0..SEPARATOR_Y).all(|y| (0..100).all(|x| bare.get(x, y) == full.get(x, y)));
        assert!(left_top_same);
    }

    #[test]
    fn test_every_icon_draws() {
        let icons = [
            WeatherIcon::Sun,
            WeatherIcon::Moon,
            WeatherIcon::MoonCloud,
            WeatherIcon::Fog,
            WeatherIcon::Drizzle,
            WeatherIcon::HeavyRain,
            WeatherIcon::Snow,
            WeatherIcon::StormHail,
        ];
        let renderer = DashboardRenderer::new(320, 240);
        let bare = renderer.render("23:59", "Sun, Jun 02", None);
        for icon in icons {
            let record = WeatherRecord { icon, ..weather() };
            let frame = renderer.render("23:59", "Sun, Jun 02", Some(&record));
            assert_ne!(frame, bare, "{:?} left no mark", icon);
        }
    }

    #[test]
    fn test_draw_target_clips() {
        let mut image = RasterImage::new(4, 4);
        Rectangle::new(Point::new(-2, -2), Size::new(4, 4))
            .into_styled(PrimitiveStyle::with_fill(Rgb888::RED))
            .draw(&mut image)
            .unwrap();
        assert_eq!(image.get(0, 0), Some([255, 0, 0]));
        assert_eq!(image.get(1, 1), Some([255, 0, 0]));
        assert_eq!(image.get(2, 2), Some([0, 0, 0]));
    }

    #[test]
    fn test_small_frame_does_not_panic() {
        let frame = DashboardRenderer::new(16, 8).render("10:00", "Mon, Jan 01", Some(&weather()));
        assert_eq!((frame.width(), frame.height()), (16, 8));
    }
}
