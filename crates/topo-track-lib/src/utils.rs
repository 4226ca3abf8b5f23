//! Utility functions for coordinate conversions, distances and formatting

use regex::Regex;
use std::sync::LazyLock;

/// Mean Earth radius in miles
pub const EARTH_RADIUS_MI: f64 = 3959.0;

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Maximum latitude that can be represented in Web Mercator
pub const MAX_LATITUDE: f64 = 85.05112878;

/// Unit system used for distances and elevations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Units {
    /// Miles and feet
    #[default]
    Imperial,
    /// Kilometers and meters
    Metric,
}

impl Units {
    pub fn earth_radius(self) -> f64 {
        match self {
            Units::Imperial => EARTH_RADIUS_MI,
            Units::Metric => EARTH_RADIUS_KM,
        }
    }
}

/// Truncate to an integer, absorbing floating point noise like `6.99999999`
#[inline(always)]
pub fn int_trunc(num: f64) -> i64 {
    (num + 0.00001) as i64
}

/// Truncate to a multiple of `frac`, rounding negative numbers down
#[inline]
pub fn truncate2frac(num: f64, frac: f64) -> f64 {
    let t = int_trunc(num / frac) as f64 * frac;
    if num < 0.0 { t - frac } else { t }
}

/// Zero-prefixed decimal string with at least `num_digits` digits
#[inline]
pub fn ohstring(num: i64, num_digits: usize) -> String {
    format!("{num:0num_digits$}")
}

/// Convert degrees.minutes (e.g. `35.3045` meaning 35°30.45') to decimal degrees
pub fn deg_min_to_dec_deg(coord: f64) -> f64 {
    let deg = int_trunc(coord) as f64;
    deg + (coord - deg) / 0.6
}

/// Convert decimal degrees to degrees.minutes
pub fn dec_deg_to_deg_min(coord: f64) -> f64 {
    let sign = if coord < 0.0 { -1.0 } else { 1.0 };
    let coord = coord.abs();
    let deg = int_trunc(coord) as f64;
    sign * (deg + (coord - deg) * 0.6)
}

/// Convert decimal degrees to (degrees, minutes, seconds)
///
/// The sign is carried on the degrees.
pub fn dec_deg_to_dms(dd: f64) -> (i32, i32, f64) {
    let positive = dd >= 0.0;
    let total_seconds = dd.abs() * 3600.0;
    let minutes_total = (total_seconds / 60.0).floor();
    let seconds = total_seconds - minutes_total * 60.0;
    let degrees = (minutes_total / 60.0).floor();
    let minutes = minutes_total - degrees * 60.0;
    let degrees = if positive { degrees } else { -degrees };
    (degrees as i32, minutes as i32, seconds)
}

/// Human readable degrees and minutes, e.g. `-106^18.37'`
pub fn dec_deg_to_deg_min_str(coord: f64) -> String {
    let sign = if coord < 0.0 { "-" } else { "" };
    let coord = coord.abs();
    let deg = int_trunc(coord);
    let minutes = truncate2frac((coord - deg as f64) * 60.0, 0.01);
    format!("{sign}{deg}^{minutes:.2}'")
}

/// Format a coordinate pair in decimal degrees
pub fn coord_to_str_dd(lon: f64, lat: f64) -> String {
    if lat >= 0.0 {
        format!("{lon:.7} E  {lat:.7} N")
    } else {
        format!("{lon:.7} E  {:.5} S", -lat)
    }
}

static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[-+]?\d+(?:\.\d*)?|[-+]?\.\d+").expect("valid regex"));

static DIRECTION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b([NSEW])\b").expect("valid regex"));

/// Parse a coordinate string into decimal degrees
///
/// Accepts plain decimals (`-106.30629`) and degree/minute/second forms with
/// any punctuation, for example `-106° 18' 22.644"`, `106 deg 18' 22.644" W`
/// or `W 106d 18m 22.644s`. A leading minus sign or an `S`/`W` hemisphere
/// letter makes the result negative.
///
/// # Returns
/// `None` if the string contains no number
pub fn to_decimal_degrees(coord: &str) -> Option<f64> {
    let mut numbers = NUMBER_RE
        .find_iter(coord)
        .filter_map(|m| m.as_str().parse::<f64>().ok());

    let first = numbers.next()?;
    let minutes = numbers.next().unwrap_or(0.0);
    let seconds = numbers.next().unwrap_or(0.0);

    let mut negative = first.is_sign_negative();
    if let Some(dir) = DIRECTION_RE.captures(coord) {
        if matches!(&dir[1], "S" | "s" | "W" | "w") {
            negative = true;
        }
    }

    let value = first.abs() + minutes.abs() / 60.0 + seconds.abs() / 3600.0;
    Some(if negative { -value } else { value })
}

/// Great-circle angle between two points, in radians
#[inline]
pub fn haversine_angle(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let delta_lat = (lat1 - lat2).to_radians();
    let delta_lon = (lon1 - lon2).to_radians();
    let a = (delta_lat / 2.0).sin().powi(2)
        + (delta_lon / 2.0).sin().powi(2) * lat1.to_radians().cos() * lat2.to_radians().cos();
    2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Haversine distance between two points, in miles or kilometers
#[inline]
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64, units: Units) -> f64 {
    units.earth_radius() * haversine_angle(lat1, lon1, lat2, lon2)
}

/// Initial bearing from the first point to the second, degrees clockwise from north
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1, lat2, lon2) = (
        lat1.to_radians(),
        lon1.to_radians(),
        lat2.to_radians(),
        lon2.to_radians(),
    );
    let y = (lon2 - lon1).sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * (lon2 - lon1).cos();
    y.atan2(x).to_degrees().rem_euclid(360.0)
}

/// Express a bearing as a surveyor's quadrant, e.g. `N 30 E`
pub fn angle_to_quadrant(angle: f64) -> String {
    let angle = if angle > 180.0 { angle - 360.0 } else { angle };
    match angle {
        a if a == 0.0 => "N".to_string(),
        a if a == -90.0 => "W".to_string(),
        a if a == 90.0 => "E".to_string(),
        a if a == 180.0 => "S".to_string(),
        a if a > -90.0 && a < 0.0 => format!("N {} W", -a),
        a if a > 0.0 && a < 90.0 => format!("N {a} E"),
        a if a < 0.0 => format!("S {} W", 180.0 + a),
        a => format!("S {} E", 180.0 - a),
    }
}

/// Spherical Mercator projection of a latitude, in degree-like units
///
/// # Arguments
/// * `lat` - Latitude in degrees, clamped to the Web Mercator range
#[inline(always)]
pub fn lat_to_mercator_y(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0)
        .tan()
        .ln()
        .to_degrees()
}

/// Inverse of [`lat_to_mercator_y`]
#[inline(always)]
pub fn mercator_y_to_lat(y: f64) -> f64 {
    (2.0 * y.to_radians().exp().atan() - std::f64::consts::FRAC_PI_2).to_degrees()
}
