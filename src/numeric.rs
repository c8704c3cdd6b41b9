//! Rational and GPS numeric helpers.
//!
//! EXIF stores non-integer quantities as `numerator/denominator` pairs and
//! GPS positions as three of them (degrees, minutes, seconds). Everything
//! here is a pure function: malformed input yields `None` or an empty
//! result, never an error, and all formatting is locale-independent.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Degree sign appended to the degrees component of a coordinate.
pub const DEGREE_MARK: &str = "°";

/// Map query prefix used by [`compose_gps_link`].
pub const GPS_LINK_BASE: &str = "http://maps.google.at/maps?q=";

/// A signed `numerator/denominator` pair.
///
/// A zero denominator is the EXIF "undefined" sentinel; it is kept as-is
/// and never divided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RationalValue {
    pub numerator: i64,
    pub denominator: i64,
}

impl RationalValue {
    pub fn new(numerator: i64, denominator: i64) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.denominator == 0
    }

    pub fn to_f64(&self) -> Option<f64> {
        rational_to_float(*self)
    }
}

impl fmt::Display for RationalValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Parse `"n/d"` into a rational. Anything but exactly two integer tokens
/// is treated as "no value".
pub fn parse_rational(s: &str) -> Option<RationalValue> {
    let mut parts = s.trim().split('/');
    let numerator = parts.next()?.trim().parse::<i64>().ok()?;
    let denominator = parts.next()?.trim().parse::<i64>().ok()?;
    if parts.next().is_some() {
        return None;
    }
    Some(RationalValue::new(numerator, denominator))
}

pub fn rational_to_float(r: RationalValue) -> Option<f64> {
    if r.is_undefined() {
        return None;
    }
    Some(r.numerator as f64 / r.denominator as f64)
}

/// Parse and divide in one step (`"35/2"` → `17.5`).
pub fn convert_rational(s: &str) -> Option<f64> {
    parse_rational(s).and_then(rational_to_float)
}

/// Replace a fraction by its decimal value (`"28/10"` → `"2.8"`).
/// Non-fractions and undefined fractions are returned unchanged.
pub fn resolve_fraction(s: &str) -> String {
    match convert_rational(s) {
        Some(v) => format_significant(v, 6),
        None => s.to_string(),
    }
}

/// Parse the leading decimal number of `s` (`"5 stars"` → `5.0`).
/// Returns `None` when `s` does not start with a number.
pub fn parse_leading_f64(s: &str) -> Option<f64> {
    let s = s.trim_start();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    for (i, c) in s.char_indices() {
        match c {
            '+' | '-' if i == 0 => {}
            '0'..='9' => seen_digit = true,
            '.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end = i + c.len_utf8();
    }

    if !seen_digit {
        return None;
    }
    s[..end].trim_end_matches('.').parse().ok()
}

pub fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.abs(), b.abs());
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Format `value` with at most `digits` significant digits, trailing zeros
/// removed, never in exponent notation.
pub fn format_significant(value: f64, digits: usize) -> String {
    if !value.is_finite() {
        return value.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }

    let magnitude = value.abs().log10().floor() as i32;
    let decimals = (digits as i32 - 1 - magnitude).max(0) as usize;
    let mut s = format!("{value:.decimals$}");
    if s.contains('.') {
        let trimmed = s.trim_end_matches('0').trim_end_matches('.').len();
        s.truncate(trimmed);
    }
    if s == "-0" {
        s = "0".to_string();
    }
    s
}

/// Format one DMS component of a GPS coordinate.
///
/// * index 0 (degrees): integer part plus degree mark
/// * index 1 (minutes): six decimals when the stored denominator is > 1,
///   otherwise an integer
/// * index 2 (seconds): six decimals, omitted when zero
///
/// Cameras that record minute precision only store `m/100`-style minutes
/// and `0/1` seconds, which is why seconds may vanish.
pub fn format_gps_component(index: usize, value: f64, denominator: f64) -> Option<String> {
    match index {
        0 => Some(format!("{}{DEGREE_MARK}", value as i64)),
        1 if denominator > 1.0 => Some(format!("{value:.6}'")),
        1 => Some(format!("{}'", value as i64)),
        2 if value != 0.0 => Some(format!("{value:.6}''")),
        _ => None,
    }
}

/// Format a raw EXIF GPS value (`"48/1 8/1 3194/100"`) into display
/// components. Any malformed or undefined component discards the whole
/// coordinate.
pub fn convert_gps_coordinates(raw: &str) -> Vec<String> {
    let mut components = Vec::new();

    for (index, token) in raw.split_whitespace().enumerate() {
        let Some(r) = parse_rational(token) else {
            return Vec::new();
        };
        let Some(value) = rational_to_float(r) else {
            return Vec::new();
        };
        if let Some(c) = format_gps_component(index, value, r.denominator as f64) {
            components.push(c);
        }
    }

    components
}

/// Build a map query link from formatted latitude/longitude components.
///
/// Returns an empty string when either side is missing; a partial link is
/// never produced.
pub fn compose_gps_link(lat: &[String], lon: &[String], lat_ref: &str, lon_ref: &str) -> String {
    if lat.is_empty() || lon.is_empty() {
        return String::new();
    }

    format!(
        "{GPS_LINK_BASE}+{lat_ref}+{}+{lon_ref}+{}",
        lat.join("+"),
        lon.join("+")
    )
}

/// Convert a raw DMS value plus its `N`/`S`/`E`/`W` reference to signed
/// decimal degrees.
pub fn gps_to_decimal(raw: &str, reference: &str) -> Option<f64> {
    let mut coord = 0.0;
    let mut scale = 1.0;
    let mut seen = 0;

    for token in raw.split_whitespace().take(3) {
        let value = convert_rational(token)?;
        coord += value / scale;
        scale *= 60.0;
        seen += 1;
    }
    if seen == 0 {
        return None;
    }

    let reference = reference.trim();
    if reference.eq_ignore_ascii_case("S") || reference.eq_ignore_ascii_case("W") {
        coord = -coord;
    }
    Some(coord)
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── parse_rational ───────────────────────────────────────────────

    #[test]
    fn parse_rational_accepts_two_integers() {
        assert_eq!(parse_rational("28/10"), Some(RationalValue::new(28, 10)));
        assert_eq!(parse_rational(" -3 / 2 "), Some(RationalValue::new(-3, 2)));
        assert_eq!(parse_rational("1/0"), Some(RationalValue::new(1, 0)));
    }

    #[test]
    fn parse_rational_rejects_other_shapes() {
        assert_eq!(parse_rational("28"), None);
        assert_eq!(parse_rational("1/2/3"), None);
        assert_eq!(parse_rational("2.8/1"), None);
        assert_eq!(parse_rational("a/b"), None);
        assert_eq!(parse_rational(""), None);
    }

    #[test]
    fn undefined_rational_never_divides() {
        assert_eq!(rational_to_float(RationalValue::new(5, 0)), None);
        assert_eq!(convert_rational("35/2"), Some(17.5));
        assert_eq!(convert_rational("35/0"), None);
    }

    // ── formatting ───────────────────────────────────────────────────

    #[test]
    fn resolve_fraction_divides_when_possible() {
        assert_eq!(resolve_fraction("72/1"), "72");
        assert_eq!(resolve_fraction("28/10"), "2.8");
        assert_eq!(resolve_fraction("1/0"), "1/0");
        assert_eq!(resolve_fraction("Canon"), "Canon");
    }

    #[test]
    fn significant_digits_without_exponent() {
        assert_eq!(format_significant(0.0866871234, 6), "0.0866871");
        assert_eq!(format_significant(28.074855, 6), "28.0749");
        assert_eq!(format_significant(1.0, 6), "1");
        assert_eq!(format_significant(-12.5, 6), "-12.5");
        assert_eq!(format_significant(0.0, 6), "0");
    }

    #[test]
    fn leading_number_is_extracted() {
        assert_eq!(parse_leading_f64("5"), Some(5.0));
        assert_eq!(parse_leading_f64(" 4.5 stars"), Some(4.5));
        assert_eq!(parse_leading_f64("-1"), Some(-1.0));
        assert_eq!(parse_leading_f64("3."), Some(3.0));
        assert_eq!(parse_leading_f64("stars"), None);
        assert_eq!(parse_leading_f64(""), None);
        assert_eq!(parse_leading_f64("-"), None);
    }

    #[test]
    fn gcd_of_exposure_values() {
        assert_eq!(gcd(1000, 2), 2);
        assert_eq!(gcd(10, 4), 2);
        assert_eq!(gcd(7, 0), 7);
    }

    // ── GPS ──────────────────────────────────────────────────────────

    #[test]
    fn gps_components_follow_precision_rules() {
        assert_eq!(format_gps_component(0, 48.0, 1.0).as_deref(), Some("48°"));
        assert_eq!(format_gps_component(1, 8.0, 1.0).as_deref(), Some("8'"));
        assert_eq!(format_gps_component(1, 8.5, 100.0).as_deref(), Some("8.500000'"));
        assert_eq!(format_gps_component(2, 31.94, 100.0).as_deref(), Some("31.940000''"));
        assert_eq!(format_gps_component(2, 0.0, 1.0), None);
        assert_eq!(format_gps_component(3, 1.0, 1.0), None);
    }

    #[test]
    fn convert_full_coordinate() {
        let parts = convert_gps_coordinates("48/1 8/1 3194/100");
        assert_eq!(parts, vec!["48°", "8'", "31.940000''"]);
    }

    #[test]
    fn convert_minute_precision_coordinate() {
        let parts = convert_gps_coordinates("16/1 1535/100 0/1");
        assert_eq!(parts, vec!["16°", "15.350000'"]);
    }

    #[test]
    fn convert_rejects_malformed_component() {
        assert!(convert_gps_coordinates("48/1 8 31/1").is_empty());
        assert!(convert_gps_coordinates("").is_empty());
    }

    #[test]
    fn gps_link_with_zero_denominator_is_empty() {
        let lat = convert_gps_coordinates("48/1 8/0 3194/100");
        let lon = convert_gps_coordinates("16/1 15/1 3500/100");
        assert_eq!(compose_gps_link(&lat, &lon, "N", "E"), "");
    }

    #[test]
    fn gps_link_all_or_nothing() {
        let lat = convert_gps_coordinates("48/1 8/1 3194/100");
        let lon = convert_gps_coordinates("16/1 15/1 3500/100");
        assert_eq!(
            compose_gps_link(&lat, &lon, "N", "E"),
            "http://maps.google.at/maps?q=+N+48°+8'+31.940000''+E+16°+15'+35.000000''"
        );
        assert_eq!(compose_gps_link(&lat, &[], "N", "E"), "");
    }

    #[test]
    fn gps_decimal_degrees() {
        let lat = gps_to_decimal("48/1 30/1 0/1", "N").unwrap();
        assert!((lat - 48.5).abs() < 1e-9);
        let lon = gps_to_decimal("73/1 59/1 2160/100", "W").unwrap();
        assert!((lon + (73.0 + 59.0 / 60.0 + 21.6 / 3600.0)).abs() < 1e-9);
        assert!((lon + 73.989_333).abs() < 1e-6);
        assert_eq!(gps_to_decimal("", "N"), None);
        assert_eq!(gps_to_decimal("1/0", "N"), None);
    }
}
