//! Human-readable rendering of camera and description metadata.
//!
//! The search-tag tables list what an info panel shows, in order; the
//! helpers turn raw EXIF values into display strings (`"f/2.8"`-style
//! apertures, `"1/500 sec"`, flash descriptions, GPS links).

use chrono::{DateTime, Local};
use serde::Serialize;
use std::path::Path;

use crate::keys::{Namespace, split_key};
use crate::metadata::MetadataRecord;
use crate::metadata::reader::strip_ascii_marker;
use crate::numeric::{
    compose_gps_link, convert_gps_coordinates, convert_rational, format_significant, gcd,
    parse_rational, resolve_fraction,
};

/// Camera panel, in display order.
pub const CAMERA_SEARCH_TAGS: &[&str] = &[
    "ImageSize",
    "Orientation",
    "Make",
    "Model",
    "ApertureValue",
    "ISOSpeedRatings",
    "Flash",
    "FocalLength",
    "ExposureMode",
    "ExposureTime",
];

/// Description panel, in display order.
pub const DESCRIPTION_SEARCH_TAGS: &[&str] = &[
    "Rating",
    "UserComment",
    "DateTime",
    "DateTimeOriginal",
    "ImageDescription",
    "Byline",
    "BylineTitle",
    "City",
    "Country",
    "Headline",
    "Caption",
    "CopyRight",
    "Keywords",
    "Path",
    "FileSize",
];

/// `Exif.Photo.ExposureMode` values, by index.
pub const EXPOSURE_MODES: &[&str] = &[
    "not defined",
    "manual",
    "normal",
    "aperture priority",
    "shutter priority",
    "program creative",
    "high-speed program",
    "portrait mode",
    "landscape mode",
];

/// `Exif.Photo.Flash` bit patterns.
pub const FLASH_MODES: &[(u16, &str)] = &[
    (0x0, "No Flash"),
    (0x1, "Fired"),
    (0x5, "Fired, Return not detected"),
    (0x7, "Fired, Return detected"),
    (0x8, "On, Did not fire"),
    (0x9, "On, Fired"),
    (0xd, "On, Return not detected"),
    (0xf, "On, Return detected"),
    (0x10, "Off, Did not fire"),
    (0x14, "Off, Did not fire, Return not detected"),
    (0x18, "Auto, Did not fire"),
    (0x19, "Auto, Fired"),
    (0x1d, "Auto, Fired, Return not detected"),
    (0x1f, "Auto, Fired, Return detected"),
    (0x20, "No flash function"),
    (0x30, "Off, No flash function"),
    (0x41, "Fired, Red-eye reduction"),
    (0x45, "Fired, Red-eye reduction, Return not detected"),
    (0x47, "Fired, Red-eye reduction, Return detected"),
    (0x49, "On, Red-eye reduction"),
    (0x4d, "On, Red-eye reduction, Return not detected"),
    (0x4f, "On, Red-eye reduction, Return detected"),
    (0x50, "Off, Red-eye reduction"),
    (0x58, "Auto, Did not fire, Red-eye reduction"),
    (0x59, "Auto, Fired, Red-eye reduction"),
    (0x5d, "Auto, Fired, Red-eye reduction, Return not detected"),
    (0x5f, "Auto, Fired, Red-eye reduction, Return detected"),
];

// Search tags whose metadata name differs, and where to look for them.
const SEARCH_ALIASES: &[(&str, Namespace, &str)] = &[
    ("Country", Namespace::Iptc, "CountryName"),
    ("CopyRight", Namespace::Exif, "Copyright"),
    ("CopyRight", Namespace::Iptc, "Copyright"),
];

// EXIF APEX aperture base: f-number = √2 ^ ApertureValue.
const APEX_BASE: f64 = 1.4142;

fn exif(record: &MetadataRecord, key: &str) -> String {
    record.exif_value(key).unwrap_or_default()
}

/// F-number from `ApertureValue`, falling back to `FNumber`.
pub fn aperture(record: &MetadataRecord) -> String {
    let value = exif(record, "ApertureValue");
    if let Some(apex) = parse_rational(&value).and_then(|r| r.to_f64()) {
        return format!("{:.1}", APEX_BASE.powf(apex));
    }
    if !value.is_empty() {
        return value;
    }
    resolve_fraction(&exif(record, "FNumber"))
}

pub fn focal_length(record: &MetadataRecord) -> String {
    let value = exif(record, "FocalLength");
    match convert_rational(&value) {
        Some(v) => format!("{} mm", format_significant(v, 6)),
        None => value,
    }
}

/// `"1/500 sec"` for short exposures, `"2.5 sec"` for long ones.
pub fn exposure_time(record: &MetadataRecord) -> String {
    let value = exif(record, "ExposureTime");
    let Some(r) = parse_rational(&value) else {
        return value;
    };
    if r.denominator == 0 {
        return value;
    }

    if r.numerator <= r.denominator {
        let divisor = gcd(r.denominator, r.numerator).max(1);
        format!("{}/{} sec", r.numerator / divisor, r.denominator / divisor)
    } else {
        format!("{:.1} sec", r.numerator as f64 / r.denominator as f64)
    }
}

pub fn exposure_mode(record: &MetadataRecord) -> String {
    let value = exif(record, "ExposureMode");
    value
        .trim()
        .parse::<usize>()
        .ok()
        .and_then(|mode| EXPOSURE_MODES.get(mode))
        .map(|s| s.to_string())
        .unwrap_or(value)
}

pub fn flash_mode_name(code: u16) -> Option<&'static str> {
    FLASH_MODES.iter().find(|(c, _)| *c == code).map(|(_, name)| *name)
}

/// Description of the `Flash` tag. Unknown codes read as "No Flash".
pub fn flash_mode(record: &MetadataRecord) -> String {
    let value = exif(record, "Flash");
    let code = value.trim().parse::<u16>().unwrap_or(0);
    match flash_mode_name(code) {
        Some(name) => name.to_string(),
        None => {
            log::warn!("Illegal flash mode detected: {code}");
            FLASH_MODES[0].1.to_string()
        }
    }
}

pub fn gps_altitude(value: &str) -> String {
    match convert_rational(value) {
        Some(v) => format!("{} m", format_significant(v, 6)),
        None => value.to_string(),
    }
}

/// Map link for the GPS position, empty without a complete position.
pub fn gps_link(record: &MetadataRecord) -> String {
    let lat = convert_gps_coordinates(&exif(record, "Exif.GPSInfo.GPSLatitude"));
    let lon = convert_gps_coordinates(&exif(record, "Exif.GPSInfo.GPSLongitude"));
    compose_gps_link(
        &lat,
        &lon,
        &exif(record, "Exif.GPSInfo.GPSLatitudeRef"),
        &exif(record, "Exif.GPSInfo.GPSLongitudeRef"),
    )
}

pub fn has_gps(record: &MetadataRecord) -> bool {
    !gps_link(record).is_empty()
}

/// Strip a `charset="..." ` marker from a comment value.
fn strip_charset(value: &str) -> &str {
    let value = strip_ascii_marker(value);
    match value.strip_prefix("charset=\"") {
        Some(rest) => match rest.split_once("\" ") {
            Some((_, body)) => body,
            None => rest.trim_end_matches('"'),
        },
        None => value,
    }
}

/// Turn a raw value into its display form, based on the last segment of
/// `key`.
pub fn resolve_special_value(record: &MetadataRecord, key: &str, value: &str) -> String {
    let name = split_key(key).map(|(_, _, name)| name).unwrap_or(key);

    match name {
        "ApertureValue" | "FNumber" => aperture(record),
        "FocalLength" => focal_length(record),
        "ExposureTime" => exposure_time(record),
        "ExposureMode" => exposure_mode(record),
        "Flash" => flash_mode(record),
        "GPSLatitude" | "GPSLongitude" => convert_gps_coordinates(value).join(" "),
        "GPSAltitude" => gps_altitude(value),
        _ if value.contains("charset=") => strip_charset(value).to_string(),
        _ => resolve_fraction(value),
    }
}

fn image_size(record: &MetadataRecord) -> Option<String> {
    let pair = |w: &str, h: &str| Some(format!("{} x {}", record.exif_value(w)?, record.exif_value(h)?));
    pair("PixelXDimension", "PixelYDimension").or_else(|| pair("ImageWidth", "ImageLength"))
}

/// Raw value of a search tag: EXIF first, then IPTC, then XMP.
fn search_value(record: &MetadataRecord, tag: &str) -> Option<(String, String)> {
    let aliases = SEARCH_ALIASES
        .iter()
        .filter(|(alias, _, _)| *alias == tag)
        .map(|(_, ns, name)| (*ns, *name));
    let direct = Namespace::ALL.into_iter().map(|ns| (ns, tag));

    direct.chain(aliases).find_map(|(ns, name)| {
        let value = record.value(ns, name)?;
        let key = crate::keys::candidate_keys(ns, name)
            .into_iter()
            .find(|k| record.tags(ns).is_some_and(|t| t.contains_key(k)))?;
        Some((key, value))
    })
}

/// One displayed `(label, value)` pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InfoEntry {
    pub label: String,
    pub value: String,
}

fn entry(label: &str, value: String) -> InfoEntry {
    InfoEntry {
        label: label.to_string(),
        value,
    }
}

/// Camera panel entries that have a value.
pub fn camera_info(record: &MetadataRecord) -> Vec<InfoEntry> {
    CAMERA_SEARCH_TAGS
        .iter()
        .filter_map(|&tag| {
            let value = match tag {
                "ImageSize" => image_size(record)?,
                _ => {
                    let (key, raw) = search_value(record, tag)?;
                    resolve_special_value(record, &key, &raw)
                }
            };
            (!value.is_empty()).then(|| entry(tag, value))
        })
        .collect()
}

/// Description panel entries that have a value. `Path` and `FileSize`
/// come from the file itself when `path` is given.
pub fn description_info(record: &MetadataRecord, path: Option<&Path>) -> Vec<InfoEntry> {
    let facts = path.map(file_facts).unwrap_or_default();

    DESCRIPTION_SEARCH_TAGS
        .iter()
        .filter_map(|&tag| {
            let value = match tag {
                "Rating" => record.rating()?.to_string(),
                "Path" | "FileSize" => facts.iter().find(|e| e.label == tag)?.value.clone(),
                _ => {
                    let (key, raw) = search_value(record, tag)?;
                    resolve_special_value(record, &key, &raw)
                }
            };
            (!value.is_empty()).then(|| entry(tag, value))
        })
        .collect()
}

/// Byte count with a binary unit (`"1.5 KB"`).
pub fn readable_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{size:.2} {}", UNITS[unit])
    }
}

fn format_time(time: std::io::Result<std::time::SystemTime>) -> Option<String> {
    let local: DateTime<Local> = time.ok()?.into();
    Some(local.format("%Y-%m-%d %H:%M:%S").to_string())
}

/// File-system facts shown next to the metadata: path, size, dates and
/// (on Unix) permissions. Missing facts are left out.
pub fn file_facts(path: &Path) -> Vec<InfoEntry> {
    let mut out = vec![entry("Path", path.display().to_string())];
    let Ok(meta) = std::fs::metadata(path) else {
        return out;
    };

    out.push(entry("FileSize", readable_bytes(meta.len())));
    if let Some(created) = format_time(meta.created()) {
        out.push(entry("Created", created));
    }
    if let Some(modified) = format_time(meta.modified()) {
        out.push(entry("LastModified", modified));
    }
    if let Some(accessed) = format_time(meta.accessed()) {
        out.push(entry("LastAccessed", accessed));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        out.push(entry(
            "Permissions",
            format!("{:o}", meta.permissions().mode() & 0o777),
        ));
    }
    #[cfg(not(unix))]
    out.push(entry(
        "Permissions",
        if meta.permissions().readonly() { "read-only" } else { "read-write" }.to_string(),
    ));

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MemoryCodec;
    use crate::codec::memory::Snapshot;
    use crate::metadata::test_support::memory_record;
    use crate::numeric::RationalValue;
    use crate::tags::{TagMap, TagValue};

    fn rational(n: i64, d: i64) -> TagValue {
        TagValue::Rational(vec![RationalValue::new(n, d)])
    }

    fn record(exif: TagMap, iptc: TagMap) -> MetadataRecord {
        let snapshot = Snapshot {
            exif,
            iptc,
            ..Default::default()
        };
        memory_record(snapshot, MemoryCodec::new())
    }

    fn exif_record(tags: &[(&str, TagValue)]) -> MetadataRecord {
        record(tags.iter().cloned().collect(), TagMap::new())
    }

    // ── camera values ────────────────────────────────────────────────

    #[test]
    fn aperture_from_apex_value() {
        let r = exif_record(&[("Exif.Photo.ApertureValue", rational(3, 1))]);
        // 1.4142^3 ≈ 2.83
        assert_eq!(aperture(&r), "2.8");
    }

    #[test]
    fn aperture_falls_back_to_fnumber() {
        let r = exif_record(&[("Exif.Photo.FNumber", rational(56, 10))]);
        assert_eq!(aperture(&r), "5.6");
        assert_eq!(resolve_special_value(&r, "Exif.Photo.FNumber", "56/10"), "5.6");
    }

    #[test]
    fn focal_length_and_altitude() {
        let r = exif_record(&[("Exif.Photo.FocalLength", rational(35, 2))]);
        assert_eq!(focal_length(&r), "17.5 mm");
        assert_eq!(gps_altitude("412/1"), "412 m");
        assert_eq!(gps_altitude("n/a"), "n/a");
    }

    #[test]
    fn exposure_times() {
        let r = exif_record(&[("Exif.Photo.ExposureTime", rational(2, 1000))]);
        assert_eq!(exposure_time(&r), "1/500 sec");
        let r = exif_record(&[("Exif.Photo.ExposureTime", rational(5, 2))]);
        assert_eq!(exposure_time(&r), "2.5 sec");
        let r = exif_record(&[("Exif.Photo.ExposureTime", rational(1, 0))]);
        assert_eq!(exposure_time(&r), "1/0");
    }

    #[test]
    fn exposure_and_flash_modes() {
        let r = exif_record(&[
            ("Exif.Photo.ExposureMode", TagValue::short(3)),
            ("Exif.Photo.Flash", TagValue::short(0x19)),
        ]);
        assert_eq!(exposure_mode(&r), "aperture priority");
        assert_eq!(flash_mode(&r), "Auto, Fired");

        let r = exif_record(&[
            ("Exif.Photo.ExposureMode", TagValue::short(42)),
            ("Exif.Photo.Flash", TagValue::short(0x2)),
        ]);
        assert_eq!(exposure_mode(&r), "42");
        assert_eq!(flash_mode(&r), "No Flash");
    }

    // ── GPS ──────────────────────────────────────────────────────────

    fn gps_record(lat_seconds: TagValue) -> MetadataRecord {
        exif_record(&[
            ("Exif.GPSInfo.GPSLatitudeRef", TagValue::text("N")),
            ("Exif.GPSInfo.GPSLatitude", lat_seconds),
            ("Exif.GPSInfo.GPSLongitudeRef", TagValue::text("E")),
            (
                "Exif.GPSInfo.GPSLongitude",
                TagValue::Rational(vec![
                    RationalValue::new(16, 1),
                    RationalValue::new(15, 1),
                    RationalValue::new(0, 1),
                ]),
            ),
        ])
    }

    #[test]
    fn gps_link_from_coordinates() {
        let r = gps_record(TagValue::Rational(vec![
            RationalValue::new(48, 1),
            RationalValue::new(8, 1),
            RationalValue::new(3194, 100),
        ]));
        assert_eq!(
            gps_link(&r),
            "http://maps.google.at/maps?q=+N+48°+8'+31.940000''+E+16°+15'"
        );
        assert!(has_gps(&r));
    }

    #[test]
    fn undefined_component_means_no_gps() {
        let r = gps_record(TagValue::Rational(vec![
            RationalValue::new(48, 1),
            RationalValue::new(8, 0),
            RationalValue::new(0, 1),
        ]));
        assert_eq!(gps_link(&r), "");
        assert!(!has_gps(&r));
    }

    #[test]
    fn special_values() {
        let r = exif_record(&[]);
        assert_eq!(
            resolve_special_value(&r, "Exif.GPSInfo.GPSLatitude", "48/1 8/1 0/1"),
            "48° 8'"
        );
        assert_eq!(resolve_special_value(&r, "Exif.Image.XResolution", "72/1"), "72");
        assert_eq!(
            resolve_special_value(&r, "Exif.Photo.UserComment", "charset=\"Unicode\" grüß"),
            "grüß"
        );
        assert_eq!(resolve_special_value(&r, "Make", "Leica"), "Leica");
    }

    // ── panels ───────────────────────────────────────────────────────

    #[test]
    fn camera_panel_lists_present_values() {
        let r = exif_record(&[
            ("Exif.Image.Make", TagValue::text("Nikon")),
            ("Exif.Photo.PixelXDimension", TagValue::Long(vec![6000])),
            ("Exif.Photo.PixelYDimension", TagValue::Long(vec![4000])),
            ("Exif.Photo.ExposureTime", rational(1, 250)),
        ]);
        let info = camera_info(&r);
        let labels: Vec<&str> = info.iter().map(|e| e.label.as_str()).collect();
        assert_eq!(labels, vec!["ImageSize", "Make", "ExposureTime"]);
        assert_eq!(info[0].value, "6000 x 4000");
        assert_eq!(info[2].value, "1/250 sec");
    }

    #[test]
    fn description_panel_uses_iptc_and_aliases() {
        let iptc: TagMap = [
            ("Iptc.Application2.City", TagValue::text("Linz")),
            ("Iptc.Application2.CountryName", TagValue::text("Austria")),
            ("Iptc.Application2.Keywords", TagValue::List(vec!["river".into()])),
        ]
        .into_iter()
        .collect();
        let exif: TagMap = [("Exif.Image.Rating", TagValue::short(4))].into_iter().collect();
        let r = record(exif, iptc);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.jpg");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        let info = description_info(&r, Some(&path));
        let find = |label: &str| info.iter().find(|e| e.label == label).map(|e| e.value.clone());
        assert_eq!(find("Rating").as_deref(), Some("4"));
        assert_eq!(find("City").as_deref(), Some("Linz"));
        assert_eq!(find("Country").as_deref(), Some("Austria"));
        assert_eq!(find("Keywords").as_deref(), Some("river"));
        assert_eq!(find("FileSize").as_deref(), Some("2.00 KB"));
        assert!(find("Headline").is_none());
    }

    // ── file facts ───────────────────────────────────────────────────

    #[test]
    fn readable_byte_sizes() {
        assert_eq!(readable_bytes(512), "512 B");
        assert_eq!(readable_bytes(1536), "1.50 KB");
        assert_eq!(readable_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn file_facts_for_missing_file() {
        let facts = file_facts(Path::new("/nonexistent/x.jpg"));
        assert_eq!(facts.len(), 1);
        assert_eq!(facts[0].label, "Path");
    }

    #[test]
    fn file_facts_for_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("b.png");
        std::fs::write(&path, b"12345").unwrap();
        let facts = file_facts(&path);
        assert!(facts.iter().any(|e| e.label == "FileSize" && e.value == "5 B"));
        assert!(facts.iter().any(|e| e.label == "LastModified"));
    }
}
