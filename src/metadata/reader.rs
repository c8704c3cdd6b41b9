//! Read accessors of [`MetadataRecord`].
//!
//! Nothing here fails: a record without live metadata answers with empty
//! or neutral values.

use image::DynamicImage;

use super::{MetadataRecord, TOO_LARGE_SENTINEL};
use crate::keys::{Namespace, candidate_keys};
use crate::orientation::Orientation;
use crate::rating::{EXIF_RATING, RatingSources, XMP_MICROSOFT_RATING, XMP_RATING, reconcile};
use crate::tags::{TagMap, TagValue};

pub(crate) const ORIENTATION_KEY: &str = "Exif.Image.Orientation";
pub(crate) const DESCRIPTION_KEY: &str = "Exif.Image.ImageDescription";
pub(crate) const X_RESOLUTION_KEY: &str = "Exif.Image.XResolution";
pub(crate) const Y_RESOLUTION_KEY: &str = "Exif.Image.YResolution";

const DEFAULT_RESOLUTION: f64 = 72.0;
const CHARSET_ASCII_MARKER: &str = "charset=\"ascii\" ";

/// Drop a leading `charset="Ascii" ` marker, in any letter case.
pub(crate) fn strip_ascii_marker(value: &str) -> &str {
    match value.get(..CHARSET_ASCII_MARKER.len()) {
        Some(head) if head.eq_ignore_ascii_case(CHARSET_ASCII_MARKER) => {
            &value[CHARSET_ASCII_MARKER.len()..]
        }
        _ => value,
    }
}

impl MetadataRecord {
    fn render(&self, value: &TagValue) -> String {
        if value.count() >= self.settings.max_display_count {
            return TOO_LARGE_SENTINEL.to_string();
        }
        strip_ascii_marker(&value.to_string()).to_string()
    }

    fn number(&self, key: &str) -> Option<f64> {
        self.live()?.exif().get(key).and_then(TagValue::as_f64)
    }

    fn xmp_number(&self, key: &str) -> Option<f64> {
        self.live()?.xmp().get(key).and_then(TagValue::as_f64)
    }

    /// Value of `key`, trying the fallback groups for short names.
    ///
    /// The first candidate with a non-empty rendering wins.
    pub fn value(&self, namespace: Namespace, key: &str) -> Option<String> {
        let tags = self.live()?.tags(namespace);
        candidate_keys(namespace, key)
            .iter()
            .filter_map(|k| tags.get(k))
            .map(|v| self.render(v))
            .find(|s| !s.is_empty())
    }

    /// The raw tag map of a namespace.
    pub fn tags(&self, namespace: Namespace) -> Option<&TagMap> {
        self.live().map(|c| c.tags(namespace))
    }

    /// XMP schemas of the file that are not in the built-in registry.
    pub(crate) fn xmp_namespaces(&self) -> Option<&[(String, String)]> {
        self.live().map(|c| c.maps().xmp_namespaces.as_slice())
    }

    pub fn exif_value(&self, key: &str) -> Option<String> {
        self.value(Namespace::Exif, key)
    }

    pub fn iptc_value(&self, key: &str) -> Option<String> {
        self.value(Namespace::Iptc, key)
    }

    pub fn xmp_value(&self, key: &str) -> Option<String> {
        self.value(Namespace::Xmp, key)
    }

    /// Canonical 0–5 rating, `None` when unrated.
    pub fn rating(&self) -> Option<u8> {
        self.live()?;
        reconcile(RatingSources {
            exif: self.number(EXIF_RATING),
            xmp: self.xmp_number(XMP_RATING),
            microsoft: self.xmp_number(XMP_MICROSOFT_RATING),
        })
    }

    pub fn orientation(&self) -> Orientation {
        self.number(ORIENTATION_KEY)
            .map(|v| Orientation::from_raw(v as i64))
            .unwrap_or_default()
    }

    pub fn description(&self) -> String {
        self.value(Namespace::Exif, DESCRIPTION_KEY).unwrap_or_default()
    }

    /// `(x, y)` resolution in dots per unit, 72 when unknown.
    pub fn resolution(&self) -> (f64, f64) {
        let x = self.number(X_RESOLUTION_KEY).unwrap_or(DEFAULT_RESOLUTION);
        let y = self.number(Y_RESOLUTION_KEY).unwrap_or(DEFAULT_RESOLUTION);
        (x, y)
    }

    fn keys_of(&self, namespace: Namespace) -> Vec<String> {
        self.tags(namespace)
            .map(|t| t.keys().map(String::from).collect())
            .unwrap_or_default()
    }

    fn values_of(&self, namespace: Namespace) -> Vec<String> {
        self.tags(namespace)
            .map(|t| t.iter().map(|(_, v)| self.render(v)).collect())
            .unwrap_or_default()
    }

    pub fn exif_keys(&self) -> Vec<String> {
        self.keys_of(Namespace::Exif)
    }

    pub fn iptc_keys(&self) -> Vec<String> {
        self.keys_of(Namespace::Iptc)
    }

    pub fn xmp_keys(&self) -> Vec<String> {
        self.keys_of(Namespace::Xmp)
    }

    /// Rendered EXIF values, parallel to [`MetadataRecord::exif_keys`].
    pub fn exif_values(&self) -> Vec<String> {
        self.values_of(Namespace::Exif)
    }

    pub fn iptc_values(&self) -> Vec<String> {
        self.values_of(Namespace::Iptc)
    }

    pub fn display_tag(&self, key: &str) -> Option<&str> {
        self.live()?;
        self.display_tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn display_tags(&self) -> &[(String, String)] {
        match self.live() {
            Some(_) => &self.display_tags,
            None => &[],
        }
    }

    /// Every key/value pair: EXIF, IPTC, XMP, then container text chunks.
    pub fn all_metadata(&self) -> Vec<(String, String)> {
        let Some(container) = self.live() else {
            return Vec::new();
        };
        let mut out: Vec<(String, String)> = Namespace::ALL
            .into_iter()
            .flat_map(move |ns| container.tags(ns).iter())
            .map(|(k, v)| (k.to_string(), self.render(v)))
            .collect();
        out.extend(self.display_tags.iter().cloned());
        out
    }

    /// Encoded EXIF thumbnail.
    pub fn thumbnail_bytes(&self) -> Option<&[u8]> {
        self.live()?.thumbnail()
    }

    /// Decoded EXIF thumbnail.
    pub fn thumbnail(&self) -> Option<DynamicImage> {
        let data = self.thumbnail_bytes()?;
        match image::load_from_memory(data) {
            Ok(img) => Some(img),
            Err(e) => {
                log::debug!("Thumbnail could not be decoded: {e}");
                None
            }
        }
    }

    /// The largest embedded preview wider than `min_width`.
    pub fn preview_image(&self, min_width: u32) -> Option<DynamicImage> {
        let container = self.live()?;
        let best = container
            .previews()
            .into_iter()
            .filter(|p| p.width > min_width)
            .max_by_key(|p| u64::from(p.width) * u64::from(p.height))?;
        let data = container.preview_data(best.index)?;
        image::load_from_memory(&data).ok()
    }
}
