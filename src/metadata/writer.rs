//! Mutating accessors of [`MetadataRecord`].
//!
//! Every write goes to the in-memory maps only and moves the record to
//! `Dirty`; nothing touches the file until a save.

use image::DynamicImage;
use image::codecs::jpeg::JpegEncoder;

use super::MetadataRecord;
use super::reader::{DESCRIPTION_KEY, ORIENTATION_KEY, X_RESOLUTION_KEY, Y_RESOLUTION_KEY};
use crate::codec::jpeg::strip_metadata_segments;
use crate::error::{MetadataError, Result};
use crate::keys::{Namespace, candidate_keys};
use crate::numeric::{RationalValue, gcd};
use crate::orientation::{Orientation, RotationDelta};
use crate::rating::{
    EXIF_RATING, EXIF_RATING_PERCENT, RATING_KEYS, RatingWrite, XMP_MICROSOFT_RATING, XMP_RATING,
};
use crate::tags::TagValue;

const IMAGE_WIDTH_KEY: &str = "Exif.Image.ImageWidth";
const IMAGE_LENGTH_KEY: &str = "Exif.Image.ImageLength";
const SOFTWARE_KEY: &str = "Exif.Image.Software";
const THUMBNAIL_KEY: &str = "Exif.Thumbnail";

const THUMBNAIL_QUALITY: u8 = 85;

/// `v` as an EXIF rational: integers as `n/1`, anything else with three
/// decimals, reduced.
fn to_rational(v: f64) -> Option<RationalValue> {
    if !v.is_finite() || v < 0.0 || v > f64::from(u32::MAX) {
        return None;
    }
    if v.fract() == 0.0 {
        return Some(RationalValue::new(v as i64, 1));
    }
    let numerator = (v * 1000.0).round() as i64;
    let divisor = gcd(numerator, 1000).max(1);
    Some(RationalValue::new(numerator / divisor, 1000 / divisor))
}

impl MetadataRecord {
    /// Set `key` from its display form.
    ///
    /// Short names resolve like [`MetadataRecord::value`]: an existing
    /// candidate is replaced, otherwise the first candidate the codec
    /// knows is inserted.
    pub fn set_value(&mut self, namespace: Namespace, key: &str, text: &str) -> Result<()> {
        let container = self.live_mut()?;
        if !container.access_mode(namespace).can_write() {
            return Err(MetadataError::rejected(
                key,
                format!("{namespace} is not writable in this container"),
            ));
        }

        let candidates = candidate_keys(namespace, key);
        let target = candidates
            .iter()
            .find(|k| container.tags(namespace).contains_key(k))
            .or_else(|| {
                candidates
                    .iter()
                    .find(|k| container.declared_kind(namespace, k).is_some())
            })
            .ok_or_else(|| MetadataError::rejected(key, "unknown key"))?
            .clone();
        let kind = container
            .declared_kind(namespace, &target)
            .ok_or_else(|| MetadataError::rejected(&target, "unknown key"))?;
        let value = TagValue::parse(kind, text).ok_or_else(|| {
            MetadataError::rejected(&target, format!("{text:?} is not a valid {kind:?} value"))
        })?;

        self.put_value(namespace, target, value)
    }

    pub fn set_exif_value(&mut self, key: &str, text: &str) -> Result<()> {
        self.set_value(Namespace::Exif, key, text)
    }

    pub fn set_iptc_value(&mut self, key: &str, text: &str) -> Result<()> {
        self.set_value(Namespace::Iptc, key, text)
    }

    pub fn set_xmp_value(&mut self, key: &str, text: &str) -> Result<()> {
        self.set_value(Namespace::Xmp, key, text)
    }

    /// Store an already typed value under a qualified key.
    pub(crate) fn put_value(
        &mut self,
        namespace: Namespace,
        key: impl Into<String>,
        value: TagValue,
    ) -> Result<()> {
        let key = key.into();
        let container = self.live_mut()?;
        if !container.access_mode(namespace).can_write() {
            return Err(MetadataError::rejected(
                &key,
                format!("{namespace} is not writable in this container"),
            ));
        }
        container.tags_mut(namespace).insert(key, value);
        self.mark_dirty();
        Ok(())
    }

    /// Remove `key`. Returns whether anything was removed.
    pub fn remove_value(&mut self, namespace: Namespace, key: &str) -> Result<bool> {
        let container = self.live_mut()?;
        if !container.access_mode(namespace).can_write() {
            return Err(MetadataError::rejected(
                key,
                format!("{namespace} is not writable in this container"),
            ));
        }
        let removed = candidate_keys(namespace, key)
            .iter()
            .any(|k| container.tags_mut(namespace).remove(k).is_some());
        if removed {
            self.mark_dirty();
        }
        Ok(removed)
    }

    /// Store star rating `r` in every rating tag the container can write.
    /// Zero (or anything outside 1..=5) removes the rating.
    pub fn set_rating(&mut self, r: i32) -> Result<()> {
        match RatingWrite::plan(r) {
            RatingWrite::Clear => {
                let container = self.live_mut()?;
                let stuck = RATING_KEYS.into_iter().find(|key| {
                    Namespace::of_key(key).is_some_and(|ns| {
                        !container.access_mode(ns).can_write() && container.tags(ns).contains_key(key)
                    })
                });
                if let Some(key) = stuck {
                    return Err(MetadataError::rejected(key, "rating is stored in a read-only namespace"));
                }

                let mut removed = false;
                for key in RATING_KEYS {
                    let Some(ns) = Namespace::of_key(key) else {
                        continue;
                    };
                    if container.access_mode(ns).can_write() {
                        removed |= container.tags_mut(ns).remove(key).is_some();
                    }
                }
                if removed {
                    self.mark_dirty();
                }
                Ok(())
            }
            RatingWrite::Set { stars, percent } => {
                if self.rating().map(u16::from) == Some(stars) {
                    return Ok(());
                }
                let container = self.live_mut()?;
                let exif = container.access_mode(Namespace::Exif).can_write();
                let xmp = container.access_mode(Namespace::Xmp).can_write();
                if !exif && !xmp {
                    return Err(MetadataError::rejected(
                        EXIF_RATING,
                        "no writable rating namespace",
                    ));
                }

                if exif {
                    let tags = container.tags_mut(Namespace::Exif);
                    tags.insert(EXIF_RATING, TagValue::short(stars));
                    tags.insert(EXIF_RATING_PERCENT, TagValue::short(percent));
                }
                if xmp {
                    let tags = container.tags_mut(Namespace::Xmp);
                    tags.insert(XMP_RATING, TagValue::text(stars.to_string()));
                    tags.insert(XMP_MICROSOFT_RATING, TagValue::text(percent.to_string()));
                }
                self.mark_dirty();
                Ok(())
            }
        }
    }

    /// Compose `delta` onto the stored orientation and write the result.
    pub fn rotate(&mut self, delta: RotationDelta) -> Result<Orientation> {
        self.live_mut()?;
        let current = self.orientation();
        if delta == RotationDelta::None {
            return Ok(current);
        }
        let next = current.rotate(delta);
        self.put_value(
            Namespace::Exif,
            ORIENTATION_KEY,
            TagValue::short(u16::from(next.code())),
        )?;
        Ok(next)
    }

    pub fn rotate_degrees(&mut self, degrees: i32) -> Result<Orientation> {
        let delta = RotationDelta::from_degrees(degrees).ok_or_else(|| {
            MetadataError::rejected(ORIENTATION_KEY, format!("{degrees}° is not a quarter turn"))
        })?;
        self.rotate(delta)
    }

    /// Reset orientation to 1 (upright). Used after pixels were rotated.
    pub fn clear_orientation(&mut self) -> Result<()> {
        self.put_value(
            Namespace::Exif,
            ORIENTATION_KEY,
            TagValue::short(u16::from(Orientation::IDENTITY.code())),
        )
    }

    pub fn set_description(&mut self, text: &str) -> Result<()> {
        self.put_value(Namespace::Exif, DESCRIPTION_KEY, TagValue::text(text))
    }

    pub fn set_resolution(&mut self, x: f64, y: f64) -> Result<()> {
        self.live_mut()?;
        if self.resolution() == (x, y) {
            return Ok(());
        }
        let xr = to_rational(x).ok_or_else(|| {
            MetadataError::rejected(X_RESOLUTION_KEY, format!("{x} is not a valid resolution"))
        })?;
        let yr = to_rational(y).ok_or_else(|| {
            MetadataError::rejected(Y_RESOLUTION_KEY, format!("{y} is not a valid resolution"))
        })?;
        self.put_value(Namespace::Exif, X_RESOLUTION_KEY, TagValue::Rational(vec![xr]))?;
        self.put_value(Namespace::Exif, Y_RESOLUTION_KEY, TagValue::Rational(vec![yr]))
    }

    /// Replace the EXIF thumbnail with `image` encoded as a baseline JPEG.
    pub fn set_thumbnail(&mut self, image: &DynamicImage) -> Result<()> {
        let rgb = image.to_rgb8();
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, THUMBNAIL_QUALITY)
            .encode_image(&rgb)
            .map_err(|e| MetadataError::rejected(THUMBNAIL_KEY, e.to_string()))?;
        let jpeg = strip_metadata_segments(encoded)
            .map_err(|e| MetadataError::rejected(THUMBNAIL_KEY, e.to_string()))?;

        let container = self.live_mut()?;
        if !container.access_mode(Namespace::Exif).can_write() {
            return Err(MetadataError::rejected(
                THUMBNAIL_KEY,
                "Exif is not writable in this container",
            ));
        }
        container.set_thumbnail(Some(jpeg));
        self.mark_dirty();
        Ok(())
    }

    /// Refresh dimensions, software and thumbnail after the pixels of the
    /// image changed.
    pub fn update_image_metadata(&mut self, image: &DynamicImage) -> Result<()> {
        self.put_value(Namespace::Exif, IMAGE_WIDTH_KEY, TagValue::Long(vec![image.width()]))?;
        self.put_value(Namespace::Exif, IMAGE_LENGTH_KEY, TagValue::Long(vec![image.height()]))?;
        let software = self.settings.software.clone();
        self.put_value(Namespace::Exif, SOFTWARE_KEY, TagValue::text(software))?;
        self.clear_orientation()?;

        let size = self.settings.thumbnail_size;
        self.set_thumbnail(&image.thumbnail(size, size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::memory::Snapshot;
    use crate::codec::{AccessMode, MemoryCodec, test_images};
    use crate::metadata::MetadataState;
    use crate::metadata::test_support::{memory_record, snapshot_with_payload};
    use crate::tags::TagMap;

    fn record() -> MetadataRecord {
        memory_record(snapshot_with_payload(64), MemoryCodec::new())
    }

    fn exif_get(r: &MetadataRecord, key: &str) -> Option<TagValue> {
        r.tags(Namespace::Exif)?.get(key).cloned()
    }

    fn xmp_get(r: &MetadataRecord, key: &str) -> Option<TagValue> {
        r.tags(Namespace::Xmp)?.get(key).cloned()
    }

    // ── set_value ────────────────────────────────────────────────────

    #[test]
    fn set_value_inserts_declared_kind() {
        let mut r = record();
        r.set_exif_value("Orientation", "6").unwrap();
        assert_eq!(exif_get(&r, "Exif.Image.Orientation"), Some(TagValue::short(6)));
        assert_eq!(r.state(), MetadataState::Dirty);
    }

    #[test]
    fn set_value_replaces_existing_candidate() {
        let snapshot = Snapshot {
            exif: [("Exif.Photo.FNumber", TagValue::Rational(vec![RationalValue::new(28, 10)]))]
                .into_iter()
                .collect(),
            ..Default::default()
        };
        let mut r = memory_record(snapshot, MemoryCodec::new());
        r.set_exif_value("FNumber", "4/1").unwrap();
        assert_eq!(
            exif_get(&r, "Exif.Photo.FNumber"),
            Some(TagValue::Rational(vec![RationalValue::new(4, 1)]))
        );
        assert_eq!(exif_get(&r, "Exif.Image.FNumber"), None);
    }

    #[test]
    fn ill_typed_text_is_rejected_without_state_change() {
        let mut r = record();
        let err = r.set_exif_value("Orientation", "sideways").unwrap_err();
        assert!(matches!(err, MetadataError::WriteRejected { .. }));
        assert_eq!(r.state(), MetadataState::Loaded);
        assert_eq!(exif_get(&r, "Exif.Image.Orientation"), None);
    }

    #[test]
    fn unknown_key_is_rejected() {
        let mut r = record();
        let err = r.set_exif_value("NoSuchTag", "1").unwrap_err();
        assert!(matches!(err, MetadataError::WriteRejected { .. }));
        assert!(!r.is_dirty());
    }

    #[test]
    fn read_only_namespace_is_rejected() {
        let codec = MemoryCodec::new().with_access(Namespace::Iptc, AccessMode::Read);
        let mut r = memory_record(snapshot_with_payload(8), codec);
        let err = r.set_iptc_value("City", "Wien").unwrap_err();
        assert!(matches!(err, MetadataError::WriteRejected { .. }));
        assert!(!r.is_dirty());
    }

    #[test]
    fn not_loaded_is_no_metadata() {
        let mut r = MetadataRecord::new();
        assert!(matches!(
            r.set_exif_value("Orientation", "1"),
            Err(MetadataError::NoMetadata(_))
        ));
        assert!(matches!(r.set_rating(3), Err(MetadataError::NoMetadata(_))));
    }

    #[test]
    fn remove_value_reports_removal() {
        let mut r = record();
        r.set_xmp_value("dc.title", "Harbor").unwrap();
        assert!(r.remove_value(Namespace::Xmp, "dc.title").unwrap());
        assert!(!r.remove_value(Namespace::Xmp, "dc.title").unwrap());
        assert_eq!(r.xmp_value("dc.title"), None);
    }

    // ── rating ───────────────────────────────────────────────────────

    #[test]
    fn five_stars_writes_all_four_tags() {
        let mut r = record();
        r.set_rating(5).unwrap();
        assert_eq!(exif_get(&r, "Exif.Image.Rating"), Some(TagValue::short(5)));
        assert_eq!(exif_get(&r, "Exif.Image.RatingPercent"), Some(TagValue::short(99)));
        assert_eq!(xmp_get(&r, "Xmp.xmp.Rating"), Some(TagValue::text("5")));
        assert_eq!(xmp_get(&r, "Xmp.MicrosoftPhoto.Rating"), Some(TagValue::text("99")));
        assert_eq!(r.rating(), Some(5));
    }

    #[test]
    fn every_rating_reads_back() {
        for stars in 1..=5 {
            let mut r = record();
            r.set_rating(stars).unwrap();
            assert_eq!(r.rating(), Some(stars as u8));
        }
    }

    #[test]
    fn zero_clears_all_rating_tags() {
        let mut r = record();
        r.set_rating(3).unwrap();
        r.set_rating(0).unwrap();
        for key in RATING_KEYS {
            let ns = Namespace::of_key(key).unwrap();
            assert!(!r.tags(ns).unwrap().contains_key(key), "{key} survived");
        }
        assert_eq!(r.rating(), None);
    }

    #[test]
    fn same_rating_is_a_no_op() {
        let snapshot = Snapshot {
            exif: [("Exif.Image.Rating", TagValue::short(4))].into_iter().collect(),
            ..Default::default()
        };
        let mut r = memory_record(snapshot, MemoryCodec::new());
        r.set_rating(4).unwrap();
        assert_eq!(r.state(), MetadataState::Loaded);
    }

    #[test]
    fn clearing_an_unrated_image_stays_clean() {
        let mut r = record();
        r.set_rating(0).unwrap();
        assert_eq!(r.state(), MetadataState::Loaded);
    }

    #[test]
    fn rating_skips_read_only_namespace() {
        let codec = MemoryCodec::new().with_access(Namespace::Xmp, AccessMode::Read);
        let mut r = memory_record(snapshot_with_payload(8), codec);
        r.set_rating(2).unwrap();
        assert_eq!(exif_get(&r, "Exif.Image.Rating"), Some(TagValue::short(2)));
        assert_eq!(xmp_get(&r, "Xmp.xmp.Rating"), None);
    }

    #[test]
    fn rating_needs_a_writable_namespace() {
        let mut tags = TagMap::new();
        tags.insert("Exif.Image.Make", TagValue::text("Sony"));
        let tiff = crate::codec::exif::build_tiff(&tags, None, true).unwrap();
        let mut r = MetadataRecord::new();
        r.load_bytes(tiff).unwrap();
        assert!(matches!(r.set_rating(3), Err(MetadataError::WriteRejected { .. })));
        assert!(!r.is_dirty());
    }

    #[test]
    fn clearing_a_read_only_rating_is_rejected() {
        let mut tags = TagMap::new();
        tags.insert("Exif.Image.Rating", TagValue::short(4));
        let tiff = crate::codec::exif::build_tiff(&tags, None, true).unwrap();
        let mut r = MetadataRecord::new();
        r.load_bytes(tiff).unwrap();
        assert_eq!(r.rating(), Some(4));

        assert!(matches!(r.set_rating(0), Err(MetadataError::WriteRejected { .. })));
        assert_eq!(r.rating(), Some(4));
        assert!(!r.is_dirty());
    }

    #[test]
    fn clearing_skips_read_only_namespace_without_rating() {
        let codec = MemoryCodec::new().with_access(Namespace::Xmp, AccessMode::Read);
        let mut r = memory_record(snapshot_with_payload(8), codec);
        r.set_rating(2).unwrap();
        r.set_rating(0).unwrap();
        assert_eq!(r.rating(), None);
    }

    // ── orientation ──────────────────────────────────────────────────

    #[test]
    fn rotation_sequence() {
        let mut r = record();
        r.set_exif_value("Orientation", "6").unwrap();
        assert_eq!(r.rotate(RotationDelta::Clockwise).unwrap().code(), 3);
        assert_eq!(r.rotate(RotationDelta::Clockwise).unwrap().code(), 8);
        assert_eq!(r.rotate(RotationDelta::CounterClockwise).unwrap().code(), 3);
        assert_eq!(r.orientation().code(), 3);
    }

    #[test]
    fn zero_rotation_keeps_record_clean() {
        let mut r = record();
        assert_eq!(r.rotate(RotationDelta::None).unwrap(), Orientation::IDENTITY);
        assert!(!r.is_dirty());
        assert_eq!(exif_get(&r, "Exif.Image.Orientation"), None);
    }

    #[test]
    fn rotate_by_degrees() {
        let mut r = record();
        assert_eq!(r.rotate_degrees(270).unwrap().code(), 8);
        assert_eq!(r.rotate_degrees(-270).unwrap().code(), 1);
        assert!(r.rotate_degrees(45).is_err());
    }

    #[test]
    fn clear_orientation_writes_one() {
        let mut r = record();
        r.set_exif_value("Orientation", "8").unwrap();
        r.clear_orientation().unwrap();
        assert_eq!(exif_get(&r, "Exif.Image.Orientation"), Some(TagValue::short(1)));
    }

    // ── description, resolution ──────────────────────────────────────

    #[test]
    fn description_round_trip() {
        let mut r = record();
        r.set_description("Old town").unwrap();
        assert_eq!(r.description(), "Old town");
    }

    #[test]
    fn resolution_as_rationals() {
        let mut r = record();
        r.set_resolution(300.0, 72.5).unwrap();
        assert_eq!(
            exif_get(&r, "Exif.Image.XResolution"),
            Some(TagValue::Rational(vec![RationalValue::new(300, 1)]))
        );
        assert_eq!(
            exif_get(&r, "Exif.Image.YResolution"),
            Some(TagValue::Rational(vec![RationalValue::new(145, 2)]))
        );
        assert_eq!(r.resolution(), (300.0, 72.5));
    }

    #[test]
    fn unchanged_resolution_is_a_no_op() {
        let mut r = record();
        r.set_resolution(72.0, 72.0).unwrap();
        assert!(!r.is_dirty());
        assert!(r.set_resolution(-1.0, 72.0).is_err());
        assert!(r.set_resolution(f64::NAN, 72.0).is_err());
    }

    // ── thumbnail ────────────────────────────────────────────────────

    #[test]
    fn thumbnail_replaces_previous() {
        let mut r = record();
        let first = image::load_from_memory(&test_images::png(20, 10)).unwrap();
        r.set_thumbnail(&first).unwrap();
        let second = DynamicImage::new_rgba8(8, 8);
        r.set_thumbnail(&second).unwrap();

        let thumb = r.thumbnail().unwrap();
        assert_eq!((thumb.width(), thumb.height()), (8, 8));
        assert!(r.is_dirty());
    }

    #[test]
    fn update_image_metadata_refreshes_fields() {
        let mut r = record();
        r.set_exif_value("Orientation", "6").unwrap();
        let img = image::load_from_memory(&test_images::jpeg(640, 320)).unwrap();
        r.update_image_metadata(&img).unwrap();

        assert_eq!(exif_get(&r, "Exif.Image.ImageWidth"), Some(TagValue::Long(vec![640])));
        assert_eq!(exif_get(&r, "Exif.Image.ImageLength"), Some(TagValue::Long(vec![320])));
        assert_eq!(r.orientation(), Orientation::IDENTITY);
        assert!(r.exif_value("Software").unwrap().starts_with("metacanon"));
        let thumb = r.thumbnail().unwrap();
        assert_eq!((thumb.width(), thumb.height()), (160, 80));
    }

    #[test]
    fn rational_conversion() {
        assert_eq!(to_rational(72.0), Some(RationalValue::new(72, 1)));
        assert_eq!(to_rational(0.5), Some(RationalValue::new(1, 2)));
        assert_eq!(to_rational(-2.0), None);
        assert_eq!(to_rational(f64::INFINITY), None);
    }
}
