//! Saving: re-serialize the record's maps into a fresh container and
//! accept the result only if it passes the integrity gate.
//!
//! The record is never modified by a rejected save.

use std::path::Path;

use super::{MetadataRecord, MetadataState};
use crate::error::{MetadataError, Result, SaveRejection};

/// Accept `produced` bytes only when they are non-empty and larger than
/// `round(original × ratio)`.
pub fn check_integrity(original: usize, produced: usize, ratio: f64) -> std::result::Result<(), SaveRejection> {
    if produced == 0 {
        return Err(SaveRejection::EmptyBuffer);
    }
    let floor = (original as f64 * ratio).round() as usize;
    if produced > floor {
        Ok(())
    } else {
        Err(SaveRejection::Truncated { original, produced })
    }
}

fn codec_rejection(e: impl std::fmt::Display) -> MetadataError {
    MetadataError::SaveRejected(SaveRejection::Codec(e.to_string()))
}

impl MetadataRecord {
    /// Write the record's metadata into `buffer`.
    ///
    /// Without `force` a clean record is rejected with
    /// [`SaveRejection::NotDirty`]. On success `buffer` holds the new
    /// bytes and the record is `Loaded` from them; on failure both are
    /// unchanged.
    pub fn save_to_buffer(&mut self, buffer: &mut Vec<u8>, force: bool) -> Result<()> {
        let Some(current) = self.live() else {
            return Err(MetadataError::SaveRejected(SaveRejection::NothingLoaded));
        };
        if !force && self.state != MetadataState::Dirty {
            return Err(MetadataError::SaveRejected(SaveRejection::NotDirty));
        }
        let maps = current.maps().clone();

        let mut fresh = self.codec.open(buffer.clone()).map_err(codec_rejection)?;
        fresh.read_metadata().map_err(codec_rejection)?;
        *fresh.maps_mut() = maps;
        fresh.write_metadata().map_err(codec_rejection)?;

        let produced = fresh.bytes().len();
        if let Err(rejection) = check_integrity(buffer.len(), produced, self.settings.integrity_ratio) {
            log::warn!("Refusing to save metadata: {rejection}");
            return Err(MetadataError::SaveRejected(rejection));
        }

        buffer.clear();
        buffer.extend_from_slice(fresh.bytes());
        self.adopt(fresh);
        log::info!("Metadata saved ({produced} bytes)");
        Ok(())
    }

    /// Save into the file at `path`, rewriting it in place.
    pub fn save_to_path(&mut self, path: &Path, force: bool) -> Result<()> {
        let mut buffer = std::fs::read(path)?;
        self.save_to_buffer(&mut buffer, force)?;
        if buffer.is_empty() {
            return Err(MetadataError::SaveRejected(SaveRejection::EmptyBuffer));
        }
        std::fs::write(path, &buffer)?;
        log::info!("Metadata written to {}", path.display());
        Ok(())
    }

    /// Re-serialize over the record's own buffer and return the new bytes.
    pub fn serialize(&mut self, force: bool) -> Result<Vec<u8>> {
        let mut buffer = self
            .live()
            .map(|c| c.bytes().to_vec())
            .ok_or(MetadataError::SaveRejected(SaveRejection::NothingLoaded))?;
        self.save_to_buffer(&mut buffer, force)?;
        Ok(buffer)
    }

    /// Container bytes as last loaded or saved.
    pub fn current_bytes(&self) -> Option<&[u8]> {
        self.live().map(|c| c.bytes())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codec::memory::Snapshot;
    use crate::codec::{MemoryCodec, test_images};
    use crate::keys::Namespace;
    use crate::metadata::test_support::{memory_record, snapshot_with_payload};
    use crate::orientation::RotationDelta;

    // ── integrity gate ───────────────────────────────────────────────

    #[test]
    fn gate_thresholds() {
        assert_eq!(check_integrity(100, 0, 0.5), Err(SaveRejection::EmptyBuffer));
        assert_eq!(
            check_integrity(100, 50, 0.5),
            Err(SaveRejection::Truncated { original: 100, produced: 50 })
        );
        assert_eq!(check_integrity(100, 51, 0.5), Ok(()));
        assert_eq!(check_integrity(0, 1, 0.5), Ok(()));
    }

    // ── save_to_buffer ───────────────────────────────────────────────

    #[test]
    fn nothing_loaded_is_rejected() {
        let mut r = MetadataRecord::new();
        let mut buf = test_images::jpeg(8, 8);
        let err = r.save_to_buffer(&mut buf, true).unwrap_err();
        assert!(matches!(err, MetadataError::SaveRejected(SaveRejection::NothingLoaded)));
    }

    #[test]
    fn clean_record_needs_force() {
        let snapshot = snapshot_with_payload(64);
        let mut r = memory_record(snapshot.clone(), MemoryCodec::new());
        let mut buf = snapshot.to_bytes();
        let err = r.save_to_buffer(&mut buf, false).unwrap_err();
        assert!(matches!(err, MetadataError::SaveRejected(SaveRejection::NotDirty)));

        r.save_to_buffer(&mut buf, true).unwrap();
        assert_eq!(r.state(), MetadataState::Loaded);
    }

    #[test]
    fn truncated_output_leaves_record_dirty() {
        let snapshot = snapshot_with_payload(400);
        let original = snapshot.to_bytes();
        let codec = MemoryCodec::new().truncating(original.len() / 4);
        let mut r = memory_record(snapshot, codec);
        r.set_rating(3).unwrap();

        let mut buf = original.clone();
        let err = r.save_to_buffer(&mut buf, false).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::SaveRejected(SaveRejection::Truncated { .. })
        ));
        assert_eq!(buf, original);
        assert_eq!(r.state(), MetadataState::Dirty);
        assert_eq!(r.rating(), Some(3));
    }

    #[test]
    fn accepted_save_commits_buffer_and_state() {
        let snapshot = snapshot_with_payload(64);
        let mut r = memory_record(snapshot.clone(), MemoryCodec::new());
        r.set_xmp_value("dc.title", "Pier").unwrap();

        let mut buf = snapshot.to_bytes();
        r.save_to_buffer(&mut buf, false).unwrap();
        assert_eq!(r.state(), MetadataState::Loaded);
        assert_eq!(r.current_bytes(), Some(buf.as_slice()));

        let mut reread = MetadataRecord::with_codec(Arc::new(MemoryCodec::new()));
        reread.load_bytes(buf).unwrap();
        assert_eq!(reread.xmp_value("dc.title").as_deref(), Some("Pier"));
    }

    #[test]
    fn unreadable_target_is_codec_rejection() {
        let mut r = memory_record(snapshot_with_payload(8), MemoryCodec::new());
        r.set_rating(1).unwrap();
        let mut buf = b"{not json".to_vec();
        let err = r.save_to_buffer(&mut buf, false).unwrap_err();
        assert!(matches!(err, MetadataError::SaveRejected(SaveRejection::Codec(_))));
        assert!(r.is_dirty());
    }

    #[test]
    fn serialize_uses_own_buffer() {
        let mut r = memory_record(snapshot_with_payload(32), MemoryCodec::new());
        r.set_description("Quay").unwrap();
        let bytes = r.serialize(false).unwrap();
        let back: Snapshot = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(back.payload.len(), 32);
        assert!(back.exif.contains_key("Exif.Image.ImageDescription"));
    }

    // ── JPEG round trip ──────────────────────────────────────────────

    #[test]
    fn jpeg_metadata_survives_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photo.jpg");
        std::fs::write(&path, test_images::jpeg(48, 32)).unwrap();

        let mut r = MetadataRecord::new();
        r.load_path(&path).unwrap();
        r.set_rating(4).unwrap();
        r.rotate(RotationDelta::Clockwise).unwrap();
        r.set_xmp_value("dc.title", "Lighthouse").unwrap();
        r.set_iptc_value("Keywords", "coast, night").unwrap();
        r.save_to_path(&path, false).unwrap();
        assert_eq!(r.state(), MetadataState::Loaded);

        let mut back = MetadataRecord::new();
        back.load_path(&path).unwrap();
        assert_eq!(back.rating(), Some(4));
        assert_eq!(back.orientation().code(), 6);
        assert_eq!(back.xmp_value("dc.title").as_deref(), Some("Lighthouse"));
        assert_eq!(
            back.tags(Namespace::Iptc)
                .and_then(|t| t.get("Iptc.Application2.Keywords"))
                .map(|v| v.as_strings()),
            Some(vec!["coast".to_string(), "night".to_string()])
        );
        assert_eq!(back.exif_value("Rating").as_deref(), Some("4"));
        assert_eq!(back.exif_value("RatingPercent").as_deref(), Some("75"));

        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (48, 32));
    }

    #[test]
    fn read_only_container_refuses_save() {
        let mut tags = crate::tags::TagMap::new();
        tags.insert("Exif.Image.Make", crate::tags::TagValue::text("Olympus"));
        let tiff = crate::codec::exif::build_tiff(&tags, None, true).unwrap();
        let mut r = MetadataRecord::new();
        r.load_bytes(tiff.clone()).unwrap();

        let mut buf = tiff;
        let err = r.save_to_buffer(&mut buf, true).unwrap_err();
        assert!(matches!(err, MetadataError::SaveRejected(SaveRejection::Codec(_))));
        assert_eq!(r.state(), MetadataState::Loaded);
    }
}
