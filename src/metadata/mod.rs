//! The metadata record: one image's EXIF, IPTC and XMP maps behind a
//! load/dirty state machine.
//!
//! ```text
//! NotLoaded ──load ok──▶ Loaded ──edit──▶ Dirty ──save ok──▶ Loaded
//!     │                                     │
//!     └──load failed──▶ NoData (terminal)   └──save failed──▶ Dirty
//! ```
//!
//! Readers see live data (unsaved edits included) in `Loaded` and `Dirty`
//! and neutral values otherwise. Writers live in [`writer`], saving in
//! [`writeback`].
//!
//! ```rust,no_run
//! use metacanon::metadata::MetadataRecord;
//! use metacanon::orientation::RotationDelta;
//!
//! let mut record = MetadataRecord::new();
//! record.load_path("photo.jpg".as_ref())?;
//! println!("rating: {:?}", record.rating());
//!
//! record.set_rating(4)?;
//! record.rotate(RotationDelta::Clockwise)?;
//! record.save_to_path("photo.jpg".as_ref(), false)?;
//! # Ok::<(), metacanon::error::MetadataError>(())
//! ```

pub mod reader;
pub mod writeback;
pub mod writer;

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::codec::{Container, DefaultCodec, MetadataCodec};
use crate::config::EngineConfig;
use crate::error::{MetadataError, Result};

/// Shown instead of values too large to materialize.
pub const TOO_LARGE_SENTINEL: &str = "<data too large to display>";

/// PNG text chunk holding a hex dump of the EXIF block; never displayed.
const RAW_EXIF_PROFILE_KEY: &str = "Raw profile type exif";

pub const JPEG_EXTENSIONS: &[&str] = &["jpg", "jpeg"];
pub const TIFF_EXTENSIONS: &[&str] = &["tif", "tiff"];
pub const RAW_EXTENSIONS: &[&str] = &[
    "nef", "crw", "cr2", "cr3", "arw", "dng", "orf", "rw2", "pef", "srw", "raf",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum MetadataState {
    #[default]
    NotLoaded,
    Loaded,
    Dirty,
    NoData,
}

impl fmt::Display for MetadataState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotLoaded => "not loaded",
            Self::Loaded => "loaded",
            Self::Dirty => "dirty",
            Self::NoData => "no data",
        };
        f.write_str(s)
    }
}

/// Metadata of one image.
pub struct MetadataRecord {
    state: MetadataState,
    source_path: Option<PathBuf>,
    container: Option<Box<dyn Container>>,
    display_tags: Vec<(String, String)>,
    codec: Arc<dyn MetadataCodec>,
    settings: EngineConfig,
}

impl Default for MetadataRecord {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MetadataRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetadataRecord")
            .field("state", &self.state)
            .field("source_path", &self.source_path)
            .field("format", &self.container.as_ref().map(|c| c.format()))
            .finish()
    }
}

impl MetadataRecord {
    /// An empty record using [`DefaultCodec`].
    pub fn new() -> Self {
        Self::with_codec(Arc::new(DefaultCodec))
    }

    pub fn with_codec(codec: Arc<dyn MetadataCodec>) -> Self {
        Self {
            state: MetadataState::NotLoaded,
            source_path: None,
            container: None,
            display_tags: Vec::new(),
            codec,
            settings: EngineConfig::default(),
        }
    }

    pub fn with_settings(mut self, settings: EngineConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn state(&self) -> MetadataState {
        self.state
    }

    pub fn settings(&self) -> &EngineConfig {
        &self.settings
    }

    pub fn codec(&self) -> &dyn MetadataCodec {
        self.codec.as_ref()
    }

    pub fn source_path(&self) -> Option<&Path> {
        self.source_path.as_deref()
    }

    /// Open `bytes` and read their metadata.
    ///
    /// Any failure moves the record to [`MetadataState::NoData`] for good.
    pub fn load_bytes(&mut self, bytes: Vec<u8>) -> Result<()> {
        if self.state == MetadataState::NoData {
            return Err(MetadataError::NoMetadata(
                "record already failed to load".to_string(),
            ));
        }

        let mut container = match self.codec.open(bytes) {
            Ok(c) => c,
            Err(e) => return Err(self.fail(MetadataError::OpenFailure(e.to_string()))),
        };
        if let Err(e) = container.read_metadata() {
            return Err(self.fail(MetadataError::NoMetadata(e.to_string())));
        }
        if !container.good() {
            return Err(self.fail(MetadataError::NoMetadata(
                "container reported an unhealthy parse".to_string(),
            )));
        }

        self.adopt(container);
        log::debug!("Metadata loaded ({} EXIF keys)", self.exif_keys().len());
        Ok(())
    }

    /// Read `path` (following a symlink to its target) and load it.
    pub fn load_path(&mut self, path: &Path) -> Result<()> {
        self.source_path = Some(path.to_path_buf());

        let target = match std::fs::symlink_metadata(path) {
            Ok(meta) if meta.file_type().is_symlink() => {
                std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
            }
            _ => path.to_path_buf(),
        };

        match std::fs::read(&target) {
            Ok(bytes) => self.load_bytes(bytes),
            Err(e) => Err(self.fail(MetadataError::OpenFailure(format!(
                "{}: {e}",
                target.display()
            )))),
        }
    }

    pub fn has_metadata(&self) -> bool {
        matches!(self.state, MetadataState::Loaded | MetadataState::Dirty)
    }

    /// Whether a load was attempted, successful or not.
    pub fn is_loaded(&self) -> bool {
        matches!(
            self.state,
            MetadataState::Loaded | MetadataState::Dirty | MetadataState::NoData
        )
    }

    pub fn is_dirty(&self) -> bool {
        self.state == MetadataState::Dirty
    }

    pub fn is_jpg(&self) -> bool {
        self.extension_in(JPEG_EXTENSIONS)
    }

    pub fn is_tiff(&self) -> bool {
        self.extension_in(TIFF_EXTENSIONS)
    }

    pub fn is_raw(&self) -> bool {
        self.extension_in(RAW_EXTENSIONS)
    }

    fn extension_in(&self, list: &[&str]) -> bool {
        self.source_path
            .as_deref()
            .and_then(|p| p.extension())
            .and_then(|e| e.to_str())
            .is_some_and(|e| list.contains(&e.to_lowercase().as_str()))
    }

    /// The container, only while its maps are trustworthy.
    pub(crate) fn live(&self) -> Option<&dyn Container> {
        match self.state {
            MetadataState::Loaded | MetadataState::Dirty => self.container.as_deref(),
            MetadataState::NotLoaded | MetadataState::NoData => None,
        }
    }

    pub(crate) fn live_mut(&mut self) -> Result<&mut Box<dyn Container>> {
        match self.state {
            MetadataState::Loaded | MetadataState::Dirty => self
                .container
                .as_mut()
                .ok_or_else(|| MetadataError::NoMetadata("no container".to_string())),
            state => Err(MetadataError::NoMetadata(format!("record is {state}"))),
        }
    }

    pub(crate) fn mark_dirty(&mut self) {
        if self.state == MetadataState::Loaded {
            log::debug!("Metadata marked dirty");
        }
        self.state = MetadataState::Dirty;
    }

    /// Install a freshly read container as the record's live one.
    pub(crate) fn adopt(&mut self, container: Box<dyn Container>) {
        self.display_tags = collect_display_tags(container.text_chunks(), &self.settings);
        self.container = Some(container);
        self.state = MetadataState::Loaded;
    }

    fn fail(&mut self, err: MetadataError) -> MetadataError {
        log::debug!("Metadata unavailable: {err}");
        self.state = MetadataState::NoData;
        self.container = None;
        self.display_tags.clear();
        err
    }
}

fn collect_display_tags(chunks: Vec<(String, String)>, settings: &EngineConfig) -> Vec<(String, String)> {
    chunks
        .into_iter()
        .filter(|(key, value)| !key.is_empty() && key != RAW_EXIF_PROFILE_KEY && !value.is_empty())
        .map(|(key, value)| {
            if value.chars().count() < settings.max_text_chunk_len {
                (key, value)
            } else {
                (key, TOO_LARGE_SENTINEL.to_string())
            }
        })
        .collect()
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use crate::codec::{MemoryCodec, test_images};

    // ── state machine ────────────────────────────────────────────────

    #[test]
    fn new_record_is_not_loaded() {
        let record = MetadataRecord::new();
        assert_eq!(record.state(), MetadataState::NotLoaded);
        assert!(!record.is_loaded());
        assert!(!record.has_metadata());
        assert!(record.exif_keys().is_empty());
    }

    #[test]
    fn unopenable_bytes_move_to_no_data() {
        let mut record = MetadataRecord::new();
        let err = record.load_bytes(b"definitely not an image".to_vec()).unwrap_err();
        assert!(matches!(err, MetadataError::OpenFailure(_)));
        assert_eq!(record.state(), MetadataState::NoData);
        assert!(record.is_loaded());
        assert!(!record.has_metadata());
        assert_eq!(record.rating(), None);
    }

    #[test]
    fn no_data_is_terminal() {
        let mut record = MetadataRecord::new();
        let _ = record.load_bytes(vec![1, 2, 3]);
        let err = record.load_bytes(test_images::jpeg(8, 8)).unwrap_err();
        assert!(matches!(err, MetadataError::NoMetadata(_)));
        assert_eq!(record.state(), MetadataState::NoData);
    }

    #[test]
    fn unreadable_metadata_is_no_data() {
        let mut record = MetadataRecord::with_codec(Arc::new(MemoryCodec::new()));
        let err = record.load_bytes(b"{broken".to_vec()).unwrap_err();
        assert!(matches!(err, MetadataError::NoMetadata(_)));
        assert_eq!(record.state(), MetadataState::NoData);
    }

    #[test]
    fn plain_jpeg_loads() {
        let mut record = MetadataRecord::new();
        record.load_bytes(test_images::jpeg(16, 16)).unwrap();
        assert_eq!(record.state(), MetadataState::Loaded);
        assert!(record.has_metadata());
        assert!(!record.is_dirty());
    }

    #[test]
    fn missing_file_is_open_failure() {
        let dir = tempfile::tempdir().unwrap();
        let mut record = MetadataRecord::new();
        let err = record.load_path(&dir.path().join("gone.jpg")).unwrap_err();
        assert!(matches!(err, MetadataError::OpenFailure(_)));
        assert_eq!(record.state(), MetadataState::NoData);
        assert!(record.is_jpg());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_are_resolved() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("real.jpg");
        std::fs::write(&target, test_images::jpeg(8, 8)).unwrap();
        let link = dir.path().join("link.jpg");
        std::os::unix::fs::symlink(&target, &link).unwrap();

        let mut record = MetadataRecord::new();
        record.load_path(&link).unwrap();
        assert!(record.has_metadata());
        assert_eq!(record.source_path(), Some(link.as_path()));
    }

    #[test]
    fn file_kind_from_extension() {
        let mut record = MetadataRecord::new();
        let dir = tempfile::tempdir().unwrap();
        let _ = record.load_path(&dir.path().join("IMG_0001.CR2"));
        assert!(record.is_raw());
        assert!(!record.is_tiff());
        assert!(!record.is_jpg());
    }

    // ── display tags ─────────────────────────────────────────────────

    #[test]
    fn display_tags_filter_and_cap() {
        let settings = EngineConfig {
            max_text_chunk_len: 10,
            ..EngineConfig::default()
        };
        let chunks = vec![
            ("Comment".to_string(), "short".to_string()),
            ("Raw profile type exif".to_string(), "4578696600".to_string()),
            ("Empty".to_string(), String::new()),
            ("Long".to_string(), "x".repeat(10)),
        ];
        let tags = collect_display_tags(chunks, &settings);
        assert_eq!(
            tags,
            vec![
                ("Comment".to_string(), "short".to_string()),
                ("Long".to_string(), TOO_LARGE_SENTINEL.to_string()),
            ]
        );
    }

    #[test]
    fn memory_record_loads_snapshot() {
        let record = memory_record(snapshot_with_payload(16), MemoryCodec::new());
        assert_eq!(record.state(), MetadataState::Loaded);
    }
}
