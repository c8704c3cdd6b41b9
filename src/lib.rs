//! # metacanon
//!
//! One read/write surface over the EXIF, IPTC and XMP metadata embedded in
//! images. Facts that vendors store under several keys (rating,
//! orientation, description, GPS) are reconciled on read and written to
//! every place they belong. Saves are re-serialized into a fresh container
//! and refused when the codec output is implausibly small.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use metacanon::metadata::MetadataRecord;
//! use metacanon::orientation::RotationDelta;
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let path = Path::new("photo.jpg");
//!     let mut record = MetadataRecord::new();
//!     record.load_path(path)?;
//!
//!     println!("Rating: {:?}", record.rating());
//!     record.set_rating(4)?;
//!     record.rotate(RotationDelta::Clockwise)?;
//!     record.save_to_path(path, false)?;
//!     Ok(())
//! }
//! ```
//!
//! Raw files are never rewritten; crops go to an XMP sidecar:
//!
//! ```rust,no_run
//! use metacanon::metadata::MetadataRecord;
//! use metacanon::sidecar::{RotatedRect, Sidecar};
//! use std::path::Path;
//!
//! fn main() -> anyhow::Result<()> {
//!     let mut record = MetadataRecord::new();
//!     record.load_path(Path::new("photo.nef"))?;
//!
//!     let mut sidecar = Sidecar::get_or_create(&record, record.codec())?;
//!     let rect = RotatedRect::from_pixels(100.0, 50.0, 1200.0, 800.0, 3.5);
//!     sidecar.write_crop_rectangle(&rect, (6000, 4000))?;
//!     Ok(())
//! }
//! ```
//!
//! ## Supported Formats
//!
//! | Format | EXIF | IPTC | XMP |
//! |--------|------|------|-----|
//! | JPEG (`.jpg`, `.jpeg`) | read/write | read/write | read/write |
//! | PNG (`.png`) | read/write | n/a | read/write |
//! | TIFF and TIFF-based raw | read | read | read |
//! | XMP sidecar (`.xmp`) | n/a | n/a | read/write |
//!
//! ## Modules
//!
//! - [`metadata`]: the metadata record, its readers, writers and write-back
//! - [`sidecar`]: XMP sidecars and crop rectangles
//! - [`display`]: human-readable camera and description values
//! - [`codec`]: container adapters behind the [`codec::MetadataCodec`] seam
//! - [`pipeline`]: batch processing used by the CLI
//! - [`numeric`], [`orientation`], [`rating`]: pure conversions

pub mod codec;
pub mod config;
pub mod display;
pub mod error;
pub mod keys;
pub mod metadata;
pub mod numeric;
pub mod orientation;
pub mod pipeline;
pub mod rating;
pub mod sidecar;
pub mod tags;
