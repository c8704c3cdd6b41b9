//! XMP sidecar files (`photo.cr2` → `photo.xmp`).
//!
//! Raw files are never rewritten; edits such as a crop rectangle go to a
//! sidecar next to them. A missing or unreadable sidecar is synthesized
//! from the primary image's metadata and flushed to disk right away.

use serde::Serialize;
use std::path::{Path, PathBuf};

use crate::codec::{Container, MetadataCodec, xmp};
use crate::error::{MetadataError, Result, SaveRejection};
use crate::keys::{Namespace, split_key};
use crate::metadata::MetadataRecord;
use crate::numeric::format_significant;
use crate::tags::{TagKind, TagMap, TagValue};

const SIDECAR_EXTENSION: &str = "xmp";

// IPTC datasets carried over into Dublin Core.
const IPTC_TO_XMP: &[(&str, &str)] = &[
    ("Iptc.Application2.Keywords", "Xmp.dc.subject"),
    ("Iptc.Application2.Caption", "Xmp.dc.description"),
    ("Iptc.Application2.ObjectName", "Xmp.dc.title"),
    ("Iptc.Application2.Byline", "Xmp.dc.creator"),
    ("Iptc.Application2.Copyright", "Xmp.dc.rights"),
];

const CROP_PRECISION: usize = 6;

/// `Exif.Image.Make` → `Xmp.tiff.Make`, `Exif.Photo.FNumber` →
/// `Xmp.exif.FNumber`. Thumbnail, interop and unnamed tags have no XMP
/// counterpart.
fn exif_to_xmp_key(key: &str) -> Option<String> {
    let (_, group, name) = split_key(key)?;
    if name.starts_with("0x") {
        return None;
    }
    let schema = match group {
        "Image" => "tiff",
        "Photo" | "GPSInfo" => "exif",
        _ => return None,
    };
    Some(format!("Xmp.{schema}.{name}"))
}

fn is_binary(value: &TagValue) -> bool {
    matches!(
        value,
        TagValue::Byte(_) | TagValue::SignedByte(_) | TagValue::Undefined(_)
    )
}

/// XMP tags for a new sidecar of `record`.
fn seed_tags(record: &MetadataRecord) -> TagMap {
    let mut out = TagMap::new();

    if let Some(tags) = record.tags(Namespace::Xmp) {
        for (key, value) in tags.iter() {
            out.insert(key, value.clone());
        }
    }

    if let Some(tags) = record.tags(Namespace::Exif) {
        for (key, value) in tags.iter() {
            if is_binary(value) {
                continue;
            }
            let Some(target) = exif_to_xmp_key(key) else {
                continue;
            };
            if !out.contains_key(&target) {
                out.insert(target, TagValue::text(value.to_string()));
            }
        }
    }

    if let Some(tags) = record.tags(Namespace::Iptc) {
        for (source, target) in IPTC_TO_XMP {
            let Some(value) = tags.get(source) else {
                continue;
            };
            if out.contains_key(target) {
                continue;
            }
            let seeded = match xmp::declared_kind(target, &TagMap::new(), &[]) {
                Some(TagKind::List) => TagValue::List(value.as_strings()),
                _ => TagValue::text(value.to_string()),
            };
            out.insert(*target, seeded);
        }
    }

    out
}

fn flush_error(e: impl std::fmt::Display) -> MetadataError {
    MetadataError::SaveRejected(SaveRejection::Codec(e.to_string()))
}

/// A rotated rectangle in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotatedRect {
    pub center: (f64, f64),
    /// Corners in drawing order, starting top-left before rotation.
    pub corners: [(f64, f64); 4],
    /// Rotation in radians.
    pub angle: f64,
}

/// Rotate `(x, y)` by `angle` radians (clockwise in image coordinates).
fn rotate_vector((x, y): (f64, f64), angle: f64) -> (f64, f64) {
    let (sin, cos) = angle.sin_cos();
    (x * cos + y * sin, -x * sin + y * cos)
}

impl RotatedRect {
    pub fn new(center: (f64, f64), width: f64, height: f64, angle: f64) -> Self {
        let (hw, hh) = (width / 2.0, height / 2.0);
        let offsets = [(-hw, -hh), (hw, -hh), (hw, hh), (-hw, hh)];
        let corners = offsets.map(|offset| {
            let (dx, dy) = rotate_vector(offset, -angle);
            (center.0 + dx, center.1 + dy)
        });
        Self {
            center,
            corners,
            angle,
        }
    }

    /// From a top-left pixel rectangle and an angle in degrees.
    pub fn from_pixels(x: f64, y: f64, width: f64, height: f64, angle_degrees: f64) -> Self {
        let center = (x + width / 2.0, y + height / 2.0);
        Self::new(center, width, height, angle_degrees.to_radians())
    }
}

/// Crop in the Camera Raw convention: edges as fractions of the image
/// size and an angle in degrees within (−45, 45].
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropRectangle {
    pub top: f64,
    pub left: f64,
    pub bottom: f64,
    pub right: f64,
    pub angle: f64,
}

impl CropRectangle {
    pub fn compute(rect: &RotatedRect, (width, height): (u32, u32)) -> Self {
        let (cx, cy) = rect.center;

        let mut corner = (0.0, 0.0);
        for c in rect.corners {
            corner = (c.0 - cx, c.1 - cy);
            if corner.0 <= 0.0 && corner.1 > 0.0 {
                break;
            }
        }
        let (vx, vy) = rotate_vector(corner, rect.angle * 2.0);
        let (vx, vy) = (vx.abs(), vy.abs());

        let (w, h) = (f64::from(width.max(1)), f64::from(height.max(1)));
        Self {
            top: (cy - vy) / h,
            left: (cx - vx) / w,
            bottom: (cy + vy) / h,
            right: (cx + vx) / w,
            angle: fold_angle(rect.angle.to_degrees()),
        }
    }
}

fn fold_angle(degrees: f64) -> f64 {
    if degrees > 45.0 {
        degrees - 90.0
    } else if degrees < -45.0 {
        degrees + 90.0
    } else {
        degrees
    }
}

/// An XMP sidecar bound to its file.
pub struct Sidecar {
    path: PathBuf,
    container: Box<dyn Container>,
}

impl Sidecar {
    /// `<stem>.xmp` next to `primary`. An `.xmp` primary is its own sidecar.
    pub fn path_for(primary: &Path) -> PathBuf {
        primary.with_extension(SIDECAR_EXTENSION)
    }

    /// Open the sidecar of `record`, creating it if it is missing or
    /// unusable.
    pub fn get_or_create(record: &MetadataRecord, codec: &dyn MetadataCodec) -> Result<Self> {
        let primary = record
            .source_path()
            .ok_or_else(|| MetadataError::NoMetadata("record has no source path".to_string()))?;
        let path = Self::path_for(primary);

        if path.exists() {
            match Self::open_existing(&path, codec) {
                Ok(container) => return Ok(Self { path, container }),
                Err(e) => log::warn!(
                    "Ignoring unusable sidecar {}: {e}",
                    path.display()
                ),
            }
        }

        let mut container = codec.create_xmp();
        container.set_xmp(seed_tags(record));
        if let Some(namespaces) = record.xmp_namespaces() {
            container.maps_mut().xmp_namespaces = namespaces.to_vec();
        }

        let mut sidecar = Self { path, container };
        sidecar.flush()?;
        log::info!("Created sidecar {}", sidecar.path.display());
        Ok(sidecar)
    }

    fn open_existing(path: &Path, codec: &dyn MetadataCodec) -> Result<Box<dyn Container>> {
        let bytes = std::fs::read(path)?;
        let mut container = codec
            .open(bytes)
            .map_err(|e| MetadataError::OpenFailure(e.to_string()))?;
        container
            .read_metadata()
            .map_err(|e| MetadataError::NoMetadata(e.to_string()))?;
        if !container.good() {
            return Err(MetadataError::NoMetadata("unhealthy XMP packet".to_string()));
        }
        Ok(container)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn xmp(&self) -> &TagMap {
        self.container.xmp()
    }

    /// Replace or insert an XMP value; call [`Sidecar::flush`] to persist.
    pub fn set(&mut self, key: &str, value: TagValue) {
        self.container.tags_mut(Namespace::Xmp).insert(key, value);
    }

    /// Serialize and write the sidecar file.
    pub fn flush(&mut self) -> Result<()> {
        self.container.write_metadata().map_err(flush_error)?;
        std::fs::write(&self.path, self.container.bytes())?;
        Ok(())
    }

    /// Store `rect` as a Camera Raw crop and flush.
    pub fn write_crop_rectangle(
        &mut self,
        rect: &RotatedRect,
        image_size: (u32, u32),
    ) -> Result<CropRectangle> {
        let crop = CropRectangle::compute(rect, image_size);
        let number = |v: f64| TagValue::text(format_significant(v, CROP_PRECISION));

        self.set("Xmp.crs.CropTop", number(crop.top));
        self.set("Xmp.crs.CropLeft", number(crop.left));
        self.set("Xmp.crs.CropBottom", number(crop.bottom));
        self.set("Xmp.crs.CropRight", number(crop.right));
        self.set("Xmp.crs.CropAngle", number(crop.angle));
        self.set("Xmp.crs.HasCrop", TagValue::text("True"));
        self.set("Xmp.crs.CropConstrainToWarp", TagValue::text("1"));
        self.set("Xmp.crs.AlreadyApplied", TagValue::text("False"));

        self.flush()?;
        log::debug!("Crop written to {}", self.path.display());
        Ok(crop)
    }
}
