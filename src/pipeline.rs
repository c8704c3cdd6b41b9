use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::display::{self, InfoEntry};
use crate::keys::Namespace;
use crate::metadata::{
    JPEG_EXTENSIONS, MetadataRecord, MetadataState, RAW_EXTENSIONS, TIFF_EXTENSIONS,
};
use crate::sidecar::{CropRectangle, RotatedRect, Sidecar};

/// Extensions the pipeline picks up, besides the raw formats.
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "tif", "tiff"];

/// How metadata edits reach a given file.
///
/// - **Native** formats (JPEG, PNG) are rewritten in place.
/// - **TIFF** files are read-only.
/// - **Sidecar** formats (camera raw) keep their edits in a `.xmp` file
///   next to the original.
///
/// # Example
///
/// ```rust
/// use metacanon::pipeline::ImageKind;
/// use std::path::Path;
///
/// assert_eq!(ImageKind::from_path(Path::new("photo.nef")), Some(ImageKind::Sidecar));
/// assert_eq!(ImageKind::from_path(Path::new("photo.jpg")), Some(ImageKind::Jpeg));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ImageKind {
    /// JPEG: EXIF, IPTC and XMP written in place
    Jpeg,
    /// PNG: EXIF and XMP written in place
    Png,
    /// TIFF: read-only
    Tiff,
    /// Camera raw: read EXIF from the original, write a sidecar .xmp
    Sidecar,
}

impl ImageKind {
    /// Determine the image kind from a file path extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        let ext = ext.as_str();
        if JPEG_EXTENSIONS.contains(&ext) {
            Some(Self::Jpeg)
        } else if ext == "png" {
            Some(Self::Png)
        } else if TIFF_EXTENSIONS.contains(&ext) {
            Some(Self::Tiff)
        } else if RAW_EXTENSIONS.contains(&ext) {
            Some(Self::Sidecar)
        } else {
            None
        }
    }
}

/// A pixel crop rectangle, optionally rotated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CropRequest {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    /// Degrees.
    pub angle: f64,
}

impl CropRequest {
    /// Parse `x,y,w,h` or `x,y,w,h,angle`.
    pub fn parse(text: &str) -> Result<Self> {
        let values = text
            .split(',')
            .map(|v| v.trim().parse::<f64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .with_context(|| format!("Invalid crop rectangle: {text}"))?;

        match values[..] {
            [x, y, width, height] => Ok(Self { x, y, width, height, angle: 0.0 }),
            [x, y, width, height, angle] => Ok(Self { x, y, width, height, angle }),
            _ => bail!("Crop rectangle needs 4 or 5 values, got {}", values.len()),
        }
    }

    pub fn to_rect(self) -> RotatedRect {
        RotatedRect::from_pixels(self.x, self.y, self.width, self.height, self.angle)
    }
}

/// One step applied to an image, in command-line order.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Fill the camera and description panels.
    Show,
    /// Fill the full key/value listing, file facts included.
    All,
    Rate(i32),
    /// Quarter turns in degrees.
    Rotate(i32),
    ClearOrientation,
    Describe(String),
    Set {
        namespace: Namespace,
        key: String,
        value: String,
    },
    Crop(CropRequest),
}

impl Operation {
    /// Parse `NS:KEY=VALUE`, or `KEY=VALUE` with a fully qualified key
    /// (`Exif.Image.Artist=Ann`).
    pub fn parse_set(text: &str) -> Result<Self> {
        let (target, value) = text
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected KEY=VALUE, got {text}"))?;

        let (namespace, key) = match target.split_once(':') {
            Some((ns, key)) => (
                Namespace::from_name(ns).ok_or_else(|| anyhow!("Unknown namespace: {ns}"))?,
                key,
            ),
            None => (
                Namespace::of_key(target)
                    .ok_or_else(|| anyhow!("Cannot tell the namespace of {target}"))?,
                target,
            ),
        };
        if key.trim().is_empty() {
            bail!("Empty key in {text}");
        }

        Ok(Self::Set {
            namespace,
            key: key.trim().to_string(),
            value: value.to_string(),
        })
    }

    fn mutates_image(&self) -> bool {
        !matches!(self, Self::Show | Self::All | Self::Crop(_))
    }
}

/// The outcome of running the operations on one image.
#[derive(Debug, Serialize)]
pub struct ProcessResult {
    pub path: PathBuf,
    pub image_kind: Option<ImageKind>,
    /// Record state after processing.
    pub state: MetadataState,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub camera: Vec<InfoEntry>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub description: Vec<InfoEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gps_link: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub all_metadata: Vec<(String, String)>,
    /// Edits applied to the record, e.g. `rating=4`.
    pub applied: Vec<String>,
    /// The image file was rewritten.
    pub saved: bool,
    pub backup_path: Option<PathBuf>,
    /// If a sidecar XMP file was written (for crops), this is the path.
    pub sidecar_path: Option<PathBuf>,
    pub crop: Option<CropRectangle>,
    pub error: Option<String>,
}

impl ProcessResult {
    fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            image_kind: ImageKind::from_path(path),
            state: MetadataState::default(),
            camera: Vec::new(),
            description: Vec::new(),
            gps_link: None,
            all_metadata: Vec::new(),
            applied: Vec::new(),
            saved: false,
            backup_path: None,
            sidecar_path: None,
            crop: None,
            error: None,
        }
    }
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks). Only files with supported image extensions
/// are included (see [`ImageKind`] for the full list).
///
/// # Example
///
/// ```rust,no_run
/// use metacanon::pipeline::collect_images;
/// use std::path::PathBuf;
///
/// let images = collect_images(&[
///     PathBuf::from("photo.jpg"),       // single file
///     PathBuf::from("./photos/"),        // entire directory
/// ]);
/// println!("Found {} images", images.len());
/// ```
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported_image(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

/// Check if a file has a supported image extension.
fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            let ext = ext.to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str()) || RAW_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Create a backup of the original file.
fn backup_file(path: &Path) -> Result<PathBuf> {
    let backup_path = path.with_extension(format!(
        "{}.bak",
        path.extension().unwrap_or_default().to_string_lossy()
    ));

    if !backup_path.exists() {
        std::fs::copy(path, &backup_path).context("Failed to create backup")?;
        log::debug!("Backup created: {}", backup_path.display());
    }

    Ok(backup_path)
}

/// Pixel size of the image at `path`: decoded header first, then the
/// EXIF dimensions.
fn image_size(path: &Path, record: &MetadataRecord) -> Option<(u32, u32)> {
    if let Ok(size) = image::image_dimensions(path) {
        return Some(size);
    }
    let dim = |keys: [&str; 2]| {
        keys.iter()
            .find_map(|k| record.exif_value(k))
            .and_then(|v| v.trim().parse::<u32>().ok())
    };
    Some((
        dim(["PixelXDimension", "ImageWidth"])?,
        dim(["PixelYDimension", "ImageLength"])?,
    ))
}

fn apply(
    record: &mut MetadataRecord,
    op: &Operation,
    path: &Path,
    config: &Config,
    result: &mut ProcessResult,
) -> Result<()> {
    match op {
        Operation::Show => {
            result.camera = display::camera_info(record);
            result.description = display::description_info(record, Some(path));
            let link = display::gps_link(record);
            result.gps_link = (!link.is_empty()).then_some(link);
        }
        Operation::All => {
            result.all_metadata = record.all_metadata();
            result.all_metadata.extend(
                display::file_facts(path)
                    .into_iter()
                    .map(|e| (format!("File.{}", e.label), e.value)),
            );
        }
        Operation::Rate(stars) => {
            record.set_rating(*stars)?;
            result.applied.push(format!("rating={stars}"));
        }
        Operation::Rotate(degrees) => {
            let orientation = record.rotate_degrees(*degrees)?;
            result.applied.push(format!("orientation={}", orientation.code()));
        }
        Operation::ClearOrientation => {
            record.clear_orientation()?;
            result.applied.push("orientation=1".to_string());
        }
        Operation::Describe(text) => {
            record.set_description(text)?;
            result.applied.push(format!("description={text}"));
        }
        Operation::Set { namespace, key, value } => {
            record.set_value(*namespace, key, value)?;
            result.applied.push(format!("{namespace}:{key}={value}"));
        }
        Operation::Crop(request) => {
            let size = image_size(path, record)
                .with_context(|| format!("Unknown image size of {}", path.display()))?;
            let rect = request.to_rect();

            if config.output.dry_run {
                result.crop = Some(CropRectangle::compute(&rect, size));
                log::info!("[dry run] Would write crop to {}", Sidecar::path_for(path).display());
                return Ok(());
            }

            let mut sidecar = Sidecar::get_or_create(record, record.codec())?;
            result.crop = Some(sidecar.write_crop_rectangle(&rect, size)?);
            result.sidecar_path = Some(sidecar.path().to_path_buf());
        }
    }
    Ok(())
}

fn run(
    path: &Path,
    operations: &[Operation],
    config: &Config,
    force: bool,
    result: &mut ProcessResult,
) -> Result<()> {
    let mut record = MetadataRecord::new().with_settings(config.engine.clone());
    if let Err(e) = record.load_path(path) {
        log::warn!("No usable metadata in {}: {e}", path.display());
    }

    let outcome = operations
        .iter()
        .try_for_each(|op| apply(&mut record, op, path, config, result));
    result.state = record.state();
    outcome?;

    let wants_save = record.is_dirty() || (force && operations.iter().any(Operation::mutates_image));
    if !wants_save {
        return Ok(());
    }

    if config.output.dry_run {
        log::info!("[dry run] Would save metadata of {}", path.display());
        return Ok(());
    }

    if config.output.backup_originals {
        match backup_file(path) {
            Ok(backup) => result.backup_path = Some(backup),
            Err(e) => log::warn!("Failed to backup {}: {e}", path.display()),
        }
    }

    record
        .save_to_path(path, force)
        .with_context(|| format!("Failed to save metadata of {}", path.display()))?;
    result.saved = true;
    result.state = record.state();
    Ok(())
}

/// Run `operations` on one image and save the record if it changed.
///
/// A file without usable metadata is not an error by itself: read
/// operations report empty panels, edits fail, and crops still go to a
/// sidecar. With `force` the image is re-serialized even when no edit
/// changed it.
///
/// # Example
///
/// ```rust,no_run
/// use metacanon::config::Config;
/// use metacanon::pipeline::{Operation, process_image};
/// use std::path::Path;
///
/// let config = Config::default();
/// let ops = [Operation::Rate(4), Operation::Rotate(90)];
/// let result = process_image(Path::new("photo.jpg"), &ops, &config, false);
/// if let Some(ref err) = result.error {
///     eprintln!("{err}");
/// }
/// ```
pub fn process_image(
    path: &Path,
    operations: &[Operation],
    config: &Config,
    force: bool,
) -> ProcessResult {
    let mut result = ProcessResult::new(path);
    if let Err(e) = run(path, operations, config, force, &mut result) {
        result.error = Some(format!("{e:#}"));
    }
    result
}
