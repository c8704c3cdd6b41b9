//! Container codecs.
//!
//! A [`MetadataCodec`] opens raw file bytes into a [`Container`], which
//! exposes the EXIF, IPTC and XMP tag maps of that file and can write them
//! back into a new byte buffer. The metadata record only talks to these two
//! traits.
//!
//! | Container                 | EXIF | IPTC | XMP  | Previews          |
//! |---------------------------|------|------|------|-------------------|
//! | [`JpegContainer`]         | rw   | rw   | rw   | EXIF thumbnail    |
//! | [`PngContainer`]          | rw   | -    | rw   | EXIF thumbnail    |
//! | [`TiffContainer`]         | r    | r    | r    | IFD0/IFD1 JPEGs   |
//! | [`XmpContainer`]          | -    | -    | rw   | -                 |
//! | [`MemoryContainer`]       | rw   | rw   | rw   | thumbnail         |

pub mod exif;
pub mod iptc;
pub mod jpeg;
pub mod memory;
pub mod png;
pub mod tiff;
pub mod xmp;

pub use jpeg::JpegContainer;
pub use memory::{MemoryCodec, MemoryContainer};
pub use png::PngContainer;
pub use tiff::TiffContainer;
pub use xmp::XmpContainer;

use std::io::Cursor;
use thiserror::Error;

use crate::keys::Namespace;
use crate::tags::{TagKind, TagMap};

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("unsupported container: {0}")]
    Unsupported(String),

    #[error("malformed data: {0}")]
    Malformed(String),

    #[error("{0} metadata is read-only in this container")]
    ReadOnly(Namespace),

    #[error("encoding failed: {0}")]
    Encode(String),
}

/// What a container allows for one namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    None,
    Read,
    ReadWrite,
}

impl AccessMode {
    pub fn can_read(self) -> bool {
        matches!(self, Self::Read | Self::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        self == Self::ReadWrite
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerFormat {
    Jpeg,
    Png,
    Tiff,
    Xmp,
    Memory,
}

/// Size of one embedded preview image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewProperties {
    pub index: usize,
    pub width: u32,
    pub height: u32,
    pub size: usize,
}

impl PreviewProperties {
    /// Probe an encoded image for its dimensions.
    pub fn probe(index: usize, data: &[u8]) -> Option<Self> {
        let (width, height) = image::ImageReader::new(Cursor::new(data))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()?;
        Some(Self {
            index,
            width,
            height,
            size: data.len(),
        })
    }
}

/// The tag maps and thumbnail a container holds in memory.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataMaps {
    pub exif: TagMap,
    pub iptc: TagMap,
    pub xmp: TagMap,
    /// XMP schemas found in the file that are not in the built-in registry.
    pub xmp_namespaces: Vec<(String, String)>,
    /// JPEG thumbnail stored in EXIF IFD1.
    pub thumbnail: Option<Vec<u8>>,
}

/// An opened file whose metadata can be read, edited and written back.
pub trait Container: Send {
    fn format(&self) -> ContainerFormat;

    /// Parse metadata out of the container bytes into the tag maps.
    fn read_metadata(&mut self) -> Result<(), CodecError>;

    /// Whether the container parsed cleanly.
    fn good(&self) -> bool;

    fn maps(&self) -> &MetadataMaps;

    fn maps_mut(&mut self) -> &mut MetadataMaps;

    fn access_mode(&self, namespace: Namespace) -> AccessMode;

    /// Serialize the tag maps into the container bytes.
    fn write_metadata(&mut self) -> Result<(), CodecError>;

    /// Current container bytes (updated by [`Container::write_metadata`]).
    fn bytes(&self) -> &[u8];

    fn exif(&self) -> &TagMap {
        &self.maps().exif
    }

    fn iptc(&self) -> &TagMap {
        &self.maps().iptc
    }

    fn xmp(&self) -> &TagMap {
        &self.maps().xmp
    }

    fn tags(&self, namespace: Namespace) -> &TagMap {
        match namespace {
            Namespace::Exif => self.exif(),
            Namespace::Iptc => self.iptc(),
            Namespace::Xmp => self.xmp(),
        }
    }

    fn tags_mut(&mut self, namespace: Namespace) -> &mut TagMap {
        let maps = self.maps_mut();
        match namespace {
            Namespace::Exif => &mut maps.exif,
            Namespace::Iptc => &mut maps.iptc,
            Namespace::Xmp => &mut maps.xmp,
        }
    }

    fn set_exif(&mut self, tags: TagMap) {
        self.maps_mut().exif = tags;
    }

    fn set_iptc(&mut self, tags: TagMap) {
        self.maps_mut().iptc = tags;
    }

    fn set_xmp(&mut self, tags: TagMap) {
        self.maps_mut().xmp = tags;
    }

    /// The kind a new value under `key` must have, or `None` if the key is
    /// unknown to this codec.
    fn declared_kind(&self, namespace: Namespace, key: &str) -> Option<TagKind> {
        let maps = self.maps();
        match namespace {
            Namespace::Exif => exif::declared_kind(key, &maps.exif),
            Namespace::Iptc => iptc::declared_kind(key, &maps.iptc),
            Namespace::Xmp => xmp::declared_kind(key, &maps.xmp, &maps.xmp_namespaces),
        }
    }

    fn thumbnail(&self) -> Option<&[u8]> {
        self.maps().thumbnail.as_deref()
    }

    fn set_thumbnail(&mut self, jpeg: Option<Vec<u8>>) {
        self.maps_mut().thumbnail = jpeg;
    }

    fn previews(&self) -> Vec<PreviewProperties> {
        self.thumbnail()
            .and_then(|t| PreviewProperties::probe(0, t))
            .into_iter()
            .collect()
    }

    fn preview_data(&self, index: usize) -> Option<Vec<u8>> {
        match index {
            0 => self.thumbnail().map(<[u8]>::to_vec),
            _ => None,
        }
    }

    /// Free-form text chunks (PNG `tEXt`/`iTXt`) as `(keyword, text)`.
    fn text_chunks(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// Opens byte buffers into containers.
pub trait MetadataCodec: Send + Sync {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn Container>, CodecError>;

    /// An empty XMP-only container, for sidecars.
    fn create_xmp(&self) -> Box<dyn Container>;
}

/// Picks a container by sniffing the leading bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultCodec;

const JPEG_MAGIC: &[u8] = &[0xFF, 0xD8, 0xFF];
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const TIFF_MAGICS: &[&[u8]] = &[
    b"II*\0",
    b"MM\0*",
    b"IIRO", // Olympus ORF
    b"IIU\0", // Panasonic RW2
];

fn looks_like_xmp(bytes: &[u8]) -> bool {
    let head = &bytes[..bytes.len().min(256)];
    let text = String::from_utf8_lossy(head);
    let text = text.trim_start_matches('\u{feff}').trim_start();
    text.starts_with("<?xpacket") || text.starts_with("<x:xmpmeta") || text.starts_with("<?xml")
}

impl MetadataCodec for DefaultCodec {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn Container>, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Unsupported("empty buffer".to_string()));
        }
        if bytes.starts_with(JPEG_MAGIC) {
            return Ok(Box::new(JpegContainer::new(bytes)?));
        }
        if bytes.starts_with(PNG_MAGIC) {
            return Ok(Box::new(PngContainer::new(bytes)?));
        }
        if TIFF_MAGICS.iter().any(|m| bytes.starts_with(m)) {
            return Ok(Box::new(TiffContainer::new(bytes)));
        }
        if looks_like_xmp(&bytes) {
            return Ok(Box::new(XmpContainer::new(bytes)));
        }
        Err(CodecError::Unsupported("unrecognized file signature".to_string()))
    }

    fn create_xmp(&self) -> Box<dyn Container> {
        Box::new(XmpContainer::new(Vec::new()))
    }
}
