//! TIFF and TIFF-based raw files. Metadata is read-only: rewriting the IFD
//! chain of a raw file is out of reach of the EXIF writer, so edits go to
//! an XMP sidecar instead.

use super::{AccessMode, CodecError, Container, ContainerFormat, MetadataMaps, PreviewProperties, exif, iptc, xmp};
use crate::keys::Namespace;
use crate::tags::TagValue;

const XMP_PACKET_KEY: &str = "Exif.Image.0x02bc";
const IPTC_NAA_KEY: &str = "Exif.Image.0x83bb";

fn raw_bytes(value: &TagValue, little_endian: bool) -> Option<Vec<u8>> {
    match value {
        TagValue::Byte(b) | TagValue::Undefined(b) => Some(b.clone()),
        TagValue::Text(s) => Some(s.as_bytes().to_vec()),
        TagValue::Long(v) => Some(
            v.iter()
                .flat_map(|x| if little_endian { x.to_le_bytes() } else { x.to_be_bytes() })
                .collect(),
        ),
        _ => None,
    }
}

pub struct TiffContainer {
    bytes: Vec<u8>,
    maps: MetadataMaps,
    /// Embedded JPEGs: the IFD0 preview (if any) followed by the thumbnail.
    previews: Vec<Vec<u8>>,
    good: bool,
}

impl TiffContainer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            maps: MetadataMaps::default(),
            previews: Vec::new(),
            good: true,
        }
    }

    fn read_all(&mut self) -> Result<(), CodecError> {
        let block = exif::parse_tiff(&self.bytes)?;
        let mut maps = MetadataMaps {
            exif: block.tags,
            thumbnail: block.thumbnail,
            ..Default::default()
        };

        if let Some(raw) = maps
            .exif
            .remove(XMP_PACKET_KEY)
            .and_then(|v| raw_bytes(&v, block.little_endian))
        {
            let text = String::from_utf8_lossy(&raw);
            let packet = xmp::parse_packet(text.trim_end_matches('\0'))?;
            maps.xmp = packet.tags;
            maps.xmp_namespaces = packet.namespaces;
        }
        if let Some(raw) = maps
            .exif
            .remove(IPTC_NAA_KEY)
            .and_then(|v| raw_bytes(&v, block.little_endian))
        {
            maps.iptc = iptc::parse_iim(&raw);
        }

        self.previews = block
            .primary_jpeg
            .into_iter()
            .chain(maps.thumbnail.clone())
            .collect();
        self.maps = maps;
        Ok(())
    }
}

impl Container for TiffContainer {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Tiff
    }

    fn read_metadata(&mut self) -> Result<(), CodecError> {
        let result = self.read_all();
        self.good = result.is_ok();
        result
    }

    fn good(&self) -> bool {
        self.good
    }

    fn maps(&self) -> &MetadataMaps {
        &self.maps
    }

    fn maps_mut(&mut self) -> &mut MetadataMaps {
        &mut self.maps
    }

    fn access_mode(&self, _namespace: Namespace) -> AccessMode {
        AccessMode::Read
    }

    fn write_metadata(&mut self) -> Result<(), CodecError> {
        Err(CodecError::ReadOnly(Namespace::Exif))
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn previews(&self) -> Vec<PreviewProperties> {
        self.previews
            .iter()
            .enumerate()
            .filter_map(|(i, data)| PreviewProperties::probe(i, data))
            .collect()
    }

    fn preview_data(&self, index: usize) -> Option<Vec<u8>> {
        self.previews.get(index).cloned()
    }
}
