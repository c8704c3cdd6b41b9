//! JPEG container: EXIF in APP1, XMP in a second APP1, IPTC in APP13.
//!
//! Every segment the container does not own is carried through untouched;
//! img-parts keeps the scan data and the order of the remaining segments.

use img_parts::jpeg::{Jpeg, JpegSegment};
use img_parts::{Bytes, ImageEXIF};

use super::{AccessMode, CodecError, Container, ContainerFormat, MetadataMaps, exif, iptc, xmp};
use crate::keys::Namespace;

pub(crate) const XMP_HEADER: &[u8] = b"http://ns.adobe.com/xap/1.0/\0";
const EXIF_PREFIX: &[u8] = b"Exif\0\0";
const APP1: u8 = 0xE1;
const APP13: u8 = 0xED;

/// Remove every APP1 and APP13 segment from an encoded JPEG.
pub(crate) fn strip_metadata_segments(bytes: Vec<u8>) -> Result<Vec<u8>, CodecError> {
    let mut jpeg = Jpeg::from_bytes(Bytes::from(bytes))
        .map_err(|e| CodecError::Malformed(format!("JPEG: {e}")))?;
    jpeg.segments_mut()
        .retain(|s| s.marker() != APP1 && s.marker() != APP13);
    Ok(jpeg.encoder().bytes().to_vec())
}

/// Position of the EXIF APP1 segment.
fn find_exif_segment_pos(segments: &[JpegSegment]) -> Option<usize> {
    segments
        .iter()
        .position(|s| s.marker() == APP1 && s.contents().starts_with(EXIF_PREFIX))
}

fn find_xmp_segment_pos(segments: &[JpegSegment]) -> Option<usize> {
    segments
        .iter()
        .position(|s| s.marker() == APP1 && s.contents().starts_with(XMP_HEADER))
}

fn find_iptc_segment_pos(segments: &[JpegSegment]) -> Option<usize> {
    segments
        .iter()
        .position(|s| s.marker() == APP13 && s.contents().starts_with(iptc::PHOTOSHOP_HEADER))
}

pub struct JpegContainer {
    jpeg: Jpeg,
    bytes: Vec<u8>,
    maps: MetadataMaps,
    little_endian: bool,
    good: bool,
}

impl JpegContainer {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CodecError> {
        let jpeg = Jpeg::from_bytes(Bytes::from(bytes.clone()))
            .map_err(|e| CodecError::Malformed(format!("JPEG: {e}")))?;
        Ok(Self {
            jpeg,
            bytes,
            maps: MetadataMaps::default(),
            little_endian: false,
            good: true,
        })
    }

    fn read_all(&mut self) -> Result<(), CodecError> {
        let mut maps = MetadataMaps::default();

        if let Some(tiff) = self.jpeg.exif() {
            let block = exif::parse_tiff(&tiff)?;
            self.little_endian = block.little_endian;
            maps.exif = block.tags;
            maps.thumbnail = block.thumbnail;
        }

        let segments = self.jpeg.segments();
        if let Some(pos) = find_xmp_segment_pos(segments) {
            let contents = segments[pos].contents();
            let text = String::from_utf8_lossy(&contents[XMP_HEADER.len()..]);
            let packet = xmp::parse_packet(text.trim_end_matches('\0'))?;
            maps.xmp = packet.tags;
            maps.xmp_namespaces = packet.namespaces;
        }

        if let Some(pos) = find_iptc_segment_pos(segments) {
            if let Some(iim) = iptc::extract_iim(segments[pos].contents()) {
                maps.iptc = iptc::parse_iim(iim);
            }
        }

        log::debug!(
            "JPEG metadata: {} EXIF, {} IPTC, {} XMP",
            maps.exif.len(),
            maps.iptc.len(),
            maps.xmp.len()
        );
        self.maps = maps;
        Ok(())
    }

    fn write_exif(&mut self) -> Result<(), CodecError> {
        let orig_exif_pos = find_exif_segment_pos(self.jpeg.segments());

        if self.maps.exif.is_empty() && self.maps.thumbnail.is_none() {
            self.jpeg.set_exif(None);
            return Ok(());
        }

        let tiff = exif::build_tiff(
            &self.maps.exif,
            self.maps.thumbnail.as_deref(),
            self.little_endian,
        )?;
        self.jpeg.set_exif(Some(Bytes::from(tiff)));

        // set_exif() may place the segment after XMP; move it back so EXIF
        // stays the first APP1.
        if let Some(new_pos) = find_exif_segment_pos(self.jpeg.segments()) {
            let target_pos = orig_exif_pos.unwrap_or(1);
            if target_pos < new_pos {
                let segments = self.jpeg.segments_mut();
                let seg = segments.remove(new_pos);
                segments.insert(target_pos, seg);
            }
        }
        Ok(())
    }

    fn write_xmp(&mut self) {
        let xmp_pos = find_xmp_segment_pos(self.jpeg.segments());
        let segments = self.jpeg.segments_mut();

        if self.maps.xmp.is_empty() {
            if let Some(pos) = xmp_pos {
                segments.remove(pos);
            }
            return;
        }

        let packet = xmp::XmpPacket {
            tags: self.maps.xmp.clone(),
            namespaces: self.maps.xmp_namespaces.clone(),
        };
        let new_xmp = xmp::serialize_packet(&packet);

        let mut contents = Vec::with_capacity(XMP_HEADER.len() + new_xmp.len());
        contents.extend_from_slice(XMP_HEADER);
        contents.extend_from_slice(new_xmp.as_bytes());
        let new_segment = JpegSegment::new_with_contents(APP1, Bytes::from(contents));

        if let Some(pos) = xmp_pos {
            segments[pos] = new_segment;
        } else {
            let insert_pos = find_exif_segment_pos(segments)
                .map(|p| p + 1)
                .unwrap_or(2)
                .min(segments.len());
            segments.insert(insert_pos, new_segment);
        }
    }

    fn write_iptc(&mut self) {
        let iptc_pos = find_iptc_segment_pos(self.jpeg.segments());
        let segments = self.jpeg.segments_mut();

        let existing = iptc_pos.map(|pos| segments[pos].contents().to_vec());
        let iim = iptc::build_iim(&self.maps.iptc);
        let block = iptc::build_photoshop_block(existing.as_deref(), &iim);

        match (iptc_pos, iptc::has_resources(&block)) {
            (Some(pos), true) => {
                segments[pos] = JpegSegment::new_with_contents(APP13, Bytes::from(block));
            }
            (Some(pos), false) => {
                segments.remove(pos);
            }
            (None, true) => {
                let insert_pos = segments.len().min(4);
                segments.insert(insert_pos, JpegSegment::new_with_contents(APP13, Bytes::from(block)));
            }
            (None, false) => {}
        }
    }
}

impl Container for JpegContainer {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Jpeg
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
        AccessMode::ReadWrite
    }

    fn write_metadata(&mut self) -> Result<(), CodecError> {
        self.write_exif()?;
        self.write_xmp();
        self.write_iptc();
        self.bytes = self.jpeg.clone().encoder().bytes().to_vec();
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
