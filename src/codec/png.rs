//! PNG container: EXIF in `eXIf`, XMP in the `XML:com.adobe.xmp` iTXt
//! chunk. Other `tEXt`/`iTXt` chunks are exposed read-only as text chunks.

use img_parts::png::{Png, PngChunk};
use img_parts::{Bytes, ImageEXIF};

use super::{AccessMode, CodecError, Container, ContainerFormat, MetadataMaps, exif, xmp};
use crate::keys::Namespace;

const XMP_KEYWORD: &str = "XML:com.adobe.xmp";
const ITXT: [u8; 4] = *b"iTXt";
const TEXT: [u8; 4] = *b"tEXt";
const IDAT: [u8; 4] = *b"IDAT";

/// A decoded text chunk.
struct TextChunk {
    keyword: String,
    text: String,
}

fn split_nul(data: &[u8]) -> Option<(&[u8], &[u8])> {
    let pos = data.iter().position(|&b| b == 0)?;
    Some((&data[..pos], &data[pos + 1..]))
}

/// `tEXt`: Latin-1 keyword and text.
fn decode_text(data: &[u8]) -> Option<TextChunk> {
    let (keyword, text) = split_nul(data)?;
    let latin1 = |b: &[u8]| b.iter().map(|&c| char::from(c)).collect::<String>();
    Some(TextChunk {
        keyword: latin1(keyword),
        text: latin1(text),
    })
}

/// `iTXt`: keyword, compression flag and method, language tag, translated
/// keyword, UTF-8 text. Compressed chunks are not decoded.
fn decode_itxt(data: &[u8]) -> Option<TextChunk> {
    let (keyword, rest) = split_nul(data)?;
    let keyword = String::from_utf8_lossy(keyword).into_owned();
    let (&compressed, rest) = rest.split_first()?;
    let (_method, rest) = rest.split_first()?;
    if compressed != 0 {
        log::debug!("Skipping compressed iTXt chunk {keyword}");
        return None;
    }
    let (_lang, rest) = split_nul(rest)?;
    let (_translated, text) = split_nul(rest)?;
    Some(TextChunk {
        keyword,
        text: String::from_utf8_lossy(text).into_owned(),
    })
}

fn encode_itxt(keyword: &str, text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(keyword.len() + text.len() + 5);
    out.extend_from_slice(keyword.as_bytes());
    out.extend_from_slice(&[0, 0, 0, 0, 0]);
    out.extend_from_slice(text.as_bytes());
    out
}

fn is_xmp_chunk(chunk: &PngChunk) -> bool {
    chunk.kind() == ITXT && chunk.contents().starts_with(XMP_KEYWORD.as_bytes())
        && chunk.contents().get(XMP_KEYWORD.len()) == Some(&0)
}

pub struct PngContainer {
    png: Png,
    bytes: Vec<u8>,
    maps: MetadataMaps,
    little_endian: bool,
    good: bool,
}

impl PngContainer {
    pub fn new(bytes: Vec<u8>) -> Result<Self, CodecError> {
        let png = Png::from_bytes(Bytes::from(bytes.clone()))
            .map_err(|e| CodecError::Malformed(format!("PNG: {e}")))?;
        Ok(Self {
            png,
            bytes,
            maps: MetadataMaps::default(),
            little_endian: false,
            good: true,
        })
    }

    fn read_all(&mut self) -> Result<(), CodecError> {
        let mut maps = MetadataMaps::default();

        if let Some(tiff) = self.png.exif() {
            let block = exif::parse_tiff(&tiff)?;
            self.little_endian = block.little_endian;
            maps.exif = block.tags;
            maps.thumbnail = block.thumbnail;
        }

        if let Some(chunk) = self.png.chunks().iter().find(|c| is_xmp_chunk(c)) {
            if let Some(decoded) = decode_itxt(chunk.contents()) {
                let packet = xmp::parse_packet(&decoded.text)?;
                maps.xmp = packet.tags;
                maps.xmp_namespaces = packet.namespaces;
            }
        }

        self.maps = maps;
        Ok(())
    }

    fn write_xmp(&mut self) {
        let chunks = self.png.chunks_mut();
        let xmp_pos = chunks.iter().position(is_xmp_chunk);

        if self.maps.xmp.is_empty() {
            if let Some(pos) = xmp_pos {
                chunks.remove(pos);
            }
            return;
        }

        let packet = xmp::XmpPacket {
            tags: self.maps.xmp.clone(),
            namespaces: self.maps.xmp_namespaces.clone(),
        };
        let contents = encode_itxt(XMP_KEYWORD, &xmp::serialize_packet(&packet));
        let chunk = PngChunk::new(ITXT, Bytes::from(contents));

        match xmp_pos {
            Some(pos) => chunks[pos] = chunk,
            None => {
                let insert_pos = chunks
                    .iter()
                    .position(|c| c.kind() == IDAT)
                    .unwrap_or(chunks.len().saturating_sub(1));
                chunks.insert(insert_pos, chunk);
            }
        }
    }
}

impl Container for PngContainer {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Png
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

    fn access_mode(&self, namespace: Namespace) -> AccessMode {
        match namespace {
            Namespace::Iptc => AccessMode::None,
            Namespace::Exif | Namespace::Xmp => AccessMode::ReadWrite,
        }
    }

    fn write_metadata(&mut self) -> Result<(), CodecError> {
        if self.maps.exif.is_empty() && self.maps.thumbnail.is_none() {
            self.png.set_exif(None);
        } else {
            let tiff = exif::build_tiff(
                &self.maps.exif,
                self.maps.thumbnail.as_deref(),
                self.little_endian,
            )?;
            self.png.set_exif(Some(Bytes::from(tiff)));
        }
        self.write_xmp();
        self.bytes = self.png.clone().encoder().bytes().to_vec();
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn text_chunks(&self) -> Vec<(String, String)> {
        self.png
            .chunks()
            .iter()
            .filter(|c| !is_xmp_chunk(c))
            .filter_map(|c| match c.kind() {
                TEXT => decode_text(c.contents()),
                ITXT => decode_itxt(c.contents()),
                _ => None,
            })
            .map(|t| (t.keyword, t.text))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::test_images;
    use crate::tags::TagValue;

    fn opened(bytes: Vec<u8>) -> PngContainer {
        let mut c = PngContainer::new(bytes).unwrap();
        c.read_metadata().unwrap();
        c
    }

    fn with_text_chunk(keyword: &str, text: &str) -> Vec<u8> {
        let mut png = Png::from_bytes(Bytes::from(test_images::png(4, 4))).unwrap();
        let mut data = keyword.as_bytes().to_vec();
        data.push(0);
        data.extend_from_slice(text.as_bytes());
        png.chunks_mut().insert(1, PngChunk::new(TEXT, Bytes::from(data)));
        png.encoder().bytes().to_vec()
    }

    #[test]
    fn exif_and_xmp_round_trip() {
        let mut c = opened(test_images::png(8, 8));
        c.maps_mut().exif.insert("Exif.Image.Software", TagValue::text("metacanon"));
        c.maps_mut().xmp.insert("Xmp.xmp.Rating", TagValue::text("3"));
        c.write_metadata().unwrap();

        let back = opened(c.bytes().to_vec());
        assert_eq!(back.exif().get("Exif.Image.Software"), Some(&TagValue::text("metacanon")));
        assert_eq!(back.xmp().get("Xmp.xmp.Rating"), Some(&TagValue::text("3")));
        // The packet is not reported as a plain text chunk.
        assert!(back.text_chunks().is_empty());
    }

    #[test]
    fn iptc_is_not_available() {
        let c = opened(test_images::png(2, 2));
        assert_eq!(c.access_mode(Namespace::Iptc), AccessMode::None);
        assert!(c.access_mode(Namespace::Xmp).can_write());
    }

    #[test]
    fn text_chunks_are_listed() {
        let c = opened(with_text_chunk("Comment", "hello"));
        assert_eq!(c.text_chunks(), vec![("Comment".to_string(), "hello".to_string())]);
    }

    #[test]
    fn itxt_decoding() {
        let data = encode_itxt("Title", "Grüße");
        let t = decode_itxt(&data).unwrap();
        assert_eq!((t.keyword.as_str(), t.text.as_str()), ("Title", "Grüße"));

        let mut compressed = b"Title\0\x01\x00\0\0".to_vec();
        compressed.extend_from_slice(b"xx");
        assert!(decode_itxt(&compressed).is_none());
    }
}
