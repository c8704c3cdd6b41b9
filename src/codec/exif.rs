//! EXIF IFD data ⇄ [`TagMap`] via kamadak-exif.
//!
//! Input and output are bare TIFF structures (byte-order mark first), the
//! form JPEG stores after `Exif\0\0` and PNG stores in `eXIf`.

use exif::{Context, Field, In, Rational, SRational, Tag, Value};
use std::io::Cursor;

use super::CodecError;
use crate::numeric::RationalValue;
use crate::tags::{TagKind, TagMap, TagValue};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Group {
    Image,
    Photo,
    GpsInfo,
    Iop,
}

impl Group {
    fn context(self) -> Context {
        match self {
            Self::Image => Context::Tiff,
            Self::Photo => Context::Exif,
            Self::GpsInfo => Context::Gps,
            Self::Iop => Context::Interop,
        }
    }
}

struct TagDef {
    group: Group,
    number: u16,
    name: &'static str,
    kind: TagKind,
}

const fn def(group: Group, number: u16, name: &'static str, kind: TagKind) -> TagDef {
    TagDef {
        group,
        number,
        name,
        kind,
    }
}

use Group::{GpsInfo, Image, Iop, Photo};
use TagKind::{Byte, Long, Rational as Rat, Short, SignedRational as SRat, Text, Undefined};

#[rustfmt::skip]
const TAG_DEFS: &[TagDef] = &[
    def(Image, 0x0100, "ImageWidth", Long),
    def(Image, 0x0101, "ImageLength", Long),
    def(Image, 0x0102, "BitsPerSample", Short),
    def(Image, 0x0103, "Compression", Short),
    def(Image, 0x0106, "PhotometricInterpretation", Short),
    def(Image, 0x010e, "ImageDescription", Text),
    def(Image, 0x010f, "Make", Text),
    def(Image, 0x0110, "Model", Text),
    def(Image, 0x0112, "Orientation", Short),
    def(Image, 0x0115, "SamplesPerPixel", Short),
    def(Image, 0x011a, "XResolution", Rat),
    def(Image, 0x011b, "YResolution", Rat),
    def(Image, 0x011c, "PlanarConfiguration", Short),
    def(Image, 0x0128, "ResolutionUnit", Short),
    def(Image, 0x012d, "TransferFunction", Short),
    def(Image, 0x0131, "Software", Text),
    def(Image, 0x0132, "DateTime", Text),
    def(Image, 0x013b, "Artist", Text),
    def(Image, 0x013e, "WhitePoint", Rat),
    def(Image, 0x013f, "PrimaryChromaticities", Rat),
    def(Image, 0x0211, "YCbCrCoefficients", Rat),
    def(Image, 0x0212, "YCbCrSubSampling", Short),
    def(Image, 0x0213, "YCbCrPositioning", Short),
    def(Image, 0x0214, "ReferenceBlackWhite", Rat),
    def(Image, 0x4746, "Rating", Short),
    def(Image, 0x4749, "RatingPercent", Short),
    def(Image, 0x8298, "Copyright", Text),
    def(Image, 0x9c9b, "XPTitle", Text),
    def(Image, 0x9c9c, "XPComment", Text),
    def(Image, 0x9c9d, "XPAuthor", Text),
    def(Image, 0x9c9e, "XPKeywords", Text),
    def(Image, 0x9c9f, "XPSubject", Text),

    def(Photo, 0x829a, "ExposureTime", Rat),
    def(Photo, 0x829d, "FNumber", Rat),
    def(Photo, 0x8822, "ExposureProgram", Short),
    def(Photo, 0x8824, "SpectralSensitivity", Text),
    def(Photo, 0x8827, "ISOSpeedRatings", Short),
    def(Photo, 0x8830, "SensitivityType", Short),
    def(Photo, 0x9000, "ExifVersion", Undefined),
    def(Photo, 0x9003, "DateTimeOriginal", Text),
    def(Photo, 0x9004, "DateTimeDigitized", Text),
    def(Photo, 0x9010, "OffsetTime", Text),
    def(Photo, 0x9011, "OffsetTimeOriginal", Text),
    def(Photo, 0x9012, "OffsetTimeDigitized", Text),
    def(Photo, 0x9101, "ComponentsConfiguration", Undefined),
    def(Photo, 0x9102, "CompressedBitsPerPixel", Rat),
    def(Photo, 0x9201, "ShutterSpeedValue", SRat),
    def(Photo, 0x9202, "ApertureValue", Rat),
    def(Photo, 0x9203, "BrightnessValue", SRat),
    def(Photo, 0x9204, "ExposureBiasValue", SRat),
    def(Photo, 0x9205, "MaxApertureValue", Rat),
    def(Photo, 0x9206, "SubjectDistance", Rat),
    def(Photo, 0x9207, "MeteringMode", Short),
    def(Photo, 0x9208, "LightSource", Short),
    def(Photo, 0x9209, "Flash", Short),
    def(Photo, 0x920a, "FocalLength", Rat),
    def(Photo, 0x9214, "SubjectArea", Short),
    def(Photo, 0x927c, "MakerNote", Undefined),
    def(Photo, 0x9286, "UserComment", Undefined),
    def(Photo, 0x9290, "SubSecTime", Text),
    def(Photo, 0x9291, "SubSecTimeOriginal", Text),
    def(Photo, 0x9292, "SubSecTimeDigitized", Text),
    def(Photo, 0xa000, "FlashpixVersion", Undefined),
    def(Photo, 0xa001, "ColorSpace", Short),
    def(Photo, 0xa002, "PixelXDimension", Long),
    def(Photo, 0xa003, "PixelYDimension", Long),
    def(Photo, 0xa004, "RelatedSoundFile", Text),
    def(Photo, 0xa20e, "FocalPlaneXResolution", Rat),
    def(Photo, 0xa20f, "FocalPlaneYResolution", Rat),
    def(Photo, 0xa210, "FocalPlaneResolutionUnit", Short),
    def(Photo, 0xa215, "ExposureIndex", Rat),
    def(Photo, 0xa217, "SensingMethod", Short),
    def(Photo, 0xa300, "FileSource", Undefined),
    def(Photo, 0xa301, "SceneType", Undefined),
    def(Photo, 0xa401, "CustomRendered", Short),
    def(Photo, 0xa402, "ExposureMode", Short),
    def(Photo, 0xa403, "WhiteBalance", Short),
    def(Photo, 0xa404, "DigitalZoomRatio", Rat),
    def(Photo, 0xa405, "FocalLengthIn35mmFilm", Short),
    def(Photo, 0xa406, "SceneCaptureType", Short),
    def(Photo, 0xa407, "GainControl", Short),
    def(Photo, 0xa408, "Contrast", Short),
    def(Photo, 0xa409, "Saturation", Short),
    def(Photo, 0xa40a, "Sharpness", Short),
    def(Photo, 0xa40c, "SubjectDistanceRange", Short),
    def(Photo, 0xa420, "ImageUniqueID", Text),
    def(Photo, 0xa430, "CameraOwnerName", Text),
    def(Photo, 0xa431, "BodySerialNumber", Text),
    def(Photo, 0xa432, "LensSpecification", Rat),
    def(Photo, 0xa433, "LensMake", Text),
    def(Photo, 0xa434, "LensModel", Text),
    def(Photo, 0xa435, "LensSerialNumber", Text),

    def(GpsInfo, 0x0000, "GPSVersionID", Byte),
    def(GpsInfo, 0x0001, "GPSLatitudeRef", Text),
    def(GpsInfo, 0x0002, "GPSLatitude", Rat),
    def(GpsInfo, 0x0003, "GPSLongitudeRef", Text),
    def(GpsInfo, 0x0004, "GPSLongitude", Rat),
    def(GpsInfo, 0x0005, "GPSAltitudeRef", Byte),
    def(GpsInfo, 0x0006, "GPSAltitude", Rat),
    def(GpsInfo, 0x0007, "GPSTimeStamp", Rat),
    def(GpsInfo, 0x0008, "GPSSatellites", Text),
    def(GpsInfo, 0x0009, "GPSStatus", Text),
    def(GpsInfo, 0x000a, "GPSMeasureMode", Text),
    def(GpsInfo, 0x000b, "GPSDOP", Rat),
    def(GpsInfo, 0x000c, "GPSSpeedRef", Text),
    def(GpsInfo, 0x000d, "GPSSpeed", Rat),
    def(GpsInfo, 0x0010, "GPSImgDirectionRef", Text),
    def(GpsInfo, 0x0011, "GPSImgDirection", Rat),
    def(GpsInfo, 0x0012, "GPSMapDatum", Text),
    def(GpsInfo, 0x001d, "GPSDateStamp", Text),

    def(Iop, 0x0001, "InteroperabilityIndex", Text),
    def(Iop, 0x0002, "InteroperabilityVersion", Undefined),
];

// Offsets and pointers are recomputed by the writer and never surface as tags.
const STRUCTURAL_TAGS: &[u16] = &[
    0x0111, // StripOffsets
    0x0117, // StripByteCounts
    0x0144, // TileOffsets
    0x0145, // TileByteCounts
    0x0201, // JPEGInterchangeFormat
    0x0202, // JPEGInterchangeFormatLength
    0x8769, // ExifIFDPointer
    0x8825, // GPSInfoIFDPointer
    0xa005, // InteropIFDPointer
];

const JPEG_OFFSET: u16 = 0x0201;
const JPEG_LENGTH: u16 = 0x0202;
const COMPRESSION: u16 = 0x0103;
const COMPRESSION_JPEG: u16 = 6;

fn is_utf16_tag(context: Context, number: u16) -> bool {
    context == Context::Tiff && (0x9c9b..=0x9c9f).contains(&number)
}

/// Parsed EXIF block.
#[derive(Debug, Clone, Default)]
pub struct ExifBlock {
    pub tags: TagMap,
    /// JPEG thumbnail referenced from IFD1.
    pub thumbnail: Option<Vec<u8>>,
    /// JPEG preview referenced from IFD0 (TIFF-based raw files).
    pub primary_jpeg: Option<Vec<u8>>,
    pub little_endian: bool,
}

fn group_name(context: Context, ifd: In) -> Option<String> {
    match (context, ifd.index()) {
        (Context::Tiff, 0) => Some("Image".to_string()),
        (Context::Tiff, 1) => Some("Thumbnail".to_string()),
        (Context::Exif, 0) => Some("Photo".to_string()),
        (Context::Gps, 0) => Some("GPSInfo".to_string()),
        (Context::Interop, 0) => Some("Iop".to_string()),
        _ => None,
    }
}

fn group_of(name: &str) -> Option<(Group, In)> {
    match name {
        "Image" => Some((Group::Image, In::PRIMARY)),
        "Thumbnail" => Some((Group::Image, In::THUMBNAIL)),
        "Photo" => Some((Group::Photo, In::PRIMARY)),
        "GPSInfo" => Some((Group::GpsInfo, In::PRIMARY)),
        "Iop" => Some((Group::Iop, In::PRIMARY)),
        _ => None,
    }
}

fn tag_name(group: Group, number: u16) -> String {
    TAG_DEFS
        .iter()
        .find(|d| d.group == group && d.number == number)
        .map(|d| d.name.to_string())
        .unwrap_or_else(|| format!("0x{number:04x}"))
}

fn group_for_context(context: Context) -> Option<Group> {
    match context {
        Context::Tiff => Some(Group::Image),
        Context::Exif => Some(Group::Photo),
        Context::Gps => Some(Group::GpsInfo),
        Context::Interop => Some(Group::Iop),
        #[allow(unreachable_patterns)]
        _ => None,
    }
}

/// Resolve `Exif.<Group>.<Name>` to the kamadak tag and IFD it lives in.
fn resolve_key(key: &str) -> Option<(Tag, In, Option<TagKind>)> {
    let rest = key.strip_prefix("Exif.")?;
    let (group, name) = rest.split_once('.')?;
    let (group, ifd) = group_of(group)?;

    if let Some(d) = TAG_DEFS.iter().find(|d| d.group == group && d.name == name) {
        return Some((Tag(group.context(), d.number), ifd, Some(d.kind)));
    }

    let number = u16::from_str_radix(name.strip_prefix("0x")?, 16).ok()?;
    Some((Tag(group.context(), number), ifd, None))
}

/// Kind a new value under `key` must have, or `None` if the key is not a
/// known EXIF tag. Keys already present keep their stored kind.
pub fn declared_kind(key: &str, existing: &TagMap) -> Option<TagKind> {
    if let Some(v) = existing.get(key) {
        return Some(v.kind());
    }
    let (_, _, kind) = resolve_key(key)?;
    kind
}

fn value_to_tag(context: Context, number: u16, value: &Value) -> Option<TagValue> {
    let v = match value {
        Value::Byte(b) if is_utf16_tag(context, number) => {
            let units: Vec<u16> = b
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect();
            TagValue::Text(String::from_utf16_lossy(&units).trim_end_matches('\0').to_string())
        }
        Value::Byte(b) => TagValue::Byte(b.clone()),
        Value::Ascii(parts) => TagValue::Text(
            parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect::<Vec<_>>()
                .join(" "),
        ),
        Value::Short(v) => TagValue::Short(v.clone()),
        Value::Long(v) => TagValue::Long(v.clone()),
        Value::Rational(v) => TagValue::Rational(
            v.iter()
                .map(|r| RationalValue::new(i64::from(r.num), i64::from(r.denom)))
                .collect(),
        ),
        Value::SByte(v) => TagValue::SignedByte(v.clone()),
        Value::Undefined(v, _) => TagValue::Undefined(v.clone()),
        Value::SShort(v) => TagValue::SignedShort(v.clone()),
        Value::SLong(v) => TagValue::SignedLong(v.clone()),
        Value::SRational(v) => TagValue::SignedRational(
            v.iter()
                .map(|r| RationalValue::new(i64::from(r.num), i64::from(r.denom)))
                .collect(),
        ),
        Value::Float(v) => TagValue::Float(v.clone()),
        Value::Double(v) => TagValue::Double(v.clone()),
        #[allow(unreachable_patterns)]
        _ => return None,
    };
    Some(v)
}

fn tag_to_value(key: &str, tag: Tag, value: &TagValue) -> Result<Value, CodecError> {
    let overflow = || CodecError::Encode(format!("{key}: value out of range"));

    let v = match value {
        TagValue::Text(s) if is_utf16_tag(tag.0, tag.1) => {
            let mut bytes: Vec<u8> = s.encode_utf16().flat_map(|c| c.to_le_bytes()).collect();
            bytes.extend_from_slice(&[0, 0]);
            Value::Byte(bytes)
        }
        TagValue::Text(s) => Value::Ascii(vec![s.as_bytes().to_vec()]),
        TagValue::List(items) => Value::Ascii(vec![items.join(", ").into_bytes()]),
        TagValue::Byte(v) => Value::Byte(v.clone()),
        TagValue::SignedByte(v) => Value::SByte(v.clone()),
        TagValue::Undefined(v) => Value::Undefined(v.clone(), 0),
        TagValue::Short(v) => Value::Short(v.clone()),
        TagValue::SignedShort(v) => Value::SShort(v.clone()),
        TagValue::Long(v) => Value::Long(v.clone()),
        TagValue::SignedLong(v) => Value::SLong(v.clone()),
        TagValue::Rational(v) => Value::Rational(
            v.iter()
                .map(|r| {
                    Ok(Rational {
                        num: u32::try_from(r.numerator).map_err(|_| overflow())?,
                        denom: u32::try_from(r.denominator).map_err(|_| overflow())?,
                    })
                })
                .collect::<Result<_, CodecError>>()?,
        ),
        TagValue::SignedRational(v) => Value::SRational(
            v.iter()
                .map(|r| {
                    Ok(SRational {
                        num: i32::try_from(r.numerator).map_err(|_| overflow())?,
                        denom: i32::try_from(r.denominator).map_err(|_| overflow())?,
                    })
                })
                .collect::<Result<_, CodecError>>()?,
        ),
        TagValue::Float(v) => Value::Float(v.clone()),
        TagValue::Double(v) => Value::Double(v.clone()),
    };
    Ok(v)
}

fn first_long(value: &Value) -> Option<usize> {
    match value {
        Value::Long(v) => v.first().map(|&x| x as usize),
        Value::Short(v) => v.first().map(|&x| usize::from(x)),
        _ => None,
    }
}

/// Parse a TIFF structure into tags plus embedded JPEGs.
pub fn parse_tiff(data: &[u8]) -> Result<ExifBlock, CodecError> {
    let exif = exif::Reader::new()
        .read_raw(data.to_vec())
        .map_err(|e| CodecError::Malformed(format!("EXIF: {e}")))?;

    let mut block = ExifBlock {
        little_endian: exif.little_endian(),
        ..Default::default()
    };

    let mut jpeg_ptrs: [(Option<usize>, Option<usize>); 2] = [(None, None); 2];

    for field in exif.fields() {
        let Tag(context, number) = field.tag;

        if context == Context::Tiff && STRUCTURAL_TAGS.contains(&number) {
            let slot = match field.ifd_num.index() {
                0 => &mut jpeg_ptrs[0],
                1 => &mut jpeg_ptrs[1],
                _ => continue,
            };
            match number {
                JPEG_OFFSET => slot.0 = first_long(&field.value),
                JPEG_LENGTH => slot.1 = first_long(&field.value),
                _ => {}
            }
            continue;
        }
        if context == Context::Exif && number == 0xa005 {
            continue;
        }

        let (Some(group_label), Some(group)) =
            (group_name(context, field.ifd_num), group_for_context(context))
        else {
            log::debug!("Skipping EXIF field {} in IFD {}", field.tag, field.ifd_num);
            continue;
        };
        let Some(value) = value_to_tag(context, number, &field.value) else {
            continue;
        };

        let key = format!("Exif.{group_label}.{}", tag_name(group, number));
        block.tags.insert(key, value);
    }

    let slice = |(offset, len): (Option<usize>, Option<usize>)| -> Option<Vec<u8>> {
        let (offset, len) = (offset?, len?);
        exif.buf().get(offset..offset.checked_add(len)?).map(<[u8]>::to_vec)
    };
    block.primary_jpeg = slice(jpeg_ptrs[0]);
    block.thumbnail = slice(jpeg_ptrs[1]);

    log::debug!(
        "Parsed {} EXIF tags (thumbnail: {})",
        block.tags.len(),
        block.thumbnail.is_some()
    );
    Ok(block)
}

/// Serialize tags (and an optional IFD1 JPEG thumbnail) to a TIFF
/// structure.
pub fn build_tiff(
    tags: &TagMap,
    thumbnail: Option<&[u8]>,
    little_endian: bool,
) -> Result<Vec<u8>, CodecError> {
    write_ifds(tags, None, thumbnail, little_endian)
}

/// Like [`build_tiff`], with a JPEG preview referenced from IFD0 as raw
/// files carry it.
pub fn build_tiff_with_preview(
    tags: &TagMap,
    preview: &[u8],
    thumbnail: &[u8],
    little_endian: bool,
) -> Result<Vec<u8>, CodecError> {
    write_ifds(tags, Some(preview), Some(thumbnail), little_endian)
}

fn write_ifds(
    tags: &TagMap,
    preview: Option<&[u8]>,
    thumbnail: Option<&[u8]>,
    little_endian: bool,
) -> Result<Vec<u8>, CodecError> {
    let mut fields: Vec<Field> = Vec::with_capacity(tags.len() + 1);
    let mut has_thumb_compression = false;

    for (key, value) in tags.iter() {
        let Some((tag, ifd, _)) = resolve_key(key) else {
            log::debug!("Dropping unrecognized EXIF key {key}");
            continue;
        };
        if ifd == In::THUMBNAIL {
            if thumbnail.is_none() {
                continue;
            }
            has_thumb_compression |= tag.1 == COMPRESSION;
        }
        fields.push(Field {
            tag,
            ifd_num: ifd,
            value: tag_to_value(key, tag, value)?,
        });
    }

    if thumbnail.is_some() && !has_thumb_compression {
        fields.push(Field {
            tag: Tag(Context::Tiff, COMPRESSION),
            ifd_num: In::THUMBNAIL,
            value: Value::Short(vec![COMPRESSION_JPEG]),
        });
    }

    let mut writer = exif::experimental::Writer::new();
    for field in &fields {
        writer.push_field(field);
    }
    if let Some(jpeg) = preview {
        writer.set_jpeg(jpeg, In::PRIMARY);
    }
    if let Some(jpeg) = thumbnail {
        writer.set_jpeg(jpeg, In::THUMBNAIL);
    }

    let mut out = Cursor::new(Vec::new());
    writer
        .write(&mut out, little_endian)
        .map_err(|e| CodecError::Encode(format!("EXIF: {e}")))?;
    Ok(out.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tags() -> TagMap {
        let mut tags = TagMap::new();
        tags.insert("Exif.Image.Make", TagValue::text("Canon"));
        tags.insert("Exif.Image.Orientation", TagValue::short(6));
        tags.insert("Exif.Image.Rating", TagValue::short(4));
        tags.insert("Exif.Image.XPTitle", TagValue::text("Sunset"));
        tags.insert(
            "Exif.Photo.FNumber",
            TagValue::Rational(vec![RationalValue::new(28, 10)]),
        );
        tags.insert(
            "Exif.GPSInfo.GPSLatitude",
            TagValue::Rational(vec![
                RationalValue::new(48, 1),
                RationalValue::new(8, 1),
                RationalValue::new(3194, 100),
            ]),
        );
        tags.insert("Exif.GPSInfo.GPSLatitudeRef", TagValue::text("N"));
        tags
    }

    // ── build + parse ────────────────────────────────────────────────

    #[test]
    fn tags_survive_serialization() {
        let tiff = build_tiff(&sample_tags(), None, true).unwrap();
        let block = parse_tiff(&tiff).unwrap();

        assert!(block.little_endian);
        assert_eq!(block.tags.get("Exif.Image.Make"), Some(&TagValue::text("Canon")));
        assert_eq!(block.tags.get("Exif.Image.Orientation"), Some(&TagValue::short(6)));
        assert_eq!(block.tags.get("Exif.Image.Rating"), Some(&TagValue::short(4)));
        assert_eq!(block.tags.get("Exif.Image.XPTitle"), Some(&TagValue::text("Sunset")));
        assert_eq!(
            block.tags.get("Exif.GPSInfo.GPSLatitude").map(|v| v.to_string()).as_deref(),
            Some("48/1 8/1 3194/100")
        );
        assert!(block.thumbnail.is_none());
    }

    #[test]
    fn thumbnail_is_extracted() {
        let jpeg = vec![0xFF, 0xD8, 0xFF, 0xD9];
        let tiff = build_tiff(&sample_tags(), Some(&jpeg), false).unwrap();
        let block = parse_tiff(&tiff).unwrap();

        assert!(!block.little_endian);
        assert_eq!(block.thumbnail.as_deref(), Some(jpeg.as_slice()));
        assert!(!block.tags.keys().any(|k| k.ends_with("JPEGInterchangeFormat")));
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(parse_tiff(b"not a tiff"), Err(CodecError::Malformed(_))));
    }

    // ── key knowledge ────────────────────────────────────────────────

    #[test]
    fn declared_kinds() {
        let empty = TagMap::new();
        assert_eq!(declared_kind("Exif.Image.Rating", &empty), Some(TagKind::Short));
        assert_eq!(declared_kind("Exif.Photo.UserComment", &empty), Some(TagKind::Undefined));
        assert_eq!(declared_kind("Exif.Image.NoSuchTag", &empty), None);
        assert_eq!(declared_kind("Exif.Bogus.Make", &empty), None);

        let mut existing = TagMap::new();
        existing.insert("Exif.Image.0xc612", TagValue::Byte(vec![1, 4, 0, 0]));
        assert_eq!(declared_kind("Exif.Image.0xc612", &existing), Some(TagKind::Byte));
    }

    #[test]
    fn out_of_range_rational_is_encode_error() {
        let mut tags = TagMap::new();
        tags.insert(
            "Exif.Photo.FNumber",
            TagValue::Rational(vec![RationalValue::new(-1, 2)]),
        );
        assert!(matches!(build_tiff(&tags, None, true), Err(CodecError::Encode(_))));
    }
}
