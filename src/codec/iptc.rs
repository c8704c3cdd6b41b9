//! IPTC-IIM datasets and the Photoshop image-resource block that carries
//! them in JPEG APP13.

use std::ops::Range;

use crate::tags::{TagKind, TagMap, TagValue};

pub const PHOTOSHOP_HEADER: &[u8] = b"Photoshop 3.0\0";
const RESOURCE_SIGNATURE: &[u8] = b"8BIM";
const IPTC_RESOURCE_ID: u16 = 0x0404;
const DATASET_MARKER: u8 = 0x1C;
const IIM_VERSION: u16 = 4;

struct DatasetDef {
    record: u8,
    number: u8,
    name: &'static str,
    kind: TagKind,
    repeatable: bool,
}

const fn ds(record: u8, number: u8, name: &'static str, repeatable: bool) -> DatasetDef {
    DatasetDef {
        record,
        number,
        name,
        kind: TagKind::Text,
        repeatable,
    }
}

const fn ds_short(record: u8, number: u8, name: &'static str) -> DatasetDef {
    DatasetDef {
        record,
        number,
        name,
        kind: TagKind::Short,
        repeatable: false,
    }
}

#[rustfmt::skip]
const DATASETS: &[DatasetDef] = &[
    ds_short(1, 0, "ModelVersion"),
    ds(1, 5, "Destination", true),
    ds_short(1, 20, "FileFormat"),
    ds_short(1, 22, "FileVersion"),
    ds(1, 30, "ServiceId", false),
    ds(1, 40, "EnvelopeNumber", false),
    ds(1, 50, "ProductId", true),
    ds(1, 60, "EnvelopePriority", false),
    ds(1, 70, "DateSent", false),
    ds(1, 80, "TimeSent", false),
    ds(1, 90, "CharacterSet", false),

    ds_short(2, 0, "RecordVersion"),
    ds(2, 5, "ObjectName", false),
    ds(2, 7, "EditStatus", false),
    ds(2, 10, "Urgency", false),
    ds(2, 15, "Category", false),
    ds(2, 20, "SuppCategory", true),
    ds(2, 25, "Keywords", true),
    ds(2, 40, "SpecialInstructions", false),
    ds(2, 55, "DateCreated", false),
    ds(2, 60, "TimeCreated", false),
    ds(2, 62, "DigitizationDate", false),
    ds(2, 65, "Program", false),
    ds(2, 70, "ProgramVersion", false),
    ds(2, 80, "Byline", true),
    ds(2, 85, "BylineTitle", true),
    ds(2, 90, "City", false),
    ds(2, 92, "SubLocation", false),
    ds(2, 95, "ProvinceState", false),
    ds(2, 100, "CountryCode", false),
    ds(2, 101, "CountryName", false),
    ds(2, 103, "TransmissionReference", false),
    ds(2, 105, "Headline", false),
    ds(2, 110, "Credit", false),
    ds(2, 115, "Source", false),
    ds(2, 116, "Copyright", false),
    ds(2, 118, "Contact", true),
    ds(2, 120, "Caption", false),
    ds(2, 122, "Writer", true),
];

fn record_name(record: u8) -> Option<&'static str> {
    match record {
        1 => Some("Envelope"),
        2 => Some("Application2"),
        _ => None,
    }
}

fn record_number(name: &str) -> Option<u8> {
    match name {
        "Envelope" => Some(1),
        "Application2" => Some(2),
        _ => None,
    }
}

fn find_def(record: u8, number: u8) -> Option<&'static DatasetDef> {
    DATASETS.iter().find(|d| d.record == record && d.number == number)
}

/// `Iptc.<Record>.<Name>` → `(record, dataset, definition)`.
fn resolve_key(key: &str) -> Option<(u8, u8, Option<&'static DatasetDef>)> {
    let (record, name) = key.strip_prefix("Iptc.")?.split_once('.')?;
    let record = record_number(record)?;

    if let Some(d) = DATASETS.iter().find(|d| d.record == record && d.name == name) {
        return Some((record, d.number, Some(d)));
    }
    let number = u8::from_str_radix(name.strip_prefix("0x")?, 16).ok()?;
    Some((record, number, find_def(record, number)))
}

/// Kind of a new value under `key`; repeatable datasets are lists.
pub fn declared_kind(key: &str, existing: &TagMap) -> Option<TagKind> {
    if let Some(v) = existing.get(key) {
        return Some(v.kind());
    }
    let (_, _, def) = resolve_key(key)?;
    let def = def?;
    Some(if def.repeatable { TagKind::List } else { def.kind })
}

fn push_value(tags: &mut TagMap, key: String, value: TagValue, repeatable: bool) {
    let merged = match (tags.get(&key), value) {
        (Some(TagValue::List(items)), TagValue::Text(s)) => {
            let mut items = items.clone();
            items.push(s);
            TagValue::List(items)
        }
        (Some(TagValue::Text(prev)), TagValue::Text(s)) => TagValue::List(vec![prev.clone(), s]),
        (None, TagValue::Text(s)) if repeatable => TagValue::List(vec![s]),
        (_, v) => v,
    };
    tags.insert(key, merged);
}

/// Parse a stream of IIM datasets. Parsing stops at the first byte that is
/// not a dataset marker or at a truncated dataset.
pub fn parse_iim(data: &[u8]) -> TagMap {
    let mut tags = TagMap::new();
    let mut pos = 0;

    while pos + 5 <= data.len() && data[pos] == DATASET_MARKER {
        let record = data[pos + 1];
        let number = data[pos + 2];
        let mut len = usize::from(u16::from_be_bytes([data[pos + 3], data[pos + 4]]));
        pos += 5;

        // Extended dataset: the low bits give the size of the length field.
        if len & 0x8000 != 0 {
            let width = len & 0x7fff;
            if !(1..=4).contains(&width) {
                break;
            }
            let Some(field) = data.get(pos..pos.saturating_add(width)) else {
                break;
            };
            len = field.iter().fold(0usize, |acc, &b| (acc << 8) | usize::from(b));
            pos += width;
        }

        let Some(bytes) = pos.checked_add(len).and_then(|end| data.get(pos..end)) else {
            log::debug!("Truncated IPTC dataset {record}:{number}");
            break;
        };
        pos += len;

        let Some(record_label) = record_name(record) else {
            continue;
        };
        let def = find_def(record, number);
        let name = def
            .map(|d| d.name.to_string())
            .unwrap_or_else(|| format!("0x{number:04x}"));
        let key = format!("Iptc.{record_label}.{name}");

        let value = match def {
            Some(d) if d.kind == TagKind::Short && bytes.len() == 2 => {
                TagValue::short(u16::from_be_bytes([bytes[0], bytes[1]]))
            }
            _ => TagValue::Text(String::from_utf8_lossy(bytes).into_owned()),
        };
        push_value(&mut tags, key, value, def.is_some_and(|d| d.repeatable));
    }

    tags
}

fn write_dataset(out: &mut Vec<u8>, record: u8, number: u8, bytes: &[u8]) {
    out.extend_from_slice(&[DATASET_MARKER, record, number]);
    match u16::try_from(bytes.len()) {
        Ok(len) if len < 0x8000 => out.extend_from_slice(&len.to_be_bytes()),
        _ => {
            out.extend_from_slice(&0x8004u16.to_be_bytes());
            out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
        }
    }
    out.extend_from_slice(bytes);
}

fn value_bytes(value: &TagValue) -> Vec<Vec<u8>> {
    match value {
        TagValue::List(items) => items.iter().map(|s| s.as_bytes().to_vec()).collect(),
        TagValue::Short(v) => v.iter().map(|n| n.to_be_bytes().to_vec()).collect(),
        other => vec![other.to_string().into_bytes()],
    }
}

/// Serialize tags to IIM datasets, envelope record first. The
/// application record always starts with its version dataset.
pub fn build_iim(tags: &TagMap) -> Vec<u8> {
    let mut resolved: Vec<(u8, u8, &TagValue)> = Vec::new();
    for (key, value) in tags.iter() {
        match resolve_key(key) {
            Some((record, number, _)) => resolved.push((record, number, value)),
            None => log::debug!("Dropping unrecognized IPTC key {key}"),
        }
    }
    if resolved.is_empty() {
        return Vec::new();
    }
    resolved.sort_by_key(|(record, _, _)| *record);

    let mut out = Vec::new();
    let has_app_record = resolved.iter().any(|(r, _, _)| *r == 2);
    let has_version = resolved.iter().any(|(r, n, _)| *r == 2 && *n == 0);

    for (i, (record, number, value)) in resolved.iter().enumerate() {
        let first_app = *record == 2 && (i == 0 || resolved[i - 1].0 != 2);
        if first_app && has_app_record && !has_version {
            write_dataset(&mut out, 2, 0, &IIM_VERSION.to_be_bytes());
        }
        for bytes in value_bytes(value) {
            write_dataset(&mut out, *record, *number, &bytes);
        }
    }
    out
}

struct Resource {
    id: u16,
    span: Range<usize>,
    data: Range<usize>,
}

/// Walk the `8BIM` resources of a Photoshop block (header included).
fn resources(block: &[u8]) -> Vec<Resource> {
    let mut out = Vec::new();
    let mut pos = if block.starts_with(PHOTOSHOP_HEADER) { PHOTOSHOP_HEADER.len() } else { 0 };

    while pos + 12 <= block.len() {
        if &block[pos..pos + 4] != RESOURCE_SIGNATURE {
            break;
        }
        let id = u16::from_be_bytes([block[pos + 4], block[pos + 5]]);
        // Pascal name: length byte plus text, padded to even.
        let name_len = usize::from(block[pos + 6]);
        let name_padded = if (name_len + 1) % 2 == 0 { name_len + 1 } else { name_len + 2 };
        let data_start = pos + 6 + name_padded;
        if data_start + 4 > block.len() {
            break;
        }
        let data_len = u32::from_be_bytes([
            block[data_start],
            block[data_start + 1],
            block[data_start + 2],
            block[data_start + 3],
        ]) as usize;
        let data_begin = data_start + 4;
        let data_end = (data_begin + data_len).min(block.len());
        let padded_end = if data_len % 2 == 0 { data_begin + data_len } else { data_begin + data_len + 1 };

        out.push(Resource {
            id,
            span: pos..padded_end.min(block.len()),
            data: data_begin..data_end,
        });
        pos = padded_end;
    }
    out
}

/// IIM data stored in a Photoshop block, if any.
pub fn extract_iim(block: &[u8]) -> Option<&[u8]> {
    resources(block)
        .into_iter()
        .find(|r| r.id == IPTC_RESOURCE_ID)
        .map(|r| &block[r.data])
}

/// Rebuild a Photoshop block with `iim` as its IPTC resource, keeping every
/// other resource of `existing`. Empty `iim` drops the IPTC resource.
pub fn build_photoshop_block(existing: Option<&[u8]>, iim: &[u8]) -> Vec<u8> {
    let mut result = Vec::new();
    result.extend_from_slice(PHOTOSHOP_HEADER);

    if let Some(block) = existing {
        for r in resources(block) {
            if r.id != IPTC_RESOURCE_ID {
                result.extend_from_slice(&block[r.span]);
            }
        }
    }

    if !iim.is_empty() {
        result.extend_from_slice(RESOURCE_SIGNATURE);
        result.extend_from_slice(&IPTC_RESOURCE_ID.to_be_bytes());
        result.push(0x00); // empty pascal name
        result.push(0x00); // padding to even
        result.extend_from_slice(&(iim.len() as u32).to_be_bytes());
        result.extend_from_slice(iim);
        if iim.len() % 2 != 0 {
            result.push(0x00);
        }
    }

    result
}

/// Whether a Photoshop block has any resource left worth storing.
pub fn has_resources(block: &[u8]) -> bool {
    !resources(block).is_empty()
}
