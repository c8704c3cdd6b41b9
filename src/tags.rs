//! Typed tag values and the ordered tag map shared by all namespaces.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::numeric::{RationalValue, parse_leading_f64, parse_rational};

// 8-byte character-code header of UserComment-style values.
const CHARSET_ASCII: &[u8; 8] = b"ASCII\0\0\0";
const CHARSET_UNICODE: &[u8; 8] = b"UNICODE\0";
const CHARSET_JIS: &[u8; 8] = b"JIS\0\0\0\0\0";
const CHARSET_UNDEFINED: &[u8; 8] = &[0; 8];

/// The storage type of a tag, independent of its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TagKind {
    Text,
    Byte,
    SignedByte,
    Undefined,
    Short,
    SignedShort,
    Long,
    SignedLong,
    Rational,
    SignedRational,
    Float,
    Double,
    List,
}

/// A single tag value.
///
/// Numeric variants hold every repeated component; a GPS latitude is one
/// `Rational` with three entries. `List` is an XMP bag/sequence or a
/// repeated IPTC dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum TagValue {
    Text(String),
    Byte(Vec<u8>),
    SignedByte(Vec<i8>),
    Undefined(Vec<u8>),
    Short(Vec<u16>),
    SignedShort(Vec<i16>),
    Long(Vec<u32>),
    SignedLong(Vec<i32>),
    Rational(Vec<RationalValue>),
    SignedRational(Vec<RationalValue>),
    Float(Vec<f32>),
    Double(Vec<f64>),
    List(Vec<String>),
}

impl TagValue {
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    pub fn short(v: u16) -> Self {
        Self::Short(vec![v])
    }

    pub fn kind(&self) -> TagKind {
        match self {
            Self::Text(_) => TagKind::Text,
            Self::Byte(_) => TagKind::Byte,
            Self::SignedByte(_) => TagKind::SignedByte,
            Self::Undefined(_) => TagKind::Undefined,
            Self::Short(_) => TagKind::Short,
            Self::SignedShort(_) => TagKind::SignedShort,
            Self::Long(_) => TagKind::Long,
            Self::SignedLong(_) => TagKind::SignedLong,
            Self::Rational(_) => TagKind::Rational,
            Self::SignedRational(_) => TagKind::SignedRational,
            Self::Float(_) => TagKind::Float,
            Self::Double(_) => TagKind::Double,
            Self::List(_) => TagKind::List,
        }
    }

    /// Number of stored components. Text counts bytes.
    pub fn count(&self) -> usize {
        match self {
            Self::Text(s) => s.len(),
            Self::Byte(v) | Self::Undefined(v) => v.len(),
            Self::SignedByte(v) => v.len(),
            Self::Short(v) => v.len(),
            Self::SignedShort(v) => v.len(),
            Self::Long(v) => v.len(),
            Self::SignedLong(v) => v.len(),
            Self::Rational(v) | Self::SignedRational(v) => v.len(),
            Self::Float(v) => v.len(),
            Self::Double(v) => v.len(),
            Self::List(v) => v.len(),
        }
    }

    /// First component as a number. Text is parsed leniently.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Text(s) => parse_leading_f64(s),
            Self::Byte(v) | Self::Undefined(v) => v.first().map(|&x| f64::from(x)),
            Self::SignedByte(v) => v.first().map(|&x| f64::from(x)),
            Self::Short(v) => v.first().map(|&x| f64::from(x)),
            Self::SignedShort(v) => v.first().map(|&x| f64::from(x)),
            Self::Long(v) => v.first().map(|&x| f64::from(x)),
            Self::SignedLong(v) => v.first().map(|&x| f64::from(x)),
            Self::Rational(v) | Self::SignedRational(v) => v.first().and_then(|r| r.to_f64()),
            Self::Float(v) => v.first().map(|&x| f64::from(x)),
            Self::Double(v) => v.first().copied(),
            Self::List(v) => v.first().and_then(|s| parse_leading_f64(s)),
        }
    }

    /// Items of a list value, or the single text value.
    pub fn as_strings(&self) -> Vec<String> {
        match self {
            Self::List(items) => items.clone(),
            other => vec![other.to_string()],
        }
    }

    /// Build a value of `kind` from its display form. Returns `None` when
    /// `text` does not fit the kind.
    pub fn parse(kind: TagKind, text: &str) -> Option<Self> {
        let value = match kind {
            TagKind::Text => Self::Text(text.to_string()),
            TagKind::Byte => Self::Byte(parse_numbers(text)?),
            TagKind::SignedByte => Self::SignedByte(parse_numbers(text)?),
            TagKind::Short => Self::Short(parse_numbers(text)?),
            TagKind::SignedShort => Self::SignedShort(parse_numbers(text)?),
            TagKind::Long => Self::Long(parse_numbers(text)?),
            TagKind::SignedLong => Self::SignedLong(parse_numbers(text)?),
            TagKind::Float => Self::Float(parse_numbers(text)?),
            TagKind::Double => Self::Double(parse_numbers(text)?),
            TagKind::Rational => {
                let values = parse_rationals(text)?;
                if values.iter().any(|r| r.numerator < 0 || r.denominator < 0) {
                    return None;
                }
                Self::Rational(values)
            }
            TagKind::SignedRational => Self::SignedRational(parse_rationals(text)?),
            TagKind::Undefined => Self::Undefined(parse_undefined(text)),
            TagKind::List => Self::List(
                text.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            ),
        };
        Some(value)
    }
}

fn parse_numbers<T: std::str::FromStr>(text: &str) -> Option<Vec<T>> {
    let values: Option<Vec<T>> = text.split_whitespace().map(|t| t.parse().ok()).collect();
    values.filter(|v| !v.is_empty())
}

fn parse_rationals(text: &str) -> Option<Vec<RationalValue>> {
    let values: Option<Vec<RationalValue>> = text
        .split_whitespace()
        .map(|t| {
            parse_rational(t).or_else(|| t.parse::<i64>().ok().map(|n| RationalValue::new(n, 1)))
        })
        .collect();
    values.filter(|v| !v.is_empty())
}

/// Undefined data is either a list of byte values or a comment, optionally
/// prefixed with `charset="..."`.
fn parse_undefined(text: &str) -> Vec<u8> {
    if let Some(bytes) = parse_numbers::<u8>(text) {
        return bytes;
    }

    let (charset, body) = match text.strip_prefix("charset=") {
        Some(rest) => {
            let rest = rest.trim_start_matches('"');
            match rest.split_once('"') {
                Some((cs, body)) => (cs, body.strip_prefix(' ').unwrap_or(body)),
                None => ("Ascii", rest),
            }
        }
        None => ("Ascii", text),
    };

    if charset.eq_ignore_ascii_case("Unicode") {
        let mut out = CHARSET_UNICODE.to_vec();
        out.extend(body.encode_utf16().flat_map(|c| c.to_le_bytes()));
        out
    } else {
        let mut out = CHARSET_ASCII.to_vec();
        out.extend_from_slice(body.as_bytes());
        out
    }
}

/// Render a UserComment-style value, or `None` if `bytes` has no charset
/// header.
fn comment_text(bytes: &[u8]) -> Option<String> {
    if bytes.len() < 8 {
        return None;
    }
    let (header, body) = bytes.split_at(8);

    let (charset, text) = if header == CHARSET_ASCII {
        ("Ascii", String::from_utf8_lossy(body).into_owned())
    } else if header == CHARSET_UNICODE {
        let units: Vec<u16> = body
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect();
        ("Unicode", String::from_utf16_lossy(&units))
    } else if header == CHARSET_JIS {
        ("Jis", String::from_utf8_lossy(body).into_owned())
    } else if header == CHARSET_UNDEFINED {
        ("Undefined", String::from_utf8_lossy(body).into_owned())
    } else {
        return None;
    };

    let text = text.trim_end_matches(['\0', ' ']);
    Some(format!("charset=\"{charset}\" {text}"))
}

fn join<T: fmt::Display>(f: &mut fmt::Formatter<'_>, values: &[T], sep: &str) -> fmt::Result {
    for (i, v) in values.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{v}")?;
    }
    Ok(())
}

impl fmt::Display for TagValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(s) => f.write_str(s),
            Self::Byte(v) => join(f, v, " "),
            Self::SignedByte(v) => join(f, v, " "),
            Self::Undefined(v) => match comment_text(v) {
                Some(comment) => f.write_str(&comment),
                None => join(f, v, " "),
            },
            Self::Short(v) => join(f, v, " "),
            Self::SignedShort(v) => join(f, v, " "),
            Self::Long(v) => join(f, v, " "),
            Self::SignedLong(v) => join(f, v, " "),
            Self::Rational(v) | Self::SignedRational(v) => join(f, v, " "),
            Self::Float(v) => join(f, v, " "),
            Self::Double(v) => join(f, v, " "),
            Self::List(v) => join(f, v, ", "),
        }
    }
}

/// An insertion-ordered map of unique tag keys.
///
/// Containers keep tags in file order; replacing a value keeps its
/// position.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TagMap {
    entries: Vec<(String, TagValue)>,
}

impl TagMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&TagValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Replace the value under `key`, or append it. Returns the old value.
    pub fn insert(&mut self, key: impl Into<String>, value: TagValue) -> Option<TagValue> {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn remove(&mut self, key: &str) -> Option<TagValue> {
        let pos = self.entries.iter().position(|(k, _)| k == key)?;
        Some(self.entries.remove(pos).1)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TagValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K: Into<String>> FromIterator<(K, TagValue)> for TagMap {
    fn from_iter<I: IntoIterator<Item = (K, TagValue)>>(iter: I) -> Self {
        let mut map = TagMap::new();
        for (k, v) in iter {
            map.insert(k, v);
        }
        map
    }
}
