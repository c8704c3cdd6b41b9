//! XMP packet ⇄ [`TagMap`].
//!
//! Only the flat subset of RDF that photo tools exchange is modeled:
//! simple properties (as attributes or elements), `rdf:Bag`/`rdf:Seq`
//! arrays (→ [`TagValue::List`]) and `rdf:Alt` language alternatives
//! (→ the `x-default` text). Structured properties are skipped.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use std::collections::HashMap;

use super::{AccessMode, CodecError, Container, ContainerFormat, MetadataMaps};
use crate::keys::Namespace;
use crate::tags::{TagKind, TagMap, TagValue};

/// Well-known schema prefixes and their namespace URIs.
pub const NAMESPACES: &[(&str, &str)] = &[
    ("xmp", "http://ns.adobe.com/xap/1.0/"),
    ("dc", "http://purl.org/dc/elements/1.1/"),
    ("tiff", "http://ns.adobe.com/tiff/1.0/"),
    ("exif", "http://ns.adobe.com/exif/1.0/"),
    ("exifEX", "http://cipa.jp/exif/1.0/"),
    ("aux", "http://ns.adobe.com/exif/1.0/aux/"),
    ("crs", "http://ns.adobe.com/camera-raw-settings/1.0/"),
    ("photoshop", "http://ns.adobe.com/photoshop/1.0/"),
    ("xmpMM", "http://ns.adobe.com/xap/1.0/mm/"),
    ("xmpRights", "http://ns.adobe.com/xap/1.0/rights/"),
    ("MicrosoftPhoto", "http://ns.microsoft.com/photo/1.0/"),
    ("lr", "http://ns.adobe.com/lightroom/1.0/"),
    ("Iptc4xmpCore", "http://iptc.org/std/Iptc4xmpCore/1.0/xmlns/"),
];

const RDF_URI: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

// Properties stored as language alternatives.
const ALT_PROPERTIES: &[&str] = &["dc.title", "dc.description", "dc.rights", "xmpRights.UsageTerms"];

// Ordered arrays; every other list is written as a bag.
const SEQ_PROPERTIES: &[&str] = &["dc.creator", "dc.date"];

const BAG_PROPERTIES: &[&str] = &[
    "dc.subject",
    "dc.contributor",
    "dc.publisher",
    "dc.type",
    "dc.language",
    "photoshop.SupplementalCategories",
    "lr.hierarchicalSubject",
];

/// A parsed packet. `namespaces` lists schemas found in the document that
/// are not in [`NAMESPACES`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XmpPacket {
    pub tags: TagMap,
    pub namespaces: Vec<(String, String)>,
}

impl XmpPacket {
    pub fn uri_for(&self, prefix: &str) -> Option<&str> {
        uri_in(prefix, &self.namespaces)
    }

    pub fn declared_kind(&self, key: &str) -> Option<TagKind> {
        declared_kind(key, &self.tags, &self.namespaces)
    }
}

pub fn uri_for(prefix: &str) -> Option<&'static str> {
    NAMESPACES.iter().find(|(p, _)| *p == prefix).map(|(_, u)| *u)
}

/// Registered URI for `prefix`, falling back to namespaces learned from a
/// parsed document.
pub fn uri_in<'a>(prefix: &str, learned: &'a [(String, String)]) -> Option<&'a str> {
    uri_for(prefix).or_else(|| {
        learned
            .iter()
            .find(|(p, _)| p == prefix)
            .map(|(_, u)| u.as_str())
    })
}

/// Kind of a new value under `key`; `None` for keys whose schema prefix is
/// neither registered nor learned.
pub fn declared_kind(key: &str, existing: &TagMap, learned: &[(String, String)]) -> Option<TagKind> {
    if let Some(v) = existing.get(key) {
        return Some(v.kind());
    }
    let (prefix, name) = key.strip_prefix("Xmp.")?.split_once('.')?;
    if name.is_empty() {
        return None;
    }
    uri_in(prefix, learned)?;

    let path = format!("{prefix}.{name}");
    if SEQ_PROPERTIES.contains(&path.as_str()) || BAG_PROPERTIES.contains(&path.as_str()) {
        Some(TagKind::List)
    } else {
        Some(TagKind::Text)
    }
}

fn prefix_for(uri: &str) -> Option<&'static str> {
    NAMESPACES.iter().find(|(_, u)| *u == uri).map(|(p, _)| *p)
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum ArrayKind {
    List,
    Alt,
}

#[derive(Debug)]
struct Property {
    key: String,
    depth: usize,
    text: String,
    array: Option<ArrayKind>,
    items: Vec<String>,
    item: Option<(String, Option<String>)>,
    alt_default: Option<String>,
    structured: bool,
}

impl Property {
    fn new(key: String, depth: usize) -> Self {
        Self {
            key,
            depth,
            text: String::new(),
            array: None,
            items: Vec::new(),
            item: None,
            alt_default: None,
            structured: false,
        }
    }

    fn finish_item(&mut self) {
        let Some((text, lang)) = self.item.take() else {
            return;
        };
        if self.array == Some(ArrayKind::Alt)
            && (lang.as_deref() == Some("x-default") || self.alt_default.is_none())
        {
            self.alt_default = Some(text.clone());
        }
        self.items.push(text);
    }

    fn into_value(self) -> Option<(String, TagValue)> {
        if self.structured {
            log::debug!("Skipping structured XMP property {}", self.key);
            return None;
        }
        let value = match self.array {
            Some(ArrayKind::List) => TagValue::List(self.items),
            Some(ArrayKind::Alt) => TagValue::Text(self.alt_default.unwrap_or_default()),
            None => TagValue::Text(self.text),
        };
        Some((self.key, value))
    }
}

struct Namespaces {
    bindings: HashMap<String, String>,
    unknown: Vec<(String, String)>,
}

impl Namespaces {
    fn learn(&mut self, e: &BytesStart) {
        for attr in e.attributes().flatten() {
            let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
            let Some(prefix) = name.strip_prefix("xmlns:") else {
                continue;
            };
            let Ok(uri) = attr.unescape_value() else {
                continue;
            };
            if uri != RDF_URI && prefix_for(&uri).is_none() && !self.unknown.iter().any(|(p, _)| p == prefix) {
                self.unknown.push((prefix.to_string(), uri.to_string()));
            }
            self.bindings.insert(prefix.to_string(), uri.into_owned());
        }
    }

    /// `dc:title` → `Xmp.dc.title`, using the registered prefix for the
    /// element's namespace URI.
    fn key_for(&self, qname: &str) -> Option<String> {
        let (prefix, local) = qname.split_once(':')?;
        if matches!(prefix, "rdf" | "x" | "xml" | "xmlns") {
            return None;
        }
        let canonical = self
            .bindings
            .get(prefix)
            .and_then(|uri| prefix_for(uri))
            .unwrap_or(prefix);
        Some(format!("Xmp.{canonical}.{local}"))
    }
}

fn qname(e: &BytesStart) -> String {
    String::from_utf8_lossy(e.name().as_ref()).into_owned()
}

fn attr_value(e: &BytesStart, name: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name.as_bytes())
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Properties written as attributes of `rdf:Description`.
fn description_attributes(e: &BytesStart, ns: &Namespaces, tags: &mut TagMap) {
    for attr in e.attributes().flatten() {
        let name = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        if name.starts_with("xmlns") || name.starts_with("rdf:") || name.starts_with("xml:") {
            continue;
        }
        let (Some(key), Ok(value)) = (ns.key_for(&name), attr.unescape_value()) else {
            continue;
        };
        tags.insert(key, TagValue::Text(value.into_owned()));
    }
}

/// Parse an XMP packet. Leading BOMs and `<?xpacket?>` wrappers are
/// accepted.
pub fn parse_packet(xml: &str) -> Result<XmpPacket, CodecError> {
    let mut reader = Reader::from_str(xml.trim_start_matches('\u{feff}'));
    reader.config_mut().trim_text(true);

    let mut ns = Namespaces {
        bindings: HashMap::new(),
        unknown: Vec::new(),
    };
    let mut tags = TagMap::new();
    let mut stack: Vec<String> = Vec::new();
    let mut prop: Option<Property> = None;

    loop {
        let event = reader
            .read_event()
            .map_err(|e| CodecError::Malformed(format!("XMP: {e}")))?;

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                ns.learn(e);
                let name = qname(e);

                if let Some(p) = prop.as_mut() {
                    match name.as_str() {
                        "rdf:Bag" | "rdf:Seq" => p.array = Some(ArrayKind::List),
                        "rdf:Alt" => p.array = Some(ArrayKind::Alt),
                        "rdf:li" if p.array.is_some() => {
                            p.item = Some((String::new(), attr_value(e, "xml:lang")));
                            if is_empty {
                                p.finish_item();
                            }
                        }
                        _ => p.structured = true,
                    }
                } else if name == "rdf:Description" {
                    description_attributes(e, &ns, &mut tags);
                } else if stack.last().is_some_and(|p| p == "rdf:Description") {
                    if let Some(key) = ns.key_for(&name) {
                        if is_empty {
                            let value = attr_value(e, "rdf:resource").unwrap_or_default();
                            tags.insert(key, TagValue::Text(value));
                        } else {
                            let mut p = Property::new(key, stack.len() + 1);
                            p.structured = attr_value(e, "rdf:parseType").is_some();
                            prop = Some(p);
                        }
                    }
                }

                if !is_empty {
                    stack.push(name);
                }
            }
            Event::Text(ref t) => {
                if let Some(p) = prop.as_mut() {
                    let text = t
                        .unescape()
                        .map_err(|e| CodecError::Malformed(format!("XMP: {e}")))?;
                    match p.item.as_mut() {
                        Some((buf, _)) => buf.push_str(&text),
                        None => p.text.push_str(&text),
                    }
                }
            }
            Event::CData(ref t) => {
                if let Some(p) = prop.as_mut() {
                    let text = String::from_utf8_lossy(t);
                    match p.item.as_mut() {
                        Some((buf, _)) => buf.push_str(&text),
                        None => p.text.push_str(&text),
                    }
                }
            }
            Event::End(_) => {
                let closed = stack.pop().unwrap_or_default();
                let depth = stack.len() + 1;
                if let Some(p) = prop.as_mut() {
                    if closed == "rdf:li" {
                        p.finish_item();
                    }
                    if depth == p.depth {
                        if let Some((key, value)) = prop.take().and_then(Property::into_value) {
                            tags.insert(key, value);
                        }
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(XmpPacket {
        tags,
        namespaces: ns.unknown,
    })
}

/// Escape special XML characters.
fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Serialize tags into a complete packet. Keys whose prefix has no known
/// URI are dropped.
pub fn serialize_packet(packet: &XmpPacket) -> String {
    let mut used: Vec<(&str, &str)> = Vec::new();
    let mut body = String::new();

    for (key, value) in packet.tags.iter() {
        let Some((prefix, name)) = key.strip_prefix("Xmp.").and_then(|k| k.split_once('.')) else {
            continue;
        };
        let Some(uri) = packet.uri_for(prefix) else {
            log::debug!("Dropping XMP key {key}: unregistered prefix");
            continue;
        };
        if !used.iter().any(|(p, _)| *p == prefix) {
            used.push((prefix, uri));
        }

        let path = format!("{prefix}.{name}");
        let qname = format!("{prefix}:{name}");
        match value {
            TagValue::List(items) => {
                let array = if SEQ_PROPERTIES.contains(&path.as_str()) { "rdf:Seq" } else { "rdf:Bag" };
                body.push_str(&format!("  <{qname}><{array}>\n"));
                for item in items {
                    body.push_str(&format!("    <rdf:li>{}</rdf:li>\n", xml_escape(item)));
                }
                body.push_str(&format!("  </{array}></{qname}>\n"));
            }
            other if ALT_PROPERTIES.contains(&path.as_str()) => {
                let text = xml_escape(&other.to_string());
                body.push_str(&format!(
                    "  <{qname}><rdf:Alt><rdf:li xml:lang=\"x-default\">{text}</rdf:li></rdf:Alt></{qname}>\n"
                ));
            }
            other => {
                body.push_str(&format!("  <{qname}>{}</{qname}>\n", xml_escape(&other.to_string())));
            }
        }
    }

    let mut xmp = String::new();
    xmp.push_str("<?xpacket begin=\"\u{feff}\" id=\"W5M0MpCehiHzreSzNTczkc9d\"?>\n");
    xmp.push_str("<x:xmpmeta xmlns:x=\"adobe:ns:meta/\">\n");
    xmp.push_str(&format!("<rdf:RDF xmlns:rdf=\"{RDF_URI}\">\n"));
    xmp.push_str("<rdf:Description rdf:about=\"\"");
    for (prefix, uri) in &used {
        xmp.push_str(&format!("\n  xmlns:{prefix}=\"{}\"", xml_escape(uri)));
    }
    xmp.push_str(">\n");
    xmp.push_str(&body);
    xmp.push_str("</rdf:Description>\n");
    xmp.push_str("</rdf:RDF>\n");
    xmp.push_str("</x:xmpmeta>\n");
    xmp.push_str("<?xpacket end=\"w\"?>");
    xmp
}

/// A standalone XMP document (sidecar file).
pub struct XmpContainer {
    bytes: Vec<u8>,
    maps: MetadataMaps,
    good: bool,
}

impl XmpContainer {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self {
            bytes,
            maps: MetadataMaps::default(),
            good: true,
        }
    }
}

impl Container for XmpContainer {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Xmp
    }

    fn read_metadata(&mut self) -> Result<(), CodecError> {
        self.maps = MetadataMaps::default();
        if self.bytes.is_empty() {
            return Ok(());
        }
        let text = String::from_utf8_lossy(&self.bytes);
        let result = parse_packet(&text);
        self.good = result.is_ok();
        let packet = result?;
        self.maps.xmp = packet.tags;
        self.maps.xmp_namespaces = packet.namespaces;
        Ok(())
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
            Namespace::Xmp => AccessMode::ReadWrite,
            Namespace::Exif | Namespace::Iptc => AccessMode::None,
        }
    }

    fn write_metadata(&mut self) -> Result<(), CodecError> {
        let packet = XmpPacket {
            tags: self.maps.xmp.clone(),
            namespaces: self.maps.xmp_namespaces.clone(),
        };
        self.bytes = serialize_packet(&packet).into_bytes();
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}
