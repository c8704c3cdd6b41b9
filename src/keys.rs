//! Metadata namespaces and key resolution.
//!
//! Fully qualified keys have the form `<Family>.<Group>.<Name>`:
//! `Exif.Photo.FNumber`, `Iptc.Application2.Keywords`, `Xmp.dc.subject`.
//! Callers may also pass a short name; the lookup tables below decide which
//! groups are tried, in order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// EXIF groups tried, in order, for a short key such as `"FNumber"`.
pub const EXIF_LOOKUP_GROUPS: &[&str] = &["Image", "Photo"];

/// Group used for a short IPTC key.
pub const IPTC_DEFAULT_GROUP: &str = "Application2";

/// Schema prefix used for a short XMP key.
pub const XMP_DEFAULT_PREFIX: &str = "xmp";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Namespace {
    Exif,
    Iptc,
    Xmp,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Exif, Namespace::Iptc, Namespace::Xmp];

    pub fn family(self) -> &'static str {
        match self {
            Self::Exif => "Exif",
            Self::Iptc => "Iptc",
            Self::Xmp => "Xmp",
        }
    }

    /// Namespace of a fully qualified key.
    pub fn of_key(key: &str) -> Option<Self> {
        let (family, rest) = key.split_once('.')?;
        if rest.is_empty() {
            return None;
        }
        Self::from_name(family)
    }

    /// Case-insensitive `exif` / `iptc` / `xmp`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|ns| ns.family().eq_ignore_ascii_case(name))
    }

    fn is_qualified(self, key: &str) -> bool {
        key.strip_prefix(self.family())
            .and_then(|rest| rest.strip_prefix('.'))
            .is_some_and(|rest| rest.contains('.'))
    }
}

impl fmt::Display for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.family())
    }
}

/// Keys to try, in order, when resolving `key` in `namespace`.
///
/// A fully qualified key is returned as-is. Short EXIF names expand over
/// [`EXIF_LOOKUP_GROUPS`]; a short XMP name may carry its schema prefix
/// (`"dc.title"`).
pub fn candidate_keys(namespace: Namespace, key: &str) -> Vec<String> {
    let key = key.trim();
    if key.is_empty() {
        return Vec::new();
    }
    if namespace.is_qualified(key) {
        return vec![key.to_string()];
    }

    match namespace {
        Namespace::Exif => EXIF_LOOKUP_GROUPS
            .iter()
            .map(|group| format!("Exif.{group}.{key}"))
            .collect(),
        Namespace::Iptc => vec![format!("Iptc.{IPTC_DEFAULT_GROUP}.{key}")],
        Namespace::Xmp if key.contains('.') => vec![format!("Xmp.{key}")],
        Namespace::Xmp => vec![format!("Xmp.{XMP_DEFAULT_PREFIX}.{key}")],
    }
}

/// Split a qualified key into `(family, group, name)`.
pub fn split_key(key: &str) -> Option<(&str, &str, &str)> {
    let (family, rest) = key.split_once('.')?;
    let (group, name) = rest.split_once('.')?;
    if family.is_empty() || group.is_empty() || name.is_empty() {
        return None;
    }
    Some((family, group, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_exif_key_tries_image_then_photo() {
        assert_eq!(
            candidate_keys(Namespace::Exif, "FNumber"),
            vec!["Exif.Image.FNumber", "Exif.Photo.FNumber"]
        );
    }

    #[test]
    fn qualified_key_used_literally() {
        assert_eq!(
            candidate_keys(Namespace::Exif, "Exif.GPSInfo.GPSLatitude"),
            vec!["Exif.GPSInfo.GPSLatitude"]
        );
        assert_eq!(
            candidate_keys(Namespace::Xmp, "Xmp.dc.subject"),
            vec!["Xmp.dc.subject"]
        );
    }

    #[test]
    fn short_iptc_and_xmp_keys() {
        assert_eq!(
            candidate_keys(Namespace::Iptc, "Keywords"),
            vec!["Iptc.Application2.Keywords"]
        );
        assert_eq!(candidate_keys(Namespace::Xmp, "Rating"), vec!["Xmp.xmp.Rating"]);
        assert_eq!(candidate_keys(Namespace::Xmp, "dc.title"), vec!["Xmp.dc.title"]);
        assert!(candidate_keys(Namespace::Xmp, "  ").is_empty());
    }

    #[test]
    fn namespace_of_key() {
        assert_eq!(Namespace::of_key("Exif.Image.Rating"), Some(Namespace::Exif));
        assert_eq!(Namespace::of_key("xmp.dc.title"), Some(Namespace::Xmp));
        assert_eq!(Namespace::of_key("Foo.Bar.Baz"), None);
        assert_eq!(Namespace::of_key("Exif"), None);
        assert_eq!(Namespace::from_name("IPTC"), Some(Namespace::Iptc));
    }

    #[test]
    fn split_qualified_key() {
        assert_eq!(
            split_key("Xmp.crs.CropTop"),
            Some(("Xmp", "crs", "CropTop"))
        );
        assert_eq!(split_key("Exif.Image"), None);
    }
}
