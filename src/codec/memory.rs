//! A JSON-backed codec with adjustable behavior. It lets callers exercise
//! the metadata record against read-only namespaces and codecs that
//! truncate their output.

use serde::{Deserialize, Serialize};

use super::{AccessMode, CodecError, Container, ContainerFormat, MetadataCodec, MetadataMaps, XmpContainer};
use crate::keys::Namespace;
use crate::tags::TagMap;

/// On-disk form of a [`MemoryContainer`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub exif: TagMap,
    #[serde(default)]
    pub iptc: TagMap,
    #[serde(default)]
    pub xmp: TagMap,
    #[serde(default)]
    pub thumbnail: Option<Vec<u8>>,
    /// Opaque image payload carried through writes.
    #[serde(default)]
    pub payload: Vec<u8>,
}

impl Snapshot {
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).unwrap_or_default()
    }
}

#[derive(Debug, Clone)]
pub struct MemoryCodec {
    truncate_to: Option<usize>,
    modes: [AccessMode; 3],
}

impl Default for MemoryCodec {
    fn default() -> Self {
        Self {
            truncate_to: None,
            modes: [AccessMode::ReadWrite; 3],
        }
    }
}

fn slot(namespace: Namespace) -> usize {
    match namespace {
        Namespace::Exif => 0,
        Namespace::Iptc => 1,
        Namespace::Xmp => 2,
    }
}

impl MemoryCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cut every written buffer down to `max_len` bytes.
    pub fn truncating(mut self, max_len: usize) -> Self {
        self.truncate_to = Some(max_len);
        self
    }

    pub fn with_access(mut self, namespace: Namespace, mode: AccessMode) -> Self {
        self.modes[slot(namespace)] = mode;
        self
    }
}

impl MetadataCodec for MemoryCodec {
    fn open(&self, bytes: Vec<u8>) -> Result<Box<dyn Container>, CodecError> {
        if bytes.is_empty() {
            return Err(CodecError::Unsupported("empty buffer".to_string()));
        }
        Ok(Box::new(MemoryContainer {
            bytes,
            maps: MetadataMaps::default(),
            payload: Vec::new(),
            codec: self.clone(),
            good: true,
        }))
    }

    fn create_xmp(&self) -> Box<dyn Container> {
        Box::new(XmpContainer::new(Vec::new()))
    }
}

pub struct MemoryContainer {
    bytes: Vec<u8>,
    maps: MetadataMaps,
    payload: Vec<u8>,
    codec: MemoryCodec,
    good: bool,
}

impl Container for MemoryContainer {
    fn format(&self) -> ContainerFormat {
        ContainerFormat::Memory
    }

    fn read_metadata(&mut self) -> Result<(), CodecError> {
        let snapshot: Snapshot = serde_json::from_slice(&self.bytes).map_err(|e| {
            self.good = false;
            CodecError::Malformed(format!("snapshot: {e}"))
        })?;
        self.maps = MetadataMaps {
            exif: snapshot.exif,
            iptc: snapshot.iptc,
            xmp: snapshot.xmp,
            xmp_namespaces: Vec::new(),
            thumbnail: snapshot.thumbnail,
        };
        self.payload = snapshot.payload;
        self.good = true;
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
        self.codec.modes[slot(namespace)]
    }

    fn write_metadata(&mut self) -> Result<(), CodecError> {
        let snapshot = Snapshot {
            exif: self.maps.exif.clone(),
            iptc: self.maps.iptc.clone(),
            xmp: self.maps.xmp.clone(),
            thumbnail: self.maps.thumbnail.clone(),
            payload: self.payload.clone(),
        };
        let mut bytes =
            serde_json::to_vec(&snapshot).map_err(|e| CodecError::Encode(e.to_string()))?;
        if let Some(max) = self.codec.truncate_to {
            bytes.truncate(max);
        }
        self.bytes = bytes;
        Ok(())
    }

    fn bytes(&self) -> &[u8] {
        &self.bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tags::TagValue;

    fn snapshot() -> Vec<u8> {
        let mut s = Snapshot {
            payload: vec![7; 64],
            ..Default::default()
        };
        s.exif.insert("Exif.Image.Make", TagValue::text("Leica"));
        s.to_bytes()
    }

    #[test]
    fn snapshot_round_trip() {
        let mut c = MemoryCodec::new().open(snapshot()).unwrap();
        c.read_metadata().unwrap();
        assert_eq!(c.exif().get("Exif.Image.Make"), Some(&TagValue::text("Leica")));

        c.maps_mut().xmp.insert("Xmp.xmp.Rating", TagValue::text("2"));
        c.write_metadata().unwrap();

        let mut back = MemoryCodec::new().open(c.bytes().to_vec()).unwrap();
        back.read_metadata().unwrap();
        assert_eq!(back.xmp().get("Xmp.xmp.Rating"), Some(&TagValue::text("2")));
    }

    #[test]
    fn truncating_codec_cuts_output() {
        let mut c = MemoryCodec::new().truncating(10).open(snapshot()).unwrap();
        c.read_metadata().unwrap();
        c.write_metadata().unwrap();
        assert_eq!(c.bytes().len(), 10);
    }

    #[test]
    fn invalid_json_is_malformed() {
        let mut c = MemoryCodec::new().open(b"not json".to_vec()).unwrap();
        assert!(matches!(c.read_metadata(), Err(CodecError::Malformed(_))));
        assert!(!c.good());
    }

    #[test]
    fn access_modes_are_configurable() {
        let codec = MemoryCodec::new().with_access(Namespace::Iptc, AccessMode::Read);
        let c = codec.open(snapshot()).unwrap();
        assert_eq!(c.access_mode(Namespace::Iptc), AccessMode::Read);
        assert_eq!(c.access_mode(Namespace::Exif), AccessMode::ReadWrite);
    }
}
