//! Container framing: magic resolution and per-format version checks.

use std::io::Read;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};
use tracing::trace;

use crate::reader::read_u32;
use crate::types::*;

/// The four historical GGML container formats.
///
/// Versioned variants hold `None` until [`ContainerVariant::decode`] has
/// read and accepted their version word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerVariant {
    /// Unversioned `ggml`.
    Ggml,
    /// `ggmf`, version 1 only.
    Ggmf { version: Option<u32> },
    /// `ggjt`, versions 1 to 3.
    Ggjt { version: Option<u32> },
    /// `ggla` LoRA adapter, version 1 only.
    Ggla { version: Option<u32> },
}

impl ContainerVariant {
    /// Look up a magic value in the container table.
    pub fn from_magic(magic: u32) -> Option<Self> {
        match magic {
            FILE_MAGIC_GGML => Some(Self::Ggml),
            FILE_MAGIC_GGMF => Some(Self::Ggmf { version: None }),
            FILE_MAGIC_GGJT => Some(Self::Ggjt { version: None }),
            FILE_MAGIC_GGLA => Some(Self::Ggla { version: None }),
            _ => None,
        }
    }

    pub fn magic(&self) -> u32 {
        match self {
            Self::Ggml => FILE_MAGIC_GGML,
            Self::Ggmf { .. } => FILE_MAGIC_GGMF,
            Self::Ggjt { .. } => FILE_MAGIC_GGJT,
            Self::Ggla { .. } => FILE_MAGIC_GGLA,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Ggml => "ggml",
            Self::Ggmf { .. } => "ggmf",
            Self::Ggjt { .. } => "ggjt",
            Self::Ggla { .. } => "ggla",
        }
    }

    /// Versions this format accepts; empty for the unversioned format.
    pub fn accepted_versions(&self) -> &'static [u32] {
        match self {
            Self::Ggml => &[],
            Self::Ggmf { .. } | Self::Ggla { .. } => &[1],
            Self::Ggjt { .. } => &[1, 2, 3],
        }
    }

    pub fn version(&self) -> Option<u32> {
        match self {
            Self::Ggml => None,
            Self::Ggmf { version } | Self::Ggjt { version } | Self::Ggla { version } => *version,
        }
    }

    /// Consume this format's prefix after the magic.
    ///
    /// Reads nothing for `ggml` and exactly four bytes otherwise.
    pub fn decode<R: Read>(&mut self, r: &mut R) -> Result<(), GGMLError> {
        let name = self.name();
        let accepted = self.accepted_versions();
        let slot = match self {
            Self::Ggml => return Ok(()),
            Self::Ggmf { version } | Self::Ggjt { version } | Self::Ggla { version } => version,
        };

        let version = read_u32(r, DecodeStage::MagicRead)?;
        if !accepted.contains(&version) {
            return Err(GGMLError::InvalidVersion {
                container: name,
                version,
            });
        }
        trace!(container = name, version, "container version accepted");
        *slot = Some(version);
        Ok(())
    }
}

impl Serialize for ContainerVariant {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("ContainerVariant", 2)?;
        s.serialize_field("name", self.name())?;
        s.serialize_field("version", &self.version())?;
        s.end()
    }
}

/// Read the leading magic word and select the matching container.
///
/// Fails without further reads when the magic is not in the table.
pub fn resolve_magic<R: Read>(r: &mut R) -> Result<(u32, ContainerVariant), GGMLError> {
    let magic = read_u32(r, DecodeStage::Start)?;
    let container = ContainerVariant::from_magic(magic).ok_or(GGMLError::InvalidMagic(magic))?;
    Ok((magic, container))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn stream(words: &[u32]) -> Cursor<Vec<u8>> {
        Cursor::new(words.iter().flat_map(|w| w.to_le_bytes()).collect())
    }

    #[test]
    fn magic_selects_named_variant() {
        let table = [
            (FILE_MAGIC_GGML, "ggml"),
            (FILE_MAGIC_GGMF, "ggmf"),
            (FILE_MAGIC_GGJT, "ggjt"),
            (FILE_MAGIC_GGLA, "ggla"),
        ];
        for (magic, name) in table {
            let mut r = stream(&[magic, 1]);
            let (read, container) = resolve_magic(&mut r).unwrap();
            assert_eq!(read, magic);
            assert_eq!(container.name(), name);
            assert_eq!(container.magic(), magic);
            assert_eq!(container.version(), None);
            assert_eq!(r.position(), 4);
        }
    }

    #[test]
    fn unknown_magic_stops_after_four_bytes() {
        let mut r = stream(&[0xdead_beef, 1, 2, 3]);
        let err = resolve_magic(&mut r).unwrap_err();
        assert!(matches!(err, GGMLError::InvalidMagic(0xdead_beef)));
        assert!(err.to_string().starts_with("invalid file magic"));
        assert_eq!(r.position(), 4);
    }

    #[test]
    fn short_magic_is_truncated() {
        let mut r = Cursor::new(vec![0x6c, 0x6d]);
        let err = resolve_magic(&mut r).unwrap_err();
        assert!(matches!(err, GGMLError::Truncated(DecodeStage::Start)));
    }

    #[test]
    fn legacy_decode_reads_nothing() {
        let mut container = ContainerVariant::Ggml;
        let mut r = stream(&[7]);
        container.decode(&mut r).unwrap();
        assert_eq!(r.position(), 0);
        assert_eq!(container.version(), None);
    }

    #[test]
    fn version_membership_per_variant() {
        let variants = [
            ContainerVariant::Ggmf { version: None },
            ContainerVariant::Ggjt { version: None },
            ContainerVariant::Ggla { version: None },
        ];
        for variant in variants {
            let accepted = variant.accepted_versions();
            let max = *accepted.iter().max().unwrap();
            for version in 0..=max + 2 {
                let mut container = variant;
                let mut r = stream(&[version, 0xffff_ffff]);
                let result = container.decode(&mut r);
                assert_eq!(r.position(), 4);
                if accepted.contains(&version) {
                    result.unwrap();
                    assert_eq!(container.version(), Some(version));
                } else {
                    match result.unwrap_err() {
                        GGMLError::InvalidVersion { container: name, version: v } => {
                            assert_eq!(name, variant.name());
                            assert_eq!(v, version);
                        }
                        other => panic!("unexpected error: {other}"),
                    }
                    assert_eq!(container.version(), None);
                }
            }
        }
    }

    #[test]
    fn missing_version_is_truncated() {
        let mut container = ContainerVariant::Ggjt { version: None };
        let mut r = Cursor::new(vec![2u8, 0]);
        let err = container.decode(&mut r).unwrap_err();
        assert!(matches!(err, GGMLError::Truncated(DecodeStage::MagicRead)));
    }
}
