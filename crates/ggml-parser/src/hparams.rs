//! Architecture-specific hyperparameter records and the hint registry.
//!
//! Each supported architecture contributes one [`HyperparameterRecord`]
//! variant and one registry entry. The orchestrator only ever talks to
//! [`hyperparameter_decoder`].

use std::io::Read;

use serde::Serialize;

use crate::types::*;

/// Decodes one architecture's record from the bytes after the container.
pub type HyperparameterDecoder = fn(&mut dyn Read) -> Result<HyperparameterRecord, GGMLError>;

const REGISTRY: &[(&str, HyperparameterDecoder)] = &[("llama", LlamaHyperparameters::decode)];

/// Find the record decoder registered for `hint`.
pub fn hyperparameter_decoder(hint: &str) -> Option<HyperparameterDecoder> {
    REGISTRY
        .iter()
        .find(|(name, _)| *name == hint)
        .map(|(_, decoder)| *decoder)
}

/// Architecture names with a registered record layout.
pub fn registered_model_types() -> impl Iterator<Item = &'static str> {
    REGISTRY.iter().map(|(name, _)| *name)
}

/// Hyperparameters of a decoded model, one variant per architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "architecture", rename_all = "snake_case")]
pub enum HyperparameterRecord {
    Llama(LlamaHyperparameters),
}

impl HyperparameterRecord {
    pub fn num_vocab(&self) -> u32 {
        match self {
            Self::Llama(hp) => hp.n_vocab,
        }
    }

    pub fn file_type(&self) -> FileType {
        match self {
            Self::Llama(hp) => FileType::new(hp.ftype),
        }
    }
}

/// The llama record: seven little-endian `u32` words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LlamaHyperparameters {
    pub n_vocab: u32,
    pub n_embd: u32,
    pub n_mult: u32,
    pub n_head: u32,
    pub n_layer: u32,
    pub n_rot: u32,
    pub ftype: u32,
}

impl LlamaHyperparameters {
    /// Size of the record on disk.
    pub const SIZE: usize = 7 * 4;

    /// Read the whole record in one go; a short read is an error.
    pub fn decode(r: &mut dyn Read) -> Result<HyperparameterRecord, GGMLError> {
        let mut buf = [0u8; Self::SIZE];
        r.read_exact(&mut buf)
            .map_err(|e| GGMLError::from_read(DecodeStage::ContainerDecoded, e))?;

        let mut words = buf
            .chunks_exact(4)
            .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]));
        let mut next = || words.next().unwrap_or_default();

        Ok(HyperparameterRecord::Llama(Self {
            n_vocab: next(),
            n_embd: next(),
            n_mult: next(),
            n_head: next(),
            n_layer: next(),
            n_rot: next(),
            ftype: next(),
        }))
    }

    /// Serialize back to the on-disk layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let words = [
            self.n_vocab,
            self.n_embd,
            self.n_mult,
            self.n_head,
            self.n_layer,
            self.n_rot,
            self.ftype,
        ];
        let mut out = [0u8; Self::SIZE];
        for (chunk, word) in out.chunks_exact_mut(4).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn sample() -> LlamaHyperparameters {
        LlamaHyperparameters {
            n_vocab: 32000,
            n_embd: 4096,
            n_mult: 256,
            n_head: 32,
            n_layer: 32,
            n_rot: 128,
            ftype: 2,
        }
    }

    #[test]
    fn llama_is_registered() {
        assert!(hyperparameter_decoder("llama").is_some());
        assert!(hyperparameter_decoder("gpt2").is_none());
        assert!(hyperparameter_decoder("LLAMA").is_none());
        assert_eq!(registered_model_types().collect::<Vec<_>>(), ["llama"]);
    }

    #[test]
    fn llama_record_fields_in_order() {
        let mut bytes = sample().to_bytes().to_vec();
        bytes.extend_from_slice(&[0xAA; 8]);
        let mut r = Cursor::new(bytes);

        let record = LlamaHyperparameters::decode(&mut r).unwrap();
        assert_eq!(r.position(), LlamaHyperparameters::SIZE as u64);
        assert_eq!(record, HyperparameterRecord::Llama(sample()));
        assert_eq!(record.num_vocab(), 32000);
        assert_eq!(record.file_type().label(), "Q4_0");
    }

    #[test]
    fn short_llama_record_fails() {
        let bytes = sample().to_bytes();
        let mut r = Cursor::new(bytes[..20].to_vec());
        let err = LlamaHyperparameters::decode(&mut r).unwrap_err();
        assert!(matches!(
            err,
            GGMLError::Truncated(DecodeStage::ContainerDecoded)
        ));
    }
}
