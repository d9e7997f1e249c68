//! Header decode: magic → container → hyperparameters, fail-fast.

use std::fs;
use std::io::Read;
use std::path::Path;

use tracing::debug;

use crate::container::resolve_magic;
use crate::hparams::hyperparameter_decoder;
use crate::types::*;

/// Decode a model header from `r`, reading the hyperparameter layout
/// registered for `hint`.
///
/// Reads the magic, the container prefix and exactly one hyperparameter
/// record. The first failure aborts the decode and is returned as is.
/// An unregistered `hint` fails before any record byte is consumed.
pub fn decode<R: Read>(r: &mut R, hint: &str) -> Result<ModelDescriptor, GGMLError> {
    let (magic, mut container) = resolve_magic(r)?;
    debug!(magic = format_args!("0x{magic:08x}"), container = container.name(), "magic read");

    container.decode(r)?;
    debug!(container = container.name(), version = ?container.version(), "container decoded");

    let decoder =
        hyperparameter_decoder(hint).ok_or_else(|| GGMLError::UnsupportedModelType(hint.into()))?;
    let hyperparameters = decoder(r)?;

    let descriptor = ModelDescriptor::new(hint, magic, container, hyperparameters);
    debug!(
        model_type = hint,
        n_vocab = descriptor.num_vocab(),
        file_type = %descriptor.file_type(),
        "hyperparameters decoded"
    );
    Ok(descriptor)
}

/// Open `path` and decode its header.
///
/// The file is read unbuffered so nothing past the header is pulled in.
pub fn decode_file(path: &Path, hint: &str) -> Result<ModelDescriptor, GGMLError> {
    let mut file = fs::File::open(path).map_err(|source| GGMLError::Io {
        stage: DecodeStage::Start,
        source,
    })?;
    let descriptor = decode(&mut file, hint)?;
    debug!(path = %path.display(), container = descriptor.container().name(), "header decoded");
    Ok(descriptor)
}

//  Binary reading primitives

pub(crate) fn read_u32(r: &mut impl Read, stage: DecodeStage) -> Result<u32, GGMLError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)
        .map_err(|e| GGMLError::from_read(stage, e))?;
    Ok(u32::from_le_bytes(buf))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::hparams::{HyperparameterRecord, LlamaHyperparameters};

    fn llama_record(ftype: u32) -> LlamaHyperparameters {
        LlamaHyperparameters {
            n_vocab: 32000,
            n_embd: 4096,
            n_mult: 256,
            n_head: 32,
            n_layer: 32,
            n_rot: 128,
            ftype,
        }
    }

    fn header(magic: u32, version: Option<u32>, record: Option<LlamaHyperparameters>) -> Vec<u8> {
        let mut out = magic.to_le_bytes().to_vec();
        if let Some(v) = version {
            out.extend_from_slice(&v.to_le_bytes());
        }
        if let Some(hp) = record {
            out.extend_from_slice(&hp.to_bytes());
        }
        out
    }

    #[test]
    fn decodes_versioned_header() {
        let bytes = header(FILE_MAGIC_GGMF, Some(1), Some(llama_record(1)));
        let descriptor = decode(&mut Cursor::new(bytes), "llama").unwrap();

        assert_eq!(descriptor.magic(), FILE_MAGIC_GGMF);
        assert_eq!(descriptor.container().name(), "ggmf");
        assert_eq!(descriptor.container().version(), Some(1));
        assert_eq!(descriptor.num_vocab(), 32000);
        assert_eq!(descriptor.file_type().label(), "F16");
        assert_eq!(
            descriptor.hyperparameters(),
            &HyperparameterRecord::Llama(llama_record(1))
        );
    }

    #[test]
    fn stops_at_end_of_record() {
        let mut bytes = header(FILE_MAGIC_GGJT, Some(3), Some(llama_record(8)));
        bytes.extend_from_slice(b"tensor data follows");
        let mut r = Cursor::new(bytes);

        decode(&mut r, "llama").unwrap();
        assert_eq!(r.position(), 8 + LlamaHyperparameters::SIZE as u64);
    }

    #[test]
    fn unknown_hint_consumes_no_record_bytes() {
        let bytes = header(FILE_MAGIC_GGJT, Some(2), Some(llama_record(2)));
        let mut r = Cursor::new(bytes);

        let err = decode(&mut r, "falcon").unwrap_err();
        assert_eq!(err.to_string(), "unsupported model type: falcon");
        assert_eq!(err.kind(), ErrorKind::Dispatch);
        assert_eq!(r.position(), 8);
    }

    #[test]
    fn truncated_record_is_an_error() {
        let mut bytes = header(FILE_MAGIC_GGML, None, Some(llama_record(2)));
        bytes.truncate(bytes.len() - 1);

        let err = decode(&mut Cursor::new(bytes), "llama").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Format);
        assert_eq!(err.stage(), DecodeStage::ContainerDecoded);
    }

    #[test]
    fn decode_file_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = decode_file(&dir.path().join("missing.bin"), "llama").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(err.stage(), DecodeStage::Start);
    }
}
