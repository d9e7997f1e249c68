//! Pure-Rust decoder for legacy GGML model headers.
//!
//! Recognises the four pre-GGUF container formats (`ggml`, `ggmf`,
//! `ggjt`, `ggla`), validates the container version and reads the
//! architecture's hyperparameter record, producing a [`ModelDescriptor`]
//! that backends use to pick a loader and quantisation path.
//!
//! Decoding never reads past the header, so the same stream can be handed
//! to a weight loader afterwards.

pub mod container;
pub mod hparams;
pub mod reader;
pub mod types;

pub use container::{ContainerVariant, resolve_magic};
pub use hparams::{
    HyperparameterDecoder, HyperparameterRecord, LlamaHyperparameters, hyperparameter_decoder,
    registered_model_types,
};
pub use reader::{decode, decode_file};
pub use types::{
    DecodeStage, ErrorKind, FILE_MAGIC_GGJT, FILE_MAGIC_GGLA, FILE_MAGIC_GGMF, FILE_MAGIC_GGML,
    FileType, Ftype, GGMLError, ModelDescriptor, file_type_name,
};
