//! GGML format constants, quantisation codes, the decoded descriptor and errors.

use std::fmt;
use std::io;

use serde::ser::SerializeStruct;
use serde::{Serialize, Serializer};

use crate::container::ContainerVariant;
use crate::hparams::HyperparameterRecord;

/// Magic for unversioned `ggml` files (`lmgg` on disk).
pub const FILE_MAGIC_GGML: u32 = 0x6767_6d6c;

/// Magic for versioned `ggmf` files.
pub const FILE_MAGIC_GGMF: u32 = 0x6767_6d66;

/// Magic for versioned `ggjt` files (mmap-aligned tensors).
pub const FILE_MAGIC_GGJT: u32 = 0x6767_6a74;

/// Magic for `ggla` LoRA adapter files.
pub const FILE_MAGIC_GGLA: u32 = 0x6767_6c61;

//  Quantisation file type

/// Quantisation scheme applied to the majority of a model's tensors.
///
/// Discriminants are the values persisted in model files. 5, 6 and 7
/// belonged to retired Q4 variants and are left unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[repr(i32)]
pub enum Ftype {
    F32 = 0,
    F16 = 1,
    Q4_0 = 2,
    Q4_1 = 3,
    Q4_1SomeF16 = 4,
    Q8_0 = 8,
    Q5_0 = 9,
    Q5_1 = 10,
    Q2K = 11,
    Q3K = 12,
    Q4K = 13,
    Q5K = 14,
    Q6K = 15,
    Unknown = -1,
}

impl Ftype {
    /// Resolve a raw code. Anything outside the table, the reserved gap
    /// included, becomes [`Ftype::Unknown`].
    pub fn from_code(code: i32) -> Self {
        match code {
            0 => Self::F32,
            1 => Self::F16,
            2 => Self::Q4_0,
            3 => Self::Q4_1,
            4 => Self::Q4_1SomeF16,
            8 => Self::Q8_0,
            9 => Self::Q5_0,
            10 => Self::Q5_1,
            11 => Self::Q2K,
            12 => Self::Q3K,
            13 => Self::Q4K,
            14 => Self::Q5K,
            15 => Self::Q6K,
            _ => Self::Unknown,
        }
    }

    pub fn code(self) -> i32 {
        self as i32
    }

    /// Short display label; `"U"` for the unknown sentinel.
    pub fn label(self) -> &'static str {
        match self {
            Self::F32 => "F32",
            Self::F16 => "F16",
            Self::Q4_0 => "Q4_0",
            Self::Q4_1 => "Q4_1",
            Self::Q4_1SomeF16 => "Q4_1_SOME_F16",
            Self::Q8_0 => "Q8_0",
            Self::Q5_0 => "Q5_0",
            Self::Q5_1 => "Q5_1",
            Self::Q2K => "Q2_K",
            Self::Q3K => "Q3_K",
            Self::Q4K => "Q4_K",
            Self::Q5K => "Q5_K",
            Self::Q6K => "Q6_K",
            Self::Unknown => "U",
        }
    }
}

/// Map a quantisation code to its short name. Never fails.
pub fn file_type_name(code: i32) -> &'static str {
    Ftype::from_code(code).label()
}

/// The raw `ftype` word of a hyperparameter record.
///
/// Keeps the on-disk value so unrecognised codes are still visible to
/// callers; [`FileType::ftype`] gives the typed view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileType(u32);

impl FileType {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u32 {
        self.0
    }

    /// The code reinterpreted as signed, so `0xFFFF_FFFF` is the `-1` sentinel.
    pub fn code(self) -> i32 {
        self.0 as i32
    }

    pub fn ftype(self) -> Ftype {
        Ftype::from_code(self.code())
    }

    pub fn label(self) -> &'static str {
        file_type_name(self.code())
    }
}

impl From<Ftype> for FileType {
    fn from(ft: Ftype) -> Self {
        Self(ft.code() as u32)
    }
}

impl fmt::Display for FileType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for FileType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("FileType", 2)?;
        s.serialize_field("code", &self.code())?;
        s.serialize_field("label", self.label())?;
        s.end()
    }
}

//  Descriptor

/// Fully decoded header of a GGML-family model file.
///
/// Only produced by [`crate::decode`] on complete success.
#[derive(Debug, Clone, Serialize)]
pub struct ModelDescriptor {
    model_type: String,
    magic: u32,
    container: ContainerVariant,
    hyperparameters: HyperparameterRecord,
    num_vocab: u32,
    file_type: FileType,
}

impl ModelDescriptor {
    pub(crate) fn new(
        model_type: &str,
        magic: u32,
        container: ContainerVariant,
        hyperparameters: HyperparameterRecord,
    ) -> Self {
        Self {
            model_type: model_type.to_string(),
            magic,
            container,
            num_vocab: hyperparameters.num_vocab(),
            file_type: hyperparameters.file_type(),
            hyperparameters,
        }
    }

    /// Architecture hint that produced this descriptor.
    pub fn model_type(&self) -> &str {
        &self.model_type
    }

    pub fn magic(&self) -> u32 {
        self.magic
    }

    pub fn container(&self) -> &ContainerVariant {
        &self.container
    }

    pub fn hyperparameters(&self) -> &HyperparameterRecord {
        &self.hyperparameters
    }

    pub fn num_vocab(&self) -> u32 {
        self.num_vocab
    }

    pub fn file_type(&self) -> FileType {
        self.file_type
    }
}

//  Decode stages

/// Progress of a header decode. An error reports the last stage reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DecodeStage {
    Start,
    MagicRead,
    ContainerDecoded,
    HyperparametersDecoded,
}

impl fmt::Display for DecodeStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start of file"),
            Self::MagicRead => write!(f, "file magic"),
            Self::ContainerDecoded => write!(f, "container header"),
            Self::HyperparametersDecoded => write!(f, "hyperparameters"),
        }
    }
}

//  Error

/// Coarse classification of a decode failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The underlying stream could not be read.
    Io,
    /// The bytes are not a well-formed header (bad magic, short record).
    Format,
    /// The container version is outside the accepted set.
    Version,
    /// No hyperparameter layout is registered for the hint.
    Dispatch,
}

#[derive(Debug, thiserror::Error)]
pub enum GGMLError {
    #[error("I/O error after {stage}: {source}")]
    Io {
        stage: DecodeStage,
        #[source]
        source: io::Error,
    },

    #[error("truncated header after {0}")]
    Truncated(DecodeStage),

    #[error("invalid file magic: 0x{0:08x}")]
    InvalidMagic(u32),

    #[error("invalid version {version} for {container} container")]
    InvalidVersion {
        container: &'static str,
        version: u32,
    },

    #[error("unsupported model type: {0}")]
    UnsupportedModelType(String),
}

impl GGMLError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::Io,
            Self::Truncated(_) | Self::InvalidMagic(_) => ErrorKind::Format,
            Self::InvalidVersion { .. } => ErrorKind::Version,
            Self::UnsupportedModelType(_) => ErrorKind::Dispatch,
        }
    }

    /// Last stage the decode completed before failing.
    pub fn stage(&self) -> DecodeStage {
        match self {
            Self::Io { stage, .. } | Self::Truncated(stage) => *stage,
            Self::InvalidMagic(_) | Self::InvalidVersion { .. } => DecodeStage::MagicRead,
            Self::UnsupportedModelType(_) => DecodeStage::ContainerDecoded,
        }
    }

    pub(crate) fn from_read(stage: DecodeStage, err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Self::Truncated(stage)
        } else {
            Self::Io { stage, source: err }
        }
    }
}
