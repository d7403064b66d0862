use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ImportError>;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("failed to decode PSD: {0}")]
    Decode(String),

    #[error("unsupported color mode {0}, only RGB documents can be imported")]
    UnsupportedColorMode(String),

    /// A section divider showed up while no group was open.
    #[error("malformed layer sections: divider at layer {index} closes no group")]
    MalformedSections { index: usize },

    #[error("malformed layer sections: group '{name}' (layer {end}) is never closed")]
    UnclosedGroup { name: String, end: usize },

    /// A visual layer was placed before any container was open.
    #[error("layer {index} reached with no open container")]
    NoContainer { index: usize },

    #[error("no group named '{0}'")]
    UnknownGroup(String),

    #[error("no group with id {0}")]
    UnknownGroupId(usize),

    #[error("no layer with index {0}")]
    UnknownLayer(usize),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("PNG encoding failed for {path}: {source}")]
    Png {
        path: PathBuf,
        #[source]
        source: png::EncodingError,
    },

    #[error("label file {path} is corrupt: {source}")]
    Labels {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ImportError {
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
