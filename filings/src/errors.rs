use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FilingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("xml error: {0}")]
    Xml(#[from] roxmltree::Error),

    #[error("xml error in {path}: {source}")]
    XmlFile {
        path: PathBuf,
        #[source]
        source: roxmltree::Error,
    },

    #[error("serde json error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("not a directory: {0}")]
    NotADirectory(PathBuf),
}

pub type Result<T> = std::result::Result<T, FilingError>;
