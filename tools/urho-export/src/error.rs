//! Pre-flight failures that stop an export before any file is written.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::source::HostVersion;

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("output path is not set")]
    MissingOutputPath,

    #[error("host version {found} is older than the minimum supported {required}")]
    UnsupportedHost {
        found: HostVersion,
        required: HostVersion,
    },

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("cannot create output root {path:?}: {source}")]
    OutputRoot {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
