use std::path::PathBuf;

use syncboy_core::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid audio settings: {0}")]
    Config(#[from] ConfigError),

    #[error("scenario writes to unmapped address {addr:04X}")]
    UnmappedAddress { addr: u16 },

    #[error("failed to encode PNG: {0}")]
    Png(#[from] png::EncodingError),

    #[error("failed to write WAV: {0}")]
    Wav(#[from] hound::Error),

    #[error("audio recorder thread panicked")]
    RecorderPanicked,
}
