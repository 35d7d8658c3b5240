use thiserror::Error;

#[derive(Error, Debug)]
pub enum QmError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse manifest: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Invalid manifest: {0}")]
    ManifestError(String),

    #[error("Package not declared: {0}")]
    PackageNotFound(String),

    #[error("Registry error: {0}")]
    RegistryError(String),

    #[error("Error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, QmError>;
