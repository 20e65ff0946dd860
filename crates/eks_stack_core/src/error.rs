use thiserror::Error;

pub type Result<T> = std::result::Result<T, SynthError>;

#[derive(Error, Debug)]
pub enum SynthError {
    #[error("invalid {descriptor} descriptor: {message}")]
    InvalidDescriptor {
        descriptor: &'static str,
        message: String,
    },
    #[error("invalid manifest: {0}")]
    InvalidManifest(String),
    #[error("invalid quantity '{0}'")]
    InvalidQuantity(String),
    #[error("logical id '{0}' is already declared in this stack")]
    DuplicateLogicalId(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl SynthError {
    pub fn descriptor(descriptor: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            descriptor,
            message: message.into(),
        }
    }

    pub fn manifest(message: impl Into<String>) -> Self {
        Self::InvalidManifest(message.into())
    }
}

impl From<serde_json::Error> for SynthError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

impl From<serde_yaml::Error> for SynthError {
    fn from(error: serde_yaml::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}
