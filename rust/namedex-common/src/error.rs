use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
#[error(transparent)]
pub struct Error(Box<ErrorKind>);

pub type StdErrorBoxed = Box<dyn std::error::Error + Send + Sync + 'static>;

impl Error {
    pub fn kind(&self) -> &ErrorKind {
        self.0.as_ref()
    }

    pub fn into_kind(self) -> ErrorKind {
        *self.0
    }

    /// Returns `true` if the build may continue after logging this error.
    ///
    /// Only an unrecognized names-file type is recoverable; the offending file is skipped.
    pub fn is_recoverable(&self) -> bool {
        matches!(self.kind(), ErrorKind::UnsupportedFormat { .. })
    }

    pub fn configuration(message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Configuration {
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn input_access(path: impl AsRef<Path>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::InputAccess {
                path: path.as_ref().to_path_buf(),
                source,
            }
            .into(),
        )
    }

    pub fn unsupported_format(path: impl AsRef<Path>) -> Error {
        Error(
            ErrorKind::UnsupportedFormat {
                path: path.as_ref().to_path_buf(),
            }
            .into(),
        )
    }

    pub fn malformed_record(
        path: impl AsRef<Path>,
        line: Option<u64>,
        message: impl Into<String>,
    ) -> Error {
        Error(
            ErrorKind::MalformedRecord {
                path: path.as_ref().to_path_buf(),
                line,
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn decompression(path: impl AsRef<Path>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::Decompression {
                path: path.as_ref().to_path_buf(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_format(element: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidFormat {
                element: element.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_arg(name: impl Into<String>, message: impl Into<String>) -> Error {
        Error(
            ErrorKind::InvalidArgument {
                name: name.into(),
                message: message.into(),
            }
            .into(),
        )
    }

    pub fn invalid_operation(name: impl Into<String>) -> Error {
        Error(ErrorKind::InvalidOperation { name: name.into() }.into())
    }

    pub fn io(context: impl Into<String>, source: std::io::Error) -> Error {
        Error(
            ErrorKind::Io {
                context: context.into(),
                source,
            }
            .into(),
        )
    }

    pub fn encoding<E>(context: impl Into<String>, source: E) -> Error
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(
            ErrorKind::Encoding {
                context: context.into(),
                source: Box::new(source),
            }
            .into(),
        )
    }
}

#[derive(Debug, Error)]
pub enum ErrorKind {
    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("cannot read '{}': {source}", path.display())]
    InputAccess {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("unsupported names file type: '{}'", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error(
        "malformed record in '{}'{}: {message}",
        path.display(),
        line.map(|l| format!(" at line {l}")).unwrap_or_default())]
    MalformedRecord {
        path: PathBuf,
        line: Option<u64>,
        message: String,
    },

    #[error("failed to decompress '{}': {message}", path.display())]
    Decompression { path: PathBuf, message: String },

    #[error("invalid argument {name}: {message}")]
    InvalidArgument { name: String, message: String },

    #[error("invalid operation {name}")]
    InvalidOperation { name: String },

    #[error("invalid storage format for '{element}': {message}")]
    InvalidFormat { element: String, message: String },

    #[error("IO error for '{context}': {source}'")]
    Io {
        context: String,
        source: std::io::Error,
    },

    #[error("JSON error: {source}")]
    Json { source: serde_json::Error },

    #[error("encoding error: {context}")]
    Encoding {
        context: String,
        source: StdErrorBoxed,
    },
}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Error(kind.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::io("", e)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        ErrorKind::Json { source: e }.into()
    }
}

impl From<bincode::error::EncodeError> for Error {
    fn from(e: bincode::error::EncodeError) -> Self {
        Error::encoding("bincode encode", e)
    }
}

impl From<bincode::error::DecodeError> for Error {
    fn from(e: bincode::error::DecodeError) -> Self {
        Error::encoding("bincode decode", e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recoverable_kinds() {
        assert!(Error::unsupported_format("tracks/genes/chr1/names.xml").is_recoverable());
        assert!(!Error::configuration("no reference sequences").is_recoverable());
        assert!(!Error::decompression("names.txt.gz", "bad header").is_recoverable());
    }

    #[test]
    fn test_malformed_record_message() {
        let err = Error::malformed_record("names.txt", Some(7), "expected value");
        assert_eq!(
            err.to_string(),
            "malformed record in 'names.txt' at line 7: expected value"
        );
        let err = Error::malformed_record("names.json", None, "not an array");
        assert_eq!(
            err.to_string(),
            "malformed record in 'names.json': not an array"
        );
    }
}
