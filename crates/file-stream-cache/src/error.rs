//! Error types for the file stream cache

use std::fmt;
use std::path::PathBuf;

#[derive(Debug)]
pub enum CacheError {
    Io(Box<std::io::Error>),
    NotADirectory(PathBuf),
    Metadata(Box<serde_json::Error>),
    SizeMismatch { expected: u64, actual: u64 },
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Io(err) => write!(f, "I/O error: {}", err),
            CacheError::NotADirectory(path) => {
                write!(f, "cache path {} exists but is not a directory", path.display())
            }
            CacheError::Metadata(err) => write!(f, "metadata serialization error: {}", err),
            CacheError::SizeMismatch { expected, actual } => write!(
                f,
                "stream produced {} bytes but {} were declared",
                actual, expected
            ),
        }
    }
}

impl std::error::Error for CacheError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CacheError::Io(err) => Some(err.as_ref()),
            CacheError::Metadata(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        CacheError::Io(Box::new(err))
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Metadata(Box::new(err))
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_a_directory_display() {
        let err = CacheError::NotADirectory(PathBuf::from("/tmp/cache"));
        assert_eq!(
            format!("{}", err),
            "cache path /tmp/cache exists but is not a directory"
        );
    }

    #[test]
    fn test_size_mismatch_display() {
        let err = CacheError::SizeMismatch {
            expected: 100,
            actual: 42,
        };
        assert_eq!(
            format!("{}", err),
            "stream produced 42 bytes but 100 were declared"
        );
    }

    #[test]
    fn test_io_error_has_source() {
        let err = CacheError::from(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "denied",
        ));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_error_is_debug() {
        let err = CacheError::NotADirectory(PathBuf::from("/x"));
        let debug_str = format!("{:?}", err);
        assert!(debug_str.contains("NotADirectory"));
    }
}
