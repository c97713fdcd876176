// Errors are modelled the same way throughout the crate: a public `Error`
// struct wraps a private `ErrorKind`, and each kind carries a tiny struct that
// knows how to display itself. Callers that need to branch on the failure
// use `Error::category`, which is coarser than `ErrorKind`.
//
// `clustat_internal` still reports failures as `&'static str`. Those are
// wrapped by `Error::internal_legacy_adhoc`.

use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Error {
    kind: ErrorKind,
}

/// A coarse, public classification of an [`Error`]
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCategory {
    /// a file couldn't be read, written or didn't hold usable data
    Io,
    /// a parameter (or a combination of parameters) is invalid
    InvalidConfiguration,
    /// the requested feature is an extension point that isn't implemented
    Unimplemented,
    /// a failure reported by `clustat_internal`
    Internal,
}

/// The underlying internal error type
#[non_exhaustive]
#[derive(Debug)]
enum ErrorKind {
    /// An error that occurs while reading or writing a file
    Io(IoError),
    /// An error that occurs when a parameter is invalid
    InvalidConfiguration(InvalidConfigurationError),
    /// An error that occurs when an unimplemented extension point is reached
    Unimplemented(UnimplementedError),
    /// Wraps the stringly errors returned by `clustat_internal`
    InternalLegacyAdHoc(InternalLegacyAdHocError),
}

// define constructor methods for Error
impl Error {
    /// produce an error describing a failed file operation
    pub(crate) fn io(path: &Path, what: String) -> Self {
        Error {
            kind: ErrorKind::Io(IoError {
                path: path.to_path_buf(),
                what,
            }),
        }
    }

    /// produce an error indicating that `who` was configured incorrectly
    pub(crate) fn invalid_configuration(who: &str, what: String) -> Self {
        Error {
            kind: ErrorKind::InvalidConfiguration(InvalidConfigurationError {
                who: who.to_owned(),
                what,
            }),
        }
    }

    /// produce an error indicating that `feature` isn't implemented
    pub(crate) fn unimplemented(feature: String) -> Self {
        Error {
            kind: ErrorKind::Unimplemented(UnimplementedError { feature }),
        }
    }

    /// wraps an internal error string
    pub(crate) fn internal_legacy_adhoc(message: &'static str) -> Self {
        Error {
            kind: ErrorKind::InternalLegacyAdHoc(InternalLegacyAdHocError(message)),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self.kind {
            ErrorKind::Io(_) => ErrorCategory::Io,
            ErrorKind::InvalidConfiguration(_) => ErrorCategory::InvalidConfiguration,
            ErrorKind::Unimplemented(_) => ErrorCategory::Unimplemented,
            ErrorKind::InternalLegacyAdHoc(_) => ErrorCategory::Internal,
        }
    }
}

impl std::error::Error for Error {}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        self.kind.fmt(f)
    }
}

impl core::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match *self {
            ErrorKind::Io(ref err) => err.fmt(f),
            ErrorKind::InvalidConfiguration(ref err) => err.fmt(f),
            ErrorKind::Unimplemented(ref err) => err.fmt(f),
            ErrorKind::InternalLegacyAdHoc(ref err) => err.fmt(f),
        }
    }
}

/// An error that occurs while reading or writing a file
#[derive(Debug)]
struct IoError {
    path: PathBuf,
    what: String,
}

impl core::fmt::Display for IoError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "I/O failure for \"{}\": {}", self.path.display(), self.what)
    }
}

/// An error that occurs when a parameter is invalid
#[derive(Debug)]
struct InvalidConfigurationError {
    who: String,
    what: String,
}

impl core::fmt::Display for InvalidConfigurationError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        let who = self.who.as_str();
        let what = self.what.as_str();
        write!(f, "invalid configuration of {who}: {what}")
    }
}

/// An error that occurs when an unimplemented extension point is reached
#[derive(Debug)]
struct UnimplementedError {
    feature: String,
}

impl core::fmt::Display for UnimplementedError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        write!(f, "{} is not implemented", self.feature)
    }
}

/// A temporary type that wraps the string errors from `clustat_internal`
#[derive(Debug)]
struct InternalLegacyAdHocError(&'static str);

impl core::fmt::Display for InternalLegacyAdHocError {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_and_messages() {
        let err = Error::invalid_configuration("binning", "bin_min is negative".to_owned());
        assert_eq!(err.category(), ErrorCategory::InvalidConfiguration);
        assert_eq!(
            err.to_string(),
            "invalid configuration of binning: bin_min is negative"
        );

        let err = Error::io(Path::new("cat.txt"), "no valid rows".to_owned());
        assert_eq!(err.category(), ErrorCategory::Io);
        assert!(err.to_string().contains("cat.txt"));

        let err = Error::unimplemented("custom binning".to_owned());
        assert_eq!(err.category(), ErrorCategory::Unimplemented);

        let err = Error::internal_legacy_adhoc("ngrid must not hold 0");
        assert_eq!(err.category(), ErrorCategory::Internal);
        assert_eq!(err.to_string(), "ngrid must not hold 0");
    }
}
