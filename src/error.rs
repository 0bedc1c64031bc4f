use thiserror::Error;

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// The engine favours graceful degradation: self-reference, runaway nesting and partially
/// malformed generic input are resolved internally and never surface as errors. What remains
/// are violations of a caller contract that can be detected right at the call boundary.
///
/// # Error Categories
///
/// ## Contract Violations
/// - [`Error::InvalidCacheKey`] - A non-positive key was handed to a [`crate::metadata::interner::CacheMap`]
/// - [`Error::TypeError`] - A builder was driven into an impossible state
/// - [`Error::Malformed`] - Structurally inconsistent graph input
///
/// ## Lookup Errors
/// - [`Error::TypeNotFound`] - A namespace lookup that the caller required to succeed came back empty
///
/// # Examples
///
/// ```rust
/// use cilgraph::{metadata::interner::CacheMap, Error};
///
/// let mut cache: CacheMap<&str> = CacheMap::new();
/// match cache.set(0, "zero") {
///     Err(Error::InvalidCacheKey(key)) => assert_eq!(key, 0),
///     _ => unreachable!(),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The graph is inconsistent and could not be processed.
    ///
    /// The error includes the source location where the malformation was detected for
    /// debugging purposes.
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A cache key was not strictly positive.
    ///
    /// Key `0` marks empty slots and key `-1` marks tombstones inside the open-addressing
    /// tables, so neither can be used by callers.
    #[error("Cache keys must be greater than zero - got {0}")]
    InvalidCacheKey(i32),

    /// General error during type construction.
    ///
    /// Raised by [`crate::metadata::typesystem::TypeBuilder`] when an operation needs a
    /// current type and none was started, or when an argument does not fit the operation.
    #[error("{0}")]
    TypeError(String),

    /// A type required by the caller could not be resolved.
    ///
    /// The associated value is the `Namespace.Name` that was looked up.
    #[error("Failed to resolve type - {0}")]
    TypeNotFound(String),
}
