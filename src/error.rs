use thiserror::Error;

use crate::metadata::token::Token;

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
/// Signature and body decode failures are per-method and non-fatal: the caller skips the
/// method and leaves it untouched. Store errors abort only the rewrite that triggered them.
///
/// # Error Categories
///
/// ## Blob and body parsing
/// - [`Error::Malformed`] - Corrupted signature blob or method body
/// - [`Error::OutOfBounds`] - Attempted to read beyond buffer boundaries
/// - [`Error::Empty`] - Empty input provided
/// - [`Error::RecursionLimit`] - Maximum type-nesting depth exceeded
///
/// ## Metadata interaction
/// - [`Error::TypeNotFound`] - A token did not resolve to a known type
/// - [`Error::Store`] - The metadata store rejected a query or definition
///
/// ## Configuration
/// - [`Error::FileError`] - Filesystem I/O errors while reading the trace document
/// - [`Error::Json`] - Malformed trace document
/// - [`Error::Config`] - Missing or unusable environment configuration
#[derive(Error, Debug)]
pub enum Error {
    /// The signature blob or method body is damaged and could not be parsed.
    ///
    /// The error includes the source location where the malformation was
    /// detected for debugging purposes.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An out of bound access was attempted while parsing a buffer.
    ///
    /// This error occurs when trying to read data beyond the end of a
    /// signature blob or method body. It's a safety check to prevent
    /// buffer overruns during parsing.
    #[error("Out of Bound read would have occurred!")]
    OutOfBounds,

    /// Provided input was empty.
    ///
    /// This error occurs when an empty buffer is provided where a signature
    /// blob or method body was expected.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    ///
    /// Wraps standard I/O errors that can occur while reading the trace
    /// configuration document.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// The trace configuration document could not be deserialized.
    #[error("{0}")]
    Json(#[from] serde_json::Error),

    /// Required environment configuration is missing or unusable.
    #[error("Configuration - {0}")]
    Config(String),

    /// A metadata token did not resolve to a known type.
    ///
    /// The associated [`Token`] identifies which type was not found.
    #[error("Failed to find type for token - {0}")]
    TypeNotFound(Token),

    /// The metadata store rejected a query or a definition request.
    ///
    /// Covers lookup misses the store treats as hard failures as well as
    /// refused mutations (for example defining a member ref against an
    /// invalid parent).
    #[error("{0}")]
    Store(String),

    /// Recursion limit reached.
    ///
    /// To prevent stack overflow while walking nested type descriptors
    /// (arrays of generic instantiations and similar), a maximum recursion
    /// depth is enforced. This error indicates that limit was exceeded.
    ///
    /// The associated value shows the recursion limit that was reached.
    #[error("Reach the maximum recursion level allowed - {0}")]
    RecursionLimit(usize),
}
