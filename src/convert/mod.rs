//! Conversion dispatcher.
//!
//! Every transformation is treated as a pure function from input path(s) and
//! parameters to an output path, implemented by invoking one external tool
//! (qpdf, ghostscript, poppler, img2pdf, calibre, libreoffice) inside a
//! scratch directory. Tool failure, missing output, or empty output aborts
//! the operation before any document record is created.

pub mod ops;
pub mod tools;

pub use tools::ToolInvocation;

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("{tool} exited with status {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: i32,
        stderr: String,
    },

    /// A stuck external process must not stall the request forever.
    #[error("{tool} timed out after {seconds}s")]
    Timeout { tool: String, seconds: u64 },

    #[error("{tool} produced no output file")]
    MissingOutput { tool: String },

    #[error("{tool} produced an empty output file")]
    EmptyOutput { tool: String },

    #[error("Failed to launch {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid conversion parameters: {0}")]
    InvalidParameters(String),

    #[error("I/O error during conversion: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}
