//! Error types for code generation runs.
//!
//! Every pass of the generator returns `CodegenResult<T>`, an alias for
//! `Result<T, CodegenError>`. All variants are fatal: a run either finishes
//! and writes every output file, or fails and writes none.
//!
//! # Error Handling Example
//!
//! ```no_run
//! use netabase_codegen::{GeneratorConfig, error::CodegenError};
//!
//! let config = GeneratorConfig::builder().patterns(vec!["./models".into()]).build();
//! match netabase_codegen::generate(&config) {
//!     Ok(report) => println!("wrote {} files", report.files.len()),
//!     Err(CodegenError::NoModelsFound) => eprintln!("nothing to generate"),
//!     Err(e) => eprintln!("generation failed: {e}"),
//! }
//! ```

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for generator operations.
pub type CodegenResult<T> = Result<T, CodegenError>;

#[derive(Error, Debug)]
pub enum CodegenError {
    /// A source file could not be read or parsed.
    #[error("Load Error: {path}: {message}")]
    Load { path: PathBuf, message: String },

    /// A `Cargo.toml` could not be read or understood.
    #[error("Manifest Error: {path}: {message}")]
    Manifest { path: PathBuf, message: String },

    #[error("IO Error: {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Configuration Error: {0}")]
    Config(String),

    /// A type named in the include list never classified as a model.
    #[error("Model Not Found: '{0}' is not a model type")]
    ModelNotFound(String),

    #[error("No Models Found: the selected sources contain no model types")]
    NoModelsFound,

    #[error("Classification Error: {entity}.{field}: {reason}")]
    Classification {
        entity: String,
        field: String,
        reason: String,
    },

    #[error("Relation Resolution Error: {entity}.{field}: {reason}")]
    RelationResolution {
        entity: String,
        field: String,
        reason: String,
    },

    /// The primary field has no way to be rendered as text.
    #[error("String Capability Missing: primary field {entity}.{field} has no string codec")]
    StringCapabilityMissing { entity: String, field: String },

    #[error("Format Error: {path}: {message}")]
    Format { path: PathBuf, message: String },
}

impl CodegenError {
    pub(crate) fn load(path: impl Into<PathBuf>, message: impl std::fmt::Display) -> Self {
        Self::Load {
            path: path.into(),
            message: message.to_string(),
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn relation(
        entity: impl Into<String>,
        field: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::RelationResolution {
            entity: entity.into(),
            field: field.into(),
            reason: reason.into(),
        }
    }
}
