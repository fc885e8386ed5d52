//! Post-render formatting.

use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

use log::{debug, warn};

use crate::config::FormatterKind;
use crate::error::{CodegenError, CodegenResult};

/// Turns rendered (already valid) Rust source into its final text.
pub trait SourceFormatter {
    fn format(&self, path: &Path, source: String) -> CodegenResult<String>;
}

/// Leaves the rendered source untouched.
pub struct Verbatim;

impl SourceFormatter for Verbatim {
    fn format(&self, _path: &Path, source: String) -> CodegenResult<String> {
        Ok(source)
    }
}

/// Pipes source through `rustfmt` on stdin.
pub struct Rustfmt {
    program: String,
    edition: &'static str,
}

impl Default for Rustfmt {
    fn default() -> Self {
        Self {
            program: std::env::var("RUSTFMT").unwrap_or_else(|_| "rustfmt".to_string()),
            edition: "2024",
        }
    }
}

impl SourceFormatter for Rustfmt {
    fn format(&self, path: &Path, source: String) -> CodegenResult<String> {
        let format_error = |message: String| CodegenError::Format {
            path: path.to_path_buf(),
            message,
        };

        let mut child = Command::new(&self.program)
            .args(["--edition", self.edition, "--emit", "stdout"])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| format_error(format!("failed to start {}: {e}", self.program)))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(source.as_bytes())
                .map_err(|e| format_error(format!("failed to write to {}: {e}", self.program)))?;
        }

        let output = child
            .wait_with_output()
            .map_err(|e| format_error(format!("{} did not finish: {e}", self.program)))?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            warn!("Rustfmt: rejected {}: {}", path.display(), stderr.trim());
            return Err(format_error(stderr.trim().to_string()));
        }

        debug!("Rustfmt: formatted {}", path.display());
        String::from_utf8(output.stdout)
            .map_err(|e| format_error(format!("non UTF-8 output: {e}")))
    }
}

pub fn formatter(kind: FormatterKind) -> Box<dyn SourceFormatter> {
    match kind {
        FormatterKind::Rustfmt => Box::new(Rustfmt::default()),
        FormatterKind::None => Box::new(Verbatim),
    }
}
