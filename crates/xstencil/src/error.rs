/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template compilation and execution.
//!
//! Only one condition is fatal: a command opened with the start delimiter
//! that never reaches its end delimiter. Everything else (malformed blocks,
//! unresolved references, unknown keywords) degrades locally during
//! execution and produces a best-effort output string.

use thiserror::Error;

/// Errors that can occur during template operations.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// A start delimiter with no matching end delimiter before end of input.
    #[error(
        "unterminated command: no matching `{delimiter}` for command opened at offset {offset}"
    )]
    UnterminatedCommand { delimiter: String, offset: usize },

    /// A supporting or external document failed to parse.
    #[error("malformed XML document: {0}")]
    MalformedDocument(String),

    /// I/O error (e.g. reading an external document).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;
