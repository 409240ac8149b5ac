#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("symbolic expression error: {message}")]
#[diagnostic(code(pgas::sym))]
#[allow(unused_assignments)]
pub struct SymError {
    pub message: String,
}

impl SymError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
