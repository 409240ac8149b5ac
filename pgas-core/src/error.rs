#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("config error: {message}")]
#[diagnostic(code(pgas::config))]
#[allow(unused_assignments)]
pub struct ConfigError {
    pub message: String,
}
