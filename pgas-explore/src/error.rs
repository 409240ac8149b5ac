#![forbid(unsafe_code)]
#![allow(unused_assignments)]

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("scenario error: {message}")]
#[diagnostic(code(pgas::scenario))]
#[allow(unused_assignments)]
pub struct ScenarioError {
    pub message: String,
}

impl ScenarioError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
