#![forbid(unsafe_code)]

use miette::{IntoDiagnostic, SourceSpan};
use serde::Serialize;

use pgas_core::ViolationKind;
use pgas_explore::{ExplorationReport, Program};

pub const SCHEMA: &str = "pgas-check.report/v1";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SpanRange {
    pub offset: usize,
    pub len: usize,
}

impl From<SourceSpan> for SpanRange {
    fn from(s: SourceSpan) -> Self {
        Self {
            offset: s.offset(),
            len: s.len(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub schema: &'static str,
    pub scenario: String,
    pub ok: bool,
    pub paths: usize,
    pub truncated: bool,
    pub findings: Vec<FindingReport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FindingReport {
    pub kind: ViolationKind,
    pub code: &'static str,
    pub message: String,
    pub span: SpanRange,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<RelatedReport>,
    pub paths: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatedReport {
    pub message: String,
    pub span: SpanRange,
}

pub fn build(program: &Program, report: &ExplorationReport) -> CheckReport {
    let findings = report
        .distinct()
        .into_iter()
        .map(|f| FindingReport {
            kind: f.violation.kind,
            code: f.violation.kind.code(),
            message: f.violation.message.clone(),
            span: f.violation.location.into(),
            region: f
                .violation
                .region
                .map(|id| program.region_name(id).map_or_else(|| id.to_string(), str::to_string)),
            related: f
                .violation
                .related
                .iter()
                .map(|r| RelatedReport {
                    message: r.message.clone(),
                    span: r.location.into(),
                })
                .collect(),
            paths: f.paths,
        })
        .collect::<Vec<_>>();

    CheckReport {
        schema: SCHEMA,
        scenario: program.name.clone(),
        ok: findings.is_empty(),
        paths: report.paths.len(),
        truncated: report.truncated,
        findings,
    }
}

pub fn to_json(report: &CheckReport) -> miette::Result<String> {
    serde_json::to_string_pretty(report).into_diagnostic()
}
