use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Phase {
    Parse,
    Metadata,
    Schema,
    Link,
    Graph,
    Emit,
    Finish,
    Config,
    Internal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DiagnosticCode {
    OPG0001ParseError,
    OPG0100MetadataError,
    OPG0110SchemaParseError,
    OPG0200LinkArityMismatch,
    OPG0300InvalidGraph,
    OPG0310UnknownParameter,
    OPG0400FirstParameterNotTensor,
    OPG0410MultipleOutputsUnsupported,
    OPG0420AliasWithoutInPlaceParameter,
    OPG0500UnconsumedMapping,
    OPG0600InvalidMappingFile,
    OPG0901InternalBug,
}

impl DiagnosticCode {
    pub fn code_str(self) -> &'static str {
        match self {
            DiagnosticCode::OPG0001ParseError => "OPG0001",
            DiagnosticCode::OPG0100MetadataError => "OPG0100",
            DiagnosticCode::OPG0110SchemaParseError => "OPG0110",
            DiagnosticCode::OPG0200LinkArityMismatch => "OPG0200",
            DiagnosticCode::OPG0300InvalidGraph => "OPG0300",
            DiagnosticCode::OPG0310UnknownParameter => "OPG0310",
            DiagnosticCode::OPG0400FirstParameterNotTensor => "OPG0400",
            DiagnosticCode::OPG0410MultipleOutputsUnsupported => "OPG0410",
            DiagnosticCode::OPG0420AliasWithoutInPlaceParameter => "OPG0420",
            DiagnosticCode::OPG0500UnconsumedMapping => "OPG0500",
            DiagnosticCode::OPG0600InvalidMappingFile => "OPG0600",
            DiagnosticCode::OPG0901InternalBug => "OPG0901",
        }
    }

    pub fn phase(self) -> Phase {
        match self {
            DiagnosticCode::OPG0001ParseError => Phase::Parse,
            DiagnosticCode::OPG0100MetadataError => Phase::Metadata,
            DiagnosticCode::OPG0110SchemaParseError => Phase::Schema,
            DiagnosticCode::OPG0200LinkArityMismatch => Phase::Link,
            DiagnosticCode::OPG0300InvalidGraph => Phase::Graph,
            DiagnosticCode::OPG0310UnknownParameter
            | DiagnosticCode::OPG0400FirstParameterNotTensor
            | DiagnosticCode::OPG0410MultipleOutputsUnsupported
            | DiagnosticCode::OPG0420AliasWithoutInPlaceParameter => Phase::Emit,
            DiagnosticCode::OPG0500UnconsumedMapping => Phase::Finish,
            DiagnosticCode::OPG0600InvalidMappingFile => Phase::Config,
            DiagnosticCode::OPG0901InternalBug => Phase::Internal,
        }
    }

    pub fn default_message(self) -> &'static str {
        match self {
            DiagnosticCode::OPG0001ParseError => "failed to parse host declarations",
            DiagnosticCode::OPG0100MetadataError => "malformed operator metadata",
            DiagnosticCode::OPG0110SchemaParseError => "failed to parse operator schema",
            DiagnosticCode::OPG0200LinkArityMismatch => {
                "host parameters do not line up with schema parameters"
            }
            DiagnosticCode::OPG0300InvalidGraph => "op graph references an undeclared node",
            DiagnosticCode::OPG0310UnknownParameter => "op input names an unknown parameter",
            DiagnosticCode::OPG0400FirstParameterNotTensor => "first parameter must be a Tensor",
            DiagnosticCode::OPG0410MultipleOutputsUnsupported => "multiple outputs not supported",
            DiagnosticCode::OPG0420AliasWithoutInPlaceParameter => {
                "return type has alias info but no associated parameter"
            }
            DiagnosticCode::OPG0500UnconsumedMapping => {
                "operator(s) could not be found for mapping"
            }
            DiagnosticCode::OPG0600InvalidMappingFile => "invalid mapping file",
            DiagnosticCode::OPG0901InternalBug => "internal opgen bug",
        }
    }

    pub fn default_help(self) -> Option<&'static str> {
        match self {
            DiagnosticCode::OPG0100MetadataError => Some(
                "The trailing comment must be a JSON object with string keys schema, dispatch and default.",
            ),
            DiagnosticCode::OPG0420AliasWithoutInPlaceParameter => Some(
                "Route the aliased parameter through an op input, or map the out-of-place overload instead.",
            ),
            DiagnosticCode::OPG0500UnconsumedMapping => Some(
                "Check the mapped names against the schema names attached to the host declarations.",
            ),
            DiagnosticCode::OPG0901InternalBug => {
                Some("This is a bug in opgen. Please report it with the input files.")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: DiagnosticCode,
    pub phase: Phase,
    pub severity: Severity,
    pub message: String,
    pub help: Option<String>,
    /// Names the diagnostic is about (e.g. every unconsumed operator).
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub related: Vec<String>,
}

impl Diagnostic {
    pub fn error(code: DiagnosticCode, message: impl Into<String>) -> Self {
        Diagnostic {
            code,
            phase: code.phase(),
            severity: Severity::Error,
            message: message.into(),
            help: code.default_help().map(|s| s.to_string()),
            related: Vec::new(),
        }
    }

    pub fn with_related(mut self, related: Vec<String>) -> Self {
        self.related = related;
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} {:?}: {}",
            self.code.code_str(),
            self.phase,
            self.severity,
            self.message
        )?;
        if let Some(help) = &self.help {
            write!(f, "\n  help: {help}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostic {}

/// Shorthand for `Err(Diagnostic::error(..).into())`.
pub(crate) fn fail<T>(code: DiagnosticCode, message: impl Into<String>) -> anyhow::Result<T> {
    Err(Diagnostic::error(code, message).into())
}

/// Returns the diagnostic carried by `err`, if any.
pub fn diagnostic_of(err: &anyhow::Error) -> Option<&Diagnostic> {
    err.chain().find_map(|e| e.downcast_ref::<Diagnostic>())
}

pub fn render_diagnostics_md() -> String {
    let mut rows: Vec<(String, Phase, Severity, String, String)> = Vec::new();
    for code in all_codes() {
        rows.push((
            code.code_str().to_string(),
            code.phase(),
            Severity::Error,
            code.default_message().to_string(),
            code.default_help().unwrap_or("").to_string(),
        ));
    }
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut out = String::new();
    out.push_str("# opgen diagnostics catalog\n\n");
    out.push_str("This document is generated from `crates/opgen-core/src/diagnostics.rs`.\n\n");
    out.push_str("| Code | Phase | Severity | Message | Help |\n");
    out.push_str("| ---- | ----- | -------- | ------- | ---- |\n");
    for (code, phase, sev, msg, help) in rows {
        out.push_str(&format!(
            "| {code} | {phase:?} | {sev:?} | {msg} | {help} |\n"
        ));
    }
    out
}

fn all_codes() -> &'static [DiagnosticCode] {
    &[
        DiagnosticCode::OPG0001ParseError,
        DiagnosticCode::OPG0100MetadataError,
        DiagnosticCode::OPG0110SchemaParseError,
        DiagnosticCode::OPG0200LinkArityMismatch,
        DiagnosticCode::OPG0300InvalidGraph,
        DiagnosticCode::OPG0310UnknownParameter,
        DiagnosticCode::OPG0400FirstParameterNotTensor,
        DiagnosticCode::OPG0410MultipleOutputsUnsupported,
        DiagnosticCode::OPG0420AliasWithoutInPlaceParameter,
        DiagnosticCode::OPG0500UnconsumedMapping,
        DiagnosticCode::OPG0600InvalidMappingFile,
        DiagnosticCode::OPG0901InternalBug,
    ]
}
