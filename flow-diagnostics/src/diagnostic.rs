use std::fmt;

use crate::source_map::{Span, SourceMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Note,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
            Severity::Note => "note",
        };
        f.write_str(s)
    }
}

/// A single compile-time diagnostic. Spans are optional since some
/// diagnostics (e.g. link errors against the host registry) have no
/// source location.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub span: Option<Span>,
}

impl Diagnostic {
    pub fn error(message: impl Into<String>) -> Self {
        Self { severity: Severity::Error, message: message.into(), span: None }
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self { severity: Severity::Warning, message: message.into(), span: None }
    }

    pub fn with_span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn render(&self, sources: &SourceMap) -> String {
        match self.span {
            Some(span) => {
                let pos = sources.position(span.source, span.start);
                format!(
                    "{}: {}:{}: {}",
                    self.severity,
                    sources.name(span.source),
                    pos,
                    self.message
                )
            }
            None => format!("{}: {}", self.severity, self.message),
        }
    }
}

/// Collects diagnostics emitted while compiling one Flow unit. Any error
/// (as opposed to warning/note) aborts startup, per spec §7.
#[derive(Debug, Clone, Default)]
pub struct DiagnosticsReport {
    diagnostics: Vec<Diagnostic>,
}

impl DiagnosticsReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter()
    }

    pub fn len(&self) -> usize {
        self.diagnostics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    pub fn render(&self, sources: &SourceMap) -> String {
        self.diagnostics
            .iter()
            .map(|d| d.render(sources))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn extend(&mut self, other: DiagnosticsReport) {
        self.diagnostics.extend(other.diagnostics);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_has_errors_only_on_error_severity() {
        let mut report = DiagnosticsReport::new();
        report.push(Diagnostic::warning("just a warning"));
        assert!(!report.has_errors());
        report.push(Diagnostic::error("boom"));
        assert!(report.has_errors());
    }
}
