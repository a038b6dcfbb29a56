//! Error sink consumed by the compiler core.
//!
//! Diagnostic *rendering* — turning a [`Diagnostic`] into colored terminal
//! output — is an external collaborator's job (see the specification's
//! scope section). This crate only defines the structured shape of a
//! diagnostic and the [`ErrorSink`] contract: `error(node, message, hint)`
//! records the diagnostic and raises, unwinding lowering to the top-level
//! driver. There is no recovery path; a second diagnostic is never produced
//! past the first fatal error.

pub use fin_ast::Span;

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLevel {
    Error,
    Warning,
    Note,
}

impl fmt::Display for ErrorLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLevel::Error => write!(f, "error"),
            ErrorLevel::Warning => write!(f, "warning"),
            ErrorLevel::Note => write!(f, "note"),
        }
    }
}

/// A single structured diagnostic: `(node, message, hint)` plus a severity.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub level: ErrorLevel,
    pub message: String,
    pub span: Span,
    pub hint: Option<String>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} ({}:{}:{})",
            self.level, self.message, self.span.file, self.span.line, self.span.column
        )?;
        if let Some(hint) = &self.hint {
            write!(f, "\n  hint: {}", hint)?;
        }
        Ok(())
    }
}

/// The only error type lowering routines return. Every fatal diagnostic is
/// wrapped here so `?` unwinds all the way to the top-level driver — there
/// is no local recovery (§7 of the specification).
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("{0}")]
pub struct CompileError(pub Diagnostic);

pub type CompileResult<T> = Result<T, CompileError>;

/// The error handling sink the compiler core talks to. `error` always
/// returns an `Err` value — it never returns `Ok` — so call sites write
/// `return Err(self.errors.error(...))` or, more commonly,
/// `self.errors.error(...)?` is not applicable since `error` itself is the
/// terminal step; routines propagate the `CompileError` with `?` once it is
/// constructed.
pub trait ErrorSink {
    fn error(&mut self, span: &Span, message: impl Into<String>, hint: Option<&str>) -> CompileError;
    fn warn(&mut self, span: &Span, message: impl Into<String>, hint: Option<&str>);
}

/// Default in-process implementation: records every diagnostic it has ever
/// produced (errors and warnings alike) for later inspection, e.g. by
/// tests or a batch driver that wants to print a trailing warning summary.
#[derive(Debug, Default, Clone)]
pub struct DiagnosticEngine {
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().filter(|d| d.level == ErrorLevel::Warning)
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.level == ErrorLevel::Error)
    }
}

impl ErrorSink for DiagnosticEngine {
    fn error(&mut self, span: &Span, message: impl Into<String>, hint: Option<&str>) -> CompileError {
        let diag = Diagnostic {
            level: ErrorLevel::Error,
            message: message.into(),
            span: span.clone(),
            hint: hint.map(|h| h.to_string()),
        };
        self.diagnostics.push(diag.clone());
        CompileError(diag)
    }

    fn warn(&mut self, span: &Span, message: impl Into<String>, hint: Option<&str>) {
        self.diagnostics.push(Diagnostic {
            level: ErrorLevel::Warning,
            message: message.into(),
            span: span.clone(),
            hint: hint.map(|h| h.to_string()),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_recorded_and_returned() {
        let mut engine = DiagnosticEngine::new();
        let span = Span { file: "a.fin".into(), line: 3, column: 1 };
        let err = engine.error(&span, "undefined identifier 'x'", Some("did you mean 'y'?"));
        assert_eq!(engine.diagnostics.len(), 1);
        assert!(engine.has_errors());
        assert_eq!(err.0.message, "undefined identifier 'x'");
    }

    #[test]
    fn warnings_do_not_count_as_errors() {
        let mut engine = DiagnosticEngine::new();
        let span = Span::unknown();
        engine.warn(&span, "exiting global scope", None);
        assert!(!engine.has_errors());
        assert_eq!(engine.warnings().count(), 1);
    }
}
