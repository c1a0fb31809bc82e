//! Engine error types

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Main engine error type
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Template error in {}: {}", .0.template, .0.message)]
    Template(#[from] TemplateError),

    #[error("Chart error: {0}")]
    Chart(#[from] berth_core::CoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error kind for categorizing template errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TemplateErrorKind {
    UndefinedVariable,
    UnknownFilter,
    UnknownFunction,
    SyntaxError,
    TypeError,
    InvalidOperation,
    Other,
}

/// Template error with source location
#[derive(Error, Debug, Diagnostic, Clone)]
#[error("{message}")]
#[diagnostic(code(berth::template::render))]
pub struct TemplateError {
    /// Error message
    pub message: String,

    /// Error kind
    pub kind: TemplateErrorKind,

    /// Template name, relative to the templates directory
    pub template: String,

    /// Template source code
    #[source_code]
    pub src: NamedSource<String>,

    /// Offending line
    #[label("error occurred here")]
    pub span: Option<SourceSpan>,

    /// Hint for fixing the error
    #[help]
    pub suggestion: Option<String>,
}

impl TemplateError {
    /// Create a template error from a MiniJinja error
    pub fn from_minijinja(
        err: minijinja::Error,
        template_name: &str,
        template_source: &str,
    ) -> Self {
        let kind = categorize(&err);
        let span = err
            .line()
            .and_then(|line_num| calculate_span(template_source, line_num));

        let message = err
            .to_string()
            .replace("invalid operation: ", "")
            .replace("syntax error: ", "")
            .replace("undefined value", "undefined variable");

        Self {
            message,
            kind,
            template: template_name.to_string(),
            src: NamedSource::new(template_name, template_source.to_string()),
            span,
            suggestion: suggestion_for(kind),
        }
    }

    pub fn kind(&self) -> TemplateErrorKind {
        self.kind
    }
}

fn categorize(err: &minijinja::Error) -> TemplateErrorKind {
    match err.kind() {
        minijinja::ErrorKind::UndefinedError => TemplateErrorKind::UndefinedVariable,
        minijinja::ErrorKind::UnknownFilter => TemplateErrorKind::UnknownFilter,
        minijinja::ErrorKind::UnknownFunction => TemplateErrorKind::UnknownFunction,
        minijinja::ErrorKind::SyntaxError => TemplateErrorKind::SyntaxError,
        minijinja::ErrorKind::InvalidOperation => TemplateErrorKind::InvalidOperation,
        minijinja::ErrorKind::NonPrimitive | minijinja::ErrorKind::NonKey => {
            TemplateErrorKind::TypeError
        }
        _ => TemplateErrorKind::Other,
    }
}

fn suggestion_for(kind: TemplateErrorKind) -> Option<String> {
    let hint = match kind {
        TemplateErrorKind::UndefinedVariable => {
            "check the key exists in values.yaml, the service values (project, namespace, env, images, global) or your --set overrides"
        }
        TemplateErrorKind::UnknownFilter => {
            "available filters include toyaml, tojson, b64encode, b64decode, quote, squote, nindent, indent, required, sha256, trunc"
        }
        TemplateErrorKind::UnknownFunction => "available functions include image() and fail()",
        _ => return None,
    };
    Some(hint.to_string())
}

/// Calculate the source span for a given line number
fn calculate_span(source: &str, line_num: usize) -> Option<SourceSpan> {
    let mut offset = 0;

    for (index, line) in source.lines().enumerate() {
        if index + 1 == line_num {
            return Some(SourceSpan::new(offset.into(), line.len()));
        }
        offset += line.len() + 1;
    }

    None
}

pub type Result<T> = std::result::Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_span() {
        let span = calculate_span("a: 1\nbb: {{ x }}\n", 2).unwrap();
        assert_eq!(span.offset(), 5);
        assert_eq!(span.len(), 11);
        assert!(calculate_span("a: 1", 5).is_none());
    }

    #[test]
    fn test_undefined_variable_has_help() {
        let mut env = minijinja::Environment::new();
        env.set_undefined_behavior(minijinja::UndefinedBehavior::Strict);
        let err = env.render_str("{{ nope.deeper }}", ()).unwrap_err();

        let template_error = TemplateError::from_minijinja(err, "t.yaml", "{{ nope.deeper }}");
        assert_eq!(template_error.kind(), TemplateErrorKind::UndefinedVariable);
        assert!(template_error.suggestion.is_some());
        assert_eq!(template_error.template, "t.yaml");
    }
}
