use std::fmt;
use std::path::PathBuf;

use crate::token::Span;

/// A single diagnostic location: which unit, and where in it.
#[derive(Debug, Clone)]
pub struct Location {
    pub unit: PathBuf,
    pub span: Span,
}

impl Location {
    pub fn new(unit: PathBuf, span: Span) -> Self {
        Location { unit, span }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.unit.display(), self.span.line, self.span.column)
    }
}

/// The five error kinds from the error handling design: IO, Lexical,
/// Syntax, Semantic, Internal. Each phase stops at the first error it
/// produces; later phases never run.
#[derive(Debug)]
pub enum CompileError {
    Io { path: PathBuf, detail: String },
    Lexical { loc: Location, detail: String },
    Syntax { loc: Location, detail: String },
    Semantic { loc: Location, detail: String },
    Internal { loc: Option<Location>, detail: String },
}

impl CompileError {
    /// Exit code per the external interface: 1 for user errors, 2 for
    /// compiler bugs.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Internal { .. } => 2,
            _ => 1,
        }
    }

    /// Render the diagnostic against the offending source line, with a
    /// caret underline at the reported column. `source` must be the text
    /// of the unit the error's location points into.
    pub fn display_with_source(&self, source: &str) -> String {
        let (loc, detail) = match self {
            CompileError::Io { path, detail } => {
                return format!("error: {}: {}", path.display(), detail);
            }
            CompileError::Lexical { loc, detail } => (loc, detail),
            CompileError::Syntax { loc, detail } => (loc, detail),
            CompileError::Semantic { loc, detail } => (loc, detail),
            CompileError::Internal { loc: Some(loc), detail } => (loc, detail),
            CompileError::Internal { loc: None, detail } => {
                return format!("internal error: {}", detail);
            }
        };

        let line_content = source
            .lines()
            .nth(loc.span.line.saturating_sub(1) as usize)
            .unwrap_or("");
        let col = loc.span.column.saturating_sub(1) as usize;
        let underline = format!("{}{}", " ".repeat(col), "^");

        format!(
            "{}: error: {}\n  {} | {}\n    {} {}",
            loc, detail, loc.span.line, line_content, "|", underline
        )
    }
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Io { path, detail } => write!(f, "{}: {}", path.display(), detail),
            CompileError::Lexical { loc, detail } => write!(f, "{}: lexical error: {}", loc, detail),
            CompileError::Syntax { loc, detail } => write!(f, "{}: syntax error: {}", loc, detail),
            CompileError::Semantic { loc, detail } => write!(f, "{}: semantic error: {}", loc, detail),
            CompileError::Internal { loc: Some(loc), detail } => {
                write!(f, "{}: internal error (compiler bug): {}", loc, detail)
            }
            CompileError::Internal { loc: None, detail } => {
                write!(f, "internal error (compiler bug): {}", detail)
            }
        }
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32, column: u32) -> Location {
        Location::new(PathBuf::from("main.jp"), Span::new(line, column))
    }

    #[test]
    fn user_errors_exit_with_code_one() {
        let err = CompileError::Syntax { loc: loc(1, 1), detail: "unexpected token".into() };
        assert_eq!(err.exit_code(), 1);
    }

    #[test]
    fn internal_errors_exit_with_code_two() {
        let err = CompileError::Internal { loc: None, detail: "malformed node".into() };
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn display_with_source_underlines_the_column() {
        let err = CompileError::Syntax { loc: loc(2, 5), detail: "expected ':'".into() };
        let source = "library Foo:\n    if x\n";
        let rendered = err.display_with_source(source);
        assert!(rendered.contains("if x"));
        assert!(rendered.contains('^'));
    }

    #[test]
    fn display_includes_unit_and_position() {
        let err = CompileError::Lexical { loc: loc(4, 9), detail: "inconsistent dedent".into() };
        let rendered = format!("{}", err);
        assert!(rendered.contains("main.jp:4:9"));
        assert!(rendered.contains("inconsistent dedent"));
    }
}
