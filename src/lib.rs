//! Sublisp - a minimal S-expression interpreter
//!
//! This crate reads textual S-expressions into a recursive [`Expr`] tree and
//! evaluates that tree against a small fixed library of primitive operations
//! plus functions defined at runtime with `defun` and `lambda`.
//!
//! ```text
//! (+ 1 2 3)                                  ; 6
//! (car (quote (a b c)))                      ; a
//! (cond ((atom (quote A)) (quote B)))        ; B
//! (defun double (x) (+ x x))                 ; ()
//! (double 5)                                 ; 10
//! ```
//!
//! ## Data model
//!
//! There are only two kinds of expression: atoms (opaque text tokens) and
//! lists. Numbers are atoms whose text happens to parse as a base-10 integer
//! when an arithmetic operator asks for one. Atoms evaluate to themselves
//! unless they name a parameter of the function currently being evaluated.
//!
//! ## Function calls
//!
//! Parameters are bound by positional substitution: a function body is
//! evaluated with its own parameter list and the caller's argument values,
//! and nothing else. There is no lexical environment and no closures.
//! A list whose head names no function is data and evaluates to itself.
//!
//! ## Modules
//!
//! - `ast`: the expression type, structural equality and canonical rendering
//! - `reader`: tokenizer and recursive-descent parser
//! - `builtinops`: the fixed builtin and arithmetic vocabulary
//! - `evaluator`: the interpreter session and tree-walking evaluator

use std::fmt;

/// Maximum nesting accepted by the reader before it gives up with
/// [`ParseErrorKind::TooDeeplyNested`]
pub const MAX_READ_DEPTH: usize = 256;

/// Maximum evaluation depth before the evaluator fails with
/// [`Error::RecursionLimitExceeded`]
/// Kept well below what a default 2 MiB thread stack can hold
pub const MAX_EVAL_DEPTH: usize = 256;

/// Categorizes the different kinds of reader errors.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ParseErrorKind {
    /// A list was never closed, or a closing parenthesis has no opening partner
    UnbalancedParentheses,
    /// Several top-level expressions without an enclosing list
    InvalidNesting,
    /// Nesting exceeded the configured reader depth
    TooDeeplyNested,
}

/// A structured error describing why some text could not be read.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub message: String,
    /// Context snippet from the input showing where the error occurred (max 40 chars)
    pub context: Option<String>,
    /// The offending token, if there is one
    pub found: Option<String>,
}

impl ParseError {
    /// Create a ParseError with all fields
    pub fn new(
        kind: ParseErrorKind,
        message: impl Into<String>,
        context: Option<String>,
        found: Option<String>,
    ) -> Self {
        ParseError {
            kind,
            message: message.into(),
            context,
            found,
        }
    }

    /// Create a ParseError with a kind and message but no context
    pub fn from_message(kind: ParseErrorKind, message: impl Into<String>) -> Self {
        Self::new(kind, message, None, None)
    }

    /// Create a ParseError whose context is the input around a character offset
    pub fn with_context(
        kind: ParseErrorKind,
        message: impl Into<String>,
        input: &str,
        error_offset: usize,
        found: Option<String>,
    ) -> Self {
        const MAX_CONTEXT: usize = 40;

        let context_start = error_offset.saturating_sub(10);
        let context_str: String = input
            .chars()
            .skip(context_start)
            .take(MAX_CONTEXT)
            .collect();

        let mut display_context = String::new();
        if context_start > 0 {
            display_context.push_str("[...]");
        }
        display_context.push_str(&context_str);
        if context_start + context_str.chars().count() < input.chars().count() {
            display_context.push_str("[...]");
        }

        Self::new(kind, message, Some(display_context), found)
    }
}

/// Error types for the interpreter
#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    ParseError(ParseError),
    /// A builtin or operator got the wrong number of elements.
    /// Counts include the head of the invocation list.
    ArityError {
        name: String,
        expected: String,
        got: usize,
    },
    TypeError(String),
    RecursionLimitExceeded {
        limit: usize,
    },
    /// Writing `println` output failed
    OutputError(String),
}

impl Error {
    pub fn arity_error(name: impl Into<String>, expected: impl fmt::Display, got: usize) -> Self {
        Error::ArityError {
            name: name.into(),
            expected: expected.to_string(),
            got,
        }
    }
}

impl From<ParseError> for Error {
    fn from(e: ParseError) -> Self {
        Error::ParseError(e)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::ParseError(e) => {
                write!(f, "ParseError: {}", e.message)?;
                if let Some(found) = &e.found {
                    write!(f, "\nFound: {found}")?;
                }
                if let Some(context) = &e.context {
                    write!(f, "\nContext: {context}")?;
                }
                Ok(())
            }
            Error::ArityError {
                name,
                expected,
                got,
            } => write!(
                f,
                "ArityError: {name} expects {expected} elements including the head, got {got}"
            ),
            Error::TypeError(msg) => write!(f, "TypeError: {msg}"),
            Error::RecursionLimitExceeded { limit } => {
                write!(f, "RecursionLimitExceeded: evaluation deeper than {limit}")
            }
            Error::OutputError(msg) => write!(f, "OutputError: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

pub mod ast;
pub mod builtinops;
pub mod evaluator;
pub mod reader;

pub use ast::Expr;
pub use evaluator::{Session, SessionConfig};
pub use reader::{ReadConfig, read, read_with_config};

/// Render an expression in its canonical text form.
///
/// Atoms render as their text; lists as their elements separated by single
/// spaces inside parentheses. The empty list renders as `()`.
pub fn render(expr: &Expr) -> String {
    expr.to_string()
}

/// Prepare raw source text for the reader: newlines become spaces and tabs
/// are dropped, since the reader only treats a space as a separator.
pub fn clean_source(text: &str) -> String {
    text.replace("\r\n", " ")
        .replace(['\n', '\r'], " ")
        .replace('\t', "")
}
