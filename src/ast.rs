//! The expression tree produced by the reader and consumed by the evaluator.
//!
//! [`Expr`] has exactly two variants: an [`Expr::Atom`] holding an opaque
//! text token and an [`Expr::List`] owning an ordered sequence of child
//! expressions. Numbers are not a separate kind; an atom is read as an
//! integer only when an arithmetic operator asks for one (see
//! [`Expr::as_integer`]). Equality is structural and the `Display`
//! implementation produces the canonical text form. The helpers [`atom`],
//! [`list`] and [`nil`] keep tree construction short in code and tests.

use std::fmt;

/// Type used when an atom is interpreted as a number
pub type NumberType = i64;

/// The atom returned by predicates for a true result.
/// False is always the empty list.
pub const TRUE_ATOM: &str = "true";

/// Core expression type.
///
/// Expressions are immutable values: evaluation builds new nodes out of
/// clones or slices of existing ones and never mutates a node in place.
/// The derived `PartialEq` is exactly the structural equality the language
/// needs: atoms compare by text, lists by length and pairwise elements, and
/// an atom never equals a list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// An opaque text token
    Atom(String),
    /// Zero or more child expressions, order significant
    List(Vec<Expr>),
}

impl Expr {
    /// Check if this is the empty list, the language's only false value
    pub fn is_nil(&self) -> bool {
        matches!(self, Expr::List(items) if items.is_empty())
    }

    pub fn is_atom(&self) -> bool {
        matches!(self, Expr::Atom(_))
    }

    /// Text of an atom, `None` for lists
    pub fn as_atom(&self) -> Option<&str> {
        match self {
            Expr::Atom(text) => Some(text),
            Expr::List(_) => None,
        }
    }

    /// Children of a list, `None` for atoms
    pub fn as_list(&self) -> Option<&[Expr]> {
        match self {
            Expr::List(items) => Some(items),
            Expr::Atom(_) => None,
        }
    }

    /// Interpret an atom as a base-10 integer.
    /// Lists and atoms that don't parse give `None`.
    pub fn as_integer(&self) -> Option<NumberType> {
        self.as_atom()?.parse().ok()
    }

    /// Convert a predicate outcome into `true` or the empty list
    pub fn from_bool(b: bool) -> Expr {
        if b { atom(TRUE_ATOM) } else { nil() }
    }
}

impl From<&str> for Expr {
    fn from(s: &str) -> Self {
        Expr::Atom(s.to_owned())
    }
}

impl From<String> for Expr {
    fn from(s: String) -> Self {
        Expr::Atom(s)
    }
}

impl From<NumberType> for Expr {
    fn from(n: NumberType) -> Self {
        Expr::Atom(n.to_string())
    }
}

impl<T: Into<Expr>> From<Vec<T>> for Expr {
    fn from(v: Vec<T>) -> Self {
        Expr::List(v.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Expr>, const N: usize> From<[T; N]> for Expr {
    fn from(arr: [T; N]) -> Self {
        Expr::List(arr.into_iter().map(Into::into).collect())
    }
}

/// Helper for creating atoms. Accepts `&str` and `String`.
pub fn atom<S: AsRef<str>>(text: S) -> Expr {
    Expr::Atom(text.as_ref().to_owned())
}

/// Helper for creating lists from anything convertible to expressions
pub fn list<T: Into<Expr>, I: IntoIterator<Item = T>>(items: I) -> Expr {
    Expr::List(items.into_iter().map(Into::into).collect())
}

/// The empty list
pub fn nil() -> Expr {
    Expr::List(vec![])
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Atom(text) => write!(f, "{text}"),
            Expr::List(items) => {
                write!(f, "(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        write!(f, " ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
