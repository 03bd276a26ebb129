//! The fixed part of the function registry: builtins and arithmetic operators.
//!
//! Both vocabularies are closed enumerations looked up by name. The
//! evaluator consults user-defined functions first, then [`ArithOp`], then
//! [`Builtin`], so a user definition may shadow any name listed here.
//!
//! ## Functions vs Special Forms
//!
//! - **Special forms** (`quote`, `cond`, `lambda`, `defun`): the evaluator
//!   passes their invocation list through without evaluating its elements
//! - **Everything else**: every element of the invocation list, head
//!   included, is evaluated before the builtin sees it
//!
//! Every builtin receives the whole invocation list, head included, and
//! arity counts are stated the same way: `car` takes exactly 2 elements.
//!
//! Builtins that can be implemented without a session live here as plain
//! functions. `equal`, `atom`, `cond`, `defun`, `lambda`, `println` and
//! `eval` need to evaluate or register something and are implemented on
//! [`crate::evaluator::Session`]. Of those that are not special forms,
//! `equal`, `atom`, `println` and `eval` evaluate their operands a second
//! time after the usual eager pass.
//!
//! ## Empty-list results
//!
//! Malformed calls raise [`Error::ArityError`] or [`Error::TypeError`].
//! A few inputs still produce the empty list as a regular value:
//! `cdr` of a list with fewer than two elements, and arithmetic with a
//! non-integer operand or a zero divisor.

use crate::Error;
use crate::ast::{Expr, NumberType, nil};
use crate::evaluator::Arity;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Named primitive operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Builtin {
    Quote,
    Car,
    Cdr,
    Cons,
    Equal,
    Atom,
    Cond,
    Lambda,
    Defun,
    List,
    Println,
    Eval,
}

impl Builtin {
    pub const ALL: [Builtin; 12] = [
        Builtin::Quote,
        Builtin::Car,
        Builtin::Cdr,
        Builtin::Cons,
        Builtin::Equal,
        Builtin::Atom,
        Builtin::Cond,
        Builtin::Lambda,
        Builtin::Defun,
        Builtin::List,
        Builtin::Println,
        Builtin::Eval,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Quote => "quote",
            Builtin::Car => "car",
            Builtin::Cdr => "cdr",
            Builtin::Cons => "cons",
            Builtin::Equal => "equal",
            Builtin::Atom => "atom",
            Builtin::Cond => "cond",
            Builtin::Lambda => "lambda",
            Builtin::Defun => "defun",
            Builtin::List => "list",
            Builtin::Println => "println",
            Builtin::Eval => "eval",
        }
    }

    /// Element count accepted, head included
    pub fn arity(self) -> Arity {
        match self {
            Builtin::Quote | Builtin::Car | Builtin::Cdr | Builtin::Atom => Arity::Exact(2),
            Builtin::Cons | Builtin::Equal | Builtin::Lambda => Arity::Exact(3),
            Builtin::Defun => Arity::Exact(4),
            Builtin::Cond | Builtin::List | Builtin::Println => Arity::AtLeast(2),
            // Strictly more than two elements, even though only the second is used
            Builtin::Eval => Arity::AtLeast(3),
        }
    }

    /// Special forms receive their invocation list unevaluated
    pub fn is_special_form(self) -> bool {
        matches!(
            self,
            Builtin::Quote | Builtin::Cond | Builtin::Lambda | Builtin::Defun
        )
    }

    pub fn from_name(name: &str) -> Option<Builtin> {
        BUILTINS_BY_NAME.get(name).copied()
    }
}

/// Check whether a head atom names a special form
pub(crate) fn is_special_form_name(name: &str) -> bool {
    Builtin::from_name(name).is_some_and(Builtin::is_special_form)
}

/// Integer operators. Each folds its operands left to right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub const ALL: [ArithOp; 4] = [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div];

    /// Operator plus at least two operands
    pub const ARITY: Arity = Arity::AtLeast(3);

    pub fn symbol(self) -> &'static str {
        match self {
            ArithOp::Add => "+",
            ArithOp::Sub => "-",
            ArithOp::Mul => "*",
            ArithOp::Div => "/",
        }
    }

    pub fn from_name(name: &str) -> Option<ArithOp> {
        ARITH_OPS_BY_NAME.get(name).copied()
    }

    /// One fold step. `None` only for division by zero.
    fn step(self, acc: NumberType, n: NumberType) -> Option<NumberType> {
        match self {
            ArithOp::Add => Some(acc.wrapping_add(n)),
            ArithOp::Sub => Some(acc.wrapping_sub(n)),
            ArithOp::Mul => Some(acc.wrapping_mul(n)),
            ArithOp::Div => (n != 0).then(|| acc.wrapping_div(n)),
        }
    }

    /// Apply the operator to an evaluated invocation list `(op a b ...)`.
    ///
    /// Returns the empty list if any operand is not an integer atom or a
    /// divisor is zero.
    pub fn apply(self, items: &[Expr]) -> Result<Expr, Error> {
        Self::ARITY.validate(self.symbol(), items.len())?;

        let mut operands = items[1..].iter().map(Expr::as_integer);
        let Some(Some(mut acc)) = operands.next() else {
            return Ok(nil());
        };
        for operand in operands {
            let Some(n) = operand else {
                return Ok(nil());
            };
            match self.step(acc, n) {
                Some(next) => acc = next,
                None => return Ok(nil()),
            }
        }

        Ok(Expr::from(acc))
    }
}

static BUILTINS_BY_NAME: LazyLock<HashMap<&'static str, Builtin>> =
    LazyLock::new(|| Builtin::ALL.iter().map(|b| (b.name(), *b)).collect());

static ARITH_OPS_BY_NAME: LazyLock<HashMap<&'static str, ArithOp>> =
    LazyLock::new(|| ArithOp::ALL.iter().map(|op| (op.symbol(), *op)).collect());

//
// Builtin Function Implementations
//
// Each takes the full invocation list, head included.
//

pub(crate) fn builtin_quote(items: &[Expr]) -> Result<Expr, Error> {
    match items {
        [_, expr] => Ok(expr.clone()),
        _ => Err(Error::arity_error("quote", Builtin::Quote.arity(), items.len())),
    }
}

pub(crate) fn builtin_car(items: &[Expr]) -> Result<Expr, Error> {
    match items {
        [_, Expr::List(elements)] => elements
            .first()
            .cloned()
            .ok_or_else(|| Error::TypeError("car of empty list".into())),
        [_, other] => Err(Error::TypeError(format!(
            "car requires a list, got atom {other}"
        ))),
        _ => Err(Error::arity_error("car", Builtin::Car.arity(), items.len())),
    }
}

pub(crate) fn builtin_cdr(items: &[Expr]) -> Result<Expr, Error> {
    match items {
        // Fewer than two elements leaves nothing meaningful to return; the
        // empty list is the defined answer there.
        [_, Expr::List(elements)] if elements.len() < 2 => Ok(nil()),
        [_, Expr::List(elements)] => Ok(Expr::List(elements[1..].to_vec())),
        [_, other] => Err(Error::TypeError(format!(
            "cdr requires a list, got atom {other}"
        ))),
        _ => Err(Error::arity_error("cdr", Builtin::Cdr.arity(), items.len())),
    }
}

pub(crate) fn builtin_cons(items: &[Expr]) -> Result<Expr, Error> {
    match items {
        [_, head, Expr::List(tail)] => {
            let mut new_list = Vec::with_capacity(tail.len() + 1);
            new_list.push(head.clone());
            new_list.extend_from_slice(tail);
            Ok(Expr::List(new_list))
        }
        [_, _, other] => Err(Error::TypeError(format!(
            "cons requires a list as second argument, got atom {other}"
        ))),
        _ => Err(Error::arity_error("cons", Builtin::Cons.arity(), items.len())),
    }
}

/// Build one list from the arguments, splicing list arguments in one level deep
pub(crate) fn builtin_list(items: &[Expr]) -> Result<Expr, Error> {
    Builtin::List.arity().validate("list", items.len())?;

    let mut result = Vec::new();
    for item in &items[1..] {
        match item {
            Expr::Atom(_) => result.push(item.clone()),
            Expr::List(elements) => result.extend_from_slice(elements),
        }
    }
    Ok(Expr::List(result))
}
