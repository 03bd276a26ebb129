use crate::ast::{Expr, nil};
use crate::builtinops::{self, ArithOp, Builtin, is_special_form_name};
use crate::reader::read;
use crate::{Error, MAX_EVAL_DEPTH, clean_source};
use log::{debug, trace, warn};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::io::Write;
use std::rc::Rc;

/// Number of elements an operation accepts, head included
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == *n,
            Arity::AtLeast(n) => count >= *n,
        }
    }

    pub fn validate(&self, name: &str, count: usize) -> Result<(), Error> {
        if self.accepts(count) {
            Ok(())
        } else {
            Err(Error::arity_error(name, self, count))
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "exactly {n}"),
            Arity::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// Interpreter session settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    /// Deepest evaluation nesting before [`Error::RecursionLimitExceeded`]
    pub max_eval_depth: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            max_eval_depth: MAX_EVAL_DEPTH,
        }
    }
}

/// A function registered by `defun` or `lambda`
#[derive(Debug, Clone, PartialEq)]
pub struct UserFunction {
    pub name: String,
    pub params: Vec<Expr>,
    pub body: Expr,
}

/// What a head atom resolves to, in registry priority order
#[derive(Debug, Clone, PartialEq)]
pub enum Callable {
    User(Rc<UserFunction>),
    Arith(ArithOp),
    Builtin(Builtin),
}

/// Positional substitution in effect while evaluating: parameter atoms and
/// the argument values at the same positions
#[derive(Debug, Clone, Copy, Default)]
struct Bindings<'a> {
    locals: Option<&'a [Expr]>,
    values: Option<&'a [Expr]>,
}

impl<'a> Bindings<'a> {
    fn new(locals: Option<&'a [Expr]>, values: Option<&'a [Expr]>) -> Self {
        Bindings { locals, values }
    }

    fn resolve(&self, expr: &Expr) -> Option<&'a Expr> {
        let (locals, values) = (self.locals?, self.values?);
        let index = locals.iter().position(|local| local == expr)?;
        values.get(index)
    }
}

/// An interpreter session.
///
/// Owns the user-defined tier of the function registry, the counter used to
/// name anonymous functions, and the sink `println` writes to. Definitions
/// persist for the life of the session and are never removed; independent
/// sessions never see each other's definitions.
pub struct Session {
    functions: HashMap<String, Rc<UserFunction>>,
    lambda_counter: u64,
    config: SessionConfig,
    output: Box<dyn Write>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("functions", &self.user_functions())
            .field("lambda_counter", &self.lambda_counter)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Session {
    pub fn new() -> Self {
        Self::with_config(SessionConfig::default())
    }

    pub fn with_config(config: SessionConfig) -> Self {
        Session {
            functions: HashMap::new(),
            lambda_counter: 0,
            config,
            output: Box::new(std::io::stdout()),
        }
    }

    /// Send `println` output somewhere other than stdout
    pub fn with_output(mut self, output: impl Write + 'static) -> Self {
        self.output = Box::new(output);
        self
    }

    pub fn config(&self) -> SessionConfig {
        self.config
    }

    /// Resolve a name through the registry: user functions, then arithmetic
    /// operators, then builtins
    pub fn lookup(&self, name: &str) -> Option<Callable> {
        if let Some(func) = self.functions.get(name) {
            return Some(Callable::User(Rc::clone(func)));
        }
        if let Some(op) = ArithOp::from_name(name) {
            return Some(Callable::Arith(op));
        }
        Builtin::from_name(name).map(Callable::Builtin)
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Names of all user-defined functions, sorted
    pub fn user_functions(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Evaluate an expression under an optional positional substitution.
    ///
    /// `locals` are parameter atoms and `values` the arguments at the same
    /// positions. Without both, every atom evaluates to itself.
    pub fn evaluate(
        &mut self,
        expr: &Expr,
        locals: Option<&[Expr]>,
        values: Option<&[Expr]>,
    ) -> Result<Expr, Error> {
        self.eval_with_depth_tracking(expr, Bindings::new(locals, values), 0)
    }

    /// Evaluate an expression with no bindings
    pub fn eval(&mut self, expr: &Expr) -> Result<Expr, Error> {
        self.evaluate(expr, None, None)
    }

    /// Read one expression from text and evaluate it
    pub fn eval_str(&mut self, text: &str) -> Result<Expr, Error> {
        let expr = read(text)?;
        self.eval(&expr)
    }

    /// Evaluate a whole program: any number of top-level forms.
    ///
    /// The source is cleaned and wrapped in one outer list, so the forms are
    /// evaluated left to right and the result is the list of their results.
    pub fn load_program(&mut self, source: &str) -> Result<Expr, Error> {
        let wrapped = format!("({})", clean_source(source));
        self.eval_str(&wrapped)
    }

    fn eval_with_depth_tracking(
        &mut self,
        expr: &Expr,
        bindings: Bindings<'_>,
        depth: usize,
    ) -> Result<Expr, Error> {
        if depth >= self.config.max_eval_depth {
            warn!(
                "evaluation depth limit {} exceeded",
                self.config.max_eval_depth
            );
            return Err(Error::RecursionLimitExceeded {
                limit: self.config.max_eval_depth,
            });
        }

        match expr {
            Expr::Atom(_) => Ok(bindings.resolve(expr).unwrap_or(expr).clone()),
            Expr::List(items) => self.eval_list(items, bindings, depth),
        }
    }

    /// Evaluate a list node: evaluate its elements unless the head names a
    /// special form, then dispatch on the head if it names a function.
    /// A list whose head names nothing is data and is returned as is.
    fn eval_list(
        &mut self,
        items: &[Expr],
        bindings: Bindings<'_>,
        depth: usize,
    ) -> Result<Expr, Error> {
        let skip = items.len() > 1
            && items
                .first()
                .and_then(Expr::as_atom)
                .is_some_and(is_special_form_name);

        let items: Cow<'_, [Expr]> = if skip {
            Cow::Borrowed(items)
        } else {
            Cow::Owned(
                items
                    .iter()
                    .map(|item| self.eval_with_depth_tracking(item, bindings, depth + 1))
                    .collect::<Result<Vec<_>, _>>()?,
            )
        };

        let callable = items
            .first()
            .and_then(Expr::as_atom)
            .and_then(|name| self.lookup(name));

        match callable {
            Some(callable) => {
                trace!("dispatching {}", items[0]);
                self.apply(callable, &items, bindings, depth)
            }
            None => Ok(Expr::List(items.into_owned())),
        }
    }

    fn apply(
        &mut self,
        callable: Callable,
        items: &[Expr],
        bindings: Bindings<'_>,
        depth: usize,
    ) -> Result<Expr, Error> {
        match callable {
            Callable::User(func) => self.call_user_function(&func, items, depth),
            Callable::Arith(op) => op.apply(items),
            Callable::Builtin(builtin) => self.apply_builtin(builtin, items, bindings, depth),
        }
    }

    fn apply_builtin(
        &mut self,
        builtin: Builtin,
        items: &[Expr],
        bindings: Bindings<'_>,
        depth: usize,
    ) -> Result<Expr, Error> {
        match builtin {
            Builtin::Quote => builtinops::builtin_quote(items),
            Builtin::Car => builtinops::builtin_car(items),
            Builtin::Cdr => builtinops::builtin_cdr(items),
            Builtin::Cons => builtinops::builtin_cons(items),
            Builtin::Equal => self.eval_equal(items, bindings, depth),
            Builtin::Atom => self.eval_atom(items, bindings, depth),
            Builtin::List => builtinops::builtin_list(items),
            Builtin::Cond => self.eval_cond(items, bindings, depth),
            Builtin::Defun => self.eval_defun(items),
            Builtin::Lambda => self.eval_lambda(items),
            Builtin::Println => self.eval_println(items, bindings, depth),
            Builtin::Eval => self.eval_eval(items, bindings, depth),
        }
    }

    /// Evaluate a user function body with its own parameters bound to the
    /// call's arguments. Whatever the caller had bound is not visible.
    ///
    /// Argument counts are not checked: surplus arguments are ignored and a
    /// parameter without an argument evaluates to its own name.
    fn call_user_function(
        &mut self,
        func: &UserFunction,
        items: &[Expr],
        depth: usize,
    ) -> Result<Expr, Error> {
        let args = &items[1..];
        let bindings = Bindings::new(Some(func.params.as_slice()), Some(args));
        self.eval_with_depth_tracking(&func.body, bindings, depth + 1)
    }

    /// `(cond (test result) ...)`: the result of the first clause whose test
    /// is not the empty list, or the empty list if none match
    fn eval_cond(
        &mut self,
        items: &[Expr],
        bindings: Bindings<'_>,
        depth: usize,
    ) -> Result<Expr, Error> {
        Builtin::Cond.arity().validate("cond", items.len())?;

        for clause in &items[1..] {
            let [test, result] = clause.as_list().unwrap_or_default() else {
                return Err(Error::TypeError(format!(
                    "cond clause must be a (test result) list, got {clause}"
                )));
            };

            if !self
                .eval_with_depth_tracking(test, bindings, depth + 1)?
                .is_nil()
            {
                return self.eval_with_depth_tracking(result, bindings, depth + 1);
            }
        }

        Ok(nil())
    }

    /// `(defun name (params...) body)`
    fn eval_defun(&mut self, items: &[Expr]) -> Result<Expr, Error> {
        match items {
            [_, Expr::Atom(name), Expr::List(params), body] => {
                self.register(name.clone(), params.clone(), body.clone());
                Ok(nil())
            }
            [_, Expr::Atom(_), other, _] => Err(Error::TypeError(format!(
                "defun parameters must be a list, got {other}"
            ))),
            [_, other, _, _] => Err(Error::TypeError(format!(
                "defun name must be an atom, got {other}"
            ))),
            _ => Err(Error::arity_error(
                "defun",
                Builtin::Defun.arity(),
                items.len(),
            )),
        }
    }

    /// `(lambda (params...) body)`: registers the function under a fresh
    /// name and returns that name
    fn eval_lambda(&mut self, items: &[Expr]) -> Result<Expr, Error> {
        match items {
            [_, Expr::List(params), body] => {
                let name = self.next_lambda_name();
                self.register(name.clone(), params.clone(), body.clone());
                Ok(Expr::Atom(name))
            }
            [_, other, _] => Err(Error::TypeError(format!(
                "lambda parameters must be a list, got {other}"
            ))),
            _ => Err(Error::arity_error(
                "lambda",
                Builtin::Lambda.arity(),
                items.len(),
            )),
        }
    }

    /// `(equal a b)`: both arguments are evaluated again before comparing,
    /// and list elements are compared pairwise by the same rule
    fn eval_equal(
        &mut self,
        items: &[Expr],
        bindings: Bindings<'_>,
        depth: usize,
    ) -> Result<Expr, Error> {
        match items {
            [_, left, right] => {
                let equal = self.values_equal(left, right, bindings, depth + 1)?;
                Ok(Expr::from_bool(equal))
            }
            _ => Err(Error::arity_error(
                "equal",
                Builtin::Equal.arity(),
                items.len(),
            )),
        }
    }

    fn values_equal(
        &mut self,
        left: &Expr,
        right: &Expr,
        bindings: Bindings<'_>,
        depth: usize,
    ) -> Result<bool, Error> {
        let left = self.eval_with_depth_tracking(left, bindings, depth)?;
        let right = self.eval_with_depth_tracking(right, bindings, depth)?;

        match (&left, &right) {
            (Expr::Atom(a), Expr::Atom(b)) => Ok(a == b),
            (Expr::List(a), Expr::List(b)) if a.len() == b.len() => {
                for (x, y) in a.iter().zip(b) {
                    if !self.values_equal(x, y, bindings, depth + 1)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// `(atom x)`: `x` is evaluated again before the test
    fn eval_atom(
        &mut self,
        items: &[Expr],
        bindings: Bindings<'_>,
        depth: usize,
    ) -> Result<Expr, Error> {
        match items {
            [_, value] => {
                let value = self.eval_with_depth_tracking(value, bindings, depth + 1)?;
                Ok(Expr::from_bool(value.is_atom()))
            }
            _ => Err(Error::arity_error("atom", Builtin::Atom.arity(), items.len())),
        }
    }

    /// `(println x extra...)`: prints `x` evaluated once more
    fn eval_println(
        &mut self,
        items: &[Expr],
        bindings: Bindings<'_>,
        depth: usize,
    ) -> Result<Expr, Error> {
        Builtin::Println
            .arity()
            .validate("println", items.len())?;

        let value = self.eval_with_depth_tracking(&items[1], bindings, depth + 1)?;
        writeln!(self.output, "{value}").map_err(|e| Error::OutputError(e.to_string()))?;
        Ok(nil())
    }

    /// `(eval expr extra...)`: `expr` was already evaluated once as an
    /// ordinary argument and is evaluated again here
    fn eval_eval(
        &mut self,
        items: &[Expr],
        bindings: Bindings<'_>,
        depth: usize,
    ) -> Result<Expr, Error> {
        Builtin::Eval.arity().validate("eval", items.len())?;
        self.eval_with_depth_tracking(&items[1], bindings, depth + 1)
    }

    fn next_lambda_name(&mut self) -> String {
        let name = format!("lambda${}", self.lambda_counter);
        self.lambda_counter += 1;
        debug!("issued anonymous function name {name}");
        name
    }

    fn register(&mut self, name: String, params: Vec<Expr>, body: Expr) {
        debug!(
            "registering function {name} with {} parameter(s)",
            params.len()
        );
        let func = UserFunction {
            name: name.clone(),
            params,
            body,
        };
        self.functions.insert(name, Rc::new(func));
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::ast::{atom, list};
    use std::cell::RefCell;
    use std::collections::HashSet;

    /// Expected outcome of evaluating one line
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Expr),            // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
    }
    use TestResult::*;

    /// Test cases that run in order in one shared session
    struct TestSession(Vec<(&'static str, TestResult)>);

    fn success<T: Into<Expr>>(value: T) -> TestResult {
        EvalResult(value.into())
    }

    fn success_nil() -> TestResult {
        EvalResult(nil())
    }

    /// Execute a single test case with detailed error reporting
    fn execute_test_case(input: &str, expected: &TestResult, session: &mut Session, test_id: &str) {
        match (session.eval_str(input), expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                assert_eq!(
                    actual, *expected_val,
                    "{test_id}: '{input}' expected {expected_val}, got {actual}"
                );
            }
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!("{test_id}: '{input}' expected error containing '{expected_text}', got {actual}");
            }
            (Err(err), EvalResult(expected_val)) => {
                panic!("{test_id}: '{input}' expected {expected_val}, got error {err:?}");
            }
        }
    }

    /// Run each case in a fresh session
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let mut session = Session::new();
            execute_test_case(input, expected, &mut session, &format!("#{}", i + 1));
        }
    }

    /// Run groups of cases, each group sharing one session
    fn run_tests_in_sessions(sessions: Vec<TestSession>) {
        for (session_idx, TestSession(test_cases)) in sessions.iter().enumerate() {
            let mut session = Session::new();
            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Session #{} test #{}", session_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &mut session, &test_id);
            }
        }
    }

    /// Shared buffer so tests can inspect `println` output after handing the
    /// writer to a session
    #[derive(Clone, Default)]
    struct SharedOutput(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedOutput {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedOutput {
        fn contents(&self) -> String {
            String::from_utf8(self.0.borrow().clone()).unwrap()
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", success("42")),
            ("foo", success("foo")),
            ("()", success_nil()),
            // Lists whose head names nothing are data
            ("(1 2 3)", success(list(["1", "2", "3"]))),
            ("(a b c)", success(list(["a", "b", "c"]))),
            ("(a (+ 1 2))", success(list(["a", "3"]))),
            ("((+ 1 1) (+ 2 2))", success(list(["2", "4"]))),
            // === QUOTE ===
            ("(quote A)", success("A")),
            ("(quote (+ 1 2))", success(list(["+", "1", "2"]))),
            ("(quote ())", success_nil()),
            ("(quote a b)", SpecificError("ArityError")),
            // === ARITHMETIC ===
            ("(+ 1 2 3)", success("6")),
            ("(- 10 1 2)", success("7")),
            ("(* 2 3 4)", success("24")),
            ("(/ 20 2 5)", success("2")),
            ("(+ (* 2 3) (- 8 2))", success("12")),
            ("(+ 1 x)", success_nil()),
            ("(/ 5 0)", success_nil()),
            ("(+ 1 (quote (2)))", success_nil()),
            ("(+ 1)", SpecificError("ArityError")),
            // === LIST OPERATIONS ===
            ("(car (quote (a b c)))", success("a")),
            ("(cdr (quote (a b c)))", success(list(["b", "c"]))),
            ("(cdr (quote (a)))", success_nil()),
            ("(cons (quote a) (quote (b c)))", success(list(["a", "b", "c"]))),
            ("(cons 1 ())", success(list(["1"]))),
            ("(car (cdr (quote (a b c))))", success("b")),
            ("(car (quote ()))", SpecificError("TypeError")),
            ("(car a)", SpecificError("TypeError")),
            ("(cdr a)", SpecificError("TypeError")),
            ("(cons a b)", SpecificError("TypeError")),
            ("(car)", SpecificError("ArityError")),
            ("(list a (quote (b c)) d)", success(list(["a", "b", "c", "d"]))),
            ("(list (+ 1 2) (quote ((x))))", success(list([atom("3"), list(["x"])]))),
            ("(list)", SpecificError("ArityError")),
            // === PREDICATES ===
            ("(atom (quote A))", success("true")),
            ("(atom (quote (A)))", success_nil()),
            ("(atom 7)", success("true")),
            (
                "(equal (quote (1 2 (3))) (quote (1 2 (3))))",
                success("true"),
            ),
            ("(equal (quote (1 2 (3))) (quote (1 2 (4))))", success_nil()),
            ("(equal (quote (1 2 (3))) (quote (1 2 3)))", success_nil()),
            ("(equal a a)", success("true")),
            ("(equal a b)", success_nil()),
            ("(equal (+ 1 1) 2)", success("true")),
            ("(equal a)", SpecificError("ArityError")),
            // equal and atom evaluate their operands once more after the
            // eager pass, and equal does so again for each element pair
            ("(atom (quote (quote x)))", success("true")),
            ("(equal (quote (quote a)) (quote a))", success("true")),
            ("(equal (quote ((quote (quote c)))) (quote (c)))", success("true")),
            ("(equal (quote (car a)) b)", SpecificError("TypeError")),
            // === COND ===
            (
                "(cond ((atom (quote A)) (quote B)) ((quote true) (quote C)))",
                success("B"),
            ),
            (
                "(cond ((atom (quote (A))) (quote B)) ((quote true) (quote C)))",
                success("C"),
            ),
            ("(cond ((quote ()) (quote B)))", success_nil()),
            // Only the chosen branch is evaluated
            ("(cond (true (quote ok)) (true (car a)))", success("ok")),
            ("(cond (() (car a)) (x (quote ok)))", success("ok")),
            ("(cond (a b c))", SpecificError("TypeError")),
            ("(cond a)", SpecificError("TypeError")),
            ("(cond)", SpecificError("ArityError")),
            // === EVAL ===
            // The argument is evaluated as an argument and then again by eval
            ("(eval (quote (+ 1 2)) ignored)", success("3")),
            ("(eval (quote (quote (quote x))) ignored)", success(list(["quote", "x"]))),
            ("(eval (quote (+ 1 2)))", SpecificError("ArityError")),
            // === PRINTLN ===
            ("(println (quote (a b)))", success_nil()),
            ("(println)", SpecificError("ArityError")),
            // === DEFUN / LAMBDA ERRORS ===
            ("(defun (f) (x) x)", SpecificError("TypeError")),
            ("(defun f x x)", SpecificError("TypeError")),
            ("(defun f (x))", SpecificError("ArityError")),
            ("(lambda x x)", SpecificError("TypeError")),
            ("(lambda (x))", SpecificError("ArityError")),
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    fn test_user_functions_in_sessions() {
        let sessions = vec![
            TestSession(vec![
                ("(defun double (x) (+ x x))", success_nil()),
                ("(double 5)", success("10")),
                ("(double (double 3))", success("12")),
                // Surplus arguments are ignored
                ("(double 1 2)", success("2")),
                // A parameter without an argument stays its own name
                ("(double)", success_nil()),
                ("(defun pick-first (a b) a)", success_nil()),
                ("(pick-first 1)", success("1")),
                ("(defun pick-second (a b) b)", success_nil()),
                ("(pick-second 1)", success("b")),
            ]),
            TestSession(vec![
                // Recursion through cond
                (
                    "(defun len (l) (cond ((equal l ()) 0) (true (+ 1 (len (cdr l))))))",
                    success_nil(),
                ),
                ("(len (quote (a b c d)))", success("4")),
                (
                    "(defun last (l) (cond ((equal (cdr l) ()) (car l)) (true (last (cdr l)))))",
                    success_nil(),
                ),
                ("(last (quote (a b c)))", success("c")),
                (
                    "(defun fact (n) (cond ((equal n 0) 1) (true (* n (fact (- n 1))))))",
                    success_nil(),
                ),
                ("(fact 5)", success("120")),
            ]),
            TestSession(vec![
                // Parameters shadow nothing outside the body
                ("(defun first (l) (car l))", success_nil()),
                ("(first (quote (x y)))", success("x")),
                ("l", success("l")),
                // A user definition shadows a builtin of the same name
                ("(defun car (l) (quote shadowed))", success_nil()),
                ("(car (quote (a b)))", success("shadowed")),
                // and an operator
                ("(defun + (a b) (quote plus))", success_nil()),
                ("(+ 1 2)", success("plus")),
            ]),
            TestSession(vec![
                // Anonymous functions are named by a per-session counter
                ("(lambda (x) (+ x 1))", success("lambda$0")),
                ("(lambda (x) (+ x 1))", success("lambda$1")),
                ("(lambda$0 41)", success("42")),
                ("((lambda (a b) (cons a b)) x (y))", success(list(["x", "y"]))),
                // Passed around by name, a lambda is called through the
                // evaluated head
                ("(defun apply1 (f v) (f v))", success_nil()),
                ("(apply1 lambda$1 9)", success("10")),
                ("(apply1 (lambda (x) (* x x)) 7)", success("49")),
            ]),
            TestSession(vec![
                // No closures: a nested function does not see its caller's parameters
                ("(defun inner () (+ x 1))", success_nil()),
                ("(defun outer (x) (inner))", success_nil()),
                ("(outer 5)", success_nil()),
            ]),
        ];

        run_tests_in_sessions(sessions);
    }

    #[test]
    fn test_evaluate_with_bindings() {
        let mut session = Session::new();
        let locals = [atom("x"), atom("y")];
        let values = [atom("1"), list(["a", "b"])];

        let cases = vec![
            ("x", atom("1")),
            ("y", list(["a", "b"])),
            ("z", atom("z")),
            ("(+ x 41)", atom("42")),
            ("(car y)", atom("a")),
            ("(quote x)", atom("x")),
            ("(x y)", list([atom("1"), list(["a", "b"])])),
        ];
        for (i, (input, expected)) in cases.into_iter().enumerate() {
            let expr = read(input).unwrap();
            let got = session
                .evaluate(&expr, Some(&locals[..]), Some(&values[..]))
                .unwrap();
            assert_eq!(got, expected, "binding case #{} '{input}'", i + 1);
        }

        // Locals without values bind nothing
        let expr = read("x").unwrap();
        assert_eq!(session.evaluate(&expr, Some(&locals[..]), None).unwrap(), atom("x"));
    }

    #[test]
    fn test_sessions_are_independent() {
        let mut first = Session::new();
        let mut second = Session::new();

        first.eval_str("(defun f (x) x)").unwrap();
        assert!(first.is_defined("f"));
        assert!(!second.is_defined("f"));
        assert_eq!(second.eval_str("(f 1)").unwrap(), list(["f", "1"]));

        // Lambda counters are per session too
        assert_eq!(first.eval_str("(lambda (x) x)").unwrap(), atom("lambda$0"));
        assert_eq!(second.eval_str("(lambda (x) x)").unwrap(), atom("lambda$0"));
    }

    #[test]
    fn test_lambda_names_are_unique() {
        let mut session = Session::new();
        let names: Vec<Expr> = (0..50)
            .map(|_| session.eval_str("(lambda (x) x)").unwrap())
            .collect();
        let unique: HashSet<&Expr> = names.iter().collect();
        assert_eq!(unique.len(), names.len());
        assert_eq!(session.user_functions().len(), 50);
    }

    #[test]
    fn test_lookup_priority() {
        let mut session = Session::new();
        assert_eq!(session.lookup("+"), Some(Callable::Arith(ArithOp::Add)));
        assert_eq!(session.lookup("car"), Some(Callable::Builtin(Builtin::Car)));
        assert_eq!(session.lookup("nothing"), None);

        session.eval_str("(defun car (x) x)").unwrap();
        assert!(matches!(session.lookup("car"), Some(Callable::User(f)) if f.name == "car"));
        assert_eq!(session.user_functions(), vec!["car"]);
    }

    #[test]
    fn test_println_output() {
        let output = SharedOutput::default();
        let mut session = Session::new().with_output(output.clone());

        session.eval_str("(println (quote (a b)))").unwrap();
        session.eval_str("(println (+ 1 2) ignored)").unwrap();
        session.eval_str("(defun show (x) (println x))").unwrap();
        session.eval_str("(show hello)").unwrap();
        // The argument is evaluated again before printing
        session.eval_str("(println (quote (quote x)))").unwrap();

        assert_eq!(output.contents(), "(a b)\n3\nhello\nx\n");
    }

    #[test]
    fn test_recursion_limit() {
        let mut session = Session::with_config(SessionConfig { max_eval_depth: 32 });
        session.eval_str("(defun loop (x) (loop x))").unwrap();
        assert_eq!(
            session.eval_str("(loop 1)").unwrap_err(),
            Error::RecursionLimitExceeded { limit: 32 }
        );

        // The session survives and keeps its definitions
        assert!(session.is_defined("loop"));
        assert_eq!(session.eval_str("(+ 1 1)").unwrap(), atom("2"));

        let deep = format!("{}x{}", "(".repeat(40), ")".repeat(40));
        assert!(matches!(
            session.eval_str(&deep),
            Err(Error::RecursionLimitExceeded { .. })
        ));
    }

    /// Run a test body on a thread whose stack fits a raised depth limit
    fn run_with_large_stack<F>(f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let handle = std::thread::Builder::new()
            .stack_size(64 * 1024 * 1024)
            .spawn(f)
            .unwrap();
        handle.join().unwrap();
    }

    #[test]
    fn test_deep_recursion_with_raised_limit() {
        run_with_large_stack(|| {
            let elements: Vec<String> = (0..200).map(|i| i.to_string()).collect();
            let program = format!(
                "(defun len (l) (cond ((equal l ()) 0) (true (+ 1 (len (cdr l))))))\n\
                 (len (quote ({})))",
                elements.join(" ")
            );

            let mut session = Session::new();
            assert!(matches!(
                session.load_program(&program),
                Err(Error::RecursionLimitExceeded { .. })
            ));

            let mut session = Session::with_config(SessionConfig {
                max_eval_depth: 4_000,
            });
            assert_eq!(
                session.load_program(&program).unwrap(),
                list([nil(), atom("200")])
            );
        });
    }

    #[test]
    fn test_load_program() {
        let mut session = Session::new();
        let program = "(defun double (x)\n\t(+ x x))\n(double 21)\n(quote done)";
        let result = session.load_program(program).unwrap();
        assert_eq!(result, list([nil(), atom("42"), atom("done")]));
        assert!(session.is_defined("double"));
    }

    #[test]
    fn test_arity_display() {
        assert_eq!(Arity::Exact(2).to_string(), "exactly 2");
        assert_eq!(Arity::AtLeast(3).to_string(), "at least 3");
        assert!(Arity::AtLeast(3).accepts(7));
        assert!(!Arity::Exact(2).accepts(3));
    }
}
