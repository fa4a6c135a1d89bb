//! Sandboxing validator for filter expressions.
//!
//! The filter-expression language is far more expressive than a resource
//! filter needs to be: it has date/time arithmetic, type conversions, and
//! unrestricted string and number math, none of which should ever run
//! against untrusted resource data. This module strips the language down to
//! a safe subset before any expression can reach an evaluator: every
//! function and operator in a compiled expression must be on a fixed
//! allowlist, and the tree walk is bounded by a configured maximum depth so
//! a crafted deeply-nested expression cannot make validation cost scale
//! without bound.
//!
//! One narrow exception: `_+_` is accepted when at least one operand is a
//! list literal, because the `map` and `filter` macros expand into
//! accumulator-append steps built from exactly that shape. All other uses of
//! addition (string concatenation, numeric math) are rejected.

use std::collections::HashSet;
use std::fmt;

use crate::ast::{operators, Expr, ValueType};
use crate::compiler::Compiler;

/// The only operators and functions allowed in filter expressions.
const ALLOWED_OPERATORS: &[&str] = &[
    // Comparison operators
    operators::EQUALS,
    operators::NOT_EQUALS,
    operators::LESS,
    operators::LESS_EQUALS,
    operators::GREATER,
    operators::GREATER_EQUALS,
    // Logical operators
    operators::LOGICAL_AND,
    operators::LOGICAL_OR,
    operators::LOGICAL_NOT,
    // Field/index access
    operators::INDEX,
    "_._",
    // Conditional
    operators::CONDITIONAL,
    // Presence check
    "has",
    // String functions
    "contains",
    "startsWith",
    "endsWith",
    "matches",
    // Membership
    operators::IN,
    // List functions
    "exists",
    "all",
    "size",
    "map",
    "filter",
];

/// Default maximum expression recursion depth.
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Errors constructing an [`ExpressionValidator`].
///
/// A construction failure is a startup-time configuration fault, never a
/// per-document validation outcome.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidatorError {
    /// The configured maximum depth was zero.
    InvalidMaxDepth {
        /// The rejected value.
        got: usize,
    },
}

impl fmt::Display for ValidatorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidatorError::InvalidMaxDepth { got } => {
                write!(f, "maximum expression depth must be at least 1, got {got}")
            }
        }
    }
}

impl std::error::Error for ValidatorError {}

/// Validates filter expressions against the sandbox allowlist.
///
/// Holds only the compiler environment, the allowlist, and the configured
/// maximum depth, all immutable after construction; a single instance can be
/// shared freely across concurrent callers.
///
/// # Example
///
/// ```
/// use indexpolicy::ExpressionValidator;
///
/// let validator = ExpressionValidator::new(50).unwrap();
/// assert!(validator.validate("metadata.name == 'foo'").is_empty());
/// assert!(!validator.validate("10 - 5 > 0").is_empty());
/// ```
#[derive(Clone, Debug, PartialEq)]
pub struct ExpressionValidator {
    compiler: Compiler,
    allowed: HashSet<&'static str>,
    max_depth: usize,
}

impl ExpressionValidator {
    /// Create a validator with the standard environment and the given
    /// maximum recursion depth.
    pub fn new(max_depth: usize) -> Result<Self, ValidatorError> {
        if max_depth == 0 {
            return Err(ValidatorError::InvalidMaxDepth { got: max_depth });
        }
        Ok(Self {
            compiler: Compiler::new(),
            allowed: ALLOWED_OPERATORS.iter().copied().collect(),
            max_depth,
        })
    }

    /// The configured maximum recursion depth.
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// Validate a single filter expression.
    ///
    /// Returns all error messages found: at most one compile error, or at
    /// most one type error followed by at most one operator/depth error. An
    /// empty expression produces no errors; absent expressions are handled
    /// at a higher layer.
    pub fn validate(&self, expression: &str) -> Vec<String> {
        let mut errs = Vec::new();

        if expression.is_empty() {
            return errs;
        }

        let compiled = match self.compiler.compile(expression) {
            Ok(compiled) => compiled,
            Err(err) => {
                errs.push(err.to_string());
                return errs;
            }
        };

        if compiled.result_type != ValueType::Bool {
            errs.push("expression must evaluate to a boolean".to_string());
        }

        if let Some(err) = self.check_expr(&compiled.expr, 0) {
            errs.push(err);
        }

        errs
    }

    /// Walk the tree, returning the first violation found.
    ///
    /// The depth bound is checked at every node, so it fires as soon as the
    /// bound is crossed, mid-traversal.
    fn check_expr(&self, e: &Expr, depth: usize) -> Option<String> {
        if depth > self.max_depth {
            return Some("expression complexity exceeds maximum depth".to_string());
        }

        match e {
            Expr::Call(call) => {
                let name = call.function.as_str();
                // Internal names synthesized by macro expansion carry the
                // reserved '@' prefix and are always accepted.
                if !name.starts_with('@') && !self.allowed.contains(name) {
                    let is_list_concat = name == operators::ADD
                        && call.args.len() == 2
                        && (call.args[0].is_list() || call.args[1].is_list());
                    if !is_list_concat {
                        return Some(format!(
                            "operator or function '{name}' is not allowed; \
                             checks limited to basic comparison and list/map logic"
                        ));
                    }
                }
                if let Some(target) = &call.target {
                    if let Some(err) = self.check_expr(target, depth + 1) {
                        return Some(err);
                    }
                }
                for arg in &call.args {
                    if let Some(err) = self.check_expr(arg, depth + 1) {
                        return Some(err);
                    }
                }
                None
            }
            Expr::Select(select) => self.check_expr(&select.operand, depth + 1),
            Expr::List(elements) => elements
                .iter()
                .find_map(|element| self.check_expr(element, depth + 1)),
            Expr::Map(entries) => entries.iter().find_map(|(key, value)| {
                self.check_expr(key, depth + 1)
                    .or_else(|| self.check_expr(value, depth + 1))
            }),
            Expr::Struct(s) => s
                .fields
                .iter()
                .find_map(|(_, value)| self.check_expr(value, depth + 1)),
            Expr::Comprehension(comp) => self
                .check_expr(&comp.iter_range, depth + 1)
                .or_else(|| self.check_expr(&comp.accu_init, depth + 1))
                .or_else(|| self.check_expr(&comp.loop_condition, depth + 1))
                .or_else(|| self.check_expr(&comp.loop_step, depth + 1))
                .or_else(|| self.check_expr(&comp.result, depth + 1)),
            Expr::Ident(_) | Expr::Literal(_) => None,
        }
    }
}

impl Default for ExpressionValidator {
    fn default() -> Self {
        Self {
            compiler: Compiler::new(),
            allowed: ALLOWED_OPERATORS.iter().copied().collect(),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}
