//! Canonical representation of compiled filter expressions.
//!
//! The surface parser produces a syntax-oriented tree; the [`crate::compiler`]
//! lowers it into the closed set of node kinds defined here, with operators
//! carrying their canonical CEL names (`_==_`, `_&&_`, `_+_`, ...) and the
//! standard macros already expanded into [`ComprehensionExpr`] form. The
//! sandbox validator matches exhaustively over [`Expr`], so a newly added
//! node kind cannot silently pass through unvalidated.

/// Canonical operator and function names as produced by lowering.
pub mod operators {
    /// Equality comparison.
    pub const EQUALS: &str = "_==_";
    /// Inequality comparison.
    pub const NOT_EQUALS: &str = "_!=_";
    /// Less-than comparison.
    pub const LESS: &str = "_<_";
    /// Less-than-or-equal comparison.
    pub const LESS_EQUALS: &str = "_<=_";
    /// Greater-than comparison.
    pub const GREATER: &str = "_>_";
    /// Greater-than-or-equal comparison.
    pub const GREATER_EQUALS: &str = "_>=_";
    /// Logical conjunction.
    pub const LOGICAL_AND: &str = "_&&_";
    /// Logical disjunction.
    pub const LOGICAL_OR: &str = "_||_";
    /// Logical negation.
    pub const LOGICAL_NOT: &str = "!_";
    /// Arithmetic negation.
    pub const NEGATE: &str = "-_";
    /// Addition / concatenation.
    pub const ADD: &str = "_+_";
    /// Subtraction.
    pub const SUBTRACT: &str = "_-_";
    /// Multiplication.
    pub const MULTIPLY: &str = "_*_";
    /// Division.
    pub const DIVIDE: &str = "_/_";
    /// Modulo.
    pub const MODULO: &str = "_%_";
    /// Indexing, `a[b]`.
    pub const INDEX: &str = "_[_]";
    /// Ternary conditional, `c ? a : b`.
    pub const CONDITIONAL: &str = "_?_:_";
    /// Membership test, `a in b`.
    pub const IN: &str = "@in";
    /// Internal helper emitted by the comprehension expansion.
    pub const NOT_STRICTLY_FALSE: &str = "@not_strictly_false";
}

/// Name of the accumulator variable bound by expanded comprehensions.
pub const ACCUMULATOR_VAR: &str = "__result__";

/// A literal value appearing in an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    /// Boolean literal.
    Bool(bool),
    /// Signed integer literal.
    Int(i64),
    /// Unsigned integer literal.
    UInt(u64),
    /// Floating point literal.
    Double(f64),
    /// String literal.
    String(String),
    /// Bytes literal.
    Bytes(Vec<u8>),
    /// The null literal.
    Null,
}

/// A function or operator application.
///
/// Plain calls have no `target`; member calls such as `name.startsWith('x')`
/// carry the receiver in `target`.
#[derive(Clone, Debug, PartialEq)]
pub struct CallExpr {
    /// Canonical function or operator name.
    pub function: String,
    /// Receiver expression for member calls.
    pub target: Option<Box<Expr>>,
    /// Argument expressions.
    pub args: Vec<Expr>,
}

/// Field access, `operand.field`.
#[derive(Clone, Debug, PartialEq)]
pub struct SelectExpr {
    /// The expression whose field is selected.
    pub operand: Box<Expr>,
    /// The field name.
    pub field: String,
}

/// A named-field literal, `Type{field: value}`.
#[derive(Clone, Debug, PartialEq)]
pub struct StructExpr {
    /// The declared type name.
    pub type_name: String,
    /// Field name/value pairs in source order.
    pub fields: Vec<(String, Expr)>,
}

/// A macro-expanded loop construct.
///
/// `exists`, `all`, `exists_one`, `map`, and `filter` desugar into this
/// five-part form: iterate `iter_range` binding `iter_var`, fold into
/// `accu_var` starting from `accu_init`, continue while `loop_condition`
/// holds, advance with `loop_step`, and produce `result`.
#[derive(Clone, Debug, PartialEq)]
pub struct ComprehensionExpr {
    /// The iteration variable name.
    pub iter_var: String,
    /// The expression iterated over.
    pub iter_range: Expr,
    /// The accumulator variable name.
    pub accu_var: String,
    /// The accumulator's initial value.
    pub accu_init: Expr,
    /// Loop continuation condition.
    pub loop_condition: Expr,
    /// Per-element accumulator update.
    pub loop_step: Expr,
    /// The expression producing the comprehension's value.
    pub result: Expr,
}

/// A node in the canonical expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// A literal value.
    Literal(Literal),
    /// A variable reference.
    Ident(String),
    /// Field access.
    Select(SelectExpr),
    /// Function or operator application.
    Call(CallExpr),
    /// An ordered list literal.
    List(Vec<Expr>),
    /// A key/value map literal.
    Map(Vec<(Expr, Expr)>),
    /// A named-field literal.
    Struct(StructExpr),
    /// A macro-expanded loop.
    Comprehension(Box<ComprehensionExpr>),
}

impl Expr {
    /// Build a call with no receiver.
    pub fn call(function: &str, args: Vec<Expr>) -> Self {
        Expr::Call(CallExpr {
            function: function.to_string(),
            target: None,
            args,
        })
    }

    /// Build a member call on `target`.
    pub fn member_call(function: &str, target: Expr, args: Vec<Expr>) -> Self {
        Expr::Call(CallExpr {
            function: function.to_string(),
            target: Some(Box::new(target)),
            args,
        })
    }

    /// Build an identifier reference.
    pub fn ident(name: &str) -> Self {
        Expr::Ident(name.to_string())
    }

    /// Whether this node is a list literal.
    pub fn is_list(&self) -> bool {
        matches!(self, Expr::List(_))
    }
}

/// The static type vocabulary used by the frontend's result-type inference.
///
/// `Dyn` stands for values whose type cannot be narrowed statically, which
/// includes everything reached through the dynamically-typed root variables.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ValueType {
    /// Boolean.
    Bool,
    /// Signed integer.
    Int,
    /// Unsigned integer.
    UInt,
    /// Floating point.
    Double,
    /// String.
    String,
    /// Bytes.
    Bytes,
    /// The null type.
    Null,
    /// A list of values.
    List,
    /// A key/value map.
    Map,
    /// Statically unknown.
    Dyn,
}

impl std::fmt::Display for ValueType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::UInt => "uint",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Bytes => "bytes",
            ValueType::Null => "null",
            ValueType::List => "list",
            ValueType::Map => "map",
            ValueType::Dyn => "dyn",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn call_builders() {
        let call = Expr::call(operators::EQUALS, vec![Expr::ident("x"), Expr::ident("y")]);
        match call {
            Expr::Call(c) => {
                assert_eq!(c.function, "_==_");
                assert!(c.target.is_none());
                assert_eq!(c.args.len(), 2);
            }
            _ => panic!("expected a call"),
        }
    }

    #[test]
    fn member_call_carries_target() {
        let call = Expr::member_call(
            "startsWith",
            Expr::ident("name"),
            vec![Expr::Literal(Literal::String("prod-".to_string()))],
        );
        match call {
            Expr::Call(c) => {
                assert_eq!(c.function, "startsWith");
                assert!(c.target.is_some());
            }
            _ => panic!("expected a call"),
        }
    }

    #[test]
    fn list_literal_detection() {
        assert!(Expr::List(vec![]).is_list());
        assert!(!Expr::ident("x").is_list());
    }

    #[test]
    fn value_type_display() {
        assert_eq!(ValueType::Bool.to_string(), "bool");
        assert_eq!(ValueType::Dyn.to_string(), "dyn");
    }
}
