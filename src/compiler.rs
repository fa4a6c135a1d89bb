//! Frontend for the filter-expression language.
//!
//! Parsing is delegated to the external `cel-parser` crate. This module
//! lowers the surface tree into the canonical [`Expr`] form: operators get
//! their canonical names, the standard macros (`exists`, `all`,
//! `exists_one`, `map`, `filter`, `has`) are expanded, and the static result
//! type is inferred against the three declared root variables (`metadata`,
//! `spec`, `status`, all dynamically typed). The sandbox validator consumes
//! the output; it never sees surface syntax.

use std::fmt;

use cel_parser::{ArithmeticOp, Atom, Expression, Member, RelationOp, UnaryOp};

use crate::ast::{
    operators, CallExpr, ComprehensionExpr, Expr, Literal, SelectExpr, StructExpr, ValueType,
    ACCUMULATOR_VAR,
};

/// Errors produced while compiling an expression.
#[derive(Clone, Debug, PartialEq)]
pub enum CompileError {
    /// The source text failed to parse; carries the parser's message.
    Syntax(String),
    /// A root identifier other than the declared variables was referenced.
    UndeclaredReference(String),
    /// A macro's iteration variable was not a simple identifier.
    MacroArgument {
        /// The macro whose call was malformed.
        name: String,
    },
    /// `has()` was applied to something other than a field selection.
    InvalidHasArgument,
    /// The call target could not be resolved to a function name.
    UnsupportedCall,
}

impl fmt::Display for CompileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CompileError::Syntax(message) => write!(f, "{message}"),
            CompileError::UndeclaredReference(name) => {
                write!(f, "undeclared reference to '{name}'")
            }
            CompileError::MacroArgument { name } => {
                write!(f, "{name}() argument must be a simple name")
            }
            CompileError::InvalidHasArgument => write!(f, "invalid argument to has() macro"),
            CompileError::UnsupportedCall => write!(f, "unsupported function call expression"),
        }
    }
}

impl std::error::Error for CompileError {}

/// A successfully compiled expression: the canonical tree plus its static
/// result type.
#[derive(Clone, Debug, PartialEq)]
pub struct CompiledExpression {
    /// The lowered, macro-expanded tree.
    pub expr: Expr,
    /// The inferred static result type.
    pub result_type: ValueType,
}

/// Compiles filter-expression source text into [`CompiledExpression`]s.
///
/// Holds the declared root variables; immutable after construction and safe
/// to share across threads.
#[derive(Clone, Debug, PartialEq)]
pub struct Compiler {
    variables: Vec<(String, ValueType)>,
}

impl Compiler {
    /// A compiler with the standard root variables: `metadata`, `spec`, and
    /// `status`, each dynamically typed.
    pub fn new() -> Self {
        Self::with_variables(vec![
            ("metadata".to_string(), ValueType::Dyn),
            ("spec".to_string(), ValueType::Dyn),
            ("status".to_string(), ValueType::Dyn),
        ])
    }

    /// A compiler with an explicit set of root variable declarations.
    pub fn with_variables(variables: Vec<(String, ValueType)>) -> Self {
        Self { variables }
    }

    /// Compile `source` to a canonical tree and its static result type.
    pub fn compile(&self, source: &str) -> Result<CompiledExpression, CompileError> {
        let parsed =
            cel_parser::parse(source).map_err(|err| CompileError::Syntax(err.to_string()))?;
        let expr = lower(&parsed)?;
        let mut scope = Vec::new();
        let result_type = self.infer(&expr, &mut scope)?;
        Ok(CompiledExpression { expr, result_type })
    }

    fn lookup(&self, name: &str, scope: &[(String, ValueType)]) -> Option<ValueType> {
        scope
            .iter()
            .rev()
            .chain(self.variables.iter())
            .find(|(n, _)| n == name)
            .map(|(_, ty)| *ty)
    }

    fn infer(
        &self,
        e: &Expr,
        scope: &mut Vec<(String, ValueType)>,
    ) -> Result<ValueType, CompileError> {
        match e {
            Expr::Literal(literal) => Ok(match literal {
                Literal::Bool(_) => ValueType::Bool,
                Literal::Int(_) => ValueType::Int,
                Literal::UInt(_) => ValueType::UInt,
                Literal::Double(_) => ValueType::Double,
                Literal::String(_) => ValueType::String,
                Literal::Bytes(_) => ValueType::Bytes,
                Literal::Null => ValueType::Null,
            }),
            Expr::Ident(name) => self
                .lookup(name, scope)
                .ok_or_else(|| CompileError::UndeclaredReference(name.clone())),
            Expr::Select(select) => {
                self.infer(&select.operand, scope)?;
                Ok(ValueType::Dyn)
            }
            Expr::Call(call) => self.infer_call(call, scope),
            Expr::List(elements) => {
                for element in elements {
                    self.infer(element, scope)?;
                }
                Ok(ValueType::List)
            }
            Expr::Map(entries) => {
                for (key, value) in entries {
                    self.infer(key, scope)?;
                    self.infer(value, scope)?;
                }
                Ok(ValueType::Map)
            }
            Expr::Struct(s) => {
                for (_, value) in &s.fields {
                    self.infer(value, scope)?;
                }
                Ok(ValueType::Dyn)
            }
            Expr::Comprehension(comp) => {
                self.infer(&comp.iter_range, scope)?;
                let accu_type = self.infer(&comp.accu_init, scope)?;
                scope.push((comp.iter_var.clone(), ValueType::Dyn));
                scope.push((comp.accu_var.clone(), accu_type));
                self.infer(&comp.loop_condition, scope)?;
                self.infer(&comp.loop_step, scope)?;
                let result_type = self.infer(&comp.result, scope)?;
                scope.pop();
                scope.pop();
                Ok(result_type)
            }
        }
    }

    fn infer_call(
        &self,
        call: &CallExpr,
        scope: &mut Vec<(String, ValueType)>,
    ) -> Result<ValueType, CompileError> {
        if let Some(target) = &call.target {
            self.infer(target, scope)?;
        }
        let mut arg_types = Vec::with_capacity(call.args.len());
        for arg in &call.args {
            arg_types.push(self.infer(arg, scope)?);
        }
        Ok(match call.function.as_str() {
            operators::EQUALS
            | operators::NOT_EQUALS
            | operators::LESS
            | operators::LESS_EQUALS
            | operators::GREATER
            | operators::GREATER_EQUALS
            | operators::LOGICAL_AND
            | operators::LOGICAL_OR
            | operators::LOGICAL_NOT
            | operators::IN
            | operators::NOT_STRICTLY_FALSE => ValueType::Bool,
            "has" | "contains" | "startsWith" | "endsWith" | "matches" => ValueType::Bool,
            "size" => ValueType::Int,
            operators::CONDITIONAL => match arg_types.as_slice() {
                [_, left, right] => unify(*left, *right),
                _ => ValueType::Dyn,
            },
            operators::INDEX => ValueType::Dyn,
            operators::NEGATE => arg_types.first().copied().unwrap_or(ValueType::Dyn),
            operators::ADD
            | operators::SUBTRACT
            | operators::MULTIPLY
            | operators::DIVIDE
            | operators::MODULO => match arg_types.as_slice() {
                [left, right] => unify(*left, *right),
                _ => ValueType::Dyn,
            },
            _ => ValueType::Dyn,
        })
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}

fn unify(left: ValueType, right: ValueType) -> ValueType {
    if left == right {
        left
    } else {
        ValueType::Dyn
    }
}

fn lower(e: &Expression) -> Result<Expr, CompileError> {
    match e {
        Expression::Atom(atom) => Ok(Expr::Literal(lower_atom(atom))),
        Expression::Ident(name) => Ok(Expr::Ident(name.to_string())),
        Expression::And(left, right) => Ok(Expr::call(
            operators::LOGICAL_AND,
            vec![lower(left)?, lower(right)?],
        )),
        Expression::Or(left, right) => Ok(Expr::call(
            operators::LOGICAL_OR,
            vec![lower(left)?, lower(right)?],
        )),
        Expression::Unary(op, operand) => {
            let operand = lower(operand)?;
            Ok(match op {
                UnaryOp::Not => Expr::call(operators::LOGICAL_NOT, vec![operand]),
                UnaryOp::DoubleNot => Expr::call(
                    operators::LOGICAL_NOT,
                    vec![Expr::call(operators::LOGICAL_NOT, vec![operand])],
                ),
                UnaryOp::Minus => Expr::call(operators::NEGATE, vec![operand]),
                UnaryOp::DoubleMinus => Expr::call(
                    operators::NEGATE,
                    vec![Expr::call(operators::NEGATE, vec![operand])],
                ),
            })
        }
        Expression::Relation(left, op, right) => {
            let name = match op {
                RelationOp::Equals => operators::EQUALS,
                RelationOp::NotEquals => operators::NOT_EQUALS,
                RelationOp::LessThan => operators::LESS,
                RelationOp::LessThanEq => operators::LESS_EQUALS,
                RelationOp::GreaterThan => operators::GREATER,
                RelationOp::GreaterThanEq => operators::GREATER_EQUALS,
                RelationOp::In => operators::IN,
            };
            Ok(Expr::call(name, vec![lower(left)?, lower(right)?]))
        }
        Expression::Arithmetic(left, op, right) => {
            let name = match op {
                ArithmeticOp::Add => operators::ADD,
                ArithmeticOp::Subtract => operators::SUBTRACT,
                ArithmeticOp::Multiply => operators::MULTIPLY,
                ArithmeticOp::Divide => operators::DIVIDE,
                ArithmeticOp::Modulus => operators::MODULO,
            };
            Ok(Expr::call(name, vec![lower(left)?, lower(right)?]))
        }
        Expression::Ternary(condition, truthy, falsy) => Ok(Expr::call(
            operators::CONDITIONAL,
            vec![lower(condition)?, lower(truthy)?, lower(falsy)?],
        )),
        Expression::Member(operand, member) => match member.as_ref() {
            Member::Attribute(field) => Ok(Expr::Select(SelectExpr {
                operand: Box::new(lower(operand)?),
                field: field.to_string(),
            })),
            Member::Index(index) => Ok(Expr::call(
                operators::INDEX,
                vec![lower(operand)?, lower(index)?],
            )),
            Member::Fields(fields) => {
                let mut lowered = Vec::with_capacity(fields.len());
                for (name, value) in fields {
                    lowered.push((name.to_string(), lower(value)?));
                }
                Ok(Expr::Struct(StructExpr {
                    type_name: type_name_of(operand),
                    fields: lowered,
                }))
            }
        },
        Expression::FunctionCall(function, target, args) => {
            lower_call(function, target.as_deref(), args)
        }
        Expression::List(elements) => {
            let mut lowered = Vec::with_capacity(elements.len());
            for element in elements {
                lowered.push(lower(element)?);
            }
            Ok(Expr::List(lowered))
        }
        Expression::Map(entries) => {
            let mut lowered = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                lowered.push((lower(key)?, lower(value)?));
            }
            Ok(Expr::Map(lowered))
        }
    }
}

fn lower_atom(atom: &Atom) -> Literal {
    match atom {
        Atom::Int(v) => Literal::Int(*v),
        Atom::UInt(v) => Literal::UInt(*v),
        Atom::Float(v) => Literal::Double(*v),
        Atom::String(v) => Literal::String(v.to_string()),
        Atom::Bytes(v) => Literal::Bytes(v.as_ref().clone()),
        Atom::Bool(v) => Literal::Bool(*v),
        Atom::Null => Literal::Null,
    }
}

fn lower_call(
    function: &Expression,
    target: Option<&Expression>,
    args: &[Expression],
) -> Result<Expr, CompileError> {
    let name = match function {
        Expression::Ident(name) => name.to_string(),
        _ => return Err(CompileError::UnsupportedCall),
    };
    match target {
        None => {
            if name == "has" {
                if args.len() != 1 {
                    return Err(CompileError::InvalidHasArgument);
                }
                let arg = lower(&args[0])?;
                if !matches!(arg, Expr::Select(_)) {
                    return Err(CompileError::InvalidHasArgument);
                }
                return Ok(Expr::call("has", vec![arg]));
            }
            let mut lowered = Vec::with_capacity(args.len());
            for arg in args {
                lowered.push(lower(arg)?);
            }
            Ok(Expr::Call(CallExpr {
                function: name,
                target: None,
                args: lowered,
            }))
        }
        Some(receiver) => {
            if is_macro(&name, args.len()) {
                return expand_macro(&name, receiver, args);
            }
            let receiver = lower(receiver)?;
            let mut lowered = Vec::with_capacity(args.len());
            for arg in args {
                lowered.push(lower(arg)?);
            }
            Ok(Expr::member_call(&name, receiver, lowered))
        }
    }
}

fn is_macro(name: &str, arity: usize) -> bool {
    match name {
        "exists" | "all" | "exists_one" | "filter" => arity == 2,
        "map" => arity == 2 || arity == 3,
        _ => false,
    }
}

fn type_name_of(e: &Expression) -> String {
    match e {
        Expression::Ident(name) => name.to_string(),
        Expression::Member(operand, member) => match member.as_ref() {
            Member::Attribute(field) => format!("{}.{}", type_name_of(operand), field),
            _ => String::new(),
        },
        _ => String::new(),
    }
}

/// Expand a standard macro call into its comprehension form.
///
/// The shapes mirror the canonical expander: the accumulator variable is
/// `__result__`, quantifiers gate the loop with `@not_strictly_false`, and
/// `map`/`filter` append to the accumulator with `_+_` on a one-element list
/// literal. That last shape is why the sandbox carries the narrow
/// list-concatenation exception for `_+_`.
fn expand_macro(name: &str, receiver: &Expression, args: &[Expression]) -> Result<Expr, CompileError> {
    let iter_var = match &args[0] {
        Expression::Ident(v) => v.to_string(),
        _ => {
            return Err(CompileError::MacroArgument {
                name: name.to_string(),
            })
        }
    };
    let iter_range = lower(receiver)?;
    let accu = || Expr::ident(ACCUMULATOR_VAR);

    let comp = match name {
        "exists" => ComprehensionExpr {
            iter_var,
            iter_range,
            accu_var: ACCUMULATOR_VAR.to_string(),
            accu_init: Expr::Literal(Literal::Bool(false)),
            loop_condition: Expr::call(
                operators::NOT_STRICTLY_FALSE,
                vec![Expr::call(operators::LOGICAL_NOT, vec![accu()])],
            ),
            loop_step: Expr::call(operators::LOGICAL_OR, vec![accu(), lower(&args[1])?]),
            result: accu(),
        },
        "all" => ComprehensionExpr {
            iter_var,
            iter_range,
            accu_var: ACCUMULATOR_VAR.to_string(),
            accu_init: Expr::Literal(Literal::Bool(true)),
            loop_condition: Expr::call(operators::NOT_STRICTLY_FALSE, vec![accu()]),
            loop_step: Expr::call(operators::LOGICAL_AND, vec![accu(), lower(&args[1])?]),
            result: accu(),
        },
        "exists_one" => ComprehensionExpr {
            iter_var,
            iter_range,
            accu_var: ACCUMULATOR_VAR.to_string(),
            accu_init: Expr::Literal(Literal::Int(0)),
            loop_condition: Expr::Literal(Literal::Bool(true)),
            loop_step: Expr::call(
                operators::CONDITIONAL,
                vec![
                    lower(&args[1])?,
                    Expr::call(
                        operators::ADD,
                        vec![accu(), Expr::Literal(Literal::Int(1))],
                    ),
                    accu(),
                ],
            ),
            result: Expr::call(
                operators::EQUALS,
                vec![accu(), Expr::Literal(Literal::Int(1))],
            ),
        },
        "map" if args.len() == 2 => ComprehensionExpr {
            iter_var,
            iter_range,
            accu_var: ACCUMULATOR_VAR.to_string(),
            accu_init: Expr::List(vec![]),
            loop_condition: Expr::Literal(Literal::Bool(true)),
            loop_step: Expr::call(
                operators::ADD,
                vec![accu(), Expr::List(vec![lower(&args[1])?])],
            ),
            result: accu(),
        },
        "map" => ComprehensionExpr {
            iter_var,
            iter_range,
            accu_var: ACCUMULATOR_VAR.to_string(),
            accu_init: Expr::List(vec![]),
            loop_condition: Expr::Literal(Literal::Bool(true)),
            loop_step: Expr::call(
                operators::CONDITIONAL,
                vec![
                    lower(&args[1])?,
                    Expr::call(
                        operators::ADD,
                        vec![accu(), Expr::List(vec![lower(&args[2])?])],
                    ),
                    accu(),
                ],
            ),
            result: accu(),
        },
        "filter" => {
            let element = Expr::ident(&iter_var);
            ComprehensionExpr {
                iter_var,
                iter_range,
                accu_var: ACCUMULATOR_VAR.to_string(),
                accu_init: Expr::List(vec![]),
                loop_condition: Expr::Literal(Literal::Bool(true)),
                loop_step: Expr::call(
                    operators::CONDITIONAL,
                    vec![
                        lower(&args[1])?,
                        Expr::call(operators::ADD, vec![accu(), Expr::List(vec![element])]),
                        accu(),
                    ],
                ),
                result: accu(),
            }
        }
        _ => return Err(CompileError::UnsupportedCall),
    };
    Ok(Expr::Comprehension(Box::new(comp)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile(source: &str) -> CompiledExpression {
        Compiler::new()
            .compile(source)
            .unwrap_or_else(|err| panic!("compile({source:?}) failed: {err}"))
    }

    #[test]
    fn comparison_is_boolean() {
        let compiled = compile("metadata.name == 'foo'");
        assert_eq!(compiled.result_type, ValueType::Bool);
        match compiled.expr {
            Expr::Call(call) => assert_eq!(call.function, "_==_"),
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn bare_literal_types() {
        assert_eq!(compile("123").result_type, ValueType::Int);
        assert_eq!(compile("'s'").result_type, ValueType::String);
        assert_eq!(compile("true").result_type, ValueType::Bool);
        assert_eq!(compile("[1, 2]").result_type, ValueType::List);
        assert_eq!(compile("{'k': 'v'}").result_type, ValueType::Map);
    }

    #[test]
    fn selection_on_roots_is_dyn() {
        assert_eq!(compile("metadata.name").result_type, ValueType::Dyn);
        assert_eq!(compile("spec.replicas").result_type, ValueType::Dyn);
    }

    #[test]
    fn member_predicates_are_boolean() {
        assert_eq!(
            compile("metadata.name.startsWith('prod-')").result_type,
            ValueType::Bool
        );
        assert_eq!(compile("spec.containers.size()").result_type, ValueType::Int);
        assert_eq!(
            compile("'app' in metadata.labels").result_type,
            ValueType::Bool
        );
    }

    #[test]
    fn undeclared_root_is_an_error() {
        let err = Compiler::new().compile("other.field == 'x'").unwrap_err();
        assert_eq!(err.to_string(), "undeclared reference to 'other'");
    }

    #[test]
    fn syntax_error_is_reported() {
        let err = Compiler::new().compile("metadata.name ==").unwrap_err();
        assert!(matches!(err, CompileError::Syntax(_)));
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn exists_expands_to_comprehension() {
        let compiled = compile("spec.tags.exists(t, t == 'v1')");
        assert_eq!(compiled.result_type, ValueType::Bool);
        let comp = match compiled.expr {
            Expr::Comprehension(comp) => comp,
            other => panic!("expected a comprehension, got {other:?}"),
        };
        assert_eq!(comp.iter_var, "t");
        assert_eq!(comp.accu_var, ACCUMULATOR_VAR);
        assert_eq!(comp.accu_init, Expr::Literal(Literal::Bool(false)));
        match &comp.loop_condition {
            Expr::Call(call) => assert_eq!(call.function, operators::NOT_STRICTLY_FALSE),
            other => panic!("expected a call, got {other:?}"),
        }
        match &comp.loop_step {
            Expr::Call(call) => assert_eq!(call.function, operators::LOGICAL_OR),
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn map_step_appends_a_list_literal() {
        let compiled = compile("[1, 2, 3].map(x, x)");
        assert_eq!(compiled.result_type, ValueType::List);
        let comp = match compiled.expr {
            Expr::Comprehension(comp) => comp,
            other => panic!("expected a comprehension, got {other:?}"),
        };
        let step = match &comp.loop_step {
            Expr::Call(call) => call,
            other => panic!("expected a call, got {other:?}"),
        };
        assert_eq!(step.function, operators::ADD);
        assert_eq!(step.args.len(), 2);
        assert!(step.args[1].is_list());
    }

    #[test]
    fn filter_appends_the_iteration_variable() {
        let compiled = compile("[1, 2, 3, 4].filter(x, x > 2)");
        assert_eq!(compiled.result_type, ValueType::List);
        let comp = match compiled.expr {
            Expr::Comprehension(comp) => comp,
            other => panic!("expected a comprehension, got {other:?}"),
        };
        let step = match &comp.loop_step {
            Expr::Call(call) => call,
            other => panic!("expected a call, got {other:?}"),
        };
        assert_eq!(step.function, operators::CONDITIONAL);
        match &step.args[1] {
            Expr::Call(append) => {
                assert_eq!(append.function, operators::ADD);
                assert_eq!(append.args[1], Expr::List(vec![Expr::ident("x")]));
            }
            other => panic!("expected a call, got {other:?}"),
        }
    }

    #[test]
    fn macro_iteration_variable_must_be_simple() {
        let err = Compiler::new()
            .compile("spec.tags.exists(t.x, t == 'v1')")
            .unwrap_err();
        assert!(matches!(err, CompileError::MacroArgument { .. }));
    }

    #[test]
    fn has_requires_a_selection() {
        assert_eq!(compile("has(metadata.labels)").result_type, ValueType::Bool);
        let err = Compiler::new().compile("has(metadata)").unwrap_err();
        assert_eq!(err, CompileError::InvalidHasArgument);
    }

    #[test]
    fn comprehension_scopes_its_variables() {
        // `t` is bound inside the macro body but undeclared outside it.
        assert_eq!(
            compile("spec.tags.exists(t, t.matches('^v'))").result_type,
            ValueType::Bool
        );
        let err = Compiler::new().compile("t == 'v1'").unwrap_err();
        assert_eq!(err.to_string(), "undeclared reference to 't'");
    }

    #[test]
    fn list_concatenation_stays_a_list() {
        assert_eq!(compile("[1] + [2]").result_type, ValueType::List);
        assert_eq!(compile("[1] + [2] == [1, 2]").result_type, ValueType::Bool);
    }

    #[test]
    fn mixed_arithmetic_unifies_to_dyn() {
        assert_eq!(compile("1 + 2").result_type, ValueType::Int);
        assert_eq!(compile("'a' + 'b'").result_type, ValueType::String);
        assert_eq!(compile("1 + 'a'").result_type, ValueType::Dyn);
    }

    #[test]
    fn ternary_unifies_branches() {
        assert_eq!(compile("true ? 1 : 2").result_type, ValueType::Int);
        assert_eq!(compile("true ? 1 : 'x'").result_type, ValueType::Dyn);
        assert_eq!(
            compile("'env' in metadata.labels ? metadata.labels['env'] == 'prod' : false")
                .result_type,
            ValueType::Bool
        );
    }

    #[test]
    fn unknown_functions_are_dyn_not_errors() {
        // Functions outside the sandbox allowlist still compile; rejecting
        // them is the sandbox's job, with an error naming the function.
        assert_eq!(compile("duration('10m')").result_type, ValueType::Dyn);
    }
}
