use std::error::Error;
use std::fmt;

use crate::bindings::Bindings;
use crate::term::Term;
use crate::unify::unify_terms;

/// Binary operation appearing in an expression atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprOp {
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    Mul,
    Div,
    Add,
    Sub,
}

impl fmt::Display for ExprOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ExprOp::Eq => "=",
            ExprOp::Ge => ">=",
            ExprOp::Gt => ">",
            ExprOp::Le => "<=",
            ExprOp::Lt => "<",
            ExprOp::Mul => "*",
            ExprOp::Div => "/",
            ExprOp::Add => "+",
            ExprOp::Sub => "-",
        };
        write!(f, "{}", name)
    }
}

/// A tree of arithmetic/comparison operations over terms.
///
/// Evaluation is side-effect free apart from bindings added by `=`, so
/// re-evaluating under a growing environment is safe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// A constant or variable leaf.
    Leaf(Term),
    Binary {
        op: ExprOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

/// Why an expression failed to produce a value. Inside the evaluator
/// every variant is a silent prune, never a query-level error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExprError {
    /// A comparison or equality did not hold.
    False,
    DivideByZero,
    /// An arithmetic or comparison operand was not a signed integer.
    NotInteger,
}

impl fmt::Display for ExprError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprError::False => write!(f, "false"),
            ExprError::DivideByZero => write!(f, "divide by zero"),
            ExprError::NotInteger => write!(f, "operand is not an integer"),
        }
    }
}

impl Error for ExprError {}

/// The canonical "true" constant produced by satisfied comparisons.
pub fn term_true() -> Term {
    Term::constant("true", true)
}

impl Expr {
    /// Create a leaf expression.
    pub fn leaf(term: Term) -> Expr {
        Expr::Leaf(term)
    }

    /// Create a binary expression node.
    pub fn binary(op: ExprOp, left: Expr, right: Expr) -> Expr {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Register fresh replacements for every variable leaf not already
    /// mapped in `env`.
    pub fn rename(&self, env: &mut Bindings) {
        match self {
            Expr::Leaf(term) => term.rename(env),
            Expr::Binary { left, right, .. } => {
                left.rename(env);
                right.rename(env);
            }
        }
    }

    /// Apply `env` to every leaf, producing a new expression.
    pub fn substitute(&self, env: &Bindings) -> Expr {
        match self {
            Expr::Leaf(term) => Expr::Leaf(term.substitute(env)),
            Expr::Binary { op, left, right } => Expr::Binary {
                op: *op,
                left: Box::new(left.substitute(env)),
                right: Box::new(right.substitute(env)),
            },
        }
    }

    /// Evaluate under `env` to a constant term, or fail.
    ///
    /// `=` unifies its operands (possibly extending `env`); comparisons
    /// and arithmetic require both sides to parse as signed 64-bit
    /// integers after mapping through `env`.
    pub fn eval(&self, env: &mut Bindings) -> Result<Term, ExprError> {
        let (op, left, right) = match self {
            Expr::Leaf(term) => return Ok(env.map(term)),
            Expr::Binary { op, left, right } => (*op, left, right),
        };

        let lhs = left.eval(env)?;
        let rhs = right.eval(env)?;

        if op == ExprOp::Eq {
            return if unify_terms(&lhs, &rhs, env) {
                Ok(term_true())
            } else {
                Err(ExprError::False)
            };
        }

        let l = parse_int(&lhs)?;
        let r = parse_int(&rhs)?;

        let satisfied = |ok: bool| if ok { Ok(term_true()) } else { Err(ExprError::False) };
        match op {
            ExprOp::Ge => satisfied(l >= r),
            ExprOp::Gt => satisfied(l > r),
            ExprOp::Le => satisfied(l <= r),
            ExprOp::Lt => satisfied(l < r),
            ExprOp::Mul => Ok(int_term(l * r)),
            ExprOp::Div => {
                if r == 0 {
                    return Err(ExprError::DivideByZero);
                }
                Ok(int_term(l / r))
            }
            ExprOp::Add => Ok(int_term(l + r)),
            ExprOp::Sub => Ok(int_term(l - r)),
            ExprOp::Eq => unreachable!("handled above"),
        }
    }
}

fn parse_int(term: &Term) -> Result<i64, ExprError> {
    term.as_constant()
        .and_then(|value| value.parse::<i64>().ok())
        .ok_or(ExprError::NotInteger)
}

fn int_term(value: i64) -> Term {
    Term::constant(value.to_string(), false)
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Leaf(term) => write!(f, "{}", term),
            Expr::Binary { op, left, right } => write!(f, "{} {} {}", left, op, right),
        }
    }
}
