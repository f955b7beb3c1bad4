use std::fmt;
use std::sync::Arc;

use crate::bindings::Bindings;
use crate::expr::Expr;
use crate::lexer::stringify;
use crate::symbol::{self, Symbol};

/// A datalog term: a variable, an immutable constant, or an arithmetic
/// expression over sub-terms.
///
/// Terms never mutate; substitution produces a new term.
#[derive(Debug, Clone)]
pub enum Term {
    /// A variable, referring to a symbol that may or may not be bound
    /// in a bindings environment.
    Variable(Symbol),
    /// An immutable payload. `stringlike` distinguishes quoted string
    /// constants from bare atoms for printing only; equality ignores it.
    Constant { value: Arc<str>, stringlike: bool },
    /// An arithmetic/comparison tree that evaluates to a constant or
    /// fails.
    Expression(Box<Expr>),
}

impl Term {
    /// Create a variable term.
    pub fn variable(sym: Symbol) -> Term {
        Term::Variable(sym)
    }

    /// Create a constant term.
    pub fn constant(value: impl Into<Arc<str>>, stringlike: bool) -> Term {
        Term::Constant {
            value: value.into(),
            stringlike,
        }
    }

    /// Create an expression term.
    pub fn expression(expr: Expr) -> Term {
        Term::Expression(Box::new(expr))
    }

    /// The variable symbol of this term, or None for constants and
    /// expressions.
    pub fn as_variable(&self) -> Option<Symbol> {
        match self {
            Term::Variable(sym) => Some(*sym),
            _ => None,
        }
    }

    /// The constant payload of this term, if it is a constant.
    pub fn as_constant(&self) -> Option<&str> {
        match self {
            Term::Constant { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Register a fresh replacement in `env` for every variable symbol
    /// in this term that is not already mapped. The term itself is
    /// unchanged; a following [`Term::substitute`] applies the renaming.
    pub fn rename(&self, env: &mut Bindings) {
        match self {
            Term::Variable(sym) => {
                if !env.contains(*sym) {
                    env.bind(*sym, Term::variable(symbol::fresh()));
                }
            }
            Term::Constant { .. } => {}
            Term::Expression(expr) => expr.rename(env),
        }
    }

    /// Replace this term by its binding in `env`, one hop. Constants
    /// map to themselves; expressions substitute their leaves.
    pub fn substitute(&self, env: &Bindings) -> Term {
        match self {
            Term::Variable(_) => env.map(self),
            Term::Constant { .. } => self.clone(),
            Term::Expression(expr) => Term::Expression(Box::new(expr.substitute(env))),
        }
    }
}

impl PartialEq for Term {
    fn eq(&self, other: &Term) -> bool {
        match (self, other) {
            (Term::Variable(a), Term::Variable(b)) => a == b,
            // Only the payload matters; stringlike is a display hint.
            (Term::Constant { value: a, .. }, Term::Constant { value: b, .. }) => a == b,
            (Term::Expression(a), Term::Expression(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Term {}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Term::Variable(sym) => write!(f, "{}", sym),
            Term::Constant { value, stringlike } => {
                if *stringlike {
                    write!(f, "{}", stringify(value))
                } else {
                    write!(f, "{}", value)
                }
            }
            Term::Expression(expr) => write!(f, "{}", expr),
        }
    }
}
