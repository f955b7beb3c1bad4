use std::fmt;

use smallvec::SmallVec;

use crate::symbol::Symbol;
use crate::term::Term;

/// An ordered, append-only substitution from variable symbols to terms.
///
/// Guarantees:
/// - At most one entry per variable symbol
/// - Entries are never mutated in place; `bind` only adds
/// - `clone` copies the row sequence, sharing the terms
///
/// Each rule instance carries only a handful of variables, so a linear
/// scan over a small inline vector beats a hash map here.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    rows: SmallVec<[(Symbol, Term); 8]>,
}

impl Bindings {
    /// Create an empty environment.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of bound symbols.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if no symbol is bound.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Map the argument term to its current binding, one hop.
    /// Non-variables and unbound variables map to themselves.
    pub fn map(&self, term: &Term) -> Term {
        if let Some(sym) = term.as_variable() {
            for (bound, val) in &self.rows {
                if *bound == sym {
                    return val.clone();
                }
            }
        }
        term.clone()
    }

    /// Test if the symbol has a binding.
    pub fn contains(&self, sym: Symbol) -> bool {
        self.rows.iter().any(|(bound, _)| *bound == sym)
    }

    /// Bind the symbol to the term. Returns true if the binding was
    /// added and false if the symbol was already bound.
    pub fn bind(&mut self, sym: Symbol, term: Term) -> bool {
        if self.contains(sym) {
            return false;
        }
        self.rows.push((sym, term));
        true
    }

    /// Iterate over the bound rows in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Symbol, &Term)> {
        self.rows.iter().map(|(sym, term)| (*sym, term))
    }
}

impl fmt::Display for Bindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{")?;
        for (idx, (sym, term)) in self.rows.iter().enumerate() {
            if idx > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}->{}", sym, term)?;
        }
        write!(f, "}}")
    }
}
