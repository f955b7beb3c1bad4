use std::fmt;
use std::ops::BitOr;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::bindings::Bindings;
use crate::symbol::Symbol;
use crate::term::Term;

/// Per-atom marker flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Flags(u8);

impl Flags {
    /// No flags set.
    pub const NONE: Flags = Flags(0);
    /// Facts for this predicate are never high-watermarked away by a
    /// standing query; they re-surface on every sync.
    pub const PERSISTENT: Flags = Flags(1);

    /// Test if every flag in `other` is set here.
    pub fn contains(self, other: Flags) -> bool {
        self.0 & other.0 == other.0
    }
}

impl BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

/// Identity of a predicate bucket: predicate symbol plus arity.
/// Two atoms share an AtomId iff their predicate and arity match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AtomId(u64);

impl AtomId {
    pub fn symbol(self) -> Symbol {
        Symbol::from_raw((self.0 >> 32) as u32)
    }

    pub fn arity(self) -> usize {
        (self.0 & 0xffff_ffff) as usize
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.symbol(), self.arity())
    }
}

/// A predicate symbol applied to an ordered list of terms.
#[derive(Debug, Clone, PartialEq)]
pub struct Atom {
    pub predicate: Symbol,
    pub terms: SmallVec<[Term; 4]>,
    pub flags: Flags,
}

impl Atom {
    pub fn new(predicate: Symbol, terms: impl Into<SmallVec<[Term; 4]>>) -> Atom {
        Atom {
            predicate,
            terms: terms.into(),
            flags: Flags::NONE,
        }
    }

    /// The bucket identity of this atom.
    pub fn id(&self) -> AtomId {
        AtomId((u64::from(self.predicate.raw()) << 32) | self.terms.len() as u64)
    }

    /// True if the predicate is the reserved expression symbol, in
    /// which case the atom is evaluated rather than matched against the
    /// database.
    pub fn is_expression(&self) -> bool {
        self.predicate.is_expr()
    }

    /// Structural equality starting from an empty variable mapping.
    pub fn equals(&self, other: &Atom) -> bool {
        self.equals_with_mapping(other, &mut FxHashMap::default())
    }

    /// Structural equality up to a consistent renaming of variables.
    /// The mapping accumulates across calls so that a clause's head and
    /// body are checked under one renaming.
    pub fn equals_with_mapping(
        &self,
        other: &Atom,
        mapping: &mut FxHashMap<Symbol, Symbol>,
    ) -> bool {
        if self.predicate != other.predicate || self.terms.len() != other.terms.len() {
            return false;
        }
        for (term, other_term) in self.terms.iter().zip(other.terms.iter()) {
            match term.as_variable() {
                Some(sym) => {
                    let Some(other_sym) = other_term.as_variable() else {
                        return false;
                    };
                    match mapping.get(&sym) {
                        Some(mapped) => {
                            if *mapped != other_sym {
                                return false;
                            }
                        }
                        None => {
                            mapping.insert(sym, other_sym);
                        }
                    }
                }
                None => {
                    if term != other_term {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Register fresh replacements for every variable in the atom not
    /// already mapped in `env`.
    pub fn rename(&self, env: &mut Bindings) {
        for term in &self.terms {
            term.rename(env);
        }
    }

    /// Apply `env` to every term, producing a new atom.
    pub fn substitute(&self, env: &Bindings) -> Atom {
        Atom {
            predicate: self.predicate,
            terms: self.terms.iter().map(|t| t.substitute(env)).collect(),
            flags: self.flags,
        }
    }

    /// Evaluate an expression atom under `env`. Succeeds iff the single
    /// expression term evaluates; `=` may extend `env`. Non-expression
    /// atoms never evaluate.
    pub fn eval(&self, env: &mut Bindings) -> bool {
        if !self.is_expression() {
            return false;
        }
        match self.terms.as_slice() {
            [Term::Expression(expr)] => expr.eval(env).is_ok(),
            _ => false,
        }
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_expression() {
            if let [term] = self.terms.as_slice() {
                return write!(f, "{}", term);
            }
        }
        write!(f, "{}", self.predicate)?;
        if !self.terms.is_empty() {
            write!(f, "(")?;
            for (idx, term) in self.terms.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", term)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::{Expr, ExprOp};
    use crate::symbol;

    fn atom(pred: &str, terms: Vec<Term>) -> Atom {
        let (sym, _) = symbol::intern(pred, false);
        Atom::new(sym, terms)
    }

    fn var(name: &str) -> Term {
        let (sym, _) = symbol::intern(name, false);
        Term::variable(sym)
    }

    fn con(value: &str) -> Term {
        Term::constant(value, false)
    }

    // ========== ATOM ID ==========

    #[test]
    fn id_matches_on_predicate_and_arity() {
        let a = atom("conn", vec![con("a"), con("b")]);
        let b = atom("conn", vec![var("X"), var("Y")]);
        assert_eq!(a.id(), b.id(), "same predicate/arity must share an AtomId");
    }

    #[test]
    fn id_differs_on_arity() {
        let a = atom("conn", vec![con("a")]);
        let b = atom("conn", vec![con("a"), con("b")]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn id_differs_on_predicate() {
        let a = atom("conn", vec![con("a")]);
        let b = atom("drop", vec![con("a")]);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn id_round_trips_arity() {
        let a = atom("conn", vec![con("a"), con("b"), con("c")]);
        assert_eq!(a.id().arity(), 3);
        assert_eq!(a.id().symbol(), a.predicate);
    }

    // ========== EQUALITY UP TO RENAMING ==========

    #[test]
    fn equals_identical_ground_atoms() {
        let a = atom("parent", vec![con("bill"), con("mary")]);
        let b = atom("parent", vec![con("bill"), con("mary")]);
        assert!(a.equals(&b));
    }

    #[test]
    fn equals_up_to_variable_renaming() {
        let a = atom("reach", vec![var("EqRenA"), var("EqRenB")]);
        let b = atom("reach", vec![var("EqRenC"), var("EqRenD")]);
        assert!(a.equals(&b), "consistent renaming must compare equal");
    }

    #[test]
    fn equals_requires_consistent_renaming() {
        // f(X, X) vs f(Y, Z): X cannot map to both Y and Z.
        let a = atom("f", vec![var("EqConsX"), var("EqConsX")]);
        let b = atom("f", vec![var("EqConsY"), var("EqConsZ")]);
        assert!(!a.equals(&b));
    }

    #[test]
    fn equals_rejects_variable_against_constant() {
        let a = atom("f", vec![var("EqVarC")]);
        let b = atom("f", vec![con("ground")]);
        assert!(!a.equals(&b));
    }

    #[test]
    fn equals_rejects_different_constants() {
        let a = atom("f", vec![con("x")]);
        let b = atom("f", vec![con("y")]);
        assert!(!a.equals(&b));
    }

    // ========== RENAME + SUBSTITUTE ==========

    #[test]
    fn rename_then_substitute_freshens_all_variables() {
        let a = atom("edge", vec![var("RenSubX"), var("RenSubY")]);
        let mut env = Bindings::new();
        a.rename(&mut env);
        let renamed = a.substitute(&env);

        assert!(a.equals(&renamed), "renaming preserves structure");
        for (orig, fresh) in a.terms.iter().zip(renamed.terms.iter()) {
            assert_ne!(orig, fresh, "every variable must be replaced");
        }
    }

    #[test]
    fn shared_variables_stay_shared_after_rename() {
        let a = atom("loop", vec![var("RenShared"), var("RenShared")]);
        let mut env = Bindings::new();
        a.rename(&mut env);
        let renamed = a.substitute(&env);
        assert_eq!(renamed.terms[0], renamed.terms[1]);
    }

    #[test]
    fn substitute_keeps_flags() {
        let mut a = atom("permit", vec![var("SubFlagX")]);
        a.flags = Flags::PERSISTENT;
        let env = Bindings::new();
        assert_eq!(a.substitute(&env).flags, Flags::PERSISTENT);
    }

    // ========== EXPRESSION ATOMS ==========

    fn expr_atom(expr: Expr) -> Atom {
        Atom::new(Symbol::EXPR, vec![Term::expression(expr)])
    }

    #[test]
    fn expression_atom_eval_success() {
        let a = expr_atom(Expr::binary(
            ExprOp::Gt,
            Expr::leaf(con("2")),
            Expr::leaf(con("1")),
        ));
        let mut env = Bindings::new();
        assert!(a.is_expression());
        assert!(a.eval(&mut env));
    }

    #[test]
    fn expression_atom_eval_failure() {
        let a = expr_atom(Expr::binary(
            ExprOp::Lt,
            Expr::leaf(con("2")),
            Expr::leaf(con("1")),
        ));
        let mut env = Bindings::new();
        assert!(!a.eval(&mut env));
    }

    #[test]
    fn ordinary_atom_never_evaluates() {
        let a = atom("n", vec![con("1")]);
        let mut env = Bindings::new();
        assert!(!a.eval(&mut env));
    }

    // ========== FLAGS ==========

    #[test]
    fn flags_combine_and_test() {
        let flags = Flags::NONE | Flags::PERSISTENT;
        assert!(flags.contains(Flags::PERSISTENT));
        assert!(!Flags::NONE.contains(Flags::PERSISTENT));
    }

    // ========== DISPLAY ==========

    #[test]
    fn display_predicate_application() {
        let a = atom("parent", vec![con("bill"), con("mary")]);
        assert_eq!(format!("{}", a), "parent(bill, mary)");
    }

    #[test]
    fn display_nullary_atom() {
        let a = atom("halt", vec![]);
        assert_eq!(format!("{}", a), "halt");
    }

    #[test]
    fn display_expression_atom_is_infix() {
        let a = expr_atom(Expr::binary(
            ExprOp::Gt,
            Expr::leaf(con("2")),
            Expr::leaf(con("1")),
        ));
        assert_eq!(format!("{}", a), "2 > 1");
    }
}
