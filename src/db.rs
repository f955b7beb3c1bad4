use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use hashbrown::HashMap;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::atom::{Atom, AtomId};
use crate::clause::Clause;

/// Per-predicate high-water timestamps. `get` only returns facts newer
/// than the recorded stamp, which is how re-queries surface fresh
/// derivations only. A missing entry means "no limit" (zero).
pub type Limits = FxHashMap<AtomId, i64>;

/// Clause storage interface the evaluator and ingestors talk to.
pub trait Database {
    /// Append a clause to its predicate bucket.
    fn add(&mut self, clause: Clause);
    /// Every clause in the goal's bucket that is a rule, or a fact
    /// newer than the goal's limit.
    fn get(&self, goal: &Atom, limits: &Limits) -> Vec<Clause>;
    /// Signal the end of a batch insert. No storage effect here; hosts
    /// hook standing-query re-execution onto it.
    fn sync(&mut self);
}

/// In-memory clause store, bucketed by predicate/arity in insertion
/// order. Facts and rules are intermixed within a bucket.
#[derive(Debug, Default)]
pub struct MemDb {
    clauses: HashMap<AtomId, Vec<Clause>>,
}

impl MemDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of predicate buckets.
    pub fn len(&self) -> usize {
        self.clauses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }
}

impl Database for MemDb {
    fn add(&mut self, clause: Clause) {
        let id = clause.head.id();
        debug!(bucket = %id, clause = %clause, "db add");
        self.clauses.entry(id).or_default().push(clause);
    }

    fn get(&self, goal: &Atom, limits: &Limits) -> Vec<Clause> {
        let id = goal.id();
        let since = limits.get(&id).copied().unwrap_or(0);
        match self.clauses.get(&id) {
            Some(bucket) => bucket
                .iter()
                .filter(|c| !c.is_fact() || c.timestamp > since)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    fn sync(&mut self) {}
}

static CLOCK: AtomicI64 = AtomicI64::new(0);

/// Next fact timestamp: wall-clock nanoseconds, forced strictly
/// increasing so that single-writer buckets are monotone even when the
/// OS clock is coarse or steps backwards.
pub fn next_timestamp() -> i64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0);
    let mut prev = CLOCK.load(Ordering::SeqCst);
    loop {
        let next = if now > prev { now } else { prev + 1 };
        match CLOCK.compare_exchange(prev, next, Ordering::SeqCst, Ordering::SeqCst) {
            Ok(_) => return next,
            Err(observed) => prev = observed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol;
    use crate::term::Term;

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

    fn fact(pred: &str, terms: Vec<Term>) -> Clause {
        Clause::new(atom(pred, terms), vec![])
    }

    // ========== ADD / GET ==========

    #[test]
    fn get_unknown_predicate_is_empty() {
        let db = MemDb::new();
        let result = db.get(&atom("db-missing", vec![var("DbX")]), &Limits::default());
        assert!(result.is_empty(), "missing predicate yields empty, not error");
    }

    #[test]
    fn get_returns_bucket_in_insertion_order() {
        let mut db = MemDb::new();
        db.add(fact("db-ord", vec![con("a")]));
        db.add(fact("db-ord", vec![con("b")]));
        db.add(fact("db-ord", vec![con("c")]));

        let result = db.get(&atom("db-ord", vec![var("DbX")]), &Limits::default());
        let values: Vec<String> = result.iter().map(|c| c.head.terms[0].to_string()).collect();
        assert_eq!(values, vec!["a", "b", "c"]);
    }

    #[test]
    fn buckets_are_keyed_by_arity_too() {
        let mut db = MemDb::new();
        db.add(fact("db-ar", vec![con("a")]));
        db.add(fact("db-ar", vec![con("a"), con("b")]));

        let unary = db.get(&atom("db-ar", vec![var("DbX")]), &Limits::default());
        assert_eq!(unary.len(), 1, "arity must separate buckets");
    }

    // ========== LIMITS FILTERING ==========

    #[test]
    fn limits_filter_out_old_facts() {
        let mut db = MemDb::new();
        db.add(fact("db-lim", vec![con("1")]));
        db.add(fact("db-lim", vec![con("2")]));

        let goal = atom("db-lim", vec![var("DbX")]);
        let all = db.get(&goal, &Limits::default());
        assert_eq!(all.len(), 2);

        let high_water = all.iter().map(|c| c.timestamp).max().unwrap();
        db.add(fact("db-lim", vec![con("3")]));

        let mut limits = Limits::default();
        limits.insert(goal.id(), high_water);
        let fresh = db.get(&goal, &limits);
        assert_eq!(fresh.len(), 1, "only the fact inserted after the mark");
        assert_eq!(fresh[0].head.terms[0], con("3"));
    }

    #[test]
    fn limits_never_filter_rules() {
        let mut db = MemDb::new();
        db.add(fact("db-rl-edge", vec![con("a"), con("b")]));
        db.add(Clause::new(
            atom("db-rl-edge", vec![var("DbX"), var("DbY")]),
            vec![atom("db-rl-other", vec![var("DbX"), var("DbY")])],
        ));

        let goal = atom("db-rl-edge", vec![var("DbX"), var("DbY")]);
        let mut limits = Limits::default();
        limits.insert(goal.id(), i64::MAX);
        let result = db.get(&goal, &limits);
        assert_eq!(result.len(), 1, "rules must always pass the filter");
        assert!(!result[0].is_fact());
    }

    #[test]
    fn limits_for_other_predicates_do_not_apply() {
        let mut db = MemDb::new();
        db.add(fact("db-oth-a", vec![con("1")]));

        let mut limits = Limits::default();
        limits.insert(atom("db-oth-b", vec![var("DbX")]).id(), i64::MAX);
        let result = db.get(&atom("db-oth-a", vec![var("DbX")]), &limits);
        assert_eq!(result.len(), 1);
    }

    // ========== CLOCK ==========

    #[test]
    fn timestamps_are_strictly_increasing() {
        let mut prev = next_timestamp();
        for _ in 0..1000 {
            let now = next_timestamp();
            assert!(now > prev, "clock must be strictly monotone");
            prev = now;
        }
    }

    #[test]
    fn sync_is_a_no_op_on_storage() {
        let mut db = MemDb::new();
        db.add(fact("db-sync", vec![con("a")]));
        db.sync();
        let result = db.get(&atom("db-sync", vec![var("DbX")]), &Limits::default());
        assert_eq!(result.len(), 1);
    }
}
