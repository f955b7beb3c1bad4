//! Top-down query evaluation with subgoal tabling.
//!
//! Every subgoal is memoised under a fingerprint that is canonical up
//! to variable renaming, so each variant class of goals has exactly one
//! producer; repeated subgoals attach to the producer's table entry as
//! waiters and receive its answers, past and future. That is what makes
//! recursive and mutually recursive programs terminate over a finite
//! domain: the number of variant classes is finite, each producer emits
//! finitely many deduplicated answers, and the waiter drain loop stops
//! as soon as a full pass adds nothing new.
//!
//! Evaluation is single-threaded and recursive. Sub-queries run by
//! ordinary synchronous calls; a sub-query's answers resume its
//! parent's rule through an explicit continuation record (pending head,
//! remaining body, bindings at spawn), binding results flowing
//! left-to-right through the body.

use std::collections::hash_map::Entry as MapEntry;

use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::trace;

use crate::atom::Atom;
use crate::bindings::Bindings;
use crate::clause::Clause;
use crate::db::{Database, Limits};
use crate::symbol::Symbol;
use crate::unify::unify;

/// Run `goal` against the database and return its derived facts, in
/// deterministic order, without duplicates.
pub fn execute<D: Database>(goal: &Atom, db: &D, limits: &Limits) -> Vec<Clause> {
    execute_with_stats(goal, db, limits).0
}

/// Like [`execute`], additionally reporting evaluation counters.
pub fn execute_with_stats<D: Database>(
    goal: &Atom,
    db: &D,
    limits: &Limits,
) -> (Vec<Clause>, EvalStats) {
    let mut solver = Solver {
        db,
        limits,
        table: Table::default(),
        queries: Vec::new(),
        stats: EvalStats::default(),
    };
    let root = solver.spawn(goal.clone(), Bindings::new(), None);
    solver.search(root);
    let answers = std::mem::take(&mut solver.queries[root].answers);
    (answers, solver.stats)
}

/// Aggregate counters for one `execute` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalStats {
    /// Producer searches started (distinct subgoal variants).
    pub subgoals: u64,
    /// Subgoals served from the table instead of re-searching.
    pub variant_hits: u64,
    /// Unique answers emitted across all queries.
    pub answers: u64,
    /// Answers suppressed by per-query deduplication.
    pub duplicates: u64,
}

type QueryId = usize;

/// One node of the query graph. The graph lives for a single `execute`
/// call; waiter and parent links are indices into the solver's arena.
struct QueryState {
    goal: Atom,
    bindings: Bindings,
    answers: Vec<Clause>,
    cont: Option<Continuation>,
}

/// How a sub-query resumes its parent: the head still to be derived,
/// the body atoms still to solve, and the bindings at the spawn point.
#[derive(Clone)]
struct Continuation {
    parent: QueryId,
    head: Atom,
    rest: Vec<Atom>,
    bindings: Bindings,
}

type Fingerprint = SmallVec<[u8; 24]>;

/// Subgoal table. Keys are canonical across variable renamings: the
/// predicate symbol as a varint, then per term either `V` plus the
/// variable's index in order of first occurrence within the atom, or
/// `c` plus a table-wide constant id. Printed forms are deliberately
/// not used; distinct variables sharing a name must not collide.
#[derive(Default)]
struct Table {
    constants: FxHashMap<String, u64>,
    entries: FxHashMap<Fingerprint, TableEntry>,
}

struct TableEntry {
    producer: QueryId,
    waiters: Vec<QueryId>,
}

impl Table {
    fn fingerprint(&mut self, atom: &Atom) -> Fingerprint {
        let mut key = Fingerprint::new();
        put_uvarint(&mut key, u64::from(atom.predicate.raw()));
        let mut vars: FxHashMap<Symbol, u64> = FxHashMap::default();
        for term in &atom.terms {
            match term.as_variable() {
                Some(sym) => {
                    let next = vars.len() as u64;
                    let id = *vars.entry(sym).or_insert(next);
                    key.push(b'V');
                    put_uvarint(&mut key, id);
                }
                None => {
                    let value = match term.as_constant() {
                        Some(value) => value.to_string(),
                        None => term.to_string(),
                    };
                    let next = self.constants.len() as u64;
                    let id = *self.constants.entry(value).or_insert(next);
                    key.push(b'c');
                    put_uvarint(&mut key, id);
                }
            }
        }
        key
    }

    /// Register a query under its goal's fingerprint. Returns the
    /// existing producer if this variant is already tabled, in which
    /// case the query has been appended to the waiter list.
    fn add(&mut self, key: Fingerprint, q: QueryId) -> Option<QueryId> {
        match self.entries.entry(key) {
            MapEntry::Occupied(mut entry) => {
                entry.get_mut().waiters.push(q);
                Some(entry.get().producer)
            }
            MapEntry::Vacant(entry) => {
                entry.insert(TableEntry {
                    producer: q,
                    waiters: Vec::new(),
                });
                None
            }
        }
    }

    fn waiters(&self, key: &Fingerprint) -> Vec<QueryId> {
        self.entries
            .get(key)
            .map(|entry| entry.waiters.clone())
            .unwrap_or_default()
    }
}

fn put_uvarint(buf: &mut Fingerprint, mut value: u64) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

struct Solver<'a, D: Database> {
    db: &'a D,
    limits: &'a Limits,
    table: Table,
    queries: Vec<QueryState>,
    stats: EvalStats,
}

impl<D: Database> Solver<'_, D> {
    fn spawn(&mut self, goal: Atom, bindings: Bindings, cont: Option<Continuation>) -> QueryId {
        self.queries.push(QueryState {
            goal,
            bindings,
            answers: Vec::new(),
            cont,
        });
        self.queries.len() - 1
    }

    /// Resolve a query: consumers replay the producer's answers, the
    /// producer runs every matching clause and then drains its answers
    /// to the waiters until a fixed point.
    fn search(&mut self, q: QueryId) {
        let goal = self.queries[q].goal.clone();
        let key = self.table.fingerprint(&goal);
        if let Some(producer) = self.table.add(key.clone(), q) {
            self.stats.variant_hits += 1;
            trace!(goal = %goal, "variant hit");
            let answers = self.queries[producer].answers.clone();
            self.deliver(q, &answers);
            return;
        }
        self.stats.subgoals += 1;
        trace!(goal = %goal, "subgoal");

        for clause in self.db.get(&goal, self.limits) {
            let mut env = self.queries[q].bindings.clone();

            if clause.is_fact() {
                if unify(&goal, &clause.head, &mut env) {
                    let answer = Clause::answer(clause.timestamp, goal.substitute(&env));
                    self.add_answer(q, answer);
                }
            } else {
                let renamed = clause.rename();
                if !unify(&goal, &renamed.head, &mut env) {
                    continue;
                }
                let renamed = renamed.substitute(&env);
                let head = goal.substitute(&env);
                let mut body = renamed.body;
                let first = body.remove(0);
                self.step(q, head, first, body, Bindings::new());
            }
        }

        // Answers found so far flow to the parent rule.
        let own = self.queries[q].answers.clone();
        self.deliver(q, &own);

        // Waiter fixed point: forward each newly grown answer slice to
        // every waiter; their processing may grow the list again.
        // Re-delivery is harmless since answers deduplicate, so growth
        // strictly drives the loop and it must terminate.
        let mut start = 0;
        let mut end = self.queries[q].answers.len();
        while start < end {
            for waiter in self.table.waiters(&key) {
                let slice = self.queries[q].answers[start..end].to_vec();
                self.deliver(waiter, &slice);
            }
            start = end;
            end = self.queries[q].answers.len();
        }
    }

    /// Forward answers of query `q` to the rule that spawned it.
    fn deliver(&mut self, q: QueryId, answers: &[Clause]) {
        let Some(cont) = self.queries[q].cont.clone() else {
            // The root query keeps its answers as the result.
            return;
        };
        let goal = self.queries[q].goal.clone();
        self.resume(cont, &goal, answers);
    }

    /// A solved body atom resumes its rule: bind the answer, then
    /// either derive the pending head or move to the next body atom
    /// with the extended bindings (sideways information passing).
    fn resume(&mut self, cont: Continuation, atom: &Atom, answers: &[Clause]) {
        for answer in answers {
            let mut env = cont.bindings.clone();
            if !unify(atom, &answer.head, &mut env) {
                // Answers were produced by solving this atom; a
                // mismatch here means the answer belongs to another
                // binding of the same variant.
                continue;
            }
            if cont.rest.is_empty() {
                let derived = Clause::answer(answer.timestamp, cont.head.substitute(&env));
                self.add_answer(cont.parent, derived);
            } else {
                let expanded = cont.rest[0].substitute(&env);
                self.step(
                    cont.parent,
                    cont.head.clone(),
                    expanded,
                    cont.rest[1..].to_vec(),
                    env,
                );
            }
        }
    }

    /// Solve the next body atom: expression atoms evaluate inline,
    /// everything else becomes a sub-query.
    fn step(&mut self, q: QueryId, head: Atom, atom: Atom, rest: Vec<Atom>, bindings: Bindings) {
        if atom.is_expression() {
            let mut env = bindings;
            if atom.eval(&mut env) {
                self.expr_step(q, head, rest, env);
            }
            // Expression failure prunes this resolvent silently.
            return;
        }
        let cont = Continuation {
            parent: q,
            head,
            rest,
            bindings: bindings.clone(),
        };
        let child = self.spawn(atom, bindings, Some(cont));
        self.search(child);
    }

    fn expr_step(&mut self, q: QueryId, head: Atom, rest: Vec<Atom>, env: Bindings) {
        if rest.is_empty() {
            let derived = Clause::answer(0, head.substitute(&env));
            self.add_answer(q, derived);
        } else {
            let expanded = rest[0].substitute(&env);
            self.step(q, head, expanded, rest[1..].to_vec(), env);
        }
    }

    fn add_answer(&mut self, q: QueryId, answer: Clause) {
        if self.queries[q].answers.iter().any(|a| a.equals(&answer)) {
            self.stats.duplicates += 1;
            return;
        }
        trace!(query = q, answer = %answer, "answer");
        self.stats.answers += 1;
        self.queries[q].answers.push(answer);
    }
}
