use std::fmt;

use rustc_hash::FxHashMap;

use crate::atom::{Atom, Flags};
use crate::bindings::Bindings;
use crate::db::{self, Database, Limits};

/// A fact (head only) or a rule (head plus body atoms), stamped with
/// its creation time.
#[derive(Debug, Clone)]
pub struct Clause {
    /// Monotonic creation timestamp in nanoseconds. Answers derived by
    /// the evaluator carry the timestamp of the contributing fact.
    pub timestamp: i64,
    pub head: Atom,
    pub body: Vec<Atom>,
}

impl Clause {
    /// Create a clause stamped with the current time.
    pub fn new(head: Atom, body: Vec<Atom>) -> Clause {
        Clause {
            timestamp: db::next_timestamp(),
            head,
            body,
        }
    }

    /// Create an answer clause carrying an inherited timestamp.
    pub fn answer(timestamp: i64, head: Atom) -> Clause {
        Clause {
            timestamp,
            head,
            body: Vec::new(),
        }
    }

    /// A clause with no body is a fact.
    pub fn is_fact(&self) -> bool {
        self.body.is_empty()
    }

    /// Structural equality up to a consistent variable renaming shared
    /// between the head and the body.
    pub fn equals(&self, other: &Clause) -> bool {
        let mut mapping = FxHashMap::default();
        if !self.head.equals_with_mapping(&other.head, &mut mapping) {
            return false;
        }
        if self.body.len() != other.body.len() {
            return false;
        }
        self.body
            .iter()
            .zip(other.body.iter())
            .all(|(a, b)| a.equals_with_mapping(b, &mut mapping))
    }

    /// Copy the clause with every variable replaced by a fresh one, so
    /// it can be unified against a goal without name collisions.
    pub fn rename(&self) -> Clause {
        let mut env = Bindings::new();
        self.head.rename(&mut env);
        for atom in &self.body {
            atom.rename(&mut env);
        }
        if env.is_empty() {
            return self.clone();
        }
        self.substitute(&env)
    }

    /// Apply `env` to the head and every body atom.
    pub fn substitute(&self, env: &Bindings) -> Clause {
        Clause {
            timestamp: self.timestamp,
            head: self.head.substitute(env),
            body: self.body.iter().map(|a| a.substitute(env)).collect(),
        }
    }

    /// All predicates used or linked by this clause, transitively
    /// through the database, as a zeroed high-water map. Hosts use this
    /// to seed the limits of a standing query; atoms whose flags differ
    /// from `flags` (e.g. persistent ones) stay out of the map.
    pub fn predicates<D: Database>(&self, db: &D, flags: Flags) -> Limits {
        let mut result = Limits::default();
        let mut pending = vec![self.clone()];

        while !pending.is_empty() {
            let mut next = Vec::new();
            for clause in &pending {
                for atom in std::iter::once(&clause.head).chain(clause.body.iter()) {
                    if atom.flags != flags || atom.is_expression() {
                        continue;
                    }
                    let id = atom.id();
                    if !result.contains_key(&id) {
                        result.insert(id, 0);
                        next.extend(db.get(atom, &Limits::default()));
                    }
                }
            }
            pending = next;
        }
        result
    }
}

/// How a parsed clause was terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClauseKind {
    /// `.`: assert as fact or rule.
    Fact,
    /// `~`: retract request.
    Retract,
    /// `?`: query.
    Query,
}

impl fmt::Display for ClauseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClauseKind::Fact => write!(f, "."),
            ClauseKind::Retract => write!(f, "~"),
            ClauseKind::Query => write!(f, "?"),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.head)?;
        if !self.body.is_empty() {
            write!(f, " :- ")?;
            for (idx, atom) in self.body.iter().enumerate() {
                if idx > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", atom)?;
            }
        }
        Ok(())
    }
}
