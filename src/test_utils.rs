use crate::atom::Atom;
use crate::clause::{Clause, ClauseKind};
use crate::db::{Database, MemDb};
use crate::parser::Parser;

/// Parse a program into a fresh database, collecting query goals in
/// textual order. Retracts are dropped, like the engine does.
pub(crate) fn load(input: &str) -> (MemDb, Vec<Atom>) {
    let mut db = MemDb::new();
    let mut goals = Vec::new();
    let mut parser = Parser::new("test", input);
    while let Some((clause, kind)) = parser.parse().expect("test program must parse") {
        match kind {
            ClauseKind::Fact => db.add(clause),
            ClauseKind::Query => goals.push(clause.head),
            ClauseKind::Retract => {}
        }
    }
    (db, goals)
}

/// Parse `input` as a list of expected answer facts.
pub(crate) fn expected_facts(input: &str) -> Vec<Clause> {
    let mut result = Vec::new();
    let mut parser = Parser::new("expected", input);
    while let Some((clause, kind)) = parser.parse().expect("expected facts must parse") {
        if kind == ClauseKind::Fact {
            result.push(clause);
        }
    }
    result
}

/// Set equality between answer lists, ignoring order and timestamps.
pub(crate) fn same_answers(actual: &[Clause], expected: &[Clause]) -> bool {
    actual.iter().all(|a| expected.iter().any(|b| a.equals(b)))
        && expected.iter().all(|b| actual.iter().any(|a| a.equals(b)))
        && actual.len() == expected.len()
}
