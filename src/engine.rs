//! Host glue: program loading and standing queries.
//!
//! Event ingestors feed facts through [`Engine::add_fact`] and call
//! [`Engine::sync`] after each batch; every standing query then re-runs
//! against the database with its per-predicate high-water map, so only
//! fresh derivations come back. Queries are registered by loading a
//! program whose clauses end in `?`.

use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

use tracing::{debug, info};

use crate::atom::{Atom, Flags};
use crate::clause::{Clause, ClauseKind};
use crate::db::{Database, Limits, MemDb};
use crate::eval::execute;
use crate::parser::{ParseError, Parser};

/// A registered query plus the high-water map of the predicates it
/// reaches. Sync raises the map so re-runs only surface new facts;
/// persistent predicates stay out of the map and re-surface every time.
struct StandingQuery {
    clause: Clause,
    limits: Limits,
}

/// Counts of what one load call did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub facts: usize,
    pub rules: usize,
    pub queries: usize,
    pub retracts: usize,
}

/// Why a program failed to load.
#[derive(Debug)]
pub enum LoadError {
    Io(io::Error),
    Parse(ParseError),
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::Io(err) => write!(f, "{}", err),
            LoadError::Parse(err) => write!(f, "{}", err),
        }
    }
}

impl Error for LoadError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoadError::Io(err) => Some(err),
            LoadError::Parse(err) => Some(err),
        }
    }
}

impl From<io::Error> for LoadError {
    fn from(err: io::Error) -> Self {
        LoadError::Io(err)
    }
}

impl From<ParseError> for LoadError {
    fn from(err: ParseError) -> Self {
        LoadError::Parse(err)
    }
}

/// New derivations of one standing query after a sync.
#[derive(Debug, Clone)]
pub struct SyncResult {
    pub goal: Atom,
    pub answers: Vec<Clause>,
}

/// Owns the clause database and the standing queries registered
/// against it.
#[derive(Default)]
pub struct Engine {
    db: MemDb,
    queries: Vec<StandingQuery>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn db(&self) -> &MemDb {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut MemDb {
        &mut self.db
    }

    /// Number of registered standing queries.
    pub fn standing_query_count(&self) -> usize {
        self.queries.len()
    }

    /// Load a program file: facts and rules go to the database, query
    /// clauses become standing queries, retracts are accepted and
    /// ignored.
    pub fn load_file(&mut self, path: impl AsRef<Path>) -> Result<LoadSummary, LoadError> {
        let path = path.as_ref();
        let input = fs::read_to_string(path)?;
        self.load_str(&path.to_string_lossy(), &input)
    }

    /// Load a program from a string; `name` labels parse errors.
    pub fn load_str(&mut self, name: &str, input: &str) -> Result<LoadSummary, LoadError> {
        let mut parser = Parser::new(name, input);
        let mut summary = LoadSummary::default();
        let first_new = self.queries.len();

        while let Some((clause, kind)) = parser.parse()? {
            match kind {
                ClauseKind::Fact => {
                    if clause.is_fact() {
                        summary.facts += 1;
                    } else {
                        summary.rules += 1;
                    }
                    self.db.add(clause);
                }
                ClauseKind::Query => {
                    info!(query = %clause, "standing query registered");
                    summary.queries += 1;
                    self.queries.push(StandingQuery {
                        clause,
                        limits: Limits::default(),
                    });
                }
                ClauseKind::Retract => {
                    // Retraction is not implemented; the clause is
                    // accepted so existing programs keep loading.
                    debug!(clause = %clause, "retract ignored");
                    summary.retracts += 1;
                }
            }
        }

        // Resolve the predicates each new query reaches, seeding its
        // high-water map with zeroes.
        for query in &mut self.queries[first_new..] {
            query.limits = query.clause.predicates(&self.db, Flags::NONE);
        }
        Ok(summary)
    }

    /// Insert a single fact or rule, as the event receivers do.
    pub fn add_fact(&mut self, clause: Clause) {
        self.db.add(clause);
    }

    /// Run every standing query incrementally and return the new
    /// derivations. Each query's high-water map is raised to the
    /// newest answer timestamp it observed.
    pub fn sync(&mut self) -> Vec<SyncResult> {
        self.db.sync();
        let mut results = Vec::new();
        for query in &mut self.queries {
            let answers = execute(&query.clause.head, &self.db, &query.limits);
            for answer in &answers {
                for stamp in query.limits.values_mut() {
                    if answer.timestamp > *stamp {
                        *stamp = answer.timestamp;
                    }
                }
            }
            debug!(goal = %query.clause.head, count = answers.len(), "sync");
            results.push(SyncResult {
                goal: query.clause.head.clone(),
                answers,
            });
        }
        results
    }
}
