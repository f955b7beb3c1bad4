use std::fmt;
use std::sync::{Arc, LazyLock};

use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::lexer::stringify;

/// A unique identifier for a predicate, constant, or variable name.
/// This is an interned string ID for fast equality comparison.
///
/// Two reserved values exist below [`Symbol::FIRST_INTERN`]: the nil
/// sentinel and the expression-predicate marker. Everything at or above
/// the base is either interned from a name or allocated fresh by the
/// renamer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(u32);

impl Symbol {
    /// The "not a symbol" sentinel.
    pub const NIL: Symbol = Symbol(0);
    /// The reserved predicate symbol for expression atoms.
    pub const EXPR: Symbol = Symbol(1);
    /// First symbol value handed out by the interner.
    pub const FIRST_INTERN: Symbol = Symbol(2);

    /// True exactly for the reserved expression-predicate symbol.
    pub fn is_expr(self) -> bool {
        self == Symbol::EXPR
    }

    /// Get the raw u32 value (for fingerprints/display).
    pub fn raw(self) -> u32 {
        self.0
    }

    pub(crate) fn from_raw(raw: u32) -> Self {
        Symbol(raw)
    }
}

struct Interner {
    next_id: u32,
    by_name: HashMap<Arc<str>, Symbol>,
    by_id: HashMap<Symbol, SymbolName>,
}

#[derive(Clone)]
struct SymbolName {
    name: Arc<str>,
    stringlike: bool,
}

/// Process-wide symbol table. A single lock protects both directions of
/// the mapping and the fresh-symbol counter. Symbols never change
/// meaning once assigned.
static SYMBOLS: LazyLock<Mutex<Interner>> = LazyLock::new(|| {
    Mutex::new(Interner {
        next_id: Symbol::FIRST_INTERN.0,
        by_name: HashMap::new(),
        by_id: HashMap::new(),
    })
});

/// Intern a name, returning its symbol and the canonical shared copy of
/// the name. Interning the same string twice returns the same symbol.
///
/// The `stringlike` flag records whether the name came from a quoted
/// string literal; it affects printing only, never equality.
pub fn intern(value: &str, stringlike: bool) -> (Symbol, Arc<str>) {
    let mut table = SYMBOLS.lock();
    if let Some(&id) = table.by_name.get(value) {
        let name = table.by_id[&id].name.clone();
        return (id, name);
    }
    let id = Symbol(table.next_id);
    table.next_id += 1;
    let name: Arc<str> = Arc::from(value);
    table.by_name.insert(name.clone(), id);
    table.by_id.insert(
        id,
        SymbolName {
            name: name.clone(),
            stringlike,
        },
    );
    (id, name)
}

/// Allocate a symbol with no name. Used by the renamer so that
/// rule-local variables never collide across unifications.
pub fn fresh() -> Symbol {
    let mut table = SYMBOLS.lock();
    let id = Symbol(table.next_id);
    table.next_id += 1;
    id
}

/// Resolve a symbol back to its name and stringlike flag.
/// Returns None for reserved and fresh (unnamed) symbols.
pub fn resolve(sym: Symbol) -> Option<(Arc<str>, bool)> {
    let table = SYMBOLS.lock();
    table.by_id.get(&sym).map(|n| (n.name.clone(), n.stringlike))
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Symbol::NIL => write!(f, "{{nil}}"),
            Symbol::EXPR => write!(f, "{{expression}}"),
            sym => match resolve(sym) {
                Some((name, true)) => write!(f, "{}", stringify(&name)),
                Some((name, false)) => write!(f, "{}", name),
                // Fresh variable with no name.
                None => write!(f, ":{}", sym.0),
            },
        }
    }
}
