use crate::atom::Atom;
use crate::bindings::Bindings;
use crate::term::Term;

/// Unify two atoms under a shared bindings environment.
///
/// Fails if the predicates or arities differ. On success the
/// environment is extended with a most general substitution making the
/// atoms equal; on failure the environment may hold partial bindings
/// and the caller is expected to discard it (the evaluator always
/// unifies against a clone).
///
/// No occurs-check is performed: programs are range-restricted over a
/// finite domain, so infinite terms cannot arise.
pub fn unify(a: &Atom, b: &Atom, env: &mut Bindings) -> bool {
    if a.predicate != b.predicate || a.terms.len() != b.terms.len() {
        return false;
    }
    for (at, bt) in a.terms.iter().zip(b.terms.iter()) {
        let am = env.map(at);
        let bm = env.map(bt);
        if am == bm {
            continue;
        }
        if !unify_terms(&am, &bm, env) {
            return false;
        }
    }
    true
}

/// Unify two terms under `env`. Both directions are symmetric;
/// expression terms are evaluated first and their value unified with
/// the other side.
pub fn unify_terms(a: &Term, b: &Term, env: &mut Bindings) -> bool {
    match (a, b) {
        (Term::Variable(x), Term::Variable(y)) => {
            if x == y {
                // Same variable.
                return true;
            }
            // Bind b to a's current value.
            let mapped_a = env.map(a);
            if env.bind(*y, mapped_a) {
                return true;
            }
            // b already bound; bind a to b's value instead.
            let mapped_b = env.map(b);
            env.bind(*x, mapped_b)
        }
        (Term::Variable(x), constant @ Term::Constant { .. }) => {
            if env.bind(*x, constant.clone()) {
                return true;
            }
            // Already bound; succeed only on the same constant.
            *constant == env.map(a)
        }
        (constant @ Term::Constant { .. }, Term::Variable(y)) => {
            if env.bind(*y, constant.clone()) {
                return true;
            }
            *constant == env.map(b)
        }
        (Term::Constant { value: va, .. }, Term::Constant { value: vb, .. }) => va == vb,
        (Term::Expression(expr), other) | (other, Term::Expression(expr)) => {
            match expr.eval(env) {
                Ok(value) => unify_terms(&value, other, env),
                Err(_) => false,
            }
        }
    }
}
