use std::error::Error;
use std::fmt;

use smallvec::SmallVec;

use crate::atom::{Atom, Flags};
use crate::clause::{Clause, ClauseKind};
use crate::expr::{Expr, ExprOp};
use crate::lexer::{Lexer, Position, Token, TokenKind};
use crate::symbol::{self, Symbol};
use crate::term::Term;

/// A syntax error with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError {
    pub message: String,
    pub position: Position,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.position, self.message)
    }
}

impl Error for ParseError {}

/// Recursive-descent parser producing clauses from datalog source.
///
/// Grammar:
/// - `clause := atom (":-" atom ("," atom)*)? ("." | "~" | "?")`
/// - `atom := pred "(" term ("," term)* ")" flags? | pred | expr`
/// - `expr := operand op operand` with precedence `=` < comparisons <
///   additive < multiplicative, all right-associative
///
/// Expression atoms may only appear in rule bodies.
pub struct Parser {
    lexer: Lexer,
    ungot: Option<Token>,
}

impl Parser {
    pub fn new(name: &str, input: &str) -> Parser {
        Parser {
            lexer: Lexer::new(name, input),
            ungot: None,
        }
    }

    fn get_token(&mut self) -> Result<Option<Token>, ParseError> {
        if let Some(token) = self.ungot.take() {
            return Ok(Some(token));
        }
        self.lexer.next_token()
    }

    fn require_token(&mut self) -> Result<Token, ParseError> {
        self.get_token()?.ok_or_else(|| ParseError {
            message: "unexpected end of input".to_string(),
            position: self.lexer.pos(),
        })
    }

    fn unget_token(&mut self, token: Token) {
        debug_assert!(self.ungot.is_none(), "single-token lookahead only");
        self.ungot = Some(token);
    }

    fn peek_kind(&mut self) -> Result<Option<TokenKind>, ParseError> {
        match self.get_token()? {
            Some(token) => {
                let kind = token.kind;
                self.unget_token(token);
                Ok(Some(kind))
            }
            None => Ok(None),
        }
    }

    fn error(pos: &Position, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: pos.clone(),
        }
    }

    /// Parse the next clause, or None at end of input.
    pub fn parse(&mut self) -> Result<Option<(Clause, ClauseKind)>, ParseError> {
        let Some(first) = self.get_token()? else {
            return Ok(None);
        };
        let head_pos = first.pos.clone();
        let head = self.parse_atom(first)?;
        if head.is_expression() {
            return Err(Self::error(
                &head_pos,
                "expression not allowed as clause head",
            ));
        }

        let mut body = Vec::new();
        let mut token = self.require_token()?;
        if token.kind == TokenKind::Arrow {
            loop {
                let next = self.require_token()?;
                body.push(self.parse_atom(next)?);
                if self.peek_kind()? == Some(TokenKind::Comma) {
                    let _ = self.get_token()?;
                } else {
                    break;
                }
            }
            token = self.require_token()?;
        }

        let kind = match token.kind {
            TokenKind::Dot => ClauseKind::Fact,
            TokenKind::Tilde => ClauseKind::Retract,
            TokenKind::Question => ClauseKind::Query,
            _ => {
                return Err(Self::error(
                    &token.pos,
                    format!("invalid clause type: {}", token),
                ))
            }
        };
        Ok(Some((Clause::new(head, body), kind)))
    }

    fn parse_atom(&mut self, first: Token) -> Result<Atom, ParseError> {
        match first.kind {
            TokenKind::Identifier | TokenKind::Str => match self.peek_kind()? {
                Some(TokenKind::LParen) => {
                    let _ = self.get_token()?;
                    self.parse_application(&first)
                }
                Some(kind) if kind.is_operator() => {
                    let lhs = Expr::leaf(Term::constant(
                        first.value,
                        first.kind == TokenKind::Str,
                    ));
                    self.parse_expression(lhs)
                }
                _ => {
                    let (predicate, _) =
                        symbol::intern(&first.value, first.kind == TokenKind::Str);
                    Ok(Atom::new(predicate, SmallVec::new()))
                }
            },
            TokenKind::Variable => match self.peek_kind()? {
                Some(kind) if kind.is_operator() => {
                    let (sym, _) = symbol::intern(&first.value, false);
                    self.parse_expression(Expr::leaf(Term::variable(sym)))
                }
                _ => Err(Self::error(
                    &first.pos,
                    format!("expected operator after variable {}", first.value),
                )),
            },
            _ => Err(Self::error(
                &first.pos,
                format!("unexpected token: {}", first),
            )),
        }
    }

    /// Parse `pred(term, ...)` with an optional flags suffix; the
    /// predicate token and opening parenthesis are already consumed.
    fn parse_application(&mut self, pred: &Token) -> Result<Atom, ParseError> {
        let (predicate, _) = symbol::intern(&pred.value, pred.kind == TokenKind::Str);
        let mut terms: SmallVec<[Term; 4]> = SmallVec::new();
        loop {
            let token = self.require_token()?;
            let term = match token.kind {
                TokenKind::Variable => {
                    let (sym, _) = symbol::intern(&token.value, false);
                    Term::variable(sym)
                }
                // Each wildcard occurrence is a distinct variable.
                TokenKind::Wildcard => Term::variable(symbol::fresh()),
                TokenKind::Identifier | TokenKind::Str => {
                    Term::constant(token.value, token.kind == TokenKind::Str)
                }
                _ => {
                    return Err(Self::error(
                        &token.pos,
                        format!("invalid term: {}", token),
                    ))
                }
            };
            terms.push(term);

            let sep = self.require_token()?;
            match sep.kind {
                TokenKind::RParen => break,
                TokenKind::Comma => continue,
                _ => {
                    return Err(Self::error(
                        &sep.pos,
                        format!("expected ',' or ')': {}", sep),
                    ))
                }
            }
        }

        let mut flags = Flags::NONE;
        if self.peek_kind()? == Some(TokenKind::Identifier) {
            let token = self.require_token()?;
            for ch in token.value.chars() {
                match ch {
                    'p' => flags = flags | Flags::PERSISTENT,
                    _ => {
                        return Err(Self::error(
                            &token.pos,
                            format!("invalid flag: {:?}", ch),
                        ))
                    }
                }
            }
        }

        let mut atom = Atom::new(predicate, terms);
        atom.flags = flags;
        Ok(atom)
    }

    /// Parse an infix expression whose first operand is already in
    /// hand, producing an expression atom.
    fn parse_expression(&mut self, lhs: Expr) -> Result<Atom, ParseError> {
        let expr = self.parse_eq(lhs)?;
        Ok(Atom::new(
            Symbol::EXPR,
            smallvec::smallvec![Term::expression(expr)],
        ))
    }

    fn parse_eq(&mut self, lhs: Expr) -> Result<Expr, ParseError> {
        let lhs = self.parse_cmp(lhs)?;
        if self.peek_kind()? == Some(TokenKind::Eq) {
            let _ = self.get_token()?;
            let operand = self.parse_operand()?;
            let rhs = self.parse_eq(operand)?;
            return Ok(Expr::binary(ExprOp::Eq, lhs, rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self, lhs: Expr) -> Result<Expr, ParseError> {
        let lhs = self.parse_add(lhs)?;
        let op = match self.peek_kind()? {
            Some(TokenKind::Ge) => ExprOp::Ge,
            Some(TokenKind::Gt) => ExprOp::Gt,
            Some(TokenKind::Le) => ExprOp::Le,
            Some(TokenKind::Lt) => ExprOp::Lt,
            _ => return Ok(lhs),
        };
        let _ = self.get_token()?;
        let operand = self.parse_operand()?;
        let rhs = self.parse_cmp(operand)?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn parse_add(&mut self, lhs: Expr) -> Result<Expr, ParseError> {
        let lhs = self.parse_mul(lhs)?;
        let op = match self.peek_kind()? {
            Some(TokenKind::Plus) => ExprOp::Add,
            Some(TokenKind::Minus) => ExprOp::Sub,
            _ => return Ok(lhs),
        };
        let _ = self.get_token()?;
        let operand = self.parse_operand()?;
        let rhs = self.parse_add(operand)?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn parse_mul(&mut self, lhs: Expr) -> Result<Expr, ParseError> {
        let op = match self.peek_kind()? {
            Some(TokenKind::Mul) => ExprOp::Mul,
            Some(TokenKind::Div) => ExprOp::Div,
            _ => return Ok(lhs),
        };
        let _ = self.get_token()?;
        let operand = self.parse_operand()?;
        let rhs = self.parse_mul(operand)?;
        Ok(Expr::binary(op, lhs, rhs))
    }

    fn parse_operand(&mut self) -> Result<Expr, ParseError> {
        let token = self.require_token()?;
        match token.kind {
            TokenKind::Variable => {
                let (sym, _) = symbol::intern(&token.value, false);
                Ok(Expr::leaf(Term::variable(sym)))
            }
            TokenKind::Identifier | TokenKind::Str => Ok(Expr::leaf(Term::constant(
                token.value,
                token.kind == TokenKind::Str,
            ))),
            _ => Err(Self::error(
                &token.pos,
                format!("invalid expression operand: {}", token),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_all(input: &str) -> Vec<(Clause, ClauseKind)> {
        let mut parser = Parser::new("test", input);
        let mut out = Vec::new();
        while let Some(parsed) = parser.parse().expect("parse failure") {
            out.push(parsed);
        }
        out
    }

    fn parse_err(input: &str) -> ParseError {
        let mut parser = Parser::new("test", input);
        loop {
            match parser.parse() {
                Ok(Some(_)) => continue,
                Ok(None) => panic!("expected a parse error for {:?}", input),
                Err(err) => return err,
            }
        }
    }

    // ========== CLAUSE KINDS ==========

    #[test]
    fn parse_fact() {
        let parsed = parse_all("parent(bill, mary).");
        assert_eq!(parsed.len(), 1);
        let (clause, kind) = &parsed[0];
        assert_eq!(*kind, ClauseKind::Fact);
        assert!(clause.is_fact());
        assert_eq!(format!("{}", clause), "parent(bill, mary)");
    }

    #[test]
    fn parse_rule() {
        let parsed = parse_all("reach(X, Y) :- edge(X, Z), reach(Z, Y).");
        let (clause, kind) = &parsed[0];
        assert_eq!(*kind, ClauseKind::Fact);
        assert_eq!(clause.body.len(), 2);
        assert_eq!(
            format!("{}", clause),
            "reach(X, Y) :- edge(X, Z), reach(Z, Y)"
        );
    }

    #[test]
    fn parse_query_and_retract() {
        let parsed = parse_all("reach(a, X)? old(a)~");
        assert_eq!(parsed[0].1, ClauseKind::Query);
        assert_eq!(parsed[1].1, ClauseKind::Retract);
    }

    #[test]
    fn parse_nullary_atom() {
        let parsed = parse_all("halt.");
        assert!(parsed[0].0.head.terms.is_empty());
    }

    #[test]
    fn parse_multiple_clauses() {
        let parsed = parse_all("e(1,2). e(2,3). tc(X,Y) :- e(X,Y). tc(a,V)?");
        assert_eq!(parsed.len(), 4);
    }

    #[test]
    fn empty_input_parses_to_nothing() {
        assert!(parse_all("").is_empty());
        assert!(parse_all("  % just a comment\n").is_empty());
    }

    // ========== TERMS ==========

    #[test]
    fn variables_share_symbols_within_program() {
        let parsed = parse_all("p(X) :- q(X).");
        let clause = &parsed[0].0;
        assert_eq!(clause.head.terms[0], clause.body[0].terms[0]);
    }

    #[test]
    fn wildcard_occurrences_are_distinct() {
        let parsed = parse_all("p(_, _).");
        let clause = &parsed[0].0;
        assert_ne!(
            clause.head.terms[0], clause.head.terms[1],
            "each wildcard must be a fresh variable"
        );
        assert!(clause.head.terms[0].as_variable().is_some());
    }

    #[test]
    fn string_constants_keep_stringlike_printing() {
        let parsed = parse_all("ship_to(flowers, \"San Francisco\").");
        assert_eq!(
            format!("{}", parsed[0].0),
            "ship_to(flowers, \"San Francisco\")"
        );
    }

    #[test]
    fn integers_parse_as_constants() {
        let parsed = parse_all("edge(1, 2).");
        assert_eq!(parsed[0].0.head.terms[0], Term::constant("1", false));
    }

    // ========== FLAGS ==========

    #[test]
    fn persistent_flag_suffix() {
        let parsed = parse_all("permit(rams, store, rams_couch)p.");
        assert!(parsed[0].0.head.flags.contains(Flags::PERSISTENT));
    }

    #[test]
    fn invalid_flag_is_error() {
        let err = parse_err("permit(a)q.");
        assert!(err.message.contains("invalid flag"), "got: {}", err.message);
    }

    // ========== EXPRESSIONS ==========

    #[test]
    fn comparison_in_rule_body() {
        let parsed = parse_all("big(X) :- n(X), X > 1.");
        let clause = &parsed[0].0;
        assert!(clause.body[1].is_expression());
        assert_eq!(format!("{}", clause.body[1]), "X > 1");
    }

    #[test]
    fn equality_binds_looser_than_addition() {
        let parsed = parse_all("add(A, B, C) :- C = A + B.");
        assert_eq!(format!("{}", parsed[0].0.body[0]), "C = A + B");
        let Term::Expression(expr) = &parsed[0].0.body[0].terms[0] else {
            panic!("expected expression term");
        };
        let Expr::Binary { op, right, .. } = expr.as_ref() else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, ExprOp::Eq, "= must be the outermost operator");
        assert!(matches!(right.as_ref(), Expr::Binary { op: ExprOp::Add, .. }));
    }

    #[test]
    fn multiplication_binds_tighter_than_comparison() {
        let parsed = parse_all("t(X) :- X > 2 * 3.");
        let Term::Expression(expr) = &parsed[0].0.body[0].terms[0] else {
            panic!("expected expression term");
        };
        let Expr::Binary { op, right, .. } = expr.as_ref() else {
            panic!("expected binary expression");
        };
        assert_eq!(*op, ExprOp::Gt);
        assert!(matches!(right.as_ref(), Expr::Binary { op: ExprOp::Mul, .. }));
    }

    #[test]
    fn operators_are_right_associative() {
        let parsed = parse_all("t(A, B, C) :- A - B - C > 0.");
        let Term::Expression(expr) = &parsed[0].0.body[0].terms[0] else {
            panic!("expected expression term");
        };
        // A - (B - C), as emitted by the recursive descent.
        let Expr::Binary { left, .. } = expr.as_ref() else {
            panic!("expected comparison");
        };
        let Expr::Binary { op, right, .. } = left.as_ref() else {
            panic!("expected subtraction");
        };
        assert_eq!(*op, ExprOp::Sub);
        assert!(matches!(right.as_ref(), Expr::Binary { op: ExprOp::Sub, .. }));
    }

    #[test]
    fn expression_head_is_rejected() {
        let err = parse_err("X = 1.");
        assert!(
            err.message.contains("expression not allowed as clause head"),
            "got: {}",
            err.message
        );
    }

    // ========== ERRORS ==========

    #[test]
    fn missing_terminator_is_error() {
        let err = parse_err("p(a)");
        assert!(err.message.contains("unexpected end of input"));
    }

    #[test]
    fn bad_clause_type_is_error() {
        let err = parse_err("p(a), q(b).");
        assert!(err.message.contains("invalid clause type"));
    }

    #[test]
    fn identifier_after_terms_is_a_flags_suffix() {
        // Without a terminator in between, a following identifier is
        // taken as the flags suffix of the previous atom.
        let err = parse_err("p(a) q(b).");
        assert!(err.message.contains("invalid flag"), "got: {}", err.message);
    }

    #[test]
    fn error_carries_position() {
        let err = parse_err("p(a).\nq(b,).");
        assert_eq!(err.position.row, 2, "error must point at the second line");
        assert_eq!(&*err.position.name, "test");
    }

    #[test]
    fn lone_variable_atom_is_error() {
        let err = parse_err("p(a) :- X.");
        assert!(err.message.contains("expected operator after variable"));
    }

    // ========== ROUND TRIP ==========

    #[test]
    fn print_parse_round_trip() {
        let programs = [
            "parent(bill, mary).",
            "reach(X, Y) :- edge(X, Z), reach(Z, Y).",
            "big(X) :- n(X), X > 1.",
            "add(A, B, C) :- C = A + B.",
            "ship_to(flowers, \"San Francisco\").",
        ];
        for program in programs {
            let first = parse_all(program);
            let printed = format!("{}.", first[0].0);
            let second = parse_all(&printed);
            assert!(
                first[0].0.equals(&second[0].0),
                "round trip must preserve structure: {} vs {}",
                first[0].0,
                second[0].0
            );
        }
    }
}
