use std::fmt;
use std::sync::Arc;

use crate::parser::ParseError;

/// An input position: file name, 1-based row, 0-based column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub name: Arc<str>,
    pub row: u32,
    pub col: u32,
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.name, self.row, self.col)
    }
}

/// Token kinds of the datalog surface syntax.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    LParen,
    Comma,
    RParen,
    Dot,
    Tilde,
    Question,
    /// `:-`
    Arrow,
    /// `_`, an anonymous variable; each occurrence is distinct.
    Wildcard,
    Eq,
    Ge,
    Gt,
    Le,
    Lt,
    Mul,
    Div,
    Plus,
    Minus,
    /// Uppercase-initial identifier.
    Variable,
    Identifier,
    /// Double-quoted string literal.
    Str,
}

impl TokenKind {
    /// True for the infix expression operators.
    pub fn is_operator(self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::Ge
                | TokenKind::Gt
                | TokenKind::Le
                | TokenKind::Lt
                | TokenKind::Mul
                | TokenKind::Div
                | TokenKind::Plus
                | TokenKind::Minus
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::LParen => "(",
            TokenKind::Comma => ",",
            TokenKind::RParen => ")",
            TokenKind::Dot => ".",
            TokenKind::Tilde => "~",
            TokenKind::Question => "?",
            TokenKind::Arrow => ":-",
            TokenKind::Wildcard => "_",
            TokenKind::Eq => "=",
            TokenKind::Ge => ">=",
            TokenKind::Gt => ">",
            TokenKind::Le => "<=",
            TokenKind::Lt => "<",
            TokenKind::Mul => "*",
            TokenKind::Div => "/",
            TokenKind::Plus => "+",
            TokenKind::Minus => "-",
            TokenKind::Variable => "{variable}",
            TokenKind::Identifier => "{identifier}",
            TokenKind::Str => "{string}",
        };
        write!(f, "{}", name)
    }
}

/// A lexed token with its source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub value: String,
    pub pos: Position,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            TokenKind::Variable | TokenKind::Identifier | TokenKind::Str => {
                write!(f, "{}", self.value)
            }
            kind => write!(f, "{}", kind),
        }
    }
}

/// Lexical analyzer over a full program text.
pub struct Lexer {
    name: Arc<str>,
    chars: Vec<char>,
    idx: usize,
    row: u32,
    col: u32,
    // Position before the most recent read, for one-step unread.
    last: (usize, u32, u32),
}

impl Lexer {
    pub fn new(name: &str, input: &str) -> Lexer {
        Lexer {
            name: Arc::from(name),
            chars: input.chars().collect(),
            idx: 0,
            row: 1,
            col: 0,
            last: (0, 1, 0),
        }
    }

    /// Current input position.
    pub fn pos(&self) -> Position {
        Position {
            name: self.name.clone(),
            row: self.row,
            col: self.col,
        }
    }

    fn read_char(&mut self) -> Option<char> {
        let ch = *self.chars.get(self.idx)?;
        self.last = (self.idx, self.row, self.col);
        self.idx += 1;
        if ch == '\n' {
            self.row += 1;
            self.col = 0;
        } else {
            self.col += 1;
        }
        Some(ch)
    }

    fn unread_char(&mut self) {
        let (idx, row, col) = self.last;
        self.idx = idx;
        self.row = row;
        self.col = col;
    }

    fn peek_char(&self) -> Option<char> {
        self.chars.get(self.idx).copied()
    }

    fn error(&self, pos: Position, message: impl Into<String>) -> ParseError {
        ParseError {
            message: message.into(),
            position: pos,
        }
    }

    /// Get the next token, or None at end of input.
    pub fn next_token(&mut self) -> Result<Option<Token>, ParseError> {
        loop {
            let pos = self.pos();
            let Some(ch) = self.read_char() else {
                return Ok(None);
            };
            if ch.is_whitespace() {
                continue;
            }
            let token_pos = pos.clone();
            let simple = move |kind| {
                Ok(Some(Token {
                    kind,
                    value: String::new(),
                    pos: token_pos.clone(),
                }))
            };
            return match ch {
                '%' => {
                    self.skip_comment();
                    continue;
                }
                '(' => simple(TokenKind::LParen),
                ',' => simple(TokenKind::Comma),
                ')' => simple(TokenKind::RParen),
                '.' => simple(TokenKind::Dot),
                '~' => simple(TokenKind::Tilde),
                '?' => simple(TokenKind::Question),
                '=' => simple(TokenKind::Eq),
                '*' => simple(TokenKind::Mul),
                '/' => simple(TokenKind::Div),
                '+' => simple(TokenKind::Plus),
                '-' => simple(TokenKind::Minus),
                '>' => {
                    if self.peek_char() == Some('=') {
                        let _ = self.read_char();
                        simple(TokenKind::Ge)
                    } else {
                        simple(TokenKind::Gt)
                    }
                }
                '<' => {
                    if self.peek_char() == Some('=') {
                        let _ = self.read_char();
                        simple(TokenKind::Le)
                    } else {
                        simple(TokenKind::Lt)
                    }
                }
                ':' => match self.read_char() {
                    Some('-') => simple(TokenKind::Arrow),
                    Some(other) => {
                        Err(self.error(pos, format!("invalid input after ':': {:?}", other)))
                    }
                    None => Err(self.error(pos, "unexpected end of input after ':'")),
                },
                '"' => self.read_string(pos).map(Some),
                ch if ch.is_uppercase() => self.read_variable(ch, pos).map(Some),
                ch => self.read_identifier(ch, pos).map(Some),
            };
        }
    }

    fn skip_comment(&mut self) {
        while let Some(ch) = self.read_char() {
            if ch == '\n' {
                return;
            }
        }
    }

    fn read_variable(&mut self, first: char, pos: Position) -> Result<Token, ParseError> {
        let mut value = String::from(first);
        while let Some(ch) = self.read_char() {
            if ch.is_alphanumeric() || ch == '_' {
                value.push(ch);
            } else {
                self.unread_char();
                break;
            }
        }
        Ok(Token {
            kind: TokenKind::Variable,
            value,
            pos,
        })
    }

    fn read_string(&mut self, pos: Position) -> Result<Token, ParseError> {
        let mut value = String::new();
        loop {
            let Some(ch) = self.read_char() else {
                return Err(self.error(pos, "unterminated string"));
            };
            match ch {
                '"' => break,
                '\\' => {
                    let Some(escaped) = self.read_char() else {
                        return Err(self.error(pos, "unterminated string"));
                    };
                    match escaped {
                        // Line continuation.
                        '\n' => continue,
                        'a' => value.push('\u{7}'),
                        'b' => value.push('\u{8}'),
                        'f' => value.push('\u{c}'),
                        'n' => value.push('\n'),
                        'r' => value.push('\r'),
                        't' => value.push('\t'),
                        'v' => value.push('\u{b}'),
                        other => value.push(other),
                    }
                }
                ch => value.push(ch),
            }
        }
        Ok(Token {
            kind: TokenKind::Str,
            value,
            pos,
        })
    }

    fn read_identifier(&mut self, first: char, pos: Position) -> Result<Token, ParseError> {
        if !is_identifier_char(first) {
            return Err(self.error(pos, format!("invalid input: {:?}", first)));
        }
        let mut value = String::from(first);
        while let Some(ch) = self.read_char() {
            if is_identifier_char(ch) {
                value.push(ch);
            } else {
                self.unread_char();
                break;
            }
        }
        if value == "_" {
            return Ok(Token {
                kind: TokenKind::Wildcard,
                value: String::new(),
                pos,
            });
        }
        Ok(Token {
            kind: TokenKind::Identifier,
            value,
            pos,
        })
    }
}

/// Identifier characters: letters, digits, and punctuation not claimed
/// by the syntax. `event_id` and bare integers are single tokens, while
/// `sshd-auth` splits at the minus, so names with dashes or dots (IP
/// addresses, program names) must be quoted.
fn is_identifier_char(ch: char) -> bool {
    match ch {
        '(' | ',' | ')' | ':' | '.' | '~' | '?' | '"' | '%' | '*' | '/' | '-' => false,
        '=' | '<' | '>' | '+' => false,
        ch if ch.is_whitespace() => false,
        ch => ch.is_alphanumeric() || matches!(ch, '_' | '!' | '#' | '&' | '\'' | ';' | '@'),
    }
}

/// Escape a value so that it is a valid datalog string literal.
pub fn stringify(value: &str) -> String {
    let mut result = String::with_capacity(value.len() + 2);
    result.push('"');
    for ch in value.chars() {
        match ch {
            '\u{7}' => result.push_str("\\a"),
            '\u{8}' => result.push_str("\\b"),
            '\u{c}' => result.push_str("\\f"),
            '\n' => result.push_str("\\n"),
            '\r' => result.push_str("\\r"),
            '\t' => result.push_str("\\t"),
            '\u{b}' => result.push_str("\\v"),
            '"' => result.push_str("\\\""),
            '\\' => result.push_str("\\\\"),
            ch => result.push(ch),
        }
    }
    result.push('"');
    result
}
