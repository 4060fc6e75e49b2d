//! Lexer module: turns filter text into located tokens.
//!
//! Unquoted words are kept as raw text: whether `ab` is a field, a hex byte or
//! an enumerated name is decided by the parser and the semantic checker. Inside
//! slice brackets the lexer switches to a small integer-only vocabulary.

use crate::error::{CompileError, Location};
use crate::types::parse_integer;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word shaped like a name (`tcp.port`, `SYN`).
    Identifier,
    /// Any other unquoted word (`10.0.0.1`, `0x50`, `aa:bb:cc`).
    Literal,
    /// Quoted string, escapes already resolved.
    Str(Vec<u8>),
    /// Integer inside slice brackets.
    Integer(i64),
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Contains,
    Matches,
    In,
    And,
    Or,
    Not,
    BitAnd,
    DotDot,
    Colon,
    Plus,
    Comma,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    LParen,
    RParen,
    Eof,
}

impl TokenKind {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            TokenKind::Eq
                | TokenKind::Ne
                | TokenKind::Lt
                | TokenKind::Le
                | TokenKind::Gt
                | TokenKind::Ge
                | TokenKind::Contains
                | TokenKind::Matches
        )
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TokenKind::Identifier => "identifier",
            TokenKind::Literal => "literal",
            TokenKind::Str(_) => "string",
            TokenKind::Integer(_) => "integer",
            TokenKind::Eq => "'=='",
            TokenKind::Ne => "'!='",
            TokenKind::Lt => "'<'",
            TokenKind::Le => "'<='",
            TokenKind::Gt => "'>'",
            TokenKind::Ge => "'>='",
            TokenKind::Contains => "'contains'",
            TokenKind::Matches => "'matches'",
            TokenKind::In => "'in'",
            TokenKind::And => "'&&'",
            TokenKind::Or => "'||'",
            TokenKind::Not => "'!'",
            TokenKind::BitAnd => "'&'",
            TokenKind::DotDot => "'..'",
            TokenKind::Colon => "':'",
            TokenKind::Plus => "'+'",
            TokenKind::Comma => "','",
            TokenKind::LBracket => "'['",
            TokenKind::RBracket => "']'",
            TokenKind::LBrace => "'{'",
            TokenKind::RBrace => "'}'",
            TokenKind::LParen => "'('",
            TokenKind::RParen => "')'",
            TokenKind::Eof => "end of input",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub location: Location,
}

fn keyword(word: &str) -> Option<TokenKind> {
    let kind = match word.to_ascii_lowercase().as_str() {
        "and" => TokenKind::And,
        "or" => TokenKind::Or,
        "not" => TokenKind::Not,
        "in" => TokenKind::In,
        "contains" => TokenKind::Contains,
        "matches" => TokenKind::Matches,
        "eq" => TokenKind::Eq,
        "ne" => TokenKind::Ne,
        "lt" => TokenKind::Lt,
        "le" => TokenKind::Le,
        "gt" => TokenKind::Gt,
        "ge" => TokenKind::Ge,
        _ => return None,
    };
    Some(kind)
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | ':' | '/' | '-')
}

fn is_identifier(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

/// Lazy, restartable token stream over a filter string.
pub struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    bracket_depth: usize,
    finished: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            pos: 0,
            bracket_depth: 0,
            finished: false,
        }
    }

    /// Rewinds to the start of the input.
    pub fn reset(&mut self) {
        self.pos = 0;
        self.bracket_depth = 0;
        self.finished = false;
    }

    /// Lexes the whole input; the last token is always `Eof`.
    pub fn tokenize(input: &str) -> Result<Vec<Token>, CompileError> {
        Lexer::new(input).collect()
    }

    fn peek(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_nth(&self, n: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(n)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn token(&self, kind: TokenKind, start: usize) -> Token {
        Token {
            kind,
            lexeme: self.input[start..self.pos].to_string(),
            location: Location::new(start, self.pos - start),
        }
    }

    fn skip_trivia(&mut self) -> Result<(), CompileError> {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.bump();
                }
                Some('#') => {
                    while let Some(c) = self.bump() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some('/') if self.peek_nth(1) == Some('*') => {
                    let start = self.pos;
                    self.pos += 2;
                    match self.input[self.pos..].find("*/") {
                        Some(end) => self.pos += end + 2,
                        None => {
                            return Err(CompileError::lexical(
                                "unterminated comment",
                                Location::new(start, self.input.len() - start),
                            ))
                        }
                    }
                }
                _ => return Ok(()),
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, CompileError> {
        self.skip_trivia()?;
        let start = self.pos;
        let Some(c) = self.peek() else {
            return Ok(self.token(TokenKind::Eof, start));
        };
        if self.bracket_depth > 0 {
            return self.slice_token(c, start);
        }
        let next = self.peek_nth(1);
        let (kind, width) = match (c, next) {
            ('"', _) => return self.string_token(start),
            ('(', _) => (TokenKind::LParen, 1),
            (')', _) => (TokenKind::RParen, 1),
            ('{', _) => (TokenKind::LBrace, 1),
            ('}', _) => (TokenKind::RBrace, 1),
            (',', _) => (TokenKind::Comma, 1),
            ('[', _) => {
                self.bracket_depth += 1;
                (TokenKind::LBracket, 1)
            }
            (']', _) => (TokenKind::RBracket, 1),
            ('=', Some('=')) => (TokenKind::Eq, 2),
            ('!', Some('=')) => (TokenKind::Ne, 2),
            ('!', _) => (TokenKind::Not, 1),
            ('<', Some('=')) => (TokenKind::Le, 2),
            ('<', _) => (TokenKind::Lt, 1),
            ('>', Some('=')) => (TokenKind::Ge, 2),
            ('>', _) => (TokenKind::Gt, 1),
            ('~', _) => (TokenKind::Matches, 1),
            ('&', Some('&')) => (TokenKind::And, 2),
            ('&', _) => (TokenKind::BitAnd, 1),
            ('|', Some('|')) => (TokenKind::Or, 2),
            ('.', Some('.')) => (TokenKind::DotDot, 2),
            (c, _) if c.is_ascii_alphanumeric() || c == '_' => return Ok(self.word_token(start)),
            (':', Some(':')) => return Ok(self.word_token(start)),
            ('-', Some(d)) if d.is_ascii_digit() => return Ok(self.word_token(start)),
            ('=', _) => {
                return Err(CompileError::lexical(
                    "unexpected '=' (use '==' for equality)",
                    Location::new(start, 1),
                ))
            }
            (other, _) => {
                return Err(CompileError::lexical(
                    format!("unexpected character '{other}'"),
                    Location::new(start, other.len_utf8()),
                ))
            }
        };
        self.pos += width;
        Ok(self.token(kind, start))
    }

    fn word_token(&mut self, start: usize) -> Token {
        self.bump();
        while let Some(c) = self.peek() {
            if c == '+' && self.at_exponent_sign(start) {
                self.bump();
                continue;
            }
            if !is_word_char(c) || (c == '.' && self.peek_nth(1) == Some('.')) {
                break;
            }
            self.bump();
        }
        let word = &self.input[start..self.pos];
        let kind = match keyword(word) {
            Some(kind) => kind,
            None if is_identifier(word) => TokenKind::Identifier,
            None => TokenKind::Literal,
        };
        self.token(kind, start)
    }

    /// `+` continues a decimal number such as `1.5e+3` when it follows the exponent marker.
    fn at_exponent_sign(&self, start: usize) -> bool {
        let word = &self.input[start..self.pos];
        let digits = word.strip_prefix('-').unwrap_or(word);
        digits.starts_with(|c: char| c.is_ascii_digit())
            && !digits.starts_with("0x")
            && !digits.starts_with("0X")
            && word.ends_with(['e', 'E'])
            && self.peek_nth(1).is_some_and(|c| c.is_ascii_digit())
    }

    fn slice_token(&mut self, c: char, start: usize) -> Result<Token, CompileError> {
        let kind = match c {
            ':' => TokenKind::Colon,
            '+' => TokenKind::Plus,
            ',' => TokenKind::Comma,
            ']' => {
                self.bracket_depth -= 1;
                TokenKind::RBracket
            }
            c if c.is_ascii_digit() || (c == '-' && matches!(self.peek_nth(1), Some(d) if d.is_ascii_digit())) => {
                self.bump();
                while matches!(self.peek(), Some(d) if d.is_ascii_alphanumeric()) {
                    self.bump();
                }
                let text = &self.input[start..self.pos];
                let value = parse_integer(text)
                    .and_then(|n| i64::try_from(n).ok())
                    .ok_or_else(|| {
                        CompileError::lexical(
                            format!("\"{text}\" is not a valid slice offset"),
                            Location::new(start, self.pos - start),
                        )
                    })?;
                return Ok(self.token(TokenKind::Integer(value), start));
            }
            other => {
                return Err(CompileError::lexical(
                    format!("unexpected character '{other}' in slice"),
                    Location::new(start, other.len_utf8()),
                ))
            }
        };
        self.pos += 1;
        Ok(self.token(kind, start))
    }

    fn string_token(&mut self, start: usize) -> Result<Token, CompileError> {
        self.bump();
        let mut bytes = Vec::new();
        loop {
            let Some(c) = self.bump() else {
                return Err(CompileError::lexical(
                    "unterminated string literal",
                    Location::new(start, self.pos - start),
                ));
            };
            match c {
                '"' => break,
                '\\' => self.escape(&mut bytes)?,
                c => {
                    let mut buf = [0u8; 4];
                    bytes.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
                }
            }
        }
        Ok(self.token(TokenKind::Str(bytes), start))
    }

    fn escape(&mut self, out: &mut Vec<u8>) -> Result<(), CompileError> {
        let escape_start = self.pos - 1;
        let invalid = |lexer: &Self| {
            CompileError::lexical(
                "invalid escape sequence",
                Location::new(escape_start, lexer.pos - escape_start),
            )
        };
        let Some(c) = self.bump() else {
            return Err(invalid(self));
        };
        let byte = match c {
            '\\' => b'\\',
            '"' => b'"',
            '\'' => b'\'',
            'n' => b'\n',
            't' => b'\t',
            'r' => b'\r',
            'a' => 0x07,
            'b' => 0x08,
            'f' => 0x0c,
            'v' => 0x0b,
            'x' => {
                let digits_start = self.pos;
                while self.pos - digits_start < 2 && matches!(self.peek(), Some(d) if d.is_ascii_hexdigit()) {
                    self.bump();
                }
                u8::from_str_radix(&self.input[digits_start..self.pos], 16)
                    .map_err(|_| invalid(self))?
            }
            '0'..='7' => {
                let digits_start = self.pos - 1;
                while self.pos - digits_start < 3 && matches!(self.peek(), Some('0'..='7')) {
                    self.bump();
                }
                u8::from_str_radix(&self.input[digits_start..self.pos], 8)
                    .map_err(|_| invalid(self))?
            }
            _ => return Err(invalid(self)),
        };
        out.push(byte);
        Ok(())
    }
}

impl Iterator for Lexer<'_> {
    type Item = Result<Token, CompileError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let token = self.next_token();
        if matches!(&token, Err(_) | Ok(Token { kind: TokenKind::Eof, .. })) {
            self.finished = true;
        }
        Some(token)
    }
}
