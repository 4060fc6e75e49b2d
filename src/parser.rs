//! Parser module: recursive descent over the token stream.
//!
//! Precedence, lowest first: `||`, `&&`, prefix `!`, comparisons (which do
//! not chain), `in`, `&`, slices and primaries. Field names are resolved
//! against the schema as they are read; unknown names fail immediately.

use crate::error::{CompileError, Location};
use crate::expr::{
    ComparisonOp, FieldRef, FilterExpr, Literal, LogicalOp, Operand, SetElement, SliceEnd,
    SliceRange,
};
use crate::functions::FunctionRegistry;
use crate::lexer::{Lexer, Token, TokenKind};
use crate::schema::FilterSchema;
use std::mem;
use tracing::trace;

/// Where an operand appears. Unregistered names are only values on the
/// right-hand side of a comparison.
/// Deepest nesting of `!`, parentheses and calls accepted in one filter.
pub const MAX_NESTING_DEPTH: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Test,
    Value,
}

pub struct FilterParser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
    schema: &'a FilterSchema,
    functions: &'a FunctionRegistry,
}

impl<'a> FilterParser<'a> {
    pub fn new(
        input: &str,
        schema: &'a FilterSchema,
        functions: &'a FunctionRegistry,
    ) -> Result<Self, CompileError> {
        let tokens = Lexer::tokenize(input)?;
        trace!(tokens = tokens.len(), "lexed filter");
        Ok(Self {
            tokens,
            pos: 0,
            depth: 0,
            schema,
            functions,
        })
    }

    /// Parses `input` against `schema` with the built-in functions.
    pub fn parse(input: &str, schema: &FilterSchema) -> Result<FilterExpr, CompileError> {
        let functions = FunctionRegistry::with_builtins();
        FilterParser::new(input, schema, &functions)?.parse_filter()
    }

    pub fn parse_filter(&mut self) -> Result<FilterExpr, CompileError> {
        if self.at(&TokenKind::Eof) {
            return Err(CompileError::syntax(
                "filter expression is empty",
                self.peek().location,
            ));
        }
        let expr = self.parse_or()?;
        if !self.at(&TokenKind::Eof) {
            return Err(self.unexpected("'&&', '||' or end of input"));
        }
        Ok(expr)
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_nth(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn at(&self, kind: &TokenKind) -> bool {
        mem::discriminant(&self.peek().kind) == mem::discriminant(kind)
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if token.kind != TokenKind::Eof {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, what: &str) -> Result<Token, CompileError> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(what))
        }
    }

    fn unexpected(&self, expected: &str) -> CompileError {
        let token = self.peek();
        CompileError::syntax(
            format!("expected {expected}, found {}", token.kind),
            token.location,
        )
    }

    /// Runs `parse` one nesting level deeper, failing past [`MAX_NESTING_DEPTH`].
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, CompileError>,
    ) -> Result<T, CompileError> {
        if self.depth >= MAX_NESTING_DEPTH {
            return Err(CompileError::syntax(
                "filter is nested too deeply",
                self.peek().location,
            ));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    // A run of one operator becomes a single chain, so long chains stay shallow.
    fn parse_or(&mut self) -> Result<FilterExpr, CompileError> {
        let first = self.parse_and()?;
        if !self.at(&TokenKind::Or) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&TokenKind::Or) {
            operands.push(self.parse_and()?);
        }
        Ok(FilterExpr::chain(LogicalOp::Or, operands))
    }

    fn parse_and(&mut self) -> Result<FilterExpr, CompileError> {
        let first = self.parse_not()?;
        if !self.at(&TokenKind::And) {
            return Ok(first);
        }
        let mut operands = vec![first];
        while self.eat(&TokenKind::And) {
            operands.push(self.parse_not()?);
        }
        Ok(FilterExpr::chain(LogicalOp::And, operands))
    }

    fn parse_not(&mut self) -> Result<FilterExpr, CompileError> {
        if self.at(&TokenKind::Not) {
            let not = self.advance();
            let operand = self.nested(Self::parse_not)?;
            return Ok(FilterExpr::negate(operand, not.location));
        }
        self.parse_test()
    }

    fn parse_test(&mut self) -> Result<FilterExpr, CompileError> {
        if self.at(&TokenKind::LParen) {
            // `(a & 1) == 1` or a grouped test; try the operand reading first.
            let start = self.pos;
            match self.parse_operand(Side::Test) {
                Ok(operand) if self.at_relation() => return self.parse_relation(operand),
                _ => self.pos = start,
            }
            self.advance();
            let expr = self.nested(Self::parse_or)?;
            self.expect(&TokenKind::RParen, "')'")?;
            return Ok(expr);
        }
        let operand = self.parse_operand(Side::Test)?;
        if self.at_relation() {
            return self.parse_relation(operand);
        }
        self.standalone(operand)
    }

    fn at_relation(&self) -> bool {
        let kind = &self.peek().kind;
        kind.is_comparison()
            || *kind == TokenKind::In
            || (*kind == TokenKind::Not && self.peek_nth(1).kind == TokenKind::In)
    }

    fn parse_relation(&mut self, left: Operand) -> Result<FilterExpr, CompileError> {
        let negated = if self.at(&TokenKind::Not) {
            Some(self.advance().location)
        } else {
            None
        };
        if self.eat(&TokenKind::In) {
            let (set, set_location) = self.parse_set()?;
            let membership = FilterExpr::Membership {
                location: left.location().merge(set_location),
                operand: left,
                set,
                ignore_case: false,
            };
            return Ok(match negated {
                Some(location) => FilterExpr::negate(membership, location),
                None => membership,
            });
        }
        let op_token = self.advance();
        let op = match op_token.kind {
            TokenKind::Eq => ComparisonOp::Eq,
            TokenKind::Ne => ComparisonOp::Neq,
            TokenKind::Lt => ComparisonOp::Lt,
            TokenKind::Le => ComparisonOp::Lte,
            TokenKind::Gt => ComparisonOp::Gt,
            TokenKind::Ge => ComparisonOp::Gte,
            TokenKind::Contains => ComparisonOp::Contains,
            TokenKind::Matches => ComparisonOp::Matches,
            other => {
                return Err(CompileError::syntax(
                    format!("expected a comparison operator, found {other}"),
                    op_token.location,
                ))
            }
        };
        let right = self.parse_operand(Side::Value)?;
        if self.peek().kind.is_comparison() {
            return Err(CompileError::syntax(
                "comparison operators cannot be chained",
                self.peek().location,
            ));
        }
        Ok(FilterExpr::Comparison {
            location: left.location().merge(right.location()),
            left,
            op,
            right,
            ignore_case: false,
        })
    }

    /// An operand used as a test on its own.
    fn standalone(&self, operand: Operand) -> Result<FilterExpr, CompileError> {
        let location = operand.location();
        match operand {
            Operand::Literal { value: Literal::Unparsed(text), .. } if is_bool_word(&text) => {
                Ok(FilterExpr::Constant {
                    value: text.eq_ignore_ascii_case("true"),
                    location,
                })
            }
            Operand::Literal { .. } => Err(CompileError::syntax(
                "a literal on its own is not a test; compare it with a field",
                location,
            )),
            Operand::BitAnd { .. } => Ok(FilterExpr::Comparison {
                left: operand,
                op: ComparisonOp::Neq,
                right: Operand::Literal {
                    value: Literal::Unparsed("0".to_string()),
                    location,
                },
                ignore_case: false,
                location,
            }),
            operand => Ok(FilterExpr::Exists { operand, location }),
        }
    }

    fn parse_operand(&mut self, side: Side) -> Result<Operand, CompileError> {
        let mut left = self.parse_primary(side)?;
        while self.eat(&TokenKind::BitAnd) {
            let right = self.parse_primary(Side::Value)?;
            left = Operand::BitAnd {
                location: left.location().merge(right.location()),
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_primary(&mut self, side: Side) -> Result<Operand, CompileError> {
        let token = self.advance();
        let operand = match token.kind {
            TokenKind::LParen => {
                let inner = self.nested(|p| p.parse_operand(side))?;
                self.expect(&TokenKind::RParen, "')'")?;
                inner
            }
            TokenKind::Identifier if self.at(&TokenKind::LParen) => self.parse_call(token)?,
            TokenKind::Identifier => self.resolve_identifier(token, side)?,
            TokenKind::Literal => Operand::Literal {
                value: Literal::Unparsed(token.lexeme),
                location: token.location,
            },
            TokenKind::Str(bytes) => Operand::Literal {
                value: Literal::Quoted(bytes),
                location: token.location,
            },
            other => {
                return Err(CompileError::syntax(
                    format!("expected a field, literal or function call, found {other}"),
                    token.location,
                ))
            }
        };
        self.parse_slices(operand)
    }

    fn resolve_identifier(&self, token: Token, side: Side) -> Result<Operand, CompileError> {
        let name = token.lexeme;
        if let (Some(desc), Some(id)) = (self.schema.lookup(&name), self.schema.field_id(&name)) {
            return Ok(Operand::Field {
                field: FieldRef {
                    id,
                    name: desc.name.clone(),
                    ftype: desc.ftype,
                },
                location: token.location,
            });
        }
        if side == Side::Value || is_bool_word(&name) {
            return Ok(Operand::Literal {
                value: Literal::Unparsed(name),
                location: token.location,
            });
        }
        Err(CompileError::unknown_field(&name, token.location))
    }

    fn parse_call(&mut self, name: Token) -> Result<Operand, CompileError> {
        if !self.functions.contains(&name.lexeme) {
            return Err(CompileError::syntax(
                format!("function '{}' does not exist", name.lexeme),
                name.location,
            ));
        }
        self.expect(&TokenKind::LParen, "'('")?;
        let mut args = Vec::new();
        if !self.at(&TokenKind::RParen) {
            loop {
                args.push(self.nested(|p| p.parse_operand(Side::Test))?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        let close = self.expect(&TokenKind::RParen, "')' after function arguments")?;
        Ok(Operand::FunctionCall {
            name: name.lexeme,
            args,
            location: name.location.merge(close.location),
        })
    }

    fn parse_slices(&mut self, mut operand: Operand) -> Result<Operand, CompileError> {
        while self.at(&TokenKind::LBracket) {
            if operand.is_literal() {
                return Err(CompileError::syntax(
                    "a literal cannot be sliced",
                    self.peek().location,
                ));
            }
            self.advance();
            let mut ranges = Vec::new();
            loop {
                ranges.push(self.parse_slice_range()?);
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            let close = self.expect(&TokenKind::RBracket, "']'")?;
            operand = Operand::Slice {
                location: operand.location().merge(close.location),
                base: Box::new(operand),
                ranges,
            };
        }
        Ok(operand)
    }

    fn parse_slice_range(&mut self) -> Result<SliceRange, CompileError> {
        let first = self.peek().location;
        let start = match self.peek().kind.clone() {
            TokenKind::Integer(n) => {
                self.advance();
                n
            }
            TokenKind::Colon => 0,
            _ => return Err(self.unexpected("a slice offset")),
        };
        let end = if self.eat(&TokenKind::Colon) {
            match self.peek().kind.clone() {
                TokenKind::Plus => {
                    self.advance();
                    match self.peek().kind.clone() {
                        TokenKind::Integer(n) => {
                            self.advance();
                            SliceEnd::Length(n)
                        }
                        _ => return Err(self.unexpected("a slice length")),
                    }
                }
                TokenKind::Integer(n) => {
                    self.advance();
                    SliceEnd::Offset(n)
                }
                _ => SliceEnd::ToEnd,
            }
        } else {
            SliceEnd::Length(1)
        };
        Ok(SliceRange {
            start,
            end,
            location: first.merge(self.previous().location),
        })
    }

    fn parse_set(&mut self) -> Result<(Vec<SetElement>, Location), CompileError> {
        let open = self.expect(&TokenKind::LBrace, "'{' after 'in'")?;
        let mut set = Vec::new();
        while !self.at(&TokenKind::RBrace) {
            set.push(self.parse_set_element()?);
            self.eat(&TokenKind::Comma);
        }
        let close = self.advance();
        let location = open.location.merge(close.location);
        if set.is_empty() {
            return Err(CompileError::syntax(
                "a set must have at least one element",
                location,
            ));
        }
        Ok((set, location))
    }

    fn parse_set_element(&mut self) -> Result<SetElement, CompileError> {
        let start = self.peek().location;
        if self.eat(&TokenKind::DotDot) {
            let high = self.parse_set_value()?;
            return Ok(SetElement::Range {
                low: None,
                high: Some(high),
                location: start.merge(self.previous().location),
            });
        }
        let low = self.parse_set_value()?;
        if !self.eat(&TokenKind::DotDot) {
            return Ok(SetElement::Value {
                value: low,
                location: start.merge(self.previous().location),
            });
        }
        let high = if self.at_set_value() {
            Some(self.parse_set_value()?)
        } else {
            None
        };
        Ok(SetElement::Range {
            low: Some(low),
            high,
            location: start.merge(self.previous().location),
        })
    }

    fn at_set_value(&self) -> bool {
        matches!(
            self.peek().kind,
            TokenKind::Literal | TokenKind::Identifier | TokenKind::Str(_)
        )
    }

    fn parse_set_value(&mut self) -> Result<Literal, CompileError> {
        if !self.at_set_value() {
            return Err(self.unexpected("a set element"));
        }
        let token = self.advance();
        match token.kind {
            TokenKind::Str(bytes) => Ok(Literal::Quoted(bytes)),
            TokenKind::Identifier if self.schema.lookup(&token.lexeme).is_some() => {
                Err(CompileError::syntax(
                    format!("set elements must be literals, but \"{}\" is a field", token.lexeme),
                    token.location,
                ))
            }
            _ => Ok(Literal::Unparsed(token.lexeme)),
        }
    }
}

fn is_bool_word(text: &str) -> bool {
    text.eq_ignore_ascii_case("true") || text.eq_ignore_ascii_case("false")
}
