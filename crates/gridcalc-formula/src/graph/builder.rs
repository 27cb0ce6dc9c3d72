//! Formula text to expression graph
//!
//! A hand-written scanner feeds a chain builder. Operands are linked into a
//! flat chain with the operator that follows them; nothing is reordered here,
//! precedence is applied by the compiler.

use lazy_regex::regex;

use super::{ExpressionGraph, ExpressionKind, ExpressionNode, NodeId, Operator};
use crate::context::ParsingConfiguration;
use crate::error::{FormulaError, FormulaResult};
use crate::provider::AddressCache;
use crate::value::FormulaValue;
use gridcalc_core::{CellError, CellRange};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    String(String),
    Boolean(bool),
    Error(CellError),
    /// Function or defined name
    Identifier(String),
    /// `A1`, `A1:B2`, `A:C` or `2:5`, optionally sheet-qualified
    Reference {
        sheet: Option<String>,
        address: String,
    },
    Operator(Operator),
    Minus,
    Plus,
    Percent,
    Comma,
    Semicolon,
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    Eof,
}

struct Scanner<'s> {
    input: &'s str,
    pos: usize,
}

impl<'s> Scanner<'s> {
    fn new(input: &'s str) -> Self {
        Self { input, pos: 0 }
    }

    fn rest(&self) -> &'s str {
        &self.input[self.pos..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.rest().chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }

    fn error(&self, message: &str) -> FormulaError {
        FormulaError::Parse(format!("{} at position {}", message, self.pos))
    }

    fn next_token(&mut self) -> FormulaResult<Token> {
        self.skip_whitespace();
        let Some(c) = self.peek_char() else {
            return Ok(Token::Eof);
        };

        let single = match c {
            '+' => Some(Token::Plus),
            '-' => Some(Token::Minus),
            '*' => Some(Token::Operator(Operator::Multiply)),
            '/' => Some(Token::Operator(Operator::Divide)),
            '^' => Some(Token::Operator(Operator::Power)),
            '&' => Some(Token::Operator(Operator::Concat)),
            '=' => Some(Token::Operator(Operator::Equal)),
            '%' => Some(Token::Percent),
            ',' => Some(Token::Comma),
            ';' => Some(Token::Semicolon),
            '(' => Some(Token::LeftParen),
            ')' => Some(Token::RightParen),
            '{' => Some(Token::LeftBrace),
            '}' => Some(Token::RightBrace),
            _ => None,
        };
        if let Some(token) = single {
            self.advance();
            return Ok(token);
        }

        match c {
            '<' => {
                self.advance();
                Ok(match self.peek_char() {
                    Some('=') => {
                        self.advance();
                        Token::Operator(Operator::LessEqual)
                    }
                    Some('>') => {
                        self.advance();
                        Token::Operator(Operator::NotEqual)
                    }
                    _ => Token::Operator(Operator::Less),
                })
            }
            '>' => {
                self.advance();
                if self.peek_char() == Some('=') {
                    self.advance();
                    Ok(Token::Operator(Operator::GreaterEqual))
                } else {
                    Ok(Token::Operator(Operator::Greater))
                }
            }
            '"' => self.scan_string(),
            '\'' => {
                let sheet = self.scan_quoted_sheet()?;
                self.scan_reference(Some(sheet))
            }
            '#' => self.scan_error(),
            _ if self.at_whole_row_range() => self.scan_reference(None),
            _ if c.is_ascii_digit()
                || (c == '.' && self.peek_char_at(1).is_some_and(|d| d.is_ascii_digit())) =>
            {
                self.scan_number()
            }
            _ if c.is_ascii_alphabetic() || c == '_' || c == '$' => self.scan_word(),
            _ => Err(self.error(&format!("unexpected character '{}'", c))),
        }
    }

    fn at_whole_row_range(&self) -> bool {
        regex!(r"^\$?\d+:\$?\d+").is_match(self.rest())
    }

    fn scan_string(&mut self) -> FormulaResult<Token> {
        self.advance();
        let mut text = String::new();
        loop {
            match self.peek_char() {
                Some('"') if self.peek_char_at(1) == Some('"') => {
                    text.push('"');
                    self.advance();
                    self.advance();
                }
                Some('"') => {
                    self.advance();
                    return Ok(Token::String(text));
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
                None => return Err(self.error("unterminated string")),
            }
        }
    }

    fn scan_quoted_sheet(&mut self) -> FormulaResult<String> {
        self.advance();
        let mut name = String::new();
        loop {
            match self.peek_char() {
                Some('\'') if self.peek_char_at(1) == Some('\'') => {
                    name.push('\'');
                    self.advance();
                    self.advance();
                }
                Some('\'') => {
                    self.advance();
                    break;
                }
                Some(c) => {
                    name.push(c);
                    self.advance();
                }
                None => return Err(self.error("unterminated sheet name")),
            }
        }
        if self.peek_char() != Some('!') {
            return Err(self.error("expected '!' after sheet name"));
        }
        self.advance();
        Ok(name)
    }

    fn scan_number(&mut self) -> FormulaResult<Token> {
        let found = regex!(r"^(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?")
            .find(self.rest())
            .map(|m| m.as_str())
            .ok_or_else(|| self.error("invalid number"))?;
        let value = found
            .parse::<f64>()
            .map_err(|_| self.error(&format!("invalid number '{}'", found)))?;
        self.pos += found.len();
        Ok(Token::Number(value))
    }

    fn scan_error(&mut self) -> FormulaResult<Token> {
        let found = regex!(r"^#(NULL!|DIV/0!|VALUE!|REF!|NAME\?|NUM!|N/A)"i)
            .find(self.rest())
            .map(|m| m.as_str())
            .ok_or_else(|| self.error("unknown error literal"))?;
        let error = CellError::parse(found).ok_or_else(|| self.error("unknown error literal"))?;
        self.pos += found.len();
        Ok(Token::Error(error))
    }

    /// A reference after an optional sheet prefix has been consumed
    fn scan_reference(&mut self, sheet: Option<String>) -> FormulaResult<Token> {
        let found = regex!(
            r"^(\$?[A-Za-z]{1,3}\$?\d+(:\$?[A-Za-z]{1,3}\$?\d+)?|\$?[A-Za-z]{1,3}:\$?[A-Za-z]{1,3}|\$?\d+:\$?\d+)"
        )
        .find(self.rest())
        .map(|m| m.as_str())
        .ok_or_else(|| self.error("expected a cell reference"))?;
        self.pos += found.len();
        Ok(Token::Reference {
            sheet,
            address: found.to_string(),
        })
    }

    /// Identifier, boolean, sheet prefix or unqualified reference
    fn scan_word(&mut self) -> FormulaResult<Token> {
        let rest = self.rest();

        if let Some(m) = regex!(r"^[A-Za-z_][A-Za-z0-9_.]*!").find(rest) {
            let sheet = m.as_str().trim_end_matches('!').to_string();
            self.pos += m.as_str().len();
            return self.scan_reference(Some(sheet));
        }

        let reference = regex!(
            r"^(\$?[A-Za-z]{1,3}\$?\d+(:\$?[A-Za-z]{1,3}\$?\d+)?|\$?[A-Za-z]{1,3}:\$?[A-Za-z]{1,3})"
        );
        if let Some(m) = reference.find(rest) {
            let after = rest[m.end()..].chars().next();
            let continues = after.is_some_and(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.' || c == '(');
            if !continues {
                self.pos += m.as_str().len();
                return Ok(Token::Reference {
                    sheet: None,
                    address: m.as_str().to_string(),
                });
            }
        }

        let word = regex!(r"^[A-Za-z_][A-Za-z0-9_.]*")
            .find(rest)
            .map(|m| m.as_str())
            .ok_or_else(|| self.error("expected a name"))?;
        self.pos += word.len();

        let next_is_paren = {
            let mut lookahead = Scanner {
                input: self.input,
                pos: self.pos,
            };
            lookahead.skip_whitespace();
            lookahead.peek_char() == Some('(')
        };
        if !next_is_paren {
            if word.eq_ignore_ascii_case("TRUE") {
                return Ok(Token::Boolean(true));
            }
            if word.eq_ignore_ascii_case("FALSE") {
                return Ok(Token::Boolean(false));
            }
        }
        Ok(Token::Identifier(word.to_string()))
    }
}

/// Builds an [`ExpressionGraph`] from formula text
///
/// The leading `=` is optional. When an [`AddressCache`] is supplied and
/// `intern_references` is set, references are stored in the cache and the
/// graph holds their ids.
pub struct GraphBuilder<'s, 'c> {
    scanner: Scanner<'s>,
    current: Token,
    graph: ExpressionGraph,
    max_depth: usize,
    depth: usize,
    cache: Option<&'c mut AddressCache>,
}

impl<'s, 'c> GraphBuilder<'s, 'c> {
    pub fn new(
        formula: &'s str,
        configuration: &ParsingConfiguration,
        cache: Option<&'c mut AddressCache>,
    ) -> Self {
        let trimmed = formula.trim();
        let body = trimmed.strip_prefix('=').unwrap_or(trimmed);
        Self {
            scanner: Scanner::new(body),
            current: Token::Eof,
            graph: ExpressionGraph::new(),
            max_depth: configuration.max_nesting_depth,
            depth: 0,
            cache: if configuration.intern_references {
                cache
            } else {
                None
            },
        }
    }

    pub fn build(mut self) -> FormulaResult<ExpressionGraph> {
        self.advance()?;
        if self.current == Token::Eof {
            return Err(FormulaError::Parse("empty formula".into()));
        }
        let root = self.parse_chain()?;
        if self.current != Token::Eof {
            return Err(self
                .scanner
                .error(&format!("unexpected {:?} after expression", self.current)));
        }
        self.graph.set_root(root);
        Ok(self.graph)
    }

    fn advance(&mut self) -> FormulaResult<()> {
        self.current = self.scanner.next_token()?;
        Ok(())
    }

    fn expect(&mut self, expected: Token) -> FormulaResult<()> {
        if self.current == expected {
            self.advance()
        } else {
            Err(self
                .scanner
                .error(&format!("expected {:?}, found {:?}", expected, self.current)))
        }
    }

    fn enter(&mut self) -> FormulaResult<()> {
        self.depth += 1;
        if self.depth > self.max_depth {
            return Err(FormulaError::Parse(format!(
                "nesting deeper than {} levels",
                self.max_depth
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    /// operand (operator operand)*
    fn parse_chain(&mut self) -> FormulaResult<NodeId> {
        let head = self.parse_operand()?;
        let mut tail = head;
        loop {
            let operator = match self.current {
                Token::Operator(op) => op,
                Token::Plus => Operator::Add,
                Token::Minus => Operator::Subtract,
                _ => break,
            };
            self.advance()?;
            let next = self.parse_operand()?;
            self.graph.link(tail, operator, next);
            tail = next;
        }
        Ok(head)
    }

    /// prefix signs, a primary, postfix percents
    fn parse_operand(&mut self) -> FormulaResult<NodeId> {
        let mut negated = false;
        loop {
            match self.current {
                Token::Minus => negated = !negated,
                Token::Plus => {}
                _ => break,
            }
            self.advance()?;
        }

        let id = self.parse_primary()?;

        let mut percent = 0u8;
        while self.current == Token::Percent {
            percent = percent.saturating_add(1);
            self.advance()?;
        }

        let node = self.graph.node_mut(id);
        node.negated = negated;
        node.percent = percent;
        Ok(id)
    }

    fn parse_primary(&mut self) -> FormulaResult<NodeId> {
        let token = std::mem::replace(&mut self.current, Token::Eof);
        let kind = match token {
            Token::Number(n) => {
                self.advance()?;
                ExpressionKind::Constant(FormulaValue::Number(n))
            }
            Token::String(s) => {
                self.advance()?;
                ExpressionKind::Constant(FormulaValue::String(s))
            }
            Token::Boolean(b) => {
                self.advance()?;
                ExpressionKind::Constant(FormulaValue::Boolean(b))
            }
            Token::Error(e) => {
                self.advance()?;
                ExpressionKind::Constant(FormulaValue::Error(e))
            }
            Token::Reference { sheet, address } => {
                self.advance()?;
                self.reference_kind(sheet, &address)?
            }
            Token::Identifier(name) => {
                self.advance()?;
                if self.current == Token::LeftParen {
                    self.parse_function(name)?
                } else {
                    ExpressionKind::Name(name)
                }
            }
            Token::LeftParen => {
                self.advance()?;
                self.enter()?;
                let head = self.parse_chain()?;
                self.expect(Token::RightParen)?;
                self.leave();
                ExpressionKind::Group(head)
            }
            Token::LeftBrace => {
                self.advance()?;
                self.parse_array()?
            }
            other => {
                return Err(self
                    .scanner
                    .error(&format!("unexpected {:?}", other)))
            }
        };
        Ok(self.graph.add(ExpressionNode::new(kind)))
    }

    fn reference_kind(
        &mut self,
        sheet: Option<String>,
        address: &str,
    ) -> FormulaResult<ExpressionKind> {
        let range = CellRange::parse(address)
            .map_err(|e| FormulaError::Parse(format!("invalid reference '{}': {}", address, e)))?;
        if let Some(cache) = self.cache.as_deref_mut() {
            let qualified = match &sheet {
                Some(name) => format!("'{}'!{}", name.replace('\'', "''"), address),
                None => address.to_string(),
            };
            return Ok(ExpressionKind::CachedReference(cache.add(&qualified)));
        }
        Ok(ExpressionKind::Reference { sheet, range })
    }

    fn parse_function(&mut self, name: String) -> FormulaResult<ExpressionKind> {
        self.expect(Token::LeftParen)?;
        self.enter()?;

        let mut args = Vec::new();
        if self.current != Token::RightParen {
            loop {
                let arg = if matches!(self.current, Token::Comma | Token::RightParen) {
                    self.graph.add(ExpressionNode::constant(FormulaValue::Empty))
                } else {
                    self.parse_chain()?
                };
                args.push(arg);
                if self.current == Token::Comma {
                    self.advance()?;
                } else {
                    break;
                }
            }
        }

        self.expect(Token::RightParen)?;
        self.leave();
        Ok(ExpressionKind::Function {
            name: name.to_uppercase(),
            args,
        })
    }

    fn parse_array(&mut self) -> FormulaResult<ExpressionKind> {
        self.enter()?;
        let mut rows = Vec::new();
        let mut row = Vec::new();
        if self.current != Token::RightBrace {
            loop {
                row.push(self.parse_chain()?);
                match self.current {
                    Token::Comma => self.advance()?,
                    Token::Semicolon => {
                        self.advance()?;
                        rows.push(std::mem::take(&mut row));
                    }
                    _ => break,
                }
            }
        }
        if !row.is_empty() {
            rows.push(row);
        }
        self.expect(Token::RightBrace)?;
        self.leave();

        let width = rows.first().map_or(0, Vec::len);
        if rows.iter().any(|r| r.len() != width) {
            return Err(FormulaError::Parse("array rows differ in length".into()));
        }
        Ok(ExpressionKind::Array(rows))
    }
}
