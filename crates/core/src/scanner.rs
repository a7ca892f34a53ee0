//! The scanner: source text to tokens.
//!
//! Tokens carry their position as a global offset into the [`Positions`]
//! table (the caller registers the source first and passes the base).
//! Indentation is significant: growing indentation opens a block, the
//! matching dedent closes it, and the parser turns the pair into an
//! indent [`Block`](crate::tree::Tree).

use ecow::EcoString;
use num_bigint::BigUint;
use num_traits::Num;

use crate::{
    error::{Diagnostic, TiliaError, TiliaResult},
    position::SourcePos,
};

/// One lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// A natural number with its literal base.
    Natural {
        /// The value.
        value: BigUint,
        /// The base it was written in (2, 8, 10 or 16).
        base: u8,
    },
    /// A floating-point number.
    Real(f64),
    /// A text literal, delimiters removed, `""` unescaped.
    Text(EcoString),
    /// An alphanumeric name.
    Name(EcoString),
    /// A run of operator characters.
    Symbol(EcoString),
    /// An opening delimiter, `(` or `{`.
    Open(char),
    /// A closing delimiter, `)` or `}`.
    Close(char),
    /// End of a non-blank line.
    NewLine,
    /// Indentation grew: a block opens.
    Indent,
    /// Indentation shrank back: the block closes.
    Unindent,
}

/// A token plus the position of its first character.
#[derive(Debug, Clone, PartialEq)]
pub struct Lexeme {
    /// The token.
    pub token: Token,
    /// Where it starts.
    pub pos: SourcePos,
}

const SYMBOL_CHARS: &str = "+-*/<>=&|:;,.!?%^~#@$\\";

/// Tokenize one source text whose first byte sits at `base`.
///
/// # Errors
///
/// * [`TiliaError::Syntax`] for unterminated text or comments, malformed
///   based literals, inconsistent indentation, or unexpected characters.
pub fn scan(source: &str, base: SourcePos) -> TiliaResult<Vec<Lexeme>> {
    Scanner::new(source, base).run()
}

struct Scanner<'s> {
    source: &'s str,
    chars: Vec<(usize, char)>,
    cursor: usize,
    base: SourcePos,
    tokens: Vec<Lexeme>,
    indents: Vec<usize>,
    at_line_start: bool,
}

impl<'s> Scanner<'s> {
    fn new(source: &'s str, base: SourcePos) -> Self {
        Self {
            source,
            chars: source.char_indices().collect(),
            cursor: 0,
            base,
            tokens: Vec::new(),
            indents: vec![0],
            at_line_start: true,
        }
    }

    fn pos_at(&self, byte_offset: usize) -> SourcePos {
        SourcePos::new(self.base.offset().saturating_add(byte_offset as u32))
    }

    fn peek(&self) -> Option<char> {
        self.chars.get(self.cursor).map(|&(_, c)| c)
    }

    fn peek_at(&self, ahead: usize) -> Option<char> {
        self.chars.get(self.cursor + ahead).map(|&(_, c)| c)
    }

    fn offset(&self) -> usize {
        self.chars
            .get(self.cursor)
            .map_or(self.source.len(), |&(offset, _)| offset)
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.cursor += 1;
        Some(c)
    }

    fn push(&mut self, token: Token, offset: usize) {
        self.tokens.push(Lexeme {
            token,
            pos: self.pos_at(offset),
        });
    }

    fn error(&self, message: &'static str, offset: usize) -> Box<TiliaError> {
        Box::new(TiliaError::Syntax(Diagnostic::error(
            message,
            self.pos_at(offset),
        )))
    }

    fn run(mut self) -> TiliaResult<Vec<Lexeme>> {
        loop {
            if self.at_line_start {
                self.handle_line_start()?;
                if self.peek().is_none() {
                    break;
                }
                continue;
            }
            let offset = self.offset();
            let Some(c) = self.peek() else { break };
            match c {
                '\n' => {
                    self.cursor += 1;
                    if !matches!(
                        self.tokens.last().map(|lexeme| &lexeme.token),
                        None | Some(Token::NewLine | Token::Indent)
                    ) {
                        self.push(Token::NewLine, offset);
                    }
                    self.at_line_start = true;
                }
                c if c.is_whitespace() => {
                    self.cursor += 1;
                }
                '/' if self.peek_at(1) == Some('/') => {
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.cursor += 1;
                    }
                }
                '/' if self.peek_at(1) == Some('*') => {
                    self.skip_block_comment(offset)?;
                }
                '"' => self.scan_text(offset)?,
                c if c.is_ascii_digit() => self.scan_number(offset)?,
                c if c.is_alphabetic() || c == '_' => self.scan_name(offset),
                '(' | '{' => {
                    let Some(c) = self.bump() else { break };
                    self.push(Token::Open(c), offset);
                }
                ')' | '}' => {
                    let Some(c) = self.bump() else { break };
                    self.push(Token::Close(c), offset);
                }
                c if SYMBOL_CHARS.contains(c) => self.scan_symbol(offset),
                _ => return Err(self.error("unexpected character in input", offset)),
            }
        }

        // Close the blocks that are still open at end of input.
        let offset = self.source.len();
        while self.indents.len() > 1 {
            let _ = self.indents.pop();
            self.push(Token::Unindent, offset);
        }
        Ok(self.tokens)
    }

    fn handle_line_start(&mut self) -> TiliaResult<()> {
        let mut indent = 0;
        while let Some(c) = self.peek() {
            match c {
                ' ' | '\t' => {
                    indent += 1;
                    self.cursor += 1;
                }
                _ => break,
            }
        }
        match self.peek() {
            // Blank lines do not affect indentation.
            Some('\n') => {
                self.cursor += 1;
                return Ok(());
            }
            None => return Ok(()),
            _ => {}
        }
        let offset = self.offset();
        let current = *self.indents.last().unwrap_or(&0);
        if indent > current {
            self.indents.push(indent);
            self.push(Token::Indent, offset);
        } else if indent < current {
            while self
                .indents
                .last()
                .is_some_and(|&level| level > indent)
            {
                let _ = self.indents.pop();
                self.push(Token::Unindent, offset);
            }
            if self.indents.last() != Some(&indent) {
                return Err(self.error("inconsistent indentation", offset));
            }
            // The line break that closed the block still separates
            // statements at the level we dedented back to.
            self.push(Token::NewLine, offset);
        }
        self.at_line_start = false;
        Ok(())
    }

    fn skip_block_comment(&mut self, offset: usize) -> TiliaResult<()> {
        self.cursor += 2;
        while let Some(c) = self.peek() {
            if c == '*' && self.peek_at(1) == Some('/') {
                self.cursor += 2;
                return Ok(());
            }
            self.cursor += 1;
        }
        Err(self.error("unterminated comment", offset))
    }

    fn scan_text(&mut self, offset: usize) -> TiliaResult<()> {
        self.cursor += 1;
        let mut value = EcoString::new();
        loop {
            match self.bump() {
                Some('"') => {
                    // A doubled quote stands for one quote character.
                    if self.peek() == Some('"') {
                        self.cursor += 1;
                        value.push('"');
                        continue;
                    }
                    self.push(Token::Text(value), offset);
                    return Ok(());
                }
                Some('\n') | None => {
                    return Err(self.error("unterminated text literal", offset));
                }
                Some(c) => value.push(c),
            }
        }
    }

    fn digits(&mut self, radix: u32) -> String {
        let mut digits = String::new();
        while let Some(c) = self.peek() {
            if c == '_' {
                self.cursor += 1;
                continue;
            }
            if c.is_digit(radix) {
                digits.push(c);
                self.cursor += 1;
                continue;
            }
            break;
        }
        digits
    }

    fn scan_number(&mut self, offset: usize) -> TiliaResult<()> {
        let integral = self.digits(10);

        // Based literal, e.g. `16#FFFF` or `2#1011`.
        if self.peek() == Some('#') {
            let base: u8 = integral
                .parse()
                .map_err(|_| self.error("unsupported numeral base", offset))?;
            if ![2, 8, 10, 16].contains(&base) {
                return Err(self.error("unsupported numeral base", offset));
            }
            self.cursor += 1;
            let digits = self.digits(u32::from(base));
            if digits.is_empty() {
                return Err(self.error("based literal has no digits", offset));
            }
            let value = BigUint::from_str_radix(&digits, u32::from(base))
                .map_err(|_| self.error("based literal has invalid digits", offset))?;
            self.push(Token::Natural { value, base }, offset);
            return Ok(());
        }

        // Real number: a fraction part, optionally an exponent.
        if self.peek() == Some('.') && self.peek_at(1).is_some_and(|c| c.is_ascii_digit()) {
            self.cursor += 1;
            let fraction = self.digits(10);
            let mut literal = format!("{integral}.{fraction}");
            if matches!(self.peek(), Some('e' | 'E')) {
                let mark = self.cursor;
                self.cursor += 1;
                let mut exponent = String::new();
                if matches!(self.peek(), Some('+' | '-')) {
                    if let Some(sign) = self.bump() {
                        exponent.push(sign);
                    }
                }
                let digits = self.digits(10);
                if digits.is_empty() {
                    self.cursor = mark;
                } else {
                    exponent.push_str(&digits);
                    literal.push('e');
                    literal.push_str(&exponent);
                }
            }
            let value: f64 = literal
                .parse()
                .map_err(|_| self.error("malformed real literal", offset))?;
            self.push(Token::Real(value), offset);
            return Ok(());
        }

        let value = BigUint::from_str_radix(&integral, 10)
            .map_err(|_| self.error("malformed number literal", offset))?;
        self.push(Token::Natural { value, base: 10 }, offset);
        Ok(())
    }

    fn scan_name(&mut self, offset: usize) {
        let mut name = EcoString::new();
        while let Some(c) = self.peek() {
            if c.is_alphanumeric() || c == '_' {
                name.push(c);
                self.cursor += 1;
            } else {
                break;
            }
        }
        self.push(Token::Name(name), offset);
    }

    fn scan_symbol(&mut self, offset: usize) {
        let mut symbol = EcoString::new();
        while let Some(c) = self.peek() {
            if SYMBOL_CHARS.contains(c) {
                symbol.push(c);
                self.cursor += 1;
            } else {
                break;
            }
        }
        self.push(Token::Symbol(symbol), offset);
    }
}
