//! The parser: tokens to trees, driven by the operator table.
//!
//! A straightforward operator-precedence parser. Application binds by
//! juxtaposition (`factorial 5`) at a fixed priority; named operators
//! take their priority and associativity from [`Syntax`]; newline and
//! semicolon are ordinary right-associative infixes, which gives a
//! program the right-leaning statement spine the evaluator expects;
//! indentation turns into blocks.

use crate::{
    error::{Diagnostic, TiliaError, TiliaResult},
    position::{Positions, SourcePos},
    scanner::{scan, Lexeme, Token},
    syntax::{Associativity, Syntax, APPLICATION_PRIORITY, SEQUENCE_NEWLINE},
    tree::Tree,
};

/// Parse one source text, registering it in `positions`.
///
/// Returns `None` for input with no tokens (empty or comments only).
///
/// # Errors
///
/// * [`TiliaError::Syntax`] on scan errors, unbalanced delimiters or
///   malformed expressions; no evaluation should happen afterwards.
pub fn parse_source(
    source: &str,
    name: &str,
    positions: &mut Positions,
) -> TiliaResult<Option<Tree>> {
    let base = positions.add_source(name, source);
    let lexemes = scan(source, base)?;
    if lexemes.is_empty() {
        return Ok(None);
    }
    let mut parser = Parser {
        lexemes,
        cursor: 0,
        syntax: Syntax::standard(),
    };
    let tree = parser.parse_expression(0)?;
    parser.skip_newlines();
    if let Some(lexeme) = parser.peek_lexeme() {
        return Err(Box::new(TiliaError::Syntax(Diagnostic::error(
            "unexpected input after expression",
            lexeme.pos,
        ))));
    }
    Ok(Some(tree))
}

struct Parser {
    lexemes: Vec<Lexeme>,
    cursor: usize,
    syntax: &'static Syntax,
}

impl Parser {
    fn peek_lexeme(&self) -> Option<&Lexeme> {
        self.lexemes.get(self.cursor)
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_lexeme().map(|lexeme| &lexeme.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&Token> {
        self.lexemes.get(self.cursor + ahead).map(|l| &l.token)
    }

    fn pos(&self) -> SourcePos {
        self.peek_lexeme()
            .map_or(SourcePos::NOWHERE, |lexeme| lexeme.pos)
    }

    fn bump(&mut self) -> Option<Lexeme> {
        let lexeme = self.lexemes.get(self.cursor).cloned();
        if lexeme.is_some() {
            self.cursor += 1;
        }
        lexeme
    }

    fn error(&self, message: &'static str) -> Box<TiliaError> {
        Box::new(TiliaError::Syntax(Diagnostic::error(message, self.pos())))
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Some(Token::NewLine)) {
            self.cursor += 1;
        }
    }

    /// The infix entry for a name or symbol token, if any.
    fn infix_of(&self, token: &Token) -> Option<(ecow::EcoString, u32, Associativity)> {
        let name: &str = match token {
            Token::Name(name) => name,
            Token::Symbol(symbol) => symbol,
            _ => return None,
        };
        self.syntax
            .infix(name)
            .map(|entry| (name.into(), entry.priority, entry.associativity))
    }

    fn starts_primary(token: &Token) -> bool {
        matches!(
            token,
            Token::Natural { .. }
                | Token::Real(_)
                | Token::Text(_)
                | Token::Name(_)
                | Token::Open(_)
        )
    }

    fn parse_expression(&mut self, min_priority: u32) -> TiliaResult<Tree> {
        let mut left = self.parse_primary()?;

        loop {
            let Some(token) = self.peek().cloned() else {
                break;
            };
            match token {
                Token::Close(_) | Token::Unindent => break,

                Token::NewLine => {
                    // Trailing newlines, and the newline introducing an
                    // indented block, are layout rather than sequence.
                    match self.peek_at(1) {
                        None | Some(Token::Close(_) | Token::Unindent | Token::Indent) => {
                            self.cursor += 1;
                            continue;
                        }
                        _ => {}
                    }
                    let Some(entry) = self.syntax.infix(SEQUENCE_NEWLINE) else {
                        break;
                    };
                    if entry.priority < min_priority {
                        break;
                    }
                    let pos = self.pos();
                    self.cursor += 1;
                    let right = self.parse_expression(entry.priority)?;
                    left = Tree::infix(SEQUENCE_NEWLINE, left, right, pos);
                }

                Token::Indent => {
                    // An indented block is an operand of what precedes it.
                    if APPLICATION_PRIORITY < min_priority {
                        break;
                    }
                    let block = self.parse_primary()?;
                    let pos = left.pos();
                    left = Tree::prefix(left, block, pos);
                }

                ref token if self.infix_of(token).is_some() => {
                    let Some((name, priority, associativity)) = self.infix_of(token) else {
                        break;
                    };
                    if priority < min_priority {
                        break;
                    }
                    let pos = self.pos();
                    let _ = self.bump();
                    let next_min = match associativity {
                        Associativity::Right => priority,
                        Associativity::Left => priority + 1,
                    };
                    let right = self.parse_expression(next_min)?;
                    left = Tree::infix(name, left, right, pos);
                }

                Token::Symbol(ref symbol) => {
                    if let Some(priority) = self.syntax.postfix(symbol) {
                        if priority < min_priority {
                            break;
                        }
                        let pos = self.pos();
                        self.cursor += 1;
                        left = Tree::postfix(left, Tree::name(symbol.clone(), pos), pos);
                        continue;
                    }
                    break;
                }

                ref token if Self::starts_primary(token) => {
                    // Juxtaposition: function application.
                    if APPLICATION_PRIORITY < min_priority {
                        break;
                    }
                    let argument = self.parse_expression(APPLICATION_PRIORITY + 1)?;
                    let pos = left.pos();
                    left = Tree::prefix(left, argument, pos);
                }

                _ => break,
            }
        }
        Ok(left)
    }

    fn parse_primary(&mut self) -> TiliaResult<Tree> {
        // Layout newlines before an operand (typically before an indented
        // block) are not sequence separators.
        while matches!(self.peek(), Some(Token::NewLine)) {
            self.cursor += 1;
        }
        let pos = self.pos();
        let Some(lexeme) = self.bump() else {
            return Err(self.error("expected an expression"));
        };
        match lexeme.token {
            Token::Natural { value, base } => Ok(Tree::based_natural(value, base, pos)),
            Token::Real(value) => Ok(Tree::real(value, pos)),
            Token::Text(value) => Ok(Tree::text(value, pos)),
            Token::Name(name) => {
                if let Some(priority) = self.syntax.prefix(&name) {
                    if self.peek().is_some_and(Self::starts_primary) {
                        let operand = self.parse_expression(priority + 1)?;
                        return Ok(Tree::prefix(Tree::name(name, pos), operand, pos));
                    }
                }
                Ok(Tree::name(name, pos))
            }
            Token::Symbol(symbol) => {
                if let Some(priority) = self.syntax.prefix(&symbol) {
                    if self.peek().is_some_and(Self::starts_primary) {
                        let operand = self.parse_expression(priority + 1)?;
                        return Ok(Tree::prefix(Tree::name(symbol, pos), operand, pos));
                    }
                }
                Ok(Tree::name(symbol, pos))
            }
            Token::Open(open) => {
                let close = if open == '(' { ')' } else { '}' };
                self.skip_newlines();
                if self.peek() == Some(&Token::Close(close)) {
                    let _ = self.bump();
                    return Ok(Tree::block(
                        Tree::empty(pos),
                        open.to_string(),
                        close.to_string(),
                        pos,
                    ));
                }
                let child = self.parse_expression(0)?;
                match self.bump() {
                    Some(Lexeme {
                        token: Token::Close(found),
                        ..
                    }) if found == close => Ok(Tree::block(
                        child,
                        open.to_string(),
                        close.to_string(),
                        pos,
                    )),
                    _ => Err(Box::new(TiliaError::Syntax(
                        Diagnostic::error("unbalanced delimiter", pos),
                    ))),
                }
            }
            Token::Indent => {
                let child = self.parse_expression(0)?;
                match self.bump() {
                    Some(Lexeme {
                        token: Token::Unindent,
                        ..
                    }) => Ok(Tree::indented(child, pos)),
                    _ => Err(Box::new(TiliaError::Syntax(
                        Diagnostic::error("unclosed indented block", pos),
                    ))),
                }
            }
            Token::Close(_) | Token::Unindent | Token::NewLine => {
                Err(Box::new(TiliaError::Syntax(Diagnostic::error(
                    "expected an expression",
                    pos,
                ))))
            }
        }
    }
}
