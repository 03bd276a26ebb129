//! Text to [`Expr`] conversion.
//!
//! Reading happens in two passes. The tokenizer (built from nom
//! combinators) splits the input into open-paren, close-paren and text-block
//! tokens; a text block is a maximal run of characters other than `(`, `)`
//! and space. A space only separates tokens, and no other whitespace is
//! special: callers that want tabs or newlines ignored run
//! [`crate::clean_source`] first. The parser then walks the token stream by
//! recursive descent, one nested call per open paren.

use nom::{
    IResult, Parser,
    branch::alt,
    bytes::complete::take_while1,
    character::complete::char,
    combinator::{map, value},
};

use crate::ast::{Expr, nil};
use crate::{Error, MAX_READ_DEPTH, ParseError, ParseErrorKind};

/// Reader settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadConfig {
    /// Deepest list nesting accepted
    pub max_depth: usize,
}

impl Default for ReadConfig {
    fn default() -> Self {
        ReadConfig {
            max_depth: MAX_READ_DEPTH,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Token<'a> {
    Open,
    Close,
    Text(&'a str),
}

/// A token together with its byte offset in the input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Spanned<'a> {
    pub token: Token<'a>,
    pub offset: usize,
}

fn is_text_char(c: char) -> bool {
    !matches!(c, '(' | ')' | ' ')
}

fn parse_token(input: &str) -> IResult<&str, Token<'_>> {
    alt((
        value(Token::Open, char('(')),
        value(Token::Close, char(')')),
        map(take_while1(is_text_char), Token::Text),
    ))
    .parse(input)
}

/// Split input into tokens. Every non-space character belongs to some token,
/// so tokenizing itself never fails.
pub(crate) fn tokenize(input: &str) -> Vec<Spanned<'_>> {
    let mut tokens = Vec::new();
    let mut rest = input.trim_start_matches(' ');

    while let Ok((after, token)) = parse_token(rest) {
        tokens.push(Spanned {
            token,
            offset: input.len() - rest.len(),
        });
        rest = after.trim_start_matches(' ');
    }

    tokens
}

/// Recursive-descent parser over a token stream
struct TreeBuilder<'a> {
    input: &'a str,
    tokens: Vec<Spanned<'a>>,
    pos: usize,
    config: ReadConfig,
}

impl<'a> TreeBuilder<'a> {
    fn new(input: &'a str, config: ReadConfig) -> Self {
        TreeBuilder {
            input,
            tokens: tokenize(input),
            pos: 0,
            config,
        }
    }

    fn next_token(&mut self) -> Option<Spanned<'a>> {
        let token = self.tokens.get(self.pos).copied();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn peek_token(&self) -> Option<Spanned<'a>> {
        self.tokens.get(self.pos).copied()
    }

    fn error_at(&self, kind: ParseErrorKind, message: &str, at: Spanned<'_>) -> ParseError {
        let found = match at.token {
            Token::Open => "(",
            Token::Close => ")",
            Token::Text(text) => text,
        };
        let char_offset = self.input[..at.offset].chars().count();
        ParseError::with_context(
            kind,
            message,
            self.input,
            char_offset,
            Some(found.to_owned()),
        )
    }

    /// Parse one expression. `None` means the token stream is exhausted.
    fn parse_expr(&mut self) -> Result<Option<Expr>, ParseError> {
        let Some(spanned) = self.next_token() else {
            return Ok(None);
        };

        match spanned.token {
            Token::Text(text) => Ok(Some(Expr::Atom(text.to_owned()))),
            Token::Open => self.parse_list(spanned, 1).map(Some),
            Token::Close => Err(self.error_at(
                ParseErrorKind::UnbalancedParentheses,
                "Unexpected ')' without a matching '('",
                spanned,
            )),
        }
    }

    /// Parse the elements of a list whose open paren was just consumed
    fn parse_list(&mut self, open: Spanned<'a>, depth: usize) -> Result<Expr, ParseError> {
        if depth > self.config.max_depth {
            return Err(self.error_at(
                ParseErrorKind::TooDeeplyNested,
                &format!(
                    "Expression too deeply nested (max depth: {})",
                    self.config.max_depth
                ),
                open,
            ));
        }

        let mut elements = Vec::new();
        loop {
            let Some(spanned) = self.next_token() else {
                return Err(self.error_at(
                    ParseErrorKind::UnbalancedParentheses,
                    "Unclosed '(' at end of input",
                    open,
                ));
            };

            match spanned.token {
                Token::Close => return Ok(Expr::List(elements)),
                Token::Open => elements.push(self.parse_list(spanned, depth + 1)?),
                Token::Text(text) => elements.push(Expr::Atom(text.to_owned())),
            }
        }
    }
}

/// Read one expression from text using the default [`ReadConfig`].
///
/// Empty input reads as the empty list. A single bare atom is the whole
/// result. Anything else must be exactly one parenthesized list.
pub fn read(text: &str) -> Result<Expr, Error> {
    read_with_config(text, ReadConfig::default())
}

/// Read one expression from text with explicit reader settings
pub fn read_with_config(text: &str, config: ReadConfig) -> Result<Expr, Error> {
    let mut builder = TreeBuilder::new(text, config);

    let Some(expr) = builder.parse_expr()? else {
        return Ok(nil());
    };

    match builder.peek_token() {
        None => Ok(expr),
        Some(extra @ Spanned {
            token: Token::Close,
            ..
        }) => Err(builder
            .error_at(
                ParseErrorKind::UnbalancedParentheses,
                "Unexpected ')' after a complete expression",
                extra,
            )
            .into()),
        Some(extra) => Err(builder
            .error_at(
                ParseErrorKind::InvalidNesting,
                "Multiple top-level expressions must be wrapped in a list",
                extra,
            )
            .into()),
    }
}
