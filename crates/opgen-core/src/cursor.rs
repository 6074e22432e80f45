use anyhow::Result;

use crate::diagnostics::{fail, DiagnosticCode};
use crate::lexer::{Token, TokenKind};

/// Forward-only view over a token stream ending in `Eof`.
pub(crate) struct TokenCursor {
    tokens: Vec<Token>,
    pos: usize,
    code: DiagnosticCode,
    origin: String,
}

impl TokenCursor {
    /// `code` is the diagnostic raised for syntax errors; `origin` prefixes the
    /// location in messages (a file path or the schema text).
    pub(crate) fn new(tokens: Vec<Token>, code: DiagnosticCode, origin: impl Into<String>) -> Self {
        TokenCursor {
            tokens,
            pos: 0,
            code,
            origin: origin.into(),
        }
    }

    pub(crate) fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    pub(crate) fn peek_at(&self, n: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + n).min(last)]
    }

    pub(crate) fn at(&self, kind: TokenKind) -> bool {
        self.peek().is(kind)
    }

    pub(crate) fn at_eof(&self) -> bool {
        self.at(TokenKind::Eof)
    }

    pub(crate) fn bump(&mut self) -> Token {
        let tok = self.peek().clone();
        if !tok.is(TokenKind::Eof) {
            self.pos += 1;
        }
        tok
    }

    pub(crate) fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            None
        }
    }

    pub(crate) fn expect(&mut self, kind: TokenKind, what: &str) -> Result<Token> {
        if self.at(kind) {
            return Ok(self.bump());
        }
        self.error(format!("expected {what}"))
    }

    pub(crate) fn expect_ident(&mut self, what: &str) -> Result<String> {
        Ok(self.expect(TokenKind::Identifier, what)?.text)
    }

    /// Collects raw token text up to (not including) a `,` or closing delimiter
    /// at nesting depth zero. Used for default values nobody interprets.
    pub(crate) fn skip_balanced_until_separator(&mut self) -> Result<String> {
        let mut depth: usize = 0;
        let mut text = String::new();
        loop {
            match self.peek().kind {
                TokenKind::Eof => return self.error("unterminated default value"),
                TokenKind::Comma
                | TokenKind::CloseParen
                | TokenKind::CloseBracket
                | TokenKind::CloseBrace
                    if depth == 0 =>
                {
                    break
                }
                TokenKind::OpenParen | TokenKind::OpenBracket | TokenKind::OpenBrace => depth += 1,
                TokenKind::CloseParen | TokenKind::CloseBracket | TokenKind::CloseBrace => {
                    depth -= 1
                }
                _ => {}
            }
            text.push_str(&self.bump().text);
        }
        if text.is_empty() {
            return self.error("expected default value");
        }
        Ok(text)
    }

    pub(crate) fn error<T>(&self, message: impl AsRef<str>) -> Result<T> {
        let tok = self.peek();
        let found = if tok.is(TokenKind::Eof) {
            "end of input".to_string()
        } else {
            format!("{:?}", tok.text)
        };
        fail(
            self.code,
            format!(
                "{} at {}:{}: found {found}",
                message.as_ref(),
                self.origin,
                tok.location
            ),
        )
    }
}
