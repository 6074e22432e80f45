//! Trivia-preserving tokenizer shared by the host declaration parser and the
//! schema parser.
//!
//! Whitespace and comments never reach the parsers as tokens. They are attached
//! to the neighbouring semantic token instead: everything after a token up to and
//! including the next newline is that token's trailing trivia, the rest is
//! leading trivia of the following token.

use logos::Logos;

use crate::diagnostics::{fail, DiagnosticCode};

#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
enum RawToken {
    #[regex(r"[ \t\r\f]+")]
    Whitespace,
    #[token("\n")]
    Newline,
    #[regex(r"//[^\n]*")]
    SingleLineComment,
    #[regex(r"/\*([^*]|\*+[^*/])*\*+/")]
    MultiLineComment,
    #[regex(r"#[^\n]*")]
    Directive,

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*")]
    Identifier,
    #[regex(r"[0-9][0-9A-Za-z_]*(\.[0-9A-Za-z_]+)?")]
    Number,
    #[regex(r#""([^"\\\n]|\\.)*""#)]
    String,

    #[token("::")]
    DoubleColon,
    #[token("->")]
    Arrow,
    #[token("(")]
    OpenParen,
    #[token(")")]
    CloseParen,
    #[token("<")]
    LessThan,
    #[token(">")]
    GreaterThan,
    #[token("[")]
    OpenBracket,
    #[token("]")]
    CloseBracket,
    #[token("{")]
    OpenBrace,
    #[token("}")]
    CloseBrace,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token("&")]
    Ampersand,
    #[token("*")]
    Asterisk,
    #[token("=")]
    Equals,
    #[token("!")]
    Bang,
    #[token("?")]
    Question,
    #[token("|")]
    Pipe,
    #[token(".")]
    Dot,
    #[token("-")]
    Minus,
    #[token(":")]
    Colon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Identifier,
    Number,
    String,
    DoubleColon,
    Arrow,
    OpenParen,
    CloseParen,
    LessThan,
    GreaterThan,
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    Comma,
    Semicolon,
    Ampersand,
    Asterisk,
    Equals,
    Bang,
    Question,
    Pipe,
    Dot,
    Minus,
    Colon,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriviaKind {
    Whitespace,
    Newline,
    SingleLineComment,
    MultiLineComment,
    /// Preprocessor line; carried along but never interpreted.
    Directive,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trivia {
    pub kind: TriviaKind,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Location {
    pub line: u32,
    pub col: u32,
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub location: Location,
    pub leading_trivia: Vec<Trivia>,
    pub trailing_trivia: Vec<Trivia>,
}

impl Token {
    pub fn is(&self, kind: TokenKind) -> bool {
        self.kind == kind
    }

    pub fn is_ident(&self, text: &str) -> bool {
        self.kind == TokenKind::Identifier && self.text == text
    }

    /// Body of the first `//` comment trailing this token, without the slashes.
    pub fn trailing_line_comment(&self) -> Option<&str> {
        self.trailing_trivia
            .iter()
            .find(|t| t.kind == TriviaKind::SingleLineComment)
            .map(|t| t.text.trim_start_matches('/'))
    }
}

fn classify(raw: RawToken) -> Result<TokenKind, TriviaKind> {
    Ok(match raw {
        RawToken::Whitespace => return Err(TriviaKind::Whitespace),
        RawToken::Newline => return Err(TriviaKind::Newline),
        RawToken::SingleLineComment => return Err(TriviaKind::SingleLineComment),
        RawToken::MultiLineComment => return Err(TriviaKind::MultiLineComment),
        RawToken::Directive => return Err(TriviaKind::Directive),
        RawToken::Identifier => TokenKind::Identifier,
        RawToken::Number => TokenKind::Number,
        RawToken::String => TokenKind::String,
        RawToken::DoubleColon => TokenKind::DoubleColon,
        RawToken::Arrow => TokenKind::Arrow,
        RawToken::OpenParen => TokenKind::OpenParen,
        RawToken::CloseParen => TokenKind::CloseParen,
        RawToken::LessThan => TokenKind::LessThan,
        RawToken::GreaterThan => TokenKind::GreaterThan,
        RawToken::OpenBracket => TokenKind::OpenBracket,
        RawToken::CloseBracket => TokenKind::CloseBracket,
        RawToken::OpenBrace => TokenKind::OpenBrace,
        RawToken::CloseBrace => TokenKind::CloseBrace,
        RawToken::Comma => TokenKind::Comma,
        RawToken::Semicolon => TokenKind::Semicolon,
        RawToken::Ampersand => TokenKind::Ampersand,
        RawToken::Asterisk => TokenKind::Asterisk,
        RawToken::Equals => TokenKind::Equals,
        RawToken::Bang => TokenKind::Bang,
        RawToken::Question => TokenKind::Question,
        RawToken::Pipe => TokenKind::Pipe,
        RawToken::Dot => TokenKind::Dot,
        RawToken::Minus => TokenKind::Minus,
        RawToken::Colon => TokenKind::Colon,
    })
}

/// Tokenizes `src`. The returned stream always ends with a single `Eof` token that
/// owns any trivia left after the last semantic token.
pub fn tokenize(src: &str) -> anyhow::Result<Vec<Token>> {
    let mut out: Vec<Token> = Vec::new();
    let mut pending: Vec<Trivia> = Vec::new();
    // While true, trivia still belongs to the previous token's trailing list.
    let mut trailing_open = false;

    let mut line: u32 = 1;
    let mut line_start: usize = 0;

    let mut lex = RawToken::lexer(src);
    while let Some(raw) = lex.next() {
        let span = lex.span();
        let text = lex.slice();
        let location = Location {
            line,
            col: (span.start - line_start) as u32 + 1,
        };
        let Ok(raw) = raw else {
            return fail(
                DiagnosticCode::OPG0001ParseError,
                format!("unexpected character {text:?} at {location}"),
            );
        };

        match classify(raw) {
            Err(kind) => {
                let trivia = Trivia {
                    kind,
                    text: text.to_string(),
                };
                let ends_line = text.contains('\n');
                match out.last_mut() {
                    Some(prev) if trailing_open => prev.trailing_trivia.push(trivia),
                    _ => pending.push(trivia),
                }
                if ends_line {
                    trailing_open = false;
                }
            }
            Ok(kind) => {
                out.push(Token {
                    kind,
                    text: text.to_string(),
                    location,
                    leading_trivia: std::mem::take(&mut pending),
                    trailing_trivia: Vec::new(),
                });
                trailing_open = true;
            }
        }

        for (i, b) in text.bytes().enumerate() {
            if b == b'\n' {
                line += 1;
                line_start = span.start + i + 1;
            }
        }
    }

    out.push(Token {
        kind: TokenKind::Eof,
        text: String::new(),
        location: Location {
            line,
            col: (src.len() - line_start) as u32 + 1,
        },
        leading_trivia: pending,
        trailing_trivia: Vec::new(),
    });
    Ok(out)
}
