//! Host-language function declarations: the C++ prototypes the generated
//! functions implement.

use std::fmt;

use anyhow::Result;

use crate::cursor::TokenCursor;
use crate::diagnostics::DiagnosticCode;
use crate::lexer::{tokenize, Location, Token, TokenKind};

const SPECIFIERS: &[&str] = &["static", "inline", "extern", "constexpr", "virtual"];
const MULTIWORD_PREFIXES: &[&str] = &["unsigned", "signed", "long", "short"];
const MULTIWORD_TAILS: &[&str] = &["int", "long", "char", "short", "double"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declarator {
    Ref,
    RvalueRef,
    Pointer,
    Const,
}

/// One argument of a template-id: a type, or a constant such as the `3` in
/// `std::array<bool, 3>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateArg {
    Type(HostType),
    Const(String),
}

impl fmt::Display for TemplateArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TemplateArg::Type(t) => write!(f, "{t}"),
            TemplateArg::Const(c) => f.write_str(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostType {
    pub leading_const: bool,
    pub global: bool,
    /// Qualified name segments, e.g. `["at", "Tensor"]`.
    pub path: Vec<String>,
    pub template_args: Vec<TemplateArg>,
    pub declarators: Vec<Declarator>,
}

impl HostType {
    pub fn simple_name(&self) -> &str {
        self.path.last().map(String::as_str).unwrap_or("")
    }

    /// The compound options aggregate that stands in for several schema parameters.
    pub fn is_tensor_options(&self) -> bool {
        self.simple_name() == "TensorOptions"
    }
}

impl fmt::Display for HostType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.leading_const {
            f.write_str("const ")?;
        }
        if self.global {
            f.write_str("::")?;
        }
        f.write_str(&self.path.join("::"))?;
        if !self.template_args.is_empty() {
            f.write_str("<")?;
            for (i, arg) in self.template_args.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{arg}")?;
            }
            f.write_str(">")?;
        }
        for d in &self.declarators {
            f.write_str(match d {
                Declarator::Ref => " &",
                Declarator::RvalueRef => " &&",
                Declarator::Pointer => " *",
                Declarator::Const => " const",
            })?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostParamType {
    Host(HostType),
    /// Synthesized from a schema `*` marker; never written by hand.
    KwArgsSentinel,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostParam {
    pub ty: HostParamType,
    pub name: Option<String>,
    pub default: Option<String>,
    /// Indices into the linked signature's parameters (1, or 4 for options).
    pub schema_params: Vec<usize>,
}

impl HostParam {
    pub fn kwargs_sentinel() -> Self {
        HostParam {
            ty: HostParamType::KwArgsSentinel,
            name: None,
            default: None,
            schema_params: Vec::new(),
        }
    }

    pub fn is_kwargs_sentinel(&self) -> bool {
        matches!(self.ty, HostParamType::KwArgsSentinel)
    }

    pub fn host_type(&self) -> Option<&HostType> {
        match &self.ty {
            HostParamType::Host(t) => Some(t),
            HostParamType::KwArgsSentinel => None,
        }
    }
}

impl fmt::Display for HostParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.ty {
            HostParamType::KwArgsSentinel => f.write_str("*")?,
            HostParamType::Host(t) => write!(f, "{t}")?,
        }
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        if let Some(default) = &self.default {
            write!(f, " = {default}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostFunctionDecl {
    pub return_type: HostType,
    pub name: String,
    pub params: Vec<HostParam>,
    /// The terminating `;`, with its trailing trivia intact.
    pub terminator: Token,
    pub location: Location,
}

impl HostFunctionDecl {
    pub fn get_parameter(&self, name: &str) -> Option<(usize, &HostParam)> {
        self.params
            .iter()
            .enumerate()
            .find(|(_, p)| p.name.as_deref() == Some(name))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TranslationUnit {
    pub decls: Vec<HostFunctionDecl>,
}

pub fn parse_translation_unit(src: &str, origin: &str) -> Result<TranslationUnit> {
    let tokens = tokenize(src)?;
    let mut p = TokenCursor::new(tokens, DiagnosticCode::OPG0001ParseError, origin);
    let mut decls = Vec::new();
    while !p.at_eof() {
        decls.push(parse_function_decl(&mut p)?);
    }
    Ok(TranslationUnit { decls })
}

fn parse_function_decl(p: &mut TokenCursor) -> Result<HostFunctionDecl> {
    while SPECIFIERS.iter().any(|s| p.peek().is_ident(s)) {
        p.bump();
    }
    let location = p.peek().location;
    let return_type = parse_type(p)?;
    let name = p.expect_ident("function name")?;
    p.expect(TokenKind::OpenParen, "'('")?;

    let mut params = Vec::new();
    if !p.at(TokenKind::CloseParen) {
        loop {
            params.push(parse_param(p)?);
            if p.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
    }
    p.expect(TokenKind::CloseParen, "')'")?;

    // `void f(void);`
    if params.len() == 1
        && params[0].name.is_none()
        && params[0]
            .host_type()
            .is_some_and(|t| t.path == ["void"] && t.declarators.is_empty())
    {
        params.clear();
    }

    let terminator = p.expect(TokenKind::Semicolon, "';' after declaration")?;
    Ok(HostFunctionDecl {
        return_type,
        name,
        params,
        terminator,
        location,
    })
}

fn parse_param(p: &mut TokenCursor) -> Result<HostParam> {
    let ty = parse_type(p)?;
    let name = p.eat(TokenKind::Identifier).map(|t| t.text);
    let default = match p.eat(TokenKind::Equals) {
        Some(_) => Some(p.skip_balanced_until_separator()?),
        None => None,
    };
    Ok(HostParam {
        ty: HostParamType::Host(ty),
        name,
        default,
        schema_params: Vec::new(),
    })
}

fn parse_type(p: &mut TokenCursor) -> Result<HostType> {
    let leading_const = p.peek().is_ident("const");
    if leading_const {
        p.bump();
    }
    let global = p.eat(TokenKind::DoubleColon).is_some();

    let mut first = p.expect_ident("type name")?;
    while MULTIWORD_PREFIXES.contains(&first.as_str())
        && MULTIWORD_TAILS
            .iter()
            .any(|tail| p.peek().is_ident(tail))
    {
        first = format!("{first} {}", p.bump().text);
    }
    let mut path = vec![first];
    while p.eat(TokenKind::DoubleColon).is_some() {
        path.push(p.expect_ident("name after '::'")?);
    }

    let mut template_args = Vec::new();
    if p.eat(TokenKind::LessThan).is_some() {
        loop {
            template_args.push(parse_template_arg(p)?);
            if p.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        p.expect(TokenKind::GreaterThan, "'>' closing template arguments")?;
    }

    let mut declarators = Vec::new();
    loop {
        if p.peek().is_ident("const") {
            p.bump();
            declarators.push(Declarator::Const);
        } else if p.at(TokenKind::Ampersand) {
            p.bump();
            if p.eat(TokenKind::Ampersand).is_some() {
                declarators.push(Declarator::RvalueRef);
            } else {
                declarators.push(Declarator::Ref);
            }
        } else if p.eat(TokenKind::Asterisk).is_some() {
            declarators.push(Declarator::Pointer);
        } else {
            break;
        }
    }

    Ok(HostType {
        leading_const,
        global,
        path,
        template_args,
        declarators,
    })
}

fn parse_template_arg(p: &mut TokenCursor) -> Result<TemplateArg> {
    let starts_type = p.at(TokenKind::Identifier) || p.at(TokenKind::DoubleColon);
    if starts_type {
        return Ok(TemplateArg::Type(parse_type(p)?));
    }

    // Constant expression: raw tokens up to `,` or `>` outside parentheses.
    let mut depth: usize = 0;
    let mut text = String::new();
    loop {
        match p.peek().kind {
            TokenKind::Eof => return p.error("unterminated template argument"),
            TokenKind::Comma | TokenKind::GreaterThan if depth == 0 => break,
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen if depth == 0 => break,
            TokenKind::CloseParen => depth -= 1,
            _ => {}
        }
        text.push_str(&p.bump().text);
    }
    if text.is_empty() {
        return p.error("expected template argument");
    }
    Ok(TemplateArg::Const(text))
}
