//! Operator schemas: `name[.overload](params) -> return`.
//!
//! Parsing is total over the grammar below and rendering is canonical, so
//! `parse_schema(&sig.to_string())` yields `sig` again.
//!
//! ```text
//! schema := ident {'::' ident} ['.' ident] '(' [param {',' param}] ')' '->' return
//! param  := '*' | type [ident] ['=' default]
//! return := '(' [type [ident] {',' type [ident]}] ')' | type
//! type   := ident ['(' set ['!'] ['->' set] ')'] {'?' | '[' [number] ']'}
//! set    := member {'|' member}
//! member := ident | '*'
//! ```

use std::fmt;

use anyhow::Result;

use crate::cursor::TokenCursor;
use crate::diagnostics::DiagnosticCode;
use crate::lexer::{tokenize, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasInfo {
    /// Sets the value belongs to on entry. `*` is the wildcard set.
    pub before_set: Vec<String>,
    /// Sets it belongs to on exit, when written as `(a -> *)`.
    pub after_set: Option<Vec<String>>,
    pub is_writable: bool,
}

impl fmt::Display for AliasInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}", self.before_set.join("|"))?;
        if self.is_writable {
            f.write_str("!")?;
        }
        if let Some(after) = &self.after_set {
            write!(f, " -> {}", after.join("|"))?;
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaType {
    Tensor,
    Scalar,
    Bool,
    Int,
    Float,
    Str,
    KwArgsSentinel,
    /// Any other named type (`ScalarType`, `Layout`, `Device`, ...).
    Named(String),
    Optional(Box<SchemaType>),
    Array {
        element: Box<SchemaType>,
        size: Option<u32>,
    },
    Tuple(Vec<TupleElement>),
    Annotated {
        ty: Box<SchemaType>,
        alias: AliasInfo,
    },
}

impl SchemaType {
    /// Strips alias annotations.
    pub fn desugar(&self) -> &SchemaType {
        let mut ty = self;
        while let SchemaType::Annotated { ty: inner, .. } = ty {
            ty = inner;
        }
        ty
    }

    pub fn alias_info(&self) -> Option<&AliasInfo> {
        match self {
            SchemaType::Annotated { alias, .. } => Some(alias),
            _ => None,
        }
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self.desugar(), SchemaType::Tensor)
    }

    fn from_name(name: &str) -> Self {
        match name {
            "Tensor" => SchemaType::Tensor,
            "Scalar" => SchemaType::Scalar,
            "bool" => SchemaType::Bool,
            "int" => SchemaType::Int,
            "float" => SchemaType::Float,
            "str" => SchemaType::Str,
            other => SchemaType::Named(other.to_string()),
        }
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchemaType::Tensor => f.write_str("Tensor"),
            SchemaType::Scalar => f.write_str("Scalar"),
            SchemaType::Bool => f.write_str("bool"),
            SchemaType::Int => f.write_str("int"),
            SchemaType::Float => f.write_str("float"),
            SchemaType::Str => f.write_str("str"),
            SchemaType::KwArgsSentinel => f.write_str("*"),
            SchemaType::Named(n) => f.write_str(n),
            SchemaType::Optional(t) => write!(f, "{t}?"),
            SchemaType::Array { element, size } => match size {
                Some(n) => write!(f, "{element}[{n}]"),
                None => write!(f, "{element}[]"),
            },
            SchemaType::Tuple(elems) => {
                f.write_str("(")?;
                for (i, e) in elems.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", e.ty)?;
                    if let Some(name) = &e.name {
                        write!(f, " {name}")?;
                    }
                }
                f.write_str(")")
            }
            SchemaType::Annotated { ty, alias } => write!(f, "{ty}{alias}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleElement {
    pub ty: SchemaType,
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaParam {
    pub ty: SchemaType,
    pub name: Option<String>,
    pub default: Option<String>,
}

impl SchemaParam {
    pub fn is_kwargs_sentinel(&self) -> bool {
        self.ty == SchemaType::KwArgsSentinel
    }
}

impl fmt::Display for SchemaParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.ty)?;
        if let Some(name) = &self.name {
            write!(f, " {name}")?;
        }
        if let Some(default) = &self.default {
            write!(f, "={default}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperatorSignature {
    pub name: String,
    pub overload: Option<String>,
    pub params: Vec<SchemaParam>,
    pub return_type: SchemaType,
    /// Participates in explicit dispatch.
    pub dispatch: bool,
    /// Participates in default dispatch.
    pub default: bool,
}

impl OperatorSignature {
    /// `name.overload`, the key used by mapping tables and registrations.
    pub fn full_name(&self) -> String {
        match &self.overload {
            Some(o) => format!("{}.{o}", self.name),
            None => self.name.clone(),
        }
    }

    /// Index of the `*` marker, if any.
    pub fn kwargs_sentinel_index(&self) -> Option<usize> {
        self.params.iter().position(SchemaParam::is_kwargs_sentinel)
    }

    /// Alias info of the return type when it permits mutation.
    pub fn writable_return_alias(&self) -> Option<&AliasInfo> {
        self.return_type.alias_info().filter(|a| a.is_writable)
    }
}

impl fmt::Display for OperatorSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.full_name())?;
        for (i, p) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{p}")?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

pub fn parse_schema(text: &str) -> Result<OperatorSignature> {
    let tokens = tokenize(text)?;
    let mut p = TokenCursor::new(
        tokens,
        DiagnosticCode::OPG0110SchemaParseError,
        format!("schema {text:?}"),
    );

    let mut name = p.expect_ident("operator name")?;
    while p.eat(TokenKind::DoubleColon).is_some() {
        name.push_str("::");
        name.push_str(&p.expect_ident("operator name")?);
    }
    let overload = match p.eat(TokenKind::Dot) {
        Some(_) => Some(p.expect_ident("overload name")?),
        None => None,
    };

    p.expect(TokenKind::OpenParen, "'('")?;
    let mut params = Vec::new();
    if !p.at(TokenKind::CloseParen) {
        loop {
            params.push(parse_param(&mut p)?);
            if p.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
    }
    p.expect(TokenKind::CloseParen, "')'")?;
    p.expect(TokenKind::Arrow, "'->'")?;

    let return_type = if p.at(TokenKind::OpenParen) {
        parse_tuple(&mut p)?
    } else {
        parse_type(&mut p)?
    };
    if !p.at_eof() {
        return p.error("trailing input after return type");
    }

    Ok(OperatorSignature {
        name,
        overload,
        params,
        return_type,
        dispatch: false,
        default: false,
    })
}

fn parse_param(p: &mut TokenCursor) -> Result<SchemaParam> {
    if p.eat(TokenKind::Asterisk).is_some() {
        return Ok(SchemaParam {
            ty: SchemaType::KwArgsSentinel,
            name: None,
            default: None,
        });
    }
    let ty = parse_type(p)?;
    let name = p.eat(TokenKind::Identifier).map(|t| t.text);
    let default = match p.eat(TokenKind::Equals) {
        Some(_) => Some(p.skip_balanced_until_separator()?),
        None => None,
    };
    Ok(SchemaParam { ty, name, default })
}

fn parse_tuple(p: &mut TokenCursor) -> Result<SchemaType> {
    p.expect(TokenKind::OpenParen, "'('")?;
    let mut elems = Vec::new();
    if !p.at(TokenKind::CloseParen) {
        loop {
            let ty = parse_type(p)?;
            let name = p.eat(TokenKind::Identifier).map(|t| t.text);
            elems.push(TupleElement { ty, name });
            if p.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
    }
    p.expect(TokenKind::CloseParen, "')' closing return tuple")?;
    Ok(SchemaType::Tuple(elems))
}

fn parse_type(p: &mut TokenCursor) -> Result<SchemaType> {
    let base = p.expect_ident("type")?;
    let mut ty = SchemaType::from_name(&base);

    if p.eat(TokenKind::OpenParen).is_some() {
        let before_set = parse_alias_set(p)?;
        let is_writable = p.eat(TokenKind::Bang).is_some();
        let after_set = match p.eat(TokenKind::Arrow) {
            Some(_) => Some(parse_alias_set(p)?),
            None => None,
        };
        p.expect(TokenKind::CloseParen, "')' closing alias annotation")?;
        ty = SchemaType::Annotated {
            ty: Box::new(ty),
            alias: AliasInfo {
                before_set,
                after_set,
                is_writable,
            },
        };
    }

    loop {
        if p.eat(TokenKind::Question).is_some() {
            ty = SchemaType::Optional(Box::new(ty));
        } else if p.eat(TokenKind::OpenBracket).is_some() {
            let size = match p.eat(TokenKind::Number) {
                Some(tok) => match tok.text.parse::<u32>() {
                    Ok(n) => Some(n),
                    Err(_) => return p.error(format!("invalid array size {:?}", tok.text)),
                },
                None => None,
            };
            p.expect(TokenKind::CloseBracket, "']'")?;
            ty = SchemaType::Array {
                element: Box::new(ty),
                size,
            };
        } else {
            break;
        }
    }
    Ok(ty)
}

fn parse_alias_set(p: &mut TokenCursor) -> Result<Vec<String>> {
    let mut set = Vec::new();
    loop {
        if p.eat(TokenKind::Asterisk).is_some() {
            set.push("*".to_string());
        } else {
            set.push(p.expect_ident("alias set")?);
        }
        if p.eat(TokenKind::Pipe).is_none() {
            return Ok(set);
        }
    }
}
