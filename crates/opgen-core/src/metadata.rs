//! Typed side-table associating host declarations with operator metadata.
//!
//! Declarations are identified by their index in the translation unit. The table
//! is usually filled from the `// {...}` comment trailing each declaration, but any
//! declaration source may populate it directly.

use std::collections::BTreeMap;

use anyhow::Result;
use serde::Deserialize;

use crate::diagnostics::{fail, DiagnosticCode};
use crate::host::TranslationUnit;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpMetadata {
    pub schema: String,
    pub dispatch: bool,
    pub default: bool,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawMetadata {
    schema: String,
    dispatch: String,
    default: String,
}

impl OpMetadata {
    pub fn from_json(text: &str) -> Result<Self> {
        let raw: RawMetadata = match serde_json::from_str(text.trim()) {
            Ok(raw) => raw,
            Err(err) => {
                return fail(
                    DiagnosticCode::OPG0100MetadataError,
                    format!("{err}: {:?}", text.trim()),
                )
            }
        };
        Ok(OpMetadata {
            dispatch: parse_flag(opgen_contracts::METADATA_KEY_DISPATCH, &raw.dispatch)?,
            default: parse_flag(opgen_contracts::METADATA_KEY_DEFAULT, &raw.default)?,
            schema: raw.schema,
        })
    }
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value {
        "True" => Ok(true),
        "False" => Ok(false),
        other => fail(
            DiagnosticCode::OPG0100MetadataError,
            format!("{key:?} must be \"True\" or \"False\", got {other:?}"),
        ),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataTable {
    entries: BTreeMap<usize, OpMetadata>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reads the first single-line comment trailing each declaration's `;`.
    /// Declarations without one have no entry.
    pub fn from_trailing_comments(tu: &TranslationUnit) -> Result<Self> {
        let mut table = MetadataTable::new();
        for (idx, decl) in tu.decls.iter().enumerate() {
            let Some(comment) = decl.terminator.trailing_line_comment() else {
                continue;
            };
            let meta = OpMetadata::from_json(comment).map_err(|err| {
                err.context(format!(
                    "metadata for `{}` at {}",
                    decl.name, decl.terminator.location
                ))
            })?;
            table.insert(idx, meta);
        }
        Ok(table)
    }

    pub fn insert(&mut self, decl_index: usize, meta: OpMetadata) {
        self.entries.insert(decl_index, meta);
    }

    pub fn get(&self, decl_index: usize) -> Option<&OpMetadata> {
        self.entries.get(&decl_index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
