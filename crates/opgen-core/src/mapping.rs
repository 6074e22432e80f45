//! Operator name -> op graph table, and its JSON file form.

use std::collections::BTreeMap;
use std::fmt;

use anyhow::Result;
use serde::Deserialize;

use opgen_contracts::{OPGEN_MAPPINGS_SCHEMA_VERSION, SIGNATURE_ONLY_KEYWORD};

use crate::diagnostics::{fail, DiagnosticCode};
use crate::graph::{GraphBuilder, NodeId, OpGraph, Value};
use crate::options::GeneratorOptions;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mapping {
    Graph(OpGraph),
    /// Emit the prototype only.
    SignatureOnly,
}

impl From<OpGraph> for Mapping {
    fn from(graph: OpGraph) -> Self {
        Mapping::Graph(graph)
    }
}

/// Drained as operators are emitted; whatever is left at the end was never
/// matched by a host declaration.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    entries: BTreeMap<String, Mapping>,
}

impl MappingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, op_name: impl Into<String>, mapping: impl Into<Mapping>) {
        self.entries.insert(op_name.into(), mapping.into());
    }

    pub fn register_many<I, K, M>(&mut self, mappings: I)
    where
        I: IntoIterator<Item = (K, M)>,
        K: Into<String>,
        M: Into<Mapping>,
    {
        for (name, mapping) in mappings {
            self.register(name, mapping);
        }
    }

    pub fn contains(&self, op_name: &str) -> bool {
        self.entries.contains_key(op_name)
    }

    pub fn get(&self, op_name: &str) -> Option<&Mapping> {
        self.entries.get(op_name)
    }

    pub fn take(&mut self, op_name: &str) -> Option<Mapping> {
        self.entries.remove(op_name)
    }

    pub fn remaining_names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingFile {
    pub schema_version: String,
    #[serde(default)]
    pub options: Option<GeneratorOptions>,
    pub ops: BTreeMap<String, MappingSpec>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum MappingSpec {
    Keyword(String),
    Op(OpSpec),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OpSpec {
    pub op: String,
    #[serde(default = "default_outputs")]
    pub outputs: usize,
    #[serde(default)]
    pub inputs: Vec<ValueSpec>,
    #[serde(default)]
    pub attributes: AttributeSpecs,
    #[serde(default)]
    pub domain: Option<String>,
}

fn default_outputs() -> usize {
    1
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ValueSpec {
    Param(String),
    Literal(LiteralSpec),
    Op(Box<OpSpec>),
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LiteralSpec {
    pub literal: String,
}

/// Node attributes in the order the mapping file lists them; that order is
/// the order they are written into the generated attribute map.
#[derive(Debug, Default)]
pub struct AttributeSpecs(pub Vec<(String, Option<ValueSpec>)>);

impl<'de> Deserialize<'de> for AttributeSpecs {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct AttributeSpecsVisitor;

        impl<'de> serde::de::Visitor<'de> for AttributeSpecsVisitor {
            type Value = AttributeSpecs;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a map of attribute name to value or null")
            }

            fn visit_map<V>(self, mut map: V) -> Result<AttributeSpecs, V::Error>
            where
                V: serde::de::MapAccess<'de>,
            {
                let mut attrs: Vec<(String, Option<ValueSpec>)> = Vec::new();
                while let Some(name) = map.next_key::<String>()? {
                    if attrs.iter().any(|(n, _)| *n == name) {
                        return Err(serde::de::Error::custom(format!(
                            "duplicate attribute {name:?}"
                        )));
                    }
                    let value = map.next_value()?;
                    attrs.push((name, value));
                }
                Ok(AttributeSpecs(attrs))
            }
        }

        deserializer.deserialize_map(AttributeSpecsVisitor)
    }
}

impl MappingFile {
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let file: MappingFile = match serde_json::from_slice(bytes) {
            Ok(f) => f,
            Err(err) => return fail(DiagnosticCode::OPG0600InvalidMappingFile, err.to_string()),
        };
        if file.schema_version.trim() != OPGEN_MAPPINGS_SCHEMA_VERSION {
            return fail(
                DiagnosticCode::OPG0600InvalidMappingFile,
                format!(
                    "schema_version mismatch: expected {OPGEN_MAPPINGS_SCHEMA_VERSION} got {:?}",
                    file.schema_version
                ),
            );
        }
        Ok(file)
    }

    pub fn to_table(&self) -> Result<MappingTable> {
        let mut table = MappingTable::new();
        for (name, spec) in &self.ops {
            let mapping = match spec {
                MappingSpec::Keyword(k) if k == SIGNATURE_ONLY_KEYWORD => Mapping::SignatureOnly,
                MappingSpec::Keyword(other) => {
                    return fail(
                        DiagnosticCode::OPG0600InvalidMappingFile,
                        format!(
                            "ops[{name:?}]: unknown keyword {other:?} (expected {SIGNATURE_ONLY_KEYWORD:?} or an op object)"
                        ),
                    )
                }
                MappingSpec::Op(op) => {
                    let mut g = GraphBuilder::new();
                    let root = build_node(&mut g, op);
                    Mapping::Graph(g.finish(root)?)
                }
            };
            table.register(name.clone(), mapping);
        }
        Ok(table)
    }
}

fn build_node(g: &mut GraphBuilder, spec: &OpSpec) -> NodeId {
    let inputs: Vec<Value> = spec.inputs.iter().map(|v| build_value(g, v)).collect();
    let attributes: Vec<(String, Option<Value>)> = spec
        .attributes
        .0
        .iter()
        .map(|(k, v)| (k.clone(), v.as_ref().map(|v| build_value(g, v))))
        .collect();

    let mut op = g.op(spec.op.clone(), spec.outputs).inputs(inputs);
    for (name, value) in attributes {
        op = op.attr(name, value);
    }
    if let Some(domain) = &spec.domain {
        op = op.domain(domain.clone());
    }
    op.add()
}

fn build_value(g: &mut GraphBuilder, spec: &ValueSpec) -> Value {
    match spec {
        ValueSpec::Param(name) => Value::param(name.clone()),
        ValueSpec::Literal(lit) => Value::literal(lit.literal.clone()),
        ValueSpec::Op(op) => Value::Output(build_node(g, op)),
    }
}
