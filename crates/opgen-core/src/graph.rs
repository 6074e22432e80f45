//! Declarative op graphs and their evaluation into an ordered instruction list.
//!
//! A graph is an arena of [`OpNode`]s addressed by [`NodeId`]. Nodes may only
//! reference nodes added before them, so every graph is a DAG. Building a node
//! does not evaluate anything; [`EvalContext::eval`] walks the graph from a root
//! and records nodes in post-order, which is the order the instructions must be
//! emitted in.
//!
//! Ids carry the builder they came from; a graph refuses ids minted by any
//! other builder.

use std::sync::atomic::{AtomicU32, Ordering};

use anyhow::Result;

use crate::diagnostics::{fail, DiagnosticCode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId {
    graph: u32,
    index: usize,
}

impl NodeId {
    pub fn index(self) -> usize {
        self.index
    }
}

static NEXT_GRAPH_ID: AtomicU32 = AtomicU32::new(0);

/// An op input or attribute value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// Reference to a host parameter by name.
    Param(String),
    /// Target-language expression used verbatim.
    Literal(String),
    /// First output of an upstream node.
    Output(NodeId),
}

impl Value {
    pub fn param(name: impl Into<String>) -> Self {
        Value::Param(name.into())
    }

    pub fn literal(expr: impl Into<String>) -> Self {
        Value::Literal(expr.into())
    }
}

impl From<NodeId> for Value {
    fn from(id: NodeId) -> Self {
        Value::Output(id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpNode {
    pub name: String,
    pub outputs: usize,
    pub inputs: Vec<Value>,
    /// In declaration order. `None` values are dropped at emission.
    pub attributes: Vec<(String, Option<Value>)>,
    pub domain: Option<String>,
}

impl OpNode {
    fn references(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.inputs
            .iter()
            .chain(self.attributes.iter().filter_map(|(_, v)| v.as_ref()))
            .filter_map(|v| match v {
                Value::Output(id) => Some(*id),
                _ => None,
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpGraph {
    id: u32,
    nodes: Vec<OpNode>,
    root: NodeId,
}

impl OpGraph {
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Panics if `id` was not minted by the builder of this graph.
    pub fn node(&self, id: NodeId) -> &OpNode {
        assert_eq!(id.graph, self.id, "node {} belongs to another graph", id.index);
        &self.nodes[id.index]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[derive(Debug)]
pub struct GraphBuilder {
    id: u32,
    nodes: Vec<OpNode>,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        GraphBuilder {
            id: NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed),
            nodes: Vec::new(),
        }
    }

    fn owns(&self, id: NodeId) -> bool {
        id.graph == self.id && id.index < self.nodes.len()
    }

    /// Starts a node named `name` producing `outputs` values.
    pub fn op(&mut self, name: impl Into<String>, outputs: usize) -> OpBuilder<'_> {
        OpBuilder {
            graph: self,
            node: OpNode {
                name: name.into(),
                outputs,
                inputs: Vec::new(),
                attributes: Vec::new(),
                domain: None,
            },
        }
    }

    pub fn finish(self, root: NodeId) -> Result<OpGraph> {
        if !self.owns(root) {
            return fail(
                DiagnosticCode::OPG0300InvalidGraph,
                format!("root node {} is not part of this graph", root.index),
            );
        }
        for (idx, node) in self.nodes.iter().enumerate() {
            if let Some(bad) = node.references().find(|r| r.graph != self.id) {
                return fail(
                    DiagnosticCode::OPG0300InvalidGraph,
                    format!(
                        "node {idx} ({}) references node {} of another graph",
                        node.name, bad.index
                    ),
                );
            }
            if let Some(bad) = node.references().find(|r| r.index >= idx) {
                return fail(
                    DiagnosticCode::OPG0300InvalidGraph,
                    format!(
                        "node {idx} ({}) references node {} which is not declared before it",
                        node.name, bad.index
                    ),
                );
            }
        }
        Ok(OpGraph {
            id: self.id,
            nodes: self.nodes,
            root,
        })
    }
}

pub struct OpBuilder<'g> {
    graph: &'g mut GraphBuilder,
    node: OpNode,
}

impl OpBuilder<'_> {
    pub fn input(mut self, value: impl Into<Value>) -> Self {
        self.node.inputs.push(value.into());
        self
    }

    pub fn inputs<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.node.inputs.extend(values.into_iter().map(Into::into));
        self
    }

    pub fn attr(mut self, name: impl Into<String>, value: impl Into<Option<Value>>) -> Self {
        self.node.attributes.push((name.into(), value.into()));
        self
    }

    pub fn domain(mut self, domain: impl Into<String>) -> Self {
        self.node.domain = Some(domain.into());
        self
    }

    pub fn add(self) -> NodeId {
        let id = NodeId {
            graph: self.graph.id,
            index: self.graph.nodes.len(),
        };
        self.graph.nodes.push(self.node);
        id
    }
}

/// Handle to a node's outputs. Named only once the whole tree is evaluated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBinding {
    pub node: NodeId,
}

/// State of one evaluation: nodes in the order they must execute.
#[derive(Debug, Default)]
pub struct EvalContext {
    order: Vec<NodeId>,
    visited: Vec<bool>,
    names: Vec<Option<String>>,
}

impl EvalContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `id` after everything it references. A node reachable along
    /// several paths is appended once.
    pub fn eval(&mut self, graph: &OpGraph, id: NodeId) -> OutputBinding {
        if self.visited.len() < graph.len() {
            self.visited.resize(graph.len(), false);
        }
        if !self.visited[id.index] {
            self.visited[id.index] = true;
            let deps: Vec<NodeId> = graph.node(id).references().collect();
            for dep in deps {
                self.eval(graph, dep);
            }
            self.order.push(id);
        }
        OutputBinding { node: id }
    }

    /// Assigns `result_<index>_<opname>` to every evaluated node, in order.
    pub fn prepare_outputs(&mut self, graph: &OpGraph) {
        self.names = vec![None; graph.len()];
        for (i, id) in self.order.iter().enumerate() {
            let name = format!("result_{i}_{}", sanitize_ident(&graph.node(*id).name));
            self.names[id.index] = Some(name);
        }
    }

    pub fn ops(&self) -> &[NodeId] {
        &self.order
    }

    pub fn binding_name(&self, binding: OutputBinding) -> Option<&str> {
        self.names.get(binding.node.index).and_then(|n| n.as_deref())
    }
}

/// Evaluates `graph` from its root and names every output.
pub fn evaluate(graph: &OpGraph) -> EvalContext {
    let mut ctx = EvalContext::new();
    ctx.eval(graph, graph.root());
    ctx.prepare_outputs(graph);
    ctx
}

fn sanitize_ident(s: &str) -> String {
    s.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_reference_is_rejected() {
        let mut g = GraphBuilder::new();
        let a = g.op("Relu", 1).input(Value::param("x")).add();
        // Hand-craft a self reference; the public API cannot produce one.
        g.nodes[a.index].inputs.push(Value::Output(a));
        let err = g.finish(a).expect_err("must fail");
        assert!(err.to_string().contains("OPG0300"), "{err}");
    }

    #[test]
    fn names_are_valid_identifiers() {
        assert_eq!(sanitize_ident("com.microsoft.Gelu"), "com_microsoft_Gelu");
    }
}
