//! The circuit under construction and its sealed form.

use crate::error::{CompileError, ErrorReporter, Severity};
use crate::ir::nodes::{CircuitNode, Operator};
use crate::ir::types::Type;
use crate::ir::validate::Validator;
use crate::ir::{NodeId, NodeIdGen};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::rc::Rc;

/// A circuit under construction: an append-only collection of
/// operators plus name indices for declared tables and views.
///
/// Node ids increase monotonically, so iteration order is a
/// topological order of the DAG. The partial circuit exclusively owns
/// every emitted operator until [`seal`](Self::seal) transfers them
/// to a [`Circuit`].
pub struct PartialCircuit {
    nodes: BTreeMap<NodeId, Operator>,
    declarations: IndexMap<String, NodeId>,
    inputs: Vec<NodeId>,
    outputs: Vec<NodeId>,
    ids: NodeIdGen,
    reporter: Rc<dyn ErrorReporter>,
}

impl PartialCircuit {
    pub fn new(reporter: Rc<dyn ErrorReporter>) -> Self {
        Self {
            nodes: BTreeMap::new(),
            declarations: IndexMap::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            ids: NodeIdGen::new(),
            reporter,
        }
    }

    /// Appends an operator, assigning its id.
    ///
    /// A named operator whose name is already declared is dropped: a
    /// `Duplicate definition` diagnostic is reported for both sites
    /// and the previous declaration's id is returned.
    pub fn add<N>(&mut self, node: N) -> NodeId
    where
        N: Into<Operator>,
    {
        let node = node.into();
        tracing::trace!(operator = ?node, "adding operator");

        if let Some(name) = node.name() {
            if let Some(&previous) = self.declarations.get(name) {
                self.reporter.report(
                    node.position(),
                    Severity::Warning,
                    "Duplicate definition",
                    &format!("view {name} already defined"),
                );
                self.reporter.report(
                    self.nodes[&previous].position(),
                    Severity::Warning,
                    "Duplicate definition",
                    "this is the previous definition",
                );
                return previous;
            }
        }

        let id = self.ids.next();
        if let Some(name) = node.name() {
            self.declarations.insert(name.to_owned(), id);
        }
        match &node {
            Operator::Source(_) => self.inputs.push(id),
            Operator::Sink(_) => self.outputs.push(id),
            _ => {}
        }
        self.nodes.insert(id, node);
        id
    }

    /// The operator with the given id.
    ///
    /// ## Panics
    ///
    /// Panics if no such operator exists.
    pub fn get(&self, id: NodeId) -> &Operator {
        &self.nodes[&id]
    }

    /// Looks up a declared table or view by name.
    pub fn resolve(&self, name: &str) -> Option<NodeId> {
        self.declarations.get(name).copied()
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, Operator> {
        &self.nodes
    }

    /// The names of the declared input tables, in declaration order.
    pub fn input_tables(&self) -> Vec<&str> {
        self.inputs
            .iter()
            .filter_map(|id| self.nodes[id].name())
            .collect()
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn output_count(&self) -> usize {
        self.outputs.len()
    }

    /// Validates the circuit and freezes it. No more changes are
    /// expected after this point.
    pub fn seal(self, name: impl Into<String>) -> Result<Circuit, CompileError> {
        Validator::new().validate(&self.nodes)?;

        let port = |id: &NodeId| {
            let node = &self.nodes[id];
            CircuitPort {
                name: node
                    .name()
                    .unwrap_or_default()
                    .to_owned(),
                node: *id,
                element_type: node.output_element_type().clone(),
            }
        };
        let inputs = self.inputs.iter().map(&port).collect();
        let outputs = self.outputs.iter().map(&port).collect();

        Ok(Circuit {
            name: name.into(),
            nodes: self.nodes,
            inputs,
            outputs,
        })
    }
}

/// A named circuit input or output.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CircuitPort {
    pub name: String,
    pub node: NodeId,
    pub element_type: Type,
}

/// A sealed circuit: an immutable operator DAG with named, typed
/// inputs and outputs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Circuit {
    name: String,
    nodes: BTreeMap<NodeId, Operator>,
    inputs: Vec<CircuitPort>,
    outputs: Vec<CircuitPort>,
}

impl Circuit {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn nodes(&self) -> &BTreeMap<NodeId, Operator> {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut BTreeMap<NodeId, Operator> {
        &mut self.nodes
    }

    pub fn get(&self, id: NodeId) -> &Operator {
        &self.nodes[&id]
    }

    /// The declared inputs, in declaration order.
    pub fn inputs(&self) -> &[CircuitPort] {
        &self.inputs
    }

    /// The declared outputs, in declaration order.
    pub fn outputs(&self) -> &[CircuitPort] {
        &self.outputs
    }
}
