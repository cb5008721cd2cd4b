//! Named inputs and outputs of the circuit.

use crate::error::SourcePosition;
use crate::ir::nodes::CircuitNode;
use crate::ir::types::Type;
use crate::ir::NodeId;
use serde::{Deserialize, Serialize};

/// A declared base table; an input of the circuit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Source {
    name: String,
    /// The original CREATE TABLE text, when known
    comment: Option<String>,
    output: Type,
    position: SourcePosition,
}

impl Source {
    pub fn new(
        name: impl Into<String>,
        comment: Option<String>,
        output: Type,
        position: SourcePosition,
    ) -> Self {
        Self {
            name: name.into(),
            comment,
            output,
            position,
        }
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

impl CircuitNode for Source {
    fn position(&self) -> SourcePosition {
        self.position
    }

    fn inputs(&self, _inputs: &mut Vec<NodeId>) {}

    fn output_type(&self) -> &Type {
        &self.output
    }

    fn is_multiset(&self) -> bool {
        false
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// A declared view; an observable output of the circuit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sink {
    name: String,
    /// The original CREATE VIEW text, when known
    comment: Option<String>,
    input: NodeId,
    output: Type,
    multiset: bool,
    position: SourcePosition,
}

impl Sink {
    pub fn new(
        name: impl Into<String>,
        comment: Option<String>,
        input: NodeId,
        output: Type,
        multiset: bool,
        position: SourcePosition,
    ) -> Self {
        Self {
            name: name.into(),
            comment,
            input,
            output,
            multiset,
            position,
        }
    }

    pub const fn input(&self) -> NodeId {
        self.input
    }

    pub fn comment(&self) -> Option<&str> {
        self.comment.as_deref()
    }
}

impl CircuitNode for Sink {
    fn position(&self) -> SourcePosition {
        self.position
    }

    fn inputs(&self, inputs: &mut Vec<NodeId>) {
        inputs.push(self.input);
    }

    fn output_type(&self) -> &Type {
        &self.output
    }

    fn is_multiset(&self) -> bool {
        self.multiset
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}

/// A suppressed view: declared, but not an output of the circuit.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Noop {
    name: String,
    input: NodeId,
    output: Type,
    multiset: bool,
    position: SourcePosition,
}

impl Noop {
    pub fn new(
        name: impl Into<String>,
        input: NodeId,
        output: Type,
        multiset: bool,
        position: SourcePosition,
    ) -> Self {
        Self {
            name: name.into(),
            input,
            output,
            multiset,
            position,
        }
    }

    pub const fn input(&self) -> NodeId {
        self.input
    }
}

impl CircuitNode for Noop {
    fn position(&self) -> SourcePosition {
        self.position
    }

    fn inputs(&self, inputs: &mut Vec<NodeId>) {
        inputs.push(self.input);
    }

    fn output_type(&self) -> &Type {
        &self.output
    }

    fn is_multiset(&self) -> bool {
        self.multiset
    }

    fn name(&self) -> Option<&str> {
        Some(&self.name)
    }
}
