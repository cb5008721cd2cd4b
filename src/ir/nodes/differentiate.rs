//! Stream differentiation and integration.
//!
//! Wrapping an incremental operator as `I ∘ op ∘ D` presents it as a
//! non-incremental one.

use crate::error::SourcePosition;
use crate::ir::nodes::CircuitNode;
use crate::ir::types::Type;
use crate::ir::NodeId;
use serde::{Deserialize, Serialize};

/// Stream differentiation (`D`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Differential {
    input: NodeId,
    output: Type,
    multiset: bool,
    position: SourcePosition,
}

impl Differential {
    pub fn new(input: NodeId, output: Type, multiset: bool, position: SourcePosition) -> Self {
        Self {
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

impl CircuitNode for Differential {
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
}

/// Stream integration (`I`).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Integral {
    input: NodeId,
    output: Type,
    multiset: bool,
    position: SourcePosition,
}

impl Integral {
    pub fn new(input: NodeId, output: Type, multiset: bool, position: SourcePosition) -> Self {
        Self {
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

impl CircuitNode for Integral {
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
}
