//! Z-set addition and its relatives.

use crate::error::SourcePosition;
use crate::ir::nodes::CircuitNode;
use crate::ir::types::Type;
use crate::ir::NodeId;
use serde::{Deserialize, Serialize};

/// Pointwise Z-set addition of N inputs.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Sum {
    inputs: Vec<NodeId>,
    output: Type,
    position: SourcePosition,
}

impl Sum {
    pub fn new(inputs: Vec<NodeId>, output: Type, position: SourcePosition) -> Self {
        Self {
            inputs,
            output,
            position,
        }
    }

    pub fn summands(&self) -> &[NodeId] {
        &self.inputs
    }
}

impl CircuitNode for Sum {
    fn position(&self) -> SourcePosition {
        self.position
    }

    fn inputs(&self, inputs: &mut Vec<NodeId>) {
        inputs.extend_from_slice(&self.inputs);
    }

    fn output_type(&self) -> &Type {
        &self.output
    }

    fn is_multiset(&self) -> bool {
        true
    }
}

/// Binary Z-set difference `left - right`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Subtract {
    left: NodeId,
    right: NodeId,
    output: Type,
    position: SourcePosition,
}

impl Subtract {
    pub fn new(left: NodeId, right: NodeId, output: Type, position: SourcePosition) -> Self {
        Self {
            left,
            right,
            output,
            position,
        }
    }

    pub const fn left(&self) -> NodeId {
        self.left
    }

    pub const fn right(&self) -> NodeId {
        self.right
    }
}

impl CircuitNode for Subtract {
    fn position(&self) -> SourcePosition {
        self.position
    }

    fn inputs(&self, inputs: &mut Vec<NodeId>) {
        inputs.extend([self.left, self.right]);
    }

    fn output_type(&self) -> &Type {
        &self.output
    }

    fn is_multiset(&self) -> bool {
        true
    }
}

/// Negates every weight.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Negate {
    input: NodeId,
    output: Type,
    multiset: bool,
    position: SourcePosition,
}

impl Negate {
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

impl CircuitNode for Negate {
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

/// Reduces a multiset to a set: elements with positive weight appear
/// exactly once.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Distinct {
    input: NodeId,
    output: Type,
    position: SourcePosition,
}

impl Distinct {
    pub fn new(input: NodeId, output: Type, position: SourcePosition) -> Self {
        Self {
            input,
            output,
            position,
        }
    }

    pub const fn input(&self) -> NodeId {
        self.input
    }
}

impl CircuitNode for Distinct {
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
        false
    }
}
