//! Row-at-a-time operators.

use crate::error::SourcePosition;
use crate::ir::exprs::Expr;
use crate::ir::nodes::CircuitNode;
use crate::ir::types::Type;
use crate::ir::NodeId;
use serde::{Deserialize, Serialize};

/// Applies a closure to every row. A projection may duplicate rows,
/// so the output is always a multiset.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Map {
    function: Expr,
    input: NodeId,
    output: Type,
    position: SourcePosition,
}

impl Map {
    pub fn new(function: Expr, input: NodeId, output: Type, position: SourcePosition) -> Self {
        Self {
            function,
            input,
            output,
            position,
        }
    }

    pub const fn input(&self) -> NodeId {
        self.input
    }
}

impl CircuitNode for Map {
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
        true
    }

    fn function(&self) -> Option<&Expr> {
        Some(&self.function)
    }

    fn exprs_mut<'a>(&'a mut self, exprs: &mut Vec<&'a mut Expr>) {
        exprs.push(&mut self.function);
    }
}

/// Keeps the rows for which the predicate closure holds.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Filter {
    function: Expr,
    input: NodeId,
    output: Type,
    multiset: bool,
    position: SourcePosition,
}

impl Filter {
    pub fn new(
        function: Expr,
        input: NodeId,
        output: Type,
        multiset: bool,
        position: SourcePosition,
    ) -> Self {
        Self {
            function,
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

impl CircuitNode for Filter {
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

    fn function(&self) -> Option<&Expr> {
        Some(&self.function)
    }

    fn exprs_mut<'a>(&'a mut self, exprs: &mut Vec<&'a mut Expr>) {
        exprs.push(&mut self.function);
    }
}

/// Expands one row into any number of rows; implements UNNEST.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FlatMap {
    function: Expr,
    input: NodeId,
    output: Type,
    position: SourcePosition,
}

impl FlatMap {
    pub fn new(function: Expr, input: NodeId, output: Type, position: SourcePosition) -> Self {
        Self {
            function,
            input,
            output,
            position,
        }
    }

    pub const fn input(&self) -> NodeId {
        self.input
    }
}

impl CircuitNode for FlatMap {
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
        true
    }

    fn function(&self) -> Option<&Expr> {
        Some(&self.function)
    }

    fn exprs_mut<'a>(&'a mut self, exprs: &mut Vec<&'a mut Expr>) {
        exprs.push(&mut self.function);
    }
}
