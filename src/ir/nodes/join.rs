//! Equi-joins over indexed Z-sets.

use crate::error::SourcePosition;
use crate::ir::exprs::Expr;
use crate::ir::nodes::CircuitNode;
use crate::ir::types::Type;
use crate::ir::NodeId;
use serde::{Deserialize, Serialize};

/// Joins two indexed Z-sets on matching keys. The pair closure
/// `|key, left, right| -> row` builds the output row for every key
/// match.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Join {
    function: Expr,
    left: NodeId,
    right: NodeId,
    output: Type,
    multiset: bool,
    position: SourcePosition,
}

impl Join {
    pub fn new(
        function: Expr,
        left: NodeId,
        right: NodeId,
        output: Type,
        multiset: bool,
        position: SourcePosition,
    ) -> Self {
        Self {
            function,
            left,
            right,
            output,
            multiset,
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

impl CircuitNode for Join {
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
        self.multiset
    }

    fn function(&self) -> Option<&Expr> {
        Some(&self.function)
    }

    fn exprs_mut<'a>(&'a mut self, exprs: &mut Vec<&'a mut Expr>) {
        exprs.push(&mut self.function);
    }
}
