//! Promotion of Z-sets to indexed Z-sets.

use crate::error::SourcePosition;
use crate::ir::exprs::Expr;
use crate::ir::nodes::CircuitNode;
use crate::ir::types::Type;
use crate::ir::NodeId;
use serde::{Deserialize, Serialize};

/// Indexes a Z-set: the closure maps each row to a `(key, value)`
/// pair, producing an indexed Z-set consumable by joins and
/// aggregations.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Index {
    function: Expr,
    key_type: Type,
    value_type: Type,
    input: NodeId,
    output: Type,
    multiset: bool,
    position: SourcePosition,
}

impl Index {
    pub fn new(
        function: Expr,
        key_type: Type,
        value_type: Type,
        input: NodeId,
        multiset: bool,
        position: SourcePosition,
    ) -> Self {
        let output = Type::zset(Type::raw_tuple(vec![key_type.clone(), value_type.clone()]));
        Self {
            function,
            key_type,
            value_type,
            input,
            output,
            multiset,
            position,
        }
    }

    pub const fn input(&self) -> NodeId {
        self.input
    }

    pub const fn key_type(&self) -> &Type {
        &self.key_type
    }

    pub const fn value_type(&self) -> &Type {
        &self.value_type
    }
}

impl CircuitNode for Index {
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

/// Maps over an indexed Z-set, producing a new `(key, value)` pair
/// per entry.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct MapIndex {
    function: Expr,
    key_type: Type,
    value_type: Type,
    input: NodeId,
    output: Type,
    multiset: bool,
    position: SourcePosition,
}

impl MapIndex {
    pub fn new(
        function: Expr,
        key_type: Type,
        value_type: Type,
        input: NodeId,
        multiset: bool,
        position: SourcePosition,
    ) -> Self {
        let output = Type::zset(Type::raw_tuple(vec![key_type.clone(), value_type.clone()]));
        Self {
            function,
            key_type,
            value_type,
            input,
            output,
            multiset,
            position,
        }
    }

    pub const fn input(&self) -> NodeId {
        self.input
    }

    pub const fn key_type(&self) -> &Type {
        &self.key_type
    }

    pub const fn value_type(&self) -> &Type {
        &self.value_type
    }
}

impl CircuitNode for MapIndex {
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
