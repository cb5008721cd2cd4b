//! Grouped and windowed aggregation.

use crate::error::SourcePosition;
use crate::ir::exprs::Expr;
use crate::ir::fold::Fold;
use crate::ir::nodes::CircuitNode;
use crate::ir::types::Type;
use crate::ir::NodeId;
use serde::{Deserialize, Serialize};

/// Folds the rows of every group of an indexed Z-set, producing an
/// indexed Z-set from group key to finished accumulator.
///
/// The body is either a structured [`Fold`] or an opaque folder
/// expression (used by ORDER BY, whose folder is a runtime `Fold`
/// constructor call).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Aggregate {
    function: Option<Expr>,
    fold: Option<Fold>,
    key_type: Type,
    value_type: Type,
    input: NodeId,
    output: Type,
    position: SourcePosition,
}

impl Aggregate {
    pub fn with_fold(
        fold: Fold,
        key_type: Type,
        value_type: Type,
        input: NodeId,
        position: SourcePosition,
    ) -> Self {
        Self::new(None, Some(fold), key_type, value_type, input, position)
    }

    pub fn with_function(
        function: Expr,
        key_type: Type,
        value_type: Type,
        input: NodeId,
        position: SourcePosition,
    ) -> Self {
        Self::new(Some(function), None, key_type, value_type, input, position)
    }

    fn new(
        function: Option<Expr>,
        fold: Option<Fold>,
        key_type: Type,
        value_type: Type,
        input: NodeId,
        position: SourcePosition,
    ) -> Self {
        let output = Type::zset(Type::raw_tuple(vec![key_type.clone(), value_type.clone()]));
        Self {
            function,
            fold,
            key_type,
            value_type,
            input,
            output,
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

    pub const fn fold(&self) -> Option<&Fold> {
        self.fold.as_ref()
    }
}

impl CircuitNode for Aggregate {
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

    fn function(&self) -> Option<&Expr> {
        self.function.as_ref()
    }

    fn exprs_mut<'a>(&'a mut self, exprs: &mut Vec<&'a mut Expr>) {
        if let Some(function) = &mut self.function {
            exprs.push(function);
        }
        if let Some(fold) = &mut self.fold {
            fold.exprs_mut(exprs);
        }
    }
}

/// Aggregates each window of rows around every element of a
/// partitioned, ordered stream.
///
/// The operator is inherently incremental; the compiler wraps it
/// between a [`Differential`](crate::ir::nodes::Differential) and an
/// [`Integral`](crate::ir::nodes::Integral) to present
/// non-incremental semantics.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WindowAggregate {
    fold: Fold,
    /// The window frame, a `RelRange` runtime struct expression
    window: Expr,
    partition_type: Type,
    order_type: Type,
    input: NodeId,
    output: Type,
    position: SourcePosition,
}

impl WindowAggregate {
    pub fn new(
        fold: Fold,
        window: Expr,
        partition_type: Type,
        order_type: Type,
        input: NodeId,
        output: Type,
        position: SourcePosition,
    ) -> Self {
        Self {
            fold,
            window,
            partition_type,
            order_type,
            input,
            output,
            position,
        }
    }

    pub const fn input(&self) -> NodeId {
        self.input
    }

    pub const fn fold(&self) -> &Fold {
        &self.fold
    }

    pub const fn window(&self) -> &Expr {
        &self.window
    }

    pub const fn partition_type(&self) -> &Type {
        &self.partition_type
    }

    pub const fn order_type(&self) -> &Type {
        &self.order_type
    }
}

impl CircuitNode for WindowAggregate {
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

    fn exprs_mut<'a>(&'a mut self, exprs: &mut Vec<&'a mut Expr>) {
        exprs.push(&mut self.window);
        self.fold.exprs_mut(exprs);
    }
}
