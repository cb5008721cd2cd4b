//! Constant Z-set sources.

use crate::error::SourcePosition;
use crate::ir::exprs::ZSetLiteral;
use crate::ir::nodes::CircuitNode;
use crate::ir::types::Type;
use crate::ir::NodeId;
use serde::{Deserialize, Serialize};

/// Emits a literal Z-set; lowered from a VALUES clause.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Constant {
    value: ZSetLiteral,
    output: Type,
    multiset: bool,
    position: SourcePosition,
}

impl Constant {
    pub fn new(value: ZSetLiteral, multiset: bool, position: SourcePosition) -> Self {
        let output = value.ty();
        Self {
            value,
            output,
            multiset,
            position,
        }
    }

    pub const fn value(&self) -> &ZSetLiteral {
        &self.value
    }
}

impl CircuitNode for Constant {
    fn position(&self) -> SourcePosition {
        self.position
    }

    fn inputs(&self, _inputs: &mut Vec<NodeId>) {}

    fn output_type(&self) -> &Type {
        &self.output
    }

    fn is_multiset(&self) -> bool {
        self.multiset
    }
}
