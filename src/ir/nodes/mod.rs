//! Circuit operators: the nodes of the dataflow DAG.
//!
//! Every operator records the plan position it was lowered from, its
//! output Z-set type, whether it may produce elements with weights
//! other than one (`is_multiset`), and its inputs as node ids. Ids
//! are assigned by the owning circuit; operators are immutable once
//! emitted.

mod aggregate;
mod constant;
mod differentiate;
mod filter_map;
mod index;
mod io;
mod join;
mod sum;

pub use aggregate::{Aggregate, WindowAggregate};
pub use constant::Constant;
pub use differentiate::{Differential, Integral};
pub use filter_map::{Filter, FlatMap, Map};
pub use index::{Index, MapIndex};
pub use io::{Noop, Sink, Source};
pub use join::Join;
pub use sum::{Distinct, Negate, Subtract, Sum};

use crate::error::SourcePosition;
use crate::ir::exprs::Expr;
use crate::ir::types::Type;
use crate::ir::NodeId;
use derive_more::{IsVariant, Unwrap};
use enum_dispatch::enum_dispatch;
use serde::{Deserialize, Serialize};

#[enum_dispatch(CircuitNode)]
#[derive(Debug, Clone, PartialEq, IsVariant, Unwrap, Deserialize, Serialize)]
pub enum Operator {
    Source(Source),
    Sink(Sink),
    Noop(Noop),
    Map(Map),
    Filter(Filter),
    Index(Index),
    MapIndex(MapIndex),
    FlatMap(FlatMap),
    Join(Join),
    Aggregate(Aggregate),
    WindowAggregate(WindowAggregate),
    Distinct(Distinct),
    Sum(Sum),
    Subtract(Subtract),
    Negate(Negate),
    Differential(Differential),
    Integral(Integral),
    Constant(Constant),
}

#[enum_dispatch]
pub trait CircuitNode {
    /// The plan position this operator was lowered from.
    fn position(&self) -> SourcePosition;

    /// Appends this operator's inputs, in order.
    fn inputs(&self, inputs: &mut Vec<NodeId>);

    /// The operator's output type, always a Z-set.
    fn output_type(&self) -> &Type;

    /// Whether elements may carry weights other than one.
    fn is_multiset(&self) -> bool;

    /// The declared name, for sources, sinks and suppressed sinks.
    fn name(&self) -> Option<&str> {
        None
    }

    /// The operator's main function, if it carries one.
    fn function(&self) -> Option<&Expr> {
        None
    }

    /// Every expression embedded in this operator, for IR-cleanup
    /// rewrites.
    fn exprs_mut<'a>(&'a mut self, _exprs: &mut Vec<&'a mut Expr>) {}
}

impl Operator {
    /// This operator's inputs as a fresh list.
    pub fn input_list(&self) -> Vec<NodeId> {
        let mut inputs = Vec::new();
        self.inputs(&mut inputs);
        inputs
    }

    /// The element type of the produced Z-set.
    pub fn output_element_type(&self) -> &Type {
        self.output_type().zset_element()
    }
}
