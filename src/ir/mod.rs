//! The circuit intermediate representation: types, scalar
//! expressions, operators, and the circuits that own them.

pub mod circuit;
pub mod exprs;
pub mod fold;
mod ids;
pub mod nodes;
pub mod optimize;
pub mod types;
pub mod validate;

pub use circuit::{Circuit, CircuitPort, PartialCircuit};
pub use fold::Fold;
pub use ids::{NodeId, NodeIdGen, RelNodeId, RelNodeIdGen};
pub use types::{reduce_type, FloatWidth, IntWidth, Type, TypeKind};
