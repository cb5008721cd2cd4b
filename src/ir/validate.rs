//! Structural and type validation of circuits.

use crate::error::CompileError;
use crate::ir::exprs::Expr;
use crate::ir::nodes::{CircuitNode, Operator};
use crate::ir::types::{Type, TypeKind};
use crate::ir::NodeId;
use std::collections::{BTreeMap, HashSet};

/// Checks the invariants a sealed circuit must satisfy: every input
/// of an operator precedes it in topological (id) order, input
/// element types match the producers' output element types, declared
/// names are unique, and no operator signature mentions the `Any`
/// placeholder.
pub struct Validator {
    outputs: BTreeMap<NodeId, Type>,
}

impl Validator {
    pub fn new() -> Self {
        Self {
            outputs: BTreeMap::new(),
        }
    }

    pub fn validate(
        &mut self,
        nodes: &BTreeMap<NodeId, Operator>,
    ) -> Result<(), CompileError> {
        self.outputs.clear();
        let mut names = HashSet::new();

        for (&id, node) in nodes {
            let position = node.position();

            if let Some(name) = node.name() {
                if !names.insert(name.to_owned()) {
                    return Err(CompileError::translation(
                        format!("duplicate declared name {name}"),
                        position,
                    ));
                }
            }

            if node.output_type().contains_any() {
                return Err(CompileError::translation(
                    format!("operator {id} has unresolved type {}", node.output_type()),
                    position,
                ));
            }

            let input_types = node
                .input_list()
                .into_iter()
                .map(|input| {
                    self.outputs.get(&input).cloned().ok_or_else(|| {
                        CompileError::translation(
                            format!("operator {id} consumes {input}, which does not precede it"),
                            position,
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?;

            self.check_types(id, node, &input_types)?;
            self.outputs.insert(id, node.output_type().clone());
        }

        Ok(())
    }

    fn check_types(
        &self,
        id: NodeId,
        node: &Operator,
        inputs: &[Type],
    ) -> Result<(), CompileError> {
        let mismatch = |expected: &Type, actual: &Type| {
            Err(CompileError::type_mismatch(
                expected,
                format!("{actual} (operator {id})"),
                node.position(),
            ))
        };

        match node {
            // Type-preserving operators
            Operator::Sink(_)
            | Operator::Noop(_)
            | Operator::Filter(_)
            | Operator::Distinct(_)
            | Operator::Negate(_)
            | Operator::Differential(_)
            | Operator::Integral(_) => {
                if !inputs[0].same_type(node.output_type()) {
                    return mismatch(node.output_type(), &inputs[0]);
                }
            }

            Operator::Sum(_) => {
                for input in inputs {
                    if !input.same_type(node.output_type()) {
                        return mismatch(node.output_type(), input);
                    }
                }
            }

            Operator::Subtract(_) => {
                for input in inputs {
                    if !input.same_type(node.output_type()) {
                        return mismatch(node.output_type(), input);
                    }
                }
            }

            Operator::Join(_) => {
                let left_key = indexed_key(&inputs[0]);
                let right_key = indexed_key(&inputs[1]);
                match (left_key, right_key) {
                    (Some(left), Some(right)) if left.same_type(right) => {}
                    (Some(left), Some(right)) => return mismatch(left, right),
                    _ => {
                        return Err(CompileError::translation(
                            format!("operator {id} joins non-indexed inputs"),
                            node.position(),
                        ))
                    }
                }
            }

            Operator::Aggregate(_) | Operator::WindowAggregate(_) => {
                if indexed_key(&inputs[0]).is_none() {
                    return Err(CompileError::translation(
                        format!("operator {id} aggregates a non-indexed input"),
                        node.position(),
                    ));
                }
            }

            // These change their element type through a function, but
            // the function's declared input must still be the
            // producer's element type
            Operator::Map(_)
            | Operator::Index(_)
            | Operator::MapIndex(_)
            | Operator::FlatMap(_) => {
                if let Some(Expr::Closure(closure)) = node.function() {
                    if let Some(param) = closure.params.first() {
                        let declared = parameter_row_type(&param.ty);
                        let element = inputs[0].zset_element();
                        if !declared.same_type(element) {
                            return mismatch(element, &declared);
                        }
                    }
                }
            }

            Operator::Source(_) | Operator::Constant(_) => {}
        }

        Ok(())
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::new()
    }
}

/// The key type of an indexed Z-set, i.e. of a Z-set whose elements
/// are key/value raw tuples.
fn indexed_key(ty: &Type) -> Option<&Type> {
    let element = ty.zset_element();
    if element.is_raw_tuple() && element.size() == 2 {
        Some(element.field(0))
    } else {
        None
    }
}

/// The element type a function parameter declares. Rows are passed by
/// reference, and indexed entries as raw tuples of key/value
/// references, so reference wrappers are stripped before comparing
/// against the producer's element type.
fn parameter_row_type(ty: &Type) -> Type {
    let ty = if ty.is_ref() { ty.deref() } else { ty };
    match ty.kind() {
        TypeKind::RawTuple(fields) => Type::raw_tuple(
            fields
                .iter()
                .map(|field| {
                    if field.is_ref() {
                        field.deref().clone()
                    } else {
                        field.clone()
                    }
                })
                .collect(),
        ),
        _ => ty.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::Validator;
    use crate::error::SourcePosition;
    use crate::ir::exprs::{Expr, Literal, Parameter};
    use crate::ir::nodes::{Map, Negate, Operator, Source, Sum};
    use crate::ir::types::Type;
    use crate::ir::NodeId;
    use std::collections::BTreeMap;

    fn rows() -> Type {
        Type::zset(Type::tuple(vec![Type::i32()]))
    }

    fn pos() -> SourcePosition {
        SourcePosition::default()
    }

    #[test]
    fn inputs_must_precede_consumers() {
        let mut nodes: BTreeMap<NodeId, Operator> = BTreeMap::new();
        // The negation at n1 consumes n2, which comes later
        nodes.insert(
            NodeId::new(1),
            Negate::new(NodeId::new(2), rows(), false, pos()).into(),
        );
        nodes.insert(
            NodeId::new(2),
            Source::new("t", None, rows(), pos()).into(),
        );
        assert!(Validator::new().validate(&nodes).is_err());
    }

    #[test]
    fn summand_types_must_agree() {
        let wider = Type::zset(Type::tuple(vec![Type::i32().with_nullability(true)]));
        let mut nodes: BTreeMap<NodeId, Operator> = BTreeMap::new();
        nodes.insert(
            NodeId::new(1),
            Source::new("t", None, rows(), pos()).into(),
        );
        nodes.insert(
            NodeId::new(2),
            Source::new("s", None, wider.clone(), pos()).into(),
        );
        nodes.insert(
            NodeId::new(3),
            Sum::new(vec![NodeId::new(1), NodeId::new(2)], wider, pos()).into(),
        );
        assert!(Validator::new().validate(&nodes).is_err());
    }

    #[test]
    fn unresolved_types_are_rejected() {
        let mut nodes: BTreeMap<NodeId, Operator> = BTreeMap::new();
        nodes.insert(
            NodeId::new(1),
            Source::new("t", None, Type::zset(Type::tuple(vec![Type::any()])), pos()).into(),
        );
        assert!(Validator::new().validate(&nodes).is_err());
    }

    #[test]
    fn map_functions_must_accept_the_producer_rows() {
        let mut nodes: BTreeMap<NodeId, Operator> = BTreeMap::new();
        nodes.insert(
            NodeId::new(1),
            Source::new("t", None, rows(), pos()).into(),
        );

        // The closure expects string rows, the source produces i32
        let wrong_row = Type::tuple(vec![Type::string()]);
        let function = Expr::from(Literal::i32(0))
            .closure(vec![Parameter::new("t", wrong_row.ref_type())]);
        nodes.insert(
            NodeId::new(2),
            Map::new(function, NodeId::new(1), rows(), pos()).into(),
        );
        assert!(Validator::new().validate(&nodes).is_err());

        let function = Expr::from(Literal::i32(0)).closure(vec![Parameter::new(
            "t",
            Type::tuple(vec![Type::i32()]).ref_type(),
        )]);
        nodes.insert(
            NodeId::new(2),
            Map::new(function, NodeId::new(1), rows(), pos()).into(),
        );
        assert!(Validator::new().validate(&nodes).is_ok());
    }

    #[test]
    fn well_formed_chains_validate() {
        let mut nodes: BTreeMap<NodeId, Operator> = BTreeMap::new();
        nodes.insert(
            NodeId::new(1),
            Source::new("t", None, rows(), pos()).into(),
        );
        nodes.insert(
            NodeId::new(2),
            Negate::new(NodeId::new(1), rows(), false, pos()).into(),
        );
        assert!(Validator::new().validate(&nodes).is_ok());
    }
}
