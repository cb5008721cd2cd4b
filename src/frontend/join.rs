//! Decomposes join predicates into equi-key comparisons and a
//! leftover predicate.

use crate::error::{CompileError, SourcePosition};
use crate::frontend::relation::{CallKind, ScalarExpr};
use crate::frontend::sql_types::{convert_type, SqlType, SqlTypeKind};
use crate::ir::types::{reduce_type, Type};

/// One equi-key column pair. Both key columns are cast to
/// `result_type` when the key tuples are built.
#[derive(Debug, Clone, PartialEq)]
pub struct EqualityComparison {
    pub left_column: usize,
    pub right_column: usize,
    pub result_type: Type,
}

/// A join condition split into equi-key comparisons and whatever is
/// left, expressed over the joined row.
#[derive(Debug, Clone, PartialEq)]
pub struct ConditionDecomposition {
    pub comparisons: Vec<EqualityComparison>,
    pub leftover: Option<ScalarExpr>,
}

impl ConditionDecomposition {
    pub fn left_columns(&self) -> Vec<usize> {
        self.comparisons.iter().map(|c| c.left_column).collect()
    }

    pub fn right_columns(&self) -> Vec<usize> {
        self.comparisons.iter().map(|c| c.right_column).collect()
    }
}

/// Analyzes a join condition over a joined row whose first
/// `left_arity` fields come from the left input.
pub fn analyze_join_condition(
    condition: &ScalarExpr,
    left_arity: usize,
    left_row: &Type,
    right_row: &Type,
    position: SourcePosition,
) -> Result<ConditionDecomposition, CompileError> {
    let mut comparisons = Vec::new();
    let mut leftover = Vec::new();

    for conjunct in conjuncts(condition) {
        match equi_comparison(conjunct, left_arity) {
            Some((left_column, right_column)) => {
                let left_ty = left_row.field(left_column);
                let right_ty = right_row.field(right_column);
                let common = reduce_type(left_ty, right_ty)?;
                let result_type = common
                    .with_nullability(left_ty.may_be_null() || right_ty.may_be_null());
                comparisons.push(EqualityComparison {
                    left_column,
                    right_column,
                    result_type,
                });
            }
            None => leftover.push(conjunct.clone()),
        }
    }

    if comparisons.is_empty() && leftover.is_empty() {
        return Err(CompileError::translation(
            "join condition decomposed to nothing",
            position,
        ));
    }

    Ok(ConditionDecomposition {
        comparisons,
        leftover: rebuild_conjunction(leftover),
    })
}

/// Flattens a tree of ANDs into its conjuncts.
fn conjuncts(condition: &ScalarExpr) -> Vec<&ScalarExpr> {
    match condition {
        ScalarExpr::Call(call) if call.kind == CallKind::And => call
            .operands
            .iter()
            .flat_map(conjuncts)
            .collect(),
        other => vec![other],
    }
}

/// Recognizes `left_field = right_field` across the input boundary,
/// returning per-side column indices.
fn equi_comparison(conjunct: &ScalarExpr, left_arity: usize) -> Option<(usize, usize)> {
    let ScalarExpr::Call(call) = conjunct else {
        return None;
    };
    if call.kind != CallKind::Equals || call.operands.len() != 2 {
        return None;
    }
    let (ScalarExpr::InputRef { index: a, .. }, ScalarExpr::InputRef { index: b, .. }) =
        (&call.operands[0], &call.operands[1])
    else {
        return None;
    };

    if *a < left_arity && *b >= left_arity {
        Some((*a, *b - left_arity))
    } else if *b < left_arity && *a >= left_arity {
        Some((*b, *a - left_arity))
    } else {
        None
    }
}

/// Rebuilds the leftover conjuncts into one predicate.
fn rebuild_conjunction(mut conjuncts: Vec<ScalarExpr>) -> Option<ScalarExpr> {
    match conjuncts.len() {
        0 => None,
        1 => Some(conjuncts.remove(0)),
        _ => {
            let nullable = conjuncts
                .iter()
                .any(|conjunct| convert_type(conjunct.ty()).may_be_null());
            Some(ScalarExpr::call(
                CallKind::And,
                conjuncts,
                SqlType::new(SqlTypeKind::Boolean, nullable),
            ))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::analyze_join_condition;
    use crate::error::SourcePosition;
    use crate::frontend::relation::{CallKind, ScalarExpr};
    use crate::frontend::sql_types::{SqlType, SqlTypeKind};
    use crate::ir::types::Type;

    fn bool_ty() -> SqlType {
        SqlType::non_null(SqlTypeKind::Boolean)
    }

    fn eq(a: usize, b: usize) -> ScalarExpr {
        ScalarExpr::call(
            CallKind::Equals,
            vec![
                ScalarExpr::input(a, SqlType::non_null(SqlTypeKind::Integer)),
                ScalarExpr::input(b, SqlType::non_null(SqlTypeKind::Integer)),
            ],
            bool_ty(),
        )
    }

    #[test]
    fn equi_keys_are_split_from_the_leftover() {
        let left_row = Type::tuple(vec![Type::i32(), Type::i64()]);
        let right_row = Type::tuple(vec![Type::i64()]);
        // t.0 = s.0 AND t.1 < s.0
        let condition = ScalarExpr::call(
            CallKind::And,
            vec![
                eq(0, 2),
                ScalarExpr::call(
                    CallKind::LessThan,
                    vec![
                        ScalarExpr::input(1, SqlType::non_null(SqlTypeKind::BigInt)),
                        ScalarExpr::input(2, SqlType::non_null(SqlTypeKind::BigInt)),
                    ],
                    bool_ty(),
                ),
            ],
            bool_ty(),
        );

        let decomposition = analyze_join_condition(
            &condition,
            2,
            &left_row,
            &right_row,
            SourcePosition::default(),
        )
        .unwrap();

        assert_eq!(decomposition.comparisons.len(), 1);
        let comparison = &decomposition.comparisons[0];
        assert_eq!(comparison.left_column, 0);
        assert_eq!(comparison.right_column, 0);
        // i32 x i64 promotes to i64
        assert_eq!(comparison.result_type, Type::i64());
        assert!(decomposition.leftover.is_some());
    }

    #[test]
    fn swapped_sides_normalize() {
        let left_row = Type::tuple(vec![Type::i32()]);
        let right_row = Type::tuple(vec![Type::i32()]);
        // s.0 = t.0 written right-to-left
        let decomposition = analyze_join_condition(
            &eq(1, 0),
            1,
            &left_row,
            &right_row,
            SourcePosition::default(),
        )
        .unwrap();
        assert_eq!(decomposition.comparisons[0].left_column, 0);
        assert_eq!(decomposition.comparisons[0].right_column, 0);
        assert!(decomposition.leftover.is_none());
    }

    #[test]
    fn same_side_equality_stays_in_the_leftover() {
        let left_row = Type::tuple(vec![Type::i32(), Type::i32()]);
        let right_row = Type::tuple(vec![Type::i32()]);
        let decomposition = analyze_join_condition(
            &eq(0, 1),
            2,
            &left_row,
            &right_row,
            SourcePosition::default(),
        )
        .unwrap();
        assert!(decomposition.comparisons.is_empty());
        assert!(decomposition.leftover.is_some());
    }
}
