//! Lowers aggregate calls into fold descriptors.
//!
//! Each call becomes a slot of one accumulator tuple: a zero, a
//! weighted increment, an optional finishing projection, and the
//! result to produce for an empty group.

use crate::error::{CompileError, SourcePosition};
use crate::frontend::relation::{AggregateCall, AggregateKind};
use crate::ir::exprs::{
    Apply, Binary, Closure, Expr, If, Literal, Opcode, RawTupleExpr, TupleExpr, Variable,
};
use crate::ir::fold::Fold;
use crate::ir::types::Type;

/// Compiles one aggregate call against a row variable.
pub struct AggregateCompiler<'a> {
    call: &'a AggregateCall,
    /// The declared result type of this call
    result_type: Type,
    row: &'a Variable,
    position: SourcePosition,
}

impl<'a> AggregateCompiler<'a> {
    pub fn new(
        call: &'a AggregateCall,
        result_type: Type,
        row: &'a Variable,
        position: SourcePosition,
    ) -> Result<Self, CompileError> {
        if call.distinct {
            return Err(CompileError::unimplemented(
                "DISTINCT aggregates",
                position,
            ));
        }
        Ok(Self {
            call,
            result_type,
            row,
            position,
        })
    }

    pub fn accumulator_type(&self) -> Type {
        match self.call.kind {
            AggregateKind::Count
            | AggregateKind::Sum
            | AggregateKind::Min
            | AggregateKind::Max => self.result_type.clone(),
            // Running (sum, count) pair
            AggregateKind::Avg => Type::raw_tuple(vec![
                self.result_type.with_nullability(true),
                Type::i64(),
            ]),
        }
    }

    pub fn zero(&self) -> Expr {
        match self.call.kind {
            AggregateKind::Count => Expr::from(Literal::i64(0)).cast(&self.result_type),
            AggregateKind::Sum | AggregateKind::Min | AggregateKind::Max => {
                Expr::none(&self.result_type)
            }
            AggregateKind::Avg => RawTupleExpr::new(vec![
                Expr::none(&self.result_type),
                Literal::i64(0).into(),
            ])
            .into(),
        }
    }

    /// The next accumulator value, given the current one and the
    /// fold's weight variable.
    pub fn increment(&self, accumulator: Expr, weight: &Variable) -> Result<Expr, CompileError> {
        match self.call.kind {
            AggregateKind::Count => {
                let delta = self.count_delta(weight)?;
                let ty = accumulator.ty().clone();
                Ok(Binary::new(Opcode::Add, accumulator, delta, ty).into())
            }

            AggregateKind::Sum => {
                let value = self.argument()?;
                let weighted = weigh(value, weight);
                Ok(agg_apply("agg_plus", accumulator, weighted, &self.result_type))
            }

            // The runtime primitives handle weights; a linear fold
            // cannot retract a minimum or maximum
            AggregateKind::Min => {
                let value = self.argument()?;
                Ok(agg_apply("agg_min", accumulator, value, &self.result_type))
            }
            AggregateKind::Max => {
                let value = self.argument()?;
                Ok(agg_apply("agg_max", accumulator, value, &self.result_type))
            }

            AggregateKind::Avg => {
                let sum_ty = self.result_type.with_nullability(true);
                let value = self.argument()?;
                let sum = agg_apply(
                    "agg_plus",
                    accumulator.clone().field(0),
                    weigh(value, weight),
                    &sum_ty,
                );
                let count_delta = self.count_delta(weight)?;
                let count = Binary::new(
                    Opcode::Add,
                    accumulator.field(1),
                    count_delta,
                    Type::i64(),
                );
                Ok(RawTupleExpr::new(vec![sum, count.into()]).into())
            }
        }
    }

    /// The finishing projection, when the accumulator is not already
    /// the result.
    pub fn post_process(&self, accumulator: Expr) -> Option<Expr> {
        match self.call.kind {
            AggregateKind::Avg => {
                let sum_ty = self.result_type.with_nullability(true);
                let sum = accumulator.clone().field(0);
                let count = accumulator
                    .field(1)
                    .cast(&self.result_type.with_nullability(false));
                let quotient: Expr =
                    Binary::new(Opcode::Div, sum, count, sum_ty).into();
                Some(quotient.cast(&self.result_type))
            }
            _ => None,
        }
    }

    /// The result this call produces for an empty group.
    pub fn empty_result(&self) -> Expr {
        match self.call.kind {
            AggregateKind::Count => Expr::from(Literal::i64(0)).cast(&self.result_type),
            AggregateKind::Sum
            | AggregateKind::Min
            | AggregateKind::Max
            | AggregateKind::Avg => Expr::none(&self.result_type),
        }
    }

    /// The call's single argument field of the row.
    fn argument(&self) -> Result<Expr, CompileError> {
        match self.call.arguments.as_slice() {
            [index] => Ok(Expr::from(self.row).field(*index).clone_if_needed()),
            arguments => Err(CompileError::translation(
                format!(
                    "aggregate {:?} expects 1 argument, got {}",
                    self.call.kind,
                    arguments.len(),
                ),
                self.position,
            )),
        }
    }

    /// `1 * w`, or `0 * w` for rows whose argument is NULL.
    fn count_delta(&self, weight: &Variable) -> Result<Expr, CompileError> {
        let counted: Expr = match self.call.arguments.as_slice() {
            [] => Literal::i64(1).into(),
            [index] => {
                let argument = Expr::from(self.row).field(*index);
                if argument.ty().may_be_null() {
                    If::new(
                        argument.is_null_expr(),
                        Literal::i64(0).into(),
                        Literal::i64(1).into(),
                    )
                    .into()
                } else {
                    Literal::i64(1).into()
                }
            }
            arguments => {
                return Err(CompileError::translation(
                    format!("COUNT expects at most 1 argument, got {}", arguments.len()),
                    self.position,
                ))
            }
        };
        Ok(weigh(counted, weight))
    }
}

/// Multiplies a value by the fold's weight. `MUL_WEIGHT` is rewritten
/// into an ordinary multiplication during IR cleanup.
fn weigh(value: Expr, weight: &Variable) -> Expr {
    let ty = value.ty().clone();
    Binary::new(Opcode::MulWeight, value, weight.into(), ty).into()
}

/// Dispatches to a runtime aggregation primitive keyed by operand
/// types, e.g. `agg_plus_i64N_i64N`.
fn agg_apply(name: &str, accumulator: Expr, value: Expr, result: &Type) -> Expr {
    let function = format!(
        "{name}_{}_{}",
        accumulator.ty().base_name_with_suffix(),
        value.ty().base_name_with_suffix(),
    );
    Apply::new(function, vec![accumulator, value], result.clone()).into()
}

/// Assembles the per-call implementations of an aggregate node into
/// one fold over the group's rows.
///
/// `result_tuple` is the declared output tuple whose first
/// `group_count` fields are the grouping keys.
pub fn create_fold(
    position: SourcePosition,
    calls: &[AggregateCall],
    result_tuple: &Type,
    group_count: usize,
    input_row_type: &Type,
) -> Result<Fold, CompileError> {
    let row = Variable::new("v", input_row_type.ref_type());
    let weight = Variable::new("w", Type::weight());

    let compilers = calls
        .iter()
        .enumerate()
        .map(|(index, call)| {
            let result_type = result_tuple.field(group_count + index).clone();
            AggregateCompiler::new(call, result_type, &row, position)
        })
        .collect::<Result<Vec<_>, _>>()?;

    let accumulator_type =
        Type::tuple(compilers.iter().map(AggregateCompiler::accumulator_type).collect());
    let accumulator = Variable::new("a", accumulator_type);

    let init = TupleExpr::new(compilers.iter().map(AggregateCompiler::zero).collect());

    let step_body = TupleExpr::new(
        compilers
            .iter()
            .enumerate()
            .map(|(index, compiler)| {
                compiler.increment(Expr::from(&accumulator).field(index), &weight)
            })
            .collect::<Result<Vec<_>, _>>()?,
    );
    let step = Closure::new(
        vec![
            accumulator.as_parameter(),
            row.as_parameter(),
            weight.as_parameter(),
        ],
        step_body.into(),
    );

    let finish_body = TupleExpr::new(
        compilers
            .iter()
            .enumerate()
            .map(|(index, compiler)| {
                let slot = Expr::from(&accumulator).field(index);
                let result_type = result_tuple.field(group_count + index).clone();
                compiler
                    .post_process(slot.clone())
                    .unwrap_or(slot)
                    .cast(&result_type)
            })
            .collect(),
    );
    let finish = Closure::new(vec![accumulator.as_parameter()], finish_body.into());

    let default_zero = TupleExpr::new(
        compilers
            .iter()
            .map(AggregateCompiler::empty_result)
            .collect(),
    );

    Ok(Fold::new(
        init.into(),
        step,
        finish,
        default_zero.into(),
    ))
}

#[cfg(test)]
mod tests {
    use super::create_fold;
    use crate::error::SourcePosition;
    use crate::frontend::relation::{AggregateCall, AggregateKind};
    use crate::frontend::sql_types::{SqlType, SqlTypeKind};
    use crate::ir::exprs::{Expr, Literal};
    use crate::ir::types::Type;

    fn call(kind: AggregateKind, arguments: Vec<usize>, nullable: bool) -> AggregateCall {
        AggregateCall {
            kind,
            distinct: false,
            arguments,
            result_type: SqlType::new(SqlTypeKind::BigInt, nullable),
        }
    }

    #[test]
    fn count_star_defaults_to_zero() {
        let input = Type::tuple(vec![Type::i32()]);
        let result = Type::tuple(vec![Type::i64()]);
        let fold = create_fold(
            SourcePosition::default(),
            &[call(AggregateKind::Count, vec![], false)],
            &result,
            0,
            &input,
        )
        .unwrap();

        assert_eq!(fold.default_zero_type(), &Type::tuple(vec![Type::i64()]));
        let Expr::Tuple(zero) = fold.default_zero() else {
            panic!("expected a tuple default zero");
        };
        assert_eq!(zero.exprs[0], Expr::from(Literal::i64(0)));
    }

    #[test]
    fn sum_defaults_to_null() {
        let input = Type::tuple(vec![Type::i64()]);
        let result = Type::tuple(vec![Type::i64().with_nullability(true)]);
        let fold = create_fold(
            SourcePosition::default(),
            &[call(AggregateKind::Sum, vec![0], true)],
            &result,
            0,
            &input,
        )
        .unwrap();

        let Expr::Tuple(zero) = fold.default_zero() else {
            panic!("expected a tuple default zero");
        };
        assert!(matches!(&zero.exprs[0], Expr::Literal(l) if l.is_null()));
    }

    #[test]
    fn avg_folds_a_sum_count_pair() {
        let input = Type::tuple(vec![Type::i64()]);
        let result = Type::tuple(vec![Type::i64().with_nullability(true)]);
        let fold = create_fold(
            SourcePosition::default(),
            &[call(AggregateKind::Avg, vec![0], true)],
            &result,
            0,
            &input,
        )
        .unwrap();

        // The accumulator slot is a (sum, count) raw tuple
        let Expr::Tuple(init) = fold.init() else {
            panic!("expected a tuple initializer");
        };
        assert!(init.exprs[0].ty().is_raw_tuple());
        assert_eq!(init.exprs[0].ty().size(), 2);
        // The finished output is the declared nullable result
        assert_eq!(
            fold.default_zero_type(),
            &Type::tuple(vec![Type::i64().with_nullability(true)]),
        );
    }

    #[test]
    fn distinct_aggregates_are_rejected() {
        let input = Type::tuple(vec![Type::i64()]);
        let result = Type::tuple(vec![Type::i64()]);
        let mut distinct = call(AggregateKind::Count, vec![0], false);
        distinct.distinct = true;
        let error = create_fold(
            SourcePosition::default(),
            &[distinct],
            &result,
            0,
            &input,
        );
        assert!(error.is_err());
    }
}
