//! Lowers the planner's scalar expressions into the typed scalar IR,
//! inserting casts eagerly to satisfy the promotion discipline.

use crate::error::{CompileError, SourcePosition};
use crate::frontend::relation::{CallKind, ScalarCall, ScalarExpr, SqlLiteral, SqlValue};
use crate::frontend::sql_types::convert_type;
use crate::ir::exprs::{
    Apply, ApplyMethod, Binary, Expr, If, IndexInto, Literal, LiteralValue, Opcode, Unary,
    Variable,
};
use crate::ir::types::{reduce_type, FloatWidth, Type, TypeKind};

/// Compiles scalar expressions in a row context.
///
/// `input_row` is a variable of reference-to-tuple type representing
/// the row being compiled; `constants` is a trailing pool indexed
/// after the row's fields (window constants are numbered this way by
/// the planner).
pub struct ExpressionCompiler<'a> {
    input_row: Option<&'a Variable>,
    constants: &'a [SqlLiteral],
    position: SourcePosition,
}

impl<'a> ExpressionCompiler<'a> {
    pub fn new(input_row: Option<&'a Variable>, position: SourcePosition) -> Self {
        Self::with_constants(input_row, &[], position)
    }

    pub fn with_constants(
        input_row: Option<&'a Variable>,
        constants: &'a [SqlLiteral],
        position: SourcePosition,
    ) -> Self {
        if let Some(row) = input_row {
            debug_assert!(row.ty.is_ref(), "row variables have reference type");
        }
        Self {
            input_row,
            constants,
            position,
        }
    }

    pub fn compile(&self, expr: &ScalarExpr) -> Result<Expr, CompileError> {
        tracing::trace!(?expr, "compiling scalar expression");
        match expr {
            ScalarExpr::InputRef { index, .. } => self.visit_input_ref(*index),
            ScalarExpr::Literal(literal) => self.visit_literal(literal),
            ScalarExpr::Call(call) => self.visit_call(call),
            ScalarExpr::CorrelatedField { field, .. } => Err(CompileError::unimplemented(
                format!("correlated access to {field} outside an unnest"),
                self.position,
            )),
        }
    }

    fn visit_input_ref(&self, index: usize) -> Result<Expr, CompileError> {
        let row = self.input_row.ok_or_else(|| {
            CompileError::translation("row referenced without a row context", self.position)
        })?;
        let arity = row.ty.deref().size();
        if index < arity {
            return Ok(Expr::from(row).field(index).clone_if_needed());
        }
        if index - arity < self.constants.len() {
            return self.visit_literal(&self.constants[index - arity]);
        }
        Err(CompileError::translation(
            format!("index {index} in row out of bounds"),
            self.position,
        ))
    }

    fn visit_literal(&self, literal: &SqlLiteral) -> Result<Expr, CompileError> {
        let ty = convert_type(&literal.ty);
        if literal.is_null() {
            return Ok(Expr::none(&ty));
        }

        let unsupported =
            || CompileError::unimplemented(format!("literal {literal:?}"), self.position);
        let value = match (ty.kind(), &literal.value) {
            (TypeKind::Int { width, .. }, SqlValue::Integer(value)) => match width.bits() {
                16 => LiteralValue::I16(i16::try_from(*value).map_err(|_| unsupported())?),
                32 => LiteralValue::I32(i32::try_from(*value).map_err(|_| unsupported())?),
                _ => LiteralValue::I64(*value),
            },
            (
                TypeKind::Float {
                    width: FloatWidth::W32,
                },
                SqlValue::Real(value),
            ) => LiteralValue::F32(*value),
            (
                TypeKind::Float {
                    width: FloatWidth::W64,
                },
                SqlValue::Double(value),
            ) => LiteralValue::F64(*value),
            (TypeKind::Decimal, SqlValue::Decimal(value)) => LiteralValue::Decimal(*value),
            (TypeKind::String, SqlValue::String(value)) => LiteralValue::String(value.clone()),
            (TypeKind::Bool, SqlValue::Bool(value)) => LiteralValue::Bool(*value),
            (TypeKind::Keyword, SqlValue::Keyword(value)) => {
                LiteralValue::Keyword(value.clone())
            }
            (TypeKind::MillisInterval, SqlValue::IntervalMillis(value))
            | (TypeKind::MillisInterval, SqlValue::Integer(value)) => {
                LiteralValue::MillisInterval(*value)
            }
            (TypeKind::Timestamp, SqlValue::Timestamp(value)) => {
                LiteralValue::Timestamp(*value)
            }
            (TypeKind::Date, SqlValue::Date(value)) => LiteralValue::Date(*value),
            (TypeKind::GeoPoint, SqlValue::GeoPoint { x, y }) => {
                LiteralValue::GeoPoint { x: *x, y: *y }
            }
            _ => return Err(unsupported()),
        };
        Ok(Literal::new(value, ty).into())
    }

    fn visit_call(&self, call: &ScalarCall) -> Result<Expr, CompileError> {
        let position = self.position;
        let ops = call
            .operands
            .iter()
            .map(|operand| self.compile(operand))
            .collect::<Result<Vec<_>, _>>()?;
        let any_null = ops.iter().any(|op| op.ty().may_be_null());
        let ty = convert_type(&call.ty);

        match &call.kind {
            CallKind::Times => make_binary_expression(position, &ty, Opcode::Mul, ops),
            CallKind::Divide => {
                // Division by zero yields NULL, so the result is
                // always nullable
                let ty = ty.with_nullability(true);
                make_binary_expression(position, &ty, Opcode::Div, ops)
            }
            CallKind::Mod => make_binary_expression(position, &ty, Opcode::Mod, ops),
            CallKind::Plus => make_binary_expressions(position, &ty, Opcode::Add, ops),
            CallKind::Minus => make_binary_expression(position, &ty, Opcode::Sub, ops),
            CallKind::LessThan => make_binary_expression(position, &ty, Opcode::Lt, ops),
            CallKind::GreaterThan => make_binary_expression(position, &ty, Opcode::Gt, ops),
            CallKind::LessThanOrEqual => {
                make_binary_expression(position, &ty, Opcode::Lte, ops)
            }
            CallKind::GreaterThanOrEqual => {
                make_binary_expression(position, &ty, Opcode::Gte, ops)
            }
            CallKind::Equals => make_binary_expression(position, &ty, Opcode::Eq, ops),
            CallKind::NotEquals => make_binary_expression(position, &ty, Opcode::Neq, ops),
            CallKind::IsDistinctFrom => {
                make_binary_expression(position, &ty, Opcode::IsDistinct, ops)
            }
            CallKind::IsNotDistinctFrom => {
                let distinct =
                    make_binary_expression(position, &ty, Opcode::IsDistinct, ops)?;
                make_unary_expression(position, &Type::bool(), Opcode::Not, vec![distinct])
            }
            CallKind::Or => make_binary_expressions(position, &ty, Opcode::Or, ops),
            CallKind::And => make_binary_expressions(position, &ty, Opcode::And, ops),
            CallKind::Not => make_unary_expression(position, &ty, Opcode::Not, ops),
            CallKind::IsTrue => make_unary_expression(position, &ty, Opcode::IsTrue, ops),
            CallKind::IsFalse => make_unary_expression(position, &ty, Opcode::IsFalse, ops),
            CallKind::IsNotTrue => {
                make_unary_expression(position, &ty, Opcode::IsNotTrue, ops)
            }
            CallKind::IsNotFalse => {
                make_unary_expression(position, &ty, Opcode::IsNotFalse, ops)
            }
            CallKind::PlusPrefix => {
                make_unary_expression(position, &ty, Opcode::UnaryPlus, ops)
            }
            CallKind::MinusPrefix => make_unary_expression(position, &ty, Opcode::Neg, ops),
            CallKind::BitAnd => make_binary_expressions(position, &ty, Opcode::BwAnd, ops),
            CallKind::BitOr => make_binary_expressions(position, &ty, Opcode::BwOr, ops),
            CallKind::BitXor => make_binary_expressions(position, &ty, Opcode::Xor, ops),
            CallKind::Cast | CallKind::Reinterpret => {
                Ok(one_operand(position, ops)?.cast(&ty))
            }

            kind @ (CallKind::IsNull | CallKind::IsNotNull) => {
                if !ty.same_type(&Type::bool()) {
                    return Err(CompileError::translation(
                        "expected expression to produce a boolean result",
                        position,
                    ));
                }
                let arg = one_operand(position, ops)?;
                if arg.ty().may_be_null() {
                    if *kind == CallKind::IsNull {
                        Ok(arg.is_null_expr())
                    } else {
                        Ok(Unary::new(Opcode::Not, arg.is_null_expr(), ty).into())
                    }
                } else {
                    // Constant-fold
                    Ok(Literal::bool(*kind != CallKind::IsNull).into())
                }
            }

            CallKind::Case => self.compile_case(ops),

            CallKind::StPoint => {
                let (left, right) = two_operands(position, ops)?;
                let function = format!(
                    "make_geopoint{}_d{}_d{}",
                    ty.nullable_suffix(),
                    left.ty().nullable_suffix(),
                    right.ty().nullable_suffix(),
                );
                Ok(Apply::new(function, vec![left, right], ty).into())
            }

            CallKind::Extract => {
                let (keyword, value) = two_operands(position, ops)?;
                let keyword = as_keyword(&keyword, position)?;
                let value_ty = value.ty();
                let function = format!(
                    "extract_{}_{}{}",
                    value_ty.short_name(),
                    keyword,
                    value_ty.nullable_suffix(),
                );
                Ok(Apply::new(function, vec![value], ty).into())
            }

            kind @ (CallKind::Floor | CallKind::Ceil) => {
                let name = if *kind == CallKind::Floor {
                    "floor"
                } else {
                    "ceil"
                };
                match ops.len() {
                    1 => {
                        let function = format!(
                            "{name}_{}{}",
                            ty.short_name(),
                            ty.nullable_suffix(),
                        );
                        Ok(Apply::new(function, ops, ty).into())
                    }
                    2 => {
                        let (value, keyword) = two_operands(position, ops)?;
                        let keyword = as_keyword(&keyword, position)?;
                        let function = format!(
                            "{name}_{}_{}{}",
                            ty.short_name(),
                            keyword,
                            ty.nullable_suffix(),
                        );
                        Ok(Apply::new(function, vec![value], ty).into())
                    }
                    _ => Err(CompileError::unimplemented(
                        format!("{name} with {} operands", ops.len()),
                        position,
                    )),
                }
            }

            CallKind::ArrayValueConstructor => {
                let element_ty = ty.vec_element().clone();
                let args = ops
                    .into_iter()
                    .map(|op| op.cast(&element_ty))
                    .collect::<Vec<_>>();
                Ok(Apply::new("vec!", args, ty).into())
            }

            CallKind::Item => {
                let (array, index) = two_operands(position, ops)?;
                Ok(IndexInto::new(array, index.cast(&Type::usize()), ty).into())
            }

            CallKind::Function(name) => {
                self.compile_function(name, ops, ty, any_null)
            }

            CallKind::Other(name) => match name.as_str() {
                "||" => make_binary_expression(position, &ty, Opcode::Concat, ops),
                other => Err(CompileError::unimplemented(
                    format!("operator {other}"),
                    position,
                )),
            },

            CallKind::Dot => {
                Err(CompileError::unimplemented("DOT expression", position))
            }
            // The upstream planner expands range searches before
            // handing the plan over
            CallKind::Search => {
                Err(CompileError::unimplemented("SEARCH expression", position))
            }
        }
    }

    fn compile_function(
        &self,
        name: &str,
        ops: Vec<Expr>,
        ty: Type,
        any_null: bool,
    ) -> Result<Expr, CompileError> {
        let position = self.position;
        match name {
            "truncate" | "round" => {
                if ops.is_empty() {
                    return Err(CompileError::unimplemented(name, position));
                }
                let mut ops = ops;
                let left = ops.remove(0);
                let right = if ops.is_empty() {
                    Literal::i32(0).into()
                } else {
                    ops.remove(0)
                };
                if !right.ty().is_integer() {
                    return Err(CompileError::unimplemented(
                        format!("{} expects a constant integer second argument", name.to_uppercase()),
                        position,
                    ));
                }
                let function = format!("{name}_{}", left.ty().base_name_with_suffix());
                Ok(Apply::new(function, vec![left, right], ty).into())
            }

            "numeric_inc" | "sign" | "log10" | "ln" | "abs" => {
                let arg = one_operand(position, ops)?;
                let function = format!("{name}_{}", arg.ty().base_name_with_suffix());
                Ok(Apply::new(function, vec![arg], ty).into())
            }

            "st_distance" => {
                let (left, right) = two_operands(position, ops)?;
                let function = format!(
                    "st_distance_{}_{}",
                    left.ty().nullable_suffix(),
                    right.ty().nullable_suffix(),
                );
                let result = Type::f64().with_nullability(any_null);
                Ok(Apply::new(function, vec![left, right], result).into())
            }

            "division" => make_binary_expression(position, &ty, Opcode::Div, ops),

            "cardinality" => {
                let arg = one_operand(position, ops)?;
                let len = ApplyMethod::new("len", arg, Vec::new(), Type::usize());
                Ok(Expr::from(len).cast(&ty))
            }

            "element" => {
                let ty = ty.with_nullability(true);
                let arg = one_operand(position, ops)?;
                let element_nullable = arg.ty().vec_element().may_be_null();
                let method = if element_nullable { "elementN" } else { "element" };
                Ok(Apply::new(method, vec![arg], ty).into())
            }

            "power" => {
                let (left, right) = two_operands(position, ops)?;
                let function = format!(
                    "power_{}_{}",
                    left.ty().base_name_with_suffix(),
                    right.ty().base_name_with_suffix(),
                );
                Ok(Apply::new(function, vec![left, right], ty).into())
            }

            other => Err(CompileError::unimplemented(
                format!("function {other}"),
                position,
            )),
        }
    }

    /// CASE in both shapes. A switched case
    /// (`CASE x WHEN x1 THEN v1 ... ELSE e END`) has an even number of
    /// operands and odd-numbered operands are the compared values; a
    /// condition case (`CASE WHEN p1 THEN v1 ... ELSE e END`) has an
    /// odd number and even-numbered operands are predicates, except
    /// for the trailing ELSE. Accumulates right to left so the first
    /// branch is tested first.
    fn compile_case(&self, ops: Vec<Expr>) -> Result<Expr, CompileError> {
        let position = self.position;
        let Some(mut result) = ops.last().cloned() else {
            return Err(CompileError::translation("CASE with no operands", position));
        };

        if ops.len() % 2 == 0 {
            let value = ops[0].clone();

            let mut final_ty = result.ty().clone();
            for i in (1..ops.len() - 1).step_by(2) {
                if ops[i + 1].ty().may_be_null() {
                    final_ty = final_ty.with_nullability(true);
                }
            }
            result = result.cast(&final_ty);

            for i in (1..ops.len() - 1).step_by(2).rev() {
                let alternative = ops[i + 1].clone().cast(&final_ty);
                let comparison = make_binary_expression(
                    position,
                    &Type::bool().with_nullability(
                        value.ty().may_be_null() || ops[i].ty().may_be_null(),
                    ),
                    Opcode::Eq,
                    vec![value.clone(), ops[i].clone()],
                )?;
                let comparison = wrap_bool_if_needed(comparison);
                result = If::new(comparison, alternative, result).into();
            }
        } else {
            let mut final_ty = result.ty().clone();
            for i in (0..ops.len() - 1).step_by(2) {
                if ops[i + 1].ty().may_be_null() {
                    final_ty = final_ty.with_nullability(true);
                }
            }
            result = result.cast(&final_ty);

            for i in (0..ops.len() - 1).step_by(2).rev() {
                let alternative = ops[i + 1].clone().cast(&final_ty);
                let condition = wrap_bool_if_needed(ops[i].clone());
                result = If::new(condition, alternative, result).into();
            }
        }
        Ok(result)
    }
}

/// Whether a binary operation's operands must be brought to a common
/// base type. Date-like operands bypass promotion; their arithmetic
/// goes to runtime functions keyed by operand type.
fn need_common_type(left: &Type, right: &Type) -> bool {
    !left.is_date_like() && !right.is_date_like()
}

/// Builds a typed binary operation: reduces the operands to a common
/// base, casts both sides, then casts the result to the declared
/// type.
pub fn make_binary_expression(
    position: SourcePosition,
    ty: &Type,
    opcode: Opcode,
    operands: Vec<Expr>,
) -> Result<Expr, CompileError> {
    let (left, right) = two_operands(position, operands)?;
    let left_ty = left.ty().clone();
    let right_ty = right.ty().clone();

    let (left, right, result_ty) = if need_common_type(&left_ty, &right_ty) {
        let common = reduce_type(&left_ty, &right_ty)?;
        if common.is_null() {
            // Both operands are NULL, so the result always is
            return Ok(Expr::none(ty));
        }
        let left = left.cast(&common.with_nullability(left_ty.may_be_null()));
        let right = right.cast(&common.with_nullability(right_ty.may_be_null()));
        let result_ty = result_type(
            opcode,
            &common,
            left_ty.may_be_null() || right_ty.may_be_null(),
        );
        (left, right, result_ty)
    } else {
        (left, right, ty.clone())
    };

    let call: Expr = Binary::new(opcode, left, right, result_ty).into();
    Ok(call.cast(ty))
}

/// Left-folds an N-ary operation into nested binary applications.
pub fn make_binary_expressions(
    position: SourcePosition,
    ty: &Type,
    opcode: Opcode,
    operands: Vec<Expr>,
) -> Result<Expr, CompileError> {
    if operands.len() < 2 {
        return Err(CompileError::unimplemented(
            format!("{opcode} with {} operands", operands.len()),
            position,
        ));
    }
    let mut operands = operands;
    let mut accumulator = operands.remove(0);
    for operand in operands {
        accumulator =
            make_binary_expression(position, ty, opcode, vec![accumulator, operand])?;
    }
    Ok(accumulator.cast(ty))
}

pub fn make_unary_expression(
    position: SourcePosition,
    ty: &Type,
    opcode: Opcode,
    operands: Vec<Expr>,
) -> Result<Expr, CompileError> {
    let operand = one_operand(position, operands)?;
    let mut result_ty = operand.ty().clone();
    if opcode.is_predicate() {
        // The IS ... predicates never produce NULL
        result_ty = result_ty.with_nullability(false);
    }
    let call: Expr = Unary::new(opcode, operand, result_ty).into();
    Ok(call.cast(ty))
}

/// Wraps a nullable boolean used as a condition; the wrapper treats
/// NULL as FALSE.
pub fn wrap_bool_if_needed(expr: Expr) -> Expr {
    let ty = expr.ty().clone();
    if ty.may_be_null() {
        Unary::new(Opcode::WrapBool, expr, ty.with_nullability(false)).into()
    } else {
        expr
    }
}

/// The result type of a binary operation over the common base type.
fn result_type(opcode: Opcode, common: &Type, operand_nullable: bool) -> Type {
    match opcode {
        Opcode::Lt | Opcode::Gt | Opcode::Lte | Opcode::Gte | Opcode::Eq | Opcode::Neq => {
            Type::bool().with_nullability(operand_nullable)
        }
        Opcode::IsDistinct => Type::bool(),
        Opcode::Div => common.with_nullability(true),
        _ => common.with_nullability(operand_nullable),
    }
}

fn one_operand(
    position: SourcePosition,
    operands: Vec<Expr>,
) -> Result<Expr, CompileError> {
    let mut operands = operands;
    if operands.len() != 1 {
        return Err(CompileError::translation(
            format!("expected 1 operand, got {}", operands.len()),
            position,
        ));
    }
    Ok(operands.remove(0))
}

fn two_operands(
    position: SourcePosition,
    operands: Vec<Expr>,
) -> Result<(Expr, Expr), CompileError> {
    let count = operands.len();
    let mut operands = operands.into_iter();
    match (operands.next(), operands.next(), operands.next()) {
        (Some(left), Some(right), None) => Ok((left, right)),
        _ => Err(CompileError::translation(
            format!("expected 2 operands, got {count}"),
            position,
        )),
    }
}

fn as_keyword(expr: &Expr, position: SourcePosition) -> Result<String, CompileError> {
    if let Expr::Literal(literal) = expr {
        if let Some(keyword) = literal.as_keyword() {
            return Ok(keyword.to_owned());
        }
    }
    Err(CompileError::translation(
        "expected a keyword literal",
        position,
    ))
}

#[cfg(test)]
mod tests {
    use super::{make_binary_expression, wrap_bool_if_needed, ExpressionCompiler};
    use crate::error::SourcePosition;
    use crate::frontend::relation::{CallKind, ScalarExpr, SqlLiteral, SqlValue};
    use crate::frontend::sql_types::{SqlType, SqlTypeKind};
    use crate::ir::exprs::{Expr, Literal, Opcode, Variable};
    use crate::ir::types::Type;

    fn pos() -> SourcePosition {
        SourcePosition::default()
    }

    fn int_ty(nullable: bool) -> SqlType {
        SqlType::new(SqlTypeKind::Integer, nullable)
    }

    fn row_var() -> Variable {
        Variable::new(
            "t",
            Type::tuple(vec![Type::i32(), Type::i64().with_nullability(true)]).ref_type(),
        )
    }

    #[test]
    fn operands_are_cast_to_the_common_base() {
        let row = row_var();
        let compiler = ExpressionCompiler::new(Some(&row), pos());
        // t.0 + t.1 where t.0: i32, t.1: i64?
        let sum = compiler
            .compile(&ScalarExpr::call(
                CallKind::Plus,
                vec![
                    ScalarExpr::input(0, int_ty(false)),
                    ScalarExpr::input(1, SqlType::nullable(SqlTypeKind::BigInt)),
                ],
                SqlType::nullable(SqlTypeKind::BigInt),
            ))
            .unwrap();

        // The narrow side is widened, the result is nullable i64
        let Expr::Binary(binary) = sum else {
            panic!("expected a binary node, got {sum:?}");
        };
        assert_eq!(binary.op, Opcode::Add);
        assert_eq!(binary.left.ty(), &Type::i64());
        assert!(matches!(*binary.left, Expr::Cast(_)));
        assert_eq!(binary.ty(), &Type::i64().with_nullability(true));
    }

    #[test]
    fn comparisons_on_same_base_skip_casts() {
        let left = Expr::from(Literal::i32(1));
        let right = Expr::from(Literal::i32(2));
        let cmp = make_binary_expression(
            pos(),
            &Type::bool(),
            Opcode::Lt,
            vec![left.clone(), right.clone()],
        )
        .unwrap();
        let Expr::Binary(binary) = cmp else {
            panic!("expected a binary node");
        };
        assert_eq!(*binary.left, left);
        assert_eq!(*binary.right, right);
        assert_eq!(binary.ty(), &Type::bool());
    }

    #[test]
    fn division_result_is_nullable() {
        let row = row_var();
        let compiler = ExpressionCompiler::new(Some(&row), pos());
        let div = compiler
            .compile(&ScalarExpr::call(
                CallKind::Divide,
                vec![
                    ScalarExpr::input(0, int_ty(false)),
                    ScalarExpr::input(0, int_ty(false)),
                ],
                int_ty(false),
            ))
            .unwrap();
        assert!(div.ty().may_be_null());
    }

    #[test]
    fn is_null_constant_folds() {
        let row = row_var();
        let compiler = ExpressionCompiler::new(Some(&row), pos());
        let folded = compiler
            .compile(&ScalarExpr::call(
                CallKind::IsNull,
                vec![ScalarExpr::input(0, int_ty(false))],
                SqlType::non_null(SqlTypeKind::Boolean),
            ))
            .unwrap();
        assert_eq!(folded, Expr::from(Literal::bool(false)));

        let live = compiler
            .compile(&ScalarExpr::call(
                CallKind::IsNotNull,
                vec![ScalarExpr::input(1, SqlType::nullable(SqlTypeKind::BigInt))],
                SqlType::non_null(SqlTypeKind::Boolean),
            ))
            .unwrap();
        assert!(matches!(live, Expr::Unary(_)));
    }

    #[test]
    fn null_literals_carry_the_declared_type() {
        let compiler = ExpressionCompiler::new(None, pos());
        let none = compiler
            .compile(&ScalarExpr::Literal(SqlLiteral::new(
                SqlValue::Null,
                int_ty(true),
            )))
            .unwrap();
        assert_eq!(none.ty(), &Type::i32().with_nullability(true));
    }

    #[test]
    fn wrap_bool_only_wraps_nullable() {
        let plain = Expr::from(Literal::bool(true));
        assert_eq!(wrap_bool_if_needed(plain.clone()), plain);

        let nullable = Expr::none(&Type::bool());
        let wrapped = wrap_bool_if_needed(nullable);
        assert!(matches!(wrapped, Expr::Unary(_)));
        assert!(!wrapped.ty().may_be_null());
    }

    #[test]
    fn case_tests_the_first_branch_outermost() {
        let row = row_var();
        let compiler = ExpressionCompiler::new(Some(&row), pos());
        let literal = |value: i64| {
            ScalarExpr::Literal(SqlLiteral::new(SqlValue::Integer(value), int_ty(false)))
        };
        // CASE t.0 WHEN 1 THEN 10 WHEN 2 THEN 20 ELSE 0 END
        let case = compiler
            .compile(&ScalarExpr::call(
                CallKind::Case,
                vec![
                    ScalarExpr::input(0, int_ty(false)),
                    literal(1),
                    literal(10),
                    literal(2),
                    literal(20),
                    literal(0),
                ],
                int_ty(false),
            ))
            .unwrap();

        let Expr::If(outer) = case else {
            panic!("expected an if expression");
        };
        // The outermost comparison is against the first WHEN value
        let Expr::Binary(comparison) = *outer.condition else {
            panic!("expected a comparison condition");
        };
        assert_eq!(*comparison.right, Expr::from(Literal::i32(1)));
        assert!(matches!(*outer.if_false, Expr::If(_)));
    }

    #[test]
    fn extract_dispatches_on_type_and_unit() {
        let row = Variable::new("t", Type::tuple(vec![Type::i64()]).ref_type());
        let compiler = ExpressionCompiler::new(Some(&row), pos());
        let extract = compiler
            .compile(&ScalarExpr::call(
                CallKind::Extract,
                vec![
                    ScalarExpr::Literal(SqlLiteral::new(
                        SqlValue::Keyword("YEAR".to_owned()),
                        SqlType::non_null(SqlTypeKind::Symbol),
                    )),
                    ScalarExpr::input(0, SqlType::non_null(SqlTypeKind::BigInt)),
                ],
                SqlType::non_null(SqlTypeKind::BigInt),
            ))
            .unwrap();
        let Expr::Apply(apply) = extract else {
            panic!("expected a function application");
        };
        assert_eq!(apply.function, "extract_i64_YEAR");
    }
}
