//! Replaces `MUL_WEIGHT` with a cast followed by a multiplication.

use crate::ir::exprs::{Binary, Expr, Opcode};
use crate::ir::optimize::rewrite_expr;

/// Rewrites every `MUL_WEIGHT(v, w)` into `MUL(v, cast(w, type(v)))`.
///
/// `MUL_WEIGHT` is the only opcode mixing `Weight` with another type;
/// eliminating it shrinks the primitive set a back-end must provide
/// without changing evaluation.
pub fn eliminate_mul_weight(expr: &Expr) -> Expr {
    rewrite_expr(expr, &mut |expr| match expr {
        Expr::Binary(binary) if binary.op == Opcode::MulWeight => {
            let ty = binary.ty().clone();
            let left = *binary.left;
            let left_ty = left.ty().clone();
            Binary::new(Opcode::Mul, left, binary.right.cast(&left_ty), ty).into()
        }
        other => other,
    })
}

#[cfg(test)]
mod tests {
    use super::eliminate_mul_weight;
    use crate::ir::exprs::{Binary, Expr, Literal, Opcode, Variable};
    use crate::ir::types::Type;

    #[test]
    fn mul_weight_becomes_mul_of_cast() {
        let value = Expr::from(Literal::i64(10));
        let weight = Expr::from(Variable::new("w", Type::weight()));
        let expr: Expr =
            Binary::new(Opcode::MulWeight, value.clone(), weight.clone(), Type::i64()).into();

        let rewritten = eliminate_mul_weight(&expr);
        let expected: Expr =
            Binary::new(Opcode::Mul, value, weight.cast(&Type::i64()), Type::i64()).into();
        assert_eq!(rewritten, expected);
    }

    #[test]
    fn rewrite_reaches_nested_expressions() {
        let weight = Expr::from(Variable::new("w", Type::weight()));
        let inner: Expr = Binary::new(
            Opcode::MulWeight,
            Literal::i32(1).into(),
            weight,
            Type::i32(),
        )
        .into();
        let outer: Expr = Binary::new(
            Opcode::Add,
            Expr::from(Variable::new("a", Type::i32())),
            inner,
            Type::i32(),
        )
        .into();

        let rewritten = eliminate_mul_weight(&outer);
        let Expr::Binary(add) = rewritten else {
            panic!("expected a binary expression");
        };
        let Expr::Binary(mul) = *add.right else {
            panic!("expected the weighted term to remain binary");
        };
        assert_eq!(mul.op, Opcode::Mul);
        assert!(matches!(*mul.right, Expr::Cast(_)));
    }

    #[test]
    fn other_opcodes_are_untouched() {
        let expr: Expr = Binary::new(
            Opcode::Mul,
            Literal::i32(2).into(),
            Literal::i32(3).into(),
            Type::i32(),
        )
        .into();
        assert_eq!(eliminate_mul_weight(&expr), expr);
    }
}
