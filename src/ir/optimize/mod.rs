//! IR-cleanup passes applied to the expressions of a sealed circuit.

mod mul_weight;

pub use mul_weight::eliminate_mul_weight;

use crate::ir::circuit::Circuit;
use crate::ir::exprs::{
    Apply, ApplyMethod, Binary, Borrow, Cast, CloneExpr, Closure, Deref, Expr, FieldAccess, If,
    IndexInto, RawTupleExpr, StructExpr, TupleExpr, Unary,
};
use crate::ir::nodes::CircuitNode;

/// An expression rewrite applied bottom-up.
pub type ExprPass = fn(&Expr) -> Expr;

/// Applies each pass, in order, to every expression embedded in the
/// circuit's operators.
pub fn inner_passes(circuit: &mut Circuit, passes: &[ExprPass]) {
    for pass in passes {
        tracing::debug!("running IR cleanup pass");
        for node in circuit.nodes_mut().values_mut() {
            let mut exprs = Vec::new();
            node.exprs_mut(&mut exprs);
            for expr in exprs {
                *expr = pass(expr);
            }
        }
    }
}

/// The standard cleanup sequence run before a circuit is handed to a
/// back-end.
pub fn cleanup(circuit: &mut Circuit) {
    inner_passes(circuit, &[eliminate_mul_weight]);
}

/// Rebuilds `expr` bottom-up, applying `rewrite` to every node after
/// its children have been rewritten.
pub(crate) fn rewrite_expr(expr: &Expr, rewrite: &mut dyn FnMut(Expr) -> Expr) -> Expr {
    let rebuilt = match expr {
        Expr::Literal(_)
        | Expr::Variable(_)
        | Expr::Comparator(_)
        | Expr::Path(_)
        | Expr::Sort(_) => expr.clone(),

        Expr::Field(field) => {
            FieldAccess::new(rewrite_expr(&field.base, rewrite), field.index).into()
        }
        Expr::Deref(deref) => Deref::new(rewrite_expr(&deref.expr, rewrite)).into(),
        Expr::Borrow(borrow) => Borrow::new(rewrite_expr(&borrow.expr, rewrite)).into(),
        Expr::Clone(clone) => CloneExpr::new(rewrite_expr(&clone.expr, rewrite)).into(),
        Expr::Cast(cast) => {
            Cast::new(rewrite_expr(&cast.expr, rewrite), cast.ty.clone()).into()
        }
        Expr::Binary(binary) => Binary::new(
            binary.op,
            rewrite_expr(&binary.left, rewrite),
            rewrite_expr(&binary.right, rewrite),
            binary.ty().clone(),
        )
        .into(),
        Expr::Unary(unary) => Unary::new(
            unary.op,
            rewrite_expr(&unary.operand, rewrite),
            unary.ty().clone(),
        )
        .into(),
        Expr::If(if_expr) => If::new(
            rewrite_expr(&if_expr.condition, rewrite),
            rewrite_expr(&if_expr.if_true, rewrite),
            rewrite_expr(&if_expr.if_false, rewrite),
        )
        .into(),
        Expr::Apply(apply) => Apply::new(
            apply.function.clone(),
            apply
                .args
                .iter()
                .map(|arg| rewrite_expr(arg, rewrite))
                .collect(),
            apply.ty.clone(),
        )
        .into(),
        Expr::ApplyMethod(apply) => ApplyMethod::new(
            apply.method.clone(),
            rewrite_expr(&apply.receiver, rewrite),
            apply
                .args
                .iter()
                .map(|arg| rewrite_expr(arg, rewrite))
                .collect(),
            apply.ty.clone(),
        )
        .into(),
        Expr::Closure(closure) => Closure::new(
            closure.params.clone(),
            rewrite_expr(&closure.body, rewrite),
        )
        .into(),
        Expr::IndexInto(index) => IndexInto::new(
            rewrite_expr(&index.array, rewrite),
            rewrite_expr(&index.index, rewrite),
            index.ty.clone(),
        )
        .into(),
        Expr::RawTuple(tuple) => RawTupleExpr::new(
            tuple
                .exprs
                .iter()
                .map(|e| rewrite_expr(e, rewrite))
                .collect(),
        )
        .into(),
        Expr::Tuple(tuple) => TupleExpr::new(
            tuple
                .exprs
                .iter()
                .map(|e| rewrite_expr(e, rewrite))
                .collect(),
        )
        .into(),
        Expr::Struct(struct_expr) => StructExpr::new(
            struct_expr.path.clone(),
            struct_expr
                .fields
                .iter()
                .map(|e| rewrite_expr(e, rewrite))
                .collect(),
            struct_expr.ty.clone(),
        )
        .into(),
    };

    rewrite(rebuilt)
}
