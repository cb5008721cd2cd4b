//! The fold descriptor consumed by aggregation operators.

use crate::ir::exprs::{Closure, Expr};
use crate::ir::types::Type;
use serde::{Deserialize, Serialize};

/// Describes a linear fold over the rows of one group: an initial
/// accumulator, a weighted step, and a finishing projection.
///
/// `default_zero` is the finished result for an empty group; the
/// compiler uses it to patch aggregates without grouping, whose
/// operator never invokes the fold on empty input.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Fold {
    /// Accumulator initializer; a tuple of per-call zeros
    init: Expr,
    /// `|accumulator, row, weight| -> accumulator`
    step: Expr,
    /// `|accumulator| -> output row`
    finish: Expr,
    /// The finished output for an empty group
    default_zero: Expr,
}

impl Fold {
    pub fn new(init: Expr, step: Closure, finish: Closure, default_zero: Expr) -> Self {
        Self {
            init,
            step: step.into(),
            finish: finish.into(),
            default_zero,
        }
    }

    pub const fn init(&self) -> &Expr {
        &self.init
    }

    pub const fn step(&self) -> &Expr {
        &self.step
    }

    pub const fn finish(&self) -> &Expr {
        &self.finish
    }

    pub const fn default_zero(&self) -> &Expr {
        &self.default_zero
    }

    /// The type of the finished output row.
    pub fn default_zero_type(&self) -> &Type {
        self.default_zero.ty()
    }

    pub(crate) fn exprs_mut<'a>(&'a mut self, exprs: &mut Vec<&'a mut Expr>) {
        exprs.extend([
            &mut self.init,
            &mut self.step,
            &mut self.finish,
            &mut self.default_zero,
        ]);
    }
}
