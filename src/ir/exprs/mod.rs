//! The scalar expression tree embedded in circuit operators.
//!
//! Expressions are tagged variants, fully typed at construction; the
//! compiler inserts casts eagerly so that no node is ever re-typed
//! after it is built. Trees are unshared (`Box`-owned), which keeps
//! rewrites plain recursion.

mod binary;
mod literal;

pub use binary::{Binary, Opcode, Unary};
pub use literal::{Literal, LiteralValue, ZSetLiteral};

use crate::ir::types::Type;
use derive_more::{From, IsVariant};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, From, IsVariant, Deserialize, Serialize)]
pub enum Expr {
    Literal(Literal),
    Variable(Variable),
    Field(FieldAccess),
    Deref(Deref),
    Borrow(Borrow),
    Clone(CloneExpr),
    Cast(Cast),
    Binary(Binary),
    Unary(Unary),
    If(If),
    Apply(Apply),
    ApplyMethod(ApplyMethod),
    Closure(Closure),
    IndexInto(IndexInto),
    RawTuple(RawTupleExpr),
    Tuple(TupleExpr),
    Struct(StructExpr),
    Sort(SortExpr),
    Comparator(ComparatorExpr),
    Path(PathExpr),
}

impl Expr {
    /// The type of this expression. Total: every node is typed.
    pub fn ty(&self) -> &Type {
        match self {
            Self::Literal(literal) => literal.ty(),
            Self::Variable(variable) => &variable.ty,
            Self::Field(field) => &field.ty,
            Self::Deref(deref) => &deref.ty,
            Self::Borrow(borrow) => &borrow.ty,
            Self::Clone(clone) => clone.expr.ty(),
            Self::Cast(cast) => &cast.ty,
            Self::Binary(binary) => binary.ty(),
            Self::Unary(unary) => unary.ty(),
            Self::If(if_expr) => &if_expr.ty,
            Self::Apply(apply) => &apply.ty,
            Self::ApplyMethod(apply) => &apply.ty,
            Self::Closure(closure) => closure.body.ty(),
            Self::IndexInto(index) => &index.ty,
            Self::RawTuple(tuple) => &tuple.ty,
            Self::Tuple(tuple) => &tuple.ty,
            Self::Struct(struct_expr) => &struct_expr.ty,
            Self::Sort(sort) => &sort.ty,
            Self::Comparator(comparator) => &comparator.ty,
            Self::Path(path) => &path.ty,
        }
    }

    /// A typed `NULL` literal.
    pub fn none(ty: &Type) -> Self {
        Literal::none(ty).into()
    }

    /// Casts this expression to `target`; the identity when the types
    /// already agree.
    #[must_use]
    pub fn cast(self, target: &Type) -> Self {
        if self.ty().same_type(target) {
            self
        } else {
            Cast::new(self, target.clone()).into()
        }
    }

    /// Accesses tuple field `index`, dereferencing a reference base.
    #[must_use]
    pub fn field(self, index: usize) -> Self {
        FieldAccess::new(self, index).into()
    }

    #[must_use]
    pub fn deref(self) -> Self {
        Deref::new(self).into()
    }

    #[must_use]
    pub fn borrow(self) -> Self {
        Borrow::new(self).into()
    }

    /// Always wraps in a clone.
    #[must_use]
    pub fn clone_expr(self) -> Self {
        CloneExpr::new(self).into()
    }

    /// Wraps in a clone only for types whose clone is non-trivial.
    #[must_use]
    pub fn clone_if_needed(self) -> Self {
        if self.ty().needs_nontrivial_clone() {
            self.clone_expr()
        } else {
            self
        }
    }

    /// `IS NULL` on this expression. Constant-folds to `false` when
    /// the operand cannot be null.
    #[must_use]
    pub fn is_null_expr(self) -> Self {
        if !self.ty().may_be_null() {
            Literal::bool(false).into()
        } else {
            Unary::new(Opcode::IsNull, self, Type::bool()).into()
        }
    }

    /// Boolean negation at the operand's type.
    #[must_use]
    pub fn not(self) -> Self {
        let ty = self.ty().clone();
        Unary::new(Opcode::Not, self, ty).into()
    }

    /// Wraps this expression into a closure over `params`.
    #[must_use]
    pub fn closure(self, params: Vec<Parameter>) -> Self {
        Closure::new(params, self).into()
    }
}

/// A typed closure parameter.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Parameter {
    pub name: String,
    pub ty: Type,
}

impl Parameter {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A reference to a variable (a closure parameter or a binding).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Variable {
    pub name: String,
    pub ty: Type,
}

impl Variable {
    pub fn new(name: impl Into<String>, ty: Type) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// This variable as a by-value closure parameter.
    pub fn as_parameter(&self) -> Parameter {
        Parameter::new(self.name.clone(), self.ty.clone())
    }

    /// This variable as a by-reference closure parameter.
    pub fn as_ref_parameter(&self) -> Parameter {
        Parameter::new(self.name.clone(), self.ty.ref_type())
    }
}

impl From<&Variable> for Expr {
    fn from(variable: &Variable) -> Self {
        Expr::Variable(variable.clone())
    }
}

/// Tuple field access; the base may be a reference to a tuple.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldAccess {
    pub base: Box<Expr>,
    pub index: usize,
    ty: Type,
}

impl FieldAccess {
    pub fn new(base: Expr, index: usize) -> Self {
        let base_ty = base.ty();
        let tuple = if base_ty.is_ref() {
            base_ty.deref()
        } else {
            base_ty
        };
        let ty = tuple.field(index).clone();
        Self {
            base: Box::new(base),
            index,
            ty,
        }
    }

    pub const fn ty(&self) -> &Type {
        &self.ty
    }
}

/// Dereferences a reference-typed expression.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Deref {
    pub expr: Box<Expr>,
    ty: Type,
}

impl Deref {
    pub fn new(expr: Expr) -> Self {
        let ty = expr.ty().deref().clone();
        Self {
            expr: Box::new(expr),
            ty,
        }
    }
}

/// Takes a reference to an expression.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Borrow {
    pub expr: Box<Expr>,
    ty: Type,
}

impl Borrow {
    pub fn new(expr: Expr) -> Self {
        let ty = expr.ty().ref_type();
        Self {
            expr: Box::new(expr),
            ty,
        }
    }
}

/// An explicit clone of a value with non-trivial clone semantics.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CloneExpr {
    pub expr: Box<Expr>,
}

impl CloneExpr {
    pub fn new(expr: Expr) -> Self {
        Self {
            expr: Box::new(expr),
        }
    }
}

/// Changes the type of a value. Inserted eagerly by the compiler.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Cast {
    pub expr: Box<Expr>,
    pub ty: Type,
}

impl Cast {
    pub fn new(expr: Expr, ty: Type) -> Self {
        Self {
            expr: Box::new(expr),
            ty,
        }
    }
}

/// `if cond { then } else { otherwise }`; both branches share a type.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct If {
    pub condition: Box<Expr>,
    pub if_true: Box<Expr>,
    pub if_false: Box<Expr>,
    ty: Type,
}

impl If {
    pub fn new(condition: Expr, if_true: Expr, if_false: Expr) -> Self {
        debug_assert!(if_true.ty().same_type(if_false.ty()));
        let ty = if_true.ty().clone();
        Self {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
            ty,
        }
    }
}

/// A call to a named runtime function.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Apply {
    pub function: String,
    pub args: Vec<Expr>,
    pub ty: Type,
}

impl Apply {
    pub fn new(function: impl Into<String>, args: Vec<Expr>, ty: Type) -> Self {
        Self {
            function: function.into(),
            args,
            ty,
        }
    }
}

/// A method call on a receiver, e.g. `array.len()`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApplyMethod {
    pub method: String,
    pub receiver: Box<Expr>,
    pub args: Vec<Expr>,
    pub ty: Type,
}

impl ApplyMethod {
    pub fn new(method: impl Into<String>, receiver: Expr, args: Vec<Expr>, ty: Type) -> Self {
        Self {
            method: method.into(),
            receiver: Box::new(receiver),
            args,
            ty,
        }
    }
}

/// A closure with typed parameters. Its type is the type of its body.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Closure {
    pub params: Vec<Parameter>,
    pub body: Box<Expr>,
}

impl Closure {
    pub fn new(params: Vec<Parameter>, body: Expr) -> Self {
        Self {
            params,
            body: Box::new(body),
        }
    }

    pub fn result_type(&self) -> &Type {
        self.body.ty()
    }
}

/// Indexes into an array value.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct IndexInto {
    pub array: Box<Expr>,
    pub index: Box<Expr>,
    pub ty: Type,
}

impl IndexInto {
    pub fn new(array: Expr, index: Expr, ty: Type) -> Self {
        Self {
            array: Box::new(array),
            index: Box::new(index),
            ty,
        }
    }
}

/// A raw (key/value style) tuple constructor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct RawTupleExpr {
    pub exprs: Vec<Expr>,
    ty: Type,
}

impl RawTupleExpr {
    pub fn new(exprs: Vec<Expr>) -> Self {
        let ty = Type::raw_tuple(exprs.iter().map(|e| e.ty().clone()).collect());
        Self { exprs, ty }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub const fn ty(&self) -> &Type {
        &self.ty
    }
}

/// A row tuple constructor.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TupleExpr {
    pub exprs: Vec<Expr>,
    ty: Type,
}

impl TupleExpr {
    pub fn new(exprs: Vec<Expr>) -> Self {
        let ty = Type::tuple(exprs.iter().map(|e| e.ty().clone()).collect());
        Self { exprs, ty }
    }

    pub const fn ty(&self) -> &Type {
        &self.ty
    }

    pub fn size(&self) -> usize {
        self.exprs.len()
    }

    /// Expands a tuple-typed expression into a tuple of its fields.
    pub fn flatten(expr: Expr) -> Self {
        Self::flatten_many(vec![expr])
    }

    /// Expands several tuple-typed expressions into one flat tuple.
    pub fn flatten_many(exprs: Vec<Expr>) -> Self {
        let mut fields = Vec::new();
        for expr in exprs {
            let ty = expr.ty();
            let tuple = if ty.is_ref() { ty.deref() } else { ty };
            let arity = tuple.size();
            for index in 0..arity {
                fields.push(expr.clone().field(index).clone_if_needed());
            }
        }
        Self::new(fields)
    }

    /// A tuple of this tuple's fields `start..end`.
    pub fn slice(&self, start: usize, end: usize) -> Self {
        Self::new(self.exprs[start..end].to_vec())
    }

    /// Casts each field to the corresponding field of `target`.
    pub fn pointwise_cast(&self, target: &Type) -> Self {
        debug_assert_eq!(self.exprs.len(), target.size());
        Self::new(
            self.exprs
                .iter()
                .zip(target.tuple_fields())
                .map(|(expr, field_ty)| expr.clone().cast(field_ty))
                .collect(),
        )
    }
}

/// A path to a runtime item, e.g. `RelOffset::Before`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PathExpr {
    pub segments: Vec<PathSegment>,
    ty: Type,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PathSegment {
    pub name: String,
    pub generics: Vec<Type>,
}

impl PathSegment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            generics: Vec::new(),
        }
    }

    pub fn with_generics(name: impl Into<String>, generics: Vec<Type>) -> Self {
        Self {
            name: name.into(),
            generics,
        }
    }
}

impl PathExpr {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self {
            segments,
            ty: Type::any(),
        }
    }

    pub fn simple<const N: usize>(names: [&str; N]) -> Self {
        Self::new(names.into_iter().map(PathSegment::new).collect())
    }
}

/// A runtime struct constructor applied through a path.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct StructExpr {
    pub path: PathExpr,
    pub fields: Vec<Expr>,
    pub ty: Type,
}

impl StructExpr {
    pub fn new(path: PathExpr, fields: Vec<Expr>, ty: Type) -> Self {
        Self { path, fields, ty }
    }
}

/// Sorts a vector of rows with a generated comparator; used as the
/// map function of the operator that implements ORDER BY.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SortExpr {
    pub element_type: Type,
    pub comparator: Box<ComparatorExpr>,
    /// Truncates the sorted vector, implementing LIMIT
    pub limit: Option<usize>,
    ty: Type,
}

impl SortExpr {
    pub fn new(element_type: Type, comparator: ComparatorExpr, limit: Option<usize>) -> Self {
        Self {
            element_type,
            comparator: Box::new(comparator),
            limit,
            ty: Type::any(),
        }
    }
}

/// A lexicographic row comparator: compare `field` (ascending or
/// descending), then fall back to `rest`.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ComparatorExpr {
    pub element_type: Type,
    /// `None` compares nothing: all rows are considered equal
    pub key: Option<ComparatorKey>,
    ty: Type,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ComparatorKey {
    pub field: usize,
    pub ascending: bool,
    pub rest: Box<ComparatorExpr>,
}

impl ComparatorExpr {
    /// The comparator that compares nothing.
    pub fn empty(element_type: Type) -> Self {
        Self {
            element_type,
            key: None,
            ty: Type::any(),
        }
    }

    /// Compare `field` first, then fall back to `self`.
    #[must_use]
    pub fn then_field(self, field: usize, ascending: bool) -> Self {
        let element_type = self.element_type.clone();
        Self {
            element_type,
            key: Some(ComparatorKey {
                field,
                ascending,
                rest: Box::new(self),
            }),
            ty: Type::any(),
        }
    }

    /// The comparison keys in application order (primary key first).
    pub fn keys(&self) -> Vec<(usize, bool)> {
        let mut keys = Vec::new();
        let mut current = self;
        while let Some(key) = &current.key {
            keys.push((key.field, key.ascending));
            current = &key.rest;
        }
        keys.reverse();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::{ComparatorExpr, Expr, Literal, TupleExpr, Variable};
    use crate::ir::types::Type;

    fn row() -> Type {
        Type::tuple(vec![Type::i32(), Type::string().with_nullability(true)])
    }

    #[test]
    fn field_access_derefs_references() {
        let var = Variable::new("t", row().ref_type());
        let field = Expr::from(&var).field(1);
        assert_eq!(field.ty(), &Type::string().with_nullability(true));
    }

    #[test]
    fn cast_is_identity_on_same_type() {
        let literal = Expr::from(Literal::i32(3));
        assert!(matches!(literal.clone().cast(&Type::i32()), Expr::Literal(_)));
        assert!(matches!(literal.cast(&Type::i64()), Expr::Cast(_)));
    }

    #[test]
    fn is_null_folds_on_non_nullable() {
        let literal = Expr::from(Literal::i32(3)).is_null_expr();
        assert_eq!(literal, Expr::from(Literal::bool(false)));

        let nullable = Expr::none(&Type::i32().with_nullability(true)).is_null_expr();
        assert!(matches!(nullable, Expr::Unary(_)));
        assert_eq!(nullable.ty(), &Type::bool());
    }

    #[test]
    fn flatten_clones_only_nontrivial_fields() {
        let var = Variable::new("t", row().ref_type());
        let flat = TupleExpr::flatten(var.into());
        assert_eq!(flat.size(), 2);
        assert!(matches!(flat.exprs[0], Expr::Field(_)));
        assert!(matches!(flat.exprs[1], Expr::Clone(_)));
    }

    #[test]
    fn comparator_keys_follow_construction_order() {
        let comparator = ComparatorExpr::empty(row())
            .then_field(0, true)
            .then_field(1, false);
        assert_eq!(comparator.keys(), vec![(0, true), (1, false)]);
    }
}
