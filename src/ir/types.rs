//! The type universe of the circuit IR.

use crate::error::CompileError;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Write};

/// Width of a signed integer type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub enum IntWidth {
    W16,
    W32,
    W64,
}

impl IntWidth {
    #[must_use]
    pub const fn bits(self) -> u32 {
        match self {
            Self::W16 => 16,
            Self::W32 => 32,
            Self::W64 => 64,
        }
    }
}

/// Width of a floating point type.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Deserialize, Serialize,
)]
pub enum FloatWidth {
    W32,
    W64,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum TypeKind {
    /// The type of the untyped `NULL` literal
    Null,
    Bool,
    Int { width: IntWidth, signed: bool },
    Float { width: FloatWidth },
    Decimal,
    String,
    /// Days since the epoch
    Date,
    /// Milliseconds since the epoch
    Timestamp,
    /// An interval measured in milliseconds
    MillisInterval,
    GeoPoint,
    /// A SQL keyword argument, e.g. the unit of `EXTRACT`
    Keyword,
    USize,
    /// The weight attached to Z-set elements; distinct from the
    /// integer types even when represented identically
    Weight,
    /// A type variable; must not survive into a sealed circuit
    Any,
    /// An immutable reference
    Ref(Box<Type>),
    Tuple(Vec<Type>),
    RawTuple(Vec<Type>),
    Vec(Box<Type>),
    ZSet { element: Box<Type>, weight: Box<Type> },
    User { name: String, args: Vec<Type> },
}

/// A type: a kind plus a nullability flag.
///
/// References are always non-nullable and never nest; Z-set element
/// types are tuples. Constructors uphold these invariants.
#[derive(Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct Type {
    kind: TypeKind,
    may_be_null: bool,
}

impl Type {
    pub fn new(kind: TypeKind, may_be_null: bool) -> Self {
        debug_assert!(
            !(matches!(kind, TypeKind::Ref(_)) && may_be_null),
            "reference types are never nullable",
        );
        Self { kind, may_be_null }
    }

    pub const fn null() -> Self {
        Self {
            kind: TypeKind::Null,
            may_be_null: true,
        }
    }

    pub const fn bool() -> Self {
        Self {
            kind: TypeKind::Bool,
            may_be_null: false,
        }
    }

    pub const fn i16() -> Self {
        Self::int(IntWidth::W16)
    }

    pub const fn i32() -> Self {
        Self::int(IntWidth::W32)
    }

    pub const fn i64() -> Self {
        Self::int(IntWidth::W64)
    }

    pub const fn int(width: IntWidth) -> Self {
        Self {
            kind: TypeKind::Int {
                width,
                signed: true,
            },
            may_be_null: false,
        }
    }

    pub const fn f32() -> Self {
        Self {
            kind: TypeKind::Float {
                width: FloatWidth::W32,
            },
            may_be_null: false,
        }
    }

    pub const fn f64() -> Self {
        Self {
            kind: TypeKind::Float {
                width: FloatWidth::W64,
            },
            may_be_null: false,
        }
    }

    pub const fn decimal() -> Self {
        Self {
            kind: TypeKind::Decimal,
            may_be_null: false,
        }
    }

    pub const fn string() -> Self {
        Self {
            kind: TypeKind::String,
            may_be_null: false,
        }
    }

    pub const fn date() -> Self {
        Self {
            kind: TypeKind::Date,
            may_be_null: false,
        }
    }

    pub const fn timestamp() -> Self {
        Self {
            kind: TypeKind::Timestamp,
            may_be_null: false,
        }
    }

    pub const fn millis_interval() -> Self {
        Self {
            kind: TypeKind::MillisInterval,
            may_be_null: false,
        }
    }

    pub const fn geo_point() -> Self {
        Self {
            kind: TypeKind::GeoPoint,
            may_be_null: false,
        }
    }

    pub const fn keyword() -> Self {
        Self {
            kind: TypeKind::Keyword,
            may_be_null: false,
        }
    }

    pub const fn usize() -> Self {
        Self {
            kind: TypeKind::USize,
            may_be_null: false,
        }
    }

    pub const fn weight() -> Self {
        Self {
            kind: TypeKind::Weight,
            may_be_null: false,
        }
    }

    pub const fn any() -> Self {
        Self {
            kind: TypeKind::Any,
            may_be_null: false,
        }
    }

    pub fn tuple(fields: Vec<Type>) -> Self {
        Self {
            kind: TypeKind::Tuple(fields),
            may_be_null: false,
        }
    }

    pub fn raw_tuple(fields: Vec<Type>) -> Self {
        Self {
            kind: TypeKind::RawTuple(fields),
            may_be_null: false,
        }
    }

    pub fn vec_of(element: Type) -> Self {
        Self {
            kind: TypeKind::Vec(Box::new(element)),
            may_be_null: false,
        }
    }

    /// A Z-set over `element` rows with the standard weight.
    pub fn zset(element: Type) -> Self {
        Self::zset_with_weight(element, Self::weight())
    }

    pub fn zset_with_weight(element: Type, weight: Type) -> Self {
        Self {
            kind: TypeKind::ZSet {
                element: Box::new(element),
                weight: Box::new(weight),
            },
            may_be_null: false,
        }
    }

    pub fn user(name: impl Into<String>, args: Vec<Type>) -> Self {
        Self {
            kind: TypeKind::User {
                name: name.into(),
                args,
            },
            may_be_null: false,
        }
    }

    /// An immutable reference to `self`. References never nest; taking
    /// a reference of a reference returns it unchanged.
    pub fn ref_type(&self) -> Self {
        if self.is_ref() {
            return self.clone();
        }
        Self {
            kind: TypeKind::Ref(Box::new(self.clone())),
            may_be_null: false,
        }
    }

    pub const fn kind(&self) -> &TypeKind {
        &self.kind
    }

    pub const fn may_be_null(&self) -> bool {
        self.may_be_null
    }

    /// The same type with nullability replaced. A no-op on `Null`,
    /// which is inherently nullable, and on references.
    #[must_use]
    pub fn with_nullability(&self, may_be_null: bool) -> Self {
        match &self.kind {
            TypeKind::Null => Self::null(),
            TypeKind::Ref(_) => self.clone(),
            _ => Self {
                kind: self.kind.clone(),
                may_be_null,
            },
        }
    }

    /// Exact type equality, nullability included.
    pub fn same_type(&self, other: &Self) -> bool {
        self == other
    }

    pub const fn is_null(&self) -> bool {
        matches!(self.kind, TypeKind::Null)
    }

    pub const fn is_bool(&self) -> bool {
        matches!(self.kind, TypeKind::Bool)
    }

    pub const fn is_integer(&self) -> bool {
        matches!(self.kind, TypeKind::Int { .. })
    }

    pub const fn is_float(&self) -> bool {
        matches!(self.kind, TypeKind::Float { .. })
    }

    pub const fn is_decimal(&self) -> bool {
        matches!(self.kind, TypeKind::Decimal)
    }

    pub const fn is_numeric(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Int { .. } | TypeKind::Float { .. } | TypeKind::Decimal,
        )
    }

    /// Date-like types bypass the common-promotion discipline; their
    /// arithmetic is dispatched to named runtime functions instead.
    pub const fn is_date_like(&self) -> bool {
        matches!(
            self.kind,
            TypeKind::Date | TypeKind::Timestamp | TypeKind::MillisInterval,
        )
    }

    pub const fn is_ref(&self) -> bool {
        matches!(self.kind, TypeKind::Ref(_))
    }

    pub const fn is_tuple(&self) -> bool {
        matches!(self.kind, TypeKind::Tuple(_))
    }

    pub const fn is_raw_tuple(&self) -> bool {
        matches!(self.kind, TypeKind::RawTuple(_))
    }

    pub const fn is_vec(&self) -> bool {
        matches!(self.kind, TypeKind::Vec(_))
    }

    pub const fn is_zset(&self) -> bool {
        matches!(self.kind, TypeKind::ZSet { .. })
    }

    pub const fn is_any(&self) -> bool {
        matches!(self.kind, TypeKind::Any)
    }

    /// The referent of a reference type.
    ///
    /// ## Panics
    ///
    /// Panics if `self` is not a reference.
    pub fn deref(&self) -> &Type {
        match &self.kind {
            TypeKind::Ref(inner) => inner,
            other => panic!("deref of non-reference type {other:?}"),
        }
    }

    /// The fields of a tuple or raw tuple type.
    ///
    /// ## Panics
    ///
    /// Panics if `self` is not a tuple.
    pub fn tuple_fields(&self) -> &[Type] {
        match &self.kind {
            TypeKind::Tuple(fields) | TypeKind::RawTuple(fields) => fields,
            other => panic!("tuple fields of non-tuple type {other:?}"),
        }
    }

    /// The arity of a tuple type.
    pub fn size(&self) -> usize {
        self.tuple_fields().len()
    }

    /// The type of tuple field `index`.
    pub fn field(&self, index: usize) -> &Type {
        &self.tuple_fields()[index]
    }

    /// A tuple type over a sub-range of this tuple's fields.
    pub fn slice(&self, start: usize, end: usize) -> Type {
        Type::tuple(self.tuple_fields()[start..end].to_vec())
    }

    /// The element type of a Z-set.
    ///
    /// ## Panics
    ///
    /// Panics if `self` is not a Z-set.
    pub fn zset_element(&self) -> &Type {
        match &self.kind {
            TypeKind::ZSet { element, .. } => element,
            other => panic!("Z-set element of non-Z-set type {other:?}"),
        }
    }

    /// The weight type of a Z-set.
    pub fn zset_weight(&self) -> &Type {
        match &self.kind {
            TypeKind::ZSet { weight, .. } => weight,
            other => panic!("Z-set weight of non-Z-set type {other:?}"),
        }
    }

    /// The element type of a vector.
    pub fn vec_element(&self) -> &Type {
        match &self.kind {
            TypeKind::Vec(element) => element,
            other => panic!("vector element of non-vector type {other:?}"),
        }
    }

    /// Whether any component of this type is the `Any` placeholder.
    pub fn contains_any(&self) -> bool {
        match &self.kind {
            TypeKind::Any => true,
            TypeKind::Ref(inner) | TypeKind::Vec(inner) => inner.contains_any(),
            TypeKind::Tuple(fields) | TypeKind::RawTuple(fields) => {
                fields.iter().any(Type::contains_any)
            }
            TypeKind::ZSet { element, weight } => {
                element.contains_any() || weight.contains_any()
            }
            TypeKind::User { args, .. } => args.iter().any(Type::contains_any),
            _ => false,
        }
    }

    /// Whether cloning a value of this type is more than a bitwise
    /// copy.
    pub fn needs_nontrivial_clone(&self) -> bool {
        match &self.kind {
            TypeKind::String | TypeKind::Vec(_) | TypeKind::ZSet { .. } => true,
            TypeKind::Tuple(fields) | TypeKind::RawTuple(fields) => {
                fields.iter().any(Type::needs_nontrivial_clone)
            }
            TypeKind::User { .. } | TypeKind::Any => true,
            _ => false,
        }
    }

    /// `"N"` for nullable types, `""` otherwise; used when naming
    /// runtime functions.
    pub const fn nullable_suffix(&self) -> &'static str {
        if self.may_be_null {
            "N"
        } else {
            ""
        }
    }

    /// The short name used in runtime function names, e.g. `i32` in
    /// `power_f64_i32` or `ts` in `floor_ts_MONTH`.
    pub fn short_name(&self) -> &'static str {
        match &self.kind {
            TypeKind::Bool => "b",
            TypeKind::Int { width, .. } => match width {
                IntWidth::W16 => "i16",
                IntWidth::W32 => "i32",
                IntWidth::W64 => "i64",
            },
            TypeKind::Float { width } => match width {
                FloatWidth::W32 => "f32",
                FloatWidth::W64 => "f64",
            },
            TypeKind::Decimal => "d",
            TypeKind::String => "s",
            TypeKind::Date => "date",
            TypeKind::Timestamp => "ts",
            TypeKind::MillisInterval => "interval",
            TypeKind::GeoPoint => "geopoint",
            TypeKind::USize => "usize",
            TypeKind::Weight => "weight",
            other => panic!("no short name for type {other:?}"),
        }
    }

    /// Short name plus nullability suffix, e.g. `i32N`.
    pub fn base_name_with_suffix(&self) -> String {
        format!("{}{}", self.short_name(), self.nullable_suffix())
    }
}

impl Debug for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(self, f)
    }
}

impl Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn list(f: &mut fmt::Formatter<'_>, fields: &[Type]) -> fmt::Result {
            for (idx, field) in fields.iter().enumerate() {
                if idx != 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{field}")?;
            }
            Ok(())
        }

        match &self.kind {
            TypeKind::Null => f.write_str("null")?,
            TypeKind::Bool => f.write_str("bool")?,
            TypeKind::Int { width, .. } => write!(f, "i{}", width.bits())?,
            TypeKind::Float {
                width: FloatWidth::W32,
            } => f.write_str("f32")?,
            TypeKind::Float {
                width: FloatWidth::W64,
            } => f.write_str("f64")?,
            TypeKind::Decimal => f.write_str("decimal")?,
            TypeKind::String => f.write_str("str")?,
            TypeKind::Date => f.write_str("date")?,
            TypeKind::Timestamp => f.write_str("timestamp")?,
            TypeKind::MillisInterval => f.write_str("interval")?,
            TypeKind::GeoPoint => f.write_str("geopoint")?,
            TypeKind::Keyword => f.write_str("keyword")?,
            TypeKind::USize => f.write_str("usize")?,
            TypeKind::Weight => f.write_str("weight")?,
            TypeKind::Any => f.write_str("_")?,
            TypeKind::Ref(inner) => write!(f, "&{inner}")?,
            TypeKind::Tuple(fields) => {
                f.write_str("Tup(")?;
                list(f, fields)?;
                f.write_char(')')?;
            }
            TypeKind::RawTuple(fields) => {
                f.write_char('(')?;
                list(f, fields)?;
                f.write_char(')')?;
            }
            TypeKind::Vec(element) => write!(f, "Vec<{element}>")?,
            TypeKind::ZSet { element, weight } => write!(f, "ZSet<{element}, {weight}>")?,
            TypeKind::User { name, args } => {
                f.write_str(name)?;
                if !args.is_empty() {
                    f.write_char('<')?;
                    list(f, args)?;
                    f.write_char('>')?;
                }
            }
        }

        if self.may_be_null {
            f.write_char('?')?;
        }
        Ok(())
    }
}

/// The common base that both operands of a binary operation must be
/// cast to. Ignores nullability except for the `Null` type itself;
/// callers OR the operand nullabilities back onto the result.
pub fn reduce_type(left: &Type, right: &Type) -> Result<Type, CompileError> {
    if left.is_null() {
        return Ok(right.with_nullability(true));
    }
    if right.is_null() {
        return Ok(left.with_nullability(true));
    }

    let left = left.with_nullability(false);
    let right = right.with_nullability(false);
    if left.same_type(&right) {
        return Ok(left);
    }

    match (left.kind(), right.kind()) {
        (TypeKind::Int { width: lw, .. }, TypeKind::Int { width: rw, .. }) => {
            Ok(Type::int((*lw).max(*rw)))
        }
        (TypeKind::Int { .. }, TypeKind::Float { .. } | TypeKind::Decimal) => Ok(right),
        (TypeKind::Float { .. } | TypeKind::Decimal, TypeKind::Int { .. }) => Ok(left),
        (TypeKind::Float { width: lw }, TypeKind::Float { width: rw }) => {
            if lw < rw {
                Ok(right)
            } else {
                Ok(left)
            }
        }
        (TypeKind::Decimal, TypeKind::Float { .. }) => Ok(right),
        (TypeKind::Float { .. }, TypeKind::Decimal) => Ok(left),
        _ => Err(CompileError::promotion(left, right)),
    }
}

#[cfg(test)]
mod tests {
    use super::{reduce_type, Type};

    #[test]
    fn promotion_widens_integers() {
        let reduced = reduce_type(&Type::i16(), &Type::i64()).unwrap();
        assert_eq!(reduced, Type::i64());
    }

    #[test]
    fn promotion_prefers_non_integer() {
        assert_eq!(reduce_type(&Type::i32(), &Type::f64()).unwrap(), Type::f64());
        assert_eq!(
            reduce_type(&Type::decimal(), &Type::i64()).unwrap(),
            Type::decimal(),
        );
        assert_eq!(
            reduce_type(&Type::decimal(), &Type::f32()).unwrap(),
            Type::f32(),
        );
    }

    #[test]
    fn promotion_ignores_operand_nullability() {
        let reduced =
            reduce_type(&Type::i32().with_nullability(true), &Type::i64()).unwrap();
        assert_eq!(reduced, Type::i64());
        assert!(!reduced.may_be_null());
    }

    #[test]
    fn null_makes_the_other_side_nullable() {
        let reduced = reduce_type(&Type::null(), &Type::string()).unwrap();
        assert_eq!(reduced, Type::string().with_nullability(true));
    }

    #[test]
    fn promotion_is_commutative() {
        let types = [
            Type::i16(),
            Type::i32(),
            Type::i64(),
            Type::f32(),
            Type::f64(),
            Type::decimal(),
        ];
        for left in &types {
            for right in &types {
                let forward = reduce_type(left, right).unwrap();
                let backward = reduce_type(right, left).unwrap();
                assert_eq!(forward, backward, "{left} x {right}");
            }
        }
    }

    #[test]
    fn incompatible_types_fail() {
        assert!(reduce_type(&Type::string(), &Type::i32()).is_err());
        assert!(reduce_type(&Type::bool(), &Type::f64()).is_err());
    }

    #[test]
    fn references_never_nest() {
        let referent = Type::tuple(vec![Type::i32()]);
        let reference = referent.ref_type();
        assert_eq!(reference.ref_type(), reference);
        assert_eq!(reference.deref(), &referent);
    }

    #[test]
    fn any_detection_is_recursive() {
        let ty = Type::zset(Type::tuple(vec![Type::i32(), Type::any()]));
        assert!(ty.contains_any());
        let clean = Type::zset(Type::tuple(vec![Type::i32()]));
        assert!(!clean.contains_any());
    }
}
