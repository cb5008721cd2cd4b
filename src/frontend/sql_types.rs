//! The upstream planner's type descriptors and their lowering into
//! the IR type universe.

use crate::ir::types::Type;
use serde::{Deserialize, Serialize};

/// A SQL type as described by the upstream planner.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SqlType {
    pub kind: SqlTypeKind,
    pub nullable: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub enum SqlTypeKind {
    /// The type of the untyped NULL literal
    Null,
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    Double,
    Decimal { precision: u32, scale: u32 },
    Char,
    Varchar,
    Date,
    Timestamp,
    IntervalMillis,
    Geometry,
    /// A keyword argument, e.g. the unit of EXTRACT
    Symbol,
    Array(Box<SqlType>),
}

impl SqlType {
    pub const fn new(kind: SqlTypeKind, nullable: bool) -> Self {
        Self { kind, nullable }
    }

    pub const fn non_null(kind: SqlTypeKind) -> Self {
        Self::new(kind, false)
    }

    pub const fn nullable(kind: SqlTypeKind) -> Self {
        Self::new(kind, true)
    }
}

/// A named, typed column of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Deserialize, Serialize)]
pub struct SqlField {
    pub name: String,
    pub ty: SqlType,
}

impl SqlField {
    pub fn new(name: impl Into<String>, ty: SqlType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// Lowers a planner type into the IR type universe. Used by both the
/// statement layer and the plan visitor.
pub fn convert_type(ty: &SqlType) -> Type {
    let converted = match &ty.kind {
        SqlTypeKind::Null => return Type::null(),
        SqlTypeKind::Boolean => Type::bool(),
        SqlTypeKind::SmallInt => Type::i16(),
        SqlTypeKind::Integer => Type::i32(),
        SqlTypeKind::BigInt => Type::i64(),
        SqlTypeKind::Real => Type::f32(),
        SqlTypeKind::Double => Type::f64(),
        SqlTypeKind::Decimal { .. } => Type::decimal(),
        SqlTypeKind::Char | SqlTypeKind::Varchar => Type::string(),
        SqlTypeKind::Date => Type::date(),
        SqlTypeKind::Timestamp => Type::timestamp(),
        SqlTypeKind::IntervalMillis => Type::millis_interval(),
        SqlTypeKind::Geometry => Type::geo_point(),
        SqlTypeKind::Symbol => Type::keyword(),
        SqlTypeKind::Array(element) => Type::vec_of(convert_type(element)),
    };
    converted.with_nullability(ty.nullable)
}

/// Lowers a relation's row into a tuple type.
pub fn convert_row_type(fields: &[SqlField]) -> Type {
    Type::tuple(fields.iter().map(|field| convert_type(&field.ty)).collect())
}

#[cfg(test)]
mod tests {
    use super::{convert_row_type, convert_type, SqlField, SqlType, SqlTypeKind};
    use crate::ir::types::Type;

    #[test]
    fn scalar_lowering() {
        assert_eq!(
            convert_type(&SqlType::non_null(SqlTypeKind::Integer)),
            Type::i32(),
        );
        assert_eq!(
            convert_type(&SqlType::nullable(SqlTypeKind::Varchar)),
            Type::string().with_nullability(true),
        );
        assert_eq!(
            convert_type(&SqlType::non_null(SqlTypeKind::Array(Box::new(
                SqlType::nullable(SqlTypeKind::BigInt)
            )))),
            Type::vec_of(Type::i64().with_nullability(true)),
        );
    }

    #[test]
    fn rows_lower_to_tuples() {
        let row = convert_row_type(&[
            SqlField::new("a", SqlType::non_null(SqlTypeKind::Integer)),
            SqlField::new("b", SqlType::nullable(SqlTypeKind::Double)),
        ]);
        assert_eq!(
            row,
            Type::tuple(vec![Type::i32(), Type::f64().with_nullability(true)]),
        );
    }
}
