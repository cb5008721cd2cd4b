//! Typed literal values and Z-set literals.

use crate::ir::types::Type;
use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::Expr;

/// The payload of a literal. The carrying [`Literal`] records the
/// exact type; `Null` payloads still carry the target field type so
/// that downstream type checks pass.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub enum LiteralValue {
    Null,
    Bool(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F32(f32),
    F64(f64),
    Decimal(Decimal),
    String(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
    MillisInterval(i64),
    GeoPoint { x: f64, y: f64 },
    Keyword(String),
    USize(usize),
    Weight(i64),
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct Literal {
    pub value: LiteralValue,
    ty: Type,
}

impl Literal {
    pub fn new(value: LiteralValue, ty: Type) -> Self {
        Self { value, ty }
    }

    /// A typed `NULL`.
    pub fn none(ty: &Type) -> Self {
        Self {
            value: LiteralValue::Null,
            ty: ty.with_nullability(true),
        }
    }

    pub fn bool(value: bool) -> Self {
        Self::new(LiteralValue::Bool(value), Type::bool())
    }

    pub fn i16(value: i16) -> Self {
        Self::new(LiteralValue::I16(value), Type::i16())
    }

    pub fn i32(value: i32) -> Self {
        Self::new(LiteralValue::I32(value), Type::i32())
    }

    pub fn i64(value: i64) -> Self {
        Self::new(LiteralValue::I64(value), Type::i64())
    }

    pub fn f32(value: f32) -> Self {
        Self::new(LiteralValue::F32(value), Type::f32())
    }

    pub fn f64(value: f64) -> Self {
        Self::new(LiteralValue::F64(value), Type::f64())
    }

    pub fn decimal(value: Decimal) -> Self {
        Self::new(LiteralValue::Decimal(value), Type::decimal())
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::new(LiteralValue::String(value.into()), Type::string())
    }

    pub fn date(value: NaiveDate) -> Self {
        Self::new(LiteralValue::Date(value), Type::date())
    }

    pub fn timestamp(value: NaiveDateTime) -> Self {
        Self::new(LiteralValue::Timestamp(value), Type::timestamp())
    }

    pub fn millis_interval(millis: i64) -> Self {
        Self::new(LiteralValue::MillisInterval(millis), Type::millis_interval())
    }

    pub fn geo_point(x: f64, y: f64) -> Self {
        Self::new(LiteralValue::GeoPoint { x, y }, Type::geo_point())
    }

    pub fn keyword(value: impl Into<String>) -> Self {
        Self::new(LiteralValue::Keyword(value.into()), Type::keyword())
    }

    pub fn usize(value: usize) -> Self {
        Self::new(LiteralValue::USize(value), Type::usize())
    }

    pub fn weight(value: i64) -> Self {
        Self::new(LiteralValue::Weight(value), Type::weight())
    }

    pub const fn ty(&self) -> &Type {
        &self.ty
    }

    pub const fn is_null(&self) -> bool {
        matches!(self.value, LiteralValue::Null)
    }

    /// The boolean payload, if this is a boolean literal.
    pub const fn as_bool(&self) -> Option<bool> {
        if let LiteralValue::Bool(value) = self.value {
            Some(value)
        } else {
            None
        }
    }

    /// The keyword payload, if this is a keyword literal.
    pub fn as_keyword(&self) -> Option<&str> {
        if let LiteralValue::Keyword(keyword) = &self.value {
            Some(keyword)
        } else {
            None
        }
    }
}

/// A literal Z-set: tuples with integer weights, equal tuples merged
/// additively. Used for VALUES clauses and materialized table
/// contents.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ZSetLiteral {
    element_type: Type,
    weight_type: Type,
    entries: Vec<(Expr, i64)>,
}

impl ZSetLiteral {
    pub fn new(element_type: Type) -> Self {
        Self::with_weight(element_type, Type::weight())
    }

    pub fn with_weight(element_type: Type, weight_type: Type) -> Self {
        Self {
            element_type,
            weight_type,
            entries: Vec::new(),
        }
    }

    pub const fn element_type(&self) -> &Type {
        &self.element_type
    }

    pub const fn weight_type(&self) -> &Type {
        &self.weight_type
    }

    /// The Z-set type of this literal.
    pub fn ty(&self) -> Type {
        Type::zset_with_weight(self.element_type.clone(), self.weight_type.clone())
    }

    pub fn add(&mut self, element: Expr) {
        self.add_with_weight(element, 1);
    }

    /// Adds `element` with the given weight, merging with an equal
    /// entry if one exists. Entries whose weight cancels to zero are
    /// removed.
    pub fn add_with_weight(&mut self, element: Expr, weight: i64) {
        if let Some(position) = self.entries.iter().position(|(e, _)| e == &element) {
            self.entries[position].1 += weight;
            if self.entries[position].1 == 0 {
                self.entries.remove(position);
            }
        } else if weight != 0 {
            self.entries.push((element, weight));
        }
    }

    /// Adds every entry of `other` into this Z-set.
    pub fn extend(&mut self, other: &ZSetLiteral) {
        for (element, weight) in &other.entries {
            self.add_with_weight(element.clone(), *weight);
        }
    }

    pub fn entries(&self) -> &[(Expr, i64)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The weight of `element`, zero when absent.
    pub fn weight_of(&self, element: &Expr) -> i64 {
        self.entries
            .iter()
            .find(|(e, _)| e == element)
            .map(|(_, w)| *w)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::{Literal, ZSetLiteral};
    use crate::ir::exprs::{Expr, TupleExpr};
    use crate::ir::types::Type;

    fn tuple(value: i32) -> Expr {
        TupleExpr::new(vec![Literal::i32(value).into()]).into()
    }

    #[test]
    fn equal_tuples_merge_additively() {
        let mut zset = ZSetLiteral::new(Type::tuple(vec![Type::i32()]));
        zset.add(tuple(1));
        zset.add(tuple(1));
        zset.add(tuple(2));
        assert_eq!(zset.len(), 2);
        assert_eq!(zset.weight_of(&tuple(1)), 2);
        assert_eq!(zset.weight_of(&tuple(2)), 1);
    }

    #[test]
    fn cancelling_weights_remove_the_entry() {
        let mut zset = ZSetLiteral::new(Type::tuple(vec![Type::i32()]));
        zset.add_with_weight(tuple(1), 1);
        zset.add_with_weight(tuple(1), -1);
        assert!(zset.is_empty());
    }

    #[test]
    fn null_literals_carry_the_field_type() {
        let none = Literal::none(&Type::i32());
        assert!(none.is_null());
        assert!(none.ty().may_be_null());
        assert_eq!(none.ty(), &Type::i32().with_nullability(true));
    }
}
