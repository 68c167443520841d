use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};
use serde_json::Value;

use crate::error::QueryError;

/// Comparison operator names understood by the remote consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    In,
    Nin,
    Like,
    ILike,
    Between,
    Exists,
    Null,
}

impl Operator {
    pub const ALL: [Operator; 13] = [
        Operator::Eq,
        Operator::Ne,
        Operator::Gt,
        Operator::Gte,
        Operator::Lt,
        Operator::Lte,
        Operator::In,
        Operator::Nin,
        Operator::Like,
        Operator::ILike,
        Operator::Between,
        Operator::Exists,
        Operator::Null,
    ];

    /// The `$`-prefixed key used on the wire.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "$eq",
            Operator::Ne => "$ne",
            Operator::Gt => "$gt",
            Operator::Gte => "$gte",
            Operator::Lt => "$lt",
            Operator::Lte => "$lte",
            Operator::In => "$in",
            Operator::Nin => "$nin",
            Operator::Like => "$like",
            Operator::ILike => "$ilike",
            Operator::Between => "$between",
            Operator::Exists => "$exists",
            Operator::Null => "$null",
        }
    }

    pub fn from_key(key: &str) -> Option<Operator> {
        Operator::ALL.into_iter().find(|op| op.as_str() == key)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operator applied to a field, with an operand of the type the operator
/// requires.
#[derive(Debug, Clone, PartialEq)]
pub enum Comparison {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Nin(Vec<Value>),
    Like(String),
    ILike(String),
    Between(Value, Value),
    Exists(bool),
    Null(bool),
}

impl Comparison {
    pub fn operator(&self) -> Operator {
        match self {
            Comparison::Eq(_) => Operator::Eq,
            Comparison::Ne(_) => Operator::Ne,
            Comparison::Gt(_) => Operator::Gt,
            Comparison::Gte(_) => Operator::Gte,
            Comparison::Lt(_) => Operator::Lt,
            Comparison::Lte(_) => Operator::Lte,
            Comparison::In(_) => Operator::In,
            Comparison::Nin(_) => Operator::Nin,
            Comparison::Like(_) => Operator::Like,
            Comparison::ILike(_) => Operator::ILike,
            Comparison::Between(..) => Operator::Between,
            Comparison::Exists(_) => Operator::Exists,
            Comparison::Null(_) => Operator::Null,
        }
    }

    /// Build a comparison from a wire operator key and its JSON operand,
    /// checking the operand type the operator requires.
    pub fn from_json(key: &str, operand: &Value) -> Result<Comparison, QueryError> {
        let op = Operator::from_key(key)
            .ok_or_else(|| QueryError::shape(format!("unknown field operator: {key}")))?;

        let comparison = match op {
            Operator::Eq => Comparison::Eq(operand.clone()),
            Operator::Ne => Comparison::Ne(operand.clone()),
            Operator::Gt => Comparison::Gt(operand.clone()),
            Operator::Gte => Comparison::Gte(operand.clone()),
            Operator::Lt => Comparison::Lt(operand.clone()),
            Operator::Lte => Comparison::Lte(operand.clone()),
            Operator::In => Comparison::In(expect_array(op, operand)?),
            Operator::Nin => Comparison::Nin(expect_array(op, operand)?),
            Operator::Like => Comparison::Like(expect_string(op, operand)?),
            Operator::ILike => Comparison::ILike(expect_string(op, operand)?),
            Operator::Between => match operand {
                Value::Array(pair) if pair.len() == 2 => {
                    Comparison::Between(pair[0].clone(), pair[1].clone())
                }
                _ => {
                    return Err(QueryError::shape(
                        "$between value must be a [low, high] pair",
                    ));
                }
            },
            Operator::Exists => Comparison::Exists(expect_bool(op, operand)?),
            Operator::Null => Comparison::Null(expect_bool(op, operand)?),
        };
        Ok(comparison)
    }

    fn serialize_operand<M: SerializeMap>(&self, map: &mut M) -> Result<(), M::Error> {
        let key = self.operator().as_str();
        match self {
            Comparison::Eq(v)
            | Comparison::Ne(v)
            | Comparison::Gt(v)
            | Comparison::Gte(v)
            | Comparison::Lt(v)
            | Comparison::Lte(v) => map.serialize_entry(key, v),
            Comparison::In(values) | Comparison::Nin(values) => map.serialize_entry(key, values),
            Comparison::Like(pattern) | Comparison::ILike(pattern) => {
                map.serialize_entry(key, pattern)
            }
            Comparison::Between(low, high) => map.serialize_entry(key, &Pair(low, high)),
            Comparison::Exists(flag) | Comparison::Null(flag) => map.serialize_entry(key, flag),
        }
    }
}

struct Pair<'a>(&'a Value, &'a Value);

impl Serialize for Pair<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(self.0)?;
        seq.serialize_element(self.1)?;
        seq.end()
    }
}

fn expect_array(op: Operator, operand: &Value) -> Result<Vec<Value>, QueryError> {
    match operand {
        Value::Array(values) => Ok(values.clone()),
        _ => Err(QueryError::shape(format!("{op} value must be an array"))),
    }
}

fn expect_string(op: Operator, operand: &Value) -> Result<String, QueryError> {
    match operand {
        Value::String(s) => Ok(s.clone()),
        _ => Err(QueryError::shape(format!("{op} value must be a string"))),
    }
}

fn expect_bool(op: Operator, operand: &Value) -> Result<bool, QueryError> {
    match operand {
        Value::Bool(b) => Ok(*b),
        _ => Err(QueryError::shape(format!("{op} value must be a boolean"))),
    }
}

/// An operator object such as `{ "$gt": 21, "$lte": 100 }`.
///
/// Operators keep the order they were added in. Adding an operator that is
/// already present replaces its operand in place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Operators {
    comparisons: Vec<Comparison>,
}

impl Operators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, comparison: Comparison) -> Self {
        self.insert(comparison);
        self
    }

    pub fn insert(&mut self, comparison: Comparison) {
        let op = comparison.operator();
        match self.comparisons.iter_mut().find(|c| c.operator() == op) {
            Some(existing) => *existing = comparison,
            None => self.comparisons.push(comparison),
        }
    }

    pub fn get(&self, op: Operator) -> Option<&Comparison> {
        self.comparisons.iter().find(|c| c.operator() == op)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Comparison> {
        self.comparisons.iter()
    }

    pub fn len(&self) -> usize {
        self.comparisons.len()
    }

    pub fn is_empty(&self) -> bool {
        self.comparisons.is_empty()
    }

    pub fn equals(self, value: impl Into<Value>) -> Self {
        self.with(Comparison::Eq(value.into()))
    }

    pub fn not_equals(self, value: impl Into<Value>) -> Self {
        self.with(Comparison::Ne(value.into()))
    }

    pub fn gt(self, value: impl Into<Value>) -> Self {
        self.with(Comparison::Gt(value.into()))
    }

    pub fn gte(self, value: impl Into<Value>) -> Self {
        self.with(Comparison::Gte(value.into()))
    }

    pub fn lt(self, value: impl Into<Value>) -> Self {
        self.with(Comparison::Lt(value.into()))
    }

    pub fn lte(self, value: impl Into<Value>) -> Self {
        self.with(Comparison::Lte(value.into()))
    }

    pub fn is_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.with(Comparison::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Self {
        self.with(Comparison::Nin(values.into_iter().map(Into::into).collect()))
    }

    pub fn like(self, pattern: impl Into<String>) -> Self {
        self.with(Comparison::Like(pattern.into()))
    }

    pub fn ilike(self, pattern: impl Into<String>) -> Self {
        self.with(Comparison::ILike(pattern.into()))
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Self {
        self.with(Comparison::Between(low.into(), high.into()))
    }

    pub fn exists(self, exists: bool) -> Self {
        self.with(Comparison::Exists(exists))
    }

    pub fn null(self, is_null: bool) -> Self {
        self.with(Comparison::Null(is_null))
    }

    /// Parse an operator object. Every key must be a known operator.
    pub fn from_json(doc: &serde_json::Map<String, Value>) -> Result<Operators, QueryError> {
        if doc.is_empty() {
            return Err(QueryError::shape("empty operator document"));
        }
        let mut ops = Operators::new();
        for (key, operand) in doc {
            ops.insert(Comparison::from_json(key, operand)?);
        }
        Ok(ops)
    }
}

impl Serialize for Operators {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.comparisons.len()))?;
        for comparison in &self.comparisons {
            comparison.serialize_operand(&mut map)?;
        }
        map.end()
    }
}
