use std::mem;

use serde::de::{Deserialize, Deserializer, Error as _};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};

use crate::error::QueryError;
use crate::nested::MAX_NESTING_DEPTH;
use crate::operator::{Comparison, Operator, Operators};

/// The condition attached to one field: a bare value (implicit `$eq`) or an
/// operator object.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldCondition {
    Value(Value),
    Operators(Operators),
}

impl FieldCondition {
    pub fn value(value: impl Into<Value>) -> Self {
        FieldCondition::Value(value.into())
    }

    /// Rewrite a bare value into its explicit `{ "$eq": value }` form.
    pub fn normalized(&self) -> FieldCondition {
        match self {
            FieldCondition::Value(v) => {
                FieldCondition::Operators(Operators::new().with(Comparison::Eq(v.clone())))
            }
            FieldCondition::Operators(ops) => FieldCondition::Operators(ops.clone()),
        }
    }

    fn from_json(value: &Value) -> Result<FieldCondition, QueryError> {
        match as_operator_document(value) {
            Some(doc) => Ok(FieldCondition::Operators(Operators::from_json(doc)?)),
            None => Ok(FieldCondition::Value(value.clone())),
        }
    }
}

/// An object whose first key starts with `$` reads as an operator object;
/// anything else is an implicit `$eq` value.
fn as_operator_document(value: &Value) -> Option<&Map<String, Value>> {
    match value {
        Value::Object(doc) if doc.keys().next().is_some_and(|k| k.starts_with('$')) => Some(doc),
        _ => None,
    }
}

impl From<Value> for FieldCondition {
    fn from(value: Value) -> Self {
        FieldCondition::Value(value)
    }
}

impl From<Operators> for FieldCondition {
    fn from(ops: Operators) -> Self {
        FieldCondition::Operators(ops)
    }
}

impl Serialize for FieldCondition {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            // Written bare, this value would read back as an operator object.
            FieldCondition::Value(v) if as_operator_document(v).is_some() => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(Operator::Eq.as_str(), v)?;
                map.end()
            }
            FieldCondition::Value(v) => v.serialize(serializer),
            FieldCondition::Operators(ops) => ops.serialize(serializer),
        }
    }
}

/// One key of a filter object.
#[derive(Debug, Clone, PartialEq)]
pub enum Clause {
    /// A field path (dotted paths cross relations) and its condition.
    Field(String, FieldCondition),
    And(Vec<Where>),
    Or(Vec<Where>),
    Not(Box<Where>),
}

impl Clause {
    /// The key this clause occupies in the filter object.
    pub fn key(&self) -> &str {
        match self {
            Clause::Field(path, _) => path,
            Clause::And(_) => "$and",
            Clause::Or(_) => "$or",
            Clause::Not(_) => "$not",
        }
    }
}

/// A filter expression.
///
/// Sibling clauses are combined conjunctively by the remote consumer; this
/// type only carries them. Each key appears at most once: adding a clause for
/// a key that is already present replaces it without changing its position.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Where {
    clauses: Vec<Clause>,
}

impl Where {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a clause, replacing one of the same kind under the same key. A
    /// field clause never replaces a logical one.
    pub fn push(&mut self, clause: Clause) {
        let slot = self.clauses.iter_mut().find(|c| {
            mem::discriminant(&**c) == mem::discriminant(&clause) && c.key() == clause.key()
        });
        match slot {
            Some(existing) => *existing = clause,
            None => self.clauses.push(clause),
        }
    }

    pub fn clause(mut self, clause: Clause) -> Self {
        self.push(clause);
        self
    }

    pub fn field(self, path: impl Into<String>, condition: impl Into<FieldCondition>) -> Self {
        self.clause(Clause::Field(path.into(), condition.into()))
    }

    /// Shorthand for a bare-value (implicit equality) condition.
    pub fn equals(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.field(path, FieldCondition::value(value))
    }

    pub fn op(self, path: impl Into<String>, ops: Operators) -> Self {
        self.field(path, ops)
    }

    pub fn and(self, children: impl IntoIterator<Item = Where>) -> Self {
        self.clause(Clause::And(children.into_iter().collect()))
    }

    pub fn or(self, children: impl IntoIterator<Item = Where>) -> Self {
        self.clause(Clause::Or(children.into_iter().collect()))
    }

    pub fn not(self, child: Where) -> Self {
        self.clause(Clause::Not(Box::new(child)))
    }

    pub fn clauses(&self) -> &[Clause] {
        &self.clauses
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Rewrite every bare value, at every depth, into `{ "$eq": value }`.
    pub fn normalized(&self) -> Where {
        let clauses = self
            .clauses
            .iter()
            .map(|clause| match clause {
                Clause::Field(path, cond) => Clause::Field(path.clone(), cond.normalized()),
                Clause::And(children) => Clause::And(children.iter().map(Where::normalized).collect()),
                Clause::Or(children) => Clause::Or(children.iter().map(Where::normalized).collect()),
                Clause::Not(child) => Clause::Not(Box::new(child.normalized())),
            })
            .collect();
        Where { clauses }
    }

    /// Check that the filter can be sent: no field path starts with `$`, and
    /// logical nesting stays within [`MAX_NESTING_DEPTH`].
    pub fn check(&self) -> Result<(), QueryError> {
        self.check_at(0)
    }

    fn check_at(&self, depth: usize) -> Result<(), QueryError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(too_deep());
        }
        for clause in &self.clauses {
            match clause {
                Clause::Field(path, _) if path.starts_with('$') => {
                    return Err(QueryError::shape(format!(
                        "field path must not start with `$`: {path}"
                    )));
                }
                Clause::Field(..) => {}
                Clause::And(children) | Clause::Or(children) => {
                    for child in children {
                        child.check_at(depth + 1)?;
                    }
                }
                Clause::Not(child) => child.check_at(depth + 1)?,
            }
        }
        Ok(())
    }

    /// Parse the map form of a filter document.
    ///
    /// - `{ "field": value }` is implicit `$eq`
    /// - `{ "field": { "$gt": v } }` uses an operator object
    /// - `$and` / `$or` hold arrays of filter documents, `$not` holds one
    pub fn from_json(value: &Value) -> Result<Where, QueryError> {
        Where::from_json_at(value, 0)
    }

    fn from_json_at(value: &Value, depth: usize) -> Result<Where, QueryError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(too_deep());
        }
        let doc = match value {
            Value::Object(doc) => doc,
            _ => return Err(QueryError::shape("filter must be an object")),
        };

        let mut filter = Where::new();
        for (key, value) in doc {
            let clause = match key.as_str() {
                "$and" => Clause::And(parse_logical_array(key, value, depth + 1)?),
                "$or" => Clause::Or(parse_logical_array(key, value, depth + 1)?),
                "$not" => match value {
                    Value::Object(_) => Clause::Not(Box::new(Where::from_json_at(value, depth + 1)?)),
                    _ => return Err(QueryError::shape("$not value must be an object")),
                },
                k if k.starts_with('$') => {
                    return Err(QueryError::shape(format!("unknown logical operator: {k}")));
                }
                path => Clause::Field(path.to_string(), FieldCondition::from_json(value)?),
            };
            filter.push(clause);
        }
        Ok(filter)
    }
}

fn too_deep() -> QueryError {
    QueryError::shape(format!("filter nested deeper than {MAX_NESTING_DEPTH} levels"))
}

fn parse_logical_array(key: &str, value: &Value, depth: usize) -> Result<Vec<Where>, QueryError> {
    let items = match value {
        Value::Array(items) => items,
        _ => return Err(QueryError::shape(format!("{key} value must be an array"))),
    };
    items
        .iter()
        .map(|item| match item {
            Value::Object(_) => Where::from_json_at(item, depth),
            _ => Err(QueryError::shape(format!(
                "{key} array elements must be objects"
            ))),
        })
        .collect()
}

impl TryFrom<&Value> for Where {
    type Error = QueryError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        Where::from_json(value)
    }
}

impl Serialize for Where {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.clauses.len()))?;
        for clause in &self.clauses {
            match clause {
                Clause::Field(path, cond) => map.serialize_entry(path, cond)?,
                Clause::And(children) | Clause::Or(children) => {
                    map.serialize_entry(clause.key(), children)?
                }
                Clause::Not(child) => map.serialize_entry(clause.key(), &**child)?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Where {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Where::from_json(&value).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operator::Operator;
    use serde_json::json;

    #[test]
    fn bare_field_implicit_eq() {
        let filter = Where::from_json(&json!({ "status": "active" })).unwrap();
        assert_eq!(
            filter.clauses(),
            &[Clause::Field("status".into(), FieldCondition::value("active"))]
        );
    }

    #[test]
    fn operator_document() {
        let filter = Where::from_json(&json!({ "age": { "$gte": 21, "$lt": 65 } })).unwrap();
        match &filter.clauses()[0] {
            Clause::Field(path, FieldCondition::Operators(ops)) => {
                assert_eq!(path, "age");
                assert_eq!(ops.len(), 2);
                assert_eq!(ops.get(Operator::Gte), Some(&Comparison::Gte(json!(21))));
            }
            other => panic!("expected operator clause, got {:?}", other),
        }
    }

    #[test]
    fn embedded_object_as_eq_value() {
        let filter = Where::from_json(&json!({ "address": { "city": "Austin" } })).unwrap();
        assert!(matches!(
            &filter.clauses()[0],
            Clause::Field(_, FieldCondition::Value(Value::Object(_)))
        ));
    }

    #[test]
    fn logical_and_fields_coexist() {
        let doc = json!({
            "status": "active",
            "$or": [{ "id": 10 }, { "somefield": "some value" }],
            "$not": { "deleted": true }
        });
        let filter = Where::from_json(&doc).unwrap();
        let keys: Vec<&str> = filter.clauses().iter().map(Clause::key).collect();
        assert_eq!(keys, ["status", "$or", "$not"]);
        assert_eq!(serde_json::to_value(&filter).unwrap(), doc);
    }

    #[test]
    fn dotted_paths_pass_through() {
        let filter = Where::new().equals("myChildren.myChildrenLevel2.somefield", "v");
        assert_eq!(
            serde_json::to_string(&filter).unwrap(),
            r#"{"myChildren.myChildrenLevel2.somefield":"v"}"#
        );
    }

    #[test]
    fn replacing_a_key_keeps_its_position() {
        let filter = Where::new().equals("a", 1).equals("b", 2).equals("a", 3);
        assert_eq!(serde_json::to_string(&filter).unwrap(), r#"{"a":3,"b":2}"#);
    }

    #[test]
    fn normalized_rewrites_nested_bare_values() {
        let filter = Where::new().not(Where::new().equals("id", 10));
        let expected = Where::new().not(Where::new().op("id", Operators::new().equals(10)));
        assert_eq!(filter.normalized(), expected);
    }

    #[test]
    fn dollar_object_values_stay_equality_values() {
        let filter = Where::new().equals("meta", json!({ "$gt": 1 }));
        let text = serde_json::to_string(&filter).unwrap();
        assert_eq!(text, r#"{"meta":{"$eq":{"$gt":1}}}"#);

        let back: Where = serde_json::from_str(&text).unwrap();
        assert_eq!(back.normalized(), filter.normalized());
        assert_eq!(serde_json::to_string(&back).unwrap(), text);

        // Objects without a leading `$` key are still written bare.
        let plain = Where::new().equals("meta", json!({ "a": 1, "$b": 2 }));
        assert_eq!(serde_json::to_string(&plain).unwrap(), r#"{"meta":{"a":1,"$b":2}}"#);
    }

    #[test]
    fn field_clause_never_replaces_logical_clause() {
        let filter = Where::new()
            .and([Where::new().equals("a", 1)])
            .field("$and", FieldCondition::value(1));
        let keys: Vec<&str> = filter.clauses().iter().map(Clause::key).collect();
        assert_eq!(keys, ["$and", "$and"]);
        assert!(matches!(filter.clauses()[0], Clause::And(_)));
    }

    #[test]
    fn check_rejects_dollar_field_paths() {
        let err = Where::new().equals("$foo", 1).check().unwrap_err();
        assert!(err.to_string().contains("must not start with `$`: $foo"), "{err}");

        let nested = Where::new().or([Where::new().equals("ok", 1), Where::new().equals("$and", 2)]);
        assert!(matches!(nested.check(), Err(QueryError::Shape(_))));

        Where::new().equals("a.$b", 1).check().unwrap();
    }

    #[test]
    fn deep_filters_are_rejected() {
        let mut doc = json!({ "id": 1 });
        for _ in 0..=MAX_NESTING_DEPTH {
            doc = json!({ "$not": doc });
        }
        let err = Where::from_json(&doc).unwrap_err();
        assert!(err.to_string().contains("deeper than"), "{err}");

        let mut filter = Where::new().equals("id", 1);
        for _ in 0..=MAX_NESTING_DEPTH {
            filter = Where::new().and([filter]);
        }
        assert!(filter.check().unwrap_err().to_string().contains("deeper than"));

        let mut shallow = Where::new().equals("id", 1);
        for _ in 0..MAX_NESTING_DEPTH {
            shallow = Where::new().not(shallow);
        }
        shallow.check().unwrap();
        Where::from_json(&serde_json::to_value(&shallow).unwrap()).unwrap();
    }

    #[test]
    fn unknown_logical_operator_errors() {
        let err = Where::from_json(&json!({ "$nor": [{ "a": 1 }] })).unwrap_err();
        assert!(err.to_string().contains("unknown logical operator"), "{err}");
    }

    #[test]
    fn non_object_filter_errors() {
        let err = Where::from_json(&json!([1, 2])).unwrap_err();
        assert!(matches!(err, QueryError::Shape(_)));
    }

    #[test]
    fn logical_array_must_hold_objects() {
        let err = Where::from_json(&json!({ "$and": [1] })).unwrap_err();
        assert!(err.to_string().contains("must be objects"), "{err}");

        let err = Where::from_json(&json!({ "$or": { "a": 1 } })).unwrap_err();
        assert!(err.to_string().contains("must be an array"), "{err}");

        let err = Where::from_json(&json!({ "$not": [] })).unwrap_err();
        assert!(err.to_string().contains("$not value must be an object"), "{err}");
    }

    #[test]
    fn deserialize_reports_shape_errors() {
        let err = serde_json::from_str::<Where>(r#"{"age":{"$gt":1,"$bogus":2}}"#).unwrap_err();
        assert!(err.to_string().contains("unknown field operator: $bogus"), "{err}");
    }
}
