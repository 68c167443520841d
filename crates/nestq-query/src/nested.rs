use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::QueryError;
use crate::query::NestedQuery;

/// Deepest relation tree accepted by the decoder, serializer and parser.
pub const MAX_NESTING_DEPTH: usize = 32;

/// How one related entity is included.
#[derive(Debug, Clone, PartialEq)]
pub enum Relation {
    /// Include the relation with no further configuration (`true` on the wire).
    Include,
    Config(NestedConfig),
}

/// Scoping for one included relation: a sub-query over its rows and the
/// relations to include below it.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NestedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<NestedQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nested: Option<NestedNode>,
}

impl NestedConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn query(mut self, query: NestedQuery) -> Self {
        self.query = Some(query);
        self
    }

    pub fn nested(mut self, nested: NestedNode) -> Self {
        self.nested = Some(nested);
        self
    }

    fn from_json(value: &Value, depth: usize) -> Result<NestedConfig, QueryError> {
        let doc = match value {
            Value::Object(doc) => doc,
            _ => {
                return Err(QueryError::shape(
                    "relation must be `true` or an object with `query`/`nested`",
                ));
            }
        };

        let mut config = NestedConfig::new();
        for (key, value) in doc {
            match key.as_str() {
                // `null` reads as absent, as it does for the root request.
                "query" | "nested" if value.is_null() => {}
                "query" => {
                    let query = NestedQuery::deserialize(value)
                        .map_err(|e| QueryError::shape(format!("invalid relation query: {e}")))?;
                    config.query = Some(query);
                }
                "nested" => config.nested = Some(NestedNode::from_json_at(value, depth + 1)?),
                k => {
                    return Err(QueryError::shape(format!(
                        "unexpected key in relation config: {k}"
                    )));
                }
            }
        }
        Ok(config)
    }
}

/// The relations to include, in the order they were added.
///
/// Adding a relation under a name that is already present replaces it in
/// place.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NestedNode {
    relations: Vec<(String, Relation)>,
}

impl NestedNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, relation: Relation) {
        let name = name.into();
        match self.relations.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = relation,
            None => self.relations.push((name, relation)),
        }
    }

    pub fn include(mut self, name: impl Into<String>) -> Self {
        self.insert(name, Relation::Include);
        self
    }

    pub fn relation(mut self, name: impl Into<String>, config: NestedConfig) -> Self {
        self.insert(name, Relation::Config(config));
        self
    }

    pub fn get(&self, name: &str) -> Option<&Relation> {
        self.relations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, relation)| relation)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Relation)> {
        self.relations.iter().map(|(n, r)| (n.as_str(), r))
    }

    pub fn len(&self) -> usize {
        self.relations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relations.is_empty()
    }

    /// Decode the map form: each value is `true` or `{ "query"?, "nested"? }`.
    pub fn from_json(value: &Value) -> Result<NestedNode, QueryError> {
        NestedNode::from_json_at(value, 0)
    }

    fn from_json_at(value: &Value, depth: usize) -> Result<NestedNode, QueryError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(QueryError::shape(format!(
                "relation tree deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }
        let doc = match value {
            Value::Object(doc) => doc,
            _ => return Err(QueryError::shape("nested relations must be an object")),
        };

        let mut node = NestedNode::new();
        for (name, value) in doc {
            let relation = match value {
                Value::Bool(true) => Relation::Include,
                Value::Object(_) => Relation::Config(NestedConfig::from_json(value, depth)?),
                _ => {
                    return Err(QueryError::shape(format!(
                        "relation `{name}` must be `true` or an object with `query`/`nested`"
                    )));
                }
            };
            node.insert(name.clone(), relation);
        }
        Ok(node)
    }

    /// Check every relation name, at every level, against the entity's
    /// schema. Names that are not relations of the entity are rejected.
    pub fn validate(&self, schema: &RelationSchema) -> Result<(), QueryError> {
        for (name, relation) in self.iter() {
            let child = schema.get(name).ok_or_else(|| {
                QueryError::shape(format!("`{name}` is not a relation of this entity"))
            })?;
            if let Relation::Config(NestedConfig {
                nested: Some(nested),
                ..
            }) = relation
            {
                nested.validate(child)?;
            }
        }
        Ok(())
    }
}

impl TryFrom<&Value> for NestedNode {
    type Error = QueryError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        NestedNode::from_json(value)
    }
}

impl Serialize for Relation {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Relation::Include => serializer.serialize_bool(true),
            Relation::Config(config) => config.serialize(serializer),
        }
    }
}

impl Serialize for NestedNode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.relations.len()))?;
        for (name, relation) in &self.relations {
            map.serialize_entry(name, relation)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for NestedNode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        NestedNode::from_json(&value).map_err(D::Error::custom)
    }
}

/// Which fields of an entity are relations, and the schema of each related
/// entity.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelationSchema {
    relations: Vec<(String, RelationSchema)>,
}

impl RelationSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a relation. Declaring a name again replaces its schema in
    /// place.
    pub fn relation(mut self, name: impl Into<String>, schema: RelationSchema) -> Self {
        let name = name.into();
        match self.relations.iter_mut().find(|(n, _)| *n == name) {
            Some((_, existing)) => *existing = schema,
            None => self.relations.push((name, schema)),
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&RelationSchema> {
        self.relations
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, schema)| schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn master_schema() -> RelationSchema {
        let level2 = RelationSchema::new();
        let child = RelationSchema::new().relation("myChildrenLevel2", level2);
        RelationSchema::new().relation("myChildren", child)
    }

    #[test]
    fn decodes_sentinel_and_config() {
        let node = NestedNode::from_json(&json!({
            "myMaster": true,
            "myChildren": { "nested": { "myChildrenLevel2": true }, "query": { "limit": 3 } }
        }))
        .unwrap();

        let names: Vec<&str> = node.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["myMaster", "myChildren"]);
        assert_eq!(node.get("myMaster"), Some(&Relation::Include));
        match node.get("myChildren") {
            Some(Relation::Config(config)) => {
                assert_eq!(config.query.as_ref().and_then(|q| q.limit), Some(3));
                assert_eq!(config.nested.as_ref().map(NestedNode::len), Some(1));
            }
            other => panic!("expected config, got {:?}", other),
        }
    }

    #[test]
    fn rejects_false_and_scalars() {
        let err = NestedNode::from_json(&json!({ "myMaster": false })).unwrap_err();
        assert!(err.to_string().contains("must be `true`"), "{err}");

        let err = NestedNode::from_json(&json!({ "myMaster": 1 })).unwrap_err();
        assert!(matches!(err, QueryError::Shape(_)));

        let err = NestedNode::from_json(&json!(true)).unwrap_err();
        assert!(err.to_string().contains("must be an object"), "{err}");
    }

    #[test]
    fn null_query_and_nested_read_as_absent() {
        let node = NestedNode::from_json(&json!({
            "r": { "query": null, "nested": null },
            "s": { "query": null, "nested": { "t": true } }
        }))
        .unwrap();
        assert_eq!(node.get("r"), Some(&Relation::Config(NestedConfig::new())));
        assert_eq!(
            node.get("s"),
            Some(&Relation::Config(NestedConfig::new().nested(NestedNode::new().include("t"))))
        );
    }

    #[test]
    fn rejects_unexpected_config_keys() {
        let err = NestedNode::from_json(&json!({ "myMaster": { "where": {} } })).unwrap_err();
        assert!(
            err.to_string().contains("unexpected key in relation config: where"),
            "{err}"
        );
    }

    #[test]
    fn rejects_invalid_relation_query() {
        let err = NestedNode::from_json(&json!({
            "myMaster": { "query": { "where": { "id": { "$between": 1 } } } }
        }))
        .unwrap_err();
        assert!(err.to_string().contains("invalid relation query"), "{err}");
    }

    #[test]
    fn rejects_trees_past_depth_limit() {
        let mut relation = json!(true);
        for _ in 0..=MAX_NESTING_DEPTH {
            relation = json!({ "nested": { "r": relation } });
        }
        let err = NestedNode::from_json(&json!({ "r": relation })).unwrap_err();
        assert!(err.to_string().contains("deeper than"), "{err}");
    }

    #[test]
    fn reinsert_replaces_in_place() {
        let node = NestedNode::new()
            .include("a")
            .include("b")
            .relation("a", NestedConfig::new().query(NestedQuery::default()));
        let names: Vec<&str> = node.iter().map(|(n, _)| n).collect();
        assert_eq!(names, ["a", "b"]);
        assert!(matches!(node.get("a"), Some(Relation::Config(_))));
    }

    #[test]
    fn encodes_wire_shape() {
        let node = NestedNode::new()
            .include("myMaster")
            .relation("myChildren", NestedConfig::new());
        assert_eq!(
            serde_json::to_string(&node).unwrap(),
            r#"{"myMaster":true,"myChildren":{}}"#
        );
    }

    #[test]
    fn validate_accepts_known_relations() {
        let node = NestedNode::new().relation(
            "myChildren",
            NestedConfig::new().nested(NestedNode::new().include("myChildrenLevel2")),
        );
        node.validate(&master_schema()).unwrap();
    }

    #[test]
    fn redeclared_schema_relation_replaces_in_place() {
        let schema = RelationSchema::new()
            .relation("myChildren", RelationSchema::new())
            .relation("myMaster", RelationSchema::new())
            .relation("myChildren", master_schema());
        assert_eq!(schema.relations.len(), 2);
        assert_eq!(schema.relations[0].0, "myChildren");
        assert_eq!(schema.get("myChildren"), Some(&master_schema()));

        let node = NestedNode::new().relation(
            "myChildren",
            NestedConfig::new().nested(NestedNode::new().include("myChildren")),
        );
        node.validate(&schema).unwrap();
    }

    #[test]
    fn validate_rejects_non_relation_names() {
        let node = NestedNode::new().include("somefield");
        let err = node.validate(&master_schema()).unwrap_err();
        assert!(err.to_string().contains("`somefield` is not a relation"), "{err}");

        let node = NestedNode::new().relation(
            "myChildren",
            NestedConfig::new().nested(NestedNode::new().include("myMaster")),
        );
        let err = node.validate(&master_schema()).unwrap_err();
        assert!(err.to_string().contains("`myMaster`"), "{err}");
    }
}
