//! The compact relation grammar used by the `nested` parameter.
//!
//! ```text
//! node          := NAME [ "{" part ("," part)? "}" ]
//! part          := query_text | children_text
//! children_text := node ("," node)*
//! ```
//!
//! `query_text` is the JSON encoding of a [`NestedQuery`]. NAME may not
//! contain `{`, `}` or `,`.

use crate::error::QueryError;
use crate::nested::{MAX_NESTING_DEPTH, NestedConfig, NestedNode, Relation};
use crate::query::NestedQuery;

const RESERVED: [char; 3] = ['{', '}', ','];

/// Serialize a relation tree, depth-first, keeping insertion order.
///
/// An empty node yields an empty string. A relation whose config has neither
/// a query nor nested relations is emitted as its bare name. A query that is
/// present but empty still emits its (`{}`) part.
pub fn build_nested_string(node: &NestedNode) -> Result<String, QueryError> {
    serialize_children(node, 0)
}

fn serialize_children(node: &NestedNode, depth: usize) -> Result<String, QueryError> {
    if depth > MAX_NESTING_DEPTH {
        return Err(QueryError::shape(format!(
            "relation tree deeper than {MAX_NESTING_DEPTH} levels"
        )));
    }
    let emitted = node
        .iter()
        .map(|(name, relation)| serialize_relation(name, relation, depth))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(emitted.join(","))
}

fn serialize_relation(name: &str, relation: &Relation, depth: usize) -> Result<String, QueryError> {
    check_relation_name(name)?;

    let config = match relation {
        Relation::Include => return Ok(name.to_string()),
        Relation::Config(config) => config,
    };

    let mut parts = Vec::with_capacity(2);
    if let Some(query) = &config.query {
        if let Some(filter) = &query.filter {
            filter.check()?;
        }
        parts.push(serde_json::to_string(query)?);
    }
    if let Some(nested) = &config.nested {
        parts.push(serialize_children(nested, depth + 1)?);
    }

    tracing::trace!(relation = name, parts = parts.len(), "serialized relation");

    if parts.is_empty() {
        return Ok(name.to_string());
    }
    Ok(format!("{name}{{{}}}", parts.join(",")))
}

fn check_relation_name(name: &str) -> Result<(), QueryError> {
    if name.is_empty() {
        return Err(QueryError::shape("relation name must not be empty"));
    }
    if name.contains(RESERVED) {
        return Err(QueryError::shape(format!(
            "relation name `{name}` contains a reserved character ({{, }} or ,)"
        )));
    }
    Ok(())
}

/// Parse a relation grammar string back into a tree.
///
/// `build_nested_string(&parse_nested_string(s)?)` reproduces `s` for any
/// string produced by [`build_nested_string`].
pub fn parse_nested_string(input: &str) -> Result<NestedNode, QueryError> {
    let mut parser = Parser { input, pos: 0 };
    let node = parser.children(0)?;
    if parser.pos < input.len() {
        return Err(QueryError::parse(parser.pos, "unexpected `}`"));
    }
    Ok(node)
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<u8> {
        self.input.as_bytes().get(self.pos).copied()
    }

    /// `children_text`, stopping before a closing brace or at end of input.
    /// An empty list is allowed only when nothing precedes the stop.
    fn children(&mut self, depth: usize) -> Result<NestedNode, QueryError> {
        if depth > MAX_NESTING_DEPTH {
            return Err(QueryError::shape(format!(
                "relation tree deeper than {MAX_NESTING_DEPTH} levels"
            )));
        }

        let mut node = NestedNode::new();
        if matches!(self.peek(), None | Some(b'}')) {
            return Ok(node);
        }

        loop {
            let (name, relation) = self.relation(depth)?;
            node.insert(name, relation);
            match self.peek() {
                Some(b',') => self.pos += 1,
                None | Some(b'}') => return Ok(node),
                Some(_) => return Err(QueryError::parse(self.pos, "expected `,` or `}`")),
            }
        }
    }

    fn relation(&mut self, depth: usize) -> Result<(String, Relation), QueryError> {
        let start = self.pos;
        let len = self.input[start..]
            .find(RESERVED)
            .unwrap_or(self.input.len() - start);
        if len == 0 {
            return Err(QueryError::parse(start, "expected a relation name"));
        }
        self.pos += len;
        let name = self.input[start..self.pos].to_string();

        if self.peek() != Some(b'{') {
            return Ok((name, Relation::Include));
        }
        self.pos += 1;

        let mut config = NestedConfig::new();
        if self.peek() == Some(b'{') {
            config.query = Some(self.query()?);
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    config.nested = Some(self.children(depth + 1)?);
                }
                Some(b'}') => {}
                _ => return Err(QueryError::parse(self.pos, "expected `,` or `}` after query")),
            }
        } else {
            config.nested = Some(self.children(depth + 1)?);
        }

        if self.peek() != Some(b'}') {
            return Err(QueryError::parse(self.pos, format!("unclosed `{{` after `{name}`")));
        }
        self.pos += 1;
        Ok((name, Relation::Config(config)))
    }

    /// A balanced JSON object starting at the current position. Braces inside
    /// JSON strings are skipped.
    fn query(&mut self) -> Result<NestedQuery, QueryError> {
        let start = self.pos;
        let bytes = self.input.as_bytes();
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut end = None;

        for (offset, &b) in bytes[start..].iter().enumerate() {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth -= 1;
                    if depth == 0 {
                        end = Some(start + offset + 1);
                        break;
                    }
                }
                _ => {}
            }
        }

        let end = end.ok_or_else(|| QueryError::parse(start, "unterminated query object"))?;
        let query = serde_json::from_str(&self.input[start..end])
            .map_err(|e| QueryError::parse(start, format!("invalid query: {e}")))?;
        self.pos = end;
        Ok(query)
    }
}
