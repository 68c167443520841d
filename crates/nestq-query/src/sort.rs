use serde::de::Error as _;
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

/// Ordered `field -> asc|desc` mapping, encoded as `{"name":"asc","id":"desc"}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SortSpec(Vec<Sort>);

impl SortSpec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn asc(self, field: impl Into<String>) -> Self {
        self.by(field, SortDirection::Asc)
    }

    pub fn desc(self, field: impl Into<String>) -> Self {
        self.by(field, SortDirection::Desc)
    }

    /// Re-sorting on a field already present changes its direction in place.
    pub fn by(mut self, field: impl Into<String>, direction: SortDirection) -> Self {
        let field = field.into();
        match self.0.iter_mut().find(|s| s.field == field) {
            Some(existing) => existing.direction = direction,
            None => self.0.push(Sort { field, direction }),
        }
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sort> {
        self.0.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<Sort> for SortSpec {
    fn from_iter<I: IntoIterator<Item = Sort>>(iter: I) -> Self {
        iter.into_iter()
            .fold(SortSpec::new(), |spec, s| spec.by(s.field, s.direction))
    }
}

impl Serialize for SortSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for sort in &self.0 {
            map.serialize_entry(&sort.field, &sort.direction)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for SortSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let doc = serde_json::Map::<String, Value>::deserialize(deserializer)?;
        doc.into_iter()
            .map(|(field, direction)| {
                SortDirection::deserialize(direction)
                    .map(|direction| Sort { field, direction })
                    .map_err(D::Error::custom)
            })
            .collect()
    }
}
