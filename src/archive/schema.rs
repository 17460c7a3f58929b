use serde::ser::{Serialize, SerializeMap, Serializer};

/// One file supplied with a command invocation (not the bytes themselves).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentDescriptor {
    pub filename: String,
    pub size: u64,
    pub url: String,
}

impl AttachmentDescriptor {
    pub fn new(filename: impl Into<String>, size: u64, url: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            size,
            url: url.into(),
        }
    }
}

/// A single `/upload` call as delivered by the chat layer.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub attachments: Vec<AttachmentDescriptor>,
    pub user_name: String,
    pub custom_metadata: Option<String>,
}

/// Value side of a metadata entry: a scalar, or a list once a key repeats.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetadataValue {
    Single(String),
    Many(Vec<String>),
}

impl MetadataValue {
    pub fn as_single(&self) -> Option<&str> {
        match self {
            MetadataValue::Single(v) => Some(v),
            MetadataValue::Many(_) => None,
        }
    }

    fn push(&mut self, value: String) {
        match self {
            MetadataValue::Single(existing) => {
                let first = std::mem::take(existing);
                *self = MetadataValue::Many(vec![first, value]);
            }
            MetadataValue::Many(vs) => vs.push(value),
        }
    }
}

impl std::fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MetadataValue::Single(v) => write!(f, "{v}"),
            MetadataValue::Many(vs) => write!(f, "[{}]", vs.join(", ")),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(value: &str) -> Self {
        MetadataValue::Single(value.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(value: String) -> Self {
        MetadataValue::Single(value)
    }
}

impl Serialize for MetadataValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetadataValue::Single(v) => serializer.serialize_str(v),
            MetadataValue::Many(vs) => vs.serialize(serializer),
        }
    }
}

/// Insertion-ordered metadata map with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataRecord {
    entries: Vec<(String, MetadataValue)>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace. A replaced key keeps its position.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<MetadataValue>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Insert, or extend an existing key into a list.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => slot.push(value),
            None => self.entries.push((key, MetadataValue::Single(value))),
        }
    }

    /// Overlay every entry of `other` onto this record.
    pub fn merge(&mut self, other: MetadataRecord) {
        for (key, value) in other.entries {
            self.set(key, value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for MetadataRecord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (key, value) in &self.entries {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
