use crate::ast::DataType;
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fs;

fn full_confidence() -> f64 {
    1.0
}

/// One extracted field value with its extraction confidence.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(from = "FieldValueRepr")]
pub struct FieldValue {
    pub value: serde_json::Value,
    /// Overrides the type declared in the field catalog when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_type: Option<DataType>,
    pub confidence: f64,
}

/// Fields may be written in full or as a bare JSON value.
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldValueRepr {
    Full {
        value: serde_json::Value,
        #[serde(default)]
        data_type: Option<DataType>,
        #[serde(default = "full_confidence")]
        confidence: f64,
    },
    Bare(serde_json::Value),
}

impl From<FieldValueRepr> for FieldValue {
    fn from(repr: FieldValueRepr) -> Self {
        match repr {
            FieldValueRepr::Full {
                value,
                data_type,
                confidence,
            } => FieldValue {
                value,
                data_type,
                confidence,
            },
            FieldValueRepr::Bare(value) => FieldValue {
                value,
                data_type: None,
                confidence: 1.0,
            },
        }
    }
}

/// The extracted fields of one document, keyed by field id or field name.
#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DocumentData {
    #[serde(default)]
    pub fields: AHashMap<String, FieldValue>,
}

impl DocumentData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load document data from a JSON file.
    pub fn from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = fs::read_to_string(path)?;
        Ok(Self::from_json(&content)?)
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Adds a field read as the type its catalog entry declares.
    pub fn with_field(self, key: impl Into<String>, value: serde_json::Value, confidence: f64) -> Self {
        self.insert(key, value, None, confidence)
    }

    /// Adds a field read as `data_type`, whatever the catalog declares.
    pub fn with_typed_field(
        self,
        key: impl Into<String>,
        value: serde_json::Value,
        data_type: DataType,
        confidence: f64,
    ) -> Self {
        self.insert(key, value, Some(data_type), confidence)
    }

    fn insert(
        mut self,
        key: impl Into<String>,
        value: serde_json::Value,
        data_type: Option<DataType>,
        confidence: f64,
    ) -> Self {
        self.fields.insert(
            key.into(),
            FieldValue {
                value,
                data_type,
                confidence,
            },
        );
        self
    }

    /// Looks a field up by id first, then by name.
    pub fn get(&self, id: &str, name: &str) -> Option<&FieldValue> {
        self.fields.get(id).or_else(|| self.fields.get(name))
    }
}
