//! External field and constant catalogs, as seen by the compiler and evaluator.
//!
//! Both catalogs are owned by collaborators outside this crate. They are
//! referenced, never mutated, during compilation and evaluation.

use crate::ast::{DataType, Value};
use crate::graph::ConstantScope;
use ahash::AHashMap;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use tracing::warn;

/// Accepts ids written either as JSON strings or numbers.
fn deserialize_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected a string or numeric id, found {}",
            other
        ))),
    }
}

/// An extractable document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub data_type: DataType,
}

/// Maps field ids to their definitions.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: IndexMap<String, FieldDefinition>,
}

impl FieldCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a catalog from a JSON array of field definitions.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let fields: Vec<FieldDefinition> = serde_json::from_str(json)?;
        Ok(fields.into_iter().collect())
    }

    pub fn with_field(mut self, id: impl Into<String>, name: impl Into<String>, data_type: DataType) -> Self {
        self.insert(FieldDefinition {
            id: id.into(),
            name: name.into(),
            data_type,
        });
        self
    }

    pub fn insert(&mut self, field: FieldDefinition) {
        self.fields.insert(field.id.clone(), field);
    }

    pub fn get(&self, id: &str) -> Option<&FieldDefinition> {
        self.fields.get(id)
    }

    pub fn by_name(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.values().find(|f| f.name == name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<FieldDefinition> for FieldCatalog {
    fn from_iter<T: IntoIterator<Item = FieldDefinition>>(iter: T) -> Self {
        let mut catalog = FieldCatalog::new();
        for field in iter {
            catalog.insert(field);
        }
        catalog
    }
}

/// A named constant with its literal value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantDefinition {
    #[serde(deserialize_with = "deserialize_id")]
    pub id: String,
    pub name: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub data_type: DataType,
}

impl ConstantDefinition {
    /// The constant's value read as its declared type, falling back to the
    /// literal's own shape when the declaration does not fit.
    pub fn typed_value(&self) -> Option<Value> {
        Value::coerce(&self.name, &self.value, self.data_type)
            .ok()
            .or_else(|| Value::from_literal(&self.value))
    }
}

#[derive(Deserialize, Default)]
struct ConstantCatalogFile {
    #[serde(default)]
    global: Vec<ConstantDefinition>,
    #[serde(default)]
    local: Vec<ConstantDefinition>,
}

/// The global (shared) and local (query-scoped) constant catalogs.
#[derive(Debug, Clone, Default)]
pub struct ConstantCatalog {
    global: IndexMap<String, ConstantDefinition>,
    local: IndexMap<String, ConstantDefinition>,
}

impl ConstantCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a catalog from `{ "global": [...], "local": [...] }`.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let file: ConstantCatalogFile = serde_json::from_str(json)?;
        let mut catalog = ConstantCatalog::new();
        for constant in file.global {
            catalog.insert(ConstantScope::Global, constant);
        }
        for constant in file.local {
            catalog.insert(ConstantScope::Local, constant);
        }
        Ok(catalog)
    }

    pub fn with_constant(
        mut self,
        scope: ConstantScope,
        id: impl Into<String>,
        name: impl Into<String>,
        value: serde_json::Value,
    ) -> Self {
        let value_type = match &value {
            serde_json::Value::Bool(_) => DataType::Boolean,
            serde_json::Value::String(_) => DataType::Text,
            _ => DataType::Number,
        };
        self.insert(
            scope,
            ConstantDefinition {
                id: id.into(),
                name: name.into(),
                value,
                data_type: value_type,
            },
        );
        self
    }

    pub fn insert(&mut self, scope: ConstantScope, constant: ConstantDefinition) {
        let table = match scope {
            ConstantScope::Global => &mut self.global,
            ConstantScope::Local => &mut self.local,
        };
        table.insert(constant.id.clone(), constant);
    }

    /// Finds a constant by id. Query-scoped constants shadow global ones.
    pub fn find(&self, id: &str) -> Option<(ConstantScope, &ConstantDefinition)> {
        self.local
            .get(id)
            .map(|c| (ConstantScope::Local, c))
            .or_else(|| self.global.get(id).map(|c| (ConstantScope::Global, c)))
    }

    /// Finds a constant by name. Query-scoped constants shadow global ones.
    pub fn find_by_name(&self, name: &str) -> Option<(ConstantScope, &ConstantDefinition)> {
        self.local
            .values()
            .find(|c| c.name == name)
            .map(|c| (ConstantScope::Local, c))
            .or_else(|| {
                self.global
                    .values()
                    .find(|c| c.name == name)
                    .map(|c| (ConstantScope::Global, c))
            })
    }

    /// Every constant's typed value by name, as the evaluator consumes them.
    pub fn values(&self) -> AHashMap<String, Value> {
        let mut values = AHashMap::new();
        // Local entries are inserted last so they shadow globals of the same name.
        for constant in self.global.values().chain(self.local.values()) {
            match constant.typed_value() {
                Some(value) => {
                    values.insert(constant.name.clone(), value);
                }
                None => warn!(constant = %constant.name, "constant has no usable value"),
            }
        }
        values
    }
}
