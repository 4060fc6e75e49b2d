//! Schema module: the field registry consulted while parsing filters.
//!
//! A [`FilterSchema`] maps dotted field names to [`FieldDescriptor`]s. It is
//! built once from dissector registration data, then shared read-only; a
//! process-wide instance can be installed with [`FilterSchema::install_global`].

use crate::expr::ComparisonOp;
use crate::types::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::OnceLock;

/// Unique identifier for a field in the schema.
pub type FieldId = usize;

static GLOBAL_SCHEMA: OnceLock<FilterSchema> = OnceLock::new();

/// Symbolic name of one value of an enumerated integer field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValueName {
    pub value: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub ftype: FieldType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub value_names: Vec<ValueName>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, ftype: FieldType) -> Self {
        Self {
            name: name.into(),
            ftype,
            value_names: Vec::new(),
        }
    }

    pub fn with_value_names<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        self.value_names = names
            .into_iter()
            .map(|(value, name)| ValueName { value, name: name.into() })
            .collect();
        self
    }

    /// Value of a symbolic name; exact matches win over case-insensitive ones.
    pub fn value_for_name(&self, name: &str) -> Option<i64> {
        self.value_names
            .iter()
            .find(|v| v.name == name)
            .or_else(|| self.value_names.iter().find(|v| v.name.eq_ignore_ascii_case(name)))
            .map(|v| v.value)
    }

    pub fn supports(&self, op: ComparisonOp) -> bool {
        self.ftype.supports(op)
    }

    /// Comparison operators allowed on this field.
    pub fn allowed_ops(&self) -> Vec<ComparisonOp> {
        ComparisonOp::ALL
            .iter()
            .copied()
            .filter(|op| self.supports(*op))
            .collect()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[non_exhaustive]
pub struct FilterSchema {
    fields: HashMap<String, FieldDescriptor>,
    field_names: Vec<String>,          // index = FieldId
    field_ids: HashMap<String, usize>, // name -> id
}

impl FilterSchema {
    pub fn lookup(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.get(name)
    }
    pub fn get_field_type(&self, name: &str) -> Option<FieldType> {
        self.fields.get(name).map(|d| d.ftype)
    }
    pub fn fields(&self) -> &HashMap<String, FieldDescriptor> {
        &self.fields
    }
    /// Get the field ID for a given field name, if it exists.
    pub fn field_id(&self, name: &str) -> Option<FieldId> {
        self.field_ids.get(name).copied()
    }
    /// Get the field name for a given field ID, if it exists.
    pub fn field_name(&self, id: FieldId) -> Option<&str> {
        self.field_names.get(id).map(|s| s.as_str())
    }
    /// Get the total number of fields.
    pub fn num_fields(&self) -> usize {
        self.field_names.len()
    }

    /// Installs the process-wide registry. Only the first call wins; later
    /// calls hand their schema back.
    pub fn install_global(schema: FilterSchema) -> Result<&'static FilterSchema, FilterSchema> {
        let mut candidate = Some(schema);
        let installed = GLOBAL_SCHEMA.get_or_init(|| candidate.take().unwrap_or_default());
        match candidate {
            Some(rejected) => Err(rejected),
            None => Ok(installed),
        }
    }

    pub fn global() -> Option<&'static FilterSchema> {
        GLOBAL_SCHEMA.get()
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct FilterSchemaBuilder {
    fields: HashMap<String, FieldDescriptor>,
}

impl FilterSchemaBuilder {
    pub fn new() -> Self {
        Self { fields: HashMap::new() }
    }
    pub fn field(self, name: impl Into<String>, ty: FieldType) -> Self {
        self.descriptor(FieldDescriptor::new(name, ty))
    }
    pub fn descriptor(mut self, descriptor: FieldDescriptor) -> Self {
        self.fields.insert(descriptor.name.clone(), descriptor);
        self
    }
    pub fn build(self) -> FilterSchema {
        let mut field_names = Vec::new();
        let mut field_ids = HashMap::new();
        let mut sorted_names: Vec<_> = self.fields.keys().cloned().collect();
        sorted_names.sort();
        for name in sorted_names {
            field_ids.insert(name.clone(), field_names.len());
            field_names.push(name);
        }
        FilterSchema {
            fields: self.fields,
            field_names,
            field_ids,
        }
    }
}
