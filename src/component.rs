// Copyright 2024 Saptak Santra
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Component type ids, schemas, and field values.
//!
//! Component types are registered up front with a fixed schema: an ordered
//! list of named scalar fields. Storage stays columnar and typed because the
//! schema never changes after registration; "extending" a component at
//! runtime means registering a new component type.

use serde::Serialize;
use smallvec::SmallVec;

use crate::error::{EcsError, Result};

/// Process-local component type identifier, assigned by the caller at
/// registration and stable for the world's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ComponentTypeId(pub u32);

/// Scalar kind of a schema field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum FieldKind {
    F32,
    I32,
    U32,
    U8,
    Bool,
    /// Small string payload
    Str,
    /// Opaque 64-bit reference (entity bits, external resource id, ...)
    Ref,
}

/// One named field of a component schema
#[derive(Debug, Clone, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
}

/// Fixed, ordered field layout of one component type
#[derive(Debug, Clone, Serialize)]
pub struct Schema {
    name: String,
    fields: Vec<FieldDescriptor>,
}

impl Schema {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
        }
    }

    /// Append a field; declaration order is the column layout order
    pub fn with(mut self, name: impl Into<String>, kind: FieldKind) -> Self {
        self.fields.push(FieldDescriptor {
            name: name.into(),
            kind,
        });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Position of a field by name
    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.fields
            .iter()
            .position(|f| f.name == name)
            .ok_or_else(|| EcsError::SchemaMismatch(format!("unknown field `{name}`")))
    }
}

/// A dynamically typed field value matching one [`FieldKind`]
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    F32(f32),
    I32(i32),
    U32(u32),
    U8(u8),
    Bool(bool),
    Str(String),
    Ref(u64),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::F32(_) => FieldKind::F32,
            FieldValue::I32(_) => FieldKind::I32,
            FieldValue::U32(_) => FieldKind::U32,
            FieldValue::U8(_) => FieldKind::U8,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Str(_) => FieldKind::Str,
            FieldValue::Ref(_) => FieldKind::Ref,
        }
    }

    /// Zero/default value of a kind; removal clears dense slots to this
    pub fn default_of(kind: FieldKind) -> FieldValue {
        match kind {
            FieldKind::F32 => FieldValue::F32(0.0),
            FieldKind::I32 => FieldValue::I32(0),
            FieldKind::U32 => FieldValue::U32(0),
            FieldKind::U8 => FieldValue::U8(0),
            FieldKind::Bool => FieldValue::Bool(false),
            FieldKind::Str => FieldValue::Str(String::new()),
            FieldKind::Ref => FieldValue::Ref(0),
        }
    }
}

macro_rules! impl_from_value {
    ($($variant:ident: $ty:ty),*) => {
        $(
            impl From<$ty> for FieldValue {
                fn from(v: $ty) -> Self {
                    FieldValue::$variant(v)
                }
            }
        )*
    };
}

impl_from_value!(F32: f32, I32: i32, U32: u32, U8: u8, Bool: bool, Str: String, Ref: u64);

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Str(v.to_string())
    }
}

/// Write-side value bag handed to `add_component`. Fields omitted here take
/// their kind's default; fields not in the schema are a mismatch.
#[derive(Debug, Clone, Default)]
pub struct ComponentData {
    values: SmallVec<[(String, FieldValue); 8]>,
}

impl ComponentData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value; last write wins on repeated names
    pub fn set(mut self, name: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let name = name.into();
        let value = value.into();
        if let Some(entry) = self.values.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.values.push((name, value));
        }
        self
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.values
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// Check every value against the schema: names must exist, kinds must
    /// match exactly. Silent coercion is not part of the contract.
    pub fn validate(&self, schema: &Schema) -> Result<()> {
        for (name, value) in self.iter() {
            let idx = schema.field_index(name)?;
            let expected = schema.fields()[idx].kind;
            if value.kind() != expected {
                return Err(EcsError::SchemaMismatch(format!(
                    "field `{name}` expects {:?}, got {:?}",
                    expected,
                    value.kind()
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transform_schema() -> Schema {
        Schema::new("Transform")
            .with("pos_x", FieldKind::F32)
            .with("pos_y", FieldKind::F32)
            .with("tag", FieldKind::Str)
    }

    #[test]
    fn test_field_index() {
        let schema = transform_schema();
        assert_eq!(schema.field_index("pos_y").unwrap(), 1);
        assert!(schema.field_index("nope").is_err());
    }

    #[test]
    fn test_validate_ok() {
        let schema = transform_schema();
        let data = ComponentData::new()
            .set("pos_x", 1.0f32)
            .set("tag", "player");
        assert!(data.validate(&schema).is_ok());
    }

    #[test]
    fn test_validate_rejects_kind_mismatch() {
        let schema = transform_schema();
        let data = ComponentData::new().set("pos_x", 1i32);
        assert!(matches!(
            data.validate(&schema),
            Err(EcsError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_validate_rejects_unknown_field() {
        let schema = transform_schema();
        let data = ComponentData::new().set("vel_x", 1.0f32);
        assert!(data.validate(&schema).is_err());
    }

    #[test]
    fn test_last_write_wins() {
        let data = ComponentData::new().set("x", 1.0f32).set("x", 2.0f32);
        assert_eq!(data.get("x"), Some(&FieldValue::F32(2.0)));
    }

    #[test]
    fn test_default_of_matches_kind() {
        for kind in [
            FieldKind::F32,
            FieldKind::I32,
            FieldKind::U32,
            FieldKind::U8,
            FieldKind::Bool,
            FieldKind::Str,
            FieldKind::Ref,
        ] {
            assert_eq!(FieldValue::default_of(kind).kind(), kind);
        }
    }
}
