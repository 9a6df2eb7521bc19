use serde_json::Number;

/// Primitive kinds a network-syncable field may carry. The declared kind is
/// authoritative: values arriving off the wire are coerced into it or dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    UInt8,
    UInt16,
    UInt32,
    Str,
    Bool,
}

impl FieldKind {
    pub fn is_numeric(self) -> bool {
        !matches!(self, FieldKind::Str | FieldKind::Bool)
    }

    /// Builds a typed value of this kind from a plain f64, saturating into the
    /// integer range where needed. `None` for non-numeric kinds and for
    /// non-finite inputs.
    pub fn value_from_f64(self, raw: f64) -> Option<Value> {
        if !raw.is_finite() {
            return None;
        }
        let value = match self {
            FieldKind::Float32 => Value::F32(raw as f32),
            FieldKind::Float64 => Value::F64(raw),
            FieldKind::Int8 => Value::I8(raw as i8),
            FieldKind::Int16 => Value::I16(raw as i16),
            FieldKind::Int32 => Value::I32(raw as i32),
            FieldKind::UInt8 => Value::U8(raw as u8),
            FieldKind::UInt16 => Value::U16(raw as u16),
            FieldKind::UInt32 => Value::U32(raw as u32),
            FieldKind::Str | FieldKind::Bool => return None,
        };
        Some(value)
    }
}

/// A single field value, typed per its declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    F32(f32),
    F64(f64),
    I8(i8),
    I16(i16),
    I32(i32),
    U8(u8),
    U16(u16),
    U32(u32),
    Str(String),
    Bool(bool),
}

impl Value {
    pub fn kind(&self) -> FieldKind {
        match self {
            Value::F32(_) => FieldKind::Float32,
            Value::F64(_) => FieldKind::Float64,
            Value::I8(_) => FieldKind::Int8,
            Value::I16(_) => FieldKind::Int16,
            Value::I32(_) => FieldKind::Int32,
            Value::U8(_) => FieldKind::UInt8,
            Value::U16(_) => FieldKind::UInt16,
            Value::U32(_) => FieldKind::UInt32,
            Value::Str(_) => FieldKind::Str,
            Value::Bool(_) => FieldKind::Bool,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::F32(v) => Some(*v as f64),
            Value::F64(v) => Some(*v),
            Value::I8(v) => Some(*v as f64),
            Value::I16(v) => Some(*v as f64),
            Value::I32(v) => Some(*v as f64),
            Value::U8(v) => Some(*v as f64),
            Value::U16(v) => Some(*v as f64),
            Value::U32(v) => Some(*v as f64),
            Value::Str(_) | Value::Bool(_) => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        self.as_f64().map(|v| v as f32)
    }

    pub fn as_i32(&self) -> Option<i32> {
        self.as_f64().map(|v| v as i32)
    }

    pub fn as_u32(&self) -> Option<u32> {
        self.as_f64().map(|v| v as u32)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::F32(v) => json_number(*v as f64),
            Value::F64(v) => json_number(*v),
            Value::I8(v) => serde_json::Value::from(*v),
            Value::I16(v) => serde_json::Value::from(*v),
            Value::I32(v) => serde_json::Value::from(*v),
            Value::U8(v) => serde_json::Value::from(*v),
            Value::U16(v) => serde_json::Value::from(*v),
            Value::U32(v) => serde_json::Value::from(*v),
            Value::Str(v) => serde_json::Value::from(v.as_str()),
            Value::Bool(v) => serde_json::Value::from(*v),
        }
    }

    /// Coerces a JSON value into the declared kind. `None` when the JSON value
    /// cannot represent the kind (wrong shape, non-finite number).
    pub fn from_json(kind: FieldKind, value: &serde_json::Value) -> Option<Value> {
        match kind {
            FieldKind::Str => value.as_str().map(|s| Value::Str(s.to_string())),
            FieldKind::Bool => value.as_bool().map(Value::Bool),
            _ => kind.value_from_f64(value.as_f64()?),
        }
    }
}

fn json_number(raw: f64) -> serde_json::Value {
    Number::from_f64(raw)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

/// The declared, ordered set of syncable fields of one entity type. This is
/// the single source of truth for what crosses the wire: snapshots contain
/// exactly these fields, and inbound snapshots are filtered against them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSet {
    fields: Vec<(&'static str, FieldKind)>,
}

impl FieldSet {
    pub fn builder() -> FieldSetBuilder {
        FieldSetBuilder { fields: Vec::new() }
    }

    pub fn kind_of(&self, name: &str) -> Option<FieldKind> {
        self.fields
            .iter()
            .find(|(field, _)| *field == name)
            .map(|(_, kind)| *kind)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.kind_of(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, FieldKind)> + '_ {
        self.fields.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Declaration-time builder. `extend` copies a parent set, so a subtype never
/// mutates the parent's map; a later `field` with the same name overrides the
/// inherited kind in place.
pub struct FieldSetBuilder {
    fields: Vec<(&'static str, FieldKind)>,
}

impl FieldSetBuilder {
    pub fn extend(mut self, parent: &FieldSet) -> Self {
        for (name, kind) in parent.iter() {
            self = self.field(name, kind);
        }
        self
    }

    pub fn field(mut self, name: &'static str, kind: FieldKind) -> Self {
        if let Some(existing) = self.fields.iter_mut().find(|(field, _)| *field == name) {
            existing.1 = kind;
        } else {
            self.fields.push((name, kind));
        }
        self
    }

    pub fn build(self) -> FieldSet {
        FieldSet {
            fields: self.fields,
        }
    }
}
