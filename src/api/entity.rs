use std::any::{Any, TypeId};

use crate::api::fields::{FieldSet, Value};

pub type EntityId = u64;

/// Field values of one entity at a moment in time, as they travel on the wire.
pub type FieldMap = serde_json::Map<String, serde_json::Value>;

/// Bookkeeping every world object carries: a room-stable id and the bot
/// marker. Ids are assigned by the room on spawn; zero means "not spawned".
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityMeta {
    pub id: EntityId,
    pub bot: bool,
}

/// Static field schema plus dynamic access to the declared fields.
///
/// Composition stands in for subtyping: a type embedding another forwards
/// unknown field names to the embedded value and reports both type ids from
/// `is_kind`, which is what makes `EntityCollection::of_type` see subtypes.
pub trait Schematic {
    /// The declared field set, recoverable without an instance.
    fn field_set() -> &'static FieldSet
    where
        Self: Sized;

    /// Stable name of the concrete type, used in checkpoints.
    fn kind_name() -> &'static str
    where
        Self: Sized;

    fn fields(&self) -> &'static FieldSet;
    fn kind(&self) -> &'static str;
    fn get_field(&self, name: &str) -> Option<Value>;
    /// Returns false when the name is unknown or the value shape is wrong.
    fn set_field(&mut self, name: &str, value: Value) -> bool;
    fn is_kind(&self, type_id: TypeId) -> bool;
}

/// A world object. Games implement this for each entity type; the runtime
/// only ever sees `Box<dyn Entity>`.
pub trait Entity: Schematic + Any + Send {
    fn meta(&self) -> &EntityMeta;
    fn meta_mut(&mut self) -> &mut EntityMeta;

    /// Per-entity input hook, entity-first in the delivery order. The payload
    /// is opaque to the runtime.
    fn on_input(&mut self, input: &serde_json::Value) {
        let _ = input;
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;

    fn id(&self) -> EntityId {
        self.meta().id
    }

    fn is_bot(&self) -> bool {
        self.meta().bot
    }

    /// Produces `{id} ∪ {field → value}` over the declared fields, in
    /// declaration order. Non-schema attributes never appear.
    fn snapshot(&self) -> EntityRecord {
        let mut values = FieldMap::new();
        for (name, _) in self.fields().iter() {
            if let Some(value) = self.get_field(name) {
                values.insert(name.to_string(), value.to_json());
            }
        }
        EntityRecord {
            id: self.id(),
            values,
        }
    }

    /// Overwrites exactly the fields present in the record; unknown keys and
    /// values that do not fit the declared kind are ignored.
    fn apply_snapshot(&mut self, record: &EntityRecord) {
        for (name, json) in &record.values {
            let Some(kind) = self.fields().kind_of(name) else {
                continue;
            };
            if let Some(value) = Value::from_json(kind, json) {
                self.set_field(name, value);
            }
        }
    }
}

/// One entity's snapshot as serialized into wire messages and checkpoints.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub values: FieldMap,
}

impl EntityRecord {
    pub fn to_json(&self) -> serde_json::Value {
        let mut object = FieldMap::new();
        object.insert("id".to_string(), serde_json::Value::from(self.id));
        for (name, value) in &self.values {
            object.insert(name.clone(), value.clone());
        }
        serde_json::Value::Object(object)
    }

    pub fn from_json(value: &serde_json::Value) -> Option<EntityRecord> {
        let object = value.as_object()?;
        let id = object.get("id")?.as_u64()?;
        let mut values = FieldMap::new();
        for (name, field) in object {
            if name != "id" {
                values.insert(name.clone(), field.clone());
            }
        }
        Some(EntityRecord { id, values })
    }
}
