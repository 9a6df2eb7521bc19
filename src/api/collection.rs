use std::any::TypeId;
use std::collections::BTreeMap;

use crate::api::entity::{Entity, EntityId};

/// The in-memory world of one room. Keyed by entity id; iteration order is
/// ascending id, which is also the nearest-neighbor tie-break.
#[derive(Default)]
pub struct EntityCollection {
    entities: BTreeMap<EntityId, Box<dyn Entity>>,
}

impl EntityCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entity: Box<dyn Entity>) {
        self.entities.insert(entity.id(), entity);
    }

    pub fn remove(&mut self, id: EntityId) -> Option<Box<dyn Entity>> {
        self.entities.remove(&id)
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.entities.contains_key(&id)
    }

    pub fn get(&self, id: EntityId) -> Option<&dyn Entity> {
        self.entities.get(&id).map(|e| e.as_ref())
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut dyn Entity> {
        self.entities.get_mut(&id).map(|e| e.as_mut())
    }

    /// Typed view of one entity, by concrete type only.
    pub fn get_as<T: Entity>(&self, id: EntityId) -> Option<&T> {
        self.get(id)?.as_any().downcast_ref::<T>()
    }

    pub fn get_as_mut<T: Entity>(&mut self, id: EntityId) -> Option<&mut T> {
        self.get_mut(id)?.as_any_mut().downcast_mut::<T>()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn all(&self) -> impl Iterator<Item = &dyn Entity> {
        self.entities.values().map(|e| e.as_ref())
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut dyn Entity> {
        self.entities.values_mut().map(|e| e.as_mut())
    }

    /// Entities whose type is `T` or embeds `T` (per `Schematic::is_kind`).
    pub fn of_type<T: Entity>(&self) -> impl Iterator<Item = &dyn Entity> {
        let target = TypeId::of::<T>();
        self.all().filter(move |e| e.is_kind(target))
    }

    pub fn count_of<T: Entity>(&self) -> usize {
        self.of_type::<T>().count()
    }

    /// Closest `T` (or subtype) to `origin` by euclidean distance on the
    /// `x`/`y` fields. Candidates missing either field are skipped, not
    /// treated as sitting at zero. Ties resolve to the lower id.
    pub fn nearest<T: Entity>(&self, origin: (f64, f64)) -> Option<&dyn Entity> {
        self.nearest_where::<T>(origin, |_| true)
    }

    pub fn nearest_where<T: Entity>(
        &self,
        origin: (f64, f64),
        keep: impl Fn(&dyn Entity) -> bool,
    ) -> Option<&dyn Entity> {
        let mut best: Option<(f64, &dyn Entity)> = None;
        for entity in self.of_type::<T>() {
            if !keep(entity) {
                continue;
            }
            let (Some(x), Some(y)) = (
                entity.get_field("x").and_then(|v| v.as_f64()),
                entity.get_field("y").and_then(|v| v.as_f64()),
            ) else {
                continue;
            };
            let distance = (x - origin.0).hypot(y - origin.1);
            if best.is_none_or(|(closest, _)| distance < closest) {
                best = Some((distance, entity));
            }
        }
        best.map(|(_, entity)| entity)
    }
}
