use std::collections::HashMap;

use crate::api::collection::EntityCollection;
use crate::api::entity::{Entity, EntityId};

#[cfg(feature = "physics")]
pub mod rapier;

#[derive(Debug, Clone)]
pub struct BodyOptions {
    pub is_static: bool,
    pub density: f64,
    pub friction: f64,
    pub restitution: f64,
}

impl Default for BodyOptions {
    fn default() -> Self {
        Self {
            is_static: false,
            density: 1.0,
            friction: 0.5,
            restitution: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BodyPose {
    pub x: f64,
    pub y: f64,
    pub angle: f64,
}

/// The narrow seam to an external 2D rigid-body engine. Bodies are keyed by
/// the owning entity's id.
pub trait RigidBodyEngine: Send {
    fn add_circle(&mut self, key: EntityId, x: f64, y: f64, radius: f64, options: &BodyOptions);
    fn add_rectangle(
        &mut self,
        key: EntityId,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        options: &BodyOptions,
    );
    fn remove(&mut self, key: EntityId);
    fn apply_force(&mut self, key: EntityId, fx: f64, fy: f64);
    fn set_velocity(&mut self, key: EntityId, vx: f64, vy: f64);
    fn set_pose(&mut self, key: EntityId, pose: BodyPose);
    fn pose(&self, key: EntityId) -> Option<BodyPose>;
    fn velocity(&self, key: EntityId) -> Option<(f64, f64)>;
    fn step(&mut self, delta: f64);
    fn keys(&self) -> Vec<EntityId>;
    fn dynamic_keys(&self) -> Vec<EntityId>;
}

/// Optional rigid-body layer of a room. After each engine step the pose of
/// every non-static body is written back into the owning entity, but only
/// for field names the entity's schema declares: an entity without `x`/`y`
/// fields is physics-only.
pub struct PhysicsBridge {
    engine: Box<dyn RigidBodyEngine>,
}

impl PhysicsBridge {
    pub fn new(engine: Box<dyn RigidBodyEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &dyn RigidBodyEngine {
        self.engine.as_ref()
    }

    pub fn engine_mut(&mut self) -> &mut dyn RigidBodyEngine {
        self.engine.as_mut()
    }

    pub fn add_circle(&mut self, key: EntityId, x: f64, y: f64, radius: f64, options: &BodyOptions) {
        self.engine.add_circle(key, x, y, radius, options);
    }

    pub fn add_rectangle(
        &mut self,
        key: EntityId,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        options: &BodyOptions,
    ) {
        self.engine.add_rectangle(key, x, y, width, height, options);
    }

    pub fn apply_force(&mut self, key: EntityId, fx: f64, fy: f64) {
        self.engine.apply_force(key, fx, fy);
    }

    pub fn set_velocity(&mut self, key: EntityId, vx: f64, vy: f64) {
        self.engine.set_velocity(key, vx, vy);
    }

    /// Removing an entity removes its body.
    pub fn remove_entity(&mut self, key: EntityId) {
        self.engine.remove(key);
    }

    pub fn step(&mut self, entities: &mut EntityCollection, delta: f64) {
        self.engine.step(delta);

        for key in self.engine.dynamic_keys() {
            let Some(pose) = self.engine.pose(key) else {
                continue;
            };
            let Some(entity) = entities.get_mut(key) else {
                continue;
            };
            write_declared(entity, "x", pose.x);
            write_declared(entity, "y", pose.y);
            write_declared(entity, "angle", pose.angle);
        }
    }

    /// Inverse sync for manual position adjustments: pushes each entity's
    /// declared `x`/`y`/`angle` into its body.
    pub fn sync_from_entities(&mut self, entities: &EntityCollection) {
        for key in self.engine.keys() {
            let Some(entity) = entities.get(key) else {
                continue;
            };
            let current = self.engine.pose(key).unwrap_or_default();
            let read = |name: &str, fallback: f64| {
                entity
                    .get_field(name)
                    .and_then(|v| v.as_f64())
                    .unwrap_or(fallback)
            };
            self.engine.set_pose(
                key,
                BodyPose {
                    x: read("x", current.x),
                    y: read("y", current.y),
                    angle: read("angle", current.angle),
                },
            );
        }
    }
}

fn write_declared(entity: &mut dyn Entity, name: &str, value: f64) {
    if let Some(kind) = entity.fields().kind_of(name)
        && let Some(value) = kind.value_from_f64(value)
    {
        entity.set_field(name, value);
    }
}

/// A minimal engine: bodies integrate velocity and accumulated force with
/// unit mass, no collisions. Enough for headless tests and games that only
/// need kinematics; real games plug in the rapier-backed engine.
#[derive(Default)]
pub struct KinematicEngine {
    bodies: HashMap<EntityId, KinematicBody>,
}

struct KinematicBody {
    pose: BodyPose,
    velocity: (f64, f64),
    force: (f64, f64),
    is_static: bool,
}

impl RigidBodyEngine for KinematicEngine {
    fn add_circle(&mut self, key: EntityId, x: f64, y: f64, _radius: f64, options: &BodyOptions) {
        self.insert(key, x, y, options.is_static);
    }

    fn add_rectangle(
        &mut self,
        key: EntityId,
        x: f64,
        y: f64,
        _width: f64,
        _height: f64,
        options: &BodyOptions,
    ) {
        self.insert(key, x, y, options.is_static);
    }

    fn remove(&mut self, key: EntityId) {
        self.bodies.remove(&key);
    }

    fn apply_force(&mut self, key: EntityId, fx: f64, fy: f64) {
        if let Some(body) = self.bodies.get_mut(&key) {
            body.force.0 += fx;
            body.force.1 += fy;
        }
    }

    fn set_velocity(&mut self, key: EntityId, vx: f64, vy: f64) {
        if let Some(body) = self.bodies.get_mut(&key) {
            body.velocity = (vx, vy);
        }
    }

    fn set_pose(&mut self, key: EntityId, pose: BodyPose) {
        if let Some(body) = self.bodies.get_mut(&key) {
            body.pose = pose;
        }
    }

    fn pose(&self, key: EntityId) -> Option<BodyPose> {
        self.bodies.get(&key).map(|body| body.pose)
    }

    fn velocity(&self, key: EntityId) -> Option<(f64, f64)> {
        self.bodies.get(&key).map(|body| body.velocity)
    }

    fn step(&mut self, delta: f64) {
        for body in self.bodies.values_mut() {
            if body.is_static {
                continue;
            }
            body.velocity.0 += body.force.0 * delta;
            body.velocity.1 += body.force.1 * delta;
            body.force = (0.0, 0.0);
            body.pose.x += body.velocity.0 * delta;
            body.pose.y += body.velocity.1 * delta;
        }
    }

    fn keys(&self) -> Vec<EntityId> {
        self.bodies.keys().copied().collect()
    }

    fn dynamic_keys(&self) -> Vec<EntityId> {
        self.bodies
            .iter()
            .filter(|(_, body)| !body.is_static)
            .map(|(key, _)| *key)
            .collect()
    }
}

impl KinematicEngine {
    fn insert(&mut self, key: EntityId, x: f64, y: f64, is_static: bool) {
        self.bodies.insert(
            key,
            KinematicBody {
                pose: BodyPose {
                    x,
                    y,
                    angle: 0.0,
                },
                velocity: (0.0, 0.0),
                force: (0.0, 0.0),
                is_static,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use std::any::{Any, TypeId};
    use std::sync::LazyLock;

    use super::*;
    use crate::api::entity::{EntityMeta, Schematic};
    use crate::api::fields::{FieldKind, FieldSet, Value};

    #[derive(Default)]
    struct Puck {
        meta: EntityMeta,
        x: f32,
        y: f32,
        angle: f32,
    }

    impl Schematic for Puck {
        fn field_set() -> &'static FieldSet {
            static FIELDS: LazyLock<FieldSet> = LazyLock::new(|| {
                FieldSet::builder()
                    .field("x", FieldKind::Float32)
                    .field("y", FieldKind::Float32)
                    .field("angle", FieldKind::Float32)
                    .build()
            });
            &FIELDS
        }

        fn kind_name() -> &'static str {
            "puck"
        }

        fn fields(&self) -> &'static FieldSet {
            Self::field_set()
        }

        fn kind(&self) -> &'static str {
            Self::kind_name()
        }

        fn get_field(&self, name: &str) -> Option<Value> {
            match name {
                "x" => Some(Value::F32(self.x)),
                "y" => Some(Value::F32(self.y)),
                "angle" => Some(Value::F32(self.angle)),
                _ => None,
            }
        }

        fn set_field(&mut self, name: &str, value: Value) -> bool {
            match name {
                "x" => value.as_f32().map(|v| self.x = v).is_some(),
                "y" => value.as_f32().map(|v| self.y = v).is_some(),
                "angle" => value.as_f32().map(|v| self.angle = v).is_some(),
                _ => false,
            }
        }

        fn is_kind(&self, type_id: TypeId) -> bool {
            type_id == TypeId::of::<Puck>()
        }
    }

    impl Entity for Puck {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    // no x/y in the schema: physics-only
    #[derive(Default)]
    struct Ghost {
        meta: EntityMeta,
    }

    impl Schematic for Ghost {
        fn field_set() -> &'static FieldSet {
            static FIELDS: LazyLock<FieldSet> = LazyLock::new(|| FieldSet::builder().build());
            &FIELDS
        }

        fn kind_name() -> &'static str {
            "ghost"
        }

        fn fields(&self) -> &'static FieldSet {
            Self::field_set()
        }

        fn kind(&self) -> &'static str {
            Self::kind_name()
        }

        fn get_field(&self, _name: &str) -> Option<Value> {
            None
        }

        fn set_field(&mut self, _name: &str, _value: Value) -> bool {
            false
        }

        fn is_kind(&self, type_id: TypeId) -> bool {
            type_id == TypeId::of::<Ghost>()
        }
    }

    impl Entity for Ghost {
        fn meta(&self) -> &EntityMeta {
            &self.meta
        }

        fn meta_mut(&mut self) -> &mut EntityMeta {
            &mut self.meta
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    fn world_with(entity: Box<dyn Entity>) -> EntityCollection {
        let mut world = EntityCollection::new();
        world.insert(entity);
        world
    }

    #[test]
    fn step_writes_pose_into_declared_fields() {
        let mut puck = Puck::default();
        puck.meta.id = 1;
        let mut world = world_with(Box::new(puck));

        let mut bridge = PhysicsBridge::new(Box::new(KinematicEngine::default()));
        bridge.add_circle(1, 0.0, 0.0, 0.5, &BodyOptions::default());
        bridge.set_velocity(1, 2.0, -4.0);
        bridge.step(&mut world, 0.5);

        let puck = world.get_as::<Puck>(1).unwrap();
        assert_eq!(puck.x, 1.0);
        assert_eq!(puck.y, -2.0);
    }

    #[test]
    fn entities_without_position_fields_are_physics_only() {
        let mut ghost = Ghost::default();
        ghost.meta.id = 2;
        let mut world = world_with(Box::new(ghost));

        let mut bridge = PhysicsBridge::new(Box::new(KinematicEngine::default()));
        bridge.add_circle(2, 1.0, 1.0, 0.5, &BodyOptions::default());
        bridge.set_velocity(2, 1.0, 0.0);
        bridge.step(&mut world, 1.0);

        // the body moved, the entity has nowhere to put it
        assert_eq!(bridge.engine().pose(2).unwrap().x, 2.0);
    }

    #[test]
    fn sync_from_entities_pushes_manual_moves() {
        let mut puck = Puck::default();
        puck.meta.id = 3;
        puck.x = 9.0;
        puck.y = 5.0;
        let world = world_with(Box::new(puck));

        let mut bridge = PhysicsBridge::new(Box::new(KinematicEngine::default()));
        bridge.add_circle(3, 0.0, 0.0, 0.5, &BodyOptions::default());
        bridge.sync_from_entities(&world);

        let pose = bridge.engine().pose(3).unwrap();
        assert_eq!((pose.x, pose.y), (9.0, 5.0));
    }

    #[test]
    fn force_integrates_with_unit_mass() {
        let mut world = EntityCollection::new();
        let mut bridge = PhysicsBridge::new(Box::new(KinematicEngine::default()));
        bridge.add_circle(4, 0.0, 0.0, 0.5, &BodyOptions::default());
        bridge.apply_force(4, 10.0, 0.0);
        bridge.step(&mut world, 1.0);

        assert_eq!(bridge.engine().velocity(4).unwrap(), (10.0, 0.0));
    }

    #[test]
    fn static_bodies_never_write_back() {
        let mut puck = Puck::default();
        puck.meta.id = 5;
        let mut world = world_with(Box::new(puck));

        let mut bridge = PhysicsBridge::new(Box::new(KinematicEngine::default()));
        bridge.add_rectangle(
            5,
            3.0,
            3.0,
            1.0,
            1.0,
            &BodyOptions {
                is_static: true,
                ..BodyOptions::default()
            },
        );
        bridge.step(&mut world, 1.0);

        assert_eq!(world.get_as::<Puck>(5).unwrap().x, 0.0);
    }
}
