use std::collections::HashMap;

use rapier2d::prelude::*;

use crate::api::entity::EntityId;
use crate::server::physics::{BodyOptions, BodyPose, RigidBodyEngine};

/// Rapier-backed rigid-body engine. Gravity defaults to zero, which suits
/// top-down rooms; side-view games pass their own vector.
pub struct RapierEngine {
    pipeline: PhysicsPipeline,
    integration_parameters: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    bodies: RigidBodySet,
    colliders: ColliderSet,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector,
    handles: HashMap<EntityId, BodyEntry>,
}

struct BodyEntry {
    handle: RigidBodyHandle,
    is_static: bool,
}

impl Default for RapierEngine {
    fn default() -> Self {
        Self::new(0.0, 0.0)
    }
}

impl RapierEngine {
    pub fn new(gravity_x: f32, gravity_y: f32) -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            integration_parameters: IntegrationParameters::default(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: Vector::new(gravity_x, gravity_y),
            handles: HashMap::new(),
        }
    }

    fn insert_body(
        &mut self,
        key: EntityId,
        x: f64,
        y: f64,
        collider: Collider,
        options: &BodyOptions,
    ) {
        self.remove(key);

        let builder = if options.is_static {
            RigidBodyBuilder::fixed()
        } else {
            RigidBodyBuilder::dynamic().ccd_enabled(true)
        };
        let body = builder
            .translation(Vector::new(x as Real, y as Real))
            .build();
        let handle = self.bodies.insert(body);
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.handles.insert(
            key,
            BodyEntry {
                handle,
                is_static: options.is_static,
            },
        );
    }

    fn body(&self, key: EntityId) -> Option<&RigidBody> {
        self.handles
            .get(&key)
            .and_then(|entry| self.bodies.get(entry.handle))
    }

    fn body_mut(&mut self, key: EntityId) -> Option<&mut RigidBody> {
        let entry = self.handles.get(&key)?;
        self.bodies.get_mut(entry.handle)
    }
}

impl RigidBodyEngine for RapierEngine {
    fn add_circle(&mut self, key: EntityId, x: f64, y: f64, radius: f64, options: &BodyOptions) {
        let collider = ColliderBuilder::ball(radius as Real)
            .density(options.density as Real)
            .friction(options.friction as Real)
            .restitution(options.restitution as Real)
            .build();
        self.insert_body(key, x, y, collider, options);
    }

    fn add_rectangle(
        &mut self,
        key: EntityId,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
        options: &BodyOptions,
    ) {
        let collider = ColliderBuilder::cuboid((width / 2.0) as Real, (height / 2.0) as Real)
            .density(options.density as Real)
            .friction(options.friction as Real)
            .restitution(options.restitution as Real)
            .build();
        self.insert_body(key, x, y, collider, options);
    }

    fn remove(&mut self, key: EntityId) {
        if let Some(entry) = self.handles.remove(&key) {
            self.bodies.remove(
                entry.handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
        }
    }

    fn apply_force(&mut self, key: EntityId, fx: f64, fy: f64) {
        if let Some(body) = self.body_mut(key) {
            body.add_force(Vector::new(fx as Real, fy as Real), true);
        }
    }

    fn set_velocity(&mut self, key: EntityId, vx: f64, vy: f64) {
        if let Some(body) = self.body_mut(key) {
            body.set_linvel(Vector::new(vx as Real, vy as Real), true);
        }
    }

    fn set_pose(&mut self, key: EntityId, pose: BodyPose) {
        if let Some(body) = self.body_mut(key) {
            let next = Pose::from_parts(
                Vector::new(pose.x as Real, pose.y as Real),
                Rotation::new(pose.angle as Real),
            );
            body.set_position(next, true);
        }
    }

    fn pose(&self, key: EntityId) -> Option<BodyPose> {
        self.body(key).map(|body| {
            let translation = body.translation();
            BodyPose {
                x: translation.x as f64,
                y: translation.y as f64,
                angle: body.rotation().angle() as f64,
            }
        })
    }

    fn velocity(&self, key: EntityId) -> Option<(f64, f64)> {
        self.body(key).map(|body| {
            let linvel = body.linvel();
            (linvel.x as f64, linvel.y as f64)
        })
    }

    fn step(&mut self, delta: f64) {
        self.integration_parameters.dt = delta as Real;
        self.pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &(),
        );

        // forces are per-step inputs, not standing state
        for (_, body) in self.bodies.iter_mut() {
            body.reset_forces(false);
        }
    }

    fn keys(&self) -> Vec<EntityId> {
        self.handles.keys().copied().collect()
    }

    fn dynamic_keys(&self) -> Vec<EntityId> {
        self.handles
            .iter()
            .filter(|(_, entry)| !entry.is_static)
            .map(|(key, _)| *key)
            .collect()
    }
}
