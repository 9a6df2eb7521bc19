use std::collections::{HashSet, VecDeque};
use std::f64::consts::{PI, TAU};

use crate::api::entity::FieldMap;

pub const DEFAULT_BUFFER_MS: f64 = 100.0;
pub const DEFAULT_MAX_SNAPSHOTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterpMode {
    /// Straight lerp between the bounding snapshots.
    #[default]
    Linear,
    /// Cubic Hermite with central-difference tangents from the surrounding
    /// four snapshots. Smooth, curvature-continuous motion.
    Hermite,
    /// Kinematic blend for position/velocity/acceleration triples; the only
    /// mode that extrapolates past the newest snapshot.
    Physics,
}

/// A position field and the velocity/acceleration fields that drive it.
#[derive(Debug, Clone)]
pub struct PhysicsFields {
    pub position: String,
    pub velocity: String,
    pub acceleration: Option<String>,
}

#[derive(Debug, Clone)]
pub struct InterpConfig {
    pub mode: InterpMode,
    /// Render this far behind the newest data so jitter has room to smooth.
    pub buffer_ms: f64,
    pub max_snapshots: usize,
    /// Blended with shortest-arc wrapping instead of a plain lerp.
    pub angle_fields: HashSet<String>,
    pub physics_fields: Vec<PhysicsFields>,
}

impl Default for InterpConfig {
    fn default() -> Self {
        Self {
            mode: InterpMode::Linear,
            buffer_ms: DEFAULT_BUFFER_MS,
            max_snapshots: DEFAULT_MAX_SNAPSHOTS,
            angle_fields: HashSet::new(),
            physics_fields: Vec::new(),
        }
    }
}

#[derive(Debug)]
struct TimedState {
    timestamp: f64,
    state: FieldMap,
}

/// Buffers timestamped states and renders the recent past. Timestamps are
/// milliseconds; velocities and accelerations are per second.
#[derive(Debug)]
pub struct Interpolator {
    config: InterpConfig,
    buffer: VecDeque<TimedState>,
}

impl Interpolator {
    pub fn new(config: InterpConfig) -> Self {
        Self {
            config,
            buffer: VecDeque::new(),
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(InterpConfig::default())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    /// Inserts in timestamp order; out-of-order arrivals are fine. The oldest
    /// entry is evicted once the ring is full.
    pub fn push(&mut self, timestamp: f64, state: FieldMap) {
        let position = self
            .buffer
            .iter()
            .position(|entry| entry.timestamp > timestamp)
            .unwrap_or(self.buffer.len());
        self.buffer.insert(position, TimedState { timestamp, state });

        while self.buffer.len() > self.config.max_snapshots {
            self.buffer.pop_front();
        }
    }

    /// State at `now - buffer_ms`. Clamps to the edges of the buffer except
    /// in physics mode, which extrapolates kinematically past the newest
    /// snapshot.
    pub fn get_interpolated(&self, now_ms: f64) -> FieldMap {
        let render_time = now_ms - self.config.buffer_ms;

        let (Some(first), Some(last)) = (self.buffer.front(), self.buffer.back()) else {
            return FieldMap::new();
        };
        if render_time <= first.timestamp {
            return first.state.clone();
        }
        if render_time >= last.timestamp {
            return match self.config.mode {
                InterpMode::Physics => self.extrapolate(last, render_time),
                _ => last.state.clone(),
            };
        }

        let Some(index) = (0..self.buffer.len() - 1).find(|&i| {
            self.buffer[i].timestamp <= render_time && self.buffer[i + 1].timestamp >= render_time
        }) else {
            return last.state.clone();
        };

        let from = &self.buffer[index];
        let to = &self.buffer[index + 1];
        let range = to.timestamp - from.timestamp;
        let t = if range > 0.0 {
            (render_time - from.timestamp) / range
        } else {
            0.0
        };

        self.blend(index, t, render_time)
    }

    fn blend(&self, index: usize, t: f64, render_time: f64) -> FieldMap {
        let from = &self.buffer[index];
        let to = &self.buffer[index + 1];

        let position_fields: HashSet<&str> = self
            .config
            .physics_fields
            .iter()
            .map(|triple| triple.position.as_str())
            .collect();

        let mut out = FieldMap::new();
        for (name, to_json) in &to.state {
            let to_value = to_json.as_f64();
            let from_value = from.state.get(name).and_then(|v| v.as_f64());

            let (Some(to_value), Some(from_value)) = (to_value, from_value) else {
                // missing on the `from` side, or not numeric: take the `to`
                // value rather than inventing one
                out.insert(name.clone(), to_json.clone());
                continue;
            };

            let blended = if self.config.angle_fields.contains(name) {
                lerp_angle(from_value, to_value, t)
            } else {
                match self.config.mode {
                    InterpMode::Linear => lerp(from_value, to_value, t),
                    InterpMode::Hermite => self.hermite_field(index, name, t),
                    InterpMode::Physics => {
                        if position_fields.contains(name.as_str()) {
                            let triple = self
                                .config
                                .physics_fields
                                .iter()
                                .find(|triple| triple.position == *name)
                                .expect("position field has a triple");
                            let dt = (render_time - from.timestamp) / 1000.0;
                            let kinematic = kinematic_at(&from.state, triple, from_value, dt);
                            (1.0 - t) * kinematic + t * lerp(from_value, to_value, t)
                        } else {
                            lerp(from_value, to_value, t)
                        }
                    }
                }
            };
            out.insert(name.clone(), number(blended));
        }
        out
    }

    /// Cubic Hermite on one field, tangents by central difference over the
    /// four surrounding snapshots (one-sided at the buffer edges).
    fn hermite_field(&self, index: usize, name: &str, t: f64) -> f64 {
        let value = |i: usize| self.buffer[i].state.get(name).and_then(|v| v.as_f64());
        let time = |i: usize| self.buffer[i].timestamp;

        let p0 = value(index).unwrap_or_default();
        let p1 = value(index + 1).unwrap_or(p0);
        let t0 = time(index);
        let t1 = time(index + 1);
        let span = t1 - t0;
        if span <= 0.0 {
            return p0;
        }

        let fallback = (p1 - p0) / span;
        let m0 = if index > 0 {
            match value(index - 1) {
                Some(prev) => (p1 - prev) / (t1 - time(index - 1)),
                None => fallback,
            }
        } else {
            fallback
        };
        let m1 = if index + 2 < self.buffer.len() {
            match value(index + 2) {
                Some(next) => (next - p0) / (time(index + 2) - t0),
                None => fallback,
            }
        } else {
            fallback
        };

        // tangents are per-millisecond slopes, scaled onto the unit segment
        let m0 = m0 * span;
        let m1 = m1 * span;

        let t2 = t * t;
        let t3 = t2 * t;
        let h00 = 2.0 * t3 - 3.0 * t2 + 1.0;
        let h10 = t3 - 2.0 * t2 + t;
        let h01 = -2.0 * t3 + 3.0 * t2;
        let h11 = t3 - t2;

        h00 * p0 + h10 * m0 + h01 * p1 + h11 * m1
    }

    /// Pure kinematics from the newest snapshot: `p + v·dt + ½·a·dt²`.
    fn extrapolate(&self, last: &TimedState, render_time: f64) -> FieldMap {
        let dt = (render_time - last.timestamp) / 1000.0;
        let mut out = last.state.clone();
        for triple in &self.config.physics_fields {
            let Some(position) = last.state.get(&triple.position).and_then(|v| v.as_f64()) else {
                continue;
            };
            let velocity = last
                .state
                .get(&triple.velocity)
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);
            let acceleration = triple
                .acceleration
                .as_ref()
                .and_then(|name| last.state.get(name))
                .and_then(|v| v.as_f64())
                .unwrap_or(0.0);

            out.insert(
                triple.position.clone(),
                number(position + velocity * dt + 0.5 * acceleration * dt * dt),
            );
            out.insert(
                triple.velocity.clone(),
                number(velocity + acceleration * dt),
            );
        }
        out
    }
}

fn kinematic_at(from: &FieldMap, triple: &PhysicsFields, position: f64, dt: f64) -> f64 {
    let velocity = from
        .get(&triple.velocity)
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    let acceleration = triple
        .acceleration
        .as_ref()
        .and_then(|name| from.get(name))
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    position + velocity * dt + 0.5 * acceleration * dt * dt
}

fn lerp(from: f64, to: f64, t: f64) -> f64 {
    from + (to - from) * t
}

/// Shortest-arc blend: the signed difference is normalized into `(−π, π]`
/// before lerping, so a path across the wrap never swings the long way.
fn lerp_angle(from: f64, to: f64, t: f64) -> f64 {
    let mut diff = (to - from) % TAU;
    if diff > PI {
        diff -= TAU;
    } else if diff <= -PI {
        diff += TAU;
    }
    from + diff * t
}

fn number(value: f64) -> serde_json::Value {
    serde_json::Number::from_f64(value)
        .map(serde_json::Value::Number)
        .unwrap_or(serde_json::Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(pairs: &[(&str, f64)]) -> FieldMap {
        let mut map = FieldMap::new();
        for (name, value) in pairs {
            map.insert(name.to_string(), serde_json::json!(value));
        }
        map
    }

    fn field(map: &FieldMap, name: &str) -> f64 {
        map.get(name).and_then(|v| v.as_f64()).unwrap()
    }

    fn no_delay(mode: InterpMode) -> InterpConfig {
        InterpConfig {
            mode,
            buffer_ms: 0.0,
            ..InterpConfig::default()
        }
    }

    #[test]
    fn empty_buffer_renders_nothing() {
        let interp = Interpolator::with_defaults();
        assert!(interp.get_interpolated(1_000.0).is_empty());
    }

    #[test]
    fn clamps_to_first_and_last_snapshot() {
        let mut interp = Interpolator::new(no_delay(InterpMode::Linear));
        interp.push(1_000.0, state(&[("x", 1.0)]));
        interp.push(1_100.0, state(&[("x", 2.0)]));

        assert_eq!(field(&interp.get_interpolated(500.0), "x"), 1.0);
        assert_eq!(field(&interp.get_interpolated(5_000.0), "x"), 2.0);
    }

    #[test]
    fn linear_midpoint() {
        let mut interp = Interpolator::new(no_delay(InterpMode::Linear));
        interp.push(1_000.0, state(&[("x", 0.0), ("y", 10.0)]));
        interp.push(1_100.0, state(&[("x", 10.0), ("y", 30.0)]));

        let mid = interp.get_interpolated(1_050.0);
        assert_eq!(field(&mid, "x"), 5.0);
        assert_eq!(field(&mid, "y"), 20.0);
    }

    #[test]
    fn render_time_sits_behind_by_buffer_ms() {
        let mut interp = Interpolator::new(InterpConfig {
            buffer_ms: 100.0,
            ..InterpConfig::default()
        });
        interp.push(1_000.0, state(&[("x", 0.0)]));
        interp.push(1_100.0, state(&[("x", 10.0)]));

        // now=1150 renders t=1050
        assert_eq!(field(&interp.get_interpolated(1_150.0), "x"), 5.0);
    }

    #[test]
    fn angle_takes_the_short_arc_across_the_wrap() {
        let eps = 0.05;
        let mut config = no_delay(InterpMode::Linear);
        config.angle_fields.insert("angle".to_string());
        let mut interp = Interpolator::new(config);
        interp.push(0.0, state(&[("angle", -PI + eps)]));
        interp.push(100.0, state(&[("angle", PI - eps)]));

        let blended = field(&interp.get_interpolated(50.0), "angle");
        assert!(blended.abs() > PI - eps, "went the long way: {blended}");
    }

    #[test]
    fn zero_range_pair_uses_t_zero() {
        let mut interp = Interpolator::new(no_delay(InterpMode::Linear));
        interp.push(1_000.0, state(&[("x", 3.0)]));
        interp.push(1_000.0, state(&[("x", 9.0)]));
        let out = interp.get_interpolated(1_000.0);
        assert!(field(&out, "x") == 3.0 || field(&out, "x") == 9.0);
    }

    #[test]
    fn missing_from_field_defaults_to_to_value() {
        let mut interp = Interpolator::new(no_delay(InterpMode::Linear));
        interp.push(1_000.0, state(&[("x", 0.0)]));
        interp.push(1_100.0, state(&[("x", 10.0), ("hp", 7.0)]));

        let mid = interp.get_interpolated(1_050.0);
        assert_eq!(field(&mid, "hp"), 7.0);
        assert!(field(&mid, "hp").is_finite());
    }

    #[test]
    fn ring_evicts_the_oldest() {
        let mut interp = Interpolator::new(InterpConfig {
            max_snapshots: 3,
            buffer_ms: 0.0,
            ..InterpConfig::default()
        });
        for n in 0..5 {
            interp.push(n as f64 * 100.0, state(&[("x", n as f64)]));
        }
        assert_eq!(interp.len(), 3);
        // the oldest surviving snapshot is n=2
        assert_eq!(field(&interp.get_interpolated(0.0), "x"), 2.0);
    }

    #[test]
    fn hermite_reproduces_quadratic_motion() {
        let mut interp = Interpolator::new(no_delay(InterpMode::Hermite));
        // x = 5·s² + 5·s sampled at s = 0,1,2,3 (milliseconds scaled by 1000)
        interp.push(0.0, state(&[("x", 0.0)]));
        interp.push(1_000.0, state(&[("x", 10.0)]));
        interp.push(2_000.0, state(&[("x", 30.0)]));
        interp.push(3_000.0, state(&[("x", 60.0)]));

        // midpoint of the middle segment: the curve passes below the chord
        // (the series accelerates), and the spline lands exactly on it
        let mid = field(&interp.get_interpolated(1_500.0), "x");
        assert!((mid - 18.75).abs() < 1e-9, "got {mid}");
        assert!((mid - 20.0).abs() > 0.5, "curvature should bend away from the chord");
    }

    #[test]
    fn hermite_falls_back_to_linear_shortest_arc_for_angles() {
        let eps = 0.05;
        let mut config = no_delay(InterpMode::Hermite);
        config.angle_fields.insert("angle".to_string());
        let mut interp = Interpolator::new(config);
        interp.push(0.0, state(&[("angle", -PI + eps)]));
        interp.push(100.0, state(&[("angle", PI - eps)]));

        let blended = field(&interp.get_interpolated(50.0), "angle");
        assert!(blended.abs() > PI - eps);
    }

    fn ballistic_config() -> InterpConfig {
        InterpConfig {
            mode: InterpMode::Physics,
            buffer_ms: 0.0,
            physics_fields: vec![PhysicsFields {
                position: "x".to_string(),
                velocity: "vx".to_string(),
                acceleration: None,
            }],
            ..InterpConfig::default()
        }
    }

    #[test]
    fn physics_mode_extrapolates_past_the_newest_snapshot() {
        let mut interp = Interpolator::new(ballistic_config());
        interp.push(1_000.0, state(&[("x", 100.0), ("vx", 50.0)]));

        let out = interp.get_interpolated(1_500.0);
        assert!((field(&out, "x") - 125.0).abs() < 1e-9);
    }

    #[test]
    fn other_modes_never_extrapolate() {
        let mut interp = Interpolator::new(no_delay(InterpMode::Linear));
        interp.push(1_000.0, state(&[("x", 100.0), ("vx", 50.0)]));
        assert_eq!(field(&interp.get_interpolated(1_500.0), "x"), 100.0);
    }

    #[test]
    fn physics_blend_lands_on_the_endpoints() {
        let mut interp = Interpolator::new(ballistic_config());
        interp.push(1_000.0, state(&[("x", 0.0), ("vx", 100.0)]));
        interp.push(1_100.0, state(&[("x", 8.0), ("vx", 100.0)]));

        assert!((field(&interp.get_interpolated(1_000.0), "x")).abs() < 1e-9);
        assert!((field(&interp.get_interpolated(1_100.0), "x") - 8.0).abs() < 1e-9);

        // in between, the kinematic guess (10 at the midpoint) pulls the
        // value above the chord
        let mid = field(&interp.get_interpolated(1_050.0), "x");
        assert!(mid > 4.0 && mid < 10.0, "got {mid}");
    }
}
