use std::collections::HashMap;

use crate::api::entity::FieldMap;
use crate::api::message::InputPackage;

pub type ApplyInput = dyn Fn(&mut FieldMap, &serde_json::Value) + Send + Sync;

#[derive(Debug, Clone)]
pub struct PredictConfig {
    /// Corrections fade out over this many `get_smoothed` calls.
    pub smoothing_frames: u32,
    /// Per-field disagreement below this is ignored.
    pub epsilon: f64,
}

impl Default for PredictConfig {
    fn default() -> Self {
        Self {
            smoothing_frames: 3,
            epsilon: 1e-3,
        }
    }
}

/// Client-side prediction and reconciliation. `predict` replays unconfirmed
/// inputs on top of the newest authoritative state through the game's pure
/// `apply_input`; when the replayed present disagrees with what was being
/// shown, the offset is spread over a few frames instead of snapping.
#[derive(Debug, Default)]
pub struct Predictor {
    config: PredictConfig,
    offsets: HashMap<String, f64>,
    progress: f64,
}

impl Predictor {
    pub fn new(config: PredictConfig) -> Self {
        Self {
            config,
            offsets: HashMap::new(),
            progress: 0.0,
        }
    }

    pub fn with_defaults() -> Self {
        Self::new(PredictConfig::default())
    }

    /// Re-applies every unconfirmed input atop `server_state`.
    pub fn predict(
        &self,
        server_state: &FieldMap,
        unconfirmed: &[InputPackage],
        apply_input: &ApplyInput,
    ) -> FieldMap {
        let mut state = server_state.clone();
        for package in unconfirmed {
            apply_input(&mut state, &package.data);
        }
        state
    }

    /// Records per-field offsets between what was rendered and the replayed
    /// truth, for any numeric field differing by more than epsilon.
    pub fn set_correction(&mut self, predicted_then: &FieldMap, server_truth: &FieldMap) {
        self.offsets.clear();
        for (name, truth_json) in server_truth {
            let (Some(truth), Some(predicted)) = (
                truth_json.as_f64(),
                predicted_then.get(name).and_then(|v| v.as_f64()),
            ) else {
                continue;
            };
            let offset = predicted - truth;
            if offset.abs() > self.config.epsilon {
                self.offsets.insert(name.clone(), offset);
            }
        }
        self.progress = 0.0;
    }

    pub fn has_correction(&self) -> bool {
        !self.offsets.is_empty()
    }

    /// `current + offset · (1 − t)`, with `t` advancing by
    /// `1 / smoothing_frames` per call. After the last frame the offsets are
    /// cleared and the output equals the input exactly.
    pub fn get_smoothed(&mut self, current: &FieldMap) -> FieldMap {
        if self.offsets.is_empty() {
            return current.clone();
        }

        self.progress += 1.0 / self.config.smoothing_frames.max(1) as f64;
        if self.progress >= 1.0 {
            self.offsets.clear();
            return current.clone();
        }

        let fade = 1.0 - self.progress;
        let mut out = current.clone();
        for (name, offset) in &self.offsets {
            if let Some(value) = current.get(name).and_then(|v| v.as_f64())
                && let Some(number) = serde_json::Number::from_f64(value + offset * fade)
            {
                out.insert(name.clone(), serde_json::Value::Number(number));
            }
        }
        out
    }
}
