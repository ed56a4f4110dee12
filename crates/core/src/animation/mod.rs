//! Per-parameter transition scheduler.
//!
//! Every managed parameter is either idle or running exactly one transition.
//! A request that arrives while a transition is running is dropped, which
//! keeps rapid triggers (one per frame when driven by audio) from stacking
//! competing tweens on the same value. Completion is detected by
//! [`AnimationController::advance`] from the controller's own clock.

mod ease;
mod value;

use std::collections::BTreeMap;

use rand::{rngs::StdRng, Rng, SeedableRng};

pub use ease::Ease;
pub use value::{ParamRange, ParamValue, ParameterSpec, Rgb};

use crate::{
    audio::FrequencyAnalyser,
    config::AnimationConfig,
    mapping::{self, MappingDescriptor, BYTE_FREQUENCY_MAX},
    ResonanceError, Result,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionState {
    Idle,
    InFlight,
}

/// What happened to a transition request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestOutcome {
    /// The parameter is now in flight.
    Started,
    /// Zero-length transition, the target was applied on the spot.
    Applied,
    /// A transition was already running; nothing changed.
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transition {
    pub from: ParamValue,
    pub to: ParamValue,
    pub started_ms: f64,
    pub duration_ms: f64,
    pub ease: Ease,
}

impl Transition {
    fn progress(&self, now_ms: f64) -> f32 {
        ((now_ms - self.started_ms) / self.duration_ms).clamp(0.0, 1.0) as f32
    }

    pub fn finishes_at(&self) -> f64 {
        self.started_ms + self.duration_ms
    }
}

#[derive(Debug, Clone)]
pub struct ParameterState {
    current: ParamValue,
    range: ParamRange,
    transition: Option<Transition>,
}

impl ParameterState {
    fn new(spec: &ParameterSpec) -> Self {
        Self {
            current: spec.range.clamp_value(spec.initial),
            range: spec.range,
            transition: None,
        }
    }

    pub fn current(&self) -> ParamValue {
        self.current
    }

    pub fn range(&self) -> ParamRange {
        self.range
    }

    pub fn in_flight(&self) -> bool {
        self.transition.is_some()
    }

    pub fn state(&self) -> TransitionState {
        if self.in_flight() {
            TransitionState::InFlight
        } else {
            TransitionState::Idle
        }
    }

    pub fn transition(&self) -> Option<&Transition> {
        self.transition.as_ref()
    }

    fn advance(&mut self, now_ms: f64) -> bool {
        let Some(transition) = self.transition else {
            return false;
        };
        let progress = transition.progress(now_ms);
        if progress >= 1.0 {
            self.current = transition.to;
            self.transition = None;
            true
        } else {
            self.current = transition.from.lerp(transition.to, transition.ease.apply(progress));
            false
        }
    }
}

#[derive(Debug)]
pub struct AnimationController {
    params: BTreeMap<String, ParameterState>,
    mappings: Vec<MappingDescriptor>,
    reference_max: f32,
    now_ms: f64,
    rng: StdRng,
}

impl AnimationController {
    /// Creates a controller without frequency mappings.
    pub fn new(specs: &[ParameterSpec]) -> Self {
        Self {
            params: specs
                .iter()
                .map(|spec| (spec.name.clone(), ParameterState::new(spec)))
                .collect(),
            mappings: Vec::new(),
            reference_max: BYTE_FREQUENCY_MAX,
            now_ms: 0.0,
            rng: StdRng::from_os_rng(),
        }
    }

    pub fn from_config(config: &AnimationConfig) -> Result<Self> {
        let mut controller = Self::new(&config.parameters)
            .with_mappings(config.mappings.clone(), config.reference_max)?;
        if let Some(seed) = config.seed {
            controller = controller.with_seed(seed);
        }
        Ok(controller)
    }

    /// Installs frequency mappings after checking each target exists and
    /// holds the kind of value the rule produces.
    pub fn with_mappings(
        mut self,
        mappings: Vec<MappingDescriptor>,
        reference_max: f32,
    ) -> Result<Self> {
        if !(reference_max > 0.0) {
            return Err(ResonanceError::Config(format!(
                "reference maximum must be positive, got {reference_max}"
            )));
        }
        for mapping in &mappings {
            let state = self.params.get(&mapping.target).ok_or_else(|| {
                ResonanceError::Config(format!(
                    "mapping targets unknown parameter `{}`",
                    mapping.target
                ))
            })?;
            let is_color = state.current.as_color().is_some();
            if is_color != mapping.expects_color() {
                return Err(ResonanceError::ValueMismatch(mapping.target.clone()));
            }
        }
        self.mappings = mappings;
        self.reference_max = reference_max;
        Ok(self)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn now_ms(&self) -> f64 {
        self.now_ms
    }

    /// Starts a transition of `name` towards `target` unless one is already
    /// running, in which case the request is dropped without side effects.
    /// Scalar targets are clamped to the parameter range.
    pub fn request_transition(
        &mut self,
        name: &str,
        target: ParamValue,
        duration_ms: f64,
        ease: Ease,
    ) -> Result<RequestOutcome> {
        let now_ms = self.now_ms;
        let state = self
            .params
            .get_mut(name)
            .ok_or_else(|| ResonanceError::UnknownParameter(name.to_string()))?;
        if !state.current.same_kind(target) {
            return Err(ResonanceError::ValueMismatch(name.to_string()));
        }

        if state.in_flight() {
            tracing::trace!(parameter = name, "transition already running, request dropped");
            return Ok(RequestOutcome::Dropped);
        }

        let target = state.range.clamp_value(target);
        if !(duration_ms > 0.0) {
            state.current = target;
            return Ok(RequestOutcome::Applied);
        }

        state.transition = Some(Transition {
            from: state.current,
            to: target,
            started_ms: now_ms,
            duration_ms,
            ease,
        });
        tracing::debug!(parameter = name, ?target, duration_ms, "transition started");
        Ok(RequestOutcome::Started)
    }

    /// Moves the controller clock to `now_ms` and advances every running
    /// transition. Returns how many transitions completed.
    pub fn advance(&mut self, now_ms: f64) -> usize {
        self.now_ms = self.now_ms.max(now_ms);
        let now_ms = self.now_ms;
        self.params
            .values_mut()
            .map(|state| state.advance(now_ms))
            .filter(|completed| *completed)
            .count()
    }

    /// Per-frame entry point: advances transitions, then polls `analyser`
    /// (when present) and feeds the magnitude through the mappings.
    pub fn update(
        &mut self,
        now_ms: f64,
        analyser: Option<&mut dyn FrequencyAnalyser>,
    ) -> Result<usize> {
        self.advance(now_ms);
        match analyser {
            Some(analyser) => {
                let magnitude = analyser.magnitude();
                self.apply_frequency(magnitude)
            }
            None => Ok(0),
        }
    }

    /// Routes one frequency sample through every mapping whose gate opens.
    /// Returns how many transitions were started.
    pub fn apply_frequency(&mut self, magnitude: f32) -> Result<usize> {
        let normalized = mapping::normalize(magnitude, self.reference_max);
        let mut started = 0;

        for index in 0..self.mappings.len() {
            let mapping = &self.mappings[index];
            if !mapping.gate(normalized) {
                continue;
            }
            let Some(state) = self.params.get(&mapping.target) else {
                continue;
            };
            if state.in_flight() {
                continue;
            }

            let range = state.range;
            let random = if mapping.expects_color() {
                self.rng.random::<f32>()
            } else {
                0.0
            };
            let mapping = &self.mappings[index];
            let target = mapping.target_value(normalized, range, random);
            let (name, duration_ms, ease) =
                (mapping.target.clone(), mapping.duration_ms, mapping.ease);

            if self.request_transition(&name, target, duration_ms, ease)? != RequestOutcome::Dropped {
                started += 1;
            }
        }
        Ok(started)
    }

    pub fn parameter(&self, name: &str) -> Option<&ParameterState> {
        self.params.get(name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = (&str, &ParameterState)> {
        self.params.iter().map(|(name, state)| (name.as_str(), state))
    }

    pub fn value(&self, name: &str) -> Option<ParamValue> {
        self.params.get(name).map(ParameterState::current)
    }

    pub fn scalar(&self, name: &str) -> Option<f32> {
        self.value(name).and_then(ParamValue::as_scalar)
    }

    pub fn color(&self, name: &str) -> Option<Rgb> {
        self.value(name).and_then(ParamValue::as_color)
    }

    pub fn state(&self, name: &str) -> Option<TransitionState> {
        self.params.get(name).map(ParameterState::state)
    }

    /// Overwrites the current value (debug tuning). A running transition
    /// keeps going and will overwrite the value again on the next advance.
    pub fn set_value(&mut self, name: &str, value: ParamValue) -> Result<ParamValue> {
        let state = self
            .params
            .get_mut(name)
            .ok_or_else(|| ResonanceError::UnknownParameter(name.to_string()))?;
        if !state.current.same_kind(value) {
            return Err(ResonanceError::ValueMismatch(name.to_string()));
        }
        state.current = state.range.clamp_value(value);
        Ok(state.current)
    }

    /// Uniform sample from `[0, 1)` drawn from the controller RNG.
    pub fn random_unit(&mut self) -> f32 {
        self.rng.random::<f32>()
    }

    pub fn mappings(&self) -> &[MappingDescriptor] {
        &self.mappings
    }
}
