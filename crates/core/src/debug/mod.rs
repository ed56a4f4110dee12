//! Live tuning of animated parameters.

use crate::{
    animation::{AnimationController, ParamValue, ParameterSpec},
    input::InputEvent,
    ResonanceError, Result,
};

/// How a parameter is presented for tuning.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    Slider { min: f32, max: f32, step: f32 },
    ColorPicker,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParameterBinding {
    pub name: String,
    pub control: Control,
}

impl ParameterBinding {
    fn from_spec(spec: &ParameterSpec) -> Self {
        let control = match spec.initial {
            ParamValue::Scalar(_) => Control::Slider {
                min: spec.range.min,
                max: spec.range.max,
                step: spec.step,
            },
            ParamValue::Color(_) => Control::ColorPicker,
        };
        Self {
            name: spec.name.clone(),
            control,
        }
    }
}

/// Read/write view over the controller parameters. Inactive panels still
/// keep their bindings; only the host decides whether to show them.
#[derive(Debug, Clone, Default)]
pub struct DebugPanel {
    active: bool,
    bindings: Vec<ParameterBinding>,
}

impl DebugPanel {
    pub fn new(active: bool, specs: &[ParameterSpec]) -> Self {
        Self {
            active,
            bindings: specs.iter().map(ParameterBinding::from_spec).collect(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn toggle(&mut self) -> bool {
        self.active = !self.active;
        tracing::info!(active = self.active, "debug panel toggled");
        self.active
    }

    /// Flips the panel on the toggle gesture. Returns whether it did.
    pub fn handle_input(&mut self, event: &InputEvent) -> bool {
        if event.toggles_debug() {
            self.toggle();
            true
        } else {
            false
        }
    }

    pub fn bindings(&self) -> &[ParameterBinding] {
        &self.bindings
    }

    pub fn binding(&self, name: &str) -> Option<&ParameterBinding> {
        self.bindings.iter().find(|binding| binding.name == name)
    }

    pub fn read(&self, controller: &AnimationController, name: &str) -> Result<ParamValue> {
        self.bound(name)?;
        controller
            .value(name)
            .ok_or_else(|| ResonanceError::UnknownParameter(name.to_string()))
    }

    /// Writes through to the controller. Slider values snap to the binding
    /// step before the controller clamps them.
    pub fn write(
        &self,
        controller: &mut AnimationController,
        name: &str,
        value: ParamValue,
    ) -> Result<ParamValue> {
        let binding = self.bound(name)?;
        let value = match (binding.control, value) {
            (Control::Slider { min, step, .. }, ParamValue::Scalar(raw)) if step > 0.0 => {
                ParamValue::Scalar(min + ((raw - min) / step).round() * step)
            }
            _ => value,
        };
        let written = controller.set_value(name, value)?;
        tracing::debug!(parameter = name, ?written, "debug write");
        Ok(written)
    }

    /// Current values of every bound parameter, in binding order.
    pub fn snapshot(&self, controller: &AnimationController) -> Vec<(String, ParamValue)> {
        self.bindings
            .iter()
            .filter_map(|binding| {
                controller
                    .value(&binding.name)
                    .map(|value| (binding.name.clone(), value))
            })
            .collect()
    }

    fn bound(&self, name: &str) -> Result<&ParameterBinding> {
        self.binding(name)
            .ok_or_else(|| ResonanceError::UnknownParameter(name.to_string()))
    }
}
