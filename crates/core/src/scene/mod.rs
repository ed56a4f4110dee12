//! Scene objects that depend on loaded assets.
//!
//! [`World`] starts empty and is populated once the resource barrier has
//! released (or right away when nothing needs loading).

use std::{collections::BTreeMap, f32::consts::PI, rc::Rc};

use serde::Serialize;

use crate::{
    animation::{AnimationController, ParamValue, RequestOutcome, Rgb},
    assets::{Asset, ResourceLoader},
    audio::FrequencyAnalyser,
    config::ClickAnimation,
    timeline::Ticker,
    Result,
};

/// Values handed to the renderer for one frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SceneUniforms {
    /// Seconds since the ticker started.
    pub time: f32,
    pub values: BTreeMap<String, ParamValue>,
}

impl SceneUniforms {
    pub fn scalar(&self, name: &str) -> Option<f32> {
        self.values.get(name).copied().and_then(ParamValue::as_scalar)
    }

    pub fn color(&self, name: &str) -> Option<Rgb> {
        self.values.get(name).copied().and_then(ParamValue::as_color)
    }
}

/// The audio-reactive sphere.
#[derive(Debug, Clone)]
pub struct SphereScene {
    click: ClickAnimation,
    /// Segments along width and height.
    subdivision: (u32, u32),
    rotation_y: f32,
}

impl SphereScene {
    pub fn new(click: ClickAnimation) -> Self {
        Self {
            click,
            subdivision: (512, 512),
            rotation_y: -PI,
        }
    }

    pub fn subdivision(&self) -> (u32, u32) {
        self.subdivision
    }

    pub fn rotation_y(&self) -> f32 {
        self.rotation_y
    }

    /// Pushes the click target towards a random fraction of the configured
    /// amplitude, unless it is still moving from a previous click.
    pub fn animate(&self, controller: &mut AnimationController) -> Result<RequestOutcome> {
        let target = controller.random_unit() * self.click.amplitude;
        controller.request_transition(
            &self.click.target,
            ParamValue::Scalar(target),
            self.click.duration_ms,
            self.click.ease,
        )
    }

    pub fn update(
        &self,
        ticker: &Ticker,
        controller: &mut AnimationController,
        analyser: Option<&mut dyn FrequencyAnalyser>,
    ) -> Result<SceneUniforms> {
        controller.update(ticker.times().current, analyser)?;
        Ok(SceneUniforms {
            time: ticker.clock_elapsed_secs() as f32,
            values: controller
                .parameters()
                .map(|(name, state)| (name.to_string(), state.current()))
                .collect(),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SunLight {
    pub color: Rgb,
    pub intensity: f32,
    pub position: [f32; 3],
    pub cast_shadow: bool,
    pub shadow_far: f32,
    pub shadow_map_size: u32,
    pub shadow_normal_bias: f32,
}

impl Default for SunLight {
    fn default() -> Self {
        Self {
            color: Rgb::from_hex(0xffffff),
            intensity: 4.0,
            position: [3.5, 2.0, -1.25],
            cast_shadow: true,
            shadow_far: 15.0,
            shadow_map_size: 1024,
            shadow_normal_bias: 0.05,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentMap {
    pub item: String,
    pub intensity: f32,
    pub texture: Rc<Asset>,
}

/// Lighting of the scene.
#[derive(Debug, Clone)]
pub struct Environment {
    pub sun: SunLight,
    pub map: Option<EnvironmentMap>,
}

impl Environment {
    /// Binds `map_item` as environment map when the loader holds it.
    pub fn new(resources: &ResourceLoader, map_item: Option<&str>) -> Self {
        let map = map_item.and_then(|item| {
            resources.item(item).map(|texture| EnvironmentMap {
                item: item.to_string(),
                intensity: 0.4,
                texture,
            })
        });
        if map.is_none() {
            tracing::debug!(item = map_item, "no environment map bound");
        }
        Self {
            sun: SunLight::default(),
            map,
        }
    }
}

/// Scene objects, built at most once.
#[derive(Debug, Default)]
pub struct World {
    sphere: Option<SphereScene>,
    environment: Option<Environment>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_built(&self) -> bool {
        self.sphere.is_some()
    }

    /// Constructs the sphere and its environment. Later calls are ignored.
    pub fn build(
        &mut self,
        resources: &ResourceLoader,
        click: ClickAnimation,
        environment_map: Option<&str>,
    ) {
        if self.is_built() {
            tracing::debug!("world already built");
            return;
        }
        self.sphere = Some(SphereScene::new(click));
        self.environment = Some(Environment::new(resources, environment_map));
        tracing::info!(items = resources.loaded(), "world constructed");
    }

    pub fn sphere(&self) -> Option<&SphereScene> {
        self.sphere.as_ref()
    }

    pub fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    /// Per-frame update; returns `None` until the world is built.
    pub fn update(
        &self,
        ticker: &Ticker,
        controller: &mut AnimationController,
        analyser: Option<&mut dyn FrequencyAnalyser>,
    ) -> Result<Option<SceneUniforms>> {
        match &self.sphere {
            Some(sphere) => sphere.update(ticker, controller, analyser).map(Some),
            None => Ok(None),
        }
    }

    /// "Click to animate". Does nothing before the world is built.
    pub fn animate(&self, controller: &mut AnimationController) -> Result<Option<RequestOutcome>> {
        match &self.sphere {
            Some(sphere) => sphere.animate(controller).map(Some),
            None => Ok(None),
        }
    }
}
