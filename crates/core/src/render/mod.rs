use serde::{Deserialize, Serialize};

use crate::{scene::SceneUniforms, Result};

/// Size of the drawing surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub pixel_ratio: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1280,
            height: 720,
            pixel_ratio: 1.0,
        }
    }
}

impl Viewport {
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }
}

/// Rendering collaborator driven by the orchestrator.
pub trait RenderSurface {
    fn resize(&mut self, viewport: Viewport);

    /// Draws one frame. `uniforms` is `None` while the scene waits for its
    /// assets.
    fn render(&mut self, uniforms: Option<&SceneUniforms>) -> Result<()>;
}

/// Bloom pass applied on top of the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BloomSettings {
    pub enabled: bool,
    pub strength: f32,
    pub radius: f32,
    pub threshold: f32,
    pub tint: u32,
    pub tint_strength: f32,
}

impl Default for BloomSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            strength: 1.5,
            radius: 0.6,
            threshold: 0.0,
            tint: 0x7f00ff,
            tint_strength: 0.05,
        }
    }
}

/// Headless backend: keeps track of the surface size, the bloom setup and
/// the most recent frame instead of talking to a GPU.
#[derive(Debug, Default)]
pub struct RenderGraph {
    viewport: Viewport,
    bloom: BloomSettings,
    frames_drawn: u64,
    last_uniforms: Option<SceneUniforms>,
}

impl RenderGraph {
    pub fn new(viewport: Viewport) -> Self {
        Self {
            viewport,
            ..Default::default()
        }
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn bloom(&self) -> &BloomSettings {
        &self.bloom
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn
    }

    pub fn last_uniforms(&self) -> Option<&SceneUniforms> {
        self.last_uniforms.as_ref()
    }
}

impl RenderSurface for RenderGraph {
    fn resize(&mut self, viewport: Viewport) {
        tracing::debug!(width = viewport.width, height = viewport.height, "surface resized");
        self.viewport = viewport;
    }

    fn render(&mut self, uniforms: Option<&SceneUniforms>) -> Result<()> {
        self.frames_drawn += 1;
        if let Some(uniforms) = uniforms {
            self.last_uniforms = Some(uniforms.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_frames_and_size() {
        let mut graph = RenderGraph::new(Viewport::default());
        graph.render(None).unwrap();
        assert_eq!(graph.frames_drawn(), 1);
        assert!(graph.last_uniforms().is_none());

        let uniforms = SceneUniforms {
            time: 1.5,
            ..Default::default()
        };
        graph.render(Some(&uniforms)).unwrap();
        assert_eq!(graph.last_uniforms().unwrap().time, 1.5);

        graph.resize(Viewport {
            width: 800,
            height: 400,
            pixel_ratio: 2.0,
        });
        assert_eq!(graph.viewport().aspect(), 2.0);
    }

    #[test]
    fn bloom_defaults_match_the_tinted_look() {
        let graph = RenderGraph::default();
        assert!(graph.bloom().enabled);
        assert_eq!(graph.bloom().tint, 0x7f00ff);
    }
}
