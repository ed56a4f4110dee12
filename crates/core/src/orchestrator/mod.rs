//! Composition root.
//!
//! One [`Orchestrator`] owns the resource barrier, the frame ticker, the
//! animation controller, the scene and the renderer for a run. Collaborators
//! never reach for a global instance; the orchestrator hands them what they
//! need explicitly.

use std::{
    cell::{Cell, Ref, RefCell},
    fmt,
    rc::{Rc, Weak},
};

use crate::{
    animation::{AnimationController, ParamValue},
    assets::{LoaderRegistry, ResourceLoader, LOAD_ERROR_EVENT, READY_EVENT},
    audio::{AudioEngine, FrequencyAnalyser, PcmBuffer, PulseSource, SampleSource},
    config::AppConfig,
    debug::DebugPanel,
    events::SubscriptionToken,
    input::InputEvent,
    render::{RenderGraph, RenderSurface, Viewport},
    runtime::EventLoop,
    scene::World,
    timeline::{Ticker, TICK_EVENT},
    Result,
};

/// Pitch and tempo of the pulse played when no track is configured.
const PULSE_FREQUENCY_HZ: f32 = 110.0;
const PULSE_TEMPO_BPM: f32 = 120.0;

#[derive(Default)]
struct Subscriptions {
    tick: Option<SubscriptionToken>,
    ready: Option<SubscriptionToken>,
    load_error: Option<SubscriptionToken>,
}

struct Inner<R> {
    config: AppConfig,
    event_loop: EventLoop,
    resources: ResourceLoader,
    ticker: Ticker,
    controller: RefCell<AnimationController>,
    world: RefCell<World>,
    renderer: RefCell<R>,
    audio: RefCell<Option<AudioEngine>>,
    audio_requested: Cell<bool>,
    debug: RefCell<DebugPanel>,
    subscriptions: RefCell<Subscriptions>,
    torn_down: Cell<bool>,
}

/// Cloneable handle over the running experience.
pub struct Orchestrator<R: RenderSurface + 'static = RenderGraph> {
    inner: Rc<Inner<R>>,
}

impl<R: RenderSurface + 'static> Clone for Orchestrator<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl Orchestrator<RenderGraph> {
    /// Wires a run against the filesystem under `config.assets.root` and the
    /// headless renderer.
    pub fn from_config(config: AppConfig, event_loop: &EventLoop) -> Result<Self> {
        let registry = LoaderRegistry::filesystem(config.assets.root.clone());
        let renderer = RenderGraph::new(config.viewport);
        Self::new(config, event_loop, &registry, renderer)
    }
}

impl<R: RenderSurface + 'static> Orchestrator<R> {
    /// Builds every component, subscribes to the ticker and the resource
    /// barrier, then starts fetching and ticking.
    ///
    /// With no sources configured the world is constructed right away;
    /// otherwise construction waits for the single `ready` publication.
    pub fn new(
        config: AppConfig,
        event_loop: &EventLoop,
        registry: &LoaderRegistry,
        renderer: R,
    ) -> Result<Self> {
        let resources = ResourceLoader::new(config.assets.sources.clone(), registry)?;
        let controller = AnimationController::from_config(&config.animation)?;
        let debug = DebugPanel::new(config.debug.active, &config.animation.parameters);

        let orchestrator = Self {
            inner: Rc::new(Inner {
                event_loop: event_loop.clone(),
                resources,
                ticker: Ticker::new(event_loop.now_ms()),
                controller: RefCell::new(controller),
                world: RefCell::new(World::new()),
                renderer: RefCell::new(renderer),
                audio: RefCell::new(None),
                audio_requested: Cell::new(false),
                debug: RefCell::new(debug),
                subscriptions: RefCell::new(Subscriptions::default()),
                torn_down: Cell::new(false),
                config,
            }),
        };
        orchestrator.wire()?;
        tracing::info!(
            sources = orchestrator.inner.resources.total(),
            debug = orchestrator.inner.debug.borrow().is_active(),
            "orchestrator started"
        );
        Ok(orchestrator)
    }

    fn wire(&self) -> Result<()> {
        let inner = &self.inner;

        let weak = self.downgrade();
        let tick = inner.ticker.on_tick(move || match weak.upgrade() {
            Some(inner) => Orchestrator { inner }.update(),
            None => Ok(()),
        });

        let load_error = inner.resources.on_load_error(|failure| {
            tracing::error!(%failure, "asset unavailable, the scene will not be built");
            Ok(())
        });

        let ready = if inner.resources.total() == 0 {
            self.build_world();
            None
        } else {
            let weak = self.downgrade();
            Some(inner.resources.on_ready(move || {
                if let Some(inner) = weak.upgrade() {
                    Orchestrator { inner }.build_world();
                }
                Ok(())
            }))
        };

        *inner.subscriptions.borrow_mut() = Subscriptions {
            tick: Some(tick),
            ready,
            load_error: Some(load_error),
        };

        inner.resources.start(&inner.event_loop)?;
        inner.ticker.start(&inner.event_loop);
        Ok(())
    }

    fn downgrade(&self) -> Weak<Inner<R>> {
        Rc::downgrade(&self.inner)
    }

    fn build_world(&self) {
        let inner = &self.inner;
        inner.world.borrow_mut().build(
            &inner.resources,
            inner.config.animation.click.clone(),
            inner.config.assets.environment_map.as_deref(),
        );
    }

    /// Per-tick fan-out: audio first, then the scene (which drives the
    /// animation controller), then the renderer.
    fn update(&self) -> Result<()> {
        let inner = &self.inner;
        let mut audio = inner.audio.borrow_mut();
        if let Some(engine) = audio.as_mut() {
            engine.pump(inner.ticker.delta());
        }
        let analyser = audio
            .as_mut()
            .map(|engine| engine as &mut dyn FrequencyAnalyser);

        let uniforms = inner.world.borrow().update(
            &inner.ticker,
            &mut inner.controller.borrow_mut(),
            analyser,
        )?;
        inner.renderer.borrow_mut().render(uniforms.as_ref())
    }

    pub fn resize(&self, viewport: Viewport) {
        self.inner.renderer.borrow_mut().resize(viewport);
    }

    /// Debug toggles and "click to animate". The first pointer gesture also
    /// schedules audio start on the next turn of the loop.
    pub fn handle_input(&self, event: &InputEvent) -> Result<()> {
        let inner = &self.inner;
        inner.debug.borrow_mut().handle_input(event);
        if !event.is_pointer() {
            return Ok(());
        }

        let outcome = inner
            .world
            .borrow()
            .animate(&mut inner.controller.borrow_mut())?;
        tracing::debug!(?outcome, "pointer animation");

        if !inner.audio_requested.replace(true) {
            let weak = self.downgrade();
            inner.event_loop.defer(0.0, move |_| {
                if let Some(inner) = weak.upgrade() {
                    Orchestrator { inner }.enable_audio();
                }
                Ok(())
            });
        }
        Ok(())
    }

    fn enable_audio(&self) {
        let audio = &self.inner.config.audio;
        let source: Box<dyn SampleSource> = match &audio.track {
            Some(path) => match PcmBuffer::from_file(path, audio.looping) {
                Ok(buffer) => Box::new(buffer),
                Err(err) => {
                    tracing::error!(path = %path.display(), %err, "audio track unavailable");
                    return;
                }
            },
            None => Box::new(PulseSource::new(
                audio.sample_rate,
                PULSE_FREQUENCY_HZ,
                PULSE_TEMPO_BPM,
            )),
        };

        match AudioEngine::new(source, audio.analyser, audio.sample_rate, audio.volume) {
            Ok(engine) => {
                tracing::info!(sample_rate = audio.sample_rate, "audio enabled");
                *self.inner.audio.borrow_mut() = Some(engine);
            }
            Err(err) => tracing::error!(%err, "audio engine could not start"),
        }
    }

    /// Stops the ticker and drops every subscription the orchestrator made.
    /// Fetches already in flight still complete into the loader.
    pub fn teardown(&self) {
        let inner = &self.inner;
        if inner.torn_down.replace(true) {
            return;
        }
        inner.ticker.stop(&inner.event_loop);

        let subscriptions = std::mem::take(&mut *inner.subscriptions.borrow_mut());
        if let Some(token) = subscriptions.tick {
            inner.ticker.events().unsubscribe(TICK_EVENT, Some(token));
        }
        if let Some(token) = subscriptions.ready {
            inner.resources.events().unsubscribe(READY_EVENT, Some(token));
        }
        if let Some(token) = subscriptions.load_error {
            inner
                .resources
                .events()
                .unsubscribe(LOAD_ERROR_EVENT, Some(token));
        }
        tracing::info!(frames = inner.ticker.frames(), "orchestrator torn down");
    }

    pub fn config(&self) -> &AppConfig {
        &self.inner.config
    }

    pub fn event_loop(&self) -> &EventLoop {
        &self.inner.event_loop
    }

    pub fn resources(&self) -> &ResourceLoader {
        &self.inner.resources
    }

    pub fn ticker(&self) -> &Ticker {
        &self.inner.ticker
    }

    pub fn controller(&self) -> Ref<'_, AnimationController> {
        self.inner.controller.borrow()
    }

    pub fn value(&self, name: &str) -> Option<ParamValue> {
        self.inner.controller.borrow().value(name)
    }

    pub fn world(&self) -> Ref<'_, World> {
        self.inner.world.borrow()
    }

    pub fn is_world_built(&self) -> bool {
        self.inner.world.borrow().is_built()
    }

    pub fn renderer(&self) -> Ref<'_, R> {
        self.inner.renderer.borrow()
    }

    pub fn debug(&self) -> Ref<'_, DebugPanel> {
        self.inner.debug.borrow()
    }

    /// Tunes a parameter through the debug bindings.
    pub fn debug_write(&self, name: &str, value: ParamValue) -> Result<ParamValue> {
        self.inner
            .debug
            .borrow()
            .write(&mut self.inner.controller.borrow_mut(), name, value)
    }

    pub fn is_audio_enabled(&self) -> bool {
        self.inner.audio.borrow().is_some()
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.get()
    }
}

impl<R: RenderSurface + 'static> fmt::Debug for Orchestrator<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("loaded", &self.inner.resources.loaded())
            .field("total", &self.inner.resources.total())
            .field("ticker", &self.inner.ticker)
            .field("world_built", &self.is_world_built())
            .field("audio", &self.is_audio_enabled())
            .field("torn_down", &self.is_torn_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        animation::TransitionState,
        assets::{Asset, AssetLoader, Completion, SourceDescriptor, SourceKind},
        scene::SceneUniforms,
    };

    /// Completes every fetch after 10 ms.
    struct SlowLoader(SourceKind);

    impl AssetLoader for SlowLoader {
        fn kind(&self) -> SourceKind {
            self.0
        }

        fn load(&self, _: &str, _: &[String], event_loop: &EventLoop, done: Completion) {
            let kind = self.0;
            event_loop.defer(10.0, move |_| done(Ok(Asset::new(kind, Vec::new()))));
        }
    }

    fn registry() -> LoaderRegistry {
        let mut registry = LoaderRegistry::new();
        for kind in SourceKind::ALL {
            registry.register(kind, move || -> Box<dyn AssetLoader> {
                Box::new(SlowLoader(kind))
            });
        }
        registry
    }

    fn config(sources: Vec<SourceDescriptor>) -> AppConfig {
        let mut config = AppConfig::default();
        config.assets.sources = sources;
        config.animation.seed = Some(7);
        config
    }

    fn orchestrator(sources: Vec<SourceDescriptor>) -> (EventLoop, Orchestrator) {
        let event_loop = EventLoop::new();
        let orchestrator = Orchestrator::new(
            config(sources),
            &event_loop,
            &registry(),
            RenderGraph::default(),
        )
        .unwrap();
        (event_loop, orchestrator)
    }

    fn texture(name: &str) -> SourceDescriptor {
        SourceDescriptor::new(name, ["texture.png"], SourceKind::Texture)
    }

    #[test]
    fn zero_sources_build_the_world_immediately() {
        let (event_loop, orchestrator) = orchestrator(Vec::new());
        assert!(orchestrator.is_world_built());
        assert!(orchestrator.resources().is_ready());

        event_loop.run_frame(16.0).unwrap();
        let renderer = orchestrator.renderer();
        assert_eq!(renderer.frames_drawn(), 1);
        assert!(renderer.last_uniforms().is_some());
    }

    #[test]
    fn world_waits_for_the_ready_barrier() {
        let (event_loop, orchestrator) =
            orchestrator(vec![texture("a"), texture("b")]);
        assert!(!orchestrator.is_world_built());

        event_loop.run_frame(5.0).unwrap();
        assert_eq!(orchestrator.renderer().frames_drawn(), 1);
        assert!(orchestrator.renderer().last_uniforms().is_none());

        event_loop.run_frame(21.0).unwrap();
        assert!(orchestrator.is_world_built());
        assert_eq!(orchestrator.resources().loaded(), 2);
        let uniforms: SceneUniforms = orchestrator.renderer().last_uniforms().unwrap().clone();
        assert!((uniforms.time - 0.021).abs() < 1e-6);
        assert_eq!(orchestrator.ticker().frames(), 2);
    }

    #[test]
    fn click_animates_and_enables_audio_once() {
        let (event_loop, orchestrator) = orchestrator(Vec::new());
        orchestrator.handle_input(&InputEvent::Click).unwrap();
        assert_eq!(
            orchestrator.controller().state("distortion_strength"),
            Some(TransitionState::InFlight)
        );
        assert!(!orchestrator.is_audio_enabled());

        orchestrator.handle_input(&InputEvent::Touch { contacts: 1 }).unwrap();
        assert_eq!(event_loop.pending_timers(), 1);

        event_loop.run_frame(16.0).unwrap();
        assert!(orchestrator.is_audio_enabled());

        event_loop.run_frame(1_100.0).unwrap();
        assert_eq!(
            orchestrator.controller().state("distortion_strength"),
            Some(TransitionState::Idle)
        );
    }

    #[test]
    fn missing_track_leaves_audio_off() {
        let event_loop = EventLoop::new();
        let mut config = config(Vec::new());
        config.audio.track = Some("does/not/exist.f32".into());
        let orchestrator =
            Orchestrator::new(config, &event_loop, &registry(), RenderGraph::default()).unwrap();

        orchestrator.handle_input(&InputEvent::Click).unwrap();
        event_loop.run_frame(16.0).unwrap();
        assert!(!orchestrator.is_audio_enabled());
    }

    #[test]
    fn debug_gesture_and_writes() {
        let (_event_loop, orchestrator) = orchestrator(Vec::new());
        orchestrator
            .handle_input(&InputEvent::Key {
                key: "D".to_string(),
                shift: true,
            })
            .unwrap();
        assert!(orchestrator.debug().is_active());
        assert_eq!(
            orchestrator.controller().state("distortion_strength"),
            Some(TransitionState::Idle)
        );

        orchestrator
            .debug_write("speed", ParamValue::Scalar(9.0))
            .unwrap();
        assert_eq!(orchestrator.value("speed"), Some(ParamValue::Scalar(5.0)));
    }

    #[test]
    fn resize_reaches_the_renderer() {
        let (_event_loop, orchestrator) = orchestrator(Vec::new());
        let viewport = Viewport {
            width: 640,
            height: 480,
            pixel_ratio: 2.0,
        };
        orchestrator.resize(viewport);
        assert_eq!(orchestrator.renderer().viewport(), viewport);
    }

    #[test]
    fn teardown_stops_ticking_and_unsubscribes() {
        let (event_loop, orchestrator) = orchestrator(vec![texture("a")]);
        event_loop.run_frame(16.0).unwrap();

        orchestrator.teardown();
        orchestrator.teardown();
        assert!(orchestrator.is_torn_down());
        assert!(!orchestrator.ticker().is_running());
        assert_eq!(event_loop.pending_frames(), 0);
        assert_eq!(orchestrator.ticker().events().subscriber_count(TICK_EVENT), 0);
        assert_eq!(orchestrator.resources().events().subscriber_count(READY_EVENT), 0);

        // The fetch still lands, but nothing builds the world any more.
        event_loop.run_until_idle().unwrap();
        assert!(orchestrator.resources().is_ready());
        assert!(!orchestrator.is_world_built());
        assert_eq!(orchestrator.renderer().frames_drawn(), 1);
    }
}
