use std::{
    cell::{Ref, RefCell},
    collections::{BTreeMap, HashMap, HashSet},
    fmt,
    rc::Rc,
};

use super::{Asset, AssetLoader, Completion, LoadFailure, LoaderRegistry, SourceDescriptor, SourceKind};
use crate::{
    events::{EventBus, SubscriptionToken},
    runtime::EventLoop,
    ResonanceError, Result,
};

/// Published once, after the last outstanding fetch completed.
pub const READY_EVENT: &str = "ready";
/// Published for every fetch that failed permanently.
pub const LOAD_ERROR_EVENT: &str = "load-error";

/// Payload carried by the loader's event bus.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceEvent {
    Ready,
    LoadError(LoadFailure),
}

/// Bookkeeping of the loading barrier. `loaded` only grows and `ready_fired`
/// flips to `true` at most once.
#[derive(Debug, Default)]
pub struct LoadState {
    pub total: usize,
    pub loaded: usize,
    pub items: HashMap<String, Rc<Asset>>,
    pub ready_fired: bool,
    pub failures: Vec<LoadFailure>,
    completed: Vec<bool>,
    started: bool,
}

struct LoaderInner {
    sources: Vec<SourceDescriptor>,
    loaders: BTreeMap<SourceKind, Box<dyn AssetLoader>>,
    state: RefCell<LoadState>,
    events: EventBus<ResourceEvent>,
}

/// Fetches every configured source concurrently and announces
/// [`READY_EVENT`] once all of them completed.
#[derive(Clone)]
pub struct ResourceLoader {
    inner: Rc<LoaderInner>,
}

impl ResourceLoader {
    /// Builds one loader per distinct source kind. Fetching only begins with
    /// [`ResourceLoader::start`], so subscribers can attach first.
    pub fn new(sources: Vec<SourceDescriptor>, registry: &LoaderRegistry) -> Result<Self> {
        let mut loaders = BTreeMap::new();
        let mut names = HashSet::new();

        for source in &sources {
            if !names.insert(source.name.as_str()) {
                tracing::warn!(
                    name = %source.name,
                    "duplicate source name, later items overwrite earlier ones"
                );
            }
            if !loaders.contains_key(&source.kind) {
                loaders.insert(source.kind, registry.instantiate(source.kind)?);
            }
        }
        tracing::debug!(
            sources = sources.len(),
            loaders = loaders.len(),
            "resource loader configured"
        );

        let state = LoadState {
            total: sources.len(),
            completed: vec![false; sources.len()],
            ..Default::default()
        };

        Ok(Self {
            inner: Rc::new(LoaderInner {
                sources,
                loaders,
                state: RefCell::new(state),
                events: EventBus::new(),
            }),
        })
    }

    /// Issues every fetch at once. With no sources configured the barrier is
    /// released right here and [`READY_EVENT`] is published synchronously.
    /// Calling `start` a second time does nothing.
    pub fn start(&self, event_loop: &EventLoop) -> Result<()> {
        let total = {
            let mut state = self.inner.state.borrow_mut();
            if state.started {
                tracing::debug!("resource loader already started");
                return Ok(());
            }
            state.started = true;
            state.total
        };

        if total == 0 {
            return self.release_barrier();
        }

        for (slot, source) in self.inner.sources.iter().enumerate() {
            let loader = self.inner.loaders.get(&source.kind).ok_or_else(|| {
                ResonanceError::Config(format!("no loader instantiated for `{}`", source.kind))
            })?;
            tracing::debug!(name = %source.name, kind = %source.kind, "fetching source");
            loader.load(&source.name, &source.locator, event_loop, self.completion(slot));
        }
        Ok(())
    }

    pub fn events(&self) -> &EventBus<ResourceEvent> {
        &self.inner.events
    }

    /// Subscribes a handler that runs once when the barrier releases.
    pub fn on_ready<F>(&self, handler: F) -> SubscriptionToken
    where
        F: FnOnce() -> Result<()> + 'static,
    {
        self.inner.events.subscribe_once(READY_EVENT, move |_| handler())
    }

    /// Subscribes a handler for every permanent fetch failure.
    pub fn on_load_error<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn(&LoadFailure) -> Result<()> + 'static,
    {
        self.inner
            .events
            .subscribe(LOAD_ERROR_EVENT, move |event: &ResourceEvent| match event {
                ResourceEvent::LoadError(failure) => handler(failure),
                ResourceEvent::Ready => Ok(()),
            })
    }

    pub fn sources(&self) -> &[SourceDescriptor] {
        &self.inner.sources
    }

    pub fn total(&self) -> usize {
        self.inner.state.borrow().total
    }

    pub fn loaded(&self) -> usize {
        self.inner.state.borrow().loaded
    }

    /// Fraction of sources loaded so far, `1.0` when nothing is configured.
    pub fn progress(&self) -> f32 {
        let state = self.inner.state.borrow();
        if state.total == 0 {
            1.0
        } else {
            state.loaded as f32 / state.total as f32
        }
    }

    pub fn is_ready(&self) -> bool {
        self.inner.state.borrow().ready_fired
    }

    pub fn item(&self, name: &str) -> Option<Rc<Asset>> {
        self.inner.state.borrow().items.get(name).cloned()
    }

    pub fn item_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.state.borrow().items.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub fn failures(&self) -> Vec<LoadFailure> {
        self.inner.state.borrow().failures.clone()
    }

    pub fn state(&self) -> Ref<'_, LoadState> {
        self.inner.state.borrow()
    }

    fn completion(&self, slot: usize) -> Completion {
        let weak = Rc::downgrade(&self.inner);
        Box::new(move |outcome| match weak.upgrade() {
            Some(inner) => ResourceLoader { inner }.source_loaded(slot, outcome),
            None => Ok(()),
        })
    }

    fn source_loaded(
        &self,
        slot: usize,
        outcome: std::result::Result<Asset, LoadFailure>,
    ) -> Result<()> {
        let source = self.inner.sources.get(slot).ok_or_else(|| {
            ResonanceError::msg(format!("completion for unknown source slot {slot}"))
        })?;

        let asset = match outcome {
            Ok(asset) => asset,
            Err(failure) => {
                tracing::warn!(%failure, "source failed to load, ready barrier stalls");
                self.inner.state.borrow_mut().failures.push(failure.clone());
                self.inner
                    .events
                    .publish(LOAD_ERROR_EVENT, &ResourceEvent::LoadError(failure))?;
                return Ok(());
            }
        };

        let release = {
            let mut state = self.inner.state.borrow_mut();
            state.items.insert(source.name.clone(), Rc::new(asset));

            if state.completed[slot] {
                tracing::debug!(name = %source.name, "redundant completion ignored");
            } else {
                state.completed[slot] = true;
                state.loaded += 1;
                tracing::debug!(
                    name = %source.name,
                    loaded = state.loaded,
                    total = state.total,
                    "source loaded"
                );
            }

            state.loaded == state.total && !state.ready_fired
        };

        if release {
            self.release_barrier()?;
        }
        Ok(())
    }

    fn release_barrier(&self) -> Result<()> {
        {
            let mut state = self.inner.state.borrow_mut();
            if state.ready_fired {
                return Ok(());
            }
            state.ready_fired = true;
            tracing::info!(total = state.total, "all sources loaded");
        }
        self.inner.events.publish(READY_EVENT, &ResourceEvent::Ready)?;
        Ok(())
    }
}

impl fmt::Debug for ResourceLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.borrow();
        f.debug_struct("ResourceLoader")
            .field("kinds", &self.inner.loaders.keys().collect::<Vec<_>>())
            .field("total", &state.total)
            .field("loaded", &state.loaded)
            .field("ready_fired", &state.ready_fired)
            .finish()
    }
}
