//! Frame ticker.
//!
//! The ticker re-arms itself on every frame of the [`EventLoop`], records the
//! frame timing and publishes [`TICK_EVENT`] without payload. Subscribers
//! read the timing through [`Ticker::times`].

use std::{cell::Cell, fmt, rc::Rc};

use crate::{
    events::{EventBus, SubscriptionToken},
    runtime::{EventLoop, FrameHandle},
    Result,
};

pub const TICK_EVENT: &str = "tick";

/// Delta reported before the first frame arrives.
pub const INITIAL_DELTA_MS: f64 = 16.0;

/// Timing snapshot, all values in milliseconds.
///
/// `elapsed` is measured up to the frame *before* the latest one, so it lags
/// `current - start` by one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTimes {
    pub start: f64,
    pub current: f64,
    pub elapsed: f64,
    pub delta: f64,
}

impl FrameTimes {
    fn starting_at(start: f64) -> Self {
        Self {
            start,
            current: start,
            elapsed: 0.0,
            delta: INITIAL_DELTA_MS,
        }
    }

    fn advance(&mut self, now: f64) {
        self.delta = now - self.current;
        self.elapsed = self.current - self.start;
        self.current = now;
    }
}

struct TickerInner {
    times: Cell<FrameTimes>,
    frames: Cell<u64>,
    pending: Cell<Option<FrameHandle>>,
    running: Cell<bool>,
    events: EventBus<()>,
}

#[derive(Clone)]
pub struct Ticker {
    inner: Rc<TickerInner>,
}

impl Ticker {
    pub fn new(start_ms: f64) -> Self {
        Self {
            inner: Rc::new(TickerInner {
                times: Cell::new(FrameTimes::starting_at(start_ms)),
                frames: Cell::new(0),
                pending: Cell::new(None),
                running: Cell::new(false),
                events: EventBus::new(),
            }),
        }
    }

    /// Starts the self re-arming frame loop on `event_loop`.
    pub fn start(&self, event_loop: &EventLoop) {
        if self.inner.running.replace(true) {
            return;
        }
        self.arm(event_loop);
    }

    /// Stops re-arming. A frame that is already executing still publishes.
    pub fn stop(&self, event_loop: &EventLoop) {
        self.inner.running.set(false);
        if let Some(handle) = self.inner.pending.take() {
            event_loop.cancel_frame(handle);
        }
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.get()
    }

    /// Records a frame at `now_ms` and publishes [`TICK_EVENT`].
    pub fn tick_at(&self, now_ms: f64) -> Result<()> {
        let mut times = self.inner.times.get();
        times.advance(now_ms);
        self.inner.times.set(times);
        self.inner.frames.set(self.inner.frames.get() + 1);

        self.inner.events.publish(TICK_EVENT, &())?;
        Ok(())
    }

    pub fn on_tick<F>(&self, handler: F) -> SubscriptionToken
    where
        F: Fn() -> Result<()> + 'static,
    {
        self.inner.events.subscribe(TICK_EVENT, move |_| handler())
    }

    pub fn events(&self) -> &EventBus<()> {
        &self.inner.events
    }

    pub fn times(&self) -> FrameTimes {
        self.inner.times.get()
    }

    pub fn delta(&self) -> f64 {
        self.times().delta
    }

    pub fn elapsed(&self) -> f64 {
        self.times().elapsed
    }

    pub fn frames(&self) -> u64 {
        self.inner.frames.get()
    }

    /// Seconds between the start and the latest frame, without the one-tick
    /// lag of [`FrameTimes::elapsed`].
    pub fn clock_elapsed_secs(&self) -> f64 {
        let times = self.times();
        (times.current - times.start) / 1000.0
    }

    fn arm(&self, event_loop: &EventLoop) {
        let ticker = self.clone();
        let handle = event_loop.request_frame(move |event_loop, now| {
            ticker.inner.pending.set(None);
            if !ticker.is_running() {
                return Ok(());
            }
            let published = ticker.tick_at(now);
            if ticker.is_running() {
                ticker.arm(event_loop);
            }
            published
        });
        self.inner.pending.set(Some(handle));
    }
}

impl fmt::Debug for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Ticker")
            .field("times", &self.times())
            .field("frames", &self.frames())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;
    use crate::ResonanceError;

    fn observe(ticker: &Ticker) -> Rc<RefCell<Vec<(f64, f64)>>> {
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let source = ticker.clone();
        ticker.on_tick(move || {
            let times = source.times();
            sink.borrow_mut().push((times.delta, times.elapsed));
            Ok(())
        });
        seen
    }

    #[test]
    fn elapsed_lags_one_tick_behind_delta() {
        let ticker = Ticker::new(0.0);
        let seen = observe(&ticker);

        ticker.tick_at(16.0).unwrap();
        ticker.tick_at(33.0).unwrap();

        assert_eq!(*seen.borrow(), vec![(16.0, 0.0), (17.0, 16.0)]);
        assert_eq!(ticker.clock_elapsed_secs(), 0.033);
    }

    #[test]
    fn initial_delta_is_sixteen_ms() {
        let ticker = Ticker::new(1_000.0);
        assert_eq!(ticker.delta(), INITIAL_DELTA_MS);
        assert_eq!(ticker.elapsed(), 0.0);
        assert_eq!(ticker.frames(), 0);
    }

    #[test]
    fn rearms_on_every_frame_until_stopped() {
        let event_loop = EventLoop::new();
        let ticker = Ticker::new(event_loop.now_ms());
        let seen = observe(&ticker);

        ticker.start(&event_loop);
        ticker.start(&event_loop);
        assert_eq!(event_loop.pending_frames(), 1);

        event_loop.run_frame(16.0).unwrap();
        event_loop.run_frame(33.0).unwrap();
        event_loop.run_frame(50.0).unwrap();
        assert_eq!(ticker.frames(), 3);
        assert_eq!(seen.borrow().last(), Some(&(17.0, 33.0)));

        ticker.stop(&event_loop);
        assert_eq!(event_loop.pending_frames(), 0);
        event_loop.run_frame(66.0).unwrap();
        assert_eq!(ticker.frames(), 3);
        assert!(!ticker.is_running());
    }

    #[test]
    fn delta_follows_host_frame_spacing() {
        let event_loop = EventLoop::new();
        let ticker = Ticker::new(0.0);
        let seen = observe(&ticker);
        ticker.start(&event_loop);

        for now in [16.0, 50.0, 51.0] {
            event_loop.run_frame(now).unwrap();
        }

        let deltas: Vec<f64> = seen.borrow().iter().map(|(d, _)| *d).collect();
        assert_eq!(deltas, vec![16.0, 34.0, 1.0]);
    }

    #[test]
    fn failing_subscriber_is_reported_but_keeps_ticking() {
        let event_loop = EventLoop::new();
        let ticker = Ticker::new(0.0);
        ticker.on_tick(|| Err(ResonanceError::msg("scene exploded")));
        ticker.start(&event_loop);

        assert!(event_loop.run_frame(16.0).is_err());
        assert_eq!(ticker.frames(), 1);
        // The callback re-armed before reporting the failure.
        assert_eq!(event_loop.pending_frames(), 1);
    }
}
