//! Single-threaded cooperative event loop.
//!
//! Asset completions and frame callbacks are modelled as discrete turns that
//! run one after another on the thread driving the loop. The loop owns a
//! monotonic millisecond clock which only moves when the driver calls
//! [`EventLoop::advance_to`] or [`EventLoop::run_frame`]; the binary feeds it
//! the host wall clock, tests feed it whatever timeline they need.

use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::BinaryHeap,
    fmt,
    rc::Rc,
};

use crate::Result;

type Job = Box<dyn FnOnce(&EventLoop) -> Result<()>>;
type FrameCallback = Box<dyn FnOnce(&EventLoop, f64) -> Result<()>>;

/// Identifies a pending frame request so it can be cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameHandle(u64);

struct Timer {
    due_ms: f64,
    seq: u64,
    job: Job,
}

impl PartialEq for Timer {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Timer {}

impl PartialOrd for Timer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timer {
    // Reversed so the max-heap pops the earliest due timer, ties broken by
    // insertion order.
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .due_ms
            .total_cmp(&self.due_ms)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct FrameRequest {
    handle: FrameHandle,
    callback: FrameCallback,
}

#[derive(Default)]
struct LoopState {
    now_ms: f64,
    next_seq: u64,
    timers: BinaryHeap<Timer>,
    frames: Vec<FrameRequest>,
}

/// Cloneable handle over the shared loop state.
#[derive(Clone, Default)]
pub struct EventLoop {
    state: Rc<RefCell<LoopState>>,
}

impl EventLoop {
    /// Creates a loop whose clock starts at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a loop whose clock starts at `now_ms`.
    pub fn starting_at(now_ms: f64) -> Self {
        let event_loop = Self::default();
        event_loop.state.borrow_mut().now_ms = now_ms.max(0.0);
        event_loop
    }

    pub fn now_ms(&self) -> f64 {
        self.state.borrow().now_ms
    }

    /// Queues `job` to run once the clock reaches `now + delay_ms`.
    pub fn defer<F>(&self, delay_ms: f64, job: F)
    where
        F: FnOnce(&EventLoop) -> Result<()> + 'static,
    {
        let mut state = self.state.borrow_mut();
        let due_ms = state.now_ms + delay_ms.max(0.0);
        let seq = state.next_seq;
        state.next_seq += 1;
        state.timers.push(Timer {
            due_ms,
            seq,
            job: Box::new(job),
        });
    }

    /// Asks for `callback` to run on the next frame. The callback receives the
    /// frame timestamp and must re-request itself to keep running.
    pub fn request_frame<F>(&self, callback: F) -> FrameHandle
    where
        F: FnOnce(&EventLoop, f64) -> Result<()> + 'static,
    {
        let mut state = self.state.borrow_mut();
        let handle = FrameHandle(state.next_seq);
        state.next_seq += 1;
        state.frames.push(FrameRequest {
            handle,
            callback: Box::new(callback),
        });
        handle
    }

    /// Drops a pending frame request. Returns `false` when the request
    /// already ran or was never issued by this loop.
    pub fn cancel_frame(&self, handle: FrameHandle) -> bool {
        let mut state = self.state.borrow_mut();
        let before = state.frames.len();
        state.frames.retain(|request| request.handle != handle);
        state.frames.len() != before
    }

    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.len()
    }

    pub fn pending_frames(&self) -> usize {
        self.state.borrow().frames.len()
    }

    /// Runs every timer due at or before `target_ms`, including timers queued
    /// by those jobs, then leaves the clock at `target_ms`. Returns the number
    /// of jobs run. The clock never moves backwards.
    ///
    /// A failing job does not prevent later jobs from running; the first
    /// error is returned once the batch is done.
    pub fn advance_to(&self, target_ms: f64) -> Result<usize> {
        let mut ran = 0;
        let mut first_error = None;

        while let Some(timer) = self.pop_due(target_ms) {
            ran += 1;
            if let Err(err) = (timer.job)(self) {
                tracing::warn!(due_ms = timer.due_ms, %err, "deferred job failed");
                first_error.get_or_insert(err);
            }
        }

        {
            let mut state = self.state.borrow_mut();
            state.now_ms = state.now_ms.max(target_ms);
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(ran),
        }
    }

    /// Advances to `timestamp_ms` and then runs the frame callbacks that were
    /// requested before this frame started. Returns the number of frame
    /// callbacks run.
    pub fn run_frame(&self, timestamp_ms: f64) -> Result<usize> {
        let timers = self.advance_to(timestamp_ms);

        let requests = std::mem::take(&mut self.state.borrow_mut().frames);
        let now = self.now_ms();
        let ran = requests.len();
        let mut first_error = timers.err();

        for request in requests {
            if let Err(err) = (request.callback)(self, now) {
                tracing::warn!(timestamp_ms = now, %err, "frame callback failed");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(ran),
        }
    }

    /// Runs every queued timer regardless of its due time, moving the clock
    /// forward as needed. Frame requests are left untouched.
    pub fn run_until_idle(&self) -> Result<usize> {
        let mut ran = 0;
        loop {
            let next_due = self.state.borrow().timers.peek().map(|timer| timer.due_ms);
            match next_due {
                Some(due_ms) => ran += self.advance_to(due_ms)?,
                None => return Ok(ran),
            }
        }
    }

    fn pop_due(&self, target_ms: f64) -> Option<Timer> {
        let mut state = self.state.borrow_mut();
        if state.timers.peek()?.due_ms > target_ms {
            return None;
        }
        let timer = state.timers.pop()?;
        state.now_ms = state.now_ms.max(timer.due_ms);
        Some(timer)
    }
}

impl fmt::Debug for EventLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("EventLoop")
            .field("now_ms", &state.now_ms)
            .field("timers", &state.timers.len())
            .field("frames", &state.frames.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::ResonanceError;

    fn log() -> Rc<RefCell<Vec<(String, f64)>>> {
        Rc::new(RefCell::new(Vec::new()))
    }

    #[test]
    fn runs_timers_in_due_order() {
        let event_loop = EventLoop::new();
        let seen = log();

        for (label, delay) in [("slow", 20.0), ("fast", 10.0), ("mid", 15.0)] {
            let seen = Rc::clone(&seen);
            event_loop.defer(delay, move |lp| {
                seen.borrow_mut().push((label.to_string(), lp.now_ms()));
                Ok(())
            });
        }

        assert_eq!(event_loop.advance_to(12.0).unwrap(), 1);
        assert_eq!(event_loop.now_ms(), 12.0);
        assert_eq!(event_loop.advance_to(30.0).unwrap(), 2);

        let seen = seen.borrow();
        let labels: Vec<&str> = seen.iter().map(|(l, _)| l.as_str()).collect();
        assert_eq!(labels, vec!["fast", "mid", "slow"]);
        assert_eq!(seen[2].1, 20.0);
    }

    #[test]
    fn equal_due_times_keep_insertion_order() {
        let event_loop = EventLoop::new();
        let seen = log();

        for label in ["a", "b", "c"] {
            let seen = Rc::clone(&seen);
            event_loop.defer(5.0, move |lp| {
                seen.borrow_mut().push((label.to_string(), lp.now_ms()));
                Ok(())
            });
        }

        event_loop.run_until_idle().unwrap();
        let labels: Vec<String> = seen.borrow().iter().map(|(l, _)| l.clone()).collect();
        assert_eq!(labels, vec!["a", "b", "c"]);
    }

    #[test]
    fn clock_never_moves_backwards() {
        let event_loop = EventLoop::starting_at(50.0);
        event_loop.advance_to(10.0).unwrap();
        assert_eq!(event_loop.now_ms(), 50.0);
    }

    #[test]
    fn frame_callbacks_rearm_into_next_frame() {
        let event_loop = EventLoop::new();
        let frames = Rc::new(Cell::new(0));

        fn arm(event_loop: &EventLoop, frames: Rc<Cell<u32>>) {
            event_loop.request_frame(move |lp, _| {
                frames.set(frames.get() + 1);
                arm(lp, frames);
                Ok(())
            });
        }
        arm(&event_loop, Rc::clone(&frames));

        assert_eq!(event_loop.run_frame(16.0).unwrap(), 1);
        assert_eq!(event_loop.run_frame(33.0).unwrap(), 1);
        assert_eq!(frames.get(), 2);
        assert_eq!(event_loop.pending_frames(), 1);
    }

    #[test]
    fn cancelled_frames_do_not_run() {
        let event_loop = EventLoop::new();
        let hit = Rc::new(Cell::new(false));
        let flag = Rc::clone(&hit);
        let handle = event_loop.request_frame(move |_, _| {
            flag.set(true);
            Ok(())
        });

        assert!(event_loop.cancel_frame(handle));
        assert!(!event_loop.cancel_frame(handle));
        assert_eq!(event_loop.run_frame(16.0).unwrap(), 0);
        assert!(!hit.get());
    }

    #[test]
    fn failing_job_does_not_starve_the_batch() {
        let event_loop = EventLoop::new();
        let hit = Rc::new(Cell::new(false));

        event_loop.defer(1.0, |_| Err(ResonanceError::msg("broken fetch")));
        let flag = Rc::clone(&hit);
        event_loop.defer(2.0, move |_| {
            flag.set(true);
            Ok(())
        });

        let err = event_loop.advance_to(5.0).unwrap_err();
        assert_eq!(err.to_string(), "broken fetch");
        assert!(hit.get());
        assert_eq!(event_loop.pending_timers(), 0);
    }

    #[test]
    fn jobs_scheduled_inside_the_window_also_run() {
        let event_loop = EventLoop::new();
        let hit = Rc::new(Cell::new(0.0));
        let slot = Rc::clone(&hit);

        event_loop.defer(5.0, move |lp| {
            lp.defer(5.0, move |lp| {
                slot.set(lp.now_ms());
                Ok(())
            });
            Ok(())
        });

        assert_eq!(event_loop.advance_to(20.0).unwrap(), 2);
        assert_eq!(hit.get(), 10.0);
    }
}
