//! In-process publish/subscribe channel.
//!
//! Every component that announces something (the resource barrier, the frame
//! ticker) owns one [`EventBus`]. Delivery is synchronous, happens on the
//! caller's turn and walks a snapshot of the subscriber list taken when
//! [`EventBus::publish`] starts, so handlers are free to subscribe or
//! unsubscribe while being called without affecting the ongoing delivery.

use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    rc::Rc,
};

use crate::Result;

type Handler<P> = Rc<dyn Fn(&P) -> Result<()>>;

/// Opaque handle returned by [`EventBus::subscribe`], used to remove exactly
/// one subscription later on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionToken(u64);

struct Subscription<P> {
    token: SubscriptionToken,
    once: bool,
    handler: Handler<P>,
}

struct BusState<P> {
    next_token: u64,
    subscriptions: HashMap<String, Vec<Subscription<P>>>,
}

/// Publish/subscribe channel keyed by event name and carrying payloads of
/// type `P`.
pub struct EventBus<P> {
    state: RefCell<BusState<P>>,
}

impl<P> Default for EventBus<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P> EventBus<P> {
    pub fn new() -> Self {
        Self {
            state: RefCell::new(BusState {
                next_token: 0,
                subscriptions: HashMap::new(),
            }),
        }
    }

    /// Registers `handler` for `event`. Handlers of the same event are
    /// delivered in subscription order.
    pub fn subscribe<F>(&self, event: impl Into<String>, handler: F) -> SubscriptionToken
    where
        F: Fn(&P) -> Result<()> + 'static,
    {
        self.insert(event.into(), false, Rc::new(handler))
    }

    /// Registers a handler that is removed before its first delivery.
    pub fn subscribe_once<F>(&self, event: impl Into<String>, handler: F) -> SubscriptionToken
    where
        F: FnOnce(&P) -> Result<()> + 'static,
    {
        let slot = RefCell::new(Some(handler));
        self.insert(
            event.into(),
            true,
            Rc::new(move |payload: &P| {
                let handler = slot.borrow_mut().take();
                match handler {
                    Some(handler) => handler(payload),
                    None => Ok(()),
                }
            }),
        )
    }

    /// Removes the subscription identified by `token`, or every subscription
    /// of `event` when no token is given. Returns how many were removed.
    pub fn unsubscribe(&self, event: &str, token: Option<SubscriptionToken>) -> usize {
        let mut state = self.state.borrow_mut();
        let Some(list) = state.subscriptions.get_mut(event) else {
            return 0;
        };

        let before = list.len();
        match token {
            Some(token) => list.retain(|sub| sub.token != token),
            None => list.clear(),
        }
        let removed = before - list.len();

        if list.is_empty() {
            state.subscriptions.remove(event);
        }
        removed
    }

    /// Delivers `payload` to every handler subscribed to `event` at the time
    /// of the call and returns the number of handlers invoked.
    ///
    /// A failing handler aborts the remaining deliveries of this publish and
    /// its error is returned to the publisher.
    pub fn publish(&self, event: &str, payload: &P) -> Result<usize> {
        let snapshot: Vec<Handler<P>> = {
            let mut state = self.state.borrow_mut();
            let Some(list) = state.subscriptions.get_mut(event) else {
                return Ok(0);
            };
            let snapshot: Vec<Handler<P>> =
                list.iter().map(|sub| Rc::clone(&sub.handler)).collect();
            list.retain(|sub| !sub.once);
            if list.is_empty() {
                state.subscriptions.remove(event);
            }
            snapshot
        };

        for (delivered, handler) in snapshot.iter().enumerate() {
            if let Err(err) = handler(payload) {
                tracing::warn!(
                    event,
                    delivered,
                    remaining = snapshot.len() - delivered - 1,
                    %err,
                    "event handler failed, aborting delivery"
                );
                return Err(err);
            }
        }

        Ok(snapshot.len())
    }

    pub fn subscriber_count(&self, event: &str) -> usize {
        self.state
            .borrow()
            .subscriptions
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Drops every subscription of every event.
    pub fn clear(&self) {
        self.state.borrow_mut().subscriptions.clear();
    }

    fn insert(&self, event: String, once: bool, handler: Handler<P>) -> SubscriptionToken {
        let mut state = self.state.borrow_mut();
        let token = SubscriptionToken(state.next_token);
        state.next_token += 1;
        state
            .subscriptions
            .entry(event)
            .or_default()
            .push(Subscription {
                token,
                once,
                handler,
            });
        token
    }
}

impl<P> fmt::Debug for EventBus<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.borrow();
        let mut events: Vec<(&str, usize)> = state
            .subscriptions
            .iter()
            .map(|(name, list)| (name.as_str(), list.len()))
            .collect();
        events.sort_unstable();
        f.debug_struct("EventBus").field("events", &events).finish()
    }
}
