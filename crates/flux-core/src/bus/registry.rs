//! Shared handler/interceptor registry.
//!
//! Both bus strategies own one [`BusRegistry`]. All tables live behind a
//! single mutex; lock scopes stay short (lookups return clones, dispatch runs
//! outside the lock).

use std::collections::{HashMap, HashSet};

use parking_lot::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::handler::{Handler, HandlerId};
use super::interceptor::{Interceptor, InterceptorId};
use super::pattern::EventPattern;
use crate::error::{BusError, BusResult};

struct HandlerEntry {
    handler: Handler,
    pattern: EventPattern,
    owner: Option<String>,
}

#[derive(Default)]
struct RegistryState {
    handlers: HashMap<HandlerId, HandlerEntry>,
    /// Owner name → ids registered under it, for bulk removal on unload.
    owners: HashMap<String, HashSet<HandlerId>>,
    /// Kept in registration order.
    interceptors: Vec<(InterceptorId, Interceptor)>,
    closed: bool,
}

pub(crate) struct BusRegistry {
    state: Mutex<RegistryState>,
}

impl BusRegistry {
    pub(crate) fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
        }
    }

    pub(crate) fn ensure_open(&self) -> BusResult<()> {
        if self.state.lock().closed {
            Err(BusError::Closed)
        } else {
            Ok(())
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Registers a handler; a handler with the same id replaces the previous
    /// registration.
    pub(crate) fn register(
        &self,
        pattern: EventPattern,
        handler: Handler,
        owner: Option<&str>,
    ) -> BusResult<HandlerId> {
        let id = handler.id();
        let mut state = self.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }

        if let Some(previous) = state.handlers.remove(&id) {
            warn!(handler = %handler.name(), id = %id, "Handler already registered, replacing");
            if let Some(old_owner) = previous.owner
                && let Some(ids) = state.owners.get_mut(&old_owner)
            {
                ids.remove(&id);
            }
        }

        if let Some(owner) = owner {
            state.owners.entry(owner.to_string()).or_default().insert(id);
        }
        state.handlers.insert(
            id,
            HandlerEntry {
                handler,
                pattern,
                owner: owner.map(str::to_owned),
            },
        );
        drop(state);

        debug!(id = %id, "Handler registered");
        Ok(id)
    }

    pub(crate) fn unregister(&self, id: HandlerId) -> bool {
        let mut state = self.state.lock();
        match state.handlers.remove(&id) {
            Some(entry) => {
                if let Some(owner) = entry.owner
                    && let Some(ids) = state.owners.get_mut(&owner)
                {
                    ids.remove(&id);
                }
                debug!(id = %id, "Handler unregistered");
                true
            }
            None => false,
        }
    }

    /// Removes every handler registered under `owner`, returning the count.
    pub(crate) fn unregister_owner(&self, owner: &str) -> usize {
        let mut state = self.state.lock();
        let Some(ids) = state.owners.remove(owner) else {
            return 0;
        };
        let mut count = 0;
        for id in ids {
            if state.handlers.remove(&id).is_some() {
                count += 1;
            }
        }
        drop(state);

        debug!(owner = %owner, count, "Owner handlers unregistered");
        count
    }

    pub(crate) fn register_interceptor(&self, interceptor: Interceptor) -> BusResult<InterceptorId> {
        let id = Uuid::new_v4();
        let mut state = self.state.lock();
        if state.closed {
            return Err(BusError::Closed);
        }
        state.interceptors.push((id, interceptor));
        drop(state);

        debug!(id = %id, "Interceptor registered");
        Ok(id)
    }

    pub(crate) fn unregister_interceptor(&self, id: InterceptorId) -> bool {
        let mut state = self.state.lock();
        let before = state.interceptors.len();
        state.interceptors.retain(|(existing, _)| *existing != id);
        state.interceptors.len() != before
    }

    /// Snapshot of the interceptor chain in registration order.
    pub(crate) fn interceptors(&self) -> Vec<(InterceptorId, Interceptor)> {
        self.state.lock().interceptors.clone()
    }

    /// Snapshot of every handler whose pattern matches `name`.
    pub(crate) fn matching(&self, name: &str) -> Vec<(HandlerId, Handler)> {
        let state = self.state.lock();
        state
            .handlers
            .iter()
            .filter(|(_, entry)| entry.pattern.matches(name))
            .map(|(id, entry)| (*id, entry.handler.clone()))
            .collect()
    }

    /// Marks the registry closed and clears all state.
    ///
    /// Returns `false` when it was already closed.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.state.lock();
        if state.closed {
            return false;
        }
        state.closed = true;
        state.handlers.clear();
        state.owners.clear();
        state.interceptors.clear();
        true
    }
}
