use serde_json::Value;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tracing::{error, warn};

pub type Handler = Arc<dyn Fn(&Value) -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Per-event handler lists, kept in registration order.
#[derive(Default)]
pub(crate) struct HandlerRegistry {
    next_id: u64,
    handlers: HashMap<String, Vec<(SubscriptionId, Handler)>>,
}

impl HandlerRegistry {
    pub(crate) fn insert(&mut self, event: &str, handler: Handler) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.handlers
            .entry(event.to_owned())
            .or_default()
            .push((id, handler));
        id
    }

    pub(crate) fn remove(&mut self, event: &str, id: SubscriptionId) -> bool {
        let Some(list) = self.handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        let removed = list.len() != before;
        if list.is_empty() {
            self.handlers.remove(event);
        }
        removed
    }

    /// Snapshot so handlers can (un)subscribe while being invoked.
    pub(crate) fn handlers_for(&self, event: &str) -> Vec<Handler> {
        self.handlers
            .get(event)
            .map(|list| list.iter().map(|(_, h)| h.clone()).collect())
            .unwrap_or_default()
    }
}

/// Runs every handler; an `Err` or a panic is logged and the next handler still runs.
pub(crate) fn invoke_all(event: &str, handlers: &[Handler], payload: &Value) {
    for handler in handlers {
        match panic::catch_unwind(AssertUnwindSafe(|| handler(payload))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("Handler for '{}' failed: {:#}", event, e),
            Err(_) => error!("Handler for '{}' panicked", event),
        }
    }
}
