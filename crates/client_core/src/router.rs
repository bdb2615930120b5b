use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value;
use shared::protocol::{InboundEvent, OutboundCommand, WireFrame};
use tracing::{debug, warn};

pub type Handler<S, R> = Box<dyn FnMut(&mut S, &Value) -> R + Send>;

#[derive(Debug, Clone, PartialEq)]
struct LastFrame {
    event: InboundEvent,
    wire_name: String,
    data: Value,
}

pub struct EventRouter<S, R> {
    handlers: HashMap<InboundEvent, Vec<Handler<S, R>>>,
    last_frame: Option<LastFrame>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteOutcome {
    Dispatched { event: InboundEvent, handlers: usize },
    Mirror { event: InboundEvent },
    Unknown,
}

impl<S, R> Default for EventRouter<S, R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S, R> EventRouter<S, R> {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            last_frame: None,
        }
    }

    pub fn on_any<F>(&mut self, event: InboundEvent, handler: F)
    where
        F: FnMut(&mut S, &Value) -> R + Send + 'static,
    {
        self.handlers
            .entry(event)
            .or_default()
            .push(Box::new(handler));
    }

    pub fn off(&mut self, event: InboundEvent) {
        self.handlers.remove(&event);
    }

    pub fn clear(&mut self) {
        self.handlers.clear();
        self.last_frame = None;
    }

    pub fn has_handlers(&self, event: InboundEvent) -> bool {
        self.handlers.get(&event).is_some_and(|list| !list.is_empty())
    }

    pub fn reset_mirror_window(&mut self) {
        self.last_frame = None;
    }

    pub fn dispatch(&mut self, state: &mut S, frame: &WireFrame) -> (RouteOutcome, Vec<R>) {
        let Some(event) = InboundEvent::from_wire(&frame.event) else {
            debug!(wire_name = %frame.event, "router: ignoring unknown event");
            return (RouteOutcome::Unknown, Vec::new());
        };

        // Dual-emitting servers repeat each frame under the other spelling.
        let is_mirror = self.last_frame.as_ref().is_some_and(|last| {
            last.event == event && last.wire_name != frame.event && last.data == frame.data
        });
        if is_mirror {
            // Consume the window so a third identical frame is treated as a new message.
            self.last_frame = None;
            debug!(
                event = event.canonical(),
                wire_name = %frame.event,
                "router: dropped mirrored frame"
            );
            return (RouteOutcome::Mirror { event }, Vec::new());
        }
        self.last_frame = Some(LastFrame {
            event,
            wire_name: frame.event.clone(),
            data: frame.data.clone(),
        });

        let Some(handlers) = self.handlers.get_mut(&event) else {
            return (RouteOutcome::Dispatched { event, handlers: 0 }, Vec::new());
        };
        let results: Vec<R> = handlers
            .iter_mut()
            .map(|handler| handler(state, &frame.data))
            .collect();
        (
            RouteOutcome::Dispatched {
                event,
                handlers: results.len(),
            },
            results,
        )
    }
}

/// One frame per wire spelling of `command`, current spelling first.
pub fn emit_any<P: Serialize>(command: OutboundCommand, payload: &P) -> Vec<WireFrame> {
    let data = match serde_json::to_value(payload) {
        Ok(data) => data,
        Err(err) => {
            warn!(command = command.canonical(), %err, "router: failed to encode payload");
            return Vec::new();
        }
    };
    command
        .wire_names()
        .iter()
        .map(|name| WireFrame::new(*name, data.clone()))
        .collect()
}

#[cfg(test)]
#[path = "tests/router_tests.rs"]
mod tests;
