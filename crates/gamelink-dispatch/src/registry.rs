//! Opcode → handlers mapping with per-handler failure isolation.

use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use gamelink_protocol::{Codec, Opcode};
use serde::de::DeserializeOwned;
use tracing::{error, trace, warn};

use crate::{Handler, HandlerError, Typed};

/// Identifies one registration, for [`HandlerRegistry::unregister`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

impl HandlerId {
    pub fn into_inner(self) -> u64 {
        self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handler-{}", self.0)
    }
}

struct Registration {
    id: HandlerId,
    handler: Box<dyn Handler>,
}

/// Maps each opcode to the handlers registered for it.
///
/// Registrations are additive: registering a second handler for an opcode
/// never replaces the first. [`dispatch`](Self::dispatch) runs them in
/// registration order and absorbs every error or panic, so one bad
/// handler cannot stop the pipeline.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Opcode, Vec<Registration>>,
    next_id: u64,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `handler` to the list for `opcode`.
    pub fn register<H: Handler>(&mut self, opcode: Opcode, handler: H) -> HandlerId {
        self.next_id += 1;
        let id = HandlerId(self.next_id);
        self.handlers
            .entry(opcode)
            .or_default()
            .push(Registration {
                id,
                handler: Box::new(handler),
            });
        trace!(%opcode, %id, "handler registered");
        id
    }

    /// Registers a closure over raw payload bytes.
    pub fn register_fn<F>(&mut self, opcode: Opcode, handler: F) -> HandlerId
    where
        F: Fn(&[u8]) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(opcode, handler)
    }

    /// Registers a closure that receives the payload decoded as `T`.
    pub fn register_typed<T, K, F>(&mut self, opcode: Opcode, codec: K, handler: F) -> HandlerId
    where
        T: DeserializeOwned + 'static,
        K: Codec,
        F: Fn(T) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        self.register(opcode, Typed::new(codec, handler))
    }

    /// Removes the registration `id` from `opcode`.
    ///
    /// Returns `false` if no such registration exists.
    pub fn unregister(&mut self, opcode: Opcode, id: HandlerId) -> bool {
        let Some(list) = self.handlers.get_mut(&opcode) else {
            return false;
        };
        let Some(index) = list.iter().position(|r| r.id == id) else {
            return false;
        };
        list.remove(index);
        if list.is_empty() {
            self.handlers.remove(&opcode);
        }
        true
    }

    /// Number of handlers registered for `opcode`.
    pub fn handler_count(&self, opcode: Opcode) -> usize {
        self.handlers.get(&opcode).map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs every handler for `opcode` against `payload`.
    ///
    /// Returns how many handlers completed successfully. An opcode with
    /// no handlers is logged and the payload discarded.
    pub fn dispatch(&self, opcode: Opcode, payload: &[u8]) -> usize {
        let Some(list) = self.handlers.get(&opcode) else {
            warn!(%opcode, len = payload.len(), "no handler registered, message discarded");
            return 0;
        };

        let mut succeeded = 0;
        for registration in list {
            match invoke(registration.handler.as_ref(), payload) {
                Ok(()) => succeeded += 1,
                Err(e @ HandlerError::Panicked(_)) => {
                    error!(%opcode, handler = %registration.id, error = %e, "handler panicked");
                }
                Err(e) => {
                    warn!(%opcode, handler = %registration.id, error = %e, "handler failed");
                }
            }
        }
        succeeded
    }
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut opcodes: Vec<_> = self.handlers.keys().copied().collect();
        opcodes.sort();
        f.debug_struct("HandlerRegistry")
            .field("opcodes", &opcodes)
            .finish_non_exhaustive()
    }
}

fn invoke(handler: &dyn Handler, payload: &[u8]) -> Result<(), HandlerError> {
    panic::catch_unwind(AssertUnwindSafe(|| handler.handle(payload)))
        .unwrap_or_else(|panic| Err(HandlerError::Panicked(panic_message(panic.as_ref()))))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
