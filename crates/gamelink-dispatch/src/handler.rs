//! The handler capability: consume a raw payload.

use std::marker::PhantomData;

use gamelink_protocol::Codec;
use serde::de::DeserializeOwned;

use crate::HandlerError;

/// Something that consumes the payload bytes of one opcode.
///
/// Any `Fn(&[u8]) -> Result<(), HandlerError>` closure is a handler.
/// Handlers run on the tick thread, one envelope at a time.
///
/// ## Trait bounds explained
///
/// - `Send + Sync`: the registry lives inside a session that may be
///   moved into a Tokio task, so everything it stores must be shareable
///   across threads, even though handlers are only ever *called* from
///   the tick thread.
/// - `'static`: handlers are boxed and kept until unregistered, so they
///   cannot borrow anything shorter-lived. Capture an `Arc` instead.
///
/// `Fn` rather than `FnMut` means a handler that keeps state needs
/// interior mutability (`Mutex`, atomics). `dispatch` only needs `&self`,
/// which is what lets the session route envelopes while also borrowing
/// the heartbeat monitor mutably.
pub trait Handler: Send + Sync + 'static {
    fn handle(&self, payload: &[u8]) -> Result<(), HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(&[u8]) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        self(payload)
    }
}

/// A handler that decodes its payload into `T` before calling `F`.
///
/// A payload that does not decode is reported as
/// [`HandlerError::Decode`] and `F` is not called.
///
/// The marker is `PhantomData<fn() -> T>`, not `PhantomData<T>`: a
/// `Typed` never stores a `T`, it only produces one per call. Using the
/// function-pointer form keeps `Typed` `Send + Sync` even when `T` is not.
pub struct Typed<T, K, F> {
    codec: K,
    handler: F,
    _message: PhantomData<fn() -> T>,
}

impl<T, K, F> Typed<T, K, F> {
    pub fn new(codec: K, handler: F) -> Self {
        Self {
            codec,
            handler,
            _message: PhantomData,
        }
    }
}

impl<T, K, F> Handler for Typed<T, K, F>
where
    T: DeserializeOwned + 'static,
    K: Codec,
    F: Fn(T) -> Result<(), HandlerError> + Send + Sync + 'static,
{
    fn handle(&self, payload: &[u8]) -> Result<(), HandlerError> {
        let message = self.codec.decode::<T>(payload)?;
        (self.handler)(message)
    }
}
