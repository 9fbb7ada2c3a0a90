//! Entry point the engine calls whenever script sends a message out.

use std::panic::{AssertUnwindSafe, catch_unwind};

use tracing::{error, trace, warn};

use crate::registry::{Handle, HandleRegistry};

/// Delivers `message` from the context tagged `handle` to its worker's
/// receive callback and returns the callback's reply.
///
/// The message is copied before the callback sees it, since the engine owns
/// the backing memory only for the duration of this call. A handle with no
/// live worker (stale, or mid-dispose) drops the message and yields `None`.
pub fn dispatch(handle: Handle, message: &[u8]) -> Option<Vec<u8>> {
    dispatch_in(HandleRegistry::global(), handle, message)
}

pub(crate) fn dispatch_in(
    registry: &HandleRegistry,
    handle: Handle,
    message: &[u8],
) -> Option<Vec<u8>> {
    let Some(record) = registry.lookup(handle) else {
        warn!(%handle, len = message.len(), "Dropping message for unknown worker handle");
        return None;
    };

    trace!(%handle, len = message.len(), "Dispatching message to host");

    // Unwinding into the engine's native frames is not allowed.
    match catch_unwind(AssertUnwindSafe(|| record.receive(message.to_vec()))) {
        Ok(reply) => reply,
        Err(_) => {
            error!(%handle, "Receive callback panicked, message dropped");
            None
        }
    }
}
