//! Deno ops backing the `V8Worker` script global
//!
//! Every op reads the worker handle from `OpState`, so messages leave the
//! context tagged with the handle they were created with.

use deno_core::{JsBuffer, OpState, op2};
use tracing::trace;

use crate::bridge;
use crate::registry::Handle;

/// Per-context mailbox shared between host and ops
#[derive(Debug, Default)]
pub(crate) struct WorkerInbox {
    /// Message the host is about to deliver to the script receiver
    pub(crate) inbound: Option<Vec<u8>>,
    /// Whether the last outbound send produced a reply
    pub(crate) reply_present: bool,
    /// Whether script registered receive logic
    pub(crate) receiver: bool,
}

/// Routes an outbound script message through the dispatch bridge
#[op2]
#[buffer]
pub(crate) fn op_worker_send(state: &mut OpState, #[buffer] message: JsBuffer) -> Vec<u8> {
    let handle = *state.borrow::<Handle>();
    let reply = bridge::dispatch(handle, &message);

    let inbox = state.borrow_mut::<WorkerInbox>();
    inbox.reply_present = reply.is_some();
    reply.unwrap_or_default()
}

#[op2(fast)]
pub(crate) fn op_worker_reply_present(state: &mut OpState) -> bool {
    state.borrow::<WorkerInbox>().reply_present
}

/// Hands the pending inbound message to script
#[op2]
#[buffer]
pub(crate) fn op_worker_take_inbound(state: &mut OpState) -> Vec<u8> {
    state
        .borrow_mut::<WorkerInbox>()
        .inbound
        .take()
        .unwrap_or_default()
}

#[op2(fast)]
pub(crate) fn op_worker_mark_receiver(state: &mut OpState) {
    state.borrow_mut::<WorkerInbox>().receiver = true;
}

#[op2(fast)]
pub(crate) fn op_worker_print(state: &mut OpState, #[string] line: String) {
    let handle = *state.borrow::<Handle>();
    trace!(%handle, "Script print");
    println!("{line}");
}
