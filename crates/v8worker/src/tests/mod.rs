//! Worker lifecycle and dispatch tests against an instrumented engine
//!
//! The V8 binding is exercised end to end in `tests/v8_worker.rs`.

mod dispatch;

use std::sync::{Arc, Mutex};

use crate::Worker;
use mock_engine::MockEngine;

/// Messages seen by a worker's receive callback, in arrival order
#[derive(Clone, Default)]
pub(crate) struct Inbox(Arc<Mutex<Vec<Vec<u8>>>>);

impl Inbox {
    pub(crate) fn messages(&self) -> Vec<Vec<u8>> {
        self.0.lock().unwrap().clone()
    }

    pub(crate) fn texts(&self) -> Vec<String> {
        self.messages()
            .into_iter()
            .map(|m| String::from_utf8(m).unwrap())
            .collect()
    }
}

/// Creates a mock worker recording everything it receives
pub(crate) fn recording_worker(engine: &MockEngine) -> (Worker<MockEngine>, Inbox) {
    let inbox = Inbox::default();
    let sink = inbox.clone();
    let worker = Worker::with_engine(engine.clone(), move |msg| {
        sink.0.lock().unwrap().push(msg);
        None
    })
    .expect("mock context creation should succeed");
    (worker, inbox)
}
