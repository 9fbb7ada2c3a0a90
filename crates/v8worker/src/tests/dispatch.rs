use std::sync::{Arc, Mutex};
use std::thread;

use super::mock_engine::MockEngine;
use super::recording_worker;
use crate::{Worker, bridge};

#[test]
fn test_sends_during_load_arrive_in_order_before_return() {
    let engine = MockEngine::new();
    let (mut worker, inbox) = recording_worker(&engine);

    worker
        .load("sends.js", "send one\nsend two\nsend three")
        .unwrap();

    assert_eq!(inbox.texts(), vec!["one", "two", "three"]);
}

#[test]
fn test_sends_during_send_arrive_before_return() {
    let engine = MockEngine::new();
    let (mut worker, inbox) = recording_worker(&engine);
    worker.load("echo.js", "recv echo").unwrap();

    worker.send(b"hii").unwrap();
    worker.send(b"there").unwrap();

    assert_eq!(inbox.texts(), vec!["hii", "there"]);
}

#[test]
fn test_callback_reply_reaches_script() {
    let engine = MockEngine::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let mut worker = Worker::with_engine(engine, move |msg: Vec<u8>| {
        let reply = msg.to_ascii_uppercase();
        sink.lock().unwrap().push(String::from_utf8(msg).unwrap());
        Some(reply)
    })
    .unwrap();

    worker.load("ask.js", "ask ping").unwrap();

    assert_eq!(*seen.lock().unwrap(), vec!["ping", "reply:PING"]);
}

#[test]
fn test_workers_are_isolated() {
    let engine = MockEngine::new();
    let (mut a, inbox_a) = recording_worker(&engine);
    let (mut b, inbox_b) = recording_worker(&engine);

    a.load("a.js", "send for-a").unwrap();
    b.load("b.js", "send for-b\nsend for-b-again").unwrap();

    assert_eq!(inbox_a.texts(), vec!["for-a"]);
    assert_eq!(inbox_b.texts(), vec!["for-b", "for-b-again"]);
}

#[test]
fn test_concurrent_workers_stay_isolated() {
    let engine = MockEngine::new();

    let threads: Vec<_> = (0..4)
        .map(|i| {
            let engine = engine.clone();
            thread::spawn(move || {
                let (mut worker, inbox) = recording_worker(&engine);
                let source = (0..50)
                    .map(|n| format!("send {i}-{n}"))
                    .collect::<Vec<_>>()
                    .join("\n");
                worker.load("many.js", &source).unwrap();
                worker.dispose().unwrap();
                (i, inbox.texts())
            })
        })
        .collect();

    for t in threads {
        let (i, texts) = t.join().unwrap();
        let expected: Vec<_> = (0..50).map(|n| format!("{i}-{n}")).collect();
        assert_eq!(texts, expected);
    }
    assert_eq!(engine.disposed(), 4);
}

#[test]
fn test_stale_handle_dispatch_is_dropped() {
    let engine = MockEngine::new();
    let (mut worker, inbox) = recording_worker(&engine);
    let handle = worker.handle();

    worker.load("live.js", "send before").unwrap();
    worker.dispose().unwrap();

    // A native callback still in flight after dispose
    assert_eq!(bridge::dispatch(handle, b"after"), None);
    assert_eq!(inbox.texts(), vec!["before"]);
}

#[test]
fn test_callback_may_drive_other_worker() {
    let engine = MockEngine::new();
    let (other, other_inbox) = recording_worker(&engine);
    let other = Arc::new(Mutex::new(other));

    let forward = Arc::clone(&other);
    let mut worker = Worker::with_engine(engine.clone(), move |msg: Vec<u8>| {
        let text = String::from_utf8(msg).unwrap();
        forward
            .lock()
            .unwrap()
            .load("forwarded.js", &format!("send {text}"))
            .unwrap();
        None
    })
    .unwrap();

    worker.load("origin.js", "send hello").unwrap();

    assert_eq!(other_inbox.texts(), vec!["hello"]);
}
