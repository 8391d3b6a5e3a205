//! Integration tests for the dispatch pipeline: inbox → dispatcher →
//! registry, driven the way a game loop drives it.

use std::sync::{Arc, Mutex};
use std::thread;

use gamelink_dispatch::{Dispatcher, HandlerError, HandlerRegistry, MAX_PER_TICK};
use gamelink_protocol::{EnvelopePool, JsonCodec, MessageEnvelope, Opcode};
use serde::Deserialize;

fn envelope(opcode: i32, payload: &[u8]) -> MessageEnvelope {
    MessageEnvelope::new(Opcode(opcode), "", payload.to_vec())
}

/// Registry that records `(opcode, payload)` for every listed opcode.
fn recording_registry(opcodes: &[i32]) -> (HandlerRegistry, Arc<Mutex<Vec<(i32, Vec<u8>)>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let mut registry = HandlerRegistry::new();
    for &op in opcodes {
        let log = Arc::clone(&log);
        registry.register_fn(Opcode(op), move |payload| {
            log.lock().unwrap().push((op, payload.to_vec()));
            Ok(())
        });
    }
    (registry, log)
}

#[test]
fn test_tick_routes_at_most_max_per_tick() {
    let (mut registry, log) = recording_registry(&[10]);
    let mut dispatcher = Dispatcher::default();
    let total = MAX_PER_TICK + 5;
    for i in 0..total {
        dispatcher.enqueue(envelope(10, &[i as u8]));
    }

    assert_eq!(dispatcher.tick(&mut registry), MAX_PER_TICK);
    assert_eq!(log.lock().unwrap().len(), MAX_PER_TICK);
    assert_eq!(dispatcher.pending(), 5);

    assert_eq!(dispatcher.tick(&mut registry), 5);
    assert_eq!(dispatcher.pending(), 0);
    assert_eq!(dispatcher.tick(&mut registry), 0);
}

#[test]
fn test_failing_opcode_does_not_block_other_opcodes() {
    let (mut registry, log) = recording_registry(&[20]);
    registry.register_fn(Opcode(10), |_| Err(HandlerError::failed("always fails")));

    let mut dispatcher = Dispatcher::default();
    dispatcher.enqueue(envelope(10, b"a"));
    dispatcher.enqueue(envelope(20, b"b"));

    assert_eq!(dispatcher.tick(&mut registry), 2);
    assert_eq!(*log.lock().unwrap(), vec![(20, b"b".to_vec())]);
}

#[test]
fn test_panicking_handler_does_not_unwind_through_tick() {
    let (mut registry, log) = recording_registry(&[20]);
    registry.register_fn(Opcode(10), |_| panic!("handler bug"));

    let mut dispatcher = Dispatcher::default();
    dispatcher.enqueue(envelope(10, b""));
    dispatcher.enqueue(envelope(20, b"survived"));

    assert_eq!(dispatcher.tick(&mut registry), 2);
    assert_eq!(*log.lock().unwrap(), vec![(20, b"survived".to_vec())]);
}

#[test]
fn test_handlers_run_in_arrival_order() {
    let (mut registry, log) = recording_registry(&[5, 7]);
    let mut dispatcher = Dispatcher::default();
    dispatcher.enqueue(envelope(5, b"1"));
    dispatcher.enqueue(envelope(7, b"2"));
    dispatcher.enqueue(envelope(5, b"3"));

    dispatcher.tick(&mut registry);

    let order: Vec<i32> = log.lock().unwrap().iter().map(|(op, _)| *op).collect();
    assert_eq!(order, [5, 7, 5]);
}

#[test]
fn test_leftovers_stay_ahead_of_newer_arrivals() {
    let (mut registry, log) = recording_registry(&[1]);
    let mut dispatcher = Dispatcher::new(2, EnvelopePool::default());
    for i in 0..3u8 {
        dispatcher.enqueue(envelope(1, &[i]));
    }
    dispatcher.tick(&mut registry);

    // One leftover, then two more arrive before the next tick.
    dispatcher.enqueue(envelope(1, &[3]));
    dispatcher.enqueue(envelope(1, &[4]));
    dispatcher.tick(&mut registry);
    dispatcher.tick(&mut registry);

    let payloads: Vec<u8> = log.lock().unwrap().iter().map(|(_, p)| p[0]).collect();
    assert_eq!(payloads, [0, 1, 2, 3, 4]);
}

#[test]
fn test_unhandled_opcode_is_discarded() {
    let (mut registry, log) = recording_registry(&[1]);
    let mut dispatcher = Dispatcher::default();
    dispatcher.enqueue(envelope(404, b"nobody listens"));
    dispatcher.enqueue(envelope(1, b"x"));

    assert_eq!(dispatcher.tick(&mut registry), 2);
    assert_eq!(log.lock().unwrap().len(), 1);
    assert_eq!(dispatcher.pending(), 0);
}

#[test]
fn test_unregistered_handler_stops_receiving() {
    let log = Arc::new(Mutex::new(0u32));
    let mut registry = HandlerRegistry::new();
    let counter = Arc::clone(&log);
    let id = registry.register_fn(Opcode(3), move |_| {
        *counter.lock().unwrap() += 1;
        Ok(())
    });

    let mut dispatcher = Dispatcher::default();
    dispatcher.enqueue(envelope(3, b""));
    dispatcher.tick(&mut registry);
    assert!(registry.unregister(Opcode(3), id));
    dispatcher.enqueue(envelope(3, b""));
    dispatcher.tick(&mut registry);

    assert_eq!(*log.lock().unwrap(), 1);
}

#[test]
fn test_typed_handler_through_dispatcher() {
    #[derive(Deserialize)]
    struct MapEntered {
        map_id: u32,
        spawn: (i32, i32),
    }

    let seen = Arc::new(Mutex::new(None));
    let sink = Arc::clone(&seen);
    let mut registry = HandlerRegistry::new();
    registry.register_typed(Opcode(102), JsonCodec, move |msg: MapEntered| {
        *sink.lock().unwrap() = Some((msg.map_id, msg.spawn));
        Ok(())
    });

    let mut dispatcher = Dispatcher::default();
    dispatcher.enqueue(envelope(102, b"{broken"));
    dispatcher.enqueue(envelope(102, br#"{"map_id":7,"spawn":[3,-4]}"#));
    dispatcher.tick(&mut registry);

    assert_eq!(*seen.lock().unwrap(), Some((7, (3, -4))));
}

#[test]
fn test_concurrent_producers_lose_nothing() {
    let (mut registry, log) = recording_registry(&[1]);
    let mut dispatcher = Dispatcher::new(1000, EnvelopePool::default());

    let producers: Vec<_> = (0..4)
        .map(|_| {
            let inbox = dispatcher.inbox();
            thread::spawn(move || {
                for i in 0..100u8 {
                    inbox.enqueue(envelope(1, &[i]));
                }
            })
        })
        .collect();

    let mut routed = 0;
    while routed < 400 {
        routed += dispatcher.tick(&mut registry);
        if producers.iter().all(|p| p.is_finished()) && dispatcher.pending() == 0 {
            break;
        }
    }
    for p in producers {
        p.join().unwrap();
    }
    routed += dispatcher.tick(&mut registry);

    assert_eq!(routed, 400);
    assert_eq!(log.lock().unwrap().len(), 400);
}

#[test]
fn test_inbox_envelopes_circulate_through_pool() {
    let (mut registry, log) = recording_registry(&[40]);
    let mut dispatcher = Dispatcher::new(MAX_PER_TICK, EnvelopePool::new(64));
    let inbox = dispatcher.inbox();

    let burst = |round: u8| {
        for i in 0..8 {
            let mut envelope = inbox.acquire();
            envelope.opcode = Opcode(40);
            envelope.payload.extend_from_slice(&[round, i]);
            inbox.enqueue(envelope);
        }
    };

    for round in 0..3 {
        burst(round);
        assert_eq!(dispatcher.tick(&mut registry), 8);
    }
    let warmed = dispatcher.allocated();
    for round in 3..20 {
        burst(round);
        assert_eq!(dispatcher.tick(&mut registry), 8);
    }

    assert_eq!(dispatcher.allocated(), warmed);
    assert_eq!(log.lock().unwrap().len(), 20 * 8);
    // Recycled envelopes carry no stale bytes.
    assert_eq!(log.lock().unwrap().last().unwrap().1, vec![19, 7]);
}
