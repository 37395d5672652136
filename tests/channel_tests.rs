use std::sync::Arc;
use std::thread;
use std::time::Duration;

use net_analyzer::channel::Channel;

#[test]
fn close_cascades_through_a_two_stage_relay() {
    let upstream = Arc::new(Channel::new());
    let downstream = Arc::new(Channel::new());

    let relay_upstream = upstream.clone();
    let relay_downstream = downstream.clone();
    let relay = thread::spawn(move || {
        while let Some(line) = relay_upstream.pop() {
            relay_downstream.push(line);
        }
        relay_downstream.close();
    });

    upstream.push("a".to_string());
    upstream.push("b".to_string());
    upstream.close();
    relay.join().unwrap();

    assert_eq!(downstream.pop().as_deref(), Some("a"));
    assert_eq!(downstream.pop().as_deref(), Some("b"));
    assert_eq!(downstream.pop(), None);
}

#[test]
fn blocked_pop_wakes_promptly_on_close() {
    let ch = Arc::new(Channel::new());
    let waiter = ch.clone();
    let handle = thread::spawn(move || waiter.pop());

    thread::sleep(Duration::from_millis(50));
    ch.close();

    let result = handle.join().unwrap();
    assert_eq!(result, None);
}
