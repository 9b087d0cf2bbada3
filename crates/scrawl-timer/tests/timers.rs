//! Integration tests for timer jobs.
//!
//! Uses `start_paused = true` so time only moves when every task is idle;
//! sleeps in the test body auto-advance the clock deterministically.

use std::time::Duration;

use scrawl_timer::{TimerId, spawn_interval, spawn_once};
use tokio::sync::mpsc;

#[derive(Debug, PartialEq)]
enum Fired {
    Once(TimerId),
    Tick(TimerId, u64),
}

fn drain(rx: &mut mpsc::UnboundedReceiver<Fired>) -> Vec<Fired> {
    let mut out = Vec::new();
    while let Ok(ev) = rx.try_recv() {
        out.push(ev);
    }
    out
}

#[tokio::test(start_paused = true)]
async fn test_spawn_once_fires_after_delay() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_once(Duration::from_secs(30), tx, Fired::Once);

    tokio::time::sleep(Duration::from_secs(29)).await;
    assert!(drain(&mut rx).is_empty(), "must not fire early");

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(drain(&mut rx), vec![Fired::Once(handle.id())]);
}

#[tokio::test(start_paused = true)]
async fn test_spawn_once_cancel_prevents_firing() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_once(Duration::from_secs(30), tx, Fired::Once);

    tokio::time::sleep(Duration::from_secs(10)).await;
    handle.cancel();
    tokio::time::sleep(Duration::from_secs(60)).await;

    assert!(drain(&mut rx).is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_dropping_handle_cancels_interval() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = spawn_interval(Duration::from_secs(1), tx, Fired::Tick);
    let id = handle.id();

    tokio::time::sleep(Duration::from_millis(3500)).await;
    assert_eq!(
        drain(&mut rx),
        vec![Fired::Tick(id, 1), Fired::Tick(id, 2), Fired::Tick(id, 3)]
    );

    drop(handle);
    tokio::time::sleep(Duration::from_secs(10)).await;
    assert!(drain(&mut rx).is_empty(), "no ticks after drop");
}

#[tokio::test(start_paused = true)]
async fn test_interval_first_tick_is_one_period_out() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = spawn_interval(Duration::from_secs(15), tx, Fired::Tick);

    tokio::time::sleep(Duration::from_secs(14)).await;
    assert!(drain(&mut rx).is_empty());

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_interval_stops_when_receiver_dropped() {
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = spawn_interval(Duration::from_secs(1), tx, Fired::Tick);
    drop(rx);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(handle.is_finished());
}

#[tokio::test(start_paused = true)]
async fn test_each_handle_gets_distinct_id() {
    let (tx, _rx) = mpsc::unbounded_channel::<Fired>();
    let a = spawn_once(Duration::from_secs(1), tx.clone(), Fired::Once);
    let b = spawn_once(Duration::from_secs(1), tx, Fired::Once);
    assert_ne!(a.id(), b.id());
    assert!(a.matches(a.id()));
    assert!(!a.matches(b.id()));
}
