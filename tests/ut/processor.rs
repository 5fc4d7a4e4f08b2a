use super::*;
use std::sync::{Arc, Mutex};
use ylong_runtime::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

type Log = Arc<Mutex<Vec<String>>>;
type Events = UnboundedSender<String>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn push(log: &Log, events: &Events, entry: impl Into<String>) {
    let entry = entry.into();
    log.lock().unwrap().push(entry.clone());
    let _ = events.send(entry);
}

/// Blocks the test until `count` more events have arrived, so assertions
/// observe a quiesced point rather than racing the actor's self-dispatch.
async fn wait_for(rx: &mut UnboundedReceiver<String>, count: usize) {
    for _ in 0..count {
        rx.recv().await.expect("actor still running");
    }
}

/// A queue whose `process_cb` immediately reports `task_completed`, modelling
/// a synchronous task-atom.
fn synchronous_hooks(
    log: Log,
    events: Events,
    key_cell: Arc<Mutex<Option<TaskQueueKey<u32>>>>,
) -> (ProcessCb<u32>, CancelCb<u32>, DeleteCb<u32>) {
    let process_log = log.clone();
    let process_events = events.clone();
    let process_key = key_cell;
    let process_cb: ProcessCb<u32> = Box::new(move |atom: &u32| {
        push(&process_log, &process_events, format!("process:{atom}"));
        let key = process_key.lock().unwrap().clone().expect("key installed before dispatch");
        key.processor().task_completed(&key);
    });
    let cancel_log = log.clone();
    let cancel_events = events.clone();
    let cancel_cb: CancelCb<u32> =
        Box::new(move |atom: &u32| push(&cancel_log, &cancel_events, format!("cancel:{atom}")));
    let delete_log = log;
    let delete_events = events;
    let delete_cb: DeleteCb<u32> =
        Box::new(move |atom: u32| push(&delete_log, &delete_events, format!("delete:{atom}")));
    (process_cb, cancel_cb, delete_cb)
}

/// A queue whose `process_cb` only records the dispatch; the test drives
/// `task_completed` itself, modelling an asynchronous task-atom still in
/// flight.
fn asynchronous_hooks(log: Log, events: Events) -> (ProcessCb<u32>, CancelCb<u32>, DeleteCb<u32>) {
    let process_log = log.clone();
    let process_events = events.clone();
    let process_cb: ProcessCb<u32> =
        Box::new(move |atom: &u32| push(&process_log, &process_events, format!("process:{atom}")));
    let cancel_log = log.clone();
    let cancel_events = events.clone();
    let cancel_cb: CancelCb<u32> =
        Box::new(move |atom: &u32| push(&cancel_log, &cancel_events, format!("cancel:{atom}")));
    let delete_log = log;
    let delete_events = events;
    let delete_cb: DeleteCb<u32> =
        Box::new(move |atom: u32| push(&delete_log, &delete_events, format!("delete:{atom}")));
    (process_cb, cancel_cb, delete_cb)
}

#[ylong_runtime::test]
async fn three_synchronous_tasks_drain_in_fifo_order() {
    let log = new_log();
    let (events, mut rx) = mpsc::unbounded_channel();
    let key_cell: Arc<Mutex<Option<TaskQueueKey<u32>>>> = Arc::new(Mutex::new(None));
    let processor = TaskProcessor::<u32>::new(|| {});
    let handle = processor.handle();
    ylong_runtime::spawn(processor.run());

    let (process_cb, cancel_cb, delete_cb) = synchronous_hooks(log.clone(), events, key_cell.clone());
    let key = handle
        .add_queue(
            "A",
            "X",
            TaskQueueFlags::AUTO_START | TaskQueueFlags::AUTO_REMOVE,
            process_cb,
            cancel_cb,
            delete_cb,
        )
        .await;
    *key_cell.lock().unwrap() = Some(key.clone());

    handle.add_task(&key, 1);
    handle.add_task(&key, 2);
    handle.add_task(&key, 3);

    // process:N and delete:N for each of the three atoms: six events total.
    wait_for(&mut rx, 6).await;

    assert_eq!(
        log.lock().unwrap().clone(),
        vec!["process:1", "delete:1", "process:2", "delete:2", "process:3", "delete:3"]
    );
    assert!(handle.lookup_queue("A", "X").await.is_none(), "AUTO_REMOVE disposes once drained");
}

#[ylong_runtime::test]
async fn in_flight_cancellation_calls_cancel_then_completes_then_deletes() {
    let log = new_log();
    let (events, mut rx) = mpsc::unbounded_channel();
    let processor = TaskProcessor::<u32>::new(|| {});
    let handle = processor.handle();
    ylong_runtime::spawn(processor.run());

    let (process_cb, cancel_cb, delete_cb) = asynchronous_hooks(log.clone(), events);
    let key = handle
        .add_queue("A", "X", TaskQueueFlags::AUTO_START, process_cb, cancel_cb, delete_cb)
        .await;

    handle.add_task(&key, 1);
    wait_for(&mut rx, 1).await;
    assert_eq!(log.lock().unwrap().clone(), vec!["process:1"]);

    handle.cancel_queue(&key);
    wait_for(&mut rx, 1).await;
    assert_eq!(log.lock().unwrap().clone(), vec!["process:1", "cancel:1"]);

    // The process hook now honours the cancellation by reporting completion.
    handle.task_completed(&key);
    wait_for(&mut rx, 1).await;
    assert_eq!(log.lock().unwrap().clone(), vec!["process:1", "cancel:1", "delete:1"]);
}

#[ylong_runtime::test]
async fn remove_queues_for_source_only_touches_matching_queues() {
    let log_ax = new_log();
    let log_ay = new_log();
    let log_bx = new_log();
    let (events_ax, mut rx_ax) = mpsc::unbounded_channel();
    let (events_ay, mut rx_ay) = mpsc::unbounded_channel();
    let (events_bx, _rx_bx) = mpsc::unbounded_channel();
    let processor = TaskProcessor::<u32>::new(|| {});
    let handle = processor.handle();
    ylong_runtime::spawn(processor.run());

    let (pa, ca, da) = asynchronous_hooks(log_ax.clone(), events_ax);
    let key_ax = handle.add_queue("A", "X", TaskQueueFlags::NONE, pa, ca, da).await;
    let (pb, cb, db) = asynchronous_hooks(log_ay.clone(), events_ay);
    let key_ay = handle.add_queue("A", "Y", TaskQueueFlags::NONE, pb, cb, db).await;
    let (pc, cc, dc) = asynchronous_hooks(log_bx.clone(), events_bx);
    let _key_bx = handle.add_queue("B", "X", TaskQueueFlags::NONE, pc, cc, dc).await;

    // Not AUTO_START: these sit pending, never dispatched.
    handle.add_task(&key_ax, 1);
    handle.add_task(&key_ay, 2);

    handle.remove_queues_for_source("A");
    wait_for(&mut rx_ax, 2).await; // cancel:1, delete:1
    wait_for(&mut rx_ay, 2).await; // cancel:2, delete:2

    assert!(handle.lookup_queue("A", "X").await.is_none());
    assert!(handle.lookup_queue("A", "Y").await.is_none());
    assert!(handle.lookup_queue("B", "X").await.is_some());
    assert_eq!(log_ax.lock().unwrap().clone(), vec!["cancel:1", "delete:1"]);
    assert_eq!(log_ay.lock().unwrap().clone(), vec!["cancel:2", "delete:2"]);
}

#[ylong_runtime::test]
async fn defer_remove_queue_disposes_once_in_flight_task_completes() {
    let log = new_log();
    let (events, mut rx) = mpsc::unbounded_channel();
    let processor = TaskProcessor::<u32>::new(|| {});
    let handle = processor.handle();
    ylong_runtime::spawn(processor.run());

    let (process_cb, cancel_cb, delete_cb) = asynchronous_hooks(log.clone(), events);
    let key = handle
        .add_queue("A", "X", TaskQueueFlags::AUTO_START, process_cb, cancel_cb, delete_cb)
        .await;
    handle.add_task(&key, 1);
    wait_for(&mut rx, 1).await; // process:1

    handle.remove_queues_for_source("A");
    wait_for(&mut rx, 1).await; // cancel:1
    // Still registered: the in-flight task has not completed yet.
    assert!(handle.lookup_queue("A", "X").await.is_some());

    handle.task_completed(&key);
    wait_for(&mut rx, 1).await; // delete:1
    assert!(handle.lookup_queue("A", "X").await.is_none());
}

#[ylong_runtime::test]
async fn finally_hook_reports_cancellation_state() {
    let (finally_tx, finally_rx) = ylong_runtime::sync::oneshot::channel::<bool>();
    let finally_tx = Arc::new(Mutex::new(Some(finally_tx)));
    let log = new_log();
    let (events, mut rx) = mpsc::unbounded_channel();
    let processor = TaskProcessor::<u32>::new(|| {});
    let handle = processor.handle();
    ylong_runtime::spawn(processor.run());

    let (process_cb, cancel_cb, delete_cb) = asynchronous_hooks(log, events);
    let key = handle
        .add_queue("A", "X", TaskQueueFlags::AUTO_START, process_cb, cancel_cb, delete_cb)
        .await;
    handle.set_finally(
        &key,
        Box::new(move |cancelled| {
            if let Some(tx) = finally_tx.lock().unwrap().take() {
                let _ = tx.send(cancelled);
            }
        }),
    );
    handle.add_task(&key, 1);
    wait_for(&mut rx, 1).await; // process:1

    handle.remove_queues_for_source("A");
    wait_for(&mut rx, 1).await; // cancel:1
    handle.task_completed(&key);
    wait_for(&mut rx, 1).await; // delete:1

    let cancelled = finally_rx.await.expect("finally hook fired exactly once");
    assert!(cancelled);
}

#[ylong_runtime::test]
async fn set_quitting_defers_on_quit_until_running_tasks_drain() {
    let (quit_tx, quit_rx) = ylong_runtime::sync::oneshot::channel::<()>();
    let quit_tx = Arc::new(Mutex::new(Some(quit_tx)));
    let log_a = new_log();
    let log_b = new_log();
    let (events_a, mut rx_a) = mpsc::unbounded_channel();
    let (events_b, mut rx_b) = mpsc::unbounded_channel();
    let processor = TaskProcessor::<u32>::new(move || {
        if let Some(tx) = quit_tx.lock().unwrap().take() {
            let _ = tx.send(());
        }
    });
    let handle = processor.handle();
    ylong_runtime::spawn(processor.run());

    let (pa, ca, da) = asynchronous_hooks(log_a.clone(), events_a);
    let key_a = handle.add_queue("A", "X", TaskQueueFlags::AUTO_START, pa, ca, da).await;
    let (pb, cb, db) = asynchronous_hooks(log_b.clone(), events_b);
    let key_b = handle.add_queue("B", "X", TaskQueueFlags::AUTO_START, pb, cb, db).await;

    handle.add_task(&key_a, 1);
    handle.add_task(&key_b, 2);
    wait_for(&mut rx_a, 1).await; // process:1
    wait_for(&mut rx_b, 1).await; // process:2

    handle.set_quitting();
    wait_for(&mut rx_a, 1).await; // cancel:1
    wait_for(&mut rx_b, 1).await; // cancel:2
    assert!(log_a.lock().unwrap().contains(&"cancel:1".to_string()));
    assert!(log_b.lock().unwrap().contains(&"cancel:2".to_string()));

    handle.task_completed(&key_a);
    handle.task_completed(&key_b);

    quit_rx.await.expect("on_quit fires exactly once, after both queues drain");
}
