use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use logwire::handler::IDX_FIELD;
use logwire::{
    DeliveryRegistry, DrainReport, HandlerConfig, HandlerError, LogHandler, LogRecord, Message,
    OpCode, Receiver, ReceiverConfig, ReceiverHandle, RetryPolicy, SenderConfig, TransportError,
};
use serde_json::Value;

type Inbox = Arc<Mutex<Vec<Value>>>;

fn spawn_receiver_on(port: u16) -> (ReceiverHandle, Inbox) {
    let inbox: Inbox = Arc::default();
    let sink = Arc::clone(&inbox);
    let handle = Receiver::with_processor(
        ReceiverConfig::default().with_address("127.0.0.1", port),
        move |message: &Message| {
            if message.op_code() == OpCode::Json {
                sink.lock()
                    .unwrap()
                    .push(serde_json::from_slice(message.data()).unwrap());
            }
        },
    )
    .spawn()
    .unwrap();
    (handle, inbox)
}

fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

fn fast_sender() -> SenderConfig {
    SenderConfig::default()
        .with_retry(RetryPolicy::default().with_initial_delay(Duration::from_millis(10)))
}

fn handler_config(port: u16) -> HandlerConfig {
    HandlerConfig::default()
        .with_destination("127.0.0.1", port)
        .with_sender(fast_sender())
}

fn messages(inbox: &Inbox) -> Vec<String> {
    inbox
        .lock()
        .unwrap()
        .iter()
        .map(|v| v["msg"].as_str().unwrap().to_string())
        .collect()
}

#[test]
fn sync_emit_delivers_record_with_idx() {
    let (receiver, inbox) = spawn_receiver_on(0);
    let config = handler_config(receiver.local_addr().port()).with_async(false);
    let handler = LogHandler::with_registry(config, DeliveryRegistry::new()).unwrap();

    handler.emit(LogRecord::new("INFO", "hello")).unwrap();

    let received = inbox.lock().unwrap().clone();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0]["msg"], "hello");
    assert_eq!(received[0]["level"], "INFO");
    assert_eq!(received[0][IDX_FIELD], 0);
}

#[test]
fn sync_emit_without_receiver_reports_no_live_receiver() {
    let config = HandlerConfig::default()
        .with_destination("127.0.0.1", unused_port())
        .with_async(false)
        .with_sender(SenderConfig::default().with_retry(RetryPolicy::no_retry()));
    let handler = LogHandler::with_registry(config, DeliveryRegistry::new()).unwrap();

    let err = handler.emit(LogRecord::new("INFO", "nobody home")).unwrap_err();
    assert!(matches!(
        err,
        HandlerError::Transport(TransportError::NoLiveReceiver { .. })
    ));
}

#[test]
fn async_delivery_preserves_emit_order() {
    let (receiver, inbox) = spawn_receiver_on(0);
    let handler = LogHandler::with_registry(
        handler_config(receiver.local_addr().port()),
        DeliveryRegistry::new(),
    )
    .unwrap();

    for n in 0..50 {
        handler.emit(LogRecord::new("INFO", format!("record {n}"))).unwrap();
    }
    assert!(handler.flush(Duration::from_secs(10)));
    assert_eq!(handler.pending(), 0);

    let received = inbox.lock().unwrap().clone();
    let idx: Vec<_> = received.iter().map(|v| v[IDX_FIELD].as_u64().unwrap()).collect();
    assert_eq!(idx, (0..50).collect::<Vec<_>>());
    assert_eq!(messages(&inbox)[49], "record 49");
}

#[test]
fn handlers_for_one_destination_share_idx_and_queue() {
    let (receiver, inbox) = spawn_receiver_on(0);
    let registry = DeliveryRegistry::new();
    let config = handler_config(receiver.local_addr().port());
    let first = LogHandler::with_registry(config.clone(), registry.clone()).unwrap();
    let second = LogHandler::with_registry(config, registry).unwrap();

    first.emit(LogRecord::new("INFO", "a")).unwrap();
    second.emit(LogRecord::new("INFO", "b")).unwrap();
    first.emit(LogRecord::new("INFO", "c")).unwrap();
    assert!(second.flush(Duration::from_secs(10)));

    assert_eq!(messages(&inbox), ["a", "b", "c"]);
}

#[test]
fn non_blocking_emit_fails_when_queue_is_full() {
    let config = handler_config(unused_port())
        .with_block(false)
        .with_queue_capacity(1);
    let registry = DeliveryRegistry::new();
    let handler = LogHandler::with_registry(config, registry.clone()).unwrap();

    handler.emit(LogRecord::new("INFO", "queued")).unwrap();
    let err = handler.emit(LogRecord::new("INFO", "rejected")).unwrap_err();
    match err {
        HandlerError::QueueFull { record, .. } => {
            assert_eq!(record.get("msg"), Some(&Value::from("rejected")));
        }
        other => panic!("expected QueueFull, got {other}"),
    }
    assert_eq!(handler.pending(), 1);

    registry.shutdown(Duration::from_millis(200));
}

#[test]
fn shutdown_drains_queued_records() {
    let (receiver, inbox) = spawn_receiver_on(0);
    let registry = DeliveryRegistry::new();
    let handler =
        LogHandler::with_registry(handler_config(receiver.local_addr().port()), registry.clone())
            .unwrap();

    for n in 0..10 {
        handler.emit(LogRecord::new("INFO", format!("{n}"))).unwrap();
    }
    let report = registry.shutdown(Duration::from_secs(10));

    assert_eq!(report, DrainReport { delivered_all: true, dropped: 0 });
    assert_eq!(inbox.lock().unwrap().len(), 10);
    assert!(matches!(
        handler.emit(LogRecord::new("INFO", "late")),
        Err(HandlerError::ShutDown)
    ));
}

#[test]
fn shutdown_deadline_drops_undeliverable_records() {
    let registry = DeliveryRegistry::new();
    let config = handler_config(unused_port())
        .with_sender(SenderConfig::default().with_retry(RetryPolicy::no_retry()));
    let handler = LogHandler::with_registry(config, registry.clone()).unwrap();

    for n in 0..3 {
        handler.emit(LogRecord::new("WARN", format!("{n}"))).unwrap();
    }
    let before = logwire::metrics_snapshot();
    let report = registry.shutdown(Duration::from_millis(300));

    assert_eq!(report, DrainReport { delivered_all: false, dropped: 3 });
    assert!(logwire::metrics_snapshot().records_dropped >= before.records_dropped + 3);
}

#[test]
fn delivery_resumes_after_receiver_restart() {
    let (receiver, inbox) = spawn_receiver_on(0);
    let port = receiver.local_addr().port();
    let handler =
        LogHandler::with_registry(handler_config(port), DeliveryRegistry::new()).unwrap();

    handler.emit(LogRecord::new("INFO", "before")).unwrap();
    assert!(handler.flush(Duration::from_secs(10)));
    receiver.stop().unwrap();

    handler.emit(LogRecord::new("INFO", "during")).unwrap();
    let (restarted, second_inbox) = spawn_receiver_on(port);
    handler.emit(LogRecord::new("INFO", "after")).unwrap();
    assert!(handler.flush(Duration::from_secs(20)));

    assert_eq!(messages(&inbox), ["before"]);
    assert_eq!(messages(&second_inbox), ["during", "after"]);
    restarted.stop().unwrap();
}

#[test]
fn dead_destination_does_not_delay_healthy_one() {
    let registry = DeliveryRegistry::new();
    let slow_probe = SenderConfig::default()
        .with_retry(RetryPolicy::default().with_initial_delay(Duration::from_millis(200)));
    let _stuck = LogHandler::with_registry(
        HandlerConfig::default()
            .with_destination("127.0.0.1", unused_port())
            .with_sender(slow_probe),
        registry.clone(),
    )
    .unwrap();
    std::thread::sleep(Duration::from_millis(50));

    let (receiver, inbox) = spawn_receiver_on(0);
    let healthy = LogHandler::with_registry(
        handler_config(receiver.local_addr().port()).with_async(false),
        registry.clone(),
    )
    .unwrap();

    let started = Instant::now();
    healthy.emit(LogRecord::new("INFO", "on time")).unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(messages(&inbox), ["on time"]);

    registry.shutdown(Duration::ZERO);
}

#[test]
fn delivery_starts_once_receiver_appears() {
    let port = unused_port();
    let handler =
        LogHandler::with_registry(handler_config(port), DeliveryRegistry::new()).unwrap();

    handler.emit(LogRecord::new("INFO", "first")).unwrap();
    handler.emit(LogRecord::new("INFO", "second")).unwrap();
    std::thread::sleep(Duration::from_millis(300));
    assert_eq!(handler.pending(), 2);

    let (receiver, inbox) = spawn_receiver_on(port);
    assert!(handler.flush(Duration::from_secs(10)));

    assert_eq!(messages(&inbox), ["first", "second"]);
    receiver.stop().unwrap();
}
