//! Exchange scenarios over the in-memory transport.

use std::sync::{Arc, Barrier};
use std::time::{Duration, Instant};

use thor_exchange::config::keys;
use thor_exchange::{
    EndpointUrl, ExchangeClient, ExchangeError, Exchanger, FutureRegistry, HeaderExchangeHandler,
    HeaderExchanger, LazyConnectExchangeClient, Message, Payload, RegistryConfig, Request,
    Response, TransportChannel,
};

use super::memory::MemoryTransporter;
use super::{EchoService, NoService, RequestRecorder, init_tracing, wait_until};

fn url() -> EndpointUrl {
    EndpointUrl::new("thor", "10.20.30.40", 20880)
}

/// Client exchanger over a transporter whose server echoes requests.
fn echo_setup() -> (Arc<EchoService>, Arc<MemoryTransporter>, Arc<HeaderExchanger>) {
    let service = Arc::new(EchoService::default());
    let server = Arc::new(HeaderExchangeHandler::new(service.clone(), FutureRegistry::default()));
    let transporter = MemoryTransporter::new(server);
    let exchanger = Arc::new(HeaderExchanger::new(
        transporter.clone(),
        FutureRegistry::new(RegistryConfig::default()),
    ));
    (service, transporter, exchanger)
}

/// Client exchanger over a transporter whose server only records requests.
fn manual_setup() -> (Arc<RequestRecorder>, Arc<MemoryTransporter>, Arc<HeaderExchanger>) {
    let recorder = Arc::new(RequestRecorder::default());
    let transporter = MemoryTransporter::new(recorder.clone());
    let exchanger = Arc::new(HeaderExchanger::new(
        transporter.clone(),
        FutureRegistry::new(RegistryConfig::default()),
    ));
    (recorder, transporter, exchanger)
}

fn respond(channel: &Arc<dyn TransportChannel>, request: &Request, body: &[u8]) {
    channel
        .send(Message::Response(Response::ok(request.id(), body)), false)
        .expect("server send");
}

#[test]
fn test_request_round_trip() {
    init_tracing();
    let (_service, _transporter, exchanger) = echo_setup();
    let client = exchanger.connect(&url(), Arc::new(NoService)).expect("connect");

    let future = client.request(Payload::from(b"hello".to_vec())).expect("request");
    let payload = future.wait_result().expect("payload");

    assert_eq!(payload.as_bytes(), b"hello");
    assert_eq!(exchanger.registry().pending_count(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_request_round_trip_async() {
    init_tracing();
    let (_service, _transporter, exchanger) = echo_setup();
    let client = exchanger.connect(&url(), Arc::new(NoService)).expect("connect");

    let first = client.request(Payload::from(b"one".to_vec())).expect("request");
    let second = client.request(Payload::from(b"two".to_vec())).expect("request");

    let second = second.await.expect("second").into_result().expect("ok");
    let first = first.await.expect("first").into_result().expect("ok");
    assert_eq!(first.as_bytes(), b"one");
    assert_eq!(second.as_bytes(), b"two");
}

#[test]
fn test_one_way_and_text_reach_server() {
    init_tracing();
    let (service, _transporter, exchanger) = echo_setup();
    let client = exchanger.connect(&url(), Arc::new(NoService)).expect("connect");

    client.send(Message::from(Payload::from(b"event".to_vec()))).expect("send payload");
    client.send(Message::from("status")).expect("send text");

    assert!(wait_until(Duration::from_secs(2), || service.one_way.lock().len() == 2));
    assert_eq!(
        *service.one_way.lock(),
        vec![
            Message::Payload(Payload::from(b"event".to_vec())),
            Message::Text("status".into()),
        ]
    );
}

#[test]
fn test_responses_in_reverse_order() {
    init_tracing();
    let (recorder, _transporter, exchanger) = manual_setup();
    let client = exchanger.connect(&url(), Arc::new(NoService)).expect("connect");

    let futures: Vec<_> = (0..3u8)
        .map(|n| client.request(Payload::from(vec![n])).expect("request"))
        .collect();

    let requests = recorder.wait_for(3, Duration::from_secs(2));
    assert_eq!(requests.len(), 3);
    for (request, channel) in requests.iter().rev() {
        let body: Vec<u8> = request.data().as_bytes().iter().map(|b| b + 100).collect();
        respond(channel, request, &body);
    }

    for (n, future) in futures.into_iter().enumerate() {
        let payload = future.wait_result().expect("payload");
        assert_eq!(payload.as_bytes(), &[n as u8 + 100]);
    }
}

#[test]
fn test_timeout_then_late_response_is_dropped() {
    init_tracing();
    let (recorder, _transporter, exchanger) = manual_setup();
    let client = exchanger
        .connect(&url().with_parameter(keys::TIMEOUT, 100), Arc::new(NoService))
        .expect("connect");

    let started = Instant::now();
    let future = client.request(Payload::from(b"slow".to_vec())).expect("request");
    let outcome = future.wait();
    let elapsed = started.elapsed();

    match outcome {
        Err(ExchangeError::Timeout { sent, .. }) => assert!(sent),
        other => panic!("expected timeout, got {other:?}"),
    }
    assert!(elapsed >= Duration::from_millis(100), "timed out early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "timed out late: {elapsed:?}");
    assert_eq!(exchanger.registry().pending_count(), 0);

    // The late response finds no pending entry and is discarded.
    let requests = recorder.wait_for(1, Duration::from_secs(1));
    let (request, channel) = &requests[0];
    respond(channel, request, b"too late");
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(exchanger.registry().pending_count(), 0);
}

#[test]
fn test_unanswered_request_times_out_with_default_wiring() {
    init_tracing();
    let recorder = Arc::new(RequestRecorder::default());
    let transporter = MemoryTransporter::new(recorder);
    let exchanger = HeaderExchanger::new(transporter, FutureRegistry::default());
    let client = exchanger
        .connect(&url().with_parameter(keys::TIMEOUT, 100), Arc::new(NoService))
        .expect("connect");

    let future = client.request(Payload::empty()).expect("request");
    assert!(future.wait().expect_err("timeout").is_timeout());

    // A caller that walks away still gets its entry reclaimed.
    drop(client.request(Payload::empty()).expect("request"));
    assert!(wait_until(Duration::from_secs(2), || exchanger.registry().pending_count() == 0));

    let started = Instant::now();
    client.close_gracefully(Duration::from_secs(2));
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn test_send_after_close_fails() {
    init_tracing();
    let (_service, transporter, exchanger) = echo_setup();
    let client = exchanger.connect(&url(), Arc::new(NoService)).expect("connect");

    for n in 0..3u8 {
        client.send(Message::from(Payload::from(vec![n]))).expect("send");
    }
    client.close();

    assert!(client.is_closed());
    assert!(transporter.client(0).expect("client end").is_closed());
    assert!(matches!(
        client.send(Message::from("late")),
        Err(ExchangeError::ChannelClosed { .. })
    ));
    assert!(matches!(
        client.request(Payload::empty()),
        Err(ExchangeError::ChannelClosed { .. })
    ));
}

#[test]
fn test_graceful_close_waits_for_in_flight_request() {
    init_tracing();
    let (recorder, transporter, exchanger) = manual_setup();
    let client = exchanger.connect(&url(), Arc::new(NoService)).expect("connect");

    let future = client
        .request_with_timeout(Payload::from(b"work".to_vec()), Duration::from_secs(10))
        .expect("request");

    let responder = std::thread::spawn(move || {
        let requests = recorder.wait_for(1, Duration::from_secs(2));
        std::thread::sleep(Duration::from_millis(50));
        let (request, channel) = &requests[0];
        respond(channel, request, b"done");
    });

    let started = Instant::now();
    client.close_gracefully(Duration::from_secs(2));
    let elapsed = started.elapsed();
    responder.join().expect("responder");

    assert!(elapsed >= Duration::from_millis(50), "closed early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "waited for full timeout: {elapsed:?}");
    assert!(client.is_closed());
    assert!(transporter.client(0).expect("client end").is_closed());
    assert_eq!(future.wait_result().expect("payload").as_bytes(), b"done");
}

#[test]
fn test_graceful_close_gives_up_after_timeout() {
    init_tracing();
    let (_recorder, _transporter, exchanger) = manual_setup();
    let client = exchanger.connect(&url(), Arc::new(NoService)).expect("connect");
    let _future = client
        .request_with_timeout(Payload::empty(), Duration::from_secs(30))
        .expect("request");

    let started = Instant::now();
    client.close_gracefully(Duration::from_millis(100));
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(100));
    assert!(elapsed < Duration::from_secs(2));
    assert!(client.is_closed());
}

#[test]
fn test_heartbeat_is_answered() {
    init_tracing();
    let (service, transporter, exchanger) = echo_setup();
    let client = exchanger.connect(&url(), Arc::new(NoService)).expect("connect");

    client.send(Message::Request(Request::heartbeat())).expect("heartbeat");
    std::thread::sleep(Duration::from_millis(20));

    assert!(service.one_way.lock().is_empty());
    assert!(transporter.client(0).expect("client end").is_connected());
    assert_eq!(exchanger.registry().pending_count(), 0);
}

#[test]
fn test_lazy_client_connects_once_under_contention() {
    init_tracing();
    let (_service, transporter, exchanger) = echo_setup();
    let lazy = Arc::new(LazyConnectExchangeClient::new(&url(), Arc::new(NoService), exchanger));

    assert_eq!(transporter.connects(), 0);
    assert!(lazy.is_connected());
    assert!(lazy.is_closed());

    let barrier = Arc::new(Barrier::new(8));
    let workers: Vec<_> = (0..8u8)
        .map(|n| {
            let lazy = lazy.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                let future = lazy.request(Payload::from(vec![n])).expect("request");
                future.wait_result().expect("payload")
            })
        })
        .collect();
    for (n, worker) in workers.into_iter().enumerate() {
        let payload = worker.join().expect("worker");
        assert_eq!(payload.as_bytes(), &[n as u8]);
    }

    assert_eq!(transporter.connects(), 1);
    assert!(!lazy.is_closed());
    assert_eq!(
        transporter.client(0).expect("client end").url().parameter(keys::SEND_RECONNECT),
        Some("true")
    );
}

#[test]
fn test_lazy_client_reports_initial_state() {
    init_tracing();
    for initial in [true, false] {
        let (_service, transporter, exchanger) = echo_setup();
        let lazy = LazyConnectExchangeClient::new(
            &url().with_parameter(keys::LAZY_CONNECT_INITIAL_STATE, initial),
            Arc::new(NoService),
            exchanger,
        );

        assert_eq!(lazy.is_connected(), initial);
        assert!(matches!(lazy.reconnect(), Err(ExchangeError::InvalidState { .. })));
        assert_eq!(transporter.connects(), 0);

        lazy.send(Message::from("wake")).expect("send");
        assert!(lazy.is_connected());
        assert_eq!(transporter.connects(), 1);

        lazy.reconnect().expect("reconnect once connected");
        assert_eq!(transporter.client(0).expect("client end").reconnects(), 1);
    }
}
