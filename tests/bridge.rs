use cmdbridge::transport::{MemoryBroker, TransportError};
use cmdbridge::{
    BridgeConfig, BridgeError, CommandDispatcher, DispatchPlan, PendingCommands,
    ResponseListener, Scenario, Session, SupervisorState, TaskSupervisor,
};
use cmdbridge_shared::{
    alarm, codec, command_request::Cmd, otamgr, CommandResponse, Device, RetCode,
};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn devices(ids: &[&str]) -> Vec<Device> {
    ids.iter().map(|id| Device::new(*id).unwrap()).collect()
}

fn open(broker: &MemoryBroker) -> Session {
    Session::new(Arc::new(broker.connect()))
}

fn encoded_response(uuid: &str) -> Vec<u8> {
    codec::encode_response(&CommandResponse::reply(uuid, RetCode::Handled, None))
        .unwrap()
        .to_vec()
}

#[tokio::test]
async fn test_listener_counts_only_decoded_responses() {
    for stop_after in [0usize, 1, 3] {
        let broker = MemoryBroker::new();
        let session = open(&broker);
        let device = Device::new("dev").unwrap();
        let subscription = session.handle().subscribe(device.response_topic()).await.unwrap();

        for i in 0..stop_after {
            broker.inject(device.response_topic(), b"not protobuf".to_vec()).await;
            broker.inject(device.response_topic(), encoded_response(&format!("r{i}"))).await;
        }
        // Anything past the count stays unread
        broker.inject(device.response_topic(), encoded_response("extra")).await;

        let summary = ResponseListener::new(device, subscription, stop_after)
            .listen(CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(summary.observed, stop_after);
        assert_eq!(summary.skipped, stop_after);
        session.close().await.unwrap();
    }
}

#[tokio::test]
async fn test_sequence_published_in_program_order() {
    let broker = MemoryBroker::new();
    let session = open(&broker);
    let device = Device::new("dev").unwrap();
    let dispatcher = CommandDispatcher::new(session.handle(), PendingCommands::new());

    let commands: Vec<Cmd> = (0..5)
        .map(|i| {
            Cmd::AlarmAddRequest(alarm::AddRequest {
                crontab: format!("*/{} * * * * *", i + 1),
                oneshot: true,
            })
        })
        .collect();

    let issued = dispatcher.send_sequence(&device, commands).await.unwrap();

    let published = broker.published_to(device.request_topic());
    assert_eq!(published.len(), 5);
    let seen: Vec<String> = published
        .iter()
        .map(|record| codec::decode_request(&record.payload).unwrap().uuid)
        .collect();
    assert_eq!(seen, issued);
    assert!(published
        .iter()
        .all(|record| record.qos == cmdbridge::QoS::ExactlyOnce && !record.retain));

    session.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_sequence_waits_for_each_confirmation() {
    let broker = MemoryBroker::new();
    broker.set_publish_delay(Duration::from_millis(100));
    let session = open(&broker);
    let device = Device::new("dev").unwrap();
    let dispatcher = CommandDispatcher::new(session.handle(), PendingCommands::new());

    let started = tokio::time::Instant::now();
    dispatcher
        .send_sequence(
            &device,
            vec![
                Cmd::AlarmListRequest(alarm::ListRequest {}),
                Cmd::AlarmListRequest(alarm::ListRequest {}),
                Cmd::AlarmListRequest(alarm::ListRequest {}),
            ],
        )
        .await
        .unwrap();

    assert!(started.elapsed() >= Duration::from_millis(300));
    session.close().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_fan_out_publishes_identical_bytes_concurrently() {
    let broker = MemoryBroker::new();
    broker.set_publish_delay(Duration::from_millis(100));
    let session = open(&broker);
    let targets = devices(&["a", "b", "c", "d"]);
    let dispatcher = CommandDispatcher::new(session.handle(), PendingCommands::new());

    let started = tokio::time::Instant::now();
    dispatcher
        .fan_out(&targets, Cmd::OtamgrUpdateRequest(otamgr::UpdateRequest {}))
        .await
        .unwrap();

    // Four publishes overlapped instead of queueing behind each other
    assert!(started.elapsed() < Duration::from_millis(200));

    let published = broker.published();
    assert_eq!(published.len(), targets.len());
    for target in &targets {
        assert_eq!(broker.published_to(target.request_topic()).len(), 1);
    }
    assert!(published.iter().all(|record| record.payload == published[0].payload));

    session.close().await.unwrap();
}

#[tokio::test]
async fn test_update_scenario_two_devices() {
    let broker = MemoryBroker::new();
    let config = BridgeConfig::new(devices(&["a", "b"]));
    let scenario = Scenario::Update;
    let plan = scenario.plan(&config.devices).unwrap();

    let report = TaskSupervisor::new(&config)
        .run(
            open(&broker),
            &config.devices,
            plan,
            scenario.expected_responses(),
            std::future::pending::<()>(),
        )
        .await;

    assert!(report.is_success(), "{:?}", report);
    assert_eq!(report.dispatched.len(), 1);

    let published = broker.published();
    assert_eq!(published.len(), 2);
    assert_eq!(broker.published_to("command/a/req/").len(), 1);
    assert_eq!(broker.published_to("command/b/req/").len(), 1);
    assert_eq!(published[0].payload, published[1].payload);

    // Subscriptions were made for both devices and released on teardown
    for topic in ["command/a/resp/", "command/b/resp/"] {
        assert_eq!(broker.subscribe_count(topic), 1);
        assert_eq!(broker.unsubscribe_count(topic), 1);
    }
    assert_eq!(broker.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_while_listener_waits_releases_once() {
    let broker = MemoryBroker::new();
    let config = BridgeConfig::new(devices(&["dev"]));
    let supervisor = TaskSupervisor::new(&config);
    let state = supervisor.watch_state();
    let scenario = Scenario::Led;
    let plan = scenario.plan(&config.devices).unwrap();

    // Nobody answers, so the listener is parked on its queue when this fires
    let shutdown = tokio::time::sleep(Duration::from_secs(1));
    let report = supervisor
        .run(
            open(&broker),
            &config.devices,
            plan,
            scenario.expected_responses(),
            shutdown,
        )
        .await;

    assert!(report.interrupted);
    assert!(report.failures.is_empty());
    assert!(report.cancellation_failures.is_empty());
    assert!(report.listeners.is_empty());
    assert_eq!(report.dispatched.len(), 1);
    assert_eq!(*state.borrow(), SupervisorState::Closed);

    assert_eq!(broker.unsubscribe_count("command/dev/resp/"), 1);
    assert_eq!(broker.active_subscriptions("command/dev/resp/"), 0);

    // A late reply finds no queue to land in
    broker.inject("command/dev/resp/", encoded_response("late")).await;
    assert_eq!(broker.delivered_to("command/dev/resp/"), 0);
}

#[tokio::test]
async fn test_publish_failure_is_fatal() {
    let broker = MemoryBroker::new();
    broker.fail_publishes_to("command/dev/req/");
    let config = BridgeConfig::new(devices(&["dev"]));
    let scenario = Scenario::Alarms;
    let plan = scenario.plan(&config.devices).unwrap();

    let report = TaskSupervisor::new(&config)
        .run(
            open(&broker),
            &config.devices,
            plan,
            scenario.expected_responses(),
            std::future::pending::<()>(),
        )
        .await;

    assert!(matches!(
        report.fatal_error(),
        Some(BridgeError::Transport(TransportError::PublishFailed(_)))
    ));
    // The listener was cancelled rather than left waiting for 8 responses
    assert_eq!(report.failures.len(), 1);
    assert!(report.listeners.is_empty());
    assert_eq!(broker.unsubscribe_count("command/dev/resp/"), 1);
    assert_eq!(broker.disconnects(), 1);
}

#[tokio::test]
async fn test_rejected_subscription_stops_before_publishing() {
    let broker = MemoryBroker::new();
    broker.reject_subscriptions_to("command/b/resp/");
    let config = BridgeConfig::new(devices(&["a", "b"]));
    let scenario = Scenario::Update;
    let plan = scenario.plan(&config.devices).unwrap();

    let report = TaskSupervisor::new(&config)
        .run(
            open(&broker),
            &config.devices,
            plan,
            scenario.expected_responses(),
            std::future::pending::<()>(),
        )
        .await;

    assert!(matches!(
        report.fatal_error(),
        Some(BridgeError::Transport(TransportError::SubscribeRejected(_)))
    ));
    assert!(broker.published().is_empty());
    assert_eq!(broker.unsubscribe_count("command/a/resp/"), 1);
    assert_eq!(broker.disconnects(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_response_timeout_is_reported_but_not_fatal() {
    let broker = MemoryBroker::new();
    let mut config = BridgeConfig::new(devices(&["dev"]));
    config.response_timeout = Some(Duration::from_secs(2));
    let scenario = Scenario::Led;
    let plan = scenario.plan(&config.devices).unwrap();

    let report = TaskSupervisor::new(&config)
        .run(
            open(&broker),
            &config.devices,
            plan,
            scenario.expected_responses(),
            std::future::pending::<()>(),
        )
        .await;

    assert!(report.fatal_error().is_none());
    assert!(!report.is_success());
    assert!(matches!(
        report.failures[0].error,
        BridgeError::ResponseTimeout { observed: 0, expected: 1, .. }
    ));
}

#[tokio::test]
async fn test_fan_out_plan_through_dispatch() {
    let broker = MemoryBroker::new();
    let session = open(&broker);
    let dispatcher = CommandDispatcher::new(session.handle(), PendingCommands::new());

    let issued = dispatcher
        .dispatch(DispatchPlan::FanOut {
            targets: devices(&["a", "b"]),
            command: Cmd::OtamgrUpdateRequest(otamgr::UpdateRequest {}),
        })
        .await
        .unwrap();

    assert_eq!(issued.len(), 1);
    assert_eq!(broker.published().len(), 2);
    session.close().await.unwrap();
}
