#![cfg(feature = "client")]

mod support;

use std::sync::Arc;
use std::task::Poll;
use std::time::Duration;

use pipeline_proto::client::{ClientConfig, ReconnectPolicy, ServiceClient, State};

use support::{CountingWorker, RecordingController};

async fn settle<Req, Resp, C>(client: &mut ServiceClient<Req, Resp, C>)
where
    C: pipeline_proto::io::IoController<Req>,
{
    for _ in 0..8 {
        let _ = std::future::poll_fn(|cx| Poll::Ready(client.poll_drive(cx))).await;
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn s4_client_correlation_pauses_and_resumes_writes() {
    let config = ClientConfig {
        sent_buffer_size: 2,
        ..ClientConfig::default()
    };
    let mut client: ServiceClient<&'static str, &'static str, RecordingController<&'static str>> =
        ServiceClient::new(config);
    client.connect().unwrap();
    let (controller, log) = RecordingController::new();
    client.connected(controller);

    let f1 = client.send("q1");
    settle(&mut client).await;
    let f2 = client.send("q2");
    settle(&mut client).await;
    assert!(log.writes_paused());

    let f3 = client.send("q3");
    settle(&mut client).await;

    client.process_response("s1").unwrap();
    assert!(!log.writes_paused());
    assert_eq!(f1.await.unwrap(), "s1");

    client.process_response("s2").unwrap();
    assert_eq!(f2.await.unwrap(), "s2");

    client.process_response("s3").unwrap();
    assert_eq!(f3.await.unwrap(), "s3");

    assert_eq!(log.pushed(), vec!["q1", "q2", "q3"]);
}

#[tokio::test]
async fn s5_fail_fast_purge_fails_everything_before_reconnect() {
    let config = ClientConfig {
        fail_fast: true,
        connection_attempts: ReconnectPolicy {
            interval: Duration::from_millis(1),
            max_attempts: Some(5),
        },
        ..ClientConfig::default()
    };
    let worker = CountingWorker::default();
    let mut client: ServiceClient<&'static str, &'static str, RecordingController<&'static str>> =
        ServiceClient::new(config).with_worker(Arc::new(worker.clone()));
    client.connect().unwrap();
    let (controller, _log) = RecordingController::new();
    client.connected(controller);

    let f1 = client.send("q1");
    let f2 = client.send("q2");
    settle(&mut client).await;

    assert_eq!(*worker.reconnects.lock().unwrap(), 0);

    let cause: Arc<dyn std::error::Error + Send + Sync> =
        Arc::new(std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset"));
    client.connection_lost(cause);

    assert!(f1.await.unwrap_err().is_connection_lost());
    assert!(f2.await.unwrap_err().is_connection_lost());
    assert_eq!(*worker.reconnects.lock().unwrap(), 1);
    assert_eq!(client.state(), State::Reconnecting);
}

#[tokio::test]
async fn s6_stale_client_rejects_connect_after_graceful_disconnect() {
    let mut client: ServiceClient<&'static str, &'static str, RecordingController<&'static str>> =
        ServiceClient::new(ClientConfig::default());
    client.connect().unwrap();
    let (controller, _log) = RecordingController::new();
    client.connected(controller);
    client.graceful_disconnect();
    assert_eq!(client.state(), State::Closed);

    assert!(client.connect().unwrap_err().is_stale_client());
}

#[tokio::test]
async fn reconnect_bound_stops_scheduling_past_max_attempts() {
    let config = ClientConfig {
        connection_attempts: ReconnectPolicy {
            interval: Duration::from_millis(1),
            max_attempts: Some(3),
        },
        ..ClientConfig::default()
    };
    let worker = CountingWorker::default();
    let mut client: ServiceClient<&'static str, &'static str, RecordingController<&'static str>> =
        ServiceClient::new(config).with_worker(Arc::new(worker.clone()));
    client.connect().unwrap();

    for _ in 0..6 {
        client.connection_failed();
    }

    assert_eq!(*worker.reconnects.lock().unwrap(), 3);
    assert_eq!(client.state(), State::Failed);
}

#[tokio::test]
async fn holding_area_replays_in_order_once_connected() {
    let mut client: ServiceClient<&'static str, &'static str, RecordingController<&'static str>> =
        ServiceClient::new(ClientConfig::default());
    client.connect().unwrap();

    let f1 = client.send("q1");
    let f2 = client.send("q2");

    let (controller, log) = RecordingController::new();
    client.connected(controller);
    settle(&mut client).await;

    client.process_response("s1").unwrap();
    client.process_response("s2").unwrap();
    assert_eq!(f1.await.unwrap(), "s1");
    assert_eq!(f2.await.unwrap(), "s2");
    assert_eq!(log.pushed(), vec!["q1", "q2"]);
}
