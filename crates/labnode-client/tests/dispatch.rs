mod common;

use std::time::{Duration, Instant};

use bytes::Bytes;
use common::{Action, FakeDevice};
use futures_util::future::join_all;
use labnode_client::{ClientError, ClientEvent, ConnectionState, LabnodeClient};
use labnode_frame::ErrorCode;

async fn connected(device: &FakeDevice) -> LabnodeClient {
    LabnodeClient::connect_with(device.config())
        .await
        .expect("client should connect")
}

#[tokio::test]
async fn concurrent_calls_each_get_their_own_response() {
    let device = FakeDevice::echo().await;
    let client = connected(&device).await;

    let calls = (0..50u8).map(|i| {
        let client = client.clone();
        tokio::spawn(async move {
            let response = client.execute(11u8, vec![i, i, i], None).await?;
            Ok::<_, ClientError>((i, response))
        })
    });
    for call in join_all(calls).await {
        let (i, response) = call.unwrap().unwrap();
        assert_eq!(response.payload.as_ref(), &[i, i, i]);
    }

    assert_eq!(client.pending_requests(), 0);
    client.close().await;
}

#[tokio::test]
async fn writes_follow_issue_order() {
    let device = FakeDevice::echo().await;
    let client = connected(&device).await;

    let calls = (0..20u8).map(|i| client.execute(12u8, vec![i], None));
    for outcome in join_all(calls).await {
        outcome.unwrap();
    }

    let order: Vec<u8> = device.received().iter().map(|f| f.payload[0]).collect();
    assert_eq!(order, (0..20u8).collect::<Vec<_>>());
    client.close().await;
}

#[tokio::test]
async fn out_of_order_replies_are_correlated() {
    // The slow function answers after the fast one.
    let device = FakeDevice::start(|frame, _| {
        let action = Action::ok(vec![frame.function]);
        if frame.function == 15 {
            action.after(Duration::from_millis(150))
        } else {
            action
        }
    })
    .await;
    let client = connected(&device).await;

    let slow = {
        let client = client.clone();
        tokio::spawn(async move { client.execute(15u8, Bytes::new(), None).await })
    };
    device.wait_for_requests(1).await;
    let fast = client.execute(18u8, Bytes::new(), None).await.unwrap();
    assert_eq!(fast.payload.as_ref(), &[18]);
    assert!(!slow.is_finished());

    let slow = slow.await.unwrap().unwrap();
    assert_eq!(slow.payload.as_ref(), &[15]);
    assert_eq!(slow.function, 15);
    client.close().await;
}

#[tokio::test]
async fn silent_device_times_out_at_the_deadline() {
    let device = FakeDevice::start(|_, _| Action::Ignore).await;
    let client = connected(&device).await;
    let timeout = Duration::from_millis(200);

    let start = Instant::now();
    let err = client
        .execute(11u8, Bytes::new(), Some(timeout))
        .await
        .unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, ClientError::Timeout(t) if t == timeout));
    assert!(err.is_retryable());
    assert!(elapsed >= timeout, "timed out early: {elapsed:?}");
    assert!(elapsed < timeout + Duration::from_millis(150), "timed out late: {elapsed:?}");
    assert_eq!(client.pending_requests(), 0);
    assert!(client.is_connected());
    client.close().await;
}

#[tokio::test]
async fn reply_shortly_before_deadline_succeeds() {
    let device =
        FakeDevice::start(|_, _| Action::ok(vec![1, 2]).after(Duration::from_millis(120))).await;
    let client = connected(&device).await;

    let response = client
        .execute(11u8, Bytes::new(), Some(Duration::from_millis(200)))
        .await
        .unwrap();
    assert_eq!(response.payload.as_ref(), &[1, 2]);
    client.close().await;
}

#[tokio::test]
async fn late_reply_is_discarded_and_reported() {
    let device =
        FakeDevice::start(|_, _| Action::ok(Vec::new()).after(Duration::from_millis(250))).await;
    let client = connected(&device).await;
    let mut events = client.subscribe();

    let err = client
        .execute(13u8, Bytes::new(), Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Timeout(_)));

    let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(
        event,
        ClientEvent::UnmatchedResponse { function: 13, .. }
    ));
    // The read loop survives the stray frame.
    assert!(client.is_connected());
    client.close().await;
}

#[tokio::test]
async fn reset_fails_every_call_in_flight() {
    let device = FakeDevice::start(|_, _| Action::Ignore).await;
    let client = connected(&device).await;

    let calls: Vec<_> = (0..5u8)
        .map(|i| {
            let client = client.clone();
            tokio::spawn(async move {
                client
                    .execute(i, Bytes::new(), Some(Duration::from_secs(30)))
                    .await
            })
        })
        .collect();
    device.wait_for_requests(5).await;
    assert_eq!(client.pending_requests(), 5);

    device.hang_up_all();

    let outcomes = tokio::time::timeout(Duration::from_secs(2), join_all(calls))
        .await
        .expect("no call may hang after the link drops");
    for outcome in outcomes {
        assert!(matches!(outcome.unwrap(), Err(ClientError::ConnectionLost)));
    }
    assert_eq!(client.pending_requests(), 0);
    assert_eq!(client.state(), ConnectionState::Disconnected);

    let err = client.execute(11u8, Bytes::new(), None).await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
}

#[tokio::test]
async fn device_error_status_is_reported_as_device_error() {
    let device = FakeDevice::start(|_, _| Action::status(250)).await;
    let client = connected(&device).await;

    let err = client
        .execute(9u8, 5i32.to_le_bytes().to_vec(), None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Device { code: 250 }));
    assert_eq!(err.device_error(), Some(ErrorCode::ValueError));
    assert!(!err.is_retryable());
    client.close().await;
}

#[tokio::test]
async fn oversized_payload_is_rejected_locally() {
    let device = FakeDevice::echo().await;
    let client = connected(&device).await;

    let err = client
        .execute(25u8, vec![0u8; 2048], None)
        .await
        .unwrap_err();
    assert!(matches!(err, ClientError::Encoding(_)));

    client.execute(11u8, vec![1], None).await.unwrap();
    assert_eq!(device.received().len(), 1);
    client.close().await;
}

#[tokio::test]
async fn pending_sequence_survives_wraparound() {
    // Function 13 is never answered.
    let device = FakeDevice::start(|frame, _| {
        if frame.function == 13 {
            Action::Ignore
        } else {
            Action::ok(frame.payload.to_vec())
        }
    })
    .await;
    let client = LabnodeClient::connect_with(device.config().with_sequence_space(4))
        .await
        .unwrap();

    let held = {
        let client = client.clone();
        tokio::spawn(async move {
            client
                .execute(13u8, Bytes::new(), Some(Duration::from_secs(30)))
                .await
        })
    };
    let held_sequence = device.wait_for_requests(1).await[0].sequence;

    for i in 0..12u8 {
        let response = client.execute(11u8, vec![i], None).await.unwrap();
        assert_eq!(response.payload.as_ref(), &[i]);
    }

    let received = device.received();
    assert!(received.iter().all(|f| f.sequence < 4));
    assert!(received[1..].iter().all(|f| f.sequence != held_sequence));
    assert_eq!(client.pending_requests(), 1);

    client.close().await;
    assert!(matches!(held.await.unwrap(), Err(ClientError::ConnectionLost)));
}

#[tokio::test]
async fn close_is_idempotent_and_fails_pending_calls() {
    let device = FakeDevice::start(|_, _| Action::Ignore).await;
    let client = connected(&device).await;
    let mut events = client.subscribe();

    let pending = {
        let client = client.clone();
        tokio::spawn(async move { client.execute(11u8, Bytes::new(), None).await })
    };
    device.wait_for_requests(1).await;

    client.close().await;
    client.close().await;
    client.close().await;

    assert!(matches!(pending.await.unwrap(), Err(ClientError::ConnectionLost)));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(matches!(
        events.recv().await.unwrap(),
        ClientEvent::Disconnected { .. }
    ));
    assert!(events.try_recv().is_err(), "close must report only once");

    let err = client.execute(11u8, Bytes::new(), None).await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
}

#[tokio::test]
async fn connect_twice_keeps_one_link() {
    let device = FakeDevice::echo().await;
    let client = connected(&device).await;
    client.connect().await.unwrap();
    client.execute(11u8, Bytes::new(), None).await.unwrap();
    assert_eq!(device.connections(), 1);
    client.close().await;
}

#[tokio::test]
async fn client_reconnects_after_close() {
    let device = FakeDevice::echo().await;
    let client = connected(&device).await;
    client.close().await;

    client.connect().await.unwrap();
    client.execute(11u8, vec![4], None).await.unwrap();
    assert_eq!(device.connections(), 2);
    client.close().await;
}

#[tokio::test]
async fn scoped_closes_on_error() {
    let device = FakeDevice::echo().await;
    let mut handle = None;

    let result: Result<(), ClientError> = LabnodeClient::scoped(device.config(), |client| {
        handle = Some(client.clone());
        async move {
            client.execute(11u8, vec![1], None).await?;
            Err(ClientError::Config("caller failed".into()))
        }
    })
    .await;

    assert!(matches!(result, Err(ClientError::Config(_))));
    let client = handle.expect("closure should run");
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert!(!client.is_connected());
}

#[tokio::test]
async fn scoped_returns_closure_value() {
    let device = FakeDevice::echo().await;
    let payload = LabnodeClient::scoped(device.config(), |client| async move {
        let response = client.execute(11u8, vec![9, 8], None).await?;
        Ok::<_, ClientError>(response.payload)
    })
    .await
    .unwrap();
    assert_eq!(payload.as_ref(), &[9, 8]);
}

#[tokio::test]
async fn dropping_last_handle_releases_the_link() {
    let device = FakeDevice::echo().await;
    let client = connected(&device).await;
    let state = client.watch_state();

    drop(client);
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn connect_to_closed_port_fails() {
    let device = FakeDevice::echo().await;
    let config = device.config();
    drop(device);
    tokio::time::sleep(Duration::from_millis(20)).await;

    let err = LabnodeClient::connect_with(config).await.unwrap_err();
    assert!(matches!(err, ClientError::Connect(_)));
}
