mod common;

use std::time::Duration;

use bytes::Bytes;
use common::{Action, FakeDevice};
use labnode_client::{ClientError, ClientEvent, ConnectionState, DisconnectReason, LabnodeClient};
use tokio::sync::broadcast;

async fn next_event(events: &mut broadcast::Receiver<ClientEvent>) -> ClientEvent {
    tokio::time::timeout(Duration::from_secs(3), events.recv())
        .await
        .expect("event should arrive")
        .expect("event channel open")
}

async fn wait_for_state(client: &LabnodeClient, state: ConnectionState) {
    let mut states = client.watch_state();
    tokio::time::timeout(Duration::from_secs(3), states.wait_for(|s| *s == state))
        .await
        .expect("state should be reached")
        .expect("state channel open");
}

#[tokio::test]
async fn corrupted_frame_forces_reconnect_cycle() {
    // The first connection answers with a bad checksum; later ones are healthy.
    let device = FakeDevice::start(|frame, connection| {
        if connection == 0 {
            Action::Corrupt
        } else {
            Action::ok(frame.payload.to_vec())
        }
    })
    .await;
    let client = LabnodeClient::connect_with(device.reconnecting_config(0))
        .await
        .unwrap();
    let mut events = client.subscribe();

    let err = client.execute(11u8, vec![1], None).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionLost));

    match next_event(&mut events).await {
        ClientEvent::Disconnected {
            reason: DisconnectReason::Framing(_),
        } => {}
        other => panic!("expected framing disconnect, got {other:?}"),
    }
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Reconnected { attempt: 1 }
    );

    let response = client.execute(11u8, vec![2, 3], None).await.unwrap();
    assert_eq!(response.payload.as_ref(), &[2, 3]);
    assert_eq!(device.connections(), 2);
    client.close().await;
}

#[tokio::test]
async fn reconnects_after_remote_hangup() {
    let device = FakeDevice::echo().await;
    let client = LabnodeClient::connect_with(device.reconnecting_config(0))
        .await
        .unwrap();
    let mut events = client.subscribe();

    device.hang_up_all();

    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Disconnected {
            reason: DisconnectReason::RemoteClosed
        }
    );
    assert_eq!(
        next_event(&mut events).await,
        ClientEvent::Reconnected { attempt: 1 }
    );
    assert_eq!(client.state(), ConnectionState::Connected);

    client.execute(12u8, vec![5], None).await.unwrap();
    client.close().await;
}

#[tokio::test]
async fn failed_attempts_are_reported_until_the_policy_gives_up() {
    let device = FakeDevice::echo().await;
    let client = LabnodeClient::connect_with(device.reconnecting_config(3))
        .await
        .unwrap();
    let mut events = client.subscribe();

    device.shutdown();

    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Disconnected { .. }
    ));

    let mut failures = Vec::new();
    for _ in 0..3 {
        match next_event(&mut events).await {
            ClientEvent::ReconnectFailed {
                attempt,
                next_delay,
                ..
            } => failures.push((attempt, next_delay)),
            other => panic!("expected reconnect failure, got {other:?}"),
        }
    }
    assert_eq!(
        failures,
        vec![
            (1, Some(Duration::from_millis(40))),
            (2, Some(Duration::from_millis(80))),
            (3, None),
        ]
    );

    assert_eq!(client.state(), ConnectionState::Disconnected);
    let err = client.execute(11u8, Bytes::new(), None).await.unwrap_err();
    assert!(matches!(err, ClientError::NotConnected));
}

#[tokio::test]
async fn close_stops_reconnection() {
    let device = FakeDevice::echo().await;
    let client = LabnodeClient::connect_with(device.reconnecting_config(0))
        .await
        .unwrap();
    let mut events = client.subscribe();

    device.shutdown();
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::Disconnected { .. }
    ));
    assert!(matches!(
        next_event(&mut events).await,
        ClientEvent::ReconnectFailed { .. }
    ));

    client.close().await;
    tokio::time::sleep(Duration::from_millis(300)).await;

    // An attempt already past its connect call may still report once.
    let mut late_failures = 0;
    while let Ok(event) = events.try_recv() {
        match event {
            ClientEvent::ReconnectFailed { .. } => late_failures += 1,
            ClientEvent::Reconnected { .. } => panic!("reconnected after close"),
            _ => {}
        }
    }
    assert!(late_failures <= 1);
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn calls_during_outage_fail_fast() {
    let device = FakeDevice::start(|frame, _| {
        if frame.function == 30 {
            Action::Hangup
        } else {
            Action::ok(Vec::new())
        }
    })
    .await;
    let client = LabnodeClient::connect_with(device.reconnecting_config(0))
        .await
        .unwrap();

    // Reset: the device drops the link while it reboots.
    let err = client.execute(30u8, Bytes::new(), None).await.unwrap_err();
    assert!(matches!(err, ClientError::ConnectionLost));

    wait_for_state(&client, ConnectionState::Connected).await;
    client.execute(11u8, Bytes::new(), None).await.unwrap();
    client.close().await;
}
