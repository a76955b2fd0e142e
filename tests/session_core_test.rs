//! Session core integration tests

mod common;

use chrono::Utc;
use common::{number, outbound, FakeTransport};
use std::sync::Arc;
use std::time::Duration;
use switchline::config::Config;
use switchline::domain::call::CallState;
use switchline::domain::realtime::RealtimeEvent;
use switchline::domain::shared::value_objects::{MessageId, PhoneNumberId};
use switchline::{DomainError, SessionCore};
use tokio::sync::{broadcast, oneshot};
use tokio_test::{assert_err, assert_ok};

fn three_numbers() -> Vec<switchline::domain::number::PhoneNumber> {
    vec![
        number("A", "+15550001"),
        number("B", "+15550002"),
        number("C", "+15550003"),
    ]
}

async fn setup(transport: Arc<FakeTransport>, config: &Config) -> Arc<SessionCore> {
    let core = Arc::new(SessionCore::new(transport, config));
    assert_ok!(core.sync_numbers().await);
    core
}

#[tokio::test]
async fn test_sends_rotate_through_pool() {
    let transport = Arc::new(FakeTransport::with_numbers(three_numbers()));
    let core = setup(transport.clone(), &Config::default()).await;

    for body in ["one", "two", "three", "four"] {
        assert_ok!(core.send_sms("+15550199", body, None).await);
    }

    assert_eq!(
        transport.sent_from(),
        vec!["+15550001", "+15550002", "+15550003", "+15550001"]
    );

    let conversations = core.conversations().await;
    assert_eq!(conversations.len(), 1);
    assert_eq!(conversations[0].message_count, 4);
    assert_eq!(conversations[0].last_message.body, "four");
}

#[tokio::test]
async fn test_explicit_number_and_disabled_rotation() {
    let transport = Arc::new(FakeTransport::with_numbers(three_numbers()));
    let core = setup(transport.clone(), &Config::default()).await;

    assert_ok!(core.set_rotation(&PhoneNumberId::new("A"), false).await);
    assert_ok!(core.send_sms("+15550199", "rotated", None).await);
    assert_ok!(core.send_sms("+15550199", "pinned", Some("+15550001")).await);

    assert_eq!(transport.sent_from(), vec!["+15550002", "+15550001"]);
}

#[tokio::test]
async fn test_push_before_send_response_converges() {
    let transport = Arc::new(FakeTransport::with_numbers(vec![number("A", "+15550001")]));
    let (release, gate) = oneshot::channel();
    *transport.send_gate.lock().await = Some(gate);
    let core = setup(transport.clone(), &Config::default()).await;

    let sender = {
        let core = core.clone();
        tokio::spawn(async move { core.send_sms("+15550199", "on my way", None).await })
    };

    // Wait for the optimistic copy
    let mut attempts = 0;
    while core.messages_with("+15550199").await.is_empty() {
        attempts += 1;
        assert!(attempts < 100, "optimistic message never appeared");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let thread = core.messages_with("+15550199").await;
    assert!(thread[0].id.is_temporary());

    // The push event for the confirmed send arrives first
    core.apply_realtime(RealtimeEvent::MessageSent {
        message: outbound("SM1", "+15550001", "+15550199", "on my way", Utc::now()),
    })
    .await;

    release.send(()).unwrap();
    let confirmed = sender.await.unwrap().unwrap();
    assert_eq!(confirmed.id, MessageId::new("SM1"));

    let thread = core.messages_with("+15550199").await;
    assert_eq!(thread.len(), 1);
    assert_eq!(thread[0].id, MessageId::new("SM1"));
}

#[tokio::test]
async fn test_failed_send_leaves_no_trace() {
    let transport = Arc::new(FakeTransport::with_numbers(vec![number("A", "+15550001")]));
    *transport.fail_sends.lock().unwrap() = true;
    let core = setup(transport.clone(), &Config::default()).await;

    let err = assert_err!(core.send_sms("+15550199", "hello", None).await);
    assert_eq!(err.draft().map(|d| d.to.as_str()), Some("+15550199"));
    assert!(core.conversations().await.is_empty());

    let numbers = core.phone_numbers().await;
    assert_eq!(numbers[0].sent_count, 0);
    assert!(numbers[0].last_used_at.is_none());
}

#[tokio::test]
async fn test_dispatch_loop_expires_ended_call() {
    let transport = Arc::new(FakeTransport::with_numbers(vec![number("A", "+15550001")]));
    let mut config = Config::default();
    config.calls.ended_display_ms = 100;
    let core = setup(transport, &config).await;

    let (tx, rx) = broadcast::channel(16);
    let dispatch = tokio::spawn(core.clone().run(rx));

    tx.send(RealtimeEvent::CallIncoming {
        provider_sid: "CA1".to_string(),
        from: "+15550199".to_string(),
        to: "+15550001".to_string(),
    })
    .unwrap();
    tx.send(RealtimeEvent::CallEnded {
        provider_sid: "CA1".to_string(),
    })
    .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(core.call_state().await, CallState::Ended);

    tokio::time::sleep(Duration::from_millis(600)).await;
    assert_eq!(core.call_state().await, CallState::Idle);

    drop(tx);
    tokio::time::timeout(Duration::from_secs(1), dispatch)
        .await
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn test_hangup_after_call_confirmation() {
    let transport = Arc::new(FakeTransport::with_numbers(vec![number("A", "+15550001")]));
    let core = setup(transport.clone(), &Config::default()).await;

    let session = assert_ok!(core.start_call("+15550199", None).await);
    assert_eq!(session.state(), CallState::Ringing);
    let sid = session.provider_sid().unwrap().to_string();

    assert_ok!(core.hangup().await);
    assert_eq!(core.call_state().await, CallState::Ended);
    assert_eq!(*transport.ended_calls.lock().unwrap(), vec![sid]);

    // A second call is refused until the ended call is cleared
    let busy = assert_err!(core.start_call("+15550199", None).await);
    assert_eq!(busy, DomainError::SessionBusy);

    assert_ok!(core.reset_call().await);
    assert_ok!(core.start_call("+15550199", None).await);
}

#[tokio::test]
async fn test_hangup_before_call_confirmation() {
    let transport = Arc::new(FakeTransport::with_numbers(vec![number("A", "+15550001")]));
    let (release, gate) = oneshot::channel();
    *transport.call_gate.lock().await = Some(gate);
    let core = setup(transport.clone(), &Config::default()).await;

    let pending = tokio::spawn({
        let core = core.clone();
        async move { core.start_call("+15550199", None).await }
    });
    tokio::time::timeout(Duration::from_secs(2), async {
        while core.call_state().await != CallState::Ringing {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    // No provider sid yet, so nothing to end at the provider
    assert_ok!(core.hangup().await);
    assert!(transport.ended_calls.lock().unwrap().is_empty());

    release.send(()).unwrap();
    let late = assert_err!(pending.await.unwrap());
    assert!(matches!(late, DomainError::InvalidTransition(_)));
    assert!(late.draft().is_none());

    // The late confirmation's leg is cancelled and the hangup stands
    assert_eq!(*transport.ended_calls.lock().unwrap(), vec!["CA1".to_string()]);
    assert_eq!(core.call_state().await, CallState::Ended);
    assert!(core.current_call().await.unwrap().provider_sid().is_none());
}

#[tokio::test]
async fn test_call_end_recovered_while_channel_is_down() {
    let transport = Arc::new(FakeTransport::with_numbers(vec![number("A", "+15550001")]));
    let mut config = Config::default();
    config.realtime.poll_interval_secs = 1;
    let core = setup(transport.clone(), &config).await;

    let session = assert_ok!(core.start_call("+15550199", None).await);
    let sid = session.provider_sid().unwrap().to_string();

    // The push channel is down: the event source stays open but silent
    let (tx, rx) = broadcast::channel::<RealtimeEvent>(16);
    let dispatch = tokio::spawn(core.clone().run(rx));
    transport
        .call_log
        .lock()
        .unwrap()
        .push(common::finished_call(&sid, "completed"));

    tokio::time::timeout(Duration::from_secs(5), async {
        while core.call_state().await != CallState::Ended {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .unwrap();
    assert_eq!(
        core.current_call().await.unwrap().end_reason(),
        Some(&switchline::domain::call::EndReason::RemoteEnded)
    );

    drop(tx);
    tokio::time::timeout(Duration::from_secs(1), dispatch)
        .await
        .unwrap()
        .unwrap();
}
