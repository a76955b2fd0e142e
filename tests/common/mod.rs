//! In-memory provider backend shared by the integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use switchline::domain::call::CallDirection;
use switchline::domain::message::{DeliveryStatus, Message, MessageDirection};
use switchline::domain::number::{NumberFlags, PhoneNumber};
use switchline::domain::shared::value_objects::{MessageId, PhoneNumberId, E164};
use switchline::domain::transport::{
    CallHandle, CallRecord, ProviderTransport, SendMessageRequest, TransportError,
};
use tokio::sync::oneshot;

pub fn number(id: &str, e164: &str) -> PhoneNumber {
    PhoneNumber::new(PhoneNumberId::new(id), E164::parse(e164).unwrap(), id)
}

/// Confirmed outbound message as the provider reports it
pub fn outbound(id: &str, from: &str, to: &str, body: &str, sent_at: DateTime<Utc>) -> Message {
    Message {
        id: MessageId::new(id),
        direction: MessageDirection::Outbound,
        from: from.to_string(),
        to: to.to_string(),
        body: body.to_string(),
        sent_at,
        status: DeliveryStatus::Sent,
        read_at: None,
    }
}

/// Finished outbound call as the provider lists it
pub fn finished_call(sid: &str, status: &str) -> CallRecord {
    CallRecord {
        provider_sid: sid.to_string(),
        direction: CallDirection::Outbound,
        from: "+15550001".to_string(),
        to: "+15550199".to_string(),
        status: status.to_string(),
        started_at: Utc::now(),
        ended_at: Some(Utc::now()),
        duration_seconds: Some(0),
    }
}

#[derive(Default)]
pub struct FakeTransport {
    pub numbers: Mutex<Vec<PhoneNumber>>,
    pub inbox: Mutex<Vec<Message>>,
    pub sent: Mutex<Vec<SendMessageRequest>>,
    pub ended_calls: Mutex<Vec<String>>,
    /// Returned by `list_calls`
    pub call_log: Mutex<Vec<CallRecord>>,
    pub fail_sends: Mutex<bool>,
    /// Held by the next send until released
    pub send_gate: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
    /// Held by the next initiate-call request until released
    pub call_gate: tokio::sync::Mutex<Option<oneshot::Receiver<()>>>,
    next_id: AtomicUsize,
    pub polls: AtomicUsize,
}

impl FakeTransport {
    pub fn with_numbers(numbers: Vec<PhoneNumber>) -> Self {
        let transport = Self::default();
        *transport.numbers.lock().unwrap() = numbers;
        transport
    }

    pub fn sent_from(&self) -> Vec<String> {
        self.sent.lock().unwrap().iter().map(|r| r.from.clone()).collect()
    }

    fn next_id(&self, prefix: &str) -> String {
        format!("{}{}", prefix, self.next_id.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[async_trait]
impl ProviderTransport for FakeTransport {
    async fn list_messages(
        &self,
        _since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Message>, TransportError> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.inbox.lock().unwrap().clone())
    }

    async fn send_message(&self, request: SendMessageRequest) -> Result<Message, TransportError> {
        let gate = self.send_gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if *self.fail_sends.lock().unwrap() {
            return Err(TransportError::Rejected {
                status: 503,
                message: "Carrier unavailable".to_string(),
            });
        }
        let message = outbound(
            &self.next_id("SM"),
            &request.from,
            &request.to,
            &request.body,
            Utc::now(),
        );
        self.sent.lock().unwrap().push(request);
        Ok(message)
    }

    async fn delete_message(&self, _id: &MessageId) -> Result<(), TransportError> {
        Ok(())
    }

    async fn delete_conversation(&self, _counterpart: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn mark_read(&self, _counterpart: &str) -> Result<(), TransportError> {
        Ok(())
    }

    async fn list_calls(&self) -> Result<Vec<CallRecord>, TransportError> {
        Ok(self.call_log.lock().unwrap().clone())
    }

    async fn initiate_call(&self, _from: &str, _to: &str) -> Result<CallHandle, TransportError> {
        let gate = self.call_gate.lock().await.take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        Ok(CallHandle {
            provider_sid: self.next_id("CA"),
        })
    }

    async fn end_call(&self, provider_sid: &str) -> Result<(), TransportError> {
        self.ended_calls.lock().unwrap().push(provider_sid.to_string());
        Ok(())
    }

    async fn list_phone_numbers(&self) -> Result<Vec<PhoneNumber>, TransportError> {
        Ok(self.numbers.lock().unwrap().clone())
    }

    async fn update_phone_number(
        &self,
        id: &PhoneNumberId,
        flags: NumberFlags,
    ) -> Result<PhoneNumber, TransportError> {
        let mut numbers = self.numbers.lock().unwrap();
        let number = numbers
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or(TransportError::Rejected {
                status: 404,
                message: "Unknown number".to_string(),
            })?;
        if let Some(enabled) = flags.rotation_enabled {
            number.rotation_enabled = enabled;
        }
        if let Some(active) = flags.active {
            number.active = active;
        }
        Ok(number.clone())
    }
}
