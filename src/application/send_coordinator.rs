//! Outbound send coordination
//!
//! Sends and calls go out through one coordinator so that number selection,
//! the optimistic message and usage accounting stay consistent. No lock is
//! held while a request is in flight.

use crate::domain::call::{CallSession, CallSessionMachine, CallTrigger};
use crate::domain::message::{Message, MessageStore};
use crate::domain::number::{NumberSelector, PhoneNumber, PhoneNumberPool};
use crate::domain::shared::error::{DomainError, OutboundDraft, Result};
use crate::domain::shared::value_objects::E164;
use crate::domain::transport::{ProviderTransport, SendMessageRequest};
use crate::infrastructure::metrics;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

pub struct OutboundSendCoordinator {
    transport: Arc<dyn ProviderTransport>,
    pool: Arc<RwLock<PhoneNumberPool>>,
    store: Arc<RwLock<MessageStore>>,
    calls: Arc<Mutex<CallSessionMachine>>,
}

impl OutboundSendCoordinator {
    pub fn new(
        transport: Arc<dyn ProviderTransport>,
        pool: Arc<RwLock<PhoneNumberPool>>,
        store: Arc<RwLock<MessageStore>>,
        calls: Arc<Mutex<CallSessionMachine>>,
    ) -> Self {
        Self {
            transport,
            pool,
            store,
            calls,
        }
    }

    /// Send an SMS.
    ///
    /// The message shows up in the store immediately as an optimistic copy
    /// and is replaced by the provider's record once confirmed. On failure
    /// the copy is removed and the error carries the draft for a retry.
    pub async fn send_sms(&self, to: &str, body: &str, explicit_from: Option<&str>) -> Result<Message> {
        let to = E164::parse(to).map_err(DomainError::ValidationError)?;
        if body.trim().is_empty() {
            return Err(DomainError::ValidationError("message body is empty".to_string()));
        }

        let number = self.select(explicit_from).await?;
        let optimistic = Message::optimistic(number.e164.as_str(), to.as_str(), body, Utc::now());
        let temp_id = optimistic.id.clone();
        self.store.write().await.insert_optimistic(optimistic);

        let request = SendMessageRequest {
            from: number.e164.to_string(),
            to: to.to_string(),
            body: body.to_string(),
        };

        match self.transport.send_message(request).await {
            Ok(confirmed) => {
                self.store.write().await.confirm(&temp_id, confirmed.clone());
                self.record_usage(&number).await;
                metrics::record_sms_sent();
                info!("SMS {} sent to {} from {}", confirmed.id, to, number.e164);
                Ok(confirmed)
            }
            Err(e) => {
                self.store.write().await.rollback(&temp_id);
                metrics::record_sms_failed();
                warn!("SMS to {} failed: {}", to, e);
                Err(DomainError::SendFailed {
                    reason: e.reason(),
                    draft: OutboundDraft {
                        to: to.to_string(),
                        body: Some(body.to_string()),
                        explicit_from: explicit_from.map(str::to_string),
                    },
                })
            }
        }
    }

    /// Place an outbound call.
    ///
    /// The session rings locally while the provider request is in flight.
    /// If the user hangs up before the provider answers the request, the
    /// provider leg is cancelled and the confirmation discarded.
    pub async fn initiate_call(&self, to: &str, explicit_from: Option<&str>) -> Result<CallSession> {
        let to = E164::parse(to).map_err(DomainError::ValidationError)?;
        let number = self.select(explicit_from).await?;

        let transition = self.calls.lock().await.apply(
            CallTrigger::UserInitiate {
                to: to.to_string(),
                from_number: number.e164.to_string(),
            },
            Utc::now(),
        )?;

        match self
            .transport
            .initiate_call(number.e164.as_str(), to.as_str())
            .await
        {
            Ok(handle) => {
                let bound = self
                    .calls
                    .lock()
                    .await
                    .bind_provider_sid(transition.call_id, handle.provider_sid.clone());

                if !bound {
                    info!(
                        "Call {} ended before the provider confirmed it, cancelling {}",
                        transition.call_id, handle.provider_sid
                    );
                    if let Err(e) = self.transport.end_call(&handle.provider_sid).await {
                        warn!("Failed to cancel provider call {}: {}", handle.provider_sid, e);
                    }
                    return Err(DomainError::InvalidTransition(format!(
                        "call {} ended before confirmation",
                        transition.call_id
                    )));
                }

                self.record_usage(&number).await;
                metrics::record_call_initiated();
                info!("Call {} to {} placed as {}", transition.call_id, to, handle.provider_sid);

                self.calls
                    .lock()
                    .await
                    .session()
                    .filter(|s| s.id() == transition.call_id)
                    .cloned()
                    .ok_or_else(|| {
                        DomainError::InvalidTransition(format!(
                            "call {} ended before confirmation",
                            transition.call_id
                        ))
                    })
            }
            Err(e) => {
                warn!("Call to {} failed: {}", to, e);
                self.calls
                    .lock()
                    .await
                    .fail_initiate(transition.call_id, e.reason(), Utc::now());
                Err(DomainError::SendFailed {
                    reason: e.reason(),
                    draft: OutboundDraft {
                        to: to.to_string(),
                        body: None,
                        explicit_from: explicit_from.map(str::to_string),
                    },
                })
            }
        }
    }

    async fn select(&self, explicit_from: Option<&str>) -> Result<PhoneNumber> {
        let pool = self.pool.read().await;
        NumberSelector::select(&pool, explicit_from)
    }

    async fn record_usage(&self, number: &PhoneNumber) {
        if let Err(e) = self.pool.write().await.record_sent(&number.id, Utc::now()) {
            // The number was removed by a sync while the request was in flight
            debug!("Usage for {} not recorded: {}", number.e164, e);
        }
    }
}
