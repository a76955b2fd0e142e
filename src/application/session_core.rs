//! Session core
//!
//! Owns the client's shared state: the message set, the number pool and the
//! call session. Push events, poll results and user actions all mutate that
//! state through this type. Each of the three structures sits behind its own
//! lock and no method holds two of them at once.

use crate::application::send_coordinator::OutboundSendCoordinator;
use crate::config::Config;
use crate::domain::call::{CallEvent, CallSession, CallSessionMachine, CallState, CallTransition, CallTrigger};
use crate::domain::message::{
    Conversation, ConversationAggregator, Message, MessageDirection, MergeOutcome, MessageStore,
};
use crate::domain::number::{NumberFlags, PhoneNumber, PhoneNumberPool};
use crate::domain::realtime::RealtimeEvent;
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::value_objects::{normalize_address, MessageId, PhoneNumberId};
use crate::domain::transport::{CallRecord, ProviderTransport};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info, warn};

/// How often the dispatch loop checks the ended-call display window
const TICK_INTERVAL: Duration = Duration::from_millis(250);

const CALL_EVENT_BUFFER: usize = 64;

pub struct SessionCore {
    transport: Arc<dyn ProviderTransport>,
    store: Arc<RwLock<MessageStore>>,
    pool: Arc<RwLock<PhoneNumberPool>>,
    calls: Arc<Mutex<CallSessionMachine>>,
    aggregator: std::sync::Mutex<ConversationAggregator>,
    coordinator: OutboundSendCoordinator,
    call_events: broadcast::Sender<CallEvent>,
    reconcile_interval: Duration,
}

impl SessionCore {
    pub fn new(transport: Arc<dyn ProviderTransport>, config: &Config) -> Self {
        let store = Arc::new(RwLock::new(MessageStore::new(
            config.messages.optimistic_match_window(),
        )));
        let pool = Arc::new(RwLock::new(PhoneNumberPool::new()));
        let calls = Arc::new(Mutex::new(CallSessionMachine::new(
            config.calls.ended_display(),
        )));
        let coordinator = OutboundSendCoordinator::new(
            transport.clone(),
            pool.clone(),
            store.clone(),
            calls.clone(),
        );
        let (call_events, _) = broadcast::channel(CALL_EVENT_BUFFER);

        Self {
            transport,
            store,
            pool,
            calls,
            aggregator: std::sync::Mutex::new(ConversationAggregator::new()),
            coordinator,
            call_events,
            reconcile_interval: config.realtime.poll_interval(),
        }
    }

    /// Subscribe to call domain events
    pub fn subscribe_calls(&self) -> broadcast::Receiver<CallEvent> {
        self.call_events.subscribe()
    }

    /// Dispatch loop: applies realtime events, expires ended calls and
    /// checks a live call against the provider's call list on the poll
    /// interval.
    ///
    /// Returns when the event source is closed.
    pub async fn run(self: Arc<Self>, mut events: broadcast::Receiver<RealtimeEvent>) {
        let mut ticker = interval(TICK_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reconcile = interval(self.reconcile_interval);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!("Session dispatch loop started");
        loop {
            tokio::select! {
                received = events.recv() => match received {
                    Ok(event) => self.apply_realtime(event).await,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!("Dispatch loop lagged, {} events skipped; refreshing messages", skipped);
                        if let Err(e) = self.refresh_messages().await {
                            warn!("Refresh after lag failed: {}", e);
                        }
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        info!("Realtime event source closed, dispatch loop exiting");
                        break;
                    }
                },
                _ = ticker.tick() => {
                    self.tick().await;
                }
                _ = reconcile.tick() => {
                    if let Err(e) = self.reconcile_call().await {
                        warn!("Call reconciliation failed: {}", e);
                    }
                }
            }
        }
    }

    /// Apply one realtime event to the shared state
    pub async fn apply_realtime(&self, event: RealtimeEvent) {
        match event {
            RealtimeEvent::MessageReceived { message } | RealtimeEvent::MessageSent { message } => {
                self.merge_message(message).await;
            }
            RealtimeEvent::MessageStatus { id, status } => {
                if !self.store.write().await.update_status(&id, status) {
                    debug!("Status {:?} for {} ignored", status, id);
                }
            }
            RealtimeEvent::MessagesPolled { messages } => {
                for message in messages {
                    self.merge_message(message).await;
                }
            }
            RealtimeEvent::CallIncoming { provider_sid, from, to } => {
                self.signal(CallTrigger::IncomingSignal { provider_sid, from, to })
                    .await;
            }
            RealtimeEvent::CallAccepted { provider_sid } => {
                self.signal(CallTrigger::ProviderAccepted {
                    provider_sid: Some(provider_sid),
                })
                .await;
            }
            RealtimeEvent::CallConnected { provider_sid } => {
                self.signal(CallTrigger::ProviderConnected {
                    provider_sid: Some(provider_sid),
                })
                .await;
            }
            RealtimeEvent::CallEnded { provider_sid } => {
                self.signal(CallTrigger::ProviderEnded {
                    provider_sid: Some(provider_sid),
                })
                .await;
            }
            RealtimeEvent::CallFailed { provider_sid, reason } => {
                self.signal(CallTrigger::ProviderError {
                    provider_sid: Some(provider_sid),
                    reason,
                })
                .await;
            }
        }
    }

    /// Expire an ended call whose display window has elapsed
    pub async fn tick(&self) -> Option<CallTransition> {
        let mut machine = self.calls.lock().await;
        let transition = machine.tick(Utc::now());
        self.publish_call_events(&mut machine);
        transition
    }

    /// Apply a terminal status for the live call from the provider's call
    /// list.
    ///
    /// Covers an end or failure signal lost while the push channel was down.
    /// Does nothing unless a live call has a provider sid.
    pub async fn reconcile_call(&self) -> Result<Option<CallTransition>> {
        let live_sid = {
            let machine = self.calls.lock().await;
            machine
                .session()
                .filter(|s| s.state().is_live())
                .and_then(|s| s.provider_sid())
                .map(str::to_string)
        };
        let Some(sid) = live_sid else {
            return Ok(None);
        };

        let records = self.transport.list_calls().await?;
        let Some(record) = records.iter().find(|r| r.provider_sid == sid) else {
            debug!("Live call {} not in provider call list yet", sid);
            return Ok(None);
        };
        let Some(trigger) = record.terminal_trigger() else {
            return Ok(None);
        };

        info!("Provider reports call {} as {}", sid, record.status);
        let mut machine = self.calls.lock().await;
        let result = machine.apply(trigger, Utc::now());
        self.publish_call_events(&mut machine);
        match result {
            Ok(transition) => Ok(Some(transition)),
            Err(e) => {
                debug!("Reconciled status for {} not applied: {}", sid, e);
                Ok(None)
            }
        }
    }

    pub async fn send_sms(&self, to: &str, body: &str, explicit_from: Option<&str>) -> Result<Message> {
        self.coordinator.send_sms(to, body, explicit_from).await
    }

    pub async fn start_call(&self, to: &str, explicit_from: Option<&str>) -> Result<CallSession> {
        let result = self.coordinator.initiate_call(to, explicit_from).await;
        self.flush_call_events().await;
        result
    }

    pub async fn answer(&self) -> Result<CallTransition> {
        self.user_action(CallTrigger::UserAnswer).await
    }

    /// Hang up the current call and end the provider leg
    pub async fn hangup(&self) -> Result<CallTransition> {
        self.end_by_user(CallTrigger::UserHangup).await
    }

    /// Reject a ringing call and end the provider leg
    pub async fn reject(&self) -> Result<CallTransition> {
        self.end_by_user(CallTrigger::UserReject).await
    }

    /// Dismiss an ended call without waiting for the display window
    pub async fn reset_call(&self) -> Result<CallTransition> {
        self.user_action(CallTrigger::Reset).await
    }

    pub async fn toggle_mute(&self) -> Result<bool> {
        let mut machine = self.calls.lock().await;
        let muted = machine.toggle_mute(Utc::now());
        self.publish_call_events(&mut machine);
        muted
    }

    pub async fn call_state(&self) -> CallState {
        self.calls.lock().await.state()
    }

    pub async fn current_call(&self) -> Option<CallSession> {
        self.calls.lock().await.session().cloned()
    }

    /// Past calls as reported by the provider
    pub async fn call_history(&self) -> Result<Vec<CallRecord>> {
        Ok(self.transport.list_calls().await?)
    }

    pub async fn conversations(&self) -> Vec<Conversation> {
        let store = self.store.read().await;
        match self.aggregator.lock() {
            Ok(mut aggregator) => aggregator.conversations(&store).to_vec(),
            Err(poisoned) => poisoned.into_inner().conversations(&store).to_vec(),
        }
    }

    pub async fn total_unread(&self) -> usize {
        self.conversations().await.iter().map(|c| c.unread_count).sum()
    }

    /// Messages exchanged with `counterpart`, oldest first
    pub async fn messages_with(&self, counterpart: &str) -> Vec<Message> {
        let counterpart = normalize_address(counterpart);
        self.store
            .read()
            .await
            .thread(&counterpart)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Mark every inbound message from `counterpart` as read.
    ///
    /// The provider is only told when something changed. Returns the number
    /// of messages marked.
    pub async fn mark_conversation_read(&self, counterpart: &str) -> Result<usize> {
        let counterpart = normalize_address(counterpart);
        let changed = self
            .store
            .write()
            .await
            .mark_conversation_read(&counterpart, Utc::now());

        if changed > 0 {
            debug!("Marked {} messages from {} read", changed, counterpart);
            self.transport.mark_read(&counterpart).await?;
        }
        Ok(changed)
    }

    pub async fn delete_message(&self, id: &MessageId) -> Result<()> {
        if !id.is_temporary() {
            self.transport.delete_message(id).await?;
        }
        if self.store.write().await.remove(id).is_none() {
            debug!("Deleted message {} was not in the local set", id);
        }
        Ok(())
    }

    /// Delete a whole conversation, returning how many local messages went
    pub async fn delete_conversation(&self, counterpart: &str) -> Result<usize> {
        let counterpart = normalize_address(counterpart);
        self.transport.delete_conversation(&counterpart).await?;
        let removed = self.store.write().await.remove_conversation(&counterpart);
        info!("Deleted conversation with {} ({} messages)", counterpart, removed);
        Ok(removed)
    }

    /// Fetch the full message list and merge it
    pub async fn refresh_messages(&self) -> Result<usize> {
        let messages = self.transport.list_messages(None).await?;
        let count = messages.len();
        for message in messages {
            self.merge_message(message).await;
        }
        Ok(count)
    }

    /// Replace the pool's view with the provider's number list
    pub async fn sync_numbers(&self) -> Result<usize> {
        let numbers = self.transport.list_phone_numbers().await?;
        let count = numbers.len();
        self.pool.write().await.sync(numbers);
        info!("Synchronized {} phone numbers", count);
        Ok(count)
    }

    pub async fn set_rotation(&self, id: &PhoneNumberId, enabled: bool) -> Result<PhoneNumber> {
        self.update_number(
            id,
            NumberFlags {
                rotation_enabled: Some(enabled),
                active: None,
            },
        )
        .await
    }

    pub async fn set_active(&self, id: &PhoneNumberId, active: bool) -> Result<PhoneNumber> {
        self.update_number(
            id,
            NumberFlags {
                rotation_enabled: None,
                active: Some(active),
            },
        )
        .await
    }

    pub async fn phone_numbers(&self) -> Vec<PhoneNumber> {
        self.pool.read().await.iter().cloned().collect()
    }

    async fn update_number(&self, id: &PhoneNumberId, flags: NumberFlags) -> Result<PhoneNumber> {
        if self.pool.read().await.get(id).is_none() {
            return Err(DomainError::NotFound(format!("phone number {}", id)));
        }
        let updated = self.transport.update_phone_number(id, flags).await?;

        let mut pool = self.pool.write().await;
        pool.upsert(updated);
        pool.get(id)
            .cloned()
            .ok_or_else(|| DomainError::NotFound(format!("phone number {}", id)))
    }

    async fn merge_message(&self, message: Message) {
        let inbound_to = (message.direction == MessageDirection::Inbound).then(|| message.to.clone());
        let outcome = self.store.write().await.merge(message);

        if let (MergeOutcome::Inserted, Some(to)) = (&outcome, inbound_to) {
            if !self.pool.write().await.record_received(&to) {
                debug!("Inbound message addressed to unknown number {}", to);
            }
        }
    }

    /// Feed a provider signal to the machine; rejected signals are logged
    async fn signal(&self, trigger: CallTrigger) {
        let name = trigger.name();
        let mut machine = self.calls.lock().await;
        match machine.apply(trigger, Utc::now()) {
            Ok(transition) => {
                debug!("Call {} {} -> {}", transition.call_id, transition.from, transition.to);
            }
            Err(DomainError::SessionBusy) => {
                warn!("Ignoring {} while another call is in progress", name);
            }
            Err(e) => {
                debug!("Ignoring {}: {}", name, e);
            }
        }
        self.publish_call_events(&mut machine);
    }

    async fn user_action(&self, trigger: CallTrigger) -> Result<CallTransition> {
        let mut machine = self.calls.lock().await;
        let result = machine.apply(trigger, Utc::now());
        self.publish_call_events(&mut machine);
        result
    }

    async fn end_by_user(&self, trigger: CallTrigger) -> Result<CallTransition> {
        let (transition, provider_sid) = {
            let mut machine = self.calls.lock().await;
            let transition = machine.apply(trigger, Utc::now());
            let sid = machine
                .session()
                .and_then(|s| s.provider_sid())
                .map(str::to_string);
            self.publish_call_events(&mut machine);
            (transition?, sid)
        };

        // Without a sid the initiate request is still in flight; the
        // coordinator cancels that leg when the response arrives.
        if let Some(sid) = provider_sid {
            if let Err(e) = self.transport.end_call(&sid).await {
                warn!("Failed to end provider call {}: {}", sid, e);
            }
        }
        Ok(transition)
    }

    async fn flush_call_events(&self) {
        let mut machine = self.calls.lock().await;
        self.publish_call_events(&mut machine);
    }

    fn publish_call_events(&self, machine: &mut CallSessionMachine) {
        for event in machine.take_events() {
            debug!("Call event {} for {}", event.event_type(), event.call_id());
            let _ = self.call_events.send(event);
        }
    }
}
