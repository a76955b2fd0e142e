//! Call session aggregate

use crate::domain::call::event::{
    CallCleared, CallEnded, CallEvent, CallEventBase, CallMuteChanged, CallStarted,
    CallStateChanged,
};
use crate::domain::call::value_object::{CallDirection, CallState, EndReason};
use crate::domain::shared::value_objects::{normalize_address, CallId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The client's single voice call
///
/// Only [`CallSessionMachine`](crate::domain::call::CallSessionMachine)
/// creates and mutates sessions; it decides which transitions are legal.
/// The session records what happened and the domain events for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    id: CallId,
    /// Provider call sid, unknown for an outbound call until confirmed
    provider_sid: Option<String>,
    direction: CallDirection,
    counterpart: String,
    from_number: String,
    state: CallState,
    muted: bool,
    started_at: DateTime<Utc>,
    connected_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    end_reason: Option<EndReason>,
    #[serde(skip)]
    events: Vec<CallEvent>,
}

impl CallSession {
    pub(crate) fn inbound(provider_sid: String, from: &str, to: &str, now: DateTime<Utc>) -> Self {
        Self::start(
            Some(provider_sid),
            CallDirection::Inbound,
            normalize_address(from),
            normalize_address(to),
            now,
        )
    }

    pub(crate) fn outbound(to: &str, from_number: &str, now: DateTime<Utc>) -> Self {
        Self::start(
            None,
            CallDirection::Outbound,
            normalize_address(to),
            normalize_address(from_number),
            now,
        )
    }

    fn start(
        provider_sid: Option<String>,
        direction: CallDirection,
        counterpart: String,
        from_number: String,
        now: DateTime<Utc>,
    ) -> Self {
        let id = CallId::new();
        let mut session = Self {
            id,
            provider_sid,
            direction,
            counterpart: counterpart.clone(),
            from_number: from_number.clone(),
            state: CallState::Ringing,
            muted: false,
            started_at: now,
            connected_at: None,
            ended_at: None,
            end_reason: None,
            events: Vec::new(),
        };

        session.record_event(CallEvent::Started(CallStarted {
            base: CallEventBase::new("call.started", id, now),
            direction,
            counterpart,
            from_number,
        }));
        session.record_state_change(CallState::Idle, CallState::Ringing, now);

        session
    }

    pub(crate) fn advance(&mut self, to: CallState, now: DateTime<Utc>) {
        let from = self.state;
        self.state = to;
        if to == CallState::Connected {
            self.connected_at = Some(now);
        }
        self.record_state_change(from, to, now);
    }

    pub(crate) fn end(&mut self, reason: EndReason, now: DateTime<Utc>) {
        let from = self.state;
        self.state = CallState::Ended;
        self.muted = false;
        self.ended_at = Some(now);
        self.end_reason = Some(reason.clone());
        self.record_state_change(from, CallState::Ended, now);

        let duration_seconds = self.duration().map(|d| d.num_seconds());
        self.record_event(CallEvent::Ended(CallEnded {
            base: CallEventBase::new("call.ended", self.id, now),
            reason,
            duration_seconds,
        }));
    }

    pub(crate) fn clear(&mut self, now: DateTime<Utc>) {
        self.record_state_change(CallState::Ended, CallState::Idle, now);
        self.record_event(CallEvent::Cleared(CallCleared {
            base: CallEventBase::new("call.cleared", self.id, now),
        }));
    }

    pub(crate) fn set_muted(&mut self, muted: bool, now: DateTime<Utc>) {
        if self.muted == muted {
            return;
        }
        self.muted = muted;
        self.record_event(CallEvent::MuteChanged(CallMuteChanged {
            base: CallEventBase::new("call.mute_changed", self.id, now),
            muted,
        }));
    }

    pub(crate) fn set_provider_sid(&mut self, sid: String) {
        self.provider_sid = Some(sid);
    }

    fn record_state_change(&mut self, from: CallState, to: CallState, now: DateTime<Utc>) {
        self.record_event(CallEvent::StateChanged(CallStateChanged {
            base: CallEventBase::new("call.state_changed", self.id, now),
            from,
            to,
        }));
    }

    fn record_event(&mut self, event: CallEvent) {
        self.events.push(event);
    }

    /// Take all pending events
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        std::mem::take(&mut self.events)
    }

    // Getters
    pub fn id(&self) -> CallId {
        self.id
    }

    pub fn provider_sid(&self) -> Option<&str> {
        self.provider_sid.as_deref()
    }

    pub fn direction(&self) -> CallDirection {
        self.direction
    }

    pub fn counterpart(&self) -> &str {
        &self.counterpart
    }

    pub fn from_number(&self) -> &str {
        &self.from_number
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn connected_at(&self) -> Option<DateTime<Utc>> {
        self.connected_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn end_reason(&self) -> Option<&EndReason> {
        self.end_reason.as_ref()
    }

    /// Talk time, once the call has connected and ended
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.connected_at
            .and_then(|connected| self.ended_at.map(|ended| ended - connected))
    }
}
