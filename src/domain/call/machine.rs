//! Call session state machine
//!
//! ```text
//! idle --incoming_signal--> ringing (inbound)
//! idle --user_initiate----> ringing (outbound)
//! ringing --user_answer (inbound) | provider_accepted (outbound)--> connecting
//! connecting --provider_connected--> connected
//! ringing|connecting|connected --hangup|reject|provider_ended|provider_error--> ended
//! ended --display window elapsed | reset--> idle
//! ```
//!
//! There is at most one session per client. Starting a call while any
//! session exists, including an ended one still on screen, fails with
//! `SessionBusy`. Any other trigger that does not fit the table is rejected
//! with `InvalidTransition` and leaves the state untouched.

use crate::domain::call::aggregate::CallSession;
use crate::domain::call::event::CallEvent;
use crate::domain::call::value_object::{CallDirection, CallState, CallTrigger, EndReason};
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::value_objects::CallId;
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

/// Default time an ended call stays on screen
pub const DEFAULT_ENDED_DISPLAY_MS: i64 = 3_000;

/// A state change performed by the machine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallTransition {
    pub call_id: CallId,
    pub from: CallState,
    pub to: CallState,
}

#[derive(Debug)]
pub struct CallSessionMachine {
    session: Option<CallSession>,
    ended_display: Duration,
    /// Events of sessions that have already been cleared
    pending_events: Vec<CallEvent>,
}

impl Default for CallSessionMachine {
    fn default() -> Self {
        Self::new(Duration::milliseconds(DEFAULT_ENDED_DISPLAY_MS))
    }
}

impl CallSessionMachine {
    pub fn new(ended_display: Duration) -> Self {
        Self {
            session: None,
            ended_display,
            pending_events: Vec::new(),
        }
    }

    pub fn state(&self) -> CallState {
        self.session
            .as_ref()
            .map(|s| s.state())
            .unwrap_or(CallState::Idle)
    }

    pub fn session(&self) -> Option<&CallSession> {
        self.session.as_ref()
    }

    pub fn is_busy(&self) -> bool {
        self.state().is_busy()
    }

    /// Apply a trigger at time `now`
    pub fn apply(&mut self, trigger: CallTrigger, now: DateTime<Utc>) -> Result<CallTransition> {
        let from = self.state();

        match (&trigger, from) {
            (CallTrigger::IncomingSignal { provider_sid, from: caller, to }, CallState::Idle) => {
                info!("Incoming call from {} ({})", caller, provider_sid);
                let session = CallSession::inbound(provider_sid.clone(), caller, to, now);
                return Ok(self.install(session, from));
            }
            (CallTrigger::UserInitiate { to, from_number }, CallState::Idle) => {
                info!("Placing call to {} from {}", to, from_number);
                let session = CallSession::outbound(to, from_number, now);
                return Ok(self.install(session, from));
            }
            (CallTrigger::IncomingSignal { .. } | CallTrigger::UserInitiate { .. }, _) => {
                return Err(DomainError::SessionBusy);
            }
            (_, CallState::Idle) => return Err(Self::invalid(&trigger, from)),
            _ => {}
        }

        let adopted_sid = self.check_provider_sid(&trigger, from)?;

        let Some(session) = self.session.as_mut() else {
            return Err(DomainError::InvalidTransition(format!(
                "{} without a session",
                trigger.name()
            )));
        };
        let direction = session.direction();

        let to = match (&trigger, from) {
            (CallTrigger::UserAnswer, CallState::Ringing) if direction == CallDirection::Inbound => {
                session.advance(CallState::Connecting, now);
                CallState::Connecting
            }
            (CallTrigger::ProviderAccepted { .. }, CallState::Ringing)
                if direction == CallDirection::Outbound =>
            {
                session.advance(CallState::Connecting, now);
                CallState::Connecting
            }
            (CallTrigger::ProviderConnected { .. }, CallState::Connecting) => {
                session.advance(CallState::Connected, now);
                CallState::Connected
            }
            (CallTrigger::UserHangup, state) if state.is_live() => {
                session.end(EndReason::LocalHangup, now);
                CallState::Ended
            }
            (CallTrigger::UserReject, state) if state.is_live() => {
                session.end(EndReason::Rejected, now);
                CallState::Ended
            }
            (CallTrigger::ProviderEnded { .. }, state) if state.is_live() => {
                session.end(EndReason::RemoteEnded, now);
                CallState::Ended
            }
            (CallTrigger::ProviderError { reason, .. }, state) if state.is_live() => {
                session.end(EndReason::Failed(reason.clone()), now);
                CallState::Ended
            }
            (CallTrigger::Reset, CallState::Ended) => {
                let call_id = session.id();
                self.clear(now);
                return Ok(CallTransition {
                    call_id,
                    from,
                    to: CallState::Idle,
                });
            }
            _ => return Err(Self::invalid(&trigger, from)),
        };

        if let Some(sid) = adopted_sid {
            debug!("Outbound call {} adopts provider sid {}", session.id(), sid);
            session.set_provider_sid(sid);
        }

        let call_id = session.id();
        debug!("Call {} {} -> {} on {}", call_id, from, to, trigger.name());
        Ok(CallTransition { call_id, from, to })
    }

    /// Return an ended call to idle once its display window has elapsed
    pub fn tick(&mut self, now: DateTime<Utc>) -> Option<CallTransition> {
        let deadline = self.display_deadline()?;
        if now < deadline {
            return None;
        }
        let call_id = self.session.as_ref()?.id();
        self.clear(now);
        Some(CallTransition {
            call_id,
            from: CallState::Ended,
            to: CallState::Idle,
        })
    }

    /// When the ended call will leave the screen
    pub fn display_deadline(&self) -> Option<DateTime<Utc>> {
        let session = self.session.as_ref()?;
        if session.state() != CallState::Ended {
            return None;
        }
        session.ended_at().map(|ended| ended + self.ended_display)
    }

    /// Attach the provider sid from an initiate-call response.
    ///
    /// Returns false when the call was hung up or replaced before the
    /// response arrived; the caller should then cancel the provider leg.
    pub fn bind_provider_sid(&mut self, call_id: CallId, sid: String) -> bool {
        match self.session.as_mut() {
            Some(session) if session.id() == call_id && session.state().is_live() => {
                if session.provider_sid().is_none() {
                    session.set_provider_sid(sid);
                }
                true
            }
            _ => {
                debug!("Discarding late confirmation {} for call {}", sid, call_id);
                false
            }
        }
    }

    /// End call `call_id` after the provider refused to place it.
    ///
    /// Returns None when that call already ended or another session
    /// replaced it; the current session is left alone.
    pub fn fail_initiate(
        &mut self,
        call_id: CallId,
        reason: String,
        now: DateTime<Utc>,
    ) -> Option<CallTransition> {
        let pending = self
            .session
            .as_ref()
            .is_some_and(|s| s.id() == call_id && s.state().is_live());
        if !pending {
            debug!("Initiate failure for call {} no longer applies", call_id);
            return None;
        }
        self.apply(
            CallTrigger::ProviderError {
                provider_sid: None,
                reason,
            },
            now,
        )
        .ok()
    }

    pub fn set_muted(&mut self, muted: bool, now: DateTime<Utc>) -> Result<bool> {
        match self.session.as_mut() {
            Some(session) if session.state() == CallState::Connected => {
                session.set_muted(muted, now);
                Ok(muted)
            }
            _ => Err(DomainError::NotConnected),
        }
    }

    /// Flip mute, returning the new value
    pub fn toggle_mute(&mut self, now: DateTime<Utc>) -> Result<bool> {
        let muted = self.session.as_ref().map(|s| s.is_muted()).unwrap_or(false);
        self.set_muted(!muted, now)
    }

    /// Take all pending events, including those of already cleared sessions
    pub fn take_events(&mut self) -> Vec<CallEvent> {
        let mut events = std::mem::take(&mut self.pending_events);
        if let Some(session) = self.session.as_mut() {
            events.extend(session.take_events());
        }
        events
    }

    fn install(&mut self, session: CallSession, from: CallState) -> CallTransition {
        let call_id = session.id();
        self.session = Some(session);
        CallTransition {
            call_id,
            from,
            to: CallState::Ringing,
        }
    }

    fn clear(&mut self, now: DateTime<Utc>) {
        if let Some(mut session) = self.session.take() {
            session.clear(now);
            self.pending_events.extend(session.take_events());
            debug!("Call {} cleared", session.id());
        }
    }

    /// Reject provider signals that belong to a different call.
    ///
    /// An outbound session without a sid may only learn it from an accept or
    /// connect signal; the sid is returned for the caller to attach once the
    /// transition succeeds. End and error signals naming a sid cannot be
    /// matched to such a session and are rejected.
    fn check_provider_sid(&self, trigger: &CallTrigger, from: CallState) -> Result<Option<String>> {
        let (Some(sid), Some(session)) = (trigger.provider_sid(), self.session.as_ref()) else {
            return Ok(None);
        };
        match session.provider_sid() {
            Some(current) if current != sid => Err(DomainError::InvalidTransition(format!(
                "{} for call {} while {} is {}",
                trigger.name(),
                sid,
                current,
                from
            ))),
            Some(_) => Ok(None),
            None if session.direction() != CallDirection::Outbound => Ok(None),
            None => match trigger {
                CallTrigger::ProviderAccepted { .. } | CallTrigger::ProviderConnected { .. } => {
                    Ok(Some(sid.to_string()))
                }
                _ => Err(DomainError::InvalidTransition(format!(
                    "{} for call {} before call {} was confirmed",
                    trigger.name(),
                    sid,
                    session.id()
                ))),
            },
        }
    }

    fn invalid(trigger: &CallTrigger, from: CallState) -> DomainError {
        DomainError::InvalidTransition(format!("{} while {}", trigger.name(), from))
    }
}
