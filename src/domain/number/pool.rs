//! Phone number pool
//!
//! Holds every number the account owns, in the order they were first seen.
//! Numbers are never removed; a number the provider no longer reports is
//! deactivated instead.

use crate::domain::number::entity::PhoneNumber;
use crate::domain::shared::error::{DomainError, Result};
use crate::domain::shared::value_objects::{normalize_address, PhoneNumberId};
use chrono::{DateTime, Utc};
use std::collections::HashSet;
use tracing::{debug, info};

#[derive(Debug, Clone, Default)]
pub struct PhoneNumberPool {
    numbers: Vec<PhoneNumber>,
}

impl PhoneNumberPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_numbers(numbers: impl IntoIterator<Item = PhoneNumber>) -> Self {
        let mut pool = Self::new();
        for number in numbers {
            pool.upsert(number);
        }
        pool
    }

    /// Insert a number, or refresh an existing one from provider data.
    ///
    /// Flags and label come from `incoming`. Usage counters keep whichever
    /// side has seen more traffic so a stale provider view never erases
    /// local usage.
    pub fn upsert(&mut self, incoming: PhoneNumber) {
        match self.numbers.iter_mut().find(|n| n.id == incoming.id) {
            Some(existing) => {
                existing.e164 = incoming.e164;
                existing.label = incoming.label;
                existing.rotation_enabled = incoming.rotation_enabled;
                existing.active = incoming.active;
                existing.sent_count = existing.sent_count.max(incoming.sent_count);
                existing.received_count = existing.received_count.max(incoming.received_count);
                existing.last_used_at = existing.last_used_at.max(incoming.last_used_at);
            }
            None => {
                debug!("Adding phone number {} to pool", incoming.e164);
                self.numbers.push(incoming);
            }
        }
    }

    /// Synchronize with the provider's current number list
    pub fn sync(&mut self, provider_numbers: Vec<PhoneNumber>) {
        let seen: HashSet<PhoneNumberId> = provider_numbers.iter().map(|n| n.id.clone()).collect();

        for number in provider_numbers {
            self.upsert(number);
        }

        for number in self.numbers.iter_mut() {
            if !seen.contains(&number.id) && number.active {
                info!("Phone number {} no longer reported by provider, deactivating", number.e164);
                number.active = false;
            }
        }
    }

    pub fn get(&self, id: &PhoneNumberId) -> Option<&PhoneNumber> {
        self.numbers.iter().find(|n| &n.id == id)
    }

    pub fn find_by_e164(&self, address: &str) -> Option<&PhoneNumber> {
        let address = normalize_address(address);
        self.numbers.iter().find(|n| n.e164.as_str() == address)
    }

    /// Look a number up by id or by address
    pub fn find(&self, key: &str) -> Option<&PhoneNumber> {
        let normalized = normalize_address(key);
        self.numbers
            .iter()
            .find(|n| n.matches(key) || n.matches(&normalized))
    }

    pub fn iter(&self) -> impl Iterator<Item = &PhoneNumber> {
        self.numbers.iter()
    }

    pub fn len(&self) -> usize {
        self.numbers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.numbers.is_empty()
    }

    pub fn set_rotation(&mut self, id: &PhoneNumberId, enabled: bool) -> Result<()> {
        self.get_mut(id)?.rotation_enabled = enabled;
        Ok(())
    }

    pub fn set_active(&mut self, id: &PhoneNumberId, active: bool) -> Result<()> {
        self.get_mut(id)?.active = active;
        Ok(())
    }

    pub fn deactivate(&mut self, id: &PhoneNumberId) -> Result<()> {
        self.set_active(id, false)
    }

    /// Record a confirmed send or call through `id`
    pub fn record_sent(&mut self, id: &PhoneNumberId, at: DateTime<Utc>) -> Result<()> {
        self.get_mut(id)?.record_sent(at);
        Ok(())
    }

    /// Count an inbound message addressed to one of our numbers.
    ///
    /// Returns false when the address is not ours.
    pub fn record_received(&mut self, address: &str) -> bool {
        let address = normalize_address(address);
        match self.numbers.iter_mut().find(|n| n.e164.as_str() == address) {
            Some(number) => {
                number.record_received();
                true
            }
            None => false,
        }
    }

    fn get_mut(&mut self, id: &PhoneNumberId) -> Result<&mut PhoneNumber> {
        self.numbers
            .iter_mut()
            .find(|n| &n.id == id)
            .ok_or_else(|| DomainError::NotFound(format!("phone number {}", id)))
    }
}
