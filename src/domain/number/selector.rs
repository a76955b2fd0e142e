//! Outbound number selection

use crate::domain::number::entity::PhoneNumber;
use crate::domain::number::pool::PhoneNumberPool;
use crate::domain::shared::error::{DomainError, Result};
use tracing::{debug, warn};

/// Chooses the number an outbound send or call goes out on.
///
/// An explicit number that is present and active always wins. Otherwise
/// the least recently used active, rotation-enabled number is picked;
/// numbers never used sort first and ties keep pool order.
///
/// Selection is read-only. Usage is recorded by the caller once the
/// provider has confirmed the send, so a failed attempt does not push
/// the number back in the rotation.
pub struct NumberSelector;

impl NumberSelector {
    pub fn select(pool: &PhoneNumberPool, explicit: Option<&str>) -> Result<PhoneNumber> {
        if let Some(key) = explicit {
            match pool.find(key) {
                Some(number) if number.active => {
                    debug!("Using explicitly requested number {}", number.e164);
                    return Ok(number.clone());
                }
                Some(number) => {
                    warn!("Requested number {} is inactive, falling back to rotation", number.e164);
                }
                None => {
                    warn!("Requested number {} is not in the pool, falling back to rotation", key);
                }
            }
        }

        // min_by_key returns the first minimum, which keeps insertion order on ties
        let selected = pool
            .iter()
            .filter(|n| n.is_rotation_eligible())
            .min_by_key(|n| n.last_used_at)
            .ok_or(DomainError::NoEligibleNumber)?;

        debug!("Rotation selected number {}", selected.e164);
        Ok(selected.clone())
    }
}
