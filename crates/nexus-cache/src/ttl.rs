//! TTL bounds shared by both tiers.

use nexus_core::{NexusError, NexusResult};
use std::time::Duration;
use tokio::time::Instant;

/// Longest TTL the cache accepts, one year.
pub const MAX_TTL_SECS: u64 = 365 * 24 * 60 * 60;

/// [`MAX_TTL_SECS`] as a duration.
pub const MAX_TTL: Duration = Duration::from_secs(MAX_TTL_SECS);

/// Instant at which an entry written at `now` with `ttl` expires. TTLs
/// above [`MAX_TTL`] are clamped.
#[must_use]
pub fn expires_at(now: Instant, ttl: Duration) -> Instant {
    now.checked_add(ttl.min(MAX_TTL)).unwrap_or(now)
}

/// Converts a TTL received over the wire, rejecting values above
/// [`MAX_TTL_SECS`].
pub fn from_secs(secs: u64) -> NexusResult<Duration> {
    if secs > MAX_TTL_SECS {
        return Err(NexusError::validation(format!(
            "TTL of {}s exceeds the maximum of {}s",
            secs, MAX_TTL_SECS
        )));
    }
    Ok(Duration::from_secs(secs))
}
