//! Visit Photos Vault - Access Gate
//!
//! Authorization boundary checked before every key access. Biometric
//! prompts live in the platform layer; they plug in through [`AccessGate`]
//! or as the verification callback of [`SessionGate`].

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{PhotoError, PhotoResult};

/// Decides whether the photo key may be handed out right now
pub trait AccessGate: Send + Sync {
    fn authorize(&self) -> PhotoResult<()>;
}

/// Gate that never refuses (the secret store's own unlock state still applies)
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl AccessGate for AllowAll {
    fn authorize(&self) -> PhotoResult<()> {
        Ok(())
    }
}

/// Session gate configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Require re-auth after this many seconds
    pub timeout_seconds: u64,
    /// Lock after failed attempts
    pub max_attempts: u8,
    /// Cooldown period after lockout (seconds)
    pub lockout_duration: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            max_attempts: 5,
            lockout_duration: 300,
        }
    }
}

#[derive(Debug, Clone, Default)]
struct SessionState {
    auth_time: Option<DateTime<Utc>>,
    failed_attempts: u8,
    locked_until: Option<DateTime<Utc>>,
}

/// Time-limited authorization opened by a successful credential check
pub struct SessionGate {
    max_attempts: u8,
    timeout: Duration,
    lockout: Duration,
    state: Mutex<SessionState>,
}

impl SessionGate {
    /// Gate with `config`; durations chrono cannot represent are rejected
    pub fn new(config: GateConfig) -> PhotoResult<Self> {
        Ok(Self {
            max_attempts: config.max_attempts,
            timeout: seconds("timeout_seconds", config.timeout_seconds)?,
            lockout: seconds("lockout_duration", config.lockout_duration)?,
            state: Mutex::new(SessionState::default()),
        })
    }

    /// Open a session if `verify` accepts the credential.
    ///
    /// `verify` is the platform check (PIN comparison, biometric prompt result).
    pub fn authenticate(&self, verify: impl FnOnce() -> bool) -> PhotoResult<()> {
        let mut state = self.state.lock();
        let now = Utc::now();

        if state.locked_until.is_some_and(|until| now < until) {
            return Err(PhotoError::TooManyAttempts);
        }

        if verify() {
            state.auth_time = Some(now);
            state.failed_attempts = 0;
            state.locked_until = None;
            return Ok(());
        }

        state.failed_attempts = state.failed_attempts.saturating_add(1);
        if state.failed_attempts >= self.max_attempts {
            state.locked_until = Some(now.checked_add_signed(self.lockout).unwrap_or(DateTime::<Utc>::MAX_UTC));
            state.failed_attempts = 0;
            warn!("access gate locked after repeated failures");
            return Err(PhotoError::TooManyAttempts);
        }
        Err(PhotoError::AccessDenied)
    }

    /// End the session
    pub fn lock(&self) {
        self.state.lock().auth_time = None;
    }

    /// Get remaining attempts before lockout
    pub fn remaining_attempts(&self) -> u8 {
        self.max_attempts
            .saturating_sub(self.state.lock().failed_attempts)
    }

    /// Get lockout remaining time (seconds)
    pub fn lockout_remaining(&self) -> Option<i64> {
        self.state
            .lock()
            .locked_until
            .map(|until| (until - Utc::now()).num_seconds().max(0))
    }
}

impl AccessGate for SessionGate {
    fn authorize(&self) -> PhotoResult<()> {
        let state = self.state.lock();
        let now = Utc::now();

        if state.locked_until.is_some_and(|until| now < until) {
            return Err(PhotoError::TooManyAttempts);
        }
        match state.auth_time {
            Some(at) if now - at <= self.timeout => Ok(()),
            _ => Err(PhotoError::AccessDenied),
        }
    }
}

fn seconds(field: &str, value: u64) -> PhotoResult<Duration> {
    i64::try_from(value)
        .ok()
        .and_then(Duration::try_seconds)
        .ok_or_else(|| PhotoError::Config(format!("{field} is out of range: {value}")))
}
