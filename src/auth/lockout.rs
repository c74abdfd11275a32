use chrono::{DateTime, Duration, Utc};

use crate::{config::Config, model::user::LoginState};

/// Failed-login accounting. Pure: callers persist the returned state.
#[derive(Debug, Clone, Copy)]
pub struct LockoutPolicy {
    pub max_attempts: u32,
    pub window: Duration,
    pub duration: Duration,
}

impl LockoutPolicy {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_attempts: config.max_login_attempts.max(1),
            window: Duration::minutes(config.lockout_window_minutes),
            duration: Duration::minutes(config.lockout_duration_minutes),
        }
    }

    /// End of the active lock, if any.
    pub fn locked_until(&self, state: &LoginState, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        state.locked_until.filter(|until| *until > now)
    }

    /// State after one more failure at `now`. Failures older than the window no
    /// longer count, and an expired lock starts a fresh count.
    pub fn record_failure(&self, state: &LoginState, now: DateTime<Utc>) -> LoginState {
        let lock_expired = state.locked_until.is_some_and(|until| until <= now);
        let in_window = state
            .last_failed_login_at
            .is_some_and(|last| now - last < self.window);

        let failed_login_attempts = if in_window && !lock_expired {
            state.failed_login_attempts.saturating_add(1)
        } else {
            1
        };

        let locked_until = if failed_login_attempts >= self.max_attempts {
            Some(now + self.duration)
        } else {
            None
        };

        LoginState {
            failed_login_attempts,
            last_failed_login_at: Some(now),
            locked_until,
        }
    }

    pub fn record_success(&self) -> LoginState {
        LoginState::default()
    }
}
