//! Determinism hooks
//!
//! Every source of non-determinism (wall clock, run ids) enters the pipeline
//! through [`Hooks`]. A hook is best-effort: when it fails or returns an
//! unusable value the documented fallback is used and a warning is logged.

use chrono::{DateTime, SecondsFormat, Utc};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

/// Failure reported by a hook
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("hook failed: {0}")]
pub struct HookError(pub String);

/// Hook callable
pub type HookFn = Arc<dyn Fn() -> Result<String, HookError> + Send + Sync>;

/// Clock and run-id generators
#[derive(Clone, Default)]
pub struct Hooks {
    clock: Option<HookFn>,
    run_id: Option<HookFn>,
}

impl fmt::Debug for Hooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hooks")
            .field("clock", &self.clock.is_some())
            .field("run_id", &self.run_id.is_some())
            .finish()
    }
}

impl Hooks {
    /// System clock and random run ids
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Hooks returning constant values
    #[must_use]
    pub fn fixed(timestamp: impl Into<String>, run_id: impl Into<String>) -> Self {
        let timestamp = timestamp.into();
        let run_id = run_id.into();
        Self::new()
            .with_clock(move || Ok(timestamp.clone()))
            .with_run_id(move || Ok(run_id.clone()))
    }

    /// With clock hook
    #[must_use]
    pub fn with_clock<F>(mut self, clock: F) -> Self
    where
        F: Fn() -> Result<String, HookError> + Send + Sync + 'static,
    {
        self.clock = Some(Arc::new(clock));
        self
    }

    /// With run-id hook
    #[must_use]
    pub fn with_run_id<F>(mut self, run_id: F) -> Self
    where
        F: Fn() -> Result<String, HookError> + Send + Sync + 'static,
    {
        self.run_id = Some(Arc::new(run_id));
        self
    }

    /// Current UTC timestamp (RFC 3339)
    ///
    /// Falls back to the system clock, millisecond precision with `Z`.
    #[must_use]
    pub fn now_utc(&self) -> String {
        if let Some(clock) = &self.clock {
            match clock() {
                Ok(value) if DateTime::parse_from_rfc3339(value.trim()).is_ok() => {
                    return value.trim().to_string();
                }
                Ok(value) => {
                    warn!(%value, "clock hook returned a non-RFC 3339 value, using system clock");
                }
                Err(e) => warn!(error = %e, "clock hook failed, using system clock"),
            }
        }
        system_now()
    }

    /// New run id
    ///
    /// Falls back to `run_<32 hex>` from a random UUID.
    #[must_use]
    pub fn generate_run_id(&self) -> String {
        if let Some(generator) = &self.run_id {
            match generator() {
                Ok(value) if is_valid_run_id(value.trim()) => return value.trim().to_string(),
                Ok(value) => {
                    warn!(%value, "run-id hook returned an unusable value, generating one");
                }
                Err(e) => warn!(error = %e, "run-id hook failed, generating one"),
            }
        }
        format!("run_{}", uuid::Uuid::new_v4().simple())
    }
}

fn system_now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn is_valid_run_id(value: &str) -> bool {
    !value.is_empty() && !value.chars().any(|c| c.is_whitespace() || c.is_control())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_hooks_are_deterministic() {
        let hooks = Hooks::fixed("2026-03-01T12:00:00.000Z", "run_fixed");
        assert_eq!(hooks.now_utc(), "2026-03-01T12:00:00.000Z");
        assert_eq!(hooks.generate_run_id(), "run_fixed");
        assert_eq!(hooks.generate_run_id(), "run_fixed");
    }

    #[test]
    fn failing_clock_falls_back() {
        let hooks = Hooks::new().with_clock(|| Err(HookError("boom".into())));
        let now = hooks.now_utc();
        assert!(DateTime::parse_from_rfc3339(&now).is_ok());
        assert!(now.ends_with('Z'));
    }

    #[test]
    fn unparsable_clock_falls_back() {
        let hooks = Hooks::new().with_clock(|| Ok("yesterday".into()));
        assert_ne!(hooks.now_utc(), "yesterday");
    }

    #[test]
    fn blank_or_failing_run_id_falls_back() {
        for hooks in [
            Hooks::new().with_run_id(|| Ok("   ".into())),
            Hooks::new().with_run_id(|| Ok("has space".into())),
            Hooks::new().with_run_id(|| Err(HookError("boom".into()))),
            Hooks::new(),
        ] {
            let id = hooks.generate_run_id();
            assert!(id.starts_with("run_"));
            assert_eq!(id.len(), 4 + 32);
        }
    }
}
