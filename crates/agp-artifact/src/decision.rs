//! Three-valued stage decisions
//!
//! Every stage payload embeds a [`DecisionRecord`]: a [`Decision`] plus a
//! stage-specific reason code and a human-readable detail. Reason codes are
//! closed per-stage enumerations implementing [`ReasonCode`].

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::{self, Debug, Display, Formatter};

/// Stage outcome, ordered by severity (`Continue < Escalate < Stop`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    /// Safe to proceed autonomously
    Continue,
    /// Blocked pending human approval
    Escalate,
    /// Blocked, no safe autonomous path
    Stop,
}

impl Decision {
    /// Wire name
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Escalate => "escalate",
            Self::Stop => "stop",
        }
    }

    /// True for `Escalate` and `Stop`
    #[inline]
    #[must_use]
    pub const fn is_blocking(&self) -> bool {
        !matches!(self, Self::Continue)
    }
}

impl Display for Decision {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Closed reason-code enumeration of one stage
pub trait ReasonCode:
    Copy + Eq + Debug + Display + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Code used with `Decision::Continue`
    const OK: Self;

    /// Wire name
    fn as_str(&self) -> &'static str;
}

/// Decision value object embedded in every payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(bound(deserialize = "R: ReasonCode"))]
#[serde(deny_unknown_fields)]
pub struct DecisionRecord<R: ReasonCode> {
    /// Outcome
    pub decision: Decision,
    /// Stage reason code
    pub reason_code: R,
    /// Human-readable detail
    pub reason_detail: String,
}

impl<R: ReasonCode> DecisionRecord<R> {
    /// `continue` with the stage's `ok` code
    #[must_use]
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            decision: Decision::Continue,
            reason_code: R::OK,
            reason_detail: detail.into(),
        }
    }

    /// `escalate` with a reason
    #[must_use]
    pub fn escalate(code: R, detail: impl Into<String>) -> Self {
        Self {
            decision: Decision::Escalate,
            reason_code: code,
            reason_detail: detail.into(),
        }
    }

    /// `stop` with a reason
    #[must_use]
    pub fn stop(code: R, detail: impl Into<String>) -> Self {
        Self {
            decision: Decision::Stop,
            reason_code: code,
            reason_detail: detail.into(),
        }
    }

    /// Carry an upstream decision into this stage's vocabulary
    ///
    /// The severity is kept as-is; only the code is translated.
    #[must_use]
    pub fn inherit<U, F>(
        upstream: &DecisionRecord<U>,
        translate: F,
        detail: impl Into<String>,
    ) -> Self
    where
        U: ReasonCode,
        F: FnOnce(U) -> R,
    {
        Self {
            decision: upstream.decision,
            reason_code: translate(upstream.reason_code),
            reason_detail: detail.into(),
        }
    }

    /// True when the stage may proceed
    #[inline]
    #[must_use]
    pub fn is_continue(&self) -> bool {
        self.decision == Decision::Continue
    }
}

impl<R: ReasonCode> Display for DecisionRecord<R> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}: {}", self.decision, self.reason_code, self.reason_detail)
    }
}

/// Declare a stage reason-code enumeration
///
/// Generates the enum (snake_case on the wire), `as_str`, `Display` and the
/// [`ReasonCode`] impl. The variant named `Ok` is the continue code.
#[macro_export]
macro_rules! reason_codes {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $(#[$vmeta:meta])* $variant:ident => $wire:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ::serde::Serialize, ::serde::Deserialize)]
        $vis enum $name {
            $( $(#[$vmeta])* #[serde(rename = $wire)] $variant ),+
        }

        impl $crate::ReasonCode for $name {
            const OK: Self = Self::Ok;

            fn as_str(&self) -> &'static str {
                match self {
                    $( Self::$variant => $wire ),+
                }
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str($crate::ReasonCode::as_str(self))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    crate::reason_codes! {
        enum Upstream {
            Ok => "ok",
            Blocked => "blocked",
        }
    }

    crate::reason_codes! {
        enum Downstream {
            Ok => "ok",
            Blocked => "blocked",
            Local => "local",
        }
    }

    fn translate(code: Upstream) -> Downstream {
        match code {
            Upstream::Ok => Downstream::Ok,
            Upstream::Blocked => Downstream::Blocked,
        }
    }

    #[test]
    fn severity_ordering() {
        assert!(Decision::Continue < Decision::Escalate);
        assert!(Decision::Escalate < Decision::Stop);
        assert_eq!(Decision::Escalate.max(Decision::Stop), Decision::Stop);
        assert!(!Decision::Continue.is_blocking());
        assert!(Decision::Escalate.is_blocking());
    }

    #[test]
    fn wire_format() {
        let record = DecisionRecord::<Downstream>::stop(Downstream::Local, "because");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["decision"], "stop");
        assert_eq!(json["reason_code"], "local");
        assert_eq!(json["reason_detail"], "because");
        let back: DecisionRecord<Downstream> = serde_json::from_value(json).unwrap();
        assert_eq!(back, record);
    }

    #[test]
    fn unknown_reason_code_fails_closed() {
        let json = serde_json::json!({
            "decision": "continue",
            "reason_code": "local",
            "reason_detail": ""
        });
        assert!(serde_json::from_value::<DecisionRecord<Upstream>>(json).is_err());
    }

    fn decision_strategy() -> impl Strategy<Value = Decision> {
        prop_oneof![
            Just(Decision::Continue),
            Just(Decision::Escalate),
            Just(Decision::Stop)
        ]
    }

    proptest! {
        #[test]
        fn inherit_never_downgrades(decision in decision_strategy()) {
            let upstream = DecisionRecord {
                decision,
                reason_code: if decision == Decision::Continue { Upstream::Ok } else { Upstream::Blocked },
                reason_detail: String::new(),
            };
            let downstream = DecisionRecord::<Downstream>::inherit(&upstream, translate, "carried");
            prop_assert_eq!(downstream.decision, upstream.decision);
        }
    }
}
