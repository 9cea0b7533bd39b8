//! Artifact envelope
//!
//! Every stage output is an [`Artifact<K>`]: a shared envelope around a
//! stage-specific trace and payload. The `artifact_id` is a pure function of
//! `(inputs, trace, payload)`; `run_id`, `produced_at_utc` and
//! `tool_version` are provenance and do not take part in addressing.

use crate::digest::{DigestError, Sha256Digest};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::marker::PhantomData;

/// Pinned schema version of every artifact
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Tool identifier stamped on produced artifacts
pub const TOOL_VERSION: &str = concat!("agp/", env!("CARGO_PKG_VERSION"));

/// Hex characters of the digest kept in an artifact id
pub const ARTIFACT_ID_HEX_LEN: usize = 12;

/// Trait for stage artifact kinds
///
/// This trait is **sealed** through [`private::Sealed`]; stage kinds opt in
/// explicitly.
///
/// # Contract
/// - `TYPE_ID` is the stable `artifact_type` string
/// - `ID_PREFIX` is the stable `artifact_id` prefix
/// - `Trace` and `Payload` serialize deterministically (no hash maps)
pub trait ArtifactKind: Send + Sync + 'static + Debug + Clone + PartialEq + private::Sealed {
    /// Non-semantic provenance block
    type Trace: Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync;

    /// Decision and data
    type Payload: Serialize + DeserializeOwned + Clone + Debug + PartialEq + Send + Sync;

    /// Artifact type identifier
    const TYPE_ID: &'static str;

    /// Artifact id prefix
    const ID_PREFIX: &'static str;

    /// Validate payload invariants
    ///
    /// Default implementation always succeeds.
    ///
    /// # Errors
    /// Returns error if the payload violates invariants
    fn validate_payload(_payload: &Self::Payload) -> Result<(), ArtifactError> {
        Ok(())
    }
}

/// Sealed trait - prevents accidental implementations
#[doc(hidden)]
pub mod private {
    /// Sealed trait marker
    pub trait Sealed {}
}

/// Reference to an upstream artifact
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ArtifactRef {
    pub artifact_id: String,
    pub artifact_type: String,
    pub schema_version: String,
}

/// Caller-controlled provenance fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub run_id: String,
    pub produced_at_utc: String,
}

impl EnvelopeHeader {
    /// Create header
    #[inline]
    #[must_use]
    pub fn new(run_id: impl Into<String>, produced_at_utc: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            produced_at_utc: produced_at_utc.into(),
        }
    }
}

#[derive(Serialize)]
struct IdMaterial<'a, T, P> {
    inputs: &'a [ArtifactRef],
    trace: &'a T,
    payload: &'a P,
}

/// Content-addressed stage artifact
///
/// # Invariants
/// - `artifact_id == <ID_PREFIX>_<12 hex of sha256(JSON{inputs, trace, payload})>`
/// - `inputs` has no duplicate `artifact_id`
/// - Immutable after construction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(bound(serialize = "", deserialize = ""))]
#[serde(deny_unknown_fields)]
pub struct Artifact<K: ArtifactKind> {
    artifact_type: String,
    schema_version: String,
    artifact_id: String,
    run_id: String,
    produced_at_utc: String,
    tool_version: String,
    inputs: Vec<ArtifactRef>,
    trace: K::Trace,
    payload: K::Payload,
    #[serde(skip)]
    _kind: PhantomData<K>,
}

impl<K: ArtifactKind> Artifact<K> {
    /// Build an artifact and compute its id
    ///
    /// Inputs are de-duplicated by `artifact_id`, first occurrence kept.
    ///
    /// # Errors
    /// Returns error if the run id is blank, the payload is invalid, or
    /// hashing fails
    pub fn seal(
        header: EnvelopeHeader,
        inputs: Vec<ArtifactRef>,
        trace: K::Trace,
        payload: K::Payload,
    ) -> Result<Self, ArtifactError> {
        if header.run_id.trim().is_empty() {
            return Err(ArtifactError::MissingRunId);
        }
        K::validate_payload(&payload)?;
        let inputs = dedup_inputs(inputs);
        let artifact_id = compute_artifact_id::<K>(&inputs, &trace, &payload)?;
        Ok(Self {
            artifact_type: K::TYPE_ID.to_string(),
            schema_version: SCHEMA_VERSION.to_string(),
            artifact_id,
            run_id: header.run_id,
            produced_at_utc: header.produced_at_utc,
            tool_version: TOOL_VERSION.to_string(),
            inputs,
            trace,
            payload,
            _kind: PhantomData,
        })
    }

    /// Deserialize a JSON value and verify it
    ///
    /// # Errors
    /// Returns error for a foreign type, unsupported schema version,
    /// malformed shape or id mismatch
    pub fn from_value(value: serde_json::Value) -> Result<Self, ArtifactError> {
        let declared_type = value.get("artifact_type").and_then(serde_json::Value::as_str);
        if declared_type != Some(K::TYPE_ID) {
            return Err(ArtifactError::InvalidType {
                expected: K::TYPE_ID.to_string(),
                actual: declared_type.unwrap_or("<missing>").to_string(),
            });
        }
        let declared_schema = value.get("schema_version").and_then(serde_json::Value::as_str);
        if declared_schema != Some(SCHEMA_VERSION) {
            return Err(ArtifactError::UnsupportedSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: declared_schema.unwrap_or("<missing>").to_string(),
            });
        }
        let artifact: Self =
            serde_json::from_value(value).map_err(|e| ArtifactError::Malformed(e.to_string()))?;
        artifact.verify()?;
        Ok(artifact)
    }

    /// Parse JSON text and verify it
    ///
    /// # Errors
    /// See [`Artifact::from_value`]
    pub fn from_json(text: &str) -> Result<Self, ArtifactError> {
        let value: serde_json::Value =
            serde_json::from_str(text).map_err(|e| ArtifactError::Malformed(e.to_string()))?;
        Self::from_value(value)
    }

    /// Pretty JSON rendering
    ///
    /// # Errors
    /// Returns error if serialization fails
    pub fn to_json_pretty(&self) -> Result<String, ArtifactError> {
        serde_json::to_string_pretty(self).map_err(|e| ArtifactError::Malformed(e.to_string()))
    }

    /// Check envelope invariants and recompute the id
    ///
    /// # Errors
    /// Returns the first violated invariant
    pub fn verify(&self) -> Result<(), ArtifactError> {
        if self.artifact_type != K::TYPE_ID {
            return Err(ArtifactError::InvalidType {
                expected: K::TYPE_ID.to_string(),
                actual: self.artifact_type.clone(),
            });
        }
        if self.schema_version != SCHEMA_VERSION {
            return Err(ArtifactError::UnsupportedSchemaVersion {
                expected: SCHEMA_VERSION.to_string(),
                actual: self.schema_version.clone(),
            });
        }
        if self.run_id.trim().is_empty() {
            return Err(ArtifactError::MissingRunId);
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.inputs.iter().find(|r| !seen.insert(&r.artifact_id)) {
            return Err(ArtifactError::DuplicateInput(dup.artifact_id.clone()));
        }
        K::validate_payload(&self.payload)?;
        let recomputed = compute_artifact_id::<K>(&self.inputs, &self.trace, &self.payload)?;
        if recomputed != self.artifact_id {
            return Err(ArtifactError::IdMismatch {
                stored: self.artifact_id.clone(),
                recomputed,
            });
        }
        Ok(())
    }

    /// Content-addressed id
    #[inline]
    #[must_use]
    pub fn id(&self) -> &str {
        &self.artifact_id
    }

    /// Run id shared by the lineage
    #[inline]
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Production timestamp (ISO-8601)
    #[inline]
    #[must_use]
    pub fn produced_at_utc(&self) -> &str {
        &self.produced_at_utc
    }

    /// Producing tool
    #[inline]
    #[must_use]
    pub fn tool_version(&self) -> &str {
        &self.tool_version
    }

    /// Upstream references
    #[inline]
    #[must_use]
    pub fn inputs(&self) -> &[ArtifactRef] {
        &self.inputs
    }

    /// True if `artifact_id` is a direct input
    #[must_use]
    pub fn references(&self, artifact_id: &str) -> bool {
        self.inputs.iter().any(|r| r.artifact_id == artifact_id)
    }

    /// Provenance block
    #[inline]
    #[must_use]
    pub fn trace(&self) -> &K::Trace {
        &self.trace
    }

    /// Stage payload
    #[inline]
    #[must_use]
    pub fn payload(&self) -> &K::Payload {
        &self.payload
    }

    /// Reference for downstream `inputs`
    #[must_use]
    pub fn reference(&self) -> ArtifactRef {
        ArtifactRef {
            artifact_id: self.artifact_id.clone(),
            artifact_type: self.artifact_type.clone(),
            schema_version: self.schema_version.clone(),
        }
    }

    /// Get type identifier
    #[inline]
    #[must_use]
    pub fn type_id() -> &'static str {
        K::TYPE_ID
    }
}

/// De-duplicate references by id, keeping first occurrence order
#[must_use]
pub fn dedup_inputs(inputs: Vec<ArtifactRef>) -> Vec<ArtifactRef> {
    let mut seen = HashSet::new();
    inputs
        .into_iter()
        .filter(|r| seen.insert(r.artifact_id.clone()))
        .collect()
}

fn compute_artifact_id<K: ArtifactKind>(
    inputs: &[ArtifactRef],
    trace: &K::Trace,
    payload: &K::Payload,
) -> Result<String, ArtifactError> {
    let digest = Sha256Digest::compute_json(&IdMaterial {
        inputs,
        trace,
        payload,
    })?;
    Ok(format!("{}_{}", K::ID_PREFIX, digest.short_hex(ARTIFACT_ID_HEX_LEN)))
}

/// Errors related to artifact envelopes
#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    /// Wrong artifact type
    #[error("invalid artifact type: expected {expected}, got {actual}")]
    InvalidType { expected: String, actual: String },

    /// Unsupported schema version
    #[error("unsupported schema version: expected {expected}, got {actual}")]
    UnsupportedSchemaVersion { expected: String, actual: String },

    /// Shape does not match the stage contract
    #[error("malformed artifact: {0}")]
    Malformed(String),

    /// Stored id does not match recomputation
    #[error("artifact id mismatch: stored {stored}, recomputed {recomputed}")]
    IdMismatch { stored: String, recomputed: String },

    /// Duplicate upstream reference
    #[error("duplicate input reference: {0}")]
    DuplicateInput(String),

    /// Blank run id
    #[error("run id is missing")]
    MissingRunId,

    /// Payload invariant violation
    #[error("payload invariant violated: {0}")]
    InvariantViolation(String),

    /// Hashing failure
    #[error("digest error: {0}")]
    Digest(#[from] DigestError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[derive(Debug, Clone, PartialEq)]
    struct NoteKind;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct NotePayload {
        text: String,
        count: u32,
    }

    impl private::Sealed for NoteKind {}

    impl ArtifactKind for NoteKind {
        type Trace = serde_json::Value;
        type Payload = NotePayload;

        const TYPE_ID: &'static str = "note";
        const ID_PREFIX: &'static str = "note";

        fn validate_payload(payload: &Self::Payload) -> Result<(), ArtifactError> {
            if payload.text.is_empty() {
                return Err(ArtifactError::InvariantViolation("text must not be empty".into()));
            }
            Ok(())
        }
    }

    fn note(text: &str, header: EnvelopeHeader) -> Artifact<NoteKind> {
        Artifact::seal(
            header,
            vec![],
            serde_json::json!({"source": "test"}),
            NotePayload {
                text: text.to_string(),
                count: 1,
            },
        )
        .unwrap()
    }

    fn header() -> EnvelopeHeader {
        EnvelopeHeader::new("run_1", "2026-01-01T00:00:00.000Z")
    }

    #[test]
    fn id_has_prefix_and_twelve_hex() {
        let artifact = note("hello", header());
        let (prefix, hex) = artifact.id().split_once('_').unwrap();
        assert_eq!(prefix, "note");
        assert_eq!(hex.len(), 12);
        assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn id_ignores_provenance_fields() {
        let a = note("hello", header());
        let b = note("hello", EnvelopeHeader::new("run_2", "2030-01-01T00:00:00.000Z"));
        assert_eq!(a.id(), b.id());
        assert_ne!(a.id(), note("changed", header()).id());
    }

    #[test]
    fn seal_is_deterministic_byte_for_byte() {
        let a = serde_json::to_string(&note("hello", header())).unwrap();
        let b = serde_json::to_string(&note("hello", header())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn inputs_are_deduplicated_in_order() {
        let r1 = ArtifactRef {
            artifact_id: "a_1".into(),
            artifact_type: "a".into(),
            schema_version: SCHEMA_VERSION.into(),
        };
        let r2 = ArtifactRef {
            artifact_id: "b_1".into(),
            ..r1.clone()
        };
        let artifact = Artifact::<NoteKind>::seal(
            header(),
            vec![r1.clone(), r2.clone(), r1.clone()],
            serde_json::Value::Null,
            NotePayload {
                text: "x".into(),
                count: 0,
            },
        )
        .unwrap();
        assert_eq!(artifact.inputs(), &[r1, r2]);
        assert!(artifact.references("b_1"));
    }

    #[test]
    fn json_round_trip_verifies() {
        let artifact = note("hello", header());
        let json = artifact.to_json_pretty().unwrap();
        let back = Artifact::<NoteKind>::from_json(&json).unwrap();
        assert_eq!(back, artifact);
    }

    #[test]
    fn tampered_payload_fails_closed() {
        let artifact = note("hello", header());
        let mut value = serde_json::to_value(&artifact).unwrap();
        value["payload"]["count"] = serde_json::json!(2);
        assert!(matches!(
            Artifact::<NoteKind>::from_value(value),
            Err(ArtifactError::IdMismatch { .. })
        ));
    }

    #[test]
    fn foreign_type_and_schema_rejected() {
        let artifact = note("hello", header());
        let mut value = serde_json::to_value(&artifact).unwrap();
        value["artifact_type"] = serde_json::json!("other");
        assert!(matches!(
            Artifact::<NoteKind>::from_value(value),
            Err(ArtifactError::InvalidType { .. })
        ));

        let mut value = serde_json::to_value(&artifact).unwrap();
        value["schema_version"] = serde_json::json!("2.0.0");
        assert!(matches!(
            Artifact::<NoteKind>::from_value(value),
            Err(ArtifactError::UnsupportedSchemaVersion { .. })
        ));
    }

    #[test]
    fn missing_and_extra_fields_rejected() {
        let artifact = note("hello", header());
        let mut value = serde_json::to_value(&artifact).unwrap();
        value.as_object_mut().unwrap().remove("run_id");
        assert!(matches!(
            Artifact::<NoteKind>::from_value(value),
            Err(ArtifactError::Malformed(_))
        ));

        let mut value = serde_json::to_value(&artifact).unwrap();
        value["unexpected"] = serde_json::json!(true);
        assert!(matches!(
            Artifact::<NoteKind>::from_value(value),
            Err(ArtifactError::Malformed(_))
        ));
    }

    #[test]
    fn payload_validation_and_run_id_enforced() {
        let result = Artifact::<NoteKind>::seal(
            header(),
            vec![],
            serde_json::Value::Null,
            NotePayload {
                text: String::new(),
                count: 0,
            },
        );
        assert!(matches!(result, Err(ArtifactError::InvariantViolation(_))));

        let result = Artifact::<NoteKind>::seal(
            EnvelopeHeader::new("  ", "t"),
            vec![],
            serde_json::Value::Null,
            NotePayload {
                text: "x".into(),
                count: 0,
            },
        );
        assert!(matches!(result, Err(ArtifactError::MissingRunId)));
    }
}
