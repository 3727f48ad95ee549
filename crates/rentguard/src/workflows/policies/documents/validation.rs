use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::super::domain::{ActorDocument, ValidationStatus};

/// Staff verdict on a single uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ValidationDecision {
    pub status: ValidationStatus,
    #[serde(default)]
    pub rejection_reason: Option<String>,
}

impl ValidationDecision {
    pub fn approve() -> Self {
        Self {
            status: ValidationStatus::Approved,
            rejection_reason: None,
        }
    }

    pub fn reject(reason: impl Into<String>) -> Self {
        Self {
            status: ValidationStatus::Rejected,
            rejection_reason: Some(reason.into()),
        }
    }

    pub fn review() -> Self {
        Self {
            status: ValidationStatus::InReview,
            rejection_reason: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DocumentValidationError {
    #[error("a rejection reason is required when rejecting a document")]
    MissingRejectionReason,
    #[error("documents return to PENDING only when a new file is uploaded")]
    PendingNotAllowed,
}

/// A decision that passed local validation and may be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckedDecision {
    status: ValidationStatus,
    rejection_reason: Option<String>,
}

impl CheckedDecision {
    pub fn status(&self) -> ValidationStatus {
        self.status
    }
}

/// Validate a decision before anything is loaded or stored.
pub fn check(decision: ValidationDecision) -> Result<CheckedDecision, DocumentValidationError> {
    let reason = decision
        .rejection_reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty());

    match decision.status {
        ValidationStatus::Pending => Err(DocumentValidationError::PendingNotAllowed),
        ValidationStatus::Rejected => match reason {
            Some(reason) => Ok(CheckedDecision {
                status: ValidationStatus::Rejected,
                rejection_reason: Some(reason),
            }),
            None => Err(DocumentValidationError::MissingRejectionReason),
        },
        status => Ok(CheckedDecision {
            status,
            rejection_reason: None,
        }),
    }
}

/// Record the decision on the document. The owning actor's completion flag is
/// deliberately left alone.
pub fn apply(
    document: &mut ActorDocument,
    decision: CheckedDecision,
    validator_id: &str,
    now: DateTime<Utc>,
) -> ValidationStatus {
    let previous = document.status;
    document.status = decision.status;
    document.rejection_reason = decision.rejection_reason;
    document.validated_by = Some(validator_id.to_string());
    document.validated_at = Some(now);
    previous
}
