//! Change request model: the durable record of a proposed profile mutation
//! awaiting an admin decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MemberPatch, MemberSnapshot};
use crate::errors::AppError;

/// Kind of mutation a member asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeType {
    Update,
    Delete,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "UPDATE" => Some(ChangeType::Update),
            "DELETE" => Some(ChangeType::Delete),
            _ => None,
        }
    }
}

/// Review status. Transitions are monotonic and terminal:
/// `Pending -> Approved` or `Pending -> Rejected`, nothing else.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChangeStatus {
    Pending,
    Approved,
    Rejected,
}

impl ChangeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeStatus::Pending => "PENDING",
            ChangeStatus::Approved => "APPROVED",
            ChangeStatus::Rejected => "REJECTED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(ChangeStatus::Pending),
            "APPROVED" => Some(ChangeStatus::Approved),
            "REJECTED" => Some(ChangeStatus::Rejected),
            _ => None,
        }
    }
}

/// A member-initiated amendment, kept forever as an audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeRequest {
    pub id: String,
    pub member_id: String,
    /// The submitter's login key (email) at submission time. The login
    /// identity is resolved through this value during review, not through
    /// the member's current email.
    pub member_email: String,
    #[serde(rename = "type")]
    pub change_type: ChangeType,
    pub status: ChangeStatus,
    pub before: MemberSnapshot,
    /// Requested changes for UPDATE; `None` for DELETE.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requested: Option<MemberPatch>,
    pub submitted_by: String,
    pub submitted_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_by: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rejection_reason: Option<String>,
}

impl ChangeRequest {
    /// Enter the review state machine. Only a PENDING request converts;
    /// anything else is a Conflict, so the approve/reject mutation paths
    /// can never see an already-reviewed request.
    pub fn into_pending(self) -> Result<PendingReview, AppError> {
        match self.status {
            ChangeStatus::Pending => Ok(PendingReview { request: self }),
            _ => Err(AppError::Conflict("Request is not pending".to_string())),
        }
    }
}

/// Proof that a change request was loaded in PENDING state. The review
/// service operates exclusively on this type.
#[derive(Debug, Clone)]
pub struct PendingReview {
    request: ChangeRequest,
}

impl PendingReview {
    pub fn request(&self) -> &ChangeRequest {
        &self.request
    }

    pub fn id(&self) -> &str {
        &self.request.id
    }

    pub fn change_type(&self) -> ChangeType {
        self.request.change_type
    }
}
