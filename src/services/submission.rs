//! Submission service: turns a member's self-service request into a durable,
//! auditable change request.

use std::sync::Arc;

use chrono::Utc;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{ChangeRequest, ChangeStatus, ChangeType, Member, MemberPatch, MemberSnapshot};
use crate::notify::{self, DeliveryPolicy, Notifier};

pub struct SubmissionService {
    repo: Arc<Repository>,
    notifier: Arc<dyn Notifier>,
}

impl SubmissionService {
    pub fn new(repo: Arc<Repository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { repo, notifier }
    }

    /// Record an UPDATE request for review. Rejects no-op submissions; the
    /// pending-request unique index turns a concurrent duplicate into a
    /// Conflict at insert time.
    pub async fn submit_profile_update(
        &self,
        login_key: &str,
        patch: MemberPatch,
    ) -> Result<ChangeRequest, AppError> {
        let member = self.member_or_not_found(login_key).await?;

        if !has_any_change(&member, &patch) {
            return Err(AppError::BadRequest("No changes detected".to_string()));
        }

        let request = build_request(
            &member,
            login_key,
            ChangeType::Update,
            Some(patch.clone()),
        );
        self.repo.insert_change_request(&request).await?;

        // The request is durable at this point. A notify failure here still
        // surfaces to the caller; listing pending requests is the reliable
        // success signal.
        notify::dispatch(
            DeliveryPolicy::Required,
            "admin update",
            self.notifier.notify_admin_update(&member, &patch).await,
        )?;

        Ok(request)
    }

    /// Record a DELETE request for review.
    pub async fn submit_delete_request(&self, login_key: &str) -> Result<ChangeRequest, AppError> {
        let member = self.member_or_not_found(login_key).await?;

        if self.repo.has_pending_request(&member.id).await? {
            return Err(AppError::Conflict(
                "A change request is already pending for this member".to_string(),
            ));
        }

        let request = build_request(&member, login_key, ChangeType::Delete, None);
        self.repo.insert_change_request(&request).await?;

        notify::dispatch(
            DeliveryPolicy::BestEffort,
            "admin delete",
            self.notifier.notify_admin_delete(&member).await,
        )?;

        Ok(request)
    }

    async fn member_or_not_found(&self, login_key: &str) -> Result<Member, AppError> {
        self.repo
            .find_member_by_email(login_key)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
    }
}

/// True iff at least one requested field differs from the member's current
/// value. Email is compared case-insensitively; everything else exactly.
pub fn has_any_change(member: &Member, patch: &MemberPatch) -> bool {
    patch.name.as_deref().is_some_and(|name| name != member.name)
        || patch
            .phone_number
            .as_deref()
            .is_some_and(|phone| phone != member.phone_number)
        || patch.age.is_some_and(|age| age != member.age)
        || patch
            .place
            .as_deref()
            .is_some_and(|place| Some(place) != member.place.as_deref())
        || patch
            .email
            .as_deref()
            .is_some_and(|email| !email.eq_ignore_ascii_case(&member.email))
}

fn build_request(
    member: &Member,
    login_key: &str,
    change_type: ChangeType,
    requested: Option<MemberPatch>,
) -> ChangeRequest {
    ChangeRequest {
        id: uuid::Uuid::new_v4().to_string(),
        member_id: member.id.clone(),
        member_email: member.email.clone(),
        change_type,
        status: ChangeStatus::Pending,
        before: MemberSnapshot::from_member(member),
        requested,
        submitted_by: login_key.to_string(),
        submitted_at: Utc::now(),
        reviewed_by: None,
        reviewed_at: None,
        rejection_reason: None,
    }
}
