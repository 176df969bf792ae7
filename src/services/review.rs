//! Review service: the approval/rejection state machine for change requests.
//!
//! The terminal status write always happens after every domain mutation has
//! succeeded. A crash in between leaves the request visibly PENDING with the
//! mutation applied; re-running the approval is safe because the patch is
//! applied per-field onto current state.

use std::sync::Arc;

use chrono::Utc;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{ChangeRequest, ChangeStatus, ChangeType, Member, MemberPatch, PendingReview};
use crate::notify::{self, DeliveryPolicy, Notifier};

pub struct ReviewService {
    repo: Arc<Repository>,
    notifier: Arc<dyn Notifier>,
}

impl ReviewService {
    pub fn new(repo: Arc<Repository>, notifier: Arc<dyn Notifier>) -> Self {
        Self { repo, notifier }
    }

    /// Apply a pending request to the member and login stores, then mark it
    /// APPROVED. Any failure before the terminal write leaves the request
    /// PENDING for a retry.
    pub async fn approve(&self, request_id: &str, reviewed_by: &str) -> Result<(), AppError> {
        let pending = self.load_pending(request_id).await?;

        match pending.change_type() {
            ChangeType::Update => self.approve_update(pending.request()).await?,
            ChangeType::Delete => self.approve_delete(pending.request()).await?,
        }

        self.repo
            .mark_reviewed(
                pending.id(),
                ChangeStatus::Approved,
                reviewed_by,
                Utc::now(),
                None,
            )
            .await
    }

    /// Mark a pending request REJECTED and notify the member.
    pub async fn reject(
        &self,
        request_id: &str,
        reason: Option<&str>,
        reviewed_by: &str,
    ) -> Result<(), AppError> {
        let pending = self.load_pending(request_id).await?;

        self.repo
            .mark_reviewed(
                pending.id(),
                ChangeStatus::Rejected,
                reviewed_by,
                Utc::now(),
                reason,
            )
            .await?;

        // Display name only; the member may already be gone
        let member = match self.repo.find_member(&pending.request().member_id).await {
            Ok(member) => member,
            Err(err) => {
                tracing::warn!("member lookup for rejection notice failed: {}", err);
                None
            }
        };
        let name = member.map(|m| m.name);

        notify::dispatch(
            DeliveryPolicy::BestEffort,
            "member rejected",
            self.notifier
                .notify_member_rejected(&pending.request().member_email, reason, name.as_deref())
                .await,
        )?;

        Ok(())
    }

    async fn load_pending(&self, request_id: &str) -> Result<PendingReview, AppError> {
        self.repo
            .find_change_request(request_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Change request not found".to_string()))?
            .into_pending()
    }

    async fn approve_update(&self, request: &ChangeRequest) -> Result<(), AppError> {
        // The member may have been deleted independently since submission;
        // that surfaces as an error rather than a silent skip.
        let member = self
            .repo
            .find_member(&request.member_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))?;

        let patch = request
            .requested
            .as_ref()
            .ok_or_else(|| AppError::BadRequest("Update request has no changes".to_string()))?;

        let before_email = member.email.clone();
        let updated = apply_patch(&member, patch);

        // Re-validate uniqueness: two approvals can race past submission-time
        // state, and the request must stay PENDING if this one loses.
        if self
            .repo
            .exists_by_email_excluding_id(&updated.email, &updated.id)
            .await?
        {
            return Err(AppError::Conflict("Email already in use".to_string()));
        }
        if self
            .repo
            .exists_by_phone_excluding_id(&updated.phone_number, &updated.id)
            .await?
        {
            return Err(AppError::Conflict("Phone already in use".to_string()));
        }

        let updated = self.repo.save_member(&updated).await?;

        if !updated.email.eq_ignore_ascii_case(&before_email) {
            // Keep the login username in sync. The login record is keyed by
            // the email the request was submitted under, not the member's
            // current one.
            let user = self
                .repo
                .find_user_by_user_name(&request.member_email)
                .await?
                .ok_or_else(|| AppError::NotFound("User login not found".to_string()))?;
            self.repo.update_user_name(&user.id, &updated.email).await?;
        }

        notify::dispatch(
            DeliveryPolicy::BestEffort,
            "member update approved",
            self.notifier
                .notify_member_update_approved(&before_email, request)
                .await,
        )?;

        Ok(())
    }

    async fn approve_delete(&self, request: &ChangeRequest) -> Result<(), AppError> {
        // A missing member is tolerated: the end state, "no member", is the
        // same either way.
        let member = self.repo.find_member(&request.member_id).await?;
        let name = member.as_ref().map(|m| m.name.clone());

        // Notify first, while the address is still known to be live
        notify::dispatch(
            DeliveryPolicy::BestEffort,
            "member delete approved",
            self.notifier
                .notify_member_delete_approved(&request.member_email, name.as_deref())
                .await,
        )?;

        if let Some(user) = self
            .repo
            .find_user_by_user_name(&request.member_email)
            .await?
        {
            self.repo.delete_user_by_id(&user.id).await?;
        }
        self.repo.delete_member(&request.member_id).await?;

        Ok(())
    }
}

/// Build the updated member from the current record plus the requested patch.
/// Absent fields stay untouched; a requested email is normalized.
pub fn apply_patch(member: &Member, patch: &MemberPatch) -> Member {
    let mut updated = member.clone();
    if let Some(name) = &patch.name {
        updated.name = name.clone();
    }
    if let Some(phone) = &patch.phone_number {
        updated.phone_number = phone.clone();
    }
    if let Some(age) = patch.age {
        updated.age = age;
    }
    if let Some(place) = &patch.place {
        updated.place = Some(place.clone());
    }
    if let Some(email) = &patch.email {
        updated.email = email.trim().to_lowercase();
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Role;
    use crate::services::testutil::{
        seed_member, seed_user, submit, test_env, FailMode, SentMail,
    };
    use crate::services::SubmissionService;

    #[tokio::test]
    async fn approving_update_applies_patch_without_touching_email() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        seed_user(&env.repo, "alice@example.com", &member.id).await;

        let patch = MemberPatch {
            age: Some(30),
            phone_number: Some("9627713570".to_string()),
            ..Default::default()
        };
        let request = submit(&env, "alice@example.com", patch).await;

        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());
        review.approve(&request.id, "admin@roster.test").await.unwrap();

        let updated = env.repo.find_member(&member.id).await.unwrap().unwrap();
        assert_eq!(updated.age, 30);
        assert_eq!(updated.phone_number, "9627713570");
        assert_eq!(updated.email, "alice@example.com");

        // Login identity untouched when the email did not change
        let user = env
            .repo
            .find_user_by_user_name("alice@example.com")
            .await
            .unwrap();
        assert!(user.is_some());

        let stored = env
            .repo
            .find_change_request(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ChangeStatus::Approved);
        assert_eq!(stored.reviewed_by.as_deref(), Some("admin@roster.test"));
        assert!(stored.reviewed_at.is_some());
        assert!(stored.rejection_reason.is_none());
    }

    #[tokio::test]
    async fn approving_email_change_syncs_login_username() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        seed_user(&env.repo, "alice@example.com", &member.id).await;

        let patch = MemberPatch {
            email: Some("  Alice.New@Example.COM ".to_string()),
            ..Default::default()
        };
        let request = submit(&env, "alice@example.com", patch).await;

        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());
        review.approve(&request.id, "admin@roster.test").await.unwrap();

        let updated = env.repo.find_member(&member.id).await.unwrap().unwrap();
        assert_eq!(updated.email, "alice.new@example.com");

        // The login record found by the ORIGINAL email key now carries the
        // normalized new email
        assert!(env
            .repo
            .find_user_by_user_name("alice@example.com")
            .await
            .unwrap()
            .is_none());
        let user = env
            .repo
            .find_user_by_user_name("alice.new@example.com")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(user.member_id.as_deref(), Some(member.id.as_str()));

        // The approval notice goes to the pre-update address
        assert!(env.mailer.sent().iter().any(|mail| matches!(
            mail,
            SentMail::UpdateApproved { original_email } if original_email == "alice@example.com"
        )));
    }

    #[tokio::test]
    async fn approving_update_with_taken_email_conflicts_and_stays_pending() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        seed_user(&env.repo, "alice@example.com", &member.id).await;
        seed_member(&env.repo, "bob@example.com", "2223334445").await;

        let patch = MemberPatch {
            email: Some("bob@example.com".to_string()),
            ..Default::default()
        };
        let request = submit(&env, "alice@example.com", patch).await;

        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());
        let err = review
            .approve(&request.id, "admin@roster.test")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        let stored = env
            .repo
            .find_change_request(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ChangeStatus::Pending);

        // Nothing was applied
        let unchanged = env.repo.find_member(&member.id).await.unwrap().unwrap();
        assert_eq!(unchanged.email, "alice@example.com");
    }

    #[tokio::test]
    async fn second_review_of_same_request_conflicts() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        seed_user(&env.repo, "alice@example.com", &member.id).await;

        let patch = MemberPatch {
            age: Some(30),
            ..Default::default()
        };
        let request = submit(&env, "alice@example.com", patch).await;

        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());
        review.approve(&request.id, "admin@roster.test").await.unwrap();
        let member_after = env.repo.find_member(&member.id).await.unwrap().unwrap();

        let err = review
            .approve(&request.id, "admin@roster.test")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        let err = review
            .reject(&request.id, Some("late"), "admin@roster.test")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));

        // No second mutation happened
        let member_final = env.repo.find_member(&member.id).await.unwrap().unwrap();
        assert_eq!(member_final.version, member_after.version);
    }

    #[tokio::test]
    async fn approving_delete_notifies_before_removal() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        seed_user(&env.repo, "alice@example.com", &member.id).await;

        let submission = SubmissionService::new(env.repo.clone(), env.mailer.clone());
        let request = submission
            .submit_delete_request("alice@example.com")
            .await
            .unwrap();

        env.mailer.watch_member(&member.id);
        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());
        review.approve(&request.id, "admin@roster.test").await.unwrap();

        // The notification observed the member still present in the store
        let delete_mail = env
            .mailer
            .sent()
            .into_iter()
            .find_map(|mail| match mail {
                SentMail::DeleteApproved {
                    email,
                    name,
                    member_present_at_send,
                } => Some((email, name, member_present_at_send)),
                _ => None,
            })
            .expect("delete notification sent");
        assert_eq!(delete_mail.0, "alice@example.com");
        assert_eq!(delete_mail.1.as_deref(), Some("Alice"));
        assert_eq!(delete_mail.2, Some(true));

        // Member and login identity are gone, request is APPROVED
        assert!(env.repo.find_member(&member.id).await.unwrap().is_none());
        assert!(env
            .repo
            .find_user_by_user_name("alice@example.com")
            .await
            .unwrap()
            .is_none());
        let stored = env
            .repo
            .find_change_request(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ChangeStatus::Approved);
    }

    #[tokio::test]
    async fn approving_delete_for_already_missing_member_still_notifies() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        seed_user(&env.repo, "alice@example.com", &member.id).await;

        let submission = SubmissionService::new(env.repo.clone(), env.mailer.clone());
        let request = submission
            .submit_delete_request("alice@example.com")
            .await
            .unwrap();

        // The member vanished independently between submission and review
        env.repo.delete_member(&member.id).await.unwrap();

        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());
        review.approve(&request.id, "admin@roster.test").await.unwrap();

        let delete_mail = env
            .mailer
            .sent()
            .into_iter()
            .find_map(|mail| match mail {
                SentMail::DeleteApproved { email, name, .. } => Some((email, name)),
                _ => None,
            })
            .expect("delete notification sent");
        assert_eq!(delete_mail.0, "alice@example.com");
        assert_eq!(delete_mail.1, None);

        let stored = env
            .repo
            .find_change_request(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ChangeStatus::Approved);
    }

    #[tokio::test]
    async fn approving_update_for_deleted_member_is_not_found() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        seed_user(&env.repo, "alice@example.com", &member.id).await;

        let patch = MemberPatch {
            age: Some(30),
            ..Default::default()
        };
        let request = submit(&env, "alice@example.com", patch).await;

        env.repo.delete_member(&member.id).await.unwrap();

        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());
        let err = review
            .approve(&request.id, "admin@roster.test")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let stored = env
            .repo
            .find_change_request(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ChangeStatus::Pending);
    }

    #[tokio::test]
    async fn rejecting_with_null_reason_stores_null_and_notifies() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        seed_user(&env.repo, "alice@example.com", &member.id).await;

        let submission = SubmissionService::new(env.repo.clone(), env.mailer.clone());
        let request = submission
            .submit_delete_request("alice@example.com")
            .await
            .unwrap();

        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());
        review
            .reject(&request.id, None, "admin@roster.test")
            .await
            .unwrap();

        let stored = env
            .repo
            .find_change_request(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ChangeStatus::Rejected);
        assert!(stored.rejection_reason.is_none());
        assert!(stored.reviewed_at.is_some());

        // The member still exists and the notice carried a null reason
        assert!(env.repo.find_member(&member.id).await.unwrap().is_some());
        assert!(env.mailer.sent().iter().any(|mail| matches!(
            mail,
            SentMail::Rejected { reason, name, .. }
                if reason.is_none() && name.as_deref() == Some("Alice")
        )));
    }

    #[tokio::test]
    async fn rejection_outcome_survives_notify_failure() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        seed_user(&env.repo, "alice@example.com", &member.id).await;
        let member_id = member.id.clone();

        let patch = MemberPatch {
            age: Some(31),
            ..Default::default()
        };
        let request = submit(&env, "alice@example.com", patch).await;

        env.mailer.fail(FailMode::Rejected);
        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());
        review
            .reject(&request.id, Some("incomplete details"), "admin@roster.test")
            .await
            .unwrap();

        let stored = env
            .repo
            .find_change_request(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ChangeStatus::Rejected);
        assert_eq!(stored.rejection_reason.as_deref(), Some("incomplete details"));
        // The member record is untouched by a rejection
        let unchanged = env.repo.find_member(&member_id).await.unwrap().unwrap();
        assert_eq!(unchanged.age, 28);
    }

    #[tokio::test]
    async fn approval_outcome_survives_notify_failure() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        seed_user(&env.repo, "alice@example.com", &member.id).await;

        let patch = MemberPatch {
            age: Some(33),
            ..Default::default()
        };
        let request = submit(&env, "alice@example.com", patch).await;

        env.mailer.fail(FailMode::UpdateApproved);
        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());
        review.approve(&request.id, "admin@roster.test").await.unwrap();

        let updated = env.repo.find_member(&member.id).await.unwrap().unwrap();
        assert_eq!(updated.age, 33);
        let stored = env
            .repo
            .find_change_request(&request.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, ChangeStatus::Approved);
    }

    #[tokio::test]
    async fn missing_request_id_is_not_found() {
        let env = test_env().await;
        let review = ReviewService::new(env.repo.clone(), env.mailer.clone());

        let err = review
            .approve("no-such-request", "admin@roster.test")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[test]
    fn apply_patch_is_a_pure_partial_update() {
        let member = Member {
            id: "m-1".to_string(),
            name: "Alice".to_string(),
            email: "alice@example.com".to_string(),
            phone_number: "9990001111".to_string(),
            age: 28,
            place: Some("Pune".to_string()),
            registration_date: chrono::NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            version: 3,
        };

        let patch = MemberPatch {
            email: Some("  New@Example.COM ".to_string()),
            age: Some(29),
            ..Default::default()
        };

        let updated = apply_patch(&member, &patch);
        assert_eq!(updated.email, "new@example.com");
        assert_eq!(updated.age, 29);
        assert_eq!(updated.name, "Alice");
        assert_eq!(updated.phone_number, "9990001111");
        assert_eq!(updated.place.as_deref(), Some("Pune"));
        // The input member is untouched
        assert_eq!(member.email, "alice@example.com");
        assert_eq!(member.age, 28);
    }

    #[tokio::test]
    async fn seeded_user_has_member_role() {
        let env = test_env().await;
        let member = seed_member(&env.repo, "alice@example.com", "1112223334").await;
        let user = seed_user(&env.repo, "alice@example.com", &member.id).await;
        assert_eq!(user.role, Role::Member);
    }
}
