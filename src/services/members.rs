//! Direct member administration: registration, admin edits, admin deletes.

use std::sync::Arc;

use chrono::Utc;

use crate::auth;
use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{CreateMemberRequest, Member, Role, UpdateMemberRequest, UserAccount};
use crate::notify::{self, DeliveryPolicy, Notifier};

pub struct MemberService {
    repo: Arc<Repository>,
    notifier: Arc<dyn Notifier>,
    login_url: String,
}

impl MemberService {
    pub fn new(repo: Arc<Repository>, notifier: Arc<dyn Notifier>, login_url: String) -> Self {
        Self {
            repo,
            notifier,
            login_url,
        }
    }

    /// Create a member plus a login identity with a generated temporary
    /// password, then send the welcome mail.
    pub async fn register(&self, request: CreateMemberRequest) -> Result<Member, AppError> {
        let member = Member {
            id: uuid::Uuid::new_v4().to_string(),
            name: to_proper_case(&collapse_whitespace(&request.name)),
            email: request.email.trim().to_lowercase(),
            phone_number: request.phone_number.clone(),
            age: request.age,
            place: request
                .place
                .as_deref()
                .map(collapse_whitespace)
                .filter(|p| !p.is_empty()),
            registration_date: Utc::now().date_naive(),
            version: 1,
        };
        self.repo.insert_member(&member).await?;

        let temp_password = auth::generate_temp_password();
        let user = UserAccount {
            id: uuid::Uuid::new_v4().to_string(),
            user_name: member.email.clone(),
            password_hash: auth::hash_password(&temp_password)?,
            role: Role::Member,
            must_change_password: true,
            member_id: Some(member.id.clone()),
        };
        self.repo.insert_user(&user).await?;

        notify::dispatch(
            DeliveryPolicy::BestEffort,
            "welcome",
            self.notifier
                .send_welcome(&member.email, &member.name, &temp_password, &self.login_url)
                .await,
        )?;

        Ok(member)
    }

    /// Admin full-replace update. Keeps the login username in sync when the
    /// email changes.
    pub async fn update(
        &self,
        member_id: &str,
        request: UpdateMemberRequest,
    ) -> Result<Member, AppError> {
        let member = self.get(member_id).await?;

        let email = request.email.trim().to_lowercase();
        if self
            .repo
            .exists_by_email_excluding_id(&email, member_id)
            .await?
        {
            return Err(AppError::Conflict("Email already in use".to_string()));
        }
        if self
            .repo
            .exists_by_phone_excluding_id(&request.phone_number, member_id)
            .await?
        {
            return Err(AppError::Conflict("Phone already in use".to_string()));
        }

        let email_changed = !email.eq_ignore_ascii_case(&member.email);
        let updated = Member {
            name: to_proper_case(&collapse_whitespace(&request.name)),
            email,
            phone_number: request.phone_number,
            age: request.age,
            place: request
                .place
                .as_deref()
                .map(collapse_whitespace)
                .filter(|p| !p.is_empty()),
            ..member
        };
        let saved = self.repo.save_member(&updated).await?;

        if email_changed {
            if let Some(user) = self.repo.find_user_by_member_id(member_id).await? {
                self.repo.update_user_name(&user.id, &saved.email).await?;
            }
        }

        notify::dispatch(
            DeliveryPolicy::BestEffort,
            "member updated",
            self.notifier
                .notify_member_updated(&saved.email, &saved.name)
                .await,
        )?;

        Ok(saved)
    }

    /// Admin delete: removes the login identity, notifies the member, and
    /// deletes the profile record.
    pub async fn delete(&self, member_id: &str) -> Result<(), AppError> {
        let member = self.get(member_id).await?;

        if let Some(user) = self.repo.find_user_by_member_id(member_id).await? {
            self.repo.delete_user_by_id(&user.id).await?;
        }

        notify::dispatch(
            DeliveryPolicy::BestEffort,
            "member deleted",
            self.notifier
                .notify_member_deleted(&member.email, &member.name)
                .await,
        )?;

        self.repo.delete_member(member_id).await?;
        Ok(())
    }

    pub async fn get(&self, member_id: &str) -> Result<Member, AppError> {
        self.repo
            .find_member(member_id)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
    }

    pub async fn get_by_email(&self, email: &str) -> Result<Member, AppError> {
        self.repo
            .find_member_by_email(email)
            .await?
            .ok_or_else(|| AppError::NotFound("Member not found".to_string()))
    }
}

/// Trim and squeeze runs of whitespace to single spaces.
fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Capitalize the first letter of each word, lowercasing the rest.
fn to_proper_case(s: &str) -> String {
    s.split(' ')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
