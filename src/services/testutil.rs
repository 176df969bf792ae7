//! Shared fixtures for service and integration tests: a real SQLite-backed
//! repository in a temp directory plus a recording mailer standing in for the
//! notification collaborator.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::{Row, SqlitePool};
use tempfile::TempDir;

use crate::db::{init_database, Repository};
use crate::models::{ChangeRequest, Member, MemberPatch, Role, UserAccount};
use crate::notify::{Notifier, NotifyError};
use crate::services::SubmissionService;

pub struct TestEnv {
    pub repo: Arc<Repository>,
    pub mailer: Arc<RecordingMailer>,
    _tmp: TempDir,
}

pub async fn test_env() -> TestEnv {
    let tmp = TempDir::new().expect("temp dir");
    let pool = init_database(&tmp.path().join("test.sqlite"))
        .await
        .expect("init db");
    let repo = Arc::new(Repository::new(pool.clone()));
    let mailer = Arc::new(RecordingMailer::new(pool));
    TestEnv {
        repo,
        mailer,
        _tmp: tmp,
    }
}

/// Insert a member directly. The display name is the capitalized local part
/// of the email ("alice@..." -> "Alice").
pub async fn seed_member(repo: &Repository, email: &str, phone: &str) -> Member {
    let local = email.split('@').next().unwrap_or("member");
    let mut name: String = local.chars().take(1).flat_map(char::to_uppercase).collect();
    name.push_str(&local[1..]);

    let member = Member {
        id: uuid::Uuid::new_v4().to_string(),
        name,
        email: email.to_string(),
        phone_number: phone.to_string(),
        age: 28,
        place: Some("Pune".to_string()),
        registration_date: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
        version: 1,
    };
    repo.insert_member(&member).await.expect("seed member");
    member
}

/// Insert a login identity for a seeded member.
pub async fn seed_user(repo: &Repository, email: &str, member_id: &str) -> UserAccount {
    let user = UserAccount {
        id: uuid::Uuid::new_v4().to_string(),
        user_name: email.to_string(),
        password_hash: crate::auth::hash_password("initial-pass").expect("hash"),
        role: Role::Member,
        must_change_password: false,
        member_id: Some(member_id.to_string()),
    };
    repo.insert_user(&user).await.expect("seed user");
    user
}

/// Submit an UPDATE change request through the real submission service.
pub async fn submit(env: &TestEnv, login_key: &str, patch: MemberPatch) -> ChangeRequest {
    let submission = SubmissionService::new(env.repo.clone(), env.mailer.clone());
    submission
        .submit_profile_update(login_key, patch)
        .await
        .expect("submit update")
}

/// One recorded outgoing message.
#[derive(Debug, Clone, PartialEq)]
pub enum SentMail {
    AdminUpdate {
        member_email: String,
    },
    AdminDelete {
        member_email: String,
    },
    UpdateApproved {
        original_email: String,
    },
    DeleteApproved {
        email: String,
        name: Option<String>,
        /// Whether the watched member row still existed when the
        /// notification fired; `None` when no member is being watched.
        member_present_at_send: Option<bool>,
    },
    Rejected {
        email: String,
        reason: Option<String>,
        name: Option<String>,
    },
    Welcome {
        email: String,
        temp_password: String,
    },
    MemberUpdated {
        email: String,
    },
    MemberDeleted {
        email: String,
    },
}

/// Which notifier method should fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailMode {
    AdminUpdate,
    AdminDelete,
    UpdateApproved,
    DeleteApproved,
    Rejected,
    Welcome,
    MemberUpdated,
    MemberDeleted,
}

/// Notifier double that records every call and can be told to fail
/// selectively.
pub struct RecordingMailer {
    sent: Mutex<Vec<SentMail>>,
    failures: Mutex<HashSet<FailMode>>,
    watch_member_id: Mutex<Option<String>>,
    pool: SqlitePool,
}

impl RecordingMailer {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failures: Mutex::new(HashSet::new()),
            watch_member_id: Mutex::new(None),
            pool,
        }
    }

    pub fn sent(&self) -> Vec<SentMail> {
        self.sent.lock().unwrap().clone()
    }

    pub fn fail(&self, mode: FailMode) {
        self.failures.lock().unwrap().insert(mode);
    }

    /// Record, at delete-notification time, whether this member row still
    /// exists. Verifies the notify-before-delete ordering.
    pub fn watch_member(&self, member_id: &str) {
        *self.watch_member_id.lock().unwrap() = Some(member_id.to_string());
    }

    /// The temp password captured from the welcome mail of a registration.
    pub fn last_temp_password(&self) -> Option<String> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find_map(|mail| match mail {
                SentMail::Welcome { temp_password, .. } => Some(temp_password.clone()),
                _ => None,
            })
    }

    fn record(&self, mail: SentMail, mode: FailMode) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(mail);
        if self.failures.lock().unwrap().contains(&mode) {
            return Err(NotifyError("simulated delivery failure".to_string()));
        }
        Ok(())
    }

    async fn watched_member_present(&self) -> Option<bool> {
        let id = self.watch_member_id.lock().unwrap().clone()?;
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM members WHERE id = ?")
            .bind(&id)
            .fetch_one(&self.pool)
            .await
            .ok()?;
        let count: i64 = row.get("cnt");
        Some(count > 0)
    }
}

#[async_trait]
impl Notifier for RecordingMailer {
    async fn notify_admin_update(
        &self,
        member: &Member,
        _requested: &MemberPatch,
    ) -> Result<(), NotifyError> {
        self.record(
            SentMail::AdminUpdate {
                member_email: member.email.clone(),
            },
            FailMode::AdminUpdate,
        )
    }

    async fn notify_admin_delete(&self, member: &Member) -> Result<(), NotifyError> {
        self.record(
            SentMail::AdminDelete {
                member_email: member.email.clone(),
            },
            FailMode::AdminDelete,
        )
    }

    async fn notify_member_update_approved(
        &self,
        original_email: &str,
        _request: &ChangeRequest,
    ) -> Result<(), NotifyError> {
        self.record(
            SentMail::UpdateApproved {
                original_email: original_email.to_string(),
            },
            FailMode::UpdateApproved,
        )
    }

    async fn notify_member_delete_approved(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<(), NotifyError> {
        let member_present_at_send = self.watched_member_present().await;
        self.record(
            SentMail::DeleteApproved {
                email: email.to_string(),
                name: name.map(str::to_string),
                member_present_at_send,
            },
            FailMode::DeleteApproved,
        )
    }

    async fn notify_member_rejected(
        &self,
        email: &str,
        reason: Option<&str>,
        name: Option<&str>,
    ) -> Result<(), NotifyError> {
        self.record(
            SentMail::Rejected {
                email: email.to_string(),
                reason: reason.map(str::to_string),
                name: name.map(str::to_string),
            },
            FailMode::Rejected,
        )
    }

    async fn send_welcome(
        &self,
        email: &str,
        _name: &str,
        temp_password: &str,
        _login_url: &str,
    ) -> Result<(), NotifyError> {
        self.record(
            SentMail::Welcome {
                email: email.to_string(),
                temp_password: temp_password.to_string(),
            },
            FailMode::Welcome,
        )
    }

    async fn notify_member_updated(&self, email: &str, _name: &str) -> Result<(), NotifyError> {
        self.record(
            SentMail::MemberUpdated {
                email: email.to_string(),
            },
            FailMode::MemberUpdated,
        )
    }

    async fn notify_member_deleted(&self, email: &str, _name: &str) -> Result<(), NotifyError> {
        self.record(
            SentMail::MemberDeleted {
                email: email.to_string(),
            },
            FailMode::MemberDeleted,
        )
    }
}
