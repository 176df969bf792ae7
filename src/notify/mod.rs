//! Notification boundary.
//!
//! The core never talks SMTP: it calls a [`Notifier`] collaborator and routes
//! every outcome through [`dispatch`] with an explicit [`DeliveryPolicy`].
//! Best-effort failures are logged and swallowed; required failures propagate
//! after the primary state change has already been persisted.

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;

use crate::errors::AppError;
use crate::models::{ChangeRequest, Member, MemberPatch, MemberSnapshot};

/// Failure inside the notification collaborator.
#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// How a notification failure affects the calling operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryPolicy {
    /// Log and continue; the primary operation is never rolled back.
    BestEffort,
    /// Propagate as an internal error. The caller's durable writes have
    /// already happened by the time this fires.
    Required,
}

/// Route a notification outcome according to the call site's policy.
pub fn dispatch(
    policy: DeliveryPolicy,
    operation: &str,
    outcome: Result<(), NotifyError>,
) -> Result<(), AppError> {
    match outcome {
        Ok(()) => Ok(()),
        Err(err) => match policy {
            DeliveryPolicy::BestEffort => {
                tracing::warn!("{} notification failed: {}", operation, err);
                Ok(())
            }
            DeliveryPolicy::Required => {
                tracing::error!("{} notification failed: {}", operation, err);
                Err(AppError::Internal(format!(
                    "{} notification failed: {}",
                    operation, err
                )))
            }
        },
    }
}

/// Email collaborator. All sends are single-recipient HTML messages.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_admin_update(
        &self,
        member: &Member,
        requested: &MemberPatch,
    ) -> Result<(), NotifyError>;

    async fn notify_admin_delete(&self, member: &Member) -> Result<(), NotifyError>;

    async fn notify_member_update_approved(
        &self,
        original_email: &str,
        request: &ChangeRequest,
    ) -> Result<(), NotifyError>;

    async fn notify_member_delete_approved(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<(), NotifyError>;

    async fn notify_member_rejected(
        &self,
        email: &str,
        reason: Option<&str>,
        name: Option<&str>,
    ) -> Result<(), NotifyError>;

    async fn send_welcome(
        &self,
        email: &str,
        name: &str,
        temp_password: &str,
        login_url: &str,
    ) -> Result<(), NotifyError>;

    async fn notify_member_updated(&self, email: &str, name: &str) -> Result<(), NotifyError>;

    async fn notify_member_deleted(&self, email: &str, name: &str) -> Result<(), NotifyError>;
}

/// Mailer that POSTs messages to an HTTP mail relay.
pub struct RelayMailer {
    client: Client,
    relay_url: String,
    relay_token: Option<String>,
    from: String,
    admin_email: String,
    base_url: String,
}

#[derive(Debug, Serialize)]
struct RelayMessage<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    html: &'a str,
}

impl RelayMailer {
    pub fn new(
        relay_url: String,
        relay_token: Option<String>,
        from: String,
        admin_email: String,
        base_url: String,
    ) -> Self {
        Self {
            client: Client::new(),
            relay_url,
            relay_token,
            from,
            admin_email,
            base_url,
        }
    }

    async fn send(&self, to: &str, subject: &str, html: &str) -> Result<(), NotifyError> {
        let message = RelayMessage {
            from: &self.from,
            to,
            subject,
            html,
        };

        let mut request = self.client.post(&self.relay_url).json(&message);
        if let Some(token) = &self.relay_token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        let response = request
            .send()
            .await
            .map_err(|e| NotifyError(format!("relay request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(NotifyError(format!(
                "relay returned {} for {}",
                response.status(),
                subject
            )));
        }
        Ok(())
    }

    fn review_url(&self) -> String {
        format!("{}/admin/requests", self.base_url)
    }
}

#[async_trait]
impl Notifier for RelayMailer {
    async fn notify_admin_update(
        &self,
        member: &Member,
        requested: &MemberPatch,
    ) -> Result<(), NotifyError> {
        let rows = diff_rows(&MemberSnapshot::from_member(member), requested);
        let html = format!(
            "<h2>Member change request (UPDATE)</h2>\
             <p>{} ({})</p>\
             <table><tr><th>Field</th><th>Current</th><th>Requested</th></tr>{}</table>\
             <p>This request is <strong>pending</strong> review.</p>\
             <p><a href=\"{}\">Open Admin Console</a></p>",
            escape(&member.name),
            escape(&member.email),
            rows,
            escape(&self.review_url()),
        );
        self.send(&self.admin_email, "Member change request", &html)
            .await
    }

    async fn notify_admin_delete(&self, member: &Member) -> Result<(), NotifyError> {
        let html = format!(
            "<h2>Member delete request</h2>\
             <p>{} ({})</p>\
             <table>\
             <tr><td>Phone</td><td>{}</td></tr>\
             <tr><td>Age</td><td>{}</td></tr>\
             <tr><td>Place</td><td>{}</td></tr>\
             </table>\
             <p>This deletion is <strong>pending</strong> admin approval.</p>\
             <p><a href=\"{}\">Open Admin Console</a></p>",
            escape(&member.name),
            escape(&member.email),
            escape(&member.phone_number),
            member.age,
            escape(member.place.as_deref().unwrap_or("")),
            escape(&self.review_url()),
        );
        self.send(&self.admin_email, "Member delete request", &html)
            .await
    }

    async fn notify_member_update_approved(
        &self,
        original_email: &str,
        request: &ChangeRequest,
    ) -> Result<(), NotifyError> {
        let rows = request
            .requested
            .as_ref()
            .map(|patch| diff_rows(&request.before, patch))
            .unwrap_or_default();
        let html = format!(
            "<h2>Your profile update was approved</h2>\
             <p>Hi {}, your requested changes were approved and applied to your profile.</p>\
             <table><tr><th>Field</th><th>Before</th><th>After</th></tr>{}</table>",
            escape(&request.before.name),
            rows,
        );
        self.send(original_email, "Your profile update was approved", &html)
            .await
    }

    async fn notify_member_delete_approved(
        &self,
        email: &str,
        name: Option<&str>,
    ) -> Result<(), NotifyError> {
        let html = format!(
            "<h2>Your account deletion was approved</h2>\
             <p>Hi {}, your request to delete your account has been approved. \
             Your data has been removed from our system.</p>\
             <p>If this was a mistake, please contact support immediately.</p>",
            escape(name.unwrap_or("there")),
        );
        self.send(email, "Your account deletion was approved", &html)
            .await
    }

    async fn notify_member_rejected(
        &self,
        email: &str,
        reason: Option<&str>,
        name: Option<&str>,
    ) -> Result<(), NotifyError> {
        let greeting = match name {
            Some(name) => format!("Hi {}, your", escape(name)),
            None => "Your".to_string(),
        };
        let reason_line = match reason.filter(|r| !r.trim().is_empty()) {
            Some(reason) => format!(" Reason: {}", escape(reason)),
            None => String::new(),
        };
        let html = format!(
            "<h2>Your request could not be approved</h2>\
             <p>{} request was rejected by the admin.{}</p>",
            greeting, reason_line,
        );
        self.send(email, "Your request was rejected", &html).await
    }

    async fn send_welcome(
        &self,
        email: &str,
        name: &str,
        temp_password: &str,
        login_url: &str,
    ) -> Result<(), NotifyError> {
        let html = format!(
            "<h2>Welcome, {}</h2>\
             <p>Your account has been created. Use the temporary password below to sign in; \
             you'll then be asked to set a new password.</p>\
             <table>\
             <tr><td><b>Email</b></td><td>{}</td></tr>\
             <tr><td><b>Temporary password</b></td><td><code>{}</code></td></tr>\
             </table>\
             <p><a href=\"{}\">Sign in</a></p>\
             <p>If you didn't expect this email, please ignore it.</p>",
            escape(name),
            escape(email),
            escape(temp_password),
            escape(login_url),
        );
        self.send(email, "You're added as a member — set your password", &html)
            .await
    }

    async fn notify_member_updated(&self, email: &str, name: &str) -> Result<(), NotifyError> {
        let html = format!(
            "<p>Hello <b>{}</b>,</p>\
             <p>Your profile details have been updated by the admin.</p>\
             <p>If you did not request this update, please contact support immediately.</p>",
            escape(name),
        );
        self.send(email, "Your Roster profile was updated", &html)
            .await
    }

    async fn notify_member_deleted(&self, email: &str, name: &str) -> Result<(), NotifyError> {
        let html = format!(
            "<p>Hello <b>{}</b>,</p>\
             <p>Your account has been <b>deleted by the admin</b>.</p>\
             <p>If you believe this is a mistake, please contact support immediately.</p>",
            escape(name),
        );
        self.send(email, "Your Roster account has been deleted", &html)
            .await
    }
}

/// Mailer used when no relay is configured: logs every message instead of
/// sending it.
pub struct NoopMailer;

#[async_trait]
impl Notifier for NoopMailer {
    async fn notify_admin_update(
        &self,
        member: &Member,
        _requested: &MemberPatch,
    ) -> Result<(), NotifyError> {
        tracing::info!("mail relay disabled: admin update notification for {}", member.email);
        Ok(())
    }

    async fn notify_admin_delete(&self, member: &Member) -> Result<(), NotifyError> {
        tracing::info!("mail relay disabled: admin delete notification for {}", member.email);
        Ok(())
    }

    async fn notify_member_update_approved(
        &self,
        original_email: &str,
        _request: &ChangeRequest,
    ) -> Result<(), NotifyError> {
        tracing::info!("mail relay disabled: update approved for {}", original_email);
        Ok(())
    }

    async fn notify_member_delete_approved(
        &self,
        email: &str,
        _name: Option<&str>,
    ) -> Result<(), NotifyError> {
        tracing::info!("mail relay disabled: delete approved for {}", email);
        Ok(())
    }

    async fn notify_member_rejected(
        &self,
        email: &str,
        _reason: Option<&str>,
        _name: Option<&str>,
    ) -> Result<(), NotifyError> {
        tracing::info!("mail relay disabled: rejection notice for {}", email);
        Ok(())
    }

    async fn send_welcome(
        &self,
        email: &str,
        _name: &str,
        _temp_password: &str,
        _login_url: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!("mail relay disabled: welcome mail for {}", email);
        Ok(())
    }

    async fn notify_member_updated(&self, email: &str, _name: &str) -> Result<(), NotifyError> {
        tracing::info!("mail relay disabled: profile updated notice for {}", email);
        Ok(())
    }

    async fn notify_member_deleted(&self, email: &str, _name: &str) -> Result<(), NotifyError> {
        tracing::info!("mail relay disabled: account deleted notice for {}", email);
        Ok(())
    }
}

/// Render a table row per field that actually changes. A `None` requested
/// value means "unchanged" and produces no row.
fn diff_rows(before: &MemberSnapshot, requested: &MemberPatch) -> String {
    let mut rows = String::new();
    diff_row(&mut rows, "Name", Some(&before.name), requested.name.as_deref());
    diff_row(&mut rows, "Email", Some(&before.email), requested.email.as_deref());
    diff_row(
        &mut rows,
        "Phone",
        Some(&before.phone_number),
        requested.phone_number.as_deref(),
    );
    let before_age = before.age.to_string();
    let requested_age = requested.age.map(|a| a.to_string());
    diff_row(&mut rows, "Age", Some(&before_age), requested_age.as_deref());
    diff_row(&mut rows, "Place", before.place.as_deref(), requested.place.as_deref());
    rows
}

fn diff_row(rows: &mut String, label: &str, before: Option<&str>, after: Option<&str>) {
    let before = before.unwrap_or("");
    // Treat a missing "requested" value as unchanged
    let after = after.unwrap_or(before);
    if before != after {
        rows.push_str(&format!(
            "<tr><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(label),
            escape(before),
            escape(after)
        ));
    }
}

/// Basic HTML escape for user-supplied values.
fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}
