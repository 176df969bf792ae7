//! Database repository for CRUD operations.
//!
//! Uses prepared statements and conditional version checks for data integrity.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use crate::errors::AppError;
use crate::models::{
    ChangeRequest, ChangeStatus, ChangeType, Member, MemberFilter, MemberPatch, MemberSnapshot,
    Role, UserAccount,
};

/// Database repository for all data operations.
#[derive(Clone)]
pub struct Repository {
    pool: SqlitePool,
}

/// Map the camelCase sort names exposed by the API onto real columns.
/// Anything not in the whitelist is ignored by callers.
pub fn sort_column(name: &str) -> Option<&'static str> {
    match name {
        "name" => Some("name"),
        "email" => Some("email"),
        "phoneNumber" => Some("phone_number"),
        "age" => Some("age"),
        "place" => Some("place"),
        "registrationDate" => Some("registration_date"),
        _ => None,
    }
}

impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ==================== MEMBER OPERATIONS ====================

    /// Get a member by ID.
    pub async fn find_member(&self, id: &str) -> Result<Option<Member>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, email, phone_number, age, place, registration_date, version
             FROM members WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(member_from_row))
    }

    /// Get a member by email (the login key). Emails are stored lowercased,
    /// so the lookup normalizes the same way.
    pub async fn find_member_by_email(&self, email: &str) -> Result<Option<Member>, AppError> {
        let row = sqlx::query(
            "SELECT id, name, email, phone_number, age, place, registration_date, version
             FROM members WHERE email = ?",
        )
        .bind(email.trim().to_lowercase())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(member_from_row))
    }

    /// Insert a new member record.
    pub async fn insert_member(&self, member: &Member) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO members (id, name, email, phone_number, age, place, registration_date, version)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&member.id)
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.phone_number)
        .bind(member.age)
        .bind(&member.place)
        .bind(member.registration_date)
        .bind(member.version)
        .execute(&self.pool)
        .await
        .map_err(map_member_unique_violation)?;

        Ok(())
    }

    /// Persist an updated member with optimistic concurrency control.
    /// Returns the version-bumped record.
    pub async fn save_member(&self, member: &Member) -> Result<Member, AppError> {
        let new_version = member.version + 1;

        let result = sqlx::query(
            "UPDATE members SET name = ?, email = ?, phone_number = ?, age = ?, place = ?, version = ?
             WHERE id = ? AND version = ?",
        )
        .bind(&member.name)
        .bind(&member.email)
        .bind(&member.phone_number)
        .bind(member.age)
        .bind(&member.place)
        .bind(new_version)
        .bind(&member.id)
        .bind(member.version)
        .execute(&self.pool)
        .await
        .map_err(map_member_unique_violation)?;

        if result.rows_affected() == 0 {
            // Version changed between read and write, or the member vanished
            return Err(AppError::Conflict(
                "Concurrent modification detected".to_string(),
            ));
        }

        Ok(Member {
            version: new_version,
            ..member.clone()
        })
    }

    /// Delete a member. Returns the number of rows removed; callers decide
    /// whether a missing record is an error.
    pub async fn delete_member(&self, id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM members WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    /// True when another member already uses this email.
    pub async fn exists_by_email_excluding_id(
        &self,
        email: &str,
        id: &str,
    ) -> Result<bool, AppError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM members WHERE email = ? AND id != ?")
            .bind(email)
            .bind(id)
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("cnt");
        Ok(count > 0)
    }

    /// True when another member already uses this phone number.
    pub async fn exists_by_phone_excluding_id(
        &self,
        phone_number: &str,
        id: &str,
    ) -> Result<bool, AppError> {
        let row =
            sqlx::query("SELECT COUNT(*) AS cnt FROM members WHERE phone_number = ? AND id != ?")
                .bind(phone_number)
                .bind(id)
                .fetch_one(&self.pool)
                .await?;
        let count: i64 = row.get("cnt");
        Ok(count > 0)
    }

    /// Count members matching the filter.
    pub async fn count_members(&self, filter: &MemberFilter) -> Result<i64, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM members WHERE 1=1");
        push_member_filters(&mut qb, filter);
        let count: i64 = qb.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count)
    }

    /// Fetch members matching the filter, sorted by a whitelisted column.
    /// `page` is `(limit, offset)`; `None` streams the full result set
    /// (export path).
    pub async fn find_members(
        &self,
        filter: &MemberFilter,
        sort_col: &'static str,
        descending: bool,
        page: Option<(i64, i64)>,
    ) -> Result<Vec<Member>, AppError> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, name, email, phone_number, age, place, registration_date, version
             FROM members WHERE 1=1",
        );
        push_member_filters(&mut qb, filter);

        qb.push(" ORDER BY ");
        qb.push(sort_col);
        qb.push(if descending { " DESC" } else { " ASC" });

        if let Some((limit, offset)) = page {
            qb.push(" LIMIT ");
            qb.push_bind(limit);
            qb.push(" OFFSET ");
            qb.push_bind(offset);
        }

        let rows = qb.build().fetch_all(&self.pool).await?;
        Ok(rows.iter().map(member_from_row).collect())
    }

    // ==================== USER ACCOUNT OPERATIONS ====================

    /// Look up a login identity by username (the member's email).
    pub async fn find_user_by_user_name(
        &self,
        user_name: &str,
    ) -> Result<Option<UserAccount>, AppError> {
        let row = sqlx::query(
            "SELECT id, user_name, password_hash, role, must_change_password, member_id
             FROM user_accounts WHERE user_name = ?",
        )
        .bind(user_name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Look up a login identity by the member it belongs to.
    pub async fn find_user_by_member_id(
        &self,
        member_id: &str,
    ) -> Result<Option<UserAccount>, AppError> {
        let row = sqlx::query(
            "SELECT id, user_name, password_hash, role, must_change_password, member_id
             FROM user_accounts WHERE member_id = ?",
        )
        .bind(member_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    /// Insert a new login identity.
    pub async fn insert_user(&self, user: &UserAccount) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO user_accounts (id, user_name, password_hash, role, must_change_password, member_id)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&user.id)
        .bind(&user.user_name)
        .bind(&user.password_hash)
        .bind(user.role.as_str())
        .bind(user.must_change_password as i32)
        .bind(&user.member_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => {
                AppError::Conflict("Login username already in use".to_string())
            }
            _ => e.into(),
        })?;

        Ok(())
    }

    /// Rename a login identity (email change approved).
    pub async fn update_user_name(&self, id: &str, user_name: &str) -> Result<(), AppError> {
        let result = sqlx::query("UPDATE user_accounts SET user_name = ? WHERE id = ?")
            .bind(user_name)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| match e.as_database_error() {
                Some(db) if db.is_unique_violation() => {
                    AppError::Conflict("Login username already in use".to_string())
                }
                _ => e.into(),
            })?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User login not found".to_string()));
        }
        Ok(())
    }

    /// Replace the stored password hash and reset the must-change flag.
    pub async fn update_user_password(
        &self,
        id: &str,
        password_hash: &str,
        must_change_password: bool,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE user_accounts SET password_hash = ?, must_change_password = ? WHERE id = ?",
        )
        .bind(password_hash)
        .bind(must_change_password as i32)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound("User login not found".to_string()));
        }
        Ok(())
    }

    /// Delete a login identity by its id.
    pub async fn delete_user_by_id(&self, id: &str) -> Result<u64, AppError> {
        let result = sqlx::query("DELETE FROM user_accounts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    // ==================== CHANGE REQUEST OPERATIONS ====================

    /// Persist a new change request. The partial unique index on
    /// `(member_id) WHERE status = 'PENDING'` turns a concurrent duplicate
    /// submission into a Conflict here.
    pub async fn insert_change_request(&self, request: &ChangeRequest) -> Result<(), AppError> {
        let before = serde_json::to_string(&request.before)?;
        let requested = request
            .requested
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        sqlx::query(
            "INSERT INTO change_requests
                (id, member_id, member_email, change_type, status, before_snapshot, requested,
                 submitted_by, submitted_at, reviewed_by, reviewed_at, rejection_reason)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id)
        .bind(&request.member_id)
        .bind(&request.member_email)
        .bind(request.change_type.as_str())
        .bind(request.status.as_str())
        .bind(before)
        .bind(requested)
        .bind(&request.submitted_by)
        .bind(request.submitted_at)
        .bind(&request.reviewed_by)
        .bind(request.reviewed_at)
        .bind(&request.rejection_reason)
        .execute(&self.pool)
        .await
        .map_err(|e| match e.as_database_error() {
            Some(db) if db.is_unique_violation() => AppError::Conflict(
                "A change request is already pending for this member".to_string(),
            ),
            _ => e.into(),
        })?;

        Ok(())
    }

    /// Get a change request by ID.
    pub async fn find_change_request(&self, id: &str) -> Result<Option<ChangeRequest>, AppError> {
        let row = sqlx::query(
            "SELECT id, member_id, member_email, change_type, status, before_snapshot, requested,
                    submitted_by, submitted_at, reviewed_by, reviewed_at, rejection_reason
             FROM change_requests WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(change_request_from_row).transpose()
    }

    /// True when the member already has a PENDING request.
    pub async fn has_pending_request(&self, member_id: &str) -> Result<bool, AppError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS cnt FROM change_requests WHERE member_id = ? AND status = 'PENDING'",
        )
        .bind(member_id)
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.get("cnt");
        Ok(count > 0)
    }

    /// List change requests in a given status, oldest submission first.
    pub async fn list_requests_by_status(
        &self,
        status: ChangeStatus,
    ) -> Result<Vec<ChangeRequest>, AppError> {
        let rows = sqlx::query(
            "SELECT id, member_id, member_email, change_type, status, before_snapshot, requested,
                    submitted_by, submitted_at, reviewed_by, reviewed_at, rejection_reason
             FROM change_requests WHERE status = ? ORDER BY submitted_at ASC",
        )
        .bind(status.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(change_request_from_row).collect()
    }

    /// Write the terminal review status. The `status = 'PENDING'` guard makes
    /// the transition atomic: a second reviewer hitting the same request gets
    /// a Conflict instead of a double transition.
    pub async fn mark_reviewed(
        &self,
        id: &str,
        status: ChangeStatus,
        reviewed_by: &str,
        reviewed_at: DateTime<Utc>,
        rejection_reason: Option<&str>,
    ) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE change_requests
             SET status = ?, reviewed_by = ?, reviewed_at = ?, rejection_reason = ?
             WHERE id = ? AND status = 'PENDING'",
        )
        .bind(status.as_str())
        .bind(reviewed_by)
        .bind(reviewed_at)
        .bind(rejection_reason)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::Conflict("Request is not pending".to_string()));
        }
        Ok(())
    }
}

/// Append the shared WHERE fragment for member search and export.
fn push_member_filters(qb: &mut QueryBuilder<Sqlite>, filter: &MemberFilter) {
    if let Some(q) = filter.q.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        let pattern = like_pattern(q);
        qb.push(" AND (name LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR email LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR phone_number LIKE ");
        qb.push_bind(pattern.clone());
        qb.push(" ESCAPE '\\' OR place LIKE ");
        qb.push_bind(pattern);
        qb.push(" ESCAPE '\\'");
        // A query that parses as a date also matches the registration date
        if let Ok(date) = q.parse::<NaiveDate>() {
            qb.push(" OR registration_date = ");
            qb.push_bind(date);
        }
        qb.push(")");
    }

    if let Some(name) = text_filter(&filter.name) {
        qb.push(" AND name LIKE ");
        qb.push_bind(like_pattern(&name));
        qb.push(" ESCAPE '\\'");
    }
    if let Some(email) = text_filter(&filter.email) {
        qb.push(" AND email LIKE ");
        qb.push_bind(like_pattern(&email));
        qb.push(" ESCAPE '\\'");
    }
    if let Some(phone) = text_filter(&filter.phone_number) {
        qb.push(" AND phone_number LIKE ");
        qb.push_bind(like_pattern(&phone));
        qb.push(" ESCAPE '\\'");
    }
    if let Some(place) = text_filter(&filter.place) {
        qb.push(" AND place LIKE ");
        qb.push_bind(like_pattern(&place));
        qb.push(" ESCAPE '\\'");
    }
    if let Some(age_min) = filter.age_min {
        qb.push(" AND age >= ");
        qb.push_bind(age_min);
    }
    if let Some(age_max) = filter.age_max {
        qb.push(" AND age <= ");
        qb.push_bind(age_max);
    }

    // Exact date wins over the from/to range
    if let Some(exact) = filter.registration_date {
        qb.push(" AND registration_date = ");
        qb.push_bind(exact);
    } else {
        if let Some(from) = filter.registration_date_from {
            qb.push(" AND registration_date >= ");
            qb.push_bind(from);
        }
        if let Some(to) = filter.registration_date_to {
            qb.push(" AND registration_date <= ");
            qb.push_bind(to);
        }
    }
}

fn text_filter(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Build a contains-match LIKE pattern with the wildcards escaped, so user
/// input is always matched literally.
fn like_pattern(term: &str) -> String {
    let escaped = term
        .replace('\\', "\\\\")
        .replace('%', "\\%")
        .replace('_', "\\_");
    format!("%{}%", escaped)
}

// Helper functions for row conversion

fn member_from_row(row: &sqlx::sqlite::SqliteRow) -> Member {
    Member {
        id: row.get("id"),
        name: row.get("name"),
        email: row.get("email"),
        phone_number: row.get("phone_number"),
        age: row.get("age"),
        place: row.get("place"),
        registration_date: row.get("registration_date"),
        version: row.get("version"),
    }
}

fn user_from_row(row: &sqlx::sqlite::SqliteRow) -> UserAccount {
    let must_change: i32 = row.get("must_change_password");
    let role: String = row.get("role");
    UserAccount {
        id: row.get("id"),
        user_name: row.get("user_name"),
        password_hash: row.get("password_hash"),
        role: Role::from_str(&role).unwrap_or(Role::Member),
        must_change_password: must_change != 0,
        member_id: row.get("member_id"),
    }
}

fn change_request_from_row(row: &sqlx::sqlite::SqliteRow) -> Result<ChangeRequest, AppError> {
    let change_type: String = row.get("change_type");
    let status: String = row.get("status");
    let before: String = row.get("before_snapshot");
    let requested: Option<String> = row.get("requested");

    let before: MemberSnapshot = serde_json::from_str(&before)?;
    let requested: Option<MemberPatch> = requested
        .as_deref()
        .map(serde_json::from_str)
        .transpose()?;

    Ok(ChangeRequest {
        id: row.get("id"),
        member_id: row.get("member_id"),
        member_email: row.get("member_email"),
        change_type: ChangeType::from_str(&change_type).ok_or_else(|| {
            AppError::Database(format!("Unknown change type: {}", change_type))
        })?,
        status: ChangeStatus::from_str(&status)
            .ok_or_else(|| AppError::Database(format!("Unknown status: {}", status)))?,
        before,
        requested,
        submitted_by: row.get("submitted_by"),
        submitted_at: row.get("submitted_at"),
        reviewed_by: row.get("reviewed_by"),
        reviewed_at: row.get("reviewed_at"),
        rejection_reason: row.get("rejection_reason"),
    })
}

/// Translate a unique-index failure on the members table into the
/// field-specific Conflict the API reports.
fn map_member_unique_violation(err: sqlx::Error) -> AppError {
    if let Some(db_err) = err.as_database_error() {
        if db_err.is_unique_violation() {
            let msg = db_err.message();
            if msg.contains("members.email") {
                return AppError::Conflict("Email already in use".to_string());
            }
            if msg.contains("members.phone_number") {
                return AppError::Conflict("Phone already in use".to_string());
            }
            return AppError::Conflict("A unique constraint was violated".to_string());
        }
    }
    err.into()
}
