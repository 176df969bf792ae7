//! Member profile model and the request/patch DTOs built around it.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S[\p{L} .'-]{0,24}$").expect("name pattern"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\+91[- ]?|0)?[6-9]\d{9}$").expect("phone pattern"));

static PLACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\S[\p{L} .,'-]{0,49}$").expect("place pattern"));

/// A registered member's profile record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub age: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub place: Option<String>,
    pub registration_date: NaiveDate,
    /// Internal version for optimistic concurrency control
    #[serde(default)]
    pub version: i64,
}

/// Immutable copy of a member's fields, captured when a change request is
/// submitted. Used for audit display and change diffs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSnapshot {
    pub name: String,
    pub email: String,
    pub phone_number: String,
    pub age: i64,
    pub place: Option<String>,
}

impl MemberSnapshot {
    pub fn from_member(member: &Member) -> Self {
        Self {
            name: member.name.clone(),
            email: member.email.clone(),
            phone_number: member.phone_number.clone(),
            age: member.age,
            place: member.place.clone(),
        }
    }
}

/// Partial patch a member submits for review. `None` means "no change
/// requested for this field" and never clears a value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MemberPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 25, message = "Name cannot be more than 25 characters"),
        regex(
            path = *NAME_RE,
            message = "Use letters, spaces, dot (.), hyphen (-), apostrophe ('); no digits"
        )
    )]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(regex(
        path = *PHONE_RE,
        message = "Enter a valid mobile number (10 digits starting 6-9); optional +91 or leading 0"
    ))]
    pub phone_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(range(min = 1, max = 120, message = "Age must be between 1 and 120"))]
    pub age: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(
        length(max = 50, message = "Place must be at most 50 characters"),
        regex(path = *PLACE_RE, message = "Use letters, spaces, . , - '; no digits")
    )]
    pub place: Option<String>,
}

/// Request body for registering a new member (admin).
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateMemberRequest {
    #[validate(
        length(min = 1, max = 25, message = "Name is required and at most 25 characters"),
        regex(
            path = *NAME_RE,
            message = "Use letters, spaces, dot (.), hyphen (-), apostrophe ('); no digits"
        )
    )]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(regex(
        path = *PHONE_RE,
        message = "Enter a valid mobile number (10 digits starting 6-9); optional +91 or leading 0"
    ))]
    pub phone_number: String,
    #[validate(range(min = 1, max = 120, message = "Age must be between 1 and 120"))]
    pub age: i64,
    #[serde(default)]
    #[validate(length(max = 50, message = "Place must be at most 50 characters"))]
    pub place: Option<String>,
}

/// Request body for a direct admin member update. All fields are required;
/// this is a full replace, unlike the self-service [`MemberPatch`].
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMemberRequest {
    #[validate(
        length(min = 1, max = 25, message = "Name is required and at most 25 characters"),
        regex(
            path = *NAME_RE,
            message = "Use letters, spaces, dot (.), hyphen (-), apostrophe ('); no digits"
        )
    )]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(regex(
        path = *PHONE_RE,
        message = "Enter a valid mobile number (10 digits starting 6-9); optional +91 or leading 0"
    ))]
    pub phone_number: String,
    #[validate(range(min = 1, max = 120, message = "Age must be between 1 and 120"))]
    pub age: i64,
    #[serde(default)]
    #[validate(length(max = 50, message = "Place must be at most 50 characters"))]
    pub place: Option<String>,
}

/// Query parameters for the admin member search and CSV export.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberFilter {
    /// Free-text query over name/email/phone/place.
    #[serde(default)]
    pub q: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
    #[serde(default)]
    pub place: Option<String>,
    #[serde(default)]
    pub age_min: Option<i64>,
    #[serde(default)]
    pub age_max: Option<i64>,
    #[serde(default)]
    pub registration_date: Option<NaiveDate>,
    #[serde(default)]
    pub registration_date_from: Option<NaiveDate>,
    #[serde(default)]
    pub registration_date_to: Option<NaiveDate>,
    #[serde(default)]
    pub page: Option<i64>,
    #[serde(default)]
    pub size: Option<i64>,
    /// Sort column; filtered against a whitelist.
    #[serde(default)]
    pub sort_by: Option<String>,
    /// "asc" or "desc"
    #[serde(default)]
    pub dir: Option<String>,
}

/// One page of member search results.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T: Serialize> {
    pub content: Vec<T>,
    pub page: i64,
    pub size: i64,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T: Serialize> PageResponse<T> {
    pub fn new(content: Vec<T>, page: i64, size: i64, total_elements: i64) -> Self {
        let total_pages = if size > 0 {
            (total_elements + size - 1) / size
        } else {
            0
        };
        Self {
            content,
            page,
            size,
            total_elements,
            total_pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn patch_validation_rejects_bad_phone() {
        let patch = MemberPatch {
            phone_number: Some("12345".to_string()),
            ..Default::default()
        };
        assert!(patch.validate().is_err());
    }

    #[test]
    fn patch_validation_accepts_valid_fields() {
        let patch = MemberPatch {
            name: Some("Alice O'Neil".to_string()),
            email: Some("alice@example.com".to_string()),
            phone_number: Some("9627713570".to_string()),
            age: Some(30),
            place: Some("Pune".to_string()),
        };
        assert!(patch.validate().is_ok());
    }

    #[test]
    fn page_response_rounds_total_pages_up() {
        let page = PageResponse::<i64>::new(vec![], 0, 20, 41);
        assert_eq!(page.total_pages, 3);
    }
}
