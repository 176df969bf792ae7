//! CSV export of the filtered member list.

use std::sync::Arc;

use chrono::Utc;

use crate::db::Repository;
use crate::errors::AppError;
use crate::models::{Member, MemberFilter};
use crate::services::query::resolve_sort;

pub struct MemberExportService {
    repo: Arc<Repository>,
}

impl MemberExportService {
    pub fn new(repo: Arc<Repository>) -> Self {
        Self { repo }
    }

    /// Render the full (unpaged) filter result as CSV.
    pub async fn export_csv(&self, filter: &MemberFilter) -> Result<String, AppError> {
        let (sort_col, descending) = resolve_sort(filter);
        let members = self
            .repo
            .find_members(filter, sort_col, descending, None)
            .await?;

        let mut out = String::new();
        out.push_str("Registration Date,Name,Email,Phone,Age,Place\n");
        for member in &members {
            write_csv_row(&mut out, member);
        }
        Ok(out)
    }
}

/// Attachment filename for today's export.
pub fn csv_filename() -> String {
    format!("members-{}.csv", Utc::now().date_naive())
}

fn write_csv_row(out: &mut String, member: &Member) {
    let age = member.age.to_string();
    let columns = [
        member.registration_date.format("%Y-%m-%d").to_string(),
        member.name.clone(),
        member.email.clone(),
        member.phone_number.clone(),
        age,
        member.place.clone().unwrap_or_default(),
    ];
    for (i, column) in columns.iter().enumerate() {
        out.push('"');
        out.push_str(&column.replace('"', "\"\""));
        out.push('"');
        if i < columns.len() - 1 {
            out.push(',');
        }
    }
    out.push('\n');
}
