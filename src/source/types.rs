//! Backend record shapes
//!
//! Field names follow the backend's camelCase JSON. Records are transient: they
//! are diffed and dropped, never persisted as-is.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Review status of a profile-change request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
    Other(String),
}

impl RequestStatus {
    pub fn as_str(&self) -> &str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
            RequestStatus::Other(s) => s.as_str(),
        }
    }

    /// Whether a reviewer has decided on the request
    pub fn is_reviewed(&self) -> bool {
        matches!(self, RequestStatus::Approved | RequestStatus::Rejected)
    }
}

impl From<String> for RequestStatus {
    fn from(s: String) -> Self {
        match s.trim().to_lowercase().as_str() {
            "pending" | "menunggu" => RequestStatus::Pending,
            "approved" | "accepted" | "disetujui" => RequestStatus::Approved,
            "rejected" | "declined" | "ditolak" => RequestStatus::Rejected,
            _ => RequestStatus::Other(s),
        }
    }
}

impl From<RequestStatus> for String {
    fn from(status: RequestStatus) -> Self {
        status.as_str().to_string()
    }
}

/// A request to change profile data, reviewed by a superadmin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileRequest {
    pub id: String,
    #[serde(rename = "type")]
    pub request_type: String,
    pub status: RequestStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requester_name: Option<String>,
}

/// Class membership (current or awaiting approval)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassMembership {
    pub class_id: String,
    pub class_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_name: Option<String>,
    /// Set on teacher-scoped pending lists (who asked to join)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
}

impl ClassMembership {
    /// Who a pending membership belongs to: student id, else name
    pub fn requester_key(&self) -> Option<&str> {
        self.student_id.as_deref().or(self.student_name.as_deref())
    }
}

/// Learning material with its question tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Material {
    pub id: String,
    pub class_id: String,
    pub title: String,
    /// Update signature (version or timestamp string)
    pub updated_at: String,
    #[serde(default)]
    pub questions: Vec<Question>,
}

impl Material {
    /// `updated_at` as a timestamp, when the backend sends RFC 3339
    pub fn updated_time(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.updated_at)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

/// Essay question inside a material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    #[serde(default)]
    pub title: String,
    /// Student scope: own submission only. Teacher scope: all submissions.
    #[serde(default)]
    pub submissions: Vec<Submission>,
}

/// Answer to a question, with AI and teacher grading fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub student_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ai_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revised_score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub teacher_feedback: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reviewed_at: Option<DateTime<Utc>>,
}

impl Submission {
    /// AI grading has produced a score
    pub fn is_ai_graded(&self) -> bool {
        self.ai_score.is_some()
    }

    /// A teacher revised the score or left feedback
    pub fn is_teacher_reviewed(&self) -> bool {
        self.revised_score.is_some()
            || self
                .teacher_feedback
                .as_deref()
                .is_some_and(|f| !f.trim().is_empty())
    }
}
