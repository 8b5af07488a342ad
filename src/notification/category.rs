//! Roles and the per-role category table
//!
//! Each role runs the same engine over a different set of categories. A category
//! names the resource it reads and the diff policy applied to it, so adding a
//! notification source is a table entry rather than new polling code.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::source::Resource;

/// Dashboard role the engine runs for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Student,
    Teacher,
    Superadmin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Teacher => "teacher",
            Role::Superadmin => "superadmin",
        }
    }

    /// Categories polled for this role, in display order
    pub fn categories(&self) -> &'static [Category] {
        match self {
            Role::Student => &[
                Category::ClassMembership,
                Category::MaterialUpdate,
                Category::NewQuestions,
                Category::AiGrading,
                Category::TeacherReview,
                Category::ProfileRequest,
            ],
            Role::Teacher => &[
                Category::JoinRequest,
                Category::NewSubmission,
                Category::ProfileRequest,
            ],
            Role::Superadmin => &[Category::IncomingProfileRequest],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "student" | "siswa" => Ok(Role::Student),
            "teacher" | "guru" => Ok(Role::Teacher),
            "superadmin" | "admin" => Ok(Role::Superadmin),
            other => Err(anyhow::anyhow!(
                "unknown role: {} (expected student, teacher or superadmin)",
                other
            )),
        }
    }
}

/// How a category turns snapshots into events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffPolicy {
    /// Pending → approved membership transitions, with cold-start baseline
    Transition,
    /// Update signature vs. user-acknowledged signature; never advanced by polling
    Signature,
    /// Count growth per parent; cursor advances in the same step
    CountDelta,
    /// Fires once per dedup key, ever
    AtMostOnce,
}

/// One independent notification source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    ClassMembership,
    MaterialUpdate,
    NewQuestions,
    AiGrading,
    TeacherReview,
    ProfileRequest,
    JoinRequest,
    NewSubmission,
    IncomingProfileRequest,
}

impl Category {
    pub const ALL: [Category; 9] = [
        Category::ClassMembership,
        Category::MaterialUpdate,
        Category::NewQuestions,
        Category::AiGrading,
        Category::TeacherReview,
        Category::ProfileRequest,
        Category::JoinRequest,
        Category::NewSubmission,
        Category::IncomingProfileRequest,
    ];

    /// Stable wire name, also used in notification ids and storage keys
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::ClassMembership => "class_membership",
            Category::MaterialUpdate => "material_update",
            Category::NewQuestions => "new_questions",
            Category::AiGrading => "ai_grading",
            Category::TeacherReview => "teacher_review",
            Category::ProfileRequest => "profile_request",
            Category::JoinRequest => "join_request",
            Category::NewSubmission => "new_submission",
            Category::IncomingProfileRequest => "incoming_profile_request",
        }
    }

    pub fn policy(&self) -> DiffPolicy {
        match self {
            Category::ClassMembership => DiffPolicy::Transition,
            Category::MaterialUpdate => DiffPolicy::Signature,
            Category::NewQuestions | Category::NewSubmission => DiffPolicy::CountDelta,
            Category::AiGrading
            | Category::TeacherReview
            | Category::ProfileRequest
            | Category::JoinRequest
            | Category::IncomingProfileRequest => DiffPolicy::AtMostOnce,
        }
    }

    /// Backend resource this category diffs against
    pub fn resource(&self) -> Resource {
        match self {
            Category::ClassMembership | Category::JoinRequest => Resource::Memberships,
            Category::MaterialUpdate
            | Category::NewQuestions
            | Category::AiGrading
            | Category::TeacherReview
            | Category::NewSubmission => Resource::Materials,
            Category::ProfileRequest | Category::IncomingProfileRequest => {
                Resource::ProfileRequests
            }
        }
    }

    /// Human label for preference listings
    pub fn label(&self) -> &'static str {
        match self {
            Category::ClassMembership => "Status keanggotaan kelas",
            Category::MaterialUpdate => "Materi diperbarui",
            Category::NewQuestions => "Soal baru",
            Category::AiGrading => "Penilaian AI",
            Category::TeacherReview => "Review nilai oleh guru",
            Category::ProfileRequest => "Status perubahan profil",
            Category::JoinRequest => "Permintaan masuk kelas",
            Category::NewSubmission => "Jawaban siswa baru",
            Category::IncomingProfileRequest => "Permintaan perubahan profil",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase().replace('-', "_");
        Category::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == normalized)
            .ok_or_else(|| anyhow::anyhow!("unknown category: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_category_belongs_to_a_role() {
        for category in Category::ALL {
            let owned = [Role::Student, Role::Teacher, Role::Superadmin]
                .iter()
                .any(|r| r.categories().contains(&category));
            assert!(owned, "{} is not polled by any role", category);
        }
    }

    #[test]
    fn test_category_round_trips_through_str() {
        for category in Category::ALL {
            assert_eq!(category.as_str().parse::<Category>().unwrap(), category);
        }
        assert_eq!(
            "ai-grading".parse::<Category>().unwrap(),
            Category::AiGrading
        );
        assert!("grades".parse::<Category>().is_err());
    }

    #[test]
    fn test_serde_name_matches_as_str() {
        let json = serde_json::to_string(&Category::IncomingProfileRequest).unwrap();
        assert_eq!(json, "\"incoming_profile_request\"");
    }

    #[test]
    fn test_role_parse_accepts_aliases() {
        assert_eq!("Guru".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!("siswa".parse::<Role>().unwrap(), Role::Student);
        assert!("parent".parse::<Role>().is_err());
    }

    #[test]
    fn test_policies() {
        assert_eq!(Category::ClassMembership.policy(), DiffPolicy::Transition);
        assert_eq!(Category::MaterialUpdate.policy(), DiffPolicy::Signature);
        assert_eq!(Category::NewQuestions.policy(), DiffPolicy::CountDelta);
        assert_eq!(Category::TeacherReview.policy(), DiffPolicy::AtMostOnce);
        assert_eq!(Category::JoinRequest.policy(), DiffPolicy::AtMostOnce);
    }
}
