//! Diff events - new facts, not yet user-visible notifications

use chrono::{DateTime, Utc};

use super::category::Category;
use crate::source::RequestStatus;

/// Location of a question inside a class's material tree
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionRef {
    pub class_id: String,
    pub material_id: String,
    pub material_title: String,
    pub question_id: String,
    pub question_title: String,
}

/// What happened, with the context the templates need
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    /// Membership approved after the user had asked to join
    ApprovedFromPending {
        class_id: String,
        class_name: String,
        teacher_name: Option<String>,
    },
    /// Membership appeared without a recorded pending request
    InvitedDirectly {
        class_id: String,
        class_name: String,
        teacher_name: Option<String>,
    },
    MaterialUpdated {
        class_id: String,
        material_id: String,
        title: String,
        signature: String,
    },
    QuestionsAdded {
        class_id: String,
        material_id: String,
        title: String,
        added: u64,
        total: u64,
    },
    AiGraded {
        question: QuestionRef,
        submission_id: String,
        score: f64,
    },
    TeacherReviewed {
        question: QuestionRef,
        submission_id: String,
        revised_score: Option<f64>,
    },
    ProfileRequestReviewed {
        request_id: String,
        request_type: String,
        status: RequestStatus,
        reason: Option<String>,
    },
    JoinRequested {
        class_id: String,
        class_name: String,
        student_name: Option<String>,
    },
    SubmissionsReceived {
        question: QuestionRef,
        added: u64,
        total: u64,
    },
    ProfileRequestSubmitted {
        request_id: String,
        request_type: String,
        requester_name: Option<String>,
    },
}

/// One diff result for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub category: Category,
    /// Entity the fact is about (class, material, submission, request...)
    pub entity_id: String,
    /// State-defining attribute of the fact; part of the notification id
    pub marker: String,
    /// Source timestamp of the fact, when the backend has one
    pub occurred_at: Option<DateTime<Utc>>,
    pub kind: EventKind,
}

impl Event {
    pub fn new(
        category: Category,
        entity_id: impl Into<String>,
        marker: impl Into<String>,
        kind: EventKind,
    ) -> Self {
        Self {
            category,
            entity_id: entity_id.into(),
            marker: marker.into(),
            occurred_at: None,
            kind,
        }
    }

    pub fn at(mut self, occurred_at: Option<DateTime<Utc>>) -> Self {
        self.occurred_at = occurred_at;
        self
    }
}
