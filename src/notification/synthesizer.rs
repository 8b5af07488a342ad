//! Synthesizer - diff events to feed records
//!
//! Pure and deterministic: the same events and `now` always give the same
//! records. Ids come from `notification_id`, never from the caller.

use chrono::{DateTime, Utc};

use super::category::Role;
use super::event::{Event, EventKind, QuestionRef};
use super::record::{notification_id, NotificationRecord};
use crate::source::RequestStatus;

/// Build one record per event. `now` stands in for events without a source
/// timestamp.
pub fn synthesize(role: Role, events: &[Event], now: DateTime<Utc>) -> Vec<NotificationRecord> {
    events.iter().map(|e| synthesize_one(role, e, now)).collect()
}

fn synthesize_one(role: Role, event: &Event, now: DateTime<Utc>) -> NotificationRecord {
    let (title, message, href) = render(role, &event.kind);
    NotificationRecord {
        id: notification_id(event.category, &event.entity_id, &event.marker),
        category: event.category,
        title,
        message,
        created_at: event.occurred_at.unwrap_or(now),
        href,
    }
}

fn render(role: Role, kind: &EventKind) -> (String, String, String) {
    let base = role.as_str();
    match kind {
        EventKind::ApprovedFromPending {
            class_id,
            class_name,
            teacher_name,
        } => (
            "ACC Masuk Kelas".to_string(),
            format!(
                "Permintaan Anda masuk kelas {}{} telah disetujui",
                class_name,
                by_teacher(teacher_name)
            ),
            format!("/{}/classes/{}", base, class_id),
        ),
        EventKind::InvitedDirectly {
            class_id,
            class_name,
            teacher_name,
        } => (
            "Diundang ke Kelas".to_string(),
            format!(
                "Anda ditambahkan ke kelas {}{}",
                class_name,
                by_teacher(teacher_name)
            ),
            format!("/{}/classes/{}", base, class_id),
        ),
        EventKind::MaterialUpdated {
            class_id,
            material_id,
            title,
            ..
        } => (
            "Materi Diperbarui".to_string(),
            format!("Materi \"{}\" telah diperbarui", title),
            material_href(base, class_id, material_id),
        ),
        EventKind::QuestionsAdded {
            class_id,
            material_id,
            title,
            added,
            ..
        } => (
            "Soal Baru".to_string(),
            format!("{} soal baru di materi \"{}\"", added, title),
            material_href(base, class_id, material_id),
        ),
        EventKind::AiGraded {
            question, score, ..
        } => (
            "Penilaian AI Selesai".to_string(),
            format!(
                "Jawaban Anda untuk \"{}\" telah dinilai AI (skor {})",
                question_label(question),
                format_score(*score)
            ),
            question_href(base, question),
        ),
        EventKind::TeacherReviewed {
            question,
            revised_score,
            ..
        } => {
            let message = match revised_score {
                Some(score) => format!(
                    "Guru merevisi nilai jawaban \"{}\" menjadi {}",
                    question_label(question),
                    format_score(*score)
                ),
                None => format!(
                    "Guru memberi umpan balik pada jawaban \"{}\"",
                    question_label(question)
                ),
            };
            ("Nilai Direview Guru".to_string(), message, question_href(base, question))
        }
        EventKind::ProfileRequestReviewed {
            request_type,
            status,
            reason,
            ..
        } => {
            let (title, verb) = match status {
                RequestStatus::Rejected => ("Perubahan Profil Ditolak", "ditolak"),
                _ => ("Perubahan Profil Disetujui", "disetujui"),
            };
            let mut message = format!("Permintaan perubahan {} Anda {}", request_type, verb);
            if let Some(reason) = reason.as_deref().filter(|r| !r.trim().is_empty()) {
                message.push_str(&format!(": {}", reason.trim()));
            }
            (title.to_string(), message, format!("/{}/profile", base))
        }
        EventKind::JoinRequested {
            class_id,
            class_name,
            student_name,
        } => (
            "Permintaan Masuk Kelas".to_string(),
            format!(
                "{} meminta bergabung ke kelas {}",
                student_name.as_deref().unwrap_or("Seorang siswa"),
                class_name
            ),
            format!("/{}/classes/{}/requests", base, class_id),
        ),
        EventKind::SubmissionsReceived {
            question, added, ..
        } => (
            "Jawaban Baru".to_string(),
            format!(
                "{} jawaban baru untuk \"{}\"",
                added,
                question_label(question)
            ),
            format!("{}/submissions", question_href(base, question)),
        ),
        EventKind::ProfileRequestSubmitted {
            request_id,
            request_type,
            requester_name,
        } => (
            "Permintaan Perubahan Profil".to_string(),
            format!(
                "{} mengajukan perubahan {}",
                requester_name.as_deref().unwrap_or("Pengguna"),
                request_type
            ),
            format!("/{}/profile-requests/{}", base, request_id),
        ),
    }
}

fn by_teacher(teacher_name: &Option<String>) -> String {
    teacher_name
        .as_deref()
        .map(|t| format!(" oleh {}", t))
        .unwrap_or_default()
}

fn material_href(base: &str, class_id: &str, material_id: &str) -> String {
    format!("/{}/classes/{}/materials/{}", base, class_id, material_id)
}

fn question_href(base: &str, q: &QuestionRef) -> String {
    format!(
        "{}/questions/{}",
        material_href(base, &q.class_id, &q.material_id),
        q.question_id
    )
}

fn question_label(q: &QuestionRef) -> &str {
    if q.question_title.trim().is_empty() {
        &q.material_title
    } else {
        &q.question_title
    }
}

/// 85.0 -> "85", 85.5 -> "85.5"
fn format_score(score: f64) -> String {
    if score.fract() == 0.0 {
        format!("{:.0}", score)
    } else {
        format!("{:.1}", score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notification::Category;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap()
    }

    fn question() -> QuestionRef {
        QuestionRef {
            class_id: "c1".to_string(),
            material_id: "m1".to_string(),
            material_title: "Aljabar".to_string(),
            question_id: "q1".to_string(),
            question_title: "Soal 1".to_string(),
        }
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let events = vec![Event::new(
            Category::AiGrading,
            "s1",
            "graded",
            EventKind::AiGraded {
                question: question(),
                submission_id: "s1".to_string(),
                score: 85.0,
            },
        )];

        let first = synthesize(Role::Student, &events, now());
        let second = synthesize(Role::Student, &events, now());
        assert_eq!(first, second);
        assert_eq!(first[0].id, "ai_grading:s1:graded");
        assert_eq!(first[0].title, "Penilaian AI Selesai");
        assert!(first[0].message.contains("skor 85"));
        assert_eq!(first[0].href, "/student/classes/c1/materials/m1/questions/q1");
        assert_eq!(first[0].created_at, now());
    }

    #[test]
    fn test_source_timestamp_wins_over_now() {
        let reviewed = Utc.with_ymd_and_hms(2026, 3, 9, 7, 30, 0).unwrap();
        let events = vec![Event::new(
            Category::ProfileRequest,
            "pr-1",
            "rejected",
            EventKind::ProfileRequestReviewed {
                request_id: "pr-1".to_string(),
                request_type: "email".to_string(),
                status: RequestStatus::Rejected,
                reason: Some(" data tidak lengkap ".to_string()),
            },
        )
        .at(Some(reviewed))];

        let records = synthesize(Role::Teacher, &events, now());
        assert_eq!(records[0].created_at, reviewed);
        assert_eq!(records[0].title, "Perubahan Profil Ditolak");
        assert_eq!(
            records[0].message,
            "Permintaan perubahan email Anda ditolak: data tidak lengkap"
        );
        assert_eq!(records[0].href, "/teacher/profile");
    }

    #[test]
    fn test_question_count_message() {
        let events = vec![Event::new(
            Category::NewQuestions,
            "m1",
            "5",
            EventKind::QuestionsAdded {
                class_id: "c1".to_string(),
                material_id: "m1".to_string(),
                title: "Aljabar".to_string(),
                added: 2,
                total: 5,
            },
        )];
        let records = synthesize(Role::Student, &events, now());
        assert_eq!(records[0].id, "new_questions:m1:5");
        assert_eq!(records[0].message, "2 soal baru di materi \"Aljabar\"");
    }

    #[test]
    fn test_format_score() {
        assert_eq!(format_score(90.0), "90");
        assert_eq!(format_score(72.5), "72.5");
    }
}
