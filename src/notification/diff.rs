//! Diff engine - fresh snapshot vs. seen-state, per category
//!
//! Four policies, chosen per category (see `Category::policy`):
//!
//! - transition: pending → approved memberships, baseline-only on the first cycle
//! - signature: update signature vs. the user's acknowledged signature. Polling
//!   never advances an existing acknowledgement, so the event repeats every cycle
//!   until the user opens the item. This category does not clear itself.
//! - count-delta: count growth per parent; the cursor advances in the same step
//! - at-most-once: one event per dedup key, ever
//!
//! Diffing is pure with respect to storage: it reads the current seen-state and
//! returns the updated slots as `staged` writes. The engine commits them only
//! if the whole cycle completes.

use std::collections::{BTreeMap, BTreeSet};

use super::category::{Category, DiffPolicy};
use super::event::{Event, EventKind, QuestionRef};
use crate::source::{ClassMembership, Material, Question, RequestStatus, SnapshotSet, Submission};
use crate::store::{Cursor, SeenState, SeenStore};

/// Result of diffing one category
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryDiff {
    pub category: Category,
    pub events: Vec<Event>,
    /// Slot writes to commit with the cycle; only slots whose state changed
    pub staged: Vec<(String, SeenState)>,
}

/// Seen-state slot of a category
pub fn slot(category: Category) -> String {
    category.as_str().to_string()
}

fn approved_slot(category: Category) -> String {
    format!("{}.approved", category.as_str())
}

fn pending_slot(category: Category) -> String {
    format!("{}.pending", category.as_str())
}

/// Diff one category. `None` when its resource is missing from the snapshot
/// (fetch failed), in which case its seen-state must be left alone.
pub fn diff_category(
    category: Category,
    snapshots: &SnapshotSet,
    seen: &SeenStore,
) -> Option<CategoryDiff> {
    if !snapshots.is_available(category.resource()) {
        return None;
    }

    let diff = match category.policy() {
        DiffPolicy::Transition => diff_transition(category, snapshots, seen)?,
        DiffPolicy::Signature => diff_signature(category, snapshots, seen)?,
        DiffPolicy::CountDelta => diff_count_delta(category, snapshots, seen)?,
        DiffPolicy::AtMostOnce => diff_at_most_once(category, snapshots, seen)?,
    };
    Some(diff)
}

// ==================== per-category extraction ====================

fn diff_transition(
    category: Category,
    snapshots: &SnapshotSet,
    seen: &SeenStore,
) -> Option<CategoryDiff> {
    let memberships = snapshots.memberships.as_ref()?;
    let prior_approved = seen.ids(&approved_slot(category));
    let prior_pending = seen.ids(&pending_slot(category));

    let outcome = transition(
        category,
        prior_approved.as_ref(),
        prior_pending.as_ref(),
        &memberships.approved,
        &memberships.pending,
    );

    let mut staged = Vec::new();
    if prior_approved.as_ref() != Some(&outcome.approved) {
        staged.push((approved_slot(category), SeenState::set(outcome.approved)));
    }
    if prior_pending.as_ref() != Some(&outcome.pending) {
        staged.push((pending_slot(category), SeenState::set(outcome.pending)));
    }
    Some(CategoryDiff {
        category,
        events: outcome.events,
        staged,
    })
}

fn diff_signature(
    category: Category,
    snapshots: &SnapshotSet,
    seen: &SeenStore,
) -> Option<CategoryDiff> {
    let materials = snapshots.materials.as_ref()?;
    let slot = slot(category);
    let prior = seen.cursors(&slot);

    let (events, acked) = signature_changes(
        prior.clone(),
        materials,
        |m| m.id.clone(),
        |m| m.updated_at.clone(),
        |m| {
            Event::new(
                category,
                &m.id,
                &m.updated_at,
                EventKind::MaterialUpdated {
                    class_id: m.class_id.clone(),
                    material_id: m.id.clone(),
                    title: m.title.clone(),
                    signature: m.updated_at.clone(),
                },
            )
            .at(m.updated_time())
        },
    );
    Some(CategoryDiff {
        category,
        events,
        staged: stage_if_changed(slot, prior.map(SeenState::cursors), SeenState::cursors(acked)),
    })
}

fn diff_count_delta(
    category: Category,
    snapshots: &SnapshotSet,
    seen: &SeenStore,
) -> Option<CategoryDiff> {
    let materials = snapshots.materials.as_ref()?;
    let slot = slot(category);
    let prior = seen.cursors(&slot);

    let (events, cursors) = match category {
        Category::NewQuestions => count_delta(
            prior.clone(),
            materials,
            |m| m.id.clone(),
            |m| m.questions.len() as u64,
            |m, added, total| {
                Event::new(
                    category,
                    &m.id,
                    total.to_string(),
                    EventKind::QuestionsAdded {
                        class_id: m.class_id.clone(),
                        material_id: m.id.clone(),
                        title: m.title.clone(),
                        added,
                        total,
                    },
                )
            },
        ),
        Category::NewSubmission => count_delta(
            prior.clone(),
            questions(materials),
            |(_, q)| q.id.clone(),
            |(_, q)| q.submissions.len() as u64,
            |(m, q), added, total| {
                Event::new(
                    category,
                    &q.id,
                    total.to_string(),
                    EventKind::SubmissionsReceived {
                        question: question_ref(m, q),
                        added,
                        total,
                    },
                )
            },
        ),
        _ => return None,
    };
    Some(CategoryDiff {
        category,
        events,
        staged: stage_if_changed(slot, prior.map(SeenState::cursors), SeenState::cursors(cursors)),
    })
}

fn diff_at_most_once(
    category: Category,
    snapshots: &SnapshotSet,
    seen: &SeenStore,
) -> Option<CategoryDiff> {
    let slot = slot(category);
    let prior = seen.ids(&slot);

    let (events, ids) = match category {
        Category::AiGrading => {
            let materials = snapshots.materials.as_ref()?;
            at_most_once(
                prior.clone(),
                submissions(materials),
                |(_, _, s)| s.is_ai_graded().then(|| s.id.clone()),
                |(m, q, s)| {
                    Event::new(
                        category,
                        &s.id,
                        "graded",
                        EventKind::AiGraded {
                            question: question_ref(m, q),
                            submission_id: s.id.clone(),
                            score: s.ai_score.unwrap_or_default(),
                        },
                    )
                },
            )
        }
        Category::TeacherReview => {
            let materials = snapshots.materials.as_ref()?;
            at_most_once(
                prior.clone(),
                submissions(materials),
                |(_, _, s)| s.is_teacher_reviewed().then(|| s.id.clone()),
                |(m, q, s)| {
                    Event::new(
                        category,
                        &s.id,
                        "reviewed",
                        EventKind::TeacherReviewed {
                            question: question_ref(m, q),
                            submission_id: s.id.clone(),
                            revised_score: s.revised_score,
                        },
                    )
                    .at(s.reviewed_at)
                },
            )
        }
        Category::ProfileRequest => {
            let requests = snapshots.profile_requests.as_ref()?;
            at_most_once(
                prior.clone(),
                requests,
                |r| {
                    r.status
                        .is_reviewed()
                        .then(|| format!("{}:{}", r.id, r.status.as_str()))
                },
                |r| {
                    Event::new(
                        category,
                        &r.id,
                        r.status.as_str(),
                        EventKind::ProfileRequestReviewed {
                            request_id: r.id.clone(),
                            request_type: r.request_type.clone(),
                            status: r.status.clone(),
                            reason: r.reason.clone(),
                        },
                    )
                    .at(r.reviewed_at.or(Some(r.created_at)))
                },
            )
        }
        Category::IncomingProfileRequest => {
            let requests = snapshots.profile_requests.as_ref()?;
            at_most_once(
                prior.clone(),
                requests,
                |r| (r.status == RequestStatus::Pending).then(|| r.id.clone()),
                |r| {
                    Event::new(
                        category,
                        &r.id,
                        "pending",
                        EventKind::ProfileRequestSubmitted {
                            request_id: r.id.clone(),
                            request_type: r.request_type.clone(),
                            requester_name: r.requester_name.clone(),
                        },
                    )
                    .at(Some(r.created_at))
                },
            )
        }
        Category::JoinRequest => {
            let memberships = snapshots.memberships.as_ref()?;
            at_most_once(
                prior.clone(),
                &memberships.pending,
                |m: &&ClassMembership| Some(join_key(m)),
                |m| {
                    Event::new(
                        category,
                        join_key(m),
                        "pending",
                        EventKind::JoinRequested {
                            class_id: m.class_id.clone(),
                            class_name: m.class_name.clone(),
                            student_name: m.student_name.clone(),
                        },
                    )
                },
            )
        }
        _ => return None,
    };
    Some(CategoryDiff {
        category,
        events,
        staged: stage_if_changed(slot, prior.map(SeenState::set), SeenState::set(ids)),
    })
}

fn stage_if_changed(
    slot: String,
    prior: Option<SeenState>,
    next: SeenState,
) -> Vec<(String, SeenState)> {
    if prior.as_ref() == Some(&next) {
        Vec::new()
    } else {
        vec![(slot, next)]
    }
}

fn join_key(m: &ClassMembership) -> String {
    format!("{}/{}", m.class_id, m.requester_key().unwrap_or("unknown"))
}

fn questions(materials: &[Material]) -> impl Iterator<Item = (&Material, &Question)> {
    materials
        .iter()
        .flat_map(|m| m.questions.iter().map(move |q| (m, q)))
}

fn submissions(
    materials: &[Material],
) -> impl Iterator<Item = (&Material, &Question, &Submission)> {
    questions(materials).flat_map(|(m, q)| q.submissions.iter().map(move |s| (m, q, s)))
}

fn question_ref(m: &Material, q: &Question) -> QuestionRef {
    QuestionRef {
        class_id: m.class_id.clone(),
        material_id: m.id.clone(),
        material_title: m.title.clone(),
        question_id: q.id.clone(),
        question_title: q.title.clone(),
    }
}

// ==================== policies ====================

/// Outcome of the transition policy
#[derive(Debug, Clone, PartialEq)]
pub struct TransitionOutcome {
    pub events: Vec<Event>,
    pub approved: BTreeSet<String>,
    pub pending: BTreeSet<String>,
}

/// Classify approved memberships against the previously recorded sets.
///
/// `prior_approved == None` means no baseline was ever recorded: the cycle only
/// records one. A class counts as approved-from-pending only if it was in the
/// pending set recorded on an earlier cycle.
pub fn transition(
    category: Category,
    prior_approved: Option<&BTreeSet<String>>,
    prior_pending: Option<&BTreeSet<String>>,
    approved_now: &[ClassMembership],
    pending_now: &[ClassMembership],
) -> TransitionOutcome {
    let prior_pending = prior_pending.cloned().unwrap_or_default();
    let mut pending = prior_pending.clone();
    pending.extend(pending_now.iter().map(|m| m.class_id.clone()));

    let Some(prior_approved) = prior_approved else {
        return TransitionOutcome {
            events: Vec::new(),
            approved: approved_now.iter().map(|m| m.class_id.clone()).collect(),
            pending,
        };
    };

    let mut approved = prior_approved.clone();
    let mut events = Vec::new();
    for m in approved_now {
        if !approved.insert(m.class_id.clone()) {
            continue;
        }
        let (marker, kind) = if prior_pending.contains(&m.class_id) {
            (
                "approved",
                EventKind::ApprovedFromPending {
                    class_id: m.class_id.clone(),
                    class_name: m.class_name.clone(),
                    teacher_name: m.teacher_name.clone(),
                },
            )
        } else {
            (
                "invited",
                EventKind::InvitedDirectly {
                    class_id: m.class_id.clone(),
                    class_name: m.class_name.clone(),
                    teacher_name: m.teacher_name.clone(),
                },
            )
        };
        events.push(Event::new(category, &m.class_id, marker, kind));
    }

    TransitionOutcome {
        events,
        approved,
        pending,
    }
}

/// Signature policy. Emits for every item whose signature differs from the
/// acknowledged one; items with no acknowledgement are seeded silently. An
/// existing acknowledgement is never changed here.
pub fn signature_changes<T>(
    acked: Option<BTreeMap<String, Cursor>>,
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> String,
    signature: impl Fn(&T) -> String,
    make: impl Fn(&T) -> Event,
) -> (Vec<Event>, BTreeMap<String, Cursor>) {
    let mut acked = acked.unwrap_or_default();
    let mut events = Vec::new();
    for item in items {
        let id = key(&item);
        let current = signature(&item);
        match acked.get(&id).and_then(Cursor::signature) {
            Some(known) if known == current => {}
            Some(_) => events.push(make(&item)),
            None => {
                acked.insert(id, Cursor::Signature(current));
            }
        }
    }
    (events, acked)
}

/// Count-delta policy. `cursors == None` records a baseline without events.
/// Cursors only move up.
pub fn count_delta<T>(
    cursors: Option<BTreeMap<String, Cursor>>,
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> String,
    count: impl Fn(&T) -> u64,
    make: impl Fn(&T, u64, u64) -> Event,
) -> (Vec<Event>, BTreeMap<String, Cursor>) {
    let cold_start = cursors.is_none();
    let mut cursors = cursors.unwrap_or_default();
    let mut events = Vec::new();
    for item in items {
        let id = key(&item);
        let current = count(&item);
        let previous = cursors.get(&id).and_then(Cursor::count).unwrap_or(0);
        if !cold_start && current > previous {
            events.push(make(&item, current - previous, current));
        }
        cursors.insert(id, Cursor::Count(previous.max(current)));
    }
    (events, cursors)
}

/// At-most-once policy. `key` returns the dedup key when the triggering
/// condition holds.
pub fn at_most_once<T>(
    notified: Option<BTreeSet<String>>,
    items: impl IntoIterator<Item = T>,
    key: impl Fn(&T) -> Option<String>,
    make: impl Fn(&T) -> Event,
) -> (Vec<Event>, BTreeSet<String>) {
    let mut notified = notified.unwrap_or_default();
    let mut events = Vec::new();
    for item in items {
        if let Some(k) = key(&item) {
            if notified.insert(k) {
                events.push(make(&item));
            }
        }
    }
    (events, notified)
}
