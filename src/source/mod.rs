//! Resource snapshot fetchers
//!
//! One fetch unit per backend resource. Fetchers do I/O only; diffing happens in
//! `notification::diff` against the immutable `SnapshotSet` they produce.

pub mod fixture;
pub mod http;
pub mod types;

use async_trait::async_trait;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::error::FetchError;
use crate::notification::Role;

pub use fixture::FixtureBackend;
pub use http::HttpBackend;
pub use types::{ClassMembership, Material, ProfileRequest, Question, RequestStatus, Submission};

/// Backend fetch unit, shared by every category that reads it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    ProfileRequests,
    Memberships,
    Materials,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::ProfileRequests => "profile_requests",
            Resource::Memberships => "memberships",
            Resource::Materials => "materials",
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role-scoped REST contract the engine reads from
#[async_trait]
pub trait LmsBackend: Send + Sync {
    /// Profile-change requests, optionally filtered by status
    async fn profile_requests(
        &self,
        status: Option<&RequestStatus>,
    ) -> Result<Vec<ProfileRequest>, FetchError>;

    /// Current (approved) class memberships
    async fn memberships(&self) -> Result<Vec<ClassMembership>, FetchError>;

    /// Memberships awaiting approval
    async fn pending_memberships(&self) -> Result<Vec<ClassMembership>, FetchError>;

    /// Materials of one class, with nested questions and submissions
    async fn materials(&self, class_id: &str) -> Result<Vec<Material>, FetchError>;
}

/// Approved and pending memberships fetched together
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MembershipSnapshot {
    pub approved: Vec<ClassMembership>,
    pub pending: Vec<ClassMembership>,
}

/// Everything one cycle fetched. `None` means the resource was not requested or
/// failed; failures are listed in `failures`.
#[derive(Debug, Clone, Default)]
pub struct SnapshotSet {
    pub profile_requests: Option<Vec<ProfileRequest>>,
    pub memberships: Option<MembershipSnapshot>,
    pub materials: Option<Vec<Material>>,
    pub failures: BTreeMap<Resource, FetchError>,
}

impl SnapshotSet {
    pub fn is_available(&self, resource: Resource) -> bool {
        match resource {
            Resource::ProfileRequests => self.profile_requests.is_some(),
            Resource::Memberships => self.memberships.is_some(),
            Resource::Materials => self.materials.is_some(),
        }
    }
}

enum Fetched {
    ProfileRequests(Vec<ProfileRequest>),
    Memberships(MembershipSnapshot),
    Materials(Vec<Material>),
}

/// Fetch the requested resources concurrently, each bounded by `timeout`.
///
/// Never fails as a whole: a resource that errors or times out is recorded in
/// `SnapshotSet::failures` and left `None`.
pub async fn fetch_snapshots(
    backend: &dyn LmsBackend,
    role: Role,
    resources: &BTreeSet<Resource>,
    timeout: Duration,
) -> SnapshotSet {
    let tasks = resources.iter().map(|&resource| async move {
        let result = match tokio::time::timeout(timeout, fetch_resource(backend, role, resource)).await
        {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(timeout.as_millis() as u64)),
        };
        (resource, result)
    });

    let mut set = SnapshotSet::default();
    for (resource, result) in join_all(tasks).await {
        match result {
            Ok(Fetched::ProfileRequests(records)) => {
                debug!(resource = %resource, count = records.len(), "Fetched snapshot");
                set.profile_requests = Some(records);
            }
            Ok(Fetched::Memberships(snapshot)) => {
                debug!(
                    resource = %resource,
                    approved = snapshot.approved.len(),
                    pending = snapshot.pending.len(),
                    "Fetched snapshot"
                );
                set.memberships = Some(snapshot);
            }
            Ok(Fetched::Materials(materials)) => {
                debug!(resource = %resource, count = materials.len(), "Fetched snapshot");
                set.materials = Some(materials);
            }
            Err(e) => {
                warn!(resource = %resource, error = %e, "Fetch failed, skipping this cycle");
                set.failures.insert(resource, e);
            }
        }
    }
    set
}

async fn fetch_resource(
    backend: &dyn LmsBackend,
    role: Role,
    resource: Resource,
) -> Result<Fetched, FetchError> {
    match resource {
        Resource::ProfileRequests => {
            // Superadmins review the pending queue; everyone else watches their own requests
            let filter = match role {
                Role::Superadmin => Some(RequestStatus::Pending),
                Role::Student | Role::Teacher => None,
            };
            let records = backend.profile_requests(filter.as_ref()).await?;
            Ok(Fetched::ProfileRequests(records))
        }
        Resource::Memberships => {
            let (approved, pending) =
                futures::try_join!(backend.memberships(), backend.pending_memberships())?;
            Ok(Fetched::Memberships(MembershipSnapshot { approved, pending }))
        }
        Resource::Materials => {
            let classes = backend.memberships().await?;
            let per_class = join_all(classes.iter().map(|c| backend.materials(&c.class_id))).await;
            let mut materials = Vec::new();
            for result in per_class {
                materials.extend(result?);
            }
            Ok(Fetched::Materials(materials))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SlowMaterials {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LmsBackend for SlowMaterials {
        async fn profile_requests(
            &self,
            status: Option<&RequestStatus>,
        ) -> Result<Vec<ProfileRequest>, FetchError> {
            assert_eq!(status, Some(&RequestStatus::Pending));
            Err(FetchError::Http {
                status: 500,
                url: "profile-requests".to_string(),
            })
        }

        async fn memberships(&self) -> Result<Vec<ClassMembership>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![ClassMembership {
                class_id: "c1".to_string(),
                class_name: "Kelas A".to_string(),
                teacher_name: None,
                student_id: None,
                student_name: None,
            }])
        }

        async fn pending_memberships(&self) -> Result<Vec<ClassMembership>, FetchError> {
            Ok(Vec::new())
        }

        async fn materials(&self, _class_id: &str) -> Result<Vec<Material>, FetchError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_failures_and_timeouts_are_per_resource() {
        let backend = SlowMaterials {
            calls: AtomicUsize::new(0),
        };
        let resources: BTreeSet<Resource> = [
            Resource::ProfileRequests,
            Resource::Memberships,
            Resource::Materials,
        ]
        .into_iter()
        .collect();

        let set = fetch_snapshots(&backend, Role::Superadmin, &resources, Duration::from_millis(50)).await;

        assert!(set.is_available(Resource::Memberships));
        assert!(!set.is_available(Resource::ProfileRequests));
        assert!(!set.is_available(Resource::Materials));
        assert_eq!(set.failures.get(&Resource::Materials), Some(&FetchError::Timeout(50)));
        assert!(matches!(
            set.failures.get(&Resource::ProfileRequests),
            Some(FetchError::Http { status: 500, .. })
        ));
        // memberships are listed for both the membership and material resources
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unrequested_resources_stay_empty() {
        let backend = SlowMaterials {
            calls: AtomicUsize::new(0),
        };
        let resources: BTreeSet<Resource> = [Resource::Memberships].into_iter().collect();

        let set = fetch_snapshots(&backend, Role::Student, &resources, Duration::from_secs(1)).await;

        assert!(set.memberships.is_some());
        assert!(set.profile_requests.is_none());
        assert!(set.failures.is_empty());
    }
}
