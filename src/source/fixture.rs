//! File-backed backend for offline runs and tests
//!
//! The fixture is re-read on every call, so editing the file between cycles
//! behaves like the backend changing underneath the poller.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use super::types::{ClassMembership, Material, ProfileRequest, RequestStatus};
use super::{LmsBackend, Resource};
use crate::error::FetchError;

/// Snapshot of every resource, as stored in a fixture file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Fixture {
    pub profile_requests: Vec<ProfileRequest>,
    pub memberships: Vec<ClassMembership>,
    pub pending_memberships: Vec<ClassMembership>,
    /// Materials of every class; filtered by `classId` on read
    pub materials: Vec<Material>,
    /// Resources that should fail with `FetchError::Unavailable`
    pub fail: Vec<Resource>,
}

impl Fixture {
    /// Write the fixture as pretty JSON
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

pub struct FixtureBackend {
    path: PathBuf,
}

impl FixtureBackend {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self, resource: Resource) -> Result<Fixture, FetchError> {
        let content = fs::read_to_string(&self.path)
            .map_err(|e| FetchError::Transport(format!("{}: {}", self.path.display(), e)))?;
        let fixture: Fixture =
            serde_json::from_str(&content).map_err(|e| FetchError::Decode(e.to_string()))?;
        if fixture.fail.contains(&resource) {
            return Err(FetchError::Unavailable(resource.to_string()));
        }
        Ok(fixture)
    }
}

#[async_trait]
impl LmsBackend for FixtureBackend {
    async fn profile_requests(
        &self,
        status: Option<&RequestStatus>,
    ) -> Result<Vec<ProfileRequest>, FetchError> {
        let fixture = self.load(Resource::ProfileRequests)?;
        Ok(fixture
            .profile_requests
            .into_iter()
            .filter(|r| status.map_or(true, |s| &r.status == s))
            .collect())
    }

    async fn memberships(&self) -> Result<Vec<ClassMembership>, FetchError> {
        Ok(self.load(Resource::Memberships)?.memberships)
    }

    async fn pending_memberships(&self) -> Result<Vec<ClassMembership>, FetchError> {
        Ok(self.load(Resource::Memberships)?.pending_memberships)
    }

    async fn materials(&self, class_id: &str) -> Result<Vec<Material>, FetchError> {
        let fixture = self.load(Resource::Materials)?;
        Ok(fixture
            .materials
            .into_iter()
            .filter(|m| m.class_id == class_id)
            .collect())
    }
}
