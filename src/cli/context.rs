//! Shared CLI options and engine construction

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use clap::Args;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

use crate::config::Config;
use crate::error::FetchError;
use crate::notification::{NotificationEngine, Role};
use crate::source::{
    ClassMembership, FixtureBackend, HttpBackend, LmsBackend, Material, ProfileRequest,
    RequestStatus,
};
use crate::store::FileStore;

/// Connection and identity flags, shared by every command
#[derive(Args, Debug, Clone, Default)]
pub struct ConnectArgs {
    /// Backend origin (overrides LMS_NOTIFY_BASE_URL)
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// Bearer token (overrides LMS_NOTIFY_TOKEN)
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// User the local state belongs to
    #[arg(long, short, global = true)]
    pub user: Option<String>,

    /// student, teacher or superadmin
    #[arg(long, short, global = true)]
    pub role: Option<Role>,

    /// Directory for persisted state
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Read the backend from a JSON fixture file instead of HTTP
    #[arg(long, global = true)]
    pub fixture: Option<PathBuf>,
}

impl ConnectArgs {
    /// Flags win over the loaded config
    pub fn apply(&self, config: &mut Config) {
        if let Some(v) = &self.base_url {
            config.base_url = Some(v.clone());
        }
        if let Some(v) = &self.token {
            config.token = Some(v.clone());
        }
        if let Some(v) = &self.user {
            config.user = Some(v.clone());
        }
        if let Some(v) = self.role {
            config.role = Some(v);
        }
        if let Some(v) = &self.data_dir {
            config.data_dir = Some(v.clone());
        }
    }
}

/// Everything a command needs
pub struct Context {
    pub config: Config,
    pub backend: Arc<dyn LmsBackend>,
    pub engine: Arc<NotificationEngine>,
    online: bool,
}

impl Context {
    pub fn build(args: &ConnectArgs) -> Result<Self> {
        let mut config = Config::auto_load()?;
        args.apply(&mut config);

        let user = config.user()?.to_string();
        let role = config.role()?;
        let engine_config = config.engine();

        let backend: Arc<dyn LmsBackend> = match &args.fixture {
            Some(path) => {
                debug!(path = %path.display(), "Using fixture backend");
                Arc::new(FixtureBackend::new(path.clone()))
            }
            None => match config.base_url.as_deref() {
                Some(base_url) => Arc::new(HttpBackend::new(
                    base_url,
                    role,
                    config.token.clone(),
                    engine_config.fetch_timeout,
                )?),
                // local-only commands (feed, read, prefs, reset) still work
                None => Arc::new(Unconfigured),
            },
        };
        let online = args.fixture.is_some() || config.base_url.is_some();

        let store = FileStore::open(config.data_dir())?;
        debug!(dir = %store.dir().display(), user = %user, role = %role, "Opened state store");

        let engine = Arc::new(NotificationEngine::new(
            backend.clone(),
            Arc::new(store),
            &user,
            role,
            engine_config,
        ));
        Ok(Self {
            config,
            backend,
            engine,
            online,
        })
    }

    /// Fail early for commands that must reach the backend
    pub fn require_backend(&self) -> Result<()> {
        if self.online {
            Ok(())
        } else {
            Err(anyhow!(
                "no backend configured (set LMS_NOTIFY_BASE_URL, --base-url or --fixture)"
            ))
        }
    }
}

/// Backend placeholder when neither a URL nor a fixture is configured
struct Unconfigured;

#[async_trait]
impl LmsBackend for Unconfigured {
    async fn profile_requests(
        &self,
        _status: Option<&RequestStatus>,
    ) -> Result<Vec<ProfileRequest>, FetchError> {
        Err(FetchError::Unavailable("no backend configured".to_string()))
    }

    async fn memberships(&self) -> Result<Vec<ClassMembership>, FetchError> {
        Err(FetchError::Unavailable("no backend configured".to_string()))
    }

    async fn pending_memberships(&self) -> Result<Vec<ClassMembership>, FetchError> {
        Err(FetchError::Unavailable("no backend configured".to_string()))
    }

    async fn materials(&self, _class_id: &str) -> Result<Vec<Material>, FetchError> {
        Err(FetchError::Unavailable("no backend configured".to_string()))
    }
}

/// Current update signature of a material, looked up through the backend
pub async fn material_signature(backend: &dyn LmsBackend, material_id: &str) -> Result<String> {
    for class in backend.memberships().await? {
        let materials = backend.materials(&class.class_id).await?;
        if let Some(material) = materials.into_iter().find(|m| m.id == material_id) {
            return Ok(material.updated_at);
        }
    }
    Err(anyhow!("material {} not found in any of your classes", material_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixture::Fixture;
    use tempfile::TempDir;

    #[test]
    fn test_flags_override_config() {
        let mut config = Config {
            user: Some("from-file".to_string()),
            ..Config::default()
        };
        let args = ConnectArgs {
            user: Some("from-flag".to_string()),
            role: Some(Role::Superadmin),
            ..ConnectArgs::default()
        };
        args.apply(&mut config);
        assert_eq!(config.user().unwrap(), "from-flag");
        assert_eq!(config.role().unwrap(), Role::Superadmin);
    }

    #[tokio::test]
    async fn test_material_signature_lookup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("lms.json");
        Fixture {
            memberships: vec![ClassMembership {
                class_id: "c1".to_string(),
                class_name: "Kelas A".to_string(),
                teacher_name: None,
                student_id: None,
                student_name: None,
            }],
            materials: vec![Material {
                id: "m1".to_string(),
                class_id: "c1".to_string(),
                title: "Aljabar".to_string(),
                updated_at: "v7".to_string(),
                questions: Vec::new(),
            }],
            ..Fixture::default()
        }
        .save(&path)
        .unwrap();

        let backend = FixtureBackend::new(path);
        assert_eq!(material_signature(&backend, "m1").await.unwrap(), "v7");
        assert!(material_signature(&backend, "m9").await.is_err());
    }
}
