//! REST backend over reqwest
//!
//! Paths are role-scoped: `{base}/api/{role}/...`. Lists may come back bare or
//! wrapped in `{"data": [...]}`.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::types::{ClassMembership, Material, ProfileRequest, RequestStatus};
use super::LmsBackend;
use crate::error::FetchError;
use crate::notification::Role;

/// List body as the backend sends it
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ListBody<T> {
    Bare(Vec<T>),
    Wrapped { data: Vec<T> },
}

impl<T> ListBody<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            ListBody::Bare(items) => items,
            ListBody::Wrapped { data } => data,
        }
    }
}

/// HTTP client for one user's role-scoped view of the backend
pub struct HttpBackend {
    client: Client,
    base_url: Url,
    role: Role,
    token: Option<String>,
}

impl HttpBackend {
    pub fn new(base_url: &str, role: Role, token: Option<String>, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| anyhow::anyhow!("invalid base url {}: {}", base_url, e))?;
        if base_url.cannot_be_a_base() {
            return Err(anyhow::anyhow!("base url cannot be used as a base: {}", base_url));
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url,
            role,
            token: token.filter(|t| !t.is_empty()),
        })
    }

    /// `{base}/api/{role}/{segments...}` with each segment percent-encoded
    fn endpoint(&self, segments: &[&str]) -> Result<Url, FetchError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| FetchError::Unavailable(format!("bad base url {}", self.base_url)))?
            .pop_if_empty()
            .push("api")
            .push(self.role.as_str())
            .extend(segments);
        Ok(url)
    }

    async fn get_list<T: DeserializeOwned>(
        &self,
        url: Url,
        query: &[(&str, &str)],
    ) -> Result<Vec<T>, FetchError> {
        let mut request = self.client.get(url.clone()).query(query);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Http {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let body = response.text().await?;
        debug!(url = %url, bytes = body.len(), "GET ok");
        decode_list(&body)
    }
}

fn decode_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>, FetchError> {
    serde_json::from_str::<ListBody<T>>(body)
        .map(ListBody::into_vec)
        .map_err(|e| FetchError::Decode(e.to_string()))
}

#[async_trait]
impl LmsBackend for HttpBackend {
    async fn profile_requests(
        &self,
        status: Option<&RequestStatus>,
    ) -> Result<Vec<ProfileRequest>, FetchError> {
        let url = self.endpoint(&["profile-requests"])?;
        match status {
            Some(status) => self.get_list(url, &[("status", status.as_str())]).await,
            None => self.get_list(url, &[]).await,
        }
    }

    async fn memberships(&self) -> Result<Vec<ClassMembership>, FetchError> {
        let url = self.endpoint(&["classes"])?;
        self.get_list(url, &[]).await
    }

    async fn pending_memberships(&self) -> Result<Vec<ClassMembership>, FetchError> {
        let url = self.endpoint(&["classes", "pending"])?;
        self.get_list(url, &[]).await
    }

    async fn materials(&self, class_id: &str) -> Result<Vec<Material>, FetchError> {
        let url = self.endpoint(&["classes", class_id, "materials"])?;
        self.get_list(url, &[]).await
    }
}
