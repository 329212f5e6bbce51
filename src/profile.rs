use std::time::{Duration, Instant};

use anyhow::anyhow;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::debug;

use crate::config::ProfileConfig;
use crate::error::{LibError, Result};
use crate::models::LegacyMemberId;

/// Tokens are refreshed this long before their reported expiry.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::from_secs(60);

/// Client for the external user-profile service, used to resolve a member's
/// external identity to a legacy numeric id. Authenticates with a bearer
/// token obtained through a client-credentials grant and cached until close
/// to expiry.
pub struct ProfileClient {
    http: reqwest::Client,
    config: ProfileConfig,
    token: Mutex<Option<CachedToken>>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExternalProfile {
    external_id: String,
}

impl ProfileClient {
    pub fn new(config: ProfileConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| {
                LibError::external("Failed to build profile service client", anyhow!(err))
            })?;

        Ok(Self {
            http,
            config,
            token: Mutex::new(None),
        })
    }

    /// Resolve an external profile reference to the member's legacy id,
    /// taking the first profile returned for the configured organization.
    pub async fn resolve_member(&self, universal_uid: &str) -> Result<LegacyMemberId> {
        let token = self.machine_token().await?;
        let url = format!(
            "{}/users/{}/externalProfiles",
            self.config.api_url, universal_uid
        );

        debug!(%universal_uid, "resolving member through profile service");
        let response = self
            .http
            .get(&url)
            .query(&[("organizationName", self.config.organization_name.as_str())])
            .bearer_auth(&token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LibError::external(
                "Profile service returned an error",
                anyhow!("profile lookup failed with {}: {}", status, body),
            ));
        }

        let profiles: Vec<ExternalProfile> = response.json().await?;
        let profile = profiles.into_iter().next().ok_or_else(|| {
            LibError::not_found(
                "No external profile found for member",
                anyhow!("profile service returned no profiles for {}", universal_uid),
            )
        })?;

        profile
            .external_id
            .parse::<i64>()
            .map(LegacyMemberId)
            .map_err(|err| {
                LibError::external(
                    "Profile service returned a non-numeric external id",
                    anyhow!("invalid external id {:?}: {}", profile.external_id, err),
                )
            })
    }

    async fn machine_token(&self) -> Result<String> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("requesting machine token");
        let response = self
            .http
            .post(&self.config.auth_url)
            .json(&serde_json::json!({
                "client_id": self.config.client_id,
                "client_secret": self.config.client_secret,
                "audience": self.config.auth_audience,
                "grant_type": "client_credentials",
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LibError::external(
                "Machine token request was rejected",
                anyhow!("token grant failed with {}: {}", status, body),
            ));
        }

        let token: TokenResponse = response.json().await?;
        let lifetime = Duration::from_secs(token.expires_in)
            .saturating_sub(TOKEN_EXPIRY_MARGIN);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + lifetime,
        });

        Ok(token.access_token)
    }
}
