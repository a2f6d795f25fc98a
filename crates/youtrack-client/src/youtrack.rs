//! YouTrack REST API client.

use crate::{Issue, TrackerClient, TrackerError, TrackerResult};
use async_trait::async_trait;
use reporter_database::IntegrationConfig;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

const CHECK_SUMMARY: &str = "youtrack-reporter credentials check";
const CHECK_DESCRIPTION: &str =
    "Created to verify the integration can file issues. Deleted right away.";

/// Client configuration.
#[derive(Debug, Clone)]
pub struct YouTrackClientConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for YouTrackClientConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: "youtrack-reporter".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProjectEntry {
    id: String,
    name: String,
}

#[derive(Debug, Deserialize)]
struct IssueEntry {
    id: String,
}

#[derive(Debug, Deserialize)]
struct DescriptionEntry {
    #[serde(default)]
    description: Option<String>,
}

/// YouTrack client shared by every integration.
///
/// The connection pool is shared; url and token come from the config passed
/// to each call.
#[derive(Clone)]
pub struct YouTrackClient {
    http: Client,
}

impl YouTrackClient {
    pub fn new(config: YouTrackClientConfig) -> TrackerResult<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::ACCEPT,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let http = Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()?;

        Ok(Self { http })
    }

    /// Resolve the tracker-side id of `config.project`.
    pub async fn get_project_id(&self, config: &IntegrationConfig) -> TrackerResult<String> {
        let url = endpoint(config, "api/admin/projects")?;
        let request = self
            .http
            .get(url)
            .query(&[("query", config.project.as_str()), ("fields", "id,name")]);

        let projects: Vec<ProjectEntry> = self.send_json(config, request).await?;
        let mut matching = projects.into_iter().filter(|p| p.name == config.project);

        match (matching.next(), matching.next()) {
            (Some(project), None) => {
                debug!(project = %config.project, project_id = %project.id, "Resolved project");
                Ok(project.id)
            }
            (None, _) => Err(TrackerError::ProjectNotFound(config.project.clone())),
            (Some(_), Some(_)) => Err(TrackerError::TooManyProjectsFound(config.project.clone())),
        }
    }

    /// Delete an issue.
    pub async fn delete_issue(&self, config: &IntegrationConfig, issue: &Issue) -> TrackerResult<()> {
        let url = endpoint(config, &format!("api/issues/{}", issue.id))?;
        self.send(config, self.http.delete(url)).await?;
        debug!(issue_id = %issue.id, "Deleted issue");
        Ok(())
    }

    async fn project_id(&self, config: &IntegrationConfig) -> TrackerResult<String> {
        match &config.project_id {
            Some(id) => Ok(id.clone()),
            None => self.get_project_id(config).await,
        }
    }

    async fn send(
        &self,
        config: &IntegrationConfig,
        request: RequestBuilder,
    ) -> TrackerResult<reqwest::Response> {
        let response = request.bearer_auth(config.token.trim()).send().await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(config_id = %config.id, status = status.as_u16(), "Tracker request failed");
            return Err(TrackerError::ResponseStatus(status.as_u16()));
        }
        Ok(response)
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        config: &IntegrationConfig,
        request: RequestBuilder,
    ) -> TrackerResult<T> {
        let body = self.send(config, request).await?.text().await?;
        serde_json::from_str(&body).map_err(|e| TrackerError::ResponseParse(e.to_string()))
    }
}

/// Join `path` onto the config's base URL, tolerating a trailing slash.
fn endpoint(config: &IntegrationConfig, path: &str) -> TrackerResult<Url> {
    let base = config.url.trim_end_matches('/');
    let url = Url::parse(&format!("{base}/{path}"))
        .map_err(|e| TrackerError::InvalidUrl(format!("{}: {e}", config.url)))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(TrackerError::InvalidUrl(config.url.clone()));
    }
    Ok(url)
}

#[async_trait]
impl TrackerClient for YouTrackClient {
    async fn validate_credentials(&self, config: &IntegrationConfig) -> TrackerResult<IntegrationConfig> {
        let project_id = self.get_project_id(config).await?;

        let mut validated = config.clone();
        validated.project_id = Some(project_id);

        // Token may be read-only; filing and removing a check issue proves write access.
        let check = self
            .create_issue(&validated, CHECK_SUMMARY, CHECK_DESCRIPTION)
            .await?;
        self.delete_issue(&validated, &check).await?;

        info!(config_id = %config.id, project = %config.project, "Credentials validated");
        Ok(validated)
    }

    async fn create_issue(
        &self,
        config: &IntegrationConfig,
        summary: &str,
        description: &str,
    ) -> TrackerResult<Issue> {
        let project_id = self.project_id(config).await?;
        let url = endpoint(config, "api/issues")?;
        let request = self
            .http
            .post(url)
            .query(&[("fields", "id")])
            .json(&json!({
                "project": { "id": project_id },
                "summary": summary,
                "description": description,
            }));

        let created: IssueEntry = self.send_json(config, request).await?;
        debug!(config_id = %config.id, issue_id = %created.id, "Created issue");
        Ok(Issue::new(created.id))
    }

    async fn update_issue(
        &self,
        config: &IntegrationConfig,
        issue: &Issue,
        description: &str,
    ) -> TrackerResult<()> {
        let url = endpoint(config, &format!("api/issues/{}", issue.id))?;
        let request = self
            .http
            .post(url)
            .query(&[("fields", "id")])
            .json(&json!({ "description": description }));

        self.send(config, request).await?;
        debug!(config_id = %config.id, issue_id = %issue.id, "Updated issue");
        Ok(())
    }

    async fn get_issue_description(
        &self,
        config: &IntegrationConfig,
        issue: &Issue,
    ) -> TrackerResult<String> {
        let url = endpoint(config, &format!("api/issues/{}", issue.id))?;
        let request = self.http.get(url).query(&[("fields", "description")]);

        let entry: DescriptionEntry = self.send_json(config, request).await?;
        Ok(entry.description.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use httpmock::prelude::*;
    use serde_json::json;

    fn config(base_url: &str) -> IntegrationConfig {
        IntegrationConfig {
            id: "c1".to_string(),
            update_rev: "r1".to_string(),
            url: format!("{base_url}/"),
            token: "x".to_string(),
            project: "P".to_string(),
            project_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn client() -> YouTrackClient {
        YouTrackClient::new(YouTrackClientConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_get_project_id_picks_exact_name() {
        let server = MockServer::start_async().await;
        let projects = server.mock(|when, then| {
            when.method(GET)
                .path("/api/admin/projects")
                .query_param("query", "P")
                .query_param("fields", "id,name")
                .header("authorization", "Bearer x");
            then.status(200).json_body(json!([
                {"id": "0-1", "name": "P2"},
                {"id": "0-2", "name": "P"}
            ]));
        });

        let id = client().get_project_id(&config(&server.base_url())).await.unwrap();
        assert_eq!(id, "0-2");
        projects.assert();
    }

    #[tokio::test]
    async fn test_get_project_id_not_found_and_ambiguous() {
        let server = MockServer::start_async().await;
        let mut cfg = config(&server.base_url());
        server.mock(|when, then| {
            when.method(GET).path("/api/admin/projects").query_param("query", "P");
            then.status(200).json_body(json!([{"id": "0-1", "name": "Other"}]));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/admin/projects").query_param("query", "Dup");
            then.status(200).json_body(json!([
                {"id": "0-1", "name": "Dup"},
                {"id": "0-2", "name": "Dup"}
            ]));
        });

        let err = client().get_project_id(&cfg).await.unwrap_err();
        assert!(matches!(err, TrackerError::ProjectNotFound(ref p) if p == "P"));
        assert_eq!(err.to_string(), "No project \"P\" found");

        cfg.project = "Dup".to_string();
        let err = client().get_project_id(&cfg).await.unwrap_err();
        assert!(matches!(err, TrackerError::TooManyProjectsFound(_)));
    }

    #[tokio::test]
    async fn test_non_200_is_response_status() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/admin/projects");
            then.status(401);
        });

        let err = client().get_project_id(&config(&server.base_url())).await.unwrap_err();
        assert!(matches!(err, TrackerError::ResponseStatus(401)));
        assert_eq!(err.to_string(), "Response status code is 401 - not OK");
    }

    #[tokio::test]
    async fn test_unexpected_body_is_parse_error() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/issues/I-1");
            then.status(200).body("<html>");
        });

        let err = client()
            .get_issue_description(&config(&server.base_url()), &Issue::new("I-1"))
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::ResponseParse(_)));
    }

    #[tokio::test]
    async fn test_create_issue_resolves_project_lazily() {
        let server = MockServer::start_async().await;
        let projects = server.mock(|when, then| {
            when.method(GET).path("/api/admin/projects");
            then.status(200).json_body(json!([{"id": "0-7", "name": "P"}]));
        });
        let create = server.mock(|when, then| {
            when.method(POST)
                .path("/api/issues")
                .header("authorization", "Bearer x")
                .body_includes("\"id\":\"0-7\"")
                .body_includes("\"summary\":\"boom\"");
            then.status(200).json_body(json!({"id": "2-15"}));
        });

        let issue = client()
            .create_issue(&config(&server.base_url()), "boom", "desc")
            .await
            .unwrap();
        assert_eq!(issue, Issue::new("2-15"));
        projects.assert();
        create.assert();
    }

    #[tokio::test]
    async fn test_create_issue_uses_cached_project_id() {
        let server = MockServer::start_async().await;
        let projects = server.mock(|when, then| {
            when.method(GET).path("/api/admin/projects");
            then.status(200).json_body(json!([]));
        });
        server.mock(|when, then| {
            when.method(POST).path("/api/issues").body_includes("\"id\":\"0-9\"");
            then.status(200).json_body(json!({"id": "2-1"}));
        });

        let mut cfg = config(&server.base_url());
        cfg.project_id = Some("0-9".to_string());
        client().create_issue(&cfg, "s", "d").await.unwrap();
        assert_eq!(projects.calls(), 0);
    }

    #[tokio::test]
    async fn test_description_roundtrip() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET)
                .path("/api/issues/I-1")
                .query_param("fields", "description");
            then.status(200).json_body(json!({"description": "*Duplicates*: 0"}));
        });
        server.mock(|when, then| {
            when.method(GET).path("/api/issues/I-2");
            then.status(200).json_body(json!({"description": null}));
        });
        let update = server.mock(|when, then| {
            when.method(POST)
                .path("/api/issues/I-1")
                .body_includes("*Duplicates*: 3");
            then.status(200).json_body(json!({"id": "I-1"}));
        });

        let cfg = config(&server.base_url());
        let c = client();
        assert_eq!(
            c.get_issue_description(&cfg, &Issue::new("I-1")).await.unwrap(),
            "*Duplicates*: 0"
        );
        assert_eq!(c.get_issue_description(&cfg, &Issue::new("I-2")).await.unwrap(), "");
        c.update_issue(&cfg, &Issue::new("I-1"), "*Duplicates*: 3")
            .await
            .unwrap();
        update.assert();
    }

    #[tokio::test]
    async fn test_validate_credentials_files_and_removes_check_issue() {
        let server = MockServer::start_async().await;
        server.mock(|when, then| {
            when.method(GET).path("/api/admin/projects");
            then.status(200).json_body(json!([{"id": "0-3", "name": "P"}]));
        });
        let create = server.mock(|when, then| {
            when.method(POST).path("/api/issues").body_includes("\"id\":\"0-3\"");
            then.status(200).json_body(json!({"id": "2-99"}));
        });
        let delete = server.mock(|when, then| {
            when.method(DELETE).path("/api/issues/2-99");
            then.status(200);
        });

        let cfg = config(&server.base_url());
        let validated = client().validate_credentials(&cfg).await.unwrap();
        assert_eq!(validated.project_id.as_deref(), Some("0-3"));
        assert_eq!(validated.id, cfg.id);
        create.assert();
        delete.assert();
    }

    #[tokio::test]
    async fn test_invalid_url() {
        let mut cfg = config("http://unused");
        cfg.url = "ftp://tracker".to_string();
        let err = client().get_project_id(&cfg).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidUrl(_)));

        cfg.url = "not a url".to_string();
        let err = client().get_project_id(&cfg).await.unwrap_err();
        assert!(matches!(err, TrackerError::InvalidUrl(_)));
    }
}
