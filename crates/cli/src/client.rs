//! API client for the scale webhook

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use reqwest::{Client, Response};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use url::Url;

pub struct ApiClient {
    client: Client,
    base_url: Url,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .context("Failed to create HTTP client")?;

        // Without the trailing slash `join` would drop the last path segment
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{}/", base_url)
        };
        let base_url = Url::parse(&normalized).context("Invalid webhook URL")?;

        Ok(Self { client, base_url })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// GET, failing on any non-success status
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.send_get(path).await?;
        Self::parse(response).await
    }

    /// GET that also parses error statuses
    ///
    /// Health endpoints answer 503 with a regular body.
    pub async fn get_with_status<T: DeserializeOwned>(&self, path: &str) -> Result<(u16, T)> {
        let response = self.send_get(path).await?;
        let status = response.status().as_u16();
        let body = response.json().await.context("Failed to parse response")?;
        Ok((status, body))
    }

    /// POST a JSON body
    pub async fn post<T: DeserializeOwned, B: Serialize>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.base_url.join(path).context("Invalid path")?;

        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .context("Failed to send request")?;

        Self::parse(response).await
    }

    async fn send_get(&self, path: &str) -> Result<Response> {
        let url = self.base_url.join(path).context("Invalid path")?;
        self.client
            .get(url)
            .send()
            .await
            .context("Failed to send request")
    }

    async fn parse<T: DeserializeOwned>(response: Response) -> Result<T> {
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            anyhow::bail!("API error ({}): {}", status, message);
        }

        response.json().await.context("Failed to parse response")
    }
}

// API types

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceInfo {
    pub status: String,
    pub service: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub components: BTreeMap<String, ComponentReport>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentReport {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub last_check_timestamp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplicaList {
    pub service: String,
    pub count: usize,
    pub instances: Vec<Replica>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Replica {
    pub id: String,
    pub name: String,
    pub image: String,
    pub created: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub mounts: Vec<String>,
}

/// Alertmanager-style batch sent to `POST /alert`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertBatch {
    pub alerts: Vec<Alert>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub status: String,
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertResult {
    pub result: Vec<AlertOutcome>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertOutcome {
    pub alert: Option<String>,
    pub action: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub from: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed: Option<Vec<Removal>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failures: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Removal {
    pub ok: bool,
    pub info: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_keeps_path_prefix() {
        let client = ApiClient::new("http://localhost:5001/scaler").unwrap();
        assert_eq!(
            client.base_url().join("alert").unwrap().as_str(),
            "http://localhost:5001/scaler/alert"
        );
    }

    #[test]
    fn test_invalid_url() {
        assert!(ApiClient::new("not a url").is_err());
    }

    #[tokio::test]
    async fn test_get_replicas() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/replicas")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                r#"{"service": "flask-app", "count": 1, "instances": [
                    {"id": "0123456789abcdef", "name": "flask-app-1", "image": "app:1",
                     "image_id": "sha256:abc", "created": "2024-05-01T10:00:00Z",
                     "labels": {"com.docker.compose.service": "flask-app"}, "mounts": ["/data"]}
                ]}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let list: ReplicaList = client.get("replicas").await.unwrap();

        mock.assert_async().await;
        assert_eq!(list.count, 1);
        assert_eq!(list.instances[0].name, "flask-app-1");
        assert_eq!(list.instances[0].mounts, vec!["/data"]);
    }

    #[tokio::test]
    async fn test_post_alert_bad_payload_message() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/alert")
            .with_status(400)
            .with_body(r#"{"error": "bad payload"}"#)
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let batch = AlertBatch { alerts: Vec::new() };
        let err = client
            .post::<AlertResult, _>("alert", &batch)
            .await
            .unwrap_err();

        assert!(err.to_string().contains("bad payload"));
    }

    #[tokio::test]
    async fn test_health_503_is_parsed() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/healthz")
            .with_status(503)
            .with_body(
                r#"{"status": "unhealthy", "components": {"runtime": {
                    "status": "unhealthy",
                    "message": "socket closed",
                    "last_check_timestamp": 0}}}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let (status, health): (u16, HealthReport) =
            client.get_with_status("healthz").await.unwrap();

        assert_eq!(status, 503);
        assert_eq!(health.components["runtime"].message.as_deref(), Some("socket closed"));
    }

    #[tokio::test]
    async fn test_alert_outcome_fields() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/alert")
            .match_body(mockito::Matcher::PartialJson(serde_json::json!({"alerts": [{
                "status": "firing",
                "labels": {"alertname": "ScaleDownNetworkThroughput"}
            }]})))
            .with_status(200)
            .with_body(
                r#"{"result": [{"alert": "ScaleDownNetworkThroughput", "action": "scaled_down",
                    "from": 3, "to": 2, "removed": [{"ok": true, "info": "flask-app-3"}]}]}"#,
            )
            .create_async()
            .await;

        let client = ApiClient::new(&server.url()).unwrap();
        let batch = AlertBatch {
            alerts: vec![Alert {
                status: "firing".into(),
                labels: BTreeMap::from([(
                    "alertname".to_string(),
                    "ScaleDownNetworkThroughput".to_string(),
                )]),
                annotations: BTreeMap::new(),
            }],
        };
        let result: AlertResult = client.post("alert", &batch).await.unwrap();

        let outcome = &result.result[0];
        assert_eq!(outcome.action, "scaled_down");
        assert_eq!(outcome.removed.as_ref().unwrap()[0].info, "flask-app-3");
    }
}
