//! Engine readiness probe.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Snapshot of the engine's reachability. Never cached.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub running: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub platform: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl EngineStatus {
    pub fn not_running(error: impl Into<String>) -> Self {
        Self {
            running: false,
            error: Some(error.into()),
            ..Self::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct VersionEnvelope {
    result: Option<VersionInfo>,
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VersionInfo {
    version: Option<String>,
    platform: Option<String>,
}

/// HTTP client for the engine's loopback API.
///
/// Proxies are disabled: environment proxy settings must never capture
/// requests meant for 127.0.0.1.
pub fn local_client() -> reqwest::Client {
    reqwest::Client::builder()
        .no_proxy()
        .build()
        .unwrap_or_else(|e| {
            log::warn!("Falling back to default HTTP client: {e}");
            reqwest::Client::new()
        })
}

/// `GET <origin>webui/api/service?method=get_version`. Any failure reads as not running.
pub async fn probe(http: &reqwest::Client, origin: &str, timeout: Duration) -> EngineStatus {
    let url = format!("{origin}webui/api/service?method=get_version");

    let response = match http.get(&url).timeout(timeout).send().await {
        Ok(r) => r,
        Err(e) if e.is_timeout() => return EngineStatus::not_running("status probe timed out"),
        Err(e) if e.is_connect() => return EngineStatus::not_running("engine not reachable"),
        Err(e) => return EngineStatus::not_running(format!("status probe failed: {e}")),
    };

    if !response.status().is_success() {
        return EngineStatus::not_running(format!("status probe returned {}", response.status()));
    }

    match response.json::<VersionEnvelope>().await {
        Ok(VersionEnvelope {
            result:
                Some(VersionInfo {
                    version: Some(version),
                    platform,
                }),
            ..
        }) => EngineStatus {
            running: true,
            version: Some(version),
            platform,
            error: None,
        },
        Ok(envelope) => EngineStatus::not_running(
            envelope
                .error
                .unwrap_or_else(|| "status response carried no version".into()),
        ),
        Err(e) => EngineStatus::not_running(format!("malformed status response: {e}")),
    }
}
