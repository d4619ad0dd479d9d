//! HTTP client for the platform's lobby and table endpoints.
//!
//! All calls ride on one `reqwest` client with a shared cookie store, so the
//! login session established out of band is carried automatically. The
//! platform speaks GET-with-query for every operation and answers either a
//! `{status, data}` JSON body or a plain page.

use reqwest::cookie::Jar;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info};

use arena_core::{DecisionArgs, HistoryPage, TableId, TableInfos};

use crate::error::ClientError;

/// The auth triple the realtime transport appends to every handshake and
/// subscribe request.
#[derive(Debug, Clone)]
pub struct RealtimeCredentials {
    pub user_id: u64,
    pub username: String,
    pub credentials: String,
}

/// Realtime endpoint parameters scraped from a table's game page, plus any
/// decision the platform embedded there for us to answer.
#[derive(Debug, Clone)]
pub struct GamePage {
    pub realtime_url: String,
    pub realtime_path: String,
    pub decision: Option<DecisionArgs>,
}

/// Client for the platform's HTTP API.
pub struct PlatformClient {
    http: reqwest::Client,
    base_url: String,
    realtime: RealtimeCredentials,
}

impl PlatformClient {
    pub fn new(base_url: impl Into<String>, realtime: RealtimeCredentials) -> Self {
        let jar = Arc::new(Jar::default());
        let http = reqwest::Client::builder()
            .cookie_provider(jar)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            realtime,
        }
    }

    /// Query parameters the transport layer appends to handshake and
    /// subscribe calls.
    #[must_use]
    pub fn realtime_query(&self) -> Vec<(String, String)> {
        vec![
            ("user".to_string(), self.realtime.user_id.to_string()),
            ("name".to_string(), self.realtime.username.clone()),
            ("credentials".to_string(), self.realtime.credentials.clone()),
        ]
    }

    #[must_use]
    pub fn user_id(&self) -> u64 {
        self.realtime.user_id
    }

    /// Fetch the current top-level description of one table.
    pub async fn table_infos(&self, table: TableId) -> Result<TableInfos, ClientError> {
        let url = format!("{}/table/table/tableinfos.html", self.base_url);
        let body = self
            .get_json(&url, &[("id", table.to_string())])
            .await?;
        let data = body
            .get("data")
            .cloned()
            .ok_or_else(|| ClientError::UnexpectedPayload("tableinfos without data".to_string()))?;
        serde_json::from_value(data)
            .map_err(|err| ClientError::UnexpectedPayload(format!("tableinfos: {err}")))
    }

    /// Accept an invitation by joining the table.
    pub async fn join_game(&self, table: TableId) -> Result<(), ClientError> {
        let url = format!("{}/table/table/joingame.html", self.base_url);
        self.get_ok(&url, &[("table", table.to_string())]).await?;
        info!(%table, "joined table");
        Ok(())
    }

    /// Confirm readiness once all seats are filled.
    pub async fn accept_start(&self, table: TableId) -> Result<(), ClientError> {
        let url = format!("{}/table/table/acceptGameStart.html", self.base_url);
        self.get_ok(&url, &[("table", table.to_string())]).await?;
        info!(%table, "accepted game start");
        Ok(())
    }

    /// Register a vote on a pending table decision.
    pub async fn decide(
        &self,
        table: TableId,
        decision_type: Option<&str>,
        value: u64,
    ) -> Result<(), ClientError> {
        let url = format!("{}/table/table/decide.html", self.base_url);
        let mut params = vec![
            ("decision", value.to_string()),
            ("table", table.to_string()),
        ];
        if let Some(kind) = decision_type {
            params.push(("src", "menu".to_string()));
            params.push(("type", kind.to_string()));
        }
        self.get_json(&url, &params).await?;
        debug!(%table, decision = value, "decision registered");
        Ok(())
    }

    /// Propose abandoning the game, as when local state went irrecoverably
    /// wrong.
    pub async fn request_abandon(&self, table: TableId) -> Result<(), ClientError> {
        self.decide(table, Some("abandon"), 1).await
    }

    /// Replay the table's past notifications starting after `from`.
    pub async fn notification_history(
        &self,
        gameserver: &str,
        game_name: &str,
        table: TableId,
        from: u64,
    ) -> Result<HistoryPage, ClientError> {
        let url = format!(
            "{}/{}/{}/{}/notificationHistory.html",
            self.base_url, gameserver, game_name, game_name
        );
        let params = [
            ("table", table.to_string()),
            ("from", from.to_string()),
            ("privateinc", "1".to_string()),
            ("history", "1".to_string()),
        ];
        let body = self.get_json(&url, &params).await?;
        serde_json::from_value(body)
            .map_err(|err| ClientError::UnexpectedPayload(format!("notification history: {err}")))
    }

    /// Acknowledge that we have seen it is our turn.
    pub async fn turn_ack(
        &self,
        gameserver: &str,
        game_name: &str,
        table: TableId,
    ) -> Result<(), ClientError> {
        let url = format!(
            "{}/{}/{}/{}/wakeup.html",
            self.base_url, gameserver, game_name, game_name
        );
        self.get_ok(
            &url,
            &[
                ("myturnack", "true".to_string()),
                ("table", table.to_string()),
            ],
        )
        .await
    }

    /// Fetch the table's page on its assigned gameserver and pull out the
    /// realtime endpoint parameters embedded in it.
    pub async fn game_page(
        &self,
        gameserver: &str,
        game_name: &str,
        table: TableId,
    ) -> Result<GamePage, ClientError> {
        let url = format!("{}/{}/{}", self.base_url, gameserver, game_name);
        let response = self
            .http
            .get(&url)
            .query(&[("table", table.to_string())])
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(ClientError::Rejected(format!(
                "game page returned {}",
                response.status()
            )));
        }
        let page = response.text().await?;
        parse_game_page(&page)
    }

    async fn get_ok(&self, url: &str, params: &[(&str, String)]) -> Result<(), ClientError> {
        let response = self.http.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Rejected(format!("{url} returned {status}")));
        }
        Ok(())
    }

    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value, ClientError> {
        let response = self.http.get(url).query(params).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Rejected(format!("{url} returned {status}")));
        }
        let body: Value = response
            .json()
            .await
            .map_err(|err| ClientError::UnexpectedPayload(err.to_string()))?;
        if !status_field_ok(&body) {
            let error = body
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("no error message");
            return Err(ClientError::Rejected(format!("{url}: {error}")));
        }
        Ok(body)
    }
}

impl std::fmt::Debug for PlatformClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlatformClient")
            .field("base_url", &self.base_url)
            .field("user_id", &self.realtime.user_id)
            .finish_non_exhaustive()
    }
}

/// The platform flags failures with `status: 0` (as number, string, or
/// bool). A missing status field counts as success.
fn status_field_ok(body: &Value) -> bool {
    match body.get("status") {
        None => true,
        Some(Value::Null) => false,
        Some(Value::Bool(flag)) => *flag,
        Some(Value::Number(n)) => n.as_u64() != Some(0),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(_) => true,
    }
}

/// Pull the realtime endpoint assignments (and any embedded decision
/// request) out of a game page's inline script.
fn parse_game_page(page: &str) -> Result<GamePage, ClientError> {
    let realtime_url = js_assignment(page, "gs_socketio_url")
        .map(unquote)
        .ok_or_else(|| {
            ClientError::UnexpectedPayload("gs_socketio_url not found in game page".to_string())
        })?;
    let realtime_path = js_assignment(page, "gs_socketio_path")
        .map(unquote)
        .ok_or_else(|| {
            ClientError::UnexpectedPayload("gs_socketio_path not found in game page".to_string())
        })?;

    let decision = match js_assignment(page, "decision") {
        Some(raw) => serde_json::from_str::<DecisionArgs>(raw).ok(),
        None => None,
    };

    Ok(GamePage {
        realtime_url: realtime_url.to_string(),
        realtime_path: realtime_path.to_string(),
        decision,
    })
}

/// Value of an inline `gameui.<name>=<value>;` assignment, if present.
fn js_assignment<'a>(page: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("gameui.{name}=");
    let start = page.find(&needle)? + needle.len();
    let rest = &page[start..];
    let end = rest.find(';')?;
    Some(rest[..end].trim())
}

fn unquote(raw: &str) -> &str {
    raw.trim_matches(|c| c == '\'' || c == '"')
}

#[cfg(test)]
mod tests {
    use super::*;

    const GAME_PAGE: &str = r#"
        <script>
           gameui.gs_socketio_url='https://r1.example.test/3';
           gameui.gs_socketio_path='r';
           gameui.decision={"decision_type":"abandon","decision_taken":"0","players_decision":{}};
        </script>
    "#;

    fn client() -> PlatformClient {
        PlatformClient::new(
            "https://example.test/",
            RealtimeCredentials {
                user_id: 86152093,
                username: "drwrose".to_string(),
                credentials: "4faffebf".to_string(),
            },
        )
    }

    #[test]
    fn test_realtime_query_triple() {
        let query = client().realtime_query();
        assert_eq!(
            query,
            vec![
                ("user".to_string(), "86152093".to_string()),
                ("name".to_string(), "drwrose".to_string()),
                ("credentials".to_string(), "4faffebf".to_string()),
            ]
        );
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = client();
        assert_eq!(client.base_url, "https://example.test");
    }

    #[test]
    fn test_parse_game_page() {
        let page = parse_game_page(GAME_PAGE).unwrap();
        assert_eq!(page.realtime_url, "https://r1.example.test/3");
        assert_eq!(page.realtime_path, "r");
        let decision = page.decision.unwrap();
        assert!(decision.is_pending());
    }

    #[test]
    fn test_parse_game_page_without_endpoint() {
        let err = parse_game_page("<html>maintenance</html>").unwrap_err();
        assert!(matches!(err, ClientError::UnexpectedPayload(_)));
    }

    #[test]
    fn test_parse_game_page_without_decision() {
        let page = "gameui.gs_socketio_url='wss://r2.example.test';\ngameui.gs_socketio_path='r';";
        let parsed = parse_game_page(page).unwrap();
        assert!(parsed.decision.is_none());
    }

    #[test]
    fn test_status_field_truthiness() {
        assert!(status_field_ok(&serde_json::json!({"status": 1})));
        assert!(status_field_ok(&serde_json::json!({"status": "1"})));
        assert!(status_field_ok(&serde_json::json!({"data": []})));
        assert!(!status_field_ok(&serde_json::json!({"status": 0})));
        assert!(!status_field_ok(&serde_json::json!({"status": "0"})));
        assert!(!status_field_ok(&serde_json::json!({"status": false})));
    }
}
