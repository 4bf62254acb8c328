//! Upstream odds provider.
//!
//! Events come back as raw `serde_json::Value` trees. Each listed event gets
//! its pre-match odds document attached under `odds`; events without one are
//! dropped before they reach the tracker.

use crate::error::ProviderError;
use crate::model::Sport;
use async_trait::async_trait;
use chrono::Utc;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde_json::Value;
use std::num::NonZeroU32;
use std::time::Duration;
use tracing::{debug, info, warn};

pub const DEFAULT_BASE_URL: &str = "https://api.b365api.com";

/// How many events to take from a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchLimit {
    Count(usize),
    All,
}

impl FetchLimit {
    /// `"all"` (any case) or a positive count.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s.eq_ignore_ascii_case("all") {
            return Some(FetchLimit::All);
        }
        match s.parse::<usize>() {
            Ok(n) if n > 0 => Some(FetchLimit::Count(n)),
            _ => None,
        }
    }

    pub fn apply<T>(&self, mut items: Vec<T>) -> Vec<T> {
        if let FetchLimit::Count(n) = self {
            items.truncate(*n);
        }
        items
    }
}

#[async_trait]
pub trait OddsProvider: Send + Sync {
    async fn fetch_upcoming(&self, sport: Sport, limit: FetchLimit) -> Result<Vec<Value>, ProviderError>;

    async fn fetch_in_play(&self, sport: Sport, limit: FetchLimit) -> Result<Vec<Value>, ProviderError>;
}

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct B365Client {
    http: reqwest::Client,
    base_url: String,
    token: String,
    rate_limiter: DirectLimiter,
}

impl B365Client {
    pub fn new(
        base_url: &str,
        token: &str,
        timeout: Duration,
        requests_per_minute: NonZeroU32,
    ) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(5)
            .build()?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
            rate_limiter: RateLimiter::direct(Quota::per_minute(requests_per_minute)),
        })
    }

    /// GET `path` and return its `results` list.
    async fn get_results(&self, path: &str, params: &[(&str, String)]) -> Result<Vec<Value>, ProviderError> {
        self.rate_limiter.until_ready().await;

        let url = format!("{}/{}", self.base_url, path);
        let response = self
            .http
            .get(&url)
            .query(&[("token", self.token.as_str())])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body: truncate(&body, 200),
            });
        }

        let doc: Value = serde_json::from_str(&body)
            .map_err(|e| ProviderError::MalformedResponse(format!("{}: {}", path, e)))?;
        results_list(doc).map_err(|reason| ProviderError::MalformedResponse(format!("{}: {}", path, reason)))
    }

    /// Pre-match odds document for one event, or `None` when the provider has none.
    async fn fetch_odds(&self, event_id: &str) -> Result<Option<Value>, ProviderError> {
        let results = self
            .get_results("v3/bet365/prematch", &[("FI", event_id.to_string())])
            .await?;
        Ok(results.into_iter().next().filter(has_content))
    }

    /// Attach odds to each listed event; events without odds are dropped.
    async fn with_odds(&self, sport: Sport, events: Vec<Value>) -> Vec<Value> {
        let listed = events.len();
        let mut out = Vec::with_capacity(listed);

        for mut event in events {
            let Some(id) = crate::payload::event_id(&event) else {
                continue;
            };
            match self.fetch_odds(&id).await {
                Ok(Some(odds)) => {
                    if let Value::Object(map) = &mut event {
                        map.insert("odds".to_string(), odds);
                        out.push(event);
                    }
                }
                Ok(None) => debug!("No odds for {} event {}", sport, id),
                Err(e) => warn!("Failed to fetch odds for {} event {}: {}", sport, id, e),
            }
        }

        debug!("{}: {}/{} events have odds", sport, out.len(), listed);
        out
    }
}

#[async_trait]
impl OddsProvider for B365Client {
    async fn fetch_upcoming(&self, sport: Sport, limit: FetchLimit) -> Result<Vec<Value>, ProviderError> {
        let day = Utc::now().format("%Y%m%d").to_string();
        let events = self
            .get_results(
                "v1/bet365/upcoming",
                &[("sport_id", sport.provider_id().to_string()), ("day", day)],
            )
            .await?;

        let events = self.with_odds(sport, limit.apply(events)).await;
        info!("Fetched {} upcoming {} events", events.len(), sport);
        Ok(events)
    }

    async fn fetch_in_play(&self, sport: Sport, limit: FetchLimit) -> Result<Vec<Value>, ProviderError> {
        let events = self
            .get_results(
                "v1/bet365/inplay_filter",
                &[("sport_id", sport.provider_id().to_string())],
            )
            .await?;

        let events = self.with_odds(sport, limit.apply(events)).await;
        info!("Fetched {} in-play {} events", events.len(), sport);
        Ok(events)
    }
}

/// Pull the `results` array out of a response document.
fn results_list(doc: Value) -> Result<Vec<Value>, String> {
    let Value::Object(mut map) = doc else {
        return Err("response is not an object".to_string());
    };
    match map.remove("results") {
        Some(Value::Array(items)) => Ok(items),
        Some(_) => Err("results is not a list".to_string()),
        None => {
            let error = map
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("no results field");
            Err(error.to_string())
        }
    }
}

fn has_content(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
        _ => true,
    }
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn fetch_limit_parsing() {
        assert_eq!(FetchLimit::parse("all"), Some(FetchLimit::All));
        assert_eq!(FetchLimit::parse(" ALL "), Some(FetchLimit::All));
        assert_eq!(FetchLimit::parse("20"), Some(FetchLimit::Count(20)));
        assert_eq!(FetchLimit::parse("0"), None);
        assert_eq!(FetchLimit::parse("lots"), None);
    }

    #[test]
    fn fetch_limit_truncates() {
        assert_eq!(FetchLimit::Count(2).apply(vec![1, 2, 3]), vec![1, 2]);
        assert_eq!(FetchLimit::All.apply(vec![1, 2, 3]), vec![1, 2, 3]);
    }

    #[test]
    fn results_must_be_a_list() {
        let ok = results_list(json!({"success": 1, "results": [{"id": "1"}]})).unwrap();
        assert_eq!(ok.len(), 1);

        assert!(results_list(json!([1, 2])).is_err());
        assert!(results_list(json!({"results": {"id": "1"}})).is_err());
        assert_eq!(
            results_list(json!({"success": 0, "error": "TOKEN_INVALID"})),
            Err("TOKEN_INVALID".to_string())
        );
    }

    #[test]
    fn empty_odds_documents_are_ignored() {
        assert!(!has_content(&json!(null)));
        assert!(!has_content(&json!([])));
        assert!(!has_content(&json!({})));
        assert!(has_content(&json!({"FI": "1"})));
    }

    #[test]
    fn client_trims_base_url() {
        let client = B365Client::new("https://example.test/", "t", Duration::from_secs(5), NonZeroU32::MIN).unwrap();
        assert_eq!(client.base_url, "https://example.test");
    }
}
