use reqwest::StatusCode;
use reqwest::blocking::{Client, Response};
use reqwest::header::RETRY_AFTER;
use saldo_core::model::{Budget, FinancialGoal, Investment, MonthRecord, Subscription};
use saldo_core::{SaldoError, SaldoResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

const CLIENT_ID: &str = "saldo-cli";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MONTHS_CACHE_TTL: Duration = Duration::from_secs(2);

/// External token capability. The API client never owns credentials; it
/// reads the current tokens per request and writes back refreshed ones.
pub trait TokenSource: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    fn store_tokens(&self, access: &str, refresh: &str) -> SaldoResult<()>;
    fn clear_tokens(&self) -> SaldoResult<()>;
}

/// Cross-cutting notification raised on HTTP 429 so the caller can react
/// without the client knowing anything about presentation.
#[derive(Debug, Clone, Serialize)]
pub struct RateLimitEvent {
    pub path: String,
    pub status: u16,
    pub retry_after: Option<u64>,
}

pub type RateLimitHook = Box<dyn Fn(&RateLimitEvent) + Send + Sync>;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub nickname: Option<String>,
    #[serde(default)]
    pub plan: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    refresh_token: String,
}

#[derive(Debug, Default)]
struct MonthsCache {
    months: Option<Vec<MonthRecord>>,
    fetched_at: Option<Instant>,
}

pub struct FinanceApi {
    base_url: String,
    auth_url: String,
    client: Client,
    tokens: Arc<dyn TokenSource>,
    months_cache: Mutex<MonthsCache>,
    rate_limit_hook: Option<RateLimitHook>,
}

// Manual impl: the token source and rate-limit hook are trait objects, and
// token material has no business in debug output anyway.
impl fmt::Debug for FinanceApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FinanceApi")
            .field("base_url", &self.base_url)
            .field("auth_url", &self.auth_url)
            .finish_non_exhaustive()
    }
}

impl FinanceApi {
    pub fn new(
        base_url: &str,
        auth_url: &str,
        tokens: Arc<dyn TokenSource>,
    ) -> SaldoResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(SaldoError::usage("server URL cannot be empty"));
        }

        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("saldo-cli/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|err| SaldoError::io(format!("failed to construct API client: {err}")))?;

        Ok(Self {
            base_url,
            auth_url: auth_url.trim_end_matches('/').to_string(),
            client,
            tokens,
            months_cache: Mutex::new(MonthsCache::default()),
            rate_limit_hook: None,
        })
    }

    pub fn with_rate_limit_hook(mut self, hook: RateLimitHook) -> Self {
        self.rate_limit_hook = Some(hook);
        self
    }

    /// Health probe. Any failure (transport, timeout, non-2xx) is offline;
    /// this never returns an error.
    pub fn ping(&self) -> bool {
        match self.client.get(self.url("/health")).send() {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    /// Looks up the authenticated user. Missing token or any request
    /// failure reads as "no session" rather than an error.
    pub fn current_user(&self) -> Option<UserProfile> {
        self.tokens.access_token()?;
        match self.request(reqwest::Method::GET, "/check/auth", None) {
            Ok(response) => parse_json(response).ok(),
            Err(_) => None,
        }
    }

    /// Lists all months. Results are cached for a short window and the
    /// fetch happens under the cache lock, so concurrent callers share one
    /// outstanding request instead of stampeding the backend.
    pub fn list_months(&self) -> SaldoResult<Vec<MonthRecord>> {
        let mut cache = self
            .months_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(fetched_at) = cache.fetched_at
            && fetched_at.elapsed() < MONTHS_CACHE_TTL
            && let Some(months) = &cache.months
        {
            return Ok(months.clone());
        }

        let response = self.request(reqwest::Method::GET, "/months", None)?;
        let months: Vec<MonthRecord> = parse_json(response)?;
        cache.months = Some(months.clone());
        cache.fetched_at = Some(Instant::now());
        Ok(months)
    }

    pub fn get_month(&self, month_key: &str) -> SaldoResult<MonthRecord> {
        let response = self.request(reqwest::Method::GET, &format!("/month/{month_key}"), None)?;
        parse_json(response)
    }

    pub fn create_month(&self, record: &MonthRecord) -> SaldoResult<()> {
        self.invalidate_months_cache();
        let body = to_body(record)?;
        self.request(reqwest::Method::POST, "/months", Some(body))?;
        Ok(())
    }

    pub fn update_month(&self, month_key: &str, record: &MonthRecord) -> SaldoResult<()> {
        self.invalidate_months_cache();
        let body = to_body(record)?;
        self.request(
            reqwest::Method::PUT,
            &format!("/months/{month_key}"),
            Some(body),
        )?;
        Ok(())
    }

    pub fn delete_month(&self, month_key: &str) -> SaldoResult<()> {
        self.invalidate_months_cache();
        self.request(
            reqwest::Method::DELETE,
            &format!("/months/{month_key}"),
            None,
        )?;
        Ok(())
    }

    pub fn get_budgets(&self, month_key: &str) -> SaldoResult<Vec<Budget>> {
        self.get_collection(month_key, "budgets")
    }

    pub fn create_budget(&self, month_key: &str, budget: &Budget) -> SaldoResult<()> {
        self.create_entity(month_key, "budgets", budget)
    }

    pub fn update_budget(&self, month_key: &str, budget: &Budget) -> SaldoResult<()> {
        self.update_entity(month_key, "budgets", &budget.id, budget)
    }

    pub fn delete_budget(&self, month_key: &str, budget_id: &str) -> SaldoResult<()> {
        self.delete_entity(month_key, "budgets", budget_id)
    }

    pub fn get_investments(&self, month_key: &str) -> SaldoResult<Vec<Investment>> {
        self.get_collection(month_key, "investments")
    }

    pub fn create_investment(&self, month_key: &str, investment: &Investment) -> SaldoResult<()> {
        self.create_entity(month_key, "investments", investment)
    }

    pub fn update_investment(&self, month_key: &str, investment: &Investment) -> SaldoResult<()> {
        self.update_entity(month_key, "investments", &investment.id, investment)
    }

    pub fn delete_investment(&self, month_key: &str, investment_id: &str) -> SaldoResult<()> {
        self.delete_entity(month_key, "investments", investment_id)
    }

    pub fn get_goals(&self, month_key: &str) -> SaldoResult<Vec<FinancialGoal>> {
        self.get_collection(month_key, "goals")
    }

    pub fn create_goal(&self, month_key: &str, goal: &FinancialGoal) -> SaldoResult<()> {
        self.create_entity(month_key, "goals", goal)
    }

    pub fn update_goal(&self, month_key: &str, goal: &FinancialGoal) -> SaldoResult<()> {
        self.update_entity(month_key, "goals", &goal.id, goal)
    }

    pub fn delete_goal(&self, month_key: &str, goal_id: &str) -> SaldoResult<()> {
        self.delete_entity(month_key, "goals", goal_id)
    }

    pub fn get_subscriptions(&self, month_key: &str) -> SaldoResult<Vec<Subscription>> {
        self.get_collection(month_key, "subscriptions")
    }

    pub fn create_subscription(
        &self,
        month_key: &str,
        subscription: &Subscription,
    ) -> SaldoResult<()> {
        self.create_entity(month_key, "subscriptions", subscription)
    }

    pub fn update_subscription(
        &self,
        month_key: &str,
        subscription: &Subscription,
    ) -> SaldoResult<()> {
        self.update_entity(month_key, "subscriptions", &subscription.id, subscription)
    }

    pub fn delete_subscription(&self, month_key: &str, subscription_id: &str) -> SaldoResult<()> {
        self.delete_entity(month_key, "subscriptions", subscription_id)
    }

    fn get_collection<T: DeserializeOwned>(
        &self,
        month_key: &str,
        resource: &str,
    ) -> SaldoResult<Vec<T>> {
        let response = self.request(
            reqwest::Method::GET,
            &format!("/months/{month_key}/{resource}"),
            None,
        )?;
        parse_json(response)
    }

    fn create_entity<T: Serialize>(
        &self,
        month_key: &str,
        resource: &str,
        entity: &T,
    ) -> SaldoResult<()> {
        self.invalidate_months_cache();
        let body = to_body(entity)?;
        self.request(
            reqwest::Method::POST,
            &format!("/months/{month_key}/{resource}"),
            Some(body),
        )?;
        Ok(())
    }

    fn update_entity<T: Serialize>(
        &self,
        month_key: &str,
        resource: &str,
        entity_id: &str,
        entity: &T,
    ) -> SaldoResult<()> {
        self.invalidate_months_cache();
        let body = to_body(entity)?;
        self.request(
            reqwest::Method::PUT,
            &format!("/months/{month_key}/{resource}/{entity_id}"),
            Some(body),
        )?;
        Ok(())
    }

    fn delete_entity(&self, month_key: &str, resource: &str, entity_id: &str) -> SaldoResult<()> {
        self.invalidate_months_cache();
        self.request(
            reqwest::Method::DELETE,
            &format!("/months/{month_key}/{resource}/{entity_id}"),
            None,
        )?;
        Ok(())
    }

    fn invalidate_months_cache(&self) {
        let mut cache = self
            .months_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        cache.months = None;
        cache.fetched_at = None;
    }

    /// Sends one authenticated request. On 401 it refreshes the access
    /// token exactly once and retries; a second rejection surfaces as an
    /// API error, never another refresh.
    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> SaldoResult<Response> {
        let response = self.execute(&method, path, body.as_ref())?;
        let status = response.status();

        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(self.rate_limited(path, &response));
        }

        if status == StatusCode::UNAUTHORIZED {
            if self.tokens.refresh_token().is_none() {
                return Err(SaldoError::auth("unauthorized and no refresh token stored"));
            }

            if let Err(refresh_error) = self.refresh_access_token() {
                if let Err(clear_error) = self.tokens.clear_tokens() {
                    tracing::warn!(error = %clear_error, "failed to clear stored tokens");
                }
                return Err(SaldoError::auth(format!(
                    "session expired: token refresh failed: {refresh_error}"
                )));
            }

            let retry = self.execute(&method, path, body.as_ref())?;
            let retry_status = retry.status();
            if retry_status == StatusCode::TOO_MANY_REQUESTS {
                return Err(self.rate_limited(path, &retry));
            }
            if !retry_status.is_success() {
                return Err(api_error(retry));
            }
            return Ok(retry);
        }

        if !status.is_success() {
            return Err(api_error(response));
        }

        Ok(response)
    }

    fn execute(
        &self,
        method: &reqwest::Method,
        path: &str,
        body: Option<&Value>,
    ) -> SaldoResult<Response> {
        let mut request = self.client.request(method.clone(), self.url(path));

        if let Some(token) = self.tokens.access_token() {
            request = request.bearer_auth(token);
        }
        if let Some(body) = body {
            request = request.json(body);
        }

        request
            .send()
            .map_err(|err| SaldoError::network(format!("network request failed: {err}")))
    }

    fn refresh_access_token(&self) -> SaldoResult<()> {
        let refresh_token = self
            .tokens
            .refresh_token()
            .ok_or_else(|| SaldoError::auth("no refresh token stored"))?;

        let response = self
            .client
            .post(format!("{}/auth/token", self.auth_url))
            .json(&serde_json::json!({
                "grant_type": "refresh_token",
                "refresh_token": refresh_token,
                "client_id": CLIENT_ID,
            }))
            .send()
            .map_err(|err| SaldoError::network(format!("network request failed: {err}")))?;

        if !response.status().is_success() {
            return Err(api_error(response));
        }

        let tokens: TokenResponse = parse_json(response)?;
        self.tokens
            .store_tokens(&tokens.access_token, &tokens.refresh_token)
    }

    fn rate_limited(&self, path: &str, response: &Response) -> SaldoError {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<u64>().ok());

        let event = RateLimitEvent {
            path: path.to_string(),
            status: 429,
            retry_after,
        };
        tracing::warn!(path = %event.path, retry_after = ?event.retry_after, "rate limited");
        if let Some(hook) = &self.rate_limit_hook {
            hook(&event);
        }

        SaldoError::rate_limited(path, retry_after)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn to_body<T: Serialize>(entity: &T) -> SaldoResult<Value> {
    serde_json::to_value(entity)
        .map_err(|err| SaldoError::io(format!("failed to encode request body: {err}")))
}

fn parse_json<T: DeserializeOwned>(response: Response) -> SaldoResult<T> {
    let status = response.status();
    let body_text = response.text().unwrap_or_default();

    // Some write endpoints answer 204 with no body.
    if body_text.trim().is_empty() {
        return serde_json::from_str::<T>("null").map_err(|_| {
            SaldoError::api(
                status.as_u16(),
                "empty API response where a body was expected",
            )
        });
    }

    serde_json::from_str::<T>(&body_text).map_err(|err| {
        SaldoError::api(
            status.as_u16(),
            format!("failed to decode API response JSON: {err}"),
        )
    })
}

fn api_error(response: Response) -> SaldoError {
    let status = response.status().as_u16();
    let body_text = response.text().unwrap_or_default();
    let body_trimmed = body_text.trim();

    if body_trimmed.is_empty() {
        SaldoError::api(status, format!("request failed with status {status}"))
    } else {
        SaldoError::api(
            status,
            format!(
                "request failed with status {status}: {}",
                truncate_for_error(body_trimmed, 240)
            ),
        )
    }
}

fn truncate_for_error(input: &str, max_chars: usize) -> String {
    if input.chars().count() <= max_chars {
        return input.to_string();
    }

    let truncated: String = input.chars().take(max_chars).collect();
    format!("{truncated}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST, PUT};
    use httpmock::MockServer;
    use saldo_core::ErrorKind;
    use serde_json::json;

    #[derive(Debug, Default)]
    struct MemoryTokens {
        inner: Mutex<Option<(String, String)>>,
    }

    impl MemoryTokens {
        fn with(access: &str, refresh: &str) -> Arc<Self> {
            Arc::new(Self {
                inner: Mutex::new(Some((access.to_string(), refresh.to_string()))),
            })
        }

        fn empty() -> Arc<Self> {
            Arc::new(Self::default())
        }
    }

    impl TokenSource for MemoryTokens {
        fn access_token(&self) -> Option<String> {
            self.inner
                .lock()
                .unwrap()
                .as_ref()
                .map(|(access, _)| access.clone())
        }

        fn refresh_token(&self) -> Option<String> {
            self.inner
                .lock()
                .unwrap()
                .as_ref()
                .map(|(_, refresh)| refresh.clone())
        }

        fn store_tokens(&self, access: &str, refresh: &str) -> SaldoResult<()> {
            *self.inner.lock().unwrap() = Some((access.to_string(), refresh.to_string()));
            Ok(())
        }

        fn clear_tokens(&self) -> SaldoResult<()> {
            *self.inner.lock().unwrap() = None;
            Ok(())
        }
    }

    fn api_for(server: &MockServer, tokens: Arc<MemoryTokens>) -> FinanceApi {
        FinanceApi::new(&server.base_url(), &server.base_url(), tokens).expect("api client")
    }

    #[test]
    fn debug_output_names_endpoints_but_never_tokens() {
        let api = FinanceApi::new(
            "https://finapi.example.com",
            "https://auth.example.com",
            MemoryTokens::with("secret-access", "secret-refresh"),
        )
        .expect("api client");

        let rendered = format!("{api:?}");
        assert!(rendered.contains("finapi.example.com"));
        assert!(rendered.contains("auth.example.com"));
        assert!(!rendered.contains("secret-access"));
        assert!(!rendered.contains("secret-refresh"));
    }

    #[test]
    fn list_months_attaches_bearer_token() {
        let server = MockServer::start();
        let months = server.mock(|when, then| {
            when.method(GET)
                .path("/months")
                .header("authorization", "Bearer access-1");
            then.status(200).json_body(json!([]));
        });

        let api = api_for(&server, MemoryTokens::with("access-1", "refresh-1"));
        let result = api.list_months().expect("list months");
        assert!(result.is_empty());
        months.assert_hits(1);
    }

    #[test]
    fn list_months_is_cached_within_ttl_and_invalidated_by_writes() {
        let server = MockServer::start();
        let months = server.mock(|when, then| {
            when.method(GET).path("/months");
            then.status(200)
                .json_body(json!([{"monthKey": "2026-08", "categories": []}]));
        });
        let create = server.mock(|when, then| {
            when.method(POST).path("/months");
            then.status(201).json_body(json!({}));
        });

        let api = api_for(&server, MemoryTokens::empty());
        let first = api.list_months().expect("first list");
        let second = api.list_months().expect("second list");
        assert_eq!(first, second);
        months.assert_hits(1);

        api.create_month(&MonthRecord::new("2026-09"))
            .expect("create month");
        create.assert_hits(1);

        let _ = api.list_months().expect("list after invalidation");
        months.assert_hits(2);
    }

    #[test]
    fn unauthorized_refreshes_once_and_retries() {
        let server = MockServer::start();
        let stale = server.mock(|when, then| {
            when.method(GET)
                .path("/months")
                .header("authorization", "Bearer stale");
            then.status(401).json_body(json!({"message": "expired"}));
        });
        let refresh = server.mock(|when, then| {
            when.method(POST)
                .path("/auth/token")
                .json_body_partial(json!({"grant_type": "refresh_token"}).to_string());
            then.status(200).json_body(json!({
                "access_token": "fresh",
                "refresh_token": "refresh-2",
            }));
        });
        let fresh = server.mock(|when, then| {
            when.method(GET)
                .path("/months")
                .header("authorization", "Bearer fresh");
            then.status(200).json_body(json!([]));
        });

        let tokens = MemoryTokens::with("stale", "refresh-1");
        let api = api_for(&server, tokens.clone());
        api.list_months().expect("list after refresh");

        stale.assert_hits(1);
        refresh.assert_hits(1);
        fresh.assert_hits(1);
        assert_eq!(tokens.access_token().as_deref(), Some("fresh"));
        assert_eq!(tokens.refresh_token().as_deref(), Some("refresh-2"));
    }

    #[test]
    fn failed_refresh_clears_tokens_and_raises_auth_error() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/months");
            then.status(401).json_body(json!({"message": "expired"}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/auth/token");
            then.status(401).json_body(json!({"message": "invalid grant"}));
        });

        let tokens = MemoryTokens::with("stale", "dead-refresh");
        let api = api_for(&server, tokens.clone());
        let error = api.list_months().expect_err("refresh should fail");

        assert_eq!(error.kind, ErrorKind::Auth);
        assert!(tokens.access_token().is_none());
        assert!(tokens.refresh_token().is_none());
    }

    #[test]
    fn second_unauthorized_does_not_loop() {
        let server = MockServer::start();
        let months = server.mock(|when, then| {
            when.method(GET).path("/months");
            then.status(401).json_body(json!({"message": "nope"}));
        });
        let refresh = server.mock(|when, then| {
            when.method(POST).path("/auth/token");
            then.status(200).json_body(json!({
                "access_token": "still-bad",
                "refresh_token": "refresh-2",
            }));
        });

        let api = api_for(&server, MemoryTokens::with("bad", "refresh-1"));
        let error = api.list_months().expect_err("second 401 should surface");

        assert_eq!(error.kind, ErrorKind::Api);
        assert_eq!(error.status(), Some(401));
        refresh.assert_hits(1);
        months.assert_hits(2);
    }

    #[test]
    fn rate_limit_raises_distinct_error_and_fires_hook() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path("/months/2026-08");
            then.status(429)
                .header("retry-after", "12")
                .json_body(json!({"message": "slow down"}));
        });

        let events: Arc<Mutex<Vec<RateLimitEvent>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let api = api_for(&server, MemoryTokens::empty()).with_rate_limit_hook(Box::new(
            move |event| {
                sink.lock().unwrap().push(event.clone());
            },
        ));

        let error = api
            .update_month("2026-08", &MonthRecord::new("2026-08"))
            .expect_err("rate limited");
        assert!(error.is_rate_limit());
        assert_eq!(error.retry_after, Some(12));

        let seen = events.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].path, "/months/2026-08");
        assert_eq!(seen[0].retry_after, Some(12));
    }

    #[test]
    fn unreachable_server_raises_network_error() {
        // A port nothing listens on.
        let tokens = MemoryTokens::empty();
        let api =
            FinanceApi::new("http://127.0.0.1:1", "http://127.0.0.1:1", tokens).expect("client");
        let error = api.list_months().expect_err("should be unreachable");
        assert!(error.is_network());
        assert!(!api.ping());
    }

    #[test]
    fn ping_reports_server_health() {
        let server = MockServer::start();
        let health = server.mock(|when, then| {
            when.method(GET).path("/health");
            then.status(200).json_body(json!({"status": "ok"}));
        });

        let api = api_for(&server, MemoryTokens::empty());
        assert!(api.ping());
        health.assert_hits(1);
    }

    #[test]
    fn current_user_is_none_without_token_or_session() {
        let server = MockServer::start();
        let check = server.mock(|when, then| {
            when.method(GET).path("/check/auth");
            then.status(200).json_body(json!({
                "id": "u-1",
                "email": "user@example.com",
                "plan": "pro",
            }));
        });

        let no_token = api_for(&server, MemoryTokens::empty());
        assert!(no_token.current_user().is_none());
        check.assert_hits(0);

        let with_token = api_for(&server, MemoryTokens::with("access-1", "refresh-1"));
        let user = with_token.current_user().expect("user profile");
        assert_eq!(user.email, "user@example.com");
        assert_eq!(user.plan.as_deref(), Some("pro"));
    }

    #[test]
    fn month_write_errors_carry_the_status() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(PUT).path("/months/2026-08");
            then.status(404).json_body(json!({"message": "no such month"}));
        });
        server.mock(|when, then| {
            when.method(POST).path("/months");
            then.status(409).json_body(json!({"message": "already exists"}));
        });

        let api = api_for(&server, MemoryTokens::empty());
        let record = MonthRecord::new("2026-08");

        let missing = api.update_month("2026-08", &record).expect_err("404");
        assert_eq!(missing.status(), Some(404));

        let conflict = api.create_month(&record).expect_err("409");
        assert_eq!(conflict.status(), Some(409));
    }
}
