use super::form;
use crate::domain::api::{ApiRequest, Verb};
use crate::domain::ports::StripeBackend;
use crate::domain::request::{API_BASE_KEY, SECRET_KEY};
use crate::error::StripeError;
use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::{Map, Value};
use tracing::debug;

pub const DEFAULT_API_BASE: &str = "https://api.stripe.com";

/// The live Stripe REST API, authenticated with a secret key.
///
/// Parameters travel form-encoded: in the body for `POST`, in the query string
/// otherwise. Request options map onto Stripe's `Idempotency-Key`,
/// `Stripe-Account` and `Stripe-Version` headers.
#[derive(Clone)]
pub struct HttpBackend {
    /// A client that failed to build is reported by the first call.
    client: Result<Client, String>,
    secret: String,
    api_base: String,
}

impl HttpBackend {
    pub fn new(secret: impl Into<String>) -> Self {
        let client = Client::builder()
            .user_agent(concat!("stripe-dispatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| e.to_string());
        Self {
            client,
            secret: secret.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into();
        self
    }

    /// Reads `STRIPE_SECRET` and, if present, `STRIPE_API_BASE`.
    ///
    /// A missing secret is not an error here; the call itself fails with an
    /// `authentication_error`.
    pub fn from_env(env: &Map<String, Value>) -> Self {
        let read = |key: &str| env.get(key).and_then(Value::as_str);
        let backend = Self::new(read(SECRET_KEY).unwrap_or_default());
        match read(API_BASE_KEY) {
            Some(api_base) => backend.with_api_base(api_base),
            None => backend,
        }
    }

    pub fn url(&self, request: &ApiRequest) -> Result<Url, StripeError> {
        let mut url = Url::parse(&self.api_base).map_err(|e| {
            StripeError::api_connection(format!("Invalid API base '{}': {e}", self.api_base))
        })?;
        url.path_segments_mut()
            .map_err(|_| {
                StripeError::api_connection(format!(
                    "API base '{}' cannot carry a path",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .extend(&request.segments);
        Ok(url)
    }
}

#[async_trait]
impl StripeBackend for HttpBackend {
    async fn execute(&self, request: ApiRequest) -> Result<Value, StripeError> {
        if self.secret.is_empty() {
            return Err(StripeError::authentication(format!(
                "You did not provide an API key. Set {SECRET_KEY} in the dispatch env."
            )));
        }

        let client = self.client.as_ref().map_err(|e| {
            StripeError::api_connection(format!("Could not initialize the HTTP client: {e}"))
        })?;
        let url = self.url(&request)?;
        let pairs = form::encode(&request.params);
        let builder = match request.verb {
            Verb::Get => client.get(url).query(&pairs),
            Verb::Delete => client.delete(url).query(&pairs),
            Verb::Post => client.post(url).form(&pairs),
        };

        let mut builder = builder.bearer_auth(&self.secret);
        let options = &request.options;
        if let Some(key) = &options.idempotency_key {
            builder = builder.header("Idempotency-Key", key);
        }
        if let Some(account) = &options.stripe_account {
            builder = builder.header("Stripe-Account", account);
        }
        if let Some(version) = &options.api_version {
            builder = builder.header("Stripe-Version", version);
        }

        let response = builder.send().await.map_err(|e| {
            StripeError::api_connection(format!(
                "An error occurred with the connection to Stripe: {e}"
            ))
        })?;
        let status = response.status();
        debug!(status = status.as_u16(), path = %request.path(), "stripe responded");

        let body: Value = response.json().await.map_err(|e| {
            StripeError::new(
                "api_error",
                format!("Invalid JSON received from the Stripe API: {e}"),
            )
            .with_status(status.as_u16())
        })?;

        if status.is_success() {
            Ok(body)
        } else {
            Err(StripeError::from_envelope(&body, status.as_u16()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::api::RequestOptions;
    use serde_json::json;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;
    use tokio::task::JoinHandle;

    fn request(segments: &[&str]) -> ApiRequest {
        ApiRequest::new(
            Verb::Get,
            segments.iter().map(|segment| segment.to_string()).collect(),
        )
    }

    /// A request as read off the wire by [`serve_once`].
    struct Received {
        request_line: String,
        headers: Vec<(String, String)>,
        body: String,
    }

    impl Received {
        fn header(&self, name: &str) -> Option<&str> {
            self.headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.as_str())
        }
    }

    /// Accepts a single connection on a local port, answers it with `status` and
    /// `body`, and returns what the client sent.
    async fn serve_once(status: &'static str, body: Value) -> (String, JoinHandle<Received>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());

        let handle = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut raw = Vec::new();
            let mut chunk = [0u8; 1024];
            let head_end = loop {
                let read = stream.read(&mut chunk).await.unwrap();
                assert!(read > 0, "connection closed before the headers ended");
                raw.extend_from_slice(&chunk[..read]);
                if let Some(end) = raw.windows(4).position(|window| window == b"\r\n\r\n") {
                    break end;
                }
            };

            let head = String::from_utf8(raw[..head_end].to_vec()).unwrap();
            let mut lines = head.split("\r\n");
            let request_line = lines.next().unwrap_or_default().to_string();
            let headers: Vec<(String, String)> = lines
                .filter_map(|line| line.split_once(':'))
                .map(|(key, value)| (key.trim().to_ascii_lowercase(), value.trim().to_string()))
                .collect();
            let length = headers
                .iter()
                .find(|(key, _)| key == "content-length")
                .map(|(_, value)| value.parse::<usize>().unwrap())
                .unwrap_or(0);
            while raw.len() < head_end + 4 + length {
                let read = stream.read(&mut chunk).await.unwrap();
                assert!(read > 0, "connection closed before the body ended");
                raw.extend_from_slice(&chunk[..read]);
            }
            let body_sent = String::from_utf8(raw[head_end + 4..].to_vec()).unwrap();

            let payload = body.to_string();
            let response = format!(
                "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{payload}",
                payload.len()
            );
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.unwrap();

            Received {
                request_line,
                headers,
                body: body_sent,
            }
        });

        (base, handle)
    }

    #[test]
    fn test_url_appends_segments_to_base() {
        let backend = HttpBackend::new("sk_test_123");
        let url = backend.url(&request(&["v1", "charges", "ch_1"])).unwrap();
        assert_eq!(url.as_str(), "https://api.stripe.com/v1/charges/ch_1");
    }

    #[test]
    fn test_url_escapes_ids() {
        let backend = HttpBackend::new("sk_test_123").with_api_base("http://localhost:12111/");
        let url = backend
            .url(&request(&["v1", "customers", "cus 1/x"]))
            .unwrap();
        assert_eq!(url.as_str(), "http://localhost:12111/v1/customers/cus%201%2Fx");
    }

    #[test]
    fn test_url_rejects_bad_base() {
        let backend = HttpBackend::new("sk_test_123").with_api_base("not a url");
        let err = backend.url(&request(&["v1", "charges"])).unwrap_err();
        assert_eq!(err.kind, "api_connection_error");
    }

    #[test]
    fn test_from_env_reads_base() {
        let env = json!({
            SECRET_KEY: "sk_test_123",
            API_BASE_KEY: "http://localhost:12111",
            "RETRIES": 3
        });
        let backend = HttpBackend::from_env(env.as_object().unwrap());
        let url = backend.url(&request(&["v1", "refunds"])).unwrap();
        assert_eq!(url.as_str(), "http://localhost:12111/v1/refunds");
    }

    #[test]
    fn test_from_env_ignores_non_string_base() {
        let env = json!({SECRET_KEY: "sk_test_123", API_BASE_KEY: 8080});
        let backend = HttpBackend::from_env(env.as_object().unwrap());
        let url = backend.url(&request(&["v1", "refunds"])).unwrap();
        assert_eq!(url.as_str(), "https://api.stripe.com/v1/refunds");
    }

    #[tokio::test]
    async fn test_missing_secret_fails_without_network() {
        let backend = HttpBackend::from_env(&Map::new());
        let err = backend
            .execute(request(&["v1", "customers"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "authentication_error");
        assert_eq!(err.status, Some(401));
    }

    #[tokio::test]
    async fn test_unreachable_api_is_connection_error() {
        let backend = HttpBackend::new("sk_test_123").with_api_base("http://127.0.0.1:1");
        let err = backend
            .execute(request(&["v1", "customers"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "api_connection_error");
    }

    #[tokio::test]
    async fn test_post_sends_form_body_and_headers() {
        let charge = json!({"id": "ch_1", "object": "charge", "amount": 1099, "paid": true});
        let (base, server) = serve_once("200 OK", charge.clone()).await;
        let backend = HttpBackend::new("sk_test_123").with_api_base(base);

        let mut call = ApiRequest::new(Verb::Post, vec!["v1".into(), "charges".into()]);
        call.params = json!({"amount": 1099, "currency": "usd", "metadata": {"order": "6735"}})
            .as_object()
            .cloned()
            .unwrap();
        call.options = RequestOptions {
            idempotency_key: Some("key_1".into()),
            stripe_account: Some("acct_1".into()),
            api_version: Some("2024-06-20".into()),
        };

        let body = backend.execute(call).await.unwrap();
        assert_eq!(body, charge);

        let received = server.await.unwrap();
        assert_eq!(received.request_line, "POST /v1/charges HTTP/1.1");
        assert_eq!(received.header("authorization"), Some("Bearer sk_test_123"));
        assert_eq!(received.header("idempotency-key"), Some("key_1"));
        assert_eq!(received.header("stripe-account"), Some("acct_1"));
        assert_eq!(received.header("stripe-version"), Some("2024-06-20"));
        assert_eq!(
            received.header("content-type"),
            Some("application/x-www-form-urlencoded")
        );
        let mut fields: Vec<&str> = received.body.split('&').collect();
        fields.sort();
        assert_eq!(
            fields,
            vec!["amount=1099", "currency=usd", "metadata%5Border%5D=6735"]
        );
    }

    #[tokio::test]
    async fn test_get_sends_params_in_query_string() {
        let (base, server) = serve_once("200 OK", json!({"object": "list", "data": []})).await;
        let backend = HttpBackend::new("sk_test_123").with_api_base(base);

        let mut call = request(&["v1", "customers"]);
        call.params = json!({"limit": 3}).as_object().cloned().unwrap();

        let body = backend.execute(call).await.unwrap();
        assert_eq!(body["object"], "list");

        let received = server.await.unwrap();
        assert_eq!(received.request_line, "GET /v1/customers?limit=3 HTTP/1.1");
        assert!(received.body.is_empty());
        assert_eq!(received.header("idempotency-key"), None);
    }

    #[tokio::test]
    async fn test_error_envelope_is_parsed_with_status() {
        let envelope = json!({
            "error": {
                "type": "card_error",
                "code": "card_declined",
                "decline_code": "generic_decline",
                "message": "Your card was declined.",
                "param": "source"
            }
        });
        let (base, server) = serve_once("402 Payment Required", envelope).await;
        let backend = HttpBackend::new("sk_test_123").with_api_base(base);

        let mut call = ApiRequest::new(Verb::Post, vec!["v1".into(), "charges".into()]);
        call.params = json!({"amount": 1099, "currency": "usd", "source": "tok_chargeDeclined"})
            .as_object()
            .cloned()
            .unwrap();

        let err = backend.execute(call).await.unwrap_err();
        assert_eq!(err.kind, "card_error");
        assert_eq!(err.code.as_deref(), Some("card_declined"));
        assert_eq!(err.decline_code.as_deref(), Some("generic_decline"));
        assert_eq!(err.param.as_deref(), Some("source"));
        assert_eq!(err.message, "Your card was declined.");
        assert_eq!(err.status, Some(402));

        let received = server.await.unwrap();
        assert_eq!(received.request_line, "POST /v1/charges HTTP/1.1");
    }

    #[tokio::test]
    async fn test_unrecognized_error_body_falls_back_to_api_error() {
        let (base, server) = serve_once("502 Bad Gateway", json!("upstream down")).await;
        let backend = HttpBackend::new("sk_test_123").with_api_base(base);

        let err = backend
            .execute(request(&["v1", "customers"]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, "api_error");
        assert_eq!(err.status, Some(502));
        server.await.unwrap();
    }
}
