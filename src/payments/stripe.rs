use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;

use crate::errors::PaymentError;
use crate::payments::{Checkout, PaymentProvider, SessionStatus};
use crate::pricing::CreditPackage;

pub struct StripePayments {
    api_base: String,
    secret_key: String,
    public_url: String,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    id: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    payment_status: Option<String>,
    #[serde(default)]
    client_reference_id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

impl StripePayments {
    pub fn new(api_base: String, secret_key: String, public_url: String) -> Self {
        Self {
            api_base,
            secret_key,
            public_url,
            client: Client::new(),
        }
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{}", self.api_base.trim_end_matches('/'), path)
    }

    fn checkout_form(&self, user_id: &str, package: &CreditPackage) -> Vec<(&'static str, String)> {
        let base = self.public_url.trim_end_matches('/');
        vec![
            ("mode", "payment".into()),
            ("payment_method_types[0]", "card".into()),
            ("line_items[0][quantity]", "1".into()),
            ("line_items[0][price_data][currency]", "usd".into()),
            ("line_items[0][price_data][unit_amount]", package.price_cents.to_string()),
            (
                "line_items[0][price_data][product_data][name]",
                format!("{} credits ({})", package.credits, package.id.as_str()),
            ),
            ("success_url", format!("{base}/success?session_id={{CHECKOUT_SESSION_ID}}")),
            ("cancel_url", format!("{base}/credits")),
            ("client_reference_id", user_id.to_string()),
            ("metadata[user_id]", user_id.to_string()),
            ("metadata[package_id]", package.id.as_str().to_string()),
        ]
    }

    /// Sends with up to three attempts; `build` must produce an idempotent request.
    async fn send_with_retry<F>(&self, build: F) -> Result<SessionBody, PaymentError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut last_err: Option<String> = None;
        for attempt in 0..3u64 {
            match build().bearer_auth(&self.secret_key).send().await {
                Ok(resp) if resp.status().is_success() => {
                    return resp
                        .json::<SessionBody>()
                        .await
                        .map_err(|e| PaymentError::Protocol(format!("decode session: {e}")));
                }
                Ok(resp) if resp.status().is_client_error() => {
                    // 4xx will not improve on retry
                    let status = resp.status();
                    let body = resp.text().await.unwrap_or_default();
                    return Err(PaymentError::Http(format!("status {status}: {body}")));
                }
                Ok(resp) => {
                    last_err = Some(format!("status {} from {}", resp.status(), self.api_base));
                }
                Err(e) => {
                    last_err = Some(format!("connect {}: {}", self.api_base, e));
                }
            }
            tokio::time::sleep(Duration::from_millis(100 * (attempt + 1))).await;
        }
        Err(PaymentError::Http(
            last_err.unwrap_or_else(|| "stripe request failed".into()),
        ))
    }
}

#[async_trait]
impl PaymentProvider for StripePayments {
    fn name(&self) -> &'static str {
        "stripe"
    }

    async fn checkout(&self, user_id: &str, package: &CreditPackage) -> Result<Checkout, PaymentError> {
        if package.price_cents == 0 {
            return Ok(Checkout::Completed);
        }
        let url = self.endpoint("checkout/sessions");
        let form = self.checkout_form(user_id, package);
        let idempotency_key = uuid::Uuid::new_v4().to_string();
        let session = self
            .send_with_retry(|| {
                self.client
                    .post(&url)
                    .header("Idempotency-Key", &idempotency_key)
                    .form(&form)
            })
            .await?;
        tracing::info!(user_id, session_id = %session.id, package = package.id.as_str(), "created stripe checkout session");
        Ok(Checkout::Pending {
            session_id: session.id,
            checkout_url: session.url,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, PaymentError> {
        if session_id.is_empty() || !session_id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(PaymentError::Protocol("malformed session id".into()));
        }
        let url = self.endpoint(&format!("checkout/sessions/{session_id}"));
        let mut session = self.send_with_retry(|| self.client.get(&url)).await?;
        Ok(SessionStatus {
            paid: session.payment_status.as_deref() == Some("paid"),
            user_id: session
                .metadata
                .remove("user_id")
                .or(session.client_reference_id),
            package_id: session.metadata.remove("package_id"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::model::SubscriptionTier;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::thread;

    fn write_http_response(mut stream: TcpStream, status: &str, body: &str) {
        let resp = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let _ = stream.write_all(resp.as_bytes());
        let _ = stream.flush();
    }

    // drain headers and body so closing the socket does not reset the connection
    fn read_request(stream: &mut TcpStream) -> String {
        let mut data = Vec::new();
        let mut buf = [0u8; 4096];
        loop {
            let n = stream.read(&mut buf).unwrap_or(0);
            if n == 0 {
                break;
            }
            data.extend_from_slice(&buf[..n]);
            let text = String::from_utf8_lossy(&data).to_string();
            if let Some(split) = text.find("\r\n\r\n") {
                let content_length = text[..split]
                    .lines()
                    .filter_map(|l| l.split_once(':'))
                    .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
                    .and_then(|(_, v)| v.trim().parse::<usize>().ok())
                    .unwrap_or(0);
                if data.len() >= split + 4 + content_length {
                    break;
                }
            }
        }
        String::from_utf8_lossy(&data).to_string()
    }

    fn pro() -> CreditPackage {
        CreditPackage {
            id: SubscriptionTier::Pro,
            credits: 500,
            price_cents: 2999,
        }
    }

    #[cfg_attr(windows, ignore)]
    #[tokio::test]
    async fn checkout_creates_pending_session() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let req = read_request(&mut stream);
            write_http_response(
                stream,
                "200 OK",
                r#"{"id":"cs_test_123","url":"https://checkout.example/cs_test_123"}"#,
            );
            req
        });

        let stripe = StripePayments::new(
            format!("http://{addr}"),
            "sk_test_x".into(),
            "http://localhost:3000".into(),
        );
        let out = stripe.checkout("user-1", &pro()).await.expect("checkout");
        assert_eq!(
            out,
            Checkout::Pending {
                session_id: "cs_test_123".into(),
                checkout_url: Some("https://checkout.example/cs_test_123".into()),
            }
        );
        let req = handle.join().unwrap();
        assert!(req.starts_with("POST /v1/checkout/sessions"));
        assert!(req.to_ascii_lowercase().contains("authorization: bearer sk_test_x"));
    }

    #[cfg_attr(windows, ignore)]
    #[tokio::test]
    async fn session_status_reads_payment_and_metadata() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let _ = read_request(&mut stream);
            write_http_response(
                stream,
                "200 OK",
                r#"{"id":"cs_1","payment_status":"paid","metadata":{"user_id":"user-1","package_id":"PRO"}}"#,
            );
        });
        let stripe = StripePayments::new(format!("http://{addr}"), "sk".into(), "http://x".into());
        let status = stripe.session_status("cs_1").await.expect("status");
        assert!(status.paid);
        assert_eq!(status.user_id.as_deref(), Some("user-1"));
        assert_eq!(status.package_id.as_deref(), Some("PRO"));
        let _ = handle.join();
    }

    #[cfg_attr(windows, ignore)]
    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).expect("bind");
        let addr = listener.local_addr().unwrap();
        let handle = thread::spawn(move || {
            let (mut stream, _) = listener.accept().expect("accept");
            let _ = read_request(&mut stream);
            write_http_response(stream, "404 Not Found", r#"{"error":{"message":"No such session"}}"#);
        });
        let stripe = StripePayments::new(format!("http://{addr}"), "sk".into(), "http://x".into());
        let err = stripe.session_status("cs_missing").await.unwrap_err();
        assert!(matches!(err, PaymentError::Http(_)));
        let _ = handle.join();
    }

    #[tokio::test]
    async fn malformed_session_ids_never_reach_the_network() {
        let stripe = StripePayments::new("http://127.0.0.1:1".into(), "sk".into(), "http://x".into());
        let err = stripe.session_status("../../v1/customers").await.unwrap_err();
        assert!(matches!(err, PaymentError::Protocol(_)));
    }
}
