use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::{DefaultBodyLimit, Multipart, OriginalUri, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{middleware, Extension, Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::{self, AuthState, AuthUser};
use crate::errors::{AuthError, LedgerError, PaymentError, PdfError};
use crate::health;
use crate::ledger::{self, CreditStore};
use crate::payments::{Checkout, PaymentProvider};
use crate::pdf;
use crate::pricing::Pricing;
use crate::ratelimit::{self, RateLimiter};
use crate::summarize::{Outcome, SummaryMode, SummaryRequest, Summarizer};

const SERVICE_NAME: &str = "PDF Summary API";
const MULTIPART_OVERHEAD: usize = 64 * 1024;
const DEFAULT_HISTORY: usize = 10;
const MAX_HISTORY: usize = 100;
const FREE_TIER_REASON: &str = "free_tier";

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn CreditStore>,
    pub summarizer: Arc<dyn Summarizer>,
    pub payments: Arc<dyn PaymentProvider>,
    pub pricing: Arc<Pricing>,
    pub auth: Arc<AuthState>,
    pub limiter: Arc<RateLimiter>,
    pub max_upload_bytes: usize,
    /// Set when the file store is in use, for the health probe.
    pub data_dir: Option<PathBuf>,
    /// Present when a remote payment API is configured.
    pub payments_probe: Option<Arc<health::PaymentsProbe>>,
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
    InsufficientCredits {
        required: u64,
        current: u64,
        summary_type: Option<SummaryMode>,
    },
    PaymentRequired(String),
    Forbidden(String),
    Conflict(String),
    PayloadTooLarge(usize),
    RateLimited,
    Upstream(String),
    Unavailable(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, json!({"error": m})),
            ApiError::Unauthorized(m) => (StatusCode::UNAUTHORIZED, json!({"error": m})),
            ApiError::InsufficientCredits {
                required,
                current,
                summary_type,
            } => (
                StatusCode::PAYMENT_REQUIRED,
                json!({
                    "error": "Insufficient credits",
                    "required": required,
                    "current": current,
                    "summaryType": summary_type,
                }),
            ),
            ApiError::PaymentRequired(m) => (StatusCode::PAYMENT_REQUIRED, json!({"error": m})),
            ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, json!({"error": m})),
            ApiError::Conflict(m) => (StatusCode::CONFLICT, json!({"error": m})),
            ApiError::PayloadTooLarge(max) => (
                StatusCode::PAYLOAD_TOO_LARGE,
                json!({"error": format!("File too large. Maximum size is {}MB.", max / (1024 * 1024))}),
            ),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                json!({"error": "Too many requests from this IP, please try again later."}),
            ),
            ApiError::Upstream(m) => (StatusCode::BAD_GATEWAY, json!({"error": m})),
            ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, json!({"error": m})),
            ApiError::Internal(m) => {
                tracing::error!(error = %m, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({"error": "Internal server error"}),
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        ApiError::Unauthorized(e.to_string())
    }
}

impl From<LedgerError> for ApiError {
    fn from(e: LedgerError) -> Self {
        match e {
            LedgerError::InsufficientCredits { required, current } => ApiError::InsufficientCredits {
                required,
                current,
                summary_type: None,
            },
            LedgerError::InvalidAmount => ApiError::BadRequest("amount must be greater than zero".into()),
            LedgerError::DuplicateReference(r) => {
                ApiError::Conflict(format!("payment {r} was already applied"))
            }
            LedgerError::Storage(m) => {
                tracing::error!(error = %m, "credit store failure");
                ApiError::Unavailable("Credit store unavailable, please retry later.".into())
            }
        }
    }
}

impl From<PaymentError> for ApiError {
    fn from(e: PaymentError) -> Self {
        tracing::warn!(error = %e, "payment provider error");
        ApiError::Upstream(format!("Payment provider error: {e}"))
    }
}

impl From<PdfError> for ApiError {
    fn from(e: PdfError) -> Self {
        match e {
            PdfError::NoText => ApiError::BadRequest(
                "This PDF appears to be scanned images or has no selectable text. Please use a PDF with readable text.".into(),
            ),
            PdfError::Invalid(reason) => {
                tracing::debug!(%reason, "rejected pdf");
                ApiError::BadRequest("Invalid PDF file. Please check that it's a valid PDF.".into())
            }
        }
    }
}

pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/summary/summarize", post(summarize_pdf))
        .route("/summary/text", post(summarize_text))
        .route("/credits/balance", get(balance))
        .route("/credits/transactions", get(transactions))
        .route("/credits/purchase", post(purchase))
        .route("/credits/confirm", post(confirm))
        .route("/credits/free", post(free_credits))
        .route_layer(middleware::from_fn_with_state(
            state.auth.clone(),
            auth::require_user,
        ));

    let api = Router::new()
        .route("/health", get(health_check))
        .route("/info", get(info))
        .route("/summary/credit-costs", get(credit_costs))
        .route("/credits/packages", get(packages))
        .merge(protected)
        .fallback(api_not_found)
        .layer(middleware::from_fn_with_state(
            state.limiter.clone(),
            ratelimit::limit_requests,
        ));

    Router::new()
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(state.max_upload_bytes + MULTIPART_OVERHEAD))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Runs synchronous work (PDF parsing, scoring, ledger I/O) off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("worker task failed: {e}")))
}

async fn ensure_affordable(state: &AppState, user: &AuthUser, mode: SummaryMode) -> Result<u64, ApiError> {
    let cost = state.pricing.costs.for_mode(mode);
    let store = state.store.clone();
    let user_id = user.user_id.clone();
    let free = state.pricing.free_tier_credits;
    let (current, fallback) = blocking(move || ledger::credits_or_default(store.as_ref(), &user_id, free)).await?;
    tracing::info!(user_id = %user.user_id, required = cost, current, fallback, "credit check");
    if current < cost {
        return Err(ApiError::InsufficientCredits {
            required: cost,
            current,
            summary_type: Some(mode),
        });
    }
    Ok(cost)
}

async fn summarize_and_charge(
    state: &AppState,
    user: &AuthUser,
    text: String,
    mode: SummaryMode,
    cost: u64,
) -> Result<Json<Value>, ApiError> {
    let summarizer = state.summarizer.clone();
    let result = blocking(move || summarizer.summarize(&SummaryRequest { text, mode })).await?;
    if result.outcome == Outcome::NoContent {
        return Err(ApiError::BadRequest(result.body));
    }
    if result.outcome == Outcome::Fallback {
        tracing::warn!(user_id = %user.user_id, "served fallback summary");
    }

    let store = state.store.clone();
    let user_id = user.user_id.clone();
    let reason = format!("summary:{}", mode.as_str());
    let remaining = blocking(move || store.debit(&user_id, cost, &reason))
        .await?
        .map_err(|e| match ApiError::from(e) {
            ApiError::InsufficientCredits { required, current, .. } => ApiError::InsufficientCredits {
                required,
                current,
                summary_type: Some(mode),
            },
            other => other,
        })?;

    tracing::info!(
        user_id = %user.user_id,
        mode = mode.as_str(),
        sentences = result.sentence_count,
        selected = result.selected_count,
        remaining,
        "summary generated"
    );
    Ok(Json(json!({
        "summary": result.body,
        "usage": {
            "mode": mode,
            "outcome": result.outcome,
            "creditsUsed": cost,
            "remainingCredits": remaining,
            "sentenceCount": result.sentence_count,
            "selectedCount": result.selected_count,
        }
    })))
}

fn multipart_error(e: MultipartError, max: usize) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(max)
    } else {
        ApiError::BadRequest(format!("Cannot read upload: {}", e.body_text()))
    }
}

fn parse_mode(raw: &str) -> Result<SummaryMode, ApiError> {
    SummaryMode::parse(raw).ok_or_else(|| ApiError::BadRequest("Invalid summary type".into()))
}

async fn summarize_pdf(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<Value>, ApiError> {
    let mut multipart = multipart.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let max = state.max_upload_bytes;
    let mut upload: Option<Bytes> = None;
    let mut mode: Option<SummaryMode> = None;
    let mut legacy_detailed = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error(e, max))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "pdf" => {
                if field.content_type() != Some("application/pdf") {
                    return Err(ApiError::BadRequest("Only PDF files are allowed".into()));
                }
                let data = field.bytes().await.map_err(|e| multipart_error(e, max))?;
                if data.len() > max {
                    return Err(ApiError::PayloadTooLarge(max));
                }
                tracing::info!(user_id = %user.user_id, bytes = data.len(), "pdf received");
                upload = Some(data);
            }
            "mode" => {
                let raw = field.text().await.map_err(|e| multipart_error(e, max))?;
                mode = Some(parse_mode(&raw)?);
            }
            "detailed" => {
                let raw = field.text().await.map_err(|e| multipart_error(e, max))?;
                legacy_detailed = raw.trim() == "true";
            }
            _ => {}
        }
    }

    let data = upload.ok_or_else(|| ApiError::BadRequest("No PDF file uploaded".into()))?;
    let mode = mode.unwrap_or(if legacy_detailed {
        SummaryMode::Detailed
    } else {
        SummaryMode::Brief
    });
    let cost = ensure_affordable(&state, &user, mode).await?;

    let text = blocking(move || pdf::extract_text(&data)).await??;
    summarize_and_charge(&state, &user, text, mode, cost).await
}

#[derive(Debug, Deserialize)]
struct TextSummaryBody {
    text: String,
    mode: Option<String>,
}

async fn summarize_text(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<TextSummaryBody>,
) -> Result<Json<Value>, ApiError> {
    if body.text.trim().is_empty() {
        return Err(ApiError::BadRequest("Text is required".into()));
    }
    let mode = match body.mode.as_deref() {
        Some(raw) => parse_mode(raw)?,
        None => SummaryMode::Brief,
    };
    let cost = ensure_affordable(&state, &user, mode).await?;
    summarize_and_charge(&state, &user, body.text, mode, cost).await
}

async fn balance(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    let user_id = user.user_id.clone();
    let free = state.pricing.free_tier_credits;
    let view = blocking(move || ledger::balance_or_default(store.as_ref(), &user_id, free)).await?;
    Ok(Json(json!({
        "credits": view.account.credits,
        "userId": user.user_id,
        "subscriptionTier": view.account.subscription_tier,
        "fallback": view.fallback,
    })))
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

async fn transactions(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Query(q): Query<HistoryQuery>,
) -> Result<Json<Value>, ApiError> {
    let limit = q.limit.unwrap_or(DEFAULT_HISTORY).clamp(1, MAX_HISTORY);
    let store = state.store.clone();
    let user_id = user.user_id.clone();
    let list = blocking(move || store.list_transactions(&user_id, limit)).await??;
    Ok(Json(json!({ "transactions": list })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchaseBody {
    package_id: String,
}

async fn purchase(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<PurchaseBody>,
) -> Result<Json<Value>, ApiError> {
    let package = state
        .pricing
        .package(&body.package_id)
        .cloned()
        .ok_or_else(|| ApiError::BadRequest("Invalid package".into()))?;
    tracing::info!(user_id = %user.user_id, package = package.id.as_str(), provider = state.payments.name(), "credit purchase");

    match state.payments.checkout(&user.user_id, &package).await? {
        Checkout::Completed => {
            let store = state.store.clone();
            let user_id = user.user_id.clone();
            let credits = package.credits;
            let new_balance = blocking(move || store.credit(&user_id, credits, "purchase", None)).await??;
            Ok(Json(json!({
                "success": true,
                "creditsAdded": package.credits,
                "newBalance": new_balance,
                "package": package.id,
            })))
        }
        Checkout::Pending {
            session_id,
            checkout_url,
        } => Ok(Json(json!({
            "success": true,
            "pending": true,
            "sessionId": session_id,
            "checkoutUrl": checkout_url,
            "package": package.id,
        }))),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmBody {
    session_id: String,
}

async fn confirm(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<ConfirmBody>,
) -> Result<Json<Value>, ApiError> {
    let status = match state.payments.session_status(&body.session_id).await {
        Ok(s) => s,
        Err(PaymentError::Unavailable) => {
            return Err(ApiError::BadRequest(format!(
                "The {} payment provider has no checkout sessions to confirm",
                state.payments.name()
            )))
        }
        Err(e) => return Err(e.into()),
    };
    if status.user_id.as_deref() != Some(user.user_id.as_str()) {
        tracing::warn!(user_id = %user.user_id, session_id = %body.session_id, "checkout session belongs to another user");
        return Err(ApiError::Forbidden("Checkout session does not belong to this user".into()));
    }
    if !status.paid {
        return Err(ApiError::PaymentRequired("Checkout session is not paid yet".into()));
    }
    let package = status
        .package_id
        .as_deref()
        .and_then(|id| state.pricing.package(id))
        .cloned()
        .ok_or_else(|| ApiError::Upstream("Checkout session has no known package".into()))?;

    let store = state.store.clone();
    let user_id = user.user_id.clone();
    let session_id = body.session_id.clone();
    let credits = package.credits;
    let new_balance =
        blocking(move || store.credit(&user_id, credits, "purchase", Some(&session_id))).await??;
    Ok(Json(json!({
        "success": true,
        "creditsAdded": package.credits,
        "newBalance": new_balance,
        "package": package.id,
        "sessionId": body.session_id,
    })))
}

async fn free_credits(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, ApiError> {
    let store = state.store.clone();
    let user_id = user.user_id.clone();
    let credits = state.pricing.free_tier_credits;
    let new_balance = blocking(move || store.credit(&user_id, credits, FREE_TIER_REASON, Some(FREE_TIER_REASON)))
        .await?
        .map_err(|e| match e {
            LedgerError::DuplicateReference(_) => {
                ApiError::Conflict("Free credits have already been claimed".into())
            }
            other => other.into(),
        })?;
    Ok(Json(json!({
        "success": true,
        "creditsAdded": credits,
        "newBalance": new_balance,
        "message": "Free credits added successfully",
    })))
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let store_ok = match state.data_dir.clone() {
        Some(dir) => blocking(move || health::check_data_dir(&dir)).await.unwrap_or(false),
        None => true,
    };
    let payments_ok = state.payments_probe.as_ref().map_or(true, |p| p.is_ok());
    let timestamp = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .unwrap_or_default();
    Json(json!({
        "status": if store_ok { "OK" } else { "DEGRADED" },
        "timestamp": timestamp,
        "service": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "features": {
            "creditSystem": true,
            "authentication": true,
            "fileUpload": true,
        },
        "checks": {
            "store": {"backend": state.store.backend(), "ok": store_ok},
            "payments": {"provider": state.payments.name(), "ok": payments_ok},
        }
    }))
}

async fn info() -> Json<Value> {
    Json(json!({
        "name": SERVICE_NAME,
        "version": env!("CARGO_PKG_VERSION"),
        "creditSystem": true,
        "features": ["pdf-summarization", "credit-management", "user-authentication"],
        "endpoints": {
            "health": "/api/health",
            "info": "/api/info",
            "summary": "/api/summary",
            "credits": "/api/credits",
        }
    }))
}

async fn credit_costs(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "creditCosts": state.pricing.costs }))
}

async fn packages(State(state): State<AppState>) -> Json<Value> {
    Json(json!({ "packages": state.pricing.packages() }))
}

async fn api_not_found(OriginalUri(uri): OriginalUri) -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(json!({
            "error": "API endpoint not found",
            "path": uri.path(),
            "availableEndpoints": ["/api/health", "/api/info", "/api/summary", "/api/credits"],
        })),
    )
}
