//! HTTP surface.
//!
//! Routes, extractors and the secure-error boundary. Handlers stay thin:
//! they authenticate, rate-limit, enforce CSRF where required, and call
//! into the engine/auth services. Error kinds map to statuses and a safe
//! message policy here; internal failures leave only a correlation id in
//! the response.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::{ConnectInfo, Path, Query, State};
use axum::http::{header, HeaderMap, Method, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tower_http::cors::{AllowOrigin, CorsLayer};

use arena_auth::{
    csrf, AuthError, RateLimit,
};
use arena_cache::records::ChallengeStatus;
use arena_common::correlation_id;
use arena_db::{TournamentQueries, User, UserQueries, WhitelistEntry, WhitelistQueries};
use arena_engine::EngineError;
use arena_lightning::{lnurl, sats_to_usd};

use crate::app::App;

type AppState = State<Arc<App>>;

/// Build the router with all routes and layers.
pub fn router(app: Arc<App>) -> Router {
    let cors = cors_layer(&app);

    Router::new()
        // Auth
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
        .route("/auth/logout", post(logout))
        .route("/auth/logout-all", post(logout_all))
        // LNURL-auth
        .route("/auth/lnurl/challenge", post(lnurl_challenge))
        .route("/auth/lnurl/callback", get(lnurl_callback))
        .route("/auth/lnurl/status/:k1", get(lnurl_status))
        .route("/auth/lnurl/complete", post(lnurl_complete))
        // Tournaments
        .route("/tournaments/current", get(current_tournament))
        .route("/tournaments/current/leaderboard", get(leaderboard))
        .route("/tournaments/current/entry", get(my_entry))
        // Payments
        .route("/payments/buy-in", post(buy_in))
        .route("/payments/status/:hash", get(buy_in_status))
        .route("/payments/webhook", post(payments_webhook))
        // Wallet
        .route("/wallet/balance", get(wallet_balance))
        .route("/wallet/deposit", post(wallet_deposit))
        .route("/wallet/deposit/status/:hash", get(deposit_status))
        .route("/wallet/transactions", get(wallet_transactions))
        // Game
        .route("/game/attempts", get(game_attempts))
        .route("/game/start-attempt", post(start_attempt))
        .route("/game/submit", post(submit_score))
        .route("/game/stats", get(game_stats))
        // Admin
        .route("/admin/bootstrap", post(admin_bootstrap))
        .route("/admin/whitelist", post(whitelist_add))
        .route("/admin/whitelist/revoke", post(whitelist_revoke))
        // Misc
        .route("/csrf-token", get(csrf_token))
        .route("/health", get(health))
        .layer(middleware::from_fn_with_state(app.clone(), require_origin_layer))
        .layer(middleware::from_fn_with_state(
            app.clone(),
            security_log_layer,
        ))
        .layer(cors)
        .with_state(app)
}

fn cors_layer(app: &App) -> CorsLayer {
    let origins: Vec<_> = app
        .config
        .cors
        .allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::HeaderName::from_static(csrf::CSRF_HEADER),
        ])
        .allow_credentials(true)
}

// ---------------------------------------------------------------------
// Error boundary

pub struct ApiError {
    status: StatusCode,
    body: serde_json::Value,
}

impl ApiError {
    fn new(status: StatusCode, error: impl Into<String>) -> Self {
        Self {
            status,
            body: json!({ "error": error.into() }),
        }
    }

    fn with_code(status: StatusCode, error: impl Into<String>, code: &str) -> Self {
        Self {
            status,
            body: json!({ "error": error.into(), "code": code }),
        }
    }

    fn internal() -> Self {
        let correlation = correlation_id();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            body: json!({
                "error": "An unexpected error occurred",
                "correlationId": correlation,
            }),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match &e {
            EngineError::Validation(message) => ApiError::new(StatusCode::BAD_REQUEST, message),
            EngineError::NoTournament => {
                ApiError::new(StatusCode::BAD_REQUEST, "No open tournament")
            }
            EngineError::NoEntry => ApiError::with_code(
                StatusCode::FORBIDDEN,
                "No entry for this tournament",
                "NO_ENTRY",
            ),
            EngineError::MaxAttempts => ApiError::with_code(
                StatusCode::BAD_REQUEST,
                "Maximum attempts reached",
                "MAX_ATTEMPTS",
            ),
            EngineError::InvalidAttempt => ApiError::with_code(
                StatusCode::BAD_REQUEST,
                "Attempt is invalid or already used",
                "INVALID_ATTEMPT",
            ),
            EngineError::InsufficientBalance {
                balance_sats,
                required_sats,
            } => ApiError {
                status: StatusCode::BAD_REQUEST,
                body: json!({
                    "error": "Insufficient balance",
                    "code": "INSUFFICIENT_BALANCE",
                    "balanceSats": balance_sats,
                    "requiredSats": required_sats,
                }),
            },
            EngineError::ScoreRejected { reasons } => ApiError {
                status: StatusCode::BAD_REQUEST,
                body: json!({
                    "error": "Score failed validation",
                    "code": "VALIDATION_FAILED",
                    "reasons": reasons,
                }),
            },
            EngineError::DuplicateEntry => ApiError::with_code(
                StatusCode::BAD_REQUEST,
                "Already entered in this tournament",
                "DUPLICATE_ENTRY",
            ),
            EngineError::Forbidden => ApiError::new(StatusCode::FORBIDDEN, "Forbidden"),
            EngineError::InvalidSignature => {
                ApiError::new(StatusCode::UNAUTHORIZED, "Invalid signature")
            }
            EngineError::NotFound => ApiError::new(StatusCode::NOT_FOUND, "Not found"),
            EngineError::Lightning(le) if le.is_transient() => ApiError::with_code(
                StatusCode::BAD_GATEWAY,
                "Payment service temporarily unavailable",
                "UPSTREAM_UNAVAILABLE",
            ),
            EngineError::Lightning(le) => {
                ApiError::with_code(StatusCode::BAD_GATEWAY, le.to_string(), le.code())
            }
            EngineError::Db(db) if db.is_transient() => ApiError::new(
                StatusCode::BAD_GATEWAY,
                "Storage temporarily unavailable",
            ),
            EngineError::Db(_) | EngineError::Cache(_) | EngineError::Internal(_) => {
                tracing::error!(error = %e, "Internal engine error");
                ApiError::internal()
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match &e {
            AuthError::Validation(message) => ApiError::new(StatusCode::BAD_REQUEST, message),
            AuthError::InvalidCredentials => {
                ApiError::new(StatusCode::UNAUTHORIZED, "Invalid credentials")
            }
            AuthError::Unauthenticated => {
                ApiError::new(StatusCode::UNAUTHORIZED, "Authentication required")
            }
            AuthError::Forbidden | AuthError::NotWhitelisted => {
                ApiError::new(StatusCode::FORBIDDEN, "Forbidden")
            }
            AuthError::ChallengeInvalid => {
                ApiError::new(StatusCode::BAD_REQUEST, "Challenge is invalid or expired")
            }
            AuthError::RateLimited { retry_after_secs } => ApiError {
                status: StatusCode::TOO_MANY_REQUESTS,
                body: json!({
                    "error": "Too many requests",
                    "retryAfterSecs": retry_after_secs,
                }),
            },
            AuthError::Db(_) | AuthError::Cache(_) => {
                tracing::error!(error = %e, "Internal auth error");
                ApiError::internal()
            }
        }
    }
}

// ---------------------------------------------------------------------
// Request context helpers

fn client_key(headers: &HeaderMap, addr: &SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .unwrap_or_else(|| addr.ip().to_string())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// Authenticate the caller from the bearer token.
fn require_user(app: &App, headers: &HeaderMap) -> Result<User, ApiError> {
    let token = bearer_token(headers).ok_or(AuthError::Unauthenticated)?;
    let session = app
        .sessions
        .get(token)?
        .ok_or(AuthError::Unauthenticated)?;
    let user = app
        .db
        .with_conn(|conn| conn.get_user(&session.user_id))
        .map_err(EngineError::from)?
        .ok_or(AuthError::Unauthenticated)?;
    Ok(user)
}

/// Double-submit CSRF check for state-changing endpoints.
fn require_csrf(headers: &HeaderMap) -> Result<(), ApiError> {
    let cookie = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies.split(';').find_map(|part| {
                let (name, value) = part.trim().split_once('=')?;
                (name == csrf::CSRF_COOKIE).then_some(value)
            })
        });
    let header = headers
        .get(csrf::CSRF_HEADER)
        .and_then(|v| v.to_str().ok());

    if csrf::validate_csrf(cookie, header) {
        Ok(())
    } else {
        Err(ApiError::new(StatusCode::FORBIDDEN, "CSRF token mismatch"))
    }
}

fn rate_limit(
    app: &App,
    limit: RateLimit,
    headers: &HeaderMap,
    addr: &SocketAddr,
) -> Result<(), ApiError> {
    let key = client_key(headers, addr);
    app.rate_limiter.check(limit, &key).map_err(ApiError::from)
}

/// Paths reachable without an `Origin` header: the HMAC-signed webhook
/// and the health check.
const ORIGIN_EXEMPT_PATHS: [&str; 2] = ["/payments/webhook", "/health"];

/// Enforce the origin allow-list on every other route.
///
/// The CORS layer only decorates responses for browsers; this is the
/// server-side check. Requests with no `Origin` at all are rejected
/// outside the exempt paths, and a present `Origin` must match the
/// configured allow-list when one is set.
async fn require_origin_layer(
    State(app): AppState,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let path = request.uri().path();
    if !ORIGIN_EXEMPT_PATHS.contains(&path) {
        let origin = request
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok());
        match origin {
            None => {
                return ApiError::new(StatusCode::FORBIDDEN, "Origin header required")
                    .into_response();
            }
            Some(origin) => {
                let allowed = &app.config.cors.allowed_origins;
                if !allowed.is_empty() && !allowed.iter().any(|o| o == origin) {
                    return ApiError::new(StatusCode::FORBIDDEN, "Origin not allowed")
                        .into_response();
                }
            }
        }
    }
    next.run(request).await
}

/// Structured record for security-relevant responses.
async fn security_log_layer(
    State(_app): AppState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let ua = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .chars()
        .take(100)
        .collect::<String>();
    let ip = client_key(request.headers(), &addr);
    let started = Instant::now();

    let response = next.run(request).await;

    let status = response.status().as_u16();
    let duration_ms = started.elapsed().as_millis() as u64;
    match status {
        401 | 403 | 429 => {
            tracing::warn!(%method, %path, status, duration_ms, %ip, ua = %ua, "Request denied");
        }
        500..=599 => {
            tracing::error!(%method, %path, status, duration_ms, %ip, ua = %ua, "Request failed");
        }
        _ => {}
    }
    response
}

// ---------------------------------------------------------------------
// Auth handlers

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterRequest {
    username: String,
    password: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    user_id: String,
    display_name: String,
    token: String,
}

async fn register(
    State(app): AppState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    rate_limit(&app, RateLimit::AUTH, &headers, &addr)?;
    let (user, token) =
        app.accounts
            .register(&body.username, &body.password, body.display_name.as_deref())?;
    Ok(Json(AuthResponse {
        user_id: user.id,
        display_name: user.display_name,
        token,
    }))
}

#[derive(Deserialize)]
struct LoginRequest {
    username: String,
    password: String,
}

async fn login(
    State(app): AppState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    rate_limit(&app, RateLimit::AUTH, &headers, &addr)?;
    let (user, token) = app.accounts.login(&body.username, &body.password)?;
    Ok(Json(AuthResponse {
        user_id: user.id,
        display_name: user.display_name,
        token,
    }))
}

async fn me(State(app): AppState, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    Ok(Json(json!({
        "userId": user.id,
        "username": user.username,
        "displayName": user.display_name,
        "lightningAddress": user.lightning_address,
    })))
}

async fn logout(State(app): AppState, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    // Destroying a session only needs the token itself.
    let token = bearer_token(&headers).ok_or(AuthError::Unauthenticated)?;
    let destroyed = app.accounts.logout(token)?;
    Ok(Json(json!({ "loggedOut": destroyed })))
}

async fn logout_all(
    State(app): AppState,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    let destroyed = app.accounts.logout_all(&user.id)?;
    Ok(Json(json!({ "sessionsDestroyed": destroyed })))
}

// ---------------------------------------------------------------------
// LNURL-auth handlers

async fn lnurl_challenge(
    State(app): AppState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    rate_limit(&app, RateLimit::AUTH, &headers, &addr)?;
    let k1 = app.lnurl_auth.create_challenge()?;

    let base = app
        .config
        .server
        .public_url
        .as_deref()
        .unwrap_or("http://localhost:8080")
        .trim_end_matches('/');
    let callback = format!("{}/auth/lnurl/callback?tag=login&k1={}", base, k1);
    let encoded = lnurl::encode_lnurl(&callback).map_err(EngineError::from)?;
    Ok(Json(json!({ "k1": k1, "lnurl": encoded })))
}

#[derive(Deserialize)]
struct LnurlCallbackParams {
    k1: String,
    sig: String,
    key: String,
}

/// Wallet-facing callback (LUD-04 shape: `{"status": "OK"}` on success).
async fn lnurl_callback(
    State(app): AppState,
    Query(params): Query<LnurlCallbackParams>,
) -> Json<serde_json::Value> {
    match app.lnurl_auth.verify(&params.k1, &params.sig, &params.key) {
        Ok(()) => Json(json!({ "status": "OK" })),
        Err(e) => {
            let reason = match e {
                AuthError::NotWhitelisted => "key not whitelisted",
                AuthError::ChallengeInvalid => "challenge invalid or expired",
                _ => "signature verification failed",
            };
            Json(json!({ "status": "ERROR", "reason": reason }))
        }
    }
}

async fn lnurl_status(
    State(app): AppState,
    Path(k1): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let status = app.lnurl_auth.status(&k1)?;
    let label = match status {
        ChallengeStatus::Pending => "pending",
        ChallengeStatus::Verified => "verified",
        ChallengeStatus::Consumed => "consumed",
    };
    Ok(Json(json!({ "status": label })))
}

#[derive(Deserialize)]
struct LnurlCompleteRequest {
    k1: String,
}

async fn lnurl_complete(
    State(app): AppState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<LnurlCompleteRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    rate_limit(&app, RateLimit::AUTH, &headers, &addr)?;
    let (user, token) = app.lnurl_auth.complete(&body.k1)?;
    Ok(Json(AuthResponse {
        user_id: user.id,
        display_name: user.display_name,
        token,
    }))
}

// ---------------------------------------------------------------------
// Tournament handlers

async fn current_tournament(State(app): AppState) -> Result<Json<serde_json::Value>, ApiError> {
    let now = Utc::now();
    let tournament = app.engine.tournaments.current_or_create(now)?;
    let quote = app.engine.wallet.quote().await?;

    let config = &app.engine.config;
    let distributable =
        ((tournament.prize_pool_sats as f64) * (1.0 - config.house_fee)).floor() as i64;
    Ok(Json(json!({
        "id": tournament.id,
        "date": tournament.date,
        "status": tournament.status,
        "buyInSats": tournament.buy_in_sats,
        "prizePoolSats": tournament.prize_pool_sats,
        "jackpotUsd": sats_to_usd(distributable, quote.usd_per_btc),
        "payoutStructure": {
            "houseFee": config.house_fee,
            "shares": config.payout_shares,
        },
    })))
}

async fn leaderboard(State(app): AppState) -> Result<Json<serde_json::Value>, ApiError> {
    let now = Utc::now();
    let tournament = app.engine.tournaments.current_or_create(now)?;
    let rows = app.engine.tournaments.leaderboard(&tournament.id, 100)?;
    let rows: Vec<_> = rows
        .into_iter()
        .map(|row| {
            json!({
                "userId": row.user_id,
                "displayName": row.display_name,
                "bestScore": row.best_score,
            })
        })
        .collect();
    Ok(Json(json!({ "leaderboard": rows })))
}

async fn my_entry(State(app): AppState, headers: HeaderMap) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    let now = Utc::now();
    let tournament = app
        .engine
        .tournaments
        .current_open(now)?
        .ok_or(EngineError::NoTournament)?;
    let entry = app.engine.tournaments.entry_for(&tournament.id, &user.id)?;

    Ok(Json(match entry {
        Some(entry) => json!({
            "entered": true,
            "attemptsUsed": entry.attempts_used,
            "maxAttempts": entry.max_attempts,
            "bestScore": entry.best_score,
            "scores": [entry.attempt1_score, entry.attempt2_score, entry.attempt3_score],
        }),
        None => json!({ "entered": false }),
    }))
}

// ---------------------------------------------------------------------
// Payment handlers

async fn buy_in(
    State(app): AppState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    rate_limit(&app, RateLimit::PAYMENTS, &headers, &addr)?;

    let now = Utc::now();
    let tournament = app
        .engine
        .tournaments
        .current_open(now)?
        .ok_or(EngineError::NoTournament)?;
    let invoice = app.engine.payments.create_buy_in(&user.id, &tournament).await?;
    Ok(Json(serde_json::to_value(invoice).unwrap_or_default()))
}

async fn buy_in_status(
    State(app): AppState,
    headers: HeaderMap,
    Path(hash): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    let status = app.engine.payments.buy_in_status(&user.id, &hash).await?;
    Ok(Json(serde_json::to_value(status).unwrap_or_default()))
}

/// Signed webhook from the Lightning backend. Exempt from CSRF and
/// session auth; the HMAC over the raw body is the authentication.
async fn payments_webhook(
    State(app): AppState,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = arena_lightning::webhook::SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|v| v.to_str().ok());

    let ack = app.engine.payments.process_webhook(
        app.config.lnbits.webhook_secret.as_deref(),
        &body,
        signature,
    )?;
    Ok(Json(serde_json::to_value(ack).unwrap_or_default()))
}

// ---------------------------------------------------------------------
// Wallet handlers

async fn wallet_balance(
    State(app): AppState,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    let view = app.engine.wallet.balance(&user.id).await?;
    Ok(Json(serde_json::to_value(view).unwrap_or_default()))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DepositRequest {
    amount_sats: i64,
}

async fn wallet_deposit(
    State(app): AppState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<DepositRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    rate_limit(&app, RateLimit::PAYMENTS, &headers, &addr)?;
    let invoice = app.engine.wallet.deposit(&user.id, body.amount_sats).await?;
    Ok(Json(serde_json::to_value(invoice).unwrap_or_default()))
}

async fn deposit_status(
    State(app): AppState,
    headers: HeaderMap,
    Path(hash): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    let status = app.engine.wallet.deposit_status(&user.id, &hash).await?;
    Ok(Json(serde_json::to_value(status).unwrap_or_default()))
}

#[derive(Deserialize)]
struct PageParams {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    20
}

async fn wallet_transactions(
    State(app): AppState,
    headers: HeaderMap,
    Query(page): Query<PageParams>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    let rows = app.engine.wallet.transactions(&user.id, page.limit, page.offset)?;
    let rows: Vec<_> = rows
        .into_iter()
        .map(|tx| {
            json!({
                "id": tx.id,
                "kind": tx.kind,
                "amountSats": tx.amount_sats,
                "description": tx.description,
                "reference": tx.reference,
                "createdAt": tx.created_at,
            })
        })
        .collect();
    Ok(Json(json!({ "transactions": rows })))
}

// ---------------------------------------------------------------------
// Game handlers

async fn game_attempts(
    State(app): AppState,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    let view = app.engine.attempts.attempts(&user.id, Utc::now()).await?;
    Ok(Json(serde_json::to_value(view).unwrap_or_default()))
}

async fn start_attempt(
    State(app): AppState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    require_csrf(&headers)?;
    rate_limit(&app, RateLimit::GAME_SUBMIT, &headers, &addr)?;

    let view = app.engine.attempts.start_attempt(&user.id, Utc::now()).await?;
    Ok(Json(serde_json::to_value(view).unwrap_or_default()))
}

async fn submit_score(
    State(app): AppState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<arena_engine::attempts::SubmitScoreRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    require_csrf(&headers)?;
    rate_limit(&app, RateLimit::GAME_SUBMIT, &headers, &addr)?;

    let view = app
        .engine
        .attempts
        .submit_score(&user.id, Utc::now(), &body)
        .await?;
    Ok(Json(serde_json::to_value(view).unwrap_or_default()))
}

async fn game_stats(
    State(app): AppState,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    let user = require_user(&app, &headers)?;
    let now = Utc::now();
    let tournament = app.engine.tournaments.current_or_create(now)?;
    let entry = app.engine.tournaments.entry_for(&tournament.id, &user.id)?;
    let players = app
        .db
        .with_conn(|conn| conn.entry_count(&tournament.id))
        .map_err(EngineError::from)?;

    let config = &app.engine.config;
    let distributable =
        ((tournament.prize_pool_sats as f64) * (1.0 - config.house_fee)).floor() as i64;
    Ok(Json(json!({
        "date": tournament.date,
        "playersToday": players,
        "prizePoolSats": tournament.prize_pool_sats,
        "distributableSats": distributable,
        "bestScore": entry.as_ref().map(|e| e.best_score).unwrap_or(0),
        "attemptsUsed": entry.as_ref().map(|e| e.attempts_used).unwrap_or(0),
        "maxAttempts": config.max_attempts,
    })))
}

// ---------------------------------------------------------------------
// Admin handlers

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BootstrapRequest {
    secret: String,
    linking_key: String,
}

async fn admin_bootstrap(
    State(app): AppState,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<BootstrapRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    rate_limit(&app, RateLimit::ADMIN_BOOTSTRAP, &headers, &addr)?;
    app.lnurl_auth.bootstrap_admin(
        app.config.admin.bootstrap_secret.as_deref(),
        &body.secret,
        &body.linking_key,
    )?;
    Ok(Json(json!({ "bootstrapped": true })))
}

/// The caller must be a session user whose linking key is an admin
/// whitelist entry.
fn require_admin(app: &App, headers: &HeaderMap) -> Result<User, ApiError> {
    let user = require_user(app, headers)?;
    let is_admin = user
        .linking_key
        .as_deref()
        .and_then(|key| {
            app.db
                .with_conn(|conn| conn.whitelist_get(key))
                .ok()
                .flatten()
        })
        .map(|entry| entry.is_admin)
        .unwrap_or(false);
    if !is_admin {
        return Err(ApiError::new(StatusCode::FORBIDDEN, "Forbidden"));
    }
    Ok(user)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WhitelistRequest {
    linking_key: String,
    #[serde(default)]
    display_name: Option<String>,
}

async fn whitelist_add(
    State(app): AppState,
    headers: HeaderMap,
    Json(body): Json<WhitelistRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let admin = require_admin(&app, &headers)?;
    require_csrf(&headers)?;

    app.db
        .with_conn(|conn| {
            conn.whitelist_add(&WhitelistEntry {
                linking_key: body.linking_key.clone(),
                display_name: body.display_name.clone(),
                is_admin: false,
                approved_by: admin.id.clone(),
                approved_at: arena_common::unix_now(),
            })
        })
        .map_err(EngineError::from)?;
    Ok(Json(json!({ "added": true })))
}

async fn whitelist_revoke(
    State(app): AppState,
    headers: HeaderMap,
    Json(body): Json<WhitelistRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_admin(&app, &headers)?;
    require_csrf(&headers)?;

    let removed = app.lnurl_auth.revoke(&body.linking_key)?;
    Ok(Json(json!({ "removed": removed })))
}

// ---------------------------------------------------------------------
// Misc handlers

/// Mint (or re-issue) the CSRF cookie.
async fn csrf_token() -> Response {
    let token = csrf::mint_csrf_token();
    let cookie = format!(
        "{}={}; Path=/; SameSite=Strict",
        csrf::CSRF_COOKIE,
        token
    );
    (
        [(header::SET_COOKIE, cookie)],
        Json(json!({ "csrfToken": token })),
    )
        .into_response()
}

async fn health(State(app): AppState) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "sessionStore": if app.config.cache.url.is_some() { "remote" } else { "memory" },
    }))
}
