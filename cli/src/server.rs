use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use anyhow::Context;
use axum::{
    Json, Router,
    body::Bytes,
    extract::{FromRequest, Path, Request, State},
    http::{HeaderValue, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, patch, post},
};
use serde::{Serialize, de::DeserializeOwned};
use tower_http::{limit::RequestBodyLimitLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use cookbook_core::error::CookbookError;
use cookbook_core::models::{IngredientUpdate, NewIngredient, NewRecipe, Recipe};
use cookbook_core::service::CookbookService;

const BODY_LIMIT: usize = 1024 * 1024; // 1 MiB

const FUNCTION_KEY_HEADER: &str = "x-functions-key";

#[derive(Clone)]
struct AppState {
    service: Arc<Mutex<CookbookService>>,
    api_key: Option<String>,
}

impl AppState {
    fn service(&self) -> MutexGuard<'_, CookbookService> {
        self.service.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// --- Error handling ---

enum ApiError {
    NotFound(String),
    BadRequest(String),
    WriteFailed(String),
    Internal(anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            Self::WriteFailed(msg) => {
                error!("Write failed: {msg}");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
            Self::Internal(err) => {
                error!("Internal server error: {err:#}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<CookbookError> for ApiError {
    fn from(err: CookbookError) -> Self {
        match err {
            CookbookError::NotFound(msg) => Self::NotFound(msg),
            CookbookError::Validation(msg) => Self::BadRequest(msg),
            CookbookError::WriteFailed(msg) => Self::WriteFailed(msg),
            CookbookError::Store(err) => Self::Internal(err),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &[u8]) -> Result<T, CookbookError> {
    serde_json::from_slice(body).map_err(|e| {
        warn!("Rejected malformed request body: {e}");
        CookbookError::validation(format!("Malformed request body: {e}"))
    })
}

/// JSON body extractor that accepts any content type and reports malformed
/// payloads as 400 with the parser's message.
struct JsonBody<T>(T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    Bytes: FromRequest<S>,
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = Response;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let body = Bytes::from_request(req, state)
            .await
            .map_err(IntoResponse::into_response)?;
        parse_body(&body)
            .map(JsonBody)
            .map_err(|e| ApiError::from(e).into_response())
    }
}

// --- Middleware ---

fn presented_key(request: &Request) -> Option<&str> {
    let headers = request.headers();
    if let Some(key) = headers
        .get(FUNCTION_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        return Some(key);
    }
    if let Some(token) = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
    {
        return Some(token);
    }
    request
        .uri()
        .query()?
        .split('&')
        .find_map(|pair| pair.strip_prefix("code="))
}

async fn require_auth(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(ref expected_key) = state.api_key {
        let authorized = presented_key(&request).is_some_and(|key| key == expected_key);

        if !authorized {
            warn!(path = %request.uri().path(), "rejected request with invalid or missing key");
            return (
                StatusCode::UNAUTHORIZED,
                Json(ErrorResponse {
                    error: "Invalid or missing API key".to_string(),
                }),
            )
                .into_response();
        }
    }
    next.run(request).await
}

async fn security_headers(request: Request, next: Next) -> Response {
    let mut response = next.run(request).await;
    let headers = response.headers_mut();
    headers.insert(
        "x-content-type-options",
        HeaderValue::from_static("nosniff"),
    );
    headers.insert("x-frame-options", HeaderValue::from_static("DENY"));
    headers.insert(
        "content-security-policy",
        HeaderValue::from_static("default-src 'none'"),
    );
    response
}

// --- Recipe handlers ---
//
// Handlers that modify an existing recipe take the raw body and parse it
// only after the recipe (and ingredient) lookup succeeded.

async fn list_recipes(State(state): State<AppState>) -> Result<Response, ApiError> {
    let recipes = state.service().list_recipes()?;
    if recipes.is_empty() {
        Ok(StatusCode::NO_CONTENT.into_response())
    } else {
        Ok(Json(recipes).into_response())
    }
}

async fn get_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Recipe>, ApiError> {
    let recipe = state.service().get_recipe(&id)?;
    Ok(Json(recipe))
}

async fn create_recipe(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<NewRecipe>,
) -> Result<Json<Recipe>, ApiError> {
    let recipe = state.service().create_recipe(&req)?;
    Ok(Json(recipe))
}

async fn update_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Recipe>, ApiError> {
    let recipe = state
        .service()
        .update_recipe_with(&id, || parse_body(&body))?;
    Ok(Json(recipe))
}

async fn delete_recipe(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.service().delete_recipe(&id)?;
    Ok(StatusCode::OK)
}

// --- Ingredient handlers ---

async fn add_ingredients(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<Recipe>, ApiError> {
    let recipe = state
        .service()
        .add_ingredients_with(&id, || parse_body::<Vec<NewIngredient>>(&body))?;
    Ok(Json(recipe))
}

async fn edit_ingredient(
    State(state): State<AppState>,
    Path((recipe_id, ingredient_id)): Path<(String, String)>,
    body: Bytes,
) -> Result<Json<Recipe>, ApiError> {
    let recipe = state
        .service()
        .edit_ingredient_with(&recipe_id, &ingredient_id, || {
            parse_body::<IngredientUpdate>(&body)
        })?;
    Ok(Json(recipe))
}

// --- Router builder ---

fn build_router(state: AppState, route_prefix: &str) -> Router {
    let routes = Router::new()
        .route("/recipes", get(list_recipes).post(create_recipe))
        .route(
            "/recipes/{id}",
            get(get_recipe).put(update_recipe).delete(delete_recipe),
        )
        .route("/recipes/{id}/ingredients", post(add_ingredients))
        .route(
            "/recipes/{id}/ingredients/{ingredient_id}",
            patch(edit_ingredient),
        )
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let app = if route_prefix.is_empty() {
        routes
    } else {
        Router::new().nest(route_prefix, routes)
    };

    app.layer(RequestBodyLimitLayer::new(BODY_LIMIT))
        .layer(middleware::from_fn(security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// --- Server startup ---

pub async fn start_server(
    service: CookbookService,
    port: u16,
    bind: &str,
    route_prefix: &str,
    api_key: Option<String>,
) -> anyhow::Result<()> {
    let state = AppState {
        service: Arc::new(Mutex::new(service)),
        api_key: api_key.clone(),
    };

    let app = build_router(state, route_prefix);

    if let Some(ref key) = api_key {
        info!(
            "API key: {}...{} (see api_key file in data directory)",
            key.get(..4).unwrap_or_default(),
            key.get(key.len().saturating_sub(4)..).unwrap_or_default(),
        );
    } else {
        warn!("Authentication disabled (--no-auth). API is open to anyone.");
    }

    if bind != "127.0.0.1" && bind != "localhost" && api_key.is_none() {
        warn!(
            "Listening on {bind} with no authentication. Any device on your network can access this API."
        );
    }

    let listener = tokio::net::TcpListener::bind(format!("{bind}:{port}"))
        .await
        .with_context(|| format!("failed to bind {bind}:{port}"))?;
    info!("Listening on http://{bind}:{port}{route_prefix}/recipes");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
