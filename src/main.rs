use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use clap::Parser;
use policyrec::services::recommendation::UserInsights;
use policyrec::{init_tracing, AppState, Config};
use serde::{Deserialize, Serialize};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "policyrec-server", about = "Insurance policy recommendation server")]
struct Args {
    /// Path to a configuration file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RecommendationQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SimilarQuery {
    limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct TrackInteractionRequest {
    user_id: Uuid,
    policy_id: Uuid,
    kind: policyrec::InteractionKind,
    value: f64,
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FeedbackRequest {
    user_id: Uuid,
    policy_id: Uuid,
    rating: f64,
    comment: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    message: String,
}

impl<T> ApiResponse<T> {
    fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: "Success".to_string(),
        }
    }

    fn error(message: String) -> Self {
        Self {
            success: false,
            data: None,
            message,
        }
    }
}

async fn health_check(
    State(state): State<AppState>,
) -> Json<ApiResponse<policyrec::HealthReport>> {
    Json(ApiResponse::success(
        state.recommendation_service.health_check(),
    ))
}

/// The recommendation path never returns an error status: degraded modes
/// surface as fallback-tagged items in a normal response.
async fn get_recommendations(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Query(params): Query<RecommendationQuery>,
) -> Json<ApiResponse<Vec<policyrec::Recommendation>>> {
    let recommendations = state
        .recommendation_service
        .get_recommendations(user_id, params.limit)
        .await;
    Json(ApiResponse::success(recommendations))
}

async fn track_interaction(
    State(state): State<AppState>,
    Json(request): Json<TrackInteractionRequest>,
) -> Json<ApiResponse<Uuid>> {
    match state.recommendation_service.track_interaction(
        request.user_id,
        request.policy_id,
        request.kind,
        request.value,
        request.session_id,
    ) {
        Ok(event) => Json(ApiResponse::success(event.id)),
        Err(e) => Json(ApiResponse::error(e.to_string())),
    }
}

async fn submit_feedback(
    State(state): State<AppState>,
    Json(request): Json<FeedbackRequest>,
) -> Json<ApiResponse<Uuid>> {
    if let Some(comment) = request.comment.as_deref() {
        tracing::debug!(user_id = %request.user_id, comment, "feedback comment received");
    }
    match state.recommendation_service.track_interaction(
        request.user_id,
        request.policy_id,
        policyrec::InteractionKind::Rate,
        request.rating,
        None,
    ) {
        Ok(event) => Json(ApiResponse::success(event.id)),
        Err(e) => Json(ApiResponse::error(e.to_string())),
    }
}

/// Privileged endpoint: training failures are reported, not swallowed.
async fn train_models(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<policyrec::TrainingReport>>, StatusCode> {
    let training = state.training_service.clone();
    let report = tokio::task::spawn_blocking(move || training.train_all_models())
        .await
        .map_err(|e| {
            tracing::error!("training task panicked: {}", e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    match report {
        Ok(report) => Ok(Json(ApiResponse::success(report))),
        Err(e) => {
            tracing::error!("training run rejected: {}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        }
    }
}

async fn similar_policies(
    State(state): State<AppState>,
    Path(policy_id): Path<Uuid>,
    Query(params): Query<SimilarQuery>,
) -> Json<ApiResponse<Vec<policyrec::SimilarPolicy>>> {
    let limit = params.limit.unwrap_or(5);
    Json(ApiResponse::success(
        state.recommendation_service.similar_policies(policy_id, limit),
    ))
}

async fn user_insights(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Json<ApiResponse<UserInsights>> {
    Json(ApiResponse::success(
        state.recommendation_service.user_insights(user_id),
    ))
}

async fn performance_report(
    State(state): State<AppState>,
) -> Json<ApiResponse<policyrec::PerformanceReport>> {
    Json(ApiResponse::success(
        state.recommendation_service.performance_report(),
    ))
}

async fn add_policy(
    State(state): State<AppState>,
    Json(policy): Json<policyrec::Policy>,
) -> Json<ApiResponse<Uuid>> {
    let id = policy.id;
    state.policies.upsert(policy);
    Json(ApiResponse::success(id))
}

async fn add_user(
    State(state): State<AppState>,
    Json(user): Json<policyrec::UserProfile>,
) -> Json<ApiResponse<Uuid>> {
    if let Err(e) = policyrec::utils::validation::validate_user_profile(&user) {
        return Json(ApiResponse::error(e.to_string()));
    }
    let id = user.id;
    state.users.upsert(user);
    Json(ApiResponse::success(id))
}

fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/recommendations/:user_id", get(get_recommendations))
        .route("/track/interaction", post(track_interaction))
        .route("/feedback", post(submit_feedback))
        .route("/models/train", post(train_models))
        .route("/policies/similar/:policy_id", get(similar_policies))
        .route("/users/:user_id/insights", get(user_insights))
        .route("/analytics/performance", get(performance_report))
        .route("/policies", post(add_policy))
        .route("/users", post(add_user))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = match args.config.as_deref() {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };
    info!("starting policyrec server with config: {:?}", config.server);

    let state = AppState::new(config.clone())?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.server.socket_addr()).await?;
    info!("server listening on {}", config.server.socket_addr());

    axum::serve(listener, app).await?;

    Ok(())
}
