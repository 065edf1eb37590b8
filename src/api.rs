// 🌐 HTTP surface - axum router over ComplianceService
//
// Handlers stay thin: decode, hand off to the service on the blocking pool
// (SQLite calls may wait on the busy timeout), encode. Errors map to
// 400 / 404 / 409 / 500; store failures never leak their detail.

use crate::comparison::ComparisonRow;
use crate::entities::{BankEntry, BankRecord, PoolStatus, Route, ShipCompliance, ShipReport};
use crate::error::ComplianceError;
use crate::services::ComplianceService;
use axum::{
    extract::{
        rejection::{JsonRejection, QueryRejection},
        Path, Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use serde::{de, Deserialize, Deserializer, Serialize};
use tower_http::cors::CorsLayer;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: ComplianceService,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub struct ApiError(pub ComplianceError);

impl From<ComplianceError> for ApiError {
    fn from(err: ComplianceError) -> Self {
        ApiError(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            ComplianceError::NotFound(_) => (StatusCode::NOT_FOUND, self.0.to_string()),
            ComplianceError::InvalidState(_) => (StatusCode::CONFLICT, self.0.to_string()),
            ComplianceError::Validation(_) => (StatusCode::BAD_REQUEST, self.0.to_string()),
            ComplianceError::Database(_) | ComplianceError::Unexpected(_) => {
                tracing::error!(error = %self.0, "request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        (status, Json(ErrorBody { message })).into_response()
    }
}

fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload
        .map(|Json(body)| body)
        .map_err(|rejection| ComplianceError::validation(rejection.body_text()).into())
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, ApiError> {
    query
        .map(|Query(params)| params)
        .map_err(|rejection| ComplianceError::validation(rejection.body_text()).into())
}

/// Run a service call on the blocking pool.
async fn call<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&ComplianceService) -> crate::error::Result<T> + Send + 'static,
{
    let service = state.service.clone();

    tokio::task::spawn_blocking(move || f(&service))
        .await
        .map_err(|e| ComplianceError::Unexpected(format!("worker task failed: {}", e)))?
        .map_err(ApiError::from)
}

// ============================================================================
// Request shapes
// ============================================================================

/// Years arrive as JSON numbers or as numeric strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawYear {
    Number(i64),
    Text(String),
}

impl RawYear {
    fn into_year<E: de::Error>(self) -> Result<i32, E> {
        match self {
            RawYear::Number(n) => {
                i32::try_from(n).map_err(|_| E::custom(format!("year {} out of range", n)))
            }
            RawYear::Text(s) => s
                .trim()
                .parse::<i32>()
                .map_err(|_| E::custom(format!("year '{}' is not a number", s))),
        }
    }
}

fn lenient_year<'de, D>(deserializer: D) -> Result<i32, D::Error>
where
    D: Deserializer<'de>,
{
    RawYear::deserialize(deserializer)?.into_year()
}

fn lenient_year_opt<'de, D>(deserializer: D) -> Result<Option<i32>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<RawYear>::deserialize(deserializer)? {
        Some(RawYear::Text(s)) if s.trim().is_empty() => Ok(None),
        Some(raw) => raw.into_year().map(Some),
        None => Ok(None),
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipYear {
    pub ship_id: String,
    #[serde(deserialize_with = "lenient_year")]
    pub year: i32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipFilter {
    pub ship_id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipOnly {
    pub ship_id: String,
}

#[derive(Deserialize)]
pub struct YearFilter {
    #[serde(default, deserialize_with = "lenient_year_opt")]
    pub year: Option<i32>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub ship_id: String,
    #[serde(deserialize_with = "lenient_year")]
    pub year: i32,
    pub ghg_intensity: f64,
    pub fuel_consumption: f64,
}

impl From<ReportRequest> for ShipReport {
    fn from(req: ReportRequest) -> Self {
        ShipReport {
            ship_id: req.ship_id,
            year: req.year,
            ghg_intensity: req.ghg_intensity,
            fuel_consumption: req.fuel_consumption,
        }
    }
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /health
async fn health_check() -> impl IntoResponse {
    Json(Health {
        status: "ok",
        version: crate::VERSION,
    })
}

/// GET /routes
async fn get_routes(State(state): State<AppState>) -> Result<Json<Vec<Route>>, ApiError> {
    call(&state, |service| service.list_routes()).await.map(Json)
}

/// POST /routes/:routeId/baseline[?year=]
async fn set_baseline(
    State(state): State<AppState>,
    Path(route_id): Path<String>,
    query: Result<Query<YearFilter>, QueryRejection>,
) -> Result<Json<Route>, ApiError> {
    let filter = query_params(query)?;

    call(&state, move |service| service.set_baseline(&route_id, filter.year))
        .await
        .map(Json)
}

/// GET /routes/comparison[?year=]
async fn get_comparison(
    State(state): State<AppState>,
    query: Result<Query<YearFilter>, QueryRejection>,
) -> Result<Json<Vec<ComparisonRow>>, ApiError> {
    let filter = query_params(query)?;

    call(&state, move |service| service.comparison(filter.year))
        .await
        .map(Json)
}

/// GET /compliance
async fn get_compliance(
    State(state): State<AppState>,
) -> Result<Json<Vec<ShipCompliance>>, ApiError> {
    call(&state, |service| service.list_compliance()).await.map(Json)
}

/// POST /compliance/cb
async fn record_compliance(
    State(state): State<AppState>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ShipCompliance>), ApiError> {
    let report: ShipReport = json_body(payload)?.into();

    call(&state, move |service| service.record_compliance(&report))
        .await
        .map(|snapshot| (StatusCode::CREATED, Json(snapshot)))
}

/// GET /compliance/cb?shipId&year
async fn get_balance(
    State(state): State<AppState>,
    query: Result<Query<ShipYear>, QueryRejection>,
) -> Result<Json<BankRecord>, ApiError> {
    let params = query_params(query)?;

    call(&state, move |service| service.get_balance(&params.ship_id, params.year))
        .await
        .map(Json)
}

/// GET /banking[?shipId]
async fn get_bank_entries(
    State(state): State<AppState>,
    query: Result<Query<ShipFilter>, QueryRejection>,
) -> Result<Json<Vec<BankEntry>>, ApiError> {
    let filter = query_params(query)?;

    call(&state, move |service| service.list_bank_entries(filter.ship_id.as_deref()))
        .await
        .map(Json)
}

/// POST /banking/bank
async fn bank_surplus(
    State(state): State<AppState>,
    payload: Result<Json<ShipYear>, JsonRejection>,
) -> Result<Json<BankRecord>, ApiError> {
    let body = json_body(payload)?;

    call(&state, move |service| service.bank_surplus(&body.ship_id, body.year))
        .await
        .map(Json)
}

/// POST /banking/apply
async fn apply_banked_surplus(
    State(state): State<AppState>,
    payload: Result<Json<ShipYear>, JsonRejection>,
) -> Result<Json<BankRecord>, ApiError> {
    let body = json_body(payload)?;

    call(&state, move |service| {
        service.apply_banked_surplus(&body.ship_id, body.year)
    })
    .await
    .map(Json)
}

/// GET /banking/history?shipId
async fn get_history(
    State(state): State<AppState>,
    query: Result<Query<ShipOnly>, QueryRejection>,
) -> Result<Json<Vec<BankEntry>>, ApiError> {
    let params = query_params(query)?;

    call(&state, move |service| service.list_history(&params.ship_id))
        .await
        .map(Json)
}

/// GET /banking/pool?shipId&year
async fn get_pool(
    State(state): State<AppState>,
    query: Result<Query<ShipYear>, QueryRejection>,
) -> Result<Json<PoolStatus>, ApiError> {
    let params = query_params(query)?;

    call(&state, move |service| service.get_pool(&params.ship_id, params.year))
        .await
        .map(Json)
}

// ============================================================================
// Router
// ============================================================================

pub fn router(service: ComplianceService) -> Router {
    let state = AppState { service };

    Router::new()
        .route("/health", get(health_check))
        .route("/routes", get(get_routes))
        .route("/routes/comparison", get(get_comparison))
        .route("/routes/:routeId/baseline", post(set_baseline))
        .route("/compliance", get(get_compliance))
        .route("/compliance/cb", get(get_balance).post(record_compliance))
        .route("/banking", get(get_bank_entries))
        .route("/banking/bank", post(bank_surplus))
        .route("/banking/apply", post(apply_banked_surplus))
        .route("/banking/history", get(get_history))
        .route("/banking/pool", get(get_pool))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::db::tests::new_route;
    use axum::body::Body;
    use axum::http::Request;
    use rusqlite::Connection;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    fn seeded_service() -> ComplianceService {
        let conn = Connection::open_in_memory().unwrap();
        db::setup_database(&conn).unwrap();
        db::insert_routes(
            &conn,
            &[
                new_route("R001", 2024, 91.0, true),
                new_route("R002", 2024, 88.0, false),
                new_route("R003", 2024, 93.5, false),
            ],
        )
        .unwrap();
        db::upsert_compliance(&conn, "S1", 2024, 500.0).unwrap();
        db::upsert_compliance(&conn, "S1", 2025, -300.0).unwrap();
        ComplianceService::new(conn)
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };

        (status, value)
    }

    #[tokio::test]
    async fn test_health() {
        let app = router(seeded_service());
        let (status, body) = send(&app, "GET", "/health", None).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn test_routes_and_comparison() {
        let app = router(seeded_service());

        let (status, routes) = send(&app, "GET", "/routes", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(routes.as_array().unwrap().len(), 3);
        assert_eq!(routes[0]["routeId"], "R001");
        assert_eq!(routes[0]["isBaseline"], true);

        let (status, rows) = send(&app, "GET", "/routes/comparison?year=2024", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(rows[0]["percentDiff"], 0.0);
        assert_eq!(rows[2]["routeId"], "R003");
        assert_eq!(rows[2]["compliant"], false);

        let (status, _) = send(&app, "GET", "/routes/comparison?year=2030", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_set_baseline_endpoint() {
        let app = router(seeded_service());

        let (status, route) = send(&app, "POST", "/routes/R002/baseline", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(route["isBaseline"], true);

        let (_, routes) = send(&app, "GET", "/routes", None).await;
        let baselines: Vec<&Value> = routes
            .as_array()
            .unwrap()
            .iter()
            .filter(|r| r["isBaseline"] == true)
            .collect();
        assert_eq!(baselines.len(), 1);
        assert_eq!(baselines[0]["routeId"], "R002");

        let (status, body) = send(&app, "POST", "/routes/R999/baseline", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body["message"].as_str().unwrap().contains("R999"));
    }

    #[tokio::test]
    async fn test_bank_apply_flow() {
        let app = router(seeded_service());

        let (status, record) = send(
            &app,
            "POST",
            "/banking/bank",
            Some(json!({ "shipId": "S1", "year": 2024 })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["balance"], 0.0);

        // repeat is a conflict
        let (status, _) = send(
            &app,
            "POST",
            "/banking/bank",
            Some(json!({ "shipId": "S1", "year": "2024" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        // year as a string
        let (status, record) = send(
            &app,
            "POST",
            "/banking/apply",
            Some(json!({ "shipId": "S1", "year": "2025" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(record["balance"], 0.0);

        let (_, pool) = send(&app, "GET", "/banking/pool?shipId=S1&year=2025", None).await;
        assert_eq!(pool["available"], 200.0);

        let (_, history) = send(&app, "GET", "/banking/history?shipId=S1", None).await;
        let amounts: Vec<f64> = history
            .as_array()
            .unwrap()
            .iter()
            .map(|e| e["amountGco2eq"].as_f64().unwrap())
            .collect();
        assert_eq!(amounts, vec![500.0, -300.0]);

        let (_, balance) = send(&app, "GET", "/compliance/cb?shipId=S1&year=2025", None).await;
        assert_eq!(balance["balance"], 0.0);

        println!("✅ Bank/apply over HTTP passed");
    }

    #[tokio::test]
    async fn test_error_mapping() {
        let app = router(seeded_service());

        let (status, _) = send(&app, "GET", "/compliance/cb?shipId=S9&year=2024", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = send(&app, "GET", "/compliance/cb?shipId=S1&year=soon", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(
            &app,
            "POST",
            "/banking/bank",
            Some(json!({ "shipId": "S1" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, body) = send(
            &app,
            "POST",
            "/banking/apply",
            Some(json!({ "shipId": "S1", "year": 2024 })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["message"].is_string());
    }

    #[tokio::test]
    async fn test_internal_error_is_generic() {
        let conn = Connection::open_in_memory().unwrap();
        // no schema: every query fails inside the store
        let app = router(ComplianceService::new(conn));

        let (status, body) = send(&app, "GET", "/routes", None).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body, json!({ "message": "Internal server error" }));
    }

    #[tokio::test]
    async fn test_record_compliance_endpoint() {
        let app = router(seeded_service());

        let (status, snapshot) = send(
            &app,
            "POST",
            "/compliance/cb",
            Some(json!({
                "shipId": "S2",
                "year": 2024,
                "ghgIntensity": 90.0,
                "fuelConsumption": 1.0
            })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(snapshot["cbGco2eq"], 41_000.0);

        let (_, all) = send(&app, "GET", "/compliance", None).await;
        assert_eq!(all.as_array().unwrap().len(), 3);

        let (_, entries) = send(&app, "GET", "/banking?shipId=S2", None).await;
        assert!(entries.as_array().unwrap().is_empty());
    }
}
