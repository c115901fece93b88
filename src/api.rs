// 🌐 REST API - axum router over the shared Store
//
// Expense routes act on behalf of the `X-User-Id` caller. Org routes are
// addressed by org id and record the caller (if any) as the event actor.

use crate::entities::{
    CategoryInput, ProviderInput, TransactionFilter, TransactionInput, TransactionType,
};
use crate::error::StoreError;
use crate::org::{ActivityInput, DepartmentInput, InstanceInput, InstanceStatus, PositionInput};
use crate::realtime::{LiveView, Notification, Table};
use crate::store::Store;
use crate::summary::Period;
use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{
        sse::{Event as SseEvent, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{delete, get, post, put},
    Router,
};
use chrono::{NaiveDate, Utc};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use tracing::{error, warn};

/// Header carrying the authenticated caller
pub const USER_HEADER: &str = "x-user-id";

/// Actor recorded for org mutations made without a caller header
const ANONYMOUS_ACTOR: &str = "system";

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
}

impl AppState {
    pub fn new(store: Store) -> Self {
        Self {
            store: Arc::new(store),
        }
    }
}

/// API Response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug)]
pub struct ApiError(StoreError);

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError(err)
    }
}

pub fn status_for(err: &StoreError) -> StatusCode {
    match err {
        StoreError::NotFound { .. } => StatusCode::NOT_FOUND,
        StoreError::Validation(_) | StoreError::InvalidAmount(_) => StatusCode::BAD_REQUEST,
        StoreError::Duplicate { .. } | StoreError::DefaultCategoryProtected(_) => StatusCode::CONFLICT,
        StoreError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = status_for(&self.0);
        if self.0.is_client_error() {
            warn!(status = status.as_u16(), error = %self.0, "request rejected");
        } else {
            error!(error = %self.0, "request failed");
        }
        (status, Json(ApiResponse::<()>::err(self.0.to_string()))).into_response()
    }
}

type ApiResult<T> = Result<Json<ApiResponse<T>>, ApiError>;
type Created<T> = Result<(StatusCode, Json<ApiResponse<T>>), ApiError>;

fn created<T>(data: T) -> Created<T> {
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(data))))
}

fn caller(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(String::from)
        .ok_or_else(|| StoreError::Unauthorized(format!("missing {USER_HEADER} header")).into())
}

fn actor(headers: &HeaderMap) -> String {
    caller(headers).unwrap_or_else(|_| ANONYMOUS_ACTOR.to_string())
}

// ============================================================================
// EXPENSE HANDLERS
// ============================================================================

/// GET /api/health - Health check
async fn health_check() -> impl IntoResponse {
    Json(ApiResponse::ok("OK"))
}

/// GET /api/transactions
async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filter): Query<TransactionFilter>,
) -> ApiResult<Vec<crate::entities::Transaction>> {
    let user = caller(&headers)?;
    Ok(Json(ApiResponse::ok(state.store.list_transactions(&user, &filter)?)))
}

/// POST /api/transactions
async fn create_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<TransactionInput>,
) -> Created<crate::entities::Transaction> {
    let user = caller(&headers)?;
    created(state.store.create_transaction(&user, &input)?)
}

async fn get_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<crate::entities::Transaction> {
    let user = caller(&headers)?;
    Ok(Json(ApiResponse::ok(state.store.get_transaction(&user, &id)?)))
}

async fn update_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<TransactionInput>,
) -> ApiResult<crate::entities::Transaction> {
    let user = caller(&headers)?;
    Ok(Json(ApiResponse::ok(state.store.update_transaction(&user, &id, &input)?)))
}

async fn delete_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<&'static str> {
    let user = caller(&headers)?;
    state.store.delete_transaction(&user, &id)?;
    Ok(Json(ApiResponse::ok("deleted")))
}

/// GET /api/transactions/:id/history - audit trail, newest first
async fn transaction_history(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<Vec<crate::db::Event>> {
    let user = caller(&headers)?;
    // Ownership check; other users get 404
    state.store.get_transaction(&user, &id)?;
    Ok(Json(ApiResponse::ok(state.store.events_for("transaction", &id)?)))
}

#[derive(Debug, Default, Deserialize)]
struct SummaryQuery {
    #[serde(default, rename = "type")]
    tx_type: Option<TransactionType>,
    #[serde(default)]
    category: Option<String>,
    #[serde(default)]
    from: Option<NaiveDate>,
    #[serde(default)]
    to: Option<NaiveDate>,
    #[serde(default)]
    period: Option<String>,
}

/// GET /api/summary?period=week|month
async fn get_summary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<SummaryQuery>,
) -> ApiResult<crate::summary::Summary> {
    let user = caller(&headers)?;
    let period = match query.period.as_deref() {
        Some(p) => p.parse::<Period>().map_err(StoreError::Validation)?,
        None => Period::default(),
    };
    let filter = TransactionFilter {
        tx_type: query.tx_type,
        category: query.category,
        from: query.from,
        to: query.to,
    };
    Ok(Json(ApiResponse::ok(state.store.summary(&user, &filter, period)?)))
}

async fn list_categories(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<crate::entities::Category>> {
    let user = caller(&headers)?;
    Ok(Json(ApiResponse::ok(state.store.list_categories(&user)?)))
}

async fn create_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<CategoryInput>,
) -> Created<crate::entities::Category> {
    let user = caller(&headers)?;
    created(state.store.create_category(&user, &input)?)
}

/// DELETE /api/categories/:type/:name
async fn delete_category(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((category_type, name)): Path<(String, String)>,
) -> ApiResult<&'static str> {
    let user = caller(&headers)?;
    let category_type: TransactionType = category_type.parse()?;
    state.store.delete_category(&user, &name, category_type)?;
    Ok(Json(ApiResponse::ok("deleted")))
}

async fn list_providers(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Vec<crate::entities::Provider>> {
    let user = caller(&headers)?;
    Ok(Json(ApiResponse::ok(state.store.list_providers(&user)?)))
}

async fn create_provider(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<ProviderInput>,
) -> Created<crate::entities::Provider> {
    let user = caller(&headers)?;
    created(state.store.create_provider(&user, &input)?)
}

async fn rename_provider(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(input): Json<ProviderInput>,
) -> ApiResult<crate::entities::Provider> {
    let user = caller(&headers)?;
    Ok(Json(ApiResponse::ok(state.store.rename_provider(&user, &id, &input)?)))
}

async fn delete_provider(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> ApiResult<&'static str> {
    let user = caller(&headers)?;
    state.store.delete_provider(&user, &id)?;
    Ok(Json(ApiResponse::ok("deleted")))
}

fn notification_event(notification: &Notification) -> SseEvent {
    let name = match notification {
        Notification::Change(_) => "change",
        Notification::Resync { .. } => "resync",
    };
    SseEvent::default()
        .event(name)
        .json_data(notification)
        .unwrap_or_else(|_| SseEvent::default().event(name))
}

/// GET /api/changes - SSE of the caller's expense-table changes
async fn stream_changes(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let user = caller(&headers)?;
    let subscription = state.store.subscribe(Table::EXPENSE, &user);

    let events = stream::unfold(subscription, |mut subscription| async move {
        let notification = subscription.recv().await?;
        Some((Ok(notification_event(&notification)), subscription))
    });
    Ok(Sse::new(events).keep_alive(KeepAlive::default()))
}

// ============================================================================
// ORG HANDLERS
// ============================================================================

async fn list_departments(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> ApiResult<Vec<crate::org::Department>> {
    Ok(Json(ApiResponse::ok(state.store.list_departments(&org)?)))
}

async fn create_department(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org): Path<String>,
    Json(input): Json<DepartmentInput>,
) -> Created<crate::org::Department> {
    created(state.store.create_department(&org, &input, &actor(&headers))?)
}

async fn delete_department(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((org, id)): Path<(String, String)>,
) -> ApiResult<&'static str> {
    state.store.delete_department(&org, &id, &actor(&headers))?;
    Ok(Json(ApiResponse::ok("deleted")))
}

async fn list_positions(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> ApiResult<Vec<crate::org::Position>> {
    Ok(Json(ApiResponse::ok(state.store.list_positions(&org)?)))
}

async fn create_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org): Path<String>,
    Json(input): Json<PositionInput>,
) -> Created<crate::org::Position> {
    created(state.store.create_position(&org, &input, &actor(&headers))?)
}

async fn delete_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((org, id)): Path<(String, String)>,
) -> ApiResult<&'static str> {
    state.store.delete_position(&org, &id, &actor(&headers))?;
    Ok(Json(ApiResponse::ok("deleted")))
}

#[derive(Debug, Deserialize)]
struct MembershipBody {
    user_id: String,
    position_id: String,
}

async fn list_memberships(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> ApiResult<Vec<crate::org::UserPosition>> {
    Ok(Json(ApiResponse::ok(state.store.list_user_positions(&org)?)))
}

async fn assign_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org): Path<String>,
    Json(body): Json<MembershipBody>,
) -> Created<crate::org::UserPosition> {
    created(state.store.assign_user(&org, &body.user_id, &body.position_id, &actor(&headers))?)
}

async fn unassign_user(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org): Path<String>,
    Json(body): Json<MembershipBody>,
) -> ApiResult<&'static str> {
    state
        .store
        .unassign_user(&org, &body.user_id, &body.position_id, &actor(&headers))?;
    Ok(Json(ApiResponse::ok("deleted")))
}

async fn list_activities(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> ApiResult<Vec<crate::org::Activity>> {
    Ok(Json(ApiResponse::ok(state.store.list_activities(&org)?)))
}

async fn create_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org): Path<String>,
    Json(input): Json<ActivityInput>,
) -> Created<crate::org::Activity> {
    created(state.store.create_activity(&org, &input, &actor(&headers))?)
}

async fn list_instances(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> ApiResult<Vec<crate::org::ProcessInstance>> {
    Ok(Json(ApiResponse::ok(state.store.list_active_instances(&org)?)))
}

async fn start_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(org): Path<String>,
    Json(input): Json<InstanceInput>,
) -> Created<crate::org::ProcessInstance> {
    created(state.store.start_instance(&org, &input, &actor(&headers))?)
}

async fn complete_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((org, id)): Path<(String, String)>,
) -> ApiResult<crate::org::ProcessInstance> {
    let finished = state
        .store
        .finish_instance(&org, &id, InstanceStatus::Completed, &actor(&headers))?;
    Ok(Json(ApiResponse::ok(finished)))
}

async fn cancel_instance(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path((org, id)): Path<(String, String)>,
) -> ApiResult<crate::org::ProcessInstance> {
    let finished = state
        .store
        .finish_instance(&org, &id, InstanceStatus::Cancelled, &actor(&headers))?;
    Ok(Json(ApiResponse::ok(finished)))
}

/// GET /api/orgs/:org/health
async fn department_health(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> ApiResult<crate::org::HealthMap> {
    Ok(Json(ApiResponse::ok(state.store.department_health(&org, Utc::now())?)))
}

/// GET /api/orgs/:org/health/stream - one `health` event per refetch
async fn stream_department_health(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let store = Arc::clone(&state.store);
    let org_id = org.clone();
    let view = LiveView::mount(state.store.subscribe(Table::ORG, &org), move || {
        store.department_health(&org_id, Utc::now())
    });

    let events = stream::unfold((view, true), |(mut view, first)| async move {
        let snapshot = if first {
            view.ready().await
        } else {
            view.changed().await
        }?;
        let event = SseEvent::default()
            .event("health")
            .json_data(&*snapshot)
            .unwrap_or_else(|_| SseEvent::default().event("health"));
        Some((Ok(event), (view, false)))
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}

async fn org_chart(
    State(state): State<AppState>,
    Path(org): Path<String>,
) -> ApiResult<crate::org::OrgChart> {
    Ok(Json(ApiResponse::ok(state.store.org_chart(&org, Utc::now())?)))
}

// ============================================================================
// ROUTER
// ============================================================================

pub fn router(state: AppState) -> Router {
    let expense_routes = Router::new()
        .route("/health", get(health_check))
        .route("/transactions", get(list_transactions).post(create_transaction))
        .route(
            "/transactions/:id",
            get(get_transaction).put(update_transaction).delete(delete_transaction),
        )
        .route("/transactions/:id/history", get(transaction_history))
        .route("/summary", get(get_summary))
        .route("/categories", get(list_categories).post(create_category))
        .route("/categories/:type/:name", delete(delete_category))
        .route("/providers", get(list_providers).post(create_provider))
        .route("/providers/:id", put(rename_provider).delete(delete_provider))
        .route("/changes", get(stream_changes));

    let org_routes = Router::new()
        .route("/departments", get(list_departments).post(create_department))
        .route("/departments/:id", delete(delete_department))
        .route("/positions", get(list_positions).post(create_position))
        .route("/positions/:id", delete(delete_position))
        .route(
            "/memberships",
            get(list_memberships).post(assign_user).delete(unassign_user),
        )
        .route("/activities", get(list_activities).post(create_activity))
        .route("/instances", get(list_instances).post(start_instance))
        .route("/instances/:id/complete", post(complete_instance))
        .route("/instances/:id/cancel", post(cancel_instance))
        .route("/health", get(department_health))
        .route("/health/stream", get(stream_department_health))
        .route("/chart", get(org_chart));

    Router::new()
        .nest("/api", expense_routes.nest("/orgs/:org", org_routes))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body, Bytes};
    use axum::http::Request;
    use futures::StreamExt;
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> Router {
        router(AppState::new(Store::in_memory().unwrap()))
    }

    async fn send(
        app: &Router,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    /// Open an event stream and hand back its body
    async fn open_stream(
        app: &Router,
        uri: &str,
        user: Option<&str>,
    ) -> impl futures::Stream<Item = Result<Bytes, axum::Error>> + Unpin {
        let mut builder = Request::builder().method("GET").uri(uri);
        if let Some(user) = user {
            builder = builder.header(USER_HEADER, user);
        }
        let response = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["content-type"], "text/event-stream");
        Box::pin(response.into_body().into_data_stream())
    }

    /// Read up to the end of the next SSE frame
    async fn next_frame<S>(body: &mut S) -> String
    where
        S: futures::Stream<Item = Result<Bytes, axum::Error>> + Unpin,
    {
        let mut frame = String::new();
        while !frame.contains("\n\n") {
            let chunk = tokio::time::timeout(Duration::from_secs(5), body.next())
                .await
                .expect("no frame within 5s")
                .expect("stream ended")
                .unwrap();
            frame.push_str(std::str::from_utf8(&chunk).unwrap());
        }
        frame
    }

    #[tokio::test]
    async fn test_health_stream_emits_snapshot_per_change() {
        let app = app();
        let mut body = open_stream(&app, "/api/orgs/o1/health/stream", None).await;

        let first = next_frame(&mut body).await;
        assert!(first.contains("event: health"));
        assert!(first.contains("data: {}"));

        let support = json!({"name": "Support"});
        let (_, dept) = send(&app, "POST", "/api/orgs/o1/departments", None, Some(support)).await;
        let dept_id = dept["data"]["id"].as_str().unwrap().to_string();

        let second = next_frame(&mut body).await;
        assert!(second.contains("event: health"));
        assert!(second.contains(&dept_id));
        assert!(second.contains("\"activeTasks\":0"));
    }

    #[tokio::test]
    async fn test_changes_stream_scoped_to_caller() {
        let app = app();
        let mut body = open_stream(&app, "/api/changes", Some("alice")).await;

        let lunch = json!({"type": "expense", "amount": 8.0, "category": "Food", "date": "2024-05-02"});
        let (_, theirs) = send(&app, "POST", "/api/transactions", Some("bob"), Some(lunch.clone())).await;
        let (_, mine) = send(&app, "POST", "/api/transactions", Some("alice"), Some(lunch)).await;

        let frame = next_frame(&mut body).await;
        assert!(frame.contains("event: change"));
        assert!(frame.contains("\"table\":\"transactions\""));
        assert!(frame.contains("\"scope\":\"alice\""));
        assert!(frame.contains(mine["data"]["id"].as_str().unwrap()));
        assert!(!frame.contains(theirs["data"]["id"].as_str().unwrap()));
    }

    #[tokio::test]
    async fn test_health_check() {
        let (status, body) = send(&app(), "GET", "/api/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"], "OK");
    }

    #[tokio::test]
    async fn test_expense_routes_require_caller() {
        let app = app();
        let (status, body) = send(&app, "GET", "/api/transactions", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let (status, _) = send(&app, "GET", "/api/changes", None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_transaction_lifecycle() {
        let app = app();
        let lunch = json!({"type": "expense", "amount": 12.5, "category": "Food", "date": "2024-05-01"});

        let (status, created) = send(&app, "POST", "/api/transactions", Some("alice"), Some(lunch)).await;
        assert_eq!(status, StatusCode::CREATED);
        let id = created["data"]["id"].as_str().unwrap().to_string();

        let (_, listed) = send(&app, "GET", "/api/transactions?type=expense", Some("alice"), None).await;
        assert_eq!(listed["data"].as_array().unwrap().len(), 1);

        // Other users never see it
        let (status, _) = send(&app, "GET", &format!("/api/transactions/{id}"), Some("bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let edit = json!({"type": "expense", "amount": 14.0, "category": "Food", "date": "2024-05-01"});
        let uri = format!("/api/transactions/{id}");
        let (status, _) = send(&app, "PUT", &uri, Some("alice"), Some(edit)).await;
        assert_eq!(status, StatusCode::OK);

        let history_uri = format!("/api/transactions/{id}/history");
        let (_, history) = send(&app, "GET", &history_uri, Some("alice"), None).await;
        let events = history["data"].as_array().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0]["event_type"], "transaction_updated");
        let (status, _) = send(&app, "GET", &history_uri, Some("bob"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (_, summary) = send(&app, "GET", "/api/summary?period=week", Some("alice"), None).await;
        assert_eq!(summary["data"]["totals"]["expense"], 14.0);

        let (status, _) = send(&app, "DELETE", &format!("/api/transactions/{id}"), Some("alice"), None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_error_status_mapping() {
        let app = app();

        let negative = json!({"type": "expense", "amount": -1.0, "category": "Food", "date": "2024-05-01"});
        let (status, body) = send(&app, "POST", "/api/transactions", Some("alice"), Some(negative)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().is_some());

        let (status, _) = send(&app, "DELETE", "/api/categories/expense/Food", Some("alice"), None).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, _) = send(&app, "DELETE", "/api/categories/bogus/Food", Some("alice"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = send(&app, "GET", "/api/summary?period=year", Some("alice"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_org_health_route() {
        let app = app();

        let (_, dept) = send(&app, "POST", "/api/orgs/o1/departments", None, Some(json!({"name": "Support"}))).await;
        let dept_id = dept["data"]["id"].as_str().unwrap().to_string();

        let (_, position) = send(
            &app,
            "POST",
            "/api/orgs/o1/positions",
            None,
            Some(json!({"title": "Agent", "department_id": dept_id})),
        )
        .await;
        let position_id = position["data"]["id"].as_str().unwrap().to_string();

        let (status, _) = send(
            &app,
            "POST",
            "/api/orgs/o1/memberships",
            Some("admin"),
            Some(json!({"user_id": "alice", "position_id": position_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = send(
            &app,
            "POST",
            "/api/orgs/o1/instances",
            None,
            Some(json!({"process_name": "Ticket", "assigned_position_id": position_id})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, health) = send(&app, "GET", "/api/orgs/o1/health", None, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health["data"][&dept_id]["activeTasks"], 1);
        assert_eq!(health["data"][&dept_id]["overdueTasks"], 0);

        let (_, chart) = send(&app, "GET", "/api/orgs/o1/chart", None, None).await;
        assert_eq!(chart["data"]["roots"][0]["positions"][0]["holders"][0], "alice");
    }
}
