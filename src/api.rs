//! REST API for the pattern service.
//!
//! Provides HTTP endpoints for the pattern editor and the project export.
//! Uses Axum as the web framework and supports CORS.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    Router,
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
#[allow(unused_imports)]
use serde_json::json;
use std::sync::OnceLock;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tower_http::cors::{Any, CorsLayer};
use utoipa::{OpenApi, ToSchema};

use crate::config::{ApiConfig, EngineConfig};
use crate::error::LayoutError;
use crate::model::{
    BoxOrient, BoxSpec, GripperConfig, GripperKind, Layer, LeadType, PalletSpec, PatternLibrary,
    PatternRef, StackConfig, StartCorner, TcpMount,
};
use crate::project::{
    LayoutConfig, LayoutContext, LayoutEvent, ProjectBuilder, compute_layer,
    compute_layer_with_progress,
};

#[derive(Clone)]
struct ApiState {
    engine: EngineConfig,
}

static OPENAPI_DOC: OnceLock<utoipa::openapi::OpenApi> = OnceLock::new();

const SWAGGER_UI_HTML: &str = r##"<!DOCTYPE html>
<html lang="en">
    <head>
        <meta charset="utf-8" />
        <title>pallet-pattern API Docs</title>
        <link
            rel="stylesheet"
            href="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui.css"
            integrity="sha384-wxLW6kwyHktdDGr6Pv1zgm/VGJh99lfUbzSn6HNHBENZlCN7W602k9VkGdxuFvPn"
            crossorigin="anonymous"
        />
    </head>
    <body>
        <div id="swagger-ui"></div>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-bundle.js"
            integrity="sha384-wmyclcVGX/WhUkdkATwhaK1X1JtiNrr2EoYJ+diV3vj4v6OC5yCeSu+yW13SYJep"
            crossorigin="anonymous"
        ></script>
        <script
            src="https://unpkg.com/swagger-ui-dist@5.17.14/swagger-ui-standalone-preset.js"
            integrity="sha384-2YH8WDRaj7V2OqU/trsmzSagmk/E2SutiCsGkdgoQwC9pNUJV1u/141DHB6jgs8t"
            crossorigin="anonymous"
        ></script>
        <script>
            window.onload = function () {
                const ui = SwaggerUIBundle({
                    url: "/docs/openapi.json",
                    dom_id: "#swagger-ui",
                    presets: [SwaggerUIBundle.presets.apis, SwaggerUIStandalonePreset],
                    layout: "StandaloneLayout",
                });
                window.ui = ui;
            };
        </script>
    </body>
    </html>"##;

fn openapi_doc() -> &'static utoipa::openapi::OpenApi {
    OPENAPI_DOC.get_or_init(ApiDoc::openapi)
}

fn default_corner() -> u8 {
    StartCorner::Origin.code()
}

fn default_pattern_ref() -> PatternRef {
    PatternRef::Odd
}

/// Request structure for the layout endpoints: one pattern, one start corner.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "box": { "length": 400.0, "width": 300.0, "height": 220.0, "weight": 8.5, "pick_lsl": 2 },
        "pallet": { "length": 1200.0, "width": 800.0, "height": 144.0 },
        "gripper": { "kind": "mechanical", "width": 120.0 },
        "pattern_ref": "odd",
        "corner": 1,
        "formulas": ["H;0;0;", "H;0;w;", "V;l;0;"]
    })
)]
pub struct LayoutRequest {
    #[serde(rename = "box")]
    pub box_spec: BoxSpec,
    pub pallet: PalletSpec,
    pub gripper: GripperConfig,
    #[serde(default = "default_pattern_ref")]
    pub pattern_ref: PatternRef,
    #[serde(default = "default_corner")]
    pub corner: u8,
    pub formulas: Vec<String>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub swap_chain_ends: Option<bool>,
}

#[derive(Debug)]
struct ValidatedLayoutRequest {
    ctx: LayoutContext,
    pattern_ref: PatternRef,
    corner: StartCorner,
    formulas: Vec<String>,
}

impl LayoutRequest {
    fn into_validated(self, engine: &EngineConfig) -> Result<ValidatedLayoutRequest, LayoutError> {
        let corner = StartCorner::from_code(self.corner)?;
        let config = layout_config(engine, self.swap_chain_ends);
        let ctx = LayoutContext::new(self.box_spec, self.pallet, self.gripper).with_config(config);
        ctx.validate()?;
        Ok(ValidatedLayoutRequest {
            ctx,
            pattern_ref: self.pattern_ref,
            corner,
            formulas: self.formulas,
        })
    }
}

/// Formulas for one pattern reference, given inline or by library name.
#[derive(Deserialize, Clone, ToSchema)]
pub struct PatternAssignment {
    pub pattern_ref: PatternRef,
    #[serde(default)]
    pub formulas: Vec<String>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub library_name: Option<String>,
}

/// Request structure for the project export.
#[derive(Deserialize, ToSchema)]
#[schema(
    example = json!({
        "box": { "length": 400.0, "width": 300.0, "height": 220.0, "weight": 8.5 },
        "pallet": { "length": 1200.0, "width": 800.0, "height": 144.0 },
        "gripper": { "kind": "vacuum", "tcp": "corner", "width": 300.0 },
        "patterns": [
            { "pattern_ref": "odd", "formulas": ["H;0;0;", "H;l;0;"] },
            { "pattern_ref": "even", "library_name": "column" }
        ],
        "library": { "patterns": [{ "name": "column", "formulas": ["H;0;0;", "H;0;w;"] }] },
        "stack": { "layers": ["odd", "even", "odd"] }
    })
)]
pub struct ProjectRequest {
    #[serde(rename = "box")]
    pub box_spec: BoxSpec,
    pub pallet: PalletSpec,
    pub gripper: GripperConfig,
    pub patterns: Vec<PatternAssignment>,
    #[serde(default)]
    pub library: PatternLibrary,
    #[serde(default)]
    #[schema(nullable = true)]
    pub stack: Option<StackConfig>,
    #[serde(default)]
    #[schema(nullable = true)]
    pub swap_chain_ends: Option<bool>,
}

impl ProjectRequest {
    fn into_builder(self, engine: &EngineConfig) -> Result<ProjectBuilder, LayoutError> {
        let config = layout_config(engine, self.swap_chain_ends);
        let mut pallet = self.pallet;
        if let Some(stack) = &self.stack {
            pallet.full_height = stack.full_height(&pallet, &self.box_spec);
        }
        let ctx = LayoutContext::new(self.box_spec, pallet, self.gripper).with_config(config);
        ctx.validate()?;

        let mut builder = ProjectBuilder::new(ctx);
        for assignment in self.patterns {
            builder = match &assignment.library_name {
                Some(name) => builder.library_pattern(assignment.pattern_ref, &self.library, name)?,
                None => builder.pattern(assignment.pattern_ref, assignment.formulas),
            };
        }
        if let Some(stack) = self.stack {
            builder = builder.stack(stack);
        }
        Ok(builder)
    }
}

fn layout_config(engine: &EngineConfig, swap_chain_ends: Option<bool>) -> LayoutConfig {
    let mut config = engine.layout_config();
    if let Some(swap) = swap_chain_ends {
        config.swap_chain_ends = swap;
    }
    config
}

/// Layout result of one pattern in one start corner.
#[derive(Serialize, ToSchema)]
pub struct LayoutResponse {
    pub pattern_ref: PatternRef,
    pub corner: u8,
    pub size_x: f64,
    pub size_y: f64,
    /// Unit lead ids in placement order.
    pub order: Vec<usize>,
    pub items: Vec<PlacedItem>,
    pub failures: Vec<FailedItem>,
    pub is_complete: bool,
}

/// Single box of a computed layer.
///
/// Pick, place, label and approach codes use the controller values, with
/// -1 for unset and -2 for "no solution".
#[derive(Serialize, ToSchema)]
pub struct PlacedItem {
    pub id: usize,
    pub formula: String,
    #[schema(nullable = true)]
    pub orient: Option<BoxOrient>,
    #[schema(value_type = [f64; 2], example = json!([0.0, 0.0]))]
    pub box_start: (f64, f64),
    #[schema(value_type = [f64; 2], example = json!([400.0, 300.0]))]
    pub box_end: (f64, f64),
    #[schema(value_type = [f64; 2], example = json!([400.0, 600.0]))]
    pub unit_end: (f64, f64),
    pub used: bool,
    #[schema(nullable = true)]
    pub parent: Option<usize>,
    #[schema(nullable = true)]
    pub last_link: Option<usize>,
    pub link_type: i8,
    pub label_orient: i8,
    pub approach_dir: i8,
    pub pick: i8,
    pub place: i8,
}

#[derive(Serialize, ToSchema)]
pub struct FailedItem {
    pub id: usize,
    pub reason_code: String,
    pub reason: String,
}

/// Project file content.
#[derive(Serialize, ToSchema)]
pub struct ProjectResponse {
    pub lines: Vec<String>,
    pub layers: usize,
    pub failures: usize,
    #[schema(nullable = true)]
    pub full_height: Option<f64>,
}

fn optional_code(value: Option<u8>) -> i8 {
    value.map_or(-1, |v| v as i8)
}

impl LayoutResponse {
    pub fn from_layer(layer: Layer, corner: StartCorner) -> Self {
        let items = layer
            .items
            .iter()
            .map(|item| PlacedItem {
                id: item.id,
                formula: item.formula.clone(),
                orient: item.is_placeable().then_some(item.orient),
                box_start: item.box_rect.min.as_tuple(),
                box_end: item.box_rect.max.as_tuple(),
                unit_end: item.unit_rect.max.as_tuple(),
                used: item.used,
                parent: item.parent,
                last_link: item.last_link,
                link_type: item.link_type.code(),
                label_orient: optional_code(item.label_orient),
                approach_dir: optional_code(item.approach_dir),
                pick: item.gripper.pick_code(),
                place: item.gripper.place_code(),
            })
            .collect();

        let failures: Vec<FailedItem> = layer
            .failures
            .iter()
            .map(|failure| FailedItem {
                id: failure.id,
                reason_code: failure.issue.code().to_string(),
                reason: failure.issue.to_string(),
            })
            .collect();

        Self {
            pattern_ref: layer.pattern_ref,
            corner: corner.code(),
            size_x: layer.size.size_x,
            size_y: layer.size.size_y,
            order: layer.order,
            items,
            is_complete: failures.is_empty(),
            failures,
        }
    }
}

#[derive(Serialize, ToSchema)]
struct ErrorResponse {
    error: String,
    details: String,
}

impl ErrorResponse {
    fn new(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: details.into(),
        }
    }
}

fn error_response(
    status: StatusCode,
    error: impl Into<String>,
    details: impl Into<String>,
) -> Response {
    (status, Json(ErrorResponse::new(error, details))).into_response()
}

fn json_deserialize_error(err: JsonRejection) -> Response {
    error_response(
        StatusCode::UNPROCESSABLE_ENTITY,
        "Invalid JSON data",
        err.to_string(),
    )
}

fn layout_error(err: LayoutError) -> Response {
    let error = match err {
        LayoutError::Validation(_) => "Invalid input data",
        _ => "Invalid layout configuration",
    };
    error_response(StatusCode::UNPROCESSABLE_ENTITY, error, err.to_string())
}

fn parse_layout_request(
    payload: Result<Json<LayoutRequest>, JsonRejection>,
    engine: &EngineConfig,
) -> Result<ValidatedLayoutRequest, Response> {
    let Json(payload) = payload.map_err(json_deserialize_error)?;
    payload.into_validated(engine).map_err(layout_error)
}

#[derive(OpenApi)]
#[openapi(
    paths(handle_layout, handle_layout_stream, handle_project),
    components(
        schemas(
            LayoutRequest,
            LayoutResponse,
            PlacedItem,
            FailedItem,
            LayoutEvent,
            ProjectRequest,
            PatternAssignment,
            ProjectResponse,
            ErrorResponse,
            BoxSpec,
            PalletSpec,
            GripperConfig,
            GripperKind,
            TcpMount,
            LeadType,
            BoxOrient,
            PatternRef,
            StackConfig,
            PatternLibrary
        )
    ),
    tags((name = "layout", description = "Endpoints for pattern layout and project export"))
)]
struct ApiDoc;

/// Starts the API server and blocks until it terminates.
///
/// Configures CORS for cross-origin requests from the pattern editor.
pub async fn start_api_server(config: ApiConfig, engine: EngineConfig) -> std::io::Result<()> {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let state = ApiState { engine };

    let app = Router::new()
        .route("/layout", post(handle_layout))
        .route("/layout_stream", post(handle_layout_stream))
        .route("/project", post(handle_project))
        .route("/docs/openapi.json", get(serve_openapi_json))
        .route("/docs", get(serve_openapi_ui))
        .layer(cors)
        .with_state(state);

    let addr = config.socket_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;

    let display_host = config.display_host().to_string();
    info!(
        "🚀 Server running on http://{}:{}",
        display_host,
        config.port()
    );
    if config.binds_to_all_interfaces() && config.uses_default_host() {
        info!("💡 Local access: http://localhost:{}", config.port());
    }
    info!("📦 API Endpoints: POST /layout, POST /layout_stream, POST /project");
    info!("📑 Documentation: GET /docs, GET /docs/openapi.json");

    axum::serve(listener, app).await
}

/// Handler for POST /layout.
///
/// Computes one pattern for one start corner.
#[utoipa::path(
    post,
    path = "/layout",
    request_body = LayoutRequest,
    responses(
        (status = 200, description = "Computed layer", body = LayoutResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or layout configuration",
            body = ErrorResponse
        )
    ),
    tag = "layout"
)]
async fn handle_layout(
    State(state): State<ApiState>,
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_layout_request(payload, &state.engine) {
        Ok(request) => request,
        Err(response) => return response,
    };

    info!(
        "📥 New layout request: {} formulas, {:?}, corner {}",
        request.formulas.len(),
        request.pattern_ref,
        request.corner.code()
    );
    match compute_layer(&request.ctx, request.pattern_ref, &request.formulas, request.corner) {
        Ok(layer) => {
            let response = LayoutResponse::from_layer(layer, request.corner);
            info!(
                "📦 Result: {} units, {} failures",
                response.order.len(),
                response.failures.len()
            );
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => layout_error(err),
    }
}

/// Handler for POST /layout_stream (SSE).
///
/// Streams the stages of one layer computation as Server-Sent Events.
///
/// The stream ends with a `Finished` event, or with `Aborted` when the
/// layer cannot be computed.
#[utoipa::path(
    post,
    path = "/layout_stream",
    request_body = LayoutRequest,
    responses(
        (
            status = 200,
            description = "Streams layout events in real-time",
            content_type = "text/event-stream",
            body = LayoutEvent
        ),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or layout configuration",
            body = ErrorResponse
        )
    ),
    tag = "layout"
)]
async fn handle_layout_stream(
    State(state): State<ApiState>,
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> impl IntoResponse {
    let request = match parse_layout_request(payload, &state.engine) {
        Ok(request) => request,
        Err(response) => return response,
    };

    let (tx, rx) = mpsc::channel::<String>(32);

    tokio::task::spawn_blocking(move || {
        let ValidatedLayoutRequest {
            ctx,
            pattern_ref,
            corner,
            formulas,
        } = request;
        let result = compute_layer_with_progress(&ctx, pattern_ref, &formulas, corner, |evt| {
            if let Ok(json) = serde_json::to_string(evt) {
                // a closed receiver drops the remaining events
                let _ = tx.blocking_send(json);
            }
        });
        if let Err(err) = result {
            warn!("⚠️ Layout stream aborted: {}", err);
        }
    });

    let stream = ReceiverStream::new(rx)
        .map(|msg| Ok::<_, std::convert::Infallible>(Event::default().data(msg)));
    Sse::new(stream)
        .keep_alive(
            KeepAlive::new()
                .interval(std::time::Duration::from_secs(10))
                .text("keep-alive"),
        )
        .into_response()
}

/// Handler for POST /project.
///
/// Computes every selected pattern reference in all four corners and
/// returns the project file lines.
#[utoipa::path(
    post,
    path = "/project",
    request_body = ProjectRequest,
    responses(
        (status = 200, description = "Project file lines", body = ProjectResponse),
        (
            status = UNPROCESSABLE_ENTITY,
            description = "Invalid request or layout configuration",
            body = ErrorResponse
        )
    ),
    tag = "layout"
)]
async fn handle_project(
    State(state): State<ApiState>,
    payload: Result<Json<ProjectRequest>, JsonRejection>,
) -> impl IntoResponse {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(err) => return json_deserialize_error(err),
    };

    let full_height = request.stack.as_ref().map(|stack| stack.full_height(&request.pallet, &request.box_spec));
    info!("📥 New project request: {} patterns", request.patterns.len());

    let project = match request
        .into_builder(&state.engine)
        .and_then(ProjectBuilder::build)
    {
        Ok(project) => project,
        Err(err) => return layout_error(err),
    };

    let response = ProjectResponse {
        lines: project.to_lines(),
        layers: project.entries.len(),
        failures: project.failure_count(),
        full_height,
    };
    (StatusCode::OK, Json(response)).into_response()
}

async fn serve_openapi_json(State(_state): State<ApiState>) -> impl IntoResponse {
    Json(openapi_doc())
}

async fn serve_openapi_ui(State(_state): State<ApiState>) -> impl IntoResponse {
    Html(SWAGGER_UI_HTML)
}

#[cfg(test)]
mod tests {
    use super::*;

    const LAYOUT_JSON: &str = r#"{
        "box": {"length": 400.0, "width": 300.0, "height": 200.0, "weight": 5.0, "pick_lsl": 2},
        "pallet": {"length": 1200.0, "width": 800.0, "height": 144.0},
        "gripper": {"kind": "mechanical", "width": 100.0},
        "formulas": ["H;0;0;", "H;0;w;"]
    }"#;

    fn engine() -> EngineConfig {
        EngineConfig::from_env()
    }

    #[test]
    fn openapi_doc_lists_expected_paths() {
        let doc = openapi_doc();
        let paths = &doc.paths.paths;
        for path in ["/layout", "/layout_stream", "/project"] {
            assert!(
                paths.contains_key(path),
                "OpenAPI documentation is missing the {} path",
                path
            );
        }
    }

    #[test]
    fn openapi_doc_contains_key_schemas() {
        let doc = openapi_doc();
        let components = doc
            .components
            .as_ref()
            .expect("OpenAPI documentation contains no components");
        let schemas = &components.schemas;
        for name in ["LayoutRequest", "LayoutResponse", "ProjectRequest", "ErrorResponse"] {
            assert!(
                schemas.contains_key(name),
                "Expected schema '{}' is missing from OpenAPI spec",
                name
            );
        }
    }

    #[test]
    fn layout_request_uses_defaults() {
        let request: LayoutRequest = serde_json::from_str(LAYOUT_JSON).expect("Should parse valid JSON");
        assert_eq!(request.corner, 1);
        assert_eq!(request.pattern_ref, PatternRef::Odd);
        assert_eq!(request.swap_chain_ends, None);
        assert_eq!(request.gripper.avail_pick, [true; 8]);
        assert_eq!(request.box_spec.pick_ssl, 1);
    }

    #[test]
    fn invalid_corner_is_rejected() {
        let mut request: LayoutRequest = serde_json::from_str(LAYOUT_JSON).unwrap();
        request.corner = 7;
        assert!(matches!(
            request.into_validated(&engine()),
            Err(LayoutError::InvalidStartCorner(7))
        ));
    }

    #[test]
    fn invalid_box_is_rejected() {
        let mut request: LayoutRequest = serde_json::from_str(LAYOUT_JSON).unwrap();
        request.box_spec.width = 500.0;
        assert!(matches!(
            request.into_validated(&engine()),
            Err(LayoutError::Validation(_))
        ));
    }

    #[test]
    fn request_level_swap_overrides_config() {
        let mut request: LayoutRequest = serde_json::from_str(LAYOUT_JSON).unwrap();
        request.swap_chain_ends = Some(true);
        let validated = request.into_validated(&engine()).unwrap();
        assert!(validated.ctx.config.swap_chain_ends);

        let base = engine().layout_config().swap_chain_ends;
        assert_eq!(layout_config(&engine(), None).swap_chain_ends, base);
    }

    #[test]
    fn layout_response_reports_links_and_codes() {
        let request: LayoutRequest = serde_json::from_str(LAYOUT_JSON).unwrap();
        let validated = request.into_validated(&engine()).unwrap();
        let layer = compute_layer(&validated.ctx, validated.pattern_ref, &validated.formulas, validated.corner).unwrap();
        let response = LayoutResponse::from_layer(layer, validated.corner);

        assert_eq!(response.order, vec![0]);
        assert!(response.is_complete);
        assert_eq!(response.items[0].last_link, Some(1));
        assert_eq!(response.items[0].unit_end, (400.0, 600.0));
        assert_eq!(response.items[1].parent, Some(0));
        assert_eq!(response.items[1].pick, -2);
        assert_eq!(response.items[1].approach_dir, -1);
        assert_eq!(response.items[1].link_type, -1);
    }

    #[test]
    fn project_request_resolves_library_patterns() {
        let json = r#"{
            "box": {"length": 400.0, "width": 300.0, "height": 200.0, "weight": 5.0},
            "pallet": {"length": 1200.0, "width": 800.0, "height": 144.0},
            "gripper": {"kind": "vacuum", "width": 300.0},
            "patterns": [
                {"pattern_ref": "odd", "formulas": ["H;0;0;"]},
                {"pattern_ref": "even", "library_name": "pair"}
            ],
            "library": {"patterns": [{"name": "pair", "formulas": ["H;0;0;", "H;l;0;"]}]},
            "stack": {"layers": ["odd", "even"]}
        }"#;
        let request: ProjectRequest = serde_json::from_str(json).expect("Should parse valid JSON");
        let project = request.into_builder(&engine()).unwrap().build().unwrap();
        assert_eq!(project.entries.len(), 8);
        assert_eq!(project.to_lines().len(), 4 + 8);
    }

    #[test]
    fn project_request_with_unknown_library_name_fails() {
        let json = r#"{
            "box": {"length": 400.0, "width": 300.0, "height": 200.0, "weight": 5.0},
            "pallet": {"length": 1200.0, "width": 800.0, "height": 144.0},
            "gripper": {"kind": "vacuum", "width": 300.0},
            "patterns": [{"pattern_ref": "odd", "library_name": "missing"}]
        }"#;
        let request: ProjectRequest = serde_json::from_str(json).unwrap();
        assert!(matches!(
            request.into_builder(&engine()),
            Err(LayoutError::UnknownPattern(_))
        ));
    }
}
