//! API route definitions.

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use super::state::AppState;
use crate::incident::{
    DeviceRef, FaultType, Incident, IncidentReport, RiskLevel, Severity, Stage,
};
use crate::tools::{health, Toolset};

pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(service_health))
        .route("/tools/health", get(tools_health))
        .route("/incidents", post(trigger_incident).get(list_incidents))
        .route("/incidents/{id}", get(incident_status))
        .route("/capabilities", get(capabilities))
        .route("/self-test", post(self_test))
}

fn meta() -> Value {
    json!({
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = json!({ "data": null, "error": message.into(), "meta": meta() });
    (status, Json(body)).into_response()
}

// ---------------------------------------------------------------------------
// Health
// ---------------------------------------------------------------------------

async fn service_health() -> Json<Value> {
    Json(json!({
        "data": {
            "status": "ok",
            "service": env!("CARGO_PKG_NAME"),
            "version": env!("CARGO_PKG_VERSION")
        },
        "meta": meta()
    }))
}

async fn tools_health(State(state): State<AppState>) -> Json<Value> {
    let tools = state.pool.orchestrator().tools();
    let report = health::check(tools, &state.config.tools).await;
    Json(json!({ "data": report, "meta": meta() }))
}

// ---------------------------------------------------------------------------
// Incidents
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
struct TriggerRequest {
    device_id: Option<String>,
    device_name: Option<String>,
    device_type: Option<String>,
    fault_type: Option<String>,
    severity: Option<String>,
    #[serde(default, rename = "async")]
    run_async: bool,
}

impl TriggerRequest {
    fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("device_id", self.device_id.is_none()),
            ("device_name", self.device_name.is_none()),
            ("fault_type", self.fault_type.is_none()),
        ]
        .into_iter()
        .filter_map(|(name, missing)| missing.then_some(name))
        .collect()
    }
}

async fn trigger_incident(State(state): State<AppState>, body: Bytes) -> Response {
    if body.is_empty() {
        return error_response(StatusCode::BAD_REQUEST, "Request body required");
    }
    let request: TriggerRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                format!("Invalid request body: {e}"),
            )
        }
    };

    let missing = request.missing_fields();
    if !missing.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            format!("Missing required fields: {}", missing.join(", ")),
        );
    }

    let severity = match request.severity.as_deref() {
        None => Severity::default(),
        Some(raw) => match raw.parse::<Severity>() {
            Ok(severity) => severity,
            Err(e) => return error_response(StatusCode::BAD_REQUEST, e.to_string()),
        },
    };
    // Unrecognised fault names classify as unknown and end unconfirmed.
    let fault = request
        .fault_type
        .as_deref()
        .and_then(|raw| raw.parse::<FaultType>().ok())
        .unwrap_or(FaultType::Unknown);

    let device = DeviceRef {
        id: request.device_id.unwrap_or_default(),
        name: request.device_name.unwrap_or_default(),
        device_type: request.device_type.unwrap_or_else(|| "unknown".to_string()),
    };
    let incident = Incident::new(Incident::generate_id(), device, fault, severity);
    info!(
        incident = %incident.id,
        device = %incident.device.name,
        fault = %fault,
        %severity,
        run_async = request.run_async,
        "incident triggered"
    );

    if request.run_async {
        let id = state.pool.submit(incident).await;
        let body = json!({
            "data": {
                "incident_id": id,
                "async": true,
                "message": format!("Incident queued. Poll /api/v1/incidents/{id} for status."),
            },
            "meta": meta()
        });
        return (StatusCode::ACCEPTED, Json(body)).into_response();
    }

    let report = state.pool.run_inline(incident).await;
    Json(json!({ "data": report, "meta": meta() })).into_response()
}

async fn list_incidents(State(state): State<AppState>) -> Json<Value> {
    let summary = state.pool.registry().summary().await;
    let mut meta = meta();
    meta["max_workers"] = json!(state.pool.max_workers());
    meta["idle_workers"] = json!(state.pool.idle_workers());
    Json(json!({ "data": summary, "meta": meta }))
}

async fn incident_status(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    match state.pool.registry().get(&id).await {
        Some(status) => Json(json!({ "data": status, "meta": meta() })).into_response(),
        None => error_response(StatusCode::NOT_FOUND, format!("Incident {id} not found")),
    }
}

// ---------------------------------------------------------------------------
// Capabilities
// ---------------------------------------------------------------------------

/// Operator-facing description and typical plan risk per fault type.
const FAULT_CATALOG: [(FaultType, &str, RiskLevel); 5] = [
    (
        FaultType::BgpLinkFlap,
        "BGP session flapping due to unstable physical or logical link",
        RiskLevel::Low,
    ),
    (
        FaultType::BgpSessionInstability,
        "BGP session instability without physical link issues",
        RiskLevel::Medium,
    ),
    (
        FaultType::TrafficDrop,
        "Unexpected traffic drop indicating routing or forwarding issues",
        RiskLevel::Medium,
    ),
    (
        FaultType::CpuSpike,
        "CPU utilization spike affecting device performance",
        RiskLevel::Low,
    ),
    (
        FaultType::MemoryExhaustion,
        "Memory utilization approaching critical levels",
        RiskLevel::Medium,
    ),
];

async fn capabilities(State(state): State<AppState>) -> Json<Value> {
    let uses_ai = state.pool.orchestrator().enricher_name() != "rule_based";
    let fault_types: Vec<Value> = FAULT_CATALOG
        .iter()
        .map(|(fault, description, risk)| {
            json!({
                "type": fault,
                "description": description,
                "auto_remediation": true,
                "risk_level": risk,
            })
        })
        .collect();

    Json(json!({
        "data": {
            "supported_fault_types": fault_types,
            "agents": [
                {
                    "name": "DetectionAgent",
                    "role": "Anomaly detection and fault classification",
                    "uses_ai": uses_ai
                },
                {
                    "name": "RCAAgent",
                    "role": "Root cause analysis and hypothesis generation",
                    "uses_ai": uses_ai
                },
                {
                    "name": "RemediationAgent",
                    "role": "Execute corrective actions via SONiC/GNS3",
                    "uses_ai": false
                },
                {
                    "name": "VerificationAgent",
                    "role": "Validate fix success via metrics",
                    "uses_ai": false
                }
            ],
            "features": [
                "Automatic fault detection",
                "Root cause analysis with optional AI narrative",
                "Automated remediation playbooks",
                "Metric-based verification",
                "Post-fix stability scoring",
                "Bounded retry with optional rollback",
                "Full incident timeline tracking"
            ],
            "enrichment": state.pool.orchestrator().enricher_name(),
            "tools": Toolset::describe(&state.config.tools),
        },
        "meta": meta()
    }))
}

// ---------------------------------------------------------------------------
// Self-test
// ---------------------------------------------------------------------------

async fn self_test(State(state): State<AppState>) -> Json<Value> {
    let device = DeviceRef {
        id: "test-device-001".into(),
        name: "test-core-1".into(),
        device_type: "core".into(),
    };
    let incident = Incident::new(
        Incident::generate_id(),
        device,
        FaultType::BgpLinkFlap,
        Severity::Medium,
    );
    let report = IncidentReport::from(state.pool.orchestrator().run(incident).await);

    Json(json!({
        "data": {
            "test_passed": report.stage == Stage::Resolved,
            "result": {
                "stage": report.stage,
                "fault_type": report.fault_type,
                "verification_passed": report.verification_passed,
                "events_count": report.events.len(),
                "internal_logs_count": report.internal_logs.len(),
            },
            "internal_logs": report.internal_logs,
        },
        "meta": meta()
    }))
}
