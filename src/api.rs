use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use shuttle_axum::axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::analyze::Summary;
use crate::history::HistoryPoint;
use crate::ingest::config::normalize_subject;
use crate::ingest::scheduler::RefreshOutcome;
use crate::snapshot::{CacheState, Snapshot, SnapshotCache, SubjectStatus};

#[derive(Clone)]
pub struct AppState {
    pub cache: Arc<SnapshotCache>,
    pub force_timeout: Duration,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/snapshot", get(get_snapshot))
        .route("/subjects", get(list_subjects))
        .route("/snapshot/{subject}", get(get_subject))
        .route("/refresh", post(force_refresh))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SnapshotResp {
    state: CacheState,
    age_secs: Option<u64>,
    stale_subjects: Vec<String>,
    #[serde(flatten)]
    snapshot: Snapshot,
}

async fn get_snapshot(State(state): State<AppState>) -> Json<SnapshotResp> {
    let view = state.cache.get_snapshot();
    Json(SnapshotResp {
        state: view.state,
        age_secs: view.age.map(|a| a.as_secs()),
        stale_subjects: view.stale_subjects,
        snapshot: (*view.snapshot).clone(),
    })
}

#[derive(Serialize)]
struct SubjectsResp {
    subjects: Vec<String>,
}

async fn list_subjects(State(state): State<AppState>) -> Json<SubjectsResp> {
    Json(SubjectsResp {
        subjects: state.cache.current().subjects(),
    })
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubjectResp {
    subject: String,
    stale: bool,
    summary: Summary,
    history: Vec<HistoryPoint>,
    status: Option<SubjectStatus>,
}

async fn get_subject(State(state): State<AppState>, Path(raw): Path<String>) -> Response {
    let subject = normalize_subject(&raw);
    let view = state.cache.get_snapshot();
    let snap = &view.snapshot;
    let Some(summary) = snap.summaries.get(&subject) else {
        let body = BTreeMap::from([("error", format!("unknown subject {subject}"))]);
        return (StatusCode::NOT_FOUND, Json(body)).into_response();
    };
    Json(SubjectResp {
        stale: view.stale_subjects.contains(&subject),
        summary: summary.clone(),
        history: snap.history.get(&subject).cloned().unwrap_or_default(),
        status: snap.meta.provider_status.get(&subject).cloned(),
        subject,
    })
    .into_response()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResp {
    outcome: &'static str,
    generation: u64,
}

/// Completed -> 200 with the new generation; timed out -> 202, the cycle
/// finishes in the background and the previous snapshot keeps serving.
async fn force_refresh(State(state): State<AppState>) -> Response {
    let signal = state.cache.refresh_signal();
    let outcome = signal.force_refresh(state.force_timeout).await;
    let generation = state.cache.current().meta.generation;
    match outcome {
        RefreshOutcome::Completed => (
            StatusCode::OK,
            Json(RefreshResp {
                outcome: "completed",
                generation,
            }),
        )
            .into_response(),
        RefreshOutcome::TimedOut => (
            StatusCode::ACCEPTED,
            Json(RefreshResp {
                outcome: "timed_out",
                generation,
            }),
        )
            .into_response(),
    }
}
