//! Admin API handlers for DNS rewrites.

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hickory_proto::rr::RecordType;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::filtering::DnsFilter;
use crate::http::server::AppState;
use crate::matching::rule::rcode_name;
use crate::matching::RewriteOutcome;
use crate::rewrite::{Item, RewriteEntry, RewriteError, RewriteResult};

#[derive(Debug, Serialize, Deserialize)]
pub struct SystemStatus {
    pub version: String,
    pub status: String,
    pub rewrites: usize,
    pub rules: usize,
}

#[derive(Debug, Deserialize)]
pub struct CheckParams {
    pub name: String,
    #[serde(default)]
    pub qtype: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CheckResponse {
    pub matched: bool,
    pub exempted: bool,
    pub rcode: Option<String>,
    pub cname: Option<String>,
    pub answers: Vec<String>,
    pub rules: Vec<String>,
}

fn bad_request(msg: String) -> Response {
    tracing::debug!(error = %msg, "Rejecting admin request");
    (StatusCode::BAD_REQUEST, msg).into_response()
}

fn decode_entry(body: &[u8]) -> Result<Option<RewriteEntry>, Response> {
    serde_json::from_slice(body).map_err(|e| bad_request(format!("json.Decode: {}", e)))
}

fn mutation_error(action: &str, err: RewriteError) -> Response {
    match err {
        RewriteError::MissingEntry | RewriteError::InvalidEntry(_) => {
            bad_request(format!("normalizing: {}", err))
        }
        RewriteError::Compile(_) => bad_request(format!("{} rewrite item: {}", action, err)),
    }
}

/// Runs a store mutation off the async workers; it rebuilds the engine and
/// writes the config file.
async fn run_mutation<F>(state: &AppState, action: &str, mutate: F) -> Response
where
    F: FnOnce(&DnsFilter) -> RewriteResult<Item> + Send + 'static,
{
    let filter = state.filter.clone();
    match tokio::task::spawn_blocking(move || mutate(filter.as_ref())).await {
        Ok(Ok(item)) => {
            tracing::info!(
                action,
                domain = %item.domain(),
                answer = %item.answer(),
                "Rewrite updated"
            );
            StatusCode::OK.into_response()
        }
        Ok(Err(e)) => mutation_error(action, e),
        Err(e) => {
            tracing::error!(action, error = %e, "Rewrite task failed");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn get_status(State(state): State<AppState>) -> Json<SystemStatus> {
    let snapshot = state.filter.storage().snapshot();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        status: "operational".to_string(),
        rewrites: snapshot.items().len(),
        rules: snapshot.engine().rules_count(),
    })
}

pub async fn list_rewrites(State(state): State<AppState>) -> Json<Vec<RewriteEntry>> {
    Json(state.filter.list())
}

pub async fn add_rewrite(State(state): State<AppState>, body: Bytes) -> Response {
    let entry = match decode_entry(&body) {
        Ok(entry) => entry,
        Err(resp) => return resp,
    };

    run_mutation(&state, "add", move |filter| filter.add(entry)).await
}

pub async fn delete_rewrite(State(state): State<AppState>, body: Bytes) -> Response {
    let entry = match decode_entry(&body) {
        Ok(entry) => entry,
        Err(resp) => return resp,
    };

    run_mutation(&state, "remove", move |filter| filter.remove(entry)).await
}

pub async fn check_host(
    State(state): State<AppState>,
    Query(params): Query<CheckParams>,
) -> Response {
    let qtype = params.qtype.as_deref().unwrap_or("A");
    let qtype = match RecordType::from_str(&qtype.to_uppercase()) {
        Ok(RecordType::Unknown(_)) | Err(_) => {
            return bad_request(format!("unknown qtype {:?}", qtype))
        }
        Ok(rtype) => rtype,
    };

    let check = state.filter.check(&params.name, qtype);
    let mut resp = CheckResponse::default();

    if let Some(result) = &check.result {
        resp.matched = true;
        resp.rules = result
            .exception
            .iter()
            .chain(result.dns_rewrites.iter())
            .map(|rule| rule.text().to_string())
            .collect();
    }

    match check.outcome {
        Some(RewriteOutcome::Exempt) => resp.exempted = true,
        Some(RewriteOutcome::Rcode(rcode)) => resp.rcode = Some(rcode_name(rcode).to_string()),
        Some(RewriteOutcome::Cname(target)) => {
            resp.rcode = Some("NOERROR".to_string());
            resp.cname = Some(target);
        }
        Some(RewriteOutcome::Answers(values)) => {
            resp.rcode = Some("NOERROR".to_string());
            resp.answers = values.iter().map(ToString::to_string).collect();
        }
        None => {}
    }

    Json(resp).into_response()
}
