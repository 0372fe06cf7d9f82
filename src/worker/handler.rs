//! Worker side of the request/response contract.
//!
//! A deployed worker receives `subshots`, `report_rate` and `resource_id`,
//! samples, and answers with a JSON envelope. The same handler backs the
//! in-process adapter, so both adapters speak byte-identical replies.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use super::sample;
use crate::models::{PartialResult, WorkUnit};

/// HTTP status the reference worker uses for a successful computation.
pub const STATUS_OK: u16 = 200;
/// HTTP status the reference worker uses for a failed computation.
pub const STATUS_FAILED: u16 = 502;

/// Request parameters, sent as a query string.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub subshots: u64,
    pub report_rate: u64,
    pub resource_id: String,
}

impl From<&WorkUnit> for WorkerRequest {
    fn from(unit: &WorkUnit) -> Self {
        Self {
            subshots: unit.subshot_count,
            report_rate: unit.report_interval,
            resource_id: unit.work_unit_id.clone(),
        }
    }
}

/// Outcome flag of the response envelope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Ok,
    Failed,
}

/// Response envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerResponse {
    pub status: WorkerStatus,

    #[serde(default)]
    pub result: Option<Vec<PartialResult>>,

    /// Compute time in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(default, alias = "message", skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
}

impl WorkerResponse {
    pub fn ok(result: Vec<PartialResult>, duration: f64) -> Self {
        Self {
            status: WorkerStatus::Ok,
            result: Some(result),
            duration: Some(duration),
            msg: None,
        }
    }

    pub fn failed(msg: impl Into<String>) -> Self {
        Self {
            status: WorkerStatus::Failed,
            result: None,
            duration: None,
            msg: Some(msg.into()),
        }
    }
}

/// Status code plus body, before any transport touches it.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReply {
    pub status_code: u16,
    pub body: WorkerResponse,
}

/// Serve one sampling request.
pub fn handle_request<R: Rng + ?Sized>(rng: &mut R, request: &WorkerRequest) -> WorkerReply {
    let start = Instant::now();

    if request.report_rate == 0 {
        return WorkerReply {
            status_code: STATUS_FAILED,
            body: WorkerResponse::failed("report_rate must be a positive integer"),
        };
    }

    if request.resource_id.is_empty() {
        return WorkerReply {
            status_code: STATUS_FAILED,
            body: WorkerResponse::failed("resource_id is required"),
        };
    }

    let partials = sample(
        rng,
        request.subshots,
        request.report_rate,
        &request.resource_id,
    );

    WorkerReply {
        status_code: STATUS_OK,
        body: WorkerResponse::ok(partials, start.elapsed().as_secs_f64()),
    }
}
