//! Worker invocation.
//!
//! One invocation is one request/response exchange. No retries happen here;
//! every failure comes back as an `InvokeError` value.

use rand::SeedableRng;
use rand::rngs::StdRng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

use crate::client::WorkerTarget;
use crate::models::{InvokeError, PiError, RoundOutcome, WorkUnit};
use crate::worker::{STATUS_OK, WorkerRequest, WorkerResponse, WorkerStatus, handle_request};

/// Result of a single invocation.
pub type InvokeResult = std::result::Result<RoundOutcome, InvokeError>;

/// Runs one work unit on one worker.
pub trait WorkerInvoker: Send + Sync + 'static {
    fn invoke(
        &self,
        unit: &WorkUnit,
        target: &WorkerTarget,
    ) -> impl Future<Output = InvokeResult> + Send;
}

/// Turn a raw worker reply into a `RoundOutcome`.
///
/// Anything that would let a unit's shots go missing or be counted twice is
/// rejected as `BadResponse`.
pub fn decode_response(status: u16, body: &[u8], unit: &WorkUnit) -> InvokeResult {
    if status != STATUS_OK {
        let message = match serde_json::from_slice::<WorkerResponse>(body) {
            Ok(WorkerResponse { msg: Some(msg), .. }) => format!("HTTP {status}: {msg}"),
            _ => format!("HTTP {status}: {}", String::from_utf8_lossy(body).trim()),
        };
        return Err(InvokeError::Worker { message });
    }

    let response: WorkerResponse = serde_json::from_slice(body)
        .map_err(|e| InvokeError::BadResponse(format!("invalid response envelope: {e}")))?;

    if response.status != WorkerStatus::Ok {
        return Err(InvokeError::Worker {
            message: response
                .msg
                .unwrap_or_else(|| "worker reported failure without a message".to_string()),
        });
    }

    let partials = response
        .result
        .ok_or_else(|| InvokeError::BadResponse("missing result".to_string()))?;

    let elapsed_secs = response
        .duration
        .ok_or_else(|| InvokeError::BadResponse("missing duration".to_string()))?;
    if !elapsed_secs.is_finite() || elapsed_secs < 0.0 {
        return Err(InvokeError::BadResponse(format!(
            "invalid duration {elapsed_secs}"
        )));
    }

    check_partials(&partials, unit)?;

    Ok(RoundOutcome {
        work_unit_id: unit.work_unit_id.clone(),
        partials,
        elapsed_secs,
    })
}

fn check_partials(
    partials: &[crate::models::PartialResult],
    unit: &WorkUnit,
) -> std::result::Result<(), InvokeError> {
    let last = partials.len().saturating_sub(1);
    let mut total_shots = 0u64;

    for (i, partial) in partials.iter().enumerate() {
        if partial.work_unit_id != unit.work_unit_id {
            return Err(InvokeError::BadResponse(format!(
                "partial for unit {}, expected {}",
                partial.work_unit_id, unit.work_unit_id
            )));
        }
        if partial.shots == 0 || partial.shots > unit.report_interval {
            return Err(InvokeError::BadResponse(format!(
                "partial {i} has {} shots, interval is {}",
                partial.shots, unit.report_interval
            )));
        }
        if i < last && partial.shots != unit.report_interval {
            return Err(InvokeError::BadResponse(format!(
                "partial {i} is short ({} shots) but not the last one",
                partial.shots
            )));
        }
        if partial.in_circle > partial.shots {
            return Err(InvokeError::BadResponse(format!(
                "partial {i} has {} points in circle out of {} shots",
                partial.in_circle, partial.shots
            )));
        }
        total_shots += partial.shots;
    }

    if total_shots < unit.reported_shots() || total_shots > unit.subshot_count {
        return Err(InvokeError::BadResponse(format!(
            "reported {total_shots} shots for a unit of {} (interval {})",
            unit.subshot_count, unit.report_interval
        )));
    }

    Ok(())
}

/// Invokes deployed workers over HTTP.
pub struct HttpInvoker {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpInvoker {
    /// Create an invoker whose every request times out after `timeout_secs`.
    pub fn new(timeout_secs: u64) -> crate::models::Result<Self> {
        let timeout = Duration::from_secs(timeout_secs);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(PiError::Network)?;

        Ok(Self { client, timeout })
    }

    /// One GET carrying the work unit as query parameters.
    fn request(&self, unit: &WorkUnit, target: &WorkerTarget) -> reqwest::RequestBuilder {
        let builder = self
            .client
            .get(&target.endpoint)
            .query(&WorkerRequest::from(unit));
        match &target.api_key {
            Some(api_key) => builder.header("x-api-key", api_key),
            None => builder,
        }
    }
}

impl WorkerInvoker for HttpInvoker {
    async fn invoke(&self, unit: &WorkUnit, target: &WorkerTarget) -> InvokeResult {
        let response = self
            .request(unit, target)
            .send().await.map_err(|e| {
            if e.is_timeout() {
                InvokeError::Transport(format!("timed out after {:?}", self.timeout))
            } else {
                InvokeError::Transport(e.to_string())
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| InvokeError::Transport(format!("reading response body: {e}")))?;

        debug!(
            slot = target.slot,
            work_unit = %unit.work_unit_id,
            status = status,
            bytes = body.len(),
            "Worker responded"
        );

        decode_response(status, &body, unit)
    }
}

/// Runs the worker handler in-process on the blocking pool.
///
/// With a seed, the draws of a unit depend only on the seed, the round and
/// the worker slot.
#[derive(Debug, Clone, Default)]
pub struct LocalInvoker {
    seed: Option<u64>,
}

impl LocalInvoker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(seed: u64) -> Self {
        Self { seed: Some(seed) }
    }
}

impl WorkerInvoker for LocalInvoker {
    async fn invoke(&self, unit: &WorkUnit, target: &WorkerTarget) -> InvokeResult {
        let request = WorkerRequest::from(unit);
        let seed = self
            .seed
            .map(|s| s ^ ((u64::from(unit.round) << 32) | target.slot as u64));

        let reply = tokio::task::spawn_blocking(move || match seed {
            Some(seed) => handle_request(&mut StdRng::seed_from_u64(seed), &request),
            None => handle_request(&mut rand::thread_rng(), &request),
        })
        .await
        .map_err(|e| InvokeError::TaskFailed(e.to_string()))?;

        let body = serde_json::to_vec(&reply.body)
            .map_err(|e| InvokeError::BadResponse(format!("encoding local reply: {e}")))?;

        decode_response(reply.status_code, &body, unit)
    }
}
