//! Scripted invoker shared by the dispatcher and controller tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::client::{InvokeResult, WorkerInvoker, WorkerTarget};
use crate::models::{InvokeError, PartialResult, RoundOutcome, WorkUnit};

/// What a scripted worker answers.
pub(crate) enum Scripted {
    /// Every complete interval reports `in_circle` points inside
    Ok { in_circle: u64, elapsed_secs: f64 },
    Fail(InvokeError),
}

impl Scripted {
    pub(crate) fn ok(in_circle: u64, elapsed_secs: f64) -> Self {
        Self::Ok {
            in_circle,
            elapsed_secs,
        }
    }
}

type Script = Box<dyn Fn(&WorkUnit, &WorkerTarget) -> Scripted + Send + Sync>;

pub(crate) struct ScriptedInvoker {
    script: Script,
    delay: Duration,
    pub(crate) calls: AtomicUsize,
    in_flight: AtomicUsize,
    pub(crate) peak: AtomicUsize,
}

impl ScriptedInvoker {
    pub(crate) fn new(
        script: impl Fn(&WorkUnit, &WorkerTarget) -> Scripted + Send + Sync + 'static,
    ) -> Self {
        Self {
            script: Box::new(script),
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

impl WorkerInvoker for ScriptedInvoker {
    async fn invoke(&self, unit: &WorkUnit, target: &WorkerTarget) -> InvokeResult {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        match (self.script)(unit, target) {
            Scripted::Ok {
                in_circle,
                elapsed_secs,
            } => {
                let chunks = unit.subshot_count / unit.report_interval;
                let partials = (0..chunks)
                    .map(|_| PartialResult {
                        work_unit_id: unit.work_unit_id.clone(),
                        in_circle,
                        shots: unit.report_interval,
                    })
                    .collect();
                Ok(RoundOutcome {
                    work_unit_id: unit.work_unit_id.clone(),
                    partials,
                    elapsed_secs,
                })
            }
            Scripted::Fail(e) => Err(e),
        }
    }
}
