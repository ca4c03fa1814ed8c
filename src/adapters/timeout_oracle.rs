//! Deadline wrapper for slow decision oracles.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::{Builder, Runtime};
use tokio::task::JoinHandle;
use tracing::warn;

use crate::domain::error::{EngineError, OracleError};
use crate::ports::decision_port::{DecisionOracle, OracleDecision, OracleQuery};

type Answer = Result<OracleDecision, OracleError>;

/// Runs calls to the wrapped oracle on a single blocking worker and gives up
/// after `timeout`. At most one call is in flight: while a timed-out call is
/// still running, further calls return `Unavailable` without reaching the
/// oracle. A late answer is discarded.
///
/// `decide` blocks on its own runtime, so it must not be called from inside
/// another tokio runtime.
pub struct TimeoutOracle<O> {
    inner: Arc<O>,
    timeout: Duration,
    runtime: Option<Runtime>,
    in_flight: Mutex<Option<JoinHandle<Answer>>>,
}

impl<O> TimeoutOracle<O>
where
    O: DecisionOracle + Send + Sync + 'static,
{
    pub fn new(inner: O, timeout: Duration) -> Result<Self, EngineError> {
        let runtime = Builder::new_current_thread()
            .enable_time()
            .max_blocking_threads(1)
            .thread_name("oracle-call")
            .build()?;
        Ok(Self {
            inner: Arc::new(inner),
            timeout,
            runtime: Some(runtime),
            in_flight: Mutex::new(None),
        })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

fn unavailable(reason: impl Into<String>) -> OracleError {
    OracleError::Unavailable {
        reason: reason.into(),
    }
}

impl<O> DecisionOracle for TimeoutOracle<O>
where
    O: DecisionOracle + Send + Sync + 'static,
{
    fn decide(&self, query: &OracleQuery) -> Answer {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| unavailable("oracle runtime is shut down"))?;
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| unavailable("oracle call state is poisoned"))?;

        if in_flight.as_ref().is_some_and(|call| !call.is_finished()) {
            warn!(symbol = %query.symbol, "previous oracle call still running");
            return Err(unavailable("previous oracle call still running"));
        }
        *in_flight = None;

        let inner = Arc::clone(&self.inner);
        let owned = query.clone();
        let mut call = runtime.spawn_blocking(move || inner.decide(&owned));
        let timeout = self.timeout;
        let outcome = runtime.block_on(async { tokio::time::timeout(timeout, &mut call).await });

        match outcome {
            Ok(Ok(answer)) => answer,
            Ok(Err(e)) => {
                warn!(symbol = %query.symbol, error = %e, "oracle call failed");
                Err(unavailable(format!("oracle call ended without an answer: {e}")))
            }
            Err(_) => {
                let millis = timeout.as_millis() as u64;
                warn!(symbol = %query.symbol, millis, "oracle call timed out");
                *in_flight = Some(call);
                Err(OracleError::Timeout { millis })
            }
        }
    }
}

impl<O> Drop for TimeoutOracle<O> {
    fn drop(&mut self) {
        // Leave a hung call behind instead of blocking on it.
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}
