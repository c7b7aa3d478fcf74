//! Mock capabilities for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::core::NumericParams;
use crate::stages::{CapabilityError, GenerativeCapability, RawOutput};

type Response = Result<RawOutput, CapabilityError>;

/// A capability that replays scripted responses, then a fallback forever.
#[derive(Debug)]
pub struct ScriptedCapability {
    script: Mutex<VecDeque<Response>>,
    fallback: Response,
    delay: Option<Duration>,
    calls: AtomicUsize,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedCapability {
    /// Always returns `output`.
    #[must_use]
    pub fn always(output: RawOutput) -> Self {
        Self::with_fallback(Ok(output))
    }

    /// Always fails with `error`.
    #[must_use]
    pub fn always_err(error: CapabilityError) -> Self {
        Self::with_fallback(Err(error))
    }

    fn with_fallback(fallback: Response) -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            fallback,
            delay: None,
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Responses returned, in order, before the fallback.
    #[must_use]
    pub fn with_script(self, responses: impl IntoIterator<Item = Response>) -> Self {
        self.script.lock().extend(responses);
        self
    }

    /// Sleeps before every response.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Prompts received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

#[async_trait]
impl GenerativeCapability for ScriptedCapability {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn invoke(&self, prompt: &str, _params: &NumericParams) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().push(prompt.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        let scripted = self.script.lock().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }
}

/// A capability backed by a closure over the prompt and numeric parameters.
pub struct FnCapability<F>
where
    F: Fn(&str, &NumericParams) -> Response + Send + Sync,
{
    func: F,
    calls: AtomicUsize,
}

impl<F> FnCapability<F>
where
    F: Fn(&str, &NumericParams) -> Response + Send + Sync,
{
    /// Wraps `func`.
    pub fn new(func: F) -> Self {
        Self {
            func,
            calls: AtomicUsize::new(0),
        }
    }

    /// Number of invocations so far.
    #[must_use]
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl<F> fmt::Debug for FnCapability<F>
where
    F: Fn(&str, &NumericParams) -> Response + Send + Sync,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCapability")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl<F> GenerativeCapability for FnCapability<F>
where
    F: Fn(&str, &NumericParams) -> Response + Send + Sync,
{
    fn name(&self) -> &str {
        "fn"
    }

    async fn invoke(&self, prompt: &str, params: &NumericParams) -> Response {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.func)(prompt, params)
    }
}

/// A capability that blocks every invocation until the gate is opened.
///
/// Tracks how many invocations started, finished, and were dropped while
/// still waiting, so tests can observe single-flight and cancellation.
#[derive(Debug)]
pub struct GatedCapability {
    output: RawOutput,
    gate: watch::Sender<bool>,
    started: watch::Sender<usize>,
    finished: AtomicUsize,
    abandoned: Arc<AtomicUsize>,
}

impl GatedCapability {
    /// Creates a closed gate that releases `output`.
    #[must_use]
    pub fn new(output: RawOutput) -> Self {
        Self {
            output,
            gate: watch::Sender::new(false),
            started: watch::Sender::new(0),
            finished: AtomicUsize::new(0),
            abandoned: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Releases every waiting and future invocation.
    pub fn open(&self) {
        self.gate.send_replace(true);
    }

    /// Waits until at least `count` invocations have started.
    pub async fn wait_started(&self, count: usize) {
        let mut rx = self.started.subscribe();
        let _ = rx.wait_for(|started| *started >= count).await;
    }

    /// Invocations that started.
    #[must_use]
    pub fn started(&self) -> usize {
        *self.started.borrow()
    }

    /// Invocations that returned output.
    #[must_use]
    pub fn finished(&self) -> usize {
        self.finished.load(Ordering::SeqCst)
    }

    /// Invocations dropped before the gate opened.
    #[must_use]
    pub fn abandoned(&self) -> usize {
        self.abandoned.load(Ordering::SeqCst)
    }
}

struct AbandonGuard {
    counter: Arc<AtomicUsize>,
    armed: bool,
}

impl Drop for AbandonGuard {
    fn drop(&mut self) {
        if self.armed {
            self.counter.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl GenerativeCapability for GatedCapability {
    fn name(&self) -> &str {
        "gated"
    }

    async fn invoke(&self, _prompt: &str, _params: &NumericParams) -> Response {
        let mut guard = AbandonGuard {
            counter: Arc::clone(&self.abandoned),
            armed: true,
        };
        let mut gate = self.gate.subscribe();
        self.started.send_modify(|started| *started += 1);

        if gate.wait_for(|open| *open).await.is_err() {
            return Err(CapabilityError::Unavailable("gate dropped".to_string()));
        }

        guard.armed = false;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(self.output.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::duck_params;

    #[tokio::test]
    async fn test_scripted_capability_replays_then_falls_back() {
        let capability = ScriptedCapability::always(RawOutput::text("fallback"))
            .with_script([Err(CapabilityError::TimedOut)]);
        let params = duck_params().numeric();

        assert_eq!(
            capability.invoke("p", &params).await,
            Err(CapabilityError::TimedOut)
        );
        assert_eq!(
            capability.invoke("p", &params).await,
            Ok(RawOutput::text("fallback"))
        );
        assert_eq!(capability.calls(), 2);
    }

    #[tokio::test]
    async fn test_gated_capability_counts_abandoned() {
        let capability = Arc::new(GatedCapability::new(RawOutput::text("story")));
        let params = duck_params().numeric();

        let task = {
            let capability = Arc::clone(&capability);
            tokio::spawn(async move { capability.invoke("p", &params).await })
        };
        capability.wait_started(1).await;
        task.abort();
        let _ = task.await;

        assert_eq!(capability.started(), 1);
        assert_eq!(capability.finished(), 0);
        assert_eq!(capability.abandoned(), 1);
    }
}
