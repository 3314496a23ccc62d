#![allow(dead_code)]

pub mod spans;

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fetchbox::{CorrelationId, RequestAttempt, RequestTarget, Transport, TransportFailure};
use serde_json::Value;
use tokio::time::Instant;

/// What the stub does for one call.
#[derive(Debug, Clone)]
pub enum Step {
    /// Answer with this payload.
    Ok(Value),
    /// Answer with this payload after a delay.
    Delayed(Duration, Value),
    /// Fail with this failure.
    Fail(TransportFailure),
    /// Never answer.
    Hang,
    /// Panic with this message after a delay.
    Panic(Duration, &'static str),
}

/// One observed transport call.
#[derive(Debug, Clone)]
pub struct Call {
    pub target: String,
    pub correlation_id: CorrelationId,
    pub number: u32,
    pub at: Instant,
}

/// Transport that replays a script and records every call.
///
/// Once the script runs out the last step repeats.
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: Mutex<Vec<Call>>,
    count: AtomicUsize,
    dropped: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new(steps: impl IntoIterator<Item = Step>) -> Self {
        Self {
            script: Mutex::new(steps.into_iter().collect()),
            last: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            count: AtomicUsize::new(0),
            dropped: AtomicUsize::new(0),
        }
    }

    pub fn always(value: Value) -> Self {
        Self::new([Step::Ok(value)])
    }

    pub fn calls(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Calls whose future was dropped before finishing.
    pub fn dropped(&self) -> usize {
        self.dropped.load(Ordering::SeqCst)
    }

    pub fn recorded(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn next_step(&self) -> Step {
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(step) => {
                *last = Some(step.clone());
                step
            }
            None => last.clone().unwrap_or(Step::Hang),
        }
    }
}

struct DropProbe<'a> {
    dropped: &'a AtomicUsize,
    finished: bool,
}

impl Drop for DropProbe<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.dropped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn send(
        &self,
        target: &RequestTarget,
        attempt: &RequestAttempt,
    ) -> Result<Value, TransportFailure> {
        self.count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push(Call {
            target: target.as_str().to_owned(),
            correlation_id: attempt.correlation_id,
            number: attempt.number,
            at: Instant::now(),
        });
        let mut probe = DropProbe {
            dropped: &self.dropped,
            finished: false,
        };
        let result = match self.next_step() {
            Step::Ok(value) => Ok(value),
            Step::Delayed(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            Step::Fail(failure) => Err(failure),
            Step::Hang => std::future::pending().await,
            Step::Panic(delay, message) => {
                tokio::time::sleep(delay).await;
                panic!("{message}")
            }
        };
        probe.finished = true;
        result
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

pub fn http(status: u16) -> Step {
    Step::Fail(TransportFailure::http_status(status, "upstream says no"))
}

pub fn timeout() -> Step {
    Step::Fail(TransportFailure::Timeout {
        after: Duration::from_millis(500),
    })
}
