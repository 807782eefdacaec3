use futures::stream::{self, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use tracing::warn;

use crate::domain::{Issue, Record};
use crate::observability::metrics;

/// Issues recorded during one batch, in insertion order. Clones share the list.
#[derive(Debug, Clone, Default)]
pub struct IssueLog {
    inner: Arc<Mutex<Vec<Issue>>>,
}

impl IssueLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, issue: Issue) {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(issue);
    }

    pub fn snapshot(&self) -> Vec<Issue> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|v| v.len()).unwrap_or_else(|p| p.into_inner().len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Anything the executor can attribute an issue to
pub trait StageItem {
    fn item_id(&self) -> Option<String>;
}

impl StageItem for Record {
    fn item_id(&self) -> Option<String> {
        self.id.clone()
    }
}

/// Bounded fan-out of one per-record operation over a batch.
///
/// Results come back positionally aligned with the input. A failing (or
/// panicking) operation gets its slot filled by the fallback, an issue is
/// logged, and the rest of the batch carries on. No retries happen here.
#[derive(Debug, Clone)]
pub struct StageExecutor {
    issues: IssueLog,
}

impl StageExecutor {
    pub fn new(issues: IssueLog) -> Self {
        Self { issues }
    }

    pub fn issues(&self) -> &IssueLog {
        &self.issues
    }

    /// Run `op` once per item with at most `concurrency` in flight.
    ///
    /// `op` receives a clone of the item so `fallback` can still build the
    /// default result from the original when `op` fails.
    pub async fn run<I, O, F, Fut, D>(
        &self,
        stage: &str,
        concurrency: usize,
        items: Vec<I>,
        op: F,
        fallback: D,
    ) -> Vec<O>
    where
        I: StageItem + Clone,
        F: Fn(I) -> Fut,
        Fut: Future<Output = anyhow::Result<O>>,
        D: Fn(I) -> O,
    {
        let concurrency = concurrency.max(1);
        let op = &op;
        let fallback = &fallback;

        stream::iter(items.into_iter().map(|item| async move {
            let attempt = AssertUnwindSafe(async { op(item.clone()).await })
                .catch_unwind()
                .await;

            let message = match attempt {
                Ok(Ok(output)) => {
                    metrics::stage::record_processed(stage);
                    return output;
                }
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => panic_message(panic),
            };

            let id = item.item_id();
            warn!(stage, record_id = ?id, error = %message, "record failed; using default result");
            metrics::stage::issue_recorded(stage);
            self.issues.push(Issue::new(stage, id, message));
            fallback(item)
        }))
        .buffered(concurrency)
        .collect()
        .await
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
