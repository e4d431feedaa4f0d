//! Concurrency-bounded task runner
//!
//! Runs keyed futures with at most `max_concurrency` in flight. The set is
//! seeded up to the ceiling and one task is admitted for each completion.
//! A panicking task is captured as that task's outcome; siblings keep running.

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;

/// How a single task settled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome<T> {
    Finished(T),
    Panicked(String),
}

#[derive(Debug, Clone, Copy)]
pub struct TaskRunner {
    max_concurrency: usize,
}

impl TaskRunner {
    /// A ceiling of 0 is treated as 1
    pub fn new(max_concurrency: usize) -> Self {
        Self {
            max_concurrency: max_concurrency.max(1),
        }
    }

    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Drive every task to completion
    ///
    /// Results come back in completion order, each paired with its task key.
    pub async fn run<K, T, F, I>(&self, tasks: I) -> Vec<(K, TaskOutcome<T>)>
    where
        I: IntoIterator<Item = (K, F)>,
        F: Future<Output = T>,
    {
        let mut pending = tasks.into_iter();
        let mut in_flight = FuturesUnordered::new();
        let mut results = Vec::new();

        let settle = |(key, task): (K, F)| async move {
            let outcome = match AssertUnwindSafe(task).catch_unwind().await {
                Ok(value) => TaskOutcome::Finished(value),
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    tracing::warn!(panic = %message, "Task panicked");
                    TaskOutcome::Panicked(message)
                }
            };
            (key, outcome)
        };

        // Seed up to the ceiling
        for task in pending.by_ref().take(self.max_concurrency) {
            in_flight.push(settle(task));
        }

        // Admit one new task per completion
        while let Some(result) = in_flight.next().await {
            results.push(result);
            if let Some(task) = pending.next() {
                in_flight.push(settle(task));
            }
        }

        results
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "task panicked".to_string()
    }
}
