//! Running many tasks: bounded parallelism and strict sequencing.

use std::future::Future;

use futures_util::future::{join_all, try_join_all};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use super::error::AsyncError;

/// Options for [`parallel`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParallelOptions {
    /// Maximum number of tasks in flight. `None` starts every task at once.
    pub concurrency: Option<usize>,
}

impl ParallelOptions {
    pub fn concurrency(limit: usize) -> Self {
        Self {
            concurrency: Some(limit),
        }
    }
}

/// Run `tasks` concurrently, returning their results in input order.
///
/// Without a limit every task starts immediately and the first failure is
/// returned as soon as it happens. With a limit of `n`, `n` workers pull
/// tasks from a shared cursor; after the first failure no worker starts a
/// new task, tasks already running are allowed to finish, and then the
/// failure is returned.
///
/// A limit of zero is rejected before any task starts.
pub async fn parallel<T, E, F, Fut>(
    tasks: Vec<F>,
    options: ParallelOptions,
) -> Result<Vec<T>, AsyncError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    if options.concurrency == Some(0) {
        return Err(AsyncError::invalid("concurrency must be a positive integer"));
    }

    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    match options.concurrency {
        None => try_join_all(tasks.into_iter().map(|task| task()))
            .await
            .map_err(AsyncError::Failed),
        Some(limit) => run_pool(tasks, limit).await,
    }
}

struct Pool<I, T, E> {
    queue: I,
    results: Vec<Option<T>>,
    error: Option<E>,
}

async fn run_pool<T, E, F, Fut>(tasks: Vec<F>, limit: usize) -> Result<Vec<T>, AsyncError<E>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let total = tasks.len();
    let pool = Mutex::new(Pool {
        queue: tasks.into_iter().enumerate(),
        results: (0..total).map(|_| None).collect(),
        error: None,
    });

    let workers = (0..limit.min(total)).map(|_| worker(&pool));
    join_all(workers).await;

    let pool = pool.into_inner();
    match pool.error {
        Some(error) => Err(AsyncError::Failed(error)),
        None => Ok(pool.results.into_iter().flatten().collect()),
    }
}

async fn worker<I, T, E, F, Fut>(pool: &Mutex<Pool<I, T, E>>)
where
    I: Iterator<Item = (usize, F)>,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    loop {
        let next = {
            let mut pool = pool.lock();
            if pool.error.is_some() {
                None
            } else {
                pool.queue.next()
            }
        };
        let Some((index, task)) = next else {
            return;
        };

        let outcome = task().await;

        let mut pool = pool.lock();
        match outcome {
            Ok(value) => pool.results[index] = Some(value),
            Err(error) => {
                if pool.error.is_none() {
                    tracing::debug!(index, "task failed, no further tasks will start");
                    pool.error = Some(error);
                }
            }
        }
    }
}

/// Run `tasks` one after another, feeding each the previous task's result.
///
/// The first task receives `None`. The first failure stops the sequence and
/// is returned; results gathered so far are discarded.
pub async fn sequential<T, E, F, Fut>(tasks: Vec<F>) -> Result<Vec<T>, AsyncError<E>>
where
    T: Clone,
    F: FnOnce(Option<T>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut results = Vec::with_capacity(tasks.len());
    let mut previous = None;

    for (index, task) in tasks.into_iter().enumerate() {
        match task(previous.take()).await {
            Ok(value) => {
                previous = Some(value.clone());
                results.push(value);
            }
            Err(error) => {
                tracing::debug!(index, "sequential task failed, stopping");
                return Err(AsyncError::Failed(error));
            }
        }
    }

    Ok(results)
}

/// Run `tasks` one after another, continuing past failures.
///
/// Every outcome, success or failure, is recorded in order and handed to
/// the next task as its argument.
pub async fn sequential_settled<T, E, F, Fut>(tasks: Vec<F>) -> Vec<Result<T, E>>
where
    T: Clone,
    E: Clone,
    F: FnOnce(Option<Result<T, E>>) -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut results: Vec<Result<T, E>> = Vec::with_capacity(tasks.len());

    for task in tasks {
        let previous = results.last().cloned();
        results.push(task(previous).await);
    }

    results
}
