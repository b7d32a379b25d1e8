//! First-settled and all-settled combinators.

use std::future::Future;
use std::pin::Pin;
use std::task::Poll;

use futures_util::future::{join_all, poll_fn};

use super::error::AsyncError;

enum Settlement<T> {
    Fulfilled(T),
    Rejected(usize),
}

/// Resolve with the first future to settle.
///
/// Pending futures are polled in input order. The first success wins. The
/// first failure also wins, as [`AsyncError::Failed`], unless it leaves no
/// future still running: once every future has failed the result is
/// [`AsyncError::AllFailed`] with every error in input order. Losers are
/// dropped when the race ends.
///
/// An empty input is rejected.
pub async fn race<T, E, I, Fut>(futures: I) -> Result<T, AsyncError<E>>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let mut slots: Vec<Option<Pin<Box<Fut>>>> =
        futures.into_iter().map(|future| Some(Box::pin(future))).collect();

    if slots.is_empty() {
        return Err(AsyncError::invalid("race requires at least one future"));
    }

    let total = slots.len();
    let mut errors: Vec<Option<E>> = (0..total).map(|_| None).collect();
    let mut rejected = 0;

    poll_fn(move |cx| {
        let mut first = None;

        for (index, slot) in slots.iter_mut().enumerate() {
            let Some(future) = slot else {
                continue;
            };
            let Poll::Ready(outcome) = future.as_mut().poll(cx) else {
                continue;
            };
            *slot = None;

            match outcome {
                Ok(value) => {
                    if first.is_none() {
                        first = Some(Settlement::Fulfilled(value));
                    }
                }
                Err(error) => {
                    errors[index] = Some(error);
                    rejected += 1;
                    if first.is_none() {
                        first = Some(Settlement::Rejected(index));
                    }
                }
            }
        }

        if rejected == total {
            tracing::debug!(total, "every raced future failed");
            let errors = std::mem::take(&mut errors).into_iter().flatten().collect();
            return Poll::Ready(Err(AsyncError::AllFailed { errors }));
        }

        match first {
            Some(Settlement::Fulfilled(value)) => Poll::Ready(Ok(value)),
            Some(Settlement::Rejected(index)) => match errors[index].take() {
                Some(error) => Poll::Ready(Err(AsyncError::Failed(error))),
                None => Poll::Pending,
            },
            None => Poll::Pending,
        }
    })
    .await
}

/// A successful outcome from [`all_settled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fulfilled<T> {
    pub value: T,
    pub index: usize,
}

/// A failed outcome from [`all_settled`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejected<E> {
    pub reason: E,
    pub index: usize,
}

/// Outcomes of [`all_settled`], partitioned by success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settled<T, E> {
    pub fulfilled: Vec<Fulfilled<T>>,
    pub rejected: Vec<Rejected<E>>,
}

impl<T, E> Settled<T, E> {
    pub fn is_all_fulfilled(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Wait for every future, then split outcomes into successes and failures.
///
/// Each outcome keeps the index of the future it came from.
pub async fn all_settled<T, E, I, Fut>(futures: I) -> Settled<T, E>
where
    I: IntoIterator<Item = Fut>,
    Fut: Future<Output = Result<T, E>>,
{
    let outcomes = join_all(futures).await;

    let mut settled = Settled {
        fulfilled: Vec::new(),
        rejected: Vec::new(),
    };
    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(value) => settled.fulfilled.push(Fulfilled { value, index }),
            Err(reason) => settled.rejected.push(Rejected { reason, index }),
        }
    }
    settled
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::future::BoxFuture;
    use futures_util::FutureExt;
    use std::time::Duration;
    use tokio::time::sleep;

    type Outcome = Result<u32, &'static str>;

    fn after(ms: u64, outcome: Outcome) -> BoxFuture<'static, Outcome> {
        async move {
            if ms > 0 {
                sleep(Duration::from_millis(ms)).await;
            }
            outcome
        }
        .boxed()
    }

    #[tokio::test(start_paused = true)]
    async fn fastest_success_wins() {
        let result = race(vec![after(30, Ok(1)), after(10, Ok(2)), after(20, Err("slow"))]).await;
        assert!(matches!(result, Ok(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn early_failure_rejects_immediately() {
        let result = race(vec![after(50, Ok(1)), after(10, Err("first"))]).await;
        assert!(matches!(result, Err(AsyncError::Failed("first"))));
    }

    #[tokio::test]
    async fn all_failures_are_aggregated_in_order() {
        let result = race(vec![after(0, Err("e1")), after(0, Err("e2"))]).await;
        match result {
            Err(AsyncError::AllFailed { errors }) => assert_eq!(errors, vec!["e1", "e2"]),
            other => panic!("expected AllFailed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failure_with_survivors_rejects_alone() {
        let result = race(vec![after(20, Err("a")), after(10, Err("b"))]).await;
        assert!(matches!(result, Err(AsyncError::Failed("b"))));

        // A lone future failing is also every future failing.
        let result = race(vec![after(5, Err("only"))]).await;
        match result {
            Err(AsyncError::AllFailed { errors }) => assert_eq!(errors, vec!["only"]),
            other => panic!("expected AllFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_race_is_rejected() {
        let none: Vec<BoxFuture<'static, Result<u32, &'static str>>> = Vec::new();
        assert!(matches!(race(none).await, Err(AsyncError::InvalidArgument(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn all_settled_partitions_with_indices() {
        let settled =
            all_settled(vec![after(20, Ok(1)), after(10, Err("bad")), after(5, Ok(3))]).await;

        assert_eq!(
            settled.fulfilled,
            vec![Fulfilled { value: 1, index: 0 }, Fulfilled { value: 3, index: 2 }]
        );
        assert_eq!(settled.rejected, vec![Rejected { reason: "bad", index: 1 }]);
        assert!(!settled.is_all_fulfilled());
    }
}
