//! Fan-in of two streams into one.
//!
//! [`Merge`] yields whichever input has an item ready first. When both are
//! ready on the same poll, the side polled first alternates between polls so
//! neither input can starve the other. Items from one input keep their
//! relative order; no global order is promised.

use futures::stream::{BoxStream, Stream};
use pin_project_lite::pin_project;
use std::pin::Pin;
use std::task::{Context, Poll};

use crate::error::ApiError;

/// The single input stream workers are fed from: fresh passwords merged with
/// passwords returned for retry.
pub type MergedStream = BoxStream<'static, Result<String, ApiError>>;

pin_project! {
    /// Stream returned by [`merge`].
    #[must_use = "streams do nothing unless polled"]
    pub struct Merge<A, B> {
        #[pin]
        first: A,
        #[pin]
        second: B,
        first_done: bool,
        second_done: bool,
        poll_second_first: bool,
    }
}

/// Merge two streams of the same item type.
///
/// The merged stream ends once both inputs have ended.
pub fn merge<A, B>(first: A, second: B) -> Merge<A, B>
where
    A: Stream,
    B: Stream<Item = A::Item>,
{
    Merge {
        first,
        second,
        first_done: false,
        second_done: false,
        poll_second_first: false,
    }
}

impl<A, B> Stream for Merge<A, B>
where
    A: Stream,
    B: Stream<Item = A::Item>,
{
    type Item = A::Item;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        let second_first = *this.poll_second_first;
        *this.poll_second_first = !second_first;

        for turn in 0..2 {
            let poll_second = (turn == 0) == second_first;

            let polled = if poll_second {
                if *this.second_done {
                    continue;
                }
                this.second.as_mut().poll_next(cx)
            } else {
                if *this.first_done {
                    continue;
                }
                this.first.as_mut().poll_next(cx)
            };

            match polled {
                Poll::Ready(Some(item)) => return Poll::Ready(Some(item)),
                Poll::Ready(None) => {
                    if poll_second {
                        *this.second_done = true;
                    } else {
                        *this.first_done = true;
                    }
                }
                Poll::Pending => {}
            }
        }

        if *this.first_done && *this.second_done {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (first_lo, first_hi) = if self.first_done {
            (0, Some(0))
        } else {
            self.first.size_hint()
        };
        let (second_lo, second_hi) = if self.second_done {
            (0, Some(0))
        } else {
            self.second.size_hint()
        };

        let hi = match (first_hi, second_hi) {
            (Some(a), Some(b)) => a.checked_add(b),
            _ => None,
        };
        (first_lo.saturating_add(second_lo), hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::{self, StreamExt};
    use std::time::Duration;
    use tokio::sync::mpsc;
    use tokio_stream::wrappers::ReceiverStream;

    #[tokio::test]
    async fn test_merge_yields_every_item_once_preserving_per_source_order() {
        let merged: Vec<_> = merge(stream::iter(vec![1, 2, 3]), stream::iter(vec![10, 20]))
            .collect()
            .await;

        assert_eq!(merged.len(), 5);

        let from_first: Vec<_> = merged.iter().copied().filter(|v| *v < 10).collect();
        let from_second: Vec<_> = merged.iter().copied().filter(|v| *v >= 10).collect();
        assert_eq!(from_first, vec![1, 2, 3]);
        assert_eq!(from_second, vec![10, 20]);
    }

    #[tokio::test]
    async fn test_merge_alternates_when_both_ready() {
        let merged: Vec<_> = merge(stream::iter(vec!['a', 'b']), stream::iter(vec!['x', 'y']))
            .collect()
            .await;

        assert_eq!(merged, vec!['a', 'x', 'b', 'y']);
    }

    #[tokio::test]
    async fn test_merge_is_live_while_other_side_is_pending() {
        let mut merged = merge(stream::pending::<u32>(), stream::iter(vec![7, 8]));

        let first = tokio::time::timeout(Duration::from_secs(1), merged.next()).await;
        let second = tokio::time::timeout(Duration::from_secs(1), merged.next()).await;

        assert_eq!(first.ok().flatten(), Some(7));
        assert_eq!(second.ok().flatten(), Some(8));
    }

    #[tokio::test]
    async fn test_merge_ends_only_when_both_sides_end() {
        let (tx, rx) = mpsc::channel(2);
        let mut merged = merge(stream::iter(vec![1]), ReceiverStream::new(rx));

        assert_eq!(merged.next().await, Some(1));

        tx.send(2).await.expect("receiver alive");
        assert_eq!(merged.next().await, Some(2));

        drop(tx);
        assert_eq!(merged.next().await, None);
    }

    #[tokio::test]
    async fn test_merge_wakes_on_late_item() {
        let (tx, rx) = mpsc::channel(1);
        let mut merged = merge(stream::pending::<u32>(), ReceiverStream::new(rx));

        let sender = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send(42).await.expect("receiver alive");
        });

        let item = tokio::time::timeout(Duration::from_secs(1), merged.next()).await;
        assert_eq!(item.ok().flatten(), Some(42));
        sender.await.expect("sender task");
    }
}
