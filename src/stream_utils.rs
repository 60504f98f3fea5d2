// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Adapters from tokio channels to `futures` streams.

use futures_util::stream::{self, BoxStream, StreamExt};
use tokio::sync::{broadcast, watch};

/// Stream every value sent on a broadcast channel.
///
/// A slow subscriber that lags skips the lost values and keeps going. The
/// stream ends when every sender is dropped.
pub fn broadcast_stream<T>(rx: broadcast::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + 'static,
{
    stream::unfold(rx, |mut rx| async move {
        loop {
            match rx.recv().await {
                Ok(value) => return Some((value, rx)),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "Broadcast subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    })
    .boxed()
}

/// Stream the current value of a watch channel, then every change.
pub fn watch_stream<T>(rx: watch::Receiver<T>) -> BoxStream<'static, T>
where
    T: Clone + Send + Sync + 'static,
{
    stream::unfold((rx, true), |(mut rx, first)| async move {
        if !first && rx.changed().await.is_err() {
            return None;
        }
        let value = rx.borrow_and_update().clone();
        Some((value, (rx, false)))
    })
    .boxed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_broadcast_stream_ends_when_sender_dropped() {
        let (tx, rx) = broadcast::channel(4);
        let mut s = broadcast_stream(rx);
        tx.send(1).unwrap();
        tx.send(2).unwrap();
        drop(tx);
        assert_eq!(s.next().await, Some(1));
        assert_eq!(s.next().await, Some(2));
        assert_eq!(s.next().await, None);
    }

    #[tokio::test]
    async fn test_watch_stream_starts_with_current_value() {
        let (tx, rx) = watch::channel(7);
        let mut s = watch_stream(rx);
        assert_eq!(s.next().await, Some(7));
        tx.send(8).unwrap();
        assert_eq!(s.next().await, Some(8));
    }
}
