// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Owned, cancellable background timers.
//!
//! Every periodic task a session runs is registered here. Dropping the set
//! cancels and aborts all of them, so no timer outlives its session.

use std::future::Future;

use log::{debug, warn};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// A group of named background tasks sharing one cancellation scope.
#[derive(Debug, Default)]
pub struct TimerSet {
    cancel_token: CancellationToken,
    timers: Vec<(&'static str, JoinHandle<()>)>,
}

impl TimerSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Spawn a timer task.
    ///
    /// The closure receives a token that is cancelled when the set shuts down;
    /// the task is expected to select on it and return promptly.
    pub fn spawn<F, Fut>(&mut self, name: &'static str, task: F)
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.cancel_token.child_token();
        debug!("Starting timer {}", name);
        self.timers.push((name, tokio::spawn(task(token))));
    }

    /// Number of registered timers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Whether shutdown has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel_token.is_cancelled()
    }

    /// Cancel every timer and wait for each task to finish.
    pub async fn shutdown(&mut self) {
        self.cancel_token.cancel();
        for (name, handle) in self.timers.drain(..) {
            match handle.await {
                Ok(()) => debug!("Timer {} stopped", name),
                Err(e) if e.is_cancelled() => debug!("Timer {} aborted", name),
                Err(e) => warn!("Timer {} panicked: {}", name, e),
            }
        }
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_token.cancel();
        for (_, handle) in &self.timers {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    async fn ticker(count: Arc<AtomicUsize>, token: CancellationToken) {
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        loop {
            tokio::select! {
                () = token.cancelled() => break,
                _ = interval.tick() => {
                    count.fetch_add(1, Ordering::SeqCst);
                }
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_all_timers() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut timers = TimerSet::new();
        let a = Arc::clone(&count);
        timers.spawn("a", |token| ticker(a, token));
        let b = Arc::clone(&count);
        timers.spawn("b", |token| ticker(b, token));
        assert_eq!(timers.len(), 2);

        tokio::time::sleep(Duration::from_millis(2500)).await;
        timers.shutdown().await;
        let stopped_at = count.load(Ordering::SeqCst);
        assert!(stopped_at >= 4);
        assert!(timers.is_empty());
        assert!(timers.is_cancelled());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), stopped_at);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_cancels_timers() {
        let count = Arc::new(AtomicUsize::new(0));
        let mut timers = TimerSet::new();
        let c = Arc::clone(&count);
        timers.spawn("ticker", |token| ticker(c, token));
        tokio::time::sleep(Duration::from_millis(1500)).await;
        drop(timers);

        tokio::task::yield_now().await;
        let stopped_at = count.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(count.load(Ordering::SeqCst), stopped_at);
    }
}
