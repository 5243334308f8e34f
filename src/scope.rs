use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::sync::watch;

/// A cancellation scope. Cancelling a scope cancels every child created from
/// it; cancelling a child leaves the parent alone.
#[derive(Clone)]
pub struct Scope {
    flag: Arc<watch::Sender<bool>>,
    parent: Option<Box<Scope>>,
}

impl Default for Scope {
    fn default() -> Self {
        Self::new()
    }
}

impl Scope {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self {
            flag: Arc::new(tx),
            parent: None,
        }
    }

    pub fn child(&self) -> Self {
        let mut child = Self::new();
        child.parent = Some(Box::new(self.clone()));
        child
    }

    pub fn cancel(&self) {
        self.flag.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.flag.borrow() || self.parent.as_ref().is_some_and(|p| p.is_cancelled())
    }

    /// Resolves once this scope or any ancestor is cancelled.
    pub fn cancelled(&self) -> BoxFuture<'_, ()> {
        async move {
            let mut rx = self.flag.subscribe();
            match self.parent {
                None => {
                    let _ = rx.wait_for(|cancelled| *cancelled).await;
                }
                Some(ref parent) => {
                    tokio::select! {
                        _ = rx.wait_for(|cancelled| *cancelled) => {}
                        _ = parent.cancelled() => {}
                    }
                }
            }
        }
        .boxed()
    }

    /// Drive `fut` unless the scope is cancelled first. Dropping the future
    /// aborts any request it had in flight.
    pub async fn run<F: Future>(&self, fut: F) -> Option<F::Output> {
        if self.is_cancelled() {
            return None;
        }
        tokio::select! {
            biased;
            _ = self.cancelled() => None,
            out = fut => Some(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn run_completes_when_not_cancelled() {
        let scope = Scope::new();
        assert_eq!(scope.run(async { 7 }).await, Some(7));
    }

    #[tokio::test]
    async fn cancelled_scope_skips_work() {
        let scope = Scope::new();
        scope.cancel();
        assert!(scope.is_cancelled());
        assert_eq!(scope.run(async { 7 }).await, None);
    }

    #[tokio::test]
    async fn cancel_interrupts_pending_work() {
        let scope = Scope::new();
        let runner = scope.clone();
        let task = tokio::spawn(async move {
            runner
                .run(tokio::time::sleep(Duration::from_secs(30)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        scope.cancel();
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn parent_cancel_reaches_child() {
        let root = Scope::new();
        let child = root.child();
        let runner = child.clone();
        let task = tokio::spawn(async move {
            runner
                .run(tokio::time::sleep(Duration::from_secs(30)))
                .await
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        root.cancel();
        assert!(child.is_cancelled());
        let result = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn child_cancel_leaves_parent() {
        let root = Scope::new();
        let child = root.child();
        child.cancel();
        assert!(child.is_cancelled());
        assert!(!root.is_cancelled());
    }
}
