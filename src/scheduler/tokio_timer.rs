//! Scheduler delegating each delayed event to the tokio timer

use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Handle, TryCurrentError};

use super::{DelayScheduler, DelayedTarget, ScheduledHandle, ScheduledTask};

/// A [`DelayScheduler`] that spawns one sleeping task per request on a tokio
/// runtime. Cancelling the returned handle also aborts the sleeping task.
///
/// Firing runs the transition's actions on a runtime worker, so actions should
/// stay short.
#[derive(Debug, Clone)]
pub struct TokioScheduler {
    handle: Handle,
}

impl TokioScheduler {
    /// Schedule on the given runtime
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Schedule on the runtime the caller is running in
    pub fn try_current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl<S, E> DelayScheduler<S, E> for TokioScheduler
where
    S: Debug + Send + Sync + 'static,
    E: Debug + Send + Sync + 'static,
{
    fn schedule(
        &self,
        original_state: S,
        event: E,
        delay: Duration,
        target: Arc<dyn DelayedTarget<S, E>>,
    ) -> ScheduledHandle {
        let (task, handle) = ScheduledTask::new(original_state, event, delay, target);
        let join = self.handle.spawn(async move {
            tokio::time::sleep_until(task.due().into()).await;
            task.fire();
        });
        let abort = join.abort_handle();
        handle.on_cancel(move || abort.abort());
        handle
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::{Outcome, RecordingTarget};
    use super::*;
    use tokio::time::{sleep, Instant};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn fires_after_delay() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let target = RecordingTarget::new(Outcome::Performed);
        let start = Instant::now();

        DelayScheduler::<&str, &str>::schedule(
            &scheduler,
            "LOCKED",
            "UNLOCK",
            Duration::from_millis(50),
            target.clone(),
        );

        sleep(Duration::from_millis(20)).await;
        assert!(target.calls().is_empty());

        while target.calls().is_empty() && start.elapsed() < Duration::from_secs(2) {
            sleep(Duration::from_millis(5)).await;
        }
        assert!(start.elapsed() >= Duration::from_millis(50));
        assert_eq!(target.calls(), vec![("LOCKED", "UNLOCK")]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_aborts_task() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let target = RecordingTarget::new(Outcome::Performed);

        let handle = DelayScheduler::<&str, &str>::schedule(
            &scheduler,
            "LOCKED",
            "UNLOCK",
            Duration::from_millis(30),
            target.clone(),
        );
        handle.cancel();

        sleep(Duration::from_millis(80)).await;
        assert!(target.calls().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_target_is_contained() {
        let scheduler = TokioScheduler::try_current().unwrap();
        let panicking = RecordingTarget::new(Outcome::Panics);
        let healthy = RecordingTarget::new(Outcome::Performed);

        DelayScheduler::<&str, &str>::schedule(
            &scheduler,
            "S",
            "PANIC",
            Duration::from_millis(5),
            panicking.clone(),
        );
        DelayScheduler::<&str, &str>::schedule(
            &scheduler,
            "S",
            "OK",
            Duration::from_millis(20),
            healthy.clone(),
        );

        sleep(Duration::from_millis(100)).await;
        assert_eq!(panicking.calls().len(), 1);
        assert_eq!(healthy.calls().len(), 1);
    }

    #[test]
    fn try_current_outside_runtime_fails() {
        assert!(TokioScheduler::try_current().is_err());
    }
}
