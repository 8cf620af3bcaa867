use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// Longest deadline a controller arms; longer requests are capped.
pub const MAX_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// A cancellation signal that fires on its own once a deadline passes.
///
/// Dropping the controller stops its timer; signals handed out earlier then
/// never fire.
pub struct TimeoutController {
    token: CancellationToken,
    deadline: Instant,
    timer: JoinHandle<()>,
}

impl TimeoutController {
    /// Arm a new deadline `after` from now, capped at [`MAX_TIMEOUT`]. Must
    /// be called inside a tokio runtime.
    pub fn arm(after: Duration) -> Self {
        let token = CancellationToken::new();
        let deadline = Instant::now() + after.min(MAX_TIMEOUT);
        let timer_token = token.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            timer_token.cancel();
        });

        Self {
            token,
            deadline,
            timer,
        }
    }

    /// A signal for a collaborator (such as a transport) that is cancelled
    /// when the deadline fires.
    pub fn signal(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Resolves when the deadline fires.
    pub fn fired(&self) -> WaitForCancellationFuture<'_> {
        self.token.cancelled()
    }

    pub fn remaining(&self) -> Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

impl Drop for TimeoutController {
    fn drop(&mut self) {
        self.timer.abort();
    }
}
