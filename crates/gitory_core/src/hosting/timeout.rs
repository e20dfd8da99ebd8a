//! Bounded-time execution for hosting calls.
//!
//! The call runs on a dedicated worker thread. On timeout the worker is left
//! to finish in the background; callers must assume the operation may still
//! complete and compensate accordingly.

use super::{HostingError, HostingResult};
use crate::model::repository::RepositoryIdentifier;
use log::warn;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

/// Runs `operation_fn`, failing with `HostingError::Timeout` when it does not
/// report back within `timeout`. `None` runs the call inline without a bound.
pub fn run_with_timeout<T, F>(
    identifier: &RepositoryIdentifier,
    operation: &'static str,
    timeout: Option<Duration>,
    operation_fn: F,
) -> HostingResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> HostingResult<T> + Send + 'static,
{
    let Some(timeout) = timeout else {
        return operation_fn();
    };

    let (sender, receiver) = mpsc::channel();
    thread::Builder::new()
        .name(format!("gitory-hosting-{operation}"))
        .spawn(move || {
            // The receiver is gone once the caller has timed out.
            let _ = sender.send(operation_fn());
        })
        .map_err(|err| HostingError::Worker {
            operation,
            message: format!("failed to spawn worker: {err}"),
        })?;

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => {
            warn!(
                "event=hosting_timeout module=hosting status=error operation={} identifier={} timeout_ms={}",
                operation,
                identifier,
                timeout.as_millis()
            );
            Err(HostingError::Timeout {
                identifier: identifier.clone(),
                operation,
                timeout,
            })
        }
        Err(RecvTimeoutError::Disconnected) => Err(HostingError::Worker {
            operation,
            message: "worker exited without reporting a result".to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::run_with_timeout;
    use crate::hosting::HostingError;
    use crate::model::repository::RepositoryIdentifier;
    use std::time::Duration;

    fn id() -> RepositoryIdentifier {
        RepositoryIdentifier::parse("proj-a").unwrap()
    }

    #[test]
    fn returns_result_when_call_finishes_in_time() {
        let value = run_with_timeout(&id(), "create", Some(Duration::from_secs(5)), || Ok(7))
            .expect("fast call should succeed");
        assert_eq!(value, 7);
    }

    #[test]
    fn runs_inline_without_bound() {
        let value = run_with_timeout(&id(), "create", None, || Ok("inline")).unwrap();
        assert_eq!(value, "inline");
    }

    #[test]
    fn slow_call_times_out() {
        let err = run_with_timeout(&id(), "destroy", Some(Duration::from_millis(20)), || {
            std::thread::sleep(Duration::from_millis(500));
            Ok(())
        })
        .expect_err("slow call must time out");

        assert!(matches!(
            err,
            HostingError::Timeout {
                operation: "destroy",
                ..
            }
        ));
    }

    #[test]
    fn panicking_worker_is_reported() {
        let err = run_with_timeout::<(), _>(&id(), "inspect", Some(Duration::from_secs(5)), || {
            panic!("boom")
        })
        .expect_err("panicking worker must fail");
        assert!(matches!(err, HostingError::Worker { .. }));
    }
}
