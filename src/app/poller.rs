// Polls a service until it reaches the requested activation state or the timeout runs out.

use super::model::{
    DetectionOutcome, ManagedBy, PollProgress, PollRequest, PollResult, ServiceDescriptor,
};
use super::systemd::{CommandRunner, ServiceDetector};
use crate::error::ReadinessError;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(1);

/// Source of time for the poll loop.
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Wall clock backed by `std::time::Instant` and `thread::sleep`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

pub struct ReadinessPoller<R, C = SystemClock> {
    detector: ServiceDetector<R>,
    clock: C,
    interval: Duration,
}

impl<R: CommandRunner> ReadinessPoller<R, SystemClock> {
    pub fn new(detector: ServiceDetector<R>) -> Self {
        Self::with_clock(detector, SystemClock)
    }
}

impl<R: CommandRunner, C: Clock> ReadinessPoller<R, C> {
    pub fn with_clock(detector: ServiceDetector<R>, clock: C) -> Self {
        Self {
            detector,
            clock,
            interval: DEFAULT_INTERVAL,
        }
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn poll(&self, request: &PollRequest) -> Result<PollResult, ReadinessError> {
        self.poll_with(request, |_| {})
    }

    /// Like [`poll`](Self::poll), calling `observe` after every detection.
    ///
    /// Only "not yet in the desired state" is retried. Missing controller, broken unit
    /// and missing service fail immediately whatever time is left.
    pub fn poll_with<F>(&self, request: &PollRequest, mut observe: F) -> Result<PollResult, ReadinessError>
    where
        F: FnMut(&PollProgress<'_>),
    {
        let unit = request.service_name.as_str();
        let start = self.clock.now();
        let deadline = start.checked_add(request.timeout);
        let mut last = ServiceDescriptor::new();
        let mut iteration = 0;

        while deadline.is_none_or(|deadline| self.clock.now() < deadline) {
            iteration += 1;
            let outcome = self.detector.detect(unit)?;

            observe(&PollProgress {
                service_name: unit,
                desired_state: request.desired_state,
                iteration,
                elapsed: self.clock.now().duration_since(start),
                timeout: request.timeout,
                outcome: &outcome,
            });

            let Some(target) = request.desired_state else {
                debug!(unit, "no desired state, returning current status");
                return Ok(self.finish(unit, outcome, start));
            };

            let (descriptor, managed_by) = match outcome {
                DetectionOutcome::NotFound => {
                    return Err(ReadinessError::ServiceMissing {
                        unit: unit.to_string(),
                    });
                }
                DetectionOutcome::Found {
                    descriptor,
                    managed_by,
                } => (descriptor, managed_by),
            };

            if target.is_satisfied_by(&descriptor) {
                let result = self.finish(
                    unit,
                    DetectionOutcome::Found {
                        descriptor,
                        managed_by,
                    },
                    start,
                );
                info!(unit, desired = target.as_str(), elapsed = ?result.elapsed, "service reached desired state");
                return Ok(result);
            }

            debug!(
                unit,
                iteration,
                active_state = descriptor.active_state().unwrap_or("<none>"),
                desired = target.as_str(),
                "not there yet"
            );
            last = descriptor;
            self.clock.sleep(self.interval);
        }

        // Also reached by a zero timeout, which never queried the unit at all.
        let elapsed = self.clock.now().duration_since(start);
        info!(
            unit,
            desired = request.desired_state.map_or("status", |target| target.as_str()),
            ?elapsed,
            "gave up waiting"
        );
        Err(ReadinessError::Timeout {
            unit: unit.to_string(),
            target: request.desired_state,
            elapsed,
            last,
        })
    }

    fn finish(&self, unit: &str, outcome: DetectionOutcome, start: Instant) -> PollResult {
        let elapsed = self.clock.now().duration_since(start);
        match outcome {
            DetectionOutcome::Found {
                descriptor,
                managed_by,
            } => {
                let mut warnings = Vec::new();
                if managed_by == ManagedBy::InitScriptOnly {
                    warn!(
                        unit,
                        "service is only an init script although the host is managed by systemd"
                    );
                    warnings.push(format!(
                        "The service ({unit}) is actually an init script but the system is managed by systemd"
                    ));
                }
                PollResult {
                    found: true,
                    managed_by: Some(managed_by),
                    descriptor,
                    elapsed,
                    warnings,
                }
            }
            DetectionOutcome::NotFound => PollResult {
                found: false,
                managed_by: None,
                descriptor: ServiceDescriptor::new(),
                elapsed,
                warnings: Vec::new(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::model::DesiredState;
    use crate::app::systemd::testing::ScriptedRunner;
    use std::cell::Cell;

    const SHOW: &str = "systemctl show cron";
    const INIT: &str = "test -f /etc/init.d/cron";

    /// Time only moves when the poller sleeps.
    struct VirtualClock {
        origin: Instant,
        offset: Cell<Duration>,
    }

    impl VirtualClock {
        fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Cell::new(Duration::ZERO),
            }
        }
    }

    impl Clock for &VirtualClock {
        fn now(&self) -> Instant {
            self.origin + self.offset.get()
        }

        fn sleep(&self, duration: Duration) {
            self.offset.set(self.offset.get() + duration);
        }
    }

    fn poller<'a>(
        runner: &'a ScriptedRunner,
        clock: &'a VirtualClock,
    ) -> ReadinessPoller<&'a ScriptedRunner, &'a VirtualClock> {
        ReadinessPoller::with_clock(ServiceDetector::new(runner, "systemctl", "/etc/init.d"), clock)
    }

    fn active(state: &str) -> String {
        format!("LoadState=loaded\nActiveState={state}\n")
    }

    #[test]
    fn waits_until_started() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, &active("inactive"), "")
            .on(SHOW, 0, &active("inactive"), "")
            .on(SHOW, 0, &active("active"), "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron")
            .with_desired_state(DesiredState::Started)
            .with_timeout(Duration::from_secs(5));

        let result = poller(&runner, &clock).poll(&request).unwrap();

        assert!(result.found);
        assert!(result.elapsed >= Duration::from_secs(2));
        assert!(result.elapsed < Duration::from_secs(5));
        assert_eq!(result.descriptor.active_state(), Some("active"));
        assert_eq!(runner.count(SHOW), 3);
    }

    #[test]
    fn activating_counts_as_started() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, &active("activating"), "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron").with_desired_state(DesiredState::Started);

        let result = poller(&runner, &clock).poll(&request).unwrap();
        assert_eq!(result.elapsed, Duration::ZERO);
    }

    #[test]
    fn times_out_when_never_stopped() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, &active("active"), "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron")
            .with_desired_state(DesiredState::Stopped)
            .with_timeout(Duration::from_secs(1));

        let err = poller(&runner, &clock).poll(&request).unwrap_err();
        match err {
            ReadinessError::Timeout { elapsed, last, .. } => {
                assert!(elapsed >= Duration::from_secs(1));
                assert_eq!(last.active_state(), Some("active"));
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
    }

    #[test]
    fn missing_service_fails_without_waiting() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, "LoadState=not-found\n", "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron")
            .with_desired_state(DesiredState::Started)
            .with_timeout(Duration::from_secs(300));

        let err = poller(&runner, &clock).poll(&request).unwrap_err();
        assert!(matches!(err, ReadinessError::ServiceMissing { .. }));
        assert_eq!(clock.offset.get(), Duration::ZERO);
        assert_eq!(runner.count(SHOW), 1);
    }

    #[test]
    fn load_error_is_not_retried() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, "LoadState=bad-setting\nLoadError=bad\n", "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron").with_desired_state(DesiredState::Started);

        let err = poller(&runner, &clock).poll(&request).unwrap_err();
        assert!(matches!(err, ReadinessError::LoadError { .. }));
        assert_eq!(runner.count(SHOW), 1);
    }

    #[test]
    fn status_only_returns_after_first_detection() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, &active("inactive"), "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();

        let result = poller(&runner, &clock).poll(&PollRequest::new("cron")).unwrap();
        assert!(result.found);
        assert_eq!(result.managed_by, Some(ManagedBy::SystemdManaged));
        assert_eq!(result.descriptor.active_state(), Some("inactive"));
        assert_eq!(clock.offset.get(), Duration::ZERO);
    }

    #[test]
    fn status_only_reports_missing_service_as_not_found() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, "LoadState=not-found\n", "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();

        let result = poller(&runner, &clock).poll(&PollRequest::new("cron")).unwrap();
        assert!(!result.found);
        assert!(result.descriptor.is_empty());
    }

    #[test]
    fn zero_timeout_without_target_times_out_unqueried() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, &active("active"), "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron").with_timeout(Duration::ZERO);

        let err = poller(&runner, &clock).poll(&request).unwrap_err();
        match err {
            ReadinessError::Timeout {
                target,
                elapsed,
                last,
                ..
            } => {
                assert_eq!(target, None);
                assert_eq!(elapsed, Duration::ZERO);
                assert!(last.is_empty());
            }
            other => panic!("expected Timeout, got {other:?}"),
        }
        assert_eq!(runner.count(SHOW), 0);
    }

    #[test]
    fn zero_timeout_with_target_times_out() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, &active("active"), "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron")
            .with_desired_state(DesiredState::Started)
            .with_timeout(Duration::ZERO);

        let err = poller(&runner, &clock).poll(&request).unwrap_err();
        assert!(matches!(
            err,
            ReadinessError::Timeout {
                target: Some(DesiredState::Started),
                ..
            }
        ));
        assert_eq!(runner.count(SHOW), 0);
    }

    #[test]
    fn init_script_only_adds_warning() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, "LoadState=not-found\n", "")
            .on(INIT, 0, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron").with_desired_state(DesiredState::Stopped);

        let result = poller(&runner, &clock).poll(&request).unwrap();
        assert_eq!(result.managed_by, Some(ManagedBy::InitScriptOnly));
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("init script"));
    }

    #[test]
    fn init_script_advisory_is_reported_once_per_poll() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, "LoadState=not-found\n", "")
            .on(SHOW, 0, "LoadState=not-found\n", "")
            .on(SHOW, 0, "LoadState=not-found\nActiveState=active\n", "")
            .on(INIT, 0, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron").with_desired_state(DesiredState::Started);

        let result = poller(&runner, &clock).poll(&request).unwrap();
        assert_eq!(runner.count(SHOW), 3);
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn observer_sees_every_iteration() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, &active("active"), "")
            .on(SHOW, 0, &active("active"), "")
            .on(SHOW, 0, &active("deactivating"), "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron").with_desired_state(DesiredState::Stopped);

        let mut seen = Vec::new();
        poller(&runner, &clock)
            .poll_with(&request, |progress| {
                seen.push((progress.iteration, progress.elapsed.as_secs()));
            })
            .unwrap();
        assert_eq!(seen, vec![(1, 0), (2, 1), (3, 2)]);
    }

    #[test]
    fn custom_interval_is_used() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, &active("inactive"), "")
            .on(SHOW, 0, &active("active"), "")
            .on(INIT, 1, "", "");
        let clock = VirtualClock::new();
        let request = PollRequest::new("cron").with_desired_state(DesiredState::Started);

        let result = poller(&runner, &clock)
            .interval(Duration::from_secs(5))
            .poll(&request)
            .unwrap();
        assert_eq!(result.elapsed, Duration::from_secs(5));
    }

    #[test]
    fn wall_clock_timeout() {
        let runner = ScriptedRunner::new()
            .on(SHOW, 0, &active("active"), "")
            .on(INIT, 1, "", "");
        let poller = ReadinessPoller::new(ServiceDetector::new(&runner, "systemctl", "/etc/init.d"))
            .interval(Duration::from_millis(10));
        let request = PollRequest::new("cron")
            .with_desired_state(DesiredState::Stopped)
            .with_timeout(Duration::from_millis(50));

        let err = poller.poll(&request).unwrap_err();
        match err {
            ReadinessError::Timeout { elapsed, .. } => assert!(elapsed >= Duration::from_millis(50)),
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
