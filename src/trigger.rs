use std::future::Future;
use std::time::{Duration, Instant};

/// Fires once input has stopped changing for `quiet`.
///
/// Callers feed every observed value through [`Debouncer::observe`] and ask
/// [`Debouncer::poll`] whether a run should start. A value fires at most once.
#[derive(Debug)]
pub struct Debouncer<T> {
    quiet: Duration,
    last_seen: Option<T>,
    changed_at: Option<Instant>,
    pending: bool,
}

impl<T: Clone + PartialEq> Debouncer<T> {
    pub fn new(quiet: Duration) -> Self {
        Self {
            quiet,
            last_seen: None,
            changed_at: None,
            pending: false,
        }
    }

    /// Records the current input. Unchanged input does not restart the quiet period.
    pub fn observe(&mut self, value: T, now: Instant) {
        if self.last_seen.as_ref() == Some(&value) {
            return;
        }
        self.last_seen = Some(value);
        self.changed_at = Some(now);
        self.pending = true;
    }

    /// Returns the value to run with once it has settled and `gate_open` holds.
    pub fn poll(&mut self, now: Instant, gate_open: bool) -> Option<T> {
        if !self.pending || !gate_open {
            return None;
        }
        let changed_at = self.changed_at?;
        if now.duration_since(changed_at) < self.quiet {
            return None;
        }
        self.pending = false;
        self.last_seen.clone()
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }
}

/// Runs `work` unless `interrupt` completes first, in which case `work` is
/// dropped and `None` is returned.
pub async fn until_interrupted<F, I>(work: F, interrupt: I) -> Option<F::Output>
where
    F: Future,
    I: Future,
{
    tokio::select! {
        biased;
        _ = interrupt => None,
        output = work => Some(output),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUIET: Duration = Duration::from_millis(2000);

    #[test]
    fn fires_after_quiet_period() {
        let start = Instant::now();
        let mut d = Debouncer::new(QUIET);
        d.observe("draft".to_string(), start);

        assert_eq!(d.poll(start + Duration::from_millis(1999), true), None);
        assert_eq!(
            d.poll(start + QUIET, true),
            Some("draft".to_string())
        );
        assert_eq!(d.poll(start + QUIET * 2, true), None);
    }

    #[test]
    fn edits_restart_the_quiet_period() {
        let start = Instant::now();
        let mut d = Debouncer::new(QUIET);
        d.observe("a".to_string(), start);
        d.observe("ab".to_string(), start + Duration::from_millis(1500));

        assert_eq!(d.poll(start + QUIET, true), None);
        assert_eq!(
            d.poll(start + Duration::from_millis(3500), true),
            Some("ab".to_string())
        );
    }

    #[test]
    fn same_value_does_not_retrigger() {
        let start = Instant::now();
        let mut d = Debouncer::new(QUIET);
        d.observe(1, start);
        assert_eq!(d.poll(start + QUIET, true), Some(1));

        d.observe(1, start + QUIET * 2);
        assert!(!d.is_pending());
        assert_eq!(d.poll(start + QUIET * 3, true), None);
    }

    #[test]
    fn closed_gate_holds_the_value() {
        let start = Instant::now();
        let mut d = Debouncer::new(QUIET);
        d.observe(7, start);

        assert_eq!(d.poll(start + QUIET, false), None);
        assert!(d.is_pending());
        assert_eq!(d.poll(start + QUIET * 2, true), Some(7));
    }

    #[tokio::test(start_paused = true)]
    async fn interrupt_stops_long_running_work() {
        let dropped = std::sync::atomic::AtomicBool::new(false);
        struct Flag<'a>(&'a std::sync::atomic::AtomicBool);
        impl Drop for Flag<'_> {
            fn drop(&mut self) {
                self.0.store(true, std::sync::atomic::Ordering::SeqCst);
            }
        }

        let work = async {
            let _flag = Flag(&dropped);
            tokio::time::sleep(Duration::from_secs(3600)).await;
            "rendered"
        };
        let interrupt = tokio::time::sleep(Duration::from_millis(10));

        assert_eq!(until_interrupted(work, interrupt).await, None);
        assert!(dropped.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn work_finishing_first_is_returned() {
        let work = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "rendered"
        };
        let interrupt = std::future::pending::<()>();
        assert_eq!(until_interrupted(work, interrupt).await, Some("rendered"));
    }
}
