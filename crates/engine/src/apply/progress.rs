//! Per-package and overall progress for one Apply

use super::RunEvents;
use crate::installer::ProgressSink;
use crate::observer::Observer;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use strap_events::{AppEvent, ApplyEvent, EventEmitter};

/// Overall completion after `index` packages finished and the current one
/// reached `package_percent`
#[must_use]
pub fn overall_percent(index: usize, total: usize, package_percent: u8) -> u8 {
    if total == 0 {
        return 100;
    }
    let done = index.min(total) * 100 + usize::from(package_percent.min(100));
    u8::try_from((done / total).min(100)).unwrap_or(100)
}

/// Progress sink for one package action
///
/// Both percentages only move forward: a report lower than an earlier one
/// is raised to it, and `overall` is shared across the whole run.
pub struct ProgressTracker<'a> {
    observer: &'a dyn Observer,
    events: &'a RunEvents,
    package_id: &'a str,
    index: usize,
    total: usize,
    package: AtomicU8,
    overall: &'a AtomicU8,
    cancelled: AtomicBool,
}

impl<'a> ProgressTracker<'a> {
    #[must_use]
    pub fn new(
        observer: &'a dyn Observer,
        events: &'a RunEvents,
        package_id: &'a str,
        position: (usize, usize),
        overall: &'a AtomicU8,
    ) -> Self {
        Self {
            observer,
            events,
            package_id,
            index: position.0,
            total: position.1,
            package: AtomicU8::new(0),
            overall,
            cancelled: AtomicBool::new(false),
        }
    }

    /// The host answered a progress report with Cancel
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Sink reporting into `[start, start + width]` of this package's range
    #[must_use]
    pub fn segment(&self, start: u8, width: u8) -> Segment<'_, 'a> {
        Segment {
            tracker: self,
            start,
            width,
        }
    }

    fn update(&self, percent: u8) -> bool {
        let percent = percent.min(100);
        let package = self.package.fetch_max(percent, Ordering::SeqCst).max(percent);
        let overall = overall_percent(self.index, self.total, package);
        let overall = self.overall.fetch_max(overall, Ordering::SeqCst).max(overall);

        self.events.emit(AppEvent::Apply(ApplyEvent::Progress {
            package_id: self.package_id.to_string(),
            package_percent: package,
            overall_percent: overall,
        }));
        if self
            .observer
            .on_execute_progress(self.package_id, package, overall)
            .is_cancel()
        {
            self.cancelled.store(true, Ordering::SeqCst);
        }
        !self.cancelled()
    }
}

impl ProgressSink for ProgressTracker<'_> {
    fn report(&self, percent: u8) -> bool {
        self.update(percent)
    }
}

/// Maps an installer's 0..=100 onto part of a package's range
pub struct Segment<'t, 'a> {
    tracker: &'t ProgressTracker<'a>,
    start: u8,
    width: u8,
}

impl ProgressSink for Segment<'_, '_> {
    fn report(&self, percent: u8) -> bool {
        let scaled = u16::from(percent.min(100)) * u16::from(self.width) / 100;
        let scaled = u8::try_from(scaled).unwrap_or(100);
        self.tracker.update(self.start.saturating_add(scaled))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observer::NoopObserver;

    #[test]
    fn overall_is_bounded() {
        assert_eq!(overall_percent(0, 4, 0), 0);
        assert_eq!(overall_percent(1, 4, 50), 37);
        assert_eq!(overall_percent(3, 4, 100), 100);
        assert_eq!(overall_percent(9, 4, 100), 100);
        assert_eq!(overall_percent(0, 0, 0), 100);
    }

    #[test]
    fn reports_never_go_backwards() {
        let events = RunEvents::default();
        let overall = AtomicU8::new(0);
        let tracker = ProgressTracker::new(&NoopObserver, &events, "a", (0, 2), &overall);

        assert!(tracker.report(60));
        assert!(tracker.report(20));
        assert_eq!(tracker.package.load(Ordering::SeqCst), 60);
        assert_eq!(overall.load(Ordering::SeqCst), 30);

        let second = ProgressTracker::new(&NoopObserver, &events, "b", (1, 2), &overall);
        second.segment(50, 50).report(200);
        assert_eq!(second.package.load(Ordering::SeqCst), 100);
        assert_eq!(overall.load(Ordering::SeqCst), 100);
    }
}
