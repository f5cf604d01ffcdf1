//! Integer-percent progress reporting.
//!
//! Operations accept an optional callback that receives each percentage
//! from 0 to 100 exactly once, in order, with 100 guaranteed at
//! completion. The callback is invoked synchronously and must not
//! retain references beyond its own return.

/// An optional progress callback handed to a toolkit operation.
pub struct Progress<'a> {
    callback: Option<&'a mut dyn FnMut(u8)>,
}

impl<'a> Progress<'a> {
    /// Wraps a callback to be invoked at every percent transition.
    pub fn new(callback: &'a mut dyn FnMut(u8)) -> Self {
        Progress {
            callback: Some(callback),
        }
    }

    /// No progress reporting.
    pub fn none() -> Self {
        Progress { callback: None }
    }

    /// Starts tracking `total` units of work. Reports 0 immediately.
    pub(crate) fn start(&mut self, total: u64) -> Tracker<'_, 'a> {
        let mut tracker = Tracker {
            progress: self,
            total,
            done: 0,
            reported: None,
        };
        tracker.report(0);
        tracker
    }
}

impl Default for Progress<'_> {
    fn default() -> Self {
        Progress::none()
    }
}

pub(crate) struct Tracker<'p, 'a> {
    progress: &'p mut Progress<'a>,
    total: u64,
    done: u64,
    reported: Option<u8>,
}

impl Tracker<'_, '_> {
    /// Records `units` more completed work, reporting every percent
    /// transition crossed.
    pub fn advance(&mut self, units: u64) {
        self.done = self.done.saturating_add(units).min(self.total);
        let percent = if self.total == 0 {
            100
        } else {
            (self.done * 100 / self.total) as u8
        };
        self.report(percent);
    }

    /// Reports 100, whatever the unit count reached.
    pub fn finish(&mut self) {
        self.report(100);
    }

    fn report(&mut self, percent: u8) {
        let from = match self.reported {
            Some(reported) if reported >= percent => return,
            Some(reported) => reported + 1,
            None => 0,
        };
        if let Some(callback) = self.progress.callback.as_mut() {
            for step in from..=percent {
                callback(step);
            }
        }
        self.reported = Some(percent);
    }
}

#[cfg(test)]
mod test {
    use super::Progress;

    #[test]
    fn reports_every_percent_once() {
        let mut seen = Vec::new();
        let mut callback = |percent| seen.push(percent);
        let mut progress = Progress::new(&mut callback);
        let mut tracker = progress.start(1000);
        tracker.advance(333);
        tracker.advance(333);
        tracker.advance(334);
        tracker.finish();
        let expected: Vec<u8> = (0..=100).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn zero_total_reports_completion() {
        let mut seen = Vec::new();
        let mut callback = |percent| seen.push(percent);
        let mut progress = Progress::new(&mut callback);
        let mut tracker = progress.start(0);
        tracker.advance(0);
        tracker.finish();
        assert_eq!(seen.first(), Some(&0));
        assert_eq!(seen.last(), Some(&100));
        assert_eq!(seen.len(), 101);
    }

    #[test]
    fn finish_is_idempotent() {
        let mut count = 0usize;
        let mut callback = |_| count += 1;
        let mut progress = Progress::new(&mut callback);
        let mut tracker = progress.start(10);
        tracker.advance(10);
        tracker.finish();
        tracker.finish();
        assert_eq!(count, 101);
    }
}
