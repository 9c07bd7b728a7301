use chrono::{Days, NaiveDate};

/// Holds the upload-date watermark between sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RunStateTracker {
    last_run: NaiveDate,
}

impl RunStateTracker {
    pub(crate) fn new(last_run: NaiveDate) -> Self {
        Self { last_run }
    }

    /// Posts uploaded after this date are new.
    pub(crate) fn last_run(&self) -> NaiveDate {
        self.last_run
    }

    /// Moves the watermark to the day before `now` and returns it.
    ///
    /// The day of slack covers uploads that reach the search index late.
    pub(crate) fn advance(&mut self, now: NaiveDate) -> NaiveDate {
        self.last_run = now.checked_sub_days(Days::new(1)).unwrap_or(now);
        self.last_run
    }
}
