use chrono::NaiveDate;

/// Number of readings uploaded on the current local day.
///
/// Rolls over to `(today, 0)` whenever it is touched on a different date,
/// both when recording and when reporting.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DailyCounter {
    date: Option<NaiveDate>,
    count: u64,
}

impl DailyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `uploaded` readings to today's total.
    pub fn record(&mut self, today: NaiveDate, uploaded: usize) {
        self.roll_over(today);
        self.count += uploaded as u64;
    }

    /// Today's total.
    pub fn current(&mut self, today: NaiveDate) -> u64 {
        self.roll_over(today);
        self.count
    }

    pub fn date(&self) -> Option<NaiveDate> {
        self.date
    }

    fn roll_over(&mut self, today: NaiveDate) {
        if self.date != Some(today) {
            self.date = Some(today);
            self.count = 0;
        }
    }
}
