//! Per-option vote counts.

use serde::Serialize;

/// Aggregate vote counts for one poll at a point in time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Tally {
    pub option1_count: i64,
    pub option2_count: i64,
    pub option3_count: i64,
    pub option4_count: i64,
    pub total_votes: i64,
}

impl Tally {
    /// Build a tally from `(option, count)` rows of a grouped query.
    ///
    /// Options missing from the rows count as zero.
    #[must_use]
    pub fn from_rows<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = (i32, i64)>,
    {
        let mut tally = Self::default();
        for (option, count) in rows {
            if let Some(slot) = tally.slot_mut(option) {
                *slot += count;
                tally.total_votes += count;
            } else {
                tracing::warn!(option, count, "Ignoring votes for unknown option");
            }
        }
        tally
    }

    /// Count one more vote for `option`. Returns `false` for an unknown option.
    pub fn record(&mut self, option: i32) -> bool {
        match self.slot_mut(option) {
            Some(slot) => {
                *slot += 1;
                self.total_votes += 1;
                true
            }
            None => false,
        }
    }

    /// Votes for a 1-based option.
    #[must_use]
    pub const fn count(&self, option: i32) -> Option<i64> {
        match option {
            1 => Some(self.option1_count),
            2 => Some(self.option2_count),
            3 => Some(self.option3_count),
            4 => Some(self.option4_count),
            _ => None,
        }
    }

    fn slot_mut(&mut self, option: i32) -> Option<&mut i64> {
        match option {
            1 => Some(&mut self.option1_count),
            2 => Some(&mut self.option2_count),
            3 => Some(&mut self.option3_count),
            4 => Some(&mut self.option4_count),
            _ => None,
        }
    }
}
