use crate::item::Outcome;
use derive_more::Display;

/// Aggregate counters for one batch.
///
/// `attempted == success + failed` and `found == attempted + skipped` hold
/// for every report the runner hands out, cancelled batches included.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Display)]
#[display("found {found}, attempted {attempted}, converted {success}, failed {failed}, skipped {skipped}")]
pub struct BatchReport {
    pub found: usize,
    pub attempted: usize,
    pub success: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Items that were never started because the batch was cancelled are
    /// counted in `skipped`.
    pub cancelled: bool,
}

/// How a finished batch should be summarised to a person.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Summary {
    /// The source held no matching files.
    NothingFound,
    /// Everything found was already in the destination.
    AllConverted,
    Converted { success: usize, failed: usize },
}

impl BatchReport {
    pub(crate) fn planned(found: usize, skipped: usize) -> Self {
        Self { found, skipped, ..Self::default() }
    }

    pub(crate) fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Committed { .. } => {
                self.attempted += 1;
                self.success += 1;
            },
            Outcome::Failed(_) => {
                self.attempted += 1;
                self.failed += 1;
            },
            Outcome::Skipped => self.skipped += 1,
        }
    }

    pub(crate) fn cancel(&mut self, remaining: usize) {
        self.cancelled = true;
        self.skipped += remaining;
    }

    pub fn summary(&self) -> Summary {
        match (self.found, self.attempted) {
            (0, _) => Summary::NothingFound,
            (_, 0) if !self.cancelled => Summary::AllConverted,
            _ => Summary::Converted { success: self.success, failed: self.failed },
        }
    }

    pub fn is_consistent(&self) -> bool {
        self.attempted == self.success + self.failed && self.found == self.attempted + self.skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ErrorKind;
    use rstest::rstest;

    #[test]
    fn test_record() {
        let mut report = BatchReport::planned(4, 1);
        report.record(&Outcome::Committed { name: "a.mp3".into() });
        report.record(&Outcome::Failed(ErrorKind::Decode(1)));
        report.cancel(1);
        assert!(report.is_consistent());
        assert_eq!((report.attempted, report.success, report.failed, report.skipped), (2, 1, 1, 2));
        assert!(report.cancelled);
    }

    #[rstest]
    #[case(BatchReport::default(), Summary::NothingFound)]
    #[case(BatchReport::planned(3, 3), Summary::AllConverted)]
    #[case(BatchReport { cancelled: true, ..BatchReport::planned(3, 3) }, Summary::Converted { success: 0, failed: 0 })]
    #[case(BatchReport { attempted: 2, success: 1, failed: 1, ..BatchReport::planned(2, 0) }, Summary::Converted { success: 1, failed: 1 })]
    fn test_summary(#[case] report: BatchReport, #[case] expected: Summary) {
        assert_eq!(report.summary(), expected);
    }

    #[test]
    fn test_display() {
        let report = BatchReport { attempted: 2, success: 2, ..BatchReport::planned(3, 1) };
        assert_eq!(report.to_string(), "found 3, attempted 2, converted 2, failed 0, skipped 1");
    }
}
