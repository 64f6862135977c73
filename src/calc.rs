use serde::Serialize;

/// Subjects taught across the school. Grade records are keyed by these names;
/// the grid and report card iterate them in this order.
pub const SUBJECTS: [&str; 14] = [
    "Língua Portuguesa",
    "Matemática",
    "Ciências",
    "História",
    "Geografia",
    "Arte",
    "Educação Física",
    "Inglês",
    "Ensino Religioso",
    "Física",
    "Química",
    "Biologia",
    "Filosofia",
    "Sociologia",
];

/// Advisory fallback when a class has no capacity on record.
pub const DEFAULT_CAPACITY: i64 = 30;

/// Passing threshold for the annual mean.
pub const PASSING_MEAN: f64 = 6.0;

/// Half-up rounding to one decimal: `Int(10*x + 0.5) / 10`.
pub fn round1(x: f64) -> f64 {
    ((10.0 * x) + 0.5).floor() / 10.0
}

/// Annual mean over the four bimestral scores. Defined only when every
/// bimester has been entered; a missing score means "not yet entered",
/// never zero.
pub fn annual_mean(scores: [Option<f64>; 4]) -> Option<f64> {
    let mut sum = 0.0;
    for s in scores {
        sum += s?;
    }
    Some(round1(sum / 4.0))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Situation {
    Approved,
    Reproved,
    InProgress,
}

impl Situation {
    pub fn as_str(self) -> &'static str {
        match self {
            Situation::Approved => "Approved",
            Situation::Reproved => "Reproved",
            Situation::InProgress => "In progress",
        }
    }
}

/// Pass/fail classification derived from the annual mean.
pub fn situation(mean: Option<f64>) -> Situation {
    match mean {
        None => Situation::InProgress,
        Some(m) if m >= PASSING_MEAN => Situation::Approved,
        Some(_) => Situation::Reproved,
    }
}

/// Report-card overall mean: average of the subject means that are defined.
/// `None` when no subject has a complete set of bimestral scores yet.
pub fn overall_mean(subject_means: &[Option<f64>]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for m in subject_means.iter().flatten() {
        sum += m;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(round1(sum / count as f64))
    }
}

/// Occupancy percentage for a class. A class with no capacity on record
/// falls back to [`DEFAULT_CAPACITY`]; an explicit capacity of zero (or a
/// negative one) leaves occupancy undefined rather than dividing by it.
pub fn occupancy(enrolled: i64, capacity: Option<i64>) -> Option<f64> {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY);
    if cap <= 0 {
        return None;
    }
    Some(100.0 * enrolled as f64 / cap as f64)
}

/// Effective capacity used by the capacity/enrollment tabulators, mirroring
/// the fallback in [`occupancy`]. Zero stays zero so the report can flag it.
pub fn effective_capacity(capacity: Option<i64>) -> i64 {
    capacity.unwrap_or(DEFAULT_CAPACITY)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceTally {
    pub present: i64,
    pub absent: i64,
    pub justified: i64,
}

impl AttendanceTally {
    pub fn recorded(self) -> i64 {
        self.present + self.absent + self.justified
    }
}

/// Attendance percentage over the recorded days. Justified absences count as
/// attended. Undefined when nothing was recorded for the period.
pub fn attendance_percent(tally: AttendanceTally) -> Option<f64> {
    let total = tally.recorded();
    if total == 0 {
        return None;
    }
    Some(100.0 * (tally.present + tally.justified) as f64 / total as f64)
}

/// Mean of the scores actually entered for one bimester column.
/// Used by the performance report; empty columns stay undefined.
pub fn bimester_mean(scores: &[Option<f64>]) -> Option<f64> {
    let mut sum = 0.0;
    let mut count = 0usize;
    for s in scores.iter().flatten() {
        sum += s;
        count += 1;
    }
    if count == 0 {
        None
    } else {
        Some(round1(sum / count as f64))
    }
}

/// "7.5" when defined, "-" otherwise. Shared by grids and tabulators.
pub fn fmt_mean(mean: Option<f64>) -> String {
    match mean {
        Some(m) => format!("{:.1}", m),
        None => "-".to_string(),
    }
}

/// "83%" when defined, "-" otherwise.
pub fn fmt_percent(p: Option<f64>) -> String {
    match p {
        Some(v) => format!("{:.0}%", v),
        None => "-".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round1_half_up() {
        assert_eq!(round1(0.0), 0.0);
        assert_eq!(round1(7.45), 7.5);
        assert_eq!(round1(7.44), 7.4);
        assert_eq!(round1(5.96), 6.0);
    }

    #[test]
    fn annual_mean_requires_all_four() {
        assert_eq!(
            annual_mean([Some(7.0), Some(8.0), Some(6.0), Some(9.0)]),
            Some(7.5)
        );
        assert_eq!(annual_mean([Some(5.0), None, Some(8.0), Some(6.0)]), None);
        assert_eq!(annual_mean([None, None, None, None]), None);
    }

    #[test]
    fn situation_thresholds() {
        assert_eq!(situation(Some(7.5)), Situation::Approved);
        assert_eq!(situation(Some(6.0)), Situation::Approved);
        assert_eq!(situation(Some(5.9)), Situation::Reproved);
        assert_eq!(situation(None), Situation::InProgress);
        assert_eq!(situation(None).as_str(), "In progress");
    }

    #[test]
    fn overall_mean_skips_undefined_subjects() {
        assert_eq!(overall_mean(&[Some(7.0), None, Some(8.0)]), Some(7.5));
        assert_eq!(overall_mean(&[None, None]), None);
        assert_eq!(overall_mean(&[]), None);
    }

    #[test]
    fn occupancy_capacity_fallback_and_zero() {
        assert_eq!(occupancy(15, Some(30)), Some(50.0));
        // NULL capacity falls back to the advisory default of 30.
        assert_eq!(occupancy(15, None), Some(50.0));
        // Explicit zero capacity leaves occupancy undefined.
        assert_eq!(occupancy(15, Some(0)), None);
        assert_eq!(occupancy(15, Some(-1)), None);
        assert_eq!(fmt_percent(occupancy(15, Some(0))), "-");
    }

    #[test]
    fn attendance_percent_counts_justified_as_attended() {
        let t = AttendanceTally {
            present: 18,
            absent: 2,
            justified: 0,
        };
        assert_eq!(attendance_percent(t), Some(90.0));

        let t = AttendanceTally {
            present: 15,
            absent: 1,
            justified: 4,
        };
        assert_eq!(attendance_percent(t), Some(95.0));

        assert_eq!(attendance_percent(AttendanceTally::default()), None);
    }

    #[test]
    fn bimester_mean_ignores_missing_entries() {
        assert_eq!(bimester_mean(&[Some(6.0), None, Some(8.0)]), Some(7.0));
        assert_eq!(bimester_mean(&[None, None]), None);
    }
}
