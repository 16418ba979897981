//! Per-stage timing of the rearrangement code.
//!
//! The first line names the timed stages; every following line holds one
//! space-separated time per stage for a single repetition.

use serde::Serialize;
use shared::stats_scan::StatsSummary;
use shared::StatsScan;

use super::{parse_number, DiagnosticsError};

#[derive(Debug, Clone, Serialize)]
pub struct TimingReport {
    pub names: Vec<String>,
    /// One summary per stage, in header order
    pub stages: Vec<StatsSummary>,
    /// Summary of the per-repetition sum over stages
    pub total: StatsSummary,
}

pub fn code_timing(text: &str) -> Result<TimingReport, DiagnosticsError> {
    let mut lines = text.lines().enumerate().filter(|(_, l)| !l.trim().is_empty());
    let (_, header) = lines.next().ok_or(DiagnosticsError::MissingHeader)?;
    let names: Vec<String> = header.split_whitespace().map(str::to_string).collect();

    let mut columns: Vec<Vec<f64>> = vec![Vec::new(); names.len()];
    let mut totals: Vec<f64> = Vec::new();
    for (index, line) in lines {
        let times = line
            .split_whitespace()
            .map(|t| parse_number(t, index + 1))
            .collect::<Result<Vec<f64>, _>>()?;
        if times.len() != names.len() {
            return Err(DiagnosticsError::ColumnMismatch {
                line: index + 1,
                expected: names.len(),
                found: times.len(),
            });
        }
        totals.push(times.iter().sum());
        for (column, time) in columns.iter_mut().zip(times) {
            column.push(time);
        }
    }
    if totals.is_empty() {
        return Err(DiagnosticsError::NoSamples);
    }

    let stages = columns
        .iter()
        .map(|c| StatsScan::new(c).summary())
        .collect::<Result<Vec<_>, _>>()?;
    let total = StatsScan::new(&totals).summary()?;
    for (name, stage) in names.iter().zip(&stages) {
        log::info!("{name}: mean {:.4} (min {:.4}, max {:.4})", stage.mean, stage.min, stage.max);
    }
    log::info!("total: mean {:.4} over {} repetitions", total.mean, total.count);

    Ok(TimingReport {
        names,
        stages,
        total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_timing_summaries() {
        let text = "parse plan move\n1.0 2.0 3.0\n3.0 2.0 1.0\n";
        let report = code_timing(text).unwrap();

        assert_eq!(report.names, vec!["parse", "plan", "move"]);
        assert_relative_eq!(report.stages[0].mean, 2.0);
        assert_relative_eq!(report.stages[0].std_dev, 1.0);
        assert_relative_eq!(report.stages[1].std_dev, 0.0);
        assert_eq!(report.total.count, 2);
        assert_relative_eq!(report.total.mean, 6.0);
    }

    #[test]
    fn test_ragged_line() {
        let text = "a b\n1 2\n3\n";
        assert!(matches!(
            code_timing(text),
            Err(DiagnosticsError::ColumnMismatch { line: 3, expected: 2, found: 1 })
        ));
    }

    #[test]
    fn test_empty_log() {
        assert!(matches!(code_timing(""), Err(DiagnosticsError::MissingHeader)));
        assert!(matches!(code_timing("a b\n"), Err(DiagnosticsError::NoSamples)));
    }
}
