//! Per-epoch training history and the validation confusion matrix, both
//! persisted as CSV next to the checkpoint.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// One row of the training history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub epoch: usize,
    pub train_loss: f32,
    pub train_accuracy: f32,
    pub val_loss: f32,
    pub val_accuracy: f32,
}

/// Epoch records in order, one per completed epoch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrainingHistory {
    records: Vec<EpochRecord>,
}

impl TrainingHistory {
    pub const COLUMNS: [&'static str; 5] = [
        "epoch",
        "train_loss",
        "train_accuracy",
        "val_loss",
        "val_accuracy",
    ];

    pub fn push(&mut self, record: EpochRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[EpochRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Writes the history as CSV. The header row is written even when no
    /// epochs ran, so downstream plotting always finds the columns.
    pub fn save_csv(&self, path: &Path) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "{}", Self::COLUMNS.join(","))?;
        for r in &self.records {
            writeln!(
                out,
                "{},{},{},{},{}",
                r.epoch, r.train_loss, r.train_accuracy, r.val_loss, r.val_accuracy
            )?;
        }
        out.flush()
    }
}

/// 2x2 confusion matrix over the validation set. Rows are true classes,
/// columns are predictions, both in the codec's class order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub classes: [String; 2],
    pub counts: [[u64; 2]; 2],
}

impl ConfusionMatrix {
    pub fn new(classes: [String; 2]) -> Self {
        Self {
            classes,
            counts: [[0; 2]; 2],
        }
    }

    pub fn record(&mut self, true_class: usize, predicted_class: usize) {
        self.counts[true_class][predicted_class] += 1;
    }

    /// Per-true-class totals; each equals that class's validation count.
    pub fn row_sums(&self) -> [u64; 2] {
        [
            self.counts[0][0] + self.counts[0][1],
            self.counts[1][0] + self.counts[1][1],
        ]
    }

    pub fn total(&self) -> u64 {
        self.row_sums().iter().sum()
    }

    pub fn accuracy(&self) -> f32 {
        let total = self.total();
        if total == 0 {
            return 0.0;
        }
        (self.counts[0][0] + self.counts[1][1]) as f32 / total as f32
    }

    /// Writes the matrix as CSV with labeled rows and columns.
    pub fn save_csv(&self, path: &Path) -> std::io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(
            out,
            "true\\pred,{},{}",
            self.classes[0], self.classes[1]
        )?;
        for (i, row) in self.counts.iter().enumerate() {
            writeln!(out, "{},{},{}", self.classes[i], row[0], row[1])?;
        }
        out.flush()
    }
}

impl std::fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self
            .classes
            .iter()
            .map(|c| c.len())
            .max()
            .unwrap_or(0)
            .max(5);
        writeln!(
            f,
            "{:>width$} {:>width$} {:>width$}",
            "", self.classes[0], self.classes[1]
        )?;
        for (i, row) in self.counts.iter().enumerate() {
            writeln!(
                f,
                "{:>width$} {:>width$} {:>width$}",
                self.classes[i], row[0], row[1]
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_history_still_writes_the_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        TrainingHistory::default().save_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.trim(), TrainingHistory::COLUMNS.join(","));
    }

    #[test]
    fn history_rows_follow_the_header() {
        let mut history = TrainingHistory::default();
        history.push(EpochRecord {
            epoch: 0,
            train_loss: 0.7,
            train_accuracy: 0.5,
            val_loss: 0.69,
            val_accuracy: 0.5,
        });
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.csv");
        history.save_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("0,0.7,0.5,"));
    }

    #[test]
    fn row_sums_track_recorded_truths() {
        let mut cm = ConfusionMatrix::new(["dunk".to_string(), "jumpshot".to_string()]);
        cm.record(0, 0);
        cm.record(0, 1);
        cm.record(1, 1);
        cm.record(1, 1);
        cm.record(1, 0);
        assert_eq!(cm.row_sums(), [2, 3]);
        assert_eq!(cm.total(), 5);
        assert!((cm.accuracy() - 3.0 / 5.0).abs() < 1e-6);
    }

    #[test]
    fn matrix_csv_is_labeled() {
        let mut cm = ConfusionMatrix::new(["dunk".to_string(), "jumpshot".to_string()]);
        cm.record(0, 0);
        cm.record(1, 0);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conmat.csv");
        cm.save_csv(&path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "true\\pred,dunk,jumpshot");
        assert_eq!(lines[1], "dunk,1,0");
        assert_eq!(lines[2], "jumpshot,1,0");
    }
}
