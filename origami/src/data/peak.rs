use std::fmt;
use std::fmt::{Display, Formatter};

use serde::{Deserialize, Serialize};

/// A detected peak.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    /// Index of the apex in the source arrays
    pub index: usize,
    pub x: f64,
    pub y: f64,
    /// Charge state, `None` when not inferred or undetermined
    pub charge: Option<u32>,
    /// Position and intensity of the most intense isotope in the envelope
    pub isotopic_apex: Option<(f64, f64)>,
}

impl Peak {
    pub fn new(index: usize, x: f64, y: f64) -> Self {
        Peak { index, x, y, charge: None, isotopic_apex: None }
    }
}

impl Display for Peak {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.charge {
            Some(z) => write!(f, "{:.2}, {:.2} z={}", self.x, self.y, z),
            None => write!(f, "{:.2}, {:.2}", self.x, self.y),
        }
    }
}

/// Peaks in the order they were encountered while scanning x ascending.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakList {
    pub peaks: Vec<Peak>,
}

impl PeakList {
    pub fn new(peaks: Vec<Peak>) -> Self {
        PeakList { peaks }
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Peak> {
        self.peaks.iter()
    }

    pub fn x_values(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.x).collect()
    }

    pub fn y_values(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.y).collect()
    }

    /// The most intense peak.
    pub fn apex(&self) -> Option<&Peak> {
        self.peaks.iter().max_by(|a, b| a.y.partial_cmp(&b.y).unwrap_or(std::cmp::Ordering::Equal))
    }
}

impl IntoIterator for PeakList {
    type Item = Peak;
    type IntoIter = std::vec::IntoIter<Peak>;

    fn into_iter(self) -> Self::IntoIter {
        self.peaks.into_iter()
    }
}

/// A contiguous run of a chromatogram above threshold.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PeakRegion {
    pub start_index: usize,
    pub end_index: usize,
    pub x_start: f64,
    pub x_end: f64,
    pub apex: Peak,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apex_and_display() {
        let mut p2 = Peak::new(5, 200.0, 30.0);
        p2.charge = Some(2);
        let list = PeakList::new(vec![Peak::new(1, 100.0, 10.0), p2]);
        assert_eq!(list.apex().map(|p| p.index), Some(5));
        assert_eq!(list.peaks[1].to_string(), "200.00, 30.00 z=2");
        assert_eq!(list.x_values(), vec![100.0, 200.0]);
    }
}
