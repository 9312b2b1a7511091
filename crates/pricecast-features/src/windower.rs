//! Sliding windows over time-ordered feature rows.

use crate::error::{FeatureError, FeatureResult};

/// One supervised sample: `length` consecutive rows and the label of the row
/// that follows them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Window<'a> {
    /// Rows `i - L .. i`.
    pub features: &'a [Vec<f64>],
    /// Label at row `i`.
    pub target: f64,
}

/// Cuts fixed-length windows out of a feature matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceWindower {
    length: usize,
}

impl SequenceWindower {
    /// Creates a windower for windows of `length` rows.
    pub fn new(length: usize) -> FeatureResult<Self> {
        if length == 0 {
            return Err(FeatureError::invalid_config(
                "sequence length must be at least 1",
            ));
        }
        Ok(Self { length })
    }

    /// Window length.
    pub fn length(&self) -> usize {
        self.length
    }

    fn check(&self, x: &[Vec<f64>], y: &[f64]) -> FeatureResult<()> {
        if x.len() != y.len() {
            return Err(FeatureError::invalid_input(format!(
                "{} feature rows but {} targets",
                x.len(),
                y.len()
            )));
        }
        if x.len() <= self.length {
            return Err(FeatureError::DataInsufficient {
                required: self.length + 1,
                available: x.len(),
            });
        }
        Ok(())
    }

    /// All `T - L` windows in order; window `k` pairs `x[k..k + L]` with `y[k + L]`.
    pub fn windows<'a>(&self, x: &'a [Vec<f64>], y: &[f64]) -> FeatureResult<Vec<Window<'a>>> {
        self.check(x, y)?;
        Ok((self.length..x.len())
            .map(|i| Window {
                features: &x[i - self.length..i],
                target: y[i],
            })
            .collect())
    }

    /// Like [`windows`](Self::windows) but skips any window whose rows (or
    /// whose label row) are not consecutive in `positions`.
    ///
    /// `positions` holds each row's index in the original bar series, so a
    /// jump greater than one marks rows removed during filtering.
    pub fn windows_contiguous<'a>(
        &self,
        x: &'a [Vec<f64>],
        y: &[f64],
        positions: &[usize],
    ) -> FeatureResult<Vec<Window<'a>>> {
        self.check(x, y)?;
        if positions.len() != x.len() {
            return Err(FeatureError::invalid_input(format!(
                "{} positions for {} rows",
                positions.len(),
                x.len()
            )));
        }
        let windows: Vec<Window<'a>> = self
            .window_ends(positions)
            .into_iter()
            .map(|i| Window {
                features: &x[i - self.length..i],
                target: y[i],
            })
            .collect();
        if windows.is_empty() {
            return Err(FeatureError::DataInsufficient {
                required: self.length + 1,
                available: 0,
            });
        }
        Ok(windows)
    }

    /// Row indices `i` whose window `i - L .. i` and label row `i` span no gap,
    /// in order. Window `k` of [`windows_contiguous`](Self::windows_contiguous)
    /// ends at the `k`-th index returned here.
    pub fn window_ends(&self, positions: &[usize]) -> Vec<usize> {
        (self.length..positions.len())
            .filter(|&i| positions[i] - positions[i - self.length] == self.length)
            .collect()
    }

    /// The most recent `L` rows, for inference.
    pub fn last_window<'a>(&self, x: &'a [Vec<f64>]) -> FeatureResult<&'a [Vec<f64>]> {
        if x.len() < self.length {
            return Err(FeatureError::DataInsufficient {
                required: self.length,
                available: x.len(),
            });
        }
        Ok(&x[x.len() - self.length..])
    }

    /// [`last_window`](Self::last_window) that also requires the rows to be
    /// consecutive in `positions`.
    ///
    /// # Errors
    ///
    /// `WindowGap` when a row inside the window was removed during filtering.
    pub fn last_window_contiguous<'a>(
        &self,
        x: &'a [Vec<f64>],
        positions: &[usize],
    ) -> FeatureResult<&'a [Vec<f64>]> {
        if positions.len() != x.len() {
            return Err(FeatureError::invalid_input(format!(
                "{} positions for {} rows",
                positions.len(),
                x.len()
            )));
        }
        let window = self.last_window(x)?;
        let tail = &positions[positions.len() - self.length..];
        if let Some(pair) = tail.windows(2).find(|p| p[1] != p[0] + 1) {
            return Err(FeatureError::WindowGap {
                length: self.length,
                before: pair[0],
                after: pair[1],
            });
        }
        Ok(window)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(n: usize) -> (Vec<Vec<f64>>, Vec<f64>) {
        let x = (0..n).map(|i| vec![i as f64]).collect();
        let y = (0..n).map(|i| i as f64 * 10.0).collect();
        (x, y)
    }

    #[test]
    fn test_window_count_and_alignment() {
        let (x, y) = rows(10);
        let w = SequenceWindower::new(3).unwrap();
        let windows = w.windows(&x, &y).unwrap();
        assert_eq!(windows.len(), 7);
        assert_eq!(windows[0].features, &x[0..3]);
        assert_eq!(windows[0].target, 30.0);
        assert_eq!(windows[6].features[2][0], 8.0);
        assert_eq!(windows[6].target, 90.0);
    }

    #[test]
    fn test_too_few_rows() {
        let (x, y) = rows(3);
        let err = SequenceWindower::new(3).unwrap().windows(&x, &y).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::DataInsufficient { required: 4, available: 3 }
        ));
    }

    #[test]
    fn test_contiguous_skips_gaps() {
        let (x, y) = rows(6);
        // Row 3 of the source series was dropped.
        let positions = [0, 1, 2, 4, 5, 6];
        let w = SequenceWindower::new(2).unwrap();
        let windows = w.windows_contiguous(&x, &y, &positions).unwrap();
        // Only 0,1 -> 2 and 4,5 -> 6 avoid the gap.
        let targets: Vec<f64> = windows.iter().map(|w| w.target).collect();
        assert_eq!(targets, vec![20.0, 50.0]);
        assert_eq!(w.window_ends(&positions), vec![2, 5]);
    }

    #[test]
    fn test_last_window() {
        let (x, _) = rows(5);
        let w = SequenceWindower::new(2).unwrap();
        assert_eq!(w.last_window(&x).unwrap(), &x[3..5]);
        assert!(SequenceWindower::new(6).unwrap().last_window(&x).is_err());
    }

    #[test]
    fn test_last_window_rejects_gap() {
        let (x, _) = rows(6);
        let w = SequenceWindower::new(3).unwrap();
        // Source bar 7 was dropped, so the last three rows are not consecutive.
        let positions = [2, 3, 4, 5, 6, 8];
        let err = w.last_window_contiguous(&x, &positions).unwrap_err();
        assert!(matches!(
            err,
            FeatureError::WindowGap { length: 3, before: 6, after: 8 }
        ));
        // A gap older than the window does not matter.
        let positions = [0, 1, 3, 4, 5, 6];
        assert_eq!(w.last_window_contiguous(&x, &positions).unwrap(), &x[3..6]);
        assert!(w.last_window_contiguous(&x, &positions[..5]).is_err());
    }
}
