//! Feature discretization for histogram split finding

use super::MAX_BINS;

/// Maps raw feature values to bin indices.
///
/// Bin `b` holds values `v` with `upper_bounds[b-1] < v <= upper_bounds[b]`;
/// the last bound is `+inf`.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct BinMapper {
    upper_bounds: Vec<f64>,
}

impl BinMapper {
    pub fn fit(values: &[f64], max_bins: usize) -> Self {
        let max_bins = max_bins.clamp(1, MAX_BINS);
        let mut sorted: Vec<f64> = values.to_vec();
        sorted.sort_by(f64::total_cmp);

        let mut distinct = sorted.clone();
        distinct.dedup();

        let mut upper_bounds = Vec::new();
        if distinct.len() <= max_bins {
            for pair in distinct.windows(2) {
                upper_bounds.push((pair[0] + pair[1]) / 2.0);
            }
        } else {
            // Equal-frequency cut points over the full sample
            for k in 1..max_bins {
                let idx = k * sorted.len() / max_bins;
                let cut = sorted[idx.min(sorted.len() - 1)];
                if upper_bounds.last().map_or(true, |&last| cut > last) {
                    upper_bounds.push(cut);
                }
            }
            // A cut at the maximum would leave the final bin empty
            if let (Some(&last), Some(&max)) = (upper_bounds.last(), distinct.last()) {
                if last >= max {
                    upper_bounds.pop();
                }
            }
        }
        upper_bounds.push(f64::INFINITY);

        Self { upper_bounds }
    }

    pub fn bin(&self, value: f64) -> u16 {
        self.upper_bounds.partition_point(|&ub| ub < value) as u16
    }

    pub fn n_bins(&self) -> usize {
        self.upper_bounds.len()
    }

    /// Raw-value threshold equivalent to "bin <= b"
    pub fn threshold(&self, bin: usize) -> f64 {
        self.upper_bounds[bin]
    }
}

/// Column-major binned copy of a feature matrix
#[derive(Debug, Clone)]
pub(crate) struct BinnedMatrix {
    pub mappers: Vec<BinMapper>,
    /// `bins[feature][row]`
    pub bins: Vec<Vec<u16>>,
}

impl BinnedMatrix {
    pub fn new(rows: &[Vec<f64>], max_bins: usize) -> Self {
        let n_features = rows.first().map_or(0, |r| r.len());
        let mut mappers = Vec::with_capacity(n_features);
        let mut bins = Vec::with_capacity(n_features);

        for f in 0..n_features {
            let column: Vec<f64> = rows.iter().map(|r| r[f]).collect();
            let mapper = BinMapper::fit(&column, max_bins);
            bins.push(column.iter().map(|&v| mapper.bin(v)).collect());
            mappers.push(mapper);
        }

        Self { mappers, bins }
    }

    #[cfg(test)]
    pub fn n_features(&self) -> usize {
        self.mappers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_few_distinct_values_get_own_bins() {
        let mapper = BinMapper::fit(&[3.0, 1.0, 2.0, 2.0, 1.0], 16);
        assert_eq!(mapper.n_bins(), 3);
        assert_eq!(mapper.bin(1.0), 0);
        assert_eq!(mapper.bin(2.0), 1);
        assert_eq!(mapper.bin(3.0), 2);
        assert_eq!(mapper.threshold(0), 1.5);
        // Unseen values fall into the nearest bin
        assert_eq!(mapper.bin(-10.0), 0);
        assert_eq!(mapper.bin(99.0), 2);
    }

    #[test]
    fn test_many_values_are_capped() {
        let values: Vec<f64> = (0..1000).map(|i| i as f64).collect();
        let mapper = BinMapper::fit(&values, 8);
        assert!(mapper.n_bins() <= 8);
        assert!(mapper.n_bins() >= 2);
        assert_eq!(mapper.bin(0.0), 0);
        assert_eq!(mapper.bin(999.0) as usize, mapper.n_bins() - 1);
    }

    #[test]
    fn test_bin_count_fits_index_width() {
        let values: Vec<f64> = (0..70_000).map(|i| i as f64).collect();
        let mapper = BinMapper::fit(&values, 100_000);
        assert!(mapper.n_bins() <= MAX_BINS);
        assert_eq!(mapper.bin(69_999.0) as usize, mapper.n_bins() - 1);
        assert!(mapper.bin(4_463.0) < mapper.bin(69_999.0));
    }

    #[test]
    fn test_constant_column_has_single_bin() {
        let mapper = BinMapper::fit(&[5.0; 10], 8);
        assert_eq!(mapper.n_bins(), 1);
    }

    #[test]
    fn test_binned_matrix_layout() {
        let rows = vec![vec![1.0, 10.0], vec![2.0, 10.0], vec![3.0, 20.0]];
        let matrix = BinnedMatrix::new(&rows, 4);
        assert_eq!(matrix.n_features(), 2);
        assert_eq!(matrix.bins[0], vec![0, 1, 2]);
        assert_eq!(matrix.bins[1], vec![0, 0, 1]);
    }
}
