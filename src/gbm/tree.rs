//! Leaf-wise regression tree grown on histogram gradients

use super::binning::BinnedMatrix;

/// Arena node
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tree {
    nodes: Vec<Node>,
}

impl Tree {
    pub fn predict(&self, features: &[f64]) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if features[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn set_leaf(&mut self, node: usize, value: f64) {
        if let Some(Node::Leaf { value: v }) = self.nodes.get_mut(node) {
            *v = value;
        }
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

/// Rows that ended up in one leaf
#[derive(Debug, Clone)]
pub(crate) struct LeafRows {
    pub node: usize,
    pub rows: Vec<usize>,
}

#[derive(Debug, Clone, Copy)]
struct SplitCandidate {
    feature: usize,
    bin: usize,
    gain: f64,
}

struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    split: Option<SplitCandidate>,
}

const MIN_GAIN: f64 = 1e-12;

/// Grows one tree per call, always splitting the leaf with the best gain
pub(crate) struct TreeGrower<'a> {
    data: &'a BinnedMatrix,
    num_leaves: usize,
    min_data_in_leaf: usize,
}

impl<'a> TreeGrower<'a> {
    pub fn new(data: &'a BinnedMatrix, num_leaves: usize, min_data_in_leaf: usize) -> Self {
        Self {
            data,
            num_leaves,
            min_data_in_leaf,
        }
    }

    /// Fit the structure to `gradients` (unit hessians). Leaf values are
    /// left at zero for the caller to fill.
    pub fn grow(&self, gradients: &[f64], rows: Vec<usize>) -> (Tree, Vec<LeafRows>) {
        let mut nodes = vec![Node::Leaf { value: 0.0 }];
        let root_split = self.best_split(gradients, &rows);
        let mut open = vec![OpenLeaf {
            node: 0,
            rows,
            split: root_split,
        }];

        while open.len() < self.num_leaves {
            let best = open
                .iter()
                .enumerate()
                .filter_map(|(i, leaf)| leaf.split.map(|s| (i, s.gain)))
                .fold(None, |acc: Option<(usize, f64)>, (i, gain)| match acc {
                    Some((_, best_gain)) if best_gain >= gain => acc,
                    _ => Some((i, gain)),
                });

            let Some((idx, _)) = best else { break };
            let leaf = open.swap_remove(idx);
            let Some(split) = leaf.split else { break };

            let column = &self.data.bins[split.feature];
            let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
                .rows
                .iter()
                .partition(|&&r| (column[r] as usize) <= split.bin);

            let left = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            let right = nodes.len();
            nodes.push(Node::Leaf { value: 0.0 });
            nodes[leaf.node] = Node::Split {
                feature: split.feature,
                threshold: self.data.mappers[split.feature].threshold(split.bin),
                left,
                right,
            };

            let left_split = self.best_split(gradients, &left_rows);
            let right_split = self.best_split(gradients, &right_rows);
            open.push(OpenLeaf {
                node: left,
                rows: left_rows,
                split: left_split,
            });
            open.push(OpenLeaf {
                node: right,
                rows: right_rows,
                split: right_split,
            });
        }

        let mut leaves: Vec<LeafRows> = open
            .into_iter()
            .map(|leaf| LeafRows {
                node: leaf.node,
                rows: leaf.rows,
            })
            .collect();
        leaves.sort_by_key(|l| l.node);

        (Tree { nodes }, leaves)
    }

    fn best_split(&self, gradients: &[f64], rows: &[usize]) -> Option<SplitCandidate> {
        let n = rows.len();
        if n < 2 * self.min_data_in_leaf {
            return None;
        }

        let total: f64 = rows.iter().map(|&r| gradients[r]).sum();
        let parent_score = total * total / n as f64;
        let mut best: Option<SplitCandidate> = None;

        for (feature, column) in self.data.bins.iter().enumerate() {
            let n_bins = self.data.mappers[feature].n_bins();
            if n_bins < 2 {
                continue;
            }

            let mut grad_hist = vec![0.0; n_bins];
            let mut count_hist = vec![0usize; n_bins];
            for &r in rows {
                let b = column[r] as usize;
                grad_hist[b] += gradients[r];
                count_hist[b] += 1;
            }

            let mut left_grad = 0.0;
            let mut left_count = 0usize;
            for bin in 0..n_bins - 1 {
                left_grad += grad_hist[bin];
                left_count += count_hist[bin];
                let right_count = n - left_count;
                if left_count < self.min_data_in_leaf {
                    continue;
                }
                if right_count < self.min_data_in_leaf {
                    break;
                }

                let right_grad = total - left_grad;
                let gain = left_grad * left_grad / left_count as f64
                    + right_grad * right_grad / right_count as f64
                    - parent_score;

                if gain > MIN_GAIN && best.map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate { feature, bin, gain });
                }
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step_data() -> (BinnedMatrix, Vec<f64>) {
        // Feature 0 separates the gradients, feature 1 is noise-free constant
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 1.0]).collect();
        let gradients: Vec<f64> = (0..20).map(|i| if i < 10 { -1.0 } else { 1.0 }).collect();
        (BinnedMatrix::new(&rows, 32), gradients)
    }

    #[test]
    fn test_splits_on_informative_feature() {
        let (data, gradients) = step_data();
        let grower = TreeGrower::new(&data, 2, 1);
        let (tree, leaves) = grower.grow(&gradients, (0..20).collect());

        assert_eq!(tree.n_leaves(), 2);
        assert_eq!(leaves.len(), 2);
        assert_eq!(leaves[0].rows, (0..10).collect::<Vec<_>>());
        assert_eq!(leaves[1].rows, (10..20).collect::<Vec<_>>());
        match &tree.nodes[0] {
            Node::Split { feature, threshold, .. } => {
                assert_eq!(*feature, 0);
                assert_eq!(*threshold, 9.5);
            }
            other => panic!("expected split, got {other:?}"),
        }
    }

    #[test]
    fn test_min_data_in_leaf_blocks_split() {
        let (data, gradients) = step_data();
        let grower = TreeGrower::new(&data, 8, 11);
        let (tree, leaves) = grower.grow(&gradients, (0..20).collect());
        assert_eq!(tree.n_leaves(), 1);
        assert_eq!(leaves[0].rows.len(), 20);
    }

    #[test]
    fn test_num_leaves_caps_growth() {
        let rows: Vec<Vec<f64>> = (0..64).map(|i| vec![i as f64]).collect();
        let gradients: Vec<f64> = (0..64).map(|i| ((i * 37) % 11) as f64 - 5.0).collect();
        let data = BinnedMatrix::new(&rows, 64);
        let (tree, leaves) = TreeGrower::new(&data, 5, 2).grow(&gradients, (0..64).collect());
        assert!(tree.n_leaves() <= 5);
        assert_eq!(leaves.iter().map(|l| l.rows.len()).sum::<usize>(), 64);
        assert!(leaves.iter().all(|l| l.rows.len() >= 2));
    }

    #[test]
    fn test_predict_follows_thresholds() {
        let (data, gradients) = step_data();
        let (mut tree, leaves) = TreeGrower::new(&data, 2, 1).grow(&gradients, (0..20).collect());
        tree.set_leaf(leaves[0].node, -3.0);
        tree.set_leaf(leaves[1].node, 7.0);
        assert_eq!(tree.predict(&[2.0, 1.0]), -3.0);
        assert_eq!(tree.predict(&[9.5, 1.0]), -3.0);
        assert_eq!(tree.predict(&[12.0, 1.0]), 7.0);
    }
}
