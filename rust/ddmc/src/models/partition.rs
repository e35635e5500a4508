use super::array::Array2D;
use serde::{
    Deserialize,
    Serialize,
};

/// Hard assignment of every peptide to a cluster in `[0, n_clusters)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    labels: Vec<usize>,
    n_clusters: usize,
}

impl Partition {
    /// # Panics
    /// If any label is outside `[0, n_clusters)`.
    pub fn new(labels: Vec<usize>, n_clusters: usize) -> Self {
        assert!(
            labels.iter().all(|&l| l < n_clusters),
            "Label out of range for {} clusters",
            n_clusters
        );
        Self { labels, n_clusters }
    }

    /// Assigns each row to its highest-probability column.
    pub fn from_responsibilities(resp: &Array2D<f64>) -> Self {
        let labels = resp
            .row_apply(|row| {
                let mut best = 0;
                for (k, &v) in row.iter().enumerate() {
                    if v > row[best] {
                        best = k;
                    }
                }
                best
            })
            .collect();
        Self {
            labels,
            n_clusters: resp.ncols(),
        }
    }

    pub fn labels(&self) -> &[usize] {
        &self.labels
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn counts(&self) -> Vec<usize> {
        let mut counts = vec![0; self.n_clusters];
        for &l in &self.labels {
            counts[l] += 1;
        }
        counts
    }

    pub fn min_cluster_size(&self) -> usize {
        self.counts().into_iter().min().unwrap_or(0)
    }

    /// Peptide indices per cluster, ascending.
    pub fn member_lists(&self) -> Vec<Vec<usize>> {
        let mut members = vec![Vec::new(); self.n_clusters];
        for (i, &l) in self.labels.iter().enumerate() {
            members[l].push(i);
        }
        members
    }

    pub fn snapshot(&self) -> MembershipSnapshot {
        MembershipSnapshot(self.member_lists())
    }

    /// One-hot responsibility matrix, 1 for the assigned cluster and 0 otherwise.
    pub fn hard_responsibilities(&self) -> Array2D<f64> {
        let mut out = Array2D::filled(0.0, self.labels.len(), self.n_clusters);
        for (i, &l) in self.labels.iter().enumerate() {
            out.set(i, l, 1.0);
        }
        out
    }
}

/// Immutable per-cluster member lists, compared by value between iterations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MembershipSnapshot(Vec<Vec<usize>>);

impl MembershipSnapshot {
    pub fn clusters(&self) -> &[Vec<usize>] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_lists_and_counts() {
        let p = Partition::new(vec![1, 0, 1, 2, 1], 3);
        assert_eq!(p.counts(), vec![1, 3, 1]);
        assert_eq!(p.member_lists(), vec![vec![1], vec![0, 2, 4], vec![3]]);
        assert_eq!(p.min_cluster_size(), 1);
    }

    #[test]
    fn test_hard_responsibilities_are_one_hot() {
        let p = Partition::new(vec![2, 0, 1], 3);
        let r = p.hard_responsibilities();
        assert_eq!(r.get_row(0).unwrap(), &[0.0, 0.0, 1.0]);
        assert_eq!(r.get_row(1).unwrap(), &[1.0, 0.0, 0.0]);
        assert_eq!(r.get_row(2).unwrap(), &[0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_snapshot_equality_by_value() {
        let a = Partition::new(vec![0, 0, 1, 1], 2).snapshot();
        let b = Partition::new(vec![0, 0, 1, 1], 2).snapshot();
        let c = Partition::new(vec![0, 1, 0, 1], 2).snapshot();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_from_responsibilities_keeps_first_on_ties() {
        let resp = Array2D::new(vec![vec![0.5, 0.5], vec![0.2, 0.8]]).unwrap();
        let p = Partition::from_responsibilities(&resp);
        assert_eq!(p.labels(), &[0, 1]);
    }
}
