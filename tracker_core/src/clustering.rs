//! Generic clustering over locatable objects.
//!
//! # Methods
//! - Hierarchical, complete linkage (default): cluster distance is the largest
//!   member-to-member distance.
//! - Hierarchical, single linkage: smallest member-to-member distance.
//! - Hierarchical, average: distance between cluster mean locations.
//! - K-means: at most 8 reassignment passes, seeded with the first K objects.
//!
//! Hierarchical methods stop merging once the closest pair is farther than the
//! distance limit, or, with no limit, once K clusters remain. K defaults to
//! `round(sqrt(N))`.
//!
//! Clusters are returned as index lists into the input slice, so they never
//! own the clustered objects.

use crate::{geometry::clamped_acos, types::Vec3};
use nalgebra::DMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Mean spherical earth radius (m) used for ground range.
pub const EARTH_RADIUS: f64 = 6_366_707.019_493_7;

/// Anything with a position that can be grouped.
pub trait Clusterable {
    fn cluster_location(&self) -> Vec3;

    fn cluster_velocity(&self) -> Option<Vec3> {
        None
    }
}

impl Clusterable for Vec3 {
    fn cluster_location(&self) -> Vec3 {
        *self
    }
}

/// Indices into the slice handed to [`ClusterEngine::cluster`].
pub type Cluster = Vec<usize>;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMethod {
    #[default]
    HierarchicalComplete,
    HierarchicalSingle,
    HierarchicalAverage,
    KMeans,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceFunction {
    /// 3-D straight-line distance
    #[default]
    Slant,
    /// Great-circle arc between geocentric positions, altitude ignored
    Ground,
}

impl DistanceFunction {
    pub fn distance(self, a: &Vec3, b: &Vec3) -> f64 {
        match self {
            DistanceFunction::Slant => slant_range(a, b),
            DistanceFunction::Ground => ground_range(a, b),
        }
    }
}

pub fn slant_range(a: &Vec3, b: &Vec3) -> f64 {
    (a - b).norm()
}

/// Arc length on a spherical earth between two geocentric positions.
pub fn ground_range(a: &Vec3, b: &Vec3) -> f64 {
    let denom = a.norm() * b.norm();
    if denom <= 0.0 {
        return slant_range(a, b);
    }
    EARTH_RADIUS * clamped_acos(a.dot(b) / denom)
}

// ---------------------------------------------------------------------------
// Cluster helpers
// ---------------------------------------------------------------------------

/// Mean location of the members of `cluster`. `None` for an empty cluster.
pub fn mean_location<T: Clusterable>(objects: &[T], cluster: &[usize]) -> Option<Vec3> {
    if cluster.is_empty() {
        return None;
    }
    let count = cluster.len() as f64;
    // Divide per member so large coordinates do not overflow the sum.
    Some(
        cluster
            .iter()
            .fold(Vec3::zeros(), |acc, &i| acc + objects[i].cluster_location() / count),
    )
}

/// Mean velocity over the members that report one.
pub fn mean_velocity<T: Clusterable>(objects: &[T], cluster: &[usize]) -> Option<Vec3> {
    let velocities: Vec<Vec3> = cluster
        .iter()
        .filter_map(|&i| objects[i].cluster_velocity())
        .collect();
    if velocities.is_empty() {
        return None;
    }
    let count = velocities.len() as f64;
    Some(velocities.iter().fold(Vec3::zeros(), |acc, v| acc + v / count))
}

// ---------------------------------------------------------------------------
// ProximityMatrix
// ---------------------------------------------------------------------------

/// Shrinkable distance matrix used for greedy pairing.
#[derive(Clone, Debug)]
pub struct ProximityMatrix {
    data: DMatrix<f64>,
}

impl ProximityMatrix {
    pub fn new(rows: usize, cols: usize, fill: f64) -> Self {
        Self {
            data: DMatrix::from_element(rows, cols, fill),
        }
    }

    /// Build from row vectors of equal length.
    pub fn from_rows(rows: Vec<Vec<f64>>, cols: usize) -> Self {
        let n_rows = rows.len();
        let flat: Vec<f64> = rows.into_iter().flatten().collect();
        debug_assert_eq!(flat.len(), n_rows * cols);
        Self {
            data: DMatrix::from_row_slice(n_rows, cols, &flat),
        }
    }

    pub fn rows(&self) -> usize {
        self.data.nrows()
    }

    pub fn cols(&self) -> usize {
        self.data.ncols()
    }

    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.data[(row, col)]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f64) {
        self.data[(row, col)] = value;
    }

    pub fn delete_row(&mut self, row: usize) {
        let data = std::mem::replace(&mut self.data, DMatrix::zeros(0, 0));
        self.data = data.remove_row(row);
    }

    pub fn delete_column(&mut self, col: usize) {
        let data = std::mem::replace(&mut self.data, DMatrix::zeros(0, 0));
        self.data = data.remove_column(col);
    }

    /// Overwrite every entry of `col` with `value`.
    pub fn fill_column(&mut self, col: usize, value: f64) {
        self.data.column_mut(col).fill(value);
    }

    /// First strict minimum in row-major order as `(row, col, value)`.
    /// `None` for an empty matrix.
    pub fn min_entry(&self) -> Option<(usize, usize, f64)> {
        let mut best: Option<(usize, usize, f64)> = None;
        for r in 0..self.rows() {
            for c in 0..self.cols() {
                let v = self.data[(r, c)];
                if best.map_or(true, |(_, _, b)| v < b) {
                    best = Some((r, c, v));
                }
            }
        }
        best
    }
}

// ---------------------------------------------------------------------------
// ClusterEngine
// ---------------------------------------------------------------------------

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ClusterEngine {
    pub method: ClusterMethod,
    pub distance: DistanceFunction,
    /// Merge threshold; `None` (or non-positive) switches to count-limited merging
    pub distance_limit: Option<f64>,
    /// Target cluster count; `None` uses `round(sqrt(N))`
    pub cluster_count: Option<usize>,
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self {
            method: ClusterMethod::HierarchicalComplete,
            distance: DistanceFunction::Slant,
            distance_limit: None,
            cluster_count: None,
        }
    }
}

const KMEANS_MAX_ITERATIONS: usize = 8;

impl ClusterEngine {
    pub fn with_limit(method: ClusterMethod, distance_limit: f64) -> Self {
        Self {
            method,
            distance_limit: Some(distance_limit),
            ..Default::default()
        }
    }

    /// Member of `cluster` nearest to `point`.
    pub fn nearest_member<T: Clusterable>(&self, point: &Vec3, objects: &[T], cluster: &[usize]) -> Option<usize> {
        let mut best: Option<(usize, f64)> = None;
        for &i in cluster {
            let d = self.distance.distance(point, &objects[i].cluster_location());
            if best.map_or(true, |(_, b)| d < b) {
                best = Some((i, d));
            }
        }
        best.map(|(i, _)| i)
    }

    /// Group `objects`; every index appears in exactly one returned cluster.
    pub fn cluster<T: Clusterable + Sync>(&self, objects: &[T]) -> Vec<Cluster> {
        let n = objects.len();
        if n == 0 {
            return Vec::new();
        }
        let k = self.target_count(n);
        let limit = self.distance_limit.filter(|l| *l > 0.0);

        match self.method {
            ClusterMethod::HierarchicalComplete | ClusterMethod::HierarchicalSingle => {
                self.linkage(objects, limit, k)
            }
            ClusterMethod::HierarchicalAverage => self.centroid_linkage(objects, limit, k),
            ClusterMethod::KMeans => self.k_means(objects, k),
        }
    }

    fn target_count(&self, n: usize) -> usize {
        match self.cluster_count {
            Some(k) if k > 0 => k.min(n),
            _ => ((n as f64).sqrt() + 0.5).max(1.0) as usize,
        }
    }

    /// Pairwise distance matrix with `f64::MAX` on the diagonal. Rows are
    /// computed in parallel; `collect` keeps them in order.
    fn pairwise<T: Clusterable + Sync>(&self, objects: &[T]) -> ProximityMatrix {
        let n = objects.len();
        let distance = self.distance;
        let rows: Vec<Vec<f64>> = (0..n)
            .into_par_iter()
            .map(|i| {
                let a = objects[i].cluster_location();
                (0..n)
                    .map(|j| {
                        if i == j {
                            f64::MAX
                        } else {
                            distance.distance(&a, &objects[j].cluster_location())
                        }
                    })
                    .collect()
            })
            .collect();
        ProximityMatrix::from_rows(rows, n)
    }

    /// Complete or single linkage over a shrinking proximity matrix.
    fn linkage<T: Clusterable + Sync>(&self, objects: &[T], limit: Option<f64>, k: usize) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = (0..objects.len()).map(|i| vec![i]).collect();
        if clusters.len() <= 1 {
            return clusters;
        }
        let mut mat = self.pairwise(objects);
        let complete = self.method == ClusterMethod::HierarchicalComplete;

        while clusters.len() > 1 {
            let Some((r, c, lowest)) = mat.min_entry() else {
                break;
            };
            match limit {
                Some(limit) if lowest > limit => break,
                None if clusters.len() <= k => break,
                _ => {}
            }
            if r == c {
                break;
            }
            let merge = |a: f64, b: f64| if complete { a.max(b) } else { a.min(b) };
            for i in 0..mat.rows() {
                let v = merge(mat.get(i, r), mat.get(i, c));
                mat.set(i, r, v);
            }
            mat.delete_column(c);
            for i in 0..mat.cols() {
                let v = merge(mat.get(r, i), mat.get(c, i));
                mat.set(r, i, v);
            }
            if !complete {
                mat.set(r, r, f64::MAX);
            }
            mat.delete_row(c);

            let absorbed = clusters.remove(c);
            let keep = if c < r { r - 1 } else { r };
            clusters[keep].extend(absorbed);
        }
        clusters
    }

    /// Merge the pair of clusters whose means are closest.
    fn centroid_linkage<T: Clusterable>(&self, objects: &[T], limit: Option<f64>, k: usize) -> Vec<Cluster> {
        let mut clusters: Vec<Cluster> = (0..objects.len()).map(|i| vec![i]).collect();
        loop {
            if clusters.len() <= 1 || (limit.is_none() && clusters.len() <= k) {
                break;
            }
            let means: Vec<Vec3> = clusters
                .iter()
                .filter_map(|c| mean_location(objects, c))
                .collect();
            let mut best = (0, clusters.len() - 1, f64::MAX);
            for i in 0..clusters.len() {
                for j in 0..i {
                    let d = self.distance.distance(&means[i], &means[j]);
                    if d < best.2 {
                        best = (i, j, d);
                    }
                }
            }
            let (i, j, d) = best;
            if matches!(limit, Some(l) if d > l) {
                break;
            }
            // j < i, so removing j shifts i down by one.
            let absorbed = clusters.remove(j);
            clusters[i - 1].extend(absorbed);
        }
        clusters
    }

    fn k_means<T: Clusterable>(&self, objects: &[T], k: usize) -> Vec<Cluster> {
        let n = objects.len();
        let mut clusters: Vec<Cluster> = (0..k).map(|i| vec![i]).collect();
        let mut assignment: Vec<Option<usize>> = (0..n).map(|i| (i < k).then_some(i)).collect();

        for _ in 0..KMEANS_MAX_ITERATIONS {
            let mut changed = false;
            for i in 0..n {
                let location = objects[i].cluster_location();
                let mut closest = None;
                let mut min_dist = f64::MAX;
                for (j, cluster) in clusters.iter().enumerate() {
                    let Some(mean) = mean_location(objects, cluster) else {
                        continue;
                    };
                    let d = self.distance.distance(&location, &mean);
                    if d < min_dist {
                        min_dist = d;
                        closest = Some(j);
                    }
                }
                let Some(closest) = closest else {
                    continue;
                };
                if assignment[i] != Some(closest) {
                    if let Some(current) = assignment[i] {
                        clusters[current].retain(|&m| m != i);
                    }
                    clusters[closest].push(i);
                    assignment[i] = Some(closest);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }
        clusters.retain(|c| !c.is_empty());
        clusters
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn points() -> Vec<Vec3> {
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1000.0, 0.0, 0.0),
            Vec3::new(10.0, 0.0, 0.0),
            Vec3::new(1010.0, 0.0, 0.0),
            Vec3::new(20.0, 0.0, 0.0),
            Vec3::new(5000.0, 0.0, 0.0),
        ]
    }

    fn sorted(mut clusters: Vec<Cluster>) -> Vec<Cluster> {
        for c in clusters.iter_mut() {
            c.sort_unstable();
        }
        clusters.sort();
        clusters
    }

    fn assert_partition(clusters: &[Cluster], n: usize) {
        let mut seen: Vec<usize> = clusters.iter().flatten().copied().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..n).collect::<Vec<_>>());
    }

    #[test]
    fn complete_linkage_respects_limit() {
        let engine = ClusterEngine::with_limit(ClusterMethod::HierarchicalComplete, 15.0);
        let clusters = engine.cluster(&points());
        assert_partition(&clusters, 6);
        // 0-2-4 spans 20 m under complete linkage, so it cannot fully merge.
        assert_eq!(sorted(clusters), vec![vec![0, 2], vec![1, 3], vec![4], vec![5]]);

        let engine = ClusterEngine::with_limit(ClusterMethod::HierarchicalComplete, 25.0);
        assert_eq!(
            sorted(engine.cluster(&points())),
            vec![vec![0, 2, 4], vec![1, 3], vec![5]]
        );
    }

    #[test]
    fn single_linkage_chains() {
        let engine = ClusterEngine::with_limit(ClusterMethod::HierarchicalSingle, 15.0);
        assert_eq!(
            sorted(engine.cluster(&points())),
            vec![vec![0, 2, 4], vec![1, 3], vec![5]]
        );
    }

    #[test]
    fn average_linkage_uses_means() {
        let engine = ClusterEngine::with_limit(ClusterMethod::HierarchicalAverage, 15.0);
        let clusters = sorted(engine.cluster(&points()));
        assert_partition(&clusters, 6);
        assert!(clusters.contains(&vec![1, 3]));
        assert!(clusters.contains(&vec![5]));
    }

    #[test]
    fn count_limited_merging() {
        let engine = ClusterEngine {
            cluster_count: Some(3),
            ..Default::default()
        };
        let clusters = sorted(engine.cluster(&points()));
        assert_eq!(clusters, vec![vec![0, 2, 4], vec![1, 3], vec![5]]);
    }

    #[test]
    fn k_means_separates_groups() {
        let engine = ClusterEngine {
            method: ClusterMethod::KMeans,
            cluster_count: Some(3),
            ..Default::default()
        };
        // Seeds are the first K objects, one per group here.
        let pts: Vec<Vec3> = [0.0, 1000.0, 5000.0, 10.0, 1010.0, 20.0]
            .iter()
            .map(|&x| Vec3::new(x, 0.0, 0.0))
            .collect();
        let clusters = sorted(engine.cluster(&pts));
        assert_partition(&clusters, 6);
        assert_eq!(clusters, vec![vec![0, 3, 5], vec![1, 4], vec![2]]);
    }

    #[test]
    fn default_count_is_rounded_sqrt() {
        let engine = ClusterEngine::default();
        assert_eq!(engine.target_count(6), 2);
        assert_eq!(engine.target_count(1), 1);
        assert_eq!(engine.target_count(20), 4);
    }

    #[test]
    fn mean_and_nearest_member() {
        let pts = points();
        let mean = mean_location(&pts, &[0, 2, 4]).expect("non-empty");
        assert_abs_diff_eq!(mean.x, 10.0, epsilon = 1e-9);
        assert!(mean_location(&pts, &[]).is_none());
        let engine = ClusterEngine::default();
        assert_eq!(engine.nearest_member(&Vec3::new(1004.0, 0.0, 0.0), &pts, &[0, 1, 3]), Some(1));
    }

    #[test]
    fn ground_range_ignores_altitude() {
        let a = Vec3::new(EARTH_RADIUS, 0.0, 0.0);
        let b = Vec3::new(EARTH_RADIUS + 10_000.0, 0.0, 0.0);
        assert_abs_diff_eq!(ground_range(&a, &b), 0.0, epsilon = 1e-6);
        let c = Vec3::new(0.0, EARTH_RADIUS, 0.0);
        assert_abs_diff_eq!(
            ground_range(&a, &c),
            EARTH_RADIUS * std::f64::consts::FRAC_PI_2,
            epsilon = 1e-3
        );
    }

    #[test]
    fn proximity_matrix_min_and_shrink() {
        let mut m = ProximityMatrix::from_rows(vec![vec![5.0, 1.0, 3.0], vec![1.0, 2.0, 0.5]], 3);
        assert_eq!(m.min_entry(), Some((1, 2, 0.5)));
        m.fill_column(2, f64::INFINITY);
        assert_eq!(m.min_entry(), Some((0, 1, 1.0)));
        m.delete_row(0);
        assert_eq!(m.rows(), 1);
        assert_eq!(m.min_entry(), Some((0, 0, 1.0)));
        m.delete_column(0);
        assert_eq!(m.cols(), 2);
        assert_abs_diff_eq!(m.get(0, 0), 2.0);
    }
}
