use itertools::Itertools;
use kiddo::{KdTree, SquaredEuclidean};
use nalgebra::{DMatrix, Point2};
use std::collections::HashSet;
use tracing::debug;

/// A pair of sites close enough to hop together, with every pair of
/// targets they can reach. Each target pair is stored once, as `(k, l)`
/// with `k` reachable from `sources.0` and `l` from `sources.1`.
#[derive(Debug, Clone, PartialEq)]
pub struct CohopPair {
    pub sources: (usize, usize),
    pub targets: Vec<(usize, usize)>,
}

/// Finite-range adjacency for single hops and cohops, built once per
/// geometry and range setting.
#[derive(Debug, Clone, Default)]
pub struct NeighborTables {
    hop_targets: Vec<Vec<usize>>,
    cohop_pairs: Vec<CohopPair>,
    pairs_by_site: Vec<Vec<usize>>,
}

impl NeighborTables {
    pub fn build(
        positions: &[Point2<f64>],
        distances: &DMatrix<f64>,
        hop_range: f64,
        cohop_range: f64,
        enable_cohop: bool,
    ) -> Self {
        let n = positions.len();
        let hop_targets = within_range(positions, distances, hop_range);

        let mut cohop_pairs = Vec::new();
        let mut pairs_by_site = vec![Vec::new(); n];
        if enable_cohop {
            let partners = within_range(positions, distances, cohop_range);
            for i in 0..n {
                for &j in partners[i].iter().filter(|&&j| j > i) {
                    let mut seen = HashSet::new();
                    let targets: Vec<(usize, usize)> = hop_targets[i]
                        .iter()
                        .cartesian_product(hop_targets[j].iter())
                        .map(|(&k, &l)| (k, l))
                        .filter(|&(k, l)| k != j && l != i && k != l)
                        .filter(|&(k, l)| seen.insert((k.min(l), k.max(l))))
                        .collect();
                    if targets.is_empty() {
                        continue;
                    }
                    let index = cohop_pairs.len();
                    pairs_by_site[i].push(index);
                    pairs_by_site[j].push(index);
                    cohop_pairs.push(CohopPair {
                        sources: (i, j),
                        targets,
                    });
                }
            }
        }

        debug!(
            sites = n,
            hop_range,
            cohop_range,
            hop_pairs = hop_targets.iter().map(Vec::len).sum::<usize>(),
            cohop_pairs = cohop_pairs.len(),
            "Built finite-range neighbor tables"
        );

        Self {
            hop_targets,
            cohop_pairs,
            pairs_by_site,
        }
    }

    /// Sites reachable by a single hop from `site`, ascending.
    pub fn hop_targets(&self, site: usize) -> &[usize] {
        &self.hop_targets[site]
    }

    pub fn cohop_pairs(&self) -> &[CohopPair] {
        &self.cohop_pairs
    }

    /// Indices into [`Self::cohop_pairs`] of the pairs containing `site`.
    pub fn pairs_touching(&self, site: usize) -> &[usize] {
        &self.pairs_by_site[site]
    }
}

/// For each site, the other sites strictly closer than `range`, ascending.
fn within_range(positions: &[Point2<f64>], distances: &DMatrix<f64>, range: f64) -> Vec<Vec<usize>> {
    let n = positions.len();
    if n == 0 || range <= 0.0 {
        return vec![Vec::new(); n];
    }
    let points: Vec<[f64; 2]> = positions.iter().map(|p| [p.x, p.y]).collect();
    let kdtree: KdTree<f64, 2> = (&points).into();
    let radius_sq = range * range;

    points
        .iter()
        .enumerate()
        .map(|(i, query)| {
            let mut found: Vec<usize> = kdtree
                .within_unsorted::<SquaredEuclidean>(query, radius_sq)
                .into_iter()
                .map(|nb| nb.item as usize)
                .filter(|&j| j != i && distances[(i, j)] < range)
                .collect();
            found.sort_unstable();
            found
        })
        .collect()
}
