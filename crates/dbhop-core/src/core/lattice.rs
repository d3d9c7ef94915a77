use nalgebra::{DMatrix, Point2};
use serde::{Deserialize, Serialize};

/// Geometry of the H-Si(100)-2x1 surface lattice, in angstroms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct LatticeParams {
    /// Lattice vector along a dimer row.
    pub a: f64,
    /// Lattice vector across dimer rows.
    pub b: f64,
    /// Separation between the two sites of a dimer pair.
    pub c: f64,
}

impl Default for LatticeParams {
    fn default() -> Self {
        Self {
            a: 3.84,
            b: 7.68,
            c: 2.25,
        }
    }
}

/// A dangling-bond site in lattice coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DbSite {
    pub column: i64,
    pub row: i64,
    /// True if the site is the bottom member of its dimer pair.
    pub bottom: bool,
}

impl DbSite {
    pub fn new(column: i64, row: i64, bottom: bool) -> Self {
        Self {
            column,
            row,
            bottom,
        }
    }
}

impl From<i64> for DbSite {
    fn from(column: i64) -> Self {
        Self::new(column, 0, false)
    }
}

impl From<(i64, i64, bool)> for DbSite {
    fn from((column, row, bottom): (i64, i64, bool)) -> Self {
        Self::new(column, row, bottom)
    }
}

impl LatticeParams {
    /// Physical position of a site on the surface plane.
    pub fn position(&self, site: &DbSite) -> Point2<f64> {
        let y = self.b * site.row as f64 + if site.bottom { self.c } else { 0.0 };
        Point2::new(self.a * site.column as f64, y)
    }

    pub fn positions(&self, sites: &[DbSite]) -> Vec<Point2<f64>> {
        sites.iter().map(|s| self.position(s)).collect()
    }
}

/// Symmetric matrix of pairwise separations.
pub fn distance_matrix(positions: &[Point2<f64>]) -> DMatrix<f64> {
    let n = positions.len();
    DMatrix::from_fn(n, n, |i, j| nalgebra::distance(&positions[i], &positions[j]))
}
