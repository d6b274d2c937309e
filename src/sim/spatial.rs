//! Uniform grid buckets for neighbour queries
//!
//! Points are hashed into cubic cells of `cell_size`. A radius query visits
//! every cell the query sphere's bounding box touches, so callers still have
//! to distance-test the candidates.

use std::collections::HashMap;

use glam::{IVec3, Vec3};

#[derive(Debug, Clone)]
pub struct SpatialHash {
    cell_size: f32,
    cells: HashMap<IVec3, Vec<usize>>,
}

impl SpatialHash {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: sanitize_cell_size(cell_size),
            cells: HashMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn set_cell_size(&mut self, cell_size: f32) {
        self.cell_size = sanitize_cell_size(cell_size);
    }

    fn cell_of(&self, point: Vec3) -> IVec3 {
        (point / self.cell_size).floor().as_ivec3()
    }

    /// Re-bucket every point. Indices refer to positions in `points`.
    pub fn rebuild(&mut self, points: impl IntoIterator<Item = Vec3>) {
        for bucket in self.cells.values_mut() {
            bucket.clear();
        }
        for (i, point) in points.into_iter().enumerate() {
            let cell = self.cell_of(point);
            self.cells.entry(cell).or_default().push(i);
        }
    }

    /// Visit every indexed point that may lie within `radius` of `center`
    pub fn for_each_candidate(&self, center: Vec3, radius: f32, mut f: impl FnMut(usize)) {
        let min = self.cell_of(center - Vec3::splat(radius));
        let max = self.cell_of(center + Vec3::splat(radius));
        for z in min.z..=max.z {
            for y in min.y..=max.y {
                for x in min.x..=max.x {
                    if let Some(bucket) = self.cells.get(&IVec3::new(x, y, z)) {
                        for &i in bucket {
                            f(i);
                        }
                    }
                }
            }
        }
    }
}

fn sanitize_cell_size(cell_size: f32) -> f32 {
    if cell_size.is_finite() && cell_size > 0.01 {
        cell_size
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_candidates_cover_radius() {
        let points = [
            Vec3::ZERO,
            Vec3::new(1.5, 0.0, 0.0),
            Vec3::new(-2.9, 0.5, 0.1),
            Vec3::new(30.0, 0.0, 0.0),
        ];
        let mut hash = SpatialHash::new(2.0);
        hash.rebuild(points);

        let mut found = Vec::new();
        hash.for_each_candidate(Vec3::ZERO, 3.0, |i| found.push(i));
        found.sort();
        assert_eq!(found, vec![0, 1, 2]);
    }

    #[test]
    fn test_rebuild_forgets_old_points() {
        let mut hash = SpatialHash::new(1.0);
        hash.rebuild([Vec3::ZERO]);
        hash.rebuild([Vec3::new(10.0, 10.0, 10.0)]);
        let mut found = Vec::new();
        hash.for_each_candidate(Vec3::ZERO, 1.0, |i| found.push(i));
        assert!(found.is_empty());
    }

    #[test]
    fn test_bad_cell_size_falls_back() {
        assert_eq!(SpatialHash::new(0.0).cell_size(), 1.0);
        assert_eq!(SpatialHash::new(f32::NAN).cell_size(), 1.0);
    }
}
