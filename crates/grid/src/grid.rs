use std::collections::{HashMap, HashSet};

use glam::{Vec2, Vec3};
use netscope_common::ObjectIndex;

use crate::cells::{CellCoord, CellsOverlapping, cells_overlapping};

/// Outcome of a radius query against the grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RadiusQuery {
    /// Cells whose buckets were inspected.
    pub cells_visited: usize,
    /// Objects handed to the visitor.
    pub objects_visited: usize,
    /// The covering rectangle exceeded the cell cap and the query fell back
    /// to scanning the occupied cells instead.
    pub capped: bool,
}

/// Fixed-size 2D grid bucketing objects by their cached location.
///
/// Objects are assigned to cells by their XY position divided by the cell
/// size. Membership is maintained incrementally: `update` moves an object
/// between buckets, `remove` drops it. Empty buckets are released.
#[derive(Debug, Clone)]
pub struct SpatialGridIndex {
    cell_size: Vec2,
    cells: HashMap<CellCoord, HashSet<ObjectIndex>>,
    object_cells: HashMap<ObjectIndex, CellCoord>,
}

impl SpatialGridIndex {
    /// Create a new grid with the given cell size.
    pub fn new(cell_size: Vec2) -> Self {
        assert!(
            cell_size.x > 0.0 && cell_size.y > 0.0,
            "cell_size must be positive"
        );
        Self {
            cell_size,
            cells: HashMap::new(),
            object_cells: HashMap::new(),
        }
    }

    /// Cell size used for this grid.
    pub fn cell_size(&self) -> Vec2 {
        self.cell_size
    }

    /// Convert a world position to a cell coordinate.
    pub fn position_to_cell(&self, pos: Vec3) -> CellCoord {
        CellCoord::from_position(pos, self.cell_size)
    }

    /// Move an object into the cell for `new_location`.
    ///
    /// `old_location` is the location the object was last bucketed with, or
    /// `None` on first insertion. The index tracks each object's cell itself,
    /// so a stale hint is tolerated. Returns true if the object changed cell.
    pub fn update(
        &mut self,
        object: ObjectIndex,
        old_location: Option<Vec3>,
        new_location: Vec3,
    ) -> bool {
        let new_cell = self.position_to_cell(new_location);
        let previous = self.object_cells.get(&object).copied();

        if let (Some(old), Some(tracked)) = (old_location, previous) {
            let hinted = self.position_to_cell(old);
            if hinted != tracked {
                tracing::debug!(%object, ?hinted, ?tracked, "stale previous location hint");
            }
        }

        if previous == Some(new_cell) {
            return false;
        }
        if let Some(cell) = previous {
            self.remove_from_cell(object, cell);
        }
        self.cells.entry(new_cell).or_default().insert(object);
        self.object_cells.insert(object, new_cell);
        true
    }

    /// Remove an object from its current cell. Returns false if untracked.
    pub fn remove(&mut self, object: ObjectIndex) -> bool {
        match self.object_cells.remove(&object) {
            Some(cell) => {
                self.remove_from_cell(object, cell);
                true
            }
            None => false,
        }
    }

    /// Drop every object.
    pub fn clear(&mut self) {
        self.cells.clear();
        self.object_cells.clear();
    }

    /// Cell an object is currently bucketed in.
    pub fn cell_of(&self, object: ObjectIndex) -> Option<CellCoord> {
        self.object_cells.get(&object).copied()
    }

    /// Objects bucketed in a specific cell.
    pub fn objects_in_cell(&self, coord: CellCoord) -> impl Iterator<Item = ObjectIndex> + '_ {
        self.cells.get(&coord).into_iter().flatten().copied()
    }

    /// Lazy enumeration of cells overlapping the sphere around `view_point`.
    pub fn cells_overlapping(
        &self,
        view_point: Vec3,
        radius: f32,
        max_cells: usize,
    ) -> CellsOverlapping {
        cells_overlapping(view_point, radius, self.cell_size, max_cells)
    }

    /// Visit every object bucketed in a cell that overlaps the sphere.
    ///
    /// When the covering rectangle exceeds `max_cells`, the occupied cells
    /// are scanned instead, so the visited set is the same either way and
    /// the work stays bounded by the number of non-empty cells.
    pub fn for_each_in_radius(
        &self,
        view_point: Vec3,
        radius: f32,
        max_cells: usize,
        mut visit: impl FnMut(ObjectIndex),
    ) -> RadiusQuery {
        let cells = self.cells_overlapping(view_point, radius, max_cells);
        let mut query = RadiusQuery {
            capped: cells.is_capped(),
            ..RadiusQuery::default()
        };

        let mut visit_bucket = |bucket: &HashSet<ObjectIndex>, query: &mut RadiusQuery| {
            query.cells_visited += 1;
            query.objects_visited += bucket.len();
            bucket.iter().copied().for_each(&mut visit);
        };

        if query.capped {
            for (coord, bucket) in &self.cells {
                if cells.intersects(*coord) {
                    visit_bucket(bucket, &mut query);
                }
            }
        } else {
            for coord in cells {
                if let Some(bucket) = self.cells.get(&coord) {
                    visit_bucket(bucket, &mut query);
                }
            }
        }
        query
    }

    /// Number of non-empty cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Number of objects tracked by the grid.
    pub fn object_count(&self) -> usize {
        self.object_cells.len()
    }

    /// Total number of object placements across all cells.
    pub fn total_placements(&self) -> usize {
        self.cells.values().map(|s| s.len()).sum()
    }

    fn remove_from_cell(&mut self, object: ObjectIndex, cell: CellCoord) {
        if let Some(bucket) = self.cells.get_mut(&cell) {
            bucket.remove(&object);
            if bucket.is_empty() {
                self.cells.remove(&cell);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> SpatialGridIndex {
        SpatialGridIndex::new(Vec2::splat(16.0))
    }

    fn collect(grid: &SpatialGridIndex, at: Vec3, radius: f32, max_cells: usize) -> HashSet<ObjectIndex> {
        let mut found = HashSet::new();
        grid.for_each_in_radius(at, radius, max_cells, |o| {
            found.insert(o);
        });
        found
    }

    #[test]
    fn insert_places_object_in_cell() {
        let mut g = grid();
        let id = ObjectIndex(1);
        assert!(g.update(id, None, Vec3::new(20.0, -5.0, 100.0)));
        assert_eq!(g.cell_of(id), Some(CellCoord::new(1, -1)));
        assert_eq!(g.objects_in_cell(CellCoord::new(1, -1)).collect::<Vec<_>>(), vec![id]);
    }

    #[test]
    fn move_within_cell_is_a_no_op() {
        let mut g = grid();
        let id = ObjectIndex(1);
        g.update(id, None, Vec3::new(1.0, 1.0, 0.0));
        assert!(!g.update(id, Some(Vec3::new(1.0, 1.0, 0.0)), Vec3::new(15.0, 2.0, 0.0)));
        assert_eq!(g.total_placements(), 1);
    }

    #[test]
    fn move_across_cells_releases_old_bucket() {
        let mut g = grid();
        let id = ObjectIndex(1);
        g.update(id, None, Vec3::ZERO);
        assert!(g.update(id, Some(Vec3::ZERO), Vec3::new(100.0, 0.0, 0.0)));
        assert_eq!(g.cell_count(), 1);
        assert_eq!(g.cell_of(id), Some(CellCoord::new(6, 0)));
        assert_eq!(g.objects_in_cell(CellCoord::new(0, 0)).count(), 0);
    }

    #[test]
    fn stale_hint_does_not_duplicate_placement() {
        let mut g = grid();
        let id = ObjectIndex(1);
        g.update(id, None, Vec3::ZERO);
        g.update(id, Some(Vec3::new(500.0, 500.0, 0.0)), Vec3::new(40.0, 0.0, 0.0));
        assert_eq!(g.total_placements(), 1);
        assert_eq!(g.cell_count(), 1);
    }

    #[test]
    fn remove_drops_membership() {
        let mut g = grid();
        let id = ObjectIndex(3);
        g.update(id, None, Vec3::ZERO);
        assert!(g.remove(id));
        assert!(!g.remove(id));
        assert_eq!(g.cell_count(), 0);
        assert_eq!(g.object_count(), 0);
    }

    #[test]
    fn radius_query_finds_neighbours_only() {
        let mut g = grid();
        let near = ObjectIndex(1);
        let far = ObjectIndex(2);
        g.update(near, None, Vec3::new(20.0, 0.0, 0.0));
        g.update(far, None, Vec3::new(400.0, 400.0, 0.0));

        let found = collect(&g, Vec3::ZERO, 30.0, 1024);
        assert!(found.contains(&near));
        assert!(!found.contains(&far));
    }

    #[test]
    fn capped_query_falls_back_to_occupied_cells() {
        let mut g = grid();
        let near = ObjectIndex(1);
        let far = ObjectIndex(2);
        let outside = ObjectIndex(3);
        g.update(near, None, Vec3::ZERO);
        g.update(far, None, Vec3::new(5000.0, 0.0, 0.0));
        g.update(outside, None, Vec3::new(90_000.0, 0.0, 0.0));

        let mut found = HashSet::new();
        let query = g.for_each_in_radius(Vec3::ZERO, 6000.0, 16, |o| {
            found.insert(o);
        });
        assert!(query.capped);
        assert_eq!(query.cells_visited, 2);
        assert!(found.contains(&near));
        assert!(found.contains(&far));
        assert!(!found.contains(&outside));
    }

    #[test]
    fn empty_cell_yields_nothing() {
        let g = grid();
        assert_eq!(g.objects_in_cell(CellCoord::new(99, 99)).count(), 0);
    }
}
