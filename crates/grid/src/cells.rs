use glam::{Vec2, Vec3};

/// A 2D cell coordinate in the grid. Z is up, so cells partition the XY plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub x: i32,
    pub y: i32,
}

impl CellCoord {
    pub fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Cell containing `point` for the given cell size.
    ///
    /// Coordinates saturate at the `i32` range.
    pub fn from_position(point: Vec3, cell_size: Vec2) -> Self {
        Self {
            x: (point.x / cell_size.x).floor() as i32,
            y: (point.y / cell_size.y).floor() as i32,
        }
    }
}

/// Relative and absolute slack added to query radii so that points lying
/// exactly on the sphere survive float rounding in the cell tests.
const RADIUS_SLACK_RELATIVE: f64 = 1.0e-5;
const RADIUS_SLACK_ABSOLUTE: f64 = 1.0e-3;

/// Lazy enumeration of the cells whose footprint intersects a sphere.
///
/// The sphere is projected onto the XY plane. At most `max_cells` cells are
/// visited; when the covering rectangle is larger than that the enumeration
/// is capped and [`CellsOverlapping::is_capped`] reports it. The sequence is
/// finite and can be restarted with [`CellsOverlapping::restart`].
#[derive(Debug, Clone)]
pub struct CellsOverlapping {
    center: (f64, f64),
    radius_sq: f64,
    cell_size: (f64, f64),
    min: CellCoord,
    max: CellCoord,
    rect_cells: u64,
    max_cells: usize,
    cursor: Option<CellCoord>,
    visited: usize,
}

/// Enumerate cells of size `cell_size` overlapping the sphere of `radius`
/// around `view_point`, visiting no more than `max_cells` of them.
pub fn cells_overlapping(
    view_point: Vec3,
    radius: f32,
    cell_size: Vec2,
    max_cells: usize,
) -> CellsOverlapping {
    let padded = if radius.is_nan() || radius < 0.0 {
        -1.0
    } else {
        f64::from(radius) * (1.0 + RADIUS_SLACK_RELATIVE) + RADIUS_SLACK_ABSOLUTE
    };
    let center = (f64::from(view_point.x), f64::from(view_point.y));
    let size = (f64::from(cell_size.x), f64::from(cell_size.y));

    if padded < 0.0 {
        return CellsOverlapping {
            center,
            radius_sq: -1.0,
            cell_size: size,
            min: CellCoord::new(0, 0),
            max: CellCoord::new(-1, -1),
            rect_cells: 0,
            max_cells,
            cursor: None,
            visited: 0,
        };
    }

    let min = CellCoord::new(
        ((center.0 - padded) / size.0).floor() as i32,
        ((center.1 - padded) / size.1).floor() as i32,
    );
    let max = CellCoord::new(
        ((center.0 + padded) / size.0).floor() as i32,
        ((center.1 + padded) / size.1).floor() as i32,
    );
    let width = (i64::from(max.x) - i64::from(min.x) + 1) as u64;
    let height = (i64::from(max.y) - i64::from(min.y) + 1) as u64;

    CellsOverlapping {
        center,
        radius_sq: padded * padded,
        cell_size: size,
        min,
        max,
        rect_cells: width.saturating_mul(height),
        max_cells,
        cursor: Some(min),
        visited: 0,
    }
}

impl CellsOverlapping {
    /// Number of cells in the covering rectangle, before corner pruning.
    pub fn rect_cell_count(&self) -> u64 {
        self.rect_cells
    }

    /// True when the covering rectangle holds more cells than will be visited.
    pub fn is_capped(&self) -> bool {
        self.rect_cells > self.max_cells as u64
    }

    /// Rewind to the first cell.
    pub fn restart(&mut self) {
        self.cursor = (self.rect_cells > 0).then_some(self.min);
        self.visited = 0;
    }

    /// Whether a cell's footprint intersects the query circle.
    pub fn intersects(&self, cell: CellCoord) -> bool {
        if self.radius_sq < 0.0 {
            return false;
        }
        let x0 = f64::from(cell.x) * self.cell_size.0;
        let y0 = f64::from(cell.y) * self.cell_size.1;
        let x1 = x0 + self.cell_size.0;
        let y1 = y0 + self.cell_size.1;
        let dx = (x0 - self.center.0).max(0.0).max(self.center.0 - x1);
        let dy = (y0 - self.center.1).max(0.0).max(self.center.1 - y1);
        dx * dx + dy * dy <= self.radius_sq
    }

    fn advance(&mut self, from: CellCoord) {
        self.cursor = if from.x < self.max.x {
            Some(CellCoord::new(from.x + 1, from.y))
        } else if from.y < self.max.y {
            Some(CellCoord::new(self.min.x, from.y + 1))
        } else {
            None
        };
    }
}

impl Iterator for CellsOverlapping {
    type Item = CellCoord;

    fn next(&mut self) -> Option<CellCoord> {
        while let Some(cell) = self.cursor {
            if self.visited >= self.max_cells {
                self.cursor = None;
                return None;
            }
            self.visited += 1;
            self.advance(cell);
            if self.intersects(cell) {
                return Some(cell);
            }
        }
        None
    }
}
