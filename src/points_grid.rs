use std::collections::HashMap;

use cgmath::MetricSpace;

use crate::math::{FVector, THRESH_NORMALS_ARE_SAME, THRESH_POINTS_ARE_SAME, THRESH_VECTORS_ARE_NEAR};

/// Offset applied to points before quantization, so that geometry aligned to
/// integer coordinates does not sit exactly on cell boundaries.
const GRID_OFFSET: f32 = 0.12345;

fn adjacent_index_if_overlapping(grid_index: i32, grid_pos: f32, grid_threshold: f32) -> i32 {
    if (grid_pos - grid_index as f32) < grid_threshold {
        grid_index - 1
    } else if 1.0 - (grid_pos - grid_index as f32) < grid_threshold {
        grid_index + 1
    } else {
        grid_index
    }
}

/// Spatial hash used to deduplicate model points and vectors during a rebuild.
/// Each cell stores the points that fall inside it; a point close enough to a
/// cell boundary is mirrored into the adjacent cells so lookups only ever need
/// to consult a single cell.
pub struct FBspPointsGrid {
    one_over_granularity: f32,
    threshold: f32,
    grid_map: HashMap<(i32, i32, i32), Vec<(FVector, usize)>>,
}

impl FBspPointsGrid {
    pub fn new(granularity: f32, threshold: f32) -> FBspPointsGrid {
        // A threshold bigger than half a cell could require searching
        // beyond the immediate neighbors.
        debug_assert!(threshold / granularity <= 0.5);
        FBspPointsGrid {
            one_over_granularity: 1.0 / granularity,
            threshold,
            grid_map: HashMap::new(),
        }
    }

    pub fn clear(&mut self) {
        self.grid_map.clear();
    }

    /// Look up a point within `threshold`, or record it under `index` if absent.
    /// Returns the table index of the matching or newly added point.
    pub fn find_or_add_point(&mut self, point: FVector, index: usize, threshold: f32) -> usize {
        let threshold_squared = threshold * threshold;

        let grid_x = (point.x - GRID_OFFSET) * self.one_over_granularity;
        let grid_y = (point.y - GRID_OFFSET) * self.one_over_granularity;
        let grid_z = (point.z - GRID_OFFSET) * self.one_over_granularity;
        let grid_index_x = grid_x.floor() as i32;
        let grid_index_y = grid_y.floor() as i32;
        let grid_index_z = grid_z.floor() as i32;

        let item = self.grid_map.entry((grid_index_x, grid_index_y, grid_index_z)).or_default();
        for &(existing, existing_index) in item.iter() {
            if existing.distance2(point) <= threshold_squared {
                return existing_index;
            }
        }
        item.push((point, index));

        // Mirror the point into neighboring cells it overlaps, so a future
        // query landing in those cells can still find it.
        let grid_threshold = self.threshold * self.one_over_granularity;
        let adjacent_x = adjacent_index_if_overlapping(grid_index_x, grid_x, grid_threshold);
        let adjacent_y = adjacent_index_if_overlapping(grid_index_y, grid_y, grid_threshold);
        let adjacent_z = adjacent_index_if_overlapping(grid_index_z, grid_z, grid_threshold);

        let overlaps_x = adjacent_x != grid_index_x;
        let overlaps_y = adjacent_y != grid_index_y;
        let overlaps_z = adjacent_z != grid_index_z;

        let mut cells: [(i32, i32, i32); 7] = [(0, 0, 0); 7];
        let mut cell_count = 0;
        if overlaps_x {
            cells[cell_count] = (adjacent_x, grid_index_y, grid_index_z);
            cell_count += 1;
            if overlaps_y {
                cells[cell_count] = (adjacent_x, adjacent_y, grid_index_z);
                cell_count += 1;
                if overlaps_z {
                    cells[cell_count] = (adjacent_x, adjacent_y, adjacent_z);
                    cell_count += 1;
                }
            }
            if overlaps_z {
                cells[cell_count] = (adjacent_x, grid_index_y, adjacent_z);
                cell_count += 1;
            }
        }
        if overlaps_y {
            cells[cell_count] = (grid_index_x, adjacent_y, grid_index_z);
            cell_count += 1;
            if overlaps_z {
                cells[cell_count] = (grid_index_x, adjacent_y, adjacent_z);
                cell_count += 1;
            }
        }
        if overlaps_z {
            cells[cell_count] = (grid_index_x, grid_index_y, adjacent_z);
            cell_count += 1;
        }
        for cell in &cells[..cell_count] {
            self.grid_map.entry(*cell).or_default().push((point, index));
        }

        index
    }
}

/// The pair of grids a model rebuild threads through every point and vector
/// insertion.  Discarded when the rebuild finishes.
pub struct FBspPointsGrids {
    pub points: FBspPointsGrid,
    pub vectors: FBspPointsGrid,
}

impl Default for FBspPointsGrids {
    fn default() -> Self {
        Self::new()
    }
}

impl FBspPointsGrids {
    pub fn new() -> FBspPointsGrids {
        FBspPointsGrids {
            points: FBspPointsGrid::new(50.0, THRESH_POINTS_ARE_SAME),
            vectors: FBspPointsGrid::new(
                1.0 / 16.0,
                THRESH_NORMALS_ARE_SAME.max(THRESH_VECTORS_ARE_NEAR),
            ),
        }
    }
}
