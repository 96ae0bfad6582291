use super::SpatialIndex;
use serde::{Deserialize, Serialize};
use waterworld_data::{Aabb, Vec2};

/// Which cells a uniform-grid query scans.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CellScan {
    /// Only the cell containing the query centre. Bodies are bucketed by
    /// centre, so pairs straddling a cell boundary can be missed.
    OwnCell,
    /// Every cell the query box overlaps. Exact.
    #[default]
    Neighborhood,
}

#[derive(Debug, Clone, Copy)]
struct CellSpan {
    min_cx: usize,
    max_cx: usize,
    min_cy: usize,
    max_cy: usize,
}

impl CellSpan {
    fn is_single(&self) -> bool {
        self.min_cx == self.max_cx && self.min_cy == self.max_cy
    }
}

/// Uniform grid over the arena using offset-indexed buckets.
///
/// `cell_offsets[i]..cell_offsets[i + 1]` indexes the colliders of cell
/// `i` in `entity_indices` (compressed-sparse-row layout). A collider is
/// stored in every cell its box overlaps; coordinates outside the arena
/// are clamped onto the border cells.
#[derive(Debug, Clone)]
pub struct UniformGrid {
    pub width: f64,
    pub height: f64,
    pub cols: usize,
    pub rows: usize,
    pub cell_width: f64,
    pub cell_height: f64,
    pub scan: CellScan,
    pub cell_offsets: Vec<usize>,
    pub entity_indices: Vec<usize>,
    spans: Vec<Option<CellSpan>>,
    has_multi_cell: bool,
}

impl UniformGrid {
    /// Creates a grid with `cells_per_axis × cells_per_axis` cells sized
    /// from the arena dimensions.
    pub fn new(width: f64, height: f64, cells_per_axis: usize, scan: CellScan) -> Self {
        let cols = cells_per_axis.max(1);
        let rows = cells_per_axis.max(1);
        Self {
            width,
            height,
            cols,
            rows,
            cell_width: width / cols as f64,
            cell_height: height / rows as f64,
            scan,
            cell_offsets: vec![0; cols * rows + 1],
            entity_indices: Vec::new(),
            spans: Vec::new(),
            has_multi_cell: false,
        }
    }

    /// Flat cell index of a world coordinate, `None` when the coordinate is
    /// non-finite or outside the arena.
    #[inline]
    pub fn get_cell_idx(&self, x: f64, y: f64) -> Option<usize> {
        if !x.is_finite() || !y.is_finite() {
            return None;
        }
        if x < 0.0 || y < 0.0 {
            return None;
        }
        let cx = (x / self.cell_width) as usize;
        let cy = (y / self.cell_height) as usize;
        if cx >= self.cols || cy >= self.rows {
            None
        } else {
            Some(cy * self.cols + cx)
        }
    }

    #[inline]
    fn clamp_coord(v: f64, size: f64, count: usize) -> Option<usize> {
        if !v.is_finite() {
            return None;
        }
        let c = (v / size).floor();
        if c <= 0.0 {
            Some(0)
        } else {
            Some((c as usize).min(count - 1))
        }
    }

    fn span_of_box(&self, area: &Aabb) -> Option<CellSpan> {
        Some(CellSpan {
            min_cx: Self::clamp_coord(area.min.x, self.cell_width, self.cols)?,
            max_cx: Self::clamp_coord(area.max.x, self.cell_width, self.cols)?,
            min_cy: Self::clamp_coord(area.min.y, self.cell_height, self.rows)?,
            max_cy: Self::clamp_coord(area.max.y, self.cell_height, self.rows)?,
        })
    }

    fn span_of_point(&self, p: Vec2) -> Option<CellSpan> {
        let cx = Self::clamp_coord(p.x, self.cell_width, self.cols)?;
        let cy = Self::clamp_coord(p.y, self.cell_height, self.rows)?;
        Some(CellSpan {
            min_cx: cx,
            max_cx: cx,
            min_cy: cy,
            max_cy: cy,
        })
    }

    /// Number of colliders bucketed into `cell`.
    pub fn cell_len(&self, cell: usize) -> usize {
        self.cell_offsets[cell + 1] - self.cell_offsets[cell]
    }
}

impl SpatialIndex for UniformGrid {
    fn name(&self) -> &'static str {
        "uniform_grid"
    }

    fn rebuild(&mut self, bodies: &[Aabb], walls: &[Aabb]) {
        let cell_count = self.cols * self.rows;

        self.spans.clear();
        for b in bodies {
            let span = match self.scan {
                CellScan::OwnCell => self.span_of_point(b.center()),
                CellScan::Neighborhood => self.span_of_box(b),
            };
            self.spans.push(span);
        }
        for w in walls {
            let span = self.span_of_box(w);
            self.spans.push(span);
        }

        self.has_multi_cell = self.spans.iter().flatten().any(|s| !s.is_single());

        let mut counts = vec![0usize; cell_count];
        for span in self.spans.iter().flatten() {
            for cy in span.min_cy..=span.max_cy {
                for cx in span.min_cx..=span.max_cx {
                    counts[cy * self.cols + cx] += 1;
                }
            }
        }

        self.cell_offsets.resize(cell_count + 1, 0);
        let mut total = 0;
        for (i, &count) in counts.iter().enumerate() {
            self.cell_offsets[i] = total;
            total += count;
        }
        self.cell_offsets[cell_count] = total;

        self.entity_indices.resize(total, 0);
        let mut cursor = self.cell_offsets[..cell_count].to_vec();
        for (id, span) in self.spans.iter().enumerate() {
            let Some(span) = span else { continue };
            for cy in span.min_cy..=span.max_cy {
                for cx in span.min_cx..=span.max_cx {
                    let cell = cy * self.cols + cx;
                    self.entity_indices[cursor[cell]] = id;
                    cursor[cell] += 1;
                }
            }
        }
    }

    fn query(&self, area: &Aabb, out: &mut Vec<usize>) {
        let span = match self.scan {
            CellScan::OwnCell => self.span_of_point(area.center()),
            CellScan::Neighborhood => self.span_of_box(area),
        };
        let Some(span) = span else { return };

        let start = out.len();
        for cy in span.min_cy..=span.max_cy {
            for cx in span.min_cx..=span.max_cx {
                let cell = cy * self.cols + cx;
                let (lo, hi) = (self.cell_offsets[cell], self.cell_offsets[cell + 1]);
                out.extend_from_slice(&self.entity_indices[lo..hi]);
            }
        }

        // Colliders spanning several cells show up once per cell.
        if !span.is_single() && self.has_multi_cell {
            let mut tail = out.split_off(start);
            tail.sort_unstable();
            tail.dedup();
            out.extend(tail);
        }
    }

    fn cell_of(&self, point: Vec2) -> Option<usize> {
        self.get_cell_idx(point.x, point.y)
    }
}
