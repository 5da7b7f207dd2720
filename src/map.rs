//! The typed floor-plan raster.

use std::fs;
use std::path::Path;

use crate::error::MapError;
use crate::region::{RegionClass, NUMBER_OF_REGIONS};

/// A row-major 2D grid of region classes, plus the likelihood vector the filter
/// reweights particles against each tick.
///
/// Created once at startup (`BuildingMap::load`) and mutated every tick by the filter's
/// driver via `set_probabilities`. Width and height never change post-load.
#[derive(Debug, Clone)]
pub struct BuildingMap {
    cells: Vec<Vec<RegionClass>>,
    width: usize,
    height: usize,
    region_probs: [f64; NUMBER_OF_REGIONS],
}

impl BuildingMap {
    /// Parses a map file: newline-separated rows, comma-separated integer region ids.
    ///
    /// Width is the length of row 0; any row of a different length is a
    /// [`MapError::RaggedRow`]. An empty file yields `W = H = 0`, which is legal but
    /// degenerate (every `probability_of` call then returns 0).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, MapError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|source| MapError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&contents)
    }

    /// Parses already-read map text. Split out from [`BuildingMap::load`] so tests can
    /// exercise the grammar without touching the filesystem.
    pub fn parse(contents: &str) -> Result<Self, MapError> {
        let mut cells: Vec<Vec<RegionClass>> = Vec::new();
        let mut width = None;

        for (row, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let mut parsed_row = Vec::with_capacity(line.split(',').count());
            for (col, token) in line.split(',').enumerate() {
                let token = token.trim();
                let id: i64 = token.parse().map_err(|_| MapError::BadRegionId {
                    row,
                    token: token.to_string(),
                })?;
                let region = RegionClass::from_id(id).ok_or(MapError::RegionIdOutOfRange {
                    row,
                    col,
                    id,
                    max: NUMBER_OF_REGIONS,
                })?;
                parsed_row.push(region);
            }

            let expected = *width.get_or_insert(parsed_row.len());
            if parsed_row.len() != expected {
                return Err(MapError::RaggedRow {
                    row,
                    found: parsed_row.len(),
                    expected,
                });
            }
            cells.push(parsed_row);
        }

        let height = cells.len();
        let width = width.unwrap_or(0);
        let mut region_probs = [1.0; NUMBER_OF_REGIONS];
        region_probs[0] = 0.0;

        Ok(Self {
            cells,
            width,
            height,
            region_probs,
        })
    }

    /// Width (column count) of the map, fixed after load.
    pub fn width(&self) -> usize {
        self.width
    }

    /// Height (row count) of the map, fixed after load.
    pub fn height(&self) -> usize {
        self.height
    }

    /// Returns the likelihood of the region covering integer pixel `(x, y)`.
    ///
    /// Out-of-bounds coordinates are not an error — they are how the filter penalizes
    /// particles that have wandered off the map — and simply return 0.
    pub fn probability_of(&self, x: i64, y: i64) -> f64 {
        if x < 0 || y < 0 {
            return 0.0;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return 0.0;
        }
        let region = self.cells[y][x];
        self.region_probs[region as usize]
    }

    /// Assigns `region_probs[i+1] = probabilities[i]` for the six non-void classes.
    ///
    /// A length mismatch is a soft error: it is logged and the call is otherwise a
    /// no-op, matching the source's `log_error`-and-return behavior. Values are used
    /// as-is; the map never renormalizes them.
    pub fn set_probabilities(&mut self, probabilities: &[f64]) {
        if probabilities.len() != NUMBER_OF_REGIONS - 1 {
            log::warn!(
                "set_probabilities: expected {} values, got {}; ignoring",
                NUMBER_OF_REGIONS - 1,
                probabilities.len()
            );
            return;
        }
        for (i, &p) in probabilities.iter().enumerate() {
            self.region_probs[i + 1] = p;
        }
    }

    /// The current likelihood vector, including the always-zero `VoidSpace` slot.
    pub fn region_probs(&self) -> &[f64; NUMBER_OF_REGIONS] {
        &self.region_probs
    }

    /// The region class at integer pixel `(x, y)`, or `None` if out of bounds.
    pub fn region_at(&self, x: i64, y: i64) -> Option<RegionClass> {
        if x < 0 || y < 0 {
            return None;
        }
        let (x, y) = (x as usize, y as usize);
        if x >= self.width || y >= self.height {
            return None;
        }
        Some(self.cells[y][x])
    }
}
