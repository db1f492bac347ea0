//! Track definitions and the rasterized drivable-area mask.
//!
//! A track is a ring between two closed outlines. Everything that reads
//! the surface goes through [`TrackGeometry`], which rasterizes the
//! outlines once into a per-unit occupancy grid and answers footprint
//! queries against it.

use std::fs;
use std::path::Path;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::TrackError;
use crate::geometry::{Pose, Rect};
use crate::GLOBAL_CONFIG;

/// A closed circuit: the drivable ring plus the rects that drive race
/// progress. Coordinates are in arena units, y growing downward.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    pub bounds: DVec2,
    pub outer: Vec<DVec2>,
    pub inner: Vec<DVec2>,
    pub checkpoints: Vec<Rect>,
    pub finish_line: Rect,
    pub hazards: Vec<Rect>,
    pub start: Pose,
}

impl Track {
    /// The built-in circuit used when no track file is configured.
    pub fn default_circuit() -> Track {
        Track {
            bounds: DVec2::new(1441.0, 768.0),
            outer: ring(&[
                (50.0, 50.0),
                (1350.0, 50.0),
                (1350.0, 300.0),
                (1050.0, 300.0),
                (1050.0, 400.0),
                (1350.0, 400.0),
                (1350.0, 600.0),
                (550.0, 600.0),
                (400.0, 450.0),
                (250.0, 450.0),
                (150.0, 550.0),
                (50.0, 450.0),
            ]),
            inner: ring(&[
                (150.0, 150.0),
                (1250.0, 150.0),
                (1250.0, 200.0),
                (950.0, 200.0),
                (950.0, 500.0),
                (1250.0, 500.0),
                (550.0, 500.0),
                (450.0, 400.0),
                (350.0, 400.0),
                (200.0, 400.0),
                (150.0, 350.0),
            ]),
            checkpoints: vec![
                Rect::new(350.0, 50.0, 40.0, 40.0),
                Rect::new(750.0, 110.0, 40.0, 40.0),
                Rect::new(950.0, 350.0, 40.0, 40.0),
                Rect::new(900.0, 500.0, 40.0, 40.0),
                Rect::new(550.0, 500.0, 40.0, 40.0),
                Rect::new(350.0, 400.0, 40.0, 50.0),
                Rect::new(50.0, 300.0, 40.0, 40.0),
            ],
            finish_line: Rect::new(50.0, 150.0, 50.0, 50.0),
            hazards: vec![
                Rect::new(300.0, 100.0, 10.0, 10.0),
                Rect::new(1000.0, 500.0, 10.0, 10.0),
                Rect::new(700.0, 530.0, 10.0, 10.0),
            ],
            start: Pose::new(DVec2::new(120.0, 100.0), 90.0),
        }
    }

    pub fn load(path: &Path) -> Result<Track, TrackError> {
        let raw = fs::read_to_string(path)?;
        Track::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Track, TrackError> {
        let track: Track = serde_yaml::from_str(raw)?;
        if track.outer.len() < 3 || (!track.inner.is_empty() && track.inner.len() < 3) {
            return Err(TrackError::DegenerateOutline);
        }
        Ok(track)
    }
}

fn ring(points: &[(f64, f64)]) -> Vec<DVec2> {
    points.iter().map(|&(x, y)| DVec2::new(x, y)).collect()
}

/// Occupancy grid of the drivable ring, one cell per arena unit,
/// sampled at cell centers.
pub struct TrackGeometry {
    width: usize,
    height: usize,
    mask: Vec<bool>,
}

impl TrackGeometry {
    pub fn build(track: &Track) -> TrackGeometry {
        let width = track.bounds.x.ceil() as usize;
        let height = track.bounds.y.ceil() as usize;
        let mut mask = vec![false; width * height];
        fill_polygon(&mut mask, width, height, &track.outer, true);
        fill_polygon(&mut mask, width, height, &track.inner, false);
        TrackGeometry { width, height, mask }
    }

    pub fn dimensions(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    /// Whether enough of the car footprint rests on drivable cells.
    ///
    /// The footprint is the car rect shrunk by the configured factor and
    /// rotated to the heading. The covered cell count must clear the
    /// configured share of the nominal (unshrunk) car area. Cells outside
    /// the arena never count as drivable.
    pub fn is_on_track(&self, position: DVec2, car_width: f64, car_height: f64, heading: f64) -> bool {
        let half_w = car_width * GLOBAL_CONFIG.footprint_shrink / 2.0;
        let half_h = car_height * GLOBAL_CONFIG.footprint_shrink / 2.0;
        let (sin, cos) = heading.to_radians().sin_cos();

        // cell range the rotated footprint can reach
        let reach_x = half_w * cos.abs() + half_h * sin.abs();
        let reach_y = half_w * sin.abs() + half_h * cos.abs();
        let x0 = (position.x - reach_x).floor() as i64;
        let x1 = (position.x + reach_x).ceil() as i64;
        let y0 = (position.y - reach_y).floor() as i64;
        let y1 = (position.y + reach_y).ceil() as i64;

        let mut covered: usize = 0;
        for y in y0..y1 {
            for x in x0..x1 {
                let d = DVec2::new(x as f64 + 0.5, y as f64 + 0.5) - position;
                // back-rotate the offset into the footprint frame; a
                // positive heading turns the car counterclockwise on
                // the y-down grid
                let local_x = d.x * cos - d.y * sin;
                let local_y = d.x * sin + d.y * cos;
                if local_x.abs() <= half_w && local_y.abs() <= half_h && self.drivable(x, y) {
                    covered += 1;
                }
            }
        }
        covered as f64 > car_width * car_height * GLOBAL_CONFIG.on_track_threshold
    }

    fn drivable(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.mask[y as usize * self.width + x as usize]
    }
}

/// Even-odd scanline fill at cell centers. The final vertex connects
/// back to the first; a repeated closing vertex yields a degenerate
/// edge that is skipped by the crossing rule.
fn fill_polygon(mask: &mut [bool], width: usize, height: usize, polygon: &[DVec2], value: bool) {
    if polygon.len() < 3 {
        return;
    }
    let mut crossings: Vec<f64> = Vec::new();
    for row in 0..height {
        let sample_y = row as f64 + 0.5;
        crossings.clear();
        for i in 0..polygon.len() {
            let a = polygon[i];
            let b = polygon[(i + 1) % polygon.len()];
            if (a.y <= sample_y && b.y > sample_y) || (b.y <= sample_y && a.y > sample_y) {
                let t = (sample_y - a.y) / (b.y - a.y);
                crossings.push(a.x + t * (b.x - a.x));
            }
        }
        crossings.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        for span in crossings.chunks_exact(2) {
            let from = (span[0] - 0.5).ceil().max(0.0);
            let to = (span[1] - 0.5).ceil().min(width as f64);
            if to <= from {
                continue;
            }
            let (from, to) = (from as usize, to as usize);
            mask[row * width + from..row * width + to].fill(value);
        }
    }
}
