//! Per-car race progress: checkpoint ordering, lap timing, hazards.
//!
//! [`RaceMachine`] owns the car it tracks and is the only writer of
//! progress state. Callers feed it inputs through [`RaceMachine::advance`]
//! and read results through accessors; there is no way to poke laps or
//! checkpoint indices from outside.

use glam::DVec2;

use crate::geometry::{Pose, Rect};
use crate::physics::{CarState, TickInput};
use crate::protocol::PlayerState;
use crate::track::{Track, TrackGeometry};
use crate::{PlayerID, GLOBAL_CONFIG};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RacePhase {
    Racing,
    /// Terminal: reached the target lap count. The car is frozen and
    /// no further transitions fire.
    Finished,
}

/// Drives one car through the race.
///
/// Checkpoints and the finish line are edge-triggered: a trigger fires
/// when the car rect starts overlapping the expected rect and re-arms
/// only once the overlap ends, so a car parked on a rect counts once.
/// The finish line counts a lap only when every checkpoint has been
/// collected first.
pub struct RaceMachine {
    car: CarState,
    max_laps: u32,
    phase: RacePhase,
    on_track: bool,
    on_checkpoint: bool,
    on_finish: bool,
    checkpoint_index: usize,
    lap_count: u32,
    /// Simulated seconds raced; advances dt per tick while racing so
    /// timing is independent of wall-clock jitter.
    clock: f64,
    lap_start: f64,
    laps: Vec<f64>,
    best_lap: Option<f64>,
    last_lap: Option<f64>,
    total_time: f64,
    hazard_window_until: Option<f64>,
}

impl RaceMachine {
    pub fn new(start: Pose, max_laps: u32) -> RaceMachine {
        RaceMachine {
            car: CarState::at(start),
            max_laps,
            phase: RacePhase::Racing,
            on_track: true,
            on_checkpoint: false,
            on_finish: false,
            checkpoint_index: 0,
            lap_count: 0,
            clock: 0.0,
            lap_start: 0.0,
            laps: Vec::new(),
            best_lap: None,
            last_lap: None,
            total_time: 0.0,
            hazard_window_until: None,
        }
    }

    /// Run one simulation step: integrate the car, refresh the surface
    /// query, then apply checkpoint, finish-line and hazard triggers in
    /// that order.
    pub fn advance(&mut self, input: TickInput, track: &Track, geometry: &TrackGeometry, dt: f64) {
        if self.phase == RacePhase::Finished {
            return;
        }
        self.clock += dt;

        let was_on_track = self.on_track;
        self.car = self.car.step(input, was_on_track, dt, track.bounds);
        self.on_track = geometry.is_on_track(
            self.car.position,
            GLOBAL_CONFIG.car_width,
            GLOBAL_CONFIG.car_height,
            self.car.heading,
        );

        let total = track.checkpoints.len();
        if self.checkpoint_index > total {
            // only possible when the machine outlives the track it was
            // built against
            log::warn!(
                "checkpoint index {} exceeds track total {}, clamping",
                self.checkpoint_index,
                total
            );
            self.checkpoint_index = total;
        }

        let car_rect = Rect::from_center(
            self.car.position,
            GLOBAL_CONFIG.car_width,
            GLOBAL_CONFIG.car_height,
        );

        if let Some(expected) = track.checkpoints.get(self.checkpoint_index) {
            if car_rect.overlaps(expected) {
                if !self.on_checkpoint {
                    self.on_checkpoint = true;
                    self.checkpoint_index += 1;
                    log::debug!("checkpoint {} reached", self.checkpoint_index);
                }
            } else {
                self.on_checkpoint = false;
            }
        }

        let on_finish = car_rect.overlaps(&track.finish_line);
        if on_finish && !self.on_finish && self.checkpoint_index >= total {
            self.complete_lap();
        }
        self.on_finish = on_finish;

        if self.phase == RacePhase::Racing {
            self.check_hazards(track, car_rect);
        }
    }

    fn complete_lap(&mut self) {
        let lap_time = self.clock - self.lap_start;
        self.lap_count += 1;
        self.laps.push(lap_time);
        self.last_lap = Some(lap_time);
        if self.best_lap.map_or(true, |best| lap_time < best) {
            self.best_lap = Some(lap_time);
        }
        self.checkpoint_index = 0;
        self.lap_start = self.clock;
        log::info!("lap {} completed in {:.2}s", self.lap_count, lap_time);

        if self.lap_count >= self.max_laps {
            self.phase = RacePhase::Finished;
            self.total_time = self.laps.iter().sum();
            self.car.speed = 0.0;
            self.car.velocity = DVec2::ZERO;
            log::info!(
                "race finished in {:.2}s, best lap {:.2}s",
                self.total_time,
                self.best_lap.unwrap_or(lap_time)
            );
        }
    }

    fn check_hazards(&mut self, track: &Track, car_rect: Rect) {
        if let Some(until) = self.hazard_window_until {
            if self.clock < until {
                return;
            }
            self.hazard_window_until = None;
        }
        if track.hazards.iter().any(|hazard| car_rect.overlaps(hazard)) {
            self.car.position = track.start.position;
            self.car.heading = track.start.heading;
            self.car.speed = 0.0;
            self.car.velocity = DVec2::ZERO;
            self.hazard_window_until = Some(self.clock + GLOBAL_CONFIG.hazard_window_secs);
            log::info!("hazard hit, back to the start");
        }
    }

    /// Network id handed out by the relay.
    pub fn assign_id(&mut self, id: PlayerID) {
        self.car.id = id;
    }

    pub fn snapshot(&self) -> PlayerState {
        PlayerState {
            id: self.car.id,
            position: self.car.position,
            angle: self.car.heading,
            lap: self.lap_count,
            checkpoint_index: self.checkpoint_index as u32,
            finished: self.finished(),
            total_time: self.total_time,
        }
    }

    pub fn car(&self) -> &CarState {
        &self.car
    }

    pub fn phase(&self) -> RacePhase {
        self.phase
    }

    pub fn finished(&self) -> bool {
        self.phase == RacePhase::Finished
    }

    pub fn on_track(&self) -> bool {
        self.on_track
    }

    pub fn lap_count(&self) -> u32 {
        self.lap_count
    }

    pub fn max_laps(&self) -> u32 {
        self.max_laps
    }

    pub fn checkpoint_index(&self) -> usize {
        self.checkpoint_index
    }

    pub fn laps(&self) -> &[f64] {
        &self.laps
    }

    pub fn best_lap(&self) -> Option<f64> {
        self.best_lap
    }

    pub fn last_lap(&self) -> Option<f64> {
        self.last_lap
    }

    pub fn current_lap_elapsed(&self) -> f64 {
        self.clock - self.lap_start
    }

    /// Sum of all lap times, set once the race finishes.
    pub fn total_time(&self) -> f64 {
        self.total_time
    }

    pub fn clock(&self) -> f64 {
        self.clock
    }
}

#[cfg(test)]
impl RaceMachine {
    fn place_car(&mut self, position: DVec2) {
        self.car.position = position;
    }

    fn force_checkpoint_index(&mut self, index: usize) {
        self.checkpoint_index = index;
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;
    use crate::track::TrackGeometry;

    const DT: f64 = 1.0 / 60.0;

    // 200x200 fully drivable block with two checkpoints, a finish
    // line on the left and one hazard in the lower right corner.
    fn race_track() -> Track {
        Track {
            bounds: DVec2::new(200.0, 200.0),
            outer: vec![
                DVec2::new(10.0, 10.0),
                DVec2::new(190.0, 10.0),
                DVec2::new(190.0, 190.0),
                DVec2::new(10.0, 190.0),
            ],
            inner: vec![],
            checkpoints: vec![
                Rect::new(60.0, 20.0, 20.0, 20.0),
                Rect::new(120.0, 20.0, 20.0, 20.0),
            ],
            finish_line: Rect::new(20.0, 100.0, 20.0, 40.0),
            hazards: vec![Rect::new(160.0, 160.0, 10.0, 10.0)],
            start: Pose::new(DVec2::new(30.0, 30.0), 90.0),
        }
    }

    fn setup() -> (Track, TrackGeometry, RaceMachine) {
        let track = race_track();
        let geometry = TrackGeometry::build(&track);
        let machine = RaceMachine::new(track.start, 3);
        (track, geometry, machine)
    }

    fn idle(machine: &mut RaceMachine, track: &Track, geometry: &TrackGeometry) {
        machine.advance(TickInput::neutral(), track, geometry, DT);
    }

    fn checkpoint_center(track: &Track, index: usize) -> DVec2 {
        track.checkpoints[index].center()
    }

    /// Collect both checkpoints, then cross the finish line on a final
    /// step sized so the lap takes exactly `lap_seconds`.
    fn run_lap(
        machine: &mut RaceMachine,
        track: &Track,
        geometry: &TrackGeometry,
        lap_seconds: f64,
    ) {
        let gap = DVec2::new(100.0, 100.0);
        for index in 0..track.checkpoints.len() {
            machine.place_car(gap);
            idle(machine, track, geometry);
            machine.place_car(checkpoint_center(track, index));
            idle(machine, track, geometry);
        }
        machine.place_car(gap);
        idle(machine, track, geometry);

        let remaining = lap_seconds - machine.current_lap_elapsed();
        machine.place_car(track.finish_line.center());
        machine.advance(TickInput::neutral(), track, geometry, remaining);
    }

    #[test]
    fn straddled_checkpoint_advances_once() {
        let (track, geometry, mut machine) = setup();
        machine.place_car(checkpoint_center(&track, 0));
        for _ in 0..5 {
            idle(&mut machine, &track, &geometry);
        }
        assert_eq!(machine.checkpoint_index(), 1);
    }

    #[test]
    fn checkpoints_advance_only_in_order() {
        let (track, geometry, mut machine) = setup();
        machine.place_car(checkpoint_center(&track, 1));
        for _ in 0..3 {
            idle(&mut machine, &track, &geometry);
        }
        assert_eq!(machine.checkpoint_index(), 0);

        machine.place_car(checkpoint_center(&track, 0));
        idle(&mut machine, &track, &geometry);
        assert_eq!(machine.checkpoint_index(), 1);

        machine.place_car(DVec2::new(100.0, 100.0));
        idle(&mut machine, &track, &geometry);
        machine.place_car(checkpoint_center(&track, 1));
        idle(&mut machine, &track, &geometry);
        assert_eq!(machine.checkpoint_index(), 2);
    }

    #[test]
    fn finish_without_all_checkpoints_is_ignored() {
        let (track, geometry, mut machine) = setup();
        machine.place_car(track.finish_line.center());
        for _ in 0..5 {
            idle(&mut machine, &track, &geometry);
        }
        assert_eq!(machine.lap_count(), 0);
    }

    #[test]
    fn straddling_finish_counts_a_single_lap() {
        let (track, geometry, mut machine) = setup();
        run_lap(&mut machine, &track, &geometry, 10.0);
        assert_eq!(machine.lap_count(), 1);

        // still parked on the line: no further laps
        for _ in 0..5 {
            idle(&mut machine, &track, &geometry);
        }
        assert_eq!(machine.lap_count(), 1);
        assert_eq!(machine.checkpoint_index(), 0);
    }

    #[test]
    fn lap_times_track_best_and_last() {
        let (track, geometry, mut machine) = setup();
        run_lap(&mut machine, &track, &geometry, 12.3);
        run_lap(&mut machine, &track, &geometry, 9.8);
        assert_eq!(machine.lap_count(), 2);
        assert_abs_diff_eq!(machine.best_lap().unwrap(), 9.8, epsilon = 1e-9);
        assert_abs_diff_eq!(machine.last_lap().unwrap(), 9.8, epsilon = 1e-9);

        run_lap(&mut machine, &track, &geometry, 11.0);
        assert_abs_diff_eq!(machine.best_lap().unwrap(), 9.8, epsilon = 1e-9);
        assert_abs_diff_eq!(machine.last_lap().unwrap(), 11.0, epsilon = 1e-9);
        assert_eq!(machine.laps().len(), 3);
    }

    #[test]
    fn race_finishes_after_target_laps_and_freezes() {
        let (track, geometry, mut machine) = setup();
        run_lap(&mut machine, &track, &geometry, 12.3);
        run_lap(&mut machine, &track, &geometry, 9.8);
        run_lap(&mut machine, &track, &geometry, 11.0);

        assert_eq!(machine.phase(), RacePhase::Finished);
        assert!(machine.finished());
        assert_abs_diff_eq!(machine.total_time(), 33.1, epsilon = 1e-9);
        assert_eq!(machine.car().speed, 0.0);

        // terminal: nothing moves the car or the counters any more
        let parked = machine.car().position;
        machine.advance(TickInput::from_axes(1, 1), &track, &geometry, DT);
        assert_eq!(machine.car().position, parked);
        assert_eq!(machine.lap_count(), 3);
        assert_abs_diff_eq!(machine.total_time(), 33.1, epsilon = 1e-9);
    }

    #[test]
    fn hazard_resets_once_per_suppression_window() {
        let (track, geometry, mut machine) = setup();
        let hazard_center = track.hazards[0].center();

        machine.place_car(hazard_center);
        idle(&mut machine, &track, &geometry);
        assert!(machine.car().position.abs_diff_eq(track.start.position, 1e-9));
        assert_eq!(machine.car().heading, track.start.heading);
        assert_eq!(machine.car().speed, 0.0);

        // within the window the hazard is inert
        for _ in 0..5 {
            machine.place_car(hazard_center);
            idle(&mut machine, &track, &geometry);
            assert!(machine.car().position.abs_diff_eq(hazard_center, 1e-9));
        }

        // once the window lapses the same hazard fires again
        machine.place_car(hazard_center);
        machine.advance(TickInput::neutral(), &track, &geometry, 1.0);
        assert!(machine.car().position.abs_diff_eq(track.start.position, 1e-9));
    }

    #[test]
    fn hazard_reset_keeps_throttle_charge() {
        let (track, geometry, mut machine) = setup();
        for _ in 0..10 {
            machine.advance(TickInput::from_axes(0, 1), &track, &geometry, DT);
        }
        assert!(machine.car().charge > 0.0);

        machine.place_car(track.hazards[0].center());
        machine.advance(TickInput::from_axes(0, 1), &track, &geometry, DT);
        assert!(machine.car().position.abs_diff_eq(track.start.position, 1e-9));
        assert_eq!(machine.car().speed, 0.0);
        assert!(machine.car().charge > 0.0);
    }

    #[test]
    fn out_of_range_checkpoint_index_is_clamped() {
        let (track, geometry, mut machine) = setup();
        machine.force_checkpoint_index(9);
        idle(&mut machine, &track, &geometry);
        assert_eq!(machine.checkpoint_index(), track.checkpoints.len());

        // a clamped index still lets the finish line complete the lap
        machine.place_car(track.finish_line.center());
        idle(&mut machine, &track, &geometry);
        assert_eq!(machine.lap_count(), 1);
    }

    #[test]
    fn snapshot_mirrors_progress() {
        let (track, geometry, mut machine) = setup();
        machine.assign_id(7);
        machine.place_car(checkpoint_center(&track, 0));
        idle(&mut machine, &track, &geometry);

        let state = machine.snapshot();
        assert_eq!(state.id, 7);
        assert_eq!(state.lap, 0);
        assert_eq!(state.checkpoint_index, 1);
        assert!(!state.finished);
        assert_eq!(state.total_time, 0.0);
        assert!(state.position.abs_diff_eq(machine.car().position, 1e-9));
        assert_eq!(state.angle, machine.car().heading);
    }
}
