//! Car kinematics for the fixed-step simulation.

use glam::DVec2;

use crate::geometry::Pose;
use crate::{PlayerID, GLOBAL_CONFIG};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Steering {
    Left,
    Straight,
    Right,
}

impl Steering {
    /// Sign applied to the turn rate; positive steers left.
    pub fn axis(self) -> f64 {
        match self {
            Steering::Left => 1.0,
            Steering::Straight => 0.0,
            Steering::Right => -1.0,
        }
    }

    pub fn from_axis(value: i8) -> Steering {
        match value.signum() {
            1 => Steering::Left,
            -1 => Steering::Right,
            _ => Steering::Straight,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Throttle {
    Accelerating,
    Coasting,
    Braking,
}

impl Throttle {
    pub fn from_axis(value: i8) -> Throttle {
        match value.signum() {
            1 => Throttle::Accelerating,
            -1 => Throttle::Braking,
            _ => Throttle::Coasting,
        }
    }
}

/// Player intent for a single simulation step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TickInput {
    pub steering: Steering,
    pub throttle: Throttle,
}

impl TickInput {
    pub fn new(steering: Steering, throttle: Throttle) -> TickInput {
        TickInput { steering, throttle }
    }

    pub fn neutral() -> TickInput {
        TickInput {
            steering: Steering::Straight,
            throttle: Throttle::Coasting,
        }
    }

    pub fn from_axes(steer: i8, throttle: i8) -> TickInput {
        TickInput {
            steering: Steering::from_axis(steer),
            throttle: Throttle::from_axis(throttle),
        }
    }
}

impl Default for TickInput {
    fn default() -> TickInput {
        TickInput::neutral()
    }
}

/// Kinematic state of one car. Heading is in degrees; 0 points down
/// the vertical axis and 90 along the horizontal one. Race progress
/// bookkeeping lives in [`crate::race::RaceMachine`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CarState {
    pub id: PlayerID,
    pub position: DVec2,
    pub velocity: DVec2,
    pub heading: f64,
    pub speed: f64,
    /// Seconds the current throttle direction has been held.
    pub charge: f64,
}

impl CarState {
    pub fn at(pose: Pose) -> CarState {
        CarState {
            id: 0,
            position: pose.position,
            velocity: DVec2::ZERO,
            heading: pose.heading,
            speed: 0.0,
            charge: 0.0,
        }
    }

    /// One integrator step: steer, apply the charge-ramped throttle,
    /// apply surface drag, then move and clamp to the arena.
    ///
    /// The throttle step grows with the held-charge timer up to its
    /// ramp cap, so a long press bites harder than a tap. Releasing
    /// the throttle resets the charge and adds idle friction on top of
    /// the surface drag.
    pub fn step(&self, input: TickInput, on_track: bool, dt: f64, bounds: DVec2) -> CarState {
        let heading = self.heading + GLOBAL_CONFIG.turn_rate * dt * input.steering.axis();

        let (mut speed, charge) = match input.throttle {
            Throttle::Accelerating => {
                let charge = self.charge + dt;
                let gain = GLOBAL_CONFIG.base_accel * charge.min(GLOBAL_CONFIG.accel_ramp_secs);
                ((self.speed + gain).min(GLOBAL_CONFIG.max_speed), charge)
            }
            Throttle::Braking => {
                let charge = self.charge + dt;
                let loss = GLOBAL_CONFIG.base_accel * charge.min(GLOBAL_CONFIG.brake_ramp_secs);
                let floor = -GLOBAL_CONFIG.max_speed / GLOBAL_CONFIG.reverse_speed_divisor;
                ((self.speed - loss).max(floor), charge)
            }
            Throttle::Coasting => (
                self.speed * (1.0 - GLOBAL_CONFIG.friction * GLOBAL_CONFIG.idle_friction_factor),
                0.0,
            ),
        };

        speed *= if on_track {
            1.0 - GLOBAL_CONFIG.friction
        } else {
            1.0 - GLOBAL_CONFIG.friction - GLOBAL_CONFIG.grass_penalty
        };

        let (sin, cos) = heading.to_radians().sin_cos();
        let velocity = DVec2::new(sin, cos) * speed;
        let position = (self.position + velocity).clamp(DVec2::ZERO, bounds);

        CarState {
            id: self.id,
            position,
            velocity,
            heading,
            speed,
            charge,
        }
    }
}
