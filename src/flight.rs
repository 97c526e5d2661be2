//! Flight controller for one projectile motion phase.
//!
//! Straight, accelerating, parabolic-arc and homing behaviour compose freely:
//! each `update` integrates speed, optionally steers toward the target with a
//! turn-rate limit, and adds the arc's vertical rate on top of the straight
//! displacement. Collision is checked against the position *before* moving.

use crate::components::ActorId;
use crate::config::FlyToTargetParams;
use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Sampling window of the legacy arc derivative (seconds).
pub const LEGACY_ARC_WINDOW: f32 = 0.016;

/// Squared-distance hit threshold used when `collision_radius <= 0`.
pub const FALLBACK_HIT_DISTANCE_SQ: f32 = 0.01;

/// Directions shorter than this fall back to +X.
const MIN_DIRECTION_LEN: f32 = 0.001;

/// How the arc's vertical rate is sampled each tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ArcSampling {
    /// Backward difference over [`LEGACY_ARC_WINDOW`], regardless of tick length.
    #[default]
    FixedWindow,
    /// Backward difference over the actual tick `dt`; the arc lands at height 0.
    TickDelta,
}

/// Where a flight phase is heading. The unit, when resolvable, wins over
/// the static position.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FlightTarget {
    pub unit: Option<ActorId>,
    pub position: Option<Vec3>,
}

impl FlightTarget {
    pub fn position(position: Vec3) -> Self {
        Self { unit: None, position: Some(position) }
    }

    pub fn unit(unit: ActorId) -> Self {
        Self { unit: Some(unit), position: None }
    }
}

/// Immutable parameters of one flight phase.
#[derive(Debug, Clone, PartialEq)]
pub struct FlightConfig {
    pub target: FlightTarget,
    pub speed: f32,
    pub acceleration: f32,
    pub max_speed: Option<f32>,
    /// Apex height of the parabola; 0 flies straight.
    pub arc: f32,
    pub homing: bool,
    /// Degrees per second.
    pub turn_rate: f32,
    pub collision_radius: f32,
    pub stop_on_hit: bool,
    pub arc_sampling: ArcSampling,
}

impl FlightConfig {
    /// Straight shot at constant speed toward a fixed point.
    pub fn straight(target: Vec3, speed: f32) -> Self {
        Self {
            target: FlightTarget::position(target),
            speed,
            acceleration: 0.0,
            max_speed: None,
            arc: 0.0,
            homing: false,
            turn_rate: 180.0,
            collision_radius: 0.1,
            stop_on_hit: true,
            arc_sampling: ArcSampling::default(),
        }
    }

    pub fn from_params(params: &FlyToTargetParams, target: FlightTarget) -> Self {
        Self {
            target,
            speed: params.speed,
            acceleration: params.acceleration,
            max_speed: params.max_speed,
            arc: params.arc,
            homing: params.homing,
            turn_rate: params.homing_rate,
            collision_radius: params.collision_radius,
            stop_on_hit: params.stop_on_hit,
            arc_sampling: params.arc_sampling,
        }
    }
}

/// Looks up the live position of a tracked unit.
pub type TargetResolver = Box<dyn Fn(ActorId) -> Option<Vec3> + Send + Sync>;

/// Why a flight phase stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightEnd {
    Hit,
    TargetLost,
    /// The controller had already stopped before this update.
    Inactive,
}

/// Result of one controller update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FlightStep {
    Moved(Vec3),
    Ended(FlightEnd),
}

impl FlightStep {
    pub fn displacement(&self) -> Option<Vec3> {
        match self {
            FlightStep::Moved(d) => Some(*d),
            FlightStep::Ended(_) => None,
        }
    }
}

#[derive(Debug, Clone)]
struct FlightState {
    speed: f32,
    direction: Vec3,
    start: Vec3,
    total_distance: f32,
    traveled: f32,
    active: bool,
}

pub struct FlightController {
    config: FlightConfig,
    state: FlightState,
    resolver: TargetResolver,
}

impl std::fmt::Debug for FlightController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FlightController")
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl FlightController {
    /// Callers must make sure the config has a resolvable target.
    pub fn new(config: FlightConfig, start: Vec3, resolver: TargetResolver) -> Self {
        let mut controller = Self {
            state: FlightState {
                speed: config.speed,
                direction: Vec3::X,
                start,
                total_distance: 0.0,
                traveled: 0.0,
                active: true,
            },
            config,
            resolver,
        };
        if let Some(target) = controller.resolve_target() {
            controller.state.direction = direction_between(start, target);
            controller.state.total_distance = start.distance(target);
        }
        controller
    }

    /// Controller for a static target; unit references never resolve.
    pub fn with_static_target(config: FlightConfig, start: Vec3) -> Self {
        Self::new(config, start, Box::new(|_| None))
    }

    /// Advance the phase by `dt` seconds from `position`.
    pub fn update(&mut self, position: Vec3, dt: f32) -> FlightStep {
        if !self.state.active {
            return FlightStep::Ended(FlightEnd::Inactive);
        }

        let Some(target) = self.resolve_target() else {
            self.state.active = false;
            return FlightStep::Ended(FlightEnd::TargetLost);
        };

        if self.collides(position, target) {
            self.state.active = false;
            return FlightStep::Ended(FlightEnd::Hit);
        }

        self.integrate_speed(dt);
        let step = self.state.speed * dt;
        self.state.traveled += step;

        if self.config.homing {
            self.steer(position, target, dt);
        }

        let mut displacement = self.state.direction * step;
        if self.config.arc != 0.0 {
            displacement.y += self.arc_rate(dt) * dt;
        }
        FlightStep::Moved(displacement)
    }

    pub fn is_active(&self) -> bool {
        self.state.active
    }

    pub fn stop_on_hit(&self) -> bool {
        self.config.stop_on_hit
    }

    pub fn config(&self) -> &FlightConfig {
        &self.config
    }

    pub fn speed(&self) -> f32 {
        self.state.speed
    }

    pub fn direction(&self) -> Vec3 {
        self.state.direction
    }

    pub fn start_position(&self) -> Vec3 {
        self.state.start
    }

    pub fn total_distance(&self) -> f32 {
        self.state.total_distance
    }

    pub fn traveled_distance(&self) -> f32 {
        self.state.traveled
    }

    /// Current target position, if any.
    pub fn target_position(&self) -> Option<Vec3> {
        self.resolve_target()
    }

    fn resolve_target(&self) -> Option<Vec3> {
        if let Some(unit) = self.config.target.unit {
            if let Some(pos) = (self.resolver)(unit) {
                return Some(pos);
            }
        }
        self.config.target.position
    }

    fn collides(&self, position: Vec3, target: Vec3) -> bool {
        if self.config.collision_radius <= 0.0 {
            return position.distance_squared(target) <= FALLBACK_HIT_DISTANCE_SQ;
        }
        position.distance(target) <= self.config.collision_radius
    }

    fn integrate_speed(&mut self, dt: f32) {
        self.state.speed += self.config.acceleration * dt;
        if let Some(max) = self.config.max_speed {
            self.state.speed = self.state.speed.min(max);
        }
    }

    fn steer(&mut self, position: Vec3, target: Vec3, dt: f32) {
        let desired = direction_between(position, target);
        let max_turn = self.config.turn_rate.to_radians() * dt;
        let angle = self.state.direction.dot(desired).clamp(-1.0, 1.0).acos();

        if angle <= max_turn {
            self.state.direction = desired;
        } else {
            let t = max_turn / angle;
            let blended = self.state.direction.lerp(desired, t);
            self.state.direction = blended.try_normalize().unwrap_or(Vec3::X);
        }
    }

    /// Vertical velocity contributed by the arc at the current progress.
    fn arc_rate(&self, dt: f32) -> f32 {
        let total = self.state.total_distance;
        if total <= 0.0 {
            return 0.0;
        }
        let window = match self.config.arc_sampling {
            ArcSampling::FixedWindow => LEGACY_ARC_WINDOW,
            ArcSampling::TickDelta => dt,
        };
        if window <= 0.0 {
            return 0.0;
        }

        let progress = (self.state.traveled / total).clamp(0.0, 1.0);
        let previous = ((self.state.traveled - self.state.speed * window) / total).clamp(0.0, 1.0);
        (arc_height(self.config.arc, progress) - arc_height(self.config.arc, previous)) / window
    }
}

/// Height of the parabola at `progress` in [0, 1]; peaks at `arc` halfway.
pub fn arc_height(arc: f32, progress: f32) -> f32 {
    4.0 * arc * progress * (1.0 - progress)
}

fn direction_between(from: Vec3, to: Vec3) -> Vec3 {
    let delta = to - from;
    let len = delta.length();
    if len < MIN_DIRECTION_LEN {
        return Vec3::X;
    }
    delta / len
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    const DT: f32 = 1.0 / 30.0;

    fn tracked(target: Arc<Mutex<Vec3>>) -> TargetResolver {
        Box::new(move |_| target.lock().ok().map(|p| *p))
    }

    #[test]
    fn test_straight_shot_scenario() {
        let config = FlightConfig::straight(Vec3::new(10.0, 0.0, 0.0), 10.0);
        let mut flight = FlightController::with_static_target(config, Vec3::ZERO);
        let mut pos = Vec3::ZERO;

        for _ in 0..30 {
            match flight.update(pos, DT) {
                FlightStep::Moved(d) => pos += d,
                other => panic!("ended early: {:?}", other),
            }
        }
        assert!((flight.traveled_distance() - 10.0).abs() <= 0.01);
        assert!((pos.x - 10.0).abs() <= 0.01);

        assert_eq!(flight.update(pos, DT), FlightStep::Ended(FlightEnd::Hit));
        assert!(!flight.is_active());
        assert_eq!(flight.update(pos, DT), FlightStep::Ended(FlightEnd::Inactive));
    }

    #[test]
    fn test_constant_speed_without_acceleration() {
        let config = FlightConfig::straight(Vec3::new(1000.0, 0.0, 0.0), 7.5);
        let mut flight = FlightController::with_static_target(config, Vec3::ZERO);
        let mut pos = Vec3::ZERO;
        for _ in 0..50 {
            let d = flight.update(pos, DT).displacement().unwrap();
            assert!((d.length() - 7.5 * DT).abs() < 1e-5);
            assert_eq!(flight.speed(), 7.5);
            pos += d;
        }
    }

    #[test]
    fn test_acceleration_clamped_to_max_speed() {
        let mut config = FlightConfig::straight(Vec3::new(1000.0, 0.0, 0.0), 2.0);
        config.acceleration = 30.0;
        config.max_speed = Some(4.0);
        let mut flight = FlightController::with_static_target(config, Vec3::ZERO);

        flight.update(Vec3::ZERO, DT);
        assert!((flight.speed() - 3.0).abs() < 1e-5);
        for _ in 0..10 {
            flight.update(Vec3::ZERO, DT);
        }
        assert_eq!(flight.speed(), 4.0);
    }

    #[test]
    fn test_no_arc_means_no_vertical_motion() {
        let config = FlightConfig::straight(Vec3::new(10.0, 0.0, 4.0), 6.0);
        let mut flight = FlightController::with_static_target(config, Vec3::ZERO);
        let mut pos = Vec3::ZERO;
        while let FlightStep::Moved(d) = flight.update(pos, DT) {
            assert_eq!(d.y, 0.0);
            pos += d;
        }
    }

    #[test]
    fn test_arc_rises_then_lands_with_tick_sampling() {
        let mut config = FlightConfig::straight(Vec3::new(10.0, 0.0, 0.0), 10.0);
        config.arc = 2.0;
        config.arc_sampling = ArcSampling::TickDelta;
        let mut flight = FlightController::with_static_target(config, Vec3::ZERO);
        let mut pos = Vec3::ZERO;
        let mut apex: f32 = 0.0;

        for _ in 0..30 {
            pos += flight.update(pos, DT).displacement().unwrap();
            apex = apex.max(pos.y);
        }
        assert!((apex - 2.0).abs() < 0.01, "apex was {}", apex);
        assert!(pos.y.abs() < 0.01, "landed at height {}", pos.y);
    }

    #[test]
    fn test_arc_fixed_window_goes_up_first() {
        let mut config = FlightConfig::straight(Vec3::new(10.0, 0.0, 0.0), 10.0);
        config.arc = 2.0;
        let mut flight = FlightController::with_static_target(config, Vec3::ZERO);
        let d = flight.update(Vec3::ZERO, DT).displacement().unwrap();
        assert!(d.y > 0.0);
    }

    #[test]
    fn test_collision_boundary_is_inclusive() {
        let mut config = FlightConfig::straight(Vec3::new(10.0, 0.0, 0.0), 1.0);
        config.collision_radius = 0.5;
        let mut flight = FlightController::with_static_target(config, Vec3::ZERO);
        assert_eq!(
            flight.update(Vec3::new(9.5, 0.0, 0.0), DT),
            FlightStep::Ended(FlightEnd::Hit)
        );
    }

    #[test]
    fn test_zero_radius_uses_fallback_threshold() {
        let mut config = FlightConfig::straight(Vec3::new(10.0, 0.0, 0.0), 1.0);
        config.collision_radius = 0.0;
        let mut flight = FlightController::with_static_target(config, Vec3::ZERO);
        assert!(matches!(flight.update(Vec3::new(9.8, 0.0, 0.0), DT), FlightStep::Moved(_)));
        assert_eq!(
            flight.update(Vec3::new(9.95, 0.0, 0.0), DT),
            FlightStep::Ended(FlightEnd::Hit)
        );
    }

    #[test]
    fn test_lost_unit_without_fallback_ends_flight() {
        let target = Arc::new(Mutex::new(Vec3::new(5.0, 0.0, 0.0)));
        let alive = Arc::new(Mutex::new(true));
        let resolver: TargetResolver = {
            let target = Arc::clone(&target);
            let alive = Arc::clone(&alive);
            Box::new(move |_| {
                let alive = alive.lock().map(|a| *a).unwrap_or(false);
                alive.then(|| target.lock().map(|p| *p).unwrap_or(Vec3::ZERO))
            })
        };
        let mut config = FlightConfig::straight(Vec3::ZERO, 1.0);
        config.target = FlightTarget::unit(ActorId(3));
        let mut flight = FlightController::new(config, Vec3::ZERO, resolver);
        assert!(matches!(flight.update(Vec3::ZERO, DT), FlightStep::Moved(_)));

        *alive.lock().unwrap() = false;
        assert_eq!(flight.update(Vec3::ZERO, DT), FlightStep::Ended(FlightEnd::TargetLost));
    }

    #[test]
    fn test_unit_target_takes_priority_over_static() {
        let target = Arc::new(Mutex::new(Vec3::new(0.0, 0.0, 8.0)));
        let mut config = FlightConfig::straight(Vec3::new(8.0, 0.0, 0.0), 1.0);
        config.target.unit = Some(ActorId(1));
        let flight = FlightController::new(config, Vec3::ZERO, tracked(target));
        assert!((flight.direction() - Vec3::Z).length() < 1e-6);
        assert!((flight.total_distance() - 8.0).abs() < 1e-6);
    }

    #[test]
    fn test_homing_keeps_unit_direction() {
        let target = Arc::new(Mutex::new(Vec3::new(20.0, 0.0, 0.0)));
        let mut config = FlightConfig::straight(Vec3::ZERO, 8.0);
        config.target = FlightTarget::unit(ActorId(1));
        config.homing = true;
        config.turn_rate = 120.0;
        let mut flight = FlightController::new(config, Vec3::ZERO, tracked(Arc::clone(&target)));
        let mut pos = Vec3::ZERO;

        for i in 0..120 {
            let angle = i as f32 * 0.1;
            *target.lock().unwrap() = Vec3::new(20.0 * angle.cos(), 3.0, 20.0 * angle.sin());
            match flight.update(pos, DT) {
                FlightStep::Moved(d) => pos += d,
                FlightStep::Ended(_) => break,
            }
            assert!((flight.direction().length() - 1.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_homing_turn_is_rate_limited() {
        let target = Arc::new(Mutex::new(Vec3::new(10.0, 0.0, 0.0)));
        let mut config = FlightConfig::straight(Vec3::ZERO, 1.0);
        config.target = FlightTarget::unit(ActorId(1));
        config.homing = true;
        config.turn_rate = 90.0;
        let mut flight = FlightController::new(config, Vec3::ZERO, tracked(Arc::clone(&target)));
        let max_turn = 90f32.to_radians() * DT;
        assert!((max_turn - 0.05236).abs() < 1e-4);

        for teleport in [Vec3::new(-10.0, 0.0, 0.0), Vec3::new(0.0, 0.0, 10.0), Vec3::new(3.0, 4.0, -6.0)] {
            let before = flight.direction();
            *target.lock().unwrap() = teleport;
            flight.update(Vec3::ZERO, DT);
            let turned = before.dot(flight.direction()).clamp(-1.0, 1.0).acos();
            assert!(turned <= max_turn + 1e-4, "turned {} > {}", turned, max_turn);
        }
    }

    #[test]
    fn test_homing_snaps_within_turn_budget() {
        let target = Arc::new(Mutex::new(Vec3::new(10.0, 0.0, 0.0)));
        let mut config = FlightConfig::straight(Vec3::ZERO, 1.0);
        config.target = FlightTarget::unit(ActorId(1));
        config.homing = true;
        config.turn_rate = 180.0;
        let mut flight = FlightController::new(config, Vec3::ZERO, tracked(Arc::clone(&target)));

        *target.lock().unwrap() = Vec3::new(10.0, 0.0, 0.1);
        flight.update(Vec3::ZERO, DT);
        let expected = Vec3::new(10.0, 0.0, 0.1).normalize();
        assert!((flight.direction() - expected).length() < 1e-6);
    }

    #[test]
    fn test_non_homing_direction_is_fixed() {
        let target = Arc::new(Mutex::new(Vec3::new(10.0, 0.0, 0.0)));
        let mut config = FlightConfig::straight(Vec3::ZERO, 1.0);
        config.target = FlightTarget::unit(ActorId(1));
        let mut flight = FlightController::new(config, Vec3::ZERO, tracked(Arc::clone(&target)));

        *target.lock().unwrap() = Vec3::new(0.0, 0.0, 10.0);
        let d = flight.update(Vec3::ZERO, DT).displacement().unwrap();
        assert!(d.z.abs() < 1e-6);
        assert_eq!(flight.direction(), Vec3::X);
    }
}
