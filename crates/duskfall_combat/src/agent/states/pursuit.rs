//! Pursuit-цепочка: Idle → Chase → (Engage/Shoot | Orbit) → Return

use bevy::prelude::*;

use crate::agent::ctx::{BrainCtx, AgentAction, ARRIVE_EPSILON};
use crate::agent::states::{commitment_range, commitment_state, StateId};
use crate::fsm::State;
use crate::movement::MotorCmd;

/// Idle: стоим на spawn, ждём цель
pub struct IdleState;

impl State<StateId, BrainCtx> for IdleState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        ctx.motor.cmd = MotorCmd::Idle;
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, _dt: f32) -> Option<StateId> {
        if ctx.perception.has_target {
            return Some(StateId::Chase);
        }
        None
    }
}

/// Chase: преследование last-known позиции с crowd-separation
///
/// В радиусе commitment'а → запрос токена: granted → Engage/Shoot,
/// denied → Orbit (кружим и ждём слот).
pub struct ChaseState;

impl State<StateId, BrainCtx> for ChaseState {
    fn on_update(&mut self, ctx: &mut BrainCtx, _dt: f32) -> Option<StateId> {
        if ctx.target_lost_or_leashed() {
            return Some(StateId::Return);
        }

        if ctx.perception.distance_to_target <= commitment_range(ctx) {
            ctx.motor.cmd = MotorCmd::Idle;
            if ctx.request_token() {
                return Some(commitment_state(ctx));
            }
            return Some(StateId::Orbit);
        }

        let dir = ctx.pursuit_dir();
        ctx.motor.move_toward(dir);
        None
    }
}

/// Orbit: standoff-кольцо вокруг цели, throttled-опрос токена
///
/// Не-атакующие агенты кружат на attack_range × OrbitRadiusMultiplier и
/// опрашивают арбитра раз в token_poll_interval, НЕ каждый тик — иначе
/// арбитраж на больших популяциях превращается в спам.
pub struct OrbitState {
    poll_timer: f32,
}

impl OrbitState {
    pub fn new() -> Self {
        Self { poll_timer: 0.0 }
    }
}

impl State<StateId, BrainCtx> for OrbitState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        // Первый запрос уже был (отказ в Chase) — ждём полный интервал
        self.poll_timer = ctx.stats.token_poll_interval;
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        if ctx.target_lost_or_leashed() {
            return Some(StateId::Return);
        }

        // Кружение: тангенс по кольцу + радиальная коррекция к ring-радиусу
        let ring_radius = ctx.stats.attack_range * ctx.orbit_radius_multiplier;
        let radial = ctx.position - ctx.perception.target_position;
        let flat_radial = Vec3::new(radial.x, 0.0, radial.z);
        let distance = flat_radial.length();

        if distance > 0.01 {
            let outward = flat_radial / distance;
            let tangent = Vec3::Y.cross(outward) * ctx.orbit_sign;
            let correction = outward * (ring_radius - distance) * 0.5;
            let dir = (tangent + correction).normalize_or_zero();
            ctx.motor.move_at(dir, ctx.orbit_speed);
            // Кружим боком, но смотрим на цель
            ctx.motor.face(-outward);
        }

        // Throttled-опрос арбитра
        self.poll_timer -= dt;
        if self.poll_timer <= 0.0 {
            self.poll_timer = ctx.stats.token_poll_interval;
            if ctx.request_token() {
                return Some(commitment_state(ctx));
            }
        }

        None
    }
}

/// Return: идём на spawn, на месте — полный сброс статов и Idle
pub struct ReturnState;

impl State<StateId, BrainCtx> for ReturnState {
    fn on_update(&mut self, ctx: &mut BrainCtx, _dt: f32) -> Option<StateId> {
        // Переагрились по дороге — снова в бой
        if ctx.perception.has_target && !ctx.leashed() {
            return Some(StateId::Chase);
        }

        if ctx.distance_to_spawn() <= ARRIVE_EPSILON {
            ctx.motor.stop();
            ctx.emit(AgentAction::RestoreToSpawn);
            return Some(StateId::Idle);
        }

        let dir = ctx.dir_to(ctx.spawn_point);
        ctx.motor.move_toward(dir);
        None
    }
}
