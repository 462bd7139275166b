//! Стационарная турель: Scan → Lock → Fire → Cooldown
//!
//! Турель не двигается, не orbits и не участвует в token-арбитраже —
//! admission control ограничивает СХОДЯЩУЮСЯ толпу, а не эмплейсменты.

use bevy::prelude::*;

use crate::agent::ctx::{AgentAction, BrainCtx};
use crate::agent::states::StateId;
use crate::combat::DamageKind;
use crate::components::{AttackProfile, CueColor, HitShape};
use crate::fsm::State;
use crate::movement::MotorCmd;

/// Scan: метём facing по кругу пока perception не зацепит цель
pub struct ScanState;

impl State<StateId, BrainCtx> for ScanState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        ctx.motor.cmd = MotorCmd::Idle;
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        if ctx.perception.has_target {
            return Some(StateId::Lock);
        }

        // Равномерный разворот вокруг Y (направление выбрано при спавне)
        let angle = ctx.stats.scan_turn_rate * dt * ctx.orbit_sign;
        let rotated = Quat::from_rotation_y(angle) * ctx.facing();
        ctx.motor.face(rotated);
        None
    }
}

/// Lock: ведём цель, горит aim-индикатор, по истечении — выбор атаки и Fire
pub struct LockState {
    timer: f32,
}

impl LockState {
    pub fn new() -> Self {
        Self { timer: 0.0 }
    }
}

impl State<StateId, BrainCtx> for LockState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        self.timer = ctx.stats.lock_duration;
        ctx.visual.aim_indicator = true;
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        if !ctx.perception.has_target {
            return Some(StateId::Scan);
        }

        // Трекинг цели
        ctx.motor.face(ctx.dir_to(ctx.perception.target_position));

        self.timer -= dt;
        if self.timer <= 0.0 {
            // Атака выбирается здесь (beam при Beam-spec, иначе charged shot) —
            // сам выстрел исполняет TurretFire
            return Some(StateId::TurretFire);
        }
        None
    }

    fn on_exit(&mut self, ctx: &mut BrainCtx) {
        ctx.visual.aim_indicator = false;
    }
}

/// Fire: laser-duration beam либо одиночный charged projectile
pub struct TurretFireState {
    timer: f32,
}

impl TurretFireState {
    pub fn new() -> Self {
        Self { timer: 0.0 }
    }
}

impl State<StateId, BrainCtx> for TurretFireState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        let profile = AttackProfile::resolve(ctx.attack.as_ref(), &ctx.stats);
        let dir = ctx.dir_to(ctx.perception.target_position);

        match profile.shape {
            HitShape::Beam {
                range,
                width,
                duration,
            } => {
                // Урон один раз через resolver; beam-entity — только визуал
                ctx.emit(AgentAction::Hit {
                    shape: profile.shape,
                    origin: ctx.position,
                    facing: dir,
                    damage: profile.damage,
                    knockback: profile.knockback,
                    kind: DamageKind::Beam,
                });
                ctx.emit(AgentAction::FireBeam {
                    dir,
                    range,
                    width,
                    duration,
                });
                self.timer = duration;
            }
            _ => {
                // Charged projectile: один мощный выстрел
                ctx.emit(AgentAction::FireProjectile {
                    dir,
                    damage: profile.damage,
                    speed: ctx.stats.projectile_speed.max(8.0),
                    knockback: profile.knockback,
                    max_range: ctx.stats.attack_range * 1.5,
                });
                self.timer = 0.1;
            }
        }

        ctx.visual.cue = Some(CueColor::LOCK_AMBER);
    }

    fn on_update(&mut self, _ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        self.timer -= dt;
        if self.timer <= 0.0 {
            return Some(StateId::Cooldown);
        }
        None
    }

    fn on_exit(&mut self, ctx: &mut BrainCtx) {
        ctx.visual.cue = None;
    }
}

/// Cooldown: пережидаем fire_cooldown, дальше Lock (цель видна) или Scan
pub struct CooldownState {
    timer: f32,
}

impl CooldownState {
    pub fn new() -> Self {
        Self { timer: 0.0 }
    }
}

impl State<StateId, BrainCtx> for CooldownState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        self.timer = ctx.stats.fire_cooldown;
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        self.timer -= dt;
        if self.timer <= 0.0 {
            return if ctx.perception.has_target {
                Some(StateId::Lock)
            } else {
                Some(StateId::Scan)
            };
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::components::{AgentVisual, AttackSpec, CombatCaps, Defense, StatBlock};
    use crate::movement::Motor;
    use crate::perception::{Perception, ThreatSensor};

    fn turret_ctx(has_target: bool, attack: Option<AttackSpec>) -> BrainCtx {
        let mut perception = Perception::default();
        if has_target {
            perception.has_target = true;
            perception.distance_to_target = 10.0;
            perception.target_position = Vec3::new(0.0, 0.0, 10.0);
        }

        BrainCtx {
            entity: Entity::PLACEHOLDER,
            faction_id: 1,
            position: Vec3::ZERO,
            spawn_point: Vec3::ZERO,
            perception: perception.snapshot(),
            threat: ThreatSensor::default().snapshot(),
            stats: StatBlock::turret(),
            attack,
            caps: CombatCaps::turret(),
            separation: Vec3::ZERO,
            orbit_sign: 1.0,
            orbit_radius_multiplier: 1.8,
            orbit_speed: 1.1,
            arbiter: None,
            token_held: false,
            motor: Motor::default(),
            visual: AgentVisual::default(),
            defense: Defense::default(),
            actions: Vec::new(),
        }
    }

    fn beam_spec() -> AttackSpec {
        AttackSpec {
            telegraph_duration: 0.0,
            active_duration: 0.0,
            recovery_duration: 0.0,
            damage: 18,
            knockback: 2.0,
            shape: HitShape::Beam {
                range: 15.0,
                width: 0.6,
                duration: 0.4,
            },
            cue: CueColor::LOCK_AMBER,
        }
    }

    #[test]
    fn test_scan_sweeps_until_target() {
        let mut ctx = turret_ctx(false, None);
        let mut scan = ScanState;
        scan.on_enter(&mut ctx);

        let before = ctx.facing();
        assert_eq!(scan.on_update(&mut ctx, 0.5), None);
        // Facing повернулся
        assert!(ctx.facing().dot(before) < 0.999);

        ctx.perception.has_target = true;
        assert_eq!(scan.on_update(&mut ctx, 0.05), Some(StateId::Lock));
    }

    #[test]
    fn test_lock_tracks_then_fires() {
        let mut ctx = turret_ctx(true, None);
        let mut lock = LockState::new();
        lock.on_enter(&mut ctx);
        assert!(ctx.visual.aim_indicator);

        let mut result = None;
        for _ in 0..20 {
            result = lock.on_update(&mut ctx, 0.05);
            if result.is_some() {
                break;
            }
        }
        assert_eq!(result, Some(StateId::TurretFire));
        // Смотрим на цель
        assert!(ctx.facing().dot(Vec3::Z) > 0.99);
    }

    #[test]
    fn test_lock_loses_target_back_to_scan() {
        let mut ctx = turret_ctx(true, None);
        let mut lock = LockState::new();
        lock.on_enter(&mut ctx);

        ctx.perception.has_target = false;
        assert_eq!(lock.on_update(&mut ctx, 0.05), Some(StateId::Scan));
    }

    #[test]
    fn test_fire_beam_emits_hit_and_visual() {
        let mut ctx = turret_ctx(true, Some(beam_spec()));
        let mut fire = TurretFireState::new();
        fire.on_enter(&mut ctx);

        let beams = ctx
            .actions
            .iter()
            .filter(|a| matches!(a, AgentAction::FireBeam { .. }))
            .count();
        let hits = ctx
            .actions
            .iter()
            .filter(|a| matches!(a, AgentAction::Hit { .. }))
            .count();
        assert_eq!(beams, 1);
        assert_eq!(hits, 1); // урон луча идёт через hit-resolution

        // Fire длится duration луча, затем Cooldown
        let mut result = None;
        for _ in 0..20 {
            result = fire.on_update(&mut ctx, 0.05);
            if result.is_some() {
                break;
            }
        }
        assert_eq!(result, Some(StateId::Cooldown));
    }

    #[test]
    fn test_fire_without_spec_is_charged_projectile() {
        let mut ctx = turret_ctx(true, None);
        let mut fire = TurretFireState::new();
        fire.on_enter(&mut ctx);

        let shots = ctx
            .actions
            .iter()
            .filter(|a| matches!(a, AgentAction::FireProjectile { .. }))
            .count();
        assert_eq!(shots, 1);
    }

    #[test]
    fn test_cooldown_routes_by_visibility() {
        let mut ctx = turret_ctx(true, None);
        let mut cooldown = CooldownState::new();
        cooldown.on_enter(&mut ctx);

        let mut result = None;
        for _ in 0..100 {
            result = cooldown.on_update(&mut ctx, 0.05);
            if result.is_some() {
                break;
            }
        }
        assert_eq!(result, Some(StateId::Lock)); // цель видна → снова Lock

        // Без цели — обратно в Scan
        let mut ctx = turret_ctx(false, None);
        let mut cooldown = CooldownState::new();
        cooldown.on_enter(&mut ctx);
        let mut result = None;
        for _ in 0..100 {
            result = cooldown.on_update(&mut ctx, 0.05);
            if result.is_some() {
                break;
            }
        }
        assert_eq!(result, Some(StateId::Scan));
    }
}
