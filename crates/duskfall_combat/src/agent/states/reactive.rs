//! Reactive-состояния: прерывают любой outer-цикл
//!
//! Триггеры оценивает interrupt-шаг в tick_brains (до тика машины):
//! - Stagger — poise сломан
//! - Flee — fear пересёк порог
//! - Dodge/Block — threat sensor + соответствующая capability
//! - PhaseLock — внешнее форс-событие (boss phase controller)
//!
//! По завершении возвращаются в fallback (Chase/Idle — либо Scan/Lock и
//! Stealth для стационарных/stealth архетипов).

use crate::agent::ctx::{AgentAction, BrainCtx};
use crate::agent::states::{fallback_state, StateId};
use crate::fsm::State;

/// Stagger: poise сломан — обездвижен, трясётся, потом poise reset
pub struct StaggerState {
    timer: f32,
}

impl StaggerState {
    pub fn new() -> Self {
        Self { timer: 0.0 }
    }
}

impl State<StateId, BrainCtx> for StaggerState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        self.timer = ctx.stats.stagger_duration;
        ctx.motor.freeze(); // Freeze, не Stop: knockback продолжает толкать
        ctx.visual.shake = true;
        crate::log(&format!("💫 {:?} staggered (poise broken)", ctx.entity));
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        self.timer -= dt;
        if self.timer <= 0.0 {
            ctx.emit(AgentAction::ResetPoise);
            return Some(fallback_state(&ctx.caps, &ctx.perception));
        }
        None
    }

    fn on_exit(&mut self, ctx: &mut BrainCtx) {
        ctx.visual.shake = false;
    }
}

/// Flee: паника — бег прочь от угрозы с множителем скорости
pub struct FleeState {
    timer: f32,
}

impl FleeState {
    pub fn new() -> Self {
        Self { timer: 0.0 }
    }

    fn exit_state(ctx: &BrainCtx) -> StateId {
        // Stealth-архетип восстанавливается в Stealth, остальные — домой
        if ctx.caps.has_stealth {
            StateId::Stealth
        } else {
            StateId::Return
        }
    }
}

impl State<StateId, BrainCtx> for FleeState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        // Сначала вернуть токен (паникующий не занимает attack-слот),
        // затем бежать. Sweep это тоже гарантирует, но здесь — явный
        // порядок из контракта Flee.
        ctx.return_token();
        self.timer = ctx.stats.flee_duration;
        crate::log(&format!("😱 {:?} fleeing (fear threshold)", ctx.entity));
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        self.timer -= dt;

        // Фиксированная длительность ИЛИ вышли за leash — хватит бежать
        if self.timer <= 0.0 || ctx.leashed() {
            return Some(Self::exit_state(ctx));
        }

        // Прочь от источника угрозы (threat точнее, иначе от цели)
        let from = if ctx.threat.detected {
            ctx.threat.position
        } else {
            ctx.perception.target_position
        };
        let away = -ctx.dir_to(from);
        ctx.motor.move_at(away, ctx.stats.flee_speed_mult);
        None
    }
}

/// Dodge: короткий перпендикулярный рывок от входящей угрозы
pub struct DodgeState {
    timer: f32,
    dash_dir: bevy::prelude::Vec3,
}

impl DodgeState {
    pub fn new() -> Self {
        Self {
            timer: 0.0,
            dash_dir: bevy::prelude::Vec3::X,
        }
    }
}

impl State<StateId, BrainCtx> for DodgeState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        use bevy::prelude::Vec3;

        self.timer = ctx.stats.dodge_duration;
        // Перпендикуляр к направлению угрозы; сторона — spawn-time знак
        let threat_dir = if ctx.threat.detected {
            ctx.threat.direction
        } else {
            ctx.dir_to(ctx.perception.target_position)
        };
        let flat = Vec3::new(threat_dir.x, 0.0, threat_dir.z).normalize_or_zero();
        self.dash_dir = Vec3::Y.cross(flat) * ctx.orbit_sign;
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        self.timer -= dt;
        if self.timer <= 0.0 {
            return Some(fallback_state(&ctx.caps, &ctx.perception));
        }
        ctx.motor.move_at(self.dash_dir, ctx.stats.dodge_speed_mult);
        None
    }
}

/// Block: развернуться к угрозе и резать входящий урон
pub struct BlockState {
    timer: f32,
}

impl BlockState {
    pub fn new() -> Self {
        Self { timer: 0.0 }
    }
}

impl State<StateId, BrainCtx> for BlockState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        self.timer = ctx.stats.block_duration;
        ctx.motor.cmd = crate::movement::MotorCmd::Idle;
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        self.timer -= dt;

        // Угроза прошла или длительность вышла
        if self.timer <= 0.0 || !ctx.threat.detected {
            return Some(fallback_state(&ctx.caps, &ctx.perception));
        }

        // Лицом к угрозе; Defense сбрасывается в нейтраль каждый тик,
        // поэтому гейт переутверждаем здесь
        ctx.motor.face(ctx.dir_to(ctx.threat.position));
        ctx.defense.damage_scale = ctx.stats.block_damage_scale;
        None
    }
}

/// PhaseLock: форс-состояние смены фазы босса
///
/// Неуязвим, заморожен, пульсирует цветом; по истечении уведомляет
/// phase controller и возвращается в бой.
pub struct PhaseLockState {
    timer: f32,
}

impl PhaseLockState {
    pub fn new() -> Self {
        Self { timer: 0.0 }
    }
}

impl State<StateId, BrainCtx> for PhaseLockState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        self.timer = ctx.stats.phase_lock_duration;
        ctx.motor.freeze();
        ctx.visual.pulse = true;
        crate::log_info(&format!("🌀 {:?} phase transition lock", ctx.entity));
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        // Переутверждаем каждый тик (Defense нейтралится при сборке ctx)
        ctx.defense.invulnerable = true;

        self.timer -= dt;
        if self.timer <= 0.0 {
            ctx.emit(AgentAction::PhaseLockComplete);
            return Some(fallback_state(&ctx.caps, &ctx.perception));
        }
        None
    }

    fn on_exit(&mut self, ctx: &mut BrainCtx) {
        ctx.visual.pulse = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::prelude::*;
    use crate::components::{AgentVisual, CombatCaps, Defense, StatBlock};
    use crate::movement::{Motor, MotorCmd};
    use crate::perception::{Perception, ThreatSensor};

    fn reactive_ctx() -> BrainCtx {
        let mut perception = Perception::default();
        perception.has_target = true;
        perception.target_position = Vec3::new(0.0, 0.0, 5.0);
        perception.last_known_position = perception.target_position;
        perception.distance_to_target = 5.0;

        BrainCtx {
            entity: Entity::PLACEHOLDER,
            faction_id: 1,
            position: Vec3::ZERO,
            spawn_point: Vec3::ZERO,
            perception: perception.snapshot(),
            threat: ThreatSensor::default().snapshot(),
            stats: StatBlock::melee_grunt(),
            attack: None,
            caps: CombatCaps::melee(),
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

    #[test]
    fn test_stagger_freezes_then_resets_poise() {
        let mut ctx = reactive_ctx();
        let mut stagger = StaggerState::new();
        stagger.on_enter(&mut ctx);

        assert_eq!(ctx.motor.cmd, MotorCmd::Freeze);
        assert!(ctx.visual.shake);

        let mut result = None;
        for _ in 0..40 {
            result = stagger.on_update(&mut ctx, 0.05);
            if result.is_some() {
                break;
            }
        }

        assert_eq!(result, Some(StateId::Chase)); // цель есть → Chase
        assert!(ctx
            .actions
            .iter()
            .any(|a| matches!(a, AgentAction::ResetPoise)));
        stagger.on_exit(&mut ctx);
        assert!(!ctx.visual.shake);
    }

    #[test]
    fn test_flee_returns_token_on_entry() {
        let mut ctx = reactive_ctx();
        ctx.token_held = true;

        let mut flee = FleeState::new();
        flee.on_enter(&mut ctx);
        assert!(!ctx.token_held); // токен возвращён ДО бегства

        // Бежим прочь от цели
        flee.on_update(&mut ctx, 0.05);
        match ctx.motor.cmd {
            MotorCmd::Move { dir, speed_scale } => {
                assert!(dir.z < 0.0); // цель на +Z → бег на −Z
                assert_eq!(speed_scale, ctx.stats.flee_speed_mult);
            }
            other => panic!("flee must run, got {:?}", other),
        }
    }

    #[test]
    fn test_flee_exits_past_leash() {
        let mut ctx = reactive_ctx();
        ctx.position = Vec3::new(0.0, 0.0, -(ctx.stats.leash_range + 1.0));

        let mut flee = FleeState::new();
        flee.on_enter(&mut ctx);
        assert_eq!(flee.on_update(&mut ctx, 0.05), Some(StateId::Return));
    }

    #[test]
    fn test_dodge_dash_is_perpendicular() {
        let mut ctx = reactive_ctx();
        ctx.threat.detected = true;
        ctx.threat.direction = Vec3::Z;

        let mut dodge = DodgeState::new();
        dodge.on_enter(&mut ctx);
        dodge.on_update(&mut ctx, 0.05);

        match ctx.motor.cmd {
            MotorCmd::Move { dir, .. } => {
                // Перпендикулярен угрозе
                assert!(dir.dot(Vec3::Z).abs() < 1e-4);
                assert!(dir.length() > 0.9);
            }
            other => panic!("dodge must dash, got {:?}", other),
        }
    }

    #[test]
    fn test_block_gates_damage_while_threat_lasts() {
        let mut ctx = reactive_ctx();
        ctx.threat.detected = true;
        ctx.threat.position = Vec3::new(0.0, 0.0, 3.0);

        let mut block = BlockState::new();
        block.on_enter(&mut ctx);

        assert_eq!(block.on_update(&mut ctx, 0.05), None);
        assert_eq!(ctx.defense.damage_scale, ctx.stats.block_damage_scale);

        // Угроза прошла → выходим
        ctx.threat.detected = false;
        assert_eq!(block.on_update(&mut ctx, 0.05), Some(StateId::Chase));
    }

    #[test]
    fn test_phase_lock_invulnerable_then_notifies() {
        let mut ctx = reactive_ctx();
        let mut lock = PhaseLockState::new();
        lock.on_enter(&mut ctx);
        assert!(ctx.visual.pulse);

        let mut result = None;
        for _ in 0..60 {
            result = lock.on_update(&mut ctx, 0.05);
            assert!(ctx.defense.invulnerable);
            if result.is_some() {
                break;
            }
        }

        assert_eq!(result, Some(StateId::Chase));
        assert!(ctx
            .actions
            .iter()
            .any(|a| matches!(a, AgentAction::PhaseLockComplete)));
    }
}
