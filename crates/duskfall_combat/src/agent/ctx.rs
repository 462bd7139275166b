//! BrainCtx: per-tick контекст состояния агента
//!
//! Owned-снапшот (без borrow'ов в ECS): tick_brains собирает его из
//! компонентов, прогоняет через машину, пишет выходы (motor, visual,
//! defense, token slot) обратно и дренирует actions в events. Благодаря
//! этому Box<dyn State<..>> живёт в компоненте без lifetime-параметров.

use bevy::prelude::*;

use crate::arbiter::AttackTokenArbiter;
use crate::combat::DamageKind;
use crate::components::{AgentVisual, AttackSpec, CombatCaps, Defense, HitShape, StatBlock};
use crate::movement::Motor;
use crate::perception::{PerceptionSnapshot, ThreatSnapshot};

/// Вес separation-вектора при преследовании (crowd spacing)
pub const SEPARATION_WEIGHT: f32 = 0.6;

/// Дистанция "дошёл до точки" (метры)
pub const ARRIVE_EPSILON: f32 = 0.35;

/// Side effect, запрошенный состоянием на этом тике
///
/// Состояния не трогают чужие entity: эффекты дренируются tick_brains
/// в events и исполняются combat-pipeline'ом в том же тике.
#[derive(Debug, Clone)]
pub enum AgentAction {
    /// Один hit-resolution attempt (melee swing, backstab, beam)
    Hit {
        shape: HitShape,
        origin: Vec3,
        facing: Vec3,
        damage: u32,
        knockback: f32,
        kind: DamageKind,
    },
    /// Выстрел снарядом (burst-очередь, charged shot турели)
    FireProjectile {
        dir: Vec3,
        damage: u32,
        speed: f32,
        knockback: f32,
        max_range: f32,
    },
    /// Визуальный луч (урон уже ушёл отдельным Hit)
    FireBeam {
        dir: Vec3,
        range: f32,
        width: f32,
        duration: f32,
    },
    /// PhaseLock отработал — уведомить phase controller
    PhaseLockComplete,
    /// Полный сброс статов при возврате на spawn (pool-reset семантика)
    RestoreToSpawn,
    /// Stagger закончился — восстановить poise
    ResetPoise,
}

/// Контекст одного brain-тика
pub struct BrainCtx {
    pub entity: Entity,
    pub faction_id: u64,
    pub position: Vec3,
    pub spawn_point: Vec3,
    pub perception: PerceptionSnapshot,
    pub threat: ThreatSnapshot,
    pub stats: StatBlock,
    pub attack: Option<AttackSpec>,
    pub caps: CombatCaps,
    /// Crowd-separation вектор (посчитан до brain-тика)
    pub separation: Vec3,
    /// ±1 — направление кружения/сканирования, выбрано при спавне
    pub orbit_sign: f32,
    /// Tuning арбитра (дефолты в fail-open режиме)
    pub orbit_radius_multiplier: f32,
    pub orbit_speed: f32,
    pub arbiter: Option<AttackTokenArbiter>,
    pub token_held: bool,
    // Выходы тика (пишутся обратно в компоненты)
    pub motor: Motor,
    pub visual: AgentVisual,
    pub defense: Defense,
    pub actions: Vec<AgentAction>,
}

impl BrainCtx {
    pub fn facing(&self) -> Vec3 {
        self.motor.facing
    }

    /// Запрос токена у арбитра. Fail-open: без арбитра всегда granted
    /// (solo-тесты отдельного агента без глобальной системы).
    pub fn request_token(&mut self) -> bool {
        if self.token_held {
            return true;
        }
        let granted = match self.arbiter.as_ref() {
            Some(arbiter) => arbiter.request_token(self.entity),
            None => true,
        };
        if granted {
            self.token_held = true;
        }
        granted
    }

    /// Возврат токена; идемпотентен.
    pub fn return_token(&mut self) {
        if !self.token_held {
            return;
        }
        if let Some(arbiter) = self.arbiter.as_ref() {
            arbiter.return_token(self.entity);
        }
        self.token_held = false;
    }

    pub fn distance_to_spawn(&self) -> f32 {
        self.position.distance(self.spawn_point)
    }

    /// Агент ушёл от spawn дальше leash-радиуса
    pub fn leashed(&self) -> bool {
        self.distance_to_spawn() > self.stats.leash_range
    }

    /// Общий выход из pursuit-цепочки: цель потеряна ИЛИ leash превышен
    pub fn target_lost_or_leashed(&self) -> bool {
        !self.perception.has_target || self.leashed()
    }

    /// Нормализованное горизонтальное направление на точку
    pub fn dir_to(&self, point: Vec3) -> Vec3 {
        let to = point - self.position;
        Vec3::new(to.x, 0.0, to.z).normalize_or_zero()
    }

    /// Направление преследования: на last-known позицию, с подмешанной
    /// separation-силой (вес 0.6) чтобы агенты не слипались в столб.
    pub fn pursuit_dir(&self) -> Vec3 {
        let toward = self.dir_to(self.perception.last_known_position);
        (toward + self.separation * SEPARATION_WEIGHT).normalize_or_zero()
    }

    pub fn emit(&mut self, action: AgentAction) {
        self.actions.push(action);
    }
}
