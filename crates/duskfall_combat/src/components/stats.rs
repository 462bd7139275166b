//! Неизменяемый tuning агента: StatBlock + AttackSpec
//!
//! Architecture Decision:
//! - Один unified `StatBlock` на все архетипы (melee / ranged / turret / assassin)
//! - `AttackSpec` — data-driven описание одной атаки (опциональный компонент)
//! - Legacy-путь: если AttackSpec не назначен, плоские поля StatBlock
//!   поставляют те же данные (круглый hitbox)
//!
//! Rationale:
//! - Единый источник истины для tuning data
//! - Оба пути (spec / legacy) сводятся в AttackProfile в ОДНОМ месте,
//!   дальше по pipeline разницы нет
//!
//! Trade-offs:
//! - Unused поля (turret не использует volley_*, melee не использует
//!   projectile_speed). Acceptable: несколько f32 полей на агента.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Цвет telegraph-подсветки (читается presentation-слоем)
#[derive(Debug, Clone, Copy, PartialEq, Reflect, Serialize, Deserialize)]
pub struct CueColor {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl CueColor {
    pub const WARNING_RED: Self = Self { r: 1.0, g: 0.2, b: 0.15 };
    pub const LOCK_AMBER: Self = Self { r: 1.0, g: 0.65, b: 0.0 };
    pub const STRIKE_VIOLET: Self = Self { r: 0.7, g: 0.2, b: 1.0 };
}

/// Геометрия hit-запроса
///
/// `offset` — смещение origin вдоль facing (метры). Beam используется
/// турелью: duration — время жизни визуального луча, урон применяется
/// один раз при выстреле.
#[derive(Debug, Clone, Copy, PartialEq, Reflect, Serialize, Deserialize)]
pub enum HitShape {
    Circle {
        radius: f32,
        offset: f32,
    },
    Cone {
        radius: f32,
        /// Полу-угол раствора (радианы), inclusive на границе
        half_angle: f32,
        offset: f32,
    },
    Beam {
        range: f32,
        width: f32,
        duration: f32,
    },
}

/// Data-driven описание одной атаки (immutable на lifetime агента)
#[derive(Component, Debug, Clone, Reflect, Serialize, Deserialize)]
pub struct AttackSpec {
    pub telegraph_duration: f32,
    pub active_duration: f32,
    pub recovery_duration: f32,
    pub damage: u32,
    pub knockback: f32,
    pub shape: HitShape,
    pub cue: CueColor,
}

/// Разрешённый attack-профиль: AttackSpec либо legacy-плоские поля StatBlock
///
/// Единственная точка где схлопывается дуальность путей — оба обязаны
/// вести себя дальше идентично.
#[derive(Debug, Clone)]
pub struct AttackProfile {
    pub telegraph: f32,
    pub active: f32,
    pub recovery: f32,
    pub damage: u32,
    pub knockback: f32,
    pub shape: HitShape,
    pub cue: CueColor,
}

impl AttackProfile {
    pub fn resolve(spec: Option<&AttackSpec>, stats: &StatBlock) -> Self {
        match spec {
            Some(spec) => Self {
                telegraph: spec.telegraph_duration,
                active: spec.active_duration,
                recovery: spec.recovery_duration,
                damage: spec.damage,
                knockback: spec.knockback,
                shape: spec.shape,
                cue: spec.cue,
            },
            // Legacy fallback: плоские поля, всегда круглый hitbox
            None => Self {
                telegraph: stats.telegraph_duration,
                active: stats.active_duration,
                recovery: stats.recovery_duration,
                damage: stats.attack_damage,
                knockback: stats.attack_knockback,
                shape: HitShape::Circle {
                    radius: stats.attack_radius,
                    offset: stats.attack_offset,
                },
                cue: CueColor::WARNING_RED,
            },
        }
    }

    pub fn total_commitment(&self) -> f32 {
        self.telegraph + self.active + self.recovery
    }
}

/// Unified stat block (все архетипы)
#[derive(Component, Debug, Clone, Reflect, Serialize, Deserialize)]
#[reflect(Component)]
pub struct StatBlock {
    // === Движение / восприятие ===
    /// Скорость движения (m/s)
    pub move_speed: f32,
    /// Радиус обнаружения цели (метры)
    pub detection_range: f32,
    /// Память о потерянной цели (секунды)
    pub memory_duration: f32,

    // === Дистанции ===
    pub attack_range: f32,
    /// Ranged: комфортная дистанция стрельбы
    pub preferred_range: f32,
    /// Ranged: игрок ближе → Retreat
    pub retreat_range: f32,
    /// Дальше этого от spawn — бросаем преследование
    pub leash_range: f32,

    // === Token-арбитраж ===
    /// Интервал опроса RequestToken из Orbit/Flank (секунды, не каждый тик)
    pub token_poll_interval: f32,

    // === Legacy flat attack (когда AttackSpec не назначен) ===
    pub attack_damage: u32,
    pub attack_knockback: f32,
    pub telegraph_duration: f32,
    pub active_duration: f32,
    pub recovery_duration: f32,
    pub attack_radius: f32,
    pub attack_offset: f32,

    // === Ranged burst ===
    pub volley_count: u32,
    /// Суб-интервал между выстрелами внутри Firing (секунды)
    pub volley_interval: f32,
    pub projectile_speed: f32,

    // === Reactive ===
    pub stagger_duration: f32,
    pub flee_duration: f32,
    pub flee_speed_mult: f32,
    pub dodge_duration: f32,
    pub dodge_speed_mult: f32,
    pub block_duration: f32,
    /// Доля проходящего урона при блоке (0.3 = режем 70%)
    pub block_damage_scale: f32,
    /// Минимальный интервал между Dodge/Block реакциями (секунды)
    pub reaction_cooldown: f32,
    pub phase_lock_duration: f32,

    // === Assassin ===
    pub stealth_opacity: f32,
    pub reveal_duration: f32,
    pub commit_duration: f32,
    pub disengage_duration: f32,
    pub disengage_speed_mult: f32,
    pub disengage_range: f32,
    /// Точка захода — настолько позади цели (метры)
    pub flank_offset: f32,
    /// dot(target_facing, to_agent) МЕНЬШЕ этого → агент "за спиной"
    pub behind_dot_threshold: f32,

    // === Turret ===
    /// Скорость разворота при Scan (rad/s)
    pub scan_turn_rate: f32,
    pub lock_duration: f32,
    pub fire_cooldown: f32,
}

impl Default for StatBlock {
    fn default() -> Self {
        Self::melee_grunt()
    }
}

impl StatBlock {
    /// Melee bruiser — базовый наземный боец
    pub fn melee_grunt() -> Self {
        Self {
            move_speed: 3.5,
            detection_range: 12.0,
            memory_duration: 3.0,
            attack_range: 1.8,
            preferred_range: 1.8,
            retreat_range: 0.0,
            leash_range: 20.0,
            token_poll_interval: 0.4,
            attack_damage: 15,
            attack_knockback: 4.0,
            telegraph_duration: 0.3,
            active_duration: 0.15,
            recovery_duration: 0.8,
            attack_radius: 1.2,
            attack_offset: 1.0,
            volley_count: 0,
            volley_interval: 0.0,
            projectile_speed: 0.0,
            stagger_duration: 1.2,
            flee_duration: 2.5,
            flee_speed_mult: 1.4,
            dodge_duration: 0.25,
            dodge_speed_mult: 3.0,
            block_duration: 0.8,
            block_damage_scale: 0.3,
            reaction_cooldown: 1.5,
            phase_lock_duration: 2.0,
            stealth_opacity: 0.35,
            reveal_duration: 0.2,
            commit_duration: 0.3,
            disengage_duration: 1.0,
            disengage_speed_mult: 2.2,
            disengage_range: 7.0,
            flank_offset: 1.5,
            behind_dot_threshold: -0.3,
            scan_turn_rate: 1.2,
            lock_duration: 0.6,
            fire_cooldown: 1.5,
        }
    }

    /// Ranged gunner — burst fire с дистанции
    pub fn gunner() -> Self {
        Self {
            move_speed: 3.0,
            detection_range: 16.0,
            memory_duration: 3.0,
            attack_range: 12.0,
            preferred_range: 9.0,
            retreat_range: 5.0,
            leash_range: 25.0,
            telegraph_duration: 0.4,
            active_duration: 0.9,
            recovery_duration: 0.6,
            attack_damage: 6,
            attack_knockback: 1.0,
            volley_count: 3,
            volley_interval: 0.25,
            projectile_speed: 14.0,
            ..Self::melee_grunt()
        }
    }

    /// Стационарная турель
    pub fn turret() -> Self {
        Self {
            move_speed: 0.0,
            detection_range: 18.0,
            attack_range: 15.0,
            leash_range: f32::MAX, // не двигается — leash не применим
            attack_damage: 12,
            fire_cooldown: 2.0,
            lock_duration: 0.6,
            scan_turn_rate: 1.2,
            ..Self::melee_grunt()
        }
    }

    /// Assassin — stealth backstab
    pub fn assassin() -> Self {
        Self {
            move_speed: 4.2,
            detection_range: 14.0,
            attack_range: 1.6,
            leash_range: 30.0,
            attack_damage: 30,
            attack_knockback: 2.0,
            telegraph_duration: 0.15,
            active_duration: 0.1,
            recovery_duration: 0.4,
            ..Self::melee_grunt()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_from_spec() {
        let spec = AttackSpec {
            telegraph_duration: 0.5,
            active_duration: 0.2,
            recovery_duration: 1.0,
            damage: 40,
            knockback: 6.0,
            shape: HitShape::Cone {
                radius: 2.0,
                half_angle: 0.9,
                offset: 0.5,
            },
            cue: CueColor::STRIKE_VIOLET,
        };
        let stats = StatBlock::melee_grunt();

        let profile = AttackProfile::resolve(Some(&spec), &stats);
        assert_eq!(profile.damage, 40);
        assert!(matches!(profile.shape, HitShape::Cone { .. }));
        assert_eq!(profile.total_commitment(), 1.7);
    }

    #[test]
    fn test_profile_legacy_fallback_is_circle() {
        let stats = StatBlock::melee_grunt();
        let profile = AttackProfile::resolve(None, &stats);

        assert_eq!(profile.damage, stats.attack_damage);
        assert_eq!(profile.telegraph, stats.telegraph_duration);
        match profile.shape {
            HitShape::Circle { radius, offset } => {
                assert_eq!(radius, stats.attack_radius);
                assert_eq!(offset, stats.attack_offset);
            }
            other => panic!("legacy path must be a circle, got {:?}", other),
        }
    }

    #[test]
    fn test_commitment_sum_matches_both_paths() {
        // Telegraph + Active + Recovery == total, для spec- и legacy-пути
        let stats = StatBlock::melee_grunt();
        let legacy = AttackProfile::resolve(None, &stats);
        let expected =
            stats.telegraph_duration + stats.active_duration + stats.recovery_duration;
        assert!((legacy.total_commitment() - expected).abs() < f32::EPSILON);
    }
}
