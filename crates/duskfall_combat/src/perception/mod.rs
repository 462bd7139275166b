//! Perception: target sensing с memory decay
//!
//! Ядро не смотрит в мир напрямую — состояния читают derived-значения
//! (`has_target`, `distance_to_target`, `last_known_position`), пересчитанные
//! здесь в начале каждого тика. Line-of-sight — ответственность внешнего
//! sensor-слоя; headless-ядро считает видимым всё в detection-радиусе.

use bevy::prelude::*;

use crate::components::{Agent, Health, StatBlock};
use crate::movement::Motor;

/// Per-agent восприятие цели
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct Perception {
    /// Есть цель (живая детекция ЛИБО ещё не истёкшая память)
    pub has_target: bool,
    /// Entity цели (валиден пока has_target)
    pub target: Option<Entity>,
    /// Дистанция до цели; после потери детекции — до last_known_position
    pub distance_to_target: f32,
    /// Последняя известная позиция (живёт memory_duration после потери)
    pub last_known_position: Vec3,
    /// Текущая (или последняя известная) позиция цели
    pub target_position: Vec3,
    /// Facing цели (для backstab-проверки assassin'а)
    pub target_facing: Vec3,
    /// Остаток памяти после потери прямой детекции (секунды)
    memory_timer: f32,
}

impl Default for Perception {
    fn default() -> Self {
        Self {
            has_target: false,
            target: None,
            distance_to_target: f32::MAX,
            last_known_position: Vec3::ZERO,
            target_position: Vec3::ZERO,
            target_facing: Vec3::Z,
            memory_timer: 0.0,
        }
    }
}

impl Perception {
    /// Copy-снапшот для BrainCtx
    pub fn snapshot(&self) -> PerceptionSnapshot {
        PerceptionSnapshot {
            has_target: self.has_target,
            target: self.target,
            distance_to_target: self.distance_to_target,
            last_known_position: self.last_known_position,
            target_position: self.target_position,
            target_facing: self.target_facing,
        }
    }
}

/// Снапшот восприятия на один тик (owned, без borrow в ECS)
#[derive(Debug, Clone, Copy)]
pub struct PerceptionSnapshot {
    pub has_target: bool,
    pub target: Option<Entity>,
    pub distance_to_target: f32,
    pub last_known_position: Vec3,
    pub target_position: Vec3,
    pub target_facing: Vec3,
}

/// Внешний threat sensor (входящая угроза: замах врага, летящий снаряд)
///
/// Пишется снаружи (engine bridge / тесты); ядро только читает.
/// Потребляется reactive Dodge/Block состояниями.
#[derive(Component, Debug, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct ThreatSensor {
    pub detected: bool,
    pub direction: Vec3,
    pub position: Vec3,
}

impl Default for ThreatSensor {
    fn default() -> Self {
        Self {
            detected: false,
            direction: Vec3::Z,
            position: Vec3::ZERO,
        }
    }
}

/// Copy-снапшот threat sensor'а
#[derive(Debug, Clone, Copy)]
pub struct ThreatSnapshot {
    pub detected: bool,
    pub direction: Vec3,
    pub position: Vec3,
}

impl ThreatSensor {
    pub fn snapshot(&self) -> ThreatSnapshot {
        ThreatSnapshot {
            detected: self.detected,
            direction: self.direction,
            position: self.position,
        }
    }
}

/// Система: пересчёт Perception (выполняется ПЕРЕД brain-тиком)
///
/// Ближайший живой враг другой фракции в detection-радиусе. Потеря
/// детекции не сбрасывает цель сразу: last_known_position живёт
/// memory_duration, затем has_target гаснет.
pub fn update_perception(
    mut observers: Query<(Entity, &Agent, &Transform, &StatBlock, &mut Perception)>,
    targets: Query<(Entity, &Agent, &Transform, &Health, Option<&Motor>)>,
    time: Res<Time<Fixed>>,
) {
    let delta = time.delta_secs();

    for (observer, agent, transform, stats, mut perception) in observers.iter_mut() {
        let own_pos = transform.translation;

        // Ближайший живой враг в радиусе
        let mut nearest: Option<(Entity, f32, Vec3, Vec3)> = None;
        for (candidate, other, other_transform, health, motor) in targets.iter() {
            if candidate == observer || other.faction_id == agent.faction_id {
                continue;
            }
            if !health.is_alive() {
                continue;
            }

            let distance = own_pos.distance(other_transform.translation);
            if distance > stats.detection_range {
                continue;
            }

            let better = match nearest {
                Some((_, best, _, _)) => distance < best,
                None => true,
            };
            if better {
                let facing = motor.map(|m| m.facing).unwrap_or(Vec3::Z);
                nearest = Some((candidate, distance, other_transform.translation, facing));
            }
        }

        match nearest {
            Some((target, distance, position, facing)) => {
                // Прямая детекция: память обновляется
                perception.has_target = true;
                perception.target = Some(target);
                perception.distance_to_target = distance;
                perception.last_known_position = position;
                perception.target_position = position;
                perception.target_facing = facing;
                perception.memory_timer = stats.memory_duration;
            }
            None => {
                // Детекция потеряна: доживаем на памяти
                if perception.has_target {
                    perception.memory_timer -= delta;
                    if perception.memory_timer <= 0.0 {
                        perception.has_target = false;
                        perception.target = None;
                        perception.distance_to_target = f32::MAX;
                    } else {
                        perception.target_position = perception.last_known_position;
                        perception.distance_to_target =
                            own_pos.distance(perception.last_known_position);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_has_no_target() {
        let perception = Perception::default();
        assert!(!perception.has_target);
        assert!(perception.target.is_none());
    }

    #[test]
    fn test_memory_countdown_logic() {
        // Потеря детекции: has_target гаснет только после memory_duration
        let mut perception = Perception {
            has_target: true,
            target: Some(Entity::PLACEHOLDER),
            memory_timer: 1.0,
            ..Default::default()
        };

        perception.memory_timer -= 0.5;
        assert!(perception.memory_timer > 0.0); // память ещё жива

        perception.memory_timer -= 0.6;
        assert!(perception.memory_timer <= 0.0); // истекла
    }

    #[test]
    fn test_snapshot_copies_fields() {
        let perception = Perception {
            has_target: true,
            distance_to_target: 4.2,
            last_known_position: Vec3::new(1.0, 0.0, 2.0),
            ..Default::default()
        };
        let snap = perception.snapshot();
        assert!(snap.has_target);
        assert_eq!(snap.distance_to_target, 4.2);
        assert_eq!(snap.last_known_position, Vec3::new(1.0, 0.0, 2.0));
    }
}
