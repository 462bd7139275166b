//! Movement-примитив ядра: intent-компонент + применение в FixedUpdate
//!
//! Архитектура:
//! - Состояния пишут Motor (high-level intent: куда и с каким множителем)
//! - apply_motor интегрирует intent в Transform на XZ-плоскости
//! - Separation считается отдельной системой ДО brain-тика, состояния
//!   подмешивают её в pursuit (crowd spacing)
//!
//! Knockback — внешний импульс от урона, затухает экспоненциально и
//! действует даже на замороженных (Freeze) агентов.

use bevy::prelude::*;

use crate::components::{Agent, Dead, StatBlock};

/// Радиус взаимного расталкивания агентов (метры)
const SEPARATION_RADIUS: f32 = 1.6;

/// Затухание knockback-импульса (1/sec)
const KNOCKBACK_DAMPING: f32 = 6.0;

/// Команда движения на текущий тик
#[derive(Debug, Clone, Copy, PartialEq, Reflect)]
pub enum MotorCmd {
    /// Стоять (без сброса остаточного knockback)
    Idle,
    /// Двигаться по направлению со множителем скорости
    Move { dir: Vec3, speed_scale: f32 },
    /// Немедленная остановка (сбрасывает и knockback)
    Stop,
    /// Движение заморожено (commitment: telegraph/recovery)
    Freeze,
}

/// Движок агента: intent + facing + внешний импульс
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct Motor {
    pub cmd: MotorCmd,
    /// Нормализованный горизонтальный facing
    pub facing: Vec3,
    /// Остаточный knockback (m/s), затухает в apply_motor
    pub knockback: Vec3,
}

impl Default for Motor {
    fn default() -> Self {
        Self {
            cmd: MotorCmd::Idle,
            facing: Vec3::Z,
            knockback: Vec3::ZERO,
        }
    }
}

impl Motor {
    /// Двигаться в направлении с базовой скоростью
    pub fn move_toward(&mut self, dir: Vec3) {
        self.move_at(dir, 1.0);
    }

    /// Двигаться в направлении со множителем скорости
    pub fn move_at(&mut self, dir: Vec3, speed_scale: f32) {
        self.cmd = MotorCmd::Move { dir, speed_scale };
        let flat = Vec3::new(dir.x, 0.0, dir.z);
        if flat.length_squared() > 1e-6 {
            self.facing = flat.normalize();
        }
    }

    pub fn stop(&mut self) {
        self.cmd = MotorCmd::Stop;
        self.knockback = Vec3::ZERO;
    }

    pub fn freeze(&mut self) {
        self.cmd = MotorCmd::Freeze;
    }

    /// Развернуться без движения (Block, turret tracking)
    pub fn face(&mut self, dir: Vec3) {
        let flat = Vec3::new(dir.x, 0.0, dir.z);
        if flat.length_squared() > 1e-6 {
            self.facing = flat.normalize();
        }
    }

    pub fn shove(&mut self, impulse: Vec3) {
        self.knockback += Vec3::new(impulse.x, 0.0, impulse.z);
    }
}

/// Crowd-separation вектор (пересчитывается каждый тик до brain'ов)
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct SeparationForce(pub Vec3);

/// Система: попарное расталкивание агентов
///
/// Вес вклада линейно растёт к нулю дистанции; итоговый вектор НЕ
/// нормализуется — чем плотнее толпа, тем сильнее выталкивание.
pub fn compute_separation(
    mut agents: Query<(Entity, &Transform, &mut SeparationForce), (With<Agent>, Without<Dead>)>,
) {
    let positions: Vec<(Entity, Vec3)> = agents
        .iter()
        .map(|(entity, transform, _)| (entity, transform.translation))
        .collect();

    for (entity, transform, mut separation) in agents.iter_mut() {
        let mut push = Vec3::ZERO;

        for (other, other_pos) in &positions {
            if *other == entity {
                continue;
            }

            let away = transform.translation - *other_pos;
            let distance = away.length();

            if distance < SEPARATION_RADIUS && distance > 0.01 {
                let weight = (SEPARATION_RADIUS - distance) / SEPARATION_RADIUS;
                push += away.normalize() * weight;
            }
        }

        separation.0 = Vec3::new(push.x, 0.0, push.z);
    }
}

/// Система: применение Motor intent к Transform (XZ-плоскость)
pub fn apply_motor(
    mut movers: Query<(&mut Motor, &StatBlock, &mut Transform), Without<Dead>>,
    time: Res<Time<Fixed>>,
) {
    let delta = time.delta_secs();

    for (mut motor, stats, mut transform) in movers.iter_mut() {
        match motor.cmd {
            MotorCmd::Move { dir, speed_scale } => {
                let flat = Vec3::new(dir.x, 0.0, dir.z);
                if flat.length_squared() > 1e-6 {
                    transform.translation +=
                        flat.normalize() * stats.move_speed * speed_scale * delta;
                }
            }
            MotorCmd::Idle | MotorCmd::Stop | MotorCmd::Freeze => {}
        }

        // Knockback действует всегда (и на Freeze) и затухает
        if motor.knockback.length_squared() > 1e-4 {
            transform.translation += motor.knockback * delta;
            let damping = (1.0 - KNOCKBACK_DAMPING * delta).max(0.0);
            motor.knockback *= damping;
        } else {
            motor.knockback = Vec3::ZERO;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_move_updates_facing() {
        let mut motor = Motor::default();
        motor.move_toward(Vec3::new(1.0, 0.0, 0.0));

        assert_eq!(motor.facing, Vec3::X);
        assert!(matches!(motor.cmd, MotorCmd::Move { .. }));
    }

    #[test]
    fn test_zero_direction_keeps_facing() {
        let mut motor = Motor::default();
        motor.move_toward(Vec3::X);
        motor.move_toward(Vec3::ZERO);

        // Facing не сбрасывается нулевым направлением
        assert_eq!(motor.facing, Vec3::X);
    }

    #[test]
    fn test_stop_clears_knockback() {
        let mut motor = Motor::default();
        motor.shove(Vec3::new(3.0, 0.0, 0.0));
        assert!(motor.knockback.length() > 0.0);

        motor.stop();
        assert_eq!(motor.knockback, Vec3::ZERO);
    }

    #[test]
    fn test_shove_is_horizontal() {
        let mut motor = Motor::default();
        motor.shove(Vec3::new(1.0, 5.0, 1.0));
        assert_eq!(motor.knockback.y, 0.0);
    }
}
