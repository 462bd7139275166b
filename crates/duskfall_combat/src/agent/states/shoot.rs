//! Shoot/Retreat: ranged commitment (burst fire) + отскок от близкого игрока
//!
//! Shoot — commitment БЕЗ вложенной машины: плоский phase enum
//! (Telegraph → Firing → Recovery), как в источнике. Firing выпускает
//! volley_count снарядов с шагом volley_interval; игрок ближе retreat_range
//! прерывает В ЛЮБОЙ фазе — остаток очереди сгорает.

use crate::agent::ctx::{AgentAction, BrainCtx};
use crate::agent::states::StateId;
use crate::components::CueColor;
use crate::fsm::State;
use crate::movement::MotorCmd;

/// Фазы ranged-commitment'а (плоский enum, не вложенная машина)
#[derive(Debug, Clone, Copy, PartialEq)]
enum ShootPhase {
    Telegraph { timer: f32 },
    Firing { shots_left: u32, shot_timer: f32 },
    Recovery { timer: f32 },
}

pub struct ShootState {
    phase: ShootPhase,
}

impl ShootState {
    pub fn new() -> Self {
        Self {
            phase: ShootPhase::Telegraph { timer: 0.0 },
        }
    }
}

impl State<StateId, BrainCtx> for ShootState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        self.phase = ShootPhase::Telegraph {
            timer: ctx.stats.telegraph_duration,
        };
        ctx.motor.freeze();
        ctx.visual.cue = Some(CueColor::WARNING_RED);
        // Стоим и целимся в текущую позицию цели
        let dir = ctx.dir_to(ctx.perception.target_position);
        ctx.motor.face(dir);
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        if ctx.target_lost_or_leashed() {
            return Some(StateId::Return);
        }

        // Игрок поджимает — Retreat из ЛЮБОЙ фазы, независимо от остатка очереди
        if ctx.perception.distance_to_target < ctx.stats.retreat_range {
            return Some(StateId::Retreat);
        }

        ctx.motor.face(ctx.dir_to(ctx.perception.target_position));

        self.phase = match self.phase {
            ShootPhase::Telegraph { timer } => {
                let timer = timer - dt;
                if timer <= 0.0 {
                    ctx.visual.cue = None;
                    ShootPhase::Firing {
                        shots_left: ctx.stats.volley_count,
                        shot_timer: 0.0, // первый выстрел сразу
                    }
                } else {
                    ShootPhase::Telegraph { timer }
                }
            }

            ShootPhase::Firing {
                shots_left,
                shot_timer,
            } => {
                let shot_timer = shot_timer - dt;
                if shots_left == 0 {
                    ShootPhase::Recovery {
                        timer: ctx.stats.recovery_duration,
                    }
                } else if shot_timer <= 0.0 {
                    let dir = ctx.dir_to(ctx.perception.target_position);
                    ctx.emit(AgentAction::FireProjectile {
                        dir,
                        damage: ctx.stats.attack_damage,
                        speed: ctx.stats.projectile_speed,
                        knockback: ctx.stats.attack_knockback,
                        max_range: ctx.stats.attack_range * 1.5,
                    });
                    ShootPhase::Firing {
                        shots_left: shots_left - 1,
                        shot_timer: ctx.stats.volley_interval,
                    }
                } else {
                    ShootPhase::Firing {
                        shots_left,
                        shot_timer,
                    }
                }
            }

            ShootPhase::Recovery { timer } => {
                let timer = timer - dt;
                if timer <= 0.0 {
                    return Some(StateId::Chase);
                }
                ShootPhase::Recovery { timer }
            }
        };

        None
    }

    fn on_exit(&mut self, ctx: &mut BrainCtx) {
        ctx.visual.cue = None;
    }
}

/// Retreat: отходим по прямой от цели до preferred_range, затем снова Shoot
///
/// Токен через Retreat сохраняется (см. holds_token_through) — ranged-цикл
/// Shoot ↔ Retreat не проходит повторный арбитраж.
pub struct RetreatState;

impl State<StateId, BrainCtx> for RetreatState {
    fn on_update(&mut self, ctx: &mut BrainCtx, _dt: f32) -> Option<StateId> {
        if ctx.target_lost_or_leashed() {
            return Some(StateId::Return);
        }

        if ctx.perception.distance_to_target >= ctx.stats.preferred_range {
            ctx.motor.cmd = MotorCmd::Idle;
            return Some(StateId::Shoot);
        }

        // Прямо от цели
        let away = -ctx.dir_to(ctx.perception.target_position);
        ctx.motor.move_toward(away);
        // Пятимся лицом к игроку
        ctx.motor.face(-away);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bevy::prelude::*;

    fn shoot_ctx(distance: f32) -> BrainCtx {
        use crate::components::{AgentVisual, CombatCaps, Defense, StatBlock};
        use crate::movement::Motor;
        use crate::perception::{Perception, ThreatSensor};

        let mut perception = Perception::default();
        perception.has_target = true;
        perception.distance_to_target = distance;
        perception.target_position = Vec3::new(0.0, 0.0, distance);
        perception.last_known_position = perception.target_position;

        BrainCtx {
            entity: Entity::PLACEHOLDER,
            faction_id: 1,
            position: Vec3::ZERO,
            spawn_point: Vec3::ZERO,
            perception: perception.snapshot(),
            threat: ThreatSensor::default().snapshot(),
            stats: StatBlock::gunner(),
            attack: None,
            caps: CombatCaps::ranged(),
            separation: Vec3::ZERO,
            orbit_sign: 1.0,
            orbit_radius_multiplier: 1.8,
            orbit_speed: 1.1,
            arbiter: None,
            token_held: true,
            motor: Motor::default(),
            visual: AgentVisual::default(),
            defense: Defense::default(),
            actions: Vec::new(),
        }
    }

    fn count_shots(ctx: &BrainCtx) -> usize {
        ctx.actions
            .iter()
            .filter(|a| matches!(a, AgentAction::FireProjectile { .. }))
            .count()
    }

    #[test]
    fn test_full_burst_then_chase() {
        let mut ctx = shoot_ctx(8.0); // дальше retreat_range (5.0)
        let mut shoot = ShootState::new();
        shoot.on_enter(&mut ctx);

        let mut result = None;
        for _ in 0..200 {
            result = shoot.on_update(&mut ctx, 0.05);
            if result.is_some() {
                break;
            }
        }

        assert_eq!(count_shots(&ctx), ctx.stats.volley_count as usize);
        assert_eq!(result, Some(StateId::Chase));
    }

    #[test]
    fn test_retreat_interrupts_mid_burst() {
        let mut ctx = shoot_ctx(8.0);
        ctx.stats.volley_count = 10; // длинная очередь — не успеет закончиться
        let mut shoot = ShootState::new();
        shoot.on_enter(&mut ctx);

        // Проматываем telegraph и пару выстрелов
        for _ in 0..12 {
            assert_eq!(shoot.on_update(&mut ctx, 0.05), None);
        }
        let shots_before = count_shots(&ctx);
        assert!(shots_before > 0 && shots_before < 10);

        // Игрок закрылся на 4.0 < retreat_range 5.0 → Retreat немедленно
        ctx.perception.distance_to_target = 4.0;
        assert_eq!(shoot.on_update(&mut ctx, 0.05), Some(StateId::Retreat));
        // Остаток очереди сгорел
        assert_eq!(count_shots(&ctx), shots_before);
    }

    #[test]
    fn test_retreat_returns_to_shoot_at_preferred_range() {
        let mut ctx = shoot_ctx(4.0);
        let mut retreat = RetreatState;

        // Ближе preferred (9.0) — продолжаем пятиться
        assert_eq!(retreat.on_update(&mut ctx, 0.05), None);
        assert!(matches!(ctx.motor.cmd, crate::movement::MotorCmd::Move { .. }));

        // Оторвались до preferred → снова стреляем
        ctx.perception.distance_to_target = 9.0;
        assert_eq!(retreat.on_update(&mut ctx, 0.05), Some(StateId::Shoot));
    }

    #[test]
    fn test_target_lost_goes_return() {
        let mut ctx = shoot_ctx(8.0);
        let mut shoot = ShootState::new();
        shoot.on_enter(&mut ctx);

        ctx.perception.has_target = false;
        assert_eq!(shoot.on_update(&mut ctx, 0.05), Some(StateId::Return));
    }
}
