//! Assassin: Stealth → Flank → Strike → Disengage
//!
//! Вход в Strike требует ОДНОВРЕМЕННО (в один тик):
//! - "за спиной": dot(target_facing, to_agent) < behind_dot_threshold (−0.3)
//! - в радиусе атаки
//! - granted токен (Flank опрашивает как Orbit — throttled; первый запрос
//!   в первый же тик полного совпадения условий)

use crate::agent::ctx::{AgentAction, BrainCtx};
use crate::agent::states::StateId;
use crate::combat::DamageKind;
use crate::components::AttackProfile;
use crate::fsm::State;
use crate::movement::MotorCmd;

/// Скорость фейда opacity (1/sec)
const FADE_RATE: f32 = 4.0;

fn fade_toward(current: f32, target: f32, dt: f32) -> f32 {
    let step = FADE_RATE * dt;
    if current < target {
        (current + step).min(target)
    } else {
        (current - step).max(target)
    }
}

/// Stealth: полупрозрачность, дрейф к spawn без цели
pub struct StealthState;

impl State<StateId, BrainCtx> for StealthState {
    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        ctx.visual.opacity = fade_toward(ctx.visual.opacity, ctx.stats.stealth_opacity, dt);

        if ctx.perception.has_target {
            return Some(StateId::Flank);
        }

        // Без цели — медленно дрейфуем к spawn
        if ctx.distance_to_spawn() > 0.5 {
            let dir = ctx.dir_to(ctx.spawn_point);
            ctx.motor.move_at(dir, 0.5);
        } else {
            ctx.motor.cmd = MotorCmd::Idle;
        }
        None
    }
}

/// Flank: заход в точку позади цели, сохраняя stealth
pub struct FlankState {
    poll_timer: f32,
}

impl FlankState {
    pub fn new() -> Self {
        Self { poll_timer: 0.0 }
    }
}

impl State<StateId, BrainCtx> for FlankState {
    fn on_enter(&mut self, _ctx: &mut BrainCtx) {
        // 0 → первый запрос в тот же тик, когда условия сошлись
        self.poll_timer = 0.0;
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        if ctx.target_lost_or_leashed() {
            return Some(StateId::Stealth);
        }

        ctx.visual.opacity = fade_toward(ctx.visual.opacity, ctx.stats.stealth_opacity, dt);
        self.poll_timer -= dt;

        // Точка захода: за спиной цели по её facing
        let behind_point = ctx.perception.target_position
            - ctx.perception.target_facing * ctx.stats.flank_offset;

        // Оба условия обязаны держаться в ОДИН тик
        let to_agent = {
            let v = ctx.position - ctx.perception.target_position;
            bevy::prelude::Vec3::new(v.x, 0.0, v.z).normalize_or_zero()
        };
        let behind = ctx.perception.target_facing.dot(to_agent) < ctx.stats.behind_dot_threshold;
        let in_range = ctx.perception.distance_to_target < ctx.stats.attack_range;

        if behind && in_range {
            ctx.motor.cmd = MotorCmd::Idle;
            if self.poll_timer <= 0.0 {
                if ctx.request_token() {
                    return Some(StateId::Strike);
                }
                // Отказ — следующий опрос через интервал
                self.poll_timer = ctx.stats.token_poll_interval;
            }
            return None;
        }

        // Частичное совпадение условий — продолжаем заходить
        ctx.motor.move_toward(ctx.dir_to(behind_point));
        None
    }
}

/// Фазы Strike (плоский enum: Reveal → Commit)
#[derive(Debug, Clone, Copy, PartialEq)]
enum StrikePhase {
    Reveal { timer: f32 },
    Commit { timer: f32 },
}

/// Strike: reveal → одиночная attack-резолюция → commit freeze
pub struct StrikeState {
    phase: StrikePhase,
    /// Guard: одна резолюция на вход
    resolved: bool,
}

impl StrikeState {
    pub fn new() -> Self {
        Self {
            phase: StrikePhase::Reveal { timer: 0.0 },
            resolved: false,
        }
    }
}

impl State<StateId, BrainCtx> for StrikeState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        self.phase = StrikePhase::Reveal {
            timer: ctx.stats.reveal_duration,
        };
        self.resolved = false;
        // Удар строго в цель, не по направлению захода
        ctx.motor.face(ctx.dir_to(ctx.perception.target_position));
        ctx.motor.freeze();
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        self.phase = match self.phase {
            StrikePhase::Reveal { timer } => {
                // Fade к полной видимости
                ctx.visual.opacity = fade_toward(ctx.visual.opacity, 1.0, dt * 3.0);

                let timer = timer - dt;
                if timer <= 0.0 {
                    ctx.visual.opacity = 1.0;
                    if !self.resolved {
                        self.resolved = true;
                        let profile = AttackProfile::resolve(ctx.attack.as_ref(), &ctx.stats);
                        ctx.emit(AgentAction::Hit {
                            shape: profile.shape,
                            origin: ctx.position,
                            facing: ctx.facing(),
                            damage: profile.damage,
                            knockback: profile.knockback,
                            kind: DamageKind::Melee,
                        });
                    }
                    StrikePhase::Commit {
                        timer: ctx.stats.commit_duration,
                    }
                } else {
                    StrikePhase::Reveal { timer }
                }
            }

            StrikePhase::Commit { timer } => {
                let timer = timer - dt;
                if timer <= 0.0 {
                    return Some(StateId::Disengage);
                }
                StrikePhase::Commit { timer }
            }
        };

        None
    }
}

/// Disengage: рывок прочь с фейдом обратно в stealth
pub struct DisengageState {
    timer: f32,
}

impl DisengageState {
    pub fn new() -> Self {
        Self { timer: 0.0 }
    }
}

impl State<StateId, BrainCtx> for DisengageState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        self.timer = ctx.stats.disengage_duration;
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        ctx.visual.opacity = fade_toward(ctx.visual.opacity, ctx.stats.stealth_opacity, dt);
        self.timer -= dt;

        let far_enough = ctx.perception.distance_to_target >= ctx.stats.disengage_range;
        if far_enough || self.timer <= 0.0 {
            return Some(StateId::Stealth);
        }

        let away = -ctx.dir_to(ctx.perception.target_position);
        ctx.motor.move_at(away, ctx.stats.disengage_speed_mult);
        None
    }
}
