//! Engage: melee commitment-состояние с вложенной attack-последовательностью
//!
//! Внутри живёт приватный экземпляр того же generic StateMachine:
//! Telegraph → Active → Recovery → Done. Фазовые состояния пересоздаются
//! на КАЖДЫЙ вход в Engage — они несут per-cycle поля (таймеры, флаг
//! "урон уже применён"), которые обязаны начинаться с чистого листа.
//!
//! Signal-window протокол:
//! - Telegraph: движение заморожено, горит warning cue (окно реакции игрока)
//! - Active: ровно ОДИН hit-resolution attempt на вход (guard-флаг; все цели
//!   одного прохода получают урон, второго прохода не будет)
//! - Recovery: движение заморожено — designed punish window

use crate::agent::ctx::{AgentAction, BrainCtx};
use crate::agent::states::StateId;
use crate::combat::DamageKind;
use crate::components::{AttackProfile, CueColor};
use crate::fsm::{State, StateMachine};

/// Ключи вложенной attack-машины
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttackPhase {
    Telegraph,
    Active,
    Recovery,
    /// Терминальная фаза: сигнал завершения для владеющего Engage
    Done,
}

/// Telegraph: замах с видимым cue
struct TelegraphPhase {
    timer: f32,
    cue: CueColor,
}

impl State<AttackPhase, BrainCtx> for TelegraphPhase {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        // Замах в сторону цели; дальше facing заморожен вместе с движением
        let dir = ctx.dir_to(ctx.perception.target_position);
        ctx.motor.face(dir);
        ctx.motor.freeze();
        ctx.visual.cue = Some(self.cue);
    }

    fn on_update(&mut self, _ctx: &mut BrainCtx, dt: f32) -> Option<AttackPhase> {
        self.timer -= dt;
        if self.timer <= 0.0 {
            return Some(AttackPhase::Active);
        }
        None
    }

    fn on_exit(&mut self, ctx: &mut BrainCtx) {
        ctx.visual.cue = None;
    }
}

/// Active: окно урона
struct ActivePhase {
    timer: f32,
    /// Guard: re-tick той же Active-фазы не даёт второй resolution attempt
    damage_dealt: bool,
    profile: AttackProfile,
}

impl State<AttackPhase, BrainCtx> for ActivePhase {
    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<AttackPhase> {
        if !self.damage_dealt {
            self.damage_dealt = true;
            ctx.emit(AgentAction::Hit {
                shape: self.profile.shape,
                origin: ctx.position,
                facing: ctx.facing(),
                damage: self.profile.damage,
                knockback: self.profile.knockback,
                kind: DamageKind::Melee,
            });
        }

        self.timer -= dt;
        if self.timer <= 0.0 {
            return Some(AttackPhase::Recovery);
        }
        None
    }
}

/// Recovery: punish window, движение всё ещё заморожено
struct RecoveryPhase {
    timer: f32,
}

impl State<AttackPhase, BrainCtx> for RecoveryPhase {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        ctx.motor.freeze();
    }

    fn on_update(&mut self, _ctx: &mut BrainCtx, dt: f32) -> Option<AttackPhase> {
        self.timer -= dt;
        if self.timer <= 0.0 {
            return Some(AttackPhase::Done);
        }
        None
    }
}

/// Done: маркер завершения (владелец читает через is_in)
struct DonePhase;

impl State<AttackPhase, BrainCtx> for DonePhase {
    fn on_update(&mut self, _ctx: &mut BrainCtx, _dt: f32) -> Option<AttackPhase> {
        None
    }
}

/// Commitment-состояние: владеет приватной attack-машиной
pub struct EngageState {
    sequence: StateMachine<AttackPhase, BrainCtx>,
}

impl EngageState {
    pub fn new() -> Self {
        Self {
            sequence: StateMachine::new(),
        }
    }

    fn build_sequence(ctx: &mut BrainCtx) -> StateMachine<AttackPhase, BrainCtx> {
        let profile = AttackProfile::resolve(ctx.attack.as_ref(), &ctx.stats);

        let mut sequence = StateMachine::new();
        sequence.insert(
            AttackPhase::Telegraph,
            Box::new(TelegraphPhase {
                timer: profile.telegraph,
                cue: profile.cue,
            }),
        );
        sequence.insert(
            AttackPhase::Active,
            Box::new(ActivePhase {
                timer: profile.active,
                damage_dealt: false,
                profile: profile.clone(),
            }),
        );
        sequence.insert(
            AttackPhase::Recovery,
            Box::new(RecoveryPhase {
                timer: profile.recovery,
            }),
        );
        sequence.insert(AttackPhase::Done, Box::new(DonePhase));
        sequence.initialize(AttackPhase::Telegraph, ctx);
        sequence
    }
}

impl State<StateId, BrainCtx> for EngageState {
    fn on_enter(&mut self, ctx: &mut BrainCtx) {
        // Пересборка на каждый вход: чистые таймеры и guard-флаг
        self.sequence = Self::build_sequence(ctx);
    }

    fn on_update(&mut self, ctx: &mut BrainCtx, dt: f32) -> Option<StateId> {
        if !self.sequence.is_in(AttackPhase::Done) {
            self.sequence.tick(ctx, dt);
            return None;
        }

        // Завершились: пере-оценка цели/leash решает следующий шаг
        if ctx.target_lost_or_leashed() {
            Some(StateId::Return)
        } else {
            Some(StateId::Chase)
        }
    }
}
