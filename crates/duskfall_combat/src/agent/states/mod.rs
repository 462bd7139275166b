//! Outer behavior-состояния (роспись по архетипам — см. builders в agent/)
//!
//! Общие transition-драйверы: perception (has_target/distance), дистанции
//! из StatBlock (attack/preferred/retreat/leash), доступность токена.

use crate::agent::ctx::BrainCtx;
use crate::components::CombatCaps;
use crate::perception::PerceptionSnapshot;

pub mod assassin;
pub mod engage;
pub mod pursuit;
pub mod reactive;
pub mod shoot;
pub mod turret;

pub use assassin::{DisengageState, FlankState, StealthState, StrikeState};
pub use engage::EngageState;
pub use pursuit::{ChaseState, IdleState, OrbitState, ReturnState};
pub use reactive::{BlockState, DodgeState, FleeState, PhaseLockState, StaggerState};
pub use shoot::{RetreatState, ShootState};
pub use turret::{CooldownState, LockState, ScanState, TurretFireState};

/// Ключи outer-машины (полный роспись; в конкретного агента попадает
/// подмножество по его capabilities)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateId {
    // Общая pursuit-цепочка
    Idle,
    Chase,
    Orbit,
    Return,
    // Commitment
    Engage,
    Shoot,
    Retreat,
    // Стационарная турель
    Scan,
    Lock,
    TurretFire,
    Cooldown,
    // Assassin
    Stealth,
    Flank,
    Strike,
    Disengage,
    // Reactive (прерывают любое из верхних)
    Stagger,
    Flee,
    Dodge,
    Block,
    PhaseLock,
}

/// Состояния, сквозь которые агент удерживает attack token.
///
/// Retreat в списке: ranged-цикл возвращается из Retreat прямо в Shoot
/// без повторного арбитража. Выход в любое другое состояние — post-tick
/// sweep в tick_brains вернёт токен (гарантия на interrupt-путях).
pub fn holds_token_through(state: StateId) -> bool {
    matches!(
        state,
        StateId::Engage | StateId::Shoot | StateId::Retreat | StateId::Strike
    )
}

/// Reactive-состояния (interrupt-слой)
pub fn is_reactive(state: StateId) -> bool {
    matches!(
        state,
        StateId::Stagger | StateId::Flee | StateId::Dodge | StateId::Block | StateId::PhaseLock
    )
}

/// Куда возвращаться после reactive-состояния
pub fn fallback_state(caps: &CombatCaps, perception: &PerceptionSnapshot) -> StateId {
    if caps.is_stationary {
        if perception.has_target {
            StateId::Lock
        } else {
            StateId::Scan
        }
    } else if caps.has_stealth {
        StateId::Stealth
    } else if perception.has_target {
        StateId::Chase
    } else {
        StateId::Idle
    }
}

/// Commitment-состояние по capabilities (куда идти при granted-токене)
pub fn commitment_state(ctx: &BrainCtx) -> StateId {
    if ctx.caps.can_ranged {
        StateId::Shoot
    } else {
        StateId::Engage
    }
}

/// Дистанция входа в commitment по capabilities
pub fn commitment_range(ctx: &BrainCtx) -> f32 {
    if ctx.caps.can_ranged {
        ctx.stats.preferred_range
    } else {
        ctx.stats.attack_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perception::Perception;

    #[test]
    fn test_token_holding_set() {
        assert!(holds_token_through(StateId::Engage));
        assert!(holds_token_through(StateId::Shoot));
        assert!(holds_token_through(StateId::Retreat));
        assert!(holds_token_through(StateId::Strike));

        assert!(!holds_token_through(StateId::Orbit));
        assert!(!holds_token_through(StateId::Chase));
        assert!(!holds_token_through(StateId::Stagger));
        assert!(!holds_token_through(StateId::Flee));
    }

    #[test]
    fn test_fallback_per_archetype() {
        let no_target = Perception::default().snapshot();

        assert_eq!(
            fallback_state(&CombatCaps::turret(), &no_target),
            StateId::Scan
        );
        assert_eq!(
            fallback_state(&CombatCaps::assassin(), &no_target),
            StateId::Stealth
        );
        assert_eq!(
            fallback_state(&CombatCaps::melee(), &no_target),
            StateId::Idle
        );

        let mut with_target = no_target;
        with_target.has_target = true;
        assert_eq!(
            fallback_state(&CombatCaps::melee(), &with_target),
            StateId::Chase
        );
        assert_eq!(
            fallback_state(&CombatCaps::turret(), &with_target),
            StateId::Lock
        );
    }
}
