//! Capability-дескриптор архетипа
//!
//! Вместо subclass-иерархии с downcasts ("это ranged-вид?") call-sites
//! спрашивают флаги напрямую. Какие состояния строятся в Brain и какие
//! reactive-прерывания применимы — решается по этим флагам один раз при
//! сборке агента.

use bevy::prelude::*;
use serde::{Deserialize, Serialize};

/// Набор боевых capabilities агента
#[derive(Component, Debug, Clone, Copy, Reflect, Serialize, Deserialize)]
#[reflect(Component)]
pub struct CombatCaps {
    pub can_melee: bool,
    pub can_ranged: bool,
    /// Стационарный (turret): не двигается, не orbits, не участвует
    /// в token-арбитраже
    pub is_stationary: bool,
    pub has_stealth: bool,
    pub can_dodge: bool,
    pub can_block: bool,
}

impl Default for CombatCaps {
    fn default() -> Self {
        Self::melee()
    }
}

impl CombatCaps {
    /// Melee bruiser: pursuit + engage, умеет блокировать
    pub fn melee() -> Self {
        Self {
            can_melee: true,
            can_ranged: false,
            is_stationary: false,
            has_stealth: false,
            can_dodge: false,
            can_block: true,
        }
    }

    /// Ranged gunner: burst fire + retreat, уворачивается от угроз
    pub fn ranged() -> Self {
        Self {
            can_melee: false,
            can_ranged: true,
            is_stationary: false,
            has_stealth: false,
            can_dodge: true,
            can_block: false,
        }
    }

    /// Стационарная турель: scan/lock/fire, не реагирует движением
    pub fn turret() -> Self {
        Self {
            can_melee: false,
            can_ranged: true,
            is_stationary: true,
            has_stealth: false,
            can_dodge: false,
            can_block: false,
        }
    }

    /// Assassin: stealth flank + backstab, уворачивается
    pub fn assassin() -> Self {
        Self {
            can_melee: true,
            can_ranged: false,
            is_stationary: false,
            has_stealth: true,
            can_dodge: true,
            can_block: false,
        }
    }

    /// Мобильные архетипы участвуют в token-арбитраже
    pub fn uses_tokens(&self) -> bool {
        !self.is_stationary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turret_does_not_arbitrate() {
        assert!(!CombatCaps::turret().uses_tokens());
        assert!(CombatCaps::melee().uses_tokens());
        assert!(CombatCaps::ranged().uses_tokens());
        assert!(CombatCaps::assassin().uses_tokens());
    }
}
