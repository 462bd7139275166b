//! Базовые компоненты агентов: Agent, Health, Poise, Fear, SpawnAnchor

use bevy::prelude::*;

use crate::components::stats::CueColor;

/// Агент (hostile NPC или игрок) — базовый компонент для участников боя
///
/// Автоматически добавляет Health, Poise, Fear, Collidable, Defense,
/// AgentVisual через Required Components.
#[derive(Component, Debug, Clone, Default, Reflect)]
#[reflect(Component)]
#[require(Health, Poise, Fear, Collidable, Defense, AgentVisual)]
pub struct Agent {
    /// Stable ID фракции (игрок = 0, hostiles = 1+)
    pub faction_id: u64,
}

/// Здоровье агента
///
/// Инвариант: 0 ≤ current ≤ max
#[derive(Component, Debug, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct Health {
    pub current: u32,
    pub max: u32,
}

impl Default for Health {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Health {
    pub fn new(max: u32) -> Self {
        Self { current: max, max }
    }

    pub fn is_alive(&self) -> bool {
        self.current > 0
    }

    pub fn take_damage(&mut self, amount: u32) {
        self.current = self.current.saturating_sub(amount);
    }

    pub fn restore_full(&mut self) {
        self.current = self.max;
    }
}

/// Устойчивость к прерыванию (poise)
///
/// Инвариант: current ≤ max. Входящий урон снимает poise; при current == 0
/// агент считается broken и interrupt-система переводит его в Stagger.
#[derive(Component, Debug, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct Poise {
    pub current: f32,
    pub max: f32,
}

impl Default for Poise {
    fn default() -> Self {
        Self::new(50.0)
    }
}

impl Poise {
    pub fn new(max: f32) -> Self {
        Self { current: max, max }
    }

    pub fn is_broken(&self) -> bool {
        self.current <= 0.0
    }

    pub fn absorb(&mut self, amount: f32) {
        self.current = (self.current - amount).max(0.0);
    }

    pub fn reset(&mut self) {
        self.current = self.max;
    }
}

/// Страх (триггер для Flee)
///
/// Накапливается от урона, спадает со временем. current ≥ threshold → паника.
#[derive(Component, Debug, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct Fear {
    pub current: f32,
    pub threshold: f32,
    /// Скорость спада (units/sec)
    pub decay_rate: f32,
}

impl Default for Fear {
    fn default() -> Self {
        Self {
            current: 0.0,
            threshold: 60.0,
            decay_rate: 8.0,
        }
    }
}

impl Fear {
    pub fn add(&mut self, amount: f32) {
        self.current += amount;
    }

    pub fn is_panicked(&self) -> bool {
        self.current >= self.threshold
    }

    pub fn decay(&mut self, delta: f32) {
        self.current = (self.current - self.decay_rate * delta).max(0.0);
    }

    pub fn calm(&mut self) {
        self.current = 0.0;
    }
}

/// Точка спавна + leash-радиус
///
/// Агент бросает преследование когда уходит от anchor дальше leash_range
/// (leash сам по себе лежит в StatBlock — здесь только позиция).
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct SpawnAnchor {
    pub position: Vec3,
}

/// Маркер: entity участвует в hit-запросах (агенты, игрок, props)
///
/// Props без Health — "недамажируемая геометрия": попадание по ним
/// расходует attack attempt, но урона не наносит (логируется один раз).
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct Collidable;

/// Входящий damage-гейт (пишется защитными состояниями каждый тик)
///
/// Block выставляет damage_scale < 1.0, PhaseLock — invulnerable.
/// Brain-тик сбрасывает в нейтраль перед обновлением состояния.
#[derive(Component, Debug, Clone, Copy, Reflect)]
#[reflect(Component)]
pub struct Defense {
    pub damage_scale: f32,
    pub invulnerable: bool,
}

impl Default for Defense {
    fn default() -> Self {
        Self {
            damage_scale: 1.0,
            invulnerable: false,
        }
    }
}

impl Defense {
    pub fn neutral(&mut self) {
        self.damage_scale = 1.0;
        self.invulnerable = false;
    }
}

/// Derived-значения для presentation-слоя (ядро не рендерит)
///
/// Снаружи читаются: telegraph cue (цвет подсветки), stealth opacity,
/// shake при stagger, pulse при boss phase lock, aim при turret lock.
#[derive(Component, Debug, Clone, Reflect)]
#[reflect(Component)]
pub struct AgentVisual {
    pub opacity: f32,
    pub cue: Option<CueColor>,
    pub shake: bool,
    pub pulse: bool,
    pub aim_indicator: bool,
}

impl Default for AgentVisual {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            cue: None,
            shake: false,
            pulse: false,
            aim_indicator: false,
        }
    }
}

/// Компонент-маркер: entity мертв (Health == 0)
///
/// Трупы остаются на месте, brain и motor снимаются.
#[derive(Component, Debug)]
pub struct Dead;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_damage() {
        let mut health = Health::new(100);
        assert_eq!(health.current, 100);

        health.take_damage(30);
        assert_eq!(health.current, 70);
        assert!(health.is_alive());

        health.take_damage(100); // Saturating sub
        assert_eq!(health.current, 0);
        assert!(!health.is_alive());
    }

    #[test]
    fn test_poise_break_and_reset() {
        let mut poise = Poise::new(50.0);
        assert!(!poise.is_broken());

        poise.absorb(30.0);
        assert!(!poise.is_broken());

        poise.absorb(25.0); // Клампится в 0
        assert_eq!(poise.current, 0.0);
        assert!(poise.is_broken());

        poise.reset();
        assert_eq!(poise.current, 50.0);
        assert!(!poise.is_broken());
    }

    #[test]
    fn test_fear_accrual_and_decay() {
        let mut fear = Fear::default();
        assert!(!fear.is_panicked());

        fear.add(70.0);
        assert!(fear.is_panicked());

        fear.decay(2.0); // 2 sec × 8/sec = -16
        assert_eq!(fear.current, 54.0);
        assert!(!fear.is_panicked());

        fear.decay(100.0); // Клампится в 0
        assert_eq!(fear.current, 0.0);
    }

    #[test]
    fn test_defense_neutral() {
        let mut defense = Defense {
            damage_scale: 0.3,
            invulnerable: true,
        };
        defense.neutral();
        assert_eq!(defense.damage_scale, 1.0);
        assert!(!defense.invulnerable);
    }
}
