//! DUSKFALL Combat-AI Core
//!
//! Headless ECS-ядро боевого AI (Bevy 0.16): двухуровневые FSM агентов,
//! глобальный attack-token арбитраж, signal-window атаки
//! (telegraph → active → recovery), shape-based hit resolution.
//!
//! Presentation (рендер, анимации, звук, партиклы) и физика/pathfinding —
//! внешние collaborators; ядро публикует derived-значения (AgentVisual)
//! и intent-events, ничего не рисует.

use bevy::prelude::*;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

// Публичные модули
pub mod agent;
pub mod arbiter;
pub mod combat;
pub mod components;
pub mod fsm;
pub mod logger;
pub mod movement;
pub mod perception;

// Re-export базовых типов для удобства
pub use agent::{
    spawn_assassin_agent, spawn_melee_agent, spawn_ranged_agent, spawn_turret_agent,
    AgentPlugin, AgentRestore, Brain, ForcePhaseLock, PhaseLockComplete, RestoreKind, StateId,
};
pub use arbiter::{AttackTokenArbiter, RoomChanged, TokenSlot};
pub use combat::{
    CombatPlugin, DamageDealt, DamageKind, DamagePacket, EntityDied, FireBeam, FireProjectile,
    HitRequest, HitboxResolver, SpawnPool,
};
pub use components::*;
pub use fsm::{State, StateMachine};
pub use logger::{
    init_logger, log, log_error, log_info, log_warning, set_log_level, set_logger, LogLevel,
    LogPrinter,
};
pub use movement::{Motor, MotorCmd, SeparationForce};
pub use perception::{Perception, PerceptionSnapshot, ThreatSensor};

/// Группы систем одного симуляционного тика.
///
/// Гарантия порядка (для каждого агента, каждый тик):
/// perception → brain-тик → движение → combat-pipeline.
/// Между агентами порядок НЕ определён — общий mutable state только
/// у арбитра, и тот за mutex'ом.
#[derive(SystemSet, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SimSet {
    Perception,
    Brains,
    Movement,
    Combat,
}

/// Главный plugin симуляции (объединяет все подсистемы)
///
/// AttackTokenArbiter намеренно НЕ вставляется по умолчанию: это явно
/// конструируемый сервис (insert_resource(AttackTokenArbiter::new(cap))
/// при сборке уровня). Без него token-запросы fail-open.
pub struct SimulationPlugin;

impl Plugin for SimulationPlugin {
    fn build(&self, app: &mut App) {
        app
            // Fixed timestep 60Hz для simulation tick
            .insert_resource(Time::<Fixed>::from_hz(60.0))
            // Детерминистичный RNG (seed по умолчанию)
            .insert_resource(DeterministicRng::new(42))
            // Pooled-spawn сервис (projectiles / beams)
            .init_resource::<SpawnPool>();

        app.configure_sets(
            FixedUpdate,
            (
                SimSet::Perception,
                SimSet::Brains,
                SimSet::Movement,
                SimSet::Combat,
            )
                .chain(),
        );

        app.add_plugins((AgentPlugin, CombatPlugin));
    }
}

/// Детерминистичный RNG resource (seeded)
///
/// Используется только при спавне (orbit-направление, scan-фаза) —
/// внутри тика состояния детерминированы без rng.
#[derive(Resource)]
pub struct DeterministicRng {
    pub rng: ChaCha8Rng,
    pub seed: u64,
}

impl DeterministicRng {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
            seed,
        }
    }
}

/// Создаёт minimal Bevy App для headless симуляции
pub fn create_headless_app(seed: u64) -> App {
    let mut app = App::new();
    init_logger();
    app.add_plugins(MinimalPlugins)
        .insert_resource(DeterministicRng::new(seed))
        .insert_resource(Time::<Fixed>::from_hz(60.0));

    app
}

/// Snapshot мира для сравнения детерминизма
/// (Debug-форматирование; полноценная сериализация — на стороне save-слоя)
pub fn world_snapshot<T: Component>(world: &mut World) -> Vec<u8>
where
    T: std::fmt::Debug,
{
    let mut snapshot = Vec::new();

    let mut query = world.query::<(Entity, &T)>();
    let mut entities: Vec<_> = query.iter(world).collect();

    // Сортируем по Entity ID для детерминизма
    entities.sort_by_key(|(entity, _)| entity.index());

    for (entity, component) in entities {
        snapshot.extend_from_slice(&entity.index().to_le_bytes());
        snapshot.extend_from_slice(format!("{:?}", component).as_bytes());
    }

    snapshot
}
