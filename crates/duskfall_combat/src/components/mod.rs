//! ECS components ядра combat-AI
//!
//! Организация по доменам:
//! - actor: базовые характеристики (faction, health, poise, fear, spawn anchor)
//! - caps: capability-дескриптор архетипа (вместо subclass-иерархии)
//! - stats: неизменяемый tuning (StatBlock, AttackSpec, hit shapes)

pub mod actor;
pub mod caps;
pub mod stats;

// Re-exports для удобного импорта
pub use actor::*;
pub use caps::*;
pub use stats::*;
