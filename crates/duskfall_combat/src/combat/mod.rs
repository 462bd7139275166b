//! Combat pipeline: hit resolution → снаряды → урон → смерть
//!
//! ECS ответственность:
//! - Game state: Health, Poise, Fear, Defense
//! - Combat rules: shape resolution, damage gates, knockback
//! - Events: HitRequest, DamagePacket, DamageDealt, EntityDied
//!
//! Presentation-слой (вне ядра): анимации, hit flash, звук, beam-рендер.

use bevy::prelude::*;

pub mod damage;
pub mod hitbox;
pub mod projectile;

// Re-export основных типов
pub use damage::{apply_damage, DamageDealt, DamageKind, DamagePacket, EntityDied};
pub use hitbox::{resolve_hit_requests, HitRequest, HitboxResolver};
pub use projectile::{
    BeamVisual, FireBeam, FireProjectile, PooledPrefab, Projectile, SpawnPool,
};

use crate::SimSet;

/// Combat Plugin
///
/// Порядок внутри тика (после brain'ов, см. SimSet):
/// 1. resolve_hit_requests — melee/strike/beam shape-резолюция
/// 2. launch_projectiles / launch_beams — intent → pooled инстансы
/// 3. fly_projectiles — полёт + импакт
/// 4. tick_beams — затухание лучей
/// 5. apply_damage — все DamagePacket'ы тика
/// 6. decay_fear — спад страха
/// 7. disable_brain_on_death — мёртвые не думают и не держат токены
pub struct CombatPlugin;

impl Plugin for CombatPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<HitRequest>()
            .add_event::<DamagePacket>()
            .add_event::<DamageDealt>()
            .add_event::<EntityDied>()
            .add_event::<FireProjectile>()
            .add_event::<FireBeam>();

        app.init_resource::<HitboxResolver>();

        app.add_systems(
            FixedUpdate,
            (
                resolve_hit_requests,
                projectile::launch_projectiles,
                projectile::fly_projectiles,
                projectile::launch_beams,
                projectile::tick_beams,
                apply_damage,
                damage::decay_fear,
                damage::disable_brain_on_death,
            )
                .chain()
                .in_set(SimSet::Combat),
        );
    }
}
