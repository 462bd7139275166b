//! Снаряды и лучи (headless-полёт + pooled-spawn сервис)
//!
//! Архитектура:
//! - Brain-состояния эмитят FireProjectile/FireBeam events (intent)
//! - SpawnPool — capacity-bounded сервис pooled-префабов; ядро только
//!   "берёт" инстанс и инициализирует траекторию/урон
//! - Нет пула — dependent behavior деградирует в no-op с warning
//! - Урон луча идёт через HitRequest (shape = Beam) один раз при выстреле;
//!   сам beam-entity — только время жизни для presentation-слоя

use bevy::prelude::*;

use crate::combat::damage::{DamageKind, DamagePacket};
use crate::components::{Agent, Collidable, Health};

/// Радиус попадания снаряда (метры)
const PROJECTILE_HIT_RADIUS: f32 = 0.6;

/// Идентичность pooled-префаба
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PooledPrefab {
    Projectile,
    Beam,
}

/// Pooled-spawn сервис с capacity bound на каждый префаб
#[derive(Resource, Debug)]
pub struct SpawnPool {
    projectile_capacity: usize,
    projectiles_live: usize,
    beam_capacity: usize,
    beams_live: usize,
}

impl Default for SpawnPool {
    fn default() -> Self {
        Self {
            projectile_capacity: 64,
            projectiles_live: 0,
            beam_capacity: 8,
            beams_live: 0,
        }
    }
}

impl SpawnPool {
    pub fn new(projectile_capacity: usize, beam_capacity: usize) -> Self {
        Self {
            projectile_capacity,
            projectiles_live: 0,
            beam_capacity,
            beams_live: 0,
        }
    }

    /// true = инстанс выдан; false = пул исчерпан
    pub fn try_acquire(&mut self, prefab: PooledPrefab) -> bool {
        match prefab {
            PooledPrefab::Projectile => {
                if self.projectiles_live < self.projectile_capacity {
                    self.projectiles_live += 1;
                    true
                } else {
                    false
                }
            }
            PooledPrefab::Beam => {
                if self.beams_live < self.beam_capacity {
                    self.beams_live += 1;
                    true
                } else {
                    false
                }
            }
        }
    }

    pub fn release(&mut self, prefab: PooledPrefab) {
        match prefab {
            PooledPrefab::Projectile => {
                self.projectiles_live = self.projectiles_live.saturating_sub(1)
            }
            PooledPrefab::Beam => self.beams_live = self.beams_live.saturating_sub(1),
        }
    }

    pub fn live(&self, prefab: PooledPrefab) -> usize {
        match prefab {
            PooledPrefab::Projectile => self.projectiles_live,
            PooledPrefab::Beam => self.beams_live,
        }
    }
}

/// Event: выстрел снарядом (Shoot burst, turret charged shot)
#[derive(Event, Debug, Clone)]
pub struct FireProjectile {
    pub attacker: Entity,
    pub faction: u64,
    pub origin: Vec3,
    pub dir: Vec3,
    pub speed: f32,
    pub damage: u32,
    pub knockback: f32,
    pub max_range: f32,
}

/// Event: выстрел лучом (визуальная часть; урон уже ушёл через HitRequest)
#[derive(Event, Debug, Clone)]
pub struct FireBeam {
    pub attacker: Entity,
    pub origin: Vec3,
    pub dir: Vec3,
    pub range: f32,
    pub width: f32,
    pub duration: f32,
}

/// Летящий снаряд
#[derive(Component, Debug, Clone, Reflect)]
pub struct Projectile {
    pub attacker: Entity,
    pub faction: u64,
    pub velocity: Vec3,
    pub damage: u32,
    pub knockback: f32,
    pub max_range: f32,
    pub traveled: f32,
}

/// Живущий beam-инстанс (только lifetime для presentation)
#[derive(Component, Debug, Clone, Reflect)]
pub struct BeamVisual {
    pub lifetime: f32,
}

/// Система: запуск снарядов из FireProjectile events
pub fn launch_projectiles(
    mut commands: Commands,
    mut events: EventReader<FireProjectile>,
    pool: Option<ResMut<SpawnPool>>,
) {
    let mut pool = match pool {
        Some(pool) => pool,
        None => {
            for _ in events.read() {
                crate::log_warning("SpawnPool missing — projectile fire skipped");
            }
            return;
        }
    };

    for event in events.read() {
        if !pool.try_acquire(PooledPrefab::Projectile) {
            crate::log_warning("Projectile pool exhausted — shot dropped");
            continue;
        }

        let dir = Vec3::new(event.dir.x, 0.0, event.dir.z).normalize_or_zero();
        commands.spawn((
            Projectile {
                attacker: event.attacker,
                faction: event.faction,
                velocity: dir * event.speed,
                damage: event.damage,
                knockback: event.knockback,
                max_range: event.max_range,
                traveled: 0.0,
            },
            Transform::from_translation(event.origin),
        ));
    }
}

/// Система: полёт снарядов + импакт
///
/// Попадание: ближайший живой враг другой фракции в hit-радиусе.
/// Self-hit и friendly fire исключены фильтром фракции.
pub fn fly_projectiles(
    mut commands: Commands,
    mut projectiles: Query<(Entity, &mut Projectile, &mut Transform)>,
    targets: Query<(Entity, &Agent, &Transform, &Health), (With<Collidable>, Without<Projectile>)>,
    mut damage_events: EventWriter<DamagePacket>,
    mut pool: Option<ResMut<SpawnPool>>,
    time: Res<Time<Fixed>>,
) {
    let delta = time.delta_secs();

    for (entity, mut projectile, mut transform) in projectiles.iter_mut() {
        let step = projectile.velocity * delta;
        transform.translation += step;
        projectile.traveled += step.length();

        let mut despawn = projectile.traveled >= projectile.max_range;

        if !despawn {
            for (target, agent, target_transform, health) in targets.iter() {
                if agent.faction_id == projectile.faction || !health.is_alive() {
                    continue;
                }
                if transform
                    .translation
                    .distance(target_transform.translation)
                    > PROJECTILE_HIT_RADIUS
                {
                    continue;
                }

                let dir = projectile.velocity.normalize_or_zero();
                damage_events.write(DamagePacket {
                    attacker: projectile.attacker,
                    target,
                    amount: projectile.damage,
                    kind: DamageKind::Projectile,
                    knockback: dir * projectile.knockback,
                });
                despawn = true;
                break;
            }
        }

        if despawn {
            commands.entity(entity).despawn();
            if let Some(pool) = pool.as_mut() {
                pool.release(PooledPrefab::Projectile);
            }
        }
    }
}

/// Система: спавн beam-инстансов (визуал; урон уже разрешён)
pub fn launch_beams(
    mut commands: Commands,
    mut events: EventReader<FireBeam>,
    pool: Option<ResMut<SpawnPool>>,
) {
    let mut pool = match pool {
        Some(pool) => pool,
        None => {
            for _ in events.read() {
                crate::log_warning("SpawnPool missing — beam visual skipped");
            }
            return;
        }
    };

    for event in events.read() {
        if !pool.try_acquire(PooledPrefab::Beam) {
            crate::log_warning("Beam pool exhausted — visual skipped");
            continue;
        }

        commands.spawn((
            BeamVisual {
                lifetime: event.duration,
            },
            Transform::from_translation(event.origin)
                .looking_to(Vec3::new(event.dir.x, 0.0, event.dir.z).normalize_or_zero(), Vec3::Y),
        ));
    }
}

/// Система: затухание beam-инстансов
pub fn tick_beams(
    mut commands: Commands,
    mut beams: Query<(Entity, &mut BeamVisual)>,
    mut pool: Option<ResMut<SpawnPool>>,
    time: Res<Time<Fixed>>,
) {
    let delta = time.delta_secs();

    for (entity, mut beam) in beams.iter_mut() {
        beam.lifetime -= delta;
        if beam.lifetime <= 0.0 {
            commands.entity(entity).despawn();
            if let Some(pool) = pool.as_mut() {
                pool.release(PooledPrefab::Beam);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_capacity_bound() {
        let mut pool = SpawnPool::new(2, 1);

        assert!(pool.try_acquire(PooledPrefab::Projectile));
        assert!(pool.try_acquire(PooledPrefab::Projectile));
        assert!(!pool.try_acquire(PooledPrefab::Projectile)); // исчерпан

        pool.release(PooledPrefab::Projectile);
        assert!(pool.try_acquire(PooledPrefab::Projectile));
    }

    #[test]
    fn test_pool_kinds_are_independent() {
        let mut pool = SpawnPool::new(1, 1);
        assert!(pool.try_acquire(PooledPrefab::Projectile));
        assert!(pool.try_acquire(PooledPrefab::Beam));
        assert!(!pool.try_acquire(PooledPrefab::Projectile));
        assert_eq!(pool.live(PooledPrefab::Beam), 1);
    }

    #[test]
    fn test_release_saturates_at_zero() {
        let mut pool = SpawnPool::new(1, 1);
        pool.release(PooledPrefab::Beam); // release без acquire — no-op
        assert_eq!(pool.live(PooledPrefab::Beam), 0);
    }
}
