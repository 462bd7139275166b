//! Hit-resolution: shape-based запросы без аллокаций
//!
//! Архитектура:
//! - Состояния НЕ трогают чужие entity напрямую: Active/Strike/TurretFire
//!   эмитят HitRequest, система резолвит его в той же итерации тика
//! - Resolver держит фиксированный переиспользуемый буфер результатов
//!   (clear() между вызовами, capacity сохраняется) — атака на агента
//!   раз в секунды, но агентов много, allocator-pressure недопустим
//! - Границы inclusive: цель ровно на radius / ровно на half-angle — попадание

use bevy::prelude::*;

use crate::components::{Agent, Collidable, Health, HitShape};
use crate::combat::damage::{DamageKind, DamagePacket};

/// Запрос на hit-resolution (ровно один на attack attempt)
#[derive(Event, Debug, Clone)]
pub struct HitRequest {
    pub attacker: Entity,
    /// Фракция атакующего (friendly fire отфильтровывается)
    pub faction: u64,
    pub origin: Vec3,
    /// Нормализованный горизонтальный facing
    pub facing: Vec3,
    pub shape: HitShape,
    pub damage: u32,
    pub knockback: f32,
    pub kind: DamageKind,
}

/// Resolver с переиспользуемым буфером результатов
#[derive(Resource)]
pub struct HitboxResolver {
    hits: Vec<(Entity, Vec3)>,
}

impl Default for HitboxResolver {
    fn default() -> Self {
        Self {
            hits: Vec::with_capacity(16),
        }
    }
}

impl HitboxResolver {
    /// Прогоняет кандидатов через shape-тест, заполняет внутренний буфер.
    /// Кандидаты приходят итератором (сам по себе ничего не аллоцирует);
    /// фильтрацию self/фракции делает вызывающий.
    pub fn resolve(
        &mut self,
        shape: &HitShape,
        origin: Vec3,
        facing: Vec3,
        candidates: impl Iterator<Item = (Entity, Vec3)>,
    ) -> &[(Entity, Vec3)] {
        self.hits.clear();

        for (entity, position) in candidates {
            if shape_contains(shape, origin, facing, position) {
                self.hits.push((entity, position));
            }
        }

        &self.hits
    }
}

/// Shape-тест одной точки (все проверки на XZ-плоскости)
fn shape_contains(shape: &HitShape, origin: Vec3, facing: Vec3, target: Vec3) -> bool {
    let flat_target = Vec3::new(target.x, 0.0, target.z);
    let flat_origin = Vec3::new(origin.x, 0.0, origin.z);
    let flat_facing = {
        let f = Vec3::new(facing.x, 0.0, facing.z);
        if f.length_squared() > 1e-6 {
            f.normalize()
        } else {
            Vec3::Z
        }
    };

    match *shape {
        HitShape::Circle { radius, offset } => {
            let center = flat_origin + flat_facing * offset;
            center.distance(flat_target) <= radius
        }
        HitShape::Cone {
            radius,
            half_angle,
            offset,
        } => {
            let center = flat_origin + flat_facing * offset;
            let to_target = flat_target - center;
            let distance = to_target.length();

            if distance > radius {
                return false;
            }
            // Цель в самом центре конуса — угол не определён, засчитываем
            if distance < 1e-4 {
                return true;
            }

            let cos = flat_facing.dot(to_target / distance).clamp(-1.0, 1.0);
            cos.acos() <= half_angle
        }
        HitShape::Beam { range, width, .. } => {
            let to_target = flat_target - flat_origin;
            let along = to_target.dot(flat_facing);

            if along < 0.0 || along > range {
                return false;
            }

            let closest = flat_origin + flat_facing * along;
            closest.distance(flat_target) <= width * 0.5
        }
    }
}

/// Система: hit-resolution всех HitRequest'ов тика
///
/// Каждый попавший collider проверяется на damageable capability (Health).
/// Попадание только по недамажируемой геометрии — warn один раз на запрос
/// (запрос = attack window), attempt при этом считается израсходованным:
/// повторного HitRequest в этом attack window не будет, guard лежит в
/// Active-состоянии.
pub fn resolve_hit_requests(
    mut requests: EventReader<HitRequest>,
    mut resolver: ResMut<HitboxResolver>,
    candidates: Query<(Entity, &Transform, Option<&Agent>, Option<&Health>), With<Collidable>>,
    mut damage_events: EventWriter<DamagePacket>,
) {
    for request in requests.read() {
        let hits = resolver.resolve(
            &request.shape,
            request.origin,
            request.facing,
            candidates.iter().filter_map(|(entity, transform, agent, _)| {
                if entity == request.attacker {
                    return None;
                }
                // Friendly fire: той же фракции не прилетает
                if let Some(agent) = agent {
                    if agent.faction_id == request.faction {
                        return None;
                    }
                }
                Some((entity, transform.translation))
            }),
        );

        let mut damageable_hits = 0usize;
        for &(entity, position) in hits {
            let Ok((_, _, _, health)) = candidates.get(entity) else {
                continue;
            };
            let Some(health) = health else {
                continue; // недамажируемая геометрия
            };
            if !health.is_alive() {
                continue;
            }

            damageable_hits += 1;

            // Knockback: от позиции атакующего к точке попадания
            let away = position - request.origin;
            let dir = Vec3::new(away.x, 0.0, away.z).normalize_or_zero();

            damage_events.write(DamagePacket {
                attacker: request.attacker,
                target: entity,
                amount: request.damage,
                kind: request.kind,
                knockback: dir * request.knockback,
            });
        }

        if !hits.is_empty() && damageable_hits == 0 {
            crate::log_warning(&format!(
                "Hit resolved {} collider(s) for {:?}, none damageable — attempt consumed",
                hits.len(),
                request.attacker
            ));
        }
    }
}
