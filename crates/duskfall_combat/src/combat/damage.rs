//! Damage pipeline: применение payload'ов, смерть, poise/fear accrual
//!
//! Всё, что наносит урон (melee hit, projectile, beam), сходится в
//! DamagePacket. Здесь учитывается Defense-гейт цели (Block/PhaseLock),
//! урон снимает health и poise, накапливает fear, толкает knockback'ом.
//! Ядро не определяет внутренний учёт здоровья цели сверх этого.

use bevy::prelude::*;

use crate::arbiter::{AttackTokenArbiter, TokenSlot};
use crate::components::{Dead, Defense, Fear, Health, Poise};
use crate::movement::Motor;

/// Тип урона (для resistances/визуала на стороне presentation)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Reflect)]
pub enum DamageKind {
    Melee,
    Projectile,
    Beam,
}

/// Payload одного попадания (attacker → target)
#[derive(Event, Debug, Clone)]
pub struct DamagePacket {
    pub attacker: Entity,
    pub target: Entity,
    pub amount: u32,
    pub kind: DamageKind,
    /// Импульс: направление × магнитуда (уже посчитано при resolution)
    pub knockback: Vec3,
}

/// Event: урон нанесён (после Defense-гейта)
///
/// Используется presentation-слоем (hit flash, звук) и тестами.
#[derive(Event, Debug, Clone)]
pub struct DamageDealt {
    pub attacker: Entity,
    pub target: Entity,
    pub damage: u32,
    pub kind: DamageKind,
    pub target_died: bool,
}

/// Event: entity умер (health == 0)
#[derive(Event, Debug, Clone)]
pub struct EntityDied {
    pub entity: Entity,
    pub killer: Option<Entity>,
}

/// Сколько fear приносит единица урона
const FEAR_PER_DAMAGE: f32 = 1.0;

/// Система: применение DamagePacket'ов
pub fn apply_damage(
    mut packets: EventReader<DamagePacket>,
    mut dealt_events: EventWriter<DamageDealt>,
    mut died_events: EventWriter<EntityDied>,
    mut targets: Query<(
        &mut Health,
        &Defense,
        Option<&mut Poise>,
        Option<&mut Fear>,
        Option<&mut Motor>,
    )>,
) {
    for packet in packets.read() {
        if packet.attacker == packet.target {
            continue; // self-hit не бывает, но страхуемся
        }

        let Ok((mut health, defense, poise, fear, motor)) = targets.get_mut(packet.target)
        else {
            continue;
        };

        if defense.invulnerable {
            crate::log(&format!(
                "🛡️ {:?} invulnerable — {} damage negated",
                packet.target, packet.amount
            ));
            continue;
        }

        let final_damage = (packet.amount as f32 * defense.damage_scale).round() as u32;
        if final_damage == 0 {
            continue;
        }

        let was_alive = health.is_alive();
        health.take_damage(final_damage);
        let died = was_alive && !health.is_alive();

        if let Some(mut poise) = poise {
            poise.absorb(final_damage as f32);
        }
        if let Some(mut fear) = fear {
            fear.add(final_damage as f32 * FEAR_PER_DAMAGE);
        }
        if let Some(mut motor) = motor {
            motor.shove(packet.knockback);
        }

        dealt_events.write(DamageDealt {
            attacker: packet.attacker,
            target: packet.target,
            damage: final_damage,
            kind: packet.kind,
            target_died: died,
        });

        crate::log(&format!(
            "💥 {:?} → {:?}: {} damage ({:?}), HP left: {}",
            packet.attacker, packet.target, final_damage, packet.kind, health.current
        ));

        if died {
            died_events.write(EntityDied {
                entity: packet.target,
                killer: Some(packet.attacker),
            });
        }
    }
}

/// Система: спад страха со временем
pub fn decay_fear(mut fears: Query<&mut Fear>, time: Res<Time<Fixed>>) {
    let delta = time.delta_secs();
    for mut fear in fears.iter_mut() {
        if fear.current > 0.0 {
            fear.decay(delta);
        }
    }
}

/// Система: отключение мозга при смерти
///
/// Убирает Brain и останавливает Motor, возвращает удерживаемый токен
/// (труп не должен занимать attack-слот), ставит маркер Dead.
pub fn disable_brain_on_death(
    mut commands: Commands,
    mut death_events: EventReader<EntityDied>,
    arbiter: Option<Res<AttackTokenArbiter>>,
    mut bodies: Query<(Option<&mut Motor>, Option<&mut TokenSlot>)>,
) {
    for event in death_events.read() {
        if let Ok((motor, slot)) = bodies.get_mut(event.entity) {
            if let Some(mut motor) = motor {
                motor.stop();
            }
            if let Some(mut slot) = slot {
                if slot.held {
                    if let Some(arbiter) = arbiter.as_ref() {
                        arbiter.return_token(event.entity);
                    }
                    slot.held = false;
                }
            }
        }

        if let Ok(mut entity_commands) = commands.get_entity(event.entity) {
            entity_commands.remove::<crate::agent::Brain>();
            entity_commands.insert(Dead);
        }

        crate::log_info(&format!(
            "☠️ {:?} died (killer: {:?}) — brain disabled",
            event.entity, event.killer
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_damage_kind_eq() {
        assert_eq!(DamageKind::Melee, DamageKind::Melee);
        assert_ne!(DamageKind::Melee, DamageKind::Beam);
    }

    #[test]
    fn test_block_scale_rounding() {
        // 15 damage × 0.3 block scale → 5 (round half up на .5)
        let final_damage = (15.0_f32 * 0.3).round() as u32;
        assert_eq!(final_damage, 5);
    }
}
