//! Attack-token arbiter: admission control для одновременных атак
//!
//! Глобальный лимит на число агентов, которым разрешено коммититься в атаку
//! одновременно ("movie-feel": бьёт подмножество, остальные кружат рядом).
//!
//! Не singleton: явно сконструированный ресурс, инжектится при сборке app —
//! тесты поднимают изолированные арбитры с нужной capacity. Token-set
//! спрятан за Mutex: ECS-scheduler может гонять agent-системы параллельно,
//! а request/return — это read-modify-write общего счётчика.
//!
//! Fail-open: если ресурса нет (solo-тесты отдельного агента), каждый
//! запрос считается granted — см. BrainCtx::request_token.

use bevy::prelude::*;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

struct ArbiterInner {
    capacity: usize,
    holders: HashSet<Entity>,
    /// Диагностика: всего запросов (orbit-throttling тесты)
    total_requests: u64,
}

/// Арбитр атакующих токенов (shared service, клонируется дёшево)
#[derive(Resource, Clone)]
pub struct AttackTokenArbiter {
    inner: Arc<Mutex<ArbiterInner>>,
    /// Orbit-кольцо: standoff-радиус = attack_range × этот множитель
    pub orbit_radius_multiplier: f32,
    /// Угловая скорость кружения (rad/s)
    pub orbit_speed: f32,
}

impl AttackTokenArbiter {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ArbiterInner {
                capacity,
                holders: HashSet::new(),
                total_requests: 0,
            })),
            orbit_radius_multiplier: 1.8,
            orbit_speed: 1.1,
        }
    }

    /// Выдаёт токен если |held| < capacity. Отказ — без side effects.
    /// Повторный запрос держателя — no-op "уже granted".
    pub fn request_token(&self, agent: Entity) -> bool {
        let mut inner = self.inner.lock().unwrap();
        inner.total_requests += 1;

        if inner.holders.contains(&agent) {
            return true;
        }
        if inner.holders.len() < inner.capacity {
            inner.holders.insert(agent);
            true
        } else {
            false
        }
    }

    /// Возврат токена; идемпотентен (возврат без владения — no-op).
    pub fn return_token(&self, agent: Entity) {
        self.inner.lock().unwrap().holders.remove(&agent);
    }

    /// Bulk-release: дёргается room/level-системой на смене комнаты,
    /// чтобы не тащить stale-холды из прошлого контекста.
    pub fn return_all_tokens(&self) {
        self.inner.lock().unwrap().holders.clear();
    }

    pub fn holds(&self, agent: Entity) -> bool {
        self.inner.lock().unwrap().holders.contains(&agent)
    }

    pub fn held_count(&self) -> usize {
        self.inner.lock().unwrap().holders.len()
    }

    pub fn capacity(&self) -> usize {
        self.inner.lock().unwrap().capacity
    }

    pub fn total_requests(&self) -> u64 {
        self.inner.lock().unwrap().total_requests
    }
}

/// Вера агента в то, что он держит токен
///
/// Арбитр — ground truth по capacity; slot — локальный флаг, по которому
/// состояния и post-tick sweep решают возвращать ли токен. Работает и
/// в fail-open режиме (без арбитра).
#[derive(Component, Debug, Clone, Copy, Default, Reflect)]
#[reflect(Component)]
pub struct TokenSlot {
    pub held: bool,
}

/// Event: игрок сменил комнату (room/level lifecycle hook)
#[derive(Event, Debug, Clone)]
pub struct RoomChanged;

/// Система: bulk-release токенов на смене комнаты
pub fn release_tokens_on_room_change(
    mut events: EventReader<RoomChanged>,
    arbiter: Option<Res<AttackTokenArbiter>>,
    mut slots: Query<&mut TokenSlot>,
) {
    let mut changed = false;
    for _ in events.read() {
        changed = true;
    }
    if !changed {
        return;
    }

    if let Some(arbiter) = arbiter.as_ref() {
        arbiter.return_all_tokens();
    }
    for mut slot in slots.iter_mut() {
        slot.held = false;
    }
    crate::log_info("🚪 Room changed → all attack tokens returned");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_bound() {
        let arbiter = AttackTokenArbiter::new(2);
        let a = Entity::from_raw(1);
        let b = Entity::from_raw(2);
        let c = Entity::from_raw(3);

        assert!(arbiter.request_token(a));
        assert!(arbiter.request_token(b));
        assert!(!arbiter.request_token(c)); // capacity исчерпана
        assert_eq!(arbiter.held_count(), 2);

        arbiter.return_token(a);
        assert!(arbiter.request_token(c)); // слот освободился
        assert_eq!(arbiter.held_count(), 2);
    }

    #[test]
    fn test_return_is_idempotent() {
        let arbiter = AttackTokenArbiter::new(1);
        let a = Entity::from_raw(1);

        assert!(arbiter.request_token(a));
        arbiter.return_token(a);
        arbiter.return_token(a); // повторный возврат — no-op
        arbiter.return_token(Entity::from_raw(99)); // возврат без владения — no-op
        assert_eq!(arbiter.held_count(), 0);
    }

    #[test]
    fn test_repeat_request_from_holder_is_granted() {
        let arbiter = AttackTokenArbiter::new(1);
        let a = Entity::from_raw(1);

        assert!(arbiter.request_token(a));
        assert!(arbiter.request_token(a)); // уже держит — granted
        assert_eq!(arbiter.held_count(), 1);
    }

    #[test]
    fn test_return_all() {
        let arbiter = AttackTokenArbiter::new(4);
        for i in 1..=4 {
            assert!(arbiter.request_token(Entity::from_raw(i)));
        }
        arbiter.return_all_tokens();
        assert_eq!(arbiter.held_count(), 0);
    }

    #[test]
    fn test_denied_request_has_no_side_effect() {
        let arbiter = AttackTokenArbiter::new(1);
        let a = Entity::from_raw(1);
        let b = Entity::from_raw(2);

        assert!(arbiter.request_token(a));
        assert!(!arbiter.request_token(b));
        assert!(!arbiter.holds(b));
        assert!(arbiter.holds(a));
    }

    #[test]
    fn test_request_counter() {
        let arbiter = AttackTokenArbiter::new(1);
        let a = Entity::from_raw(1);
        let b = Entity::from_raw(2);

        arbiter.request_token(a);
        arbiter.request_token(b);
        arbiter.request_token(b);
        assert_eq!(arbiter.total_requests(), 3);
    }
}
