//! Generic FSM engine (используется на обоих уровнях вложенности).
//!
//! Один и тот же контейнер обслуживает:
//! - внешний behavior-цикл агента (Idle/Chase/Orbit/...)
//! - внутреннюю attack-последовательность внутри commitment-состояния
//!
//! Контракт:
//! - ровно одно активное состояние после `initialize` (ноль — только до неё)
//! - `tick` вызывает `on_update` текущего состояния; запрошенный переход
//!   применяется ПОСЛЕ возврата из `on_update` (последнее действие тика)
//! - `transition_to` можно дёргать и снаружи (interrupts); каждый вызов
//!   честно прогоняет пару `on_exit`/`on_enter`, последний вызов побеждает
//! - повторный переход в то же состояние НЕ special-case: exit + enter
//!   выполняются как обычно (состояние пере-инициализирует свои таймеры)

use std::collections::HashMap;
use std::fmt::Debug;
use std::hash::Hash;

/// Полиморфное состояние с тремя callbacks.
///
/// Состояния строятся один раз на контекст (внешний уровень) либо
/// пересоздаются на каждый вход в commitment (внутренний уровень) и мутируют
/// собственные поля (таймеры, флаги) in place через `on_enter`.
pub trait State<K, C>: Send + Sync {
    fn on_enter(&mut self, _ctx: &mut C) {}

    /// Возвращает ключ следующего состояния, если пора переходить.
    /// Не больше одного запроса за тик — это последнее действие состояния.
    fn on_update(&mut self, ctx: &mut C, dt: f32) -> Option<K>;

    fn on_exit(&mut self, _ctx: &mut C) {}
}

/// Контейнер с единственным активным состоянием.
///
/// Состояния сложены в map по ключу и построены заранее (не на переход).
pub struct StateMachine<K, C> {
    states: HashMap<K, Box<dyn State<K, C>>>,
    current: Option<K>,
}

impl<K, C> StateMachine<K, C>
where
    K: Copy + Eq + Hash + Debug,
{
    pub fn new() -> Self {
        Self {
            states: HashMap::new(),
            current: None,
        }
    }

    /// Регистрирует состояние под ключом (до `initialize`).
    pub fn insert(&mut self, key: K, state: Box<dyn State<K, C>>) {
        self.states.insert(key, state);
    }

    /// Активирует стартовое состояние и вызывает его `on_enter`.
    pub fn initialize(&mut self, key: K, ctx: &mut C) {
        if let Some(state) = self.states.get_mut(&key) {
            self.current = Some(key);
            state.on_enter(ctx);
        } else {
            crate::log_error(&format!("FSM: initialize with unknown state {:?}", key));
        }
    }

    /// Ключ активного состояния (None только до `initialize`).
    pub fn current(&self) -> Option<K> {
        self.current
    }

    pub fn is_in(&self, key: K) -> bool {
        self.current == Some(key)
    }

    /// Один симуляционный тик: `on_update` активного состояния, затем
    /// применение запрошенного перехода (если был).
    pub fn tick(&mut self, ctx: &mut C, dt: f32) {
        let Some(key) = self.current else {
            return;
        };
        let Some(state) = self.states.get_mut(&key) else {
            return;
        };

        if let Some(next) = state.on_update(ctx, dt) {
            self.transition_to(next, ctx);
        }
    }

    /// Переход: `current.on_exit()` → замена ссылки → `next.on_enter()`.
    ///
    /// Неизвестный ключ: логируем и остаёмся в текущем состоянии
    /// (агент замирает, но симуляция не падает).
    pub fn transition_to(&mut self, next: K, ctx: &mut C) {
        if !self.states.contains_key(&next) {
            crate::log_error(&format!("FSM: transition to unknown state {:?}", next));
            return;
        }

        if let Some(key) = self.current {
            if let Some(state) = self.states.get_mut(&key) {
                state.on_exit(ctx);
            }
        }

        self.current = Some(next);
        if let Some(state) = self.states.get_mut(&next) {
            state.on_enter(ctx);
        }
    }
}

impl<K, C> Default for StateMachine<K, C>
where
    K: Copy + Eq + Hash + Debug,
{
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Probe-состояние: пишет свои callbacks в общий журнал.
    struct Probe {
        name: &'static str,
        next: Option<u8>,
    }

    impl State<u8, Vec<String>> for Probe {
        fn on_enter(&mut self, log: &mut Vec<String>) {
            log.push(format!("{}:enter", self.name));
        }

        fn on_update(&mut self, log: &mut Vec<String>, _dt: f32) -> Option<u8> {
            log.push(format!("{}:update", self.name));
            self.next
        }

        fn on_exit(&mut self, log: &mut Vec<String>) {
            log.push(format!("{}:exit", self.name));
        }
    }

    fn machine_with(a_next: Option<u8>) -> StateMachine<u8, Vec<String>> {
        let mut fsm = StateMachine::new();
        fsm.insert(0, Box::new(Probe { name: "a", next: a_next }));
        fsm.insert(1, Box::new(Probe { name: "b", next: None }));
        fsm.insert(2, Box::new(Probe { name: "c", next: None }));
        fsm
    }

    #[test]
    fn test_initialize_calls_on_enter() {
        let mut log = Vec::new();
        let mut fsm = machine_with(None);
        fsm.initialize(0, &mut log);

        assert_eq!(fsm.current(), Some(0));
        assert_eq!(log, vec!["a:enter"]);
    }

    #[test]
    fn test_update_transition_is_last_action() {
        let mut log = Vec::new();
        let mut fsm = machine_with(Some(1));
        fsm.initialize(0, &mut log);
        fsm.tick(&mut log, 0.1);

        assert_eq!(fsm.current(), Some(1));
        assert_eq!(log, vec!["a:enter", "a:update", "a:exit", "b:enter"]);
    }

    #[test]
    fn test_double_external_transition_fires_both_pairs() {
        // Политика: каждый вызов transition_to прогоняет exit/enter,
        // последний вызов определяет активное состояние.
        let mut log = Vec::new();
        let mut fsm = machine_with(None);
        fsm.initialize(0, &mut log);

        fsm.transition_to(1, &mut log);
        fsm.transition_to(2, &mut log);

        assert_eq!(fsm.current(), Some(2));
        assert_eq!(
            log,
            vec!["a:enter", "a:exit", "b:enter", "b:exit", "c:enter"]
        );
    }

    #[test]
    fn test_reentrant_transition_runs_exit_then_enter() {
        let mut log = Vec::new();
        let mut fsm = machine_with(None);
        fsm.initialize(0, &mut log);

        fsm.transition_to(0, &mut log);

        assert_eq!(fsm.current(), Some(0));
        assert_eq!(log, vec!["a:enter", "a:exit", "a:enter"]);
    }

    #[test]
    fn test_unknown_target_keeps_current_state() {
        let mut log = Vec::new();
        let mut fsm = machine_with(None);
        fsm.initialize(0, &mut log);

        fsm.transition_to(42, &mut log);

        // Без exit/enter, машина осталась в прежнем состоянии
        assert_eq!(fsm.current(), Some(0));
        assert_eq!(log, vec!["a:enter"]);
    }

    #[test]
    fn test_exactly_one_active_state() {
        let mut log = Vec::new();
        let mut fsm = machine_with(Some(1));
        assert!(fsm.current().is_none()); // до initialize — ноль состояний

        fsm.initialize(0, &mut log);
        for _ in 0..10 {
            fsm.tick(&mut log, 0.1);
            assert!(fsm.current().is_some());
        }
    }
}
