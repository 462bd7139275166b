//! Agent-слой: Brain (outer-машина), interrupt-шаг, token sweep, архетипы
//!
//! Порядок одного тика для каждого агента (гарантия ordering):
//! 1. Perception/separation уже пересчитаны (SimSet::Perception)
//! 2. tick_brains: сборка BrainCtx → interrupts → машина → token sweep →
//!    write-back → дренаж actions в events
//! 3. apply_motor (SimSet::Movement), затем combat-pipeline (SimSet::Combat)

use bevy::prelude::*;
use rand::Rng;
use std::collections::HashSet;

pub mod ctx;
pub mod states;

pub use ctx::{AgentAction, BrainCtx};
pub use states::StateId;

use crate::arbiter::{release_tokens_on_room_change, AttackTokenArbiter, RoomChanged, TokenSlot};
use crate::combat::{FireBeam, FireProjectile, HitRequest};
use crate::components::{
    Agent, AgentVisual, AttackSpec, CombatCaps, CueColor, Dead, Defense, Fear, Health, HitShape,
    Poise, SpawnAnchor, StatBlock,
};
use crate::fsm::StateMachine;
use crate::movement::{apply_motor, compute_separation, Motor, SeparationForce};
use crate::perception::{update_perception, Perception, ThreatSensor};
use crate::SimSet;
use states::{
    holds_token_through, is_reactive, BlockState, ChaseState, CooldownState,
    DisengageState, DodgeState, EngageState, FlankState, FleeState, IdleState, LockState,
    OrbitState, PhaseLockState, ReturnState, RetreatState, ScanState, ShootState, StaggerState,
    StealthState, StrikeState, TurretFireState,
};

/// Дефолтный orbit-tuning в fail-open режиме (без арбитра)
const DEFAULT_ORBIT_RADIUS_MULT: f32 = 1.8;
const DEFAULT_ORBIT_SPEED: f32 = 1.1;

/// Мозг агента: outer-машина + переиспользуемый action-буфер
///
/// Состояния строятся ровно один раз на lifetime контекста (spawn) и
/// мутируются in place через on_enter; вложенная attack-машина Engage
/// пересобирается на каждый commitment.
#[derive(Component)]
pub struct Brain {
    machine: StateMachine<StateId, BrainCtx>,
    /// Стартовое состояние (initialize лениво на первом тике — нужен ctx)
    initial: StateId,
    /// Переиспользуемый буфер effects (без пер-тиковых аллокаций)
    actions: Vec<AgentAction>,
    /// ±1: направление orbit/scan, выбрано при спавне
    orbit_sign: f32,
    /// Cooldown между Dodge/Block реакциями
    reaction_timer: f32,
}

impl Brain {
    /// Собирает машину под capabilities агента
    pub fn for_caps(caps: &CombatCaps, orbit_sign: f32) -> Self {
        let mut machine: StateMachine<StateId, BrainCtx> = StateMachine::new();

        let initial = if caps.is_stationary {
            // Турель: scan-цикл
            machine.insert(StateId::Scan, Box::new(ScanState));
            machine.insert(StateId::Lock, Box::new(LockState::new()));
            machine.insert(StateId::TurretFire, Box::new(TurretFireState::new()));
            machine.insert(StateId::Cooldown, Box::new(CooldownState::new()));
            StateId::Scan
        } else if caps.has_stealth {
            // Assassin: stealth-цикл
            machine.insert(StateId::Stealth, Box::new(StealthState));
            machine.insert(StateId::Flank, Box::new(FlankState::new()));
            machine.insert(StateId::Strike, Box::new(StrikeState::new()));
            machine.insert(StateId::Disengage, Box::new(DisengageState::new()));
            StateId::Stealth
        } else {
            // Общая pursuit-цепочка
            machine.insert(StateId::Idle, Box::new(IdleState));
            machine.insert(StateId::Chase, Box::new(ChaseState));
            machine.insert(StateId::Orbit, Box::new(OrbitState::new()));
            machine.insert(StateId::Return, Box::new(ReturnState));
            if caps.can_ranged {
                machine.insert(StateId::Shoot, Box::new(ShootState::new()));
                machine.insert(StateId::Retreat, Box::new(RetreatState));
            }
            if caps.can_melee {
                machine.insert(StateId::Engage, Box::new(EngageState::new()));
            }
            StateId::Idle
        };

        // Reactive-слой по capabilities
        machine.insert(StateId::Stagger, Box::new(StaggerState::new()));
        machine.insert(StateId::PhaseLock, Box::new(PhaseLockState::new()));
        if !caps.is_stationary {
            machine.insert(StateId::Flee, Box::new(FleeState::new()));
        }
        if caps.can_dodge {
            machine.insert(StateId::Dodge, Box::new(DodgeState::new()));
        }
        if caps.can_block {
            machine.insert(StateId::Block, Box::new(BlockState::new()));
        }

        Self {
            machine,
            initial,
            actions: Vec::with_capacity(4),
            orbit_sign,
            reaction_timer: 0.0,
        }
    }

    /// Активное outer-состояние (None только до первого тика)
    pub fn current_state(&self) -> Option<StateId> {
        self.machine.current()
    }
}

/// Event: phase controller форсит boss-переход
#[derive(Event, Debug, Clone)]
pub struct ForcePhaseLock {
    pub entity: Entity,
}

/// Event: PhaseLock отработал (слушает внешний phase controller)
#[derive(Event, Debug, Clone)]
pub struct PhaseLockComplete {
    pub entity: Entity,
}

/// Что восстанавливаем
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreKind {
    /// Полный pool-reset при возврате на spawn (HP, poise, fear)
    Full,
    /// Только poise (конец Stagger)
    PoiseOnly,
}

/// Event: запрос восстановления статов агента
#[derive(Event, Debug, Clone)]
pub struct AgentRestore {
    pub entity: Entity,
    pub kind: RestoreKind,
}

/// Система: главный brain-тик (одна итерация машины на агента)
pub fn tick_brains(
    mut agents: Query<
        (
            (
                Entity,
                &Agent,
                &mut Brain,
                &Transform,
                &CombatCaps,
                &StatBlock,
                Option<&AttackSpec>,
                &Perception,
                Option<&ThreatSensor>,
                &SpawnAnchor,
                &SeparationForce,
            ),
            (
                &mut Motor,
                &mut AgentVisual,
                &mut Defense,
                &mut TokenSlot,
                &Poise,
                &Fear,
            ),
        ),
        Without<Dead>,
    >,
    arbiter: Option<Res<AttackTokenArbiter>>,
    mut force_events: EventReader<ForcePhaseLock>,
    mut hit_events: EventWriter<HitRequest>,
    mut projectile_events: EventWriter<FireProjectile>,
    mut beam_events: EventWriter<FireBeam>,
    mut restore_events: EventWriter<AgentRestore>,
    mut phase_events: EventWriter<PhaseLockComplete>,
    time: Res<Time<Fixed>>,
) {
    let delta = time.delta_secs();
    let forced: HashSet<Entity> = force_events.read().map(|event| event.entity).collect();
    let arbiter_handle = arbiter.map(|resource| resource.clone());

    for (
        (entity, agent, mut brain, transform, caps, stats, attack, perception, threat, anchor, separation),
        (mut motor, mut visual, mut defense, mut slot, poise, fear),
    ) in agents.iter_mut()
    {
        let Brain {
            machine,
            initial,
            actions,
            orbit_sign,
            reaction_timer,
        } = &mut *brain;

        // Defense нейтралится каждый тик: Block/PhaseLock переутверждают
        let mut neutral_defense = *defense;
        neutral_defense.neutral();

        let mut ctx = BrainCtx {
            entity,
            faction_id: agent.faction_id,
            position: transform.translation,
            spawn_point: anchor.position,
            perception: perception.snapshot(),
            threat: threat
                .map(|sensor| sensor.snapshot())
                .unwrap_or_else(|| ThreatSensor::default().snapshot()),
            stats: stats.clone(),
            attack: attack.cloned(),
            caps: *caps,
            separation: separation.0,
            orbit_sign: *orbit_sign,
            orbit_radius_multiplier: arbiter_handle
                .as_ref()
                .map(|a| a.orbit_radius_multiplier)
                .unwrap_or(DEFAULT_ORBIT_RADIUS_MULT),
            orbit_speed: arbiter_handle
                .as_ref()
                .map(|a| a.orbit_speed)
                .unwrap_or(DEFAULT_ORBIT_SPEED),
            arbiter: arbiter_handle.clone(),
            token_held: slot.held,
            motor: motor.clone(),
            visual: visual.clone(),
            defense: neutral_defense,
            actions: std::mem::take(actions),
        };

        // Ленивая инициализация: initialize требует ctx
        if machine.current().is_none() {
            machine.initialize(*initial, &mut ctx);
        }

        // --- Interrupt-шаг (до тика машины) ---
        *reaction_timer = (*reaction_timer - delta).max(0.0);
        let current = machine.current().unwrap_or(*initial);

        if forced.contains(&entity) {
            // Boss phase transition перекрывает всё
            if current != StateId::PhaseLock {
                machine.transition_to(StateId::PhaseLock, &mut ctx);
            }
        } else if !matches!(current, StateId::Stagger | StateId::PhaseLock) {
            if poise.is_broken() {
                machine.transition_to(StateId::Stagger, &mut ctx);
            } else if fear.is_panicked() && !caps.is_stationary && current != StateId::Flee {
                machine.transition_to(StateId::Flee, &mut ctx);
            } else if ctx.threat.detected && *reaction_timer <= 0.0 && !is_reactive(current) {
                if caps.can_dodge {
                    machine.transition_to(StateId::Dodge, &mut ctx);
                    *reaction_timer = stats.reaction_cooldown;
                } else if caps.can_block {
                    machine.transition_to(StateId::Block, &mut ctx);
                    *reaction_timer = stats.reaction_cooldown;
                }
            }
        }

        // --- Основной тик машины ---
        machine.tick(&mut ctx, delta);

        // --- Token sweep: гарантия возврата на любом выходе из
        // attack-adjacent состояний (включая interrupts) ---
        if ctx.token_held {
            let state = machine.current().unwrap_or(*initial);
            if !holds_token_through(state) {
                ctx.return_token();
            }
        }

        // --- Write-back ---
        *motor = ctx.motor.clone();
        *visual = ctx.visual.clone();
        *defense = ctx.defense;
        slot.held = ctx.token_held;

        // --- Дренаж effects в events ---
        for action in ctx.actions.drain(..) {
            match action {
                AgentAction::Hit {
                    shape,
                    origin,
                    facing,
                    damage,
                    knockback,
                    kind,
                } => {
                    hit_events.write(HitRequest {
                        attacker: entity,
                        faction: agent.faction_id,
                        origin,
                        facing,
                        shape,
                        damage,
                        knockback,
                        kind,
                    });
                }
                AgentAction::FireProjectile {
                    dir,
                    damage,
                    speed,
                    knockback,
                    max_range,
                } => {
                    projectile_events.write(FireProjectile {
                        attacker: entity,
                        faction: agent.faction_id,
                        origin: transform.translation + dir * 0.5,
                        dir,
                        speed,
                        damage,
                        knockback,
                        max_range,
                    });
                }
                AgentAction::FireBeam {
                    dir,
                    range,
                    width,
                    duration,
                } => {
                    beam_events.write(FireBeam {
                        attacker: entity,
                        origin: transform.translation,
                        dir,
                        range,
                        width,
                        duration,
                    });
                }
                AgentAction::PhaseLockComplete => {
                    phase_events.write(PhaseLockComplete { entity });
                }
                AgentAction::RestoreToSpawn => {
                    restore_events.write(AgentRestore {
                        entity,
                        kind: RestoreKind::Full,
                    });
                }
                AgentAction::ResetPoise => {
                    restore_events.write(AgentRestore {
                        entity,
                        kind: RestoreKind::PoiseOnly,
                    });
                }
            }
        }

        // Буфер возвращается мозгу (capacity сохранена)
        *actions = ctx.actions;
    }
}

/// Система: применение AgentRestore (pool-reset / poise reset)
pub fn apply_agent_restores(
    mut events: EventReader<AgentRestore>,
    mut agents: Query<(&mut Health, &mut Poise, &mut Fear)>,
) {
    for event in events.read() {
        let Ok((mut health, mut poise, mut fear)) = agents.get_mut(event.entity) else {
            continue;
        };

        match event.kind {
            RestoreKind::Full => {
                health.restore_full();
                poise.reset();
                fear.calm();
                crate::log(&format!("♻️ {:?} restored at spawn (full reset)", event.entity));
            }
            RestoreKind::PoiseOnly => {
                poise.reset();
            }
        }
    }
}

// ============================================================================
// Spawn helpers (архетипы)
// ============================================================================

fn spawn_agent_with(
    commands: &mut Commands,
    position: Vec3,
    faction: u64,
    caps: CombatCaps,
    stats: StatBlock,
    attack: Option<AttackSpec>,
    rng: &mut impl Rng,
) -> Entity {
    let orbit_sign = if rng.gen_bool(0.5) { 1.0 } else { -1.0 };

    let mut entity_commands = commands.spawn((
        Agent {
            faction_id: faction,
        },
        Transform::from_translation(position),
        SpawnAnchor { position },
        caps,
        stats,
        Brain::for_caps(&caps, orbit_sign),
        Perception::default(),
        ThreatSensor::default(),
        SeparationForce::default(),
        Motor::default(),
        TokenSlot::default(),
    ));

    if let Some(attack) = attack {
        entity_commands.insert(attack);
    }

    entity_commands.id()
}

/// Melee bruiser (legacy flat-stat атака — AttackSpec не назначен)
pub fn spawn_melee_agent(
    commands: &mut Commands,
    position: Vec3,
    faction: u64,
    rng: &mut impl Rng,
) -> Entity {
    spawn_agent_with(
        commands,
        position,
        faction,
        CombatCaps::melee(),
        StatBlock::melee_grunt(),
        None,
        rng,
    )
}

/// Ranged gunner (burst fire)
pub fn spawn_ranged_agent(
    commands: &mut Commands,
    position: Vec3,
    faction: u64,
    rng: &mut impl Rng,
) -> Entity {
    spawn_agent_with(
        commands,
        position,
        faction,
        CombatCaps::ranged(),
        StatBlock::gunner(),
        None,
        rng,
    )
}

/// Стационарная турель с beam-атакой
pub fn spawn_turret_agent(
    commands: &mut Commands,
    position: Vec3,
    faction: u64,
    rng: &mut impl Rng,
) -> Entity {
    let beam = AttackSpec {
        telegraph_duration: 0.0,
        active_duration: 0.0,
        recovery_duration: 0.0,
        damage: 12,
        knockback: 2.0,
        shape: HitShape::Beam {
            range: 15.0,
            width: 0.6,
            duration: 0.4,
        },
        cue: CueColor::LOCK_AMBER,
    };
    spawn_agent_with(
        commands,
        position,
        faction,
        CombatCaps::turret(),
        StatBlock::turret(),
        Some(beam),
        rng,
    )
}

/// Assassin с cone-backstab AttackSpec
pub fn spawn_assassin_agent(
    commands: &mut Commands,
    position: Vec3,
    faction: u64,
    rng: &mut impl Rng,
) -> Entity {
    let backstab = AttackSpec {
        telegraph_duration: 0.15,
        active_duration: 0.1,
        recovery_duration: 0.4,
        damage: 30,
        knockback: 2.0,
        shape: HitShape::Cone {
            radius: 2.0,
            half_angle: 0.7,
            offset: 0.5,
        },
        cue: CueColor::STRIKE_VIOLET,
    };
    spawn_agent_with(
        commands,
        position,
        faction,
        CombatCaps::assassin(),
        StatBlock::assassin(),
        Some(backstab),
        rng,
    )
}

/// Agent Plugin
///
/// Регистрирует perception → brains → movement в FixedUpdate (SimSet
/// задаёт порядок между группами; внутри групп — .chain()).
pub struct AgentPlugin;

impl Plugin for AgentPlugin {
    fn build(&self, app: &mut App) {
        app.add_event::<ForcePhaseLock>()
            .add_event::<PhaseLockComplete>()
            .add_event::<AgentRestore>()
            .add_event::<RoomChanged>();

        app.add_systems(
            FixedUpdate,
            (update_perception, compute_separation)
                .chain()
                .in_set(SimSet::Perception),
        );

        app.add_systems(
            FixedUpdate,
            (release_tokens_on_room_change, tick_brains, apply_agent_restores)
                .chain()
                .in_set(SimSet::Brains),
        );

        app.add_systems(FixedUpdate, apply_motor.in_set(SimSet::Movement));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brain_state_sets_per_archetype() {
        let melee = Brain::for_caps(&CombatCaps::melee(), 1.0);
        assert_eq!(melee.initial, StateId::Idle);

        let turret = Brain::for_caps(&CombatCaps::turret(), 1.0);
        assert_eq!(turret.initial, StateId::Scan);

        let assassin = Brain::for_caps(&CombatCaps::assassin(), 1.0);
        assert_eq!(assassin.initial, StateId::Stealth);

        let ranged = Brain::for_caps(&CombatCaps::ranged(), 1.0);
        assert_eq!(ranged.initial, StateId::Idle);
    }

    #[test]
    fn test_brain_starts_uninitialized() {
        // initialize требует ctx → лениво на первом тике
        let brain = Brain::for_caps(&CombatCaps::melee(), 1.0);
        assert!(brain.current_state().is_none());
    }

    #[test]
    fn test_fallback_used_by_reactive() {
        // Smoke: fallback для melee с целью — Chase (подробнее в states)
        let mut perception = Perception::default();
        perception.has_target = true;
        assert_eq!(
            states::fallback_state(&CombatCaps::melee(), &perception.snapshot()),
            StateId::Chase
        );
    }
}
