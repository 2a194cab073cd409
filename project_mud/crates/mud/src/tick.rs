use std::sync::Arc;

use engine_core::{TickReport, TickSystem};
use registry::Category;

use crate::combat::{self, Attack};
use crate::combatant::{self, CreatureState};
use crate::commands;
use crate::entity::{Describable, Entity, Movable, Player};
use crate::world::World;

/// Chance weight of a wandering creature staying put, against one per exit.
const STAY_WEIGHT: usize = 3;

/// Combat, creature behavior and regeneration, one sweep per tick.
pub struct CombatEngine {
    world: Arc<World>,
}

impl CombatEngine {
    pub fn new(world: Arc<World>) -> Self {
        Self { world }
    }
}

impl TickSystem for CombatEngine {
    fn on_tick(&mut self, tick: u64) -> TickReport {
        // A save holds the world; skip rather than stall the tick thread.
        let Some(_permit) = self.world.barrier().try_enter() else {
            tracing::debug!(tick, "save in progress, tick skipped");
            return TickReport::default();
        };
        run_tick(&self.world, tick)
    }
}

/// One full sweep. Callers must already hold a mutation permit.
pub fn run_tick(world: &World, tick: u64) -> TickReport {
    world.set_tick(tick);
    let mut report = TickReport::default();

    for creature in world.registry().category(Category::Creature) {
        if creature_turn(world, &creature, tick) {
            report.actions += 1;
        }
    }

    for (_, player) in world.registry().active_players() {
        if player_turn(world, &player, tick) {
            report.actions += 1;
        }
    }

    let interval = world.settings().regen_interval;
    if interval > 0 && tick % interval == 0 {
        regenerate(world);
    }

    report.combatants = world
        .registry()
        .category(Category::Creature)
        .iter()
        .chain(world.registry().category(Category::Player).iter())
        .filter(|e| e.combatant().and_then(|c| c.engaged_with()).is_some())
        .count();
    report
}

/// Advance one creature's state machine. True if it did something.
fn creature_turn(world: &World, creature: &Arc<Entity>, tick: u64) -> bool {
    let Some(combat) = creature.combatant() else {
        return false;
    };
    match combat.state() {
        CreatureState::DormantDead => combat.respawn_due(tick) && combat::respawn(world, creature),
        CreatureState::Cooldown => {
            combat.tick_cooldown();
            false
        }
        CreatureState::Engaged => fight_on(world, creature),
        CreatureState::Idle => {
            let players = world
                .area_of(creature)
                .map(|area| world.players_in(&area))
                .unwrap_or_default();
            if !players.is_empty() {
                pick_a_fight(world, creature, &players)
            } else {
                wander(world, creature)
            }
        }
    }
}

/// Idle creature with players around: try to spot one and attack.
fn pick_a_fight(world: &World, creature: &Arc<Entity>, players: &[Arc<Entity>]) -> bool {
    let Some(me) = creature.combatant() else {
        return false;
    };
    let attack_roll = world.dice().d20() + me.abilities.int_mod();
    for player in players {
        let Some(them) = player.combatant() else {
            continue;
        };
        let defend_roll = world.dice().d20() + them.abilities.dex_mod() + them.size.modifier();
        if attack_roll <= defend_roll {
            continue;
        }
        if combatant::engage((creature.id(), me), (player.id(), them)).is_err() {
            continue;
        }
        tracing::debug!(creature = %creature.id(), player = %player.id(), "creature engages");
        world.message_player(player.id(), &format!("{} attacks you!", creature.name()));
        if let Some(area) = creature.location() {
            world.message_area_players(
                area,
                &format!("{} attacks {}!", creature.name(), player.name()),
                &[player.id()],
            );
        }
        let attack = combat::creature_attack(world, creature);
        combat::strike(world, creature, player, &attack);
        me.set_cooldown(me.action_cooldown());
        return true;
    }
    me.set_cooldown(me.action_cooldown());
    false
}

/// Engaged creature: hit the opponent if it is still here, otherwise chase
/// or give up.
fn fight_on(world: &World, creature: &Arc<Entity>) -> bool {
    let Some(me) = creature.combatant() else {
        return false;
    };
    let Some(partner_id) = me.engaged_with() else {
        return false;
    };
    let partner = world.get(partner_id);
    let Some(partner) = partner.filter(|p| p.combatant().is_some_and(|c| c.is_alive())) else {
        world.break_engagement(creature);
        return false;
    };
    // Hibernated players have left the world even if their location stays.
    let present = partner.location() == creature.location()
        && (!partner.is_player() || world.registry().is_active(partner_id));

    if present {
        let attack = combat::creature_attack(world, creature);
        combat::strike(world, creature, &partner, &attack);
        me.set_cooldown(me.action_cooldown());
        return true;
    }

    let ambulatory = creature.as_creature().is_some_and(|c| c.ambulatory);
    let pursued = ambulatory
        && partner.combatant().is_some_and(|them| combat::spot_contest(world, me, them))
        && pursue(world, creature, &partner);
    if !pursued {
        world.break_engagement(creature);
        tracing::debug!(creature = %creature.id(), partner = %partner_id, "creature loses track of opponent");
    }
    me.set_cooldown(me.action_cooldown());
    pursued
}

/// Follow the partner through an exit leading straight to it.
fn pursue(world: &World, creature: &Arc<Entity>, partner: &Entity) -> bool {
    let Some(target_area) = partner.location() else {
        return false;
    };
    let Some(here) = world.area_of(creature) else {
        return false;
    };
    let Some(exit) = here.as_area().and_then(|a| a.exit_towards(target_area)) else {
        return false;
    };
    world.message_area_players(here.id(), &format!("{} runs {}.", creature.name(), exit.name), &[]);
    if !world.move_to(creature, target_area) {
        return false;
    }
    world.message_area_players(
        target_area,
        &format!("{} charges in after {}!", creature.name(), partner.name()),
        &[],
    );
    true
}

/// No players around: maybe walk through a random exit.
fn wander(world: &World, creature: &Arc<Entity>) -> bool {
    let Some(me) = creature.combatant() else {
        return false;
    };
    if !creature.as_creature().is_some_and(|c| c.ambulatory) {
        return false;
    }
    let Some(here) = world.area_of(creature) else {
        return false;
    };
    let exits = here.as_area().map(|a| a.exits()).unwrap_or_default();
    let choice = world.dice().pick(exits.len() + STAY_WEIGHT);
    let Some(exit) = exits.get(choice) else {
        me.set_cooldown(me.action_cooldown());
        return false;
    };
    if world.get(exit.to).is_none() {
        me.set_cooldown(me.action_cooldown());
        return false;
    }

    world.message_area_players(here.id(), &format!("{} wanders {}.", creature.name(), exit.name), &[]);
    world.move_to(creature, exit.to);
    world.message_area_players(exit.to, &format!("{} wanders in.", creature.name()), &[]);
    me.set_cooldown(me.action_cooldown() * 2);
    true
}

/// One player's turn: respawn, cool down, replay a queued command, or keep
/// swinging at the current opponent.
fn player_turn(world: &World, player: &Arc<Entity>, tick: u64) -> bool {
    let Some(combat) = player.combatant() else {
        return false;
    };
    if !combat.is_alive() {
        if !combat.respawn_due(tick) {
            return false;
        }
        let _presence = player.as_player().map(Player::hold_presence);
        return world.registry().is_active(player.id()) && combat::respawn(world, player);
    }
    if combat.cooldown() > 0 {
        combat.tick_cooldown();
        return false;
    }

    if let Some(record) = combat.pop_queued() {
        match commands::execute(world, player, &record) {
            Ok(_) => {}
            Err(err) => {
                if err.is_structural() {
                    tracing::error!(player = %player.id(), error = %err, "queued command hit a registry inconsistency");
                }
                world.message_player(player.id(), &err.player_message());
            }
        }
        return true;
    }

    let Some(partner_id) = combat.engaged_with() else {
        return false;
    };
    match world.get(partner_id) {
        Some(partner) if partner.location() == player.location() => {
            let attack: Attack = combat::player_attack(world, player);
            combat::strike(world, player, &partner, &attack);
            combat.set_cooldown(combat.action_cooldown());
            true
        }
        Some(partner) => {
            if let Some(them) = partner.combatant() {
                combatant::disengage_pair((player.id(), combat), (partner_id, them));
            }
            world.message_player(player.id(), &format!("{} is no longer here.", partner.name()));
            false
        }
        None => {
            combatant::clear_dangling(combat, partner_id);
            false
        }
    }
}

fn regenerate(world: &World) {
    let amount = world.settings().regen_amount;
    let creatures = world.registry().category(Category::Creature);
    let players = world.registry().active_players().into_iter().map(|(_, p)| p);
    let healed = creatures
        .into_iter()
        .chain(players)
        .filter(|e| e.combatant().is_some_and(|c| c.regenerate(amount)))
        .count();
    if healed > 0 {
        tracing::trace!(healed, "regeneration");
    }
}
