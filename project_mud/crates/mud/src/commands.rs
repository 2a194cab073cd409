use std::sync::Arc;

use persistence::BarrierError;
use registry::{EntityId, RegistryError};
use serde::{Deserialize, Serialize};

use crate::combat::{self, Attack};
use crate::combatant::{self, Combatant, EngageError};
use crate::entity::{Describable, Entity, Movable, Player};
use crate::parser::{ParseResult, Verb};
use crate::world::World;

const HELP: &str = "\
Commands:
  look [thing]        inventory         status
  go <exit>           take <item>       drop <item>
  attack <target>     skill [target]    flee
  say <text>          who               quit
Exits can be typed on their own, e.g. 'north'.";

const ADMIN_HELP: &str = "\
Admin: save, edit (toggle edit mode), delete <thing>, rename <thing> <name>";

/// A player intent with its targets already resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRecord {
    pub verb: Verb,
    pub direct: Option<EntityId>,
    pub indirect: Option<EntityId>,
    pub text: String,
}

impl CommandRecord {
    pub fn new(verb: Verb, direct: Option<EntityId>) -> Self {
        Self {
            verb,
            direct,
            indirect: None,
            text: String::new(),
        }
    }

    /// `None` for rejected parses.
    pub fn from_parse(result: &ParseResult) -> Option<Self> {
        if !result.status.is_valid() {
            return None;
        }
        Some(Self {
            verb: result.verb?,
            direct: result.direct,
            indirect: result.indirect,
            text: result.text.clone(),
        })
    }
}

/// Whether a verb waits behind the player's cooldown and fights.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gating {
    Queued,
    Immediate,
}

pub fn gating(verb: Verb) -> Gating {
    match verb {
        Verb::Attack | Verb::Skill | Verb::Flee | Verb::Take | Verb::Drop | Verb::Go => Gating::Queued,
        Verb::Look
        | Verb::Inventory
        | Verb::Status
        | Verb::Say
        | Verb::Who
        | Verb::Quit
        | Verb::Help
        | Verb::Save
        | Verb::Delete
        | Verb::Edit
        | Verb::Rename => Gating::Immediate,
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// Something the command referred to is gone.
    #[error("{0}")]
    LookupMiss(String),

    /// Not legal right now.
    #[error("{0}")]
    InvalidTransition(String),

    #[error("timed out waiting for a save to finish")]
    Timeout,

    #[error("{0}")]
    ParseReject(String),

    #[error("registry inconsistency: {0}")]
    Structural(RegistryError),
}

impl CommandError {
    pub fn player_message(&self) -> String {
        match self {
            CommandError::LookupMiss(msg) | CommandError::InvalidTransition(msg) | CommandError::ParseReject(msg) => {
                msg.clone()
            }
            CommandError::Timeout => "The world is being saved. Please try again in a moment.".to_string(),
            CommandError::Structural(_) => "Something went wrong. The administrators have been notified.".to_string(),
        }
    }

    pub fn is_structural(&self) -> bool {
        matches!(self, CommandError::Structural(_))
    }
}

impl From<BarrierError> for CommandError {
    fn from(_: BarrierError) -> Self {
        CommandError::Timeout
    }
}

impl From<RegistryError> for CommandError {
    fn from(err: RegistryError) -> Self {
        if err.is_structural() {
            CommandError::Structural(err)
        } else {
            CommandError::LookupMiss("That no longer exists.".to_string())
        }
    }
}

/// What the caller has to do once the world is no longer held.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Done,
    /// Parked in the player's queue for the tick to replay.
    Queued,
    Quit,
    SaveRequested,
}

/// Run a command now, or park it in the player's queue while they are
/// cooling down or fighting.
pub fn submit(world: &World, actor: &Arc<Entity>, record: CommandRecord) -> Result<Outcome, CommandError> {
    let _presence = actor.as_player().map(Player::hold_presence);
    ensure_present(world, actor)?;
    if gating(record.verb) == Gating::Queued {
        if let Some(combat) = actor.combatant() {
            let busy = {
                let v = combat.vitals();
                v.is_alive() && (v.cooldown > 0 || v.engaged.is_some())
            };
            if busy {
                let verb = record.verb;
                if !combat.enqueue(record) {
                    return Err(CommandError::InvalidTransition(
                        "You can't plan that far ahead.".to_string(),
                    ));
                }
                tracing::debug!(player = %actor.id(), %verb, queued = combat.queued_len(), "command queued");
                return Ok(Outcome::Queued);
            }
        }
    }
    run(world, actor, &record)
}

/// Run a command against the world right away.
pub fn execute(world: &World, actor: &Arc<Entity>, record: &CommandRecord) -> Result<Outcome, CommandError> {
    let _presence = actor.as_player().map(Player::hold_presence);
    ensure_present(world, actor)?;
    run(world, actor, record)
}

/// Players act only while bound to a connection. Callers hold the
/// player's presence lock so a logout cannot slip in afterwards.
fn ensure_present(world: &World, actor: &Entity) -> Result<(), CommandError> {
    if actor.is_player() && !world.registry().is_active(actor.id()) {
        return Err(CommandError::LookupMiss("You are no longer in the world.".to_string()));
    }
    Ok(())
}

fn run(world: &World, actor: &Arc<Entity>, record: &CommandRecord) -> Result<Outcome, CommandError> {
    let queued = gating(record.verb) == Gating::Queued;
    if queued && !actor.combatant().is_some_and(Combatant::is_alive) {
        return Err(CommandError::InvalidTransition(
            "You are dead. Wait to be restored.".to_string(),
        ));
    }

    let outcome = match record.verb {
        Verb::Attack => attack(world, actor, record.direct),
        Verb::Skill => skill(world, actor, record.direct),
        Verb::Flee => flee(world, actor),
        Verb::Take => take(world, actor, record.direct),
        Verb::Drop => drop_item(world, actor, record.direct),
        Verb::Go => go(world, actor, record.direct),
        Verb::Look => look(world, actor, record.direct),
        Verb::Inventory => inventory(world, actor),
        Verb::Status => status(world, actor),
        Verb::Say => say(world, actor, &record.text),
        Verb::Who => who(world, actor),
        Verb::Quit => Ok(Outcome::Quit),
        Verb::Help => help(world, actor),
        Verb::Save => require_admin(actor).map(|_| Outcome::SaveRequested),
        Verb::Delete => delete(world, actor, record.direct),
        Verb::Edit => edit(world, actor),
        Verb::Rename => rename(world, actor, record.direct, &record.text),
    }?;

    if queued {
        if let Some(combat) = actor.combatant() {
            if combat.is_alive() {
                combat.set_cooldown(combat.action_cooldown());
            }
        }
    }
    Ok(outcome)
}

fn lookup(world: &World, id: Option<EntityId>) -> Result<Arc<Entity>, CommandError> {
    id.and_then(|id| world.get(id))
        .ok_or_else(|| CommandError::LookupMiss("That is no longer here.".to_string()))
}

fn area_of(world: &World, actor: &Entity) -> Result<Arc<Entity>, CommandError> {
    world
        .area_of(actor)
        .ok_or_else(|| CommandError::LookupMiss("You are nowhere at all.".to_string()))
}

fn tell(world: &World, actor: &Entity, text: &str) {
    world.message_player(actor.id(), text);
}

fn require_admin(actor: &Entity) -> Result<(), CommandError> {
    if actor.as_player().is_some_and(|p| p.is_admin()) {
        Ok(())
    } else {
        Err(CommandError::ParseReject("Only administrators can do that.".to_string()))
    }
}

fn require_edit_mode(actor: &Entity) -> Result<(), CommandError> {
    require_admin(actor)?;
    if actor.as_player().is_some_and(|p| p.edit_mode()) {
        Ok(())
    } else {
        Err(CommandError::ParseReject("You must be in edit mode to do that.".to_string()))
    }
}

/// Target must be a combatant standing in the actor's area.
fn opponent_here(world: &World, actor: &Entity, target: Option<EntityId>) -> Result<Arc<Entity>, CommandError> {
    let target = lookup(world, target)?;
    let area = area_of(world, actor)?;
    let present = area.as_area().is_some_and(|a| a.is_present(target.id()));
    if !present || target.location() != Some(area.id()) {
        return Err(CommandError::LookupMiss(format!("{} is not here.", target.name())));
    }
    if target.combatant().is_none() {
        return Err(CommandError::InvalidTransition(format!("You can't fight {}.", target.name())));
    }
    Ok(target)
}

fn engage_with(actor: &Entity, target: &Entity) -> Result<(), CommandError> {
    let (Some(me), Some(them)) = (actor.combatant(), target.combatant()) else {
        return Err(CommandError::InvalidTransition(format!("You can't fight {}.", target.name())));
    };
    combatant::engage((actor.id(), me), (target.id(), them)).map_err(|err| {
        let msg = match err {
            EngageError::TargetBusy => format!("{} is already fighting another player.", target.name()),
            EngageError::AlreadyEngaged => "You are already fighting someone else.".to_string(),
            EngageError::TargetDead => format!("{} is already dead.", target.name()),
            EngageError::AttackerDead => "You are dead.".to_string(),
            EngageError::SelfTarget => "You can't attack yourself.".to_string(),
        };
        CommandError::InvalidTransition(msg)
    })
}

fn attack(world: &World, actor: &Arc<Entity>, target: Option<EntityId>) -> Result<Outcome, CommandError> {
    let target = opponent_here(world, actor, target)?;
    let fresh = actor.combatant().and_then(Combatant::engaged_with) != Some(target.id());
    engage_with(actor, &target)?;
    if fresh {
        if let Some(area) = actor.location() {
            world.message_area_players(
                area,
                &format!("{} attacks {}!", actor.name(), target.name()),
                &[actor.id()],
            );
        }
    }
    combat::strike(world, actor, &target, &combat::player_attack(world, actor));
    Ok(Outcome::Done)
}

fn skill(world: &World, actor: &Arc<Entity>, target: Option<EntityId>) -> Result<Outcome, CommandError> {
    let Some(me) = actor.combatant() else {
        return Err(CommandError::InvalidTransition("You can't fight.".to_string()));
    };
    let Some(skill) = me.skill.clone() else {
        return Err(CommandError::InvalidTransition("You have no special skill.".to_string()));
    };
    let target_id = target
        .or_else(|| me.engaged_with())
        .ok_or_else(|| CommandError::InvalidTransition(format!("Use {} on whom?", skill.name)))?;
    let target = opponent_here(world, actor, Some(target_id))?;
    if me.snapshot().special < skill.cost {
        return Err(CommandError::InvalidTransition(format!(
            "You are too exhausted to use {}.",
            skill.name
        )));
    }
    engage_with(actor, &target)?;
    combat::strike(world, actor, &target, &Attack::Skill(skill));
    Ok(Outcome::Done)
}

fn flee(world: &World, actor: &Arc<Entity>) -> Result<Outcome, CommandError> {
    if actor.combatant().and_then(Combatant::engaged_with).is_none() {
        return Err(CommandError::InvalidTransition("You aren't fighting anyone.".to_string()));
    }
    let area = area_of(world, actor)?;
    let exits = area.as_area().map(|a| a.exits()).unwrap_or_default();
    if exits.is_empty() {
        return Err(CommandError::InvalidTransition("There is nowhere to run!".to_string()));
    }
    let exit = &exits[world.dice().pick(exits.len())];
    if world.get(exit.to).is_none() {
        return Err(CommandError::LookupMiss("You stumble and fail to get away!".to_string()));
    }

    world.break_engagement(actor);
    if !world.move_to(actor, exit.to) {
        return Err(CommandError::LookupMiss("You stumble and fail to get away!".to_string()));
    }
    world.message_area_players(
        area.id(),
        &format!("{} flees {}!", actor.name(), exit.name),
        &[actor.id()],
    );
    world.message_area_players(exit.to, &format!("{} arrives in a hurry.", actor.name()), &[actor.id()]);
    if let Some(dest) = world.get(exit.to) {
        tell(
            world,
            actor,
            &format!("You flee {}.\n{}", exit.name, world.describe_area(&dest, actor.id())),
        );
    }
    Ok(Outcome::Done)
}

fn take(world: &World, actor: &Arc<Entity>, item: Option<EntityId>) -> Result<Outcome, CommandError> {
    let item = lookup(world, item)?;
    if item.as_item().is_none() {
        return Err(CommandError::InvalidTransition(format!("You can't take {}.", item.name())));
    }
    let area = area_of(world, actor)?;
    let (Some(floor), Some(pack)) = (area.as_area().map(|a| a.floor()), actor.inventory()) else {
        return Err(CommandError::InvalidTransition("You can't carry anything.".to_string()));
    };
    // Whoever removes it from the floor first gets it.
    if !floor.remove(item.id()) {
        return Err(CommandError::LookupMiss(format!("{} is no longer here.", item.name())));
    }
    pack.add(item.id());
    item.set_location(Some(actor.id()));

    tell(world, actor, &format!("You take {}.", item.name()));
    world.message_area_players(
        area.id(),
        &format!("{} takes {}.", actor.name(), item.name()),
        &[actor.id()],
    );
    Ok(Outcome::Done)
}

fn drop_item(world: &World, actor: &Arc<Entity>, item: Option<EntityId>) -> Result<Outcome, CommandError> {
    let item = lookup(world, item)?;
    let area = area_of(world, actor)?;
    let (Some(floor), Some(pack)) = (area.as_area().map(|a| a.floor()), actor.inventory()) else {
        return Err(CommandError::InvalidTransition("You can't drop anything here.".to_string()));
    };
    if !pack.remove(item.id()) {
        return Err(CommandError::LookupMiss("You aren't carrying that.".to_string()));
    }
    floor.add(item.id());
    item.set_location(Some(area.id()));

    tell(world, actor, &format!("You drop {}.", item.name()));
    world.message_area_players(
        area.id(),
        &format!("{} drops {}.", actor.name(), item.name()),
        &[actor.id()],
    );
    Ok(Outcome::Done)
}

fn go(world: &World, actor: &Arc<Entity>, dest: Option<EntityId>) -> Result<Outcome, CommandError> {
    if actor.combatant().and_then(Combatant::engaged_with).is_some() {
        return Err(CommandError::InvalidTransition(
            "You can't leave while fighting! Try to flee.".to_string(),
        ));
    }
    let area = area_of(world, actor)?;
    let exit = dest
        .and_then(|d| area.as_area().and_then(|a| a.exit_towards(d)))
        .ok_or_else(|| CommandError::LookupMiss("You can't go that way.".to_string()))?;
    let Some(target) = world.get(exit.to) else {
        return Err(CommandError::LookupMiss("That way leads nowhere.".to_string()));
    };

    world.message_area_players(area.id(), &format!("{} leaves {}.", actor.name(), exit.name), &[actor.id()]);
    if !world.move_to(actor, target.id()) {
        return Err(CommandError::LookupMiss("That way leads nowhere.".to_string()));
    }
    world.message_area_players(target.id(), &format!("{} arrives.", actor.name()), &[actor.id()]);
    tell(world, actor, &world.describe_area(&target, actor.id()));
    Ok(Outcome::Done)
}

fn look(world: &World, actor: &Arc<Entity>, target: Option<EntityId>) -> Result<Outcome, CommandError> {
    let text = match target {
        Some(_) => world.describe_entity(&*lookup(world, target)?),
        None => world.describe_area(&*area_of(world, actor)?, actor.id()),
    };
    tell(world, actor, &text);
    Ok(Outcome::Done)
}

fn inventory(world: &World, actor: &Arc<Entity>) -> Result<Outcome, CommandError> {
    let names: Vec<String> = actor
        .inventory()
        .map(|inv| inv.list())
        .unwrap_or_default()
        .into_iter()
        .filter_map(|id| world.get(id))
        .map(|e| format!("  {}", e.name()))
        .collect();
    let text = if names.is_empty() {
        "You are carrying nothing.".to_string()
    } else {
        format!("You are carrying:\n{}", names.join("\n"))
    };
    tell(world, actor, &text);
    Ok(Outcome::Done)
}

fn status(world: &World, actor: &Arc<Entity>) -> Result<Outcome, CommandError> {
    let mut lines = vec![actor.name()];
    if let Some(c) = actor.combatant() {
        let v = c.snapshot();
        lines.push(format!("Health: {}/{}  Special: {}/{}", v.health, v.max_health, v.special, v.max_special));
        if v.cooldown > 0 {
            lines.push(format!("Recovering for {} more ticks.", v.cooldown));
        }
        if let Some(opponent) = v.engaged.and_then(|id| world.get(id)) {
            lines.push(format!("Fighting: {}", opponent.name()));
        }
        if !v.queue.is_empty() {
            lines.push(format!("Queued commands: {}", v.queue.len()));
        }
    }
    if let Some(p) = actor.as_player() {
        lines.push(format!("Experience: {}", p.experience()));
        if p.edit_mode() {
            lines.push("Edit mode is on.".to_string());
        }
    }
    tell(world, actor, &lines.join("\n"));
    Ok(Outcome::Done)
}

fn say(world: &World, actor: &Arc<Entity>, text: &str) -> Result<Outcome, CommandError> {
    let area = area_of(world, actor)?;
    world.message_area_players(area.id(), &format!("{} says, '{}'", actor.name(), text), &[actor.id()]);
    tell(world, actor, &format!("You say, '{}'", text));
    Ok(Outcome::Done)
}

fn who(world: &World, actor: &Arc<Entity>) -> Result<Outcome, CommandError> {
    let mut names: Vec<String> = world
        .registry()
        .active_players()
        .into_iter()
        .map(|(_, p)| p.name())
        .collect();
    names.sort();
    tell(
        world,
        actor,
        &format!("Players online ({}):\n  {}", names.len(), names.join("\n  ")),
    );
    Ok(Outcome::Done)
}

fn help(world: &World, actor: &Arc<Entity>) -> Result<Outcome, CommandError> {
    let admin = actor.as_player().is_some_and(|p| p.is_admin());
    let text = if admin {
        format!("{}\n{}", HELP, ADMIN_HELP)
    } else {
        HELP.to_string()
    };
    tell(world, actor, &text);
    Ok(Outcome::Done)
}

fn edit(world: &World, actor: &Arc<Entity>) -> Result<Outcome, CommandError> {
    require_admin(actor)?;
    let Some(player) = actor.as_player() else {
        return Err(CommandError::InvalidTransition("Only players can edit.".to_string()));
    };
    let on = !player.edit_mode();
    player.set_edit_mode(on);
    tell(world, actor, if on { "Edit mode on." } else { "Edit mode off." });
    Ok(Outcome::Done)
}

fn delete(world: &World, actor: &Arc<Entity>, target: Option<EntityId>) -> Result<Outcome, CommandError> {
    require_edit_mode(actor)?;
    let target = lookup(world, target)?;
    if target.is_player() || target.as_area().is_some() {
        return Err(CommandError::InvalidTransition(format!("{} cannot be deleted.", target.name())));
    }
    let name = target.name();

    // Claim it first: of two admins deleting the same thing, only the one
    // whose remove succeeds touches the world.
    world.registry().remove(target.id(), None)?;
    world.break_engagement(&target);
    world.spill_inventory(&target);
    if let Some(holder) = target.location().and_then(|loc| world.get(loc)) {
        if let Some(area) = holder.as_area() {
            area.leave(target.id());
            area.floor().remove(target.id());
        } else if let Some(inv) = holder.inventory() {
            inv.remove(target.id());
        }
    }

    tracing::info!(admin = %actor.id(), entity = %target.id(), %name, "entity deleted");
    tell(world, actor, &format!("{} is gone.", name));
    Ok(Outcome::Done)
}

fn rename(world: &World, actor: &Arc<Entity>, target: Option<EntityId>, name: &str) -> Result<Outcome, CommandError> {
    require_edit_mode(actor)?;
    let target = lookup(world, target)?;
    if target.is_player() {
        return Err(CommandError::InvalidTransition("Players keep the names they chose.".to_string()));
    }
    let old = target.name();
    target.rename(name);
    tracing::info!(admin = %actor.id(), entity = %target.id(), %old, new = name, "entity renamed");
    tell(world, actor, &format!("{} is now known as {}.", old, name));
    Ok(Outcome::Done)
}
