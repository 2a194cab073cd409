use registry::EntityId;

use crate::combatant::{Combatant, SpecialSkill};
use crate::dice::DiceSpec;
use crate::entity::{Describable, Entity, Movable};
use crate::world::World;

pub const UNARMED: DiceSpec = DiceSpec::new(1, 3, 0);

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attack {
    Unarmed,
    Weapon { name: String, damage: DiceSpec },
    Skill(SpecialSkill),
}

impl Attack {
    fn damage(&self) -> DiceSpec {
        match self {
            Attack::Unarmed => UNARMED,
            Attack::Weapon { damage, .. } => *damage,
            Attack::Skill(skill) => skill.damage,
        }
    }

    fn label(&self) -> String {
        match self {
            Attack::Unarmed => "bare hands".to_string(),
            Attack::Weapon { name, .. } => name.clone(),
            Attack::Skill(skill) => skill.name.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StrikeOutcome {
    pub hit: bool,
    pub damage: i32,
    pub remaining: i32,
    pub killed: bool,
}

/// Creatures pick uniformly among carried weapons, or bare hands when they
/// carry none, plus their special skill as one extra option.
pub fn creature_attack(world: &World, creature: &Entity) -> Attack {
    let mut options: Vec<Attack> = world
        .weapons_of(creature)
        .into_iter()
        .map(|(name, damage)| Attack::Weapon { name, damage })
        .collect();
    let skill = creature.combatant().and_then(|c| c.skill.clone());
    if options.is_empty() {
        if skill.is_none() {
            return Attack::Unarmed;
        }
        options.push(Attack::Unarmed);
    }
    options.extend(skill.map(Attack::Skill));
    let i = world.dice().pick(options.len());
    options.swap_remove(i)
}

/// Players swing the best weapon they carry.
pub fn player_attack(world: &World, player: &Entity) -> Attack {
    world
        .weapons_of(player)
        .into_iter()
        .max_by_key(|(_, d)| d.count as i32 * d.sides as i32 + d.bonus)
        .map(|(name, damage)| Attack::Weapon { name, damage })
        .unwrap_or(Attack::Unarmed)
}

/// Seeker rolls `1d20 + int` against hider's `1d20 + dex + size`; the seeker
/// must beat it outright.
pub fn spot_contest(world: &World, seeker: &Combatant, hider: &Combatant) -> bool {
    let seek = world.dice().d20() + seeker.abilities.int_mod();
    let hide = world.dice().d20() + hider.abilities.dex_mod() + hider.size.modifier();
    seek > hide
}

/// One attack roll plus damage. `None` if either side cannot fight.
pub fn strike(world: &World, attacker: &Entity, defender: &Entity, attack: &Attack) -> Option<StrikeOutcome> {
    let me = attacker.combatant()?;
    let them = defender.combatant()?;
    if !me.is_alive() || !them.is_alive() {
        return None;
    }

    let attack = match attack {
        Attack::Skill(skill) if !me.spend_special(skill.cost) => Attack::Unarmed,
        other => other.clone(),
    };
    let bonus = match attack {
        Attack::Skill(_) => me.abilities.int_mod(),
        _ => me.abilities.str_mod(),
    };

    let roll = world.dice().d20();
    let armor_class = them.armor_class(world.armor_of(defender));
    let hit = roll == 20 || (roll != 1 && roll + bonus >= armor_class);

    let (attacker_name, defender_name) = (attacker.name(), defender.name());
    let area = attacker.location();

    if !hit {
        world.message_player(attacker.id(), &format!("You miss {}.", defender_name));
        world.message_player(defender.id(), &format!("{} misses you.", attacker_name));
        return Some(StrikeOutcome {
            hit: false,
            damage: 0,
            remaining: them.snapshot().health,
            killed: false,
        });
    }

    let damage = (attack.damage().roll(world.dice()) + bonus).max(1);
    let (remaining, killed) = them.apply_damage(damage);
    let label = attack.label();
    world.message_player(
        attacker.id(),
        &format!("You hit {} with your {} for {} damage.", defender_name, label, damage),
    );
    world.message_player(
        defender.id(),
        &format!("{} hits you with {} for {} damage. ({} left)", attacker_name, label, damage, remaining),
    );
    if let Some(area) = area {
        world.message_area_players(
            area,
            &format!("{} hits {}.", attacker_name, defender_name),
            &[attacker.id(), defender.id()],
        );
    }
    tracing::trace!(attacker = %attacker.id(), defender = %defender.id(), roll, damage, remaining, "strike");

    if killed {
        resolve_death(world, defender, Some(attacker));
    }
    Some(StrikeOutcome {
        hit: true,
        damage,
        remaining,
        killed,
    })
}

/// Break the fight, drop the loser's belongings, pay out experience and
/// arm the respawn timer.
pub fn resolve_death(world: &World, loser: &Entity, winner: Option<&Entity>) {
    let Some(combat) = loser.combatant() else {
        return;
    };
    world.break_engagement(loser);
    let dropped = world.spill_inventory(loser);
    let name = loser.name();

    if let Some(area) = loser.location() {
        let mut text = format!("{} is dead!", name);
        if !dropped.is_empty() {
            text.push_str(" Its belongings scatter on the ground.");
        }
        world.message_area_players(area, &text, &[loser.id()]);
    }

    if let (Some(winner), Some(creature)) = (winner, loser.as_creature()) {
        if let Some(player) = winner.as_player() {
            let total = player.award_experience(creature.experience);
            world.message_player(
                winner.id(),
                &format!("You gain {} experience. ({} total)", creature.experience, total),
            );
        }
    }

    let delay = match loser.as_creature() {
        Some(c) => c.respawn_ticks,
        None => world.settings().player_respawn_ticks,
    };
    combat.arm_respawn(world.tick() + delay);
    world.withdraw(loser);

    if loser.is_player() {
        world.message_player(loser.id(), "You have died. You will be restored shortly.");
    }
    tracing::info!(
        entity = %loser.id(),
        killer = ?winner.map(Entity::id),
        respawn_in = delay,
        "combatant died"
    );
}

/// Bring a dead combatant back at full strength: creatures at their spawn
/// area, players at the start area.
pub fn respawn(world: &World, entity: &Entity) -> bool {
    let Some(combat) = entity.combatant() else {
        return false;
    };
    let home: EntityId = match entity.as_creature() {
        Some(c) => c.spawn_area,
        None => world.start_area(),
    };
    combat.restore();
    if !world.move_to(entity, home) {
        tracing::warn!(entity = %entity.id(), area = %home, "respawn area missing");
        return false;
    }
    world.message_area_players(home, &format!("{} appears.", entity.name()), &[entity.id()]);
    if entity.is_player() {
        if let Some(area) = world.get(home) {
            let text = format!("You feel alive again.\n{}", world.describe_area(&area, entity.id()));
            world.message_player(entity.id(), &text);
        }
    }
    tracing::debug!(entity = %entity.id(), area = %home, "respawned");
    true
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use registry::ConnectionId;

    use super::*;
    use crate::combatant::{engage, CreatureState};
    use crate::dice::ScriptedDice;
    use crate::entity::ItemKind;
    use crate::world::tests::{rat, test_world};

    #[test]
    fn hit_deals_weapon_damage_plus_strength() {
        // attack roll 15, damage die 4
        let (world, transport) = test_world(ScriptedDice::new([15, 4], 1));
        let square = world.add_area("Square", "").unwrap();
        let rat = world.add_creature(rat(), square).unwrap();
        let hero = Arc::new(world.new_player("Hero"));
        let hero_id = hero.id();
        world.registry().add(hero.clone(), Some(ConnectionId(1))).unwrap();
        world
            .add_item("a sword", &["sword"], "", ItemKind::Weapon { damage: DiceSpec::new(1, 6, 0) }, hero_id)
            .unwrap();

        let rat_e = world.get(rat).unwrap();
        let attack = player_attack(&world, &hero);
        assert!(matches!(attack, Attack::Weapon { .. }));
        let out = strike(&world, &hero, &rat_e, &attack).unwrap();
        // 4 + str mod 1
        assert_eq!(out, StrikeOutcome { hit: true, damage: 5, remaining: 1, killed: false });
        assert!(transport.text_for(ConnectionId(1)).contains("for 5 damage"));
    }

    #[test]
    fn natural_one_always_misses() {
        let (world, _) = test_world(ScriptedDice::new([1], 1));
        let square = world.add_area("Square", "").unwrap();
        let rat = world.add_creature(rat(), square).unwrap();
        let hero = world.new_player("Hero");
        let out = strike(&world, &hero, &world.get(rat).unwrap(), &Attack::Unarmed).unwrap();
        assert!(!out.hit);
    }

    #[test]
    fn killing_blow_resolves_death_once() {
        let (world, transport) = test_world(ScriptedDice::constant(20));
        let square = world.add_area("Square", "").unwrap();
        let mut spec = rat();
        spec.max_health = 3;
        let rat = world.add_creature(spec, square).unwrap();
        let coin = world.add_item("a coin", &["coin"], "", ItemKind::Trinket, rat).unwrap();
        let hero = Arc::new(world.new_player("Hero"));
        world.registry().add(hero.clone(), Some(ConnectionId(1))).unwrap();
        world.get(square).unwrap().as_area().unwrap().enter(hero.id());
        world.set_tick(100);

        let rat_e = world.get(rat).unwrap();
        engage((hero.id(), hero.combatant().unwrap()), (rat, rat_e.combatant().unwrap())).unwrap();

        let out = strike(&world, &hero, &rat_e, &Attack::Unarmed).unwrap();
        assert!(out.killed);
        assert!(strike(&world, &hero, &rat_e, &Attack::Unarmed).is_none());

        let c = rat_e.combatant().unwrap();
        assert_eq!(c.state(), CreatureState::DormantDead);
        assert_eq!(c.snapshot().respawn_at, Some(110));
        assert_eq!(hero.combatant().unwrap().engaged_with(), None);
        assert_eq!(c.engaged_with(), None);
        assert_eq!(hero.as_player().unwrap().experience(), 10);

        let area = world.get(square).unwrap();
        assert!(area.as_area().unwrap().floor().contains(coin));
        assert!(!area.as_area().unwrap().is_present(rat));
        assert!(transport.text_for(ConnectionId(1)).contains("a giant rat is dead!"));
    }

    #[test]
    fn respawn_returns_creature_home() {
        let (world, _) = test_world(ScriptedDice::constant(10));
        let home = world.add_area("Home", "").unwrap();
        let away = world.add_area("Away", "").unwrap();
        let rat = world.add_creature(rat(), home).unwrap();
        let rat_e = world.get(rat).unwrap();
        world.move_to(&rat_e, away);
        resolve_death(&world, &rat_e, None);

        assert!(respawn(&world, &rat_e));
        assert_eq!(rat_e.location(), Some(home));
        assert!(world.get(home).unwrap().as_area().unwrap().is_present(rat));
        assert_eq!(rat_e.combatant().unwrap().state(), CreatureState::Idle);
    }

    #[test]
    fn skill_without_resource_falls_back_to_fists() {
        let (world, _) = test_world(ScriptedDice::constant(20));
        let square = world.add_area("Square", "").unwrap();
        let rat = world.add_creature(rat(), square).unwrap();
        let hero = world.new_player("Hero");
        let c = hero.combatant().unwrap();
        let skill = c.skill.clone().unwrap();
        assert!(c.spend_special(c.snapshot().special));

        // unarmed 1d3 at 3 plus str mod 1
        let out = strike(&world, &hero, &world.get(rat).unwrap(), &Attack::Skill(skill)).unwrap();
        assert_eq!(out.damage, 4);
    }

    #[test]
    fn creature_attack_choices_include_skill() {
        let (world, _) = test_world(ScriptedDice::new([1], 0));
        let square = world.add_area("Square", "").unwrap();
        let mut spec = rat();
        spec.skill = Some(SpecialSkill {
            name: "bite".into(),
            damage: DiceSpec::new(1, 4, 0),
            cost: 1,
        });
        let rat = world.add_creature(spec, square).unwrap();
        world
            .add_item("a claw", &["claw"], "", ItemKind::Weapon { damage: DiceSpec::new(1, 2, 0) }, rat)
            .unwrap();
        let rat_e = world.get(rat).unwrap();
        assert!(matches!(creature_attack(&world, &rat_e), Attack::Skill(_)));
        assert!(matches!(creature_attack(&world, &rat_e), Attack::Weapon { .. }));
    }

    #[test]
    fn unarmed_creature_still_chooses_between_fists_and_skill() {
        let (world, _) = test_world(ScriptedDice::new([0, 1], 0));
        let square = world.add_area("Square", "").unwrap();
        let mut spec = rat();
        spec.skill = Some(SpecialSkill {
            name: "bite".into(),
            damage: DiceSpec::new(1, 4, 0),
            cost: 1,
        });
        let rat = world.add_creature(spec, square).unwrap();
        let rat_e = world.get(rat).unwrap();
        assert_eq!(creature_attack(&world, &rat_e), Attack::Unarmed);
        assert!(matches!(creature_attack(&world, &rat_e), Attack::Skill(_)));
    }
}
