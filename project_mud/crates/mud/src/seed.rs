//! The starter world used when no snapshot exists.

use registry::{EntityId, RegistryError};

use crate::combatant::{Abilities, Size, SpecialSkill};
use crate::dice::DiceSpec;
use crate::entity::ItemKind;
use crate::world::{CreatureSpec, World};

fn giant_rat() -> CreatureSpec {
    CreatureSpec {
        name: "a giant rat".to_string(),
        keywords: vec!["rat".to_string(), "giant".to_string()],
        description: "A rat the size of a small dog, with yellow teeth.".to_string(),
        abilities: Abilities {
            strength: 8,
            dexterity: 14,
            intelligence: 2,
        },
        size: Size::Small,
        max_health: 6,
        max_special: 0,
        skill: None,
        ambulatory: true,
        experience: 10,
        respawn_ticks: 60,
    }
}

fn goblin() -> CreatureSpec {
    CreatureSpec {
        name: "a sewer goblin".to_string(),
        keywords: vec!["goblin".to_string()],
        description: "A wiry goblin in a coat of rags, clutching a rusty blade.".to_string(),
        abilities: Abilities {
            strength: 12,
            dexterity: 12,
            intelligence: 8,
        },
        size: Size::Small,
        max_health: 14,
        max_special: 6,
        skill: Some(SpecialSkill {
            name: "dirty stab".to_string(),
            damage: DiceSpec::new(2, 4, 0),
            cost: 3,
        }),
        ambulatory: false,
        experience: 35,
        respawn_ticks: 120,
    }
}

/// Build four connected areas with a few things to fight and pick up.
/// Returns the start area.
pub fn build_seed_world(world: &World) -> Result<EntityId, RegistryError> {
    let square = world.add_area(
        "Town Square",
        "Cobblestones ring a dry fountain. Market Street runs east and a grate leads down.",
    )?;
    let market = world.add_area(
        "Market Street",
        "Shuttered stalls line the street. The square lies to the west.",
    )?;
    let sewer = world.add_area("Old Sewer", "Brown water trickles past your boots. It smells awful.")?;
    let depths = world.add_area("Sewer Depths", "The tunnel widens into a chamber littered with bones.")?;

    world.link(square, "east", market);
    world.link(market, "west", square);
    world.link(square, "down", sewer);
    world.link(sewer, "up", square);
    world.link(sewer, "north", depths);
    world.link(depths, "south", sewer);

    world.add_item(
        "a short sword",
        &["sword", "short"],
        "A plain blade, recently sharpened.",
        ItemKind::Weapon {
            damage: DiceSpec::new(1, 6, 0),
        },
        market,
    )?;
    world.add_item(
        "a leather jerkin",
        &["jerkin", "leather", "armor"],
        "Stiff boiled leather.",
        ItemKind::Armor { defense: 2 },
        market,
    )?;
    world.add_item("a copper coin", &["coin", "copper"], "Worn smooth.", ItemKind::Trinket, square)?;

    world.add_creature(giant_rat(), sewer)?;
    world.add_creature(giant_rat(), sewer)?;
    let goblin = world.add_creature(goblin(), depths)?;
    world.add_item(
        "a rusty blade",
        &["blade", "rusty"],
        "Pitted, but still pointy.",
        ItemKind::Weapon {
            damage: DiceSpec::new(1, 4, 1),
        },
        goblin,
    )?;

    world.set_start_area(square);
    tracing::info!(entities = world.registry().len(), "seed world built");
    Ok(square)
}

#[cfg(test)]
mod tests {
    use registry::Category;

    use super::*;
    use crate::dice::ScriptedDice;
    use crate::world::tests::test_world;

    #[test]
    fn seed_world_is_connected() {
        let (world, _) = test_world(ScriptedDice::constant(10));
        let start = build_seed_world(&world).unwrap();
        assert_eq!(world.start_area(), start);
        assert_eq!(world.count(Category::Area), 4);
        assert_eq!(world.count(Category::Creature), 3);
        assert_eq!(world.count(Category::Item), 4);

        let square = world.get(start).unwrap();
        let down = square.as_area().unwrap().find_exit("down").unwrap();
        let sewer = world.get(down.to).unwrap();
        assert_eq!(sewer.as_area().unwrap().exit_towards(start).map(|e| e.name), Some("up".to_string()));
        assert_eq!(sewer.as_area().unwrap().occupants().len(), 2);
        world.registry().check_coherence().unwrap();
    }
}
