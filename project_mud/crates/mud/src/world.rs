use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use persistence::{SaveBarrier, SnapshotManager};
use registry::{Category, EntityId, IdAllocator, ObjectRegistry, RegistryError};
use session::Transport;

use crate::combatant::{self, Abilities, Combatant, Size, SpecialSkill};
use crate::dice::{Dice, DiceSpec};
use crate::entity::{Area, Creature, Describable, Entity, EntityBody, Inventory, Item, ItemKind, Movable, Player};
use crate::parser::{LexKind, LexiconEntry};

/// Tunables for gameplay and for how long callers wait on shared state.
#[derive(Debug, Clone)]
pub struct WorldSettings {
    /// Ticks between regeneration sweeps.
    pub regen_interval: u64,
    pub regen_amount: i32,
    pub player_respawn_ticks: u64,
    pub player_max_health: i32,
    pub player_max_special: i32,
    /// How long a command waits for a running save before giving up.
    pub barrier_timeout: Duration,
    /// How long an interactive prompt waits for the player.
    pub prompt_timeout: Duration,
}

impl Default for WorldSettings {
    fn default() -> Self {
        Self {
            regen_interval: 10,
            regen_amount: 1,
            player_respawn_ticks: 30,
            player_max_health: 20,
            player_max_special: 10,
            barrier_timeout: Duration::from_secs(5),
            prompt_timeout: Duration::from_secs(60),
        }
    }
}

/// Template for a new creature.
#[derive(Debug, Clone)]
pub struct CreatureSpec {
    pub name: String,
    pub keywords: Vec<String>,
    pub description: String,
    pub abilities: Abilities,
    pub size: Size,
    pub max_health: i32,
    pub max_special: i32,
    pub skill: Option<SpecialSkill>,
    pub ambulatory: bool,
    pub experience: u64,
    pub respawn_ticks: u64,
}

/// Everything the game shares between connections and the tick thread.
pub struct World {
    registry: ObjectRegistry<Entity>,
    ids: IdAllocator,
    barrier: SaveBarrier,
    dice: Arc<dyn Dice>,
    transport: Arc<dyn Transport>,
    settings: WorldSettings,
    start_area: AtomicU64,
    tick: AtomicU64,
    snapshots: Option<SnapshotManager>,
}

impl World {
    pub fn new(transport: Arc<dyn Transport>, dice: Arc<dyn Dice>, settings: WorldSettings) -> Self {
        Self::with_parts(ObjectRegistry::new(), IdAllocator::new(), transport, dice, settings)
    }

    pub(crate) fn with_parts(
        registry: ObjectRegistry<Entity>,
        ids: IdAllocator,
        transport: Arc<dyn Transport>,
        dice: Arc<dyn Dice>,
        settings: WorldSettings,
    ) -> Self {
        Self {
            registry,
            ids,
            barrier: SaveBarrier::new(),
            dice,
            transport,
            settings,
            start_area: AtomicU64::new(0),
            tick: AtomicU64::new(0),
            snapshots: None,
        }
    }

    pub fn with_snapshots(mut self, snapshots: SnapshotManager) -> Self {
        self.snapshots = Some(snapshots);
        self
    }

    pub fn registry(&self) -> &ObjectRegistry<Entity> {
        &self.registry
    }

    pub fn ids(&self) -> &IdAllocator {
        &self.ids
    }

    pub fn barrier(&self) -> &SaveBarrier {
        &self.barrier
    }

    pub fn dice(&self) -> &dyn Dice {
        self.dice.as_ref()
    }

    pub fn transport(&self) -> &dyn Transport {
        self.transport.as_ref()
    }

    pub fn settings(&self) -> &WorldSettings {
        &self.settings
    }

    pub fn snapshots(&self) -> Option<&SnapshotManager> {
        self.snapshots.as_ref()
    }

    pub fn start_area(&self) -> EntityId {
        EntityId(self.start_area.load(Ordering::Acquire))
    }

    pub fn set_start_area(&self, area: EntityId) {
        self.start_area.store(area.0, Ordering::Release);
    }

    pub fn tick(&self) -> u64 {
        self.tick.load(Ordering::Acquire)
    }

    pub fn set_tick(&self, tick: u64) {
        self.tick.store(tick, Ordering::Release);
    }

    pub fn get(&self, id: EntityId) -> Option<Arc<Entity>> {
        self.registry.get(id)
    }

    // --- building ---

    pub fn add_area(&self, name: &str, description: &str) -> Result<EntityId, RegistryError> {
        let id = self.ids.allocate();
        let area = Entity::new(id, name, description, EntityBody::Area(Area::default()));
        self.registry.add(Arc::new(area), None)?;
        if !self.start_area().is_valid() {
            self.set_start_area(id);
        }
        Ok(id)
    }

    /// One-way exit from `from` to `to`.
    pub fn link(&self, from: EntityId, exit: &str, to: EntityId) -> bool {
        match self.get(from) {
            Some(entity) => match entity.as_area() {
                Some(area) => {
                    area.add_exit(exit, to);
                    true
                }
                None => false,
            },
            None => false,
        }
    }

    /// Place a new item on an area floor or in a creature's or player's
    /// inventory.
    pub fn add_item(
        &self,
        name: &str,
        keywords: &[&str],
        description: &str,
        kind: ItemKind,
        holder: EntityId,
    ) -> Result<EntityId, RegistryError> {
        let id = self.ids.allocate();
        let item = Entity::new(id, name, description, EntityBody::Item(Item { kind, value: 1 }))
            .with_keywords(keywords.iter().copied())
            .at(holder);
        self.registry.add(Arc::new(item), None)?;
        match self.get(holder).as_deref().and_then(|h| h.inventory()) {
            Some(inv) => inv.add(id),
            None => tracing::warn!(item = %id, holder = %holder, "item placed in something that cannot hold it"),
        }
        Ok(id)
    }

    pub fn add_creature(&self, spec: CreatureSpec, area: EntityId) -> Result<EntityId, RegistryError> {
        let id = self.ids.allocate();
        let creature = Entity::new(
            id,
            spec.name,
            spec.description,
            EntityBody::Creature(Creature {
                combat: Combatant::new(spec.abilities, spec.size, spec.max_health, spec.max_special, spec.skill),
                inventory: Inventory::default(),
                spawn_area: area,
                ambulatory: spec.ambulatory,
                experience: spec.experience,
                respawn_ticks: spec.respawn_ticks,
            }),
        )
        .with_keywords(spec.keywords)
        .at(area);
        self.registry.add(Arc::new(creature), None)?;
        if let Some(a) = self.get(area).as_deref().and_then(Entity::as_area) {
            a.enter(id);
        }
        Ok(id)
    }

    /// A fresh, unregistered player standing in the start area.
    pub fn new_player(&self, username: &str) -> Entity {
        let s = &self.settings;
        let combat = Combatant::new(
            Abilities {
                strength: 12,
                dexterity: 12,
                intelligence: 10,
            },
            Size::Medium,
            s.player_max_health,
            s.player_max_special,
            Some(SpecialSkill {
                name: "power strike".to_string(),
                damage: DiceSpec::new(1, 8, 0),
                cost: 3,
            }),
        );
        Entity::new(
            self.ids.allocate(),
            username,
            format!("{} the adventurer.", username),
            EntityBody::Player(Player::new(username, combat)),
        )
        .with_keywords([username.to_lowercase()])
        .at(self.start_area())
    }

    // --- queries ---

    pub fn area_of(&self, entity: &Entity) -> Option<Arc<Entity>> {
        let area = self.get(entity.location()?)?;
        area.as_area().is_some().then_some(area)
    }

    /// Living players standing in an area.
    pub fn players_in(&self, area: &Entity) -> Vec<Arc<Entity>> {
        let Some(a) = area.as_area() else {
            return Vec::new();
        };
        a.occupants()
            .into_iter()
            .filter_map(|id| self.get(id))
            .filter(|e| e.is_player() && self.registry.is_active(e.id()))
            .filter(|e| e.combatant().is_some_and(Combatant::is_alive))
            .collect()
    }

    pub fn player_lexicon(&self, player: &Entity) -> Vec<LexiconEntry> {
        player
            .inventory()
            .map(Inventory::list)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.get(id))
            .map(|e| lexicon_entry(&e, LexKind::Item))
            .collect()
    }

    /// Occupants (except the viewer), floor items and exits of an area.
    pub fn area_lexicon(&self, area: &Entity, viewer: EntityId) -> Vec<LexiconEntry> {
        let Some(a) = area.as_area() else {
            return Vec::new();
        };
        let mut lex = Vec::new();
        for occupant in a.occupants().into_iter().filter(|&id| id != viewer) {
            if let Some(e) = self.get(occupant) {
                let kind = if e.is_player() { LexKind::Player } else { LexKind::Creature };
                lex.push(lexicon_entry(&e, kind));
            }
        }
        for item in a.floor().list() {
            if let Some(e) = self.get(item) {
                lex.push(lexicon_entry(&e, LexKind::Item));
            }
        }
        for exit in a.exits() {
            lex.push(LexiconEntry::new(exit.to, exit.name, Vec::new(), LexKind::Exit));
        }
        lex
    }

    /// Sum of armor carried.
    pub fn armor_of(&self, entity: &Entity) -> i32 {
        entity
            .inventory()
            .map(Inventory::list)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.get(id))
            .filter_map(|e| e.as_item().and_then(Item::armor_defense))
            .sum()
    }

    /// Carried weapons as (name, damage).
    pub fn weapons_of(&self, entity: &Entity) -> Vec<(String, DiceSpec)> {
        entity
            .inventory()
            .map(Inventory::list)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|id| self.get(id))
            .filter_map(|e| e.as_item().and_then(Item::weapon_damage).map(|d| (e.name(), d)))
            .collect()
    }

    // --- mutation ---

    /// Move a creature or player between areas, keeping occupant lists in
    /// step with its location. Hibernating players are refused: they stay
    /// out of every area until they log back in.
    pub fn move_to(&self, who: &Entity, to: EntityId) -> bool {
        if who.is_player() && !self.registry().is_active(who.id()) {
            tracing::debug!(player = %who.id(), area = %to, "refusing to move a hibernating player");
            return false;
        }
        let Some(dest) = self.get(to) else {
            return false;
        };
        let Some(dest_area) = dest.as_area() else {
            return false;
        };
        if let Some(old) = self.area_of(who).as_deref().and_then(Entity::as_area) {
            old.leave(who.id());
        }
        who.set_location(Some(to));
        dest_area.enter(who.id());
        true
    }

    /// Take an entity out of its area's occupant list without forgetting
    /// where it was.
    pub fn withdraw(&self, who: &Entity) {
        if let Some(area) = self.area_of(who).as_deref().and_then(Entity::as_area) {
            area.leave(who.id());
        }
    }

    /// Tear down whatever fight `entity` is in, on both sides.
    pub fn break_engagement(&self, entity: &Entity) -> Option<EntityId> {
        let me = entity.combatant()?;
        let partner_id = me.engaged_with()?;
        match self.get(partner_id) {
            Some(partner) => match partner.combatant() {
                Some(them) => {
                    combatant::disengage_pair((entity.id(), me), (partner_id, them));
                }
                None => {
                    combatant::clear_dangling(me, partner_id);
                }
            },
            None => {
                combatant::clear_dangling(me, partner_id);
            }
        }
        Some(partner_id)
    }

    /// Drop everything an entity carries onto the floor of its area.
    pub fn spill_inventory(&self, entity: &Entity) -> Vec<EntityId> {
        let (Some(inv), Some(area)) = (entity.inventory(), self.area_of(entity)) else {
            return Vec::new();
        };
        let Some(floor) = area.as_area().map(Area::floor) else {
            return Vec::new();
        };
        let items = inv.take_all();
        for &item in &items {
            floor.add(item);
            if let Some(e) = self.get(item) {
                e.set_location(Some(area.id()));
            }
        }
        items
    }

    // --- text ---

    pub fn describe_area(&self, area: &Entity, viewer: EntityId) -> String {
        let mut out = format!("{}\n{}", area.name(), area.description());
        let Some(a) = area.as_area() else {
            return out;
        };
        let exits: Vec<String> = a.exits().into_iter().map(|e| e.name).collect();
        if exits.is_empty() {
            out.push_str("\nThere are no obvious exits.");
        } else {
            out.push_str(&format!("\nExits: {}", exits.join(", ")));
        }
        for id in a.occupants().into_iter().filter(|&id| id != viewer) {
            if let Some(e) = self.get(id) {
                let fighting = e
                    .combatant()
                    .and_then(Combatant::engaged_with)
                    .and_then(|p| self.get(p))
                    .map(|p| format!(", fighting {}", p.name()))
                    .unwrap_or_default();
                out.push_str(&format!("\n{} is here{}.", e.name(), fighting));
            }
        }
        for item in a.floor().list() {
            if let Some(e) = self.get(item) {
                out.push_str(&format!("\n{} lies here.", e.name()));
            }
        }
        out
    }

    pub fn describe_entity(&self, entity: &Entity) -> String {
        let mut out = format!("{}\n{}", entity.name(), entity.description());
        if let Some(c) = entity.combatant() {
            let v = c.snapshot();
            out.push_str(&format!("\nHealth: {}/{}", v.health, v.max_health));
        }
        if let Some(item) = entity.as_item() {
            match item.kind {
                ItemKind::Weapon { damage } => out.push_str(&format!("\nA weapon dealing {}.", damage)),
                ItemKind::Armor { defense } => out.push_str(&format!("\nArmor worth {} defense.", defense)),
                ItemKind::Trinket => {}
            }
        }
        out
    }

    pub fn count(&self, category: Category) -> usize {
        self.registry.category(category).len()
    }
}

fn lexicon_entry(entity: &Entity, kind: LexKind) -> LexiconEntry {
    LexiconEntry::new(entity.id(), entity.name(), entity.keywords(), kind)
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("entities", &self.registry.len())
            .field("start_area", &self.start_area())
            .field("tick", &self.tick())
            .finish()
    }
}
