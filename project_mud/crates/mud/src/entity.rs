use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::{Mutex, MutexGuard, RwLock};
use registry::{Category, EntityId, Registered};
use serde::{Deserialize, Serialize};

use crate::combatant::Combatant;
use crate::dice::DiceSpec;

/// Anything that can be named, looked at and matched against player words.
pub trait Describable {
    fn name(&self) -> String;
    fn description(&self) -> String;
    fn keywords(&self) -> Vec<String>;

    /// Case-insensitive prefix match on the name or any keyword.
    fn matches(&self, word: &str) -> bool {
        let word = word.to_lowercase();
        if word.is_empty() {
            return false;
        }
        self.name().to_lowercase().starts_with(&word)
            || self.keywords().iter().any(|k| k.to_lowercase().starts_with(&word))
    }
}

/// Things that sit somewhere and can be carried or walk around.
pub trait Movable {
    /// Area (or holder, for items) this entity is in.
    fn location(&self) -> Option<EntityId>;
    fn set_location(&self, location: Option<EntityId>);
}

/// Things with health that can take part in combat.
pub trait Attackable {
    fn combatant(&self) -> &Combatant;
}

/// Things holding items that can be taken or dropped on death.
pub trait Lootable {
    fn inventory(&self) -> &Inventory;
}

/// Item ids held by a creature, a player or an area floor.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Inventory {
    items: Mutex<Vec<EntityId>>,
}

impl Inventory {
    pub fn add(&self, item: EntityId) {
        let mut items = self.items.lock();
        if !items.contains(&item) {
            items.push(item);
        }
    }

    /// Remove an item. False if it was not here, which is how concurrent
    /// takers learn that somebody else got there first.
    pub fn remove(&self, item: EntityId) -> bool {
        let mut items = self.items.lock();
        match items.iter().position(|&i| i == item) {
            Some(pos) => {
                items.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, item: EntityId) -> bool {
        self.items.lock().contains(&item)
    }

    pub fn list(&self) -> Vec<EntityId> {
        self.items.lock().clone()
    }

    pub fn take_all(&self) -> Vec<EntityId> {
        std::mem::take(&mut *self.items.lock())
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exit {
    /// Direction word players type, e.g. "north".
    pub name: String,
    pub to: EntityId,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Area {
    exits: RwLock<Vec<Exit>>,
    /// Creatures and connected players standing here.
    occupants: Mutex<Vec<EntityId>>,
    floor: Inventory,
}

impl Area {
    pub fn exits(&self) -> Vec<Exit> {
        self.exits.read().clone()
    }

    pub fn add_exit(&self, name: impl Into<String>, to: EntityId) {
        let name = name.into();
        let mut exits = self.exits.write();
        exits.retain(|e| !e.name.eq_ignore_ascii_case(&name));
        exits.push(Exit { name, to });
    }

    /// Exit whose name starts with `word` ("n" finds "north").
    pub fn find_exit(&self, word: &str) -> Option<Exit> {
        let word = word.to_lowercase();
        if word.is_empty() {
            return None;
        }
        self.exits
            .read()
            .iter()
            .find(|e| e.name.to_lowercase().starts_with(&word))
            .cloned()
    }

    pub fn exit_towards(&self, area: EntityId) -> Option<Exit> {
        self.exits.read().iter().find(|e| e.to == area).cloned()
    }

    pub fn occupants(&self) -> Vec<EntityId> {
        self.occupants.lock().clone()
    }

    pub fn enter(&self, who: EntityId) {
        let mut occupants = self.occupants.lock();
        if !occupants.contains(&who) {
            occupants.push(who);
        }
    }

    pub fn leave(&self, who: EntityId) -> bool {
        let mut occupants = self.occupants.lock();
        let before = occupants.len();
        occupants.retain(|&o| o != who);
        occupants.len() != before
    }

    pub fn is_present(&self, who: EntityId) -> bool {
        self.occupants.lock().contains(&who)
    }

    pub(crate) fn retain_occupants(&self, keep: impl Fn(EntityId) -> bool) {
        self.occupants.lock().retain(|&o| keep(o));
    }

    pub fn floor(&self) -> &Inventory {
        &self.floor
    }
}

impl Lootable for Area {
    fn inventory(&self) -> &Inventory {
        &self.floor
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemKind {
    Weapon { damage: DiceSpec },
    Armor { defense: i32 },
    Trinket,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Item {
    pub kind: ItemKind,
    pub value: u32,
}

impl Item {
    pub fn weapon_damage(&self) -> Option<DiceSpec> {
        match self.kind {
            ItemKind::Weapon { damage } => Some(damage),
            _ => None,
        }
    }

    pub fn armor_defense(&self) -> Option<i32> {
        match self.kind {
            ItemKind::Armor { defense } => Some(defense),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Creature {
    pub combat: Combatant,
    pub inventory: Inventory,
    pub spawn_area: EntityId,
    /// Whether it may wander between areas and chase fleeing players.
    pub ambulatory: bool,
    /// Experience awarded to the player who kills it.
    pub experience: u64,
    pub respawn_ticks: u64,
}

impl Attackable for Creature {
    fn combatant(&self) -> &Combatant {
        &self.combat
    }
}

impl Lootable for Creature {
    fn inventory(&self) -> &Inventory {
        &self.inventory
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Player {
    pub username: String,
    pub combat: Combatant,
    pub inventory: Inventory,
    experience: AtomicU64,
    #[serde(skip)]
    admin: AtomicBool,
    #[serde(skip)]
    edit_mode: AtomicBool,
    /// Held while a command runs for this player and while it logs in or
    /// out, so a command never lands on a half-hibernated player.
    #[serde(skip)]
    presence: Mutex<()>,
}

impl Player {
    pub fn new(username: impl Into<String>, combat: Combatant) -> Self {
        Self {
            username: username.into(),
            combat,
            inventory: Inventory::default(),
            experience: AtomicU64::new(0),
            admin: AtomicBool::new(false),
            edit_mode: AtomicBool::new(false),
            presence: Mutex::new(()),
        }
    }

    pub fn hold_presence(&self) -> MutexGuard<'_, ()> {
        self.presence.lock()
    }

    pub fn experience(&self) -> u64 {
        self.experience.load(Ordering::Relaxed)
    }

    pub fn award_experience(&self, amount: u64) -> u64 {
        self.experience.fetch_add(amount, Ordering::Relaxed) + amount
    }

    pub fn is_admin(&self) -> bool {
        self.admin.load(Ordering::Relaxed)
    }

    pub fn set_admin(&self, admin: bool) {
        self.admin.store(admin, Ordering::Relaxed);
    }

    pub fn edit_mode(&self) -> bool {
        self.edit_mode.load(Ordering::Relaxed)
    }

    pub fn set_edit_mode(&self, on: bool) {
        self.edit_mode.store(on, Ordering::Relaxed);
    }
}

impl Attackable for Player {
    fn combatant(&self) -> &Combatant {
        &self.combat
    }
}

impl Lootable for Player {
    fn inventory(&self) -> &Inventory {
        &self.inventory
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Quest {
    pub objective: RwLock<String>,
    pub reward: u64,
}

#[derive(Debug, Serialize, Deserialize)]
pub enum EntityBody {
    Area(Area),
    Item(Item),
    Creature(Creature),
    Player(Player),
    Quest(Quest),
}

/// A live game object. Identity is fixed at construction; every mutable
/// attribute has its own lock so unrelated edits never contend.
#[derive(Debug, Serialize, Deserialize)]
pub struct Entity {
    id: EntityId,
    name: RwLock<String>,
    keywords: RwLock<Vec<String>>,
    description: RwLock<String>,
    location: Mutex<Option<EntityId>>,
    body: EntityBody,
}

impl Entity {
    pub fn new(id: EntityId, name: impl Into<String>, description: impl Into<String>, body: EntityBody) -> Self {
        Self {
            id,
            name: RwLock::new(name.into()),
            keywords: RwLock::new(Vec::new()),
            description: RwLock::new(description.into()),
            location: Mutex::new(None),
            body,
        }
    }

    pub fn with_keywords<I, S>(self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        *self.keywords.write() = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn at(self, location: EntityId) -> Self {
        *self.location.lock() = Some(location);
        self
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    pub fn body(&self) -> &EntityBody {
        &self.body
    }

    pub fn rename(&self, name: impl Into<String>) {
        *self.name.write() = name.into();
    }

    pub fn set_description(&self, description: impl Into<String>) {
        *self.description.write() = description.into();
    }

    pub fn as_area(&self) -> Option<&Area> {
        match &self.body {
            EntityBody::Area(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_item(&self) -> Option<&Item> {
        match &self.body {
            EntityBody::Item(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_creature(&self) -> Option<&Creature> {
        match &self.body {
            EntityBody::Creature(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_player(&self) -> Option<&Player> {
        match &self.body {
            EntityBody::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_quest(&self) -> Option<&Quest> {
        match &self.body {
            EntityBody::Quest(q) => Some(q),
            _ => None,
        }
    }

    pub fn is_player(&self) -> bool {
        matches!(self.body, EntityBody::Player(_))
    }

    // Capability views: callers dispatch on what an entity can do rather
    // than on what it is.

    pub fn attackable(&self) -> Option<&dyn Attackable> {
        match &self.body {
            EntityBody::Creature(c) => Some(c),
            EntityBody::Player(p) => Some(p),
            _ => None,
        }
    }

    pub fn lootable(&self) -> Option<&dyn Lootable> {
        match &self.body {
            EntityBody::Creature(c) => Some(c),
            EntityBody::Player(p) => Some(p),
            EntityBody::Area(a) => Some(a),
            _ => None,
        }
    }

    pub fn movable(&self) -> Option<&dyn Movable> {
        match &self.body {
            EntityBody::Area(_) | EntityBody::Quest(_) => None,
            _ => Some(self),
        }
    }

    pub fn combatant(&self) -> Option<&Combatant> {
        self.attackable().map(|a| a.combatant())
    }

    pub fn inventory(&self) -> Option<&Inventory> {
        self.lootable().map(|l| l.inventory())
    }
}

impl Describable for Entity {
    fn name(&self) -> String {
        self.name.read().clone()
    }

    fn description(&self) -> String {
        self.description.read().clone()
    }

    fn keywords(&self) -> Vec<String> {
        self.keywords.read().clone()
    }
}

impl Movable for Entity {
    fn location(&self) -> Option<EntityId> {
        *self.location.lock()
    }

    fn set_location(&self, location: Option<EntityId>) {
        *self.location.lock() = location;
    }
}

impl Registered for Entity {
    fn id(&self) -> EntityId {
        self.id
    }

    fn category(&self) -> Category {
        match self.body {
            EntityBody::Area(_) => Category::Area,
            EntityBody::Item(_) => Category::Item,
            EntityBody::Creature(_) => Category::Creature,
            EntityBody::Player(_) => Category::Player,
            EntityBody::Quest(_) => Category::Quest,
        }
    }

    fn username(&self) -> Option<String> {
        self.as_player().map(|p| p.username.clone())
    }
}
