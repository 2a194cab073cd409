use std::collections::VecDeque;

use parking_lot::{Mutex, MutexGuard};
use registry::EntityId;
use serde::{Deserialize, Serialize};

use crate::commands::CommandRecord;
use crate::dice::{modifier, DiceSpec};

/// Most commands a player may have waiting behind a cooldown.
pub const MAX_QUEUED_COMMANDS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Abilities {
    pub strength: i32,
    pub dexterity: i32,
    pub intelligence: i32,
}

impl Default for Abilities {
    fn default() -> Self {
        Self {
            strength: 10,
            dexterity: 10,
            intelligence: 10,
        }
    }
}

impl Abilities {
    pub fn str_mod(&self) -> i32 {
        modifier(self.strength)
    }

    pub fn dex_mod(&self) -> i32 {
        modifier(self.dexterity)
    }

    pub fn int_mod(&self) -> i32 {
        modifier(self.intelligence)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Size {
    Tiny,
    Small,
    Medium,
    Large,
    Huge,
}

impl Size {
    /// Smaller bodies are harder to hit and to spot.
    pub fn modifier(self) -> i32 {
        match self {
            Size::Tiny => 2,
            Size::Small => 1,
            Size::Medium => 0,
            Size::Large => -1,
            Size::Huge => -2,
        }
    }
}

/// Innate attack paid for with the special resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialSkill {
    pub name: String,
    pub damage: DiceSpec,
    pub cost: i32,
}

/// Mutable combat state, all behind one lock per combatant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Vitals {
    pub health: i32,
    pub max_health: i32,
    pub special: i32,
    pub max_special: i32,
    pub cooldown: u32,
    /// Tick at which a dead combatant comes back.
    pub respawn_at: Option<u64>,
    #[serde(skip)]
    pub engaged: Option<EntityId>,
    #[serde(skip)]
    pub queue: VecDeque<CommandRecord>,
}

impl Vitals {
    pub fn is_alive(&self) -> bool {
        self.health > 0 && self.respawn_at.is_none()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreatureState {
    DormantDead,
    Cooldown,
    Engaged,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum EngageError {
    #[error("cannot fight yourself")]
    SelfTarget,
    #[error("already fighting someone else")]
    AlreadyEngaged,
    #[error("already fighting another player")]
    TargetBusy,
    #[error("target is already dead")]
    TargetDead,
    #[error("dead combatants cannot fight")]
    AttackerDead,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Combatant {
    pub abilities: Abilities,
    pub size: Size,
    pub skill: Option<SpecialSkill>,
    vitals: Mutex<Vitals>,
}

impl Combatant {
    pub fn new(abilities: Abilities, size: Size, max_health: i32, max_special: i32, skill: Option<SpecialSkill>) -> Self {
        Self {
            abilities,
            size,
            skill,
            vitals: Mutex::new(Vitals {
                health: max_health,
                max_health,
                special: max_special,
                max_special,
                ..Vitals::default()
            }),
        }
    }

    pub fn vitals(&self) -> MutexGuard<'_, Vitals> {
        self.vitals.lock()
    }

    pub fn snapshot(&self) -> Vitals {
        self.vitals.lock().clone()
    }

    pub fn is_alive(&self) -> bool {
        self.vitals.lock().is_alive()
    }

    pub fn engaged_with(&self) -> Option<EntityId> {
        self.vitals.lock().engaged
    }

    pub fn cooldown(&self) -> u32 {
        self.vitals.lock().cooldown
    }

    pub fn set_cooldown(&self, ticks: u32) {
        self.vitals.lock().cooldown = ticks;
    }

    /// One tick of recovery. Never goes below zero.
    pub fn tick_cooldown(&self) -> u32 {
        let mut v = self.vitals.lock();
        v.cooldown = v.cooldown.saturating_sub(1);
        v.cooldown
    }

    /// Ticks to wait after acting.
    pub fn action_cooldown(&self) -> u32 {
        (5 - self.abilities.dex_mod()).max(1) as u32
    }

    pub fn armor_class(&self, armor: i32) -> i32 {
        10 + self.abilities.dex_mod() + self.size.modifier() + armor
    }

    pub fn state(&self) -> CreatureState {
        let v = self.vitals.lock();
        if !v.is_alive() {
            CreatureState::DormantDead
        } else if v.cooldown > 0 {
            CreatureState::Cooldown
        } else if v.engaged.is_some() {
            CreatureState::Engaged
        } else {
            CreatureState::Idle
        }
    }

    /// Subtract damage, clamping at zero. Returns remaining health and
    /// whether this blow was the one that killed. Blows landing on an
    /// already dead combatant change nothing.
    pub fn apply_damage(&self, amount: i32) -> (i32, bool) {
        let mut v = self.vitals.lock();
        if !v.is_alive() {
            return (0, false);
        }
        v.health = (v.health - amount.max(0)).max(0);
        (v.health, v.health == 0)
    }

    /// Spend special resource. False (and nothing spent) if short.
    pub fn spend_special(&self, cost: i32) -> bool {
        let mut v = self.vitals.lock();
        if v.special < cost {
            return false;
        }
        v.special -= cost;
        true
    }

    /// Regain health and special, capped at max. Dead or engaged
    /// combatants do not recover.
    pub fn regenerate(&self, amount: i32) -> bool {
        let mut v = self.vitals.lock();
        if !v.is_alive() || v.engaged.is_some() {
            return false;
        }
        let before = (v.health, v.special);
        v.health = (v.health + amount).min(v.max_health);
        v.special = (v.special + amount).min(v.max_special);
        before != (v.health, v.special)
    }

    /// Mark dead and schedule the respawn.
    pub fn arm_respawn(&self, at_tick: u64) {
        let mut v = self.vitals.lock();
        v.health = 0;
        v.cooldown = 0;
        v.respawn_at = Some(at_tick);
        v.queue.clear();
    }

    pub fn respawn_due(&self, tick: u64) -> bool {
        matches!(self.vitals.lock().respawn_at, Some(at) if tick >= at)
    }

    /// Full health, no cooldown, nothing queued.
    pub fn restore(&self) {
        let mut v = self.vitals.lock();
        v.health = v.max_health;
        v.special = v.max_special;
        v.cooldown = 0;
        v.respawn_at = None;
        v.engaged = None;
        v.queue.clear();
    }

    pub fn enqueue(&self, record: CommandRecord) -> bool {
        let mut v = self.vitals.lock();
        if v.queue.len() >= MAX_QUEUED_COMMANDS {
            return false;
        }
        v.queue.push_back(record);
        true
    }

    pub fn pop_queued(&self) -> Option<CommandRecord> {
        self.vitals.lock().queue.pop_front()
    }

    pub fn clear_queue(&self) {
        self.vitals.lock().queue.clear();
    }

    pub fn queued_len(&self) -> usize {
        self.vitals.lock().queue.len()
    }
}

/// Lock two combatants in ascending id order. Guards come back in argument
/// order. `None` if both ids are the same.
pub fn lock_pair<'a>(
    a: (EntityId, &'a Combatant),
    b: (EntityId, &'a Combatant),
) -> Option<(MutexGuard<'a, Vitals>, MutexGuard<'a, Vitals>)> {
    if a.0 == b.0 {
        return None;
    }
    if a.0 < b.0 {
        let ga = a.1.vitals.lock();
        let gb = b.1.vitals.lock();
        Some((ga, gb))
    } else {
        let gb = b.1.vitals.lock();
        let ga = a.1.vitals.lock();
        Some((ga, gb))
    }
}

/// Link two combatants to each other. Succeeds without change if they are
/// already paired.
pub fn engage(a: (EntityId, &Combatant), b: (EntityId, &Combatant)) -> Result<(), EngageError> {
    let (a_id, b_id) = (a.0, b.0);
    let (mut va, mut vb) = lock_pair(a, b).ok_or(EngageError::SelfTarget)?;
    if !va.is_alive() {
        return Err(EngageError::AttackerDead);
    }
    if !vb.is_alive() {
        return Err(EngageError::TargetDead);
    }
    if va.engaged == Some(b_id) && vb.engaged == Some(a_id) {
        return Ok(());
    }
    if vb.engaged.is_some_and(|other| other != a_id) {
        return Err(EngageError::TargetBusy);
    }
    if va.engaged.is_some_and(|other| other != b_id) {
        return Err(EngageError::AlreadyEngaged);
    }
    va.engaged = Some(b_id);
    vb.engaged = Some(a_id);
    Ok(())
}

/// Break the link between two combatants. Each side is only cleared if it
/// still points at the other. Returns whether anything changed.
pub fn disengage_pair(a: (EntityId, &Combatant), b: (EntityId, &Combatant)) -> bool {
    let (a_id, b_id) = (a.0, b.0);
    let Some((mut va, mut vb)) = lock_pair(a, b) else {
        return false;
    };
    let mut changed = false;
    if va.engaged == Some(b_id) {
        va.engaged = None;
        changed = true;
    }
    if vb.engaged == Some(a_id) {
        vb.engaged = None;
        changed = true;
    }
    changed
}

/// Clear one side whose partner no longer exists.
pub fn clear_dangling(c: &Combatant, partner: EntityId) -> bool {
    let mut v = c.vitals.lock();
    if v.engaged == Some(partner) {
        v.engaged = None;
        true
    } else {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fighter(hp: i32) -> Combatant {
        Combatant::new(Abilities::default(), Size::Medium, hp, 4, None)
    }

    #[test]
    fn modifiers_feed_armor_class_and_cooldown() {
        let quick = Combatant::new(
            Abilities {
                dexterity: 16,
                ..Abilities::default()
            },
            Size::Small,
            10,
            0,
            None,
        );
        assert_eq!(quick.armor_class(2), 10 + 3 + 1 + 2);
        assert_eq!(quick.action_cooldown(), 2);

        let nimble = Combatant::new(
            Abilities {
                dexterity: 30,
                ..Abilities::default()
            },
            Size::Medium,
            10,
            0,
            None,
        );
        assert_eq!(nimble.action_cooldown(), 1);

        let clumsy = Combatant::new(
            Abilities {
                dexterity: 6,
                ..Abilities::default()
            },
            Size::Huge,
            10,
            0,
            None,
        );
        assert_eq!(clumsy.action_cooldown(), 7);
    }

    #[test]
    fn cooldown_never_goes_negative() {
        let c = fighter(10);
        c.set_cooldown(2);
        assert_eq!(c.tick_cooldown(), 1);
        assert_eq!(c.tick_cooldown(), 0);
        assert_eq!(c.tick_cooldown(), 0);
    }

    #[test]
    fn engage_is_symmetric_and_exclusive() {
        let (a, b, c) = (fighter(10), fighter(10), fighter(10));
        let (ia, ib, ic) = (EntityId(1), EntityId(2), EntityId(3));

        engage((ia, &a), (ib, &b)).unwrap();
        assert_eq!(a.engaged_with(), Some(ib));
        assert_eq!(b.engaged_with(), Some(ia));
        engage((ib, &b), (ia, &a)).unwrap();

        assert_eq!(engage((ic, &c), (ib, &b)), Err(EngageError::TargetBusy));
        assert_eq!(engage((ia, &a), (ic, &c)), Err(EngageError::AlreadyEngaged));
        assert_eq!(engage((ia, &a), (ia, &a)), Err(EngageError::SelfTarget));

        assert!(disengage_pair((ib, &b), (ia, &a)));
        assert_eq!(a.engaged_with(), None);
        assert_eq!(b.engaged_with(), None);
        assert!(!disengage_pair((ia, &a), (ib, &b)));
    }

    #[test]
    fn dead_targets_cannot_be_engaged() {
        let (a, b) = (fighter(10), fighter(10));
        b.arm_respawn(5);
        assert_eq!(engage((EntityId(1), &a), (EntityId(2), &b)), Err(EngageError::TargetDead));
    }

    #[test]
    fn state_precedence() {
        let (a, b) = (fighter(10), fighter(10));
        assert_eq!(a.state(), CreatureState::Idle);
        engage((EntityId(1), &a), (EntityId(2), &b)).unwrap();
        assert_eq!(a.state(), CreatureState::Engaged);
        a.set_cooldown(3);
        assert_eq!(a.state(), CreatureState::Cooldown);
        a.arm_respawn(10);
        assert_eq!(a.state(), CreatureState::DormantDead);
        assert!(!a.respawn_due(9));
        assert!(a.respawn_due(10));
        a.restore();
        assert_eq!(a.state(), CreatureState::Idle);
        assert_eq!(a.snapshot().health, 10);
    }

    #[test]
    fn damage_clamps_and_regen_caps() {
        let c = fighter(10);
        assert_eq!(c.apply_damage(4), (6, false));
        assert!(c.regenerate(10));
        assert_eq!(c.snapshot().health, 10);
        assert!(!c.regenerate(1));
        assert_eq!(c.apply_damage(50), (0, true));
        assert!(!c.is_alive());
        assert_eq!(c.apply_damage(5), (0, false));
    }

    #[test]
    fn special_resource_is_not_overspent() {
        let c = fighter(10);
        assert!(c.spend_special(3));
        assert!(!c.spend_special(3));
        assert_eq!(c.snapshot().special, 1);
    }

    #[test]
    fn concurrent_engage_has_one_winner() {
        let target = Arc::new(fighter(10));
        let attackers: Vec<Arc<Combatant>> = (0..6).map(|_| Arc::new(fighter(10))).collect();

        let handles: Vec<_> = attackers
            .iter()
            .enumerate()
            .map(|(i, a)| {
                let a = Arc::clone(a);
                let t = Arc::clone(&target);
                std::thread::spawn(move || engage((EntityId(10 + i as u64), &a), (EntityId(1), &t)).is_ok())
            })
            .collect();

        let wins = handles.into_iter().filter_map(|h| h.join().ok()).filter(|&won| won).count();
        assert_eq!(wins, 1);
        let partner = target.engaged_with().unwrap();
        let idx = (partner.0 - 10) as usize;
        assert_eq!(attackers[idx].engaged_with(), Some(EntityId(1)));
    }
}
