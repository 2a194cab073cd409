use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::RegistryError;
use crate::types::{Category, ConnectionId, EntityId};

/// What the registry needs to know about a stored entity to file it.
pub trait Registered: Send + Sync {
    fn id(&self) -> EntityId;
    fn category(&self) -> Category;
    /// Account name for player entities, `None` for everything else.
    fn username(&self) -> Option<String>;
}

/// Normalized key for the inactive-player view. Usernames are case-insensitive.
pub fn username_key(username: &str) -> String {
    username.trim().to_lowercase()
}

#[derive(Debug, Default)]
struct ActivePlayers {
    by_conn: HashMap<ConnectionId, EntityId>,
    by_entity: HashMap<EntityId, ConnectionId>,
    by_name: HashMap<String, EntityId>,
}

impl ActivePlayers {
    fn bind(&mut self, conn: ConnectionId, id: EntityId, key: String) {
        self.by_conn.insert(conn, id);
        self.by_entity.insert(id, conn);
        self.by_name.insert(key, id);
    }

    fn unbind(&mut self, conn: ConnectionId, id: EntityId, key: &str) {
        self.by_conn.remove(&conn);
        self.by_entity.remove(&id);
        self.by_name.remove(key);
    }
}

/// Authoritative store of every live entity plus its typed views.
///
/// Each collection sits behind its own lock. Operations touching several
/// collections acquire them in this order and never the other way round:
///
/// 1. `objects` (primary map)
/// 2. one of `indices` (category index)
/// 3. `active` (connected players)
/// 4. `inactive` (hibernating players)
///
/// No lock is held when a method returns, so callers may send messages or
/// block freely with the handles they get back.
pub struct ObjectRegistry<T> {
    objects: RwLock<HashMap<EntityId, Arc<T>>>,
    indices: [RwLock<BTreeSet<EntityId>>; 4],
    active: RwLock<ActivePlayers>,
    inactive: RwLock<HashMap<String, EntityId>>,
}

impl<T: Registered> ObjectRegistry<T> {
    pub fn new() -> Self {
        Self {
            objects: RwLock::new(HashMap::new()),
            indices: std::array::from_fn(|_| RwLock::new(BTreeSet::new())),
            active: RwLock::new(ActivePlayers::default()),
            inactive: RwLock::new(HashMap::new()),
        }
    }

    /// Register an entity. Players are filed as active when `conn` is given
    /// and as hibernating under their username otherwise. A username is
    /// unique across both views.
    pub fn add(&self, entity: Arc<T>, conn: Option<ConnectionId>) -> Result<(), RegistryError> {
        let id = entity.id();
        if !id.is_valid() {
            return Err(RegistryError::InvalidId);
        }
        let category = entity.category();

        let mut objects = self.objects.write();
        if objects.contains_key(&id) {
            return Err(RegistryError::AlreadyRegistered(id));
        }

        match category.slot() {
            Some(slot) => {
                let mut index = self.indices[slot].write();
                if !index.insert(id) {
                    return Err(inconsistent(id, category, "indexed but absent from primary map"));
                }
            }
            None => {
                let username = entity.username().ok_or(RegistryError::MissingUsername(id))?;
                let key = username_key(&username);
                let mut active = self.active.write();
                let mut inactive = self.inactive.write();
                if active.by_name.contains_key(&key) || inactive.contains_key(&key) {
                    return Err(RegistryError::UsernameTaken(username));
                }
                if active.by_entity.contains_key(&id) {
                    return Err(inconsistent(id, category, "active but absent from primary map"));
                }
                match conn {
                    Some(conn) => {
                        if active.by_conn.contains_key(&conn) {
                            return Err(RegistryError::ConnectionInUse(conn));
                        }
                        active.bind(conn, id, key);
                    }
                    None => {
                        inactive.insert(key, id);
                    }
                }
            }
        }

        objects.insert(id, entity);
        tracing::debug!(entity = %id, %category, "registered");
        Ok(())
    }

    /// Unregister an entity from the primary map and every view it belongs
    /// to. Nothing is touched unless every expected view agrees, and the
    /// removed handle is returned so the caller controls when it is dropped.
    pub fn remove(&self, id: EntityId, conn: Option<ConnectionId>) -> Result<Arc<T>, RegistryError> {
        let mut objects = self.objects.write();
        let Some(entity) = objects.get(&id).cloned() else {
            if let Some(category) = self.stray_view(id) {
                return Err(inconsistent(id, category, "in a secondary view but not in primary map"));
            }
            return Err(RegistryError::NotRegistered(id));
        };

        let category = entity.category();
        match category.slot() {
            Some(slot) => {
                let mut index = self.indices[slot].write();
                if !index.remove(&id) {
                    return Err(inconsistent(id, category, "in primary map but missing from its index"));
                }
            }
            None => self.unbind_player(entity.as_ref(), conn)?,
        }

        objects.remove(&id);
        tracing::debug!(entity = %id, %category, "unregistered");
        Ok(entity)
    }

    fn unbind_player(&self, entity: &T, conn: Option<ConnectionId>) -> Result<(), RegistryError> {
        let id = entity.id();
        let key = entity
            .username()
            .map(|u| username_key(&u))
            .ok_or(RegistryError::MissingUsername(id))?;
        let mut active = self.active.write();
        let mut inactive = self.inactive.write();

        let bound = active.by_entity.get(&id).copied();
        let hibernating = inactive.get(&key) == Some(&id);

        match (bound, hibernating) {
            (Some(bound_conn), false) => {
                if let Some(requested) = conn {
                    if requested != bound_conn {
                        return Err(RegistryError::UnknownConnection(requested));
                    }
                }
                active.unbind(bound_conn, id, &key);
            }
            (None, true) => {
                if let Some(requested) = conn {
                    return Err(RegistryError::UnknownConnection(requested));
                }
                inactive.remove(&key);
            }
            (Some(_), true) => {
                return Err(inconsistent(id, Category::Player, "both active and hibernating"));
            }
            (None, false) => {
                return Err(inconsistent(id, Category::Player, "neither active nor hibernating"));
            }
        }
        Ok(())
    }

    /// Which secondary view still mentions an id the primary map lacks.
    /// Caller holds the primary map lock.
    fn stray_view(&self, id: EntityId) -> Option<Category> {
        for category in Category::INDEXED {
            if let Some(slot) = category.slot() {
                if self.indices[slot].read().contains(&id) {
                    return Some(category);
                }
            }
        }
        if self.active.read().by_entity.contains_key(&id) {
            return Some(Category::Player);
        }
        if self.inactive.read().values().any(|&v| v == id) {
            return Some(Category::Player);
        }
        None
    }

    /// Move a hibernating player onto a live connection.
    pub fn promote_to_active(&self, username: &str, conn: ConnectionId) -> Result<Arc<T>, RegistryError> {
        let objects = self.objects.read();
        let mut active = self.active.write();
        let mut inactive = self.inactive.write();

        let key = username_key(username);
        let id = *inactive
            .get(&key)
            .ok_or_else(|| RegistryError::UnknownUsername(username.to_string()))?;
        if active.by_conn.contains_key(&conn) {
            return Err(RegistryError::ConnectionInUse(conn));
        }
        let entity = objects
            .get(&id)
            .cloned()
            .ok_or_else(|| inconsistent(id, Category::Player, "hibernating but absent from primary map"))?;

        inactive.remove(&key);
        active.bind(conn, id, key);
        tracing::debug!(entity = %id, %conn, "player promoted to active");
        Ok(entity)
    }

    /// Detach the player bound to `conn` and file it under its username.
    pub fn demote_to_inactive(&self, conn: ConnectionId) -> Result<Arc<T>, RegistryError> {
        let objects = self.objects.read();
        let mut active = self.active.write();
        let mut inactive = self.inactive.write();

        let id = *active
            .by_conn
            .get(&conn)
            .ok_or(RegistryError::UnknownConnection(conn))?;
        let entity = objects
            .get(&id)
            .cloned()
            .ok_or_else(|| inconsistent(id, Category::Player, "active but absent from primary map"))?;
        let key = entity
            .username()
            .map(|u| username_key(&u))
            .ok_or(RegistryError::MissingUsername(id))?;
        if inactive.contains_key(&key) {
            return Err(inconsistent(id, Category::Player, "username already hibernating"));
        }

        active.unbind(conn, id, &key);
        inactive.insert(key, id);
        tracing::debug!(entity = %id, %conn, "player demoted to inactive");
        Ok(entity)
    }

    pub fn get(&self, id: EntityId) -> Option<Arc<T>> {
        self.objects.read().get(&id).cloned()
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.objects.read().contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }

    /// Point-in-time copy of every registered entity, sorted by id.
    pub fn all(&self) -> Vec<Arc<T>> {
        let objects = self.objects.read();
        let mut all: Vec<Arc<T>> = objects.values().cloned().collect();
        all.sort_by_key(|e| e.id());
        all
    }

    /// Point-in-time copy of one category. May be stale by the time it is used.
    pub fn category(&self, category: Category) -> Vec<Arc<T>> {
        match category.slot() {
            Some(slot) => {
                let objects = self.objects.read();
                let index = self.indices[slot].read();
                index.iter().filter_map(|id| objects.get(id).cloned()).collect()
            }
            None => {
                // Both views at once, so a player changing sides is seen exactly once.
                let objects = self.objects.read();
                let active = self.active.read();
                let inactive = self.inactive.read();
                let mut players: Vec<Arc<T>> = active
                    .by_conn
                    .values()
                    .chain(inactive.values())
                    .filter_map(|id| objects.get(id).cloned())
                    .collect();
                players.sort_by_key(|p| p.id());
                players
            }
        }
    }

    /// Snapshot of connected players with their connections, sorted by id.
    pub fn active_players(&self) -> Vec<(ConnectionId, Arc<T>)> {
        let objects = self.objects.read();
        let active = self.active.read();
        let mut players: Vec<(ConnectionId, Arc<T>)> = active
            .by_conn
            .iter()
            .filter_map(|(conn, id)| objects.get(id).map(|e| (*conn, Arc::clone(e))))
            .collect();
        players.sort_by_key(|(_, p)| p.id());
        players
    }

    /// Snapshot of hibernating players, sorted by id.
    pub fn inactive_players(&self) -> Vec<Arc<T>> {
        let objects = self.objects.read();
        let inactive = self.inactive.read();
        let mut players: Vec<Arc<T>> = inactive.values().filter_map(|id| objects.get(id).cloned()).collect();
        players.sort_by_key(|p| p.id());
        players
    }

    pub fn active_player(&self, conn: ConnectionId) -> Option<Arc<T>> {
        let objects = self.objects.read();
        let id = *self.active.read().by_conn.get(&conn)?;
        objects.get(&id).cloned()
    }

    pub fn inactive_player(&self, username: &str) -> Option<Arc<T>> {
        let objects = self.objects.read();
        let id = *self.inactive.read().get(&username_key(username))?;
        objects.get(&id).cloned()
    }

    /// Connection currently bound to a player, if it is active.
    pub fn connection_of(&self, id: EntityId) -> Option<ConnectionId> {
        self.active.read().by_entity.get(&id).copied()
    }

    pub fn is_active(&self, id: EntityId) -> bool {
        self.connection_of(id).is_some()
    }

    /// Active player logged in under `username`, if any.
    pub fn active_player_by_username(&self, username: &str) -> Option<(ConnectionId, Arc<T>)> {
        let objects = self.objects.read();
        let active = self.active.read();
        let id = active.by_name.get(&username_key(username))?;
        let conn = *active.by_entity.get(id)?;
        objects.get(id).map(|p| (conn, Arc::clone(p)))
    }

    /// Verify every cross-collection invariant. Takes all locks (in order)
    /// so the answer describes a single instant.
    pub fn check_coherence(&self) -> Result<(), RegistryError> {
        let objects = self.objects.read();
        let indices: Vec<_> = self.indices.iter().map(|i| i.read()).collect();
        let active = self.active.read();
        let inactive = self.inactive.read();

        for (id, entity) in objects.iter() {
            let category = entity.category();
            match category.slot() {
                Some(slot) => {
                    for (other, index) in indices.iter().enumerate() {
                        if index.contains(id) != (other == slot) {
                            return Err(inconsistent(*id, category, "filed under the wrong index"));
                        }
                    }
                }
                None => {
                    let is_active = active.by_entity.contains_key(id);
                    let is_inactive = entity
                        .username()
                        .is_some_and(|u| inactive.get(&username_key(&u)) == Some(id));
                    if is_active == is_inactive {
                        return Err(inconsistent(*id, category, "player not in exactly one view"));
                    }
                }
            }
        }

        for (slot, index) in indices.iter().enumerate() {
            for id in index.iter() {
                match objects.get(id) {
                    Some(e) if e.category().slot() == Some(slot) => {}
                    _ => return Err(inconsistent(*id, Category::INDEXED[slot], "index entry without entity")),
                }
            }
        }

        if active.by_conn.len() != active.by_entity.len() || active.by_conn.len() != active.by_name.len() {
            return Err(inconsistent(EntityId::INVALID, Category::Player, "active maps out of step"));
        }
        for (key, id) in active.by_name.iter() {
            if inactive.contains_key(key) {
                return Err(inconsistent(*id, Category::Player, "username both active and hibernating"));
            }
        }
        for (conn, id) in active.by_conn.iter() {
            if active.by_entity.get(id) != Some(conn) || !objects.contains_key(id) {
                return Err(inconsistent(*id, Category::Player, "active binding without entity"));
            }
        }
        for id in inactive.values() {
            if !objects.contains_key(id) {
                return Err(inconsistent(*id, Category::Player, "hibernating entry without entity"));
            }
        }
        Ok(())
    }
}

impl<T: Registered> Default for ObjectRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn inconsistent(entity: EntityId, category: Category, detail: &str) -> RegistryError {
    tracing::error!(entity = %entity, %category, detail, "REGISTRY INCONSISTENCY, operation refused");
    RegistryError::Inconsistent {
        entity,
        category,
        detail: detail.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::IdAllocator;

    #[derive(Debug)]
    struct Thing {
        id: EntityId,
        category: Category,
        username: Option<String>,
    }

    impl Registered for Thing {
        fn id(&self) -> EntityId {
            self.id
        }
        fn category(&self) -> Category {
            self.category
        }
        fn username(&self) -> Option<String> {
            self.username.clone()
        }
    }

    fn thing(alloc: &IdAllocator, category: Category) -> Arc<Thing> {
        Arc::new(Thing {
            id: alloc.allocate(),
            category,
            username: None,
        })
    }

    fn player(alloc: &IdAllocator, name: &str) -> Arc<Thing> {
        Arc::new(Thing {
            id: alloc.allocate(),
            category: Category::Player,
            username: Some(name.to_string()),
        })
    }

    #[test]
    fn add_files_into_matching_index() {
        let alloc = IdAllocator::new();
        let reg = ObjectRegistry::new();
        let area = thing(&alloc, Category::Area);
        let goblin = thing(&alloc, Category::Creature);
        reg.add(Arc::clone(&area), None).unwrap();
        reg.add(Arc::clone(&goblin), None).unwrap();

        assert_eq!(reg.len(), 2);
        assert_eq!(reg.category(Category::Area).len(), 1);
        assert_eq!(reg.category(Category::Creature)[0].id, goblin.id);
        assert!(reg.category(Category::Item).is_empty());
        reg.check_coherence().unwrap();
    }

    #[test]
    fn add_rejects_invalid_and_duplicate() {
        let alloc = IdAllocator::new();
        let reg = ObjectRegistry::new();
        let unassigned = Arc::new(Thing {
            id: EntityId::INVALID,
            category: Category::Item,
            username: None,
        });
        assert_eq!(reg.add(unassigned, None), Err(RegistryError::InvalidId));

        let sword = thing(&alloc, Category::Item);
        reg.add(Arc::clone(&sword), None).unwrap();
        assert_eq!(
            reg.add(Arc::clone(&sword), None),
            Err(RegistryError::AlreadyRegistered(sword.id))
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn remove_twice_fails_second_time() {
        let alloc = IdAllocator::new();
        let reg = ObjectRegistry::new();
        let sword = thing(&alloc, Category::Item);
        reg.add(Arc::clone(&sword), None).unwrap();

        let removed = reg.remove(sword.id, None).unwrap();
        assert_eq!(removed.id, sword.id);
        assert_eq!(reg.remove(sword.id, None).unwrap_err(), RegistryError::NotRegistered(sword.id));
        assert!(reg.is_empty());
        reg.check_coherence().unwrap();
    }

    #[test]
    fn player_with_connection_is_active() {
        let alloc = IdAllocator::new();
        let reg = ObjectRegistry::new();
        let alice = player(&alloc, "Alice");
        reg.add(Arc::clone(&alice), Some(ConnectionId(3))).unwrap();

        assert_eq!(reg.active_player(ConnectionId(3)).unwrap().id, alice.id);
        assert_eq!(reg.connection_of(alice.id), Some(ConnectionId(3)));
        assert!(reg.inactive_player("alice").is_none());
        reg.check_coherence().unwrap();
    }

    #[test]
    fn player_without_connection_hibernates() {
        let alloc = IdAllocator::new();
        let reg = ObjectRegistry::new();
        let bob = player(&alloc, "Bob");
        reg.add(Arc::clone(&bob), None).unwrap();

        assert_eq!(reg.inactive_player("BOB").unwrap().id, bob.id);
        assert!(reg.active_players().is_empty());

        let other_bob = player(&alloc, "bob");
        assert!(matches!(reg.add(other_bob, None), Err(RegistryError::UsernameTaken(_))));
    }

    #[test]
    fn promote_and_demote_keep_exclusivity() {
        let alloc = IdAllocator::new();
        let reg = ObjectRegistry::new();
        let carol = player(&alloc, "Carol");
        reg.add(Arc::clone(&carol), None).unwrap();

        let conn = ConnectionId(9);
        reg.promote_to_active("carol", conn).unwrap();
        assert!(reg.is_active(carol.id));
        assert!(reg.inactive_player("carol").is_none());
        reg.check_coherence().unwrap();

        // Second promote fails: the source view no longer has the key.
        assert!(matches!(
            reg.promote_to_active("carol", ConnectionId(10)),
            Err(RegistryError::UnknownUsername(_))
        ));

        reg.demote_to_inactive(conn).unwrap();
        assert!(!reg.is_active(carol.id));
        assert!(reg.inactive_player("carol").is_some());
        assert_eq!(
            reg.demote_to_inactive(conn).unwrap_err(),
            RegistryError::UnknownConnection(conn)
        );
        reg.check_coherence().unwrap();
    }

    #[test]
    fn username_is_unique_across_views() {
        let alloc = IdAllocator::new();
        let reg = ObjectRegistry::new();
        reg.add(player(&alloc, "Hal"), Some(ConnectionId(1))).unwrap();
        assert!(matches!(
            reg.add(player(&alloc, "HAL"), Some(ConnectionId(2))),
            Err(RegistryError::UsernameTaken(_))
        ));
        assert!(matches!(
            reg.add(player(&alloc, "hal"), None),
            Err(RegistryError::UsernameTaken(_))
        ));
        assert_eq!(reg.active_player_by_username("hal").unwrap().0, ConnectionId(1));
        reg.check_coherence().unwrap();
    }

    #[test]
    fn promote_refuses_busy_connection() {
        let alloc = IdAllocator::new();
        let reg = ObjectRegistry::new();
        let dan = player(&alloc, "Dan");
        let eve = player(&alloc, "Eve");
        reg.add(dan, Some(ConnectionId(1))).unwrap();
        reg.add(eve, None).unwrap();
        assert_eq!(
            reg.promote_to_active("eve", ConnectionId(1)).unwrap_err(),
            RegistryError::ConnectionInUse(ConnectionId(1))
        );
        assert!(reg.inactive_player("eve").is_some());
    }

    #[test]
    fn remove_player_with_wrong_connection_changes_nothing() {
        let alloc = IdAllocator::new();
        let reg = ObjectRegistry::new();
        let fay = player(&alloc, "Fay");
        reg.add(Arc::clone(&fay), Some(ConnectionId(4))).unwrap();

        assert!(reg.remove(fay.id, Some(ConnectionId(5))).is_err());
        assert!(reg.contains(fay.id));
        reg.remove(fay.id, Some(ConnectionId(4))).unwrap();
        assert!(!reg.contains(fay.id));
        assert!(reg.active_player(ConnectionId(4)).is_none());
        reg.check_coherence().unwrap();
    }

    #[test]
    fn category_snapshot_survives_removal() {
        let alloc = IdAllocator::new();
        let reg = ObjectRegistry::new();
        let rat = thing(&alloc, Category::Creature);
        reg.add(Arc::clone(&rat), None).unwrap();

        let snapshot = reg.category(Category::Creature);
        reg.remove(rat.id, None).unwrap();
        // The copy still holds the handle; the registry does not.
        assert_eq!(snapshot.len(), 1);
        assert!(reg.get(rat.id).is_none());
    }

    #[test]
    fn concurrent_add_remove_stays_coherent() {
        let alloc = Arc::new(IdAllocator::new());
        let reg = Arc::new(ObjectRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let reg = Arc::clone(&reg);
                let alloc = Arc::clone(&alloc);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        let category = Category::INDEXED[(t + i) % 4];
                        let e = thing(&alloc, category);
                        reg.add(Arc::clone(&e), None).unwrap();
                        if i % 2 == 0 {
                            reg.remove(e.id, None).unwrap();
                            assert!(reg.remove(e.id, None).is_err());
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(reg.len(), 8 * 100);
        reg.check_coherence().unwrap();
    }

    #[test]
    fn concurrent_promote_only_one_wins() {
        let alloc = IdAllocator::new();
        let reg = Arc::new(ObjectRegistry::new());
        reg.add(player(&alloc, "Gus"), None).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|c| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || reg.promote_to_active("gus", ConnectionId(c)).is_ok())
            })
            .collect();
        let wins = handles.into_iter().map(|h| h.join().unwrap()).filter(|ok| *ok).count();
        assert_eq!(wins, 1);
        assert_eq!(reg.active_players().len(), 1);
        reg.check_coherence().unwrap();
    }

    #[test]
    fn player_category_sees_each_player_once_while_they_log_in_and_out() {
        let alloc = IdAllocator::new();
        let reg = Arc::new(ObjectRegistry::new());
        for name in ["Ann", "Bea", "Cal"] {
            reg.add(player(&alloc, name), None).unwrap();
        }

        let churn: Vec<_> = ["ann", "bea", "cal"]
            .into_iter()
            .enumerate()
            .map(|(c, name)| {
                let reg = Arc::clone(&reg);
                std::thread::spawn(move || {
                    let conn = ConnectionId(c as u64 + 1);
                    for _ in 0..500 {
                        reg.promote_to_active(name, conn).unwrap();
                        reg.demote_to_inactive(conn).unwrap();
                    }
                })
            })
            .collect();
        for _ in 0..2000 {
            assert_eq!(reg.category(Category::Player).len(), 3);
        }
        for h in churn {
            h.join().unwrap();
        }
        reg.check_coherence().unwrap();
    }
}
