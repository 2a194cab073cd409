use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use persistence::{PersistenceError, SnapshotManager, WorldSnapshot};
use registry::{Category, IdAllocator, ObjectRegistry};
use session::Transport;

use crate::dice::Dice;
use crate::entity::Entity;
use crate::world::{World, WorldSettings};

impl World {
    /// Write every registered entity to disk. The caller must hold the save
    /// barrier so nothing changes underneath.
    pub fn write_snapshot(&self, manager: &SnapshotManager) -> Result<PathBuf, PersistenceError> {
        let entities = self.registry().all();
        let snapshot = WorldSnapshot::new(
            self.tick(),
            self.ids().peek(),
            self.start_area(),
            entities.iter().map(Arc::as_ref).collect::<Vec<&Entity>>(),
        );
        manager.save_to_disk(&snapshot)
    }

    /// Raise the save barrier, wait for in-flight commands to finish, and
    /// snapshot. `Ok(None)` when persistence is not configured.
    pub async fn save(&self) -> Result<Option<PathBuf>, PersistenceError> {
        let Some(manager) = self.snapshots() else {
            return Ok(None);
        };
        let _guard = self.barrier().begin_save().await;
        let started = Instant::now();
        let path = self.write_snapshot(manager)?;
        tracing::info!(
            tick = self.tick(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "world saved"
        );
        Ok(Some(path))
    }

    /// Rebuild a world from a snapshot. Every player comes back hibernating
    /// and out of the areas; they re-enter on login.
    pub fn restore(
        snapshot: WorldSnapshot<Entity>,
        transport: Arc<dyn Transport>,
        dice: Arc<dyn Dice>,
        settings: WorldSettings,
    ) -> Result<World, PersistenceError> {
        snapshot.check_version()?;

        let registry = ObjectRegistry::new();
        let ids = IdAllocator::starting_at(snapshot.next_id);
        let mut players = Vec::new();
        for entity in snapshot.entities {
            ids.observe(entity.id());
            if entity.is_player() {
                players.push(entity.id());
            }
            registry
                .add(Arc::new(entity), None)
                .map_err(|e| PersistenceError::Corrupt(e.to_string()))?;
        }

        for area in registry.category(Category::Area) {
            if let Some(a) = area.as_area() {
                a.retain_occupants(|id| !players.contains(&id));
            }
        }

        let world = World::with_parts(registry, ids, transport, dice, settings);
        world.set_start_area(snapshot.start_area);
        world.set_tick(snapshot.tick);
        if world.get(snapshot.start_area).and_then(|e| e.as_area().map(|_| ())).is_none() {
            return Err(PersistenceError::Corrupt(format!(
                "start area {} is not an area",
                snapshot.start_area
            )));
        }

        tracing::info!(
            entities = world.registry().len(),
            players = players.len(),
            tick = snapshot.tick,
            next_id = world.ids().peek(),
            "world restored"
        );
        Ok(world)
    }
}

#[cfg(test)]
mod tests {
    use registry::{ConnectionId, EntityId};

    use super::*;
    use crate::combatant::{engage, CreatureState};
    use crate::dice::{DiceSpec, ScriptedDice};
    use crate::entity::{Describable, ItemKind, Movable};
    use crate::world::tests::{rat, RecordingTransport};

    fn fresh(dir: &std::path::Path) -> World {
        World::new(
            Arc::new(RecordingTransport::default()),
            Arc::new(ScriptedDice::constant(10)),
            WorldSettings::default(),
        )
        .with_snapshots(SnapshotManager::new(dir))
    }

    #[tokio::test]
    async fn save_and_restore_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let world = fresh(dir.path());
        let square = world.add_area("Square", "Open.").unwrap();
        let alley = world.add_area("Alley", "Narrow.").unwrap();
        world.link(square, "east", alley);
        let rat = world.add_creature(rat(), square).unwrap();
        let sword = world
            .add_item("a sword", &["sword"], "", ItemKind::Weapon { damage: DiceSpec::new(1, 6, 0) }, rat)
            .unwrap();

        let hero = Arc::new(world.new_player("Hero"));
        let hero_id = hero.id();
        world.registry().add(hero.clone(), Some(ConnectionId(1))).unwrap();
        world.move_to(&hero, alley);
        hero.as_player().unwrap().award_experience(42);
        let rat_e = world.get(rat).unwrap();
        engage((hero_id, hero.combatant().unwrap()), (rat, rat_e.combatant().unwrap())).unwrap();
        rat_e.combatant().unwrap().apply_damage(2);
        world.set_tick(77);

        let path = world.save().await.unwrap().unwrap();
        assert!(path.exists());

        let manager = SnapshotManager::new(dir.path());
        let snapshot = manager.load_latest::<Entity>().unwrap();
        let restored = World::restore(
            snapshot,
            Arc::new(RecordingTransport::default()),
            Arc::new(ScriptedDice::constant(10)),
            WorldSettings::default(),
        )
        .unwrap();

        assert_eq!(restored.tick(), 77);
        assert_eq!(restored.start_area(), square);
        assert_eq!(restored.registry().len(), world.registry().len());
        restored.registry().check_coherence().unwrap();

        // Players come back hibernating, out of their area but remembering it.
        assert!(restored.registry().active_players().is_empty());
        let hero = restored.registry().inactive_player("hero").unwrap();
        assert_eq!(hero.location(), Some(alley));
        assert!(!restored.get(alley).unwrap().as_area().unwrap().is_present(hero_id));
        assert_eq!(hero.as_player().unwrap().experience(), 42);

        // Fights are not persisted, wounds are.
        let rat_e = restored.get(rat).unwrap();
        let c = rat_e.combatant().unwrap();
        assert_eq!(c.engaged_with(), None);
        assert_eq!(c.snapshot().health, 4);
        assert_eq!(c.state(), CreatureState::Idle);
        assert!(rat_e.inventory().unwrap().contains(sword));
        assert_eq!(rat_e.name(), "a giant rat");
        assert!(restored.get(square).unwrap().as_area().unwrap().find_exit("e").is_some());

        // New ids never collide with restored ones.
        let next = restored.ids().allocate();
        assert!(next > hero_id && next > sword);
        assert_ne!(next, EntityId::INVALID);
    }

    #[tokio::test]
    async fn save_without_manager_is_a_no_op() {
        let world = World::new(
            Arc::new(RecordingTransport::default()),
            Arc::new(ScriptedDice::constant(10)),
            WorldSettings::default(),
        );
        world.add_area("Square", "").unwrap();
        assert!(world.save().await.unwrap().is_none());
        assert!(!world.barrier().is_saving());
    }

    #[test]
    fn restore_rejects_missing_start_area() {
        let snapshot: WorldSnapshot<Entity> = WorldSnapshot::new(1, 5, EntityId(3), Vec::new());
        let err = World::restore(
            snapshot,
            Arc::new(RecordingTransport::default()),
            Arc::new(ScriptedDice::constant(10)),
            WorldSettings::default(),
        )
        .unwrap_err();
        assert!(matches!(err, PersistenceError::Corrupt(_)));
    }
}
