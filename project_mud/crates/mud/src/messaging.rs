//! Push text to players. Connections are resolved through the active-player
//! view at send time, so hibernated players are skipped silently.

use registry::EntityId;

use crate::entity::Entity;
use crate::world::World;

impl World {
    /// Returns false if the player is not connected.
    pub fn message_player(&self, player: EntityId, text: &str) -> bool {
        match self.registry().connection_of(player) {
            Some(conn) => self.transport().send(conn, text),
            None => false,
        }
    }

    /// Every connected player in `area` except those in `except`.
    pub fn message_area_players(&self, area: EntityId, text: &str, except: &[EntityId]) -> usize {
        let Some(occupants) = self.get(area).as_deref().and_then(Entity::as_area).map(|a| a.occupants()) else {
            return 0;
        };
        occupants
            .into_iter()
            .filter(|id| !except.contains(id))
            .filter(|&id| self.message_player(id, text))
            .count()
    }

    pub fn message_all_players(&self, text: &str, except: &[EntityId]) -> usize {
        let mut sent = 0;
        for (conn, player) in self.registry().active_players() {
            if except.contains(&player.id()) {
                continue;
            }
            if self.transport().send(conn, text) {
                sent += 1;
            }
        }
        sent
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use registry::ConnectionId;

    use crate::dice::ScriptedDice;
    use crate::world::tests::{rat, test_world};

    #[test]
    fn messages_reach_only_connected_players() {
        let (world, transport) = test_world(ScriptedDice::constant(10));
        let square = world.add_area("Square", "").unwrap();
        let rat = world.add_creature(rat(), square).unwrap();

        let alice = Arc::new(world.new_player("Alice"));
        let bob = Arc::new(world.new_player("Bob"));
        let carol = Arc::new(world.new_player("Carol"));
        let (a, b, c) = (alice.id(), bob.id(), carol.id());
        world.registry().add(alice, Some(ConnectionId(1))).unwrap();
        world.registry().add(bob, Some(ConnectionId(2))).unwrap();
        world.registry().add(carol, None).unwrap();
        let area = world.get(square).unwrap();
        for id in [a, b, c] {
            area.as_area().unwrap().enter(id);
        }

        assert!(world.message_player(a, "hi"));
        assert!(!world.message_player(c, "hi"));
        assert!(!world.message_player(rat, "hi"));

        assert_eq!(world.message_area_players(square, "boom", &[b]), 1);
        assert_eq!(world.message_all_players("news", &[]), 2);

        assert_eq!(transport.text_for(ConnectionId(1)), "hi\nboom\nnews");
        assert_eq!(transport.text_for(ConnectionId(2)), "news");
    }
}
