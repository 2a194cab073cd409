pub mod combat;
pub mod combatant;
pub mod commands;
pub mod dice;
pub mod dispatcher;
pub mod entity;
pub mod login;
pub mod messaging;
pub mod parser;
pub mod persistence_setup;
pub mod seed;
pub mod tick;
pub mod world;

pub use commands::{CommandError, CommandRecord, Outcome};
pub use dice::{Dice, DiceSpec, RandomDice, ScriptedDice};
pub use dispatcher::{DispatchConfig, Dispatcher, GameContext};
pub use entity::{Entity, EntityBody};
pub use parser::{CommandParser, KeywordParser};
pub use seed::build_seed_world;
pub use tick::{run_tick, CombatEngine};
pub use world::{CreatureSpec, World, WorldSettings};
