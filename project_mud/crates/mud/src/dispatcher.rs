//! Drains the shared input queue and runs each command as its own task.

use std::sync::Arc;
use std::time::Duration;

use player_db::PlayerDb;
use registry::ConnectionId;
use session::{InputRouter, RouterError};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use crate::commands::{self, CommandRecord, Outcome};
use crate::entity::{Describable, Entity, Player};
use crate::login;
use crate::parser::{CommandParser, ParseResult};
use crate::world::World;

/// Bounds on the dispatcher's concurrent work.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Commands allowed to run at once.
    pub max_workers: usize,
    /// Lines taken from the shared queue per pass.
    pub batch_size: usize,
    /// How long shutdown waits for running commands.
    pub drain_timeout: Duration,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_workers: 64,
            batch_size: 32,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

/// Everything a command or login task needs.
pub struct GameContext {
    pub world: Arc<World>,
    pub router: Arc<InputRouter>,
    pub parser: Arc<dyn CommandParser>,
    pub accounts: Arc<PlayerDb>,
}

impl std::fmt::Debug for GameContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GameContext").field("world", &self.world).finish_non_exhaustive()
    }
}

pub struct Dispatcher {
    ctx: Arc<GameContext>,
    config: DispatchConfig,
    workers: Arc<Semaphore>,
    tasks: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(ctx: Arc<GameContext>, config: DispatchConfig) -> Self {
        let workers = Arc::new(Semaphore::new(config.max_workers.max(1)));
        Self {
            ctx,
            config,
            workers,
            tasks: JoinSet::new(),
        }
    }

    /// Commands currently running or waiting for a prompt reply.
    pub fn in_flight(&self) -> usize {
        self.tasks.len()
    }

    /// Pop up to `n` lines and start a task for each. Waits for a free
    /// worker when all of them are busy. Returns how many lines were taken.
    pub async fn process_pending(&mut self, n: usize) -> usize {
        self.reap();
        let batch = self.ctx.router.pop_shared(n);
        let taken = batch.len();
        for line in batch {
            let permit = match Arc::clone(&self.workers).acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    tracing::warn!(conn = %line.conn, "worker pool closed, input dropped");
                    continue;
                }
            };
            let ctx = Arc::clone(&self.ctx);
            self.tasks.spawn(async move {
                let _permit = permit;
                handle_line(&ctx, line.conn, &line.text).await;
            });
        }
        taken
    }

    fn reap(&mut self) {
        while let Some(done) = self.tasks.try_join_next() {
            if let Err(e) = done {
                if e.is_panic() {
                    tracing::error!("command task panicked: {}", e);
                }
            }
        }
    }

    /// Dispatch until `shutdown` flips to true, then drain.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(max_workers = self.config.max_workers, "dispatcher started");
        loop {
            if *shutdown.borrow() {
                break;
            }
            if self.process_pending(self.config.batch_size).await > 0 {
                continue;
            }
            tokio::select! {
                _ = self.ctx.router.wait_for_input() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        self.drain().await;
    }

    /// Let running commands finish, up to the drain timeout, then abort
    /// whatever is left.
    pub async fn drain(mut self) {
        let pending = self.tasks.len();
        let timeout = self.config.drain_timeout;
        let finished = tokio::time::timeout(timeout, async {
            while self.tasks.join_next().await.is_some() {}
        })
        .await;
        if finished.is_err() {
            tracing::warn!(left = self.tasks.len(), "aborting commands still running at shutdown");
            self.tasks.shutdown().await;
        }
        self.workers.close();
        tracing::info!(pending, "dispatcher stopped");
    }
}

/// Parse one line from `conn` and act on it.
pub async fn handle_line(ctx: &GameContext, conn: ConnectionId, text: &str) {
    let Some(player) = ctx.world.registry().active_player(conn) else {
        tracing::debug!(%conn, "input from a connection with no player");
        return;
    };

    let results = parse_for(ctx, &player, text);
    let mut valid: Vec<CommandRecord> = results.iter().filter_map(CommandRecord::from_parse).collect();
    match (results.len(), valid.len()) {
        (0, _) => {
            tracing::debug!(%conn, player = %player.id(), "nothing to do");
        }
        (_, 0) => {
            reply(&ctx.world, conn, &player, &results[0].rejection_message());
        }
        (_, 1) => {
            if let Some(record) = valid.pop() {
                run_command(ctx, conn, &player, record).await;
            }
        }
        _ => {
            if let Some(record) = disambiguate(ctx, conn, valid).await {
                run_command(ctx, conn, &player, record).await;
            }
        }
    }
}

fn parse_for(ctx: &GameContext, player: &Entity, text: &str) -> Vec<ParseResult> {
    let world = &ctx.world;
    let (admin, edit_mode) = player
        .as_player()
        .map(|p: &Player| (p.is_admin(), p.edit_mode()))
        .unwrap_or_default();
    let player_lexicon = world.player_lexicon(player);
    let area_lexicon = world
        .area_of(player)
        .map(|area| world.area_lexicon(&area, player.id()))
        .unwrap_or_default();
    ctx.parser.parse(text, &player_lexicon, &area_lexicon, admin, edit_mode)
}

/// List the candidates and read the player's pick from their private input.
async fn disambiguate(ctx: &GameContext, conn: ConnectionId, choices: Vec<CommandRecord>) -> Option<CommandRecord> {
    let transport = ctx.world.transport();
    let input = match ctx.router.redirect(conn) {
        Ok(input) => input,
        Err(e) => {
            tracing::debug!(%conn, "cannot ask which one: {}", e);
            return None;
        }
    };

    let mut prompt = String::from("Which one do you mean?");
    for (i, choice) in choices.iter().enumerate() {
        let name = choice
            .direct
            .and_then(|id| ctx.world.get(id))
            .map(|e| e.name())
            .unwrap_or_else(|| "something".to_string());
        prompt.push_str(&format!("\n  {}. {}", i + 1, name));
    }
    transport.send(conn, &prompt);

    match input.next_line(ctx.world.settings().prompt_timeout).await {
        Ok(reply) => match reply.trim().parse::<usize>() {
            Ok(n) if (1..=choices.len()).contains(&n) => choices.into_iter().nth(n - 1),
            _ => {
                transport.send(conn, "Never mind.");
                None
            }
        },
        Err(RouterError::Timeout(_)) => {
            transport.send(conn, "You took too long to decide.");
            None
        }
        Err(e) => {
            tracing::debug!(%conn, "choice abandoned: {}", e);
            None
        }
    }
}

/// Run one resolved command under a mutation permit, then deal with
/// whatever has to happen once the world is released.
pub async fn run_command(ctx: &GameContext, conn: ConnectionId, player: &Arc<Entity>, record: CommandRecord) {
    let world = &ctx.world;
    let verb = record.verb;
    let result = match world.barrier().await_not_saving(world.settings().barrier_timeout).await {
        Ok(permit) => {
            // The player may have logged out while we waited.
            if world.registry().connection_of(player.id()) != Some(conn) {
                tracing::debug!(%conn, player = %player.id(), %verb, "player gone before command ran");
                return;
            }
            let result = commands::submit(world, player, record);
            drop(permit);
            result
        }
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(Outcome::Done | Outcome::Queued) => {}
        Ok(Outcome::Quit) => {
            world.transport().send(conn, "Goodbye.");
            login::hibernate(world, &ctx.router, conn).await;
            world.transport().disconnect(conn);
        }
        Ok(Outcome::SaveRequested) => {
            let text = match world.save().await {
                Ok(Some(path)) => {
                    tracing::info!(player = %player.id(), path = %path.display(), "save requested by admin");
                    "The world has been saved.".to_string()
                }
                Ok(None) => "Saving is not enabled.".to_string(),
                Err(e) => {
                    tracing::error!("admin save failed: {}", e);
                    format!("The save failed: {}", e)
                }
            };
            reply(world, conn, player, &text);
        }
        Err(e) => {
            if e.is_structural() {
                tracing::error!(player = %player.id(), %verb, "command hit a registry inconsistency: {}", e);
            } else {
                tracing::debug!(player = %player.id(), %verb, "command refused: {}", e);
            }
            reply(world, conn, player, &e.player_message());
        }
    }
}

/// Answer on `conn` only while it still belongs to `player`; a line that
/// raced a logout gets no reply.
fn reply(world: &World, conn: ConnectionId, player: &Entity, text: &str) -> bool {
    if world.registry().connection_of(player.id()) != Some(conn) {
        tracing::debug!(%conn, player = %player.id(), "reply dropped, connection no longer bound");
        return false;
    }
    world.transport().send(conn, text)
}
