//! Account login and logout. Login owns the connection's input through a
//! private reader until the player is standing in the world.

use std::sync::Arc;

use persistence::BarrierError;
use player_db::{validate_username, Account, PlayerDb, PlayerDbError};
use registry::{ConnectionId, RegistryError};
use session::{InputRouter, PrivateInput, RouterError};

use crate::combat;
use crate::dispatcher::GameContext;
use crate::entity::{Describable, Entity, Movable, Player};
use crate::world::World;

pub const MAX_PASSWORD_ATTEMPTS: u32 = 3;

const GREETING: &str = "Welcome, traveller.";

#[derive(Debug, thiserror::Error)]
pub enum LoginError {
    #[error(transparent)]
    Input(#[from] RouterError),

    #[error(transparent)]
    Account(#[from] PlayerDbError),

    #[error("too many failed password attempts")]
    TooManyAttempts,

    #[error("'{0}' is already playing")]
    AlreadyPlaying(String),

    #[error(transparent)]
    Barrier(#[from] BarrierError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("account lookup did not finish: {0}")]
    Task(String),
}

impl LoginError {
    fn player_message(&self) -> String {
        match self {
            LoginError::TooManyAttempts => "Too many failed attempts. Goodbye.".to_string(),
            LoginError::AlreadyPlaying(name) => format!("{} is already playing.", name),
            LoginError::Input(RouterError::Timeout(_)) => "You took too long. Goodbye.".to_string(),
            LoginError::Barrier(_) => "The world is being saved. Please connect again shortly.".to_string(),
            _ => "Something went wrong while logging you in.".to_string(),
        }
    }
}

/// Entry point spawned for every new connection. Failures are reported to
/// the connection, which is then closed.
pub async fn run_login(ctx: Arc<GameContext>, conn: ConnectionId) {
    match login(&ctx, conn).await {
        Ok(player) => {
            tracing::info!(%conn, player = %player.id(), name = %player.name(), "player entered the world");
        }
        Err(LoginError::Input(RouterError::Closed(_) | RouterError::UnknownConnection(_))) => {
            tracing::debug!(%conn, "connection closed during login");
        }
        Err(e) => {
            tracing::warn!(%conn, "login failed: {}", e);
            let transport = ctx.world.transport();
            transport.set_echo(conn, true);
            transport.send(conn, &e.player_message());
            transport.disconnect(conn);
            ctx.router.close(conn);
        }
    }
}

/// Ask for credentials and put the player into the world.
pub async fn login(ctx: &GameContext, conn: ConnectionId) -> Result<Arc<Entity>, LoginError> {
    let input = ctx.router.redirect(conn)?;
    let transport = ctx.world.transport();
    transport.send(conn, GREETING);

    let username = ask_username(ctx, &input).await?;
    let lookup = username.clone();
    let exists = with_accounts(ctx, move |db| db.account_exists(&lookup)).await?;
    let account = if exists {
        authenticate(ctx, &input, &username).await?
    } else {
        register(ctx, &input, &username).await?
    };
    let name = account.username.clone();
    let admin = with_accounts(ctx, move |db| db.verify_admin(&name)).await?;

    let player = enter_world(&ctx.world, conn, &account.username, admin).await?;
    drop(input);
    Ok(player)
}

async fn ask_username(ctx: &GameContext, input: &PrivateInput) -> Result<String, LoginError> {
    let conn = input.conn();
    let timeout = ctx.world.settings().prompt_timeout;
    loop {
        ctx.world.transport().send(conn, "By what name are you known?");
        let name = input.next_line(timeout).await?.trim().to_string();
        match validate_username(&name) {
            Ok(()) => return Ok(name),
            Err(e) => {
                ctx.world.transport().send(conn, &e.to_string());
            }
        }
    }
}

async fn ask_password(ctx: &GameContext, input: &PrivateInput, prompt: &str) -> Result<String, LoginError> {
    let conn = input.conn();
    let transport = ctx.world.transport();
    transport.send(conn, prompt);
    transport.set_echo(conn, false);
    let line = input.next_line(ctx.world.settings().prompt_timeout).await;
    transport.set_echo(conn, true);
    Ok(line?.trim().to_string())
}

async fn authenticate(ctx: &GameContext, input: &PrivateInput, username: &str) -> Result<Account, LoginError> {
    for _ in 0..MAX_PASSWORD_ATTEMPTS {
        let password = ask_password(ctx, input, "Password:").await?;
        let name = username.to_string();
        match with_accounts(ctx, move |db| db.verify_account(&name, &password)).await {
            Ok(account) => return Ok(account),
            Err(LoginError::Account(PlayerDbError::InvalidPassword)) => {
                tracing::info!(conn = %input.conn(), username, "wrong password");
                ctx.world.transport().send(input.conn(), "Wrong password.");
            }
            Err(e) => return Err(e),
        }
    }
    Err(LoginError::TooManyAttempts)
}

async fn register(ctx: &GameContext, input: &PrivateInput, username: &str) -> Result<Account, LoginError> {
    let conn = input.conn();
    ctx.world
        .transport()
        .send(conn, &format!("{} is a new name here.", username));
    for _ in 0..MAX_PASSWORD_ATTEMPTS {
        let password = ask_password(ctx, input, "Choose a password:").await?;
        let again = ask_password(ctx, input, "Repeat the password:").await?;
        if password != again {
            ctx.world.transport().send(conn, "The passwords do not match.");
            continue;
        }
        let name = username.to_string();
        match with_accounts(ctx, move |db| db.create_account(&name, &password)).await {
            Ok(account) => return Ok(account),
            Err(LoginError::Account(e @ PlayerDbError::PasswordTooShort(_))) => {
                ctx.world.transport().send(conn, &e.to_string());
            }
            Err(e) => return Err(e),
        }
    }
    Err(LoginError::TooManyAttempts)
}

/// SQLite and argon2 both block, so account work runs off the async workers.
async fn with_accounts<R, F>(ctx: &GameContext, f: F) -> Result<R, LoginError>
where
    R: Send + 'static,
    F: FnOnce(&PlayerDb) -> Result<R, PlayerDbError> + Send + 'static,
{
    let db = Arc::clone(&ctx.accounts);
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| LoginError::Task(e.to_string()))?
        .map_err(LoginError::from)
}

/// Bind `conn` to the player named `username`, waking a hibernating player
/// or creating a new one in the start area.
pub async fn enter_world(
    world: &World,
    conn: ConnectionId,
    username: &str,
    admin: bool,
) -> Result<Arc<Entity>, LoginError> {
    let _permit = world.barrier().await_not_saving(world.settings().barrier_timeout).await?;
    let registry = world.registry();
    if registry.active_player_by_username(username).is_some() {
        return Err(LoginError::AlreadyPlaying(username.to_string()));
    }

    let player = match registry.promote_to_active(username, conn) {
        Ok(player) => player,
        Err(RegistryError::UnknownUsername(_)) => {
            let fresh = Arc::new(world.new_player(username));
            match registry.add(Arc::clone(&fresh), Some(conn)) {
                Ok(()) => {
                    tracing::info!(%conn, player = %fresh.id(), username, "new player created");
                    fresh
                }
                // Someone else logged in under this name a moment ago.
                Err(RegistryError::UsernameTaken(_)) => return Err(LoginError::AlreadyPlaying(username.to_string())),
                Err(e) => return Err(e.into()),
            }
        }
        Err(e) => return Err(e.into()),
    };

    if let Some(p) = player.as_player() {
        p.set_admin(admin);
    }
    {
        // Wait out a logout of this same player that is still tidying up.
        let _presence = player.as_player().map(Player::hold_presence);
        if player.combatant().is_some_and(|c| !c.is_alive()) {
            combat::respawn(world, &player);
        } else {
            let home = player
                .location()
                .filter(|&area| world.get(area).is_some_and(|e| e.as_area().is_some()))
                .unwrap_or_else(|| world.start_area());
            world.move_to(&player, home);
        }
    }

    if let Some(area) = player.location() {
        world.message_area_players(area, &format!("{} has arrived.", player.name()), &[player.id()]);
        if let Some(area) = world.get(area) {
            world.message_player(player.id(), &world.describe_area(&area, player.id()));
        }
    }
    Ok(player)
}

/// Put the player behind `conn` to sleep: out of its area and out of any
/// fight, with its queued commands forgotten. Safe to call for connections
/// that never logged in and to call twice.
pub async fn hibernate(world: &World, router: &InputRouter, conn: ConnectionId) -> Option<Arc<Entity>> {
    router.close(conn);

    let _permit = loop {
        match world.barrier().await_not_saving(world.settings().barrier_timeout).await {
            Ok(permit) => break permit,
            Err(e) => tracing::warn!(%conn, "logout still waiting: {}", e),
        }
    };

    let Some(bound) = world.registry().active_player(conn) else {
        return None;
    };
    // Commands for this player either finish before the demote or see it.
    let _presence = bound.as_player().map(Player::hold_presence);
    let player = match world.registry().demote_to_inactive(conn) {
        Ok(player) => player,
        Err(RegistryError::UnknownConnection(_)) => return None,
        Err(e) => {
            tracing::error!(%conn, "could not hibernate player: {}", e);
            return None;
        }
    };

    if let Some(c) = player.combatant() {
        c.clear_queue();
    }
    if let Some(partner) = world.break_engagement(&player) {
        world.message_player(partner, &format!("{} is gone.", player.name()));
    }
    // A fresh login may already have woken the player back up.
    if world.registry().is_active(player.id()) {
        tracing::debug!(%conn, player = %player.id(), "player logged back in during logout");
        return Some(player);
    }
    world.withdraw(&player);
    if let Some(area) = player.location() {
        world.message_area_players(area, &format!("{} fades away.", player.name()), &[player.id()]);
    }

    tracing::info!(%conn, player = %player.id(), "player hibernated");
    Some(player)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use registry::EntityId;

    use super::*;
    use crate::combatant::{engage, Combatant};
    use crate::dice::ScriptedDice;
    use crate::dispatcher::tests::context;
    use crate::world::tests::rat;

    const C1: ConnectionId = ConnectionId(1);
    const C2: ConnectionId = ConnectionId(2);

    async fn wait_for(transport: &crate::world::tests::RecordingTransport, conn: ConnectionId, needle: &str) {
        for _ in 0..500 {
            if transport.text_for(conn).contains(needle) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("never saw {:?} in {:?}", needle, transport.text_for(conn));
    }

    #[tokio::test]
    async fn first_login_creates_account_and_player() {
        let (ctx, transport) = context(ScriptedDice::constant(10));
        let square = ctx.world.add_area("Square", "Open.").unwrap();
        ctx.router.open(C1);

        let task = tokio::spawn(run_login(Arc::clone(&ctx), C1));
        wait_for(&transport, C1, "By what name").await;
        ctx.router.push(C1, "Hero");
        wait_for(&transport, C1, "Choose a password").await;
        ctx.router.push(C1, "secret1");
        wait_for(&transport, C1, "Repeat").await;
        ctx.router.push(C1, "secret1");
        task.await.unwrap();

        let (conn, hero) = ctx.world.registry().active_player_by_username("hero").unwrap();
        assert_eq!(conn, C1);
        assert_eq!(hero.location(), Some(square));
        // The first account on a fresh database administers the world.
        assert!(hero.as_player().unwrap().is_admin());
        assert!(transport.text_for(C1).contains("Square"));
        assert!(transport.echo.lock().contains(&(C1, false)));
        assert_eq!(transport.echo.lock().last(), Some(&(C1, true)));
        ctx.world.registry().check_coherence().unwrap();
    }

    #[tokio::test]
    async fn wrong_passwords_disconnect() {
        let (ctx, transport) = context(ScriptedDice::constant(10));
        ctx.world.add_area("Square", "").unwrap();
        ctx.accounts.create_account("Hero", "secret1").unwrap();
        ctx.router.open(C1);

        let task = tokio::spawn(run_login(Arc::clone(&ctx), C1));
        wait_for(&transport, C1, "By what name").await;
        ctx.router.push(C1, "hero");
        for _ in 0..MAX_PASSWORD_ATTEMPTS {
            ctx.router.push(C1, "nope");
        }
        task.await.unwrap();

        assert!(transport.text_for(C1).contains("Too many failed attempts"));
        assert_eq!(*transport.disconnected.lock(), vec![C1]);
        assert!(!ctx.router.is_open(C1));
        assert!(ctx.world.registry().active_players().is_empty());
    }

    #[tokio::test]
    async fn duplicate_login_is_refused() {
        let (ctx, _) = context(ScriptedDice::constant(10));
        ctx.world.add_area("Square", "").unwrap();
        enter_world(&ctx.world, C1, "Hero", false).await.unwrap();
        let err = enter_world(&ctx.world, C2, "hero", false).await.unwrap_err();
        assert!(matches!(err, LoginError::AlreadyPlaying(_)));
        assert_eq!(ctx.world.registry().active_players().len(), 1);
    }

    #[tokio::test]
    async fn hibernate_then_return() {
        let (ctx, transport) = context(ScriptedDice::constant(10));
        let square = ctx.world.add_area("Square", "").unwrap();
        let alley = ctx.world.add_area("Alley", "").unwrap();
        let rat_id = ctx.world.add_creature(rat(), alley).unwrap();
        ctx.router.open(C1);

        let hero = enter_world(&ctx.world, C1, "Hero", false).await.unwrap();
        assert_eq!(hero.location(), Some(square));
        ctx.world.move_to(&hero, alley);
        let rat = ctx.world.get(rat_id).unwrap();
        engage((hero.id(), hero.combatant().unwrap()), (rat_id, rat.combatant().unwrap())).unwrap();

        let slept = hibernate(&ctx.world, &ctx.router, C1).await.unwrap();
        assert_eq!(slept.id(), hero.id());
        assert!(!ctx.router.is_open(C1));
        assert_eq!(rat.combatant().unwrap().engaged_with(), None);
        assert_eq!(hero.combatant().unwrap().engaged_with(), None);
        assert!(!ctx.world.get(alley).unwrap().as_area().unwrap().is_present(hero.id()));
        assert!(ctx.world.registry().inactive_player("HERO").is_some());
        ctx.world.registry().check_coherence().unwrap();

        // Second call is a no-op.
        assert!(hibernate(&ctx.world, &ctx.router, C1).await.is_none());

        let back = enter_world(&ctx.world, C2, "Hero", false).await.unwrap();
        assert_eq!(back.id(), hero.id());
        assert_eq!(back.location(), Some(alley));
        assert!(ctx.world.get(alley).unwrap().as_area().unwrap().is_present(hero.id()));
        assert!(transport.text_for(C2).contains("Alley"));
        assert_ne!(ctx.world.registry().connection_of(hero.id()), Some(C1));
    }

    #[tokio::test]
    async fn dead_players_come_back_restored() {
        let (ctx, _) = context(ScriptedDice::constant(10));
        let square = ctx.world.add_area("Square", "").unwrap();
        let alley = ctx.world.add_area("Alley", "").unwrap();
        let hero = enter_world(&ctx.world, C1, "Hero", false).await.unwrap();
        ctx.world.move_to(&hero, alley);
        let c = hero.combatant().unwrap();
        c.apply_damage(1000);
        c.arm_respawn(500);
        hibernate(&ctx.world, &ctx.router, C1).await;

        let back = enter_world(&ctx.world, C2, "Hero", false).await.unwrap();
        assert!(back.combatant().is_some_and(Combatant::is_alive));
        assert_eq!(back.location(), Some(square));
        assert_ne!(back.id(), EntityId::INVALID);
    }
}
