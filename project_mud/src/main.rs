mod config;
mod shutdown;

use std::sync::Arc;
use std::time::Duration;

use engine_core::TickLoop;
use mud::entity::Entity;
use mud::{
    build_seed_world, login, CombatEngine, Dice, Dispatcher, GameContext, KeywordParser, RandomDice, World,
};
use net::{ChannelTransport, NetChannels, NetEvent};
use persistence::SnapshotManager;
use player_db::PlayerDb;
use session::{InputRouter, Transport};
use tokio::net::TcpListener;

use crate::config::{parse_cli_args, ServerConfig};
use crate::shutdown::{shutdown_channel, ShutdownRx};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[tokio::main]
async fn main() {
    observability::init_logging();

    let config = parse_cli_args();
    tracing::info!("MUD Server starting...");

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut server = tokio::spawn(run_mud_server(config, shutdown_rx));

    let result = tokio::select! {
        _ = shutdown::wait_for_signal() => {
            tracing::info!("Shutdown signal received, stopping server...");
            shutdown_tx.trigger();
            server.await
        }
        result = &mut server => result,
    };

    match result {
        Ok(Ok(())) => tracing::info!("Server stopped."),
        Ok(Err(e)) => {
            tracing::error!("Server failed: {}", e);
            std::process::exit(1);
        }
        Err(e) => {
            tracing::error!("Server task panicked: {}", e);
            std::process::exit(1);
        }
    }
}

/// Restore the last snapshot or, on a fresh install, build the seed world.
fn load_world(config: &ServerConfig, transport: Arc<dyn Transport>) -> Result<World, BoxError> {
    let dice: Arc<dyn Dice> = match config.world.seed {
        Some(seed) => Arc::new(RandomDice::seeded(seed)),
        None => Arc::new(RandomDice::from_os_rng()),
    };
    let settings = config.to_world_settings();
    let snapshots = SnapshotManager::new(&config.persistence.save_dir).with_retention(config.persistence.keep);

    if snapshots.has_latest() {
        // A snapshot that will not load is an error, not a reason to start
        // over and overwrite it on the next save.
        let snapshot = snapshots.load_latest::<Entity>()?;
        let world = World::restore(snapshot, transport, dice, settings)?;
        tracing::info!(tick = world.tick(), "Restored from snapshot");
        return Ok(world.with_snapshots(snapshots));
    }

    let world = World::new(transport, dice, settings).with_snapshots(snapshots);
    build_seed_world(&world)?;
    Ok(world)
}

async fn run_mud_server(config: ServerConfig, shutdown_rx: ShutdownRx) -> Result<(), BoxError> {
    let accounts = Arc::new(PlayerDb::open(&config.database.path)?);

    let NetChannels {
        event_tx,
        mut event_rx,
        output_tx,
        output_rx,
        register_tx,
        register_rx,
        unregister_tx,
        unregister_rx,
    } = NetChannels::new();
    tokio::spawn(net::run_output_router(output_rx, register_rx, unregister_rx));
    let transport = Arc::new(ChannelTransport::new(output_tx));

    let world = Arc::new(load_world(&config, transport)?);
    let ctx = Arc::new(GameContext {
        world: Arc::clone(&world),
        router: Arc::new(InputRouter::new()),
        parser: Arc::new(KeywordParser),
        accounts,
    });

    let listener = TcpListener::bind(&config.net.telnet_addr).await?;
    let tcp_server = tokio::spawn(async move {
        if let Err(e) = net::run_tcp_server(listener, event_tx, register_tx, unregister_tx).await {
            tracing::error!("TCP server error: {}", e);
        }
    });

    let dispatcher = Dispatcher::new(Arc::clone(&ctx), config.to_dispatch_config());
    let dispatch_task = tokio::spawn(dispatcher.run(shutdown_rx.clone().into_inner()));

    let tick_thread = {
        let world = Arc::clone(&world);
        let tick_config = config.to_tick_config();
        let tick_shutdown = shutdown_rx.clone();
        std::thread::spawn(move || {
            let start = world.tick();
            let mut tick_loop = TickLoop::new(tick_config, CombatEngine::new(world));
            tick_loop.current_tick = start;
            tick_loop.run_until(|| tick_shutdown.is_shutdown());
        })
    };

    if let Some(interval) = config.autosave_interval() {
        tokio::spawn(autosave(Arc::clone(&world), interval, shutdown_rx.clone()));
    }

    let mut shutdown = shutdown_rx;
    loop {
        tokio::select! {
            event = event_rx.recv() => match event {
                Some(NetEvent::Connected { conn }) => {
                    ctx.router.open(conn);
                    tokio::spawn(login::run_login(Arc::clone(&ctx), conn));
                }
                Some(NetEvent::Input { conn, line }) => {
                    ctx.router.push(conn, line);
                }
                Some(NetEvent::Disconnected { conn }) => {
                    let ctx = Arc::clone(&ctx);
                    tokio::spawn(async move {
                        login::hibernate(&ctx.world, &ctx.router, conn).await;
                    });
                }
                None => break,
            },
            _ = shutdown.wait() => break,
        }
    }

    tcp_server.abort();
    if let Err(e) = dispatch_task.await {
        tracing::error!("dispatcher task failed: {}", e);
    }
    match tokio::task::spawn_blocking(move || tick_thread.join()).await {
        Ok(Ok(())) => tracing::info!("Tick thread stopped"),
        _ => tracing::error!("Tick thread did not stop cleanly"),
    }

    world.message_all_players("The world is shutting down. Goodbye!", &[]);
    for (conn, _) in world.registry().active_players() {
        world.transport().disconnect(conn);
    }

    match tokio::time::timeout(config.save_timeout(), world.save()).await {
        Ok(Ok(Some(path))) => tracing::info!(tick = world.tick(), path = %path.display(), "Final snapshot saved"),
        Ok(Ok(None)) => {}
        Ok(Err(e)) => tracing::error!("Failed to save final snapshot: {}", e),
        Err(_) => tracing::error!("Final snapshot timed out"),
    }
    Ok(())
}

async fn autosave(world: Arc<World>, every: Duration, mut shutdown: ShutdownRx) {
    let mut interval = tokio::time::interval(every);
    interval.tick().await;
    loop {
        tokio::select! {
            _ = interval.tick() => {
                if let Err(e) = world.save().await {
                    tracing::error!("Autosave failed: {}", e);
                }
            }
            _ = shutdown.wait() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use registry::Category;

    struct NullTransport;

    impl Transport for NullTransport {
        fn send(&self, _: session::ConnectionId, _: &str) -> bool {
            true
        }
        fn disconnect(&self, _: session::ConnectionId) {}
        fn set_echo(&self, _: session::ConnectionId, _: bool) {}
    }

    fn config_in(dir: &std::path::Path) -> ServerConfig {
        let mut config = ServerConfig::default();
        config.persistence.save_dir = dir.join("snapshots").display().to_string();
        config.world.seed = Some(7);
        config
    }

    #[test]
    fn fresh_install_builds_the_seed_world() {
        let dir = tempfile::tempdir().unwrap();
        let world = load_world(&config_in(dir.path()), Arc::new(NullTransport)).unwrap();
        assert_eq!(world.registry().category(Category::Area).len(), 4);
        assert!(world.snapshots().is_some());
    }

    #[tokio::test]
    async fn saved_world_is_restored_on_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        {
            let world = load_world(&config, Arc::new(NullTransport)).unwrap();
            world.set_tick(1234);
            world.save().await.unwrap();
        }
        let world = load_world(&config, Arc::new(NullTransport)).unwrap();
        assert_eq!(world.tick(), 1234);
        assert_eq!(world.registry().category(Category::Creature).len(), 3);
    }

    #[test]
    fn unreadable_snapshot_refuses_to_start() {
        let dir = tempfile::tempdir().unwrap();
        let config = config_in(dir.path());
        std::fs::create_dir_all(&config.persistence.save_dir).unwrap();
        std::fs::write(std::path::Path::new(&config.persistence.save_dir).join("latest.bin"), b"junk").unwrap();
        assert!(load_world(&config, Arc::new(NullTransport)).is_err());
    }
}
