//! Lifecycle wiring: load the dataset, hang the watchers off the
//! heartbeat, service inbound events and command invocations, and flush
//! once more on the way out.

use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::activity::ActivityObserver;
use crate::channels::LogMessenger;
use crate::commands::{Command, CommandCtx, Engine};
use crate::config::AppConfig;
use crate::heartbeat::Heartbeat;
use crate::persist::Persister;
use crate::scheduler::ReminderSweep;
use crate::store::Store;
use crate::traits::{ChatEvent, Messenger};
use crate::watchers::{CurfewWatcher, IdleWatcher, StatusRotator};

/// One typed command arriving from the platform glue.
pub struct CommandInvocation {
    pub ctx: CommandCtx,
    pub command: Command,
}

/// Run with the built-in logging transport and no inbound streams. The
/// senders stay alive for the life of the call so the service loops idle
/// instead of shutting down.
pub async fn run_standalone(config: AppConfig) -> anyhow::Result<()> {
    let messenger: Arc<dyn Messenger> = Arc::new(LogMessenger);
    let (_event_tx, event_rx) = mpsc::channel(64);
    let (_command_tx, command_rx) = mpsc::channel(64);
    run(config, messenger, event_rx, command_rx).await
}

pub async fn run(
    config: AppConfig,
    messenger: Arc<dyn Messenger>,
    mut events: mpsc::Receiver<ChatEvent>,
    mut commands: mpsc::Receiver<CommandInvocation>,
) -> anyhow::Result<()> {
    let store = Arc::new(Store::load_or_default(&config.state.data_path));
    info!(
        guilds = store.guild_ids().len(),
        "state store initialized ({})", config.state.data_path
    );
    let persister =
        Persister::new(Arc::clone(&store), Duration::from_millis(config.state.save_debounce_ms));

    let engine = Arc::new(Engine::new(
        Arc::clone(&store),
        Arc::clone(&persister),
        Arc::clone(&messenger),
        config.roles.clone(),
    ));
    let observer = Arc::new(ActivityObserver::new(
        Arc::clone(&store),
        Arc::clone(&persister),
        Arc::clone(&messenger),
        chrono::Duration::minutes(config.scheduler.calm_cooldown_mins as i64),
    ));

    // Inbound message activity.
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            observer.observe(&event).await;
        }
        info!("inbound event stream closed");
    });

    // Command invocations: touch activity, dispatch, reply in-channel.
    {
        let engine = Arc::clone(&engine);
        let messenger = Arc::clone(&messenger);
        tokio::spawn(async move {
            while let Some(CommandInvocation { ctx, command }) = commands.recv().await {
                engine.touch_activity(&ctx);
                let reply = match engine.dispatch(&ctx, command).await {
                    Ok(reply) => reply,
                    Err(e) => {
                        info!(
                            guild = %ctx.guild_id,
                            user = %ctx.user_id,
                            kind = ?e.kind,
                            "command rejected: {e}"
                        );
                        e.to_string()
                    }
                };
                if let Err(e) = messenger.send_message(&ctx.channel_id, &reply).await {
                    warn!(channel = %ctx.channel_id, "reply delivery failed: {e:#}");
                }
            }
            info!("command stream closed");
        });
    }

    let mut heartbeat = Heartbeat::new(
        Duration::from_secs(config.scheduler.tick_interval_secs),
        config.scheduler.max_concurrent_jobs,
    );

    let sweep = Arc::new(ReminderSweep::new(
        Arc::clone(&store),
        Arc::clone(&persister),
        Arc::clone(&messenger),
    ));
    heartbeat.register_job(
        "reminder-sweep",
        Duration::from_secs(config.scheduler.reminder_sweep_secs),
        move || {
            let sweep = Arc::clone(&sweep);
            async move { sweep.run_once(Local::now()).await }
        },
    );

    let idle = Arc::new(IdleWatcher::new(
        Arc::clone(&store),
        Arc::clone(&persister),
        Arc::clone(&messenger),
        chrono::Duration::minutes(config.scheduler.quiet_after_mins as i64),
        chrono::Duration::minutes(config.scheduler.nudge_cooldown_mins as i64),
    ));
    heartbeat.register_job(
        "idle-watch",
        Duration::from_secs(config.scheduler.idle_check_secs),
        move || {
            let idle = Arc::clone(&idle);
            async move { idle.run_once(Local::now()).await }
        },
    );

    let curfew = Arc::new(CurfewWatcher::new(
        Arc::clone(&store),
        Arc::clone(&persister),
        Arc::clone(&messenger),
        config.roles.kids.clone(),
    ));
    heartbeat.register_job(
        "curfew-watch",
        Duration::from_secs(config.scheduler.curfew_check_secs),
        move || {
            let curfew = Arc::clone(&curfew);
            async move { curfew.run_once(Local::now()).await }
        },
    );

    let status_interval_minutes = store.with_data(|d| d.global.status_interval_minutes).max(1);
    let rotator = Arc::new(StatusRotator::new(Arc::clone(&store), Arc::clone(&messenger)));
    heartbeat.register_job(
        "status-rotation",
        Duration::from_secs(status_interval_minutes * 60),
        move || {
            let rotator = Arc::clone(&rotator);
            async move { rotator.run_once().await }
        },
    );

    heartbeat.start();
    info!("steward is serving; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!(flushes = store.flush_count(), "shutting down, flushing dataset");
    store.flush()?;
    Ok(())
}
