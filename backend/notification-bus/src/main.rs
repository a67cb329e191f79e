mod cli;

use anyhow::Context;
use broadcast_channel::{BroadcastPublisher, BroadcastSubscriber};
use chrono::Utc;
use clap::Parser;
use cli::{Cli, Commands, SettingsCommands};
use notification_bus::config::{Config, StorageBackend};
use notification_bus::{
    metrics, relative_time, remote_unread_feed, FileStorage, MemoryStorage, Notification,
    NotificationBus, NotificationObserver, NotificationView, Notifier, RedisStorage,
    SettingsStore, Storage,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,notification_bus=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    metrics::init();
    let config = Config::from_env().context("Failed to load configuration")?;

    let storage = open_storage(&config).await?;
    let mut bus = NotificationBus::with_config(storage.clone(), config.bus.clone());

    if config.broadcast.enabled {
        match BroadcastPublisher::new(
            &config.broadcast.redis_url,
            &config.broadcast.channel,
            config.broadcast.origin.clone(),
        )
        .await
        {
            Ok(publisher) => {
                tracing::debug!(channel = %config.broadcast.channel, "Cross-process broadcast enabled");
                bus = bus.with_broadcaster(Arc::new(publisher));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Broadcast unavailable, continuing without it");
            }
        }
    }
    let bus = Arc::new(bus);

    match cli.command {
        Commands::Publish { message, kind } => {
            match Notifier::new(bus.clone()).notify(message, kind).await? {
                Some(n) => println!("published #{}", n.id),
                None => println!("notifications are disabled; nothing published"),
            }
        }
        Commands::List => {
            let now = Utc::now();
            for n in bus.list().await {
                print_notification(&n, now);
            }
        }
        Commands::Recent => {
            let snapshot = bus.hydrate().await;
            let now = Utc::now();
            println!("{} unread", snapshot.unread);
            for n in &snapshot.recent {
                print_notification(n, now);
            }
        }
        Commands::ReadAll => {
            let changed = bus.mark_all_read().await?;
            println!("marked {} read", changed);
        }
        Commands::Read { id } => {
            if bus.mark_one_read(id).await? {
                println!("marked #{} read", id);
            } else {
                println!("no notification #{}", id);
            }
        }
        Commands::Clear => {
            bus.clear_all().await?;
            println!("cleared");
        }
        Commands::Metrics => {
            metrics::set_unread(bus.hydrate().await.unread);
            print!("{}", metrics::gather_metrics()?);
        }
        Commands::Watch => watch(bus, &config).await?,
        Commands::Settings { command } => {
            let settings = SettingsStore::new(storage, config.bus.settings_key.clone());
            match command {
                SettingsCommands::Show => {
                    for (key, value) in settings.load().await.iter() {
                        println!("{:<22} {}", key.as_str(), value);
                    }
                }
                SettingsCommands::Toggle { key } => {
                    let updated = settings.toggle(key).await?;
                    println!("{} = {}", key, updated.get(key));
                }
            }
        }
    }

    Ok(())
}

async fn open_storage(config: &Config) -> anyhow::Result<Arc<dyn Storage>> {
    let storage: Arc<dyn Storage> = match config.storage.backend {
        StorageBackend::Memory => Arc::new(MemoryStorage::new()),
        StorageBackend::File => Arc::new(FileStorage::new(&config.storage.data_dir)),
        StorageBackend::Redis => Arc::new(
            RedisStorage::new(&config.storage.redis_url, config.storage.key_prefix.clone())
                .await
                .context("Failed to connect to Redis storage")?,
        ),
    };
    tracing::debug!(backend = ?config.storage.backend, "Storage opened");
    Ok(storage)
}

async fn watch(bus: Arc<NotificationBus>, config: &Config) -> anyhow::Result<()> {
    let mut remote_task = None;
    let mut remote = None;

    if config.broadcast.enabled {
        match BroadcastSubscriber::new(&config.broadcast.redis_url, &config.broadcast.channel).await
        {
            Ok(subscriber) => {
                let subscriber = subscriber.ignoring_origin(config.broadcast.origin.clone());
                let (rx, handle) = remote_unread_feed(&subscriber).await?;
                remote = Some(rx);
                remote_task = Some((subscriber, handle));
            }
            Err(e) => tracing::warn!(error = %e, "Not listening for other processes"),
        }
    }

    let observer = NotificationObserver::spawn(bus, remote).await;
    let mut views = observer.watch();
    print_view(&views.borrow_and_update());

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                print_view(&views.borrow_and_update());
            }
            _ = &mut ctrl_c => {
                tracing::info!("Shutting down watcher");
                break;
            }
        }
    }

    observer.shutdown().await;
    if let Some((subscriber, handle)) = remote_task {
        subscriber.unsubscribe(handle);
    }
    Ok(())
}

fn print_view(view: &NotificationView) {
    let now = Utc::now();
    let marker = if view.bumped { " (new)" } else { "" };
    let degraded = if view.degraded { " [not persisted]" } else { "" };
    println!("-- {} unread{}{}", view.unread, marker, degraded);
    for n in &view.recent {
        print_notification(n, now);
    }
}

fn print_notification(n: &Notification, now: chrono::DateTime<Utc>) {
    println!(
        "{} #{:<14} {:<8} {:>4}  {}",
        if n.read { " " } else { "*" },
        n.id,
        n.kind.as_str(),
        relative_time(&n.created_at, now),
        n.message
    );
}
