use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use santa_rooms::cache::RoomCache;
use santa_rooms::config::{Cli, Command, Config};
use santa_rooms::realtime::RealtimeChannel;
use santa_rooms::reconcile::{watch_group, WatchOutcome};
use santa_rooms::{gateway, logging, rlog};

const CLOSE_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() {
    logging::init();
    let config = Config::from_cli_and_env(Cli::parse());
    if let Err(error) = run(config).await {
        eprintln!("error: {error}");
        std::process::exit(1);
    }
}

async fn run(config: Config) -> Result<(), Box<dyn Error>> {
    let cache = Arc::new(RoomCache::open(&config.data_dir)?);

    match config.command {
        Command::Rooms { json } => print_rooms(&cache, json)?,
        Command::Admin { join_code } => match cache.get_admin(&join_code) {
            Some(code) => println!("{code}"),
            None => println!("no admin code stored for {}", join_code.to_uppercase()),
        },
        Command::Forget { join_code } => {
            cache.forget_group(&join_code);
            println!("forgot {}", join_code.to_uppercase());
        }
        Command::Watch { join_code } => {
            watch(cache, &config.gateway_url, &join_code).await?;
        }
    }
    Ok(())
}

fn print_rooms(cache: &RoomCache, json: bool) -> Result<(), Box<dyn Error>> {
    let hosted = cache.list_administered_groups();
    let links = cache.list_participant_links();

    if json {
        let body = serde_json::json!({ "administered": hosted, "participating": links });
        println!("{}", serde_json::to_string_pretty(&body)?);
        return Ok(());
    }

    println!("Administered groups:");
    if hosted.is_empty() {
        println!("  (none)");
    }
    for group in &hosted {
        println!("  {}  {}  admin {}", group.join_code, group.name, group.admin_code);
        if let (Some(name), Some(code)) = (&group.owner_participant_name, &group.owner_access_code) {
            println!("      as {name}, access {code}");
        }
    }

    println!("Participant links:");
    if links.is_empty() {
        println!("  (none)");
    }
    for link in &links {
        println!(
            "  {}  {}  as {}  access {}",
            link.join_code, link.group_name, link.participant_name, link.access_code
        );
    }
    Ok(())
}

async fn watch(
    cache: Arc<RoomCache>,
    gateway_url: &str,
    join_code: &str,
) -> Result<(), Box<dyn Error>> {
    let mut connection = gateway::connect(gateway_url).await?;
    let channel: Arc<dyn RealtimeChannel> = Arc::new(connection.handle.clone());

    let outcome = watch_group(
        cache,
        channel,
        &mut connection.events,
        join_code,
        |code, event| {
            rlog!(
                "watch: {} changed ({}), reload it from the groups API",
                code,
                event.event
            )
        },
        async {
            let _ = tokio::signal::ctrl_c().await;
        },
    )
    .await;

    // The leave frame is still queued; flush it before the runtime stops.
    if tokio::time::timeout(CLOSE_TIMEOUT, connection.close()).await.is_err() {
        rlog!("watch: gave up flushing the gateway connection");
    }

    match outcome {
        WatchOutcome::GroupDeleted => println!("group {} was deleted", join_code.to_uppercase()),
        WatchOutcome::Stopped => println!("stopped watching"),
        WatchOutcome::Disconnected => return Err("gateway disconnected".into()),
    }
    Ok(())
}
