// crates/channel/src/main.rs
//! `thalia-jobs`: follow a user's story-generation jobs from the terminal.
//!
//! Connects a [`JobChannel`], re-issues the requested fetches every time the
//! socket (re)opens, and logs each change to the projections until Ctrl-C.

use anyhow::Result;
use clap::Parser;
use thalia_channel::{ChannelConfig, ChannelSnapshot, JobChannel, SessionId, DEFAULT_TOPIC};
use thalia_observability::ObservabilityConfig;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "thalia-jobs", about = "Watch Thalia story-generation jobs")]
struct Args {
    /// User id of the signed-in account.
    #[arg(long)]
    user: String,

    /// Socket base, overrides THALIA_WS_URL.
    #[arg(long)]
    ws_url: Option<String>,

    /// Topic path appended to the socket base.
    #[arg(long, default_value = DEFAULT_TOPIC)]
    topic: String,

    /// Job to follow; sent as `fetch_job` on every connect.
    #[arg(long)]
    track: Option<String>,

    /// Request the job list on every connect.
    #[arg(long)]
    fetch_stories: bool,

    /// Restrict the job list to favorited stories.
    #[arg(long, requires = "fetch_stories")]
    favorites_only: bool,

    /// Log as newline-delimited JSON.
    #[arg(long)]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut observability = ObservabilityConfig::from_env();
    observability.json |= args.json_logs;
    let _guard = thalia_observability::init(&observability)?;

    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
    {
        warn!("rustls crypto provider already installed");
    }

    let config = ChannelConfig::from_vars(|name| match (name, &args.ws_url) {
        ("THALIA_WS_URL", Some(url)) => Some(url.clone()),
        _ => std::env::var(name).ok(),
    })?;

    let channel = JobChannel::new(config, args.topic.clone());
    let mut updates = channel.subscribe();
    channel.reconfigure(Some(SessionId::new(args.user.clone())), args.topic.clone());

    let mut was_connected = false;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing job channel");
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.is_connected() && !was_connected {
                    request_updates(&channel, &args);
                }
                was_connected = snapshot.is_connected();
                report(&snapshot);
            }
        }
    }

    channel.shutdown().await;
    Ok(())
}

fn request_updates(channel: &JobChannel, args: &Args) {
    if let Some(job_id) = &args.track {
        channel.track_job(job_id.as_str());
    }
    if args.fetch_stories {
        channel.fetch_stories(args.favorites_only);
    }
}

fn report(snapshot: &ChannelSnapshot) {
    if snapshot.retries_exhausted {
        warn!("job channel gave up reconnecting; restart to try again");
    }
    info!(
        connection = ?snapshot.connection,
        retry_count = snapshot.retry_count,
        stories = snapshot.stories.len(),
        "channel state"
    );
    if let Some(job) = &snapshot.current_job {
        info!(
            job_id = %job.job_id,
            status = %job.status,
            position = ?job.position,
            title = job.title(),
            "tracked job"
        );
    }
    for story in &snapshot.stories {
        info!(
            job_id = %story.job_id,
            status = %story.status,
            favorited = story.is_favorited(),
            title = story.title(),
            "story"
        );
    }
}
