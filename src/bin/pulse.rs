//! pulse CLI: run the sentiment pipeline or poke at its store.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tweet_pulse::config::secrets::ExposeSecret;
use tracing::info;
use tweet_pulse::api;
use tweet_pulse::config::{CollaboratorConfig, Config, StoreConfig};
use tweet_pulse::db::Db;
use tweet_pulse::engine::{Pipeline, TopicChange, TweetService};
use tweet_pulse::search::TwitterSearch;
use tweet_pulse::sentiment::TextAnalyticsScorer;
use tweet_pulse::store::{DurableStore, MemoryStore};
use tweet_pulse::telemetry::{TelemetryConfig, init_telemetry};

#[derive(Parser)]
#[command(name = "pulse", about = "Running tweet sentiment for one topic")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run both workers and the HTTP surface until Ctrl-C
    Serve {
        /// Listen address (overrides LISTEN_ADDR)
        #[arg(long)]
        listen: Option<SocketAddr>,
    },
    /// Replace the active topic and reset the aggregate
    Topic {
        /// Search subject
        subject: String,
    },
    /// Print the current aggregate score
    Score,
    /// Print queue depths and the number of scored tweets
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "tweet-pulse".to_string(),
        default_level: config.log_level.clone(),
    })?;

    let store = open_store(&config.store).await?;

    match cli.command {
        Command::Serve { listen } => cmd_serve(config, store, listen).await,
        Command::Topic { subject } => cmd_topic(store, &subject).await,
        Command::Score => cmd_score(store).await,
        Command::Status => cmd_status(store).await,
    }
}

async fn open_store(config: &StoreConfig) -> anyhow::Result<Arc<dyn DurableStore>> {
    let store: Arc<dyn DurableStore> = match config {
        StoreConfig::Postgres { database_url } => {
            let db = Db::connect(database_url.expose_secret()).await?;
            db.migrate().await?;
            db.ensure_queues().await?;
            Arc::new(db)
        }
        StoreConfig::Memory {
            journal: Some(path),
        } => Arc::new(MemoryStore::open(path).await?),
        StoreConfig::Memory { journal: None } => Arc::new(MemoryStore::new()),
    };
    Ok(store)
}

async fn cmd_serve(
    config: Config,
    store: Arc<dyn DurableStore>,
    listen: Option<SocketAddr>,
) -> anyhow::Result<()> {
    let collaborators = CollaboratorConfig::from_env()?;
    let search = TwitterSearch::new(
        collaborators.twitter,
        collaborators.twitter_search_url,
        collaborators.timeout,
    )?;
    let scorer = TextAnalyticsScorer::new(
        collaborators.sentiment_account_key,
        &collaborators.sentiment_base_url,
        collaborators.timeout,
    )?;

    let pipeline = Pipeline::new(store, Arc::new(search), Arc::new(scorer), config.pipeline);
    let handle = pipeline.start();

    let addr = listen.unwrap_or(config.listen_addr);
    let server = api::serve(addr, handle.service(), async {
        tokio::signal::ctrl_c().await.ok();
        info!("interrupt received");
    });
    let served = server.await;

    handle.stop().await;
    served?;
    Ok(())
}

async fn cmd_topic(store: Arc<dyn DurableStore>, subject: &str) -> anyhow::Result<()> {
    let service = TweetService::standalone(store);
    match service.set_tweet_subject(Some(subject)).await? {
        TopicChange::Set { drained } => {
            println!("Topic set: {subject} (replaced {drained} pending)");
        }
        TopicChange::Ignored => println!("Blank subject ignored."),
    }
    Ok(())
}

async fn cmd_score(store: Arc<dyn DurableStore>) -> anyhow::Result<()> {
    let service = TweetService::standalone(store);
    let aggregate = service
        .get_average_sentiment_score()
        .await?
        .unwrap_or_default();
    println!("Tweets:   {}", aggregate.tweet_count);
    println!("Average:  {:.4}", aggregate.average_score);
    Ok(())
}

async fn cmd_status(store: Arc<dyn DurableStore>) -> anyhow::Result<()> {
    let status = TweetService::standalone(store).status().await?;
    println!("Pending topics:  {}", status.pending_topics);
    println!("Pending tweets:  {}", status.pending_tweets);
    println!("Dead topics:     {}", status.dead_topics);
    println!("Dead tweets:     {}", status.dead_tweets);
    println!("Scored tweets:   {}", status.scored_tweets);
    Ok(())
}
