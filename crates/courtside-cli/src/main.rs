// Courtside entry point.
//
// Every subcommand:
// 1. Initializes tracing (log to file, stdout is reserved for JSON output)
// 2. Resolves the base directory and loads config (copying defaults if needed)
// 3. Runs its operation and prints the result as JSON

use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use tracing::{info, warn};

use courtside_app::euroleague::EuroleagueBoxScoreClient;
use courtside_app::feed::FeedClient;
use courtside_app::http::RetryPolicy;
use courtside_app::ingest::GameIngestion;
use courtside_app::pipeline::{datasets_from_config, LoadReport, SeasonLoadPipeline};
use courtside_core::config::{self, Config};
use courtside_core::db::Database;
use courtside_core::records::SeasonId;
use courtside_stats::boxscore::BoxScoreAssembler;
use courtside_stats::dataset::ImpactFilter;
use courtside_stats::similarity::{self, FeatureWeights};

#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Directory holding config/ and defaults/ (defaults to the current
    /// directory, then the platform config directory)
    #[arg(long)]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Advanced box score for one game (e.g. ".../E2023/333/")
    Boxscore {
        /// Game URL or path containing /E<season>/<game code>
        reference: String,
    },

    /// Load the season-aggregate datasets listed in the config
    LoadSeasons {
        /// Only load these dataset keys (e.g. 24_25_teams)
        #[arg(long = "only")]
        only: Vec<String>,
    },

    /// Ingest per-game events for every configured competition
    IngestGames,

    /// Read loaded season stats back
    Report {
        #[command(subcommand)]
        query: ReportQuery,
    },
}

#[derive(Subcommand)]
enum ReportQuery {
    /// Player season rows; league averages when no names are given
    Player {
        /// Season id, e.g. 2024-25
        #[arg(long)]
        season: String,

        names: Vec<String>,
    },

    /// Team season rows; league averages when no names are given
    Team {
        /// Season id, e.g. 2024-25
        #[arg(long)]
        season: String,

        names: Vec<String>,
    },

    /// Players whose season profile is closest to one player's
    Similar {
        /// Season of the player to compare
        #[arg(long)]
        season: String,

        /// Only compare against players with the same role
        #[arg(long)]
        same_role: bool,

        /// Feature weight as column=weight (e.g. pts=2.0); repeatable
        #[arg(long = "weight", value_parser = parse_weight)]
        weights: Vec<(String, f64)>,

        /// Number of matches to return
        #[arg(long, default_value_t = similarity::DEFAULT_LIMIT)]
        limit: usize,

        name: String,
    },
}

#[derive(Clone, Copy)]
enum Entity {
    Player,
    Team,
}

fn parse_weight(raw: &str) -> Result<(String, f64), String> {
    let (column, weight) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected column=weight, got `{raw}`"))?;
    let weight: f64 = weight
        .trim()
        .parse()
        .map_err(|_| format!("weight for `{column}` is not a number"))?;
    Ok((column.trim().to_string(), weight))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    let base_dir = match cli.base_dir {
        Some(dir) => dir,
        None => config::default_base_dir().context("failed to resolve base directory")?,
    };
    let config = config::load_config(&base_dir).context("failed to load configuration")?;
    info!("Config loaded from {}", base_dir.display());

    let output = match cli.command {
        Commands::Boxscore { reference } => boxscore(&config, &reference).await?,
        Commands::LoadSeasons { only } => pretty(&load_seasons(&config, &only)?)?,
        Commands::IngestGames => pretty(&ingest_games(&config).await?)?,
        Commands::Report { query } => pretty(&report_query(&config, query)?)?,
    };

    println!("{output}");
    Ok(())
}

fn pretty(value: &Value) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

/// Records-oriented JSON, one object per row.
async fn boxscore(config: &Config, reference: &str) -> anyhow::Result<String> {
    let client = EuroleagueBoxScoreClient::new(&config.boxscore, RetryPolicy::from_config(&config.retry))?;
    let table = BoxScoreAssembler::new(client).build(reference).await?;
    info!("Box score for {} assembled: {} rows", table.game, table.rows.len());
    Ok(table.to_json()?)
}

fn open_database(config: &Config) -> anyhow::Result<Database> {
    let path = config.database_path();
    let db = Database::open(&path).context("failed to open database")?;
    info!("Database opened at {}", path);
    Ok(db)
}

fn load_seasons(config: &Config, only: &[String]) -> anyhow::Result<Value> {
    let mut sources = datasets_from_config(config).context("invalid dataset key in config")?;
    if !only.is_empty() {
        sources.retain(|s| only.iter().any(|k| k == s.key.as_str()));
        if sources.is_empty() {
            bail!("none of {:?} is a configured dataset", only);
        }
    }

    let db = open_database(config)?;
    let filter = ImpactFilter {
        min_games: config.season_load.min_games,
        min_minutes: config.season_load.min_minutes,
    };
    let report = SeasonLoadPipeline::new(&db, filter)
        .with_seasons(config.season_load.seasons.iter().map(SeasonId::new))
        .run(&sources)
        .context("failed to ensure seasons")?;

    let failed = report.failures().count();
    let output = load_report_json(&report);
    if failed > 0 {
        println!("{}", pretty(&output)?);
        bail!("{failed} dataset(s) failed; clean up partially loaded rows before re-running");
    }
    Ok(output)
}

fn load_report_json(report: &LoadReport) -> Value {
    let failed: Vec<Value> = report
        .failures()
        .map(|e| {
            json!({
                "dataset": e.dataset,
                "stage": e.stage.to_string(),
                "row_index": e.row_index,
                "referential": e.is_referential(),
                "error": e.to_string(),
            })
        })
        .collect();
    json!({
        "seasons": report.seasons,
        "loaded": report.loaded().collect::<Vec<_>>(),
        "skipped": report.skipped(),
        "failed": failed,
    })
}

async fn ingest_games(config: &Config) -> anyhow::Result<Value> {
    let Some(api_key) = config.credentials.feed_api_key.clone() else {
        bail!("feed_api_key missing from config/credentials.toml");
    };
    if config.feed.competitions.is_empty() {
        warn!("No competitions configured under [feed.competitions]");
    }

    let feed = FeedClient::new(&config.feed, api_key, RetryPolicy::from_config(&config.retry))?;
    let db = open_database(config)?;
    let report = GameIngestion::new(&feed, &db, &config.feed)
        .run(&config.feed.competitions)
        .await
        .context("game ingestion aborted")?;
    Ok(serde_json::to_value(report)?)
}

fn report_query(config: &Config, query: ReportQuery) -> anyhow::Result<Value> {
    match query {
        ReportQuery::Player { season, names } => report(config, Entity::Player, &season, names),
        ReportQuery::Team { season, names } => report(config, Entity::Team, &season, names),
        ReportQuery::Similar {
            season,
            same_role,
            weights,
            limit,
            name,
        } => similar(config, &name, &season, same_role, weights.into_iter().collect(), limit),
    }
}

fn similar(
    config: &Config,
    name: &str,
    season: &str,
    same_role: bool,
    weights: FeatureWeights,
    limit: usize,
) -> anyhow::Result<Value> {
    let db = open_database(config)?;
    let Some(base) = db
        .player_season_stats(&[(name.to_string(), season.to_string())])?
        .into_iter()
        .next()
    else {
        bail!("player `{name}` not found in season `{season}`");
    };
    let role = base.get("role").and_then(Value::as_str).map(str::to_string);
    let role_filter = match (same_role, role.as_deref()) {
        (false, _) => None,
        (true, Some(role)) => Some(role),
        (true, None) => bail!("player `{name}` has no role to match on"),
    };

    let candidates = db.similarity_candidates(name, season, role_filter)?;
    let ranked = similarity::rank_similar(&base, &candidates, &weights, limit)?;
    info!("{} players compared against {name} ({season})", candidates.len());
    Ok(json!({
        "base": { "name": name, "season_id": season, "role": role },
        "same_role": same_role,
        "similar": ranked,
    }))
}

fn report(config: &Config, entity: Entity, season: &str, names: Vec<String>) -> anyhow::Result<Value> {
    let db = open_database(config)?;
    if names.is_empty() {
        let averages = match entity {
            Entity::Player => db.player_season_averages(season)?,
            Entity::Team => db.team_season_averages(season)?,
        };
        return Ok(averages.map(Value::Object).unwrap_or(Value::Null));
    }

    let pairs: Vec<(String, String)> = names
        .into_iter()
        .map(|name| (name, season.to_string()))
        .collect();
    let rows = match entity {
        Entity::Player => db.player_season_stats(&pairs)?,
        Entity::Team => db.team_season_stats(&pairs)?,
    };
    Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
}

/// Initialize tracing to log to a file (stdout carries the JSON output).
fn init_tracing() -> anyhow::Result<()> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join("logs");
    std::fs::create_dir_all(&log_dir)?;

    let log_file = std::fs::File::create(log_dir.join("courtside.log"))?;

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("courtside=info,warn")),
        )
        .with_writer(log_file)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;

    Ok(())
}
