//! Tryline CLI
//!
//! Rugby event analytics: try pattern mining and try-sequence prediction.

use clap::{Parser, Subcommand};
use tryline::data::EventFilter;
use tryline::{Config, ErrorPayload, MatchId, Result, SplitStrategy};

#[derive(Parser)]
#[command(name = "tryline")]
#[command(about = "Mine and predict the event sequences that lead to tries", long_about = None)]
struct Cli {
    /// Config file path
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new project with default config
    Init,
    /// Data management commands
    Data {
        #[command(subcommand)]
        action: DataCommands,
    },
    /// Descriptive statistics and the patterns that precede tries
    Analyze {
        /// Only this team's events
        #[arg(long)]
        team: Option<String>,
        /// Only events of teams playing against this one
        #[arg(long)]
        opponent: Option<String>,
        /// Events looked back from each try
        #[arg(long)]
        n_events: Option<usize>,
        /// Only this player's events, with their individual totals
        #[arg(long)]
        player: Option<i64>,
        /// Only this match, with its team breakdown and top players
        #[arg(long = "match")]
        match_id: Option<i64>,
    },
    /// Train both models and publish a new artifact generation
    Train {
        /// Override window length
        #[arg(long)]
        maxlen: Option<usize>,
        /// Train/test split: random or grouped (by match)
        #[arg(long)]
        split: Option<SplitStrategy>,
        /// Override classifier epochs
        #[arg(long)]
        epochs: Option<usize>,
        /// Override sequence model epochs
        #[arg(long)]
        seq_epochs: Option<usize>,
    },
    /// Predict whether a try follows a sequence of events
    Predict {
        /// Event types, oldest first
        events: Vec<String>,
        /// Output format
        #[arg(long, default_value = "table")]
        format: OutputFormat,
    },
    /// Model management commands
    Model {
        #[command(subcommand)]
        action: ModelCommands,
    },
    /// List the event vocabulary and its codes
    Vocab,
}

#[derive(Subcommand)]
enum DataCommands {
    /// Import events from a JSON array of event records
    Import {
        /// Path to the JSON file
        file: String,
    },
    /// Show database status
    Status,
}

#[derive(Subcommand)]
enum ModelCommands {
    /// Show the current artifact generation
    Info,
    /// Point CURRENT at an earlier generation
    Use {
        /// Generation name
        generation: String,
    },
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum OutputFormat {
    Table,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use table or json.", s)),
        }
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    let json_errors = matches!(
        cli.command,
        Commands::Predict {
            format: OutputFormat::Json,
            ..
        }
    );

    // Load or create config
    let config = if std::path::Path::new(&cli.config).exists() {
        match Config::load(&cli.config) {
            Ok(c) => c,
            Err(e) => fail(&e, json_errors),
        }
    } else {
        Config::default()
    };

    // Run command
    let result = match cli.command {
        Commands::Init => commands::init(&cli.config),
        Commands::Data { action } => match action {
            DataCommands::Import { file } => commands::data_import(&config, &file),
            DataCommands::Status => commands::data_status(&config),
        },
        Commands::Analyze {
            team,
            opponent,
            n_events,
            player,
            match_id,
        } => {
            let filter = EventFilter {
                team,
                opponent,
                match_id: match_id.map(MatchId),
                player_id: player,
            };
            commands::analyze(&config, &filter, n_events)
        }
        Commands::Train {
            maxlen,
            split,
            epochs,
            seq_epochs,
        } => commands::train(&config, maxlen, split, epochs, seq_epochs),
        Commands::Predict { events, format } => commands::predict(&config, &events, format),
        Commands::Model { action } => match action {
            ModelCommands::Info => commands::model_info(&config),
            ModelCommands::Use { generation } => commands::model_use(&config, &generation),
        },
        Commands::Vocab => commands::vocab(),
    };

    if let Err(e) = result {
        fail(&e, json_errors);
    }
}

fn fail(err: &tryline::TrylineError, json: bool) -> ! {
    if json {
        let payload = ErrorPayload::from(err);
        match serde_json::to_string_pretty(&payload) {
            Ok(text) => println!("{}", text),
            Err(_) => eprintln!("Error: {}", err),
        }
    } else {
        eprintln!("Error: {}", err);
    }
    std::process::exit(1);
}

mod commands {
    use super::*;
    use burn::backend::{Autodiff, NdArray};
    use tryline::data::database::event_type_counts;
    use tryline::data::Database;
    use tryline::features::{
        EventVocabulary, MatchSummary, PatternMiner, PlayerStats, TeamMatchStats, TryBreakdown,
    };
    use tryline::predict::{ArtifactStore, InferenceService};
    use tryline::training::TrainingPipeline;
    use tryline::{Event, TrylineError};

    type Backend = NdArray<f32>;
    type AutodiffBackend = Autodiff<Backend>;

    pub fn init(config_path: &str) -> Result<()> {
        let config = Config::default();
        config.save(config_path)?;
        println!("Created default config at {}", config_path);

        std::fs::create_dir_all("data")?;
        std::fs::create_dir_all(&config.data.artifact_dir)?;
        println!("Created data/ and {}/ directories", config.data.artifact_dir);

        println!("\nNext steps:");
        println!("  1. Edit {} to customize settings", config_path);
        println!("  2. Run 'tryline data import events.json' to load match events");
        println!("  3. Run 'tryline analyze' to see the patterns before tries");
        println!("  4. Run 'tryline train' to train both models");
        println!("  5. Run 'tryline predict kickoff carry ruck pass' to make predictions");

        Ok(())
    }

    pub fn data_import(config: &Config, file: &str) -> Result<()> {
        let content = std::fs::read_to_string(file)?;
        let events: Vec<Event> = serde_json::from_str(&content)?;
        if events.is_empty() {
            println!("No events found in {}", file);
            return Ok(());
        }

        let vocab = EventVocabulary::rugby();
        let unknown = events.iter().filter(|e| !vocab.contains(&e.event_type)).count();
        if unknown > 0 {
            log::warn!(
                "{} of {} events have types outside the vocabulary; they encode as unknown",
                unknown,
                events.len()
            );
        }

        let mut db = Database::open(&config.data.database_path)?;
        let count = db.insert_events(&events)?;
        println!("Stored {} events in {}", count, config.data.database_path);

        Ok(())
    }

    pub fn data_status(config: &Config) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let stats = db.get_stats()?;

        println!("Database Status");
        println!("───────────────────────────────");
        println!("  Path:     {}", config.data.database_path);
        println!("  Events:   {}", stats.event_count);
        println!("  Matches:  {}", stats.match_count);
        println!("  Teams:    {}", stats.team_count);
        println!("  Tries:    {}", stats.try_count);

        Ok(())
    }

    pub fn analyze(config: &Config, filter: &EventFilter, n_events: Option<usize>) -> Result<()> {
        let db = Database::open(&config.data.database_path)?;
        let events = db.get_events(filter)?;
        if events.is_empty() {
            println!("No events match. Run 'tryline data import' first or relax the filters.");
            return Ok(());
        }

        if let Some(player_id) = filter.player_id {
            print_player(&PlayerStats::from_events(player_id, &events));
        }
        if let Some(match_id) = filter.match_id {
            print_match_summary(&MatchSummary::from_events(match_id, &events));
        }

        println!("Events analysed: {}", events.len());
        println!("\nMost frequent event types");
        println!("───────────────────────────────");
        for (event_type, count) in event_type_counts(&events).iter().take(10) {
            println!("  {:<22} {:>6}", event_type, count);
        }

        let breakdown = TryBreakdown::from_events(&events);
        println!("\nTries: {}", breakdown.total);
        for (team, count) in &breakdown.by_team {
            println!("  {:<22} {:>6}", team, count);
        }
        if !breakdown.by_zone.is_empty() {
            println!("\nTries by zone");
            for (zone, count) in &breakdown.by_zone {
                println!("  {:<22} {:>6}", zone, count);
            }
        }

        let n_events = n_events.unwrap_or(config.sequence.n_events);
        let patterns = PatternMiner::new(n_events)?.mine(&events);
        println!(
            "\nMost common {}-event patterns before a try ({} tries)",
            n_events,
            patterns.total_tries()
        );
        println!("───────────────────────────────");
        for pattern in patterns.most_common(config.sequence.top_patterns) {
            println!("  {:>4}x  {}", pattern.count, pattern.pattern.join(" → "));
        }

        println!("\nTeam match statistics");
        println!("───────────────────────────────");
        for stats in TeamMatchStats::from_events(&events) {
            let rate = stats
                .tackle_success_rate()
                .map(|r| format!("{:.0}%", r * 100.0))
                .unwrap_or_else(|| "-".to_string());
            println!(
                "  {} {:<16} tackles {:>3} missed {:>3} tries {:>2} passes {:>3} carries {:>3} penalties {:>2} success {}",
                stats.match_id,
                stats.team_name,
                stats.tackles,
                stats.missed_tackles,
                stats.tries,
                stats.passes,
                stats.carries,
                stats.penalties,
                rate
            );
            for suggestion in stats.suggestions() {
                println!("      - {}", suggestion);
            }
        }

        Ok(())
    }

    fn print_player(stats: &PlayerStats) {
        let rate = stats
            .tackle_success_rate()
            .map(|r| format!("{:.1}%", r * 100.0))
            .unwrap_or_else(|| "N/A".to_string());
        println!("Player {}", stats.player_id);
        println!("───────────────────────────────");
        println!("  Events:          {}", stats.total_events);
        println!("  Tackles:         {}", stats.tackles);
        println!("  Missed tackles:  {}", stats.missed_tackles);
        println!("  Tackle success:  {}", rate);
        println!("  Passes:          {}", stats.passes);
        println!("  Carries:         {}", stats.carries);
        println!("  Try assists:     {}", stats.try_assists);
        for (event_type, count) in &stats.event_breakdown {
            println!("    {:<20} {:>6}", event_type, count);
        }
        println!();
    }

    fn print_match_summary(summary: &MatchSummary) {
        println!("Match {}", summary.match_id.0);
        println!("───────────────────────────────");
        for team in &summary.teams {
            println!("  {}", team.team_name);
            for (event_type, count) in &team.event_counts {
                println!("    {:<20} {:>6}", event_type, count);
            }
        }
        if !summary.top_players.is_empty() {
            println!("  Top players by involvement");
            for player in &summary.top_players {
                println!("    player {:<13} {:>6}", player.player_id, player.total);
            }
        }
        println!();
    }

    pub fn train(
        config: &Config,
        maxlen: Option<usize>,
        split: Option<SplitStrategy>,
        epochs: Option<usize>,
        seq_epochs: Option<usize>,
    ) -> Result<()> {
        let mut training_config = config.clone();
        if let Some(m) = maxlen {
            training_config.sequence.maxlen = m;
        }
        if let Some(s) = split {
            training_config.split.strategy = s;
        }
        if let Some(e) = epochs {
            training_config.classifier.epochs = e;
        }
        if let Some(e) = seq_epochs {
            training_config.sequence_model.epochs = e;
        }
        training_config.validate()?;

        println!("Initializing training...");

        let db = Database::open(&config.data.database_path)?;
        let events = db.get_all_events()?;
        if events.is_empty() {
            return Err(TrylineError::InsufficientData(
                "No events in database. Run 'tryline data import' first.".to_string(),
            ));
        }
        println!("Loaded {} events from database", events.len());

        let vocab = EventVocabulary::rugby();
        let device = Default::default();
        let (models, report) =
            TrainingPipeline::new(&training_config, &vocab).run::<AutodiffBackend>(&events, &device)?;

        println!("\n{}", report);

        let store = ArtifactStore::new(&config.data.artifact_dir);
        let generation = store.publish(&models, &vocab, &report)?;
        println!("Published artifacts as generation {}", generation);

        Ok(())
    }

    pub fn predict(config: &Config, events: &[String], format: OutputFormat) -> Result<()> {
        let store = ArtifactStore::new(&config.data.artifact_dir);
        let service = InferenceService::<Backend>::new(store, EventVocabulary::rugby(), Default::default());
        let prediction = service.predict_outcome(events)?;

        match format {
            OutputFormat::Table => {
                println!("Sequence: {}", events.join(" → "));
                println!("───────────────────────────────────────────────");
                println!("  {:<16} {:>6} {:>12} {:>10}", "model", "label", "probability", "P(try)");
                for (name, p) in [
                    ("classic", prediction.classic),
                    ("sequence_model", prediction.sequence_model),
                ] {
                    println!(
                        "  {:<16} {:>6} {:>12.3} {:>10.3}",
                        name, p.label, p.probability, p.probability_of_try
                    );
                }
            }
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(&prediction)?);
            }
        }

        Ok(())
    }

    pub fn model_info(config: &Config) -> Result<()> {
        let store = ArtifactStore::new(&config.data.artifact_dir);
        let generation = store.current_generation()?;
        let manifest = store.read_manifest(&generation)?;

        println!("Model Information");
        println!("───────────────────────────────");
        println!("  Generation:     {}", manifest.generation);
        println!("  Created:        {}", manifest.created_at);
        println!(
            "  Vocabulary:     {} ({} symbols, {})",
            manifest.vocabulary_version,
            manifest.symbols.len(),
            &manifest.vocabulary_fingerprint[..manifest.vocabulary_fingerprint.len().min(12)]
        );
        println!("  Window length:  {}", manifest.maxlen);
        println!("  Hidden layers:  {:?}", manifest.classifier.hidden_dims);
        println!(
            "  LSTM:           embedding {} hidden {} dense {}",
            manifest.sequence_model.embedding_dim,
            manifest.sequence_model.hidden_size,
            manifest.sequence_model.dense_size
        );
        println!("  Windows:        {} ({} positive)", manifest.windows, manifest.positives);
        println!("  Classifier acc: {:.2}%", manifest.classifier_accuracy * 100.0);
        println!("  Sequence acc:   {:.2}%", manifest.sequence_model_accuracy * 100.0);

        let others: Vec<String> = store
            .generations()?
            .into_iter()
            .filter(|g| g != &generation)
            .collect();
        if !others.is_empty() {
            println!("  Other generations: {}", others.join(", "));
        }

        Ok(())
    }

    pub fn model_use(config: &Config, generation: &str) -> Result<()> {
        let store = ArtifactStore::new(&config.data.artifact_dir);
        store.set_current(generation)?;
        println!("CURRENT now points at {}", generation);
        Ok(())
    }

    pub fn vocab() -> Result<()> {
        let vocab = EventVocabulary::rugby();
        println!("Vocabulary {} ({} symbols)", vocab.describe(), vocab.len());
        println!("  {:>4}  {}", 0, "<unknown/pad>");
        for symbol in vocab.symbols() {
            println!("  {:>4}  {}", vocab.encode(symbol), symbol);
        }
        Ok(())
    }
}
