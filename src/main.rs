use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kanban_timeline::config::Config;
use kanban_timeline::infrastructure::db;
use kanban_timeline::services::{BoardService, CardService, NewColumn, ReportAggregator};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Kanban board with stage-timeline reports",
    long_about = None
)]
struct Cli {
    /// Instant to record transitions at and compute reports against
    /// (RFC 3339). Defaults to the current time.
    #[arg(long, global = true)]
    at: Option<DateTime<Utc>>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a board with the default column set
    CreateBoard { name: String },
    /// List all boards
    Boards,
    /// Count the boards
    BoardCount,
    /// Show a board and its columns
    Board { board_id: String },
    /// Rename a board
    RenameBoard { board_id: String, name: String },
    /// Delete a board together with its cards and their history
    DeleteBoard { board_id: String },
    /// List a board's columns with the number of cards in each
    Columns { board_id: String },
    /// List the cards on a board
    Cards { board_id: String },
    /// List the cards in one column
    ColumnCards { column_id: String },
    /// Place a new card in the board's initial column
    AddCard {
        board_id: String,
        title: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Show a card, its column and block state
    Card { card_id: String },
    /// Advance a card one column
    Advance { card_id: String },
    /// Move a card into a specific column
    Move { card_id: String, column_id: String },
    /// Move a card into the board's cancel column
    Cancel { card_id: String },
    /// Block a card
    Block { card_id: String, reason: String },
    /// Unblock a card
    Unblock { card_id: String, reason: String },
    /// Completed cards of a board, slowest first
    Completion { board_id: String },
    /// Every block on a board, with open/resolved totals
    Blocking { board_id: String },
    /// Dwell times, completion and blocks of one card
    Timeline { card_id: String },
    /// Movement history of one card
    History { card_id: String },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,kanban_timeline=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let config = Config::from_env().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config from env, using defaults: {}", e);
        Config::default()
    });

    let pool = db::init_db(&config).await?;
    let at = cli.at.unwrap_or_else(Utc::now);

    match cli.command {
        Commands::CreateBoard { name } => {
            let columns = NewColumn::default_set();
            let details = BoardService::create_board(&pool, &name, &columns, at).await?;
            print_json(&details)?
        }
        Commands::Boards => print_json(&BoardService::list_boards(&pool).await?)?,
        Commands::BoardCount => println!("{}", BoardService::count_boards(&pool).await?),
        Commands::Board { board_id } => {
            print_json(&BoardService::get_board(&pool, &board_id).await?)?
        }
        Commands::RenameBoard { board_id, name } => {
            print_json(&BoardService::rename_board(&pool, &board_id, &name).await?)?
        }
        Commands::DeleteBoard { board_id } => {
            let removed = BoardService::delete_board(&pool, &board_id).await?;
            print_json(&serde_json::json!({ "board_id": board_id, "removed_cards": removed }))?
        }
        Commands::Columns { board_id } => {
            print_json(&BoardService::column_summaries(&pool, &board_id).await?)?
        }
        Commands::Cards { board_id } => {
            print_json(&CardService::list_cards(&pool, &board_id).await?)?
        }
        Commands::ColumnCards { column_id } => {
            print_json(&CardService::cards_in_column(&pool, &column_id).await?)?
        }
        Commands::AddCard {
            board_id,
            title,
            description,
        } => {
            let card = CardService::create_card(&pool, &board_id, &title, &description, at).await?;
            print_json(&card)?
        }
        Commands::Card { card_id } => {
            print_json(&CardService::card_details(&pool, &card_id).await?)?
        }
        Commands::Advance { card_id } => {
            print_json(&CardService::move_to_next_column(&pool, &card_id, at).await?)?
        }
        Commands::Move { card_id, column_id } => {
            print_json(&CardService::move_card(&pool, &card_id, &column_id, at).await?)?
        }
        Commands::Cancel { card_id } => {
            print_json(&CardService::cancel(&pool, &card_id, at).await?)?
        }
        Commands::Block { card_id, reason } => {
            print_json(&CardService::block(&pool, &card_id, &reason, at).await?)?
        }
        Commands::Unblock { card_id, reason } => {
            print_json(&CardService::unblock(&pool, &card_id, &reason, at).await?)?
        }
        Commands::Completion { board_id } => {
            print_json(&ReportAggregator::completion_report(&pool, &board_id, at).await?)?
        }
        Commands::Blocking { board_id } => {
            print_json(&ReportAggregator::blocking_report(&pool, &board_id, at).await?)?
        }
        Commands::Timeline { card_id } => {
            print_json(&ReportAggregator::card_timeline(&pool, &card_id, at).await?)?
        }
        Commands::History { card_id } => {
            print_json(&ReportAggregator::movement_history(&pool, &card_id).await?)?
        }
    }

    pool.close().await;
    Ok(())
}
