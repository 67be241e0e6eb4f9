use kanban_timeline::config::Config;
use kanban_timeline::infrastructure::db;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::from_env()?;
    let pool = db::init_db(&config).await?;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE '\\_%' ESCAPE '\\' ORDER BY name",
    )
    .fetch_all(&pool)
    .await?;

    println!("Tables: {}", tables.join(", "));

    for table in ["boards", "cards", "card_movements", "card_blocks"] {
        let count: i64 = sqlx::query_scalar(&format!("SELECT count(*) FROM {}", table))
            .fetch_one(&pool)
            .await?;
        println!("{} rows: {}", table, count);
    }

    let open_blocks: i64 =
        sqlx::query_scalar("SELECT count(*) FROM card_blocks WHERE unblocked_at IS NULL")
            .fetch_one(&pool)
            .await?;
    println!("Open blocks: {}", open_blocks);

    let unplaced: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM cards c WHERE NOT EXISTS (SELECT 1 FROM card_movements m WHERE m.card_id = c.id AND m.from_column_id IS NULL)",
    )
    .fetch_one(&pool)
    .await?;
    println!("Cards without initial placement: {}", unplaced);

    println!("Journal mode: {}", db::verify_wal_mode(&pool).await?);

    Ok(())
}
