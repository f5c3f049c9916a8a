//! Seed script for development. Prepares a fresh environment for local scans.
//!
//! Usage: `cargo run --bin seed [rule-short-id ...]`
//!
//! Requires `DATABASE_URL` (reads .env); `REDIS_URL` defaults to localhost.
//! Runs migrations, adds the given short-ids to the ignore list and sets the
//! finding-submission parameter to `SEED_ENABLE_FINDINGS` (default "yes").

use redis::AsyncCommands;
use scaphub::services::parameters::ENABLE_FINDINGS_PARAMETER;
use sqlx::PgPool;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let db_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://localhost:6379".to_string());
    let enable = std::env::var("SEED_ENABLE_FINDINGS").unwrap_or_else(|_| "yes".to_string());

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(2)
        .connect(&db_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    println!("=== scaphub seed ===");

    let rules: Vec<String> = std::env::args().skip(1).collect();
    seed_ignore_list(&pool, &rules).await?;
    seed_parameters(&redis_url, &enable).await?;

    println!("\n=== Seed complete! ===");
    Ok(())
}

async fn seed_ignore_list(pool: &PgPool, rules: &[String]) -> anyhow::Result<()> {
    for rule in rules {
        sqlx::query(
            r#"INSERT INTO "SCAP_Scan_Ignore_List" ("SCAP_Rule_Name") VALUES ($1)
               ON CONFLICT DO NOTHING"#,
        )
        .bind(rule)
        .execute(pool)
        .await?;
    }

    let count: i64 = sqlx::query_scalar(r#"SELECT COUNT(*) FROM "SCAP_Scan_Ignore_List""#)
        .fetch_one(pool)
        .await?;
    println!("[done] Ignore list has {count} entries ({} added)", rules.len());
    Ok(())
}

async fn seed_parameters(redis_url: &str, enable: &str) -> anyhow::Result<()> {
    let client = redis::Client::open(redis_url)?;
    let mut conn = client.get_multiplexed_async_connection().await?;
    let () = conn.set(ENABLE_FINDINGS_PARAMETER, enable).await?;
    println!("[done] {ENABLE_FINDINGS_PARAMETER} = {enable}");
    Ok(())
}
