// Dump a user's stored readings as CSV, plus a summary on stderr.
//
// Usage: cargo run --example dump_history -- USER_ID [DB_PATH] [LIMIT]
//   DB_PATH  default: ./data/vitals.db
//   LIMIT    default: 20

use std::env;
use std::time::Duration;

use vitals_dashboard::aggregate::summarize;
use vitals_dashboard::history_repo::HistoryRepo;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = env::args().collect();
    let user_id: i64 = args
        .get(1)
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| anyhow::anyhow!("usage: dump_history USER_ID [DB_PATH] [LIMIT]"))?;
    let path = args.get(2).map(String::as_str).unwrap_or("./data/vitals.db");
    let limit: u32 = args.get(3).and_then(|s| s.parse().ok()).unwrap_or(20);

    let repo = HistoryRepo::connect(path, 1, Duration::from_secs(5)).await?;
    let readings = repo.get_recent_readings(user_id, limit).await?;

    print!("{}", vitals_dashboard::csv::export(&readings));
    eprintln!("{}", serde_json::to_string_pretty(&summarize(&readings))?);
    Ok(())
}
