use mongodb::{Client, bson::doc};
use std::time::{Duration, Instant};

/// Round-trip a `ping` command against the `admin` database.
///
/// Returns the observed latency on success.
pub async fn ping(client: &Client) -> Result<Duration, mongodb::error::Error> {
    let start = Instant::now();
    client
        .database("admin")
        .run_command(doc! { "ping": 1 })
        .await?;
    Ok(start.elapsed())
}
