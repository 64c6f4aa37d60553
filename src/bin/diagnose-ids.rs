//! Report EntityID collisions in a persisted database.
//!
//! An id is the first 4 characters of the year plus the first 6 of the country,
//! so two countries sharing a prefix in one year end up with the same id.

use anyhow::Context;
use esc_dataset::config::Config;
use esc_dataset::constants::{ID, OVERVIEW_RELATION, SCORES_RELATION, SCORE_ID};
use esc_dataset::pipeline::SqliteSink;

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::load().context("loading configuration")?;
    println!("🔍 Diagnosing EntityID collisions in {}", config.database.path.display());
    println!("{}", "=".repeat(60));

    if !config.database.path.exists() {
        println!("❌ Database not found. Run `esc_dataset run` first.");
        return Ok(());
    }
    let sink = SqliteSink::new(config.database.clone());
    let present = sink.relation_names()?;

    let mut total = 0;
    for (relation, id_column) in [(OVERVIEW_RELATION, ID), (SCORES_RELATION, SCORE_ID)] {
        println!("\n📊 {}", relation);
        println!("{}", "-".repeat(40));
        if !present.iter().any(|p| p == relation) {
            println!("   ⚠️  relation not present");
            continue;
        }
        let collisions = sink
            .id_collisions(relation, id_column)
            .with_context(|| format!("querying {relation}"))?;
        if collisions.is_empty() {
            println!("   ✅ no collisions");
        }
        for (id, count) in &collisions {
            println!("   ❌ {} appears {} times", id, count);
        }
        total += collisions.len();
    }

    println!("\n   Summary: {} colliding ids", total);
    Ok(())
}
