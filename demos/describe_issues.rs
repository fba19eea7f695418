//! 指定時刻以降に作成・検知・解決されたHalo Issueを一覧表示する
//!
//! ```bash
//! export HALO_API_KEY=your-key
//! export HALO_API_SECRET_KEY=your-secret
//! cargo run --example describe_issues -- 2019-01-01 [--full]
//! ```

use dotenv::dotenv;
use std::env;
use tracing_subscriber::EnvFilter;

use halo_issues::{AggregatorConfig, HaloClient, HaloConfig, IssueAggregator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let full = args.iter().any(|arg| arg == "--full");
    let since = args
        .iter()
        .find(|arg| !arg.starts_with("--"))
        .cloned()
        .unwrap_or_else(|| "2019-01-01".to_string());

    let client = HaloClient::connect(HaloConfig::from_env()?).await?;
    let aggregator = IssueAggregator::new(client, AggregatorConfig::new())?;

    let result = if full {
        aggregator.describe_all_issues(&since).await?
    } else {
        aggregator.issues_touched_since(&since).await?
    };

    println!("Issues touched since {}: {}", since, result.len());
    for summary in &result.summaries {
        println!(
            "  {:<8} pages={} fetched={} truncated={}",
            summary.status, summary.pages, summary.fetched, summary.truncated
        );
    }
    for warning in result.truncation_warnings() {
        println!("  warning: {}", warning);
    }

    for issue in &result.issues {
        println!(
            "{}  {:<8}  {}  {}",
            issue.id,
            issue.status,
            issue.touched_at().format("%Y-%m-%d %H:%M:%S"),
            issue.name.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}
