//! ou-reversion - Ornstein-Uhlenbeck estimation and mean reversion backtesting

use anyhow::Result;

use ou_reversion::adapters::cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (OU_DATA_PATH and RUST_LOG may live here)
    dotenvy::dotenv().ok();

    let app = cli::init();
    cli::execute(app).await
}
