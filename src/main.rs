use card_sales_sync::Cli;
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    card_sales_sync::commands::run(Cli::parse()).await
}
