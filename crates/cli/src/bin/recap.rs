use anyhow::Result;

#[tokio::main]
async fn main() -> Result<()> {
    recap_cli::main_entry().await
}
