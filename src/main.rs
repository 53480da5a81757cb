use anyhow::Result;
use clap::Parser;

use content_audit::cli::{self, Cli};
use content_audit::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    logging::init();

    let cli = Cli::parse();
    cli::execute(cli).await
}
