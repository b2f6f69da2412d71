use clap::Parser;

use codeforge_lib::HostOptions;

/// Chat with a coding assistant that edits a small web project and keeps a
/// composed preview of it on disk.
#[derive(Parser, Debug)]
#[command(name = "codeforge", version, about)]
struct Args {
    /// Project to open, created from the starter template if it does not exist
    #[arg(short, long, default_value = "untitled")]
    project: String,

    /// Emit session events as JSON lines on stdout
    #[arg(long)]
    json: bool,
}

fn log_filter() -> tracing_subscriber::EnvFilter {
    let level = if let Ok(v) = std::env::var("RUST_LOG") {
        v
    } else if let Ok(v) = std::env::var("CODEFORGE_LOG") {
        match v.as_str() {
            "silent" => "off".to_string(),
            other => other.to_string(),
        }
    } else {
        "warn".to_string()
    };

    tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    codeforge_lib::run(HostOptions {
        project: args.project,
        json: args.json,
    })
    .await
}
