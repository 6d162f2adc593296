use std::path::PathBuf;
use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use autotest_stub_service::{serve, StubCorpus};

#[derive(Parser)]
#[command(
    name = "autotest-stub-service",
    version,
    about = "Serve an SDK testing-service corpus over HTTP"
)]
struct Cli {
    /// Port to listen on
    #[arg(long, default_value = "8090")]
    port: u16,

    /// Corpus JSON file
    #[arg(long)]
    corpus: PathBuf,

    /// Log filter directives
    #[arg(long, default_value = "info")]
    log: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&cli.log).unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let corpus = match StubCorpus::from_file(&cli.corpus) {
        Ok(corpus) => corpus,
        Err(e) => {
            eprintln!("error: {}", e);
            process::exit(1);
        }
    };

    if let Err(e) = serve(corpus, cli.port).await {
        eprintln!("error: server failed: {}", e);
        process::exit(1);
    }
}
