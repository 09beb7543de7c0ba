use clap::Parser;
use kiln::cli::Cli;
use std::process::ExitCode;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();
    kiln::cli::run(cli.command).await
}

/// Write to `kiln.log` if `KILN_LOG` is set, else to stderr filtered by
/// `RUST_LOG` (default `kiln=info`).
fn init_logging() {
    use tracing_subscriber::EnvFilter;

    if std::env::var("KILN_LOG").is_ok() {
        use std::fs::File;
        use tracing_subscriber::prelude::*;
        match File::create("kiln.log") {
            Ok(file) => {
                let file_layer = tracing_subscriber::fmt::layer()
                    .with_writer(file)
                    .with_ansi(false);
                let filter = EnvFilter::new("kiln=debug");
                let _ = tracing_subscriber::registry()
                    .with(file_layer.with_filter(filter))
                    .try_init();
            }
            Err(err) => {
                eprintln!("Failed to create log file: {err}");
            }
        }
    } else {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("kiln=info"));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}
