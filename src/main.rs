use clap::Parser;
use mirror_lib::commands::{cmd_mirror, mirror::build_store, Cli};
use mirror_lib::error::MirrorError;
use mirror_lib::sync::SyncReport;
use std::process::ExitCode;

fn init_logging() {
    // RUST_LOG overrides the default level.
    if let Err(e) = simple_logger::SimpleLogger::new()
        .with_level(log::LevelFilter::Warn)
        .env()
        .init()
    {
        eprintln!("Logger init failed: {}", e);
    }
}

async fn run(cli: Cli) -> Result<SyncReport, MirrorError> {
    let json = cli.json;
    let resolved = cli.resolve()?;
    let store = build_store(&resolved).await;
    let report = cmd_mirror(resolved, store).await?;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| MirrorError::Io(format!("Cannot serialize report: {}", e)))?;
        println!("{}", out);
    }

    Ok(report)
}

#[tokio::main]
async fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(report) => {
            if report.has_failures() {
                eprintln!(
                    "Mirror finished with {} upload and {} delete failure(s)",
                    report.upload_failures.len(),
                    report.delete_failures.len()
                );
            }
            ExitCode::from(report.exit_code() as u8)
        }
        Err(e) => {
            eprintln!("Error [{}]: {}", e.code(), e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
