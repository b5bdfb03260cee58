//! Ping command handler

use std::process::ExitCode;

use anyhow::Result;
use colored::*;
use grader_runner::{RunnerConfig, RuntimeSession};

/// Opens and closes a session against the configured runtime
pub async fn handle_ping(config: RunnerConfig) -> Result<ExitCode> {
    match RuntimeSession::connect(&config).await {
        Ok(session) => {
            println!(
                "{} {} is reachable",
                "✓".green().bold(),
                config.runtime.to_string().bold()
            );
            session.close().await;
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!(
                "{} {} is not reachable: {}",
                "✗".red().bold(),
                config.runtime.to_string().bold(),
                e
            );
            Ok(ExitCode::from(super::EXIT_FAILED))
        }
    }
}
