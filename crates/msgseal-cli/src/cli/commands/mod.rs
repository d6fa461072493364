pub mod container;
pub mod decode;

use super::args::{Cli, Command};
use crate::config::CliConfig;
use crate::exit_codes;
use msgseal_core::EnvelopeError;
use serde_json::json;

pub fn dispatch(cli: Cli) -> anyhow::Result<i32> {
    let config = CliConfig::load(cli.config.as_deref())?;
    match cli.cmd {
        Command::Decode(args) => decode::run(args, &config),
        Command::Container(args) => container::run(args, &config),
    }
}

/// Print a rejected message or container as JSON and map it to the validation exit code.
pub(crate) fn report_rejection(err: &EnvelopeError) -> anyhow::Result<i32> {
    tracing::debug!(error = ?err, "rejected");
    print_json(&json!({
        "status": "rejected",
        "class": err.class(),
        "code": err.code(),
        "message": err.message,
    }))?;
    Ok(exit_codes::VALIDATION_FAILED)
}

pub(crate) fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
