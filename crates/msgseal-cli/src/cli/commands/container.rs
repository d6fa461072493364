use super::super::args::{ContainerArgs, ContainerFileArgs, ContainerSub, PackArgs};
use super::decode::decode_file;
use super::{print_json, report_rejection};
use crate::config::CliConfig;
use crate::exit_codes;
use anyhow::Context;
use msgseal_container::{verify_container, ContainerCodec, ContainerNaming, EnvelopeContainer};
use msgseal_core::{AlgorithmRegistry, ContainerEntry, EnvelopeError, PartCatalog};
use serde_json::json;
use std::fs::File;
use std::io::BufReader;

pub fn run(args: ContainerArgs, config: &CliConfig) -> anyhow::Result<i32> {
    match args.cmd {
        ContainerSub::Inspect(a) => cmd_inspect(a, config),
        ContainerSub::Verify(a) => cmd_verify(a, config),
        ContainerSub::Pack(a) => cmd_pack(a, config),
    }
}

fn open(
    args: &ContainerFileArgs,
    config: &CliConfig,
) -> anyhow::Result<Result<EnvelopeContainer, EnvelopeError>> {
    let file = File::open(&args.file)
        .with_context(|| format!("failed to open container: {}", args.file.display()))?;
    let catalog = PartCatalog::standard();
    let registry = AlgorithmRegistry::standard();
    let codec = ContainerCodec::new(&catalog, &registry, config.container.clone())
        .context("invalid container configuration")?;
    Ok(codec.read_seekable(BufReader::new(file)))
}

fn cmd_inspect(args: ContainerFileArgs, config: &CliConfig) -> anyhow::Result<i32> {
    let container = match open(&args, config)? {
        Ok(c) => c,
        Err(err) => return report_rejection(&err),
    };
    let entries: Vec<&str> = [
        ContainerEntry::Mimetype,
        ContainerEntry::Message,
        ContainerEntry::Signature,
        ContainerEntry::SignatureHashChainResult,
        ContainerEntry::SignatureHashChain,
        ContainerEntry::Timestamp,
        ContainerEntry::TimestampHashChainResult,
        ContainerEntry::TimestampHashChain,
    ]
    .into_iter()
    .filter(|e| container.text(*e).is_some())
    .map(ContainerEntry::name)
    .collect();

    print_json(&json!({
        "status": "ok",
        "entries": entries,
        "batch_signature": container.is_batch_signature(),
        "batch_timestamp": container.is_batch_timestamp(),
        "timestamp": container.timestamp().is_some(),
        "attachment_digest": container.attachment_digest().map(hex::encode),
        "asic_manifest": container.asic_manifest().is_some(),
    }))?;
    Ok(exit_codes::SUCCESS)
}

fn cmd_verify(args: ContainerFileArgs, config: &CliConfig) -> anyhow::Result<i32> {
    let container = match open(&args, config)? {
        Ok(c) => c,
        Err(err) => return report_rejection(&err),
    };
    if let Err(err) = verify_container(&container) {
        return report_rejection(&err);
    }
    eprintln!("container verify: OK ({})", args.file.display());
    Ok(exit_codes::SUCCESS)
}

fn cmd_pack(args: PackArgs, config: &CliConfig) -> anyhow::Result<i32> {
    let mut decoded = match decode_file(&args.file, &args.content_type, false, config)? {
        Ok(decoded) => decoded,
        Err(err) => return report_rejection(&err),
    };

    let catalog = PartCatalog::standard();
    let registry = AlgorithmRegistry::standard();
    let codec = ContainerCodec::new(&catalog, &registry, config.container.clone())
        .context("invalid container configuration")?;
    let mut container =
        match EnvelopeContainer::from_envelope(&mut decoded.envelope, &registry, &config.container) {
            Ok(c) => c,
            Err(err) => return report_rejection(&err),
        };

    let naming = ContainerNaming::new(&config.container);
    let (path, file) = naming
        .create_file(&args.out, &args.query_id, args.kind.into())
        .with_context(|| format!("failed to create container in {}", args.out.display()))?;
    if let Err(err) = codec.write(&mut container, file) {
        // Do not leave a truncated archive behind.
        let _ = std::fs::remove_file(&path);
        return Err(anyhow::Error::new(err).context(format!("failed to write {}", path.display())));
    }
    tracing::info!(path = %path.display(), "container stored");

    print_json(&json!({
        "status": "ok",
        "path": path.display().to_string(),
        "batch_signature": container.is_batch_signature(),
        "attachment": container.has_attachment(),
    }))?;
    Ok(exit_codes::SUCCESS)
}
