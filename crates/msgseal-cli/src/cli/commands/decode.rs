use super::super::args::DecodeArgs;
use super::{print_json, report_rejection};
use crate::config::CliConfig;
use crate::exit_codes;
use anyhow::Context;
use msgseal_core::{
    AlgorithmRegistry, ContentType, Envelope, EnvelopeCollector, EnvelopeDecoder, EnvelopeError,
    Fault, PartCatalog, PartDigests,
};
use serde_json::{json, Value};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// A decoded message with its part digests.
pub(crate) struct Decoded {
    pub envelope: Envelope,
    pub digests: PartDigests,
    pub fault: Option<Fault>,
}

pub fn run(args: DecodeArgs, config: &CliConfig) -> anyhow::Result<i32> {
    let decoded = match decode_file(&args.file, &args.content_type, args.allow_faults, config)? {
        Ok(decoded) => decoded,
        Err(err) => return report_rejection(&err),
    };
    print_json(&report(&decoded))?;
    Ok(exit_codes::SUCCESS)
}

/// Decode a wire message from `path`.
///
/// The outer error covers unusable input (missing file, bad content-type
/// argument, bad config); the inner one a rejected message.
pub(crate) fn decode_file(
    path: &Path,
    content_type: &str,
    allow_faults: bool,
    config: &CliConfig,
) -> anyhow::Result<Result<Decoded, EnvelopeError>> {
    let content_type = ContentType::parse(content_type)
        .with_context(|| format!("invalid --content-type '{}'", content_type))?;
    let file = File::open(path).with_context(|| format!("failed to open message: {}", path.display()))?;

    let catalog = PartCatalog::standard();
    let registry = AlgorithmRegistry::standard();
    let decoder = EnvelopeDecoder::new(&catalog, &registry, config.envelope.clone())
        .context("invalid envelope configuration")?;
    let mut collector = EnvelopeCollector::new(config.envelope.spool_threshold);

    let digests = match decoder.decode(BufReader::new(file), &content_type, allow_faults, &mut collector) {
        Ok(digests) => digests,
        Err(err) => return Ok(Err(err)),
    };
    let fault = collector.fault().cloned();
    Ok(collector.into_envelope().map(|envelope| Decoded {
        envelope,
        digests,
        fault,
    }))
}

fn report(decoded: &Decoded) -> Value {
    let envelope = &decoded.envelope;
    let attachments: Vec<Value> = envelope
        .attachments()
        .iter()
        .enumerate()
        .map(|(i, a)| {
            json!({
                "index": i + 1,
                "content_type": a.content_type.to_string(),
                "bytes": a.body.len(),
                "spilled": a.body.is_spilled(),
            })
        })
        .collect();
    let digests: Vec<Value> = decoded
        .digests
        .iter()
        .map(|d| {
            json!({
                "name": d.name.to_string(),
                "algorithm": d.algorithm,
                "digest": hex::encode(&d.digest),
            })
        })
        .collect();
    let fault = decoded.fault.as_ref().map(|f| {
        json!({
            "code": f.fault_code(),
            "string": f.fault_string(),
        })
    });

    let status = if fault.is_some() { "fault" } else { "ok" };
    json!({
        "status": status,
        "payload_kind": envelope.payload().kind(),
        "batch_signature": envelope.is_batch_signature(),
        "ocsp_responses": envelope.ocsp_responses().len(),
        "rest_body_bytes": envelope.rest_body().map(|b| b.len()),
        "attachments": attachments,
        "fault": fault,
        "digests": digests,
    })
}
