#![no_main]

use libfuzzer_sys::fuzz_target;
use msgseal_core::{
    AlgorithmRegistry, ContentType, DecodeLimits, EnvelopeCollector, EnvelopeConfig,
    EnvelopeDecoder, PartCatalog,
};

// First byte selects the outer content type and fault mode; the rest is the body.
fuzz_target!(|data: &[u8]| {
    let Some((&mode, body)) = data.split_first() else {
        return;
    };
    let content_type = if mode & 1 == 0 {
        ContentType::new("multipart/mixed").with_param("boundary", "b")
    } else {
        ContentType::new("text/xml")
    };
    let catalog = PartCatalog::standard();
    let registry = AlgorithmRegistry::standard();
    let config = EnvelopeConfig {
        spool_threshold: 4096,
        limits: DecodeLimits {
            max_text_part_bytes: 1 << 20,
            ..Default::default()
        },
        ..Default::default()
    };
    let Ok(decoder) = EnvelopeDecoder::new(&catalog, &registry, config) else {
        return;
    };
    let mut collector = EnvelopeCollector::new(4096);
    if decoder.decode(body, &content_type, mode & 2 != 0, &mut collector).is_ok() {
        let _ = collector.into_envelope();
    }
});
