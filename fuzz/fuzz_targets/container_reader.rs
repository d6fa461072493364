#![no_main]

use libfuzzer_sys::fuzz_target;
use msgseal_container::{verify_container, ContainerCodec, ContainerConfig};
use msgseal_core::{AlgorithmRegistry, PartCatalog};

fuzz_target!(|data: &[u8]| {
    let catalog = PartCatalog::standard();
    let registry = AlgorithmRegistry::standard();
    let config = ContainerConfig {
        max_entry_bytes: 1 << 20,
        ..Default::default()
    };
    let Ok(codec) = ContainerCodec::new(&catalog, &registry, config) else {
        return;
    };
    if let Ok(container) = codec.read_seekable(std::io::Cursor::new(data)) {
        let _ = verify_container(&container);
        let _ = container.timestamp_token();
    }
    let _ = codec.read_stream(data);
});
