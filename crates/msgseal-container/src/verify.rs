use crate::container::EnvelopeContainer;
use msgseal_core::{ContainerEntry, EnvelopeError, EnvelopeResult};

/// Check that the manifests stored in a read archive match the ones
/// regenerated from its entries.
///
/// The ASiC manifest is only checked for batch timestamps; other
/// containers must not carry one.
pub fn verify_container(container: &EnvelopeContainer) -> EnvelopeResult<()> {
    compare(
        ContainerEntry::Manifest,
        container.stored_manifest(ContainerEntry::Manifest),
        Some(container.manifest()),
    )?;
    compare(
        ContainerEntry::AsicManifest,
        container.stored_manifest(ContainerEntry::AsicManifest),
        container.asic_manifest(),
    )?;
    tracing::debug!(
        batch_signature = container.is_batch_signature(),
        batch_timestamp = container.is_batch_timestamp(),
        "container manifests verified"
    );
    Ok(())
}

fn compare(entry: ContainerEntry, stored: Option<&str>, expected: Option<&str>) -> EnvelopeResult<()> {
    let failure = match (stored, expected) {
        (None, None) => return Ok(()),
        (Some(s), Some(e)) if s.trim() == e.trim() => return Ok(()),
        (None, Some(_)) => "is absent",
        (Some(_), None) => "is present but not expected",
        (Some(_), Some(_)) => "does not match the container entries",
    };
    let err = EnvelopeError::invalid_message(format!("stored '{}' {}", entry.name(), failure));
    tracing::warn!(entry = entry.name(), error = %err, "container integrity check failed");
    Err(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compare_outcomes() {
        assert!(compare(ContainerEntry::AsicManifest, None, None).is_ok());
        assert!(compare(ContainerEntry::Manifest, Some("<m/>\n"), Some("<m/>")).is_ok());
        let err = compare(ContainerEntry::Manifest, Some("<m/>"), Some("<n/>")).unwrap_err();
        assert!(err.message.contains("META-INF/manifest.xml"), "{}", err);
        assert!(compare(ContainerEntry::Manifest, None, Some("<m/>")).is_err());
        assert!(compare(ContainerEntry::AsicManifest, Some("<a/>"), None).is_err());
    }
}
