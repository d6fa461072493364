//! ZIP serialization of [`EnvelopeContainer`].
//!
//! Writing emits the canonical entry order with `mimetype` first and stored.
//! Reading goes through the central directory; a single-pass reader over the
//! local headers is available for archives that carry sizes up front.

use crate::config::ContainerConfig;
use crate::container::EnvelopeContainer;
use crate::error::archive_error;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Datelike, Timelike, Utc};
use msgseal_core::catalog::mime;
use msgseal_core::digest::DigestingReader;
use msgseal_core::io::{drain, read_bytes_bounded, read_text_bounded};
use msgseal_core::{
    AlgorithmRegistry, AttachmentBody, ContainerEntry, EnvelopeError, EnvelopeResult, ErrorCode,
    PartCatalog,
};
use std::collections::BTreeMap;
use std::io::{self, Read, Seek, Write};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Archive comment identifying the container type to generic ZIP tools.
const ARCHIVE_COMMENT: &str = "mimetype=application/vnd.etsi.asic-e+zip";

pub struct ContainerCodec<'a> {
    catalog: &'a PartCatalog,
    registry: &'a AlgorithmRegistry,
    config: ContainerConfig,
}

impl<'a> ContainerCodec<'a> {
    /// Fails if the configured manifest digest algorithm is not registered.
    pub fn new(
        catalog: &'a PartCatalog,
        registry: &'a AlgorithmRegistry,
        config: ContainerConfig,
    ) -> EnvelopeResult<Self> {
        if !registry.supports(&config.manifest_digest_algorithm) {
            return Err(EnvelopeError::new(
                ErrorCode::UnsupportedAlgorithm,
                format!(
                    "manifest digest algorithm '{}' is not registered",
                    config.manifest_digest_algorithm
                ),
            ));
        }
        Ok(Self {
            catalog,
            registry,
            config,
        })
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// Write `container` as a ZIP archive and return the sink.
    ///
    /// A container read from an archive holds only its attachment digest
    /// and cannot be written back; that is an `EncoderSequence` error.
    pub fn write<W: Write + Seek>(
        &self,
        container: &mut EnvelopeContainer,
        out: W,
    ) -> EnvelopeResult<W> {
        if container.has_attachment() && container.attachment_mut().is_none() {
            return Err(EnvelopeError::sequence(
                "container holds only the attachment digest; the attachment body is needed to write it",
            ));
        }
        let modified = zip_time(container.creation_time());
        let stored = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Stored)
            .last_modified_time(modified);
        let deflated = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(modified);

        let mut zip = ZipWriter::new(out);
        zip.set_comment(ARCHIVE_COMMENT);

        let mut written = 0usize;
        for spec in self.catalog.entries() {
            let name = spec.name;
            match spec.entry {
                ContainerEntry::Mimetype => {
                    zip.start_file(name, stored)
                        .map_err(|e| archive_error(e, name))?;
                    zip.write_all(mime::ASIC_CONTAINER.as_bytes())?;
                }
                ContainerEntry::TimestampBase64 => continue,
                ContainerEntry::Timestamp => {
                    let Some(b64) = container.text(ContainerEntry::Timestamp) else {
                        continue;
                    };
                    let token = STANDARD.decode(b64.trim()).map_err(|e| {
                        EnvelopeError::new(
                            ErrorCode::MalformedPayload,
                            format!("timestamp entry is not valid base64: {}", e),
                        )
                    })?;
                    zip.start_file(name, deflated)
                        .map_err(|e| archive_error(e, name))?;
                    zip.write_all(&token)?;
                }
                ContainerEntry::Attachment => {
                    let Some(body) = container.attachment_mut() else {
                        continue;
                    };
                    zip.start_file(name, deflated)
                        .map_err(|e| archive_error(e, name))?;
                    io::copy(body.reader()?, &mut zip)?;
                }
                entry => {
                    let Some(text) = container.text(entry) else {
                        continue;
                    };
                    zip.start_file(name, deflated)
                        .map_err(|e| archive_error(e, name))?;
                    zip.write_all(text.as_bytes())?;
                }
            }
            written += 1;
        }

        let out = zip
            .finish()
            .map_err(|e| archive_error(e, "finishing container"))?;
        tracing::debug!(entries = written, "container written");
        Ok(out)
    }

    /// Read a container from any byte source.
    ///
    /// The input is spooled (to disk past `spool_threshold`) and then read
    /// through the central directory, so archives whose entry sizes live
    /// in trailing data descriptors are accepted. Unknown entries are
    /// skipped with a warning. The attachment is not kept; only its digest
    /// under the manifest algorithm is recorded.
    pub fn read<R: Read>(&self, mut reader: R) -> EnvelopeResult<EnvelopeContainer> {
        let mut spool = AttachmentBody::from_reader(&mut reader, self.config.spool_threshold)?;
        tracing::debug!(bytes = spool.len(), spilled = spool.is_spilled(), "container spooled");
        self.read_seekable(spool.reader()?)
    }

    /// Read a container through its central directory.
    pub fn read_seekable<R: Read + Seek>(&self, reader: R) -> EnvelopeResult<EnvelopeContainer> {
        let mut archive = ZipArchive::new(reader).map_err(|e| archive_error(e, "opening container"))?;
        let mut state = ReadState::default();
        for index in 0..archive.len() {
            let mut file = archive
                .by_index(index)
                .map_err(|e| archive_error(e, "reading container entry"))?;
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            self.read_entry(&mut state, &name, &mut file)?;
        }
        self.finish_read(state)
    }

    /// Single pass over the local headers, for pipes and sockets.
    ///
    /// Every entry must carry its sizes in the local header. Archives
    /// written by streaming ZIP writers with data descriptors need
    /// [`ContainerCodec::read`] instead.
    pub fn read_stream<R: Read>(&self, mut reader: R) -> EnvelopeResult<EnvelopeContainer> {
        let mut state = ReadState::default();
        loop {
            let next = zip::read::read_zipfile_from_stream(&mut reader)
                .map_err(|e| archive_error(e, "reading container entry"))?;
            let Some(mut file) = next else {
                break;
            };
            if file.is_dir() {
                continue;
            }
            let name = file.name().to_string();
            self.read_entry(&mut state, &name, &mut file)?;
        }
        self.finish_read(state)
    }

    fn read_entry<E: Read>(&self, state: &mut ReadState, name: &str, file: &mut E) -> EnvelopeResult<()> {
        let limit = self.config.max_entry_bytes;
        let Some(entry) = self.catalog.classify_entry(name) else {
            tracing::warn!(entry = %name, "skipping unknown container entry");
            drain(file)?;
            return Ok(());
        };

        match entry {
            ContainerEntry::Attachment => {
                if state.attachment_digest.is_some() {
                    return Err(EnvelopeError::new(
                        ErrorCode::AttachmentLimit,
                        format!("second attachment entry '{}' in container", name),
                    ));
                }
                let hasher = self.registry.hasher(&self.config.manifest_digest_algorithm)?;
                let mut digesting = DigestingReader::new(file, hasher);
                drain(&mut digesting)?;
                tracing::debug!(entry = %name, bytes = digesting.bytes_read(), "attachment digested");
                state.attachment_digest = Some(digesting.finish());
            }
            ContainerEntry::Timestamp => {
                let token = read_bytes_bounded(file, limit, "timestamp entry")?;
                insert_once(&mut state.entries, entry, STANDARD.encode(token), name);
            }
            ContainerEntry::Manifest | ContainerEntry::AsicManifest => {
                let text = read_text_bounded(file, limit, "manifest entry")?;
                insert_once(&mut state.manifests, entry, text, name);
            }
            other => {
                let text = read_text_bounded(file, limit, "container entry")
                    .map_err(|e| e.with_context(name.to_string()))?;
                insert_once(&mut state.entries, other, text, name);
            }
        }
        Ok(())
    }

    fn finish_read(&self, state: ReadState) -> EnvelopeResult<EnvelopeContainer> {
        EnvelopeContainer::from_stored(
            state.entries,
            state.manifests,
            state.attachment_digest,
            self.registry,
            &self.config,
        )
    }
}

/// Entries collected while reading one archive.
#[derive(Default)]
struct ReadState {
    entries: BTreeMap<ContainerEntry, String>,
    manifests: BTreeMap<ContainerEntry, String>,
    attachment_digest: Option<Vec<u8>>,
}

/// First occurrence wins; later duplicates are ignored.
fn insert_once(
    map: &mut BTreeMap<ContainerEntry, String>,
    entry: ContainerEntry,
    value: String,
    name: &str,
) {
    if map.contains_key(&entry) {
        tracing::warn!(entry = %name, "ignoring duplicate container entry");
        return;
    }
    map.insert(entry, value);
}

/// ZIP timestamps cover 1980..=2107; anything else falls back to the format default.
fn zip_time(at: DateTime<Utc>) -> zip::DateTime {
    u16::try_from(at.year())
        .ok()
        .and_then(|year| {
            zip::DateTime::from_date_and_time(
                year,
                at.month() as u8,
                at.day() as u8,
                at.hour() as u8,
                at.minute() as u8,
                at.second() as u8,
            )
            .ok()
        })
        .unwrap_or_default()
}
