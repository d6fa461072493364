use msgseal_core::{EnvelopeError, ErrorCode};
use zip::result::ZipError;

/// Map an archive codec failure onto the envelope taxonomy.
///
/// IO failures inside the archive keep their IO classification.
pub(crate) fn archive_error(err: ZipError, context: &str) -> EnvelopeError {
    match err {
        ZipError::Io(io) => EnvelopeError::from(io).with_context(context.to_string()),
        other => EnvelopeError::new(ErrorCode::Archive, format!("{}: {}", context, other))
            .with_source(other),
    }
}
