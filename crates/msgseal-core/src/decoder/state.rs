//! The decoder grammar as a pure transition function.
//!
//! Optional parts are handled by ordered fallthrough: a part that does not
//! match the current state is retried against the next state. States only
//! ever move forward, so a part can never be reinterpreted as belonging
//! earlier in the grammar.

use crate::catalog::WirePart;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum DecoderState {
    #[default]
    ExpectOcsp,
    ExpectPayload,
    /// Only entered after a REST payload.
    ExpectRestBody,
    ExpectAttachments,
    ExpectHashChainResult,
    ExpectHashChain,
    ExpectSignature,
    Done,
}

/// What to do with an accepted part.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Ocsp,
    Payload(WirePart),
    RestBody,
    Attachments,
    HashChainResult,
    HashChain,
    Signature,
    /// Plain XML at the signature position.
    Fault,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The payload position holds something that is not a payload.
    InvalidPayload,
    /// A hash-chain result was not followed by a hash chain.
    HashChainPair,
    /// The signature position holds something other than a signature or fault.
    UnexpectedPart,
    /// A part arrived after the signature.
    TrailingContent,
    /// The stream ended before a payload.
    MissingPayload,
    /// The stream ended before a signature.
    MissingSignature,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Accept { next: DecoderState, action: Action },
    Reject { at: DecoderState, reason: Rejection },
}

/// Decide what a part of kind `part` means in `state`. Unknown content types
/// are passed as `None`.
pub fn transition(state: DecoderState, part: Option<WirePart>) -> Transition {
    use DecoderState::*;

    let mut state = state;
    loop {
        state = match (state, part) {
            (ExpectOcsp, Some(WirePart::OcspResponse)) => {
                return accept(ExpectOcsp, Action::Ocsp);
            }
            (ExpectOcsp, _) => ExpectPayload,

            (ExpectPayload, Some(p @ (WirePart::Xml | WirePart::XopPayload))) => {
                return accept(ExpectAttachments, Action::Payload(p));
            }
            (ExpectPayload, Some(p @ (WirePart::RestRequest | WirePart::RestResponse))) => {
                return accept(ExpectRestBody, Action::Payload(p));
            }
            (ExpectPayload, _) => return reject(ExpectPayload, Rejection::InvalidPayload),

            (ExpectRestBody, Some(WirePart::RestBody)) => {
                return accept(ExpectAttachments, Action::RestBody);
            }
            (ExpectRestBody, _) => ExpectAttachments,

            (ExpectAttachments, Some(WirePart::Attachments)) => {
                return accept(ExpectHashChainResult, Action::Attachments);
            }
            (ExpectAttachments, _) => ExpectHashChainResult,

            (ExpectHashChainResult, Some(WirePart::HashChainResult)) => {
                return accept(ExpectHashChain, Action::HashChainResult);
            }
            (ExpectHashChainResult, _) => ExpectSignature,

            (ExpectHashChain, Some(WirePart::HashChain)) => {
                return accept(ExpectSignature, Action::HashChain);
            }
            (ExpectHashChain, _) => return reject(ExpectHashChain, Rejection::HashChainPair),

            (ExpectSignature, Some(WirePart::Signature)) => return accept(Done, Action::Signature),
            (ExpectSignature, Some(WirePart::Xml)) => return accept(Done, Action::Fault),
            (ExpectSignature, _) => return reject(ExpectSignature, Rejection::UnexpectedPart),

            (Done, _) => return reject(Done, Rejection::TrailingContent),
        };
    }
}

/// Check that the stream may end in `state`.
pub fn at_end(state: DecoderState) -> Result<(), Rejection> {
    match state {
        DecoderState::ExpectOcsp | DecoderState::ExpectPayload => Err(Rejection::MissingPayload),
        DecoderState::ExpectHashChain => Err(Rejection::HashChainPair),
        DecoderState::Done => Ok(()),
        _ => Err(Rejection::MissingSignature),
    }
}

fn accept(next: DecoderState, action: Action) -> Transition {
    Transition::Accept { next, action }
}

fn reject(at: DecoderState, reason: Rejection) -> Transition {
    Transition::Reject { at, reason }
}
