//! Error types of the DIMSE layer.

use snafu::{Backtrace, Snafu};

use dicomnet_ul::pdu::Pdu;

/// An error which may occur while exchanging or dispatching DIMSE messages.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
#[non_exhaustive]
pub enum Error {
    /// a failure at the upper layer protocol level
    #[snafu(display("association failure: {}", source))]
    Association {
        #[snafu(backtrace)]
        source: dicomnet_ul::association::Error,
    },

    /// failed to encode a DIMSE command set
    #[snafu(display("failed to encode command set: {}", source))]
    EncodeCommand {
        #[snafu(backtrace)]
        source: crate::command::EncodeError,
    },

    /// failed to decode a DIMSE command set
    #[snafu(display("failed to decode command set: {}", source))]
    DecodeCommand {
        #[snafu(backtrace)]
        source: crate::command::DecodeError,
    },

    /// failed to encode a data set
    #[snafu(display("failed to encode data set: {}", source))]
    EncodeDataset {
        #[snafu(backtrace)]
        source: dicomnet_core::EncodeError,
    },

    /// cannot encode a data set under a transfer syntax
    /// which the core does not implement
    #[snafu(display("cannot encode data set in transfer syntax `{}`", uid))]
    UnsupportedTransferSyntax { uid: String, backtrace: Backtrace },

    /// no accepted presentation context for the requested SOP class
    #[snafu(display("no accepted presentation context for `{}`", sop_class_uid))]
    Negotiation {
        sop_class_uid: String,
        backtrace: Backtrace,
    },

    /// the peer responded with an unexpected DIMSE command
    #[snafu(display(
        "unexpected response command {:#06x} (expected {:#06x})",
        got,
        expected
    ))]
    UnexpectedResponseCommand {
        expected: u16,
        got: u16,
        backtrace: Backtrace,
    },

    /// an unexpected PDU arrived in the middle of a DIMSE exchange
    #[snafu(display("unexpected PDU during DIMSE exchange: `{}`", pdu.short_description()))]
    UnexpectedPdu { pdu: Box<Pdu>, backtrace: Backtrace },

    /// a data set fragment arrived before the command set was complete
    #[snafu(display("data set fragment arrived before the command set was complete"))]
    OutOfOrderFragment { backtrace: Backtrace },

    /// a fragment arrived on a different presentation context
    /// while another message was being assembled
    #[snafu(display(
        "presentation context changed mid-message (expected {}, got {})",
        expected,
        got
    ))]
    MixedPresentationContexts {
        expected: u8,
        got: u8,
        backtrace: Backtrace,
    },

    /// the accumulated message exceeds the admissible size
    #[snafu(display("DIMSE message too large ({} bytes accumulated)", length))]
    MessageTooLarge { length: usize, backtrace: Backtrace },

    /// a terminal response has already been emitted for this message
    #[snafu(display("a terminal response has already been sent"))]
    TerminalAlreadySent { backtrace: Backtrace },

    /// C-STORE sub-operations are only available while serving C-GET
    #[snafu(display("C-STORE sub-operations are not available for this operation"))]
    SubOperationsUnavailable { backtrace: Backtrace },

    /// the C-MOVE destination AE title could not be resolved
    #[snafu(display("unknown move destination `{}`", ae_title))]
    UnknownMoveDestination {
        ae_title: String,
        backtrace: Backtrace,
    },

    /// the peer aborted the association
    #[snafu(display("association aborted by peer ({:?})", source))]
    PeerAborted {
        #[snafu(source(false))]
        source: dicomnet_ul::pdu::AbortRQSource,
        backtrace: Backtrace,
    },

    /// a service handler failed
    #[snafu(display("service handler failed: {}", message))]
    HandlerFailure {
        message: String,
        backtrace: Backtrace,
    },

    /// the operation was cancelled
    #[snafu(display("operation cancelled"))]
    Cancelled { backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
