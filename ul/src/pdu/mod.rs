//! Protocol data unit module.
//!
//! This module comprises the data types for all PDUs of the upper layer
//! protocol, as well as the codec for reading and writing them
//! (see [`read_pdu`] and [`write_pdu`]).

use std::fmt;

pub mod reader;
pub mod writer;

pub use reader::{read_pdu, ReadError};
pub use writer::{write_pdu, WriteError};

/// The default maximum PDU length, in bytes.
pub const DEFAULT_MAX_PDU: u32 = 16_384;

/// The minimum value admitted for the maximum PDU length, in bytes.
pub const MINIMUM_PDU_SIZE: u32 = 4_096;

/// The absolute ceiling admitted for the maximum PDU length, in bytes.
/// PDUs larger than this are refused even in non-strict mode.
pub const MAXIMUM_PDU_SIZE: u32 = 131_072;

/// The length of the common PDU header (type + reserved + length), in bytes.
pub const PDU_HEADER_SIZE: u32 = 6;

/// The length of the PDV header (item length + context ID + control header),
/// in bytes.
pub const PDV_HEADER_SIZE: u32 = 6;

/// A presentation context proposed in an A-ASSOCIATE-RQ:
/// one abstract syntax with one or more transfer syntax candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContextProposed {
    /// the presentation context identifier, an odd number between 1 and 255
    pub id: u8,
    /// the proposed abstract syntax UID
    pub abstract_syntax: String,
    /// the proposed transfer syntax UIDs, in order of preference
    pub transfer_syntaxes: Vec<String>,
}

/// A presentation context result in an A-ASSOCIATE-AC.
///
/// `transfer_syntax` is only meaningful when `reason` is
/// [`Acceptance`](PresentationContextResultReason::Acceptance);
/// rejected contexts carry an empty string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContextResult {
    /// the presentation context identifier from the proposal
    pub id: u8,
    /// the outcome of the negotiation for this context
    pub reason: PresentationContextResultReason,
    /// the transfer syntax chosen by the acceptor
    pub transfer_syntax: String,
}

impl PresentationContextResult {
    /// Whether the presentation context was accepted.
    pub fn is_accepted(&self) -> bool {
        self.reason == PresentationContextResultReason::Acceptance
    }
}

/// A fully negotiated presentation context,
/// as retained by the association requester:
/// the accepted transfer syntax
/// together with the abstract syntax it was proposed for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContextNegotiated {
    /// the presentation context identifier
    pub id: u8,
    /// the abstract syntax from the proposal
    pub abstract_syntax: String,
    /// the transfer syntax chosen by the acceptor
    pub transfer_syntax: String,
}

/// The reason field of a presentation context result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentationContextResultReason {
    /// acceptance
    Acceptance = 0,
    /// user rejection
    UserRejection = 1,
    /// provider rejection, no reason given
    NoReason = 2,
    /// abstract syntax not supported
    AbstractSyntaxNotSupported = 3,
    /// no proposed transfer syntax supported
    TransferSyntaxesNotSupported = 4,
}

impl PresentationContextResultReason {
    /// Interpret the reason field from its wire representation.
    pub fn from(reason: u8) -> Option<Self> {
        match reason {
            0 => Some(PresentationContextResultReason::Acceptance),
            1 => Some(PresentationContextResultReason::UserRejection),
            2 => Some(PresentationContextResultReason::NoReason),
            3 => Some(PresentationContextResultReason::AbstractSyntaxNotSupported),
            4 => Some(PresentationContextResultReason::TransferSyntaxesNotSupported),
            _ => None,
        }
    }
}

/// The result field of an A-ASSOCIATE-RJ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationRJResult {
    /// rejected-permanent
    Permanent,
    /// rejected-transient
    Transient,
}

impl AssociationRJResult {
    /// Interpret the result field from its wire representation.
    pub fn from(value: u8) -> Option<Self> {
        match value {
            1 => Some(AssociationRJResult::Permanent),
            2 => Some(AssociationRJResult::Transient),
            _ => None,
        }
    }
}

/// The source and reason fields of an A-ASSOCIATE-RJ.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationRJSource {
    /// DICOM UL service-user
    ServiceUser(AssociationRJServiceUserReason),
    /// DICOM UL service-provider (ACSE related function)
    ServiceProviderAsce(AssociationRJServiceProviderAsceReason),
    /// DICOM UL service-provider (presentation related function)
    ServiceProviderPresentation(AssociationRJServiceProviderPresentationReason),
}

impl AssociationRJSource {
    /// Interpret the source and reason fields from their wire representation.
    pub fn from(source: u8, reason: u8) -> Option<Self> {
        match source {
            1 => {
                let reason = match reason {
                    1 => AssociationRJServiceUserReason::NoReasonGiven,
                    2 => AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
                    3 => AssociationRJServiceUserReason::CallingAETitleNotRecognized,
                    7 => AssociationRJServiceUserReason::CalledAETitleNotRecognized,
                    x @ (4..=6 | 8..=10) => AssociationRJServiceUserReason::Reserved(x),
                    _ => return None,
                };
                Some(AssociationRJSource::ServiceUser(reason))
            }
            2 => {
                let reason = match reason {
                    1 => AssociationRJServiceProviderAsceReason::NoReasonGiven,
                    2 => AssociationRJServiceProviderAsceReason::ProtocolVersionNotSupported,
                    _ => return None,
                };
                Some(AssociationRJSource::ServiceProviderAsce(reason))
            }
            3 => {
                let reason = match reason {
                    1 => AssociationRJServiceProviderPresentationReason::TemporaryCongestion,
                    2 => AssociationRJServiceProviderPresentationReason::LocalLimitExceeded,
                    x @ (0 | 3..=7) => AssociationRJServiceProviderPresentationReason::Reserved(x),
                    _ => return None,
                };
                Some(AssociationRJSource::ServiceProviderPresentation(reason))
            }
            _ => None,
        }
    }
}

impl fmt::Display for AssociationRJSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            AssociationRJSource::ServiceUser(r) => write!(f, "by the service user: {:?}", r),
            AssociationRJSource::ServiceProviderAsce(r) => {
                write!(f, "by the service provider (ACSE): {:?}", r)
            }
            AssociationRJSource::ServiceProviderPresentation(r) => {
                write!(f, "by the service provider (presentation): {:?}", r)
            }
        }
    }
}

/// A-ASSOCIATE-RJ reasons when the source is the service user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationRJServiceUserReason {
    /// no-reason-given
    NoReasonGiven,
    /// application-context-name-not-supported
    ApplicationContextNameNotSupported,
    /// calling-AE-title-not-recognized
    CallingAETitleNotRecognized,
    /// called-AE-title-not-recognized
    CalledAETitleNotRecognized,
    /// reserved values
    Reserved(u8),
}

/// A-ASSOCIATE-RJ reasons when the source is
/// the service provider (ACSE related function).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationRJServiceProviderAsceReason {
    /// no-reason-given
    NoReasonGiven,
    /// protocol-version-not-supported
    ProtocolVersionNotSupported,
}

/// A-ASSOCIATE-RJ reasons when the source is
/// the service provider (presentation related function).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationRJServiceProviderPresentationReason {
    /// temporary-congestion
    TemporaryCongestion,
    /// local-limit-exceeded
    LocalLimitExceeded,
    /// reserved values
    Reserved(u8),
}

/// A single presentation data value inside a P-DATA-TF PDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PDataValue {
    /// the presentation context that the fragment belongs to
    pub presentation_context_id: u8,
    /// whether the fragment carries command or data set bytes
    pub value_type: PDataValueType,
    /// whether this is the last fragment of its stream
    pub is_last: bool,
    /// the fragment bytes
    pub data: Vec<u8>,
}

/// Whether a presentation data value fragment
/// carries command or data set bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PDataValueType {
    /// message command information
    Command,
    /// message data set information
    Data,
}

/// The source (and provider reason) of an A-ABORT.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortRQSource {
    /// DICOM UL service-user initiated abort
    ServiceUser,
    /// DICOM UL service-provider initiated abort
    ServiceProvider(AbortRQServiceProviderReason),
    /// reserved source value
    Reserved,
}

impl AbortRQSource {
    /// Interpret the source and reason fields from their wire representation.
    pub fn from(source: u8, reason: u8) -> Option<Self> {
        match source {
            0 => Some(AbortRQSource::ServiceUser),
            1 => Some(AbortRQSource::Reserved),
            2 => {
                let reason = match reason {
                    0 => AbortRQServiceProviderReason::ReasonNotSpecified,
                    1 => AbortRQServiceProviderReason::UnrecognizedPdu,
                    2 => AbortRQServiceProviderReason::UnexpectedPdu,
                    3 => AbortRQServiceProviderReason::Reserved,
                    4 => AbortRQServiceProviderReason::UnrecognizedPduParameter,
                    5 => AbortRQServiceProviderReason::UnexpectedPduParameter,
                    6 => AbortRQServiceProviderReason::InvalidPduParameter,
                    _ => return None,
                };
                Some(AbortRQSource::ServiceProvider(reason))
            }
            _ => None,
        }
    }
}

/// A-ABORT reasons when the source is the service provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortRQServiceProviderReason {
    /// reason-not-specified
    ReasonNotSpecified,
    /// unrecognized-PDU
    UnrecognizedPdu,
    /// unexpected-PDU
    UnexpectedPdu,
    /// reserved
    Reserved,
    /// unrecognized-PDU-parameter
    UnrecognizedPduParameter,
    /// unexpected-PDU-parameter
    UnexpectedPduParameter,
    /// invalid-PDU-parameter value
    InvalidPduParameter,
}

/// A sub-item of the user information item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserVariableItem {
    /// Maximum Length (`0x51`):
    /// the maximum PDU length that the sender is able to receive
    MaxLength(u32),
    /// Implementation Class UID (`0x52`)
    ImplementationClassUID(String),
    /// Implementation Version Name (`0x55`)
    ImplementationVersionName(String),
    /// an unrecognized sub-item, carried opaquely
    Unknown(u8, Vec<u8>),
}

/// A variable item of an association PDU.
#[derive(Debug, Clone, PartialEq)]
pub enum PduVariableItem {
    /// an unrecognized item type
    Unknown(u8),
    /// Application Context (`0x10`)
    ApplicationContext(String),
    /// Presentation Context proposal (`0x20`)
    PresentationContextProposed(PresentationContextProposed),
    /// Presentation Context result (`0x21`)
    PresentationContextResult(PresentationContextResult),
    /// User Information (`0x50`)
    UserVariables(Vec<UserVariableItem>),
}

/// The fields of an A-ASSOCIATE-RQ PDU.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRQ {
    /// the protocol version (only bit 0 is meaningful)
    pub protocol_version: u16,
    /// the source application entity title
    pub calling_ae_title: String,
    /// the destination application entity title
    pub called_ae_title: String,
    /// the application context name
    pub application_context_name: String,
    /// the proposed presentation contexts
    pub presentation_contexts: Vec<PresentationContextProposed>,
    /// the user information sub-items
    pub user_variables: Vec<UserVariableItem>,
}

/// The fields of an A-ASSOCIATE-AC PDU.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationAC {
    /// the protocol version (only bit 0 is meaningful)
    pub protocol_version: u16,
    /// the source application entity title, echoed from the request
    pub calling_ae_title: String,
    /// the destination application entity title, echoed from the request
    pub called_ae_title: String,
    /// the application context name
    pub application_context_name: String,
    /// the presentation context results
    pub presentation_contexts: Vec<PresentationContextResult>,
    /// the user information sub-items
    pub user_variables: Vec<UserVariableItem>,
}

/// The fields of an A-ASSOCIATE-RJ PDU.
#[derive(Debug, Clone, PartialEq)]
pub struct AssociationRJ {
    /// whether the rejection is permanent or transient
    pub result: AssociationRJResult,
    /// the source and reason of the rejection
    pub source: AssociationRJSource,
}

/// An upper layer protocol data unit.
#[derive(Debug, Clone, PartialEq)]
pub enum Pdu {
    /// A PDU of an unrecognized type, carried opaquely.
    Unknown {
        /// the PDU type code
        pdu_type: u8,
        /// the PDU body
        data: Vec<u8>,
    },
    /// A-ASSOCIATE-RQ (type `0x01`)
    AssociationRQ(AssociationRQ),
    /// A-ASSOCIATE-AC (type `0x02`)
    AssociationAC(AssociationAC),
    /// A-ASSOCIATE-RJ (type `0x03`)
    AssociationRJ(AssociationRJ),
    /// P-DATA-TF (type `0x04`)
    PData {
        /// the presentation data values
        data: Vec<PDataValue>,
    },
    /// A-RELEASE-RQ (type `0x05`)
    ReleaseRQ,
    /// A-RELEASE-RP (type `0x06`)
    ReleaseRP,
    /// A-ABORT (type `0x07`)
    AbortRQ {
        /// the source (and reason) of the abort
        source: AbortRQSource,
    },
}

impl Pdu {
    /// Provide a short description of the PDU for logging purposes.
    pub fn short_description(&self) -> impl fmt::Display + '_ {
        PduShortDescription(self)
    }
}

struct PduShortDescription<'a>(&'a Pdu);

impl fmt::Display for PduShortDescription<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self.0 {
            Pdu::Unknown { pdu_type, data } => {
                write!(f, "Unknown[type={:#04x}, {} bytes]", pdu_type, data.len())
            }
            Pdu::AssociationRQ(AssociationRQ {
                calling_ae_title,
                called_ae_title,
                presentation_contexts,
                ..
            }) => write!(
                f,
                "A-ASSOCIATE-RQ[{} -> {}, {} presentation contexts]",
                calling_ae_title,
                called_ae_title,
                presentation_contexts.len()
            ),
            Pdu::AssociationAC(AssociationAC {
                presentation_contexts,
                ..
            }) => write!(
                f,
                "A-ASSOCIATE-AC[{} presentation contexts]",
                presentation_contexts.len()
            ),
            Pdu::AssociationRJ(AssociationRJ { source, .. }) => {
                write!(f, "A-ASSOCIATE-RJ[{}]", source)
            }
            Pdu::PData { data } => {
                let total: usize = data.iter().map(|pdv| pdv.data.len()).sum();
                write!(f, "P-DATA-TF[{} PDVs, {} bytes]", data.len(), total)
            }
            Pdu::ReleaseRQ => f.write_str("A-RELEASE-RQ"),
            Pdu::ReleaseRP => f.write_str("A-RELEASE-RP"),
            Pdu::AbortRQ { source } => write!(f, "A-ABORT[{:?}]", source),
        }
    }
}

#[cfg(test)]
mod test;
