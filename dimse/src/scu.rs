//! Composite service operations for a service class user.
//!
//! [`ScuOptions`] negotiates an association
//! proposing one presentation context per SOP class of interest,
//! and the resulting [`Scu`] exposes the composite operations:
//! C-ECHO, C-FIND, C-STORE, C-MOVE, C-GET and C-CANCEL.

use std::net::ToSocketAddrs;
use std::time::Duration;

use dicomnet_core::{decode, uids, Dataset, TransferSyntax};
use dicomnet_ul::association::{ClientAssociation, ClientAssociationOptions};
use dicomnet_ul::pdu::{AbortRQSource, Pdu};
use snafu::ResultExt;
use tracing::{debug, warn};

use crate::assembly::{CompleteMessage, MessageAssembler, DEFAULT_MAX_MESSAGE_LENGTH};
use crate::command::{
    command_field, status, Message, DATA_SET_PRESENT, NO_DATA_SET, PRIORITY_MEDIUM,
};
use crate::error::{
    AssociationSnafu, CancelledSnafu, EncodeDatasetSnafu, NegotiationSnafu, Result,
    UnexpectedResponseCommandSnafu,
};
use crate::responses;
use crate::service::{CancelSource, CancelToken, MessageContext, ServiceHandler};
use crate::transport;

/// Options for establishing an association as a service class user.
///
/// ### Example
///
/// ```no_run
/// # use dicomnet_dimse::ScuOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mut scu = ScuOptions::new()
///     .calling_ae_title("MY-SCU")
///     .called_ae_title("THEIR-SCP")
///     .propose_sop_class("1.2.840.10008.1.1")
///     .establish("192.168.1.10:104")?;
/// let response = scu.c_echo(1)?;
/// assert_eq!(response.status, 0x0000);
/// scu.release()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ScuOptions {
    calling_ae_title: String,
    called_ae_title: Option<String>,
    max_pdu_length: u32,
    connect_timeout: Option<Duration>,
    read_timeout: Option<Duration>,
    write_timeout: Option<Duration>,
    /// transfer syntaxes proposed for every presentation context,
    /// in order of preference
    preferred_transfer_syntaxes: Vec<String>,
    /// abstract syntaxes to propose, one presentation context each
    proposed_sop_classes: Vec<String>,
    strict: bool,
    max_message_length: usize,
}

impl Default for ScuOptions {
    fn default() -> Self {
        ScuOptions {
            calling_ae_title: "THIS-SCU".to_string(),
            called_ae_title: None,
            max_pdu_length: dicomnet_ul::pdu::DEFAULT_MAX_PDU,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            preferred_transfer_syntaxes: vec![
                uids::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
                uids::IMPLICIT_VR_LITTLE_ENDIAN.to_string(),
            ],
            proposed_sop_classes: Vec::new(),
            strict: true,
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }
}

impl ScuOptions {
    /// Create a new set of options with the default configuration.
    pub fn new() -> Self {
        ScuOptions::default()
    }

    /// Define the calling application entity title.
    pub fn calling_ae_title(mut self, ae_title: impl Into<String>) -> Self {
        self.calling_ae_title = ae_title.into();
        self
    }

    /// Define the called application entity title.
    pub fn called_ae_title(mut self, ae_title: impl Into<String>) -> Self {
        self.called_ae_title = Some(ae_title.into());
        self
    }

    /// Override the maximum PDU length this node is willing to receive.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Set the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = Some(timeout);
        self
    }

    /// Set the write timeout.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = Some(timeout);
        self
    }

    /// Replace the ordered list of transfer syntaxes
    /// proposed in every presentation context.
    ///
    /// The default is Explicit VR Little Endian
    /// followed by Implicit VR Little Endian.
    pub fn preferred_transfer_syntaxes<I, T>(mut self, uids: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        self.preferred_transfer_syntaxes = uids.into_iter().map(Into::into).collect();
        self
    }

    /// Propose this SOP class (abstract syntax)
    /// as a presentation context of the association.
    pub fn propose_sop_class(mut self, sop_class_uid: impl Into<String>) -> Self {
        self.proposed_sop_classes.push(sop_class_uid.into());
        self
    }

    /// Override strict mode for incoming PDU lengths.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Override the cap on the accumulated size
    /// of one incoming DIMSE message.
    pub fn max_message_length(mut self, value: usize) -> Self {
        self.max_message_length = value;
        self
    }

    /// Establish the association with the node at the given address.
    pub fn establish<A: ToSocketAddrs>(self, address: A) -> Result<Scu> {
        let association = self
            .client_options()
            .establish(address)
            .context(AssociationSnafu)?;
        Ok(self.into_scu(association))
    }

    /// Establish the association with a node
    /// addressed as `AE-TITLE@host:port`.
    pub fn establish_with(self, ae_address: &str) -> Result<Scu> {
        let association = self
            .client_options()
            .establish_with(ae_address)
            .context(AssociationSnafu)?;
        Ok(self.into_scu(association))
    }

    fn client_options(&self) -> ClientAssociationOptions<'_> {
        let mut options = ClientAssociationOptions::new()
            .calling_ae_title(self.calling_ae_title.as_str())
            .max_pdu_length(self.max_pdu_length)
            .strict(self.strict);
        if let Some(called) = &self.called_ae_title {
            options = options.called_ae_title(called.as_str());
        }
        if let Some(timeout) = self.connect_timeout {
            options = options.connect_timeout(timeout);
        }
        if let Some(timeout) = self.read_timeout {
            options = options.read_timeout(timeout);
        }
        if let Some(timeout) = self.write_timeout {
            options = options.write_timeout(timeout);
        }
        for sop_class in &self.proposed_sop_classes {
            options = options.with_presentation_context(
                sop_class.as_str(),
                self.preferred_transfer_syntaxes
                    .iter()
                    .map(String::as_str)
                    .collect(),
            );
        }
        options
    }

    fn into_scu(self, association: ClientAssociation) -> Scu {
        Scu {
            association,
            next_message_id: 0,
            max_message_length: self.max_message_length,
        }
    }
}

/// The result of a C-ECHO operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CEchoResponse {
    /// the response status
    pub status: u16,
    /// the message ID that was responded to
    pub message_id: u16,
}

/// The parameters of a C-FIND query.
#[derive(Debug, Clone, Default)]
pub struct CFindRequest {
    /// the query information model SOP class
    pub sop_class_uid: String,
    /// the message ID; 0 means automatically assigned
    pub message_id: u16,
    /// the request priority; 0 means medium
    pub priority: u16,
    /// the query identifier
    pub identifier: Dataset,
}

/// A single C-FIND response from the peer.
#[derive(Debug, Clone, PartialEq)]
pub struct CFindResponse {
    /// the response status
    pub status: u16,
    /// the message ID that was responded to
    pub message_id: u16,
    /// the match identifier carried by pending responses,
    /// when the negotiated transfer syntax is decodable
    pub identifier: Option<Dataset>,
}

/// The result of a C-STORE operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CStoreResponse {
    /// the response status
    pub status: u16,
    /// the message ID that was responded to
    pub message_id: u16,
    /// the stored SOP class UID
    pub sop_class_uid: String,
    /// the stored SOP instance UID
    pub sop_instance_uid: String,
}

/// The parameters of a C-MOVE operation.
#[derive(Debug, Clone, Default)]
pub struct CMoveRequest {
    /// the retrieve information model SOP class
    pub sop_class_uid: String,
    /// the message ID; 0 means automatically assigned
    pub message_id: u16,
    /// the request priority; 0 means medium
    pub priority: u16,
    /// the AE title of the destination to move the instances to
    pub destination: String,
    /// the retrieve identifier
    pub identifier: Dataset,
}

/// A single C-MOVE response from the peer,
/// carrying the sub-operation counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CMoveResponse {
    /// the response status
    pub status: u16,
    /// the message ID that was responded to
    pub message_id: u16,
    /// sub-operations still to be performed
    pub remaining: Option<u16>,
    /// sub-operations completed successfully
    pub completed: Option<u16>,
    /// sub-operations which failed
    pub failed: Option<u16>,
    /// sub-operations which completed with warnings
    pub warning: Option<u16>,
}

/// The parameters of a C-GET operation.
#[derive(Debug, Clone, Default)]
pub struct CGetRequest {
    /// the retrieve information model SOP class
    pub sop_class_uid: String,
    /// the message ID; 0 means automatically assigned
    pub message_id: u16,
    /// the request priority; 0 means medium
    pub priority: u16,
    /// the retrieve identifier
    pub identifier: Dataset,
}

/// A single C-GET response from the peer,
/// carrying the sub-operation counters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CGetResponse {
    /// the response status
    pub status: u16,
    /// the message ID that was responded to
    pub message_id: u16,
    /// sub-operations still to be performed
    pub remaining: Option<u16>,
    /// sub-operations completed successfully
    pub completed: Option<u16>,
    /// sub-operations which failed
    pub failed: Option<u16>,
    /// sub-operations which completed with warnings
    pub warning: Option<u16>,
}

/// A service class user over an established association.
#[derive(Debug)]
pub struct Scu {
    association: ClientAssociation,
    next_message_id: u16,
    max_message_length: usize,
}

impl Scu {
    /// Perform a C-ECHO (verification) request.
    /// A `message_id` of 0 means automatically assigned.
    pub fn c_echo(&mut self, message_id: u16) -> Result<CEchoResponse> {
        let message_id = self.assign_message_id(message_id);
        let (pc_id, _) = self.context_for(uids::VERIFICATION)?;

        let command = Message {
            command_field: command_field::C_ECHO_RQ,
            message_id,
            affected_sop_class_uid: uids::VERIFICATION.to_string(),
            command_data_set_type: NO_DATA_SET,
            ..Message::default()
        };
        transport::send_message(&mut self.association, pc_id, &command, None)?;

        let complete = self.receive_message()?;
        expect_command(&complete.message, command_field::C_ECHO_RSP)?;
        Ok(CEchoResponse {
            status: complete.message.status,
            message_id: complete.message.message_id_being_responded_to,
        })
    }

    /// Perform a C-FIND query,
    /// collecting responses until a terminal status is seen.
    pub fn c_find(&mut self, request: CFindRequest) -> Result<Vec<CFindResponse>> {
        let message_id = self.assign_message_id(request.message_id);
        let (pc_id, ts_uid) = self.context_for(&request.sop_class_uid)?;

        let identifier = self.encode_identifier(&request.identifier, &ts_uid)?;
        let command = Message {
            command_field: command_field::C_FIND_RQ,
            message_id,
            affected_sop_class_uid: request.sop_class_uid.clone(),
            priority: request.priority,
            command_data_set_type: DATA_SET_PRESENT,
            ..Message::default()
        };
        transport::send_message(&mut self.association, pc_id, &command, Some(&identifier))?;

        let mut responses = Vec::new();
        loop {
            let complete = self.receive_message()?;
            expect_command(&complete.message, command_field::C_FIND_RSP)?;

            let identifier = if complete.dataset.is_empty() {
                None
            } else {
                match TransferSyntax::from_uid(&ts_uid) {
                    Some(ts) => Some(decode::parse_dataset(&complete.dataset, ts)),
                    None => {
                        warn!(
                            "C-FIND response data set left undecoded (transfer syntax `{}`)",
                            ts_uid
                        );
                        None
                    }
                }
            };

            let terminal = !complete.message.is_pending();
            responses.push(CFindResponse {
                status: complete.message.status,
                message_id: complete.message.message_id_being_responded_to,
                identifier,
            });
            if terminal {
                break;
            }
        }
        Ok(responses)
    }

    /// Perform a C-STORE of a single SOP instance,
    /// already encoded in the negotiated transfer syntax.
    /// A `message_id` of 0 means automatically assigned.
    pub fn c_store(
        &mut self,
        sop_class_uid: &str,
        sop_instance_uid: &str,
        data: &[u8],
        message_id: u16,
    ) -> Result<CStoreResponse> {
        let message_id = self.assign_message_id(message_id);
        let (pc_id, _) = self.context_for(sop_class_uid)?;

        let command = Message {
            command_field: command_field::C_STORE_RQ,
            message_id,
            affected_sop_class_uid: sop_class_uid.to_string(),
            affected_sop_instance_uid: sop_instance_uid.to_string(),
            // some peers refuse a C-STORE whose priority element is absent
            priority: PRIORITY_MEDIUM,
            command_data_set_type: DATA_SET_PRESENT,
            ..Message::default()
        };
        transport::send_message(&mut self.association, pc_id, &command, Some(data))?;

        let complete = self.receive_message()?;
        expect_command(&complete.message, command_field::C_STORE_RSP)?;
        Ok(CStoreResponse {
            status: complete.message.status,
            message_id: complete.message.message_id_being_responded_to,
            sop_class_uid: complete.message.affected_sop_class_uid,
            sop_instance_uid: complete.message.affected_sop_instance_uid,
        })
    }

    /// Perform a C-MOVE operation,
    /// collecting responses until a terminal status is seen.
    pub fn c_move(&mut self, request: CMoveRequest) -> Result<Vec<CMoveResponse>> {
        let message_id = self.assign_message_id(request.message_id);
        let (pc_id, ts_uid) = self.context_for(&request.sop_class_uid)?;

        let identifier = self.encode_identifier(&request.identifier, &ts_uid)?;
        let command = Message {
            command_field: command_field::C_MOVE_RQ,
            message_id,
            affected_sop_class_uid: request.sop_class_uid.clone(),
            move_destination: request.destination.clone(),
            priority: request.priority,
            command_data_set_type: DATA_SET_PRESENT,
            ..Message::default()
        };
        transport::send_message(&mut self.association, pc_id, &command, Some(&identifier))?;

        let mut responses = Vec::new();
        loop {
            let complete = self.receive_message()?;
            expect_command(&complete.message, command_field::C_MOVE_RSP)?;

            let terminal = !complete.message.is_pending();
            responses.push(CMoveResponse {
                status: complete.message.status,
                message_id: complete.message.message_id_being_responded_to,
                remaining: complete.message.remaining_suboperations,
                completed: complete.message.completed_suboperations,
                failed: complete.message.failed_suboperations,
                warning: complete.message.warning_suboperations,
            });
            if terminal {
                break;
            }
        }
        Ok(responses)
    }

    /// Perform a C-GET operation.
    ///
    /// The peer performs C-STORE sub-operations on this same association;
    /// each incoming C-STORE-RQ is given to `store_handler`,
    /// whose response is relayed back before waiting
    /// for the next C-GET response.
    pub fn c_get(
        &mut self,
        request: CGetRequest,
        store_handler: &dyn ServiceHandler,
    ) -> Result<Vec<CGetResponse>> {
        let message_id = self.assign_message_id(request.message_id);
        let (pc_id, ts_uid) = self.context_for(&request.sop_class_uid)?;

        let identifier = self.encode_identifier(&request.identifier, &ts_uid)?;
        let command = Message {
            command_field: command_field::C_GET_RQ,
            message_id,
            affected_sop_class_uid: request.sop_class_uid.clone(),
            priority: request.priority,
            command_data_set_type: DATA_SET_PRESENT,
            ..Message::default()
        };
        transport::send_message(&mut self.association, pc_id, &command, Some(&identifier))?;

        let cancellation = CancelToken::new();
        let mut responses = Vec::new();
        loop {
            let complete = self.receive_message()?;
            match complete.message.command_field {
                command_field::C_STORE_RQ => {
                    self.serve_sub_operation(complete, &cancellation, store_handler)?;
                    // a cancellation raised locally by the store handler
                    // tears the association down with an A-ABORT
                    // rather than waiting out the remaining sub-operations
                    if cancellation.source() == Some(CancelSource::Local) {
                        let _ = self.association.send(&Pdu::AbortRQ {
                            source: AbortRQSource::ServiceUser,
                        });
                        let _ = self
                            .association
                            .inner_stream()
                            .shutdown(std::net::Shutdown::Both);
                        return CancelledSnafu.fail();
                    }
                }
                command_field::C_GET_RSP => {
                    let terminal = !complete.message.is_pending();
                    responses.push(CGetResponse {
                        status: complete.message.status,
                        message_id: complete.message.message_id_being_responded_to,
                        remaining: complete.message.remaining_suboperations,
                        completed: complete.message.completed_suboperations,
                        failed: complete.message.failed_suboperations,
                        warning: complete.message.warning_suboperations,
                    });
                    if terminal {
                        break;
                    }
                }
                got => {
                    return UnexpectedResponseCommandSnafu {
                        expected: command_field::C_GET_RSP,
                        got,
                    }
                    .fail()
                }
            }
        }
        Ok(responses)
    }

    /// Send a C-CANCEL-RQ for the operation
    /// previously started with `message_id`.
    ///
    /// C-CANCEL is one-way: no response is expected or waited for.
    pub fn c_cancel(&mut self, message_id: u16, sop_class_uid: &str) -> Result<()> {
        let (pc_id, _) = self.context_for(sop_class_uid)?;
        let command = Message {
            command_field: command_field::C_CANCEL_RQ,
            message_id_being_responded_to: message_id,
            command_data_set_type: NO_DATA_SET,
            ..Message::default()
        };
        transport::send_message(&mut self.association, pc_id, &command, None)?;
        debug!("C-CANCEL-RQ sent for message {}", message_id);
        Ok(())
    }

    /// Gracefully release the association.
    pub fn release(self) -> Result<()> {
        self.association.release().context(AssociationSnafu)
    }

    /// Abort the association without a release exchange.
    pub fn abort(self) -> Result<()> {
        self.association.abort().context(AssociationSnafu)
    }

    /// Access the underlying association.
    pub fn association(&mut self) -> &mut ClientAssociation {
        &mut self.association
    }

    /// Handle one incoming C-STORE sub-operation during a C-GET.
    fn serve_sub_operation(
        &mut self,
        complete: CompleteMessage,
        cancellation: &CancelToken,
        store_handler: &dyn ServiceHandler,
    ) -> Result<()> {
        let ts_uid = self
            .association
            .presentation_contexts()
            .iter()
            .find(|pc| pc.id == complete.presentation_context_id)
            .map(|pc| pc.transfer_syntax.clone())
            .unwrap_or_default();

        let parsed = if complete.dataset.is_empty() {
            None
        } else {
            TransferSyntax::from_uid(&ts_uid).map(|ts| decode::parse_dataset(&complete.dataset, ts))
        };
        let meta = MessageContext {
            presentation_context_id: complete.presentation_context_id,
            transfer_syntax_uid: &ts_uid,
            dataset: parsed.as_ref(),
        };

        let response = match store_handler.handle(
            cancellation,
            &complete.message,
            &complete.dataset,
            &meta,
        ) {
            Ok((response, _dataset)) => response,
            Err(e) => {
                warn!("C-STORE sub-operation handler failed: {}", e);
                responses::error_response(&complete.message, status::PROCESSING_FAILURE)
            }
        };
        transport::send_message(
            &mut self.association,
            complete.presentation_context_id,
            &response,
            None,
        )
    }

    fn receive_message(&mut self) -> Result<CompleteMessage> {
        let mut assembler = MessageAssembler::new(self.max_message_length);
        transport::receive_message(&mut self.association, &mut assembler)
    }

    fn assign_message_id(&mut self, requested: u16) -> u16 {
        if requested != 0 {
            requested
        } else {
            self.next_message_id = self.next_message_id.wrapping_add(1).max(1);
            self.next_message_id
        }
    }

    fn context_for(&self, sop_class_uid: &str) -> Result<(u8, String)> {
        self.association
            .presentation_context_for(sop_class_uid)
            .map(|pc| (pc.id, pc.transfer_syntax.clone()))
            .ok_or_else(|| NegotiationSnafu { sop_class_uid }.build())
    }

    fn encode_identifier(&self, identifier: &Dataset, ts_uid: &str) -> Result<Vec<u8>> {
        let ts = TransferSyntax::from_uid(ts_uid).ok_or_else(|| {
            crate::error::UnsupportedTransferSyntaxSnafu { uid: ts_uid }.build()
        })?;
        dicomnet_core::encode::encode_dataset(identifier, ts).context(EncodeDatasetSnafu)
    }
}

fn expect_command(message: &Message, expected: u16) -> Result<()> {
    snafu::ensure!(
        message.command_field == expected,
        UnexpectedResponseCommandSnafu {
            expected,
            got: message.command_field,
        }
    );
    Ok(())
}
