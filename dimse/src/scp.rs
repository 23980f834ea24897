//! A ready-to-use DICOM service class provider.
//!
//! [`Scp`] accepts TCP connections,
//! negotiates associations,
//! reassembles incoming DIMSE messages
//! and routes them through a service [`Registry`].
//! Streaming handlers receive a [`Responder`],
//! an owned handle through which any number of intermediate responses
//! and exactly one terminal response may be emitted.

use std::net::{TcpListener, TcpStream};
use std::sync::Arc;
use std::time::Duration;

use dicomnet_core::{decode, Dataset, TransferSyntax};
use dicomnet_ul::association::{ServerAssociation, ServerAssociationOptions};
use dicomnet_ul::pdu::{AbortRQServiceProviderReason, AbortRQSource, PDataValueType, Pdu};
use snafu::{ensure, ResultExt};
use tracing::{debug, warn};

use crate::assembly::{CompleteMessage, MessageAssembler, DEFAULT_MAX_MESSAGE_LENGTH};
use crate::command::{self, command_field, status, Message, DATA_SET_PRESENT, PRIORITY_MEDIUM};
use crate::error::{
    AssociationSnafu, CancelledSnafu, EncodeDatasetSnafu, PeerAbortedSnafu, Result,
    SubOperationsUnavailableSnafu, TerminalAlreadySentSnafu, UnexpectedPduSnafu,
    UnexpectedResponseCommandSnafu, UnsupportedTransferSyntaxSnafu,
};
use crate::responses;
use crate::service::{CancelSource, CancelToken, MessageContext, Registry, RegisteredHandler};
use crate::transport;

/// A DICOM service class provider:
/// a server which dispatches DIMSE messages to a service registry.
///
/// One thread serves each accepted connection;
/// within an association, messages are processed strictly in order.
///
/// ### Example
///
/// ```no_run
/// # use std::net::TcpListener;
/// # use dicomnet_core::Dataset;
/// # use dicomnet_dimse::{responses, Registry, Scp, ServiceHandler};
/// # use dicomnet_dimse::command::{command_field, status, Message};
/// # use dicomnet_dimse::service::{CancelToken, HandlerError, MessageContext};
/// # struct EchoHandler;
/// # impl ServiceHandler for EchoHandler {
/// #     fn handle(
/// #         &self,
/// #         _cancellation: &CancelToken,
/// #         msg: &Message,
/// #         _data: &[u8],
/// #         _meta: &MessageContext<'_>,
/// #     ) -> Result<(Message, Option<Dataset>), HandlerError> {
/// #         Ok((responses::echo_response(msg, status::SUCCESS), None))
/// #     }
/// # }
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = Registry::new();
/// registry.register(command_field::C_ECHO_RQ, EchoHandler);
///
/// let scp = Scp::new(registry)
///     .ae_title("MY-SCP")
///     .with_abstract_syntax("1.2.840.10008.1.1");
/// let listener = TcpListener::bind("0.0.0.0:11112")?;
/// scp.serve(&listener)?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Scp {
    registry: Arc<Registry>,
    ae_title: String,
    abstract_syntax_uids: Vec<String>,
    transfer_syntax_uids: Vec<String>,
    accept_storage_sop_classes: bool,
    include_rejected_contexts: bool,
    promiscuous: bool,
    strict: bool,
    max_pdu_length: u32,
    timeout: Option<Duration>,
    max_message_length: usize,
}

impl Scp {
    /// Create a service class provider dispatching to the given registry.
    pub fn new(registry: Registry) -> Self {
        Scp {
            registry: Arc::new(registry),
            ae_title: "THIS-SCP".to_string(),
            abstract_syntax_uids: Vec::new(),
            transfer_syntax_uids: Vec::new(),
            accept_storage_sop_classes: false,
            include_rejected_contexts: false,
            promiscuous: false,
            strict: true,
            max_pdu_length: dicomnet_ul::pdu::DEFAULT_MAX_PDU,
            timeout: Some(Duration::from_secs(60)),
            max_message_length: DEFAULT_MAX_MESSAGE_LENGTH,
        }
    }

    /// Define the application entity title of this node.
    pub fn ae_title(mut self, ae_title: impl Into<String>) -> Self {
        self.ae_title = ae_title.into();
        self
    }

    /// Include this abstract syntax
    /// in the list of accepted abstract syntaxes.
    pub fn with_abstract_syntax(mut self, abstract_syntax_uid: impl Into<String>) -> Self {
        self.abstract_syntax_uids.push(abstract_syntax_uid.into());
        self
    }

    /// Admit this transfer syntax for opaque transport.
    pub fn with_transfer_syntax(mut self, transfer_syntax_uid: impl Into<String>) -> Self {
        self.transfer_syntax_uids.push(transfer_syntax_uid.into());
        self
    }

    /// Accept any composite object storage SOP class as an abstract syntax.
    pub fn accept_storage_sop_classes(mut self, accept: bool) -> Self {
        self.accept_storage_sop_classes = accept;
        self
    }

    /// Override whether rejected presentation contexts
    /// are included in the A-ASSOCIATE-AC.
    /// See [`ServerAssociationOptions::include_rejected_contexts`].
    pub fn include_rejected_contexts(mut self, include: bool) -> Self {
        self.include_rejected_contexts = include;
        self
    }

    /// Override promiscuous mode:
    /// whether to accept unknown abstract syntaxes.
    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    /// Override strict mode for incoming PDU lengths.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Override the maximum expected PDU length.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Set the timeout for individual socket reads and writes.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Override the cap on the accumulated size of one DIMSE message
    /// (command set plus data set), in bytes.
    pub fn max_message_length(mut self, value: usize) -> Self {
        self.max_message_length = value;
        self
    }

    /// Serve connections accepted from the listener,
    /// one thread per connection,
    /// until accepting fails.
    pub fn serve(&self, listener: &TcpListener) -> std::io::Result<()> {
        std::thread::scope(|scope| -> std::io::Result<()> {
            loop {
                let (stream, peer_addr) = listener.accept()?;
                debug!("Accepted connection from {}", peer_addr);
                scope.spawn(move || {
                    if let Err(e) = self.handle_connection(stream) {
                        warn!("Connection from {} ended with error: {}", peer_addr, e);
                    }
                });
            }
        })
    }

    /// Negotiate an association over an accepted TCP stream
    /// and process DIMSE messages until the association ends.
    pub fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let options = self.association_options();
        let mut association = options.establish(stream).context(AssociationSnafu)?;
        debug!(
            "Association established with {}",
            association.client_ae_title()
        );

        let mut assembler = MessageAssembler::new(self.max_message_length);
        // message IDs for sub-operations issued on this association
        let mut sub_operation_message_id: u16 = 0;

        loop {
            match association.receive() {
                Ok(Pdu::PData { data }) => {
                    for pdv in data {
                        let complete = match assembler.push(pdv) {
                            Ok(complete) => complete,
                            Err(e) => {
                                let _ = association.abort();
                                return Err(e);
                            }
                        };
                        if let Some(complete) = complete {
                            self.dispatch(
                                &mut association,
                                complete,
                                &mut sub_operation_message_id,
                            )?;
                        }
                    }
                }
                Ok(Pdu::ReleaseRQ) => {
                    association
                        .send(&Pdu::ReleaseRP)
                        .context(AssociationSnafu)?;
                    debug!("Association released");
                    return Ok(());
                }
                Ok(Pdu::AbortRQ { source }) => {
                    debug!("Association aborted by peer ({:?})", source);
                    return Ok(());
                }
                Ok(pdu) => {
                    let _ = association.abort();
                    return UnexpectedPduSnafu { pdu }.fail();
                }
                Err(dicomnet_ul::association::Error::ConnectionClosed { .. }) => {
                    debug!("Connection closed by peer");
                    return Ok(());
                }
                Err(e) => {
                    let _ = association.abort();
                    return Err(e).context(AssociationSnafu);
                }
            }
        }
    }

    fn association_options(
        &self,
    ) -> ServerAssociationOptions<'_, dicomnet_ul::association::server::AcceptAny> {
        let mut options = ServerAssociationOptions::new()
            .ae_title(self.ae_title.as_str())
            .accept_storage_sop_classes(self.accept_storage_sop_classes)
            .include_rejected_contexts(self.include_rejected_contexts)
            .promiscuous(self.promiscuous)
            .strict(self.strict)
            .max_pdu_length(self.max_pdu_length);
        if let Some(timeout) = self.timeout {
            options = options.timeout(timeout);
        }
        for uid in &self.abstract_syntax_uids {
            options = options.with_abstract_syntax(uid.clone());
        }
        for uid in &self.transfer_syntax_uids {
            options = options.with_transfer_syntax(uid.clone());
        }
        options
    }

    /// Route one complete message through the registry
    /// and see its responses onto the wire.
    fn dispatch(
        &self,
        association: &mut ServerAssociation,
        complete: CompleteMessage,
        sub_operation_message_id: &mut u16,
    ) -> Result<()> {
        let CompleteMessage {
            presentation_context_id,
            mut message,
            dataset,
        } = complete;

        if message.command_field == command_field::C_CANCEL_RQ {
            // C-CANCEL is one-way; with no operation in flight
            // at this point, there is nothing to interrupt
            debug!(
                "C-CANCEL-RQ for message {} with no operation in flight",
                message.message_id_being_responded_to
            );
            return Ok(());
        }

        let transfer_syntax_uid = association
            .transfer_syntax_for(presentation_context_id)
            .unwrap_or_default()
            .to_string();
        message.transfer_syntax_uid = transfer_syntax_uid.clone();

        // parse the data set when the negotiated syntax is decodable;
        // otherwise the handler still gets the raw bytes
        let parsed_dataset: Option<Dataset> = if dataset.is_empty() {
            None
        } else {
            TransferSyntax::from_uid(&transfer_syntax_uid)
                .map(|ts| decode::parse_dataset(&dataset, ts))
        };

        let meta = MessageContext {
            presentation_context_id,
            transfer_syntax_uid: &transfer_syntax_uid,
            dataset: parsed_dataset.as_ref(),
        };
        let cancellation = CancelToken::new();
        let request = message.clone();
        let mut responder = Responder {
            association: &mut *association,
            presentation_context_id,
            transfer_syntax_uid: transfer_syntax_uid.clone(),
            request_message_id: request.message_id,
            cancellation: cancellation.clone(),
            terminal_sent: false,
            sub_operation_message_id,
            sub_operations_allowed: request.command_field == command_field::C_GET_RQ,
        };

        match self.registry.get(message.command_field) {
            None => {
                warn!(
                    "Unsupported DIMSE command {:#06x}",
                    message.command_field
                );
                responder.send(
                    &responses::error_response(&request, status::PROCESSING_FAILURE),
                    None,
                    None,
                )?;
            }
            Some(RegisteredHandler::Single(handler)) => {
                match handler.handle(&cancellation, &message, &dataset, &meta) {
                    Ok((response, response_dataset)) => {
                        responder.send(&response, response_dataset.as_ref(), None)?;
                    }
                    Err(e) => {
                        warn!("Service handler failed: {}", e);
                        responder.send(
                            &responses::error_response(&request, status::PROCESSING_FAILURE),
                            None,
                            None,
                        )?;
                    }
                }
            }
            Some(RegisteredHandler::Streaming(handler)) => {
                let handler = Arc::clone(handler);
                if let Err(e) =
                    handler.handle_streaming(&cancellation, &message, &dataset, &meta, &mut responder)
                {
                    warn!("Streaming service handler failed: {}", e);
                    if !responder.terminal_sent() {
                        responder.send(
                            &responses::error_response(&request, status::PROCESSING_FAILURE),
                            None,
                            None,
                        )?;
                    }
                }
            }
        }

        // a peer C-CANCEL only ends the exchange; a cancellation raised
        // locally by the hosting application additionally tears the
        // association down with an A-ABORT
        if cancellation.source() == Some(CancelSource::Local) {
            debug!("Local cancellation: aborting the association");
            let _ = association.send(&Pdu::AbortRQ {
                source: AbortRQSource::ServiceProvider(
                    AbortRQServiceProviderReason::ReasonNotSpecified,
                ),
            });
            return CancelledSnafu.fail();
        }

        Ok(())
    }
}

/// The response channel handed to service handlers.
///
/// A responder may be used any number of times
/// for intermediate (pending) responses,
/// and exactly once for the terminal response;
/// further calls after the terminal response fail with
/// [`TerminalAlreadySent`](crate::Error::TerminalAlreadySent).
///
/// While the C-GET service is being handled,
/// [`send_c_store`](Self::send_c_store) issues
/// C-STORE sub-operations on the same association.
///
/// Each call to [`send`](Self::send) also gives the association
/// a chance to observe a pending C-CANCEL-RQ from the peer,
/// flagging the operation's cancellation token.
pub struct Responder<'a> {
    association: &'a mut ServerAssociation,
    presentation_context_id: u8,
    transfer_syntax_uid: String,
    request_message_id: u16,
    cancellation: CancelToken,
    terminal_sent: bool,
    sub_operation_message_id: &'a mut u16,
    sub_operations_allowed: bool,
}

impl Responder<'_> {
    /// Send a response message,
    /// encoding the data set with `transfer_syntax_uid`
    /// (or the context's negotiated syntax when `None`).
    pub fn send(
        &mut self,
        msg: &Message,
        dataset: Option<&Dataset>,
        transfer_syntax_uid: Option<&str>,
    ) -> Result<()> {
        let ts_uid = transfer_syntax_uid.unwrap_or(&self.transfer_syntax_uid);
        let dataset_bytes = dataset
            .map(|ds| {
                let ts = TransferSyntax::from_uid(ts_uid)
                    .ok_or_else(|| {
                        UnsupportedTransferSyntaxSnafu { uid: ts_uid }.build()
                    })?;
                dicomnet_core::encode::encode_dataset(ds, ts).context(EncodeDatasetSnafu)
            })
            .transpose()?;
        self.send_raw(msg, dataset_bytes.as_deref())
    }

    /// Send a response message with an already encoded data set,
    /// as received or produced under an opaque transfer syntax.
    pub fn send_raw(&mut self, msg: &Message, dataset: Option<&[u8]>) -> Result<()> {
        ensure!(!self.terminal_sent, TerminalAlreadySentSnafu);
        self.observe_incoming()?;

        transport::send_message(
            &mut *self.association,
            self.presentation_context_id,
            msg,
            dataset,
        )?;
        if !status::is_pending(msg.status) {
            self.terminal_sent = true;
        }
        Ok(())
    }

    /// Whether a C-CANCEL for the message under processing
    /// has been observed, or a local cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    /// Whether the terminal response has already been emitted.
    pub fn terminal_sent(&self) -> bool {
        self.terminal_sent
    }

    /// The transfer syntax negotiated for the presentation context
    /// carrying this exchange.
    pub fn transfer_syntax_uid(&self) -> &str {
        &self.transfer_syntax_uid
    }

    /// Issue a C-STORE sub-operation on the same association,
    /// reusing the presentation context negotiated for C-GET,
    /// and wait for the peer's C-STORE-RSP.
    ///
    /// Message IDs for sub-operations are assigned monotonically
    /// from a per-association counter.
    /// Returns the status of the C-STORE response.
    ///
    /// Only available while handling a C-GET request.
    pub fn send_c_store(
        &mut self,
        sop_class_uid: &str,
        sop_instance_uid: &str,
        data: &[u8],
    ) -> Result<u16> {
        ensure!(self.sub_operations_allowed, SubOperationsUnavailableSnafu);

        *self.sub_operation_message_id = self.sub_operation_message_id.wrapping_add(1);
        let command = Message {
            command_field: command_field::C_STORE_RQ,
            message_id: *self.sub_operation_message_id,
            affected_sop_class_uid: sop_class_uid.to_string(),
            affected_sop_instance_uid: sop_instance_uid.to_string(),
            priority: PRIORITY_MEDIUM,
            command_data_set_type: DATA_SET_PRESENT,
            ..Message::default()
        };
        transport::send_message(
            &mut *self.association,
            self.presentation_context_id,
            &command,
            Some(data),
        )?;

        // wait for the C-STORE-RSP;
        // a C-CANCEL for the outer operation may arrive in between
        let mut assembler = MessageAssembler::default();
        loop {
            let complete = transport::receive_message(&mut *self.association, &mut assembler)?;
            match complete.message.command_field {
                command_field::C_STORE_RSP => return Ok(complete.message.status),
                command_field::C_CANCEL_RQ => {
                    if complete.message.message_id_being_responded_to == self.request_message_id {
                        self.cancellation.cancel_by_peer();
                    }
                }
                got => {
                    return UnexpectedResponseCommandSnafu {
                        expected: command_field::C_STORE_RSP,
                        got,
                    }
                    .fail()
                }
            }
        }
    }

    /// Look at PDUs which have already arrived on the association,
    /// without blocking, and flag cancellation
    /// when a matching C-CANCEL-RQ shows up.
    fn observe_incoming(&mut self) -> Result<()> {
        while let Some(pdu) = self
            .association
            .try_receive()
            .context(AssociationSnafu)?
        {
            match pdu {
                Pdu::PData { data } => {
                    for pdv in data {
                        // a C-CANCEL command set is small
                        // and arrives in a single fragment
                        if pdv.value_type == PDataValueType::Command && pdv.is_last {
                            if let Ok(msg) = command::decode_message(&pdv.data) {
                                if msg.command_field == command_field::C_CANCEL_RQ
                                    && msg.message_id_being_responded_to
                                        == self.request_message_id
                                {
                                    debug!(
                                        "Observed C-CANCEL-RQ for message {}",
                                        self.request_message_id
                                    );
                                    self.cancellation.cancel_by_peer();
                                    continue;
                                }
                            }
                        }
                        warn!("Discarding unexpected fragment received mid-operation");
                    }
                }
                Pdu::AbortRQ { source } => return PeerAbortedSnafu { source }.fail(),
                pdu => {
                    warn!(
                        "Unexpected PDU mid-operation: {}",
                        pdu.short_description()
                    );
                }
            }
        }
        Ok(())
    }
}
