//! Association acceptor module
//!
//! The module provides an abstraction for a DICOM association
//! in which this application entity listens to incoming association requests.
//! See [`ServerAssociationOptions`]
//! for details and examples on how to create an association.

use bytes::{Buf, BytesMut};
use std::io::{Cursor, Read, Write};
use std::net::TcpStream;
use std::{borrow::Cow, time::Duration};

use snafu::{ensure, ResultExt};
use tracing::debug;

use crate::pdu::{
    read_pdu, write_pdu, AbortRQServiceProviderReason, AbortRQSource, AssociationAC,
    AssociationRJ, AssociationRJResult, AssociationRJServiceUserReason, AssociationRJSource,
    AssociationRQ, PDataValueType, Pdu, PresentationContextResult,
    PresentationContextResultReason, UserVariableItem, DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE,
};
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

use super::pdata::{PDataReader, PDataWriter};
use super::{encode_pdu, read_pdu_from_wire, Result};

/// Strip the trailing NUL padding (and incidental whitespace)
/// which UID values carry over from the wire or from configuration.
fn trim_uid(uid: Cow<'_, str>) -> Cow<'_, str> {
    let trimmed = uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');
    if trimmed.len() == uid.len() {
        uid
    } else {
        Cow::Owned(trimmed.to_string())
    }
}

/// Common interface for application entity access control policies.
///
/// Existing implementations include [`AcceptAny`] and [`AcceptCalledAeTitle`],
/// but users are free to implement their own.
pub trait AccessControl {
    /// Obtain the decision of whether to accept an incoming association
    /// request based on the recorded application entity titles.
    ///
    /// Returns `Ok(())` if the requesting node should be given clearance.
    /// Otherwise, a concrete association RJ service user reason is given.
    fn check_access(
        &self,
        this_ae_title: &str,
        calling_ae_title: &str,
        called_ae_title: &str,
    ) -> Result<(), AssociationRJServiceUserReason>;
}

/// An access control rule that accepts any incoming association request.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AcceptAny;

impl AccessControl for AcceptAny {
    fn check_access(
        &self,
        _this_ae_title: &str,
        _calling_ae_title: &str,
        _called_ae_title: &str,
    ) -> Result<(), AssociationRJServiceUserReason> {
        Ok(())
    }
}

/// An access control rule that accepts association requests
/// that match the called AE title with the node's AE title.
#[derive(Debug, Default, Copy, Clone, Eq, Hash, PartialEq)]
pub struct AcceptCalledAeTitle;

impl AccessControl for AcceptCalledAeTitle {
    fn check_access(
        &self,
        this_ae_title: &str,
        _calling_ae_title: &str,
        called_ae_title: &str,
    ) -> Result<(), AssociationRJServiceUserReason> {
        if this_ae_title == called_ae_title {
            Ok(())
        } else {
            Err(AssociationRJServiceUserReason::CalledAETitleNotRecognized)
        }
    }
}

/// A DICOM association builder for an acceptor DICOM node,
/// often taking the role of a service class provider (SCP).
///
/// This is the standard way of negotiating and establishing
/// an association with a requesting node.
/// The outcome is a [`ServerAssociation`].
/// Unlike the [`ClientAssociationOptions`],
/// a value of this type can be reused for multiple connections.
///
/// [`ClientAssociationOptions`]: crate::association::ClientAssociationOptions
///
/// ### Basic usage
///
/// ```no_run
/// # use std::net::TcpListener;
/// # use dicomnet_ul::association::ServerAssociationOptions;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// # let tcp_listener: TcpListener = unimplemented!();
/// let scp_options = ServerAssociationOptions::new()
///    .with_abstract_syntax("1.2.840.10008.1.1")
///    .accept_storage_sop_classes(true);
///
/// let (stream, _address) = tcp_listener.accept()?;
/// scp_options.establish(stream)?;
/// # Ok(())
/// # }
/// ```
///
/// The SCP accepts the transfer syntaxes
/// _Implicit VR Little Endian_ and _Explicit VR Little Endian_;
/// other transfer syntaxes may be admitted for opaque transport
/// through calls to [`with_transfer_syntax`][1].
///
/// Access control logic is also available,
/// enabling application entities to decide on
/// whether to accept or reject the association request
/// based on the _called_ and _calling_ AE titles.
///
/// - By default, the application will accept requests from anyone
///   ([`AcceptAny`])
/// - To only accept requests with a matching _called_ AE title,
///   add a call to [`accept_called_ae_title`][2]
///   ([`AcceptCalledAeTitle`]).
/// - Any other policy can be implemented through the [`AccessControl`] trait.
///
/// [1]: Self::with_transfer_syntax
/// [2]: Self::accept_called_ae_title
#[derive(Debug, Clone)]
pub struct ServerAssociationOptions<'a, A> {
    /// the application entity access control policy
    ae_access_control: A,
    /// the AE title of this DICOM node
    ae_title: Cow<'a, str>,
    /// the requested application context name
    application_context_name: Cow<'a, str>,
    /// the list of supported abstract syntaxes
    abstract_syntax_uids: Vec<Cow<'a, str>>,
    /// the list of additional transfer syntaxes to accept for
    /// opaque transport, on top of the two built-in ones
    transfer_syntax_uids: Vec<Cow<'a, str>>,
    /// whether to accept any storage SOP class as an abstract syntax
    accept_storage_sop_classes: bool,
    /// whether to include rejected presentation contexts
    /// in the A-ASSOCIATE-AC
    include_rejected_contexts: bool,
    /// the expected protocol version
    protocol_version: u16,
    /// the maximum PDU length
    max_pdu_length: u32,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// whether to accept unknown abstract syntaxes
    promiscuous: bool,
    /// timeout for individual send/receive operations
    timeout: Option<Duration>,
}

impl Default for ServerAssociationOptions<'_, AcceptAny> {
    fn default() -> Self {
        ServerAssociationOptions {
            ae_access_control: AcceptAny,
            ae_title: "THIS-SCP".into(),
            application_context_name: "1.2.840.10008.3.1.1.1".into(),
            abstract_syntax_uids: Vec::new(),
            transfer_syntax_uids: Vec::new(),
            accept_storage_sop_classes: false,
            include_rejected_contexts: false,
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: true,
            promiscuous: false,
            timeout: Some(Duration::from_secs(60)),
        }
    }
}

impl ServerAssociationOptions<'_, AcceptAny> {
    /// Create a new set of options for establishing an association.
    pub fn new() -> Self {
        Self::default()
    }
}

impl<'a, A> ServerAssociationOptions<'a, A>
where
    A: AccessControl,
{
    /// Change the access control policy to accept any association
    /// regardless of the specified AE titles.
    ///
    /// This is the default behavior when the options are first created.
    pub fn accept_any(self) -> ServerAssociationOptions<'a, AcceptAny> {
        self.ae_access_control(AcceptAny)
    }

    /// Change the access control policy to accept an association
    /// if the called AE title matches this node's AE title.
    pub fn accept_called_ae_title(self) -> ServerAssociationOptions<'a, AcceptCalledAeTitle> {
        self.ae_access_control(AcceptCalledAeTitle)
    }

    /// Change the access control policy.
    pub fn ae_access_control<P>(self, access_control: P) -> ServerAssociationOptions<'a, P>
    where
        P: AccessControl,
    {
        let ServerAssociationOptions {
            ae_title,
            application_context_name,
            abstract_syntax_uids,
            transfer_syntax_uids,
            accept_storage_sop_classes,
            include_rejected_contexts,
            protocol_version,
            max_pdu_length,
            strict,
            promiscuous,
            timeout,
            ae_access_control: _,
        } = self;

        ServerAssociationOptions {
            ae_access_control: access_control,
            ae_title,
            application_context_name,
            abstract_syntax_uids,
            transfer_syntax_uids,
            accept_storage_sop_classes,
            include_rejected_contexts,
            protocol_version,
            max_pdu_length,
            strict,
            promiscuous,
            timeout,
        }
    }

    /// Define the application entity title referring to this DICOM node.
    ///
    /// The default is `THIS-SCP`.
    pub fn ae_title<T>(mut self, ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.ae_title = ae_title.into();
        self
    }

    /// Include this abstract syntax
    /// in the list of accepted abstract syntaxes.
    pub fn with_abstract_syntax<T>(mut self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.abstract_syntax_uids
            .push(trim_uid(abstract_syntax_uid.into()));
        self
    }

    /// Admit this transfer syntax for opaque transport,
    /// in addition to the two built-in transfer syntaxes
    /// (Implicit and Explicit VR Little Endian).
    ///
    /// Data sets negotiated under an added transfer syntax
    /// are relayed as raw bytes; the core does not decode them.
    pub fn with_transfer_syntax<T>(mut self, transfer_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.transfer_syntax_uids
            .push(trim_uid(transfer_syntax_uid.into()));
        self
    }

    /// Accept any composite object storage SOP class as an abstract syntax,
    /// so that C-STORE operations are admitted as a class
    /// without enumerating each storage SOP class UID.
    pub fn accept_storage_sop_classes(mut self, accept: bool) -> Self {
        self.accept_storage_sop_classes = accept;
        self
    }

    /// Override whether rejected presentation contexts
    /// are included in the A-ASSOCIATE-AC.
    ///
    /// The standard admits including every proposed presentation context
    /// in the response, with rejected ones flagged accordingly.
    /// However, some widely deployed implementations
    /// refuse an A-ASSOCIATE-AC that mentions rejected contexts,
    /// so the default (`false`) leaves them out as a compatibility measure.
    /// Set to `true` for a literal reading of the standard.
    pub fn include_rejected_contexts(mut self, include: bool) -> Self {
        self.include_rejected_contexts = include;
        self
    }

    /// Override the maximum expected PDU length.
    pub fn max_pdu_length(mut self, value: u32) -> Self {
        self.max_pdu_length = value;
        self
    }

    /// Override strict mode:
    /// whether receiving PDUs must not
    /// surpass the negotiated maximum PDU length.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Override promiscuous mode:
    /// whether to accept unknown abstract syntaxes.
    pub fn promiscuous(mut self, promiscuous: bool) -> Self {
        self.promiscuous = promiscuous;
        self
    }

    /// Set the timeout for individual socket reads and writes.
    pub fn timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// Negotiate an association with the given TCP stream.
    pub fn establish(&self, mut socket: TcpStream) -> Result<ServerAssociation> {
        ensure!(
            !self.abstract_syntax_uids.is_empty()
                || self.accept_storage_sop_classes
                || self.promiscuous,
            super::MissingAbstractSyntaxSnafu
        );

        let max_pdu_length = self.max_pdu_length;
        socket
            .set_read_timeout(self.timeout)
            .context(super::SetReadTimeoutSnafu)?;
        socket
            .set_write_timeout(self.timeout)
            .context(super::SetWriteTimeoutSnafu)?;

        let mut read_buffer = BytesMut::with_capacity(MAXIMUM_PDU_SIZE as usize);
        let msg = read_pdu_from_wire(&mut socket, &mut read_buffer, MAXIMUM_PDU_SIZE, self.strict)?;

        let mut buffer: Vec<u8> = Vec::with_capacity(max_pdu_length as usize);
        match msg {
            Pdu::AssociationRQ(AssociationRQ {
                protocol_version,
                calling_ae_title,
                called_ae_title,
                application_context_name,
                presentation_contexts,
                user_variables,
            }) => {
                if protocol_version & 0x0001 != self.protocol_version & 0x0001 {
                    reject(
                        &mut socket,
                        &mut buffer,
                        AssociationRJSource::ServiceProviderAsce(
                            crate::pdu::AssociationRJServiceProviderAsceReason::ProtocolVersionNotSupported,
                        ),
                    )?;
                    return super::RejectedSnafu {
                        association_rj: AssociationRJ {
                            result: AssociationRJResult::Permanent,
                            source: AssociationRJSource::ServiceProviderAsce(
                                crate::pdu::AssociationRJServiceProviderAsceReason::ProtocolVersionNotSupported,
                            ),
                        },
                    }
                    .fail();
                }

                if application_context_name != self.application_context_name {
                    let source = AssociationRJSource::ServiceUser(
                        AssociationRJServiceUserReason::ApplicationContextNameNotSupported,
                    );
                    reject(&mut socket, &mut buffer, source)?;
                    return super::RejectedSnafu {
                        association_rj: AssociationRJ {
                            result: AssociationRJResult::Permanent,
                            source,
                        },
                    }
                    .fail();
                }

                if let Err(reason) = self.ae_access_control.check_access(
                    &self.ae_title,
                    &calling_ae_title,
                    &called_ae_title,
                ) {
                    let source = AssociationRJSource::ServiceUser(reason);
                    reject(&mut socket, &mut buffer, source)?;
                    return super::RejectedSnafu {
                        association_rj: AssociationRJ {
                            result: AssociationRJResult::Permanent,
                            source,
                        },
                    }
                    .fail();
                }

                // fetch the maximum PDU length requested by the peer
                let requestor_max_pdu_length = user_variables
                    .iter()
                    .find_map(|item| match item {
                        UserVariableItem::MaxLength(len) => Some(*len),
                        _ => None,
                    })
                    .unwrap_or(DEFAULT_MAX_PDU);

                // treat 0 as the maximum admitted by this implementation
                let requestor_max_pdu_length = if requestor_max_pdu_length == 0 {
                    MAXIMUM_PDU_SIZE
                } else {
                    requestor_max_pdu_length
                };

                let presentation_contexts: Vec<_> = presentation_contexts
                    .into_iter()
                    .map(|pc| self.negotiate_presentation_context(pc))
                    .collect();

                for pc in &presentation_contexts {
                    debug!(
                        "Presentation context {}: {:?} ({})",
                        pc.id, pc.reason, pc.transfer_syntax
                    );
                }

                // the AC may leave rejected contexts out (see
                // `include_rejected_contexts` for the rationale)
                let contexts_for_ac: Vec<_> = presentation_contexts
                    .iter()
                    .filter(|pc| self.include_rejected_contexts || pc.is_accepted())
                    .cloned()
                    .collect();

                write_pdu(
                    &mut buffer,
                    &Pdu::AssociationAC(AssociationAC {
                        protocol_version: self.protocol_version,
                        calling_ae_title: calling_ae_title.clone(),
                        called_ae_title: self.ae_title.to_string(),
                        application_context_name,
                        presentation_contexts: contexts_for_ac,
                        user_variables: vec![
                            UserVariableItem::MaxLength(max_pdu_length),
                            UserVariableItem::ImplementationClassUID(
                                IMPLEMENTATION_CLASS_UID.to_string(),
                            ),
                            UserVariableItem::ImplementationVersionName(
                                IMPLEMENTATION_VERSION_NAME.to_string(),
                            ),
                        ],
                    }),
                )
                .context(super::SendPduSnafu)?;
                socket.write_all(&buffer).context(super::WireSendSnafu)?;

                Ok(ServerAssociation {
                    presentation_contexts,
                    requestor_max_pdu_length,
                    acceptor_max_pdu_length: max_pdu_length,
                    socket,
                    client_ae_title: calling_ae_title,
                    write_buffer: buffer,
                    read_buffer,
                    strict: self.strict,
                })
            }
            Pdu::ReleaseRQ => {
                write_pdu(&mut buffer, &Pdu::ReleaseRP).context(super::SendPduSnafu)?;
                socket.write_all(&buffer).context(super::WireSendSnafu)?;
                super::AbortedSnafu {
                    source: AbortRQSource::ServiceUser,
                }
                .fail()
            }
            pdu @ (Pdu::AssociationAC { .. }
            | Pdu::AssociationRJ { .. }
            | Pdu::PData { .. }
            | Pdu::ReleaseRP
            | Pdu::AbortRQ { .. }) => {
                abort(&mut socket, &mut buffer)?;
                super::UnexpectedPduSnafu { pdu }.fail()
            }
            pdu @ Pdu::Unknown { .. } => {
                abort(&mut socket, &mut buffer)?;
                super::UnknownPduSnafu { pdu }.fail()
            }
        }
    }

    /// Evaluate a single proposed presentation context:
    ///
    /// 1. when the abstract syntax is not supported,
    ///    the result is abstract-syntax-not-supported (3);
    /// 2. otherwise, the first supported transfer syntax
    ///    in the proposed order is accepted (0);
    /// 3. when no proposed transfer syntax is supported,
    ///    the result is transfer-syntaxes-not-supported (4).
    fn negotiate_presentation_context(
        &self,
        pc: crate::pdu::PresentationContextProposed,
    ) -> PresentationContextResult {
        if !self.supports_abstract_syntax(&pc.abstract_syntax) {
            return PresentationContextResult {
                id: pc.id,
                reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
                transfer_syntax: String::new(),
            };
        }

        match pc
            .transfer_syntaxes
            .iter()
            .find(|ts| self.supports_transfer_syntax(ts))
        {
            Some(ts) => PresentationContextResult {
                id: pc.id,
                reason: PresentationContextResultReason::Acceptance,
                transfer_syntax: ts.to_string(),
            },
            None => PresentationContextResult {
                id: pc.id,
                reason: PresentationContextResultReason::TransferSyntaxesNotSupported,
                transfer_syntax: String::new(),
            },
        }
    }

    fn supports_abstract_syntax(&self, uid: &str) -> bool {
        if self.promiscuous {
            return true;
        }
        let uid = trim_uid(Cow::from(uid));
        self.abstract_syntax_uids.contains(&uid)
            || (self.accept_storage_sop_classes && is_storage_sop_class(&uid))
    }

    fn supports_transfer_syntax(&self, uid: &str) -> bool {
        let uid = trim_uid(Cow::from(uid));
        // the built-in codecs, plus any explicitly admitted syntax
        uid == "1.2.840.10008.1.2"
            || uid == "1.2.840.10008.1.2.1"
            || self.transfer_syntax_uids.contains(&uid)
    }
}

/// Whether the UID identifies a composite object storage SOP class.
/// These are recognized as a family
/// so that a C-STORE of any storage class may be admitted.
fn is_storage_sop_class(uid: &str) -> bool {
    const STORAGE_ROOT: &str = "1.2.840.10008.5.1.4.1.1.";
    uid.starts_with(STORAGE_ROOT) && uid.len() > STORAGE_ROOT.len()
}

fn reject(
    socket: &mut TcpStream,
    buffer: &mut Vec<u8>,
    source: AssociationRJSource,
) -> Result<()> {
    buffer.clear();
    write_pdu(
        buffer,
        &Pdu::AssociationRJ(AssociationRJ {
            result: AssociationRJResult::Permanent,
            source,
        }),
    )
    .context(super::SendPduSnafu)?;
    socket.write_all(buffer).context(super::WireSendSnafu)
}

fn abort(socket: &mut TcpStream, buffer: &mut Vec<u8>) -> Result<()> {
    buffer.clear();
    write_pdu(
        buffer,
        &Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::UnexpectedPdu,
            ),
        },
    )
    .context(super::SendPduSnafu)?;
    let out = socket.write_all(buffer).context(super::WireSendSnafu);
    let _ = socket.shutdown(std::net::Shutdown::Both);
    out
}

/// A DICOM upper level association from the perspective
/// of an accepting application entity.
///
/// The most common operations of an established association are
/// [`send`](Self::send)
/// and [`receive`](Self::receive).
/// Sending large P-Data fragments may be easier through the P-Data sender
/// abstraction (see [`send_pdata`](Self::send_pdata)).
///
/// When the value falls out of scope,
/// the program will shut down the underlying TCP connection.
#[derive(Debug)]
pub struct ServerAssociation {
    /// The accorded presentation contexts, including the rejected ones
    presentation_contexts: Vec<PresentationContextResult>,
    /// The maximum PDU length that the remote application entity accepts
    requestor_max_pdu_length: u32,
    /// The maximum PDU length that this application entity
    /// is expecting to receive
    acceptor_max_pdu_length: u32,
    /// The TCP stream to the other DICOM node
    socket: TcpStream,
    /// The application entity title of the other DICOM node
    client_ae_title: String,
    /// write buffer to send fully assembled PDUs on the wire
    write_buffer: Vec<u8>,
    /// Read buffer from the socket
    read_buffer: BytesMut,
    /// whether to receive PDUs in strict mode
    strict: bool,
}

impl ServerAssociation {
    /// Obtain a view of the negotiated presentation contexts.
    pub fn presentation_contexts(&self) -> &[PresentationContextResult] {
        &self.presentation_contexts
    }

    /// Obtain the transfer syntax negotiated
    /// for the given presentation context, if it was accepted.
    pub fn transfer_syntax_for(&self, presentation_context_id: u8) -> Option<&str> {
        self.presentation_contexts
            .iter()
            .find(|pc| pc.id == presentation_context_id && pc.is_accepted())
            .map(|pc| pc.transfer_syntax.as_str())
    }

    /// Obtain the remote DICOM node's application entity title.
    pub fn client_ae_title(&self) -> &str {
        &self.client_ae_title
    }

    /// Retrieve the maximum PDU length accepted by the peer.
    pub fn requestor_max_pdu_length(&self) -> u32 {
        self.requestor_max_pdu_length
    }

    /// Retrieve the maximum PDU length
    /// that this application entity is expecting to receive.
    pub fn acceptor_max_pdu_length(&self) -> u32 {
        self.acceptor_max_pdu_length
    }

    /// Send a PDU message to the other intervenient.
    pub fn send(&mut self, msg: &Pdu) -> Result<()> {
        self.write_buffer.clear();
        encode_pdu(&mut self.write_buffer, msg, self.requestor_max_pdu_length)?;
        self.socket
            .write_all(&self.write_buffer)
            .context(super::WireSendSnafu)
    }

    /// Read a PDU message from the other intervenient,
    /// blocking until one arrives.
    pub fn receive(&mut self) -> Result<Pdu> {
        read_pdu_from_wire(
            &mut self.socket,
            &mut self.read_buffer,
            self.acceptor_max_pdu_length,
            self.strict,
        )
    }

    /// Check for a PDU which has already arrived,
    /// without blocking for more data.
    ///
    /// Returns `Ok(None)` when no complete PDU is available at this time.
    /// This makes it possible to observe messages
    /// sent by an impatient peer (such as a C-CANCEL request)
    /// in the middle of producing responses to an earlier message.
    pub fn try_receive(&mut self) -> Result<Option<Pdu>> {
        loop {
            let mut buf = Cursor::new(&self.read_buffer[..]);
            if let Some(pdu) = read_pdu(&mut buf, self.acceptor_max_pdu_length, self.strict)
                .context(super::ReceivePduSnafu)?
            {
                self.read_buffer.advance(buf.position() as usize);
                return Ok(Some(pdu));
            }

            self.socket
                .set_nonblocking(true)
                .context(super::SetNonBlockingSnafu)?;
            let mut chunk = [0; 4096];
            let result = self.socket.read(&mut chunk);
            self.socket
                .set_nonblocking(false)
                .context(super::SetNonBlockingSnafu)?;

            match result {
                Ok(0) => return super::ConnectionClosedSnafu.fail(),
                Ok(n) => {
                    self.read_buffer.extend_from_slice(&chunk[..n]);
                }
                Err(e)
                    if e.kind() == std::io::ErrorKind::WouldBlock
                        || e.kind() == std::io::ErrorKind::TimedOut =>
                {
                    return Ok(None);
                }
                Err(e) => return Err(e).context(super::WireReadSnafu),
            }
        }
    }

    /// Send a provider initiated abort message
    /// and shut down the TCP connection,
    /// terminating the association.
    pub fn abort(mut self) -> Result<()> {
        let pdu = Pdu::AbortRQ {
            source: AbortRQSource::ServiceProvider(
                AbortRQServiceProviderReason::ReasonNotSpecified,
            ),
        };
        let out = self.send(&pdu);
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        out
    }

    /// Prepare a P-Data writer for sending
    /// one or more data item PDUs.
    ///
    /// Returns a writer which automatically
    /// splits the inner data into separate PDUs if necessary.
    pub fn send_pdata(
        &mut self,
        presentation_context_id: u8,
        value_type: PDataValueType,
    ) -> PDataWriter<&mut TcpStream> {
        PDataWriter::new(
            &mut self.socket,
            presentation_context_id,
            value_type,
            self.requestor_max_pdu_length,
        )
    }

    /// Prepare a P-Data reader for receiving
    /// one or more data item PDUs.
    ///
    /// Returns a reader which automatically
    /// receives more data PDUs once the bytes collected are consumed.
    pub fn receive_pdata(&mut self) -> PDataReader<'_, &mut TcpStream> {
        PDataReader::new(
            &mut self.socket,
            self.acceptor_max_pdu_length,
            &mut self.read_buffer,
        )
    }

    /// Obtain access to the inner TCP stream
    /// connected to the association requester.
    ///
    /// **Note:** reading and writing should be done with care
    /// to avoid inconsistencies in the association state.
    /// Do not call `send` and `receive` while not in a PDU boundary.
    pub fn inner_stream(&mut self) -> &mut TcpStream {
        &mut self.socket
    }
}
