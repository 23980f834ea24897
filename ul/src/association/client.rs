//! Association requester module
//!
//! The module provides an abstraction for a DICOM association
//! in which this application entity is the one requesting the association.
//! See [`ClientAssociationOptions`]
//! for details and examples on how to create an association.

use bytes::BytesMut;
use std::{
    borrow::Cow,
    convert::TryFrom,
    io::Write,
    net::{TcpStream, ToSocketAddrs},
    time::Duration,
};

use snafu::{ensure, ResultExt};
use tracing::{debug, warn};

use crate::address::AeAddr;
use crate::pdu::{
    AbortRQSource, AssociationAC, AssociationRQ, Pdu, PresentationContextNegotiated,
    PresentationContextProposed, UserVariableItem, DEFAULT_MAX_PDU, MAXIMUM_PDU_SIZE,
    PDU_HEADER_SIZE,
};
use crate::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

use super::{encode_pdu, pdata::PDataReader, pdata::PDataWriter, read_pdu_from_wire, Result};
use crate::pdu::PDataValueType;

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

/// Timeout configuration for the underlying TCP socket.
#[derive(Debug, Clone, Copy)]
pub struct SocketOptions {
    /// timeout for connection establishment
    pub connect_timeout: Option<Duration>,
    /// timeout for individual read operations
    pub read_timeout: Option<Duration>,
    /// timeout for individual write operations
    pub write_timeout: Option<Duration>,
}

impl Default for SocketOptions {
    fn default() -> Self {
        SocketOptions {
            connect_timeout: Some(Duration::from_secs(30)),
            read_timeout: Some(Duration::from_secs(60)),
            write_timeout: Some(Duration::from_secs(60)),
        }
    }
}

/// A DICOM association builder for a client node.
/// The final outcome is a [`ClientAssociation`].
///
/// This is the standard way of requesting and establishing
/// an association with another DICOM node,
/// that one usually taking the role of a service class provider (SCP).
///
/// ## Basic usage
///
/// ```no_run
/// # use dicomnet_ul::association::ClientAssociationOptions;
/// # use std::time::Duration;
/// # fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let association = ClientAssociationOptions::new()
///    .with_presentation_context(
///        "1.2.840.10008.1.1",
///        vec!["1.2.840.10008.1.2.1", "1.2.840.10008.1.2"],
///    )
///    .read_timeout(Duration::from_secs(60))
///    .establish("129.168.0.5:104")?;
/// # Ok(())
/// # }
/// ```
///
/// ## Presentation contexts
///
/// At least one presentation context must be specified,
/// using the method [`with_presentation_context`](Self::with_presentation_context)
/// and supplying both an abstract syntax and a list of transfer syntaxes,
/// or through the helper method
/// [`with_abstract_syntax`](Self::with_abstract_syntax),
/// which will include the default transfer syntaxes
/// _Explicit VR Little Endian_ and _Implicit VR Little Endian_
/// in the resulting presentation context.
#[derive(Debug, Clone)]
pub struct ClientAssociationOptions<'a> {
    /// the calling AE title
    calling_ae_title: Cow<'a, str>,
    /// the called AE title
    called_ae_title: Option<Cow<'a, str>>,
    /// the requested application context name
    application_context_name: Cow<'a, str>,
    /// the list of requested presentation contexts
    presentation_contexts: Vec<(Cow<'a, str>, Vec<Cow<'a, str>>)>,
    /// the expected protocol version
    protocol_version: u16,
    /// the maximum PDU length requested for receiving PDUs
    max_pdu_length: u32,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// socket options for TCP connections
    socket_options: SocketOptions,
}

impl Default for ClientAssociationOptions<'_> {
    fn default() -> Self {
        ClientAssociationOptions {
            calling_ae_title: "THIS-SCU".into(),
            called_ae_title: None,
            application_context_name: "1.2.840.10008.3.1.1.1".into(),
            presentation_contexts: Vec::new(),
            protocol_version: 1,
            max_pdu_length: DEFAULT_MAX_PDU,
            strict: true,
            socket_options: SocketOptions::default(),
        }
    }
}

impl<'a> ClientAssociationOptions<'a> {
    /// Create a new set of options for establishing an association.
    pub fn new() -> Self {
        Self::default()
    }

    /// Define the calling application entity title for the association,
    /// which refers to this DICOM node.
    ///
    /// The default is `THIS-SCU`.
    pub fn calling_ae_title<T>(mut self, calling_ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        self.calling_ae_title = calling_ae_title.into();
        self
    }

    /// Define the called application entity title for the association,
    /// which refers to the target DICOM node.
    ///
    /// The default is `ANY-SCP`.
    /// Passing an empty string resets the AE title to the default
    /// (or to the one given through
    /// [`establish_with`](ClientAssociationOptions::establish_with)).
    pub fn called_ae_title<T>(mut self, called_ae_title: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        let cae = called_ae_title.into();
        if cae.is_empty() {
            self.called_ae_title = None;
        } else {
            self.called_ae_title = Some(cae);
        }
        self
    }

    /// Include this presentation context
    /// in the list of proposed presentation contexts.
    pub fn with_presentation_context<T>(
        mut self,
        abstract_syntax_uid: T,
        transfer_syntax_uids: Vec<T>,
    ) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        let transfer_syntaxes: Vec<Cow<'a, str>> = transfer_syntax_uids
            .into_iter()
            .map(|t| trim_uid(t.into()))
            .collect();
        self.presentation_contexts
            .push((trim_uid(abstract_syntax_uid.into()), transfer_syntaxes));
        self
    }

    /// Helper to add this abstract syntax
    /// with the default transfer syntaxes
    /// to the list of proposed presentation contexts.
    pub fn with_abstract_syntax<T>(self, abstract_syntax_uid: T) -> Self
    where
        T: Into<Cow<'a, str>>,
    {
        let default_transfer_syntaxes: Vec<Cow<'a, str>> =
            vec!["1.2.840.10008.1.2.1".into(), "1.2.840.10008.1.2".into()];
        self.with_presentation_context(abstract_syntax_uid.into(), default_transfer_syntaxes)
    }

    /// Override the maximum PDU length
    /// that this application entity will admit.
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

    /// Set the connection timeout for the underlying TCP socket.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.socket_options.connect_timeout = Some(timeout);
        self
    }

    /// Set the read timeout for the underlying TCP socket.
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.socket_options.read_timeout = Some(timeout);
        self
    }

    /// Set the write timeout for the underlying TCP socket.
    pub fn write_timeout(mut self, timeout: Duration) -> Self {
        self.socket_options.write_timeout = Some(timeout);
        self
    }

    /// Initiate the TCP connection to the given address
    /// and request a new DICOM association,
    /// negotiating the presentation contexts in the process.
    pub fn establish<A: ToSocketAddrs>(self, address: A) -> Result<ClientAssociation> {
        let addr = AeAddr::new_socket_addr(address);
        self.establish_impl(addr)
    }

    /// Initiate the TCP connection to the given address
    /// and request a new DICOM association,
    /// negotiating the presentation contexts in the process.
    ///
    /// This method allows you to specify the called AE title
    /// alongside with the socket address,
    /// in the form `AE-TITLE@host:port`.
    /// The AE title in this parameter
    /// is overridden by any `called_ae_title` option
    /// previously received.
    pub fn establish_with(self, ae_address: &str) -> Result<ClientAssociation> {
        match AeAddr::<String>::try_from(ae_address) {
            Ok(ae_address) => self.establish_impl(ae_address),
            Err(_) => self.establish_impl(AeAddr::new_socket_addr(ae_address.to_string())),
        }
    }

    /// Construct the A-ASSOCIATE-RQ PDU given the options and the AE title.
    fn create_a_associate_rq(
        &self,
        ae_title: Option<&str>,
    ) -> Result<(Vec<PresentationContextProposed>, Pdu)> {
        // fail if no presentation contexts were provided: they represent
        // intent, should not be omitted by the user
        ensure!(
            !self.presentation_contexts.is_empty(),
            super::MissingAbstractSyntaxSnafu
        );

        // choose called AE title
        let called_ae_title: &str = match (&self.called_ae_title, ae_title) {
            (Some(aec), Some(aet)) => {
                if aec != aet {
                    warn!("Option `called_ae_title` overrides the AE title from `{aet}` to `{aec}`");
                }
                aec
            }
            (Some(aec), None) => aec,
            (None, Some(aet)) => aet,
            (None, None) => "ANY-SCP",
        };

        let presentation_contexts: Vec<_> = self
            .presentation_contexts
            .iter()
            .enumerate()
            .map(|(i, (abstract_syntax, transfer_syntaxes))| PresentationContextProposed {
                // presentation context IDs must be odd
                id: (2 * i + 1) as u8,
                abstract_syntax: abstract_syntax.to_string(),
                transfer_syntaxes: transfer_syntaxes.iter().map(|uid| uid.to_string()).collect(),
            })
            .collect();

        let user_variables = vec![
            UserVariableItem::MaxLength(self.max_pdu_length),
            UserVariableItem::ImplementationClassUID(IMPLEMENTATION_CLASS_UID.to_string()),
            UserVariableItem::ImplementationVersionName(IMPLEMENTATION_VERSION_NAME.to_string()),
        ];

        Ok((
            presentation_contexts.clone(),
            Pdu::AssociationRQ(AssociationRQ {
                protocol_version: self.protocol_version,
                calling_ae_title: self.calling_ae_title.to_string(),
                called_ae_title: called_ae_title.to_string(),
                application_context_name: self.application_context_name.to_string(),
                presentation_contexts,
                user_variables,
            }),
        ))
    }

    fn establish_impl<T>(self, ae_address: AeAddr<T>) -> Result<ClientAssociation>
    where
        T: ToSocketAddrs,
    {
        let (proposed, a_associate_rq) = self.create_a_associate_rq(ae_address.ae_title())?;

        let mut socket = if let Some(timeout) = self.socket_options.connect_timeout {
            // connect_timeout requires a single resolved address
            let addresses = ae_address
                .to_socket_addrs()
                .context(super::ToAddressSnafu)?;
            let mut result = Err(std::io::Error::from(std::io::ErrorKind::AddrNotAvailable));
            for address in addresses {
                result = TcpStream::connect_timeout(&address, timeout);
                if result.is_ok() {
                    break;
                }
            }
            result.context(super::ConnectSnafu)?
        } else {
            TcpStream::connect(&ae_address).context(super::ConnectSnafu)?
        };
        socket
            .set_read_timeout(self.socket_options.read_timeout)
            .context(super::SetReadTimeoutSnafu)?;
        socket
            .set_write_timeout(self.socket_options.write_timeout)
            .context(super::SetWriteTimeoutSnafu)?;

        let mut write_buffer: Vec<u8> = Vec::with_capacity(self.max_pdu_length as usize);
        crate::pdu::write_pdu(&mut write_buffer, &a_associate_rq).context(super::SendPduSnafu)?;
        socket
            .write_all(&write_buffer)
            .context(super::WireSendSnafu)?;
        write_buffer.clear();

        let mut read_buffer =
            BytesMut::with_capacity((self.max_pdu_length + PDU_HEADER_SIZE) as usize);
        let resp =
            read_pdu_from_wire(&mut socket, &mut read_buffer, self.max_pdu_length, self.strict)?;

        match self.process_a_associate_resp(resp, &proposed) {
            Ok((presentation_contexts, peer_max_pdu_length, peer_ae_title)) => {
                Ok(ClientAssociation {
                    presentation_contexts,
                    requestor_max_pdu_length: self.max_pdu_length,
                    acceptor_max_pdu_length: peer_max_pdu_length,
                    socket,
                    write_buffer,
                    read_buffer,
                    strict: self.strict,
                    peer_ae_title,
                    released: false,
                })
            }
            Err(e) => {
                // abort connection before bubbling up the error
                let _ = crate::pdu::write_pdu(
                    &mut write_buffer,
                    &Pdu::AbortRQ {
                        source: AbortRQSource::ServiceUser,
                    },
                );
                let _ = socket.write_all(&write_buffer);
                let _ = socket.shutdown(std::net::Shutdown::Both);
                Err(e)
            }
        }
    }

    /// Process the response to the A-ASSOCIATE-RQ,
    /// returning the negotiated presentation contexts,
    /// the peer's maximum PDU length and the peer's AE title.
    fn process_a_associate_resp(
        &self,
        msg: Pdu,
        proposed: &[PresentationContextProposed],
    ) -> Result<(Vec<PresentationContextNegotiated>, u32, String)> {
        match msg {
            Pdu::AssociationAC(AssociationAC {
                protocol_version: protocol_version_scp,
                calling_ae_title: _,
                called_ae_title,
                application_context_name: _,
                presentation_contexts: presentation_contexts_scp,
                user_variables,
            }) => {
                ensure!(
                    self.protocol_version == protocol_version_scp,
                    super::ProtocolVersionMismatchSnafu {
                        expected: self.protocol_version,
                        got: protocol_version_scp,
                    }
                );

                let acceptor_max_pdu_length = user_variables
                    .iter()
                    .find_map(|item| match item {
                        UserVariableItem::MaxLength(len) => Some(*len),
                        _ => None,
                    })
                    .unwrap_or(DEFAULT_MAX_PDU);

                // treat 0 as the maximum admitted by this implementation
                let acceptor_max_pdu_length = if acceptor_max_pdu_length == 0 {
                    MAXIMUM_PDU_SIZE
                } else {
                    acceptor_max_pdu_length
                };

                // retain the accepted contexts,
                // matched back to the abstract syntaxes they were proposed for
                let presentation_contexts: Vec<_> = presentation_contexts_scp
                    .into_iter()
                    .filter(|c| c.is_accepted())
                    .filter_map(|c| {
                        let pcp = proposed.iter().find(|p| p.id == c.id)?;
                        Some(PresentationContextNegotiated {
                            id: c.id,
                            abstract_syntax: pcp.abstract_syntax.clone(),
                            transfer_syntax: c.transfer_syntax,
                        })
                    })
                    .collect();
                if presentation_contexts.is_empty() {
                    // the association stands, but no operation will find
                    // a usable presentation context
                    debug!("No presentation contexts accepted by the peer");
                }
                Ok((
                    presentation_contexts,
                    acceptor_max_pdu_length,
                    called_ae_title,
                ))
            }
            Pdu::AssociationRJ(association_rj) => {
                super::RejectedSnafu { association_rj }.fail()
            }
            Pdu::AbortRQ { source } => super::AbortedSnafu { source }.fail(),
            pdu @ (Pdu::ReleaseRQ
            | Pdu::ReleaseRP
            | Pdu::AssociationRQ { .. }
            | Pdu::PData { .. }) => super::UnexpectedPduSnafu { pdu }.fail(),
            pdu @ Pdu::Unknown { .. } => super::UnknownPduSnafu { pdu }.fail(),
        }
    }
}

/// A DICOM upper level association from the perspective
/// of a requesting application entity.
///
/// The most common operations of an established association are
/// [`send`](Self::send)
/// and [`receive`](Self::receive).
/// Sending large P-Data fragments may be easier through the P-Data sender
/// abstraction (see [`send_pdata`](Self::send_pdata)).
///
/// When the value falls out of scope,
/// the program will automatically try to gracefully release the association
/// through a standard A-RELEASE message exchange,
/// then shut down the underlying TCP connection.
#[derive(Debug)]
pub struct ClientAssociation {
    /// The presentation contexts accorded with the acceptor application
    /// entity, without the rejected ones
    presentation_contexts: Vec<PresentationContextNegotiated>,
    /// The maximum PDU length that this application entity
    /// is expecting to receive
    requestor_max_pdu_length: u32,
    /// The maximum PDU length that the remote application entity accepts
    acceptor_max_pdu_length: u32,
    /// The TCP stream to the other DICOM node
    socket: TcpStream,
    /// Buffer to assemble PDUs before sending them on the wire
    write_buffer: Vec<u8>,
    /// Buffer to assemble PDUs from the wire before parsing
    read_buffer: BytesMut,
    /// whether to receive PDUs in strict mode
    strict: bool,
    /// The AE title of the peer
    peer_ae_title: String,
    /// Whether the association has already been released or aborted
    released: bool,
}

impl ClientAssociation {
    /// Obtain a view of the negotiated presentation contexts.
    pub fn presentation_contexts(&self) -> &[PresentationContextNegotiated] {
        &self.presentation_contexts
    }

    /// Obtain the accepted presentation context
    /// for the given abstract syntax, if any.
    pub fn presentation_context_for(
        &self,
        abstract_syntax_uid: &str,
    ) -> Option<&PresentationContextNegotiated> {
        let uid = trim_uid(Cow::from(abstract_syntax_uid));
        self.presentation_contexts
            .iter()
            .find(|c| c.abstract_syntax == uid)
    }

    /// Obtain the remote DICOM node's application entity title.
    pub fn peer_ae_title(&self) -> &str {
        &self.peer_ae_title
    }

    /// Retrieve the maximum PDU length admitted by the peer.
    pub fn acceptor_max_pdu_length(&self) -> u32 {
        self.acceptor_max_pdu_length
    }

    /// Retrieve the maximum PDU length
    /// that this application entity is expecting to receive.
    pub fn requestor_max_pdu_length(&self) -> u32 {
        self.requestor_max_pdu_length
    }

    /// Send a PDU message to the other intervenient.
    pub fn send(&mut self, pdu: &Pdu) -> Result<()> {
        self.write_buffer.clear();
        encode_pdu(&mut self.write_buffer, pdu, self.acceptor_max_pdu_length)?;
        self.socket
            .write_all(&self.write_buffer)
            .context(super::WireSendSnafu)
    }

    /// Read a PDU message from the other intervenient.
    pub fn receive(&mut self) -> Result<Pdu> {
        read_pdu_from_wire(
            &mut self.socket,
            &mut self.read_buffer,
            self.requestor_max_pdu_length,
            self.strict,
        )
    }

    /// Gracefully terminate the association
    /// by exchanging A-RELEASE messages,
    /// then shutting down the TCP connection.
    pub fn release(mut self) -> Result<()> {
        let out = self.release_impl();
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        self.released = true;
        out
    }

    /// Send an A-ABORT and shut down the TCP connection,
    /// terminating the association.
    pub fn abort(mut self) -> Result<()> {
        let pdu = Pdu::AbortRQ {
            source: AbortRQSource::ServiceUser,
        };
        let out = self.send(&pdu);
        let _ = self.socket.shutdown(std::net::Shutdown::Both);
        self.released = true;
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
            self.acceptor_max_pdu_length,
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
            self.requestor_max_pdu_length,
            &mut self.read_buffer,
        )
    }

    /// Obtain access to the inner TCP stream
    /// connected to the association acceptor.
    ///
    /// **Note:** reading and writing should be done with care
    /// to avoid inconsistencies in the association state.
    /// Do not call `send` and `receive` while not in a PDU boundary.
    pub fn inner_stream(&mut self) -> &mut TcpStream {
        &mut self.socket
    }

    fn release_impl(&mut self) -> Result<()> {
        self.send(&Pdu::ReleaseRQ)?;
        let pdu = self.receive()?;

        match pdu {
            Pdu::ReleaseRP => Ok(()),
            pdu @ (Pdu::AbortRQ { .. }
            | Pdu::AssociationAC { .. }
            | Pdu::AssociationRJ { .. }
            | Pdu::AssociationRQ { .. }
            | Pdu::PData { .. }
            | Pdu::ReleaseRQ) => super::UnexpectedPduSnafu { pdu }.fail(),
            pdu @ Pdu::Unknown { .. } => super::UnknownPduSnafu { pdu }.fail(),
        }
    }
}

/// Automatically release the association and shut down the connection.
impl Drop for ClientAssociation {
    fn drop(&mut self) {
        if !self.released {
            let _ = self.release_impl();
            let _ = self.socket.shutdown(std::net::Shutdown::Both);
        }
    }
}
