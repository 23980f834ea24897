//! DICOM association module.
//!
//! This module contains utilities for establishing associations
//! between DICOM nodes via TCP/IP.
//!
//! As an association requester, often as a service class user (SCU),
//! a new association can be started
//! via the [`ClientAssociationOptions`] type.
//! The minimum required properties are the accepted abstract syntaxes
//! and the TCP socket address to the target node.
//!
//! As an association acceptor,
//! usually taking the role of a service class provider (SCP),
//! a newly created [TCP stream][1] can be passed to
//! a previously prepared [`ServerAssociationOptions`].
//!
//! [1]: std::net::TcpStream

pub mod client;
pub mod pdata;
pub mod server;

use std::io::{BufRead, BufReader, Cursor, Read};

use bytes::{Buf, BytesMut};
use snafu::{ensure, Backtrace, ResultExt, Snafu};

pub use client::{ClientAssociation, ClientAssociationOptions};
pub use pdata::{PDataReader, PDataWriter};
pub use server::{ServerAssociation, ServerAssociationOptions};

use crate::pdu::{
    self, AbortRQSource, AssociationRJ, Pdu, ReadError, WriteError,
};

/// An error which may occur during association negotiation or usage.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// missing at least one abstract syntax to begin negotiation
    MissingAbstractSyntax { backtrace: Backtrace },

    /// could not convert to socket address
    ToAddress {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not connect to peer
    Connect {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not set TCP read timeout
    SetReadTimeout {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not set TCP write timeout
    SetWriteTimeout {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// could not toggle non-blocking mode on the socket
    SetNonBlocking {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// failed to encode an outgoing PDU
    #[snafu(display("failed to send PDU: {}", source))]
    SendPdu {
        #[snafu(backtrace)]
        source: WriteError,
    },

    /// failed to decode an incoming PDU
    #[snafu(display("failed to receive PDU: {}", source))]
    ReceivePdu {
        #[snafu(backtrace)]
        source: ReadError,
    },

    /// failed to send PDU bytes on the wire
    #[non_exhaustive]
    WireSend {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// failed to read PDU bytes from the wire
    #[non_exhaustive]
    WireRead {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("unexpected PDU from peer `{}`", pdu.short_description()))]
    #[non_exhaustive]
    UnexpectedPdu {
        /// the PDU obtained from the peer
        pdu: Box<Pdu>,
    },

    #[snafu(display("unknown PDU from peer `{}`", pdu.short_description()))]
    #[non_exhaustive]
    UnknownPdu {
        /// the PDU obtained from the peer, of variant Unknown
        pdu: Box<Pdu>,
    },

    #[snafu(display("protocol version mismatch: expected {}, got {}", expected, got))]
    ProtocolVersionMismatch {
        expected: u16,
        got: u16,
        backtrace: Backtrace,
    },

    /// association rejected by the peer
    #[snafu(display("association rejected {}", association_rj.source))]
    Rejected {
        association_rj: AssociationRJ,
        backtrace: Backtrace,
    },

    /// association aborted
    #[snafu(display("association aborted ({:?})", source))]
    Aborted {
        #[snafu(source(false))]
        source: AbortRQSource,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "PDU is too large ({} bytes) to be sent to the remote application entity",
        length
    ))]
    #[non_exhaustive]
    SendTooLongPdu { length: usize, backtrace: Backtrace },

    #[snafu(display("connection closed by peer"))]
    ConnectionClosed { backtrace: Backtrace },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Encode a PDU into the provided buffer,
/// ensuring that it does not exceed the peer's maximum PDU length.
pub(crate) fn encode_pdu(buffer: &mut Vec<u8>, pdu: &Pdu, peer_max_pdu_length: u32) -> Result<()> {
    pdu::write_pdu(buffer, pdu).context(SendPduSnafu)?;
    ensure!(
        buffer.len() <= (peer_max_pdu_length + pdu::PDU_HEADER_SIZE) as usize,
        SendTooLongPduSnafu {
            length: buffer.len(),
        }
    );
    Ok(())
}

/// Read a complete PDU from a blocking reader.
///
/// Chunks of data are collected into `read_buffer`,
/// which should be passed in subsequent calls
/// to receive more PDUs from the same stream.
pub(crate) fn read_pdu_from_wire<R>(
    reader: &mut R,
    read_buffer: &mut BytesMut,
    max_pdu_length: u32,
    strict: bool,
) -> Result<Pdu>
where
    R: Read,
{
    let mut reader = BufReader::new(reader);
    loop {
        // try to parse a PDU from what is already buffered
        let mut buf = Cursor::new(&read_buffer[..]);
        if let Some(pdu) =
            pdu::read_pdu(&mut buf, max_pdu_length, strict).context(ReceivePduSnafu)?
        {
            read_buffer.advance(buf.position() as usize);
            return Ok(pdu);
        }

        let recv = reader.fill_buf().context(WireReadSnafu)?;
        let bytes_read = recv.len();
        read_buffer.extend_from_slice(recv);
        reader.consume(bytes_read);
        ensure!(bytes_read != 0, ConnectionClosedSnafu);
    }
}
