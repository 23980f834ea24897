//! Private plumbing for moving DIMSE messages over an association.
//!
//! The same send and receive paths serve both association roles,
//! so they are written against a small internal socket abstraction.

use dicomnet_ul::association::{ClientAssociation, ServerAssociation};
use dicomnet_ul::pdu::{
    PDataValue, PDataValueType, Pdu, PDU_HEADER_SIZE, PDV_HEADER_SIZE,
};
use snafu::ResultExt;

use crate::assembly::{CompleteMessage, MessageAssembler};
use crate::command::{self, Message};
use crate::error::{
    AssociationSnafu, EncodeCommandSnafu, PeerAbortedSnafu, Result, UnexpectedPduSnafu,
};

/// Internal access to an association, regardless of its role.
pub(crate) trait DimseSocket {
    fn send_pdu(&mut self, pdu: &Pdu) -> Result<(), dicomnet_ul::association::Error>;
    fn receive_pdu(&mut self) -> Result<Pdu, dicomnet_ul::association::Error>;
    fn peer_max_pdu_length(&self) -> u32;
}

impl DimseSocket for ClientAssociation {
    fn send_pdu(&mut self, pdu: &Pdu) -> Result<(), dicomnet_ul::association::Error> {
        self.send(pdu)
    }

    fn receive_pdu(&mut self) -> Result<Pdu, dicomnet_ul::association::Error> {
        self.receive()
    }

    fn peer_max_pdu_length(&self) -> u32 {
        self.acceptor_max_pdu_length()
    }
}

impl DimseSocket for ServerAssociation {
    fn send_pdu(&mut self, pdu: &Pdu) -> Result<(), dicomnet_ul::association::Error> {
        self.send(pdu)
    }

    fn receive_pdu(&mut self) -> Result<Pdu, dicomnet_ul::association::Error> {
        self.receive()
    }

    fn peer_max_pdu_length(&self) -> u32 {
        self.requestor_max_pdu_length()
    }
}

/// Send one DIMSE message:
/// all command fragments first, then all data set fragments, if any.
pub(crate) fn send_message<S>(
    socket: &mut S,
    presentation_context_id: u8,
    msg: &Message,
    dataset: Option<&[u8]>,
) -> Result<()>
where
    S: DimseSocket,
{
    let command = command::encode_message(msg).context(EncodeCommandSnafu)?;
    send_stream(
        socket,
        presentation_context_id,
        PDataValueType::Command,
        &command,
    )?;

    // when the command set declares a data set,
    // a data set stream must follow even if its encoding is empty,
    // or the peer would wait for fragments indefinitely
    if let Some(data) = dataset {
        send_stream(socket, presentation_context_id, PDataValueType::Data, data)?;
    }

    Ok(())
}

/// Send a single command or data set stream,
/// split so that every PDU stays within
/// the maximum PDU length advertised by the peer.
/// Only the final fragment carries the last-fragment flag.
fn send_stream<S>(
    socket: &mut S,
    presentation_context_id: u8,
    value_type: PDataValueType,
    data: &[u8],
) -> Result<()>
where
    S: DimseSocket,
{
    let budget =
        (socket.peer_max_pdu_length() - PDU_HEADER_SIZE - PDV_HEADER_SIZE).max(1) as usize;

    let mut offset = 0;
    loop {
        let end = (offset + budget).min(data.len());
        let is_last = end == data.len();
        socket
            .send_pdu(&Pdu::PData {
                data: vec![PDataValue {
                    presentation_context_id,
                    value_type,
                    is_last,
                    data: data[offset..end].to_vec(),
                }],
            })
            .context(AssociationSnafu)?;
        if is_last {
            break;
        }
        offset = end;
    }

    Ok(())
}

/// Receive PDUs until the assembler yields a complete DIMSE message.
pub(crate) fn receive_message<S>(
    socket: &mut S,
    assembler: &mut MessageAssembler,
) -> Result<CompleteMessage>
where
    S: DimseSocket,
{
    loop {
        match socket.receive_pdu().context(AssociationSnafu)? {
            Pdu::PData { data } => {
                for pdv in data {
                    if let Some(complete) = assembler.push(pdv)? {
                        return Ok(complete);
                    }
                }
            }
            Pdu::AbortRQ { source } => return PeerAbortedSnafu { source }.fail(),
            pdu => return UnexpectedPduSnafu { pdu }.fail(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{command_field, DATA_SET_PRESENT};

    /// A socket that records sent PDUs and replays them on receive.
    struct LoopbackSocket {
        sent: Vec<Pdu>,
        max_pdu_length: u32,
    }

    impl DimseSocket for LoopbackSocket {
        fn send_pdu(&mut self, pdu: &Pdu) -> Result<(), dicomnet_ul::association::Error> {
            self.sent.push(pdu.clone());
            Ok(())
        }

        fn receive_pdu(&mut self) -> Result<Pdu, dicomnet_ul::association::Error> {
            Ok(self.sent.remove(0))
        }

        fn peer_max_pdu_length(&self) -> u32 {
            self.max_pdu_length
        }
    }

    #[test]
    fn fragment_and_reassemble_across_many_pdus() {
        let mut socket = LoopbackSocket {
            sent: Vec::new(),
            max_pdu_length: 16_384,
        };
        let msg = Message {
            command_field: command_field::C_STORE_RQ,
            message_id: 1,
            affected_sop_class_uid: "1.2.840.10008.5.1.4.1.1.2".to_string(),
            affected_sop_instance_uid: "1.2.3".to_string(),
            priority: crate::command::PRIORITY_MEDIUM,
            command_data_set_type: DATA_SET_PRESENT,
            ..Message::default()
        };
        let dataset: Vec<u8> = (0..40_000_u32).map(|i| i as u8).collect();

        send_message(&mut socket, 1, &msg, Some(&dataset)).unwrap();

        // one command PDU, then three data set PDUs under the 16 384 budget
        assert_eq!(socket.sent.len(), 4);
        match &socket.sent[0] {
            Pdu::PData { data } => {
                assert_eq!(data[0].value_type, PDataValueType::Command);
                assert!(data[0].is_last);
            }
            pdu => panic!("Unexpected PDU {:?}", pdu),
        }
        for (i, pdu) in socket.sent[1..].iter().enumerate() {
            match pdu {
                Pdu::PData { data } => {
                    assert_eq!(data[0].value_type, PDataValueType::Data);
                    assert_eq!(data[0].is_last, i == 2);
                }
                pdu => panic!("Unexpected PDU {:?}", pdu),
            }
        }

        let mut assembler = MessageAssembler::default();
        let complete = receive_message(&mut socket, &mut assembler).unwrap();
        assert_eq!(complete.message, msg);
        assert_eq!(complete.dataset, dataset);
    }
}
