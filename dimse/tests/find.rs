//! C-FIND streaming responses and C-CANCEL handling.

use std::net::TcpListener;
use std::time::Duration;

use dicomnet_core::dataset::Element;
use dicomnet_core::tag::tags;
use dicomnet_core::{uids, Dataset, VR};
use dicomnet_dimse::command::{command_field, status, Message};
use dicomnet_dimse::scu::CFindRequest;
use dicomnet_dimse::service::{CancelToken, HandlerError, MessageContext};
use dicomnet_dimse::{responses, Registry, Responder, Scp, ScuOptions, StreamingServiceHandler};

fn match_identifier(n: u16) -> Dataset {
    let mut ds = Dataset::new();
    ds.put(Element::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"));
    ds.put(Element::new(tags::PATIENT_NAME, VR::PN, "DOE^JOHN"));
    ds.put(Element::new(
        tags::STUDY_INSTANCE_UID,
        VR::UI,
        format!("1.2.3.4.5.6.7.8.{}", n),
    ));
    ds
}

/// Emits three matches and a final success.
struct ThreeMatches;

impl StreamingServiceHandler for ThreeMatches {
    fn handle_streaming(
        &self,
        _cancellation: &CancelToken,
        msg: &Message,
        _data: &[u8],
        meta: &MessageContext<'_>,
        responder: &mut Responder<'_>,
    ) -> Result<(), HandlerError> {
        // the query identifier is decoded for us
        let identifier = meta.dataset.expect("query identifier should be decoded");
        assert_eq!(identifier.get_str(tags::QUERY_RETRIEVE_LEVEL), Some("STUDY"));

        for n in 1..=3 {
            responder.send(
                &responses::find_response(msg, status::PENDING, true),
                Some(&match_identifier(n)),
                None,
            )?;
        }
        responder.send(&responses::find_response(msg, status::SUCCESS, false), None, None)?;
        Ok(())
    }
}

/// Emits one match, then gives up on the operation locally.
struct GivesUpLocally;

impl StreamingServiceHandler for GivesUpLocally {
    fn handle_streaming(
        &self,
        cancellation: &CancelToken,
        msg: &Message,
        _data: &[u8],
        _meta: &MessageContext<'_>,
        responder: &mut Responder<'_>,
    ) -> Result<(), HandlerError> {
        responder.send(
            &responses::find_response(msg, status::PENDING, true),
            Some(&match_identifier(1)),
            None,
        )?;
        // the hosting application abandons the task
        cancellation.cancel();
        responder.send(
            &responses::find_response(msg, status::CANCELLED, false),
            None,
            None,
        )?;
        Ok(())
    }
}

/// Emits pending responses until cancelled.
struct PendingUntilCancelled;

impl StreamingServiceHandler for PendingUntilCancelled {
    fn handle_streaming(
        &self,
        _cancellation: &CancelToken,
        msg: &Message,
        _data: &[u8],
        _meta: &MessageContext<'_>,
        responder: &mut Responder<'_>,
    ) -> Result<(), HandlerError> {
        for _ in 0..100 {
            if responder.is_cancelled() {
                responder.send(
                    &responses::find_response(msg, status::CANCELLED, false),
                    None,
                    None,
                )?;
                return Ok(());
            }
            responder.send(
                &responses::find_response(msg, status::PENDING, true),
                Some(&match_identifier(1)),
                None,
            )?;
            std::thread::sleep(Duration::from_millis(10));
        }
        responder.send(&responses::find_response(msg, status::SUCCESS, false), None, None)?;
        Ok(())
    }
}

fn spawn_find_scp<H>(
    handler: H,
) -> (
    std::thread::JoinHandle<Result<(), dicomnet_dimse::Error>>,
    std::net::SocketAddr,
)
where
    H: StreamingServiceHandler + 'static,
{
    let mut registry = Registry::new();
    registry.register_streaming(command_field::C_FIND_RQ, handler);

    let scp = Scp::new(registry)
        .ae_title("QUERY-SCP")
        .with_abstract_syntax(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND);

    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        scp.handle_connection(stream)
    });
    (handle, addr)
}

#[test]
fn c_find_streams_matches_until_terminal_status() {
    let (scp_handle, addr) = spawn_find_scp(ThreeMatches);

    let mut scu = ScuOptions::new()
        .calling_ae_title("QUERY-SCU")
        .propose_sop_class(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND)
        .establish(addr)
        .unwrap();

    let mut query = Dataset::new();
    query.put(Element::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"));
    query.put(Element::new(tags::PATIENT_NAME, VR::PN, "DOE^JOHN"));

    let responses = scu
        .c_find(CFindRequest {
            sop_class_uid: uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND.to_string(),
            message_id: 2,
            priority: 0,
            identifier: query,
        })
        .unwrap();

    assert_eq!(responses.len(), 4);
    for (i, response) in responses.iter().enumerate() {
        assert_eq!(response.message_id, 2);
        if i < 3 {
            assert_eq!(response.status, status::PENDING);
            let identifier = response.identifier.as_ref().expect("match should decode");
            assert_eq!(identifier.get_str(tags::PATIENT_NAME), Some("DOE^JOHN"));
            assert_eq!(
                identifier.get_str(tags::STUDY_INSTANCE_UID),
                Some(format!("1.2.3.4.5.6.7.8.{}", i + 1).as_str())
            );
        } else {
            assert_eq!(response.status, status::SUCCESS);
            assert!(response.identifier.is_none());
        }
    }

    scu.release().unwrap();
    scp_handle
        .join()
        .expect("SCP thread panicked")
        .expect("SCP errored");
}

#[test]
fn c_cancel_interrupts_a_find_in_flight() {
    use dicomnet_core::encode::encode_dataset;
    use dicomnet_core::TransferSyntax;
    use dicomnet_dimse::assembly::MessageAssembler;
    use dicomnet_dimse::command::{decode_message, encode_message, DATA_SET_PRESENT, NO_DATA_SET};
    use dicomnet_ul::association::ClientAssociationOptions;
    use dicomnet_ul::pdu::{PDataValue, PDataValueType, Pdu};

    let (scp_handle, addr) = spawn_find_scp(PendingUntilCancelled);

    // drive the exchange at the PDU level,
    // so the C-CANCEL-RQ goes out while responses are still in flight
    let mut association = ClientAssociationOptions::new()
        .calling_ae_title("QUERY-SCU")
        .with_abstract_syntax(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND)
        .establish(addr)
        .unwrap();
    let pc = association.presentation_contexts()[0].clone();
    let ts = TransferSyntax::from_uid(&pc.transfer_syntax).unwrap();

    let mut query = Dataset::new();
    query.put(Element::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"));

    // C-FIND-RQ with MessageID 7, identifier attached
    let find_rq = Message {
        command_field: command_field::C_FIND_RQ,
        message_id: 7,
        affected_sop_class_uid: uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND
            .to_string(),
        command_data_set_type: DATA_SET_PRESENT,
        ..Message::default()
    };
    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc.id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: encode_message(&find_rq).unwrap(),
            }],
        })
        .unwrap();
    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc.id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: encode_dataset(&query, ts).unwrap(),
            }],
        })
        .unwrap();

    // before any terminal response: C-CANCEL-RQ for message 7
    let cancel_rq = Message {
        command_field: command_field::C_CANCEL_RQ,
        message_id_being_responded_to: 7,
        command_data_set_type: NO_DATA_SET,
        ..Message::default()
    };
    let cancel_bytes = encode_message(&cancel_rq).unwrap();
    // the cancel command set is decodable and carries no data set
    let reparsed = decode_message(&cancel_bytes).unwrap();
    assert_eq!(reparsed.command_field, 0x0FFF);
    assert_eq!(reparsed.message_id_being_responded_to, 7);
    assert!(!reparsed.has_data_set());
    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc.id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: cancel_bytes,
            }],
        })
        .unwrap();

    // collect C-FIND responses until the terminal one
    let mut assembler = MessageAssembler::default();
    let mut statuses = Vec::new();
    'outer: loop {
        match association.receive().unwrap() {
            Pdu::PData { data } => {
                for pdv in data {
                    if let Some(complete) = assembler.push(pdv).unwrap() {
                        assert_eq!(
                            complete.message.command_field,
                            command_field::C_FIND_RSP
                        );
                        assert_eq!(complete.message.message_id_being_responded_to, 7);
                        let terminal = !complete.message.is_pending();
                        statuses.push(complete.message.status);
                        if terminal {
                            break 'outer;
                        }
                    }
                }
            }
            pdu => panic!("Unexpected PDU: {:?}", pdu),
        }
    }

    assert!(
        statuses.len() >= 2,
        "expected at least one pending and one terminal response"
    );
    assert_eq!(*statuses.last().unwrap(), status::CANCELLED);
    for status in &statuses[..statuses.len() - 1] {
        assert_eq!(*status, status::PENDING);
    }

    association.release().unwrap();
    scp_handle
        .join()
        .expect("SCP thread panicked")
        .expect("SCP errored");
}

#[test]
fn local_cancellation_aborts_the_association() {
    use dicomnet_core::encode::encode_dataset;
    use dicomnet_core::TransferSyntax;
    use dicomnet_dimse::assembly::MessageAssembler;
    use dicomnet_dimse::command::{encode_message, DATA_SET_PRESENT};
    use dicomnet_ul::association::ClientAssociationOptions;
    use dicomnet_ul::pdu::{PDataValue, PDataValueType, Pdu};

    let (scp_handle, addr) = spawn_find_scp(GivesUpLocally);

    let mut association = ClientAssociationOptions::new()
        .calling_ae_title("QUERY-SCU")
        .with_abstract_syntax(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND)
        .establish(addr)
        .unwrap();
    let pc = association.presentation_contexts()[0].clone();
    let ts = TransferSyntax::from_uid(&pc.transfer_syntax).unwrap();

    let mut query = Dataset::new();
    query.put(Element::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"));

    let find_rq = Message {
        command_field: command_field::C_FIND_RQ,
        message_id: 8,
        affected_sop_class_uid: uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND
            .to_string(),
        command_data_set_type: DATA_SET_PRESENT,
        ..Message::default()
    };
    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc.id,
                value_type: PDataValueType::Command,
                is_last: true,
                data: encode_message(&find_rq).unwrap(),
            }],
        })
        .unwrap();
    association
        .send(&Pdu::PData {
            data: vec![PDataValue {
                presentation_context_id: pc.id,
                value_type: PDataValueType::Data,
                is_last: true,
                data: encode_dataset(&query, ts).unwrap(),
            }],
        })
        .unwrap();

    // the responses come through as usual: one match, then the
    // cancelled terminal response
    let mut assembler = MessageAssembler::default();
    let mut statuses = Vec::new();
    'outer: loop {
        match association.receive().unwrap() {
            Pdu::PData { data } => {
                for pdv in data {
                    if let Some(complete) = assembler.push(pdv).unwrap() {
                        assert_eq!(
                            complete.message.command_field,
                            command_field::C_FIND_RSP
                        );
                        let terminal = !complete.message.is_pending();
                        statuses.push(complete.message.status);
                        if terminal {
                            break 'outer;
                        }
                    }
                }
            }
            pdu => panic!("Unexpected PDU: {:?}", pdu),
        }
    }
    assert_eq!(statuses, vec![status::PENDING, status::CANCELLED]);

    // unlike a peer C-CANCEL, the local cancellation then tears
    // the association down with an A-ABORT
    match association.receive().unwrap() {
        Pdu::AbortRQ { .. } => {}
        pdu => panic!("Expected A-ABORT, got: {:?}", pdu),
    }

    let err = scp_handle
        .join()
        .expect("SCP thread panicked")
        .expect_err("the connection should end with a cancellation error");
    assert!(matches!(err, dicomnet_dimse::Error::Cancelled { .. }));
}
