use super::*;
use crate::pdu::reader::read_pdu;
use crate::pdu::writer::write_pdu;

fn round_trip(pdu: &Pdu) -> Pdu {
    let mut bytes = Vec::new();
    write_pdu(&mut bytes, pdu).expect("writing should succeed");
    let mut cursor = std::io::Cursor::new(&bytes[..]);
    read_pdu(&mut cursor, MAXIMUM_PDU_SIZE, true)
        .expect("reading should succeed")
        .expect("a full PDU should be available")
}

fn sample_association_rq() -> Pdu {
    Pdu::AssociationRQ(AssociationRQ {
        protocol_version: 1,
        calling_ae_title: "SOME-SCU".to_string(),
        called_ae_title: "THE-SCP".to_string(),
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        presentation_contexts: vec![
            PresentationContextProposed {
                id: 1,
                abstract_syntax: "1.2.840.10008.1.1".to_string(),
                transfer_syntaxes: vec![
                    "1.2.840.10008.1.2.1".to_string(),
                    "1.2.840.10008.1.2".to_string(),
                ],
            },
            PresentationContextProposed {
                id: 3,
                abstract_syntax: "1.2.840.10008.5.1.4.1.1.2".to_string(),
                transfer_syntaxes: vec!["1.2.840.10008.1.2".to_string()],
            },
        ],
        user_variables: vec![
            UserVariableItem::MaxLength(16384),
            UserVariableItem::ImplementationClassUID("2.25.1".to_string()),
            UserVariableItem::ImplementationVersionName("TEST-0.1".to_string()),
        ],
    })
}

#[test]
fn round_trip_association_rq() {
    let pdu = sample_association_rq();
    assert_eq!(round_trip(&pdu), pdu);
}

#[test]
fn round_trip_association_ac() {
    let pdu = Pdu::AssociationAC(AssociationAC {
        protocol_version: 1,
        calling_ae_title: "SOME-SCU".to_string(),
        called_ae_title: "THE-SCP".to_string(),
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        presentation_contexts: vec![PresentationContextResult {
            id: 1,
            reason: PresentationContextResultReason::Acceptance,
            transfer_syntax: "1.2.840.10008.1.2.1".to_string(),
        }],
        user_variables: vec![
            UserVariableItem::MaxLength(16384),
            UserVariableItem::ImplementationClassUID("2.25.1".to_string()),
            UserVariableItem::ImplementationVersionName("TEST-0.1".to_string()),
        ],
    });
    assert_eq!(round_trip(&pdu), pdu);
}

#[test]
fn round_trip_association_ac_with_rejected_context() {
    // rejected contexts carry no transfer syntax sub-item on the wire
    let pdu = Pdu::AssociationAC(AssociationAC {
        protocol_version: 1,
        calling_ae_title: "SOME-SCU".to_string(),
        called_ae_title: "THE-SCP".to_string(),
        application_context_name: "1.2.840.10008.3.1.1.1".to_string(),
        presentation_contexts: vec![PresentationContextResult {
            id: 1,
            reason: PresentationContextResultReason::TransferSyntaxesNotSupported,
            transfer_syntax: String::new(),
        }],
        user_variables: vec![],
    });

    let mut bytes = Vec::new();
    write_pdu(&mut bytes, &pdu).unwrap();
    // no 0x40 sub-item within the presentation context item
    let decoded = round_trip(&pdu);
    match decoded {
        Pdu::AssociationAC(AssociationAC {
            presentation_contexts,
            ..
        }) => {
            assert_eq!(presentation_contexts.len(), 1);
            assert_eq!(
                presentation_contexts[0].reason,
                PresentationContextResultReason::TransferSyntaxesNotSupported
            );
            assert_eq!(presentation_contexts[0].transfer_syntax, "");
        }
        pdu => panic!("Unexpected PDU {:?}", pdu),
    }
}

#[test]
fn round_trip_association_rj() {
    let pdu = Pdu::AssociationRJ(AssociationRJ {
        result: AssociationRJResult::Permanent,
        source: AssociationRJSource::ServiceUser(
            AssociationRJServiceUserReason::CalledAETitleNotRecognized,
        ),
    });
    assert_eq!(round_trip(&pdu), pdu);
}

#[test]
fn round_trip_p_data() {
    let pdu = Pdu::PData {
        data: vec![
            PDataValue {
                presentation_context_id: 1,
                value_type: PDataValueType::Command,
                is_last: true,
                data: vec![0x11; 64],
            },
            PDataValue {
                presentation_context_id: 1,
                value_type: PDataValueType::Data,
                is_last: false,
                data: vec![0x22; 128],
            },
        ],
    };
    assert_eq!(round_trip(&pdu), pdu);
}

#[test]
fn round_trip_release_and_abort() {
    assert_eq!(round_trip(&Pdu::ReleaseRQ), Pdu::ReleaseRQ);
    assert_eq!(round_trip(&Pdu::ReleaseRP), Pdu::ReleaseRP);

    let abort = Pdu::AbortRQ {
        source: AbortRQSource::ServiceProvider(AbortRQServiceProviderReason::UnexpectedPdu),
    };
    assert_eq!(round_trip(&abort), abort);
}

#[test]
fn incomplete_pdu_reads_as_none() {
    let mut bytes = Vec::new();
    write_pdu(&mut bytes, &sample_association_rq()).unwrap();

    for cut in [0, 1, 5, 6, bytes.len() - 1] {
        let mut cursor = std::io::Cursor::new(&bytes[..cut]);
        assert!(
            read_pdu(&mut cursor, MAXIMUM_PDU_SIZE, true)
                .expect("partial data should not be an error")
                .is_none(),
            "a PDU cut at {} bytes should read as incomplete",
            cut
        );
    }
}

#[test]
fn pdu_too_large_is_refused() {
    let pdu = Pdu::PData {
        data: vec![PDataValue {
            presentation_context_id: 1,
            value_type: PDataValueType::Data,
            is_last: true,
            data: vec![0; MINIMUM_PDU_SIZE as usize * 2],
        }],
    };
    let mut bytes = Vec::new();
    write_pdu(&mut bytes, &pdu).unwrap();

    let mut cursor = std::io::Cursor::new(&bytes[..]);
    let err = read_pdu(&mut cursor, MINIMUM_PDU_SIZE, true).unwrap_err();
    assert!(matches!(err, ReadError::PduTooLarge { .. }));

    // non-strict mode admits it up to the absolute ceiling
    let mut cursor = std::io::Cursor::new(&bytes[..]);
    assert!(read_pdu(&mut cursor, MINIMUM_PDU_SIZE, false)
        .unwrap()
        .is_some());
}

#[test]
fn malformed_pdv_is_refused() {
    // a P-DATA-TF whose single PDV declares a one-byte item length
    let bytes = [
        0x04, 0x00, // type + reserved
        0x00, 0x00, 0x00, 0x05, // PDU length
        0x00, 0x00, 0x00, 0x01, // PDV item length (too short)
        0x01, // context ID only, no control header
    ];
    let mut cursor = std::io::Cursor::new(&bytes[..]);
    let err = read_pdu(&mut cursor, MAXIMUM_PDU_SIZE, true).unwrap_err();
    assert!(matches!(err, ReadError::InvalidPdv { .. }));
}

#[test]
fn unknown_pdu_type_is_carried_opaquely() {
    let pdu = Pdu::Unknown {
        pdu_type: 0x7F,
        data: vec![1, 2, 3],
    };
    assert_eq!(round_trip(&pdu), pdu);
}
