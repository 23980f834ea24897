//! PDU reader module.

use crate::pdu::*;
use byteordered::byteorder::{BigEndian, ReadBytesExt};
use snafu::{ensure, Backtrace, OptionExt, ResultExt, Snafu};
use std::io::{Cursor, ErrorKind, Read};

/// An error which may occur when reading a PDU from the wire.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ReadError {
    #[snafu(display("Invalid max PDU length {}", max_pdu_length))]
    InvalidMaxPdu {
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not read PDU field `{}`: {}", field, source))]
    ReadPduField {
        field: &'static str,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not read PDU item: {}", source))]
    ReadPduItem {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display("Could not read {} reserved bytes: {}", bytes, source))]
    ReadReserved {
        bytes: u32,
        source: std::io::Error,
        backtrace: Backtrace,
    },

    #[snafu(display(
        "Incoming PDU was too large: length {}, maximum is {}",
        pdu_length,
        max_pdu_length
    ))]
    PduTooLarge {
        pdu_length: u32,
        max_pdu_length: u32,
        backtrace: Backtrace,
    },

    #[snafu(display("PDU contained an invalid value {:?}", var_item))]
    InvalidPduVariable {
        var_item: PduVariableItem,
        backtrace: Backtrace,
    },

    #[snafu(display("Invalid presentation data value item of length {}", length))]
    InvalidPdv { length: u32, backtrace: Backtrace },

    #[snafu(display("Multiple transfer syntaxes were accepted"))]
    MultipleTransferSyntaxesAccepted { backtrace: Backtrace },

    #[snafu(display("Invalid reject source or reason"))]
    InvalidRejectSourceOrReason { backtrace: Backtrace },

    #[snafu(display("Invalid abort source or reason"))]
    InvalidAbortSourceOrReason { backtrace: Backtrace },

    #[snafu(display("Invalid presentation context result reason"))]
    InvalidPresentationContextResultReason { backtrace: Backtrace },

    #[snafu(display("Invalid transfer syntax sub-item"))]
    InvalidTransferSyntaxSubItem { backtrace: Backtrace },

    #[snafu(display("Unknown presentation context sub-item"))]
    UnknownPresentationContextSubItem { backtrace: Backtrace },

    #[snafu(display("Missing application context name"))]
    MissingApplicationContextName { backtrace: Backtrace },

    #[snafu(display("Missing abstract syntax"))]
    MissingAbstractSyntax { backtrace: Backtrace },

    #[snafu(display("Missing transfer syntax in accepted presentation context"))]
    MissingTransferSyntax { backtrace: Backtrace },
}

pub type Result<T, E = ReadError> = std::result::Result<T, E>;

/// Attempt to read a PDU from a source of bytes.
///
/// Returns `Ok(None)` when the source does not yet hold a complete PDU,
/// in which case the caller should obtain more bytes
/// and call this function again over the full accumulated buffer.
///
/// `max_pdu_length` is the maximum PDU length that this node
/// has advertised for the association.
/// When `strict` is false,
/// PDUs exceeding it are tolerated up to [`MAXIMUM_PDU_SIZE`].
pub fn read_pdu<R>(reader: &mut R, max_pdu_length: u32, strict: bool) -> Result<Option<Pdu>>
where
    R: Read,
{
    ensure!(
        (MINIMUM_PDU_SIZE..=MAXIMUM_PDU_SIZE).contains(&max_pdu_length),
        InvalidMaxPduSnafu { max_pdu_length }
    );

    // 1 - PDU-type, 2 - Reserved.
    // An EOF here means that no PDU has started to arrive yet.
    let mut head = [0; 2];
    if let Err(e) = reader.read_exact(&mut head) {
        if e.kind() == ErrorKind::UnexpectedEof {
            return Ok(None);
        }
        return Err(e).context(ReadPduFieldSnafu { field: "type" });
    }
    let pdu_type = head[0];

    // 3-6 - PDU-length - The number of bytes from the first byte of the
    // following field to the last byte of the variable field.
    let pdu_length = match reader.read_u32::<BigEndian>() {
        Ok(len) => len,
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e).context(ReadPduFieldSnafu { field: "length" }),
    };

    // when not in strict mode, tolerate PDUs up to the absolute ceiling
    let effective_max = if strict {
        max_pdu_length
    } else {
        MAXIMUM_PDU_SIZE
    };
    ensure!(
        pdu_length <= effective_max,
        PduTooLargeSnafu {
            pdu_length,
            max_pdu_length: effective_max
        }
    );

    let bytes = read_n(reader, pdu_length as usize).context(ReadPduItemSnafu)?;
    if bytes.len() < pdu_length as usize {
        // the body has not fully arrived yet
        return Ok(None);
    }
    let mut cursor = Cursor::new(bytes);

    match pdu_type {
        0x01 | 0x02 => read_association_pdu(&mut cursor, pdu_type).map(Some),
        0x03 => {
            // A-ASSOCIATE-RJ PDU Structure

            // 7 - Reserved
            cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;

            // 8 - Result: 1 - rejected-permanent, 2 - rejected-transient
            let result = AssociationRJResult::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Result" })?,
            )
            .context(InvalidRejectSourceOrReasonSnafu)?;

            // 9 - Source, 10 - Reason/Diag.
            let source = AssociationRJSource::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Source" })?,
                cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Reason/Diag.",
                })?,
            )
            .context(InvalidRejectSourceOrReasonSnafu)?;

            Ok(Some(Pdu::AssociationRJ(AssociationRJ { result, source })))
        }
        0x04 => {
            // P-DATA-TF PDU Structure

            // 7-xxx - one or more Presentation-data-value items
            let mut values = vec![];
            while cursor.position() < cursor.get_ref().len() as u64 {
                // 1-4 - Item-length - the number of bytes from the first byte
                // of the following field to the last byte of the
                // presentation-data-value field
                let item_length = cursor.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-Length",
                })?;
                // the item must hold at least the context ID
                // and the message control header,
                // and must not extend past the PDU
                let remaining = cursor.get_ref().len() as u64 - cursor.position();
                ensure!(
                    item_length >= 2 && u64::from(item_length) <= remaining,
                    InvalidPdvSnafu {
                        length: item_length
                    }
                );

                // 5 - Presentation-context-ID - odd integers between 1 and 255
                let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Presentation-context-ID",
                })?;

                // 6 - Message control header:
                // bit 0 set means command (else data set),
                // bit 1 set means last fragment of its stream
                let header = cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Message Control Header",
                })?;
                let value_type = if header & 0x01 > 0 {
                    PDataValueType::Command
                } else {
                    PDataValueType::Data
                };
                let is_last = header & 0x02 > 0;

                let data =
                    read_n(&mut cursor, (item_length - 2) as usize).context(ReadPduFieldSnafu {
                        field: "Presentation-data-value",
                    })?;

                values.push(PDataValue {
                    presentation_context_id,
                    value_type,
                    is_last,
                    data,
                })
            }

            Ok(Some(Pdu::PData { data: values }))
        }
        0x05 => {
            // A-RELEASE-RQ PDU Structure: 7-10 - Reserved
            Ok(Some(Pdu::ReleaseRQ))
        }
        0x06 => {
            // A-RELEASE-RP PDU Structure: 7-10 - Reserved
            Ok(Some(Pdu::ReleaseRP))
        }
        0x07 => {
            // A-ABORT PDU Structure

            // 7 - Reserved, 8 - Reserved
            cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;
            cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;

            // 9 - Source: 0 - service-user, 2 - service-provider
            // 10 - Reason/Diag, significant when the source is the provider
            let source = AbortRQSource::from(
                cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Source" })?,
                cursor.read_u8().context(ReadPduFieldSnafu {
                    field: "Reason/Diag",
                })?,
            )
            .context(InvalidAbortSourceOrReasonSnafu)?;

            Ok(Some(Pdu::AbortRQ { source }))
        }
        _ => Ok(Some(Pdu::Unknown {
            pdu_type,
            data: cursor.into_inner(),
        })),
    }
}

/// Read the body of an A-ASSOCIATE-RQ (`0x01`) or A-ASSOCIATE-AC (`0x02`).
/// Both share the same fixed header layout;
/// they differ only in which variable items are admitted.
fn read_association_pdu(cursor: &mut Cursor<Vec<u8>>, pdu_type: u8) -> Result<Pdu> {
    let mut application_context_name: Option<String> = None;
    let mut presentation_contexts_proposed = vec![];
    let mut presentation_contexts_result = vec![];
    let mut user_variables = vec![];

    // 7-8 - Protocol-version - This is Version 1
    // and shall be identified with bit 0 set.
    let protocol_version = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Protocol-version",
    })?;

    // 9-10 - Reserved
    cursor
        .read_u16::<BigEndian>()
        .context(ReadReservedSnafu { bytes: 2_u32 })?;

    // 11-26 - Called-AE-title - 16 characters of the ISO 646:1990 Basic G0 set,
    // with leading and trailing spaces being non-significant.
    // In the AC these bytes are a reserved echo of the request.
    let mut ae_bytes = [0; 16];
    cursor.read_exact(&mut ae_bytes).context(ReadPduFieldSnafu {
        field: "Called-AE-title",
    })?;
    let called_ae_title = decode_ae_title(&ae_bytes);

    // 27-42 - Calling-AE-title - same encoding as the called AE title.
    let mut ae_bytes = [0; 16];
    cursor.read_exact(&mut ae_bytes).context(ReadPduFieldSnafu {
        field: "Calling-AE-title",
    })?;
    let calling_ae_title = decode_ae_title(&ae_bytes);

    // 43-74 - Reserved
    let mut reserved = [0; 32];
    cursor
        .read_exact(&mut reserved)
        .context(ReadReservedSnafu { bytes: 32_u32 })?;

    // 75-xxx - Variable items: one Application Context Item,
    // one or more Presentation Context Items and one User Information Item
    while cursor.position() < cursor.get_ref().len() as u64 {
        match read_pdu_variable(cursor, pdu_type)? {
            PduVariableItem::ApplicationContext(val) => {
                application_context_name = Some(val);
            }
            PduVariableItem::PresentationContextProposed(val) => {
                presentation_contexts_proposed.push(val);
            }
            PduVariableItem::PresentationContextResult(val) => {
                presentation_contexts_result.push(val);
            }
            PduVariableItem::UserVariables(val) => {
                user_variables = val;
            }
            var_item => {
                return InvalidPduVariableSnafu { var_item }.fail();
            }
        }
    }

    let application_context_name =
        application_context_name.context(MissingApplicationContextNameSnafu)?;

    if pdu_type == 0x01 {
        Ok(Pdu::AssociationRQ(AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts: presentation_contexts_proposed,
            user_variables,
        }))
    } else {
        Ok(Pdu::AssociationAC(AssociationAC {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts: presentation_contexts_result,
            user_variables,
        }))
    }
}

fn decode_ae_title(bytes: &[u8; 16]) -> String {
    String::from_utf8_lossy(bytes).trim().to_string()
}

fn decode_uid(bytes: Vec<u8>) -> String {
    String::from_utf8_lossy(&bytes)
        .trim_end_matches(|c: char| c.is_whitespace() || c == '\0')
        .trim_start()
        .to_string()
}

fn read_n<R>(reader: &mut R, bytes_to_read: usize) -> std::io::Result<Vec<u8>>
where
    R: Read,
{
    let mut result = Vec::new();
    reader.take(bytes_to_read as u64).read_to_end(&mut result)?;
    Ok(result)
}

/// Read a single variable item of an association PDU.
/// `pdu_type` decides whether presentation contexts
/// are parsed as proposals (`0x20`) or results (`0x21`).
fn read_pdu_variable<R>(reader: &mut R, pdu_type: u8) -> Result<PduVariableItem>
where
    R: Read,
{
    // 1 - Item-type
    let item_type = reader
        .read_u8()
        .context(ReadPduFieldSnafu { field: "Item-type" })?;

    // 2 - Reserved
    reader
        .read_u8()
        .context(ReadReservedSnafu { bytes: 1_u32 })?;

    // 3-4 - Item-length
    let item_length = reader.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
        field: "Item-length",
    })?;

    let bytes = read_n(reader, item_length as usize).context(ReadPduItemSnafu)?;
    let mut cursor = Cursor::new(bytes);

    match item_type {
        0x10 => {
            // Application Context Item Structure
            Ok(PduVariableItem::ApplicationContext(decode_uid(
                cursor.into_inner(),
            )))
        }
        0x20 if pdu_type == 0x01 => {
            // Presentation Context Item Structure (proposed)

            let mut abstract_syntax: Option<String> = None;
            let mut transfer_syntaxes = vec![];

            // 5 - Presentation-context-ID
            let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;

            // 6, 7, 8 - Reserved
            cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;
            cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;
            cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;

            // 9-xxx - one Abstract Syntax and one or more Transfer Syntax sub-items
            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x30 => {
                        // Abstract Syntax Sub-Item Structure
                        abstract_syntax = Some(decode_uid(
                            read_n(&mut cursor, item_length as usize).context(
                                ReadPduFieldSnafu {
                                    field: "Abstract-syntax-name",
                                },
                            )?,
                        ));
                    }
                    0x40 => {
                        // Transfer Syntax Sub-Item Structure
                        transfer_syntaxes.push(decode_uid(
                            read_n(&mut cursor, item_length as usize).context(
                                ReadPduFieldSnafu {
                                    field: "Transfer-syntax-name",
                                },
                            )?,
                        ));
                    }
                    _ => {
                        return UnknownPresentationContextSubItemSnafu.fail();
                    }
                }
            }

            Ok(PduVariableItem::PresentationContextProposed(
                PresentationContextProposed {
                    id: presentation_context_id,
                    abstract_syntax: abstract_syntax.context(MissingAbstractSyntaxSnafu)?,
                    transfer_syntaxes,
                },
            ))
        }
        0x21 if pdu_type == 0x02 => {
            // Presentation Context Item Structure (result)

            let mut transfer_syntax: Option<String> = None;

            // 5 - Presentation-context-ID
            let presentation_context_id = cursor.read_u8().context(ReadPduFieldSnafu {
                field: "Presentation-context-ID",
            })?;

            // 6 - Reserved
            cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;

            // 7 - Result/Reason
            let reason = PresentationContextResultReason::from(cursor.read_u8().context(
                ReadPduFieldSnafu {
                    field: "Result/Reason",
                },
            )?)
            .context(InvalidPresentationContextResultReasonSnafu)?;

            // 8 - Reserved
            cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;

            // 9-xxx - one Transfer Syntax sub-item.
            // When the Result/Reason field has a value other than acceptance,
            // this field shall not be significant
            // and some peers omit it altogether.
            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x40 => {
                        ensure!(
                            transfer_syntax.is_none(),
                            MultipleTransferSyntaxesAcceptedSnafu
                        );
                        transfer_syntax = Some(decode_uid(
                            read_n(&mut cursor, item_length as usize).context(
                                ReadPduFieldSnafu {
                                    field: "Transfer-syntax-name",
                                },
                            )?,
                        ));
                    }
                    _ => {
                        return InvalidTransferSyntaxSubItemSnafu.fail();
                    }
                }
            }

            // accepted contexts must carry a non-empty transfer syntax
            let transfer_syntax = match (reason, transfer_syntax) {
                (PresentationContextResultReason::Acceptance, Some(ts)) if !ts.is_empty() => ts,
                (PresentationContextResultReason::Acceptance, _) => {
                    return MissingTransferSyntaxSnafu.fail();
                }
                (_, ts) => ts.unwrap_or_default(),
            };

            Ok(PduVariableItem::PresentationContextResult(
                PresentationContextResult {
                    id: presentation_context_id,
                    reason,
                    transfer_syntax,
                },
            ))
        }
        0x50 => {
            // User Information Item Structure

            let mut user_variables = vec![];

            // 5-xxx - User-data sub-items
            while cursor.position() < cursor.get_ref().len() as u64 {
                let item_type = cursor
                    .read_u8()
                    .context(ReadPduFieldSnafu { field: "Item-type" })?;
                cursor.read_u8().context(ReadReservedSnafu { bytes: 1_u32 })?;
                let item_length = cursor.read_u16::<BigEndian>().context(ReadPduFieldSnafu {
                    field: "Item-length",
                })?;

                match item_type {
                    0x51 => {
                        // Maximum Length Sub-Item Structure

                        // 5-8 - Maximum-length-received - restricts the maximum
                        // length of the P-DATA-TF PDUs sent by the acceptor.
                        // The value of (0) indicates that no maximum is specified.
                        user_variables.push(UserVariableItem::MaxLength(
                            cursor.read_u32::<BigEndian>().context(ReadPduFieldSnafu {
                                field: "Maximum-length-received",
                            })?,
                        ));
                    }
                    0x52 => {
                        // Implementation Class UID Sub-Item Structure
                        user_variables.push(UserVariableItem::ImplementationClassUID(decode_uid(
                            read_n(&mut cursor, item_length as usize).context(
                                ReadPduFieldSnafu {
                                    field: "Implementation-class-uid",
                                },
                            )?,
                        )));
                    }
                    0x55 => {
                        // Implementation Version Name Structure
                        user_variables.push(UserVariableItem::ImplementationVersionName(
                            decode_uid(read_n(&mut cursor, item_length as usize).context(
                                ReadPduFieldSnafu {
                                    field: "Implementation-version-name",
                                },
                            )?),
                        ));
                    }
                    _ => {
                        user_variables.push(UserVariableItem::Unknown(
                            item_type,
                            read_n(&mut cursor, item_length as usize)
                                .context(ReadPduFieldSnafu { field: "Unknown" })?,
                        ));
                    }
                }
            }

            Ok(PduVariableItem::UserVariables(user_variables))
        }
        _ => Ok(PduVariableItem::Unknown(item_type)),
    }
}
