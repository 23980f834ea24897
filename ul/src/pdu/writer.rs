//! PDU writer module.

use crate::pdu::*;
use byteordered::byteorder::{BigEndian, WriteBytesExt};
use snafu::{Backtrace, Snafu};
use std::io::Write;

/// An error which may occur when writing a PDU to the wire.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum WriteError {
    /// Failed to write PDU bytes.
    #[snafu(context(false), display("Failed to write PDU: {}", source))]
    Io {
        source: std::io::Error,
        backtrace: Backtrace,
    },

    /// The AE title is not representable on the wire.
    #[snafu(display("AE title `{}` is longer than 16 bytes", ae_title))]
    AeTitleTooLong {
        ae_title: String,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = WriteError> = std::result::Result<T, E>;

/// Write a segment of the PDU preceded by its length
/// as an unsigned 32-bit integer in big endian.
pub(crate) fn write_chunk_u32<F>(writer: &mut dyn Write, func: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data)?;

    writer.write_u32::<BigEndian>(data.len() as u32)?;
    writer.write_all(&data)?;

    Ok(())
}

/// Write a segment of the PDU preceded by its length
/// as an unsigned 16-bit integer in big endian.
pub(crate) fn write_chunk_u16<F>(writer: &mut dyn Write, func: F) -> Result<()>
where
    F: FnOnce(&mut Vec<u8>) -> Result<()>,
{
    let mut data = vec![];
    func(&mut data)?;

    writer.write_u16::<BigEndian>(data.len() as u16)?;
    writer.write_all(&data)?;

    Ok(())
}

/// Encode an AE title as 16 characters of the ISO 646:1990 Basic G0 set,
/// padded with trailing spaces.
fn encode_ae_title(ae_title: &str) -> Result<[u8; 16]> {
    snafu::ensure!(
        ae_title.len() <= 16 && ae_title.is_ascii(),
        AeTitleTooLongSnafu { ae_title }
    );
    let mut out = [b' '; 16];
    out[..ae_title.len()].copy_from_slice(ae_title.as_bytes());
    Ok(out)
}

/// Write a PDU into the given writer.
pub fn write_pdu<W>(writer: &mut W, pdu: &Pdu) -> Result<()>
where
    W: Write,
{
    match pdu {
        Pdu::AssociationRQ(AssociationRQ {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        }) => {
            // A-ASSOCIATE-RQ PDU Structure

            // 1 - PDU-type - 01H, 2 - Reserved
            writer.write_u8(0x01)?;
            writer.write_u8(0x00)?;

            write_chunk_u32(writer, |writer| {
                // 7-8 - Protocol-version - This is Version 1
                // and shall be identified with bit 0 set.
                writer.write_u16::<BigEndian>(*protocol_version)?;

                // 9-10 - Reserved
                writer.write_u16::<BigEndian>(0x0000)?;

                // 11-26 - Called-AE-title - 16 characters with leading and
                // trailing spaces being non-significant
                writer.write_all(&encode_ae_title(called_ae_title)?)?;

                // 27-42 - Calling-AE-title
                writer.write_all(&encode_ae_title(calling_ae_title)?)?;

                // 43-74 - Reserved
                writer.write_all(&[0u8; 32])?;

                // 75-xxx - Variable items: one Application Context Item,
                // one or more Presentation Context Items
                // and one User Information Item
                write_pdu_variable_application_context_name(writer, application_context_name)?;

                for presentation_context in presentation_contexts {
                    write_pdu_variable_presentation_context_proposed(writer, presentation_context)?;
                }

                write_pdu_variable_user_variables(writer, user_variables)?;

                Ok(())
            })
        }
        Pdu::AssociationAC(AssociationAC {
            protocol_version,
            calling_ae_title,
            called_ae_title,
            application_context_name,
            presentation_contexts,
            user_variables,
        }) => {
            // A-ASSOCIATE-AC PDU Structure

            // 1 - PDU-type - 02H, 2 - Reserved
            writer.write_u8(0x02)?;
            writer.write_u8(0x00)?;

            write_chunk_u32(writer, |writer| {
                // 7-8 - Protocol-version
                writer.write_u16::<BigEndian>(*protocol_version)?;

                // 9-10 - Reserved
                writer.write_u16::<BigEndian>(0x0000)?;

                // 11-26, 27-42 - Reserved - sent with a value identical to the
                // value received in the A-ASSOCIATE-RQ,
                // but not tested when received
                writer.write_all(&encode_ae_title(called_ae_title)?)?;
                writer.write_all(&encode_ae_title(calling_ae_title)?)?;

                // 43-74 - Reserved
                writer.write_all(&[0u8; 32])?;

                // 75-xxx - Variable items
                write_pdu_variable_application_context_name(writer, application_context_name)?;

                for presentation_context in presentation_contexts {
                    write_pdu_variable_presentation_context_result(writer, presentation_context)?;
                }

                write_pdu_variable_user_variables(writer, user_variables)?;

                Ok(())
            })
        }
        Pdu::AssociationRJ(AssociationRJ { result, source }) => {
            // A-ASSOCIATE-RJ PDU Structure

            // 1 - PDU-type - 03H, 2 - Reserved
            writer.write_u8(0x03)?;
            writer.write_u8(0x00)?;

            write_chunk_u32(writer, |writer| {
                // 7 - Reserved
                writer.write_u8(0x00)?;

                // 8 - Result: 1 - rejected-permanent, 2 - rejected-transient
                match result {
                    AssociationRJResult::Permanent => writer.write_u8(0x01)?,
                    AssociationRJResult::Transient => writer.write_u8(0x02)?,
                }

                // 9 - Source, 10 - Reason/Diag.
                match source {
                    AssociationRJSource::ServiceUser(reason) => {
                        writer.write_u8(0x01)?;
                        match reason {
                            AssociationRJServiceUserReason::NoReasonGiven => {
                                writer.write_u8(0x01)?
                            }
                            AssociationRJServiceUserReason::ApplicationContextNameNotSupported => {
                                writer.write_u8(0x02)?
                            }
                            AssociationRJServiceUserReason::CallingAETitleNotRecognized => {
                                writer.write_u8(0x03)?
                            }
                            AssociationRJServiceUserReason::CalledAETitleNotRecognized => {
                                writer.write_u8(0x07)?
                            }
                            AssociationRJServiceUserReason::Reserved(value) => {
                                writer.write_u8(*value)?
                            }
                        }
                    }
                    AssociationRJSource::ServiceProviderAsce(reason) => {
                        writer.write_u8(0x02)?;
                        match reason {
                            AssociationRJServiceProviderAsceReason::NoReasonGiven => {
                                writer.write_u8(0x01)?
                            }
                            AssociationRJServiceProviderAsceReason::ProtocolVersionNotSupported => {
                                writer.write_u8(0x02)?
                            }
                        }
                    }
                    AssociationRJSource::ServiceProviderPresentation(reason) => {
                        writer.write_u8(0x03)?;
                        match reason {
                            AssociationRJServiceProviderPresentationReason::TemporaryCongestion => {
                                writer.write_u8(0x01)?
                            }
                            AssociationRJServiceProviderPresentationReason::LocalLimitExceeded => {
                                writer.write_u8(0x02)?
                            }
                            AssociationRJServiceProviderPresentationReason::Reserved(value) => {
                                writer.write_u8(*value)?
                            }
                        }
                    }
                }

                Ok(())
            })
        }
        Pdu::PData { data } => {
            // P-DATA-TF PDU Structure

            // 1 - PDU-type - 04H, 2 - Reserved
            writer.write_u8(0x04)?;
            writer.write_u8(0x00)?;

            write_chunk_u32(writer, |writer| {
                // 7-xxx - one or more Presentation-data-value items
                for pdv in data {
                    write_chunk_u32(writer, |writer| {
                        // 5 - Presentation-context-ID
                        writer.write_u8(pdv.presentation_context_id)?;

                        // 6 - Message control header:
                        // bit 0 set for command fragments,
                        // bit 1 set on the last fragment of its stream
                        let mut header = 0x00;
                        if pdv.value_type == PDataValueType::Command {
                            header |= 0x01;
                        }
                        if pdv.is_last {
                            header |= 0x02;
                        }
                        writer.write_u8(header)?;

                        // message fragment
                        writer.write_all(&pdv.data)?;

                        Ok(())
                    })?;
                }

                Ok(())
            })
        }
        Pdu::ReleaseRQ => {
            // A-RELEASE-RQ PDU Structure

            // 1 - PDU-type - 05H, 2 - Reserved
            writer.write_u8(0x05)?;
            writer.write_u8(0x00)?;

            write_chunk_u32(writer, |writer| {
                // 7-10 - Reserved
                writer.write_all(&[0u8; 4])?;
                Ok(())
            })
        }
        Pdu::ReleaseRP => {
            // A-RELEASE-RP PDU Structure

            // 1 - PDU-type - 06H, 2 - Reserved
            writer.write_u8(0x06)?;
            writer.write_u8(0x00)?;

            write_chunk_u32(writer, |writer| {
                // 7-10 - Reserved
                writer.write_all(&[0u8; 4])?;
                Ok(())
            })
        }
        Pdu::AbortRQ { source } => {
            // A-ABORT PDU Structure

            // 1 - PDU-type - 07H, 2 - Reserved
            writer.write_u8(0x07)?;
            writer.write_u8(0x00)?;

            write_chunk_u32(writer, |writer| {
                // 7 - Reserved, 8 - Reserved
                writer.write_u8(0x00)?;
                writer.write_u8(0x00)?;

                // 9 - Source: 0 - service-user, 2 - service-provider
                // 10 - Reason/Diag: significant only for the provider,
                // sent as 00H otherwise
                match source {
                    AbortRQSource::ServiceUser | AbortRQSource::Reserved => {
                        writer.write_u8(0x00)?;
                        writer.write_u8(0x00)?;
                    }
                    AbortRQSource::ServiceProvider(reason) => {
                        writer.write_u8(0x02)?;
                        match reason {
                            AbortRQServiceProviderReason::ReasonNotSpecified => {
                                writer.write_u8(0x00)?
                            }
                            AbortRQServiceProviderReason::UnrecognizedPdu => {
                                writer.write_u8(0x01)?
                            }
                            AbortRQServiceProviderReason::UnexpectedPdu => writer.write_u8(0x02)?,
                            AbortRQServiceProviderReason::Reserved => writer.write_u8(0x03)?,
                            AbortRQServiceProviderReason::UnrecognizedPduParameter => {
                                writer.write_u8(0x04)?
                            }
                            AbortRQServiceProviderReason::UnexpectedPduParameter => {
                                writer.write_u8(0x05)?
                            }
                            AbortRQServiceProviderReason::InvalidPduParameter => {
                                writer.write_u8(0x06)?
                            }
                        }
                    }
                }

                Ok(())
            })
        }
        Pdu::Unknown { pdu_type, data } => {
            // 1 - PDU-type, 2 - Reserved
            writer.write_u8(*pdu_type)?;
            writer.write_u8(0x00)?;

            write_chunk_u32(writer, |writer| {
                writer.write_all(data)?;
                Ok(())
            })
        }
    }
}

fn write_pdu_variable_application_context_name(
    writer: &mut dyn Write,
    application_context_name: &str,
) -> Result<()> {
    // Application Context Item Structure

    // 1 - Item-type - 10H, 2 - Reserved
    writer.write_u8(0x10)?;
    writer.write_u8(0x00)?;

    write_chunk_u16(writer, |writer| {
        // 5-xxx - Application-context-name
        writer.write_all(application_context_name.as_bytes())?;
        Ok(())
    })
}

fn write_pdu_variable_presentation_context_proposed(
    writer: &mut dyn Write,
    presentation_context: &PresentationContextProposed,
) -> Result<()> {
    // Presentation Context Item Structure (proposed)

    // 1 - Item-type - 20H, 2 - Reserved
    writer.write_u8(0x20)?;
    writer.write_u8(0x00)?;

    write_chunk_u16(writer, |writer| {
        // 5 - Presentation-context-ID - odd integers between 1 and 255
        writer.write_u8(presentation_context.id)?;

        // 6, 7, 8 - Reserved
        writer.write_all(&[0u8; 3])?;

        // 9-xxx - one Abstract Syntax and one or more Transfer Syntax sub-items

        // Abstract Syntax Sub-Item: 1 - Item-type - 30H, 2 - Reserved
        writer.write_u8(0x30)?;
        writer.write_u8(0x00)?;
        write_chunk_u16(writer, |writer| {
            writer.write_all(presentation_context.abstract_syntax.as_bytes())?;
            Ok(())
        })?;

        for transfer_syntax in &presentation_context.transfer_syntaxes {
            // Transfer Syntax Sub-Item: 1 - Item-type - 40H, 2 - Reserved
            writer.write_u8(0x40)?;
            writer.write_u8(0x00)?;
            write_chunk_u16(writer, |writer| {
                writer.write_all(transfer_syntax.as_bytes())?;
                Ok(())
            })?;
        }

        Ok(())
    })
}

fn write_pdu_variable_presentation_context_result(
    writer: &mut dyn Write,
    presentation_context: &PresentationContextResult,
) -> Result<()> {
    // Presentation Context Item Structure (result)

    // 1 - Item-type - 21H, 2 - Reserved
    writer.write_u8(0x21)?;
    writer.write_u8(0x00)?;

    write_chunk_u16(writer, |writer| {
        // 5 - Presentation-context-ID
        writer.write_u8(presentation_context.id)?;

        // 6 - Reserved
        writer.write_u8(0x00)?;

        // 7 - Result/Reason
        writer.write_u8(match presentation_context.reason {
            PresentationContextResultReason::Acceptance => 0,
            PresentationContextResultReason::UserRejection => 1,
            PresentationContextResultReason::NoReason => 2,
            PresentationContextResultReason::AbstractSyntaxNotSupported => 3,
            PresentationContextResultReason::TransferSyntaxesNotSupported => 4,
        })?;

        // 8 - Reserved
        writer.write_u8(0x00)?;

        // 9-xxx - Transfer syntax sub-item, present only for accepted
        // contexts. Rejected contexts carry no sub-items:
        // the field is not significant when the result is not acceptance,
        // and some widely deployed peers refuse sub-items there.
        if presentation_context.is_accepted() {
            writer.write_u8(0x40)?;
            writer.write_u8(0x00)?;
            write_chunk_u16(writer, |writer| {
                writer.write_all(presentation_context.transfer_syntax.as_bytes())?;
                Ok(())
            })?;
        }

        Ok(())
    })
}

fn write_pdu_variable_user_variables(
    writer: &mut dyn Write,
    user_variables: &[UserVariableItem],
) -> Result<()> {
    if user_variables.is_empty() {
        return Ok(());
    }

    // User Information Item Structure

    // 1 - Item-type - 50H, 2 - Reserved
    writer.write_u8(0x50)?;
    writer.write_u8(0x00)?;

    write_chunk_u16(writer, |writer| {
        // 5-xxx - User-data sub-items
        for user_variable in user_variables {
            match user_variable {
                UserVariableItem::MaxLength(max_length) => {
                    // Maximum Length Sub-Item: 1 - Item-type - 51H, 2 - Reserved
                    writer.write_u8(0x51)?;
                    writer.write_u8(0x00)?;
                    write_chunk_u16(writer, |writer| {
                        // 5-8 - Maximum-length-received
                        writer.write_u32::<BigEndian>(*max_length)?;
                        Ok(())
                    })?;
                }
                UserVariableItem::ImplementationClassUID(uid) => {
                    // Implementation Class UID Sub-Item:
                    // 1 - Item-type - 52H, 2 - Reserved
                    writer.write_u8(0x52)?;
                    writer.write_u8(0x00)?;
                    write_chunk_u16(writer, |writer| {
                        writer.write_all(uid.as_bytes())?;
                        Ok(())
                    })?;
                }
                UserVariableItem::ImplementationVersionName(name) => {
                    // Implementation Version Name Sub-Item:
                    // 1 - Item-type - 55H, 2 - Reserved
                    writer.write_u8(0x55)?;
                    writer.write_u8(0x00)?;
                    write_chunk_u16(writer, |writer| {
                        writer.write_all(name.as_bytes())?;
                        Ok(())
                    })?;
                }
                UserVariableItem::Unknown(item_type, data) => {
                    writer.write_u8(*item_type)?;
                    writer.write_u8(0x00)?;
                    write_chunk_u16(writer, |writer| {
                        writer.write_all(data)?;
                        Ok(())
                    })?;
                }
            }
        }

        Ok(())
    })
}
