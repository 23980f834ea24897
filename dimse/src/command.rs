//! DIMSE command set representation and codec.
//!
//! Command sets are always encoded in Implicit VR Little Endian,
//! regardless of the transfer syntax negotiated
//! for the presentation context carrying them.

use byteordered::byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use snafu::{Backtrace, Snafu};

/// DIMSE command field values.
pub mod command_field {
    pub const C_STORE_RQ: u16 = 0x0001;
    pub const C_STORE_RSP: u16 = 0x8001;
    pub const C_GET_RQ: u16 = 0x0010;
    pub const C_GET_RSP: u16 = 0x8010;
    pub const C_FIND_RQ: u16 = 0x0020;
    pub const C_FIND_RSP: u16 = 0x8020;
    pub const C_MOVE_RQ: u16 = 0x0021;
    pub const C_MOVE_RSP: u16 = 0x8021;
    pub const C_ECHO_RQ: u16 = 0x0030;
    pub const C_ECHO_RSP: u16 = 0x8030;
    pub const C_CANCEL_RQ: u16 = 0x0FFF;

    /// The response command field for the given request command field.
    /// C-CANCEL is one-way and has no response command.
    pub fn response_for(request: u16) -> u16 {
        request | 0x8000
    }
}

/// DIMSE status codes and their classification.
pub mod status {
    /// The operation completed successfully.
    pub const SUCCESS: u16 = 0x0000;
    /// An intermediate response; more responses follow.
    pub const PENDING: u16 = 0xFF00;
    /// An intermediate response with warnings; more responses follow.
    pub const PENDING_WARNING: u16 = 0xFF01;
    /// The operation was terminated by a C-CANCEL request.
    pub const CANCELLED: u16 = 0xFE00;
    /// General processing failure.
    pub const PROCESSING_FAILURE: u16 = 0xC000;

    /// Whether the status identifies an intermediate response.
    pub fn is_pending(status: u16) -> bool {
        status == PENDING || status == PENDING_WARNING
    }

    /// Whether the status identifies a warning outcome.
    pub fn is_warning(status: u16) -> bool {
        status == 0x0001 || (0x0100..=0x01FF).contains(&status) || (0xB000..=0xBFFF).contains(&status)
    }

    /// Whether the status identifies a failure outcome.
    pub fn is_failure(status: u16) -> bool {
        (0xA000..=0xAFFF).contains(&status) || (0xC000..=0xCFFF).contains(&status)
    }
}

/// The conventional wire encoding of a MEDIUM priority.
///
/// The value `0x0000` also means medium priority,
/// but some peers refuse a C-STORE command
/// whose Priority element is absent,
/// and elements with a zero value are not emitted;
/// request operations therefore carry this non-zero encoding.
pub const PRIORITY_MEDIUM: u16 = 0x0002;

/// CommandDataSetType value declaring that no data set follows.
pub const NO_DATA_SET: u16 = 0x0101;

/// CommandDataSetType value declaring that a data set follows.
pub const DATA_SET_PRESENT: u16 = 0x0000;

/// The ceiling admitted for a single command set element value.
/// Command sets are small by construction;
/// a larger declared length means a broken or malicious peer.
pub const MAX_COMMAND_VALUE_LENGTH: u32 = 1 << 20;

/// An error which may occur when encoding a DIMSE command set.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum EncodeError {
    /// A UID value in the message is not plain ASCII.
    #[snafu(display("command set element ({:#06x}) holds a non-ASCII value", element))]
    InvalidText { element: u16, backtrace: Backtrace },
}

/// An error which may occur when decoding a DIMSE command set.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum DecodeError {
    /// An element declared a length past the admissible ceiling.
    #[snafu(display(
        "command set element ({:#06x}) declares {} bytes, over the {} ceiling",
        element,
        length,
        MAX_COMMAND_VALUE_LENGTH
    ))]
    ValueTooLong {
        element: u16,
        length: u32,
        backtrace: Backtrace,
    },

    /// The command set has no command field element.
    #[snafu(display("command set has no command field"))]
    MissingCommandField { backtrace: Backtrace },
}

/// A DIMSE message command set.
///
/// This is a structured view over the elements of the command group.
/// String fields left empty, numeric fields left zero
/// and counters left `None` are not emitted on encoding,
/// except for the command field and the data set type,
/// which are always present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// (0000,0100) CommandField
    pub command_field: u16,
    /// (0000,0110) MessageID
    pub message_id: u16,
    /// (0000,0120) MessageIDBeingRespondedTo
    pub message_id_being_responded_to: u16,
    /// (0000,0002) AffectedSOPClassUID
    pub affected_sop_class_uid: String,
    /// (0000,0003) RequestedSOPClassUID
    pub requested_sop_class_uid: String,
    /// (0000,1000) AffectedSOPInstanceUID
    pub affected_sop_instance_uid: String,
    /// (0000,0600) MoveDestination: the AE title of the move destination
    pub move_destination: String,
    /// (0000,0700) Priority
    pub priority: u16,
    /// (0000,0800) CommandDataSetType:
    /// `0x0101` means that no data set follows
    pub command_data_set_type: u16,
    /// (0000,0900) Status
    pub status: u16,
    /// (0000,1020) NumberOfRemainingSuboperations
    pub remaining_suboperations: Option<u16>,
    /// (0000,1021) NumberOfCompletedSuboperations
    pub completed_suboperations: Option<u16>,
    /// (0000,1022) NumberOfFailedSuboperations
    pub failed_suboperations: Option<u16>,
    /// (0000,1023) NumberOfWarningSuboperations
    pub warning_suboperations: Option<u16>,
    /// The transfer syntax negotiated for the carrying presentation context.
    /// Propagated in memory only; never encoded into the command set.
    pub transfer_syntax_uid: String,
}

impl Default for Message {
    fn default() -> Self {
        Message {
            command_field: 0,
            message_id: 0,
            message_id_being_responded_to: 0,
            affected_sop_class_uid: String::new(),
            requested_sop_class_uid: String::new(),
            affected_sop_instance_uid: String::new(),
            move_destination: String::new(),
            priority: 0,
            command_data_set_type: NO_DATA_SET,
            status: 0,
            remaining_suboperations: None,
            completed_suboperations: None,
            failed_suboperations: None,
            warning_suboperations: None,
            transfer_syntax_uid: String::new(),
        }
    }
}

impl Message {
    /// Whether the command declares that a data set follows
    /// on the same presentation context.
    pub fn has_data_set(&self) -> bool {
        self.command_data_set_type != NO_DATA_SET
    }

    /// Whether the status field identifies an intermediate response.
    pub fn is_pending(&self) -> bool {
        status::is_pending(self.status)
    }
}

/// Encode a command set in Implicit VR Little Endian.
///
/// The command group length element `(0000,0000)`
/// is computed over the encoded elements and emitted first.
pub fn encode_message(msg: &Message) -> Result<Vec<u8>, EncodeError> {
    let mut elements = Vec::with_capacity(256);

    if !msg.affected_sop_class_uid.is_empty() {
        put_uid(&mut elements, 0x0002, &msg.affected_sop_class_uid)?;
    }
    if !msg.requested_sop_class_uid.is_empty() {
        put_uid(&mut elements, 0x0003, &msg.requested_sop_class_uid)?;
    }

    put_u16(&mut elements, 0x0100, msg.command_field);

    if msg.message_id != 0 {
        put_u16(&mut elements, 0x0110, msg.message_id);
    }
    if msg.message_id_being_responded_to != 0 {
        put_u16(&mut elements, 0x0120, msg.message_id_being_responded_to);
    }
    if !msg.move_destination.is_empty() {
        // AE titles are space padded to an even length
        put_text(&mut elements, 0x0600, &msg.move_destination, b' ')?;
    }
    if msg.priority != 0 {
        put_u16(&mut elements, 0x0700, msg.priority);
    }

    put_u16(&mut elements, 0x0800, msg.command_data_set_type);

    if msg.status != 0 {
        put_u16(&mut elements, 0x0900, msg.status);
    }
    if !msg.affected_sop_instance_uid.is_empty() {
        put_uid(&mut elements, 0x1000, &msg.affected_sop_instance_uid)?;
    }
    if let Some(count) = msg.remaining_suboperations {
        put_u16(&mut elements, 0x1020, count);
    }
    if let Some(count) = msg.completed_suboperations {
        put_u16(&mut elements, 0x1021, count);
    }
    if let Some(count) = msg.failed_suboperations {
        put_u16(&mut elements, 0x1022, count);
    }
    if let Some(count) = msg.warning_suboperations {
        put_u16(&mut elements, 0x1023, count);
    }

    // (0000,0000) CommandGroupLength covers every element after itself
    let mut out = Vec::with_capacity(elements.len() + 12);
    out.write_u16::<LittleEndian>(0x0000).expect("writing to a vec");
    out.write_u16::<LittleEndian>(0x0000).expect("writing to a vec");
    out.write_u32::<LittleEndian>(4).expect("writing to a vec");
    out.write_u32::<LittleEndian>(elements.len() as u32)
        .expect("writing to a vec");
    out.extend_from_slice(&elements);
    Ok(out)
}

/// Decode a command set from Implicit VR Little Endian bytes.
///
/// Elements outside the command group are silently skipped.
/// A missing CommandDataSetType defaults to "no data set present".
pub fn decode_message(data: &[u8]) -> Result<Message, DecodeError> {
    let mut msg = Message::default();
    let mut seen_command_field = false;
    let mut offset = 0;

    while offset + 8 <= data.len() {
        let group = LittleEndian::read_u16(&data[offset..]);
        let element = LittleEndian::read_u16(&data[offset + 2..]);
        let length = LittleEndian::read_u32(&data[offset + 4..]);

        snafu::ensure!(
            length <= MAX_COMMAND_VALUE_LENGTH,
            ValueTooLongSnafu { element, length }
        );

        let length = length as usize;
        if offset + 8 + length > data.len() {
            break;
        }
        let value = &data[offset + 8..offset + 8 + length];
        offset += 8 + length;

        if group != 0x0000 {
            // not part of the command group
            continue;
        }

        match element {
            0x0002 => msg.affected_sop_class_uid = get_text(value),
            0x0003 => msg.requested_sop_class_uid = get_text(value),
            0x0100 => {
                if let Some(v) = get_u16(value) {
                    msg.command_field = v;
                    seen_command_field = true;
                }
            }
            0x0110 => msg.message_id = get_u16(value).unwrap_or(0),
            0x0120 => msg.message_id_being_responded_to = get_u16(value).unwrap_or(0),
            0x0600 => msg.move_destination = get_text(value),
            0x0700 => msg.priority = get_u16(value).unwrap_or(0),
            0x0800 => msg.command_data_set_type = get_u16(value).unwrap_or(NO_DATA_SET),
            0x0900 => msg.status = get_u16(value).unwrap_or(0),
            0x1000 => msg.affected_sop_instance_uid = get_text(value),
            0x1020 => msg.remaining_suboperations = get_u16(value),
            0x1021 => msg.completed_suboperations = get_u16(value),
            0x1022 => msg.failed_suboperations = get_u16(value),
            0x1023 => msg.warning_suboperations = get_u16(value),
            // (0000,0000) group length and anything else: skipped
            _ => {}
        }
    }

    snafu::ensure!(seen_command_field, MissingCommandFieldSnafu);
    Ok(msg)
}

fn put_u16(out: &mut Vec<u8>, element: u16, value: u16) {
    out.write_u16::<LittleEndian>(0x0000).expect("writing to a vec");
    out.write_u16::<LittleEndian>(element).expect("writing to a vec");
    out.write_u32::<LittleEndian>(2).expect("writing to a vec");
    out.write_u16::<LittleEndian>(value).expect("writing to a vec");
}

fn put_uid(out: &mut Vec<u8>, element: u16, value: &str) -> Result<(), EncodeError> {
    // UIDs are NUL padded to an even length
    put_text(out, element, value, b'\0')
}

fn put_text(out: &mut Vec<u8>, element: u16, value: &str, pad: u8) -> Result<(), EncodeError> {
    snafu::ensure!(value.is_ascii(), InvalidTextSnafu { element });
    let mut bytes = value.as_bytes().to_vec();
    if bytes.len() % 2 == 1 {
        bytes.push(pad);
    }
    out.write_u16::<LittleEndian>(0x0000).expect("writing to a vec");
    out.write_u16::<LittleEndian>(element).expect("writing to a vec");
    out.write_u32::<LittleEndian>(bytes.len() as u32)
        .expect("writing to a vec");
    out.extend_from_slice(&bytes);
    Ok(())
}

fn get_u16(value: &[u8]) -> Option<u16> {
    if value.len() >= 2 {
        Some(LittleEndian::read_u16(value))
    } else {
        None
    }
}

fn get_text(value: &[u8]) -> String {
    String::from_utf8_lossy(value)
        .trim_end_matches(|c: char| c == '\0' || c == ' ')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_echo_request() {
        let msg = Message {
            command_field: command_field::C_ECHO_RQ,
            message_id: 1,
            affected_sop_class_uid: "1.2.840.10008.1.1".to_string(),
            command_data_set_type: NO_DATA_SET,
            ..Message::default()
        };
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn round_trip_move_response_with_counters() {
        let msg = Message {
            command_field: command_field::C_MOVE_RSP,
            message_id_being_responded_to: 5,
            affected_sop_class_uid: "1.2.840.10008.5.1.4.1.2.2.2".to_string(),
            command_data_set_type: NO_DATA_SET,
            status: status::PENDING,
            remaining_suboperations: Some(3),
            completed_suboperations: Some(2),
            failed_suboperations: Some(0),
            warning_suboperations: Some(0),
            ..Message::default()
        };
        let bytes = encode_message(&msg).unwrap();
        assert_eq!(decode_message(&bytes).unwrap(), msg);
    }

    #[test]
    fn round_trip_store_request() {
        let msg = Message {
            command_field: command_field::C_STORE_RQ,
            message_id: 7,
            affected_sop_class_uid: "1.2.840.10008.5.1.4.1.1.2".to_string(),
            affected_sop_instance_uid: "1.2.840.999.1.7".to_string(),
            priority: PRIORITY_MEDIUM,
            command_data_set_type: DATA_SET_PRESENT,
            ..Message::default()
        };
        let bytes = encode_message(&msg).unwrap();
        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.has_data_set());
        assert_eq!(decoded.priority, 0x0002);
    }

    #[test]
    fn group_length_covers_the_remaining_elements() {
        let msg = Message {
            command_field: command_field::C_ECHO_RQ,
            message_id: 1,
            command_data_set_type: NO_DATA_SET,
            ..Message::default()
        };
        let bytes = encode_message(&msg).unwrap();
        // (0000,0000) UL 4, value = total length of the elements after it
        assert_eq!(&bytes[..4], &[0x00, 0x00, 0x00, 0x00]);
        assert_eq!(&bytes[4..8], &[0x04, 0x00, 0x00, 0x00]);
        let declared = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        assert_eq!(declared as usize, bytes.len() - 12);
    }

    #[test]
    fn decoder_skips_foreign_groups_and_defaults_dataset_type() {
        let mut bytes = Vec::new();
        // (0008,0018) inside a command stream: skipped
        bytes.extend_from_slice(&[0x08, 0x00, 0x18, 0x00, 4, 0, 0, 0]);
        bytes.extend_from_slice(b"1.2\0");
        // (0000,0100) C-ECHO-RQ
        bytes.extend_from_slice(&[0x00, 0x00, 0x00, 0x01, 2, 0, 0, 0, 0x30, 0x00]);
        let msg = decode_message(&bytes).unwrap();
        assert_eq!(msg.command_field, command_field::C_ECHO_RQ);
        assert_eq!(msg.command_data_set_type, NO_DATA_SET);
        assert!(!msg.has_data_set());
    }

    #[test]
    fn decoder_rejects_oversized_values() {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&[0x00, 0x00, 0x02, 0x00]);
        bytes.extend_from_slice(&(MAX_COMMAND_VALUE_LENGTH + 1).to_le_bytes());
        let err = decode_message(&bytes).unwrap_err();
        assert!(matches!(err, DecodeError::ValueTooLong { .. }));
    }

    #[test]
    fn response_command_field_mapping() {
        assert_eq!(
            command_field::response_for(command_field::C_ECHO_RQ),
            command_field::C_ECHO_RSP
        );
        assert_eq!(
            command_field::response_for(command_field::C_FIND_RQ),
            command_field::C_FIND_RSP
        );
        assert_eq!(
            command_field::response_for(command_field::C_STORE_RQ),
            command_field::C_STORE_RSP
        );
    }

    #[test]
    fn status_classification() {
        assert!(status::is_pending(0xFF00));
        assert!(status::is_pending(0xFF01));
        assert!(!status::is_pending(status::SUCCESS));
        assert!(!status::is_pending(status::CANCELLED));
        assert!(status::is_failure(0xC000));
        assert!(status::is_failure(0xA700));
        assert!(status::is_warning(0x0107));
        assert!(!status::is_failure(status::SUCCESS));
    }
}
