//! Builders for well-formed DIMSE response messages.
//!
//! Each builder echoes the request's message identifier
//! into `MessageIDBeingRespondedTo`
//! and sets the response command field for the service.

use crate::command::{command_field, Message, DATA_SET_PRESENT, NO_DATA_SET};

/// Create a C-ECHO-RSP for the given request.
pub fn echo_response(request: &Message, status: u16) -> Message {
    Message {
        command_field: command_field::C_ECHO_RSP,
        message_id_being_responded_to: request.message_id,
        affected_sop_class_uid: request.affected_sop_class_uid.clone(),
        command_data_set_type: NO_DATA_SET,
        status,
        ..Message::default()
    }
}

/// Create a C-FIND-RSP for the given request.
///
/// Pending responses carrying a match should set `has_dataset`;
/// the terminal response carries none.
pub fn find_response(request: &Message, status: u16, has_dataset: bool) -> Message {
    Message {
        command_field: command_field::C_FIND_RSP,
        message_id_being_responded_to: request.message_id,
        affected_sop_class_uid: request.affected_sop_class_uid.clone(),
        command_data_set_type: if has_dataset {
            DATA_SET_PRESENT
        } else {
            NO_DATA_SET
        },
        status,
        ..Message::default()
    }
}

/// Create a C-STORE-RSP for the given request.
pub fn store_response(request: &Message, status: u16) -> Message {
    Message {
        command_field: command_field::C_STORE_RSP,
        message_id_being_responded_to: request.message_id,
        affected_sop_class_uid: request.affected_sop_class_uid.clone(),
        affected_sop_instance_uid: request.affected_sop_instance_uid.clone(),
        command_data_set_type: NO_DATA_SET,
        status,
        ..Message::default()
    }
}

/// Create a C-MOVE-RSP with sub-operation counters.
pub fn move_response(
    request: &Message,
    status: u16,
    remaining: Option<u16>,
    completed: Option<u16>,
    failed: Option<u16>,
    warning: Option<u16>,
) -> Message {
    Message {
        command_field: command_field::C_MOVE_RSP,
        message_id_being_responded_to: request.message_id,
        affected_sop_class_uid: request.affected_sop_class_uid.clone(),
        command_data_set_type: NO_DATA_SET,
        status,
        remaining_suboperations: remaining,
        completed_suboperations: completed,
        failed_suboperations: failed,
        warning_suboperations: warning,
        ..Message::default()
    }
}

/// Create a C-GET-RSP with sub-operation counters.
pub fn get_response(
    request: &Message,
    status: u16,
    remaining: Option<u16>,
    completed: Option<u16>,
    failed: Option<u16>,
    warning: Option<u16>,
) -> Message {
    Message {
        command_field: command_field::C_GET_RSP,
        message_id_being_responded_to: request.message_id,
        affected_sop_class_uid: request.affected_sop_class_uid.clone(),
        command_data_set_type: NO_DATA_SET,
        status,
        remaining_suboperations: remaining,
        completed_suboperations: completed,
        failed_suboperations: failed,
        warning_suboperations: warning,
        ..Message::default()
    }
}

/// Create an error response for any request:
/// the response command field is the request's with the response bit set,
/// with no data set and the given failure status.
pub fn error_response(request: &Message, status: u16) -> Message {
    Message {
        command_field: command_field::response_for(request.command_field),
        message_id_being_responded_to: request.message_id,
        affected_sop_class_uid: request.affected_sop_class_uid.clone(),
        command_data_set_type: NO_DATA_SET,
        status,
        ..Message::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::status;

    fn sample_request() -> Message {
        Message {
            command_field: command_field::C_FIND_RQ,
            message_id: 42,
            affected_sop_class_uid: "1.2.840.10008.5.1.4.1.2.2.1".to_string(),
            command_data_set_type: DATA_SET_PRESENT,
            ..Message::default()
        }
    }

    #[test]
    fn responses_echo_the_request_message_id() {
        let request = sample_request();
        let pending = find_response(&request, status::PENDING, true);
        assert_eq!(pending.message_id_being_responded_to, 42);
        assert_eq!(pending.command_field, command_field::C_FIND_RSP);
        assert!(pending.has_data_set());

        let done = find_response(&request, status::SUCCESS, false);
        assert!(!done.has_data_set());
        assert!(!done.is_pending());
    }

    #[test]
    fn error_response_sets_the_response_bit() {
        let request = sample_request();
        let rsp = error_response(&request, status::PROCESSING_FAILURE);
        assert_eq!(rsp.command_field, request.command_field | 0x8000);
        assert_eq!(rsp.status, 0xC000);
        assert!(!rsp.has_data_set());
    }
}
