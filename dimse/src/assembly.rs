//! Reassembly of DIMSE messages from presentation data values.
//!
//! A message arrives as a stream of command fragments,
//! optionally followed by a stream of data set fragments
//! on the same presentation context.
//! The [`MessageAssembler`] tracks that progression
//! as a small state machine driven by the control bits of each fragment.

use dicomnet_ul::pdu::{PDataValue, PDataValueType};
use snafu::ensure;

use crate::command::{self, Message};
use crate::error::{
    Error, MessageTooLargeSnafu, MixedPresentationContextsSnafu, OutOfOrderFragmentSnafu, Result,
};

/// The default cap on the accumulated size of one message
/// (command set plus data set), in bytes.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 128 * 1024 * 1024;

/// The assembly state of the message currently in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageState {
    /// No message in flight.
    Idle,
    /// Command fragments are being accumulated.
    CollectingCommand,
    /// The command set is complete and announced a data set,
    /// whose fragments are being accumulated.
    CollectingDataset,
}

/// A fully reassembled DIMSE message.
#[derive(Debug, Clone, PartialEq)]
pub struct CompleteMessage {
    /// the presentation context that carried the message
    pub presentation_context_id: u8,
    /// the decoded command set
    pub message: Message,
    /// the raw data set bytes (empty when the command declared none)
    pub dataset: Vec<u8>,
}

/// Accumulates presentation data values into complete DIMSE messages.
///
/// Exactly one message is in flight at any time;
/// fragments from a different presentation context
/// or data set fragments ahead of a complete command set
/// are protocol errors.
#[derive(Debug)]
pub struct MessageAssembler {
    state: MessageState,
    presentation_context_id: Option<u8>,
    command: Vec<u8>,
    dataset: Vec<u8>,
    message: Option<Message>,
    max_message_length: usize,
}

impl Default for MessageAssembler {
    fn default() -> Self {
        MessageAssembler::new(DEFAULT_MAX_MESSAGE_LENGTH)
    }
}

impl MessageAssembler {
    /// Create an assembler with the given cap
    /// on the accumulated command plus data set size.
    pub fn new(max_message_length: usize) -> Self {
        MessageAssembler {
            state: MessageState::Idle,
            presentation_context_id: None,
            command: Vec::new(),
            dataset: Vec::new(),
            message: None,
            max_message_length,
        }
    }

    /// The current assembly state.
    pub fn state(&self) -> MessageState {
        self.state
    }

    /// Feed one presentation data value into the assembler.
    ///
    /// Returns the complete message once the last fragment
    /// of the message has been pushed.
    pub fn push(&mut self, pdv: PDataValue) -> Result<Option<CompleteMessage>> {
        match self.presentation_context_id {
            None => self.presentation_context_id = Some(pdv.presentation_context_id),
            Some(expected) => {
                ensure!(
                    expected == pdv.presentation_context_id,
                    MixedPresentationContextsSnafu {
                        expected,
                        got: pdv.presentation_context_id,
                    }
                );
            }
        }

        let accumulated = self.command.len() + self.dataset.len() + pdv.data.len();
        ensure!(
            accumulated <= self.max_message_length,
            MessageTooLargeSnafu {
                length: accumulated
            }
        );

        match (self.state, pdv.value_type) {
            (MessageState::Idle | MessageState::CollectingCommand, PDataValueType::Command) => {
                self.state = MessageState::CollectingCommand;
                self.command.extend_from_slice(&pdv.data);
                if !pdv.is_last {
                    return Ok(None);
                }

                let message =
                    command::decode_message(&self.command).map_err(|source| Error::DecodeCommand {
                        source,
                    })?;
                if message.has_data_set() {
                    self.message = Some(message);
                    self.state = MessageState::CollectingDataset;
                    Ok(None)
                } else {
                    Ok(Some(self.complete(message)))
                }
            }
            (MessageState::CollectingDataset, PDataValueType::Data) => {
                self.dataset.extend_from_slice(&pdv.data);
                if !pdv.is_last {
                    return Ok(None);
                }
                let message = self.message.take().expect("command set was decoded");
                Ok(Some(self.complete(message)))
            }
            // a command fragment while a data set is being collected,
            // or a data set fragment ahead of a complete command set
            _ => OutOfOrderFragmentSnafu.fail(),
        }
    }

    fn complete(&mut self, message: Message) -> CompleteMessage {
        let presentation_context_id = self
            .presentation_context_id
            .take()
            .expect("at least one fragment was pushed");
        let dataset = std::mem::take(&mut self.dataset);
        self.command.clear();
        self.message = None;
        self.state = MessageState::Idle;
        CompleteMessage {
            presentation_context_id,
            message,
            dataset,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{command_field, encode_message, Message, DATA_SET_PRESENT, NO_DATA_SET};

    fn command_pdv(data: Vec<u8>, is_last: bool) -> PDataValue {
        PDataValue {
            presentation_context_id: 1,
            value_type: PDataValueType::Command,
            is_last,
            data,
        }
    }

    fn data_pdv(data: Vec<u8>, is_last: bool) -> PDataValue {
        PDataValue {
            presentation_context_id: 1,
            value_type: PDataValueType::Data,
            is_last,
            data,
        }
    }

    #[test]
    fn command_only_message_completes_on_last_command_fragment() {
        let msg = Message {
            command_field: command_field::C_ECHO_RQ,
            message_id: 1,
            command_data_set_type: NO_DATA_SET,
            ..Message::default()
        };
        let bytes = encode_message(&msg).unwrap();
        let (head, tail) = bytes.split_at(bytes.len() / 2);

        let mut assembler = MessageAssembler::default();
        assert_eq!(
            assembler.push(command_pdv(head.to_vec(), false)).unwrap(),
            None
        );
        assert_eq!(assembler.state(), MessageState::CollectingCommand);

        let complete = assembler
            .push(command_pdv(tail.to_vec(), true))
            .unwrap()
            .expect("message should be complete");
        assert_eq!(complete.message, msg);
        assert!(complete.dataset.is_empty());
        assert_eq!(assembler.state(), MessageState::Idle);
    }

    #[test]
    fn message_with_dataset_completes_on_last_data_fragment() {
        let msg = Message {
            command_field: command_field::C_FIND_RQ,
            message_id: 2,
            command_data_set_type: DATA_SET_PRESENT,
            ..Message::default()
        };
        let bytes = encode_message(&msg).unwrap();

        let mut assembler = MessageAssembler::default();
        assert_eq!(assembler.push(command_pdv(bytes, true)).unwrap(), None);
        assert_eq!(assembler.state(), MessageState::CollectingDataset);

        assert_eq!(assembler.push(data_pdv(vec![1, 2, 3], false)).unwrap(), None);
        let complete = assembler
            .push(data_pdv(vec![4, 5], true))
            .unwrap()
            .expect("message should be complete");
        assert_eq!(complete.dataset, vec![1, 2, 3, 4, 5]);
        assert_eq!(complete.presentation_context_id, 1);
    }

    #[test]
    fn data_fragment_before_command_is_an_error() {
        let mut assembler = MessageAssembler::default();
        let err = assembler.push(data_pdv(vec![1], true)).unwrap_err();
        assert!(matches!(err, Error::OutOfOrderFragment { .. }));
    }

    #[test]
    fn context_switch_mid_message_is_an_error() {
        let msg = Message {
            command_field: command_field::C_FIND_RQ,
            command_data_set_type: DATA_SET_PRESENT,
            ..Message::default()
        };
        let bytes = encode_message(&msg).unwrap();

        let mut assembler = MessageAssembler::default();
        assembler.push(command_pdv(bytes, true)).unwrap();
        let err = assembler
            .push(PDataValue {
                presentation_context_id: 3,
                value_type: PDataValueType::Data,
                is_last: true,
                data: vec![0],
            })
            .unwrap_err();
        assert!(matches!(err, Error::MixedPresentationContexts { .. }));
    }

    #[test]
    fn accumulation_cap_is_enforced() {
        let mut assembler = MessageAssembler::new(16);
        let err = assembler.push(command_pdv(vec![0; 32], false)).unwrap_err();
        assert!(matches!(err, Error::MessageTooLarge { .. }));
    }
}
