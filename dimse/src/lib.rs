//! DICOM message service element (DIMSE) layer.
//!
//! This crate builds on [`dicomnet-ul`](dicomnet_ul)
//! to provide the message layer of the composite DICOM services
//! C-ECHO, C-FIND, C-STORE, C-MOVE, C-GET and C-CANCEL,
//! for both service class users and service class providers.
//!
//! - The [`command`] module holds the DIMSE command set representation
//!   ([`Message`](command::Message)) and its codec,
//!   which always operates in Implicit VR Little Endian.
//! - The [`assembly`] module reassembles command and data set streams
//!   from incoming presentation data values.
//! - The [`service`] module defines the service handler interfaces
//!   and the registry which routes incoming messages by command field.
//! - The [`responses`] module provides builders for well-formed
//!   response messages.
//! - The [`scp`] module provides a ready-to-use service class provider
//!   dispatching to a service registry,
//!   including the responder handle passed to streaming handlers.
//! - The [`scu`] module provides the composite service operations
//!   of a service class user.
//! - The [`retrieve`] module drives C-MOVE sub-operations
//!   towards a resolved destination application entity.

pub mod assembly;
pub mod command;
pub mod error;
pub mod responses;
pub mod retrieve;
pub mod scp;
pub mod scu;
pub mod service;

mod transport;

pub use command::Message;
pub use error::Error;
pub use scp::{Responder, Scp};
pub use scu::{Scu, ScuOptions};
pub use service::{
    CancelSource, CancelToken, MessageContext, Registry, ServiceHandler, StreamingServiceHandler,
};
