//! Service handler interfaces and the service registry.
//!
//! Incoming DIMSE messages are routed by their command field
//! to a registered handler.
//! A handler is registered either as a single-response handler
//! ([`ServiceHandler`]),
//! which maps one request to one response,
//! or as a streaming handler ([`StreamingServiceHandler`]),
//! which may emit any number of intermediate responses
//! through a [`Responder`](crate::scp::Responder)
//! before the terminal one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use dicomnet_core::Dataset;

use crate::command::Message;
use crate::scp::Responder;

/// The error type returned by service handlers.
///
/// A handler error does not tear down the association:
/// it is mapped to a well-formed DIMSE error response
/// (status `0xC000`) on the same message.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The origin of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelSource {
    /// a C-CANCEL-RQ targeting the message under processing
    /// was observed on the association
    Peer,
    /// the hosting application requested the cancellation
    Local,
}

const NOT_CANCELLED: u8 = 0;
const CANCELLED_BY_PEER: u8 = 1;
const CANCELLED_LOCALLY: u8 = 2;

/// A cancellation token propagated into service handlers.
///
/// The token is flagged from one of two origins:
/// a C-CANCEL-RQ targeting the message under processing
/// observed on the association,
/// or the hosting application calling [`cancel`](Self::cancel).
/// Long-running handlers should check it between units of work
/// and wind down with a
/// [`CANCELLED`](crate::command::status::CANCELLED) response.
///
/// The origin decides the fate of the association:
/// a peer C-CANCEL only ends the message exchange
/// and the association stays usable,
/// while a local cancellation additionally
/// aborts the association with an A-ABORT
/// once the handler has wound down.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicU8>);

impl CancelToken {
    /// Create a new token in the non-cancelled state.
    pub fn new() -> Self {
        CancelToken::default()
    }

    /// Request cancellation on behalf of the hosting application.
    ///
    /// Beyond winding the in-flight operation down,
    /// this tears the association down with an A-ABORT.
    pub fn cancel(&self) {
        self.0.store(CANCELLED_LOCALLY, Ordering::Relaxed);
    }

    /// Flag that a C-CANCEL-RQ from the peer was observed.
    /// A local cancellation already in place takes precedence.
    pub(crate) fn cancel_by_peer(&self) {
        let _ = self.0.compare_exchange(
            NOT_CANCELLED,
            CANCELLED_BY_PEER,
            Ordering::Relaxed,
            Ordering::Relaxed,
        );
    }

    /// Whether cancellation has been requested from either origin.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed) != NOT_CANCELLED
    }

    /// The origin of the cancellation, when one has been requested.
    pub fn source(&self) -> Option<CancelSource> {
        match self.0.load(Ordering::Relaxed) {
            CANCELLED_BY_PEER => Some(CancelSource::Peer),
            CANCELLED_LOCALLY => Some(CancelSource::Local),
            _ => None,
        }
    }
}

/// Contextual information about a received DIMSE message.
#[derive(Debug)]
pub struct MessageContext<'a> {
    /// the presentation context that carried the message
    pub presentation_context_id: u8,
    /// the transfer syntax negotiated for that presentation context
    pub transfer_syntax_uid: &'a str,
    /// the data set, parsed with the negotiated transfer syntax.
    /// `None` when the message carries no data set
    /// or when the negotiated transfer syntax
    /// is not one that the core decodes;
    /// the raw bytes are available to the handler either way.
    pub dataset: Option<&'a Dataset>,
}

/// A handler which maps one request message to exactly one response.
pub trait ServiceHandler: Send + Sync {
    /// Handle a DIMSE request,
    /// producing the response message and its optional data set.
    fn handle(
        &self,
        cancellation: &CancelToken,
        msg: &Message,
        data: &[u8],
        meta: &MessageContext<'_>,
    ) -> Result<(Message, Option<Dataset>), HandlerError>;
}

/// A handler which may emit multiple responses for one request,
/// such as a C-FIND with many matches
/// or a C-MOVE reporting sub-operation progress.
///
/// The handler must emit exactly one terminal (non-pending) response
/// through the responder before returning.
pub trait StreamingServiceHandler: Send + Sync {
    /// Handle a DIMSE request,
    /// emitting responses through `responder`.
    fn handle_streaming(
        &self,
        cancellation: &CancelToken,
        msg: &Message,
        data: &[u8],
        meta: &MessageContext<'_>,
        responder: &mut Responder<'_>,
    ) -> Result<(), HandlerError>;
}

/// A registered handler: either single-response or streaming.
///
/// The two capabilities are kept as distinct variants
/// so that dispatch never needs to probe a handler
/// for an optional interface at run time.
#[derive(Clone)]
pub enum RegisteredHandler {
    /// maps one request to one response
    Single(Arc<dyn ServiceHandler>),
    /// emits responses through a responder
    Streaming(Arc<dyn StreamingServiceHandler>),
}

/// A mapping from DIMSE command fields to service handlers.
///
/// The registry is populated at startup and then only read;
/// it is shared across connection threads behind an [`Arc`].
#[derive(Clone, Default)]
pub struct Registry {
    handlers: HashMap<u16, RegisteredHandler>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register a single-response handler for the given command field,
    /// replacing any previous handler for that command.
    pub fn register<H>(&mut self, command_field: u16, handler: H)
    where
        H: ServiceHandler + 'static,
    {
        self.handlers
            .insert(command_field, RegisteredHandler::Single(Arc::new(handler)));
    }

    /// Register a streaming handler for the given command field,
    /// replacing any previous handler for that command.
    pub fn register_streaming<H>(&mut self, command_field: u16, handler: H)
    where
        H: StreamingServiceHandler + 'static,
    {
        self.handlers.insert(
            command_field,
            RegisteredHandler::Streaming(Arc::new(handler)),
        );
    }

    /// Remove the handler for the given command field, if any.
    pub fn unregister(&mut self, command_field: u16) {
        self.handlers.remove(&command_field);
    }

    /// Whether a handler is registered for the given command field.
    pub fn has_handler(&self, command_field: u16) -> bool {
        self.handlers.contains_key(&command_field)
    }

    /// The command fields with a registered handler.
    pub fn registered_commands(&self) -> Vec<u16> {
        self.handlers.keys().copied().collect()
    }

    /// Obtain the handler registered for the given command field.
    pub fn get(&self, command_field: u16) -> Option<&RegisteredHandler> {
        self.handlers.get(&command_field)
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut commands = self.registered_commands();
        commands.sort_unstable();
        f.debug_struct("Registry")
            .field("commands", &commands)
            .finish()
    }
}
