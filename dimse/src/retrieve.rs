//! C-MOVE sub-operation driving.
//!
//! A C-MOVE handler resolves the matching instances itself;
//! this module takes care of the rest:
//! resolving the destination AE title into a network address,
//! dialing a new association per instance,
//! performing the C-STORE sub-operations,
//! keeping the four sub-operation counters
//! and emitting pending responses at the configured cadence.

use dicomnet_ul::AeAddr;
use tracing::{debug, warn};

use crate::command::{status, Message};
use crate::error::{Result, UnknownMoveDestinationSnafu};
use crate::responses;
use crate::scp::Responder;
use crate::scu::ScuOptions;

/// Resolves a move destination AE title into a dialable address.
///
/// The mapping is supplied by the hosting application;
/// a plain closure will do.
pub trait DestinationResolver: Send + Sync {
    /// Obtain the address of the application entity
    /// known by the given AE title, if any.
    fn resolve(&self, ae_title: &str) -> Option<AeAddr<String>>;
}

impl<F> DestinationResolver for F
where
    F: Fn(&str) -> Option<AeAddr<String>> + Send + Sync,
{
    fn resolve(&self, ae_title: &str) -> Option<AeAddr<String>> {
        self(ae_title)
    }
}

/// Drives the C-STORE sub-operations of one C-MOVE request.
///
/// Create it with the total number of matching instances,
/// then call [`store`](Self::store) once per instance
/// and [`finish`](Self::finish) at the end.
/// A pending C-MOVE-RSP with the current counters is emitted
/// before each sub-operation
/// (or at the cadence configured with
/// [`pending_every`](Self::pending_every)),
/// and `finish` emits the terminal response.
pub struct MoveDriver<'a, 'b> {
    responder: &'a mut Responder<'b>,
    request: Message,
    calling_ae_title: String,
    destination_ae_title: String,
    destination: AeAddr<String>,
    remaining: u16,
    completed: u16,
    failed: u16,
    warning: u16,
    pending_every: u16,
    since_pending: u16,
}

impl<'a, 'b> MoveDriver<'a, 'b> {
    /// Prepare to drive `total` sub-operations for the given C-MOVE request,
    /// resolving the destination AE title named by the request.
    pub fn new(
        responder: &'a mut Responder<'b>,
        resolver: &dyn DestinationResolver,
        request: &Message,
        total: u16,
        calling_ae_title: impl Into<String>,
    ) -> Result<Self> {
        let destination = resolver.resolve(&request.move_destination).ok_or_else(|| {
            UnknownMoveDestinationSnafu {
                ae_title: request.move_destination.clone(),
            }
            .build()
        })?;
        debug!(
            "Move destination {} resolved to {}",
            request.move_destination, destination
        );
        Ok(MoveDriver {
            responder,
            request: request.clone(),
            calling_ae_title: calling_ae_title.into(),
            destination_ae_title: request.move_destination.clone(),
            destination,
            remaining: total,
            completed: 0,
            failed: 0,
            warning: 0,
            pending_every: 1,
            since_pending: 0,
        })
    }

    /// Emit a pending response only every `n` sub-operations.
    /// The default is 1: one pending response before each sub-operation.
    pub fn pending_every(mut self, n: u16) -> Self {
        self.pending_every = n.max(1);
        self
    }

    /// Whether a C-CANCEL for the C-MOVE operation has been observed.
    pub fn is_cancelled(&self) -> bool {
        self.responder.is_cancelled()
    }

    /// Sub-operations completed successfully so far.
    pub fn completed(&self) -> u16 {
        self.completed
    }

    /// Sub-operations failed so far.
    pub fn failed(&self) -> u16 {
        self.failed
    }

    /// Perform one C-STORE sub-operation towards the destination:
    /// a new association is opened for the instance,
    /// the instance is sent,
    /// and the counters are updated with the outcome.
    ///
    /// `data` must hold the instance's data set
    /// encoded in a transfer syntax
    /// acceptable for the destination negotiation.
    pub fn store(&mut self, sop_class_uid: &str, sop_instance_uid: &str, data: &[u8]) -> Result<()> {
        if self.since_pending == 0 {
            self.responder.send(
                &responses::move_response(
                    &self.request,
                    status::PENDING,
                    Some(self.remaining),
                    Some(self.completed),
                    Some(self.failed),
                    Some(self.warning),
                ),
                None,
                None,
            )?;
        }
        self.since_pending = (self.since_pending + 1) % self.pending_every;

        match self.perform_store(sop_class_uid, sop_instance_uid, data) {
            Ok(store_status) if store_status == status::SUCCESS => {
                self.completed += 1;
            }
            Ok(store_status) if status::is_warning(store_status) => {
                warn!(
                    "C-STORE sub-operation for {} returned warning status {:#06x}",
                    sop_instance_uid, store_status
                );
                self.warning += 1;
            }
            Ok(store_status) => {
                warn!(
                    "C-STORE sub-operation for {} failed with status {:#06x}",
                    sop_instance_uid, store_status
                );
                self.failed += 1;
            }
            Err(e) => {
                warn!(
                    "C-STORE sub-operation for {} failed: {}",
                    sop_instance_uid, e
                );
                self.failed += 1;
            }
        }
        self.remaining = self.remaining.saturating_sub(1);
        Ok(())
    }

    /// Emit the terminal C-MOVE-RSP:
    /// success when every sub-operation succeeded,
    /// cancelled when a C-CANCEL was observed,
    /// warning otherwise.
    pub fn finish(self) -> Result<()> {
        let final_status = if self.is_cancelled() {
            status::CANCELLED
        } else if self.failed == 0 && self.warning == 0 {
            status::SUCCESS
        } else {
            // sub-operations completed, one or more failures or warnings
            0xB000
        };
        self.responder.send(
            &responses::move_response(
                &self.request,
                final_status,
                Some(self.remaining),
                Some(self.completed),
                Some(self.failed),
                Some(self.warning),
            ),
            None,
            None,
        )
    }

    /// Dial the destination and send one instance.
    fn perform_store(
        &self,
        sop_class_uid: &str,
        sop_instance_uid: &str,
        data: &[u8],
    ) -> Result<u16> {
        let mut scu = ScuOptions::new()
            .calling_ae_title(self.calling_ae_title.clone())
            .called_ae_title(
                self.destination
                    .ae_title()
                    .unwrap_or(&self.destination_ae_title),
            )
            .propose_sop_class(sop_class_uid)
            .establish(self.destination.socket_addr().as_str())?;

        let response = scu.c_store(sop_class_uid, sop_instance_uid, data, 0)?;
        scu.release()?;
        Ok(response.status)
    }
}
