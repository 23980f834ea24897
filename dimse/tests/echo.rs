//! End-to-end C-ECHO exchange over a loopback TCP connection.

use std::net::TcpListener;

use dicomnet_core::{uids, Dataset};
use dicomnet_dimse::command::{command_field, status, Message};
use dicomnet_dimse::service::{CancelToken, HandlerError, MessageContext};
use dicomnet_dimse::{responses, Registry, Scp, ScuOptions, ServiceHandler};

struct EchoHandler;

impl ServiceHandler for EchoHandler {
    fn handle(
        &self,
        _cancellation: &CancelToken,
        msg: &Message,
        _data: &[u8],
        _meta: &MessageContext<'_>,
    ) -> Result<(Message, Option<Dataset>), HandlerError> {
        Ok((responses::echo_response(msg, status::SUCCESS), None))
    }
}

#[test]
fn c_echo_round_trip() {
    let mut registry = Registry::new();
    registry.register(command_field::C_ECHO_RQ, EchoHandler);

    let scp = Scp::new(registry)
        .ae_title("ECHO-SCP")
        .with_abstract_syntax(uids::VERIFICATION);

    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let scp_handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        scp.handle_connection(stream)
    });

    let mut scu = ScuOptions::new()
        .calling_ae_title("ECHO-SCU")
        .called_ae_title("ECHO-SCP")
        .propose_sop_class(uids::VERIFICATION)
        .establish(addr)
        .unwrap();

    // the preferred transfer syntax (Explicit VR LE) should win
    let pc = scu
        .association()
        .presentation_context_for(uids::VERIFICATION)
        .expect("verification context should be accepted")
        .clone();
    assert_eq!(pc.transfer_syntax, uids::EXPLICIT_VR_LITTLE_ENDIAN);

    let response = scu.c_echo(1).unwrap();
    assert_eq!(response.status, status::SUCCESS);
    assert_eq!(response.message_id, 1);

    scu.release().unwrap();
    scp_handle
        .join()
        .expect("SCP thread panicked")
        .expect("SCP errored");
}

#[test]
fn unsupported_command_yields_a_failure_response() {
    // an SCP with an empty registry answers with status 0xC000
    let scp = Scp::new(Registry::new())
        .ae_title("ECHO-SCP")
        .with_abstract_syntax(uids::VERIFICATION);

    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let scp_handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        scp.handle_connection(stream)
    });

    let mut scu = ScuOptions::new()
        .calling_ae_title("ECHO-SCU")
        .propose_sop_class(uids::VERIFICATION)
        .establish(addr)
        .unwrap();

    let response = scu.c_echo(3).unwrap();
    assert_eq!(response.status, status::PROCESSING_FAILURE);
    assert_eq!(response.message_id, 3);

    scu.release().unwrap();
    scp_handle
        .join()
        .expect("SCP thread panicked")
        .expect("SCP errored");
}
