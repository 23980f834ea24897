//! End-to-end C-STORE with a data set
//! large enough to be fragmented across several PDUs.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use dicomnet_core::{uids, Dataset};
use dicomnet_dimse::command::{command_field, status, Message, PRIORITY_MEDIUM};
use dicomnet_dimse::service::{CancelToken, HandlerError, MessageContext};
use dicomnet_dimse::{responses, Registry, Scp, ScuOptions, ServiceHandler};

#[derive(Debug)]
struct StoredInstance {
    sop_class_uid: String,
    sop_instance_uid: String,
    priority: u16,
    data: Vec<u8>,
}

/// Keeps every stored instance in memory.
struct InMemoryStorage {
    instances: Arc<Mutex<Vec<StoredInstance>>>,
}

impl ServiceHandler for InMemoryStorage {
    fn handle(
        &self,
        _cancellation: &CancelToken,
        msg: &Message,
        data: &[u8],
        _meta: &MessageContext<'_>,
    ) -> Result<(Message, Option<Dataset>), HandlerError> {
        self.instances.lock().unwrap().push(StoredInstance {
            sop_class_uid: msg.affected_sop_class_uid.clone(),
            sop_instance_uid: msg.affected_sop_instance_uid.clone(),
            priority: msg.priority,
            data: data.to_vec(),
        });
        Ok((responses::store_response(msg, status::SUCCESS), None))
    }
}

#[test]
fn c_store_with_fragmented_data_set() {
    let instances = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::new();
    registry.register(
        command_field::C_STORE_RQ,
        InMemoryStorage {
            instances: Arc::clone(&instances),
        },
    );

    let scp = Scp::new(registry)
        .ae_title("STORE-SCP")
        .accept_storage_sop_classes(true);

    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let scp_handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        scp.handle_connection(stream)
    });

    let mut scu = ScuOptions::new()
        .calling_ae_title("STORE-SCU")
        .called_ae_title("STORE-SCP")
        .max_pdu_length(16_384)
        .propose_sop_class(uids::CT_IMAGE_STORAGE)
        .establish(addr)
        .unwrap();

    // a 40 000 byte data set must cross several P-DATA-TF PDUs
    let payload: Vec<u8> = (0..40_000_u32).map(|i| (i % 251) as u8).collect();
    let response = scu
        .c_store(uids::CT_IMAGE_STORAGE, "1.2.840.999.777.1", &payload, 5)
        .unwrap();

    assert_eq!(response.status, status::SUCCESS);
    assert_eq!(response.message_id, 5);
    assert_eq!(response.sop_instance_uid, "1.2.840.999.777.1");

    scu.release().unwrap();
    scp_handle
        .join()
        .expect("SCP thread panicked")
        .expect("SCP errored");

    let stored = instances.lock().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].sop_class_uid, uids::CT_IMAGE_STORAGE);
    assert_eq!(stored[0].sop_instance_uid, "1.2.840.999.777.1");
    // the conventional non-zero MEDIUM priority must be on the wire
    assert_eq!(stored[0].priority, PRIORITY_MEDIUM);
    assert_eq!(stored[0].data, payload);
}
