//! C-MOVE and C-GET sub-operation driving.

use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use dicomnet_core::dataset::Element;
use dicomnet_core::tag::tags;
use dicomnet_core::{uids, Dataset, VR};
use dicomnet_dimse::command::{command_field, status, Message};
use dicomnet_dimse::retrieve::MoveDriver;
use dicomnet_dimse::scu::{CGetRequest, CMoveRequest};
use dicomnet_dimse::service::{CancelToken, HandlerError, MessageContext};
use dicomnet_dimse::{
    responses, Registry, Responder, Scp, ScuOptions, ServiceHandler, StreamingServiceHandler,
};
use dicomnet_ul::AeAddr;

const DESTINATION_AE: &str = "DEST-SCP";

fn sample_instances(count: usize) -> Vec<(String, String, Vec<u8>)> {
    (1..=count)
        .map(|i| {
            (
                uids::CT_IMAGE_STORAGE.to_string(),
                format!("1.2.840.999.555.{}", i),
                vec![i as u8; 2048],
            )
        })
        .collect()
}

/// A storage handler collecting instances in memory.
struct CollectingStorage {
    instances: Arc<Mutex<Vec<(String, Vec<u8>)>>>,
}

impl ServiceHandler for CollectingStorage {
    fn handle(
        &self,
        _cancellation: &CancelToken,
        msg: &Message,
        data: &[u8],
        _meta: &MessageContext<'_>,
    ) -> Result<(Message, Option<Dataset>), HandlerError> {
        self.instances
            .lock()
            .unwrap()
            .push((msg.affected_sop_instance_uid.clone(), data.to_vec()));
        Ok((responses::store_response(msg, status::SUCCESS), None))
    }
}

/// Spawn a storage SCP which serves `connections` associations.
fn spawn_destination_scp(
    connections: usize,
) -> (
    std::thread::JoinHandle<()>,
    SocketAddr,
    Arc<Mutex<Vec<(String, Vec<u8>)>>>,
) {
    let instances = Arc::new(Mutex::new(Vec::new()));
    let mut registry = Registry::new();
    registry.register(
        command_field::C_STORE_RQ,
        CollectingStorage {
            instances: Arc::clone(&instances),
        },
    );
    let scp = Scp::new(registry)
        .ae_title(DESTINATION_AE)
        .accept_storage_sop_classes(true);

    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = std::thread::spawn(move || {
        for _ in 0..connections {
            let (stream, _) = listener.accept().unwrap();
            scp.handle_connection(stream).expect("destination SCP errored");
        }
    });
    (handle, addr, instances)
}

/// A C-MOVE handler which pushes a fixed set of instances
/// to the requested destination.
struct FixedInstancesMover {
    instances: Vec<(String, String, Vec<u8>)>,
    destination_addr: SocketAddr,
}

impl StreamingServiceHandler for FixedInstancesMover {
    fn handle_streaming(
        &self,
        _cancellation: &CancelToken,
        msg: &Message,
        _data: &[u8],
        _meta: &MessageContext<'_>,
        responder: &mut Responder<'_>,
    ) -> Result<(), HandlerError> {
        let destination_addr = self.destination_addr;
        let resolver = move |ae_title: &str| -> Option<AeAddr<String>> {
            if ae_title == DESTINATION_AE {
                Some(AeAddr::new(DESTINATION_AE, destination_addr.to_string()))
            } else {
                None
            }
        };

        let mut driver = MoveDriver::new(
            responder,
            &resolver,
            msg,
            self.instances.len() as u16,
            "MOVE-SCP",
        )?;
        for (sop_class_uid, sop_instance_uid, data) in &self.instances {
            driver.store(sop_class_uid, sop_instance_uid, data)?;
        }
        driver.finish()?;
        Ok(())
    }
}

#[test]
fn c_move_performs_sub_operations_with_counters() {
    let (dest_handle, dest_addr, dest_instances) = spawn_destination_scp(5);

    let mut registry = Registry::new();
    registry.register_streaming(
        command_field::C_MOVE_RQ,
        FixedInstancesMover {
            instances: sample_instances(5),
            destination_addr: dest_addr,
        },
    );
    let scp = Scp::new(registry)
        .ae_title("MOVE-SCP")
        .with_abstract_syntax(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE);

    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let scp_handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        scp.handle_connection(stream)
    });

    let mut scu = ScuOptions::new()
        .calling_ae_title("MOVE-SCU")
        .propose_sop_class(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE)
        .establish(addr)
        .unwrap();

    let mut identifier = Dataset::new();
    identifier.put(Element::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"));
    identifier.put(Element::new(
        tags::STUDY_INSTANCE_UID,
        VR::UI,
        "1.2.840.999.444.1",
    ));

    let responses = scu
        .c_move(CMoveRequest {
            sop_class_uid: uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE.to_string(),
            message_id: 9,
            priority: 0,
            destination: DESTINATION_AE.to_string(),
            identifier,
        })
        .unwrap();

    // five pending responses with a decreasing remaining counter,
    // then a terminal success
    assert_eq!(responses.len(), 6);
    for (i, response) in responses[..5].iter().enumerate() {
        assert_eq!(response.status, status::PENDING);
        assert_eq!(response.message_id, 9);
        assert_eq!(response.remaining, Some(5 - i as u16));
        assert_eq!(response.completed, Some(i as u16));
        assert_eq!(response.failed, Some(0));
        assert_eq!(response.warning, Some(0));
    }
    let last = &responses[5];
    assert_eq!(last.status, status::SUCCESS);
    assert_eq!(last.remaining, Some(0));
    assert_eq!(last.completed, Some(5));
    assert_eq!(last.failed, Some(0));
    assert_eq!(last.warning, Some(0));

    scu.release().unwrap();
    scp_handle
        .join()
        .expect("SCP thread panicked")
        .expect("SCP errored");
    dest_handle.join().expect("destination thread panicked");

    let stored = dest_instances.lock().unwrap();
    assert_eq!(stored.len(), 5);
    assert_eq!(stored[0].0, "1.2.840.999.555.1");
    assert_eq!(stored[4].0, "1.2.840.999.555.5");
}

/// A C-GET handler which sends instances back on the same association.
struct FixedInstancesGetter {
    instances: Vec<(String, String, Vec<u8>)>,
}

impl StreamingServiceHandler for FixedInstancesGetter {
    fn handle_streaming(
        &self,
        _cancellation: &CancelToken,
        msg: &Message,
        _data: &[u8],
        _meta: &MessageContext<'_>,
        responder: &mut Responder<'_>,
    ) -> Result<(), HandlerError> {
        let total = self.instances.len() as u16;
        let mut completed = 0;
        for (i, (sop_class_uid, sop_instance_uid, data)) in self.instances.iter().enumerate() {
            responder.send(
                &responses::get_response(
                    msg,
                    status::PENDING,
                    Some(total - i as u16),
                    Some(completed),
                    Some(0),
                    Some(0),
                ),
                None,
                None,
            )?;
            let store_status = responder.send_c_store(sop_class_uid, sop_instance_uid, data)?;
            assert_eq!(store_status, status::SUCCESS);
            completed += 1;
        }
        responder.send(
            &responses::get_response(
                msg,
                status::SUCCESS,
                Some(0),
                Some(completed),
                Some(0),
                Some(0),
            ),
            None,
            None,
        )?;
        Ok(())
    }
}

#[test]
fn c_get_performs_sub_operations_on_the_same_association() {
    let mut registry = Registry::new();
    registry.register_streaming(
        command_field::C_GET_RQ,
        FixedInstancesGetter {
            instances: sample_instances(2),
        },
    );
    let scp = Scp::new(registry)
        .ae_title("GET-SCP")
        .with_abstract_syntax(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_GET);

    let listener = TcpListener::bind("localhost:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let scp_handle = std::thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        scp.handle_connection(stream)
    });

    let mut scu = ScuOptions::new()
        .calling_ae_title("GET-SCU")
        .propose_sop_class(uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_GET)
        .establish(addr)
        .unwrap();

    let received = Arc::new(Mutex::new(Vec::new()));
    let store_handler = CollectingStorage {
        instances: Arc::clone(&received),
    };

    let mut identifier = Dataset::new();
    identifier.put(Element::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "SERIES"));
    identifier.put(Element::new(
        tags::SERIES_INSTANCE_UID,
        VR::UI,
        "1.2.840.999.444.1.1",
    ));

    let responses = scu
        .c_get(
            CGetRequest {
                sop_class_uid: uids::STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_GET.to_string(),
                message_id: 11,
                priority: 0,
                identifier,
            },
            &store_handler,
        )
        .unwrap();

    assert_eq!(responses.len(), 3);
    assert_eq!(responses[0].status, status::PENDING);
    assert_eq!(responses[0].remaining, Some(2));
    assert_eq!(responses[1].status, status::PENDING);
    assert_eq!(responses[1].remaining, Some(1));
    let last = &responses[2];
    assert_eq!(last.status, status::SUCCESS);
    assert_eq!(last.completed, Some(2));
    assert_eq!(last.message_id, 11);

    scu.release().unwrap();
    scp_handle
        .join()
        .expect("SCP thread panicked")
        .expect("SCP errored");

    let received = received.lock().unwrap();
    assert_eq!(received.len(), 2);
    assert_eq!(received[0].0, "1.2.840.999.555.1");
    assert_eq!(received[0].1, vec![1_u8; 2048]);
    assert_eq!(received[1].0, "1.2.840.999.555.2");
}
