//! End-to-end behaviour of a hub through its public API.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use modbus_fast_core::mock::MockTransport;
use modbus_fast_core::{
    ConnectionStatus, EndpointConfig, ModbusTransport, PointSubscriber, PollHub, RegisterType,
    SchedulerState, Transport, TransportError,
};

/// Mirrors what a presentation-layer entity keeps.
#[derive(Default)]
struct Entity {
    value: Mutex<Option<bool>>,
    available: Mutex<Option<bool>>,
    updates: Mutex<usize>,
}

impl PointSubscriber for Entity {
    fn on_value_changed(&self, value: bool) {
        *self.value.lock().unwrap() = Some(value);
        *self.updates.lock().unwrap() += 1;
    }

    fn on_availability_changed(&self, status: ConnectionStatus) {
        *self.available.lock().unwrap() = Some(status.is_available());
    }
}

fn panel() -> EndpointConfig {
    EndpointConfig {
        name: "Panel".to_string(),
        register_type: RegisterType::Input,
        start_address: 100,
        count: 3,
        ..EndpointConfig::tcp("10.0.0.5", 502)
    }
}

#[tokio::test(start_paused = true)]
async fn entities_follow_register_changes() {
    let mock = MockTransport::new();
    mock.push_words(&[0, 0, 0])
        .push_words(&[0, 7, 0])
        .push_words(&[0, 7, 0])
        .push_words(&[1, 0, 0]);

    let hub = PollHub::new(panel(), mock.clone()).unwrap();
    let entities: Vec<Arc<Entity>> = (0..3).map(|_| Arc::new(Entity::default())).collect();
    for (index, entity) in entities.iter().enumerate() {
        hub.dispatcher().subscribe_point(index, entity.clone());
    }

    let handle = hub.start();
    tokio::time::sleep(Duration::from_millis(17)).await;

    assert_eq!(*entities[0].value.lock().unwrap(), Some(true));
    assert_eq!(*entities[1].value.lock().unwrap(), Some(false));
    assert_eq!(*entities[2].value.lock().unwrap(), Some(false));

    // Initial report, then only real changes.
    assert_eq!(*entities[0].updates.lock().unwrap(), 2);
    assert_eq!(*entities[1].updates.lock().unwrap(), 3);
    assert_eq!(*entities[2].updates.lock().unwrap(), 1);

    for entity in &entities {
        assert_eq!(*entity.available.lock().unwrap(), Some(true));
    }

    let requests = mock.requests();
    assert!(requests.iter().all(|r| r.kind == RegisterType::Input
        && r.start == 100
        && r.count == 3));

    handle.stop().await;
    for entity in &entities {
        assert_eq!(*entity.available.lock().unwrap(), Some(false));
    }
}

#[tokio::test(start_paused = true)]
async fn independent_hubs_share_nothing() {
    let left = MockTransport::new();
    left.push_bits(&[1]);
    let right = MockTransport::new();
    right.fail_connects(5);

    let config = EndpointConfig {
        register_type: RegisterType::Coil,
        count: 1,
        ..panel()
    };
    let left_handle = PollHub::new(config.clone(), left.clone()).unwrap().start();
    let right_handle = PollHub::new(config, right.clone()).unwrap().start();

    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(left_handle.state(), SchedulerState::Polling);
    assert_eq!(right_handle.state(), SchedulerState::Reconnecting);
    assert_eq!(left_handle.points().value(0), Some(true));
    assert_eq!(right_handle.points().value(0), None);

    left_handle.stop().await;
    right_handle.stop().await;
}

#[tokio::test]
async fn modbus_transport_reports_refused_connection() {
    let config = EndpointConfig {
        timeout: 0.5,
        ..EndpointConfig::tcp("127.0.0.1", 1)
    };
    let mut transport = ModbusTransport::from_config(&config).unwrap();

    let result = transport.connect().await;
    assert!(matches!(result, Err(TransportError::Connection(_))));
    assert_eq!(transport.status(), ConnectionStatus::Disconnected);
}
