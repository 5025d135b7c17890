//! 回调接口
//!
//! Central 事件和外设事件是两组互不相交的能力，分别由
//! [`CentralManagerDelegate`] 和 [`PeripheralDelegate`] 承载。

use crate::ble::{Advertisement, CentralEvent, CentralState, PeripheralId};
use uuid::Uuid;

pub trait CentralManagerDelegate: Send + Sync {
    fn central_did_update_state(&self, state: CentralState);

    fn did_discover_peripheral(&self, advertisement: Advertisement);

    fn did_connect_peripheral(&self, id: &PeripheralId);

    fn did_fail_to_connect_peripheral(&self, id: &PeripheralId, reason: &str);

    fn did_disconnect_peripheral(&self, id: &PeripheralId);
}

pub trait PeripheralDelegate: Send + Sync {
    fn did_discover_services(&self, id: &PeripheralId, services: &[Uuid]);

    fn did_update_value_for_characteristic(
        &self,
        id: &PeripheralId,
        characteristic: Uuid,
        value: &[u8],
    );
}

/// 把一个平台事件路由到对应的回调
pub fn dispatch(
    event: CentralEvent,
    central: &dyn CentralManagerDelegate,
    peripheral: &dyn PeripheralDelegate,
) {
    match event {
        CentralEvent::StateUpdated(state) => central.central_did_update_state(state),
        CentralEvent::PeripheralDiscovered(adv) => central.did_discover_peripheral(adv),
        CentralEvent::PeripheralConnected(id) => central.did_connect_peripheral(&id),
        CentralEvent::PeripheralConnectFailed { id, reason } => {
            central.did_fail_to_connect_peripheral(&id, &reason);
        }
        CentralEvent::PeripheralDisconnected(id) => central.did_disconnect_peripheral(&id),
        CentralEvent::ServicesDiscovered { id, services } => {
            peripheral.did_discover_services(&id, &services);
        }
        CentralEvent::CharacteristicValueUpdated {
            id,
            characteristic,
            value,
        } => peripheral.did_update_value_for_characteristic(&id, characteristic, &value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<&'static str>>,
    }

    impl Recorder {
        fn push(&self, name: &'static str) {
            self.calls.lock().unwrap().push(name);
        }
    }

    impl CentralManagerDelegate for Recorder {
        fn central_did_update_state(&self, _: CentralState) {
            self.push("state");
        }
        fn did_discover_peripheral(&self, _: Advertisement) {
            self.push("discover");
        }
        fn did_connect_peripheral(&self, _: &PeripheralId) {
            self.push("connect");
        }
        fn did_fail_to_connect_peripheral(&self, _: &PeripheralId, _: &str) {
            self.push("connect_failed");
        }
        fn did_disconnect_peripheral(&self, _: &PeripheralId) {
            self.push("disconnect");
        }
    }

    impl PeripheralDelegate for Recorder {
        fn did_discover_services(&self, _: &PeripheralId, _: &[Uuid]) {
            self.push("services");
        }
        fn did_update_value_for_characteristic(&self, _: &PeripheralId, _: Uuid, _: &[u8]) {
            self.push("value");
        }
    }

    #[test]
    fn test_dispatch_routes_each_event() {
        let central = Recorder::default();
        let peripheral = Recorder::default();
        let id = PeripheralId::from("A");

        let events = vec![
            CentralEvent::StateUpdated(CentralState::PoweredOn),
            CentralEvent::PeripheralDiscovered(Advertisement {
                id: id.clone(),
                ..Default::default()
            }),
            CentralEvent::PeripheralConnected(id.clone()),
            CentralEvent::PeripheralConnectFailed {
                id: id.clone(),
                reason: "timeout".to_string(),
            },
            CentralEvent::PeripheralDisconnected(id.clone()),
            CentralEvent::ServicesDiscovered {
                id: id.clone(),
                services: vec![],
            },
            CentralEvent::CharacteristicValueUpdated {
                id,
                characteristic: Uuid::nil(),
                value: vec![0x00, 0x48],
            },
        ];

        for event in events {
            dispatch(event, &central, &peripheral);
        }

        assert_eq!(
            *central.calls.lock().unwrap(),
            vec!["state", "discover", "connect", "connect_failed", "disconnect"]
        );
        assert_eq!(*peripheral.calls.lock().unwrap(), vec!["services", "value"]);
    }
}
