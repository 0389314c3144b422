// Live object feed: applies server notifications to the object store

use gtk::glib;
use serde::Deserialize;
use serde_json::Value;
use std::rc::Rc;
use xo_console_common::{ObjectStore, XoObject, methods};

use crate::xo_client::ClientEvent;

/// Change announced by an `all` notification
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectsUpdate {
    Enter(Vec<XoObject>),
    Exit(Vec<String>),
}

#[derive(Debug, Deserialize)]
struct AllNotification {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    items: serde_json::Map<String, Value>,
}

/// Decode an id -> object map, skipping objects that fail to parse
pub fn parse_objects(value: Value) -> Vec<XoObject> {
    let Value::Object(items) = value else {
        log::warn!("Expected an object map, got {value}");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|(id, item)| match serde_json::from_value::<XoObject>(item) {
            Ok(object) => Some(object),
            Err(e) => {
                log::warn!("Skipping object {id}: {e}");
                None
            }
        })
        .collect()
}

/// Decode the parameters of an `all` notification
pub fn parse_all_notification(params: Value) -> Option<ObjectsUpdate> {
    let notification: AllNotification = match serde_json::from_value(params) {
        Ok(notification) => notification,
        Err(e) => {
            log::warn!("Malformed object notification: {e}");
            return None;
        }
    };

    match notification.kind.as_str() {
        "enter" => Some(ObjectsUpdate::Enter(parse_objects(Value::Object(
            notification.items,
        )))),
        "exit" => Some(ObjectsUpdate::Exit(
            notification.items.into_iter().map(|(id, _)| id).collect(),
        )),
        other => {
            log::debug!("Ignoring object notification of type {other}");
            None
        }
    }
}

/// Apply one client event to the store
///
/// Returns the disconnect reason when the connection is gone.
pub fn handle_event(store: &ObjectStore, event: ClientEvent) -> Option<String> {
    match event {
        ClientEvent::Notification { method, params } if method == methods::NOTIFY_ALL => {
            match parse_all_notification(params) {
                Some(ObjectsUpdate::Enter(objects)) => store.apply_enter(objects),
                Some(ObjectsUpdate::Exit(ids)) => store.apply_exit(ids),
                None => {}
            }
            None
        }
        ClientEvent::Notification { method, .. } => {
            log::debug!("Unhandled notification {method}");
            None
        }
        ClientEvent::Disconnected(reason) => Some(reason),
    }
}

/// Start feeding client events into the store on the main loop
pub fn start_event_listener<F>(
    store: Rc<ObjectStore>,
    receiver: async_channel::Receiver<ClientEvent>,
    on_disconnected: F,
) where
    F: Fn(&str) + 'static,
{
    glib::spawn_future_local(async move {
        while let Ok(event) = receiver.recv().await {
            if let Some(reason) = handle_event(&store, event) {
                on_disconnected(&reason);
                break;
            }
        }
        log::debug!("Event listener stopped");
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pool_json(id: &str) -> Value {
        json!({ "type": "pool", "id": id, "name_label": id })
    }

    #[test]
    fn test_parse_objects_skips_invalid() {
        let objects = parse_objects(json!({
            "p1": pool_json("p1"),
            "bad": { "type": "host" },
            "vdi": { "type": "VDI", "id": "vdi" },
        }));

        // Missing host id fails; the VDI parses as an untracked object
        assert_eq!(objects.len(), 2);
        assert!(objects.contains(&XoObject::Other));
    }

    #[test]
    fn test_parse_objects_keeps_host_with_null_topology() {
        let objects = parse_objects(json!({
            "h1": {
                "type": "host",
                "id": "h1",
                "cpus": { "cores": 8, "sockets": null },
                "memory": { "size": 4096, "usage": null },
            },
        }));

        match objects.as_slice() {
            [XoObject::Host(host)] => {
                assert_eq!(host.cpus.cores, 8);
                assert_eq!(host.memory.usage, 0);
            }
            other => panic!("unexpected objects {other:?}"),
        }
    }

    #[test]
    fn test_parse_objects_rejects_non_map() {
        assert!(parse_objects(json!([1, 2])).is_empty());
    }

    #[test]
    fn test_parse_enter_exit() {
        let enter = parse_all_notification(json!({
            "type": "enter",
            "items": { "p1": pool_json("p1") },
        }));
        match enter {
            Some(ObjectsUpdate::Enter(objects)) => assert_eq!(objects.len(), 1),
            other => panic!("unexpected update {other:?}"),
        }

        let exit = parse_all_notification(json!({
            "type": "exit",
            "items": { "p1": pool_json("p1") },
        }));
        assert_eq!(exit, Some(ObjectsUpdate::Exit(vec!["p1".to_string()])));

        assert_eq!(parse_all_notification(json!({ "type": "reset" })), None);
        assert_eq!(parse_all_notification(json!("garbage")), None);
    }

    #[test]
    fn test_handle_event_updates_store() {
        let store = ObjectStore::new();

        let enter = ClientEvent::Notification {
            method: "all".to_string(),
            params: json!({ "type": "enter", "items": { "p1": pool_json("p1") } }),
        };
        assert_eq!(handle_event(&store, enter), None);
        assert_eq!(store.object_count(), 1);

        let exit = ClientEvent::Notification {
            method: "all".to_string(),
            params: json!({ "type": "exit", "items": { "p1": {} } }),
        };
        handle_event(&store, exit);
        assert_eq!(store.object_count(), 0);

        assert_eq!(
            handle_event(&store, ClientEvent::Disconnected("bye".to_string())),
            Some("bye".to_string())
        );
    }
}
