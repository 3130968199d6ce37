use chrono::{TimeZone, Utc};
use proto::{Envelope, Permission, ReceivedBatch};
use serde_json::json;

#[test]
fn received_batch_wire_shape_contract() {
    let sent_at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single().expect("timestamp");
    let batch = ReceivedBatch {
        received: vec![Envelope::new(
            "events",
            json!({"kind": "created", "at": 1}),
            "publisher",
            sent_at,
        )
        .into()],
        remaining: 3,
    };

    let value = serde_json::to_value(&batch).expect("serialize batch");
    assert_eq!(
        value,
        json!({
            "received": [{
                "queue": "events",
                "message": {"kind": "created", "at": 1},
                "sender": "publisher",
                "ts": 1714564800
            }],
            "remaining": 3
        })
    );

    let parsed: ReceivedBatch = serde_json::from_value(value).expect("deserialize batch");
    assert_eq!(parsed, batch);
}

#[test]
fn permissions_use_lowercase_configuration_names() {
    let parsed: Vec<Permission> =
        serde_json::from_value(json!(["list", "send", "receive"])).expect("permissions");
    assert_eq!(
        parsed,
        vec![Permission::List, Permission::Send, Permission::Receive]
    );
    assert!(serde_json::from_value::<Permission>(json!("admin")).is_err());
}
