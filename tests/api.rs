//! Dashboard API integration tests
//!
//! Exercise the axum router directly with `oneshot` requests against fake
//! collaborators and the simulated hardware bus.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use tokio::sync::broadcast;
use tower::ServiceExt;

use hearth::api::{ApiServer, ApiState};
use hearth::coordinator::{self, CoordinatorConfig};
use hearth::hardware::{HardwareBus, SimulatedBus};
use hearth::store::{keys, ConfigStore};

mod common;
use common::TestBed;

struct Fixture {
    store: Arc<ConfigStore>,
    bus: Arc<dyn HardwareBus>,
    router: axum::Router,
}

fn fixture() -> Fixture {
    let bed = TestBed::new();
    let store = Arc::clone(&bed.store);
    let coordinator = coordinator::spawn(
        bed.collaborators(Vec::new()),
        CoordinatorConfig {
            streaming: true,
            continuous_dialog: false,
        },
    );
    let bus: Arc<dyn HardwareBus> = Arc::new(SimulatedBus::start());
    let (tokens, _) = broadcast::channel(16);

    let state = ApiState::new(Arc::clone(&store), coordinator, Arc::clone(&bus), tokens);
    let router = ApiServer::new(state, 0, None).router();
    Fixture { store, bus, router }
}

fn json_post(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn update_config_coerces_and_filters_keys() {
    let fx = fixture();

    let response = fx
        .router
        .oneshot(json_post(
            "/update_config",
            serde_json::json!({
                "general_volume": "0.8",
                "time_notify": "false",
                "bogus_key": true,
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    let applied: Vec<String> = json["applied"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_str().unwrap().to_string())
        .collect();
    assert!(applied.contains(&"general_volume".to_string()));
    assert!(applied.contains(&"time_notify".to_string()));
    assert_eq!(json["rejected"], serde_json::json!(["bogus_key"]));

    // String values landed with their natural types
    assert_eq!(fx.store.get_f64(keys::GENERAL_VOLUME), Some(0.8));
    assert!(!fx.store.get_bool(keys::TIME_NOTIFY));
}

#[tokio::test]
async fn get_answer_reports_only_changes() {
    let fx = fixture();

    let first = fx
        .router
        .clone()
        .oneshot(Request::get("/get_answer").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let first = body_json(first).await;
    assert!(first.as_str().is_some());

    // Unchanged: null
    let second = fx
        .router
        .clone()
        .oneshot(Request::get("/get_answer").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(second).await, serde_json::Value::Null);

    fx.store.set(keys::ANSWER, "新的回复");
    let third = fx
        .router
        .oneshot(Request::get("/get_answer").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(body_json(third).await, serde_json::json!("新的回复"));
}

#[tokio::test]
async fn quick_commands_can_be_added_and_removed() {
    let fx = fixture();

    let response = fx
        .router
        .clone()
        .oneshot(json_post(
            "/add_quick_command",
            serde_json::json!({"command": "开灯"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    assert!(list.as_array().unwrap().contains(&serde_json::json!("开灯")));

    let response = fx
        .router
        .clone()
        .oneshot(json_post(
            "/remove_quick_command",
            serde_json::json!({"command": "开灯"}),
        ))
        .await
        .unwrap();
    let list = body_json(response).await;
    assert!(!list.as_array().unwrap().contains(&serde_json::json!("开灯")));

    // Blank commands are refused
    let response = fx
        .router
        .oneshot(json_post(
            "/add_quick_command",
            serde_json::json!({"command": "   "}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn injected_command_lands_in_the_store() {
    let fx = fixture();

    let response = fx
        .router
        .clone()
        .oneshot(
            Request::get("/command?words=%E4%BD%A0%E5%A5%BD")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(fx.store.get_str(keys::COMMAND), "你好");

    let response = fx
        .router
        .oneshot(Request::get("/command?words=").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn device_control_round_trips_through_the_bus() {
    let fx = fixture();

    let response = fx
        .router
        .clone()
        .oneshot(json_post(
            "/api/control_device",
            serde_json::json!({"device": "led", "brightness": 60}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let status = fx.bus.device_status();
    assert!(status.led_on);
    assert_eq!(status.led_brightness, 60);

    let response = fx
        .router
        .clone()
        .oneshot(json_post(
            "/api/control_device",
            serde_json::json!({"device": "buzzer", "state": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(fx.bus.device_status().buzzer_on);

    let response = fx
        .router
        .oneshot(json_post(
            "/api/control_device",
            serde_json::json!({"device": "toaster", "state": true}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn sensor_data_is_null_before_the_first_sample() {
    let fx = fixture();

    let response = fx
        .router
        .oneshot(
            Request::get("/api/sensor_data")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    // The simulator may or may not have sampled yet; the shape is stable
    assert!(json.get("temperature").is_some());
    assert!(json.get("humidity").is_some());
    assert!(json.get("updated_at").is_some());
}

#[tokio::test]
async fn device_status_reports_actuator_state() {
    let fx = fixture();
    fx.bus.set_led(true).unwrap();

    let response = fx
        .router
        .oneshot(
            Request::get("/api/device_status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["led"]["on"], true);
    assert_eq!(json["buzzer"]["on"], false);
}
