//! Request routing for the read/write API.
//!
//! | Method | Path | Effect |
//! |---|---|---|
//! | `GET` | `/` | service info |
//! | `GET` | `/api/devices` | full state snapshot |
//! | `GET` | `/api/sensors` | sensors sub-map |
//! | `POST` | `/api/devices/{category}/{device}` | writer update, body `{"state": …}` |
//! | `OPTIONS` | any | CORS preflight |
//!
//! The `/api` prefix is optional. Routing is synchronous: every handler is a
//! short call into the [`BridgeCore`].

use chrono::{SecondsFormat, Utc};
use hearth_kernel::BridgeCore;
use hearth_types::HearthError;
use serde_json::{Value, json};
use tracing::info;

use crate::http::{Request, Response};

const API_PREFIX: &str = "/api";

enum Route<'a> {
    Info,
    Devices,
    Sensors,
    Device { category: &'a str, device: &'a str },
}

fn match_route(path: &str) -> Option<Route<'_>> {
    let path = path
        .strip_prefix(API_PREFIX)
        .filter(|rest| rest.is_empty() || rest.starts_with('/'))
        .unwrap_or(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        [] => Some(Route::Info),
        ["devices"] => Some(Route::Devices),
        ["sensors"] => Some(Route::Sensors),
        ["devices", category, device] => Some(Route::Device {
            category: *category,
            device: *device,
        }),
        _ => None,
    }
}

pub fn route(core: &BridgeCore, request: &Request) -> Response {
    if request.method == "OPTIONS" {
        return Response::no_content()
            .with_header("Access-Control-Allow-Methods", "GET, POST, OPTIONS")
            .with_header("Access-Control-Allow-Headers", "Content-Type");
    }
    let Some(route) = match_route(&request.path) else {
        return failure(404, "Not found");
    };
    match (request.method.as_str(), route) {
        ("GET", Route::Info) => info_response(core),
        ("GET", Route::Devices) => Response::json(
            200,
            json!({ "success": true, "data": core.snapshot(), "timestamp": timestamp() }),
        ),
        ("GET", Route::Sensors) => Response::json(
            200,
            json!({ "success": true, "data": core.sensors(), "timestamp": timestamp() }),
        ),
        ("POST", Route::Device { category, device }) => {
            write_device(core, category, device, &request.body)
        }
        _ => failure(405, "Method not allowed"),
    }
}

fn write_device(core: &BridgeCore, category: &str, device: &str, body: &[u8]) -> Response {
    let Ok(body) = serde_json::from_slice::<Value>(body) else {
        return failure(400, "Request body must be JSON");
    };
    let Some(state) = body.get("state") else {
        return failure(400, "Missing 'state' in request body");
    };
    match core.apply_write(category, device, state) {
        Ok(ack) => Response::json(200, json!({ "success": true, "message": ack.message() })),
        Err(e) => {
            info!(category, device, error = %e, "write rejected");
            error_response(&e)
        }
    }
}

fn info_response(core: &BridgeCore) -> Response {
    Response::json(
        200,
        json!({
            "message": "Hearth home automation bridge",
            "status": "running",
            "version": env!("CARGO_PKG_VERSION"),
            "endpoints": {
                "devices": "/api/devices",
                "control": "/api/devices/:category/:device",
                "sensors": "/api/sensors",
                "viewers": "ws://<host>/",
            },
            "viewers": core.viewer_count(),
        }),
    )
}

fn error_response(error: &HearthError) -> Response {
    failure(error.status_code(), &error.api_message())
}

fn failure(status: u16, message: &str) -> Response {
    Response::json(status, json!({ "success": false, "error": message }))
}

fn timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use hearth_types::DeviceState;

    fn core() -> Arc<BridgeCore> {
        BridgeCore::new(DeviceState::default(), "home", 16).0
    }

    fn post(path: &str, body: &str) -> Request {
        Request::new("POST", path, body)
    }

    #[test]
    fn get_devices_returns_snapshot() {
        let core = core();
        let response = route(&core, &Request::new("GET", "/api/devices", ""));
        assert_eq!(response.status, 200);
        let body = response.body.unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["lights"]["bedroom"], true);
        assert!(body["timestamp"].as_str().unwrap().ends_with('Z'));
    }

    #[test]
    fn api_prefix_is_optional() {
        let core = core();
        for path in ["/devices", "/api/devices", "/api/devices/"] {
            assert_eq!(route(&core, &Request::new("GET", path, "")).status, 200, "{path}");
        }
        assert_eq!(route(&core, &Request::new("GET", "/apidevices", "")).status, 404);
    }

    #[test]
    fn get_sensors_returns_sensor_map() {
        let core = core();
        let body = route(&core, &Request::new("GET", "/api/sensors", "")).body.unwrap();
        assert_eq!(body["data"]["humidity"], 45.0);
        assert_eq!(body["data"]["motion"], false);
    }

    #[test]
    fn write_then_read() {
        let core = core();
        let response = route(&core, &post("/api/devices/appliances/fan", r#"{"state":false}"#));
        assert_eq!(response.status, 200);
        assert_eq!(response.body.unwrap()["message"], "fan updated to false");

        let body = route(&core, &Request::new("GET", "/devices", "")).body.unwrap();
        assert_eq!(body["data"]["appliances"]["fan"], false);
    }

    #[test]
    fn door_is_reachable_under_security() {
        let core = core();
        let response = route(&core, &post("/api/devices/security/front", r#"{"state":"UNLOCK"}"#));
        assert_eq!(response.status, 200);
        assert!(!core.snapshot().security.doors["front"]);
    }

    #[test]
    fn unknown_device_is_404_and_changes_nothing() {
        let core = core();
        let before = core.snapshot();
        let response = route(&core, &post("/devices/lights/attic", r#"{"state":true}"#));
        assert_eq!(response.status, 404);
        let body = response.body.unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "Device not found");
        assert_eq!(core.snapshot(), before);
    }

    #[test]
    fn bad_bodies_and_values_are_400() {
        let core = core();
        let cases = [
            ("/devices/lights/kitchen", "not json"),
            ("/devices/lights/kitchen", r#"{"on":true}"#),
            ("/devices/lights/kitchen", r#"{"state":"sometimes"}"#),
            ("/devices/sensors/humidity", r#"{"state":10}"#),
        ];
        for (path, body) in cases {
            let response = route(&core, &post(path, body));
            assert_eq!(response.status, 400, "{path} {body}");
        }
        let response = route(&core, &post("/devices/sensors/humidity", r#"{"state":10}"#));
        assert_eq!(response.body.unwrap()["error"], "Device is read-only");
    }

    #[test]
    fn unknown_paths_and_methods() {
        let core = core();
        assert_eq!(route(&core, &Request::new("GET", "/api/unknown", "")).status, 404);
        assert_eq!(route(&core, &Request::new("DELETE", "/api/devices", "")).status, 405);
        assert_eq!(route(&core, &Request::new("GET", "/api/devices/lights/kitchen", "")).status, 405);
    }

    #[test]
    fn options_is_preflight() {
        let core = core();
        let response = route(&core, &Request::new("OPTIONS", "/api/devices/lights/kitchen", ""));
        assert_eq!(response.status, 204);
        assert!(response
            .headers
            .contains(&("Access-Control-Allow-Methods", "GET, POST, OPTIONS")));
    }

    #[test]
    fn info_lists_endpoints() {
        let core = core();
        let _viewer = core.connect_viewer();
        let body = route(&core, &Request::new("GET", "/", "")).body.unwrap();
        assert_eq!(body["status"], "running");
        assert_eq!(body["endpoints"]["devices"], "/api/devices");
        assert_eq!(body["viewers"], 1);
    }
}
