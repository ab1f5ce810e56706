//! Weather node against a local stand-in for the weather API.

use std::collections::HashMap;
use std::net::SocketAddr;

use axum::extract::Query;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{Map, Value, json};
use tokio::net::TcpListener;
use toolgate_agent::nodes::WeatherApi;
use toolgate_agent::nodes::weather::CREDENTIAL_TYPE;
use toolgate_core::{Credential, LocalNode, NodeContext, NodeErrorCode};

async fn current_weather(Query(params): Query<HashMap<String, String>>) -> Response {
    if params.get("appid").map(String::as_str) != Some("good-key") {
        return (StatusCode::UNAUTHORIZED, Json(json!({ "cod": 401, "message": "Invalid API key" })))
            .into_response();
    }
    match params.get("q").map(String::as_str) {
        Some("Atlantis") => {
            (StatusCode::NOT_FOUND, Json(json!({ "cod": "404", "message": "city not found" })))
                .into_response()
        }
        Some("Overload") => (StatusCode::TOO_MANY_REQUESTS, "rate limited").into_response(),
        Some(city) => Json(json!({
            "name": city,
            "sys": { "country": "GB" },
            "main": { "temp": 11.5, "feels_like": 9.8, "humidity": 81 },
            "weather": [{ "description": "light rain" }],
            "wind": { "speed": 4.1 },
            "units_seen": params.get("units"),
        }))
        .into_response(),
        None => StatusCode::BAD_REQUEST.into_response(),
    }
}

async fn serve() -> SocketAddr {
    let app = Router::new().route("/data/2.5/weather", get(current_weather));
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
    addr
}

fn node(addr: SocketAddr) -> WeatherApi {
    WeatherApi::default().with_base_url(format!("http://{addr}/data/2.5/"))
}

fn ctx(key: &str) -> NodeContext {
    let credential = Credential::new(CREDENTIAL_TYPE).with_field("api_key", key);
    NodeContext::new("exec-1", "trace-1")
        .with_credentials([(CREDENTIAL_TYPE.to_string(), credential)].into_iter().collect())
}

fn input(location: &str, units: Option<&str>) -> Map<String, Value> {
    let mut input = Map::new();
    input.insert("location".into(), json!(location));
    if let Some(units) = units {
        input.insert("units".into(), json!(units));
    }
    input
}

#[tokio::test]
async fn current_weather_is_summarized() {
    let addr = serve().await;

    let output = node(addr)
        .execute(input("London", Some("imperial")), &ctx("good-key"))
        .await
        .unwrap();

    assert_eq!(output["location"], "London");
    assert_eq!(output["country"], "GB");
    assert_eq!(output["temperature"], 11.5);
    assert_eq!(output["humidity"], 81);
    assert_eq!(output["description"], "light rain");
    assert_eq!(output["wind_speed"], 4.1);
    assert_eq!(output["raw_data"]["units_seen"], "imperial");
}

#[tokio::test]
async fn api_failures_map_to_codes() {
    let addr = serve().await;
    let node = node(addr);

    let err = node.execute(input("London", None), &ctx("bad-key")).await.unwrap_err();
    assert_eq!(err.code(), NodeErrorCode::AuthError);

    let err = node.execute(input("Atlantis", None), &ctx("good-key")).await.unwrap_err();
    assert_eq!(err.code(), NodeErrorCode::NotFound);
    assert!(err.to_string().contains("Location not found: Atlantis"));

    let err = node.execute(input("Overload", None), &ctx("good-key")).await.unwrap_err();
    assert_eq!(err.code(), NodeErrorCode::ApiError);
    assert!(err.to_string().contains("rate limited"));
}

#[tokio::test]
async fn unreachable_api_is_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = node(addr)
        .execute(input("London", None), &ctx("good-key"))
        .await
        .unwrap_err();
    assert_eq!(err.code(), NodeErrorCode::NetworkError);
}
