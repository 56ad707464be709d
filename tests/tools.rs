//! Capability integration tests against mocked backends

use alfred::Error;
use alfred::tools::{
    BraveSearch, DirectionsClient, EventDraft, GoogleClient, ToolExecutor, ToolOutput,
    ToolRegistry, WeatherClient,
};
use secrecy::SecretString;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn secret(value: &str) -> SecretString {
    SecretString::from(value.to_string())
}

#[tokio::test]
async fn test_weather_summary() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Paris"))
        .and(query_param("format", "j1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "current_condition": [{
                "temp_F": "68",
                "weatherDesc": [{"value": "Partly Cloudy "}],
                "precipInches": "0.0"
            }]
        })))
        .mount(&server)
        .await;

    let weather = WeatherClient::with_base_url(&server.uri());
    let summary = weather.current("Paris").await.unwrap();
    assert_eq!(
        summary,
        "The current weather in Paris is 68°F with partly cloudy. Precipitation is 0.0 inches."
    );
}

#[tokio::test]
async fn test_weather_without_conditions_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
        .mount(&server)
        .await;

    let weather = WeatherClient::with_base_url(&server.uri());
    let err = weather.current("Atlantis").await.unwrap_err();
    assert!(matches!(err, Error::Tool(_)));
}

#[tokio::test]
async fn test_travel_duration_prefers_traffic_when_driving() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/maps/api/directions/json"))
        .and(query_param("mode", "driving"))
        .and(query_param("departure_time", "now"))
        .and(query_param("key", "maps-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "OK",
            "routes": [{"legs": [{
                "duration": {"text": "2 hours 40 mins"},
                "duration_in_traffic": {"text": "3 hours 5 mins"}
            }]}]
        })))
        .mount(&server)
        .await;

    let maps = DirectionsClient::with_base_url(secret("maps-key"), &server.uri());
    let answer = maps
        .travel_duration("Montreal", "Quebec City", "Driving")
        .await
        .unwrap();
    assert_eq!(
        answer,
        "Estimated travel duration from Montreal to Quebec City by driving (with current traffic): 3 hours 5 mins."
    );
}

#[tokio::test]
async fn test_travel_duration_without_route() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/maps/api/directions/json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": "ZERO_RESULTS",
            "routes": []
        })))
        .mount(&server)
        .await;

    let maps = DirectionsClient::with_base_url(secret("maps-key"), &server.uri());
    let answer = maps
        .travel_duration("Montreal", "Honolulu", "walking")
        .await
        .unwrap();
    assert_eq!(answer, "Could not find a route from Montreal to Honolulu via walking.");

    let err = maps
        .travel_duration("Montreal", "Quebec City", "teleport")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Tool(_)));
}

#[tokio::test]
async fn test_brave_search_formats_results() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/res/v1/web/search"))
        .and(header("X-Subscription-Token", "brave-key"))
        .and(query_param("q", "rust async"))
        .and(query_param("count", "5"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "web": {"results": [
                {"title": "Tokio", "url": "https://tokio.rs", "description": "A runtime"},
                {"title": "Async Book", "url": "https://rust-lang.github.io/async-book"}
            ]}
        })))
        .mount(&server)
        .await;

    let search = BraveSearch::with_base_url(secret("brave-key"), &server.uri());
    let text = search.search_formatted("rust async").await.unwrap();
    assert!(text.starts_with("1. Tokio\n   URL: https://tokio.rs\n   Description: A runtime\n"));
    assert!(text.contains("2. Async Book\n"));
}

fn google(server: &MockServer) -> GoogleClient {
    GoogleClient::with_base_urls(
        secret("ya29.test"),
        "America/New_York",
        &server.uri(),
        &server.uri(),
    )
}

#[tokio::test]
async fn test_list_unread_reads_headers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .and(header("authorization", "Bearer ya29.test"))
        .and(query_param("q", "is:unread"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "messages": [{"id": "m1"}, {"id": "m2"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages/m1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payload": {"headers": [
                {"name": "From", "value": "Lucius Fox <lucius@wayne.com>"},
                {"name": "Subject", "value": "Prototype ready"}
            ]}
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages/m2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "payload": {"headers": [{"name": "from", "value": "Gordon"}]}
        })))
        .mount(&server)
        .await;

    let lines = google(&server).list_unread(5).await.unwrap();
    assert_eq!(
        lines,
        vec![
            "From: Lucius Fox <lucius@wayne.com> - Subject: Prototype ready".to_string(),
            "From: Gordon - Subject: (unknown)".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_list_unread_empty_inbox() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/gmail/v1/users/me/messages"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"resultSizeEstimate": 0})))
        .mount(&server)
        .await;

    let lines = google(&server).list_unread(5).await.unwrap();
    assert_eq!(lines, vec!["No unread messages found.".to_string()]);
}

#[tokio::test]
async fn test_send_email() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/gmail/v1/users/me/messages/send"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id": "sent-42"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = google(&server);
    let answer = client
        .send_email("bruce@wayne.com", "Dinner", "Served at eight, sir.")
        .await
        .unwrap();
    assert_eq!(answer, "Email sent successfully to bruce@wayne.com. Message ID: sent-42");

    let err = client
        .send_email("bruce@wayne.com", "Dinner\r\nBcc: joker@arkham.org", "hi")
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Tool(_)));
}

#[tokio::test]
async fn test_expired_token_is_reported() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("invalid credentials"))
        .mount(&server)
        .await;

    let err = google(&server).list_events(5).await.unwrap_err();
    assert!(err.to_string().contains("may have expired"));
}

#[tokio::test]
async fn test_list_events() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(query_param("singleEvents", "true"))
        .and(query_param("orderBy", "startTime"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                {"summary": "Board meeting", "start": {"dateTime": "2025-07-15T10:00:00-04:00"}},
                {"start": {"date": "2025-07-16"}}
            ]
        })))
        .mount(&server)
        .await;

    let text = google(&server).list_events(5).await.unwrap();
    assert_eq!(
        text,
        "- Board meeting (Starts: 2025-07-15T10:00:00-04:00)\n- (no title) (Starts: 2025-07-16)"
    );
}

#[tokio::test]
async fn test_create_event() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/calendar/v3/calendars/primary/events"))
        .and(body_partial_json(json!({
            "summary": "Gala",
            "start": {"dateTime": "2025-07-15T19:00:00-04:00", "timeZone": "America/New_York"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "htmlLink": "https://calendar.google.com/event?eid=abc"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = google(&server);
    let draft = EventDraft {
        summary: "Gala",
        start_time: "2025-07-15T19:00:00-04:00",
        end_time: "2025-07-15T23:00:00-04:00",
        location: Some("Wayne Manor"),
        description: None,
    };
    let answer = client.create_event(&draft).await.unwrap();
    assert_eq!(
        answer,
        "Event created successfully: https://calendar.google.com/event?eid=abc"
    );

    let bad = EventDraft {
        start_time: "tomorrow at seven",
        ..draft
    };
    let err = client.create_event(&bad).await.unwrap_err();
    assert!(matches!(err, Error::Tool(_)));
}

#[tokio::test]
async fn test_registry_dispatches_by_name() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Gotham"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "current_condition": [{
                "temp_F": "51",
                "weatherDesc": [{"value": "Rain"}]
            }]
        })))
        .mount(&server)
        .await;

    let registry = ToolRegistry::new("Gotham City")
        .with_weather(WeatherClient::with_base_url(&server.uri()));

    assert_eq!(registry.schemas().len(), 10);

    let location = registry.execute("get_current_location", "{}").await.unwrap();
    assert_eq!(location, ToolOutput::Text("Gotham City".to_string()));

    let weather = registry
        .execute("get_weather", r#"{"location":"Gotham"}"#)
        .await
        .unwrap();
    assert_eq!(
        weather.into_content(),
        "The current weather in Gotham is 51°F with rain. Precipitation is unknown."
    );
}

#[tokio::test]
async fn test_registry_reports_missing_capabilities() {
    let registry = ToolRegistry::new("Gotham City");

    let err = registry.execute("launch_rockets", "{}").await.unwrap_err();
    assert!(matches!(err, Error::UnknownTool(_)));

    let err = registry
        .execute("brave_search", r#"{"query":"bats"}"#)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));

    let err = registry.execute("extract_page_text", "").await.unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));

    let err = registry.execute("list_calendar_events", "{}").await.unwrap_err();
    assert!(matches!(err, Error::Unavailable(_)));
}
