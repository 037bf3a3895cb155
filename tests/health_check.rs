use actix_web::{test, web, App};
use chrono::DateTime;
use warden_server::config::{AuthConfig, DatabaseConfig, ServerConfig};
use warden_server::{AppState, Settings};

#[actix_web::test]
async fn test_health_check() {
    // Create test app state
    let config = Settings {
        environment: "test".to_string(),
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            workers: 1,
        },
        database: DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            busy_timeout_secs: 5,
        },
        auth: AuthConfig {
            jwt_secret: "test_secret".to_string(),
            access_token_ttl_minutes: 15,
            refresh_token_ttl_days: 7,
            argon2_memory_kib: 8192,
            argon2_iterations: 1,
            audit_failures: false,
        },
    };
    let state = web::Data::new(AppState::new(config).await.expect("Failed to build app state"));

    // Create test app
    let app = test::init_service(
        App::new()
            .app_data(state.clone())
            .route("/health", web::get().to(warden_server::health_check)),
    )
    .await;

    // Send request
    let req = test::TestRequest::get().uri("/health").to_request();
    let resp = test::call_service(&app, req).await;

    // Assert response
    assert!(resp.status().is_success());

    // Parse response body
    let body = test::read_body(resp).await;
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap();

    // Verify response format
    assert_eq!(json["status"], "healthy");
    assert!(DateTime::parse_from_rfc3339(
        json["timestamp"].as_str().unwrap()
    ).is_ok());
}
