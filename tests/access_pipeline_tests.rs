mod common;

use std::sync::atomic::Ordering;

use axum::http::StatusCode;
use common::{TestApp, body_json, json_request, request, sign, token_for};
use serde_json::json;
use uuid::Uuid;

// --- Public routes ---

#[tokio::test]
async fn anonymous_can_list_cars() {
    let app = TestApp::new().await;
    app.repo.seed_car(Uuid::new_v4(), "Toyota", 9500.0);

    let response = app.send(request("GET", "/v1/cars", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn anonymous_can_increment_review_count() {
    let app = TestApp::new().await;
    let car = app.repo.seed_car(Uuid::new_v4(), "Mazda", 7000.0);

    let uri = format!("/v1/cars/{}/review_count_increment", car.id);
    let response = app.send(request("PUT", &uri, None)).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn health_and_docs_are_public() {
    let app = TestApp::new().await;

    let health = app.send(request("GET", "/health", None)).await;
    assert_eq!(health.status(), StatusCode::OK);

    let docs = app.send(request("GET", "/api-docs/openapi.json", None)).await;
    assert_eq!(docs.status(), StatusCode::OK);
}

#[tokio::test]
async fn public_route_ignores_a_garbage_credential() {
    let app = TestApp::new().await;
    app.repo.seed_car(Uuid::new_v4(), "Skoda", 4100.0);

    let response = app
        .send(request("GET", "/v1/cars", Some("garbage")))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn anonymous_head_on_public_listing() {
    let app = TestApp::new().await;

    let response = app.send(request("HEAD", "/v1/cars", None)).await;

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn public_path_with_protected_method_requires_credential() {
    let app = TestApp::new().await;
    let car = app.repo.seed_car(Uuid::new_v4(), "Ford", 3000.0);

    let uri = format!("/v1/cars/{}", car.id);
    let response = app.send(request("DELETE", &uri, None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(app.repo.has_car(car.id));
}

// --- Authentication ---

#[tokio::test]
async fn missing_credential_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request("POST", "/v1/cars", None, json!({ "make": "Audi" })))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert_eq!(body["error"], "authentication required");
    assert_eq!(app.repo.car_count(), 0);
}

#[tokio::test]
async fn garbage_bearer_is_rejected() {
    let app = TestApp::new().await;

    let response = app
        .send(json_request(
            "POST",
            "/v1/cars",
            Some("not.a.jwt"),
            json!({ "make": "Audi" }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn expired_token_is_rejected() {
    let app = TestApp::new().await;
    let token = sign(Uuid::new_v4(), "user", -3600, "car-market-local-token-key");

    let response = app.send(request("GET", "/v1/messages", Some(&token))).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn token_signed_with_another_key_is_rejected() {
    let app = TestApp::new().await;
    let token = sign(Uuid::new_v4(), "user", 3600, "some-other-key");

    let response = app.send(request("GET", "/v1/messages", Some(&token))).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn non_bearer_scheme_is_rejected() {
    let app = TestApp::new().await;
    let mut req = request("GET", "/v1/messages", None);
    req.headers_mut()
        .insert("authorization", "Basic dXNlcjpwYXNz".parse().unwrap());

    let response = app.send(req).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_scheme_is_case_insensitive() {
    let app = TestApp::new().await;
    let token = token_for(Uuid::new_v4(), "user");
    let mut req = request("GET", "/v1/messages", None);
    req.headers_mut()
        .insert("authorization", format!("bearer {token}").parse().unwrap());

    let response = app.send(req).await;

    assert_eq!(response.status(), StatusCode::OK);
}

// --- Coarse policy ---

#[tokio::test]
async fn role_without_rule_is_forbidden_before_ownership() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let car = app.repo.seed_car(owner, "Honda", 4500.0);
    let token = token_for(owner, "guest");

    let uri = format!("/v1/cars/{}", car.id);
    let response = app.send(request("DELETE", &uri, Some(&token))).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(app.repo.ownership_calls(), 0);
    assert!(app.repo.has_car(car.id));
}

#[tokio::test]
async fn admin_inherits_user_grants() {
    let app = TestApp::new().await;
    let token = token_for(Uuid::new_v4(), "admin");

    let response = app
        .send(json_request(
            "POST",
            "/v1/cars",
            Some(&token),
            json!({ "type": "suv", "make": "Volvo", "model": "XC60", "price": 32000.0 }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
}

#[tokio::test]
async fn unknown_path_fails_closed() {
    let app = TestApp::new().await;
    let token = token_for(Uuid::new_v4(), "user");

    let anonymous = app.send(request("GET", "/v1/garages", None)).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let authenticated = app.send(request("GET", "/v1/garages", Some(&token))).await;
    assert_eq!(authenticated.status(), StatusCode::FORBIDDEN);
}

// --- Ownership ---

#[tokio::test]
async fn non_owner_cannot_delete_car() {
    let app = TestApp::new().await;
    let car = app.repo.seed_car(Uuid::new_v4(), "BMW", 12000.0);
    let token = token_for(Uuid::new_v4(), "user");

    let uri = format!("/v1/cars/{}", car.id);
    let response = app.send(request("DELETE", &uri, Some(&token))).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["error"], "permission denied");
    assert!(app.repo.has_car(car.id));
}

#[tokio::test]
async fn owner_can_delete_car() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let car = app.repo.seed_car(owner, "BMW", 12000.0);
    let token = token_for(owner, "user");

    let uri = format!("/v1/cars/{}", car.id);
    let response = app.send(request("DELETE", &uri, Some(&token))).await;

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(!app.repo.has_car(car.id));
}

#[tokio::test]
async fn missing_resource_is_indistinguishable_from_foreign_one() {
    let app = TestApp::new().await;
    let token = token_for(Uuid::new_v4(), "user");

    let uri = format!("/v1/cars/{}", Uuid::new_v4());
    let response = app.send(request("DELETE", &uri, Some(&token))).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn malformed_id_is_rejected_without_lookup() {
    let app = TestApp::new().await;
    let token = token_for(Uuid::new_v4(), "user");

    let response = app
        .send(request("DELETE", "/v1/comments/not-a-uuid", Some(&token)))
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"], "invalid comment id format");
    assert_eq!(app.repo.ownership_calls(), 0);
}

#[tokio::test]
async fn ownership_lookup_failure_denies() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let car = app.repo.seed_car(owner, "Kia", 8000.0);
    app.repo.fail_ownership.store(true, Ordering::SeqCst);
    let token = token_for(owner, "user");

    let uri = format!("/v1/cars/{}", car.id);
    let response = app.send(request("DELETE", &uri, Some(&token))).await;

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert!(app.repo.has_car(car.id));
}

#[tokio::test]
async fn image_ownership_follows_the_car() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let car = app.repo.seed_car(owner, "Skoda", 6000.0);
    let image = app.repo.seed_image(car.id);
    let uri = format!("/v1/images/{}", image.id);

    let stranger = token_for(Uuid::new_v4(), "user");
    let denied = app.send(request("DELETE", &uri, Some(&stranger))).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let token = token_for(owner, "user");
    let allowed = app.send(request("DELETE", &uri, Some(&token))).await;
    assert_eq!(allowed.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn only_the_sender_may_delete_a_message() {
    let app = TestApp::new().await;
    let sender = Uuid::new_v4();
    let recipient = Uuid::new_v4();
    let message = app.repo.seed_message(sender, recipient, "hello");
    let uri = format!("/v1/messages/{}", message.id);

    let as_recipient = token_for(recipient, "user");
    let denied = app.send(request("DELETE", &uri, Some(&as_recipient))).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let as_sender = token_for(sender, "user");
    let allowed = app.send(request("DELETE", &uri, Some(&as_sender))).await;
    assert_eq!(allowed.status(), StatusCode::NO_CONTENT);
    assert_eq!(app.repo.message_count(), 0);
}

#[tokio::test]
async fn bulk_comment_delete_requires_car_ownership() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let car = app.repo.seed_car(owner, "Fiat", 2000.0);
    app.repo.seed_comment(Uuid::new_v4(), car.id);
    let uri = format!("/v1/comments/car/{}", car.id);

    let anonymous = app.send(request("DELETE", &uri, None)).await;
    assert_eq!(anonymous.status(), StatusCode::UNAUTHORIZED);

    let stranger = token_for(Uuid::new_v4(), "user");
    let denied = app.send(request("DELETE", &uri, Some(&stranger))).await;
    assert_eq!(denied.status(), StatusCode::FORBIDDEN);

    let token = token_for(owner, "user");
    let allowed = app.send(request("DELETE", &uri, Some(&token))).await;
    assert_eq!(allowed.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn non_owner_mutations_are_denied_and_change_nothing() {
    let app = TestApp::new().await;
    let owner = Uuid::new_v4();
    let stranger = token_for(Uuid::new_v4(), "user");
    let car = app.repo.seed_car(owner, "Volvo", 15000.0);
    let image = app.repo.seed_image(car.id);
    let saved = app.repo.seed_saved_car(owner, car.id);
    let comment = app.repo.seed_comment(owner, car.id);
    let message = app.repo.seed_message(owner, Uuid::new_v4(), "still for sale?");
    let device = app.repo.seed_token(owner, "owner-device");

    let cases = [
        ("PUT", format!("/v1/cars/{}", car.id), Some(json!({ "price": 1.0 }))),
        ("DELETE", format!("/v1/cars/{}", car.id), None),
        (
            "POST",
            format!("/v1/cars/{}/images", car.id),
            Some(json!({ "filename": "mine.jpg" })),
        ),
        ("DELETE", format!("/v1/cars/{}/images", car.id), None),
        ("DELETE", format!("/v1/cars/{}/saved", car.id), None),
        ("DELETE", format!("/v1/images/{}", image.id), None),
        ("DELETE", format!("/v1/saved_cars/{}", saved.id), None),
        (
            "PUT",
            format!("/v1/comments/{}", comment.id),
            Some(json!({ "content": "edited by someone else" })),
        ),
        ("DELETE", format!("/v1/comments/{}", comment.id), None),
        ("DELETE", format!("/v1/comments/car/{}", car.id), None),
        ("PUT", format!("/v1/messages/{}/read", message.id), None),
        ("DELETE", format!("/v1/messages/{}", message.id), None),
        ("DELETE", format!("/v1/notifications_tokens/{}", device.id), None),
    ];

    let before = app.repo.snapshot();
    for (method, uri, body) in cases {
        let req = match body {
            Some(body) => json_request(method, &uri, Some(&stranger), body),
            None => request(method, &uri, Some(&stranger)),
        };
        let response = app.send(req).await;
        assert_eq!(response.status(), StatusCode::FORBIDDEN, "{method} {uri}");
    }
    assert_eq!(app.repo.snapshot(), before);
}

#[tokio::test]
async fn created_car_is_owned_by_the_caller() {
    let app = TestApp::new().await;
    let caller = Uuid::new_v4();
    let token = token_for(caller, "user");

    let response = app
        .send(json_request(
            "POST",
            "/v1/cars",
            Some(&token),
            json!({
                "type": "hatchback",
                "make": "VW",
                "model": "Golf",
                "price": 15000.0,
                "owner_id": Uuid::new_v4(),
            }),
        ))
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    assert_eq!(body["owner_id"], caller.to_string());
}

// --- Observability ---

#[tokio::test]
async fn denied_responses_carry_a_request_id() {
    let app = TestApp::new().await;

    let response = app.send(request("POST", "/v1/cars", None)).await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("x-request-id"));
}
