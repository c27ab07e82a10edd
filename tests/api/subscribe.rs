use crate::helpers::{stripe_list_json, TestApp, TestUser};
use association::domain::{SubscriptionStatus, UserId};
use claims::{assert_none, assert_some, assert_some_eq};
use serde_json::{json, Value};
use std::ops::RangeInclusive;
use wiremock::{
    matchers::{body_string_contains, method, path, query_param},
    Mock, ResponseTemplate,
};

#[tokio::test]
async fn subscribe_without_gateway_headers_returns_401() {
    // given
    let app = TestApp::spawn().await;

    // when
    let response = app.post_subscribe(None).await;

    // then
    assert_eq!(response.status(), 401);
}

#[tokio::test]
async fn subscribe_registers_a_new_customer_and_returns_the_checkout_session() {
    // given
    let app = TestApp::spawn().await;
    let user = TestUser::generate();

    Mock::given(path("/v1/customers"))
        .and(method("GET"))
        .and(query_param("email", user.email.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(stripe_list_json(&[])))
        .expect(1)
        .mount(&app.stripe_server)
        .await;
    Mock::given(path("/v1/customers"))
        .and(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "cus_new", "email": user.email })),
        )
        .expect(1)
        .mount(&app.stripe_server)
        .await;
    Mock::given(path("/v1/checkout/sessions"))
        .and(method("POST"))
        .and(body_string_contains("customer=cus_new"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_1",
            "customer": "cus_new",
            "subscription": null,
        })))
        .expect(1)
        .mount(&app.stripe_server)
        .await;

    // when
    let response = app.post_subscribe(Some(&user)).await;

    // then
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["checkout_session_id"], "cs_1");
    let customer = assert_some!(app.customers.get_for_user_id(UserId(user.id)).await.unwrap());
    assert_eq!(customer.stripe_customer_id, "cus_new");
}

#[tokio::test]
async fn subscribe_reuses_an_existing_customer() {
    // given
    let app = TestApp::spawn().await;
    let user = TestUser::generate();
    let customer = app.create_customer(&user).await;

    Mock::given(path("/v1/customers"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.stripe_server)
        .await;
    Mock::given(path("/v1/checkout/sessions"))
        .and(body_string_contains(format!(
            "customer={}",
            customer.stripe_customer_id
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_2",
            "customer": customer.stripe_customer_id,
            "subscription": null,
        })))
        .expect(1)
        .mount(&app.stripe_server)
        .await;

    // when
    let response = app.post_subscribe(Some(&user)).await;

    // then
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn subscribe_for_an_active_member_returns_409_without_a_checkout_session() {
    // given
    let app = TestApp::spawn().await;
    let user = TestUser::generate();
    let customer = app.create_customer(&user).await;
    app.create_subscription(&customer, "sub_1", SubscriptionStatus::Active)
        .await;

    Mock::given(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.stripe_server)
        .await;

    // when
    let response = app.post_subscribe(Some(&user)).await;

    // then
    assert_eq!(response.status(), 409);
}

#[tokio::test]
async fn subscribe_is_allowed_again_after_cancellation() {
    // given
    let app = TestApp::spawn().await;
    let user = TestUser::generate();
    let customer = app.create_customer(&user).await;
    app.create_subscription(&customer, "sub_1", SubscriptionStatus::Canceled)
        .await;

    Mock::given(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_3",
            "customer": customer.stripe_customer_id,
            "subscription": null,
        })))
        .expect(1)
        .mount(&app.stripe_server)
        .await;

    // when
    let response = app.post_subscribe(Some(&user)).await;

    // then
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn subscribe_returns_409_when_the_email_matches_several_stripe_customers() {
    // given
    let app = TestApp::spawn().await;
    let user = TestUser::generate();

    Mock::given(path("/v1/customers"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stripe_list_json(&[
            json!({ "id": "cus_1", "email": user.email }),
            json!({ "id": "cus_2", "email": user.email }),
        ])))
        .expect(1)
        .mount(&app.stripe_server)
        .await;
    Mock::given(path("/v1/checkout/sessions"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&app.stripe_server)
        .await;

    // when
    let response = app.post_subscribe(Some(&user)).await;

    // then
    assert_eq!(response.status(), 409);
}

async fn mount_new_stripe_customer(app: &TestApp, user: &TestUser, expected_calls: RangeInclusive<u64>) {
    Mock::given(path("/v1/customers"))
        .and(method("GET"))
        .respond_with(ResponseTemplate::new(200).set_body_json(stripe_list_json(&[])))
        .expect(expected_calls.clone())
        .mount(&app.stripe_server)
        .await;
    Mock::given(path("/v1/customers"))
        .and(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({ "id": "cus_new", "email": user.email })),
        )
        .expect(expected_calls)
        .mount(&app.stripe_server)
        .await;
}

async fn mount_checkout_session(app: &TestApp, expected_calls: u64) {
    Mock::given(path("/v1/checkout/sessions"))
        .and(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "cs_1",
            "customer": "cus_new",
            "subscription": null,
        })))
        .expect(expected_calls)
        .mount(&app.stripe_server)
        .await;
}

#[tokio::test]
async fn first_checkout_creates_a_pending_subscription_for_the_customer() {
    // given
    let app = TestApp::spawn().await;
    let user = TestUser::generate();
    mount_new_stripe_customer(&app, &user, 1..=1).await;
    mount_checkout_session(&app, 1).await;

    // when
    let response = app.post_subscribe(Some(&user)).await;

    // then
    assert_eq!(response.status(), 200);
    let customer = assert_some!(app.customers.get_for_user_id(UserId(user.id)).await.unwrap());
    let subscription = assert_some!(app.store.get_by_customer(customer.id).await.unwrap());
    assert_eq!(subscription.status, SubscriptionStatus::Pending);
    assert_none!(subscription.stripe_subscription_id);
    assert_some_eq!(subscription.stripe_customer_id, "cus_new");
    assert_eq!(app.subscription_count().await, 1);
}

#[tokio::test]
async fn repeated_checkout_reuses_the_pending_subscription() {
    // given
    let app = TestApp::spawn().await;
    let user = TestUser::generate();
    mount_new_stripe_customer(&app, &user, 1..=1).await;
    mount_checkout_session(&app, 2).await;
    app.post_subscribe(Some(&user)).await;
    let customer = app
        .customers
        .get_for_user_id(UserId(user.id))
        .await
        .unwrap()
        .unwrap();
    let pending = app.store.get_by_customer(customer.id).await.unwrap().unwrap();

    // when
    let response = app.post_subscribe(Some(&user)).await;

    // then
    assert_eq!(response.status(), 200);
    assert_some_eq!(app.store.get_by_customer(customer.id).await.unwrap(), pending);
    assert_eq!(app.subscription_count().await, 1);
}

#[tokio::test]
async fn concurrent_first_checkouts_register_one_customer() {
    // given
    let app = TestApp::spawn().await;
    let user = TestUser::generate();
    mount_new_stripe_customer(&app, &user, 1..=2).await;
    mount_checkout_session(&app, 2).await;

    // when
    let (first, second) = tokio::join!(
        app.post_subscribe(Some(&user)),
        app.post_subscribe(Some(&user))
    );

    // then
    assert_eq!(first.status(), 200);
    assert_eq!(second.status(), 200);
    let customers: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM customers")
        .fetch_one(&app.db_pool)
        .await
        .unwrap();
    assert_eq!(customers, 1);
    assert_eq!(app.subscription_count().await, 1);
}
