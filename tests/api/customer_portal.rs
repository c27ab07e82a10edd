use crate::helpers::{TestApp, TestUser};
use serde_json::{json, Value};
use wiremock::{
    matchers::{body_string_contains, method, path},
    Mock, ResponseTemplate,
};

#[tokio::test]
async fn customer_portal_returns_404_for_users_who_are_not_customers() {
    // given
    let app = TestApp::spawn().await;

    // when
    let response = app.get_customer_portal(&TestUser::generate()).await;

    // then
    assert_eq!(response.status(), 404);
}

#[tokio::test]
async fn customer_portal_returns_the_stripe_portal_url() {
    // given
    let app = TestApp::spawn().await;
    let user = TestUser::generate();
    let customer = app.create_customer(&user).await;

    Mock::given(path("/v1/billing_portal/sessions"))
        .and(method("POST"))
        .and(body_string_contains(format!(
            "customer={}",
            customer.stripe_customer_id
        )))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "bps_1",
            "url": "https://billing.stripe.com/session/bps_1",
        })))
        .expect(1)
        .mount(&app.stripe_server)
        .await;

    // when
    let response = app.get_customer_portal(&user).await;

    // then
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["url"], "https://billing.stripe.com/session/bps_1");
}
