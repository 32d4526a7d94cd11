mod common;

use axum::http::StatusCode;
use common::{card_provider, collect_body, momo_provider, TestGateway, TOKEN_BODY};
use paygate_core::domain::{
    CompletedBy, Transaction, TransactionFilter, TransactionPatch, TransactionStatus,
    TransactionType,
};
use paygate_core::ports::TransactionRepository;
use serde_json::json;
use uuid::Uuid;

const PROVIDER_REF: &str = "3b0c8f7e-2d61-4c55-9a8e-6f1d2c3b4a59";

async fn seed(gateway: &TestGateway, py_ref: &str) -> Transaction {
    let tx = Transaction::new(
        Uuid::new_v4(),
        py_ref.to_string(),
        "mtn-momo".to_string(),
        TransactionType::Collection,
        "1000".parse().unwrap(),
        "UGX".to_string(),
        Some("256771234567".to_string()),
        Some(PROVIDER_REF.to_string()),
    );
    gateway.transactions.insert_one(&tx).await.unwrap()
}

async fn stored(gateway: &TestGateway, py_ref: &str) -> Transaction {
    gateway
        .transactions
        .find_one(&TransactionFilter::py_ref(py_ref))
        .await
        .unwrap()
        .unwrap()
}

async fn token_mock(server: &mut mockito::ServerGuard) -> mockito::Mock {
    server
        .mock("POST", "/collection/token/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(TOKEN_BODY)
        .create_async()
        .await
}

#[tokio::test]
async fn test_poll_reports_webhook_result_that_landed_first() {
    let mut server = mockito::Server::new_async().await;
    let _token = token_mock(&mut server).await;
    let query = server
        .mock(
            "GET",
            format!("/collection/v1_0/requesttopay/{}", PROVIDER_REF).as_str(),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"financialTransactionId":"777","status":"SUCCESSFUL"}"#)
        .create_async()
        .await;
    let gateway = TestGateway::settled_first(
        json!({"mtn-momo": momo_provider(&server.url(), &server.url())}),
        TransactionPatch::terminal(TransactionStatus::Failed, CompletedBy::Webhook),
    );
    seed(&gateway, "race-1").await;

    let (status, body) = gateway.get("/v1/transactions/race-1/status").await;

    query.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "FAILED");
    assert_eq!(body["data"]["completed_by"], "WEBHOOK");

    let tx = stored(&gateway, "race-1").await;
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(tx.completed_by, Some(CompletedBy::Webhook));
    assert_eq!(tx.financial_id, None);
}

#[tokio::test]
async fn test_accepted_initiate_reports_earlier_webhook_failure() {
    let mut server = mockito::Server::new_async().await;
    let _token = token_mock(&mut server).await;
    let _initiate = server
        .mock("POST", "/collection/v1_0/requesttopay")
        .with_status(202)
        .create_async()
        .await;
    let gateway = TestGateway::settled_first(
        json!({"mtn-momo": momo_provider(&server.url(), &server.url())}),
        TransactionPatch::terminal(TransactionStatus::Failed, CompletedBy::Webhook)
            .message("Payer declined"),
    );

    let (status, body) = gateway
        .post("/v1/collect", Some("mtn-momo"), collect_body("race-2"))
        .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["success"], false);
    assert_eq!(body["message"], "Payer declined");
    assert_eq!(body["data"]["status"], "FAILED");
    assert_eq!(body["data"]["completed_by"], "WEBHOOK");

    let tx = stored(&gateway, "race-2").await;
    assert_eq!(tx.status, TransactionStatus::Failed);
    assert_eq!(tx.completed_by, Some(CompletedBy::Webhook));
}

#[tokio::test]
async fn test_rejected_checkout_reports_earlier_webhook_completion() {
    let mut server = mockito::Server::new_async().await;
    let _checkout = server
        .mock("POST", "/v3/payments")
        .with_status(400)
        .create_async()
        .await;
    let gateway = TestGateway::settled_first(
        json!({"flutterwave": card_provider(&server.url())}),
        TransactionPatch::terminal(TransactionStatus::Completed, CompletedBy::Webhook),
    );

    let (status, body) = gateway
        .post(
            "/v1/collect",
            Some("flutterwave"),
            json!({
                "email": "payer@example.com",
                "amount": "2500",
                "currency": "UGX",
                "pyRef": "race-3",
                "description": "Order 3"
            }),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "COMPLETED");
    assert_eq!(stored(&gateway, "race-3").await.status, TransactionStatus::Completed);
}

#[tokio::test]
async fn test_webhook_reports_poll_result_that_landed_first() {
    let gateway = TestGateway::settled_first(
        json!({"mtn-momo": momo_provider("http://127.0.0.1:1", "http://127.0.0.1:1")}),
        TransactionPatch::terminal(TransactionStatus::Completed, CompletedBy::TransCheck),
    );
    seed(&gateway, "race-4").await;

    let (status, body) = gateway
        .post(
            "/v1/webhooks/mtn-momo",
            None,
            json!({"externalId": PROVIDER_REF, "status": "FAILED"}),
        )
        .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "COMPLETED");
    assert_eq!(body["data"]["completed_by"], "TRANS_CHECK");

    let tx = stored(&gateway, "race-4").await;
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.completed_by, Some(CompletedBy::TransCheck));
}
