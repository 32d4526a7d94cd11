mod common;

use axum::http::StatusCode;
use common::{momo_provider, TestGateway, TOKEN_BODY};
use paygate_core::domain::{
    CompletedBy, Transaction, TransactionFilter, TransactionPatch, TransactionStatus,
    TransactionType,
};
use paygate_core::ports::TransactionRepository;
use serde_json::json;
use uuid::Uuid;

const PROVIDER_REF: &str = "7d6d5f2c-4c2f-4b7e-9f0c-3a1f2b9d8e11";

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

async fn upstream_answers(
    server: &mut mockito::ServerGuard,
    status: usize,
    body: serde_json::Value,
) -> (mockito::Mock, mockito::Mock) {
    let token = server
        .mock("POST", "/collection/token/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(TOKEN_BODY)
        .create_async()
        .await;
    let query = server
        .mock(
            "GET",
            format!("/collection/v1_0/requesttopay/{}", PROVIDER_REF).as_str(),
        )
        .match_header("authorization", "Bearer tok-1")
        .match_header("Ocp-Apim-Subscription-Key", "c-key")
        .with_status(status)
        .with_header("content-type", "application/json")
        .with_body(body.to_string())
        .create_async()
        .await;
    (token, query)
}

#[tokio::test]
async fn test_successful_poll_completes_by_trans_check() {
    let mut server = mockito::Server::new_async().await;
    let (_token, query) = upstream_answers(
        &mut server,
        200,
        json!({"financialTransactionId": "98765", "externalId": PROVIDER_REF, "status": "SUCCESSFUL"}),
    )
    .await;
    let gateway = TestGateway::new(json!({"mtn-momo": momo_provider(&server.url(), &server.url())}));
    seed(&gateway, "poll-1").await;

    let (status, body) = gateway.get("/v1/transactions/poll-1/status").await;

    query.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "COMPLETED");
    assert_eq!(body["data"]["completed_by"], "TRANS_CHECK");

    let tx = stored(&gateway, "poll-1").await;
    assert_eq!(tx.status, TransactionStatus::Completed);
    assert_eq!(tx.completed_by, Some(CompletedBy::TransCheck));
    assert_eq!(tx.financial_id.as_deref(), Some("98765"));
    assert_eq!(tx.metadata["upstream_status"], "SUCCESSFUL");
    assert_eq!(tx.metadata["upstream"]["financialTransactionId"], "98765");
}

#[tokio::test]
async fn test_cancelled_poll_is_internal_error() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = upstream_answers(&mut server, 200, json!({"status": "CANCELLED"})).await;
    let gateway = TestGateway::new(json!({"mtn-momo": momo_provider(&server.url(), &server.url())}));
    seed(&gateway, "poll-2").await;

    let (status, body) = gateway.get("/v1/transactions/poll-2/status").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["data"]["status"], "CANCELLED");
    assert_eq!(stored(&gateway, "poll-2").await.status, TransactionStatus::Cancelled);
}

#[tokio::test]
async fn test_pending_poll_is_gateway_timeout() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = upstream_answers(&mut server, 200, json!({"status": "PENDING"})).await;
    let gateway = TestGateway::new(json!({"mtn-momo": momo_provider(&server.url(), &server.url())}));
    seed(&gateway, "poll-3").await;

    let (status, body) = gateway.get("/v1/transactions/poll-3/status").await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["success"], false);
    let tx = stored(&gateway, "poll-3").await;
    assert_eq!(tx.status, TransactionStatus::Pending);
    assert_eq!(tx.completed_by, None);
}

#[tokio::test]
async fn test_unrecognised_status_passes_through() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = upstream_answers(
        &mut server,
        200,
        json!({"status": "REJECTED", "reason": {"code": "APPROVAL_REJECTED", "message": "Payer declined"}}),
    )
    .await;
    let gateway = TestGateway::new(json!({"mtn-momo": momo_provider(&server.url(), &server.url())}));
    seed(&gateway, "poll-4").await;

    let (status, body) = gateway.get("/v1/transactions/poll-4/status").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "REJECTED");
    let tx = stored(&gateway, "poll-4").await;
    assert_eq!(tx.status, TransactionStatus::Other("REJECTED".to_string()));
    assert_eq!(tx.message.as_deref(), Some("Payer declined"));
}

#[tokio::test]
async fn test_terminal_record_is_answered_from_ledger() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/collection/token/")
        .expect(0)
        .create_async()
        .await;
    let gateway = TestGateway::new(json!({"mtn-momo": momo_provider(&server.url(), &server.url())}));
    let tx = seed(&gateway, "poll-5").await;
    gateway
        .transactions
        .update_one(
            &TransactionFilter::gateway_ref(tx.gateway_ref),
            &TransactionPatch::terminal(TransactionStatus::Failed, CompletedBy::Request)
                .message("Conflict"),
        )
        .await
        .unwrap();

    let (status, body) = gateway.get("/v1/transactions/poll-5/status").await;

    token.assert_async().await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "FAILED");
    assert_eq!(body["data"]["completed_by"], "REQUEST");
}

#[tokio::test]
async fn test_unknown_reference_is_bad_request() {
    let mut server = mockito::Server::new_async().await;
    let token = server
        .mock("POST", "/collection/token/")
        .expect(0)
        .create_async()
        .await;
    let gateway = TestGateway::new(json!({"mtn-momo": momo_provider(&server.url(), &server.url())}));

    let (status, body) = gateway.get("/v1/transactions/missing-1/status").await;

    token.assert_async().await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);
}

#[tokio::test]
async fn test_unreachable_status_endpoint_leaves_ledger_unchanged() {
    let mut server = mockito::Server::new_async().await;
    let _token = server
        .mock("POST", "/collection/token/")
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(TOKEN_BODY)
        .create_async()
        .await;
    let gateway = TestGateway::new(json!({
        "mtn-momo": momo_provider("http://127.0.0.1:1", &server.url())
    }));
    seed(&gateway, "poll-6").await;

    let (status, body) = gateway.get("/v1/transactions/poll-6/status").await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["message"], "Unable to verify transaction status");
    assert_eq!(stored(&gateway, "poll-6").await.status, TransactionStatus::Pending);
}

#[tokio::test]
async fn test_rejected_status_query_leaves_ledger_unchanged() {
    let mut server = mockito::Server::new_async().await;
    let _mocks = upstream_answers(&mut server, 404, json!({"code": "RESOURCE_NOT_FOUND"})).await;
    let gateway = TestGateway::new(json!({"mtn-momo": momo_provider(&server.url(), &server.url())}));
    seed(&gateway, "poll-7").await;

    let (status, body) = gateway.get("/v1/transactions/poll-7/status").await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["message"], "Not Found");
    assert_eq!(stored(&gateway, "poll-7").await.status, TransactionStatus::Pending);
}
