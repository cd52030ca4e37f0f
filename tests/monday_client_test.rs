use assert_matches::assert_matches;
use serde_json::json;
use textbook_orders::{
    board::{BoardClient, BoardError, MondayClient},
    config::BoardConfig,
};
use wiremock::{
    matchers::{body_partial_json, body_string_contains, header, method, path},
    Mock, MockServer, ResponseTemplate,
};

async fn client_for(server: &MockServer) -> MondayClient {
    let config = BoardConfig {
        enabled: true,
        api_url: format!("{}/v2", server.uri()),
        api_token: "test-token".to_string(),
        api_version: "2024-10".to_string(),
        request_timeout_secs: 5,
        ..Default::default()
    };
    MondayClient::new(&config).expect("client")
}

fn ok(body: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(body)
}

#[tokio::test]
async fn create_item_sends_authenticated_graphql() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v2"))
        .and(header("authorization", "Bearer test-token"))
        .and(header("API-Version", "2024-10"))
        .and(body_string_contains("create_item"))
        .and(body_partial_json(json!({
            "variables": {
                "boardId": "42",
                "groupId": "topics",
                "itemName": "Ana - 3 - ABCD-1",
                "columnValues": "{\"text_student\":\"Ana\"}"
            }
        })))
        .respond_with(ok(json!({ "data": { "create_item": { "id": "9001" } } })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let id = client
        .create_item("42", Some("topics"), "Ana - 3 - ABCD-1", &json!({ "text_student": "Ana" }))
        .await
        .unwrap();
    assert_eq!(id, "9001");
}

#[tokio::test]
async fn subitems_without_columns_send_null() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_partial_json(json!({
            "variables": { "parentItemId": "9001", "itemName": "Matemáticas 3", "columnValues": null }
        })))
        .respond_with(ok(json!({ "data": { "create_subitem": { "id": "9002" } } })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let id = client
        .create_subitem("9001", "Matemáticas 3", None)
        .await
        .unwrap();
    assert_eq!(id, "9002");
}

#[tokio::test]
async fn graphql_errors_become_board_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("create_update"))
        .respond_with(ok(json!({
            "errors": [{ "message": "Item not found" }, { "message": "try again" }]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("change_column_value"))
        .respond_with(ok(json!({
            "error_code": "ColumnValueException",
            "error_message": "invalid value"
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.create_update("1", "hola").await.unwrap_err();
    assert_matches!(err, BoardError::GraphQl(message) if message == "Item not found; try again");

    let err = client
        .change_column_value("42", "1", "status", &json!({ "label": "Importado" }))
        .await
        .unwrap_err();
    assert_matches!(err, BoardError::GraphQl(message) if message == "invalid value");
}

#[tokio::test]
async fn http_failures_keep_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client.create_update("1", "hola").await.unwrap_err();
    assert_matches!(
        err,
        BoardError::Status { status: 500, body } if body == "upstream exploded"
    );
}

#[tokio::test]
async fn missing_ids_are_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!({ "data": { "create_item": null } })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let err = client
        .create_item("42", None, "Ana", &json!({}))
        .await
        .unwrap_err();
    assert_matches!(err, BoardError::MissingId("create_item"));
}

#[tokio::test]
async fn column_search_follows_the_cursor() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("items_page_by_column_values"))
        .and(body_partial_json(json!({
            "variables": { "boardId": "42", "columnId": "status_import", "value": "Listo para importar" }
        })))
        .respond_with(ok(json!({
            "data": {
                "items_page_by_column_values": {
                    "cursor": "page-2",
                    "items": [{
                        "id": "1",
                        "name": "Juan",
                        "column_values": [{ "id": "text_student", "text": "Juan Perez", "value": "\"Juan Perez\"" }],
                        "subitems": [{
                            "id": "11",
                            "name": "Matemáticas 3",
                            "column_values": [{ "id": "text_code", "text": "MAT3", "value": null }]
                        }]
                    }]
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(body_string_contains("next_items_page"))
        .and(body_partial_json(json!({ "variables": { "cursor": "page-2" } })))
        .respond_with(ok(json!({
            "data": {
                "next_items_page": {
                    "cursor": null,
                    "items": [{ "id": "2", "name": "Rosa", "column_values": [], "subitems": null }]
                }
            }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let items = client
        .find_items_by_column("42", "status_import", "Listo para importar")
        .await
        .unwrap();

    assert_eq!(items.len(), 2);
    assert_eq!(items[0].column_text("text_student"), Some("Juan Perez"));
    assert_eq!(items[0].subitems[0].column_text("text_code"), Some("MAT3"));
    assert!(items[1].subitems.is_empty());
}

#[tokio::test]
async fn updates_are_flattened_per_item() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(body_string_contains("updates"))
        .respond_with(ok(json!({
            "data": {
                "items": [
                    {
                        "id": "1",
                        "updates": [
                            {
                                "id": "u1",
                                "body": "<p>Pedido recibido</p>",
                                "text_body": "Pedido recibido",
                                "created_at": "2026-08-01T10:00:00Z",
                                "creator": { "name": "Secretaría" }
                            }
                        ]
                    },
                    {
                        "id": "2",
                        "updates": [
                            { "id": "u2", "body": "hola", "text_body": null, "created_at": null, "creator": null }
                        ]
                    }
                ]
            }
        })))
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    let updates = client
        .updates(&["1".to_string(), "2".to_string()])
        .await
        .unwrap();

    assert_eq!(updates.len(), 2);
    assert_eq!(updates[0].item_id, "1");
    assert_eq!(updates[0].creator_name.as_deref(), Some("Secretaría"));
    assert_eq!(updates[1].item_id, "2");
    assert_eq!(updates[1].creator_name, None);
}

#[tokio::test]
async fn empty_id_lists_skip_the_network() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ok(json!({ "data": { "items": [] } })))
        .expect(0)
        .mount(&server)
        .await;

    let client = client_for(&server).await;
    assert!(client.items(&[]).await.unwrap().is_empty());
    assert!(client.updates(&[]).await.unwrap().is_empty());
}
