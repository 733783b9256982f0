use assert_matches::assert_matches;
use compras_api::store::{
    collections, list_all, ListQuery, PocketBaseClient, PocketBaseConfig, RecordStore, StoreError,
};
use serde_json::json;
use std::time::Duration;
use wiremock::{
    matchers::{body_json, header, method, path, query_param},
    Mock, MockServer, ResponseTemplate,
};

fn client(server: &MockServer) -> PocketBaseClient {
    PocketBaseClient::new(
        PocketBaseConfig::new(server.uri())
            .with_token("svc-token")
            .with_timeout(Duration::from_secs(5)),
    )
    .unwrap()
}

#[tokio::test]
async fn list_forwards_query_parameters_and_service_token() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/collections/compras/records"))
        .and(header("authorization", "svc-token"))
        .and(query_param("page", "2"))
        .and(query_param("perPage", "50"))
        .and(query_param("filter", "estado = 'Asignado'"))
        .and(query_param("sort", "-numero_ordinal"))
        .and(query_param("expand", "comprador"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "page": 2, "perPage": 50, "totalItems": 51, "totalPages": 2,
            "items": [{ "id": "c51" }]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let query = ListQuery::new()
        .page(2, 50)
        .filter("estado = 'Asignado'")
        .sort("-numero_ordinal")
        .expand("comprador");
    let page = client(&server)
        .list(collections::COMPRAS, &query)
        .await
        .unwrap();

    assert_eq!(page.total_items, 51);
    assert_eq!(page.items[0]["id"], "c51");
}

#[tokio::test]
async fn list_all_walks_every_page() {
    let server = MockServer::start().await;
    for (page, id) in [(1, "a"), (2, "b")] {
        Mock::given(method("GET"))
            .and(path("/api/collections/subvenciones/records"))
            .and(query_param("page", page.to_string()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page": page, "perPage": 200, "totalItems": 2, "totalPages": 2,
                "items": [{ "id": id }]
            })))
            .mount(&server)
            .await;
    }

    let store = client(&server);
    let items = list_all(&store, collections::SUBVENCIONES, &ListQuery::new())
        .await
        .unwrap();
    let ids: Vec<_> = items.iter().map(|v| v["id"].as_str().unwrap()).collect();
    assert_eq!(ids, vec!["a", "b"]);
}

#[tokio::test]
async fn duplicate_folio_maps_to_unique_violation() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/collections/recepciones/records"))
        .and(body_json(json!({ "folio": "REC-LU26-004" })))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "code": 400,
            "message": "Failed to create record.",
            "data": { "folio": { "code": "validation_not_unique", "message": "Value must be unique." } }
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .create(collections::RECEPCIONES, json!({ "folio": "REC-LU26-004" }))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        StoreError::UniqueViolation {
            field: "folio".into()
        }
    );
}

#[tokio::test]
async fn missing_record_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/collections/compras/records/nope"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({
            "code": 404, "message": "The requested resource wasn't found.", "data": {}
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .get_one(collections::COMPRAS, "nope", None)
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::NotFound(what) if what == "compras/nope");
}

#[tokio::test]
async fn path_like_ids_never_reach_the_backend() {
    let server = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "id": "x" })))
        .expect(0)
        .mount(&server)
        .await;

    let store = client(&server);
    let id = "../../users/records/x";
    let err = store.get_one(collections::COMPRAS, id, None).await.unwrap_err();
    assert_matches!(err, StoreError::NotFound(what) if what == "compras/../../users/records/x");
    let err = store
        .update(collections::COMPRAS, id, json!({ "estado": "Anulado" }))
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::NotFound(_));
    let err = store.delete(collections::COMPRAS, "..").await.unwrap_err();
    assert_matches!(err, StoreError::NotFound(_));
}

#[tokio::test]
async fn update_and_delete_hit_the_record_url() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/api/collections/compras/records/c1"))
        .and(body_json(json!({ "estado": "Comprado" })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "id": "c1", "estado": "Comprado" })),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/api/collections/ordenes_compra/records/oc1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let store = client(&server);
    let updated = store
        .update(collections::COMPRAS, "c1", json!({ "estado": "Comprado" }))
        .await
        .unwrap();
    assert_eq!(updated["estado"], "Comprado");
    store
        .delete(collections::ORDENES_COMPRA, "oc1")
        .await
        .unwrap();
}

#[tokio::test]
async fn authenticate_returns_the_user_record() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/collections/users/auth-refresh"))
        .and(header("authorization", "user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token": "user-token-2",
            "record": { "id": "u1", "email": "ana@example.cl", "role": "comprador" }
        })))
        .mount(&server)
        .await;

    let record = client(&server).authenticate("user-token").await.unwrap();
    assert_eq!(record["role"], "comprador");
}

#[tokio::test]
async fn expired_token_is_unauthorized() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/collections/users/auth-refresh"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "code": 401, "message": "The request requires valid record authorization token.", "data": {}
        })))
        .mount(&server)
        .await;

    let err = client(&server).authenticate("expired").await.unwrap_err();
    assert_matches!(err, StoreError::Unauthorized(_));
}

#[tokio::test]
async fn unreachable_backend_is_a_transport_error() {
    let store = PocketBaseClient::new(
        PocketBaseConfig::new("http://127.0.0.1:9").with_timeout(Duration::from_millis(500)),
    )
    .unwrap();
    let err = store
        .list(collections::COMPRAS, &ListQuery::new())
        .await
        .unwrap_err();
    assert_matches!(err, StoreError::Transport(_));
}
