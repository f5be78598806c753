//! Supabase RPC client against an in-process fake PostgREST.

use std::net::{SocketAddr, TcpListener};
use std::sync::{Arc, Mutex};

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, Request, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceExt;

use vacina_normalizer::config::SupabaseConfig;
use vacina_normalizer::normalize::{Normalizer, RuleStore};
use vacina_normalizer::rpc::{RpcPayload, SupabaseRpc};
use vacina_normalizer::server::{create_server, AppState};
use vacina_normalizer::sources::{DataSource, LocalFileSource};
use vacina_normalizer::ServiceError;

#[derive(Clone, Default)]
struct Fake {
    /// When false every procedure call is rejected.
    rpc_available: bool,
    calls: Arc<Mutex<Vec<(String, Value)>>>,
}

fn annual_total(year: i64) -> i64 {
    if year == 2024 {
        1200
    } else {
        100 * (year - 2019)
    }
}

async fn rpc_handler(
    State(fake): State<Fake>,
    Path(name): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    fake.calls.lock().unwrap().push((name.clone(), body.clone()));

    if headers.get("apikey").is_none() {
        return (StatusCode::UNAUTHORIZED, Json(json!({"message": "no api key"})));
    }
    if !fake.rpc_available {
        return (StatusCode::NOT_FOUND, Json(json!({"message": "function not found"})));
    }

    match name.as_str() {
        // Only the underscored signature exists for the sum procedure
        "obter_soma_por_ano" => match body.get("_ano").and_then(Value::as_i64) {
            Some(year) => (StatusCode::OK, Json(json!([{ "soma": annual_total(year) }]))),
            None => (StatusCode::NOT_FOUND, Json(json!({"message": "no plain signature"}))),
        },
        "obter_comparacao_dados" => {
            if body.get("insumo_nome") == Some(&json!("NADA")) {
                return (
                    StatusCode::OK,
                    Json(json!([{"ano": 2025, "quantidade": 0, "tipo_dado": "previsao"}])),
                );
            }
            (
                StatusCode::OK,
                Json(json!([
                    {"ano": 2023, "quantidade": "1.000,0", "tipo_dado": "historico"},
                    {"ano": 2025, "quantidade": 110, "tipo_dado": "previsao"}
                ])),
            )
        }
        _ => (StatusCode::NOT_FOUND, Json(json!({"message": "unknown"}))),
    }
}

async fn table_handler() -> impl IntoResponse {
    Json(json!([{"QTDE": 5}, {"QTDE": "7"}, {"QTDE": null}]))
}

fn spawn_fake(fake: Fake) -> SocketAddr {
    let app = Router::new()
        .route("/rest/v1/rpc/:name", post(rpc_handler))
        .route("/rest/v1/distribuicao", get(table_handler))
        .with_state(fake);

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    listener.set_nonblocking(true).unwrap();
    let addr = listener.local_addr().unwrap();
    let server = hyper::Server::from_tcp(listener)
        .unwrap()
        .serve(app.into_make_service());
    tokio::spawn(server);
    addr
}

fn client(addr: SocketAddr) -> SupabaseRpc {
    let config = SupabaseConfig {
        url: format!("http://{addr}/"),
        service_role_key: "service-key".to_string(),
    };
    SupabaseRpc::new(&config, "distribuicao").unwrap()
}

#[tokio::test]
async fn test_call_retries_with_underscored_payload() {
    let fake = Fake {
        rpc_available: true,
        ..Default::default()
    };
    let rpc = client(spawn_fake(fake.clone()));

    let payload = RpcPayload::new().with("ano", Some(2024));
    let (total, raw) = rpc.soma_por_ano(&payload).await.unwrap();
    assert_eq!(total, Some(1200.0));
    assert_eq!(raw, json!([{"soma": 1200}]));

    let calls = fake.calls.lock().unwrap();
    let bodies: Vec<&Value> = calls.iter().map(|(_, body)| body).collect();
    assert_eq!(bodies, vec![&json!({"ano": 2024}), &json!({"_ano": 2024})]);
}

#[tokio::test]
async fn test_projection_and_median() {
    let fake = Fake {
        rpc_available: true,
        ..Default::default()
    };
    let rpc = client(spawn_fake(fake));

    let payload = RpcPayload::new().with_nullable("insumo_nome", Some("BCG"));
    let (projection, _) = rpc.projecao_ano(&payload, 2025).await.unwrap();
    assert_eq!(projection, Some(110.0));

    let (median, raw) = rpc
        .median_projection_totals(&RpcPayload::new(), 2020..=2024)
        .await;
    // 100, 200, 300, 400, 1200
    assert_eq!(median, Some(300.0));
    assert_eq!(raw.as_array().map(Vec::len), Some(5));
}

#[tokio::test]
async fn test_sum_falls_back_to_table_endpoint() {
    let rpc = client(spawn_fake(Fake::default()));
    let payload = RpcPayload::new().with("ano", Some(2024));
    let (total, raw) = rpc.soma_por_ano(&payload).await.unwrap();
    assert_eq!(total, Some(12.0));
    assert_eq!(raw.as_array().map(Vec::len), Some(3));
}

#[tokio::test]
async fn test_failed_call_reports_status_and_body() {
    let rpc = client(spawn_fake(Fake::default()));
    let err = rpc
        .call("obter_comparacao_dados", &RpcPayload::new().with("uf", Some("PR")))
        .await
        .unwrap_err();
    match err {
        ServiceError::Rpc { status, details, .. } => {
            assert_eq!(status, 404);
            assert_eq!(details["message"], "function not found");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_unreachable_host_is_bad_gateway() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = client(addr)
        .call("obter_comparacao_dados", &RpcPayload::new())
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Rpc { status: 502, .. }));
}

fn api(addr: SocketAddr) -> Router {
    let rules = r#"[{"pattern": "BCG", "vacina_normalizada": "BCG", "priority": 10}]"#;
    let normalizer = Arc::new(Normalizer::new(RuleStore::from_json_str(rules).unwrap()));
    let data = Arc::new(DataSource::new(
        "distribuicao",
        Arc::new(LocalFileSource::new(Vec::new())),
    ));
    let state = AppState::new(normalizer, data).with_rpc(Arc::new(client(addr)));
    create_server(state, Vec::new())
}

async fn get_json(app: Router, uri: &str) -> (StatusCode, Value) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

#[tokio::test]
async fn test_previsao_endpoint() {
    let fake = Fake {
        rpc_available: true,
        ..Default::default()
    };
    let app = api(spawn_fake(fake));

    let (status, body) = get_json(app.clone(), "/api/previsao?insumo_nome=BCG&uf=PR").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(2));

    let (status, body) = get_json(app.clone(), "/api/previsao?insumo_nome=NADA&debug=true").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.get("rpc_raw").is_some());

    let (status, body) = get_json(app, "/api/previsao?insumo_nome=BCG&mes=x").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["erro"].is_string());
}

#[tokio::test]
async fn test_previsao_rpc_failure_is_bad_gateway() {
    let app = api(spawn_fake(Fake::default()));
    let (status, body) = get_json(app, "/api/previsao?insumo_nome=BCG").await;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["details"]["status"], 404);
}

#[tokio::test]
async fn test_comparacao_for_one_product() {
    let fake = Fake {
        rpc_available: true,
        ..Default::default()
    };
    let app = api(spawn_fake(fake.clone()));

    let (status, body) = get_json(app, "/api/previsao/comparacao?ano=2024&insumo_nome=vacina%20bcg").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({
            "insumo": "vacina bcg",
            "projecao_unidade": "mensal",
            "dados_comparacao": [
                {"ano": 2024, "quantidade": 1200.0, "tipo": "historico"},
                {"ano": 2025, "quantidade": 110.0, "tipo": "projeção"}
            ],
            "rpc_raw_soma": null,
            "rpc_raw_previsao": null
        })
    );

    // the sum procedure gets the raw name plainly and the rule pattern underscored
    let calls = fake.calls.lock().unwrap();
    let soma: Vec<&Value> = calls
        .iter()
        .filter(|(name, _)| name == "obter_soma_por_ano")
        .map(|(_, body)| body)
        .collect();
    assert_eq!(soma[0]["insumo_nome"], "vacina bcg");
    assert_eq!(soma[1]["_insumo_nome"], "BCG");
}

#[tokio::test]
async fn test_comparacao_totals_use_median_projection() {
    let fake = Fake {
        rpc_available: true,
        ..Default::default()
    };
    let app = api(spawn_fake(fake));

    let (status, body) = get_json(app, "/api/previsao/comparacao?ano=2024&debug=1").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["insumo"], "Total");
    assert_eq!(body["dados_comparacao"][0]["quantidade"], 1200.0);
    assert_eq!(body["dados_comparacao"][1]["quantidade"], 300.0);
    assert_eq!(body["projecao_unidade"], "mensal");
    assert!(body["rpc_raw_soma"].is_array());
}
