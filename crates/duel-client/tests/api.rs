use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use duel_client::CardApiClient;
use duel_core::{AppError, Card, CardSource, DatasetRecord, HttpConfig};

const DATASET: &str = r#"{
    "data": [
        {
            "id": 46986414,
            "name": "Dark Magician",
            "type": "Normal Monster",
            "frameType": "normal",
            "desc": "The ultimate wizard in terms of attack and defense.",
            "atk": 2500,
            "def": 2100,
            "level": 7,
            "race": "Spellcaster",
            "attribute": "DARK",
            "card_images": [{
                "id": 46986414,
                "image_url": "https://images.example.com/cards/46986414.jpg",
                "image_url_small": "https://images.example.com/cards_small/46986414.jpg",
                "image_url_cropped": "https://images.example.com/cards_cropped/46986414.jpg"
            }]
        },
        {
            "id": "12580477",
            "name": "Raigeki",
            "type": "Spell Card",
            "frameType": "spell",
            "desc": "Destroy all monsters your opponent controls.",
            "race": "Normal"
        },
        {
            "id": "not-a-number",
            "name": "Corrupted Entry"
        },
        {
            "id": 83764718
        }
    ]
}"#;

#[derive(Clone, Default)]
struct Hits {
    flaky: Arc<AtomicUsize>,
    missing: Arc<AtomicUsize>,
}

async fn dataset() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], DATASET)
}

async fn flaky_dataset(State(hits): State<Hits>) -> Response {
    if hits.flaky.fetch_add(1, Ordering::SeqCst) < 2 {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    }
    dataset().await.into_response()
}

async fn missing(State(hits): State<Hits>) -> StatusCode {
    hits.missing.fetch_add(1, Ordering::SeqCst);
    StatusCode::NOT_FOUND
}

async fn png_with_header() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "image/png")], vec![0x89, b'P', b'N', b'G'])
}

async fn bare_bytes() -> Response {
    Response::new(Body::from(vec![1_u8, 2, 3, 4, 5]))
}

async fn slow() -> &'static str {
    tokio::time::sleep(Duration::from_secs(5)).await;
    "late"
}

async fn spawn_upstream() -> (SocketAddr, Hits) {
    let hits = Hits::default();
    let app = Router::new()
        .route("/cardinfo.json", get(dataset))
        .route("/flaky.json", get(flaky_dataset))
        .route("/missing.json", get(missing))
        .route("/images/with-header", get(png_with_header))
        .route("/images/bare.png", get(bare_bytes))
        .route("/images/bare", get(bare_bytes))
        .route("/images/slow.jpg", get(slow))
        .route(
            "/images/broken.jpg",
            get(|| async { StatusCode::INTERNAL_SERVER_ERROR }),
        )
        .with_state(hits.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind listener");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve upstream");
    });
    (addr, hits)
}

fn decoded(records: Vec<DatasetRecord>) -> Vec<Card> {
    records
        .into_iter()
        .filter_map(DatasetRecord::into_card)
        .collect()
}

fn fast_client() -> CardApiClient {
    CardApiClient::with_config(HttpConfig {
        timeout: Duration::from_secs(1),
        max_retries: 3,
        retry_base_delay: Duration::from_millis(10),
    })
    .expect("client")
}

#[tokio::test]
async fn fetch_dataset_parses_cards() {
    let (addr, _) = spawn_upstream().await;
    let records = fast_client()
        .fetch_dataset(&format!("http://{}/cardinfo.json", addr))
        .await
        .expect("dataset");

    assert_eq!(records.len(), 4);
    assert!(matches!(records[2], DatasetRecord::Malformed { .. }));

    let cards = decoded(records);
    assert_eq!(cards.len(), 3);
    assert_eq!(cards[0].name, "Dark Magician");
    assert_eq!(cards[0].level, Some(7));
    assert_eq!(cards[0].card_images.len(), 1);
    assert!(cards[0].card_images[0].image_data.is_none());
    assert_eq!(cards[1].id, 12580477);
    assert_eq!(cards[1].atk, None);
    assert_eq!(cards[2].id, 83764718);
    assert_eq!(cards[2].name, "");
}

#[tokio::test]
async fn fetch_dataset_retries_server_errors() {
    let (addr, hits) = spawn_upstream().await;
    let records = fast_client()
        .fetch_dataset(&format!("http://{}/flaky.json", addr))
        .await
        .expect("dataset after retries");

    assert_eq!(records.len(), 4);
    assert_eq!(hits.flaky.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn fetch_dataset_does_not_retry_client_errors() {
    let (addr, hits) = spawn_upstream().await;
    let err = fast_client()
        .fetch_dataset(&format!("http://{}/missing.json", addr))
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::ClientError(ref msg) if msg.contains("404")));
    assert_eq!(hits.missing.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn fetch_dataset_connection_refused() {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
    let addr = listener.local_addr().expect("addr");
    drop(listener);

    let err = fast_client()
        .fetch_dataset(&format!("http://{}/cardinfo.json", addr))
        .await
        .unwrap_err();
    assert!(err.is_retryable());
}

#[tokio::test]
async fn fetch_image_uses_response_content_type() {
    let (addr, _) = spawn_upstream().await;
    let image = fast_client()
        .fetch_image(&format!("http://{}/images/with-header", addr))
        .await
        .expect("image");

    assert_eq!(image.content_type, "image/png");
    assert_eq!(image.size, 4);
    assert_eq!(image.data, vec![0x89, b'P', b'N', b'G']);
}

#[tokio::test]
async fn fetch_image_infers_content_type_from_extension() {
    let (addr, _) = spawn_upstream().await;
    let client = fast_client();

    let png = client
        .fetch_image(&format!("http://{}/images/bare.png", addr))
        .await
        .expect("png");
    assert_eq!(png.content_type, "image/png");
    assert_eq!(png.size, 5);

    let unknown = client
        .fetch_image(&format!("http://{}/images/bare", addr))
        .await
        .expect("no extension");
    assert_eq!(unknown.content_type, "image/jpeg");
}

#[tokio::test]
async fn fetch_image_non_success_is_error() {
    let (addr, _) = spawn_upstream().await;
    let err = fast_client()
        .fetch_image(&format!("http://{}/images/broken.jpg", addr))
        .await
        .unwrap_err();
    assert!(err.to_string().contains("500"));
}

#[tokio::test]
async fn fetch_image_times_out() {
    let (addr, _) = spawn_upstream().await;
    let err = fast_client()
        .fetch_image(&format!("http://{}/images/slow.jpg", addr))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Timeout(1)));
}
