//! Specs for the three-step remote PDF conversion protocol, driven against a
//! local stand-in for the conversion service.

use std::sync::{Arc, Mutex};

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    routing::{post, put},
};
use serde_json::{Value, json};

use melete_app::extract::pdf_remote::{PdfRemoteError, RemotePdfExtractor};

#[derive(Clone, Default)]
struct ServiceState {
    uploaded: Arc<Mutex<Vec<u8>>>,
    convert_urls: Arc<Mutex<Vec<String>>>,
    fail_convert: bool,
}

async fn spawn_service(fail_convert: bool) -> (String, ServiceState) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind ephemeral port");
    let addr = listener.local_addr().expect("local addr");
    let base = format!("http://{addr}");

    let state = ServiceState {
        fail_convert,
        ..ServiceState::default()
    };

    let presign_base = base.clone();
    let app = Router::new()
        .route(
            "/presign",
            post(move |Json(body): Json<Value>| {
                let base = presign_base.clone();
                async move {
                    assert!(body["name"].is_string(), "presign carries the file name");
                    Json(json!({
                        "uploadUrl": format!("{base}/upload/slot-1"),
                        "fileUrl": format!("{base}/files/slot-1"),
                    }))
                }
            }),
        )
        .route(
            "/upload/slot-1",
            put(
                |State(state): State<ServiceState>, body: axum::body::Bytes| async move {
                    *state.uploaded.lock().expect("upload lock poisoned") = body.to_vec();
                    StatusCode::OK
                },
            ),
        )
        .route(
            "/convert",
            post(
                |State(state): State<ServiceState>, Json(body): Json<Value>| async move {
                    state
                        .convert_urls
                        .lock()
                        .expect("convert lock poisoned")
                        .push(body["url"].as_str().unwrap_or_default().to_string());
                    if state.fail_convert {
                        return (
                            StatusCode::INTERNAL_SERVER_ERROR,
                            Json(json!({ "error": "conversion backend down" })),
                        );
                    }
                    (
                        StatusCode::OK,
                        Json(json!({ "text": "Extracted page text.", "pageCount": 3 })),
                    )
                },
            ),
        )
        .with_state(state.clone());

    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve pdf stub");
    });

    (base, state)
}

#[tokio::test]
async fn the_three_step_protocol_round_trips_text_and_page_count() {
    let (base, state) = spawn_service(false).await;
    let extractor = RemotePdfExtractor::new(&base);

    let result = extractor
        .extract(b"%PDF-1.7 pretend bytes", "report.pdf")
        .await
        .expect("remote conversion succeeds");

    assert_eq!(result.text, "Extracted page text.");
    assert_eq!(result.page_count, Some(3));
    assert_eq!(
        *state.uploaded.lock().expect("upload lock poisoned"),
        b"%PDF-1.7 pretend bytes".to_vec(),
        "raw bytes must be PUT to the presigned slot"
    );
    assert_eq!(
        *state.convert_urls.lock().expect("convert lock poisoned"),
        vec![format!("{base}/files/slot-1")],
        "conversion must reference the uploaded object URL"
    );
}

#[tokio::test]
async fn a_failing_conversion_step_reports_its_step_and_status() {
    let (base, _state) = spawn_service(true).await;
    let extractor = RemotePdfExtractor::new(&base);

    let err = extractor
        .extract(b"%PDF-1.7 pretend bytes", "report.pdf")
        .await
        .expect_err("failing convert step must surface");

    match err {
        PdfRemoteError::Status { step, status } => {
            assert_eq!(step, "convert");
            assert_eq!(status, 500);
        }
        other => panic!("expected a status error, got {other:?}"),
    }
}

#[tokio::test]
async fn an_unreachable_service_fails_at_the_presign_step() {
    let extractor = RemotePdfExtractor::new("http://127.0.0.1:1");

    let err = extractor
        .extract(b"%PDF", "report.pdf")
        .await
        .expect_err("unreachable service must fail");

    match err {
        PdfRemoteError::Http { step, .. } => assert_eq!(step, "presign"),
        other => panic!("expected an http error, got {other:?}"),
    }
}
