//! Endpoint tests against stub drivers.
//!
//! The driver subprocess is replaced by small shell stubs: one that
//! fails with diagnostic output, one that honors the result-path
//! contract and writes a fixed PNG, one that hangs until killed.

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use http_body_util::BodyExt;
use tempfile::TempDir;
use tower::util::ServiceExt;
use vton_api::config::ApiConfig;
use vton_api::routes::router;
use vton_api::state::AppState;

const BOUNDARY: &str = "vton-test-boundary";

fn test_config(tmp: &TempDir, stub_script: &str) -> ApiConfig {
    let mut config = ApiConfig::default();
    config.staging.dataroot = tmp.path().join("data");
    config.staging.result_root = tmp.path().join("runs");
    config.driver.board_dir = tmp.path().join("board");
    config.driver.program = "/bin/sh".to_string();
    config.driver.base_args = vec![
        "-c".to_string(),
        stub_script.to_string(),
        "driver-stub".to_string(),
    ];
    config
}

/// Stub that locates its `--result-dir`/`--data-list` flags, resolves
/// the sample stem from the manifest and copies the fixture into the
/// contract path.
fn success_stub(fixture: &std::path::Path) -> String {
    format!(
        r#"out=""; list=""
while [ "$#" -gt 0 ]; do
  case "$1" in
    --result-dir) out="$2"; shift ;;
    --data-list) list="$2"; shift ;;
  esac
  shift
done
read person cloth < "$list" || exit 3
stem="${{person%.*}}"
dir="$out/tom_final/test/try-on"
mkdir -p "$dir" || exit 4
cp "{fixture}" "$dir/$stem.png" || exit 5
"#,
        fixture = fixture.display()
    )
}

fn multipart_body(fields: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, bytes) in fields {
        body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
        body.extend_from_slice(
            format!(
                "Content-Disposition: form-data; name=\"{name}\"; filename=\"{name}.jpg\"\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(b"Content-Type: image/jpeg\r\n\r\n");
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

fn tryon_request(uri: &str, fields: &[(&str, &[u8])]) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={BOUNDARY}"),
        )
        .body(Body::from(multipart_body(fields)))
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).into_owned()
}

#[tokio::test]
async fn health_is_ok() {
    let tmp = TempDir::new().unwrap();
    let app = router(AppState::new(test_config(&tmp, "exit 0")));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn missing_filename_params_give_400() {
    let tmp = TempDir::new().unwrap();
    let app = router(AppState::new(test_config(&tmp, "exit 0")));

    let request = tryon_request(
        "/api/tryon",
        &[("person_image", b"x".as_slice())],
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("Missing filename"));
}

#[tokio::test]
async fn missing_upload_field_gives_400() {
    let tmp = TempDir::new().unwrap();
    let app = router(AppState::new(test_config(&tmp, "exit 0")));

    // Only the person image is supplied.
    let request = tryon_request(
        "/api/tryon?filename=out&filename2=garment",
        &[("person_image", b"fake-jpeg-bytes".as_slice())],
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("Missing image files"));
}

#[tokio::test]
async fn failing_driver_surfaces_stderr_as_500() {
    let tmp = TempDir::new().unwrap();
    let app = router(AppState::new(test_config(
        &tmp,
        "echo model exploded: boom >&2; exit 1",
    )));

    let request = tryon_request(
        "/api/tryon?filename=out&filename2=garment",
        &[
            ("person_image", b"fake-jpeg-bytes".as_slice()),
            ("clothes_image", b"fake-jpeg-bytes".as_slice()),
        ],
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = body_string(response).await;
    assert!(body.contains("boom"), "stderr should be in {body}");
}

#[tokio::test]
async fn hanging_driver_times_out_as_500() {
    let tmp = TempDir::new().unwrap();
    let mut config = test_config(&tmp, "sleep 30");
    config.jobs.timeout_secs = 1;
    let app = router(AppState::new(config));

    let request = tryon_request(
        "/api/tryon?filename=out&filename2=garment",
        &[
            ("person_image", b"fake-jpeg-bytes".as_slice()),
            ("clothes_image", b"fake-jpeg-bytes".as_slice()),
        ],
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body_string(response).await.contains("timed out"));
}

#[tokio::test]
async fn end_to_end_returns_the_driver_output() {
    let tmp = TempDir::new().unwrap();

    // Fixture PNG the stub "renders".
    let fixture = tmp.path().join("fixture.png");
    image::RgbImage::new(1, 1).save(&fixture).unwrap();
    let fixture_bytes = std::fs::read(&fixture).unwrap();

    let app = router(AppState::new(test_config(&tmp, &success_stub(&fixture))));

    let request = tryon_request(
        "/api/tryon?filename=myresult&filename2=garment",
        &[
            ("person_image", b"fake-jpeg-bytes".as_slice()),
            ("clothes_image", b"fake-jpeg-bytes".as_slice()),
        ],
    );
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok()),
        Some("image/png")
    );

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(bytes.as_ref(), fixture_bytes.as_slice());

    // The session staged its inputs and manifest under the dataroot.
    let image_dir = tmp.path().join("data/test/image");
    assert_eq!(std::fs::read_dir(&image_dir).unwrap().count(), 1);
    let pairs_dir = tmp.path().join("data/pairs");
    assert_eq!(std::fs::read_dir(&pairs_dir).unwrap().count(), 1);
}
