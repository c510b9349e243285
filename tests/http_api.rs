use std::io::Read;
use std::time::Duration;

use actix_web::{App, http::StatusCode, test, web};
use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use serde_json::{Value, json};

use hkl_window::app_state::AppState;
use hkl_window::config::AppConfig;
use hkl_window::routes;

/// 4 x 3 x 2 的网格，signal 等于扁平索引，最后一个 cell 缺失
fn load_body() -> Value {
    let mut signal: Vec<Value> = (0..24).map(|i| json!(i as f64)).collect();
    signal[23] = Value::Null;
    json!({
        "signal": signal,
        "error_sq": vec![1.0; 24],
        "h": { "min": 0.0, "max": 3.0, "count": 4 },
        "k": { "min": -1.0, "max": 1.0, "count": 3 },
        "l": { "min": 0.0, "max": 1.0, "count": 2 },
    })
}

macro_rules! app {
    () => {
        test::init_service(
            App::new()
                .app_data(web::Data::new(AppState::new(&AppConfig::default())))
                .configure(routes::configure),
        )
        .await
    };
}

macro_rules! load {
    ($app:expr) => {{
        let req = test::TestRequest::post()
            .uri("/datasets")
            .set_json(load_body())
            .to_request();
        let state: Value = test::call_and_read_body_json(&$app, req).await;
        state["dataset_id"].as_str().unwrap().to_string()
    }};
}

#[actix_web::test]
async fn load_describes_dataset() {
    let app = app!();
    let req = test::TestRequest::post()
        .uri("/datasets")
        .set_json(load_body())
        .to_request();
    let state: Value = test::call_and_read_body_json(&app, req).await;

    assert_eq!(state["shape"], json!([4, 3, 2]));
    assert_eq!(state["total_cells"], 24);
    assert_eq!(state["masked_cells"], 1);
    assert_eq!(state["signal_range"], json!([0.0, 22.0]));
    assert_eq!(state["axes"]["h"]["count"], 4);
    assert_eq!(state["raw_axes"]["k"]["min"], -1.0);
}

#[actix_web::test]
async fn load_rejects_wrong_length() {
    let app = app!();
    let mut body = load_body();
    body["error_sq"] = json!(vec![1.0; 3]);
    let req = test::TestRequest::post()
        .uri("/datasets")
        .set_json(body)
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn unknown_dataset_is_not_found() {
    let app = app!();
    for req in [
        test::TestRequest::get().uri("/datasets/missing").to_request(),
        test::TestRequest::get()
            .uri("/datasets/missing/operations")
            .to_request(),
        test::TestRequest::post()
            .uri("/datasets/missing/rebin")
            .set_json(json!({ "counts": [2, 2, 2] }))
            .to_request(),
        test::TestRequest::delete().uri("/datasets/missing").to_request(),
    ] {
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }
}

#[actix_web::test]
async fn crop_then_reset_axis() {
    let app = app!();
    let dataset_id = load!(app);

    let req = test::TestRequest::post()
        .uri(&format!("/datasets/{dataset_id}/crop"))
        .set_json(json!({ "h": [0.5, 2.5] }))
        .to_request();
    let state: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(state["shape"], json!([2, 3, 2]));
    assert_eq!(state["axes"]["h"]["min"], 1.0);
    assert_eq!(state["axes"]["h"]["max"], 2.0);

    let req = test::TestRequest::post()
        .uri(&format!("/datasets/{dataset_id}/reset"))
        .set_json(json!({ "scope": "h" }))
        .to_request();
    let state: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(state["shape"], json!([4, 3, 2]));

    let req = test::TestRequest::get()
        .uri(&format!("/datasets/{dataset_id}/operations"))
        .to_request();
    let log: Value = test::call_and_read_body_json(&app, req).await;
    let operations: Vec<&str> = log["records"]
        .as_array()
        .unwrap()
        .iter()
        .map(|record| record["operation"].as_str().unwrap())
        .collect();
    assert_eq!(operations, ["crop", "reset_axis"]);
}

#[actix_web::test]
async fn failed_command_is_bad_request_and_logged() {
    let app = app!();
    let dataset_id = load!(app);

    let req = test::TestRequest::post()
        .uri(&format!("/datasets/{dataset_id}/crop"))
        .set_json(json!({ "h": [10.0, 12.0] }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

    let req = test::TestRequest::get()
        .uri(&format!("/datasets/{dataset_id}/operations"))
        .to_request();
    let log: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(log["records"][0]["succeeded"], false);
}

#[actix_web::test]
async fn rejected_edit_returns_current_axes() {
    let app = app!();
    let dataset_id = load!(app);

    let req = test::TestRequest::post()
        .uri(&format!("/datasets/{dataset_id}/edit"))
        .set_json(json!({ "axis": "h", "field": "bins", "text": "6" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["outcome"]["status"], "rejected");
    assert_eq!(body["outcome"]["axes"]["h"]["count"], 4);
    assert_eq!(body["state"]["shape"], json!([4, 3, 2]));

    let req = test::TestRequest::post()
        .uri(&format!("/datasets/{dataset_id}/edit"))
        .set_json(json!({ "axis": "h", "field": "max", "text": "2" }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["outcome"]["status"], "applied");
    assert_eq!(body["state"]["shape"], json!([3, 3, 2]));
}

#[actix_web::test]
async fn punch_reports_counts() {
    let app = app!();
    let dataset_id = load!(app);

    let req = test::TestRequest::post()
        .uri(&format!("/datasets/{dataset_id}/punch"))
        .set_json(json!({ "radii": [0.0, 0.0, 0.0] }))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    // H 0..3，K -1..1，L 0..1 上的全部整数格点
    assert_eq!(body["report"]["lattice_points"], 24);
    assert_eq!(body["report"]["punched"], 23);
    assert_eq!(body["state"]["masked_cells"], 24);
    assert_eq!(body["state"]["signal_range"], Value::Null);

    let req = test::TestRequest::post()
        .uri(&format!("/datasets/{dataset_id}/reset"))
        .set_json(json!({ "scope": "punch" }))
        .to_request();
    let state: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(state["masked_cells"], 1);
}

#[actix_web::test]
async fn slice_is_little_endian_plane() {
    let app = app!();
    let dataset_id = load!(app);

    let req = test::TestRequest::get()
        .uri(&format!("/datasets/{dataset_id}/slice?axis=l&value=1.0"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("X-Slice-Index").unwrap(), "1");
    assert_eq!(resp.headers().get("X-Slice-Shape").unwrap(), "4,3");

    let body = test::read_body(resp).await;
    let mut reader = body.as_ref();
    let mut values = Vec::new();
    while let Ok(value) = reader.read_f64::<LittleEndian>() {
        values.push(value);
    }
    assert_eq!(values.len(), 12);
    assert_eq!(values[0], 12.0);
    assert_eq!(values[10], 22.0);
    assert!(values[11].is_nan());
}

#[actix_web::test]
async fn rebin_options_lists_divisors() {
    let app = app!();
    let dataset_id = load!(app);

    let req = test::TestRequest::get()
        .uri(&format!("/datasets/{dataset_id}/rebin-options?axis=h"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["options"], json!([{ "step": 3.0, "count": 2 }]));
}

#[actix_web::test]
async fn export_chunks_are_served_once() {
    let app = app!();
    let dataset_id = load!(app);

    let req = test::TestRequest::post()
        .uri(&format!("/datasets/{dataset_id}/export"))
        .set_json(json!({ "quantity": "signal", "chunk_size": 10 }))
        .to_request();
    let export: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(export["data_length"], 24);
    assert_eq!(export["chunks"].as_array().unwrap().len(), 3);
    let task_id = export["task_id"].as_str().unwrap().to_string();

    let uri = format!("/export/chunk?task_id={task_id}&chunk_index=2&gzip=true");
    let mut resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    for _ in 0..50 {
        if resp.status() != StatusCode::ACCEPTED {
            break;
        }
        actix_web::rt::time::sleep(Duration::from_millis(10)).await;
        resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    }
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers().get("Content-Encoding").unwrap(), "gzip");
    assert_eq!(resp.headers().get("X-Chunk-Start").unwrap(), "20");

    let compressed = test::read_body(resp).await;
    let mut bytes = Vec::new();
    GzDecoder::new(compressed.as_ref())
        .read_to_end(&mut bytes)
        .unwrap();
    let mut reader = bytes.as_slice();
    let mut values = Vec::new();
    while let Ok(value) = reader.read_f64::<LittleEndian>() {
        values.push(value);
    }
    assert_eq!(&values[..3], &[20.0, 21.0, 22.0]);
    assert!(values[3].is_nan());

    let resp = test::call_service(&app, test::TestRequest::get().uri(&uri).to_request()).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn close_drops_exports() {
    let app = app!();
    let dataset_id = load!(app);

    let req = test::TestRequest::post()
        .uri(&format!("/datasets/{dataset_id}/export"))
        .set_json(json!({ "quantity": "error_sq" }))
        .to_request();
    let export: Value = test::call_and_read_body_json(&app, req).await;
    let task_id = export["task_id"].as_str().unwrap().to_string();

    let req = test::TestRequest::delete()
        .uri(&format!("/datasets/{dataset_id}"))
        .to_request();
    let body: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body["closed"], true);
    assert_eq!(body["exports_dropped"], 1);

    let req = test::TestRequest::get()
        .uri(&format!("/export/chunk?task_id={task_id}&chunk_index=0"))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn rebin_cannot_add_bins() {
    let app = app!();
    let dataset_id = load!(app);

    for counts in [json!([5, 3, 2]), json!([2, 3, 0]), json!([usize::MAX / 4, 3, 2])] {
        let req = test::TestRequest::post()
            .uri(&format!("/datasets/{dataset_id}/rebin"))
            .set_json(json!({ "counts": counts }))
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{counts}");
    }

    let req = test::TestRequest::get()
        .uri(&format!("/datasets/{dataset_id}"))
        .to_request();
    let state: Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(state["shape"], json!([4, 3, 2]));
}
