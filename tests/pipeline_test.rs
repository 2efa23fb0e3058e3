//! ラベリングパイプライン統合テスト
//!
//! モックAPIサーバを立ててスキャン→並列ラベリング→マージ→CSV追記→
//! レジュームの一連の流れを検証する（実API・ネットワーク不要）

use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::post;
use axum::Router;
use lexicon::config::Config;
use lexicon::labeler;
use lexicon::store;
use serde_json::json;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tempfile::tempdir;

/// 固定レスポンスを返すモックのチャット補完API
///
/// fail_markerを含むリクエスト（特定画像のbase64）には500を返す
async fn spawn_mock_api(content: &'static str, fail_marker: Option<&'static str>) -> String {
    let app = Router::new().route(
        "/chat/completions",
        post(move |body: String| async move {
            if let Some(marker) = fail_marker {
                if body.contains(marker) {
                    return Err(StatusCode::INTERNAL_SERVER_ERROR);
                }
            }
            Ok(Json(json!({
                "choices": [{
                    "message": { "role": "assistant", "content": content }
                }]
            })))
        }),
    );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}

fn make_equipment_dir(root: &Path, name: &str, front: Option<&[u8]>, back: Option<&[u8]>) {
    let dir = root.join(name);
    fs::create_dir(&dir).unwrap();
    if let Some(bytes) = front {
        File::create(dir.join("model_h0_p0.png")).unwrap().write_all(bytes).unwrap();
    }
    if let Some(bytes) = back {
        File::create(dir.join("model_h180_p0.png")).unwrap().write_all(bytes).unwrap();
    }
}

fn test_config(base_url: String) -> Config {
    Config {
        base_url,
        max_concurrent: 4,
        batch_size: 2,
        timeout_seconds: 5,
        ..Config::default()
    }
}

/// 正常系: 2装備を記録、画像なしはスキップ、形式外ディレクトリは無視
#[tokio::test]
async fn test_label_directory_happy_path() {
    let base_url = spawn_mock_api(
        r#"```json
{"colors": ["red", "blue"], "materials": ["金属"], "custom_tags": "試験"}
```"#,
        None,
    )
    .await;

    let root = tempdir().unwrap();
    make_equipment_dir(root.path(), "鎧_10001", Some(b"front"), Some(b"back"));
    make_equipment_dir(root.path(), "兜_10002", Some(b"front"), None);
    make_equipment_dir(root.path(), "画像なし_10003", None, None);
    fs::create_dir(root.path().join("Hat")).unwrap(); // 形式外

    let out = tempdir().unwrap();
    let output = out.path().join("labels.csv");

    let summary = labeler::label_directory(&test_config(base_url), root.path(), &output, None, false)
        .await
        .unwrap();

    assert_eq!(summary.recorded, 2);
    assert_eq!(summary.with_errors, 0);
    assert_eq!(summary.skipped, 1);

    let ids = store::load_processed_ids(&output).unwrap();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&10001));
    assert!(ids.contains(&10002));

    let text = fs::read_to_string(&output).unwrap();
    // 両面同一ラベルのマージはソート済み和集合のまま
    assert!(text.contains("blue, red"));
    assert!(text.contains("金属"));
    assert!(text.contains("試験"));

    // 正面だけの装備はback_image列が空
    let row_10002 = text.lines().find(|l| l.starts_with("10002,")).unwrap();
    assert!(row_10002.contains("兜"));
    assert!(row_10002.contains("h0_p0.png"));
    assert!(!row_10002.contains("h180_p0.png"));
}

/// レジューム: 記録済みIDは再実行時にAPI呼び出しなしでスキップされる
#[tokio::test]
async fn test_rerun_is_idempotent() {
    let base_url = spawn_mock_api(r#"{"colors": ["red"]}"#, None).await;

    let root = tempdir().unwrap();
    make_equipment_dir(root.path(), "Jacket_10001", Some(b"front"), None);

    let out = tempdir().unwrap();
    let output = out.path().join("labels.csv");
    let config = test_config(base_url);

    let first = labeler::label_directory(&config, root.path(), &output, None, false)
        .await
        .unwrap();
    assert_eq!(first.recorded, 1);

    // 2件目を追加して再実行 → 新規の1件だけ処理される
    make_equipment_dir(root.path(), "Jacket_10002", Some(b"front"), None);

    let second = labeler::label_directory(&config, root.path(), &output, None, false)
        .await
        .unwrap();
    assert_eq!(second.recorded, 1);

    // 装備名は名前列とパス列の両方に現れるため、行数で二重記録なしを確認
    let text = fs::read_to_string(&output).unwrap();
    assert_eq!(text.lines().filter(|l| l.starts_with("10001,")).count(), 1);
    assert_eq!(text.lines().filter(|l| l.starts_with("10002,")).count(), 1);
}

/// 接続不能APIでも実行は完走し、エラーつきで記録される
#[tokio::test]
async fn test_transport_failure_records_error() {
    let root = tempdir().unwrap();
    make_equipment_dir(root.path(), "鎧_10001", Some(b"front"), None);

    let out = tempdir().unwrap();
    let output = out.path().join("labels.csv");

    // 到達不能なポート
    let config = test_config("http://127.0.0.1:1".to_string());

    let summary = labeler::label_directory(&config, root.path(), &output, None, false)
        .await
        .unwrap();

    assert_eq!(summary.recorded, 1);
    assert_eq!(summary.with_errors, 1);

    let text = fs::read_to_string(&output).unwrap();
    let row = text.lines().find(|l| l.starts_with("10001,")).unwrap();
    assert!(row.contains("正面画像エラー"));

    // エラーつきでも記録済み扱いなので再実行は何もしない
    let rerun = labeler::label_directory(&config, root.path(), &output, None, false)
        .await
        .unwrap();
    assert_eq!(rerun.recorded, 0);
}

/// 片面だけ失敗した場合、成功した側のラベルとエラーの両方が残る
#[tokio::test]
async fn test_partial_failure_keeps_other_side_labels() {
    // 正面画像のbase64（"FRONTDATA"）を含むリクエストだけ失敗させる
    let front_marker = "RlJPTlREQVRB";
    let base_url = spawn_mock_api(r#"{"colors": ["green"]}"#, Some(front_marker)).await;

    let root = tempdir().unwrap();
    make_equipment_dir(root.path(), "鎧_10001", Some(b"FRONTDATA"), Some(b"BACKDATA"));

    let out = tempdir().unwrap();
    let output = out.path().join("labels.csv");

    let summary = labeler::label_directory(&test_config(base_url), root.path(), &output, None, false)
        .await
        .unwrap();

    assert_eq!(summary.recorded, 1);
    assert_eq!(summary.with_errors, 1);

    let text = fs::read_to_string(&output).unwrap();
    let row = text.lines().find(|l| l.starts_with("10001,")).unwrap();
    assert!(row.contains("正面画像エラー"));
    assert!(!row.contains("背面画像エラー"));
    // 背面の成功分は残る
    assert!(row.contains("green"));
}

/// 形式に合うディレクトリがひとつもなければエラー
#[tokio::test]
async fn test_no_equipment_dirs_is_an_error() {
    let root = tempdir().unwrap();
    fs::create_dir(root.path().join("Hat")).unwrap();

    let out = tempdir().unwrap();
    let output = out.path().join("labels.csv");
    let config = test_config("http://127.0.0.1:1".to_string());

    let result = labeler::label_directory(&config, root.path(), &output, None, false).await;
    assert!(matches!(
        result,
        Err(lexicon::LexiconError::NoEquipmentFound(_))
    ));
}

/// --limit による件数制限
#[tokio::test]
async fn test_limit_truncates_work_list() {
    let base_url = spawn_mock_api(r#"{"colors": ["red"]}"#, None).await;

    let root = tempdir().unwrap();
    make_equipment_dir(root.path(), "a_1", Some(b"x"), None);
    make_equipment_dir(root.path(), "b_2", Some(b"x"), None);
    make_equipment_dir(root.path(), "c_3", Some(b"x"), None);

    let out = tempdir().unwrap();
    let output = out.path().join("labels.csv");

    let summary =
        labeler::label_directory(&test_config(base_url), root.path(), &output, Some(2), false)
            .await
            .unwrap();

    assert_eq!(summary.recorded, 2);
    // ID昇順に先頭から処理される
    let ids = store::load_processed_ids(&output).unwrap();
    assert!(ids.contains(&1));
    assert!(ids.contains(&2));
    assert!(!ids.contains(&3));
}
