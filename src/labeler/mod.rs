//! ラベリング実行パイプライン
//!
//! スキャン → レジュームフィルタ → 並列ラベリング → マージ → CSV追記。
//! 同時API呼び出し数は実行全体で1つのセマフォに束ねる（正面・背面の
//! 呼び出しも同じ枠を取り合う）。CSVへの追記は受信側の1箇所のみ。

use crate::client::{LabelClient, LabelOutcome};
use crate::config::Config;
use crate::error::Result;
use crate::prompt::labeling_prompt;
use crate::scanner::{self, EquipmentDir};
use crate::store::{self, CsvStore, EquipmentRecord};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};

/// 実行結果サマリ
#[derive(Debug, Default, Clone, Copy)]
pub struct RunSummary {
    /// CSVに記録した装備数（errorつきを含む）
    pub recorded: usize,
    /// errorフィールドつきで記録した装備数
    pub with_errors: usize,
    /// 画像がなくスキップした装備数
    pub skipped: usize,
}

/// ディレクトリ配下の装備を一括ラベリングしてCSVに追記
pub async fn label_directory(
    config: &Config,
    root: &Path,
    output: &Path,
    limit: Option<usize>,
    verbose: bool,
) -> Result<RunSummary> {
    // 1. 装備ディレクトリスキャン
    println!("[1/3] 装備ディレクトリをスキャン中...");
    let all_dirs = scanner::scan_root(root)?;

    if all_dirs.is_empty() {
        return Err(crate::error::LexiconError::NoEquipmentFound(
            root.display().to_string(),
        ));
    }

    // 2. レジューム: 処理済みIDを除外（API呼び出し前に一度だけ判定）
    let processed = store::load_processed_ids(output)?;
    if !processed.is_empty() {
        println!("  処理済み {}件を読み込み", processed.len());
    }

    let mut work: Vec<EquipmentDir> = all_dirs
        .into_iter()
        .filter(|d| !processed.contains(&d.id))
        .collect();

    if let Some(limit) = limit {
        work.truncate(limit);
    }

    println!("✔ 対象装備 {}件\n", work.len());

    if work.is_empty() {
        println!("新規の装備はありません");
        return Ok(RunSummary::default());
    }

    // 3. 並列ラベリング
    println!(
        "[2/3] ラベリング中... (並列数: {}, モデル: {})",
        config.max_concurrent, config.model
    );

    let client = LabelClient::new(config, verbose)?;
    let prompt = Arc::new(labeling_prompt());
    let semaphore = Arc::new(Semaphore::new(config.max_concurrent.max(1)));

    let pb = ProgressBar::new(work.len() as u64);
    pb.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}").unwrap(),
    );

    let (tx, mut rx) = mpsc::channel::<Option<EquipmentRecord>>(work.len());

    for equipment in work {
        let client = client.clone();
        let prompt = Arc::clone(&prompt);
        let semaphore = Arc::clone(&semaphore);
        let tx = tx.clone();
        let pb = pb.clone();

        tokio::spawn(async move {
            let record = process_equipment(&client, &prompt, &semaphore, &equipment, &pb).await;
            // 受信側が先に終了していない限り必ず届く
            let _ = tx.send(record).await;
        });
    }
    drop(tx);

    // 4. 受信した完了分を唯一のライターで追記
    let mut summary = RunSummary::default();
    let mut writer = CsvStore::open(output, config.batch_size)?;

    while let Some(record) = rx.recv().await {
        match record {
            Some(record) => {
                if !record.error.is_empty() {
                    summary.with_errors += 1;
                }
                summary.recorded += 1;
                // 書き込み失敗はレジューム不変条件を壊すため即時中断
                writer.append(&record)?;
            }
            None => summary.skipped += 1,
        }
        pb.inc(1);
    }

    writer.flush()?;
    pb.finish_and_clear();

    println!("✔ ラベリング完了\n");
    println!("[3/3] 結果を保存: {}", output.display());
    Ok(summary)
}

/// 装備1件を処理（正面・背面を並列でラベリングしてマージ）
///
/// 画像が1枚もない場合はNone（警告してスキップ）
async fn process_equipment(
    client: &LabelClient,
    prompt: &Arc<String>,
    semaphore: &Arc<Semaphore>,
    equipment: &EquipmentDir,
    pb: &ProgressBar,
) -> Option<EquipmentRecord> {
    let (front_path, back_path) = scanner::find_equipment_images(&equipment.path);

    if front_path.is_none() && back_path.is_none() {
        pb.println(format!(
            "⚠ 警告: {}_{} に正面・背面画像がないためスキップ",
            equipment.name, equipment.id
        ));
        return None;
    }

    let front_task = spawn_label_call(client, prompt, semaphore, front_path.clone());
    let back_task = spawn_label_call(client, prompt, semaphore, back_path.clone());

    // 両側の呼び出しが返ってから装備1件の完了とする
    let front = await_side(front_task).await;
    let back = await_side(back_task).await;

    let mut errors = Vec::new();
    if let Some(e) = front.as_ref().and_then(|o| o.error.as_deref()) {
        errors.push(format!("正面画像エラー: {}", e));
    }
    if let Some(e) = back.as_ref().and_then(|o| o.error.as_deref()) {
        errors.push(format!("背面画像エラー: {}", e));
    }

    // 片側失敗でも成功した側のラベルは残す
    let front_labels = front.map(|o| o.labels).unwrap_or_default();
    let back_labels = back.map(|o| o.labels).unwrap_or_default();
    let merged = front_labels.merge(&back_labels);

    Some(EquipmentRecord::new(
        equipment.id,
        equipment.name.clone(),
        front_path.map(|p| p.display().to_string()).unwrap_or_default(),
        back_path.map(|p| p.display().to_string()).unwrap_or_default(),
        &merged,
        errors.join("; "),
        chrono::Local::now().to_rfc3339(),
    ))
}

/// 画像1枚分のラベリング呼び出しをタスクとして起動
///
/// 正面・背面を区別せず、同じグローバルセマフォの枠を取る
fn spawn_label_call(
    client: &LabelClient,
    prompt: &Arc<String>,
    semaphore: &Arc<Semaphore>,
    image_path: Option<PathBuf>,
) -> Option<tokio::task::JoinHandle<LabelOutcome>> {
    let image_path = image_path?;
    let client = client.clone();
    let prompt = Arc::clone(prompt);
    let semaphore = Arc::clone(semaphore);

    Some(tokio::spawn(async move {
        let _permit = match semaphore.acquire_owned().await {
            Ok(p) => p,
            Err(_) => {
                return LabelOutcome {
                    error: Some("セマフォが閉じられました".into()),
                    ..Default::default()
                };
            }
        };
        client.label_image(&image_path, &prompt).await
    }))
}

async fn await_side(task: Option<tokio::task::JoinHandle<LabelOutcome>>) -> Option<LabelOutcome> {
    match task {
        Some(handle) => match handle.await {
            Ok(outcome) => Some(outcome),
            Err(e) => Some(LabelOutcome {
                error: Some(format!("タスク実行エラー: {}", e)),
                ..Default::default()
            }),
        },
        None => None,
    }
}
