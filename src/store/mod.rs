//! 装備ラベルCSVストア
//!
//! 追記専用のCSV永続化と、レジューム用の処理済みID読み込み。
//! ヘッダ行とBOM（Excel等との互換用）はファイル新規作成時のみ書く。

use crate::error::Result;
use crate::labels::LabelSet;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// UTF-8 BOM（utf-8-sig相当）
const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// CSV1行分の装備レコード
///
/// フィールド順がそのまま列順になる
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquipmentRecord {
    pub equipment_id: u64,
    pub equipment_name: String,
    pub front_image: String,
    pub back_image: String,
    pub colors: String,
    pub materials: String,
    pub shapes: String,
    pub decorations: String,
    pub styles: String,
    pub effects: String,
    pub appearance_looks_like: String,
    pub appearance_description: String,
    pub custom_tags: String,
    pub all_labels: String,
    pub error: String,
    pub timestamp: String,
}

impl EquipmentRecord {
    pub fn new(
        equipment_id: u64,
        equipment_name: String,
        front_image: String,
        back_image: String,
        labels: &LabelSet,
        error: String,
        timestamp: String,
    ) -> Self {
        Self {
            equipment_id,
            equipment_name,
            front_image,
            back_image,
            colors: labels.colors.joined(),
            materials: labels.materials.joined(),
            shapes: labels.shapes.joined(),
            decorations: labels.decorations.joined(),
            styles: labels.styles.joined(),
            effects: labels.effects.joined(),
            appearance_looks_like: labels.appearance_looks_like.joined(),
            appearance_description: labels.appearance_description.clone(),
            custom_tags: labels.custom_tags.joined(),
            all_labels: labels.all_labels(),
            error,
            timestamp,
        }
    }
}

/// 処理済み装備IDをCSVから読み込む（レジューム用）
///
/// ファイルがなければ空集合（初回実行）。
/// equipment_idが数値として読めない行は無視する。
pub fn load_processed_ids(csv_path: &Path) -> Result<HashSet<u64>> {
    if !csv_path.exists() {
        return Ok(HashSet::new());
    }

    let file = File::open(csv_path)?;
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(file);

    // BOM付きヘッダにも対応して列位置を特定
    let id_index = reader
        .headers()?
        .iter()
        .position(|h| h.trim_start_matches('\u{feff}') == "equipment_id");

    let Some(id_index) = id_index else {
        return Ok(HashSet::new());
    };

    let mut ids = HashSet::new();
    for record in reader.records() {
        let record = record?;
        if let Some(id) = record.get(id_index).and_then(|v| v.trim().parse::<u64>().ok()) {
            ids.insert(id);
        }
    }

    Ok(ids)
}

/// 追記専用CSVライター
///
/// batch_size件たまるごとにフラッシュする。残りはflush()か
/// Dropで書き切る。フラッシュ失敗は致命的エラーとして伝播させる
/// （黙って落とすとレジューム不変条件が壊れる）。
pub struct CsvStore {
    writer: csv::Writer<File>,
    path: PathBuf,
    batch_size: usize,
    pending: usize,
}

impl CsvStore {
    pub fn open(csv_path: &Path, batch_size: usize) -> Result<Self> {
        let is_new = !csv_path.exists();

        let mut file = OpenOptions::new().create(true).append(true).open(csv_path)?;
        if is_new {
            file.write_all(UTF8_BOM)?;
        }

        let writer = csv::WriterBuilder::new()
            .has_headers(is_new) // ヘッダは新規作成時のみ
            .from_writer(file);

        Ok(Self {
            writer,
            path: csv_path.to_path_buf(),
            batch_size: batch_size.max(1),
            pending: 0,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 1件追記。バッチサイズに達したらフラッシュする
    pub fn append(&mut self, record: &EquipmentRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.pending += 1;
        if self.pending >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.pending = 0;
        Ok(())
    }
}

impl Drop for CsvStore {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}
