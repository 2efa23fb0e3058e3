//! 装備ディレクトリスキャン
//!
//! ルート直下の「装備名_装備ID」ディレクトリを列挙し、
//! 各ディレクトリ内の正面（*h0_p0.*）・背面（*h180_p0.*）画像を探す。

use crate::error::{LexiconError, Result};
use lazy_static::lazy_static;
use regex::Regex;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// ラベリング対象の装備ディレクトリ
#[derive(Debug, Clone)]
pub struct EquipmentDir {
    pub path: PathBuf,
    pub name: String,
    pub id: u64,
}

const IMAGE_EXTENSIONS: &[&str] = &[
    "png", "jpg", "jpeg", "webp", "gif", "PNG", "JPG", "JPEG", "WEBP", "GIF",
];

/// 正面画像のファイル名サフィックス（水平0度・ピッチ0度）
const FRONT_SUFFIX: &str = "h0_p0";
/// 背面画像のファイル名サフィックス（水平180度・ピッチ0度）
const BACK_SUFFIX: &str = "h180_p0";

lazy_static! {
    // 「装備名_装備ID」形式。最後のアンダースコア以降の数字列がID
    static ref EQUIPMENT_DIR_RE: Regex = Regex::new(r"^(.+)_(\d+)$").unwrap();
}

/// ディレクトリ名から装備名と装備IDを取り出す
///
/// 形式に合わない場合はNone（エラーにはしない）
pub fn parse_equipment_info(dir_name: &str) -> Option<(String, u64)> {
    let caps = EQUIPMENT_DIR_RE.captures(dir_name)?;
    let name = caps.get(1)?.as_str().to_string();
    let id: u64 = caps.get(2)?.as_str().parse().ok()?;
    Some((name, id))
}

/// ルート直下の装備ディレクトリを列挙（装備ID昇順）
pub fn scan_root(root: &Path) -> Result<Vec<EquipmentDir>> {
    if !root.exists() {
        return Err(LexiconError::FolderNotFound(root.display().to_string()));
    }

    let mut dirs = Vec::new();

    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1) // 直下のみ（再帰しない）
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let dir_name = match path.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };

        if let Some((name, id)) = parse_equipment_info(&dir_name) {
            dirs.push(EquipmentDir {
                path: path.to_path_buf(),
                name,
                id,
            });
        }
    }

    // 装備ID順に処理して実行順を決定的にする
    dirs.sort_by_key(|d| d.id);

    Ok(dirs)
}

/// 装備ディレクトリ内の正面・背面画像を探す
///
/// 該当ファイルが複数ある場合はファイル名昇順の先頭を採用。
/// 見つからない側はNone（エラーにはしない）。
pub fn find_equipment_images(equipment_dir: &Path) -> (Option<PathBuf>, Option<PathBuf>) {
    let front = find_image_by_suffix(equipment_dir, FRONT_SUFFIX);
    let back = find_image_by_suffix(equipment_dir, BACK_SUFFIX);
    (front, back)
}

fn find_image_by_suffix(dir: &Path, suffix: &str) -> Option<PathBuf> {
    let mut matches: Vec<PathBuf> = std::fs::read_dir(dir)
        .ok()?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.is_file() && matches_suffix(p, suffix))
        .collect();

    matches.sort();
    matches.into_iter().next()
}

fn matches_suffix(path: &Path, suffix: &str) -> bool {
    let ext_ok = path
        .extension()
        .map(|e| IMAGE_EXTENSIONS.iter().any(|&x| x == e.to_string_lossy()))
        .unwrap_or(false);
    if !ext_ok {
        return false;
    }

    path.file_stem()
        .map(|s| s.to_string_lossy().ends_with(suffix))
        .unwrap_or(false)
}
