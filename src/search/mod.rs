//! タグ検索サービス
//!
//! ラベリング済みCSVを起動時に一度だけ読み込み、タグ全体のキャッシュを
//! 構築して検索APIを提供する。コアパイプラインとはCSVの列契約のみで
//! つながる読み取り専用レイヤ。

use crate::error::Result;
use crate::store::EquipmentRecord;
use axum::extract::{Path as AxumPath, Query, State};
use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// CSVセルのタグ文字列を集合に戻す
///
/// 半角カンマと全角カンマの両方を区切りとして受ける
pub fn parse_label_string(label_str: &str) -> BTreeSet<String> {
    label_str
        .replace('，', ",")
        .split(',')
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

/// クエリタグ集合と装備タグ集合の類似度（|積集合| / |和集合|）
pub fn label_similarity(query: &BTreeSet<String>, labels: &BTreeSet<String>) -> f64 {
    if labels.is_empty() {
        return 0.0;
    }
    let intersection = query.intersection(labels).count();
    let union = query.union(labels).count();
    if union == 0 {
        return 0.0;
    }
    intersection as f64 / union as f64
}

/// メモリ上の装備インデックス
pub struct EquipmentIndex {
    rows: Vec<EquipmentRecord>,
    all_tags: BTreeSet<String>,
}

impl EquipmentIndex {
    /// CSVから読み込んでタグキャッシュを構築
    ///
    /// equipment_idが読めない行は無視する
    pub fn load(csv_path: &Path) -> Result<Self> {
        let content = std::fs::read(csv_path)?;
        // utf-8-sig対応: 先頭BOMを剥がしてからパース
        let content = content.strip_prefix(b"\xef\xbb\xbf".as_slice()).unwrap_or(&content);

        let mut reader = csv::ReaderBuilder::new().from_reader(content);
        let mut rows = Vec::new();
        let mut all_tags = BTreeSet::new();

        for record in reader.deserialize::<EquipmentRecord>() {
            let Ok(record) = record else { continue };
            all_tags.extend(parse_label_string(&record.all_labels));
            all_tags.extend(parse_label_string(&record.custom_tags));
            rows.push(record);
        }

        Ok(Self { rows, all_tags })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn tag_count(&self) -> usize {
        self.all_tags.len()
    }

    pub fn find_by_id(&self, id: u64) -> Option<&EquipmentRecord> {
        self.rows.iter().find(|r| r.equipment_id == id)
    }

    /// 全タグをクエリ・labelsの積、説明文・装備名の部分一致で検索
    ///
    /// すべてのクエリタグがどこかでマッチした装備のみ返す。
    /// 類似度（クエリとall_labelsの |積|/|和|）降順でソート。
    /// total_matchesはtop_k切り詰め前の総ヒット数。
    pub fn search(&self, query_tags: &BTreeSet<String>, top_k: usize) -> SearchResults {
        let mut hits = Vec::new();

        for row in &self.rows {
            let labels = parse_label_string(&row.all_labels);
            let description = row.appearance_description.to_lowercase();
            let name = row.equipment_name.to_lowercase();

            let matched_labels: BTreeSet<String> =
                query_tags.intersection(&labels).cloned().collect();
            let description_matches: Vec<String> = query_tags
                .iter()
                .filter(|t| description.contains(&t.to_lowercase()))
                .cloned()
                .collect();
            let name_matches: Vec<String> = query_tags
                .iter()
                .filter(|t| name.contains(&t.to_lowercase()))
                .cloned()
                .collect();

            let mut all_matched: BTreeSet<String> = matched_labels.clone();
            all_matched.extend(description_matches.iter().cloned());
            all_matched.extend(name_matches.iter().cloned());

            if all_matched.len() != query_tags.len() {
                continue;
            }

            hits.push(SearchHit {
                equipment_id: row.equipment_id,
                equipment_name: row.equipment_name.clone(),
                all_labels: row.all_labels.clone(),
                appearance_description: row.appearance_description.clone(),
                similarity: label_similarity(query_tags, &labels),
                matched_labels: matched_labels.into_iter().collect(),
                description_matches,
                name_matches,
            });
        }

        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.equipment_id.cmp(&b.equipment_id))
        });
        let total_matches = hits.len();
        hits.truncate(top_k);
        SearchResults { total_matches, hits }
    }
}

/// 検索結果（切り詰め前の総ヒット数つき）
#[derive(Debug, Clone)]
pub struct SearchResults {
    pub total_matches: usize,
    pub hits: Vec<SearchHit>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub equipment_id: u64,
    pub equipment_name: String,
    pub all_labels: String,
    pub appearance_description: String,
    pub similarity: f64,
    pub matched_labels: Vec<String>,
    pub description_matches: Vec<String>,
    pub name_matches: Vec<String>,
}

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, detail: &str) -> ApiError {
    (status, Json(json!({ "detail": detail })))
}

/// 検索APIサーバを起動
pub async fn serve(csv_path: &Path, host: &str, port: u16) -> Result<()> {
    let index = EquipmentIndex::load(csv_path)?;
    println!(
        "✔ 装備 {}件・タグ {}種を読み込み: {}",
        index.len(),
        index.tag_count(),
        csv_path.display()
    );

    let app = router(Arc::new(index));

    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    println!("🔍 検索APIを起動: http://{}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

pub fn router(index: Arc<EquipmentIndex>) -> Router {
    Router::new()
        .route("/tags", get(get_tags))
        .route("/equipment/{id}", get(get_equipment))
        .route("/search", get(search_equipment))
        .layer(CorsLayer::permissive())
        .with_state(index)
}

/// GET /tags - 全タグ一覧（補完・フィルタUI用）
async fn get_tags(
    State(index): State<Arc<EquipmentIndex>>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    if index.is_empty() {
        return Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, "装備データが未読み込みです"));
    }

    let tags: Vec<&String> = index.all_tags.iter().collect();
    Ok(Json(json!({ "tags": tags, "count": tags.len() })))
}

/// GET /equipment/{id} - 装備詳細
async fn get_equipment(
    State(index): State<Arc<EquipmentIndex>>,
    AxumPath(id): AxumPath<u64>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let row = index.find_by_id(id).ok_or_else(|| {
        api_error(
            StatusCode::NOT_FOUND,
            &format!("装備ID {} が見つかりません", id),
        )
    })?;

    Ok(Json(json!({
        "equipment_id": row.equipment_id,
        "equipment_name": row.equipment_name,
        "front_image": row.front_image,
        "back_image": row.back_image,
        "colors": parse_label_string(&row.colors),
        "materials": parse_label_string(&row.materials),
        "shapes": parse_label_string(&row.shapes),
        "decorations": parse_label_string(&row.decorations),
        "styles": parse_label_string(&row.styles),
        "effects": parse_label_string(&row.effects),
        "appearance_looks_like": parse_label_string(&row.appearance_looks_like),
        "appearance_description": row.appearance_description,
        "custom_tags": parse_label_string(&row.custom_tags),
    })))
}

/// GET /search?tags=a&tags=b&top_k=10 - タグ検索
async fn search_equipment(
    State(index): State<Arc<EquipmentIndex>>,
    Query(params): Query<Vec<(String, String)>>,
) -> std::result::Result<Json<serde_json::Value>, ApiError> {
    let mut query_tags = BTreeSet::new();
    let mut top_k = 10usize;

    for (key, value) in params {
        match key.as_str() {
            "tags" => {
                let tag = value.trim();
                if !tag.is_empty() {
                    query_tags.insert(tag.to_string());
                }
            }
            "top_k" => {
                top_k = value.parse().map_err(|_| {
                    api_error(StatusCode::BAD_REQUEST, "top_kは1〜100の整数で指定してください")
                })?;
            }
            _ => {}
        }
    }

    if query_tags.is_empty() {
        return Err(api_error(StatusCode::BAD_REQUEST, "有効なタグが指定されていません"));
    }
    if !(1..=100).contains(&top_k) {
        return Err(api_error(StatusCode::BAD_REQUEST, "top_kは1〜100の整数で指定してください"));
    }

    let results = index.search(&query_tags, top_k);

    Ok(Json(json!({
        "query_tags": query_tags,
        "total_matches": results.total_matches,
        "results": results.hits,
    })))
}
