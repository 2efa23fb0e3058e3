//! ラベリングAPIクライアント
//!
//! OpenAI互換のチャット補完エンドポイントに画像1枚＋プロンプトを送り、
//! 自由形式テキストからJSONを抽出してLabelSetに変換する。
//! 失敗は3回まで再試行し、終端状態はすべてLabelOutcomeの値として返す
//! （このモジュールの外にはErrを出さない）。

use crate::config::Config;
use crate::labels::LabelSet;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 再試行回数（初回を含む）
const MAX_ATTEMPTS: u32 = 3;
/// 再試行間の待ち時間。バックオフはしないがホットループも避ける
const RETRY_WAIT: Duration = Duration::from_millis(500);
/// 出力トークン上限
const MAX_TOKENS: u32 = 2048;
/// サンプリング温度（決定性重視で低固定）
const TEMPERATURE: f32 = 0.1;

lazy_static! {
    // ```json ... ``` または ``` ... ``` 内のJSONオブジェクト
    static ref FENCED_JSON_RE: Regex =
        Regex::new(r"(?s)```(?:json)?\s*(\{.*?\})\s*```").unwrap();
}

/// 1画像分のラベリング結果
///
/// errorが埋まっていてもraw_responseには最終試行のレスポンスを残す
#[derive(Debug, Clone, Default)]
pub struct LabelOutcome {
    pub labels: LabelSet,
    pub raw_response: String,
    pub error: Option<String>,
}

impl LabelOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

/// チャット補完リクエスト
#[derive(Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatMessage {
    role: &'static str,
    content: Vec<ContentPart>,
}

#[derive(Serialize)]
#[serde(tag = "type")]
enum ContentPart {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(rename = "image_url")]
    ImageUrl { image_url: ImageUrl },
}

#[derive(Serialize)]
struct ImageUrl {
    url: String,
}

/// チャット補完レスポンス
#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// レスポンステキストからJSONオブジェクトを抽出
///
/// 抽出優先順位:
/// 1. 全文（trim後）がそのままJSONとしてパース可能
/// 2. ```json ... ``` コードブロック内のオブジェクト
/// 3. 最初の `{` から最後の `}` までの区間
pub fn extract_json(response: &str) -> Option<&str> {
    let trimmed = response.trim();
    if serde_json::from_str::<serde_json::Value>(trimmed).is_ok() {
        return Some(trimmed);
    }

    if let Some(caps) = FENCED_JSON_RE.captures(response) {
        return Some(caps.get(1).unwrap().as_str());
    }

    let start = response.find('{')?;
    let end = response.rfind('}')?;
    if end >= start {
        return Some(&response[start..=end]);
    }

    None
}

/// 拡張子からMIMEタイプを推定（不明な拡張子は汎用バイナリ扱い）
fn mime_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// 抽出済みレスポンステキストをLabelSetへ
fn parse_labels(content: &str) -> std::result::Result<LabelSet, String> {
    let json_str = extract_json(content)
        .ok_or_else(|| "JSONパース失敗: レスポンスからJSONを抽出できません".to_string())?;
    serde_json::from_str::<LabelSet>(json_str).map_err(|e| format!("JSONパース失敗: {}", e))
}

/// ラベリングAPIクライアント
#[derive(Clone)]
pub struct LabelClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    verbose: bool,
}

impl LabelClient {
    pub fn new(config: &Config, verbose: bool) -> crate::error::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| crate::error::LexiconError::ApiCall(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key(),
            verbose,
        })
    }

    /// 画像1枚をラベリング
    ///
    /// 画像読み込み・通信・パースのいずれが失敗しても必ず値で返す
    pub async fn label_image(&self, image_path: &Path, prompt: &str) -> LabelOutcome {
        let bytes = match std::fs::read(image_path) {
            Ok(b) => b,
            Err(e) => {
                return LabelOutcome {
                    error: Some(format!("画像読み込みエラー: {}", e)),
                    ..Default::default()
                };
            }
        };
        let data_url = format!(
            "data:{};base64,{}",
            mime_type_for(image_path),
            BASE64.encode(&bytes)
        );

        let mut last_error = String::new();
        let mut last_content = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            if attempt > 1 {
                tokio::time::sleep(RETRY_WAIT).await;
            }

            // 毎回新規リクエスト（部分レスポンスは持ち越さない）
            match self.request_once(prompt, &data_url).await {
                Ok(content) => {
                    last_content = content;
                    match parse_labels(&last_content) {
                        Ok(labels) => {
                            return LabelOutcome {
                                labels,
                                raw_response: last_content,
                                error: None,
                            };
                        }
                        Err(e) => {
                            last_error = e;
                            if self.verbose {
                                let preview: String = last_content.chars().take(500).collect();
                                println!(
                                    "  [再試行 {}/{}] {}\n  レスポンス: {}",
                                    attempt, MAX_ATTEMPTS, last_error, preview
                                );
                            }
                        }
                    }
                }
                Err(e) => {
                    last_error = e;
                    if self.verbose {
                        println!("  [再試行 {}/{}] {}", attempt, MAX_ATTEMPTS, last_error);
                    }
                }
            }
        }

        LabelOutcome {
            labels: LabelSet::default(),
            raw_response: last_content,
            error: Some(last_error),
        }
    }

    async fn request_once(
        &self,
        prompt: &str,
        data_url: &str,
    ) -> std::result::Result<String, String> {
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user",
                content: vec![
                    ContentPart::Text {
                        text: prompt.to_string(),
                    },
                    ContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: data_url.to_string(),
                        },
                    },
                ],
            }],
            temperature: TEMPERATURE,
            max_tokens: MAX_TOKENS,
        };

        let url = format!("{}/chat/completions", self.base_url);
        let mut builder = self.http.post(&url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| format!("API呼び出しエラー: {}", e))?
            .error_for_status()
            .map_err(|e| format!("API呼び出しエラー: {}", e))?;

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| format!("APIレスポンス形式エラー: {}", e))?;

        chat.choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .ok_or_else(|| "APIレスポンスが空です".to_string())
    }
}
