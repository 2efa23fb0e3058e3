use thiserror::Error;

#[derive(Error, Debug)]
pub enum LexiconError {
    #[error("設定エラー: {0}")]
    Config(String),

    #[error("ディレクトリが見つかりません: {0}")]
    FolderNotFound(String),

    #[error("装備ディレクトリが見つかりません: {0}")]
    NoEquipmentFound(String),

    #[error("API呼び出しエラー: {0}")]
    ApiCall(String),

    #[error("JSON解析エラー: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("CSV入出力エラー: {0}")]
    Csv(#[from] csv::Error),

    #[error("IOエラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, LexiconError>;
