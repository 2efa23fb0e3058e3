//! lexicon - 装備画像AI自動ラベリング・タグ検索ツール
//!
//! 「装備名_装備ID」ディレクトリ群をスキャンし、正面・背面画像を
//! ビジョンモデルでラベリングしてCSVに追記する。中断後の再実行は
//! CSV上の処理済みIDから自動で続きになる。

pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod labeler;
pub mod labels;
pub mod prompt;
pub mod scanner;
pub mod search;
pub mod store;

pub use error::{LexiconError, Result};
pub use labels::{LabelSet, TagSet};
