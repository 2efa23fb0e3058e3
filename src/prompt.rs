//! ラベリングプロンプト生成

use crate::labels::CATEGORIES;

/// 装備画像ラベリング用プロンプト
///
/// 固定6カテゴリ＋外見系フィールドをJSONオブジェクトで返させる
pub fn labeling_prompt() -> String {
    let categories = CATEGORIES.join(", ");

    format!(
        r#"あなたはゲーム装備のカタログを作成するアーキビストです。この装備画像を観察し、外見の特徴をタグ付けしてください。

## 出力形式（厳密にこのJSONオブジェクト形式で出力）
{{
  "colors": ["主要な色のタグ"],
  "materials": ["素材のタグ（金属、革、布など）"],
  "shapes": ["形状・シルエットのタグ"],
  "decorations": ["装飾のタグ（刺繍、紋章、宝石など）"],
  "styles": ["様式のタグ（重装、軽装、和風など）"],
  "effects": ["発光・オーラ等の視覚効果のタグ"],
  "appearance_looks_like": ["何に見えるかの例え（職業・役割など）"],
  "appearance_description": "外見の簡潔な説明文",
  "custom_tags": ["上記に収まらない自由タグ"]
}}

## 注意
- カテゴリは {categories} の6種で固定
- 各タグは短い名詞句で、1要素1タグ
- 見えるものだけを記載し、性能やゲーム内効果は推測しない
- 該当がないカテゴリは空配列
- JSONオブジェクトのみ出力。説明文は不要"#
    )
}
