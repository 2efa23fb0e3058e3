//! ラベル型とマージ処理
//!
//! APIレスポンスのラベルは「文字列 or 配列 or 欠落」の揺れがあるため、
//! デシリアライズ境界でTagSetに正規化する。以降のマージ・CSV化は
//! 常に集合として扱う。

use serde::de::Deserializer;
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 固定6カテゴリ（出力順もこの順で固定）
pub const CATEGORIES: &[&str] = &[
    "colors",
    "materials",
    "shapes",
    "decorations",
    "styles",
    "effects",
];

/// 正規化済みタグ集合
///
/// BTreeSetなので重複排除と安定ソートを兼ねる
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSet(pub BTreeSet<String>);

impl TagSet {
    pub fn from_iter<I: IntoIterator<Item = S>, S: Into<String>>(iter: I) -> Self {
        let set = iter
            .into_iter()
            .map(|s| s.into())
            .filter(|s| !s.is_empty())
            .collect();
        TagSet(set)
    }

    pub fn union(&self, other: &TagSet) -> TagSet {
        TagSet(self.0.union(&other.0).cloned().collect())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// CSVセル用に ", " 区切りで連結
    pub fn joined(&self) -> String {
        self.0.iter().cloned().collect::<Vec<_>>().join(", ")
    }
}

/// レスポンス中の「文字列 or 配列」の揺れを受けるための中間型
#[derive(Deserialize)]
#[serde(untagged)]
enum StringOrList {
    One(String),
    Many(Vec<String>),
}

impl<'de> Deserialize<'de> for TagSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // nullは空集合として扱う
        let raw = Option::<StringOrList>::deserialize(deserializer)?;
        Ok(match raw {
            None => TagSet::default(),
            Some(StringOrList::One(s)) => TagSet::from_iter([s.trim().to_string()]),
            Some(StringOrList::Many(v)) => {
                TagSet::from_iter(v.into_iter().map(|s| s.trim().to_string()))
            }
        })
    }
}

impl Serialize for TagSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.0.iter())
    }
}

/// 1画像分・1装備分のラベル集合
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelSet {
    pub colors: TagSet,
    pub materials: TagSet,
    pub shapes: TagSet,
    pub decorations: TagSet,
    pub styles: TagSet,
    pub effects: TagSet,
    pub appearance_looks_like: TagSet,
    pub appearance_description: String,
    pub custom_tags: TagSet,
}

impl LabelSet {
    /// 正面・背面のラベルをマージ
    ///
    /// - 固定カテゴリと自由タグは和集合
    /// - appearance_descriptionは両方あれば「；」で連結
    ///
    /// merge(L, 空) == L が成り立つ
    pub fn merge(&self, other: &LabelSet) -> LabelSet {
        let appearance_description =
            if !self.appearance_description.is_empty() && !other.appearance_description.is_empty() {
                format!(
                    "{}；{}",
                    self.appearance_description, other.appearance_description
                )
            } else if !self.appearance_description.is_empty() {
                self.appearance_description.clone()
            } else {
                other.appearance_description.clone()
            };

        LabelSet {
            colors: self.colors.union(&other.colors),
            materials: self.materials.union(&other.materials),
            shapes: self.shapes.union(&other.shapes),
            decorations: self.decorations.union(&other.decorations),
            styles: self.styles.union(&other.styles),
            effects: self.effects.union(&other.effects),
            appearance_looks_like: self.appearance_looks_like.union(&other.appearance_looks_like),
            appearance_description,
            custom_tags: self.custom_tags.union(&other.custom_tags),
        }
    }

    /// 固定6カテゴリをCATEGORIES順に連結したタグ列（all_labels列用）
    pub fn all_labels(&self) -> String {
        let mut all = Vec::new();
        for set in [
            &self.colors,
            &self.materials,
            &self.shapes,
            &self.decorations,
            &self.styles,
            &self.effects,
        ] {
            all.extend(set.0.iter().cloned());
        }
        all.join(", ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(items: &[&str]) -> TagSet {
        TagSet::from_iter(items.iter().copied())
    }

    #[test]
    fn test_merge_categories_sorted_union() {
        let front = LabelSet {
            colors: tags(&["red", "blue"]),
            ..Default::default()
        };
        let back = LabelSet {
            colors: tags(&["blue", "green"]),
            ..Default::default()
        };

        let merged = front.merge(&back);
        let colors: Vec<_> = merged.colors.0.iter().cloned().collect();
        assert_eq!(colors, vec!["blue", "green", "red"]);
        assert!(merged.all_labels().contains("blue"));
        assert!(merged.all_labels().contains("green"));
        assert!(merged.all_labels().contains("red"));
    }

    #[test]
    fn test_merge_commutative() {
        let a = LabelSet {
            materials: tags(&["金属", "革"]),
            styles: tags(&["重装"]),
            ..Default::default()
        };
        let b = LabelSet {
            materials: tags(&["布"]),
            styles: tags(&["重装", "騎士"]),
            ..Default::default()
        };
        assert_eq!(a.merge(&b).materials, b.merge(&a).materials);
        assert_eq!(a.merge(&b).styles, b.merge(&a).styles);
    }

    #[test]
    fn test_merge_with_empty_is_identity() {
        let a = LabelSet {
            colors: tags(&["white"]),
            appearance_looks_like: tags(&["司祭のローブ"]),
            appearance_description: "白いローブ".into(),
            custom_tags: tags(&["聖職者"]),
            ..Default::default()
        };
        assert_eq!(a.merge(&LabelSet::default()), a);
        assert_eq!(LabelSet::default().merge(&a), a);
    }

    #[test]
    fn test_merge_description_both_sides() {
        let a = LabelSet {
            appearance_description: "正面は金の刺繍".into(),
            ..Default::default()
        };
        let b = LabelSet {
            appearance_description: "背面にマント".into(),
            ..Default::default()
        };
        assert_eq!(a.merge(&b).appearance_description, "正面は金の刺繍；背面にマント");
        assert_eq!(a.merge(&LabelSet::default()).appearance_description, "正面は金の刺繍");
    }

    #[test]
    fn test_deserialize_string_or_list() {
        // 文字列でも配列でも欠落でもTagSetに正規化される
        let json = r#"{
            "colors": ["red", "red", "blue"],
            "appearance_looks_like": "ナイトの鎧",
            "custom_tags": null,
            "appearance_description": "銀の鎧"
        }"#;
        let labels: LabelSet = serde_json::from_str(json).unwrap();
        assert_eq!(labels.colors.len(), 2);
        assert_eq!(labels.appearance_looks_like.joined(), "ナイトの鎧");
        assert!(labels.custom_tags.is_empty());
        assert!(labels.materials.is_empty());
        assert_eq!(labels.appearance_description, "銀の鎧");
    }

    #[test]
    fn test_all_labels_fixed_order() {
        let labels = LabelSet {
            colors: tags(&["red"]),
            materials: tags(&["iron"]),
            effects: tags(&["glow"]),
            ..Default::default()
        };
        assert_eq!(labels.all_labels(), "red, iron, glow");
    }

    #[test]
    fn test_tagset_drops_empty_strings() {
        let json = r#"{"colors": ["", "red", "  "]}"#;
        let labels: LabelSet = serde_json::from_str(json).unwrap();
        // trim後に空になるものは捨てる
        assert_eq!(labels.colors.joined(), "red");
    }
}
