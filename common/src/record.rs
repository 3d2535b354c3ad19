//! 半構造化レコード
//!
//! DICOMデータセットを (group, element) タグと入れ子シーケンスの木として表し、
//! タグとアイテム番号を交互にたどるパス解決を提供する。

use crate::error::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// (group, element)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Tag(pub u16, pub u16);

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:04X},{:04X})", self.0, self.1)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Element {
    /// 文字列化した値（多値は `\` 区切り）
    Text(String),
    /// シーケンスのアイテム
    Items(Vec<Record>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    elements: BTreeMap<Tag, Element>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tag: Tag, element: Element) {
        self.elements.insert(tag, element);
    }

    /// 文字列値を設定（ビルダー形式）
    pub fn with_text(mut self, tag: Tag, value: impl Into<String>) -> Self {
        self.insert(tag, Element::Text(value.into()));
        self
    }

    /// シーケンスを設定（ビルダー形式）
    pub fn with_items(mut self, tag: Tag, items: Vec<Record>) -> Self {
        self.insert(tag, Element::Items(items));
        self
    }

    pub fn get(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    /// 文字列値を取得（空文字は未設定扱い）
    pub fn text(&self, tag: Tag) -> Option<&str> {
        match self.get(tag) {
            Some(Element::Text(value)) if !value.is_empty() => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }
}

/// パスの1ステップ
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Tag(Tag),
    Item(usize),
}

/// 入れ子アクセスパス
///
/// 例: `(0054,0220)[0](0008,0104)`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPath(pub Vec<Step>);

impl AccessPath {
    pub fn new(steps: Vec<Step>) -> Self {
        AccessPath(steps)
    }
}

impl fmt::Display for AccessPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for step in &self.0 {
            match step {
                Step::Tag(tag) => write!(f, "{}", tag)?,
                Step::Item(index) => write!(f, "[{}]", index)?,
            }
        }
        Ok(())
    }
}

/// 解決途中のノード
enum Node<'a> {
    Record(&'a Record),
    Element(&'a Element),
}

/// パスをたどって要素を返す
///
/// 途中のキー欠落・範囲外・種類違いはすべて `Error::Lookup`
pub fn resolve<'a>(record: &'a Record, path: &AccessPath) -> Result<&'a Element> {
    let mut node = Node::Record(record);

    for step in &path.0 {
        node = match (node, step) {
            (Node::Record(rec), Step::Tag(tag)) => rec
                .get(*tag)
                .map(Node::Element)
                .ok_or_else(|| Error::Lookup(format!("{} in {}", tag, path)))?,
            (Node::Element(Element::Items(items)), Step::Item(index)) => items
                .get(*index)
                .map(Node::Record)
                .ok_or_else(|| Error::Lookup(format!("item {} in {}", index, path)))?,
            _ => return Err(Error::Lookup(format!("{} does not match the data layout", path))),
        };
    }

    match node {
        Node::Element(element) => Ok(element),
        Node::Record(_) => Err(Error::Lookup(format!("{} ends on a sequence item", path))),
    }
}

/// パスをたどって文字列値を返す
pub fn resolve_text<'a>(record: &'a Record, path: &AccessPath) -> Result<&'a str> {
    match resolve(record, path)? {
        Element::Text(value) => Ok(value.as_str()),
        Element::Items(_) => Err(Error::Lookup(format!("{} is a sequence", path))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEQ: Tag = Tag(0x0054, 0x0220);
    const MEANING: Tag = Tag(0x0008, 0x0104);

    fn path() -> AccessPath {
        AccessPath::new(vec![Step::Tag(SEQ), Step::Item(0), Step::Tag(MEANING)])
    }

    #[test]
    fn test_resolve_nested_text() {
        let record = Record::new().with_items(
            SEQ,
            vec![Record::new().with_text(MEANING, "cranio-caudal")],
        );
        assert_eq!(resolve_text(&record, &path()).unwrap(), "cranio-caudal");
    }

    #[test]
    fn test_resolve_missing_tag() {
        let record = Record::new();
        assert!(matches!(resolve(&record, &path()), Err(Error::Lookup(_))));
    }

    #[test]
    fn test_resolve_index_out_of_range() {
        let record = Record::new().with_items(SEQ, vec![]);
        assert!(matches!(resolve(&record, &path()), Err(Error::Lookup(_))));
    }

    #[test]
    fn test_resolve_index_on_text_is_lookup_error() {
        let record = Record::new().with_text(SEQ, "not a sequence");
        assert!(matches!(resolve(&record, &path()), Err(Error::Lookup(_))));
    }

    #[test]
    fn test_resolve_ending_on_item_is_error() {
        let record = Record::new().with_items(SEQ, vec![Record::new()]);
        let short = AccessPath::new(vec![Step::Tag(SEQ), Step::Item(0)]);
        assert!(resolve(&record, &short).is_err());
    }

    #[test]
    fn test_access_path_display() {
        assert_eq!(path().to_string(), "(0054,0220)[0](0008,0104)");
    }

    #[test]
    fn test_text_treats_empty_as_missing() {
        let record = Record::new().with_text(MEANING, "");
        assert_eq!(record.text(MEANING), None);
    }
}
