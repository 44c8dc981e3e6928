//! 多态 Schema：决定解码时元素的具体运行时子类型如何选取。
//!
//! # 教案式说明
//! - **定位 (Why)**：同一个声明类型在不同位置可能需要不同的子类型选择策略，Schema 因此是缓存键的一部分，
//!   `(类型, Schema)` 不同即视为不同的编解码器。
//! - **契约 (What)**：
//!   - [`PolymorphismKind::Default`]：直接使用声明类型；
//!   - [`PolymorphismKind::Known`]：固定使用某个子类型；
//!   - [`PolymorphismKind::Union`]：线缆上携带标签，按标签表选择子类型；
//!   - 集合元素使用 `item` 子 Schema，字典键使用 `key` 子 Schema，缺省时均为 `Default`。
//! - **执行 (How)**：构造后不可变；相等与哈希为结构化比较，标签表使用有序映射保证哈希稳定。

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::metadata::TypeIdentity;

static DEFAULT_SCHEMA: PolymorphismSchema = PolymorphismSchema {
    kind: PolymorphismKind::Default,
    item: None,
    key: None,
};

/// 单个位置上的子类型选择策略。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub enum PolymorphismKind {
    #[default]
    Default,
    Known(TypeIdentity),
    /// 标签到子类型的映射。
    Union(BTreeMap<Arc<str>, TypeIdentity>),
}

/// 多态 Schema。
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PolymorphismSchema {
    kind: PolymorphismKind,
    item: Option<Arc<PolymorphismSchema>>,
    key: Option<Arc<PolymorphismSchema>>,
}

impl PolymorphismSchema {
    /// 进程级共享的默认 Schema。
    pub fn default_ref() -> &'static PolymorphismSchema {
        &DEFAULT_SCHEMA
    }

    /// 固定子类型。
    pub fn known(subtype: TypeIdentity) -> Self {
        Self::default().with_kind(PolymorphismKind::Known(subtype))
    }

    /// 标签联合；重复标签以后者为准。
    pub fn union<I, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (S, TypeIdentity)>,
        S: Into<Arc<str>>,
    {
        let table = entries
            .into_iter()
            .map(|(tag, subtype)| (tag.into(), subtype))
            .collect();
        Self::default().with_kind(PolymorphismKind::Union(table))
    }

    /// 仅约束集合元素的 Schema，容器本身保持默认。
    pub fn for_collection_items(item: PolymorphismSchema) -> Self {
        Self::default().with_item_schema(item)
    }

    pub fn with_kind(mut self, kind: PolymorphismKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_item_schema(mut self, item: PolymorphismSchema) -> Self {
        self.item = Some(Arc::new(item));
        self
    }

    pub fn with_key_schema(mut self, key: PolymorphismSchema) -> Self {
        self.key = Some(Arc::new(key));
        self
    }

    pub fn kind(&self) -> &PolymorphismKind {
        &self.kind
    }

    pub fn is_default(&self) -> bool {
        *self == DEFAULT_SCHEMA
    }

    /// 集合元素的 Schema，未指定时为默认 Schema。
    pub fn item_schema(&self) -> &PolymorphismSchema {
        self.item.as_deref().unwrap_or(&DEFAULT_SCHEMA)
    }

    /// 字典键的 Schema，未指定时为默认 Schema。
    pub fn key_schema(&self) -> &PolymorphismSchema {
        self.key.as_deref().unwrap_or(&DEFAULT_SCHEMA)
    }

    /// 联合 Schema 下子类型对应的标签。
    pub fn tag_of(&self, subtype: &TypeIdentity) -> Option<&str> {
        match &self.kind {
            PolymorphismKind::Union(table) => table
                .iter()
                .find(|(_, candidate)| *candidate == subtype)
                .map(|(tag, _)| tag.as_ref()),
            _ => None,
        }
    }

    /// 联合 Schema 下标签对应的子类型。
    pub fn type_for_tag(&self, tag: &str) -> Option<&TypeIdentity> {
        match &self.kind {
            PolymorphismKind::Union(table) => table.get(tag),
            _ => None,
        }
    }
}

impl fmt::Display for PolymorphismSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            PolymorphismKind::Default => f.write_str("default")?,
            PolymorphismKind::Known(subtype) => write!(f, "known({subtype})")?,
            PolymorphismKind::Union(table) => {
                f.write_str("union[")?;
                for (index, (tag, subtype)) in table.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{tag}={subtype}")?;
                }
                f.write_str("]")?;
            }
        }
        if let Some(item) = &self.item {
            write!(f, " items: {item}")?;
        }
        if let Some(key) = &self.key {
            write!(f, " keys: {key}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;

    fn circle() -> TypeIdentity {
        TypeIdentity::new("Demo.Shapes", "Circle")
    }

    fn square() -> TypeIdentity {
        TypeIdentity::new("Demo.Shapes", "Square")
    }

    #[test]
    fn union_lookup_works_both_ways() {
        let schema = PolymorphismSchema::union([("c", circle()), ("s", square())]);
        assert_eq!(schema.tag_of(&square()), Some("s"));
        assert_eq!(schema.type_for_tag("c"), Some(&circle()));
        assert_eq!(schema.type_for_tag("t"), None);
        assert_eq!(schema.to_string(), "union[c=Circle, s=Square]");
    }

    #[test]
    fn missing_item_schema_is_default() {
        let schema = PolymorphismSchema::known(circle());
        assert!(schema.item_schema().is_default());
        assert!(!schema.is_default());

        let nested = PolymorphismSchema::for_collection_items(schema.clone());
        assert_eq!(nested.item_schema(), &schema);
        assert!(nested.key_schema().is_default());
    }

    #[test]
    fn structurally_equal_schemas_share_a_key() {
        let a = PolymorphismSchema::union([("s", square()), ("c", circle())]);
        let b = PolymorphismSchema::union([("c", circle()), ("s", square())]);
        let set: HashSet<_> = [a, b, PolymorphismSchema::default()].into_iter().collect();
        assert_eq!(set.len(), 2);
    }
}
