//! 编解码上下文的运行参数。
//!
//! 配置通过 `serde` 反序列化，任何字段缺省时取 [`CodecContextConfig::default`] 中的值，
//! 因此一份空文档即为合法配置。

/// 默认的集合长度上限。
pub const DEFAULT_MAX_COLLECTION_LENGTH: usize = 1 << 24;

/// 默认的预分配上限。
pub const DEFAULT_PREALLOCATION_LIMIT: usize = 4096;

/// [`crate::CodecContext`] 的配置。
///
/// # 契约说明（What）
/// - `max_collection_length`：定长数组头声明的元素数超过该值即返回 `LimitExceeded`；不定长数组在读到第
///   `max_collection_length + 1` 个元素时同样返回 `LimitExceeded`；
/// - `preallocation_limit`：传给 *create* 回调的容量提示取 `min(元素数, preallocation_limit)`，
///   防止恶意长度头触发超大预分配；
/// - `allow_unknown_length`：为 `false` 时不定长数组头直接视为 `MalformedWireInput`。
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CodecContextConfig {
    pub max_collection_length: usize,
    pub preallocation_limit: usize,
    pub allow_unknown_length: bool,
}

impl Default for CodecContextConfig {
    fn default() -> Self {
        Self {
            max_collection_length: DEFAULT_MAX_COLLECTION_LENGTH,
            preallocation_limit: DEFAULT_PREALLOCATION_LIMIT,
            allow_unknown_length: true,
        }
    }
}

impl CodecContextConfig {
    pub fn with_max_collection_length(mut self, limit: usize) -> Self {
        self.max_collection_length = limit;
        self
    }

    pub fn with_preallocation_limit(mut self, limit: usize) -> Self {
        self.preallocation_limit = limit;
        self
    }

    pub fn with_unknown_length(mut self, allowed: bool) -> Self {
        self.allow_unknown_length = allowed;
        self
    }

    /// 容量提示：`min(count, preallocation_limit)`。
    pub fn capacity_hint(&self, count: usize) -> usize {
        count.min(self.preallocation_limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config: CodecContextConfig = toml::from_str("").expect("空配置应当合法");
        assert_eq!(config, CodecContextConfig::default());
    }

    #[test]
    fn partial_document_overrides_selected_fields() {
        let config: CodecContextConfig = toml::from_str(
            r#"
            max_collection_length = 16
            allow_unknown_length = false
            "#,
        )
        .expect("部分字段配置应当合法");
        assert_eq!(config.max_collection_length, 16);
        assert_eq!(config.preallocation_limit, DEFAULT_PREALLOCATION_LIMIT);
        assert!(!config.allow_unknown_length);
        assert_eq!(config.capacity_hint(10_000), DEFAULT_PREALLOCATION_LIMIT);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let result = toml::from_str::<CodecContextConfig>("max_items = 3");
        assert!(result.is_err());
    }
}
