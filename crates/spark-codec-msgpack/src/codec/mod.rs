//! 编解码器契约与内置实现。
//!
//! # 教案式说明
//! - **定位 (Why)**：[`Codec`] 是构建管线的产物，也是缓存中存放的对象；它只依赖 [`Packer`] / [`Unpacker`]
//!   两个线缆原语，以及调用时传入的 [`CodecContext`]（用于按需获取元素编解码器）。
//! - **契约 (What)**：
//!   - 实现必须满足 `Send + Sync + 'static`，以便以 `Arc<dyn Codec<T>>` 在线程间共享；
//!   - `decode` 遇到结构非法的输入返回 `MalformedWireInput`，不得 panic。
//! - **子模块**：
//!   - [`scalar`]：上下文默认注册的标量编解码器；
//!   - [`collection`]：回调驱动的集合适配器；
//!   - [`polymorphic`]：按联合 Schema 携带标签的多态编解码器。

pub mod collection;
pub mod polymorphic;
pub mod scalar;

use std::any::type_name;
use std::fmt;

use crate::context::CodecContext;
use crate::error::Result;
use crate::wire::{Packer, Unpacker};

/// 类型 `T` 的编解码器。
pub trait Codec<T>: Send + Sync + 'static {
    /// 把 `value` 写入 `packer`。
    fn encode(&self, ctx: &CodecContext, packer: &mut dyn Packer, value: &T) -> Result<()>;

    /// 从 `unpacker` 读取一个完整的值。
    fn decode(&self, ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<T>;
}

impl<T: 'static> fmt::Debug for dyn Codec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Codec<{}>", type_name::<T>())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::codec::scalar::Int64Codec;

    #[test]
    fn shared_codecs_render_their_value_type() {
        let codec: Arc<dyn Codec<i64>> = Arc::new(Int64Codec);
        assert_eq!(format!("{codec:?}"), "Codec<i64>");

        let outcome: crate::Result<Arc<dyn Codec<i64>>> = Ok(codec);
        assert!(format!("{outcome:?}").starts_with("Ok(Codec<i64>"));
    }
}
