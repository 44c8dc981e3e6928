//! 缓存槽位与占位编解码器。
//!
//! 每个 `(类型, Schema)` 键在缓存中对应一个 [`CodecSlot`]。构建开始前槽位已经可见，
//! 同一线程上的递归请求拿到指向该槽位的 [`DeferredCodec`]，槽位填充后占位编解码器自动转发。

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock, Weak};

use crate::codec::Codec;
use crate::context::CodecContext;
use crate::error::{CodecError, Result};
use crate::metadata::TypeIdentity;
use crate::wire::{Packer, Unpacker};

/// 擦除元素类型后的槽位视图，供缓存统计与下转型使用。
pub(crate) trait ErasedSlot: Any + Send + Sync {
    fn is_filled(&self) -> bool;

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

pub(crate) struct CodecSlot<T> {
    target: TypeIdentity,
    codec: OnceLock<Arc<dyn Codec<T>>>,
    building: AtomicBool,
}

impl<T: 'static> CodecSlot<T> {
    pub(crate) fn new(target: TypeIdentity) -> Self {
        Self {
            target,
            codec: OnceLock::new(),
            building: AtomicBool::new(false),
        }
    }

    pub(crate) fn codec(&self) -> Option<Arc<dyn Codec<T>>> {
        self.codec.get().cloned()
    }

    /// 填充槽位；构建由全局构建锁串行化，槽位在此之前必然为空。
    pub(crate) fn fill(&self, codec: Arc<dyn Codec<T>>) {
        let _ = self.codec.set(codec);
    }

    pub(crate) fn is_building(&self) -> bool {
        self.building.load(Ordering::Acquire)
    }

    /// 标记构建开始；返回的守卫在析构时清除标记，规划器 panic 时同样生效。
    pub(crate) fn begin_build(&self) -> BuildingGuard<'_> {
        self.building.store(true, Ordering::Release);
        BuildingGuard {
            flag: &self.building,
        }
    }
}

impl<T: 'static> ErasedSlot for CodecSlot<T> {
    fn is_filled(&self) -> bool {
        self.codec.get().is_some()
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

pub(crate) struct BuildingGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// 占位编解码器。
///
/// # 契约说明（What）
/// - 槽位填充后，所有调用转发给最终编解码器；
/// - 槽位尚未填充（或所在缓存已被清空）时调用返回 [`CodecError::CodecNotReady`]；
/// - 只持有槽位的弱引用，递归类型的编解码器之间不会形成引用环。
pub struct DeferredCodec<T> {
    target: TypeIdentity,
    slot: Weak<CodecSlot<T>>,
}

impl<T: 'static> DeferredCodec<T> {
    pub(crate) fn new(slot: &Arc<CodecSlot<T>>) -> Self {
        Self {
            target: slot.target.clone(),
            slot: Arc::downgrade(slot),
        }
    }

    pub fn target(&self) -> &TypeIdentity {
        &self.target
    }

    /// 槽位是否已经填充。
    pub fn is_ready(&self) -> bool {
        self.resolved().is_ok()
    }

    fn resolved(&self) -> Result<Arc<dyn Codec<T>>> {
        self.slot
            .upgrade()
            .and_then(|slot| slot.codec())
            .ok_or_else(|| CodecError::CodecNotReady {
                type_name: self.target.full_name(),
            })
    }
}

impl<T: 'static> Codec<T> for DeferredCodec<T> {
    fn encode(&self, ctx: &CodecContext, packer: &mut dyn Packer, value: &T) -> Result<()> {
        self.resolved()?.encode(ctx, packer, value)
    }

    fn decode(&self, ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<T> {
        self.resolved()?.decode(ctx, unpacker)
    }
}

impl<T> fmt::Debug for DeferredCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredCodec")
            .field("target", &self.target.full_name())
            .finish()
    }
}
