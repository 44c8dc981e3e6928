//! 编解码上下文：`(类型, Schema) → 编解码器` 缓存与构建一次保证。
//!
//! # 教案式说明
//! - **定位 (Why)**：同一类型在一个进程内只应规划一次；递归类型（如 `Node` 持有 `List<Node>`）
//!   在规划自身时会再次请求自己，必须得到一个可用的引用而不是无限递归。
//! - **执行 (How)**：
//!   1. 无锁查表（`DashMap`），命中且已填充则直接返回；
//!   2. 否则获取全局可重入构建锁，再次查表；
//!   3. 为键插入（或复用）槽位；槽位正在构建说明是同一线程的递归请求，返回 [`DeferredCodec`]；
//!   4. 按 Schema 分派：`Known` 重定向到子类型、`Union` 交给多态根、`Default` 运行注册的规划器；
//!   5. 集合计划包装为 [`crate::codec::collection::CallbackCollectionCodec`]，填充槽位后返回。
//! - **契约 (What)**：
//!   - 每个键的规划器至多成功运行一次，所有调用方观察到同一个 `Arc`；
//!   - 构建失败不留下编解码器，键仍视为未缓存，可以重试；若失败期间已有占位编解码器引用该槽位，
//!     槽位保留，重试填充同一个槽位，占位编解码器随之可用；否则槽位被移除；
//!   - 单一构建锁串行化所有构建，不同键之间的互相递归不会跨线程死锁。

mod deferred;
pub mod planner;

use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use dashmap::DashMap;
use parking_lot::ReentrantMutex;

use crate::codec::Codec;
use crate::codec::polymorphic::{RuntimeTyped, UnionCodec};
use crate::codec::scalar::{
    BinaryCodec, BoolCodec, Int32Codec, Int64Codec, StringCodec, UInt64Codec,
};
use crate::config::CodecContextConfig;
use crate::error::{CodecError, Result};
use crate::metadata::{RuntimeType, TypeHandle, TypeIdentity, well_known};
use crate::schema::{PolymorphismKind, PolymorphismSchema};
use crate::wire::{MsgPackReader, MsgPackWriter, Unpacker};

use self::deferred::{CodecSlot, ErasedSlot};
pub use self::deferred::DeferredCodec;
pub use self::planner::{CodecPlan, ErasedCollectionPlan, FnPlanner, Planner};

/// 缓存键：目标类型身份与多态 Schema，均为结构化比较。
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CodecKey {
    target: TypeIdentity,
    schema: PolymorphismSchema,
}

impl CodecKey {
    pub fn new(target: TypeIdentity, schema: PolymorphismSchema) -> Self {
        Self { target, schema }
    }

    pub fn target(&self) -> &TypeIdentity {
        &self.target
    }

    pub fn schema(&self) -> &PolymorphismSchema {
        &self.schema
    }
}

struct UnionRoot<T> {
    build: fn(TypeIdentity, PolymorphismSchema) -> Arc<dyn Codec<T>>,
}

fn build_union<T>(declared: TypeIdentity, schema: PolymorphismSchema) -> Arc<dyn Codec<T>>
where
    T: RuntimeTyped + Send + Sync + 'static,
{
    Arc::new(UnionCodec::<T>::new(declared, schema))
}

/// 编解码上下文。
///
/// `CodecContext::new` 注册内置标量编解码器（见 [`well_known`]）；缓存、规划器表与句柄表的生命周期
/// 与上下文一致，[`CodecContext::clear`] 只清空缓存。
pub struct CodecContext {
    config: CodecContextConfig,
    codecs: DashMap<CodecKey, Arc<dyn ErasedSlot>>,
    planners: DashMap<TypeIdentity, Arc<dyn Any + Send + Sync>>,
    union_roots: DashMap<TypeIdentity, Arc<dyn Any + Send + Sync>>,
    handles: DashMap<TypeIdentity, TypeHandle>,
    build_lock: ReentrantMutex<()>,
}

impl CodecContext {
    pub fn new() -> Self {
        Self::with_config(CodecContextConfig::default())
    }

    pub fn with_config(config: CodecContextConfig) -> Self {
        let ctx = Self {
            config,
            codecs: DashMap::new(),
            planners: DashMap::new(),
            union_roots: DashMap::new(),
            handles: DashMap::new(),
            build_lock: ReentrantMutex::new(()),
        };
        ctx.register_builtins();
        ctx
    }

    fn register_builtins(&self) {
        self.register_codec::<bool>(well_known::boolean(), BoolCodec);
        self.register_codec::<i32>(well_known::int32(), Int32Codec);
        self.register_codec::<i64>(well_known::int64(), Int64Codec);
        self.register_codec::<u64>(well_known::uint64(), UInt64Codec);
        self.register_codec::<String>(well_known::string(), StringCodec);
        self.register_codec::<Vec<u8>>(well_known::binary(), BinaryCodec);
    }

    pub fn config(&self) -> &CodecContextConfig {
        &self.config
    }

    /// 为目标身份注册规划器，覆盖同一身份上已有的规划器；已缓存的编解码器不受影响。
    ///
    /// 注册在开放泛型定义（无实参）上的规划器服务该定义的全部实例化，
    /// 除非某个实例化另有精确注册。规划器按 Rust 值类型 `T` 存放，
    /// 同一定义的实例化须共享同一个 `T`。
    pub fn register_planner<T: 'static>(&self, target: TypeIdentity, planner: impl Planner<T>) {
        let planner: Arc<dyn Planner<T>> = Arc::new(planner);
        self.planners.insert(target, Arc::new(planner));
    }

    /// 以闭包注册规划器。
    pub fn register_planner_fn<T, F>(&self, target: TypeIdentity, plan: F)
    where
        T: 'static,
        F: Fn(&CodecContext, &TypeHandle, &PolymorphismSchema) -> Result<CodecPlan<T>> + Send + Sync + 'static,
    {
        self.register_planner(target, FnPlanner::new(plan));
    }

    /// 注册现成的编解码器；每个 Schema 下都返回同一实例。
    pub fn register_codec<T: 'static>(&self, target: TypeIdentity, codec: impl Codec<T>) {
        let codec: Arc<dyn Codec<T>> = Arc::new(codec);
        self.register_planner_fn(target, move |_, _, _| Ok(CodecPlan::Codec(Arc::clone(&codec))));
    }

    /// 把 `declared` 登记为多态根：`Union` Schema 下其编解码器为 [`UnionCodec<T>`]。
    pub fn register_polymorphic_root<T>(&self, declared: TypeIdentity)
    where
        T: RuntimeTyped + Send + Sync + 'static,
    {
        let root = UnionRoot::<T> {
            build: build_union::<T>,
        };
        self.union_roots.insert(declared, Arc::new(root));
    }

    /// 返回身份对应的共享句柄；同一身份总是得到共享槽位的句柄。
    pub fn type_handle(&self, identity: TypeIdentity) -> TypeHandle {
        if let Some(existing) = self.handles.get(&identity) {
            return existing.value().clone();
        }
        self.handles
            .entry(identity.clone())
            .or_insert_with(|| TypeHandle::new(identity))
            .value()
            .clone()
    }

    /// 把运行时类型绑定到共享句柄上。
    pub fn register_type(&self, runtime: Arc<RuntimeType>) -> Result<TypeHandle> {
        let handle = self.type_handle(runtime.identity().clone());
        handle.realize(runtime)?;
        Ok(handle)
    }

    /// 获取或构建 `(target, schema)` 的编解码器。
    pub fn get_or_build<T: 'static>(
        &self,
        target: &TypeHandle,
        schema: &PolymorphismSchema,
    ) -> Result<Arc<dyn Codec<T>>> {
        let key = CodecKey::new(target.identity().clone(), schema.clone());
        if let Some(slot) = self.cached_slot::<T>(&key)?
            && let Some(codec) = slot.codec()
        {
            return Ok(codec);
        }

        let _build = self.build_lock.lock();
        let slot = self.slot_for::<T>(&key)?;
        if let Some(codec) = slot.codec() {
            return Ok(codec);
        }
        if slot.is_building() {
            tracing::trace!(
                type_name = %key.target.full_name(),
                schema = %key.schema,
                "recursive request observes placeholder codec"
            );
            return Ok(Arc::new(DeferredCodec::new(&slot)));
        }

        tracing::debug!(
            type_name = %key.target.full_name(),
            schema = %key.schema,
            "codec cache miss, planning"
        );
        let outcome = {
            let _building = slot.begin_build();
            self.plan::<T>(target, schema)
        };
        match outcome {
            Ok(codec) => {
                slot.fill(Arc::clone(&codec));
                tracing::debug!(
                    type_name = %key.target.full_name(),
                    schema = %key.schema,
                    "codec built"
                );
                Ok(codec)
            }
            Err(err) => {
                tracing::debug!(
                    type_name = %key.target.full_name(),
                    schema = %key.schema,
                    code = err.code(),
                    error = %err,
                    "codec planning failed"
                );
                // 没有占位编解码器引用槽位时移除，避免错误类型的请求占住该键。
                if Arc::weak_count(&slot) == 0 {
                    self.codecs.remove(&key);
                }
                Err(err)
            }
        }
    }

    fn plan<T: 'static>(
        &self,
        target: &TypeHandle,
        schema: &PolymorphismSchema,
    ) -> Result<Arc<dyn Codec<T>>> {
        match schema.kind() {
            PolymorphismKind::Known(subtype) => {
                let redirected = schema.clone().with_kind(PolymorphismKind::Default);
                self.get_or_build::<T>(&self.type_handle(subtype.clone()), &redirected)
            }
            PolymorphismKind::Union(_) => {
                let identity = target.identity();
                let root = self
                    .union_roots
                    .get(identity)
                    .map(|entry| Arc::clone(entry.value()))
                    .ok_or_else(|| CodecError::PlannerNotRegistered {
                        type_name: format!("{} (polymorphic root)", identity.full_name()),
                    })?;
                let root = root
                    .downcast_ref::<UnionRoot<T>>()
                    .ok_or_else(|| type_mismatch::<T>(identity))?;
                Ok((root.build)(identity.clone(), schema.clone()))
            }
            PolymorphismKind::Default => {
                let planner = self.planner::<T>(target.identity())?;
                planner.plan(self, target, schema)?.into_codec(schema)
            }
        }
    }

    /// 精确身份优先；泛型实例化回退到其开放定义上的规划器。
    fn planner<T: 'static>(&self, target: &TypeIdentity) -> Result<Arc<dyn Planner<T>>> {
        let exact = self.planners.get(target).map(|entry| Arc::clone(entry.value()));
        let entry = match exact {
            Some(entry) => entry,
            None if target.is_generic() => self
                .planners
                .get(&target.definition())
                .map(|entry| Arc::clone(entry.value()))
                .ok_or_else(|| CodecError::PlannerNotRegistered {
                    type_name: target.full_name(),
                })?,
            None => {
                return Err(CodecError::PlannerNotRegistered {
                    type_name: target.full_name(),
                });
            }
        };
        entry
            .downcast_ref::<Arc<dyn Planner<T>>>()
            .cloned()
            .ok_or_else(|| type_mismatch::<T>(target))
    }

    fn cached_slot<T: 'static>(&self, key: &CodecKey) -> Result<Option<Arc<CodecSlot<T>>>> {
        let Some(slot) = self.codecs.get(key).map(|entry| Arc::clone(entry.value())) else {
            return Ok(None);
        };
        downcast_slot::<T>(slot, &key.target).map(Some)
    }

    fn slot_for<T: 'static>(&self, key: &CodecKey) -> Result<Arc<CodecSlot<T>>> {
        let slot = self
            .codecs
            .entry(key.clone())
            .or_insert_with(|| Arc::new(CodecSlot::<T>::new(key.target.clone())) as Arc<dyn ErasedSlot>)
            .value()
            .clone();
        downcast_slot::<T>(slot, &key.target)
    }

    /// 已构建完成的编解码器数量。
    pub fn len(&self) -> usize {
        self.codecs
            .iter()
            .filter(|entry| entry.value().is_filled())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 键是否已有构建完成的编解码器。
    pub fn contains(&self, key: &CodecKey) -> bool {
        self.codecs
            .get(key)
            .is_some_and(|entry| entry.value().is_filled())
    }

    /// 清空缓存；规划器、多态根与句柄表保留。
    ///
    /// 等待进行中的构建结束后执行，已分发的占位编解码器此后返回 `CodecNotReady`。
    pub fn clear(&self) {
        let _build = self.build_lock.lock();
        self.codecs.clear();
    }

    /// 以 `(target, schema)` 的编解码器把值写成 MessagePack 字节。
    pub fn pack<T: 'static>(
        &self,
        target: &TypeHandle,
        schema: &PolymorphismSchema,
        value: &T,
    ) -> Result<Bytes> {
        let codec = self.get_or_build::<T>(target, schema)?;
        let mut writer = MsgPackWriter::new();
        codec.encode(self, &mut writer, value)?;
        Ok(writer.freeze())
    }

    /// 从 MessagePack 字节解出一个完整值，尾部多余字节视为数据错误。
    pub fn unpack<T: 'static>(
        &self,
        target: &TypeHandle,
        schema: &PolymorphismSchema,
        bytes: impl Into<Bytes>,
    ) -> Result<T> {
        let codec = self.get_or_build::<T>(target, schema)?;
        let mut reader = MsgPackReader::new(bytes);
        let value = codec.decode(self, &mut reader)?;
        if !reader.is_exhausted() {
            return Err(CodecError::malformed(
                reader.position(),
                format!("{} trailing byte(s) after value", reader.remaining()),
            ));
        }
        Ok(value)
    }
}

impl Default for CodecContext {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for CodecContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodecContext")
            .field("config", &self.config)
            .field("codecs", &self.len())
            .field("planners", &self.planners.len())
            .field("union_roots", &self.union_roots.len())
            .finish()
    }
}

fn type_mismatch<T>(target: &TypeIdentity) -> CodecError {
    CodecError::CodecTypeMismatch {
        type_name: target.full_name(),
        requested: type_name::<T>(),
    }
}

fn downcast_slot<T: 'static>(
    slot: Arc<dyn ErasedSlot>,
    target: &TypeIdentity,
) -> Result<Arc<CodecSlot<T>>> {
    slot.into_any()
        .downcast::<CodecSlot<T>>()
        .map_err(|_| type_mismatch::<T>(target))
}

#[cfg(test)]
mod tests {
    use tracing_test::traced_test;

    use super::*;
    use crate::error::codes;

    #[traced_test]
    #[test]
    fn cache_miss_is_logged_once() {
        let ctx = CodecContext::new();
        let int64 = ctx.type_handle(well_known::int64());
        let default = PolymorphismSchema::default();

        ctx.get_or_build::<i64>(&int64, &default).unwrap();
        ctx.get_or_build::<i64>(&int64, &default).unwrap();

        assert!(logs_contain("codec cache miss, planning"));
        logs_assert(|lines: &[&str]| {
            match lines
                .iter()
                .filter(|line| line.contains("codec built"))
                .count()
            {
                1 => Ok(()),
                n => Err(format!("expected exactly one build, saw {n}")),
            }
        });
    }

    #[test]
    fn builtin_codecs_are_built_lazily() {
        let ctx = CodecContext::new();
        assert!(ctx.is_empty());

        let key = CodecKey::new(well_known::string(), PolymorphismSchema::default());
        let string = ctx.type_handle(well_known::string());
        let bytes = ctx
            .pack(&string, key.schema(), &"hello".to_owned())
            .unwrap();
        assert!(ctx.contains(&key));
        assert_eq!(ctx.len(), 1);

        let back: String = ctx.unpack(&string, key.schema(), bytes).unwrap();
        assert_eq!(back, "hello");

        ctx.clear();
        assert!(!ctx.contains(&key));
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let ctx = CodecContext::new();
        let int64 = ctx.type_handle(well_known::int64());
        let err = ctx
            .unpack::<i64>(&int64, &PolymorphismSchema::default(), vec![0x01, 0x02])
            .unwrap_err();
        assert_eq!(err.code(), codes::MALFORMED_INPUT);
    }

    #[test]
    fn interned_handles_share_realization() {
        let ctx = CodecContext::new();
        let identity = TypeIdentity::new("Demo", "Bag");
        let handle = ctx.type_handle(identity.clone());
        ctx.register_type(RuntimeType::opaque(identity.clone())).unwrap();
        assert!(handle.is_realized());
        assert!(ctx.type_handle(identity).is_realized());
    }
}
