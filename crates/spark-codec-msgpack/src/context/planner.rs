//! 规划器接口：缓存未命中时决定如何为目标类型构造编解码器。
//!
//! # 教案式说明
//! - **定位 (Why)**：上下文不关心具体类型如何编排字段，只负责“按键构建一次并缓存”；
//!   规划策略由调用方按类型身份注册。
//! - **契约 (What)**：
//!   - [`Planner::plan`] 返回 [`CodecPlan`]：现成的编解码器，或一份集合装配计划；
//!   - 集合计划由上下文调用 [`ErasedCollectionPlan::into_codec`] 包装成 [`CallbackCollectionCodec`]，
//!     缺失必需回调的错误在此时返回；
//!   - 规划器收到被请求的目标句柄，注册在开放泛型定义上的规划器据此读取泛型实参，
//!     一个规划器即可服务多个实例化；
//!   - 规划器可以在内部再次调用 `CodecContext::get_or_build`，递归请求会观察到占位编解码器。
//! - **执行 (How)**：闭包经 [`FnPlanner`] 适配为规划器，与 `TypedCodecFactory` 包装构造闭包的方式一致。

use std::marker::PhantomData;
use std::sync::Arc;

use crate::codec::Codec;
use crate::codec::collection::{CallbackCollectionCodec, CollectionPlan, SequenceContainer};
use crate::context::CodecContext;
use crate::error::Result;
use crate::metadata::{TypeHandle, TypeIdentity};
use crate::schema::PolymorphismSchema;

/// 类型 `T` 的规划器。
pub trait Planner<T>: Send + Sync + 'static {
    /// 为 `target` 在 `schema` 下给出构造方案。
    fn plan(
        &self,
        ctx: &CodecContext,
        target: &TypeHandle,
        schema: &PolymorphismSchema,
    ) -> Result<CodecPlan<T>>;
}

/// 把闭包包装为 [`Planner`]。
pub struct FnPlanner<T, F> {
    plan: F,
    _marker: PhantomData<fn() -> T>,
}

impl<T, F> FnPlanner<T, F>
where
    F: Fn(&CodecContext, &TypeHandle, &PolymorphismSchema) -> Result<CodecPlan<T>> + Send + Sync + 'static,
{
    pub fn new(plan: F) -> Self {
        Self {
            plan,
            _marker: PhantomData,
        }
    }
}

impl<T, F> Planner<T> for FnPlanner<T, F>
where
    T: 'static,
    F: Fn(&CodecContext, &TypeHandle, &PolymorphismSchema) -> Result<CodecPlan<T>> + Send + Sync + 'static,
{
    fn plan(
        &self,
        ctx: &CodecContext,
        target: &TypeHandle,
        schema: &PolymorphismSchema,
    ) -> Result<CodecPlan<T>> {
        (self.plan)(ctx, target, schema)
    }
}

/// 规划结果。
pub enum CodecPlan<T> {
    /// 已可直接使用的编解码器。
    Codec(Arc<dyn Codec<T>>),
    /// 待上下文包装的集合装配计划。
    Collection(Box<dyn ErasedCollectionPlan<T>>),
}

impl<T: 'static> CodecPlan<T> {
    /// 直接给出编解码器。
    pub fn codec(codec: impl Codec<T>) -> Self {
        CodecPlan::Codec(Arc::new(codec))
    }

    /// 给出集合装配计划，由上下文校验并包装。
    pub fn collection<E>(plan: CollectionPlan<T, E>) -> Self
    where
        T: SequenceContainer<E>,
        E: Send + Sync + 'static,
    {
        CodecPlan::Collection(Box::new(plan))
    }

    pub(crate) fn into_codec(self, schema: &PolymorphismSchema) -> Result<Arc<dyn Codec<T>>> {
        match self {
            CodecPlan::Codec(codec) => Ok(codec),
            CodecPlan::Collection(plan) => plan.into_codec(schema),
        }
    }
}

/// 元素类型被擦除的集合装配计划。
pub trait ErasedCollectionPlan<T>: Send {
    fn container_type(&self) -> &TypeIdentity;

    /// 校验回调并包装为集合编解码器。
    fn into_codec(self: Box<Self>, schema: &PolymorphismSchema) -> Result<Arc<dyn Codec<T>>>;
}

impl<C, E> ErasedCollectionPlan<C> for CollectionPlan<C, E>
where
    C: SequenceContainer<E>,
    E: Send + Sync + 'static,
{
    fn container_type(&self) -> &TypeIdentity {
        CollectionPlan::container_type(self)
    }

    fn into_codec(self: Box<Self>, schema: &PolymorphismSchema) -> Result<Arc<dyn Codec<C>>> {
        let codec: CallbackCollectionCodec<C, E> = (*self).build(schema.clone())?;
        Ok(Arc::new(codec))
    }
}
