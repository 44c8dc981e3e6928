#![deny(unsafe_code)]
//! # spark-codec-msgpack
//!
//! ## 定位与职责（Why）
//! - 运行时编解码器构建管线：给定类型描述（集合类型、泛型类型，以及具体表示仍在生成中的类型），
//!   为紧凑二进制线缆格式构建编解码器，无需为每个类型手写实现。
//! - 管线只通过 [`wire::Packer`] / [`wire::Unpacker`] 与字节交互，随附一份 MessagePack 子集实现。
//!
//! ## 架构嵌入（Where）
//! - `metadata`：延迟类型句柄、延迟方法句柄与运行时类型模型；
//! - `codec`：[`Codec`] 契约、标量编解码器、回调驱动的集合适配器与多态联合编解码器；
//! - `context`：[`CodecContext`]，负责按 `(类型, Schema)` 缓存并保证每个键只构建一次；
//! - `schema`：决定元素子类型选取方式的 [`PolymorphismSchema`]；
//! - `error`：统一错误枚举 [`CodecError`] 与稳定错误码。
//!
//! ## 使用方式（How）
//! 1. 为目标类型身份注册规划器（[`CodecContext::register_planner_fn`]）；
//! 2. 调用 [`CodecContext::get_or_build`] 或便捷的 [`CodecContext::pack`] / [`CodecContext::unpack`]；
//! 3. 集合类型返回 [`CodecPlan::Collection`]，由上下文包装为 [`codec::collection::CallbackCollectionCodec`]。

pub mod codec;
pub mod config;
pub mod context;
pub mod error;
pub mod metadata;
pub mod schema;
pub mod wire;

mod memo;

pub use codec::Codec;
pub use codec::collection::{AppendFn, CallbackCollectionCodec, CollectionPlan, SequenceContainer};
pub use codec::polymorphic::{RuntimeTyped, UnionCodec};
pub use config::CodecContextConfig;
pub use context::{CodecContext, CodecKey, CodecPlan, DeferredCodec, Planner};
pub use error::{CodecError, Result, codes};
pub use metadata::{
    MethodBody, MethodHandle, ResolvedMethod, RuntimeMethod, RuntimeType, TypeHandle, TypeIdentity,
    TypeShape, well_known,
};
pub use schema::{PolymorphismKind, PolymorphismSchema};
