//! 回调驱动的集合编解码适配器。
//!
//! # 教案式说明
//! - **定位 (Why)**：任何有序集合都可以由同一个适配器处理，规划器只需注入“如何创建容器”“如何解码一个元素”
//!   等少量回调，不必为每种集合手写编解码器。
//! - **契约 (What)**：
//!   - *create*、*decode-whole*、*decode-item* 为必需回调，缺失时 [`CollectionPlan::build`] 返回
//!     `MissingRequiredCallback`，错误在构造阶段而非解码中途出现；
//!   - *add* 缺省时回落到容器自身的追加能力（[`SequenceContainer::append`]，对 `Extend<E>` 自动实现）；
//!     也可以经 [`CollectionPlan::add_via`] 绑定到一个延迟方法句柄，首次使用时解析；
//!   - *decode-into* 之前总是先由适配器读数组头并校验长度上限，回调收到元素数量；
//!     缺省时回落到逐个调用 *decode-item*；
//!   - *decode-item* 被两个解码入口共享。
//! - **执行 (How)**：所有回调都以 `(适配器, 上下文, ...)` 为前几个参数，回调内部可以调用适配器上的
//!   [`CallbackCollectionCodec::read_header`]、[`CallbackCollectionCodec::unpack_items`]、
//!   [`CallbackCollectionCodec::decode_element`] 等辅助方法组合出完整流程。

use std::fmt;
use std::sync::{Arc, OnceLock};

use super::Codec;
use crate::context::CodecContext;
use crate::error::{CodecError, Result};
use crate::metadata::{MethodHandle, TypeHandle, TypeIdentity};
use crate::schema::PolymorphismSchema;
use crate::wire::{ItemCount, Packer, Unpacker};

/// 适配器对容器的最低要求：能追加、能计数、能按顺序遍历。
///
/// 对所有 `Extend<E>` 且 `&C: IntoIterator<Item = &E>` 的容器自动实现，`Vec`、`VecDeque`、`HashSet`、
/// `BTreeSet` 等标准容器开箱即用；自定义容器手动实现即可。
pub trait SequenceContainer<E>: Send + Sync + 'static {
    /// 容器固有的追加操作。
    fn append(&mut self, item: E);

    fn item_count(&self) -> usize;

    /// 按容器顺序访问每个元素，访问函数返回错误时立即停止。
    fn for_each_item(&self, visit: &mut dyn FnMut(&E) -> Result<()>) -> Result<()>;
}

impl<C, E> SequenceContainer<E> for C
where
    C: Extend<E> + Send + Sync + 'static,
    E: 'static,
    for<'a> &'a C: IntoIterator<Item = &'a E>,
{
    fn append(&mut self, item: E) {
        self.extend(std::iter::once(item));
    }

    fn item_count(&self) -> usize {
        IntoIterator::into_iter(self).count()
    }

    fn for_each_item(&self, visit: &mut dyn FnMut(&E) -> Result<()>) -> Result<()> {
        for item in self {
            visit(item)?;
        }
        Ok(())
    }
}

/// *create*：以容量提示创建空容器。
pub type CreateFn<C, E> =
    Box<dyn Fn(&CallbackCollectionCodec<C, E>, &CodecContext, usize) -> C + Send + Sync>;

/// *add*：把一个元素追加进容器。
pub type AddFn<C, E> = Box<
    dyn Fn(&CallbackCollectionCodec<C, E>, &CodecContext, &mut C, E) -> Result<()> + Send + Sync,
>;

/// *decode-whole*：从线缆读出一个完整容器。
pub type DecodeWholeFn<C, E> = Box<
    dyn Fn(&CallbackCollectionCodec<C, E>, &CodecContext, &mut dyn Unpacker) -> Result<C>
        + Send
        + Sync,
>;

/// *decode-into*：把线缆中的元素追加进已有容器；数组头已由适配器读出并校验。
pub type DecodeIntoFn<C, E> = Box<
    dyn Fn(
            &CallbackCollectionCodec<C, E>,
            &CodecContext,
            &mut dyn Unpacker,
            &mut C,
            ItemCount,
        ) -> Result<()>
        + Send
        + Sync,
>;

/// *decode-item*：读出第 `index` 个元素并放入容器。
pub type DecodeItemFn<C, E> = Box<
    dyn Fn(
            &CallbackCollectionCodec<C, E>,
            &CodecContext,
            &mut dyn Unpacker,
            &mut C,
            usize,
        ) -> Result<()>
        + Send
        + Sync,
>;

/// *encode-item*：写出单个元素。
pub type EncodeItemFn<C, E> = Box<
    dyn Fn(&CallbackCollectionCodec<C, E>, &CodecContext, &mut dyn Packer, &E) -> Result<()>
        + Send
        + Sync,
>;

/// [`CollectionPlan::add_via`] 绑定的方法体类型。
///
/// 运行时方法以 `MethodBody::new(append_fn)` 登记该类型的值，解析后经
/// [`crate::metadata::ResolvedMethod::callable`] 还原。
pub type AppendFn<C, E> = Arc<dyn Fn(&mut C, E) + Send + Sync>;

enum AddSlot<C, E> {
    Callback(AddFn<C, E>),
    Method(MethodHandle),
}

/// 回调驱动的集合编解码器。
///
/// 由 [`CollectionPlan::build`] 构造；通常经 [`crate::context::CodecPlan::Collection`] 交给上下文包装，
/// 不直接实例化。元素编解码器在首次使用时从传入的上下文获取并缓存。
pub struct CallbackCollectionCodec<C, E> {
    container: TypeIdentity,
    element: TypeHandle,
    schema: PolymorphismSchema,
    create: CreateFn<C, E>,
    add: Option<AddSlot<C, E>>,
    decode_whole: DecodeWholeFn<C, E>,
    decode_into: Option<DecodeIntoFn<C, E>>,
    decode_item: DecodeItemFn<C, E>,
    encode_item: Option<EncodeItemFn<C, E>>,
    element_codec: OnceLock<Arc<dyn Codec<E>>>,
}

impl<C, E> CallbackCollectionCodec<C, E>
where
    C: SequenceContainer<E>,
    E: Send + Sync + 'static,
{
    /// 容器类型身份。
    pub fn container_type(&self) -> &TypeIdentity {
        &self.container
    }

    /// 元素类型句柄；元素编解码器按它与 [`Self::item_schema`] 从上下文获取。
    pub fn element_type(&self) -> &TypeHandle {
        &self.element
    }

    /// 容器位置上的多态 Schema，未指定时为默认 Schema。
    pub fn schema(&self) -> &PolymorphismSchema {
        &self.schema
    }

    /// 元素位置上的多态 Schema。
    pub fn item_schema(&self) -> &PolymorphismSchema {
        self.schema.item_schema()
    }

    /// 创建空容器；容量提示按配置的预分配上限截断。
    pub fn create(&self, ctx: &CodecContext, count_hint: usize) -> C {
        (self.create)(self, ctx, ctx.config().capacity_hint(count_hint))
    }

    /// 追加一个元素：自定义回调优先，其次绑定的方法句柄，最后是容器自身的追加。
    ///
    /// 绑定的方法句柄在此处首次解析，解析失败原样返回。
    pub fn add(&self, ctx: &CodecContext, container: &mut C, item: E) -> Result<()> {
        match &self.add {
            Some(AddSlot::Callback(add)) => add(self, ctx, container, item),
            Some(AddSlot::Method(method)) => {
                let resolved = method.resolve()?;
                let append = resolved.callable::<AppendFn<C, E>>()?;
                append(container, item);
                Ok(())
            }
            None => {
                container.append(item);
                Ok(())
            }
        }
    }

    /// 解出一个完整容器。
    pub fn decode_whole(&self, ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<C> {
        (self.decode_whole)(self, ctx, unpacker)
    }

    /// 把线缆中的元素追加进已有容器。
    ///
    /// 先读数组头，长度超出上限或未知长度被禁用时在调用回调前失败。
    pub fn decode_into(
        &self,
        ctx: &CodecContext,
        unpacker: &mut dyn Unpacker,
        container: &mut C,
    ) -> Result<()> {
        let count = self.read_header(ctx, unpacker)?;
        match &self.decode_into {
            Some(decode_into) => decode_into(self, ctx, unpacker, container, count),
            None => self.unpack_items(ctx, unpacker, container, count),
        }
    }

    /// 读出第 `index` 个元素并放入容器。
    pub fn decode_item(
        &self,
        ctx: &CodecContext,
        unpacker: &mut dyn Unpacker,
        container: &mut C,
        index: usize,
    ) -> Result<()> {
        (self.decode_item)(self, ctx, unpacker, container, index)
    }

    /// 读取数组头并按配置校验长度。
    pub fn read_header(&self, ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<ItemCount> {
        let start = unpacker.position();
        let count = unpacker.read_array_header()?;
        let config = ctx.config();
        match count {
            ItemCount::Known(len) if len > config.max_collection_length => {
                Err(CodecError::LimitExceeded {
                    type_name: self.container.to_string(),
                    limit: config.max_collection_length,
                    actual: len,
                })
            }
            ItemCount::Unknown if !config.allow_unknown_length => Err(CodecError::malformed(
                start,
                "unknown-length arrays are disabled by configuration",
            )),
            _ => Ok(count),
        }
    }

    /// 逐个解码元素：定长时恰好读 `n` 个，不定长时读到结束标记为止。
    pub fn unpack_items(
        &self,
        ctx: &CodecContext,
        unpacker: &mut dyn Unpacker,
        container: &mut C,
        count: ItemCount,
    ) -> Result<()> {
        match count {
            ItemCount::Known(len) => {
                for index in 0..len {
                    self.decode_item(ctx, unpacker, container, index)?;
                }
            }
            ItemCount::Unknown => {
                let limit = ctx.config().max_collection_length;
                let mut index = 0;
                while !unpacker.read_end_marker()? {
                    if index >= limit {
                        return Err(CodecError::LimitExceeded {
                            type_name: self.container.to_string(),
                            limit,
                            actual: index + 1,
                        });
                    }
                    self.decode_item(ctx, unpacker, container, index)?;
                    index += 1;
                }
            }
        }
        Ok(())
    }

    /// 元素编解码器，按元素 Schema 从上下文获取，首次获取后缓存在适配器上。
    pub fn element_codec(&self, ctx: &CodecContext) -> Result<Arc<dyn Codec<E>>> {
        if let Some(codec) = self.element_codec.get() {
            return Ok(Arc::clone(codec));
        }
        let codec = ctx.get_or_build::<E>(&self.element, self.item_schema())?;
        Ok(Arc::clone(self.element_codec.get_or_init(|| codec)))
    }

    /// 用元素编解码器读出一个元素。
    pub fn decode_element(&self, ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<E> {
        self.element_codec(ctx)?.decode(ctx, unpacker)
    }

    /// 写出单个元素：优先使用 *encode-item* 回调，否则使用元素编解码器。
    pub fn encode_item(&self, ctx: &CodecContext, packer: &mut dyn Packer, item: &E) -> Result<()> {
        match &self.encode_item {
            Some(encode_item) => encode_item(self, ctx, packer, item),
            None => self.element_codec(ctx)?.encode(ctx, packer, item),
        }
    }
}

impl<C, E> Codec<C> for CallbackCollectionCodec<C, E>
where
    C: SequenceContainer<E>,
    E: Send + Sync + 'static,
{
    fn encode(&self, ctx: &CodecContext, packer: &mut dyn Packer, value: &C) -> Result<()> {
        packer.write_array_header(value.item_count())?;
        value
            .for_each_item(&mut |item| self.encode_item(ctx, &mut *packer, item))
            .map_err(|err| err.within(&self.container))
    }

    fn decode(&self, ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<C> {
        self.decode_whole(ctx, unpacker)
            .map_err(|err| err.within(&self.container))
    }
}

impl<C, E> fmt::Debug for CallbackCollectionCodec<C, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackCollectionCodec")
            .field("container", &self.container.full_name())
            .field("element", &self.element)
            .field("schema", &self.schema)
            .field("custom_add", &self.add.is_some())
            .field("custom_decode_into", &self.decode_into.is_some())
            .finish()
    }
}

/// 集合编解码器的装配计划。
///
/// # 教案式说明
/// - **契约 (What)**：规划器通过链式调用登记回调，再把计划交给上下文；
///   上下文调用 [`CollectionPlan::build`] 时校验必需回调。
/// - **便捷入口 (How)**：[`CollectionPlan::sequential_decode`] 为尚未登记的 *decode-whole* 与 *decode-item*
///   填入标准流程：读头、创建容器、逐个解码元素并经 *add* 追加。
pub struct CollectionPlan<C, E> {
    container: TypeIdentity,
    element: TypeHandle,
    create: Option<CreateFn<C, E>>,
    add: Option<AddSlot<C, E>>,
    decode_whole: Option<DecodeWholeFn<C, E>>,
    decode_into: Option<DecodeIntoFn<C, E>>,
    decode_item: Option<DecodeItemFn<C, E>>,
    encode_item: Option<EncodeItemFn<C, E>>,
}

impl<C, E> CollectionPlan<C, E>
where
    C: SequenceContainer<E>,
    E: Send + Sync + 'static,
{
    /// 以容器身份与元素句柄开始装配，全部回调为空。
    pub fn new(container: TypeIdentity, element: TypeHandle) -> Self {
        Self {
            container,
            element,
            create: None,
            add: None,
            decode_whole: None,
            decode_into: None,
            decode_item: None,
            encode_item: None,
        }
    }

    pub fn container_type(&self) -> &TypeIdentity {
        &self.container
    }

    /// 登记 *create*（必需）。
    pub fn create<F>(mut self, create: F) -> Self
    where
        F: Fn(&CallbackCollectionCodec<C, E>, &CodecContext, usize) -> C + Send + Sync + 'static,
    {
        self.create = Some(Box::new(create));
        self
    }

    /// 登记 *add*；与 [`Self::add_via`] 共用一个槽位，后登记者生效。
    pub fn add<F>(mut self, add: F) -> Self
    where
        F: Fn(&CallbackCollectionCodec<C, E>, &CodecContext, &mut C, E) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.add = Some(AddSlot::Callback(Box::new(add)));
        self
    }

    /// 以延迟方法句柄充当 *add*；方法体必须是 [`AppendFn<C, E>`]。
    pub fn add_via(mut self, method: MethodHandle) -> Self {
        self.add = Some(AddSlot::Method(method));
        self
    }

    /// 登记 *decode-whole*（必需，或由 [`Self::sequential_decode`] 补齐）。
    pub fn decode_whole<F>(mut self, decode_whole: F) -> Self
    where
        F: Fn(&CallbackCollectionCodec<C, E>, &CodecContext, &mut dyn Unpacker) -> Result<C>
            + Send
            + Sync
            + 'static,
    {
        self.decode_whole = Some(Box::new(decode_whole));
        self
    }

    /// 登记 *decode-into*；回调收到已读出并校验过的元素数量。
    pub fn decode_into<F>(mut self, decode_into: F) -> Self
    where
        F: Fn(
                &CallbackCollectionCodec<C, E>,
                &CodecContext,
                &mut dyn Unpacker,
                &mut C,
                ItemCount,
            ) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.decode_into = Some(Box::new(decode_into));
        self
    }

    /// 登记 *decode-item*（必需，或由 [`Self::sequential_decode`] 补齐）。
    pub fn decode_item<F>(mut self, decode_item: F) -> Self
    where
        F: Fn(
                &CallbackCollectionCodec<C, E>,
                &CodecContext,
                &mut dyn Unpacker,
                &mut C,
                usize,
            ) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.decode_item = Some(Box::new(decode_item));
        self
    }

    /// 登记 *encode-item*；缺省时使用元素编解码器。
    pub fn encode_item<F>(mut self, encode_item: F) -> Self
    where
        F: Fn(&CallbackCollectionCodec<C, E>, &CodecContext, &mut dyn Packer, &E) -> Result<()>
            + Send
            + Sync
            + 'static,
    {
        self.encode_item = Some(Box::new(encode_item));
        self
    }

    /// 为缺失的 *decode-whole* / *decode-item* 填入标准流程，已登记的回调保持不变。
    pub fn sequential_decode(mut self) -> Self {
        if self.decode_whole.is_none() {
            self = self.decode_whole(|adapter, ctx, unpacker| {
                let count = adapter.read_header(ctx, unpacker)?;
                let mut container = adapter.create(ctx, count.known().unwrap_or(0));
                adapter.unpack_items(ctx, unpacker, &mut container, count)?;
                Ok(container)
            });
        }
        if self.decode_item.is_none() {
            self = self.decode_item(|adapter, ctx, unpacker, container, _index| {
                let item = adapter.decode_element(ctx, unpacker)?;
                adapter.add(ctx, container, item)
            });
        }
        self
    }

    /// 校验必需回调并构造编解码器。
    pub fn build(self, schema: PolymorphismSchema) -> Result<CallbackCollectionCodec<C, E>> {
        let Self {
            container,
            element,
            create,
            add,
            decode_whole,
            decode_into,
            decode_item,
            encode_item,
        } = self;

        let missing = |callback: &'static str| CodecError::MissingRequiredCallback {
            container: container.full_name(),
            callback,
        };
        let create = create.ok_or_else(|| missing("create"))?;
        let decode_whole = decode_whole.ok_or_else(|| missing("decode_whole"))?;
        let decode_item = decode_item.ok_or_else(|| missing("decode_item"))?;

        Ok(CallbackCollectionCodec {
            container,
            element,
            schema,
            create,
            add,
            decode_whole,
            decode_into,
            decode_item,
            encode_item,
            element_codec: OnceLock::new(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;
    use crate::error::codes;
    use crate::metadata::well_known;
    use crate::wire::MsgPackReader;

    fn set_plan() -> CollectionPlan<BTreeSet<i64>, i64> {
        CollectionPlan::new(
            TypeIdentity::new("System.Collections.Generic", "SortedSet")
                .with_arguments(vec![well_known::int64()]),
            TypeHandle::new(well_known::int64()),
        )
    }

    #[test]
    fn set_containers_use_intrinsic_append() {
        let ctx = CodecContext::new();
        let codec = set_plan()
            .create(|_, _, _| BTreeSet::new())
            .sequential_decode()
            .build(PolymorphismSchema::default())
            .unwrap();

        let mut reader = MsgPackReader::from_slice(&[0x93, 0x03, 0x01, 0x03]);
        let decoded = codec.decode(&ctx, &mut reader).unwrap();
        assert_eq!(decoded.into_iter().collect::<Vec<_>>(), vec![1, 3]);
    }

    #[test]
    fn create_receives_capped_hint() {
        let ctx = CodecContext::with_config(
            crate::CodecContextConfig::default().with_preallocation_limit(2),
        );
        let codec = set_plan()
            .create(|_, _, hint| {
                assert!(hint <= 2, "容量提示必须按配置截断");
                BTreeSet::new()
            })
            .sequential_decode()
            .build(PolymorphismSchema::default())
            .unwrap();

        let mut reader = MsgPackReader::from_slice(&[0x94, 0x01, 0x02, 0x03, 0x04]);
        assert_eq!(codec.decode(&ctx, &mut reader).unwrap().len(), 4);
    }

    #[test]
    fn missing_create_is_reported_at_build_time() {
        let err = set_plan().sequential_decode().build(PolymorphismSchema::default()).unwrap_err();
        assert_eq!(err.code(), codes::MISSING_CALLBACK);
        assert!(err.to_string().contains("`create`"));
    }
}
