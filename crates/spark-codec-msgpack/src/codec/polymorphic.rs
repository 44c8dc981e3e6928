//! 联合 Schema 下的多态编解码器。
//!
//! 线缆形态固定为两元素数组 `[tag, payload]`：`tag` 为 `str`，`payload` 由标签对应子类型的编解码器写出。

use std::marker::PhantomData;
use std::sync::Arc;

use super::Codec;
use crate::context::CodecContext;
use crate::error::{CodecError, Result};
use crate::metadata::TypeIdentity;
use crate::schema::{PolymorphismKind, PolymorphismSchema};
use crate::wire::{ItemCount, Packer, Unpacker};

/// 能报告自身具体子类型的值。
///
/// 编码时 [`UnionCodec`] 以该身份在联合标签表中反查标签。
pub trait RuntimeTyped {
    fn runtime_type(&self) -> TypeIdentity;
}

/// 按联合标签表分派到子类型编解码器。
///
/// 子类型编解码器在调用时从上下文获取，Schema 的 `item` / `key` 子 Schema 原样传给子类型。
pub struct UnionCodec<T> {
    declared: TypeIdentity,
    schema: PolymorphismSchema,
    payload_schema: PolymorphismSchema,
    _marker: PhantomData<fn() -> T>,
}

impl<T> UnionCodec<T>
where
    T: RuntimeTyped + Send + Sync + 'static,
{
    pub fn new(declared: TypeIdentity, schema: PolymorphismSchema) -> Self {
        let payload_schema = schema.clone().with_kind(PolymorphismKind::Default);
        Self {
            declared,
            schema,
            payload_schema,
            _marker: PhantomData,
        }
    }

    pub fn declared_type(&self) -> &TypeIdentity {
        &self.declared
    }

    fn unknown_subtype(&self, subtype: impl Into<String>) -> CodecError {
        CodecError::UnknownSubtype {
            type_name: self.declared.to_string(),
            subtype: subtype.into(),
        }
    }

    fn subtype_codec(&self, ctx: &CodecContext, subtype: &TypeIdentity) -> Result<Arc<dyn Codec<T>>> {
        ctx.get_or_build::<T>(&ctx.type_handle(subtype.clone()), &self.payload_schema)
    }
}

impl<T> Codec<T> for UnionCodec<T>
where
    T: RuntimeTyped + Send + Sync + 'static,
{
    fn encode(&self, ctx: &CodecContext, packer: &mut dyn Packer, value: &T) -> Result<()> {
        let subtype = value.runtime_type();
        let tag = self
            .schema
            .tag_of(&subtype)
            .ok_or_else(|| self.unknown_subtype(subtype.to_string()))?;
        let codec = self.subtype_codec(ctx, &subtype)?;

        packer.write_array_header(2)?;
        packer.write_str(tag)?;
        codec.encode(ctx, packer, value)
    }

    fn decode(&self, ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<T> {
        let start = unpacker.position();
        match unpacker.read_array_header()? {
            ItemCount::Known(2) => {}
            other => {
                return Err(CodecError::malformed(
                    start,
                    format!(
                        "union `{}` expects a [tag, payload] pair, found {other:?}",
                        self.declared
                    ),
                ));
            }
        }

        let tag = unpacker.read_str()?;
        let subtype = self
            .schema
            .type_for_tag(&tag)
            .ok_or_else(|| self.unknown_subtype(tag.clone()))?;
        self.subtype_codec(ctx, subtype)?.decode(ctx, unpacker)
    }
}
