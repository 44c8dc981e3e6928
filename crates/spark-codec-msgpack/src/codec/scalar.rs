//! 标量编解码器。
//!
//! [`crate::CodecContext::new`] 以 [`crate::metadata::well_known`] 中的身份注册这些编解码器，
//! 规划器可以像获取任何其他类型一样从缓存中取得它们。

use super::Codec;
use crate::context::CodecContext;
use crate::error::{CodecError, Result};
use crate::wire::{Packer, Unpacker};

/// `bool`。
#[derive(Clone, Copy, Debug, Default)]
pub struct BoolCodec;

impl Codec<bool> for BoolCodec {
    fn encode(&self, _ctx: &CodecContext, packer: &mut dyn Packer, value: &bool) -> Result<()> {
        packer.write_bool(*value)
    }

    fn decode(&self, _ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<bool> {
        unpacker.read_bool()
    }
}

/// `i32`，解码时校验取值范围。
#[derive(Clone, Copy, Debug, Default)]
pub struct Int32Codec;

impl Codec<i32> for Int32Codec {
    fn encode(&self, _ctx: &CodecContext, packer: &mut dyn Packer, value: &i32) -> Result<()> {
        packer.write_i64(i64::from(*value))
    }

    fn decode(&self, _ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<i32> {
        let start = unpacker.position();
        let value = unpacker.read_i64()?;
        i32::try_from(value)
            .map_err(|_| CodecError::malformed(start, format!("integer {value} overflows i32")))
    }
}

/// `i64`。
#[derive(Clone, Copy, Debug, Default)]
pub struct Int64Codec;

impl Codec<i64> for Int64Codec {
    fn encode(&self, _ctx: &CodecContext, packer: &mut dyn Packer, value: &i64) -> Result<()> {
        packer.write_i64(*value)
    }

    fn decode(&self, _ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<i64> {
        unpacker.read_i64()
    }
}

/// `u64`。
#[derive(Clone, Copy, Debug, Default)]
pub struct UInt64Codec;

impl Codec<u64> for UInt64Codec {
    fn encode(&self, _ctx: &CodecContext, packer: &mut dyn Packer, value: &u64) -> Result<()> {
        packer.write_u64(*value)
    }

    fn decode(&self, _ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<u64> {
        unpacker.read_u64()
    }
}

/// UTF-8 字符串。
#[derive(Clone, Copy, Debug, Default)]
pub struct StringCodec;

impl Codec<String> for StringCodec {
    fn encode(&self, _ctx: &CodecContext, packer: &mut dyn Packer, value: &String) -> Result<()> {
        packer.write_str(value)
    }

    fn decode(&self, _ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<String> {
        unpacker.read_str()
    }
}

/// 原始字节，对应 MessagePack `bin` 族。
#[derive(Clone, Copy, Debug, Default)]
pub struct BinaryCodec;

impl Codec<Vec<u8>> for BinaryCodec {
    fn encode(&self, _ctx: &CodecContext, packer: &mut dyn Packer, value: &Vec<u8>) -> Result<()> {
        packer.write_bin(value)
    }

    fn decode(&self, _ctx: &CodecContext, unpacker: &mut dyn Unpacker) -> Result<Vec<u8>> {
        unpacker.read_bin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;
    use crate::wire::{MsgPackReader, MsgPackWriter};

    #[test]
    fn int32_rejects_out_of_range_values() {
        let ctx = CodecContext::new();
        let mut writer = MsgPackWriter::new();
        Int64Codec
            .encode(&ctx, &mut writer, &(i64::from(i32::MAX) + 1))
            .unwrap();

        let mut reader = MsgPackReader::new(writer.freeze());
        let err = Int32Codec.decode(&ctx, &mut reader).unwrap_err();
        assert_eq!(err.code(), codes::MALFORMED_INPUT);
        assert!(err.to_string().contains("overflows i32"));
    }

    #[test]
    fn binary_and_string_use_distinct_families() {
        let ctx = CodecContext::new();
        let mut writer = MsgPackWriter::new();
        BinaryCodec.encode(&ctx, &mut writer, &vec![1, 2]).unwrap();
        StringCodec
            .encode(&ctx, &mut writer, &"ok".to_owned())
            .unwrap();
        assert_eq!(writer.as_slice(), &[0xc4, 0x02, 0x01, 0x02, 0xa2, b'o', b'k']);

        let mut reader = MsgPackReader::new(writer.freeze());
        assert!(StringCodec.decode(&ctx, &mut reader).is_err());
    }
}
