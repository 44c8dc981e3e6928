//! 线缆读写原语的抽象层。
//!
//! # 教案式说明
//! - **定位 (Why)**：编解码器构建管线不关心字节如何排布，只依赖 [`Packer`] / [`Unpacker`] 两个对象安全接口；
//!   [`msgpack`] 子模块提供一份 MessagePack 子集实现，供上下文与测试直接使用。
//! - **契约 (What)**：
//!   - 数组头可能报告 [`ItemCount::Unknown`]，此时元素序列以显式结束标记收尾，调用方需循环
//!     [`Unpacker::read_end_marker`] 直到其返回 `true`；
//!   - 结构非法或提前结束一律返回 [`crate::CodecError::MalformedWireInput`]，并携带字节偏移。

pub mod msgpack;

use crate::error::Result;

pub use msgpack::{MsgPackReader, MsgPackWriter};

/// 数组头报告的元素数量。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ItemCount {
    /// 定长数组。
    Known(usize),
    /// 不定长数组，以结束标记收尾。
    Unknown,
}

impl ItemCount {
    /// 定长时返回元素数量。
    pub fn known(self) -> Option<usize> {
        match self {
            ItemCount::Known(count) => Some(count),
            ItemCount::Unknown => None,
        }
    }
}

/// 读取端原语。
pub trait Unpacker {
    /// 当前已消费的字节数。
    fn position(&self) -> usize;

    /// 读取数组头。
    fn read_array_header(&mut self) -> Result<ItemCount>;

    /// 若下一个标记是结束标记则消费之并返回 `true`；输入耗尽视为数据错误。
    fn read_end_marker(&mut self) -> Result<bool>;

    fn read_nil(&mut self) -> Result<()>;

    fn read_bool(&mut self) -> Result<bool>;

    fn read_i64(&mut self) -> Result<i64>;

    fn read_u64(&mut self) -> Result<u64>;

    fn read_str(&mut self) -> Result<String>;

    fn read_bin(&mut self) -> Result<Vec<u8>>;
}

/// 写入端原语。
pub trait Packer {
    fn write_nil(&mut self) -> Result<()>;

    fn write_bool(&mut self, value: bool) -> Result<()>;

    fn write_i64(&mut self, value: i64) -> Result<()>;

    fn write_u64(&mut self, value: u64) -> Result<()>;

    fn write_str(&mut self, value: &str) -> Result<()>;

    fn write_bin(&mut self, value: &[u8]) -> Result<()>;

    /// 写入定长数组头。
    fn write_array_header(&mut self, len: usize) -> Result<()>;

    /// 写入不定长数组头，元素写完后必须调用 [`Packer::write_end_marker`]。
    fn write_indefinite_array_header(&mut self) -> Result<()>;

    fn write_end_marker(&mut self) -> Result<()>;
}
