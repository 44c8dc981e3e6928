//! 基于 `rmp` 的 MessagePack 读写端。
//!
//! # 格式说明（What）
//! - `nil`、`bool`、整数、`str`、`bin`、`array` 的标记与宽度选择全部交给 `rmp`：写入端始终选择最短编码，
//!   读取端接受任一合法宽度；
//! - 不定长数组使用 MessagePack 保留不用的 [`Marker::Reserved`]（`0xc1`）：一个开启数组，另一个作为结束标记；
//!   合法的 MessagePack 负载中不会出现该字节，因此不会与元素本身混淆；
//! - `rmp` 报告的错误统一转换为携带字节偏移的 `MalformedWireInput`。

use std::fmt;
use std::io;

use bytes::buf::Writer;
use bytes::{Buf, BufMut, Bytes, BytesMut};
use rmp::Marker;
use rmp::decode::{self, MarkerReadError, NumValueReadError, ValueReadError};
use rmp::encode;

use super::{ItemCount, Packer, Unpacker};
use crate::error::{CodecError, Result};

/// 写入 `BytesMut` 的 MessagePack 打包器。
#[derive(Debug, Default)]
pub struct MsgPackWriter {
    buffer: BytesMut,
}

impl MsgPackWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预留 `capacity` 字节的打包器。
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
        }
    }

    /// 已写入的字节。
    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    /// 冻结为只读缓冲。
    pub fn freeze(self) -> Bytes {
        self.buffer.freeze()
    }

    fn encode_with<E, F>(&mut self, what: &str, write: F) -> Result<()>
    where
        E: fmt::Display,
        F: FnOnce(&mut Writer<&mut BytesMut>) -> core::result::Result<(), E>,
    {
        let offset = self.buffer.len();
        let mut sink = (&mut self.buffer).writer();
        write(&mut sink)
            .map_err(|err| CodecError::malformed(offset, format!("failed to write {what}: {err}")))
    }
}

impl Packer for MsgPackWriter {
    fn write_nil(&mut self) -> Result<()> {
        self.encode_with("nil", |wr| encode::write_nil(wr))
    }

    fn write_bool(&mut self, value: bool) -> Result<()> {
        self.encode_with("bool", |wr| encode::write_bool(wr, value))
    }

    fn write_i64(&mut self, value: i64) -> Result<()> {
        self.encode_with("integer", |wr| encode::write_sint(wr, value).map(drop))
    }

    fn write_u64(&mut self, value: u64) -> Result<()> {
        self.encode_with("integer", |wr| encode::write_uint(wr, value).map(drop))
    }

    fn write_str(&mut self, value: &str) -> Result<()> {
        self.encode_with("str", |wr| encode::write_str(wr, value))
    }

    fn write_bin(&mut self, value: &[u8]) -> Result<()> {
        self.encode_with("bin", |wr| encode::write_bin(wr, value))
    }

    fn write_array_header(&mut self, len: usize) -> Result<()> {
        let len = u32::try_from(len).map_err(|_| {
            CodecError::malformed(
                self.buffer.len(),
                format!("array length {len} does not fit in 32 bits"),
            )
        })?;
        self.encode_with("array header", |wr| encode::write_array_len(wr, len).map(drop))
    }

    fn write_indefinite_array_header(&mut self) -> Result<()> {
        self.buffer.put_u8(Marker::Reserved.to_u8());
        Ok(())
    }

    fn write_end_marker(&mut self) -> Result<()> {
        self.buffer.put_u8(Marker::Reserved.to_u8());
        Ok(())
    }
}

/// `rmp` 读取错误的归类。
enum ReadFault {
    /// 连标记字节都读不到。
    MarkerMissing,
    /// 标记之后的长度或数值字节不足。
    PayloadMissing,
    Mismatch(Marker),
    OutOfRange,
}

impl From<MarkerReadError<io::Error>> for ReadFault {
    fn from(_: MarkerReadError<io::Error>) -> Self {
        ReadFault::MarkerMissing
    }
}

impl From<ValueReadError<io::Error>> for ReadFault {
    fn from(err: ValueReadError<io::Error>) -> Self {
        match err {
            ValueReadError::InvalidMarkerRead(_) => ReadFault::MarkerMissing,
            ValueReadError::InvalidDataRead(_) => ReadFault::PayloadMissing,
            ValueReadError::TypeMismatch(marker) => ReadFault::Mismatch(marker),
        }
    }
}

impl From<NumValueReadError<io::Error>> for ReadFault {
    fn from(err: NumValueReadError<io::Error>) -> Self {
        match err {
            NumValueReadError::InvalidMarkerRead(_) => ReadFault::MarkerMissing,
            NumValueReadError::InvalidDataRead(_) => ReadFault::PayloadMissing,
            NumValueReadError::TypeMismatch(marker) => ReadFault::Mismatch(marker),
            NumValueReadError::OutOfRange => ReadFault::OutOfRange,
        }
    }
}

/// 从 `Bytes` 读取的 MessagePack 解包器。
#[derive(Debug, Clone)]
pub struct MsgPackReader {
    data: Bytes,
    total: usize,
}

impl MsgPackReader {
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let total = data.len();
        Self { data, total }
    }

    /// 复制切片内容构造读取端。
    pub fn from_slice(data: &[u8]) -> Self {
        Self::new(Bytes::copy_from_slice(data))
    }

    /// 剩余未读字节数。
    pub fn remaining(&self) -> usize {
        self.data.remaining()
    }

    pub fn is_exhausted(&self) -> bool {
        !self.data.has_remaining()
    }

    /// 在剩余字节上运行一次 `rmp` 读取，成功时前移游标；失败时游标不动。
    fn decode_with<T, E, F>(&mut self, what: &str, read: F) -> Result<T>
    where
        E: Into<ReadFault>,
        F: FnOnce(&mut &[u8]) -> core::result::Result<T, E>,
    {
        let start = self.position();
        let mut cursor: &[u8] = self.data.chunk();
        let available = cursor.len();
        match read(&mut cursor) {
            Ok(value) => {
                let consumed = available - cursor.len();
                self.data.advance(consumed);
                Ok(value)
            }
            Err(err) => Err(Self::fault(start, what, err.into())),
        }
    }

    fn fault(start: usize, what: &str, fault: ReadFault) -> CodecError {
        match fault {
            ReadFault::MarkerMissing => {
                CodecError::malformed(start, format!("premature end of input while reading {what}"))
            }
            ReadFault::PayloadMissing => CodecError::malformed(
                start + 1,
                format!("premature end of input while reading {what} payload"),
            ),
            ReadFault::Mismatch(marker) => CodecError::malformed(
                start,
                format!("expected {what}, found marker 0x{:02x}", marker.to_u8()),
            ),
            ReadFault::OutOfRange => {
                CodecError::malformed(start, format!("{what} is out of range"))
            }
        }
    }

    fn read_payload(&mut self, len: usize, what: &str) -> Result<Bytes> {
        if self.data.remaining() < len {
            return Err(CodecError::malformed(
                self.position(),
                format!(
                    "premature end of input while reading {what}: {len} byte(s) needed, {} available",
                    self.data.remaining()
                ),
            ));
        }
        Ok(self.data.copy_to_bytes(len))
    }

    fn next_is_reserved(&self) -> Option<bool> {
        self.data
            .chunk()
            .first()
            .map(|byte| Marker::from_u8(*byte) == Marker::Reserved)
    }
}

impl Unpacker for MsgPackReader {
    fn position(&self) -> usize {
        self.total - self.data.remaining()
    }

    fn read_array_header(&mut self) -> Result<ItemCount> {
        if self.next_is_reserved() == Some(true) {
            self.data.advance(1);
            return Ok(ItemCount::Unknown);
        }
        let len = self.decode_with("array header", |rd| decode::read_array_len(rd))?;
        Ok(ItemCount::Known(len as usize))
    }

    fn read_end_marker(&mut self) -> Result<bool> {
        match self.next_is_reserved() {
            Some(true) => {
                self.data.advance(1);
                Ok(true)
            }
            Some(false) => Ok(false),
            None => Err(CodecError::malformed(
                self.position(),
                "premature end of input: end marker of unknown-length array is missing",
            )),
        }
    }

    fn read_nil(&mut self) -> Result<()> {
        self.decode_with("nil", |rd| decode::read_nil(rd))
    }

    fn read_bool(&mut self) -> Result<bool> {
        self.decode_with("bool", |rd| decode::read_bool(rd))
    }

    fn read_i64(&mut self) -> Result<i64> {
        self.decode_with("integer", |rd| decode::read_int::<i64, _>(rd))
    }

    fn read_u64(&mut self) -> Result<u64> {
        self.decode_with("integer", |rd| decode::read_int::<u64, _>(rd))
    }

    fn read_str(&mut self) -> Result<String> {
        let len = self.decode_with("str", |rd| decode::read_str_len(rd))?;
        let start = self.position();
        let payload = self.read_payload(len as usize, "str payload")?;
        String::from_utf8(payload.to_vec())
            .map_err(|err| CodecError::malformed(start, format!("invalid utf-8 in str: {err}")))
    }

    fn read_bin(&mut self) -> Result<Vec<u8>> {
        let len = self.decode_with("bin", |rd| decode::read_bin_len(rd))?;
        Ok(self.read_payload(len as usize, "bin payload")?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes;

    #[test]
    fn writer_picks_shortest_integer_encoding() {
        let mut writer = MsgPackWriter::new();
        writer.write_i64(5).unwrap();
        writer.write_i64(-3).unwrap();
        writer.write_i64(-100).unwrap();
        writer.write_u64(300).unwrap();
        assert_eq!(
            writer.as_slice(),
            &[
                0x05,
                0xfd,
                Marker::I8.to_u8(),
                0x9c,
                Marker::U16.to_u8(),
                0x01,
                0x2c
            ]
        );
    }

    #[test]
    fn indefinite_array_is_framed_by_reserved_marker() {
        let mut writer = MsgPackWriter::new();
        writer.write_indefinite_array_header().unwrap();
        writer.write_str("a").unwrap();
        writer.write_end_marker().unwrap();
        assert_eq!(writer.as_slice(), &[0xc1, 0xa1, b'a', 0xc1]);

        let mut reader = MsgPackReader::new(writer.freeze());
        assert_eq!(reader.read_array_header().unwrap(), ItemCount::Unknown);
        assert!(!reader.read_end_marker().unwrap());
        assert_eq!(reader.read_str().unwrap(), "a");
        assert!(reader.read_end_marker().unwrap());
        assert!(reader.is_exhausted());
    }

    #[test]
    fn truncated_input_reports_offset() {
        let mut reader = MsgPackReader::from_slice(&[0x92, Marker::U32.to_u8(), 0x00]);
        assert_eq!(reader.read_array_header().unwrap(), ItemCount::Known(2));
        let err = reader.read_u64().expect_err("截断的 uint32 必须报错");
        assert_eq!(err.code(), codes::MALFORMED_INPUT);
        match err {
            CodecError::MalformedWireInput { offset, .. } => assert_eq!(offset, 2),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_end_marker_is_malformed() {
        let mut reader = MsgPackReader::from_slice(&[0xc1, 0x01]);
        assert_eq!(reader.read_array_header().unwrap(), ItemCount::Unknown);
        assert!(!reader.read_end_marker().unwrap());
        assert_eq!(reader.read_i64().unwrap(), 1);
        assert!(reader.read_end_marker().is_err());
    }

    #[test]
    fn wrong_marker_names_expectation() {
        let mut reader = MsgPackReader::from_slice(&[Marker::True.to_u8()]);
        let err = reader.read_array_header().unwrap_err();
        assert!(err.to_string().contains("expected array header, found marker 0xc3"));
        assert_eq!(reader.position(), 0, "失败的读取不得移动游标");
    }

    #[test]
    fn integers_outside_the_target_range_are_rejected() {
        let mut writer = MsgPackWriter::new();
        writer.write_u64(u64::MAX).unwrap();
        writer.write_i64(-1).unwrap();

        let mut reader = MsgPackReader::new(writer.freeze());
        let err = reader.read_i64().unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");

        let mut reader = MsgPackReader::from_slice(&[0xff]);
        assert_eq!(reader.read_u64().unwrap_err().code(), codes::MALFORMED_INPUT);
    }

    #[test]
    fn long_strings_and_binaries_survive() {
        let text = "x".repeat(300);
        let blob = vec![7u8; 70_000];
        let mut writer = MsgPackWriter::with_capacity(blob.len() + 512);
        writer.write_str(&text).unwrap();
        writer.write_bin(&blob).unwrap();
        writer.write_array_header(20).unwrap();

        let mut reader = MsgPackReader::new(writer.freeze());
        assert_eq!(reader.read_str().unwrap(), text);
        assert_eq!(reader.read_bin().unwrap(), blob);
        assert_eq!(reader.read_array_header().unwrap(), ItemCount::Known(20));
        assert!(reader.is_exhausted());
    }
}
