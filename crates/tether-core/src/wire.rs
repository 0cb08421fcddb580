//! 类型化消息的线上格式。
//!
//! 一条消息恰好承载一个类型化值：
//! - 定长元素（`bool`、整型、浮点）：小端字节序，`bool` 占 1 字节且只允许 `0`/`1`；
//! - 字符串：`u64` 小端字节长度，紧随 UTF-8 字节；
//! - 定长数组：`count` 个元素首尾相接，无长度前缀；
//! - 动态序列：`u64` 小端元素个数，紧随元素。
//!
//! 接收侧所有长度前缀都在分配前按报文预算校验。

use crate::error::{CoreError, ErrorCategory, codes};
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// 长度前缀的字节数。
pub const LENGTH_PREFIX_LEN: usize = 8;

/// 解码阶段的错误。
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    #[error("invalid bool byte {0:#04x}")]
    InvalidBool(u8),
    #[error("string payload is not valid UTF-8")]
    InvalidUtf8,
    #[error("length prefix {0} does not fit in memory")]
    LengthOverflow(u64),
    #[error("length prefix of {requested} bytes exceeds the {budget} byte message budget")]
    BudgetExceeded { requested: u64, budget: u64 },
}

impl From<WireError> for CoreError {
    fn from(err: WireError) -> Self {
        let code = match err {
            WireError::BudgetExceeded { .. } | WireError::LengthOverflow(_) => {
                codes::PROTOCOL_BUDGET_EXCEEDED
            }
            WireError::InvalidBool(_) | WireError::InvalidUtf8 => codes::PROTOCOL_DECODE,
        };
        CoreError::new(code, err.to_string())
            .with_category(ErrorCategory::ProtocolViolation)
            .with_cause(err)
    }
}

/// 定长元素：可以组成定长数组与动态序列的标量。
pub trait Element: Copy + Send + Sync + 'static {
    /// 编码宽度（字节）。
    const WIDTH: usize;

    fn put(&self, dst: &mut BytesMut);

    /// `src` 长度恰为 [`Element::WIDTH`]。
    fn get(src: &[u8]) -> Result<Self, WireError>;
}

macro_rules! impl_numeric_element {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl Element for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn put(&self, dst: &mut BytesMut) {
                    dst.$put(*self);
                }

                fn get(mut src: &[u8]) -> Result<Self, WireError> {
                    Ok(src.$get())
                }
            }
        )*
    };
}

impl_numeric_element! {
    i32 => put_i32_le, get_i32_le;
    i64 => put_i64_le, get_i64_le;
    u32 => put_u32_le, get_u32_le;
    u64 => put_u64_le, get_u64_le;
    f32 => put_f32_le, get_f32_le;
    f64 => put_f64_le, get_f64_le;
}

impl Element for bool {
    const WIDTH: usize = 1;

    fn put(&self, dst: &mut BytesMut) {
        dst.put_u8(u8::from(*self));
    }

    fn get(src: &[u8]) -> Result<Self, WireError> {
        match src[0] {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(WireError::InvalidBool(other)),
        }
    }
}

/// 可单独收发的标量。
///
/// # 契约说明（What）
/// - 接收分两步：先读取 `HEADER_LEN` 字节头部，由 [`Scalar::body_len`] 给出还需读取的
///   正文长度，最后 [`Scalar::decode`] 组装取值；
/// - 定长元素没有正文，头部即完整编码；字符串的头部是长度前缀。
pub trait Scalar: Sized + Send {
    const HEADER_LEN: usize;

    fn encode(&self, dst: &mut BytesMut);

    fn body_len(header: &[u8], budget: u64) -> Result<usize, WireError>;

    fn decode(header: &[u8], body: &[u8]) -> Result<Self, WireError>;
}

impl<T: Element> Scalar for T {
    const HEADER_LEN: usize = T::WIDTH;

    fn encode(&self, dst: &mut BytesMut) {
        self.put(dst);
    }

    fn body_len(_header: &[u8], _budget: u64) -> Result<usize, WireError> {
        Ok(0)
    }

    fn decode(header: &[u8], _body: &[u8]) -> Result<Self, WireError> {
        T::get(header)
    }
}

impl Scalar for String {
    const HEADER_LEN: usize = LENGTH_PREFIX_LEN;

    fn encode(&self, dst: &mut BytesMut) {
        dst.reserve(LENGTH_PREFIX_LEN + self.len());
        dst.put_u64_le(self.len() as u64);
        dst.put_slice(self.as_bytes());
    }

    fn body_len(header: &[u8], budget: u64) -> Result<usize, WireError> {
        payload_len(decode_length(header), 1, budget)
    }

    fn decode(_header: &[u8], body: &[u8]) -> Result<Self, WireError> {
        String::from_utf8(body.to_vec()).map_err(|_| WireError::InvalidUtf8)
    }
}

/// 写入长度前缀。
pub fn encode_length(len: usize, dst: &mut BytesMut) {
    dst.put_u64_le(len as u64);
}

/// 读取长度前缀；`header` 至少包含 [`LENGTH_PREFIX_LEN`] 字节。
pub fn decode_length(mut header: &[u8]) -> u64 {
    header.get_u64_le()
}

/// 计算 `count` 个宽度为 `width` 的元素所需的正文字节数，并按预算校验。
pub fn payload_len(count: u64, width: usize, budget: u64) -> Result<usize, WireError> {
    let requested = count
        .checked_mul(width as u64)
        .ok_or(WireError::LengthOverflow(count))?;
    if requested > budget {
        return Err(WireError::BudgetExceeded { requested, budget });
    }
    usize::try_from(requested).map_err(|_| WireError::LengthOverflow(requested))
}

/// 将一组元素首尾相接地编码进 `dst`。
pub fn encode_elements<T: Element>(values: &[T], dst: &mut BytesMut) {
    dst.reserve(values.len() * T::WIDTH);
    for value in values {
        value.put(dst);
    }
}

/// 把 `src` 按元素宽度切分并逐个解码进 `out`；`src.len()` 必须等于 `out.len() * WIDTH`。
pub fn decode_elements<T: Element>(src: &[u8], out: &mut [T]) -> Result<(), WireError> {
    debug_assert_eq!(src.len(), out.len() * T::WIDTH);
    for (slot, chunk) in out.iter_mut().zip(src.chunks_exact(T::WIDTH)) {
        *slot = T::get(chunk)?;
    }
    Ok(())
}
