//! 汇合握手帧。
//!
//! 请求方在链路建立后立即发送 hello：
//!
//! ```text
//! +-------+---------+------+---------------------------+
//! | TTHR  | ver u16 | mode | (direct) rank u32 size u32 |
//! +-------+---------+------+---------------------------+
//! ```
//!
//! 接受方校验后回复一个字节：`ACK` 表示握手完成，`NAK` 表示拒绝（随后关闭链路）。

use crate::error::{CoreError, ErrorCategory, codes};
use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

pub const MAGIC: [u8; 4] = *b"TTHR";
pub const VERSION: u16 = 1;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;

const MODE_DIRECT: u8 = 1;
const MODE_CLIENT: u8 = 2;

/// hello 的固定前缀：magic + version + mode。
pub const PREFIX_LEN: usize = 7;
/// direct 模式追加的 rank/size 字段长度。
pub const DIRECT_TAIL_LEN: usize = 8;

/// 请求方声明的连接模式。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Hello {
    /// 直连：请求方所在组的秩与组大小。
    Direct { rank: u32, size: u32 },
    /// 服务端/客户端模式下的客户端。
    Client,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum HandshakeError {
    #[error("bad handshake magic {0:02x?}")]
    BadMagic([u8; 4]),
    #[error("unsupported handshake version {0}")]
    UnsupportedVersion(u16),
    #[error("unknown handshake mode {0}")]
    UnknownMode(u8),
    #[error("expected a {expected} hello but received {received}")]
    UnexpectedMode {
        expected: &'static str,
        received: &'static str,
    },
    #[error("requester rank {rank} is out of range for group size {size}")]
    RankOutOfRange { rank: u32, size: u32 },
    #[error("requester group size changed from {expected} to {received}")]
    InconsistentSize { expected: u32, received: u32 },
    #[error("requester rank {0} connected twice")]
    DuplicateRank(u32),
    #[error("acceptor rejected the hello")]
    Rejected,
    #[error("unexpected reply byte {0:#04x}")]
    BadReply(u8),
}

impl From<HandshakeError> for CoreError {
    fn from(err: HandshakeError) -> Self {
        CoreError::new(codes::PROTOCOL_HANDSHAKE, err.to_string())
            .with_category(ErrorCategory::ProtocolViolation)
            .with_cause(err)
    }
}

impl Hello {
    pub fn mode_name(&self) -> &'static str {
        match self {
            Hello::Direct { .. } => "direct",
            Hello::Client => "client",
        }
    }

    pub fn encode(&self, dst: &mut BytesMut) {
        dst.put_slice(&MAGIC);
        dst.put_u16_le(VERSION);
        match self {
            Hello::Direct { rank, size } => {
                dst.put_u8(MODE_DIRECT);
                dst.put_u32_le(*rank);
                dst.put_u32_le(*size);
            }
            Hello::Client => dst.put_u8(MODE_CLIENT),
        }
    }

    /// 解析固定前缀，返回模式字节之后还需读取的字节数。
    pub fn tail_len(prefix: &[u8; PREFIX_LEN]) -> Result<usize, HandshakeError> {
        let mut buf = &prefix[..];
        let mut magic = [0u8; 4];
        buf.copy_to_slice(&mut magic);
        if magic != MAGIC {
            return Err(HandshakeError::BadMagic(magic));
        }
        let version = buf.get_u16_le();
        if version != VERSION {
            return Err(HandshakeError::UnsupportedVersion(version));
        }
        match buf.get_u8() {
            MODE_DIRECT => Ok(DIRECT_TAIL_LEN),
            MODE_CLIENT => Ok(0),
            other => Err(HandshakeError::UnknownMode(other)),
        }
    }

    /// 在前缀已经通过 [`Hello::tail_len`] 校验的前提下组装 hello。
    pub fn decode(prefix: &[u8; PREFIX_LEN], mut tail: &[u8]) -> Result<Self, HandshakeError> {
        match prefix[PREFIX_LEN - 1] {
            MODE_DIRECT => {
                let rank = tail.get_u32_le();
                let size = tail.get_u32_le();
                if rank >= size {
                    return Err(HandshakeError::RankOutOfRange { rank, size });
                }
                Ok(Hello::Direct { rank, size })
            }
            MODE_CLIENT => Ok(Hello::Client),
            other => Err(HandshakeError::UnknownMode(other)),
        }
    }
}

/// 校验接受方的回复字节。
pub fn check_reply(reply: u8) -> Result<(), HandshakeError> {
    match reply {
        ACK => Ok(()),
        NAK => Err(HandshakeError::Rejected),
        other => Err(HandshakeError::BadReply(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(hello: Hello) -> ([u8; PREFIX_LEN], Vec<u8>) {
        let mut buf = BytesMut::new();
        hello.encode(&mut buf);
        let mut prefix = [0u8; PREFIX_LEN];
        prefix.copy_from_slice(&buf[..PREFIX_LEN]);
        (prefix, buf[PREFIX_LEN..].to_vec())
    }

    #[test]
    fn direct_hello_carries_rank_and_size() {
        let (prefix, tail) = split(Hello::Direct { rank: 1, size: 2 });
        assert_eq!(Hello::tail_len(&prefix), Ok(DIRECT_TAIL_LEN));
        assert_eq!(tail.len(), DIRECT_TAIL_LEN);
        assert_eq!(
            Hello::decode(&prefix, &tail),
            Ok(Hello::Direct { rank: 1, size: 2 })
        );
    }

    #[test]
    fn client_hello_has_no_tail() {
        let (prefix, tail) = split(Hello::Client);
        assert_eq!(Hello::tail_len(&prefix), Ok(0));
        assert!(tail.is_empty());
        assert_eq!(Hello::decode(&prefix, &tail), Ok(Hello::Client));
    }

    #[test]
    fn malformed_prefixes_are_rejected() {
        let (mut prefix, _) = split(Hello::Client);
        prefix[0] = b'X';
        assert!(matches!(
            Hello::tail_len(&prefix),
            Err(HandshakeError::BadMagic(_))
        ));

        let (mut prefix, _) = split(Hello::Client);
        prefix[4] = 9;
        assert_eq!(
            Hello::tail_len(&prefix),
            Err(HandshakeError::UnsupportedVersion(9))
        );

        let (mut prefix, _) = split(Hello::Client);
        prefix[6] = 7;
        assert_eq!(Hello::tail_len(&prefix), Err(HandshakeError::UnknownMode(7)));
    }

    #[test]
    fn rank_must_be_inside_group() {
        let (prefix, tail) = split(Hello::Direct { rank: 0, size: 1 });
        let mut bad_tail = tail.clone();
        bad_tail[..4].copy_from_slice(&3u32.to_le_bytes());
        assert_eq!(
            Hello::decode(&prefix, &bad_tail),
            Err(HandshakeError::RankOutOfRange { rank: 3, size: 1 })
        );
    }

    #[test]
    fn reply_bytes() {
        assert_eq!(check_reply(ACK), Ok(()));
        assert_eq!(check_reply(NAK), Err(HandshakeError::Rejected));
        let err: CoreError = check_reply(0).expect_err("未知回复").into();
        assert_eq!(err.code(), codes::PROTOCOL_HANDSHAKE);
    }
}
