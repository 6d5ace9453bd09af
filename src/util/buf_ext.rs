use anyhow::anyhow;
use bytes_varint::*;

macro_rules! get_try_impl {
    ($try_getter: ident, $ty:ty, $getter: ident) => {
        fn $try_getter(&mut self) -> anyhow::Result<$ty> {
            if self.remaining() < size_of::<$ty>() {
                return Err(anyhow::anyhow!("buffer underflow"));
            }
            Ok(self.$getter())
        }
    }
}

/// Fallible little-endian getters on top of [bytes::Buf]: all wire integers in this crate are
///  little-endian, and header parsing must never panic on a truncated buffer.
pub trait BufExt: bytes::Buf + bytes_varint::VarIntSupport {
    fn try_get_usize_varint(&mut self) -> anyhow::Result<usize> {
        Ok(self.get_u64_varint().a()? as usize)
    }

    get_try_impl!(try_get_u8, u8, get_u8);
    get_try_impl!(try_get_u16_le, u16, get_u16_le);
    get_try_impl!(try_get_u32_le, u32, get_u32_le);
    get_try_impl!(try_get_u64_le, u64, get_u64_le);
    get_try_impl!(try_get_u128_le, u128, get_u128_le);

    fn try_get_string(&mut self) -> anyhow::Result<String> {
        let len = BufExt::try_get_usize_varint(self)?;
        if self.remaining() < len {
            return Err(anyhow!("buffer underflow"));
        }
        let mut buf = vec![0u8; len];
        self.copy_to_slice(&mut buf);
        Ok(String::from_utf8(buf)?)
    }
}

pub trait BufMutExt: bytes::BufMut + bytes_varint::VarIntSupportMut {
    fn put_usize_varint(&mut self, v: usize) {
        self.put_u64_varint(v as u64);
    }

    fn put_string(&mut self, s: &str) {
        BufMutExt::put_usize_varint(self, s.len());
        self.put_slice(s.as_bytes());
    }
}

pub trait DummyErrorAdapter<T> {
    fn a(self) -> anyhow::Result<T>;
}
impl <T> DummyErrorAdapter<T> for VarIntResult<T> {
    fn a(self) -> anyhow::Result<T> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(anyhow!("VarInt error: {:?}", e)),
        }
    }
}


impl <T: bytes::Buf> BufExt for T {
}

impl <T: bytes::BufMut> BufMutExt for T {
}
