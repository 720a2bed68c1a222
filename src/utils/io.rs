use std::convert::TryInto;
use std::mem::size_of;

/// Serialize a value to its on-disk byte representation. Shared by the
/// catalog, record codec, and B+-tree node layouts, which all reuse
/// the same length-prefixed primitive encodings.
pub trait Encodeable {
    fn encode(&self) -> Vec<u8>;
}

pub trait Decodeable: Sized {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self;
}

pub fn read_exact<R: std::io::Read>(reader: &mut R, bytes_count: usize) -> Vec<u8> {
    let mut buffer = vec![0u8; bytes_count];
    reader
        .read_exact(&mut buffer)
        .unwrap_or_else(|_| panic!("io error, expect {} bytes", bytes_count));
    buffer
}

/// A growable byte buffer that primitives serialize into.
#[derive(Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    pub fn write<T: Encodeable>(&mut self, obj: &T) {
        self.buf.extend_from_slice(&obj.encode());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Pad (or error, if too large) the buffer up to an exact page
    /// size; mirrors `SmallWriter::to_padded_bytes`.
    pub fn into_padded_bytes(self, size: usize) -> Vec<u8> {
        let mut buf = self.buf;
        assert!(
            buf.len() <= size,
            "buffer size is larger than the given size: {} > {}",
            buf.len(),
            size
        );
        buf.resize(size, 0);
        buf
    }
}

macro_rules! impl_serialization {
    (for $($t:ty),+) => {
        $(
            impl Encodeable for $t {
                fn encode(&self) -> Vec<u8> {
                    self.to_le_bytes().to_vec()
                }
            }

            impl Decodeable for $t {
                fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
                    let bytes = read_exact(reader, size_of::<Self>());
                    Self::from_le_bytes(bytes.try_into().unwrap())
                }
            }
        )*
    }
}

impl_serialization!(for u8, u16, u32, u64, i8, i16, i32, i64, usize, f32, f64);

impl Encodeable for bool {
    fn encode(&self) -> Vec<u8> {
        vec![*self as u8]
    }
}

impl Decodeable for bool {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        u8::decode_from(reader) == 1
    }
}

/// Strings are encoded as a `u16` byte length followed by UTF-8 bytes.
impl Encodeable for str {
    fn encode(&self) -> Vec<u8> {
        let bytes = self.as_bytes();
        let mut out = Vec::with_capacity(2 + bytes.len());
        out.extend_from_slice(&(bytes.len() as u16).to_le_bytes());
        out.extend_from_slice(bytes);
        out
    }
}

impl Encodeable for String {
    fn encode(&self) -> Vec<u8> {
        self.as_str().encode()
    }
}

impl Decodeable for String {
    fn decode_from<R: std::io::Read>(reader: &mut R) -> Self {
        let len = u16::decode_from(reader) as usize;
        let bytes = read_exact(reader, len);
        String::from_utf8(bytes).expect("corrupt string field")
    }
}
