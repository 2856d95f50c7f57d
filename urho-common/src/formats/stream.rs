//! Little-endian writer and reader over byte buffers.

use glam::{Quat, Vec3};

use super::FormatError;

/// Growable little-endian output buffer
///
/// Writers build a whole file in memory and hand it to the filesystem in one
/// call, so a failed write never leaves a half-serialized chunk behind.
#[derive(Debug, Default, Clone)]
pub struct BinaryWriter {
    buf: Vec<u8>,
}

impl BinaryWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_vec3(&mut self, v: Vec3) {
        self.write_f32(v.x);
        self.write_f32(v.y);
        self.write_f32(v.z);
    }

    /// Write a quaternion as w, x, y, z
    pub fn write_quat(&mut self, q: Quat) {
        self.write_f32(q.w);
        self.write_f32(q.x);
        self.write_f32(q.y);
        self.write_f32(q.z);
    }

    /// Write a null-terminated string
    pub fn write_cstr(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

/// Cursor over a byte slice reading little-endian values
#[derive(Debug, Clone)]
pub struct BinaryReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BinaryReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], FormatError> {
        if self.remaining() < len {
            return Err(FormatError::Truncated {
                offset: self.pos,
                needed: len,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), FormatError> {
        self.read_bytes(len).map(|_| ())
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], FormatError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    pub fn read_u8(&mut self) -> Result<u8, FormatError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16(&mut self) -> Result<u16, FormatError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32(&mut self) -> Result<u32, FormatError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32(&mut self) -> Result<f32, FormatError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_vec3(&mut self) -> Result<Vec3, FormatError> {
        Ok(Vec3::new(self.read_f32()?, self.read_f32()?, self.read_f32()?))
    }

    /// Read a w-first quaternion
    pub fn read_quat(&mut self) -> Result<Quat, FormatError> {
        let w = self.read_f32()?;
        let x = self.read_f32()?;
        let y = self.read_f32()?;
        let z = self.read_f32()?;
        Ok(Quat::from_xyzw(x, y, z, w))
    }

    /// Read a null-terminated string
    pub fn read_cstr(&mut self) -> Result<String, FormatError> {
        let start = self.pos;
        let rest = &self.data[start..];
        let len = rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(FormatError::Truncated {
                offset: start,
                needed: rest.len() + 1,
            })?;
        let s = std::str::from_utf8(&rest[..len])
            .map_err(|_| FormatError::InvalidString(start))?
            .to_string();
        self.pos += len + 1;
        Ok(s)
    }

    /// Read a 4-byte magic and compare it
    pub fn expect_magic(&mut self, expected: &[u8; 4]) -> Result<(), FormatError> {
        let found = self.read_array::<4>()?;
        if &found != expected {
            return Err(FormatError::BadMagic {
                found,
                expected: *expected,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quaternion_is_w_first() {
        let mut w = BinaryWriter::new();
        w.write_quat(Quat::from_xyzw(0.1, 0.2, 0.3, 0.9));
        let bytes = w.into_inner();
        assert_eq!(&bytes[0..4], &0.9f32.to_le_bytes());
        assert_eq!(&bytes[4..8], &0.1f32.to_le_bytes());
    }

    #[test]
    fn test_cstr_is_null_terminated() {
        let mut w = BinaryWriter::new();
        w.write_cstr("Bone");
        w.write_u8(7);
        let bytes = w.into_inner();
        assert_eq!(bytes, b"Bone\0\x07");

        let mut r = BinaryReader::new(&bytes);
        assert_eq!(r.read_cstr().unwrap(), "Bone");
        assert_eq!(r.read_u8().unwrap(), 7);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_truncated_read() {
        let mut r = BinaryReader::new(&[1, 2]);
        assert_eq!(
            r.read_u32(),
            Err(FormatError::Truncated {
                offset: 0,
                needed: 4
            })
        );
    }

    #[test]
    fn test_unterminated_string() {
        let mut r = BinaryReader::new(b"abc");
        assert!(r.read_cstr().is_err());
    }
}
