/// Tag byte of a tagged value inside a frame payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub u8);

impl Tag {
    pub const DEVICE_TYPE: Tag = Tag(0x01);
    pub const DEVICE_ID: Tag = Tag(0x02);
    pub const GETSET_NAME: Tag = Tag(0x03);
    pub const GETSET_VALUE: Tag = Tag(0x04);
    pub const ERROR_MESSAGE: Tag = Tag(0x05);
    pub const TUNER_COUNT: Tag = Tag(0x10);
    pub const BASE_URL: Tag = Tag(0x2A);
}

/// Largest length expressible by the two-byte length encoding.
pub const MAX_TAG_LENGTH: usize = 0x7FFF;

/// Builds a payload out of `[tag][length][value]` records.
#[derive(Debug, Default, Clone)]
pub struct TagWriter {
    buffer: Vec<u8>,
}

impl TagWriter {
    pub fn new() -> Self {
        TagWriter { buffer: Vec::new() }
    }

    /// Append the tag byte and a length prefix without any value bytes.
    /// `length` must not exceed [`MAX_TAG_LENGTH`].
    pub fn write_header(&mut self, tag: Tag, length: usize) -> &mut Self {
        debug_assert!(length <= MAX_TAG_LENGTH);
        self.buffer.push(tag.0);
        if length <= 0x7F {
            self.buffer.push(length as u8);
        } else {
            self.buffer.push((length as u8) | 0x80);
            self.buffer.push((length >> 7) as u8);
        }
        self
    }

    pub fn write_bytes(&mut self, tag: Tag, value: &[u8]) -> &mut Self {
        self.write_header(tag, value.len());
        self.buffer.extend_from_slice(value);
        self
    }

    pub fn write_u8(&mut self, tag: Tag, value: u8) -> &mut Self {
        self.write_bytes(tag, &[value])
    }

    pub fn write_u32(&mut self, tag: Tag, value: u32) -> &mut Self {
        self.write_bytes(tag, &value.to_be_bytes())
    }

    /// Append raw bytes that are not part of a record header.
    pub fn write_raw(&mut self, bytes: &[u8]) -> &mut Self {
        self.buffer.extend_from_slice(bytes);
        self
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}

/// Walks the tagged values of a payload.
///
/// Running out of bytes ends the iteration; truncated trailing records are
/// treated as "no more values" rather than an error.
#[derive(Debug, Clone)]
pub struct TagReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> TagReader<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        TagReader { buffer, position: 0 }
    }

    fn read_byte(&mut self) -> Option<u8> {
        let byte = *self.buffer.get(self.position)?;
        self.position += 1;
        Some(byte)
    }

    fn read_length(&mut self) -> Option<usize> {
        let first = self.read_byte()?;
        if first & 0x80 == 0 {
            return Some(first as usize);
        }
        let second = self.read_byte()?;
        Some(((second as usize) << 7) | (first & 0x7F) as usize)
    }

    /// Next `(tag, value)` record, or `None` once the buffer is exhausted.
    pub fn next_tag(&mut self) -> Option<(Tag, &'a [u8])> {
        let tag = Tag(self.read_byte()?);
        let length = self.read_length()?;
        let end = self.position.checked_add(length)?;
        let value = self.buffer.get(self.position..end)?;
        self.position = end;
        Some((tag, value))
    }
}

impl<'a> Iterator for TagReader<'a> {
    type Item = (Tag, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        self.next_tag()
    }
}

/// Big-endian `u32` from a value of exactly four bytes.
pub fn value_u32(value: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = value.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

/// Single-byte value.
pub fn value_u8(value: &[u8]) -> Option<u8> {
    match value {
        [byte] => Some(*byte),
        _ => None,
    }
}

/// String value with its trailing NUL, if any, stripped.
pub fn value_string(value: &[u8]) -> String {
    let trimmed = value.strip_suffix(&[0]).unwrap_or(value);
    String::from_utf8_lossy(trimmed).into_owned()
}
