//! Bit granular cursor over a byte buffer.
//!
//! Bits are addressed MSB first. The cursor tracks the current byte and the
//! next free bit inside it, where offset `7` means the most significant bit is
//! untouched and offset `0` means only the least significant bit remains.

/// Returned when a read or write doesn't fit into the underlying buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BitCursorError {
    #[error("requested {requested} bits but only {remaining} bits are left in the buffer")]
    OutOfBounds { requested: usize, remaining: usize },
    #[error("source holds {available} bits, cannot copy {requested} bits")]
    SourceTooShort { requested: usize, available: usize },
    #[error("destination holds {available} bits, cannot store {requested} bits")]
    DestinationTooShort { requested: usize, available: usize },
    #[error("cannot transfer {0} bits in a single value, maximum is 64")]
    ValueTooWide(usize),
    #[error("cursor is not on a byte boundary")]
    Unaligned,
}

/// Cursor over a byte buffer with a sub-byte position
///
/// `BitCursor<&mut [u8]>` can read and write, `BitCursor<&[u8]>` can only read.
#[derive(Debug)]
pub struct BitCursor<B> {
    buf: B,
    byte_index: usize,
    bit_offset: u8,
}

fn mask(bits: usize) -> u32 {
    (1u32 << bits) - 1
}

impl<B: AsRef<[u8]>> BitCursor<B> {
    /// Create a cursor at the first bit of `buf`
    pub fn new(buf: B) -> Self {
        Self {
            buf,
            byte_index: 0,
            bit_offset: 7,
        }
    }

    /// Create a cursor at the given absolute bit position
    pub fn at(buf: B, bit_position: usize) -> Self {
        Self {
            buf,
            byte_index: bit_position / 8,
            bit_offset: 7 - (bit_position % 8) as u8,
        }
    }

    pub fn byte_index(&self) -> usize {
        self.byte_index
    }

    pub fn bit_offset(&self) -> u8 {
        self.bit_offset
    }

    /// Absolute position of the next bit, counted from the start of the buffer
    pub fn bit_position(&self) -> usize {
        self.byte_index * 8 + usize::from(7 - self.bit_offset)
    }

    /// Number of bytes touched so far, a partially used byte counts as a whole one
    pub fn byte_len(&self) -> usize {
        self.bit_position().div_ceil(8)
    }

    pub fn remaining_bits(&self) -> usize {
        (self.buf.as_ref().len() * 8).saturating_sub(self.bit_position())
    }

    pub fn is_byte_aligned(&self) -> bool {
        self.bit_offset == 7
    }

    pub fn into_inner(self) -> B {
        self.buf
    }

    fn ensure_remaining(&self, requested: usize) -> Result<(), BitCursorError> {
        let remaining = self.remaining_bits();

        if remaining < requested {
            return Err(BitCursorError::OutOfBounds {
                requested,
                remaining,
            });
        }

        Ok(())
    }

    fn advance(&mut self, bits: usize) {
        let position = self.bit_position() + bits;

        self.byte_index = position / 8;
        self.bit_offset = 7 - (position % 8) as u8;
    }

    /// Skip `count` bits without interpreting them
    pub fn skip_bits(&mut self, count: usize) -> Result<(), BitCursorError> {
        self.ensure_remaining(count)?;
        self.advance(count);
        Ok(())
    }

    /// Read up to 8 bits, returned in the low bits of the result
    fn take(&mut self, bits: usize) -> u8 {
        debug_assert!((1..=8).contains(&bits));

        let buf = self.buf.as_ref();
        let free = usize::from(self.bit_offset) + 1;
        let current = u32::from(buf[self.byte_index]);

        let value = if bits <= free {
            (current >> (free - bits)) & mask(bits)
        } else {
            // Combine the tail of this byte with the head of the next one
            let spill = bits - free;
            let next = u32::from(buf[self.byte_index + 1]);

            ((current & mask(free)) << spill) | (next >> (8 - spill))
        };

        self.advance(bits);

        value as u8
    }

    /// Read `count` bits into `dst`, MSB first
    ///
    /// Unused low bits of the last written byte in `dst` are set to zero.
    pub fn read_bits(&mut self, count: usize, dst: &mut [u8]) -> Result<(), BitCursorError> {
        if dst.len() * 8 < count {
            return Err(BitCursorError::DestinationTooShort {
                requested: count,
                available: dst.len() * 8,
            });
        }

        self.ensure_remaining(count)?;

        let mut read = 0;
        while read < count {
            let bits = (count - read).min(8);
            let value = self.take(bits);

            dst[read / 8] = ((u32::from(value) << (8 - bits)) & 0xFF) as u8;
            read += bits;
        }

        Ok(())
    }

    /// Read `count` bits as an unsigned integer
    pub fn read_value(&mut self, count: usize) -> Result<u64, BitCursorError> {
        if count > 64 {
            return Err(BitCursorError::ValueTooWide(count));
        }

        self.ensure_remaining(count)?;

        let mut value = 0u64;
        let mut remaining = count;
        while remaining > 0 {
            let bits = remaining.min(8);
            value = (value << bits) | u64::from(self.take(bits));
            remaining -= bits;
        }

        Ok(value)
    }
}

impl<'a> BitCursor<&'a [u8]> {
    /// Borrow the next `len` bytes of the buffer without copying
    pub fn read_aligned_slice(&mut self, len: usize) -> Result<&'a [u8], BitCursorError> {
        if !self.is_byte_aligned() {
            return Err(BitCursorError::Unaligned);
        }

        self.ensure_remaining(len * 8)?;

        let buf: &'a [u8] = self.buf;
        let slice = &buf[self.byte_index..self.byte_index + len];
        self.advance(len * 8);

        Ok(slice)
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> BitCursor<B> {
    /// Write the low `bits` bits of `value`, leaving all other bits of the touched bytes intact
    fn put(&mut self, value: u8, bits: usize) {
        debug_assert!((1..=8).contains(&bits));

        let index = self.byte_index;
        let free = usize::from(self.bit_offset) + 1;
        let value = u32::from(value) & mask(bits);
        let buf = self.buf.as_mut();

        if bits <= free {
            let shift = free - bits;
            let field = mask(bits) << shift;
            let current = u32::from(buf[index]);

            buf[index] = ((current & !field) | (value << shift)) as u8;
        } else {
            let spill = bits - free;

            let field = mask(free);
            let current = u32::from(buf[index]);
            buf[index] = ((current & !field) | (value >> spill)) as u8;

            let field = mask(spill) << (8 - spill);
            let next = u32::from(buf[index + 1]);
            buf[index + 1] = ((next & !field) | ((value & mask(spill)) << (8 - spill))) as u8;
        }

        self.advance(bits);
    }

    /// Write the first `count` bits of `src` (MSB first) at the current position
    pub fn write_bits(&mut self, src: &[u8], count: usize) -> Result<(), BitCursorError> {
        if src.len() * 8 < count {
            return Err(BitCursorError::SourceTooShort {
                requested: count,
                available: src.len() * 8,
            });
        }

        self.ensure_remaining(count)?;

        let mut written = 0;
        while written < count {
            let bits = (count - written).min(8);
            let byte = src[written / 8] >> (8 - bits);

            self.put(byte, bits);
            written += bits;
        }

        Ok(())
    }

    /// Write the low `count` bits of `value`
    pub fn write_value(&mut self, value: u64, count: usize) -> Result<(), BitCursorError> {
        if count > 64 {
            return Err(BitCursorError::ValueTooWide(count));
        }

        self.ensure_remaining(count)?;

        let mut remaining = count;
        while remaining > 0 {
            let bits = remaining.min(8);
            let chunk = (value >> (remaining - bits)) as u8;

            self.put(chunk, bits);
            remaining -= bits;
        }

        Ok(())
    }

    /// Zero fill up to the next byte boundary, returns the number of bits written
    pub fn align_to_byte(&mut self) -> Result<usize, BitCursorError> {
        let padding = (8 - self.bit_position() % 8) % 8;

        self.write_value(0, padding)?;

        Ok(padding)
    }
}
