/// Bitmap de un bloque: 1 bit por entrada, 1 = usado, 0 = libre.
/// El bit `i` vive en el byte `i / 8`, posición `i % 8` (LSB primero).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bytes: Vec<u8>,
    dirty: bool,
}

impl Bitmap {
    /// Bitmap vacío de `len_bytes` bytes (todo libre).
    pub fn zeroed(len_bytes: usize) -> Self {
        Self {
            bytes: vec![0u8; len_bytes],
            dirty: false,
        }
    }

    /// Toma el contenido de un bloque leído del disco.
    pub fn from_block(block: Vec<u8>) -> Self {
        Self {
            bytes: block,
            dirty: false,
        }
    }

    pub fn is_set(&self, index: u32) -> bool {
        let (byte, bit) = Self::position(index);
        (self.bytes[byte] >> bit) & 1 == 1
    }

    pub fn set(&mut self, index: u32) {
        let (byte, bit) = Self::position(index);
        let old = self.bytes[byte];
        self.bytes[byte] |= 1 << bit;
        self.dirty |= old != self.bytes[byte];
    }

    pub fn clear(&mut self, index: u32) {
        let (byte, bit) = Self::position(index);
        let old = self.bytes[byte];
        self.bytes[byte] &= !(1 << bit);
        self.dirty |= old != self.bytes[byte];
    }

    /// `true` si algún bit cambió desde que se cargó.
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    fn position(index: u32) -> (usize, u32) {
        ((index / 8) as usize, index % 8)
    }
}
