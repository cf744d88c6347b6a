//! A small growable byte buffer used across family session code.
//! `Vec<u8>` already does all of this; `Buffer` exists only so that code
//! reads with one shared vocabulary (clear/reserve/resize/append) instead
//! of ad-hoc `Vec` calls scattered everywhere.

#[derive(Debug, Default, Clone)]
pub struct Buffer {
    data: Vec<u8>,
}

impl Buffer {
    pub fn new() -> Self {
        Self { data: Vec::new() }
    }

    pub fn with_capacity(cap: usize) -> Self {
        Self {
            data: Vec::with_capacity(cap),
        }
    }

    pub fn clear(&mut self) {
        self.data.clear();
    }

    pub fn reserve(&mut self, additional: usize) {
        self.data.reserve(additional);
    }

    pub fn resize(&mut self, len: usize, value: u8) {
        self.data.resize(len, value);
    }

    pub fn append(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_resize() {
        let mut buf = Buffer::new();
        buf.append(&[1, 2, 3]);
        buf.resize(5, 0xAA);
        assert_eq!(buf.as_slice(), &[1, 2, 3, 0xAA, 0xAA]);
        buf.clear();
        assert!(buf.is_empty());
    }
}
