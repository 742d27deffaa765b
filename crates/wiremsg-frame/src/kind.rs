use std::fmt;

/// The message-kind code carried in every header.
///
/// Applications usually implement this for a fieldless enum. Decoding a
/// header whose code maps to no variant fails with
/// [`FrameError::UnknownKind`](crate::FrameError::UnknownKind).
pub trait MessageKind: Copy + Send + Sync + fmt::Debug + 'static {
    /// Wire code for this kind.
    fn code(self) -> u32;

    /// Kind for a wire code, if one exists.
    fn from_code(code: u32) -> Option<Self>;
}

/// Raw codes, for tools that pass kinds through without interpreting them.
impl MessageKind for u32 {
    fn code(self) -> u32 {
        self
    }

    fn from_code(code: u32) -> Option<Self> {
        Some(code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_codes_roundtrip() {
        assert_eq!(u32::from_code(7), Some(7));
        assert_eq!(42u32.code(), 42);
    }
}
