//! Status words returned by the token

use std::fmt;

/// How a status word should be treated by the layers above the codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    /// 90 00
    Ok,
    /// 61xx, 62xx and 63xx: processing completed with a remark
    Warning,
    /// The referenced applet, file or key version is absent
    NotFound,
    /// The card refused because of its security state
    SecurityRejected,
    /// Instruction or class unknown to the selected applet
    Unsupported,
    /// Anything else
    Failure,
}

/// SW1 SW2 trailer of a response APDU
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(u16);

impl StatusWord {
    /// Normal completion
    pub const OK: Self = Self(0x9000);
    /// Security status not satisfied
    pub const SECURITY_NOT_SATISFIED: Self = Self(0x6982);
    /// Conditions of use not satisfied
    pub const CONDITIONS_NOT_SATISFIED: Self = Self(0x6985);
    /// File or application not found
    pub const FILE_NOT_FOUND: Self = Self(0x6A82);
    /// Referenced data (for example a key version) not found
    pub const DATA_NOT_FOUND: Self = Self(0x6A88);
    /// Instruction not supported
    pub const INS_NOT_SUPPORTED: Self = Self(0x6D00);

    /// Build from the two trailer bytes
    pub const fn new(sw1: u8, sw2: u8) -> Self {
        Self(u16::from_be_bytes([sw1, sw2]))
    }

    /// Numeric value, SW1 in the high byte
    pub const fn code(self) -> u16 {
        self.0
    }

    /// Trailer bytes in wire order
    pub const fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    /// SW1
    pub const fn sw1(self) -> u8 {
        (self.0 >> 8) as u8
    }

    /// Classify for error handling
    pub const fn class(self) -> StatusClass {
        match self.to_bytes() {
            [0x90, 0x00] => StatusClass::Ok,
            [0x61..=0x63, _] => StatusClass::Warning,
            [0x6A, 0x82 | 0x88] => StatusClass::NotFound,
            [0x69, 0x82 | 0x83 | 0x85] => StatusClass::SecurityRejected,
            [0x6D | 0x6E, 0x00] => StatusClass::Unsupported,
            _ => StatusClass::Failure,
        }
    }

    /// True for 90 00 only
    pub const fn is_success(self) -> bool {
        self.0 == Self::OK.0
    }

    /// True when the card reports the referenced object as absent
    pub const fn is_not_found(self) -> bool {
        matches!(self.class(), StatusClass::NotFound)
    }
}

impl From<u16> for StatusWord {
    fn from(code: u16) -> Self {
        Self(code)
    }
}

impl From<[u8; 2]> for StatusWord {
    fn from([sw1, sw2]: [u8; 2]) -> Self {
        Self::new(sw1, sw2)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

impl fmt::Debug for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StatusWord({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_trailers() {
        assert_eq!(StatusWord::new(0x90, 0x00).class(), StatusClass::Ok);
        assert_eq!(StatusWord::new(0x63, 0xC2).class(), StatusClass::Warning);
        assert_eq!(StatusWord::DATA_NOT_FOUND.class(), StatusClass::NotFound);
        assert_eq!(StatusWord::FILE_NOT_FOUND.class(), StatusClass::NotFound);
        assert_eq!(StatusWord::CONDITIONS_NOT_SATISFIED.class(), StatusClass::SecurityRejected);
        assert_eq!(StatusWord::INS_NOT_SUPPORTED.class(), StatusClass::Unsupported);
        assert_eq!(StatusWord::new(0x6F, 0x00).class(), StatusClass::Failure);
    }

    #[test]
    fn byte_order() {
        let sw = StatusWord::from(0x6A88);
        assert_eq!(sw.to_bytes(), [0x6A, 0x88]);
        assert_eq!(sw.sw1(), 0x6A);
        assert_eq!(sw, StatusWord::new(0x6A, 0x88));
        assert_eq!(sw.to_string(), "6A88");
        assert!(sw.is_not_found());
        assert!(!sw.is_success());
    }
}
