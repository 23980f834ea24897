use std::fmt;

use crate::uids;

/// One of the transfer syntaxes that the core can parse and encode itself.
///
/// Data sets in any other transfer syntax are transported opaquely:
/// their UIDs may still be negotiated at the association level,
/// but the payloads pass through as raw bytes.
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
pub enum TransferSyntax {
    /// Implicit VR Little Endian: default transfer syntax for DICOM.
    ImplicitVRLittleEndian,
    /// Explicit VR Little Endian.
    ExplicitVRLittleEndian,
}

impl TransferSyntax {
    /// Look up a decodable transfer syntax by its unique identifier.
    /// Trailing NUL padding in the UID is ignored.
    pub fn from_uid(uid: &str) -> Option<Self> {
        match uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0') {
            uids::IMPLICIT_VR_LITTLE_ENDIAN => Some(TransferSyntax::ImplicitVRLittleEndian),
            uids::EXPLICIT_VR_LITTLE_ENDIAN => Some(TransferSyntax::ExplicitVRLittleEndian),
            _ => None,
        }
    }

    /// Obtain the unique identifier of this transfer syntax.
    pub fn uid(self) -> &'static str {
        match self {
            TransferSyntax::ImplicitVRLittleEndian => uids::IMPLICIT_VR_LITTLE_ENDIAN,
            TransferSyntax::ExplicitVRLittleEndian => uids::EXPLICIT_VR_LITTLE_ENDIAN,
        }
    }
}

impl fmt::Display for TransferSyntax {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.uid())
    }
}

#[cfg(test)]
mod tests {
    use super::TransferSyntax;

    #[test]
    fn uid_round_trip() {
        assert_eq!(
            TransferSyntax::from_uid("1.2.840.10008.1.2"),
            Some(TransferSyntax::ImplicitVRLittleEndian)
        );
        assert_eq!(
            TransferSyntax::from_uid("1.2.840.10008.1.2.1\0"),
            Some(TransferSyntax::ExplicitVRLittleEndian)
        );
        assert_eq!(TransferSyntax::from_uid("1.2.840.10008.1.2.4.50"), None);
    }
}
