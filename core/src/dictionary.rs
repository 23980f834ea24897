//! The built-in data element dictionary.
//!
//! Implicit VR data sets do not carry value representations on the wire,
//! so the decoder infers them from the attribute tag through this table.
//! The table is a closed set covering the command group
//! and the identifier elements exchanged by the composite services;
//! any other tag maps to [`VR::UN`].

use crate::tag::Tag;
use crate::vr::VR;

/// Obtain the value representation registered for the given tag,
/// falling back to `UN` for tags outside the built-in dictionary.
pub fn vr_of(tag: Tag) -> VR {
    match (tag.group(), tag.element()) {
        // command group
        (0x0000, 0x0000) => VR::UL,
        (0x0000, 0x0002) => VR::UI,
        (0x0000, 0x0003) => VR::UI,
        (0x0000, 0x0100) => VR::US,
        (0x0000, 0x0110) => VR::US,
        (0x0000, 0x0120) => VR::US,
        (0x0000, 0x0600) => VR::AE,
        (0x0000, 0x0700) => VR::US,
        (0x0000, 0x0800) => VR::US,
        (0x0000, 0x0900) => VR::US,
        (0x0000, 0x1000) => VR::UI,
        (0x0000, 0x1020) => VR::US,
        (0x0000, 0x1021) => VR::US,
        (0x0000, 0x1022) => VR::US,
        (0x0000, 0x1023) => VR::US,
        // identifier elements
        (0x0008, 0x0005) => VR::CS,
        (0x0008, 0x0016) => VR::UI,
        (0x0008, 0x0018) => VR::UI,
        (0x0008, 0x0020) => VR::DA,
        (0x0008, 0x0030) => VR::TM,
        (0x0008, 0x0050) => VR::SH,
        (0x0008, 0x0052) => VR::CS,
        (0x0008, 0x0054) => VR::AE,
        (0x0008, 0x0060) => VR::CS,
        (0x0008, 0x0080) => VR::LO,
        (0x0008, 0x0090) => VR::PN,
        (0x0008, 0x1030) => VR::LO,
        (0x0008, 0x103E) => VR::LO,
        (0x0008, 0x1050) => VR::PN,
        (0x0010, 0x0010) => VR::PN,
        (0x0010, 0x0020) => VR::LO,
        (0x0010, 0x0030) => VR::DA,
        (0x0010, 0x0040) => VR::CS,
        (0x0010, 0x1010) => VR::AS,
        (0x0018, 0x0015) => VR::CS,
        (0x0020, 0x000D) => VR::UI,
        (0x0020, 0x000E) => VR::UI,
        (0x0020, 0x0010) => VR::SH,
        (0x0020, 0x0011) => VR::IS,
        (0x0020, 0x0013) => VR::IS,
        (0x0020, 0x0020) => VR::CS,
        (0x0028, 0x0010) => VR::US,
        (0x0028, 0x0011) => VR::US,
        (0x0028, 0x0100) => VR::US,
        (0x7FE0, 0x0010) => VR::OW,
        _ => VR::UN,
    }
}

#[cfg(test)]
mod tests {
    use super::vr_of;
    use crate::tag::tags;
    use crate::{Tag, VR};

    #[test]
    fn command_group_vrs() {
        assert_eq!(vr_of(tags::COMMAND_GROUP_LENGTH), VR::UL);
        assert_eq!(vr_of(tags::COMMAND_FIELD), VR::US);
        assert_eq!(vr_of(tags::AFFECTED_SOP_CLASS_UID), VR::UI);
        assert_eq!(vr_of(tags::MOVE_DESTINATION), VR::AE);
    }

    #[test]
    fn unknown_tag_is_un() {
        assert_eq!(vr_of(Tag(0x0099, 0x0001)), VR::UN);
    }
}
