//! Value representation (VR) handling.

use std::fmt;
use std::str::FromStr;

/// An enum type for a DICOM value representation.
#[derive(Debug, Clone, Copy, Eq, Hash, PartialEq)]
pub enum VR {
    /// Application Entity
    AE,
    /// Age String
    AS,
    /// Attribute Tag
    AT,
    /// Code String
    CS,
    /// Date
    DA,
    /// Decimal String
    DS,
    /// Date Time
    DT,
    /// Floating Point Single
    FL,
    /// Floating Point Double
    FD,
    /// Integer String
    IS,
    /// Long String
    LO,
    /// Long Text
    LT,
    /// Other Byte
    OB,
    /// Other Double
    OD,
    /// Other Float
    OF,
    /// Other Long
    OL,
    /// Other Very Long
    OV,
    /// Other Word
    OW,
    /// Person Name
    PN,
    /// Short String
    SH,
    /// Signed Long
    SL,
    /// Sequence of Items
    SQ,
    /// Signed Short
    SS,
    /// Short Text
    ST,
    /// Signed Very Long
    SV,
    /// Time
    TM,
    /// Unlimited Characters
    UC,
    /// Unique Identifier
    UI,
    /// Unsigned Long
    UL,
    /// Unknown
    UN,
    /// Universal Resource Identifier / Locator
    UR,
    /// Unsigned Short
    US,
    /// Unlimited Text
    UT,
    /// Unsigned Very Long
    UV,
}

impl VR {
    /// Obtain the value representation corresponding to the given two bytes.
    /// Each byte should be a lowercase or uppercase alphabetic character.
    pub fn from_binary(chars: [u8; 2]) -> Option<Self> {
        VR::from_str(std::str::from_utf8(chars.as_ref()).ok()?).ok()
    }

    /// Retrieve a string representation of this VR.
    pub fn to_string(self) -> &'static str {
        use VR::*;
        match self {
            AE => "AE",
            AS => "AS",
            AT => "AT",
            CS => "CS",
            DA => "DA",
            DS => "DS",
            DT => "DT",
            FL => "FL",
            FD => "FD",
            IS => "IS",
            LO => "LO",
            LT => "LT",
            OB => "OB",
            OD => "OD",
            OF => "OF",
            OL => "OL",
            OV => "OV",
            OW => "OW",
            PN => "PN",
            SH => "SH",
            SL => "SL",
            SQ => "SQ",
            SS => "SS",
            ST => "ST",
            SV => "SV",
            TM => "TM",
            UC => "UC",
            UI => "UI",
            UL => "UL",
            UN => "UN",
            UR => "UR",
            US => "US",
            UT => "UT",
            UV => "UV",
        }
    }

    /// Retrieve a copy of this VR's byte representation.
    /// The function returns 2 alphabetic characters in upper case.
    pub fn to_bytes(self) -> [u8; 2] {
        let bytes = self.to_string().as_bytes();
        [bytes[0], bytes[1]]
    }

    /// Whether this VR is encoded with a 4-byte length field
    /// preceded by two reserved bytes in Explicit VR transfer syntaxes.
    /// All other VRs use a 2-byte length field.
    pub fn is_long(self) -> bool {
        use VR::*;
        matches!(
            self,
            OB | OD | OF | OL | OV | OW | SQ | UC | UN | UR | UT | SV | UV
        )
    }

    /// Whether values of this VR are character strings.
    pub fn is_string(self) -> bool {
        use VR::*;
        matches!(
            self,
            AE | AS | CS | DA | DS | DT | IS | LO | LT | PN | SH | ST | TM | UC | UI | UR | UT
        )
    }

    /// Whether values of this VR may hold multiple values
    /// separated by a backslash (`\`).
    pub fn is_multi_string(self) -> bool {
        use VR::*;
        self.is_string() && !matches!(self, LT | ST | UT | UR)
    }

    /// The byte used to pad odd-length values of this VR to an even length.
    /// UI values are padded with a trailing NUL,
    /// the other textual VRs with a trailing space,
    /// and binary VRs with a zero byte.
    pub fn padding(self) -> u8 {
        match self {
            VR::UI => b'\0',
            vr if vr.is_string() => b' ',
            _ => 0x00,
        }
    }
}

impl fmt::Display for VR {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(VR::to_string(*self))
    }
}

impl FromStr for VR {
    type Err = ();

    fn from_str(string: &str) -> Result<Self, Self::Err> {
        use VR::*;
        match string {
            "AE" => Ok(AE),
            "AS" => Ok(AS),
            "AT" => Ok(AT),
            "CS" => Ok(CS),
            "DA" => Ok(DA),
            "DS" => Ok(DS),
            "DT" => Ok(DT),
            "FL" => Ok(FL),
            "FD" => Ok(FD),
            "IS" => Ok(IS),
            "LO" => Ok(LO),
            "LT" => Ok(LT),
            "OB" => Ok(OB),
            "OD" => Ok(OD),
            "OF" => Ok(OF),
            "OL" => Ok(OL),
            "OV" => Ok(OV),
            "OW" => Ok(OW),
            "PN" => Ok(PN),
            "SH" => Ok(SH),
            "SL" => Ok(SL),
            "SQ" => Ok(SQ),
            "SS" => Ok(SS),
            "ST" => Ok(ST),
            "SV" => Ok(SV),
            "TM" => Ok(TM),
            "UC" => Ok(UC),
            "UI" => Ok(UI),
            "UL" => Ok(UL),
            "UN" => Ok(UN),
            "UR" => Ok(UR),
            "US" => Ok(US),
            "UT" => Ok(UT),
            "UV" => Ok(UV),
            _ => Err(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::VR;

    #[test]
    fn vr_from_binary() {
        assert_eq!(VR::from_binary([b'U', b'I']), Some(VR::UI));
        assert_eq!(VR::from_binary([b'O', b'B']), Some(VR::OB));
        assert_eq!(VR::from_binary([b'z', b'z']), None);
    }

    #[test]
    fn long_vr_classification() {
        for vr in [
            VR::OB,
            VR::OD,
            VR::OF,
            VR::OL,
            VR::OV,
            VR::OW,
            VR::SQ,
            VR::UC,
            VR::UN,
            VR::UR,
            VR::UT,
            VR::SV,
            VR::UV,
        ] {
            assert!(vr.is_long(), "{} should be a long VR", vr);
        }
        for vr in [VR::AE, VR::CS, VR::LT, VR::PN, VR::ST, VR::UI, VR::US] {
            assert!(!vr.is_long(), "{} should be a short VR", vr);
        }
    }

    #[test]
    fn padding_bytes() {
        assert_eq!(VR::UI.padding(), b'\0');
        assert_eq!(VR::PN.padding(), b' ');
        assert_eq!(VR::OB.padding(), 0x00);
    }
}
