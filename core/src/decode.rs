//! Data set parsing under the supported transfer syntaxes.
//!
//! Parsing is deliberately tolerant:
//! when the remaining input is shorter than an element header
//! or than a declared value length,
//! the parser stops and returns the elements decoded so far.
//! This keeps short reads on streams
//! from corrupting an already decoded prefix.

use byteordered::byteorder::{ByteOrder, LittleEndian};
use smallvec::SmallVec;

use crate::dataset::{Dataset, Element};
use crate::dictionary;
use crate::tag::Tag;
use crate::transfer_syntax::TransferSyntax;
use crate::value::PrimitiveValue;
use crate::vr::VR;

/// Parse a data set from a byte slice under the given transfer syntax.
pub fn parse_dataset(data: &[u8], ts: TransferSyntax) -> Dataset {
    match ts {
        TransferSyntax::ImplicitVRLittleEndian => parse_implicit(data),
        TransferSyntax::ExplicitVRLittleEndian => parse_explicit(data),
    }
}

fn parse_implicit(data: &[u8]) -> Dataset {
    let mut dataset = Dataset::new();
    let mut offset = 0;

    while offset + 8 <= data.len() {
        let tag = Tag(
            LittleEndian::read_u16(&data[offset..]),
            LittleEndian::read_u16(&data[offset + 2..]),
        );
        let length = LittleEndian::read_u32(&data[offset + 4..]) as usize;
        let value_offset = offset + 8;

        if value_offset + length > data.len() {
            break;
        }

        let vr = dictionary::vr_of(tag);
        let value = decode_value(vr, &data[value_offset..value_offset + length]);
        dataset.put(Element::new(tag, vr, value));

        offset = value_offset + length;
        if length % 2 == 1 {
            // odd declared length, skip the wire padding byte
            offset += 1;
        }
    }

    dataset
}

fn parse_explicit(data: &[u8]) -> Dataset {
    let mut dataset = Dataset::new();
    let mut offset = 0;

    while offset + 8 <= data.len() {
        let tag = Tag(
            LittleEndian::read_u16(&data[offset..]),
            LittleEndian::read_u16(&data[offset + 2..]),
        );
        // an unrecognized VR code is read with the UN element form
        let vr = VR::from_binary([data[offset + 4], data[offset + 5]]).unwrap_or(VR::UN);

        let (length, value_offset) = if vr.is_long() {
            if offset + 12 > data.len() {
                break;
            }
            // two reserved bytes precede the 4-byte length
            (
                LittleEndian::read_u32(&data[offset + 8..]) as usize,
                offset + 12,
            )
        } else {
            (
                LittleEndian::read_u16(&data[offset + 6..]) as usize,
                offset + 8,
            )
        };

        if value_offset + length > data.len() {
            break;
        }

        let value = decode_value(vr, &data[value_offset..value_offset + length]);
        dataset.put(Element::new(tag, vr, value));

        offset = value_offset + length;
        if length % 2 == 1 {
            offset += 1;
        }
    }

    dataset
}

/// Interpret the raw value bytes according to the value representation.
fn decode_value(vr: VR, data: &[u8]) -> PrimitiveValue {
    if data.is_empty() {
        return PrimitiveValue::Empty;
    }

    if vr.is_string() {
        let text = String::from_utf8_lossy(data);
        let text = text.trim_end_matches(|c| c == '\0' || c == ' ');
        if vr.is_multi_string() && text.contains('\\') {
            return PrimitiveValue::Strs(text.split('\\').map(|s| s.trim().to_string()).collect());
        }
        return PrimitiveValue::Str(text.to_string());
    }

    match vr {
        VR::US | VR::AT => PrimitiveValue::U16(
            data.chunks_exact(2)
                .map(LittleEndian::read_u16)
                .collect::<SmallVec<_>>(),
        ),
        VR::UL => PrimitiveValue::U32(
            data.chunks_exact(4)
                .map(LittleEndian::read_u32)
                .collect::<SmallVec<_>>(),
        ),
        VR::SS => PrimitiveValue::I16(
            data.chunks_exact(2)
                .map(LittleEndian::read_i16)
                .collect::<SmallVec<_>>(),
        ),
        VR::SL => PrimitiveValue::I32(
            data.chunks_exact(4)
                .map(LittleEndian::read_i32)
                .collect::<SmallVec<_>>(),
        ),
        _ => PrimitiveValue::Bytes(data.to_vec()),
    }
}

#[cfg(test)]
mod tests {
    use super::parse_dataset;
    use crate::dataset::{Dataset, Element};
    use crate::encode::encode_dataset;
    use crate::tag::tags;
    use crate::{PrimitiveValue, Tag, TransferSyntax, VR};

    fn sample_identifier() -> Dataset {
        let mut ds = Dataset::new();
        ds.put(Element::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"));
        ds.put(Element::new(tags::PATIENT_NAME, VR::PN, "DOE^JOHN"));
        ds.put(Element::new(
            tags::STUDY_INSTANCE_UID,
            VR::UI,
            "1.2.3.4.5.6.7.8.1",
        ));
        ds.put(Element::new(tags::ROWS, VR::US, 512_u16));
        ds
    }

    #[test]
    fn round_trip_explicit() {
        let ds = sample_identifier();
        let bytes = encode_dataset(&ds, TransferSyntax::ExplicitVRLittleEndian).unwrap();
        let decoded = parse_dataset(&bytes, TransferSyntax::ExplicitVRLittleEndian);
        assert_eq!(decoded, ds);
    }

    #[test]
    fn round_trip_implicit() {
        let ds = sample_identifier();
        let bytes = encode_dataset(&ds, TransferSyntax::ImplicitVRLittleEndian).unwrap();
        let decoded = parse_dataset(&bytes, TransferSyntax::ImplicitVRLittleEndian);
        assert_eq!(decoded, ds);
    }

    #[test]
    fn multi_valued_strings() {
        let mut ds = Dataset::new();
        ds.put(Element::new(
            tags::MODALITY,
            VR::CS,
            vec!["CT".to_string(), "MR".to_string()],
        ));
        let bytes = encode_dataset(&ds, TransferSyntax::ExplicitVRLittleEndian).unwrap();
        let decoded = parse_dataset(&bytes, TransferSyntax::ExplicitVRLittleEndian);
        assert_eq!(
            decoded.element(tags::MODALITY).unwrap().value(),
            &PrimitiveValue::Strs(vec!["CT".into(), "MR".into()])
        );
    }

    #[test]
    fn truncated_tail_is_ignored() {
        let ds = sample_identifier();
        let mut bytes = encode_dataset(&ds, TransferSyntax::ExplicitVRLittleEndian).unwrap();
        // cut into the middle of the last element's value
        bytes.truncate(bytes.len() - 1);
        let decoded = parse_dataset(&bytes, TransferSyntax::ExplicitVRLittleEndian);
        assert_eq!(decoded.len(), ds.len() - 1);
        assert_eq!(decoded.get_str(tags::PATIENT_NAME), Some("DOE^JOHN"));
    }

    #[test]
    fn unknown_tag_decodes_as_un_in_implicit() {
        // (0099,0001), 4 raw bytes
        let bytes = [0x99, 0x00, 0x01, 0x00, 4, 0, 0, 0, 0xDE, 0xAD, 0xBE, 0xEF];
        let decoded = parse_dataset(&bytes, TransferSyntax::ImplicitVRLittleEndian);
        let element = decoded.element(Tag(0x0099, 0x0001)).unwrap();
        assert_eq!(element.vr(), VR::UN);
        assert_eq!(
            element.value(),
            &PrimitiveValue::Bytes(vec![0xDE, 0xAD, 0xBE, 0xEF])
        );
    }
}
