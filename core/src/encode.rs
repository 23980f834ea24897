//! Data set encoding under the supported transfer syntaxes.

use byteordered::byteorder::{LittleEndian, WriteBytesExt};
use snafu::{Backtrace, ResultExt, Snafu};
use std::io::Write;

use crate::dataset::{Dataset, Element};
use crate::tag::Tag;
use crate::transfer_syntax::TransferSyntax;
use crate::value::PrimitiveValue;
use crate::vr::VR;

#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum EncodeError {
    /// The value cannot be represented under the declared VR.
    #[snafu(display("Invalid value for element {} with VR {}: {}", tag, vr, reason))]
    InvalidFormat {
        tag: Tag,
        vr: VR,
        reason: &'static str,
        backtrace: Backtrace,
    },

    /// Failed to write the encoded bytes.
    #[snafu(display("Failed to write element {}: {}", tag, source))]
    WriteValue {
        tag: Tag,
        source: std::io::Error,
        backtrace: Backtrace,
    },
}

pub type Result<T, E = EncodeError> = std::result::Result<T, E>;

/// Encode the data set into a byte vector
/// under the given transfer syntax.
///
/// Elements are emitted in ascending (group, element) order
/// and odd-length values are padded to an even length
/// with the padding byte of their VR.
pub fn encode_dataset(dataset: &Dataset, ts: TransferSyntax) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(dataset.len() * 16);
    write_dataset(&mut out, dataset, ts)?;
    Ok(out)
}

/// Encode the data set into the given writer
/// under the given transfer syntax.
pub fn write_dataset<W>(to: &mut W, dataset: &Dataset, ts: TransferSyntax) -> Result<()>
where
    W: Write,
{
    for element in dataset.iter() {
        match ts {
            TransferSyntax::ImplicitVRLittleEndian => write_element_implicit(to, element)?,
            TransferSyntax::ExplicitVRLittleEndian => write_element_explicit(to, element)?,
        }
    }
    Ok(())
}

fn write_element_implicit<W>(to: &mut W, element: &Element) -> Result<()>
where
    W: Write,
{
    let tag = element.tag();
    let bytes = value_bytes(element)?;

    to.write_u16::<LittleEndian>(tag.group())
        .context(WriteValueSnafu { tag })?;
    to.write_u16::<LittleEndian>(tag.element())
        .context(WriteValueSnafu { tag })?;
    to.write_u32::<LittleEndian>(bytes.len() as u32)
        .context(WriteValueSnafu { tag })?;
    to.write_all(&bytes).context(WriteValueSnafu { tag })?;
    Ok(())
}

fn write_element_explicit<W>(to: &mut W, element: &Element) -> Result<()>
where
    W: Write,
{
    let tag = element.tag();
    let vr = element.vr();
    let bytes = value_bytes(element)?;

    to.write_u16::<LittleEndian>(tag.group())
        .context(WriteValueSnafu { tag })?;
    to.write_u16::<LittleEndian>(tag.element())
        .context(WriteValueSnafu { tag })?;
    to.write_all(&vr.to_bytes())
        .context(WriteValueSnafu { tag })?;

    if vr.is_long() {
        // two reserved bytes, then a 4-byte length
        to.write_u16::<LittleEndian>(0)
            .context(WriteValueSnafu { tag })?;
        to.write_u32::<LittleEndian>(bytes.len() as u32)
            .context(WriteValueSnafu { tag })?;
    } else {
        snafu::ensure!(
            bytes.len() <= u16::MAX as usize,
            InvalidFormatSnafu {
                tag,
                vr,
                reason: "value too long for a 2-byte length field",
            }
        );
        to.write_u16::<LittleEndian>(bytes.len() as u16)
            .context(WriteValueSnafu { tag })?;
    }
    to.write_all(&bytes).context(WriteValueSnafu { tag })?;
    Ok(())
}

/// Produce the wire bytes of an element's value,
/// already padded to an even length.
fn value_bytes(element: &Element) -> Result<Vec<u8>> {
    let tag = element.tag();
    let vr = element.vr();

    let mut bytes = match (element.value(), vr) {
        (PrimitiveValue::Empty, _) => Vec::new(),
        (PrimitiveValue::Str(s), vr) if vr.is_string() => {
            check_text(tag, vr, s)?;
            s.as_bytes().to_vec()
        }
        (PrimitiveValue::Strs(values), vr) if vr.is_multi_string() => {
            for s in values {
                check_text(tag, vr, s)?;
            }
            values.join("\\").into_bytes()
        }
        (PrimitiveValue::U16(values), VR::US | VR::AT | VR::OW | VR::UN) => {
            let mut out = Vec::with_capacity(values.len() * 2);
            for v in values {
                out.write_u16::<LittleEndian>(*v).expect("writing to a vec");
            }
            out
        }
        (PrimitiveValue::U32(values), VR::UL | VR::UN) => {
            let mut out = Vec::with_capacity(values.len() * 4);
            for v in values {
                out.write_u32::<LittleEndian>(*v).expect("writing to a vec");
            }
            out
        }
        (PrimitiveValue::I16(values), VR::SS | VR::UN) => {
            let mut out = Vec::with_capacity(values.len() * 2);
            for v in values {
                out.write_i16::<LittleEndian>(*v).expect("writing to a vec");
            }
            out
        }
        (PrimitiveValue::I32(values), VR::SL | VR::UN) => {
            let mut out = Vec::with_capacity(values.len() * 4);
            for v in values {
                out.write_i32::<LittleEndian>(*v).expect("writing to a vec");
            }
            out
        }
        (PrimitiveValue::Bytes(bytes), vr) if !vr.is_string() => bytes.clone(),
        _ => {
            return InvalidFormatSnafu {
                tag,
                vr,
                reason: "value kind does not match the declared VR",
            }
            .fail()
        }
    };

    if bytes.len() % 2 == 1 {
        bytes.push(vr.padding());
    }
    Ok(bytes)
}

/// Verify that a string value is representable under the given textual VR.
fn check_text(tag: Tag, vr: VR, value: &str) -> Result<()> {
    // LT, ST and UT admit the control characters used for text layout
    let text_vr = matches!(vr, VR::LT | VR::ST | VR::UT);
    let ok = value.bytes().all(|b| {
        (0x20..=0x7E).contains(&b) || (text_vr && matches!(b, b'\n' | b'\r' | b'\x0c' | b'\t'))
    });
    snafu::ensure!(
        ok,
        InvalidFormatSnafu {
            tag,
            vr,
            reason: "text value contains bytes outside the representable set",
        }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Element;
    use crate::tag::tags;

    #[test]
    fn explicit_short_vr_element() {
        let mut ds = Dataset::new();
        ds.put(Element::new(tags::QUERY_RETRIEVE_LEVEL, VR::CS, "STUDY"));
        let bytes = encode_dataset(&ds, TransferSyntax::ExplicitVRLittleEndian).unwrap();
        assert_eq!(
            bytes,
            vec![
                0x08, 0x00, 0x52, 0x00, // tag
                b'C', b'S', // VR
                0x06, 0x00, // 2-byte length, padded to 6
                b'S', b'T', b'U', b'D', b'Y', b' ',
            ]
        );
    }

    #[test]
    fn implicit_element_with_nul_padding() {
        let mut ds = Dataset::new();
        ds.put(Element::new(
            tags::SOP_INSTANCE_UID,
            VR::UI,
            "1.2.840.999.1",
        ));
        let bytes = encode_dataset(&ds, TransferSyntax::ImplicitVRLittleEndian).unwrap();
        assert_eq!(&bytes[..8], &[0x08, 0x00, 0x18, 0x00, 14, 0, 0, 0]);
        assert_eq!(bytes[8 + 13], b'\0');
    }

    #[test]
    fn explicit_long_vr_element() {
        let mut ds = Dataset::new();
        ds.put(Element::new(tags::PIXEL_DATA, VR::OB, vec![1_u8, 2, 3, 4]));
        let bytes = encode_dataset(&ds, TransferSyntax::ExplicitVRLittleEndian).unwrap();
        assert_eq!(
            bytes,
            vec![
                0xE0, 0x7F, 0x10, 0x00, // tag
                b'O', b'B', 0x00, 0x00, // VR + reserved
                0x04, 0x00, 0x00, 0x00, // 4-byte length
                1, 2, 3, 4,
            ]
        );
    }

    #[test]
    fn rejects_unrepresentable_text() {
        let mut ds = Dataset::new();
        ds.put(Element::new(
            tags::PATIENT_NAME,
            VR::PN,
            "DOE\u{7}JOHN".to_string(),
        ));
        let err = encode_dataset(&ds, TransferSyntax::ExplicitVRLittleEndian).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidFormat { .. }));
    }

    #[test]
    fn rejects_mismatched_value_kind() {
        let mut ds = Dataset::new();
        ds.put(Element::new(tags::ROWS, VR::US, "512"));
        let err = encode_dataset(&ds, TransferSyntax::ImplicitVRLittleEndian).unwrap_err();
        assert!(matches!(err, EncodeError::InvalidFormat { .. }));
    }
}
