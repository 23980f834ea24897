//! P-Data streaming adapters:
//! reading and writing command or data set streams
//! as sequences of presentation data values.

use std::{
    collections::VecDeque,
    io::{Read, Write},
};

use bytes::BytesMut;
use tracing::warn;

use crate::pdu::{PDataValueType, Pdu, PDU_HEADER_SIZE, PDV_HEADER_SIZE};

/// Determine the maximum length of a PDV payload
/// for the given maximum PDU length:
/// the PDU header and the PDV header must both fit within the limit.
#[inline]
fn calculate_max_data_len_single(max_pdu_length: u32) -> u32 {
    max_pdu_length - PDU_HEADER_SIZE - PDV_HEADER_SIZE
}

/// A P-Data value writer.
///
/// This exposes an API to iteratively construct and send Data messages
/// to another node.
/// Using this as a [standard writer](std::io::Write)
/// will automatically split the incoming bytes
/// into separate PDUs if they do not fit in a single one.
///
/// All fragments are flagged as command or data set fragments
/// according to the value type given at construction;
/// the last fragment of the stream is marked
/// once the writer is [finished](Self::finish) or dropped.
///
/// # Example
///
/// Use an association's `send_pdata` method
/// to create a new P-Data value writer.
///
/// ```no_run
/// # use std::io::Write;
/// # use dicomnet_ul::association::ClientAssociationOptions;
/// # use dicomnet_ul::pdu::PDataValueType;
/// # fn dicom_data() -> &'static [u8] { unimplemented!() }
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut association = ClientAssociationOptions::new()
///    .with_abstract_syntax("1.2.840.10008.1.1")
///    .establish("129.168.0.5:104")?;
///
/// let presentation_context_id = association.presentation_contexts()[0].id;
///
/// // send a DICOM object which may be split into multiple PDUs
/// let mut pdata = association.send_pdata(presentation_context_id, PDataValueType::Data);
/// pdata.write_all(dicom_data())?;
/// pdata.finish()?;
/// # Ok(())
/// # }
/// ```
#[must_use]
pub struct PDataWriter<W: Write> {
    buffer: Vec<u8>,
    stream: W,
    value_type: PDataValueType,
    max_data_len: u32,
}

impl<W> PDataWriter<W>
where
    W: Write,
{
    /// Construct a new P-Data value writer.
    ///
    /// `max_pdu_length` is the maximum length of each P-DATA-TF PDU,
    /// including its 6-byte header.
    pub(crate) fn new(
        stream: W,
        presentation_context_id: u8,
        value_type: PDataValueType,
        max_pdu_length: u32,
    ) -> Self {
        let max_data_length = calculate_max_data_len_single(max_pdu_length);
        let mut buffer = Vec::with_capacity((max_data_length + PDU_HEADER_SIZE) as usize);
        // initial buffer set up
        buffer.extend(&[
            // PDU-type + reserved byte
            0x04,
            0x00,
            // full PDU length, unknown at this point
            0xFF,
            0xFF,
            0xFF,
            0xFF,
            // presentation data length, unknown at this point
            0xFF,
            0xFF,
            0xFF,
            0xFF,
            // presentation context id
            presentation_context_id,
            // message control header, unknown at this point
            0xFF,
        ]);

        PDataWriter {
            stream,
            value_type,
            max_data_len: max_data_length,
            buffer,
        }
    }

    /// Declare to have finished sending P-Data fragments,
    /// thus emitting the last P-Data fragment PDU.
    ///
    /// This is also done automatically once the P-Data writer is dropped.
    pub fn finish(mut self) -> std::io::Result<()> {
        self.finish_impl()
    }

    /// Set up the P-Data PDU header for sending.
    fn setup_pdata_header(&mut self, is_last: bool) {
        let data_len = (self.buffer.len() - 12) as u32;

        // full PDU length (minus PDU type and reserved byte)
        let pdu_len = data_len + 4 + 2;
        let pdu_len_bytes = pdu_len.to_be_bytes();
        self.buffer[2..6].copy_from_slice(&pdu_len_bytes);

        // presentation data length (data + context id + control header)
        let pdv_data_len = data_len + 2;
        let data_len_bytes = pdv_data_len.to_be_bytes();
        self.buffer[6..10].copy_from_slice(&data_len_bytes);

        // message control header
        let mut header = 0x00;
        if self.value_type == PDataValueType::Command {
            header |= 0x01;
        }
        if is_last {
            header |= 0x02;
        }
        self.buffer[11] = header;
    }

    fn finish_impl(&mut self) -> std::io::Result<()> {
        if !self.buffer.is_empty() {
            // send last PDU
            self.setup_pdata_header(true);
            self.stream.write_all(&self.buffer[..])?;
            // clear buffer so that subsequent calls to `finish_impl`
            // do not send any more PDUs
            self.buffer.clear();
        }
        Ok(())
    }

    /// Use the current state of the buffer to send a new PDU.
    ///
    /// Pre-condition:
    /// the buffer must hold exactly one PDU's worth of data.
    fn dispatch_pdu(&mut self) -> std::io::Result<()> {
        debug_assert!(self.buffer.len() >= 12);
        self.setup_pdata_header(false);
        self.stream.write_all(&self.buffer)?;

        // back to just the header
        self.buffer.truncate(12);

        Ok(())
    }
}

impl<W> Write for PDataWriter<W>
where
    W: Write,
{
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let total_len = self.max_data_len as usize + 12;
        if self.buffer.len() + buf.len() <= total_len {
            // accumulate into buffer, do nothing
            self.buffer.extend(buf);
            Ok(buf.len())
        } else {
            // fill in the rest of the buffer, send PDU,
            // and leave out the rest for subsequent writes
            let buf = &buf[..total_len - self.buffer.len()];
            self.buffer.extend(buf);
            debug_assert_eq!(self.buffer.len(), total_len);
            self.dispatch_pdu()?;
            Ok(buf.len())
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        // do nothing
        Ok(())
    }
}

/// With the P-Data writer dropped,
/// this `Drop` implementation
/// will construct and emit the last P-Data fragment PDU
/// if there is any data left to send.
impl<W> Drop for PDataWriter<W>
where
    W: Write,
{
    fn drop(&mut self) {
        let _ = self.finish_impl();
    }
}

/// A P-Data value reader.
///
/// This exposes an API which provides a byte stream of data
/// by iteratively collecting Data messages from another node.
/// Using this as a [standard reader](std::io::Read)
/// will provide all incoming bytes,
/// even if they reside in separate PDUs,
/// until the last fragment of the stream is received.
#[must_use]
pub struct PDataReader<'a, R> {
    buffer: VecDeque<u8>,
    stream: R,
    read_buffer: &'a mut BytesMut,
    presentation_context_id: Option<u8>,
    max_data_length: u32,
    last_pdu: bool,
}

impl<'a, R> PDataReader<'a, R>
where
    R: Read,
{
    pub(crate) fn new(stream: R, max_data_length: u32, read_buffer: &'a mut BytesMut) -> Self {
        PDataReader {
            buffer: VecDeque::with_capacity(max_data_length as usize),
            stream,
            read_buffer,
            presentation_context_id: None,
            max_data_length,
            last_pdu: false,
        }
    }

    /// Declare no intention to read more PDUs from the remote node.
    ///
    /// Attempting to read more bytes
    /// will only consume the inner buffer and not result in
    /// more PDUs being received.
    pub fn stop_receiving(&mut self) -> std::io::Result<()> {
        self.last_pdu = true;
        Ok(())
    }
}

impl<R> Read for PDataReader<'_, R>
where
    R: Read,
{
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if self.buffer.is_empty() {
            if self.last_pdu {
                // reached the end of the P-Data stream
                return Ok(0);
            }

            let pdu = crate::association::read_pdu_from_wire(
                &mut self.stream,
                self.read_buffer,
                self.max_data_length,
                false,
            )
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

            match pdu {
                Pdu::PData { data } => {
                    for pdata_value in data {
                        self.presentation_context_id = match self.presentation_context_id {
                            None => Some(pdata_value.presentation_context_id),
                            Some(cid) if cid == pdata_value.presentation_context_id => Some(cid),
                            Some(cid) => {
                                warn!(
                                    "Received PData value of presentation context {}, but should be {}",
                                    pdata_value.presentation_context_id, cid
                                );
                                Some(cid)
                            }
                        };
                        self.buffer.extend(pdata_value.data);
                        self.last_pdu = pdata_value.is_last;
                    }
                }
                _ => {
                    return Err(std::io::Error::new(
                        std::io::ErrorKind::UnexpectedEof,
                        "Unexpected PDU type",
                    ))
                }
            }
        }
        Read::read(&mut self.buffer, buf)
    }
}
