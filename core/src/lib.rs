//! This crate contains the foundation data types and codecs
//! used by the rest of the dicomnet project.
//!
//! - The [`tag`], [`vr`] and [`value`] modules
//!   provide the basic building blocks of DICOM data:
//!   attribute tags, value representations and primitive values.
//! - The [`dataset`] module provides [`Dataset`],
//!   an in-memory DICOM data set ordered by tag.
//! - The [`decode`] and [`encode`] modules
//!   implement the _Implicit VR Little Endian_
//!   and _Explicit VR Little Endian_ transfer syntaxes,
//!   which are the two syntaxes that the network core
//!   is required to parse and write itself.
//!   All other transfer syntaxes are negotiated and transported opaquely.
//! - The [`dictionary`] module holds the built-in tag → VR dictionary
//!   used when reading Implicit VR data sets.
//! - The [`uids`] module provides well-known unique identifiers.

pub mod dataset;
pub mod decode;
pub mod dictionary;
pub mod encode;
pub mod tag;
pub mod uids;
pub mod value;
pub mod vr;

mod transfer_syntax;

pub use dataset::{Dataset, Element};
pub use encode::EncodeError;
pub use tag::Tag;
pub use transfer_syntax::TransferSyntax;
pub use value::PrimitiveValue;
pub use vr::VR;
