//! The in-memory DICOM data set.

use std::collections::btree_map::{self, BTreeMap};

use crate::dictionary;
use crate::tag::Tag;
use crate::value::PrimitiveValue;
use crate::vr::VR;

/// A DICOM data element with an owned primitive value.
#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    tag: Tag,
    vr: VR,
    value: PrimitiveValue,
}

impl Element {
    /// Create a new element with the given tag, VR and value.
    pub fn new<V>(tag: Tag, vr: VR, value: V) -> Self
    where
        V: Into<PrimitiveValue>,
    {
        Element {
            tag,
            vr,
            value: value.into(),
        }
    }

    /// Obtain the element's attribute tag.
    pub fn tag(&self) -> Tag {
        self.tag
    }

    /// Obtain the element's value representation.
    pub fn vr(&self) -> VR {
        self.vr
    }

    /// Obtain a reference to the element's value.
    pub fn value(&self) -> &PrimitiveValue {
        &self.value
    }

    /// Take the element's value.
    pub fn into_value(self) -> PrimitiveValue {
        self.value
    }
}

/// An in-memory DICOM data set:
/// an ordered collection of data elements, unique by tag.
///
/// Elements are iterated and encoded
/// in ascending (group, element) order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    elements: BTreeMap<Tag, Element>,
}

impl Dataset {
    /// Create an empty data set.
    pub fn new() -> Self {
        Dataset::default()
    }

    /// Insert an element into the data set,
    /// replacing any previous element with the same tag.
    pub fn put(&mut self, element: Element) -> Option<Element> {
        self.elements.insert(element.tag(), element)
    }

    /// Insert a string element,
    /// inferring the VR from the built-in dictionary.
    pub fn put_str(&mut self, tag: Tag, value: impl Into<String>) -> Option<Element> {
        self.put(Element::new(tag, dictionary::vr_of(tag), value.into()))
    }

    /// Obtain the element with the given tag, if present.
    pub fn element(&self, tag: Tag) -> Option<&Element> {
        self.elements.get(&tag)
    }

    /// Remove and return the element with the given tag, if present.
    pub fn remove(&mut self, tag: Tag) -> Option<Element> {
        self.elements.remove(&tag)
    }

    /// Obtain the single string value of the given element,
    /// if the element exists and holds a string.
    pub fn get_str(&self, tag: Tag) -> Option<&str> {
        self.element(tag).and_then(|e| e.value().to_str())
    }

    /// Obtain the first unsigned 16-bit value of the given element.
    pub fn get_u16(&self, tag: Tag) -> Option<u16> {
        self.element(tag).and_then(|e| e.value().to_u16())
    }

    /// The number of elements in the data set.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Whether the data set has no elements.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Iterate over the elements in ascending tag order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.elements.values()
    }
}

impl IntoIterator for Dataset {
    type Item = Element;
    type IntoIter = DatasetIntoIter;

    fn into_iter(self) -> Self::IntoIter {
        DatasetIntoIter {
            inner: self.elements.into_iter(),
        }
    }
}

/// An iterator over the owned elements of a data set.
pub struct DatasetIntoIter {
    inner: btree_map::IntoIter<Tag, Element>,
}

impl Iterator for DatasetIntoIter {
    type Item = Element;

    fn next(&mut self) -> Option<Element> {
        self.inner.next().map(|(_, e)| e)
    }
}

impl FromIterator<Element> for Dataset {
    fn from_iter<I: IntoIterator<Item = Element>>(iter: I) -> Self {
        let mut ds = Dataset::new();
        for element in iter {
            ds.put(element);
        }
        ds
    }
}
