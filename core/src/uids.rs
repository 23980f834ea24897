//! Well-known DICOM unique identifiers
//! used throughout the networking stack.

/// Application context name for the DICOM application context.
pub const APPLICATION_CONTEXT_NAME: &str = "1.2.840.10008.3.1.1.1";

/// Implicit VR Little Endian: default transfer syntax for DICOM.
pub const IMPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2";
/// Explicit VR Little Endian.
pub const EXPLICIT_VR_LITTLE_ENDIAN: &str = "1.2.840.10008.1.2.1";

/// Verification SOP Class (C-ECHO).
pub const VERIFICATION: &str = "1.2.840.10008.1.1";

// Query/Retrieve information models

/// Patient Root Query/Retrieve Information Model - FIND.
pub const PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND: &str = "1.2.840.10008.5.1.4.1.2.1.1";
/// Patient Root Query/Retrieve Information Model - MOVE.
pub const PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE: &str = "1.2.840.10008.5.1.4.1.2.1.2";
/// Patient Root Query/Retrieve Information Model - GET.
pub const PATIENT_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_GET: &str = "1.2.840.10008.5.1.4.1.2.1.3";
/// Study Root Query/Retrieve Information Model - FIND.
pub const STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";
/// Study Root Query/Retrieve Information Model - MOVE.
pub const STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE: &str = "1.2.840.10008.5.1.4.1.2.2.2";
/// Study Root Query/Retrieve Information Model - GET.
pub const STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_GET: &str = "1.2.840.10008.5.1.4.1.2.2.3";
/// Patient/Study Only Query/Retrieve Information Model - FIND.
pub const PATIENT_STUDY_ONLY_QUERY_RETRIEVE_INFORMATION_MODEL_FIND: &str =
    "1.2.840.10008.5.1.4.1.2.3.1";
/// Patient/Study Only Query/Retrieve Information Model - MOVE.
pub const PATIENT_STUDY_ONLY_QUERY_RETRIEVE_INFORMATION_MODEL_MOVE: &str =
    "1.2.840.10008.5.1.4.1.2.3.2";
/// Patient/Study Only Query/Retrieve Information Model - GET.
pub const PATIENT_STUDY_ONLY_QUERY_RETRIEVE_INFORMATION_MODEL_GET: &str =
    "1.2.840.10008.5.1.4.1.2.3.3";

// Storage SOP classes named by the tests and examples;
// any other storage SOP class is recognized through `is_storage_sop_class`.

/// Computed Radiography Image Storage.
pub const COMPUTED_RADIOGRAPHY_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.1";
/// CT Image Storage.
pub const CT_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.2";
/// MR Image Storage.
pub const MR_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.4";
/// Ultrasound Image Storage.
pub const ULTRASOUND_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.6.1";
/// Secondary Capture Image Storage.
pub const SECONDARY_CAPTURE_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.7";
/// Digital Mammography X-Ray Image Storage (for presentation).
pub const DIGITAL_MAMMOGRAPHY_X_RAY_IMAGE_STORAGE_FOR_PRESENTATION: &str =
    "1.2.840.10008.5.1.4.1.1.1.2";
/// Positron Emission Tomography Image Storage.
pub const POSITRON_EMISSION_TOMOGRAPHY_IMAGE_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.128";
/// Encapsulated PDF Storage.
pub const ENCAPSULATED_PDF_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.1";

/// Composite object storage SOP classes all live under this root.
const STORAGE_SOP_CLASS_ROOT: &str = "1.2.840.10008.5.1.4.1.1.";

/// Whether the given UID identifies a composite object storage SOP class,
/// i.e. an abstract syntax that a C-STORE operation may be performed on.
/// Storage SOP classes are recognized as a family
/// so that new storage classes do not require a dictionary update.
pub fn is_storage_sop_class(uid: &str) -> bool {
    let uid = uid.trim_end_matches(|c: char| c.is_whitespace() || c == '\0');
    uid.starts_with(STORAGE_SOP_CLASS_ROOT) && uid.len() > STORAGE_SOP_CLASS_ROOT.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_sop_class_family() {
        assert!(is_storage_sop_class(CT_IMAGE_STORAGE));
        assert!(is_storage_sop_class(ENCAPSULATED_PDF_STORAGE));
        // trailing NUL padding from the wire
        assert!(is_storage_sop_class("1.2.840.10008.5.1.4.1.1.2\0"));
        assert!(!is_storage_sop_class(VERIFICATION));
        assert!(!is_storage_sop_class(
            STUDY_ROOT_QUERY_RETRIEVE_INFORMATION_MODEL_FIND
        ));
    }
}
