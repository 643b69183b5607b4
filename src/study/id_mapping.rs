use sha2::{Digest, Sha224, Sha256};

use crate::study::StudyServiceError;

pub const ID_MAPPING_SAME: &str = "same";
pub const ID_MAPPING_SHA224: &str = "sha224";
pub const ID_MAPPING_SHA256: &str = "sha256";

/// One-way transform of a participant id into the id confidential
/// responses are stored under. An empty method means sha224.
pub fn participant_id_to_confidential_id(
    participant_id: &str,
    global_secret: &str,
    study_secret: &str,
    method: &str,
) -> Result<String, StudyServiceError> {
    let material = format!("{}{}{}", participant_id, study_secret, global_secret);
    match method {
        ID_MAPPING_SAME => Ok(participant_id.to_string()),
        ID_MAPPING_SHA224 | "" => Ok(hex::encode(Sha224::digest(material.as_bytes()))),
        ID_MAPPING_SHA256 => Ok(hex::encode(Sha256::digest(material.as_bytes()))),
        other => Err(StudyServiceError::UnsupportedIdMapping(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claim::assert_err;

    #[test]
    fn same_method_keeps_the_id() {
        let id = participant_id_to_confidential_id("p1", "g", "s", ID_MAPPING_SAME).unwrap();
        assert_eq!(id, "p1");
    }

    #[test]
    fn hashing_is_deterministic_and_secret_dependent() {
        let a = participant_id_to_confidential_id("p1", "g", "s", ID_MAPPING_SHA256).unwrap();
        let b = participant_id_to_confidential_id("p1", "g", "s", ID_MAPPING_SHA256).unwrap();
        let c = participant_id_to_confidential_id("p1", "g", "other", ID_MAPPING_SHA256).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn empty_method_defaults_to_sha224() {
        let default = participant_id_to_confidential_id("p1", "g", "s", "").unwrap();
        let sha224 = participant_id_to_confidential_id("p1", "g", "s", ID_MAPPING_SHA224).unwrap();
        assert_eq!(default, sha224);
        assert_eq!(default.len(), 56);
    }

    #[test]
    fn unknown_method_is_rejected() {
        assert_err!(participant_id_to_confidential_id("p1", "g", "s", "rot13"));
    }
}
