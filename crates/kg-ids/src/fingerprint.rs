use sha2::{Digest, Sha256};

/// Fingerprint is a deterministic, content-addressed hash used to derive
/// stable identity for points of interest and relationship evidence groups.
/// Hashing the same logical tuple always yields the same Fingerprint,
/// which is what lets upserts be idempotent across re-runs.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn of(fields: &[&str]) -> Self {
        let mut hasher = Sha256::new();
        for (i, field) in fields.iter().enumerate() {
            if i > 0 {
                hasher.update(b"\x1f"); // unit separator, avoids ambiguous concatenation
            }
            hasher.update(field.as_bytes());
        }
        Fingerprint(hasher.finalize().into())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Parses a fingerprint back out of the hex string stored in
    /// `run_manifests.fingerprint` or `resolved_relationships.fingerprint`.
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let bytes = hex::decode(s)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| hex::FromHexError::InvalidStringLength)?;
        Ok(Fingerprint(arr))
    }

    /// A 64-bit id derived from the fingerprint, suitable for use as a
    /// stable primary key when full 256-bit fingerprints aren't needed.
    pub fn to_id_bytes(&self) -> [u8; 8] {
        self.0[..8].try_into().unwrap()
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        <Self as std::fmt::Display>::fmt(self, f)
    }
}

impl serde::Serialize for Fingerprint {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_hex().serialize(serializer)
    }
}

impl<'de> serde::Deserialize<'de> for Fingerprint {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error;
        let s = std::borrow::Cow::<'de, str>::deserialize(deserializer)?;
        let bytes = hex::decode(s.as_ref()).map_err(D::Error::custom)?;
        let arr: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| D::Error::custom("fingerprint must be 32 bytes"))?;
        Ok(Fingerprint(arr))
    }
}

/// Deterministic fingerprint of a point of interest, per the shape
/// `{file_path, name, type, start_line, end_line}`.
pub fn poi_fingerprint(file_path: &str, name: &str, type_: &str, start_line: i32, end_line: i32) -> Fingerprint {
    Fingerprint::of(&[
        file_path,
        name,
        type_,
        &start_line.to_string(),
        &end_line.to_string(),
    ])
}

/// Deterministic fingerprint of a candidate relationship, per the shape
/// `hash(source_poi_id, target_poi_id, type)`. Independent analytical passes
/// that discover the same relationship converge on the same fingerprint,
/// which is the join key evidence accumulates under.
pub fn relationship_fingerprint(source_poi_id: &str, target_poi_id: &str, type_: &str) -> Fingerprint {
    Fingerprint::of(&[source_poi_id, target_poi_id, type_])
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn same_inputs_yield_same_fingerprint() {
        let a = poi_fingerprint("src/lib.rs", "run", "Function", 10, 20);
        let b = poi_fingerprint("src/lib.rs", "run", "Function", 10, 20);
        assert_eq!(a, b);
    }

    #[test]
    fn different_lines_yield_different_fingerprint() {
        let a = poi_fingerprint("src/lib.rs", "run", "Function", 10, 20);
        let b = poi_fingerprint("src/lib.rs", "run", "Function", 10, 21);
        assert_ne!(a, b);
    }

    #[test]
    fn hex_round_trips() {
        let a = poi_fingerprint("src/lib.rs", "run", "Function", 10, 20);
        let b = Fingerprint::from_hex(&a.to_hex()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn field_boundaries_are_not_ambiguous() {
        // Without a separator, ("ab", "c") and ("a", "bc") would collide.
        let a = Fingerprint::of(&["ab", "c"]);
        let b = Fingerprint::of(&["a", "bc"]);
        assert_ne!(a, b);
    }
}
