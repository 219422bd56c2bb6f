//! Serde helpers shared by records, snapshots and call values.

/// Serialize `Vec<u8>` as a standard base64 string.
///
/// ```ignore
/// #[derive(Serialize, Deserialize)]
/// struct Blob {
///     #[serde(with = "identity_registry::serde_helpers::base64_bytes")]
///     data: Vec<u8>,
/// }
/// ```
pub mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| de::Error::custom(format!("invalid base64: {e}")))
    }
}
