//! `hashlib` module: SHA-2 digests

use crate::value::{RuntimeError, Value};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use std::cell::RefCell;
use std::rc::Rc;

/// Running hash state behind a `HASH` object
#[derive(Clone)]
pub enum HashState {
    Sha224(Sha224),
    Sha256(Sha256),
    Sha384(Sha384),
    Sha512(Sha512),
}

impl HashState {
    /// Fresh state for an algorithm name
    pub fn new(name: &str) -> Option<Self> {
        match name {
            "sha224" => Some(HashState::Sha224(Sha224::new())),
            "sha256" => Some(HashState::Sha256(Sha256::new())),
            "sha384" => Some(HashState::Sha384(Sha384::new())),
            "sha512" => Some(HashState::Sha512(Sha512::new())),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            HashState::Sha224(_) => "sha224",
            HashState::Sha256(_) => "sha256",
            HashState::Sha384(_) => "sha384",
            HashState::Sha512(_) => "sha512",
        }
    }

    /// Output size in bytes
    pub fn digest_size(&self) -> usize {
        match self {
            HashState::Sha224(_) => 28,
            HashState::Sha256(_) => 32,
            HashState::Sha384(_) => 48,
            HashState::Sha512(_) => 64,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            HashState::Sha224(h) => h.update(data),
            HashState::Sha256(h) => h.update(data),
            HashState::Sha384(h) => h.update(data),
            HashState::Sha512(h) => h.update(data),
        }
    }

    /// Digest of everything fed so far; the state stays usable
    pub fn digest(&self) -> Vec<u8> {
        match self.clone() {
            HashState::Sha224(h) => h.finalize().to_vec(),
            HashState::Sha256(h) => h.finalize().to_vec(),
            HashState::Sha384(h) => h.finalize().to_vec(),
            HashState::Sha512(h) => h.finalize().to_vec(),
        }
    }

    pub fn hexdigest(&self) -> String {
        hex::encode(self.digest())
    }
}

/// Bytes accepted by `update()` and the constructors
pub(crate) fn hashable_bytes(value: &Value) -> Result<Rc<[u8]>, RuntimeError> {
    match value {
        Value::Bytes(bytes) => Ok(bytes.clone()),
        Value::Str(_) => Err(RuntimeError::type_error(
            "Strings must be encoded before hashing",
        )),
        other => Err(RuntimeError::type_error(format!(
            "object supporting the buffer API required, not '{}'",
            other.type_name()
        ))),
    }
}

/// `hashlib.sha256(data=b"")` and friends
pub(crate) fn construct(name: &str, data: Option<&Value>) -> Result<Value, RuntimeError> {
    let mut state = HashState::new(name).ok_or_else(|| {
        RuntimeError::value_error(format!("unsupported hash type {}", name))
    })?;
    if let Some(data) = data {
        state.update(&hashable_bytes(data)?);
    }
    Ok(Value::Hash(Rc::new(RefCell::new(state))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(
        "sha256",
        "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
    )]
    #[case("sha224", "ea09ae9cc6768c50fcee903ed054556e5bfc8347907f12598aa24193")]
    fn test_known_digests(#[case] name: &str, #[case] expected: &str) {
        let mut state = HashState::new(name).unwrap();
        state.update(b"hello");
        assert_eq!(state.hexdigest(), expected);
    }

    #[test]
    fn test_incremental_update_matches_one_shot() {
        let mut parts = HashState::new("sha512").unwrap();
        parts.update(b"hel");
        parts.update(b"lo");
        let mut whole = HashState::new("sha512").unwrap();
        whole.update(b"hello");
        assert_eq!(parts.digest(), whole.digest());
        assert_eq!(parts.digest().len(), parts.digest_size());
    }

    #[test]
    fn test_strings_must_be_encoded() {
        let err = construct("sha256", Some(&Value::str("pw"))).unwrap_err();
        assert_eq!(
            err.to_string(),
            "TypeError: Strings must be encoded before hashing"
        );
    }
}
