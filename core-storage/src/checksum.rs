//! Streamed content digests
//!
//! The algorithm follows the expected digest: 32 hex characters is MD5, as
//! sent by older backends; anything else (and the no-checksum case) is
//! SHA-256. Data is always hashed in fixed-size chunks.

use core_async::io::{AsyncRead, AsyncReadExt};
use md5::Md5;
use sha2::{Digest, Sha256};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

impl ChecksumAlgorithm {
    pub fn for_expected(expected: Option<&str>) -> Self {
        match expected.map(str::trim).map(str::len) {
            Some(32) => Self::Md5,
            _ => Self::Sha256,
        }
    }

    /// Whether a stored digest can be compared against `expected` directly.
    pub fn comparable(stored: &str, expected: &str) -> bool {
        Self::for_expected(Some(stored)) == Self::for_expected(Some(expected))
    }
}

/// Incremental hasher over either algorithm.
pub enum ChecksumHasher {
    Md5(Md5),
    Sha256(Sha256),
}

impl ChecksumHasher {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Self::Md5(Md5::new()),
            ChecksumAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Md5(hasher) => hasher.update(data),
            Self::Sha256(hasher) => hasher.update(data),
        }
    }

    /// Lowercase hex digest.
    pub fn finalize(self) -> String {
        match self {
            Self::Md5(hasher) => hex::encode(hasher.finalize()),
            Self::Sha256(hasher) => hex::encode(hasher.finalize()),
        }
    }
}

impl std::fmt::Debug for ChecksumHasher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Md5(_) => f.write_str("ChecksumHasher::Md5"),
            Self::Sha256(_) => f.write_str("ChecksumHasher::Sha256"),
        }
    }
}

pub fn digest_bytes(algorithm: ChecksumAlgorithm, data: &[u8]) -> String {
    let mut hasher = ChecksumHasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Digests a reader to the end, returning `(hex digest, bytes read)`.
pub async fn digest_reader<R>(
    reader: &mut R,
    algorithm: ChecksumAlgorithm,
    chunk_size: usize,
) -> std::io::Result<(String, u64)>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut hasher = ChecksumHasher::new(algorithm);
    let mut buffer = vec![0u8; chunk_size.max(1)];
    let mut total = 0u64;

    loop {
        let read = reader.read(&mut buffer).await?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
        total += read as u64;
    }

    Ok((hasher.finalize(), total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_digests() {
        assert_eq!(
            digest_bytes(ChecksumAlgorithm::Md5, b"hello"),
            "5d41402abc4b2a76b9719d911017c592"
        );
        assert_eq!(
            digest_bytes(ChecksumAlgorithm::Sha256, b"hello"),
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_algorithm_selection() {
        assert_eq!(
            ChecksumAlgorithm::for_expected(Some("5d41402abc4b2a76b9719d911017c592")),
            ChecksumAlgorithm::Md5
        );
        assert_eq!(ChecksumAlgorithm::for_expected(None), ChecksumAlgorithm::Sha256);
        assert!(!ChecksumAlgorithm::comparable(
            "5d41402abc4b2a76b9719d911017c592",
            "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        ));
    }

    #[core_async::test]
    async fn test_streamed_digest_matches_one_shot() {
        let data = vec![7u8; 200_000];
        let mut reader = &data[..];
        let (digest, len) = digest_reader(&mut reader, ChecksumAlgorithm::Sha256, 4096)
            .await
            .unwrap();
        assert_eq!(len, 200_000);
        assert_eq!(digest, digest_bytes(ChecksumAlgorithm::Sha256, &data));
    }
}
