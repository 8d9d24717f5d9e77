use adler32::RollingAdler32;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

pub const DIGEST_LEN: usize = 16;

/// Which 16-byte digest accompanies Adler-32 on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DigestAlgorithm {
    #[default]
    Md5,
    /// First 16 bytes of SHA-256.
    Sha256Truncated,
}

/// Adler-32 and digest over some run of bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Checksum {
    pub adler32: u32,
    pub digest: [u8; DIGEST_LEN],
}

impl Checksum {
    pub fn compute(algorithm: DigestAlgorithm, data: &[u8]) -> Self {
        let mut running = RunningChecksum::new(algorithm);
        running.update(data);
        running.finish()
    }
}

#[derive(Clone)]
enum DigestState {
    Md5(md5::Context),
    Sha256(Sha256),
}

impl DigestState {
    fn new(algorithm: DigestAlgorithm) -> Self {
        match algorithm {
            DigestAlgorithm::Md5 => DigestState::Md5(md5::Context::new()),
            DigestAlgorithm::Sha256Truncated => DigestState::Sha256(Sha256::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            DigestState::Md5(ctx) => ctx.consume(data),
            DigestState::Sha256(hasher) => hasher.update(data),
        }
    }

    fn finalize(self) -> [u8; DIGEST_LEN] {
        match self {
            DigestState::Md5(ctx) => ctx.compute().0,
            DigestState::Sha256(hasher) => {
                let full = hasher.finalize();
                let mut digest = [0u8; DIGEST_LEN];
                digest.copy_from_slice(&full[..DIGEST_LEN]);
                digest
            }
        }
    }
}

/// Checksum state carried across the slices of one segment.
///
/// The Adler-32 half is seeded from the previous value on every update, so
/// feeding slices one after another gives the same result as one pass over
/// their concatenation.
#[derive(Clone)]
pub struct RunningChecksum {
    algorithm: DigestAlgorithm,
    adler32: u32,
    digest: DigestState,
    bytes: u64,
}

impl RunningChecksum {
    pub fn new(algorithm: DigestAlgorithm) -> Self {
        Self {
            algorithm,
            adler32: RollingAdler32::new().hash(),
            digest: DigestState::new(algorithm),
            bytes: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        let mut rolling = RollingAdler32::from_value(self.adler32);
        rolling.update_buffer(data);
        self.adler32 = rolling.hash();
        self.digest.update(data);
        self.bytes += data.len() as u64;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    /// Checksum of everything fed so far, leaving the state usable.
    pub fn snapshot(&self) -> Checksum {
        Checksum {
            adler32: self.adler32,
            digest: self.digest.clone().finalize(),
        }
    }

    pub fn finish(self) -> Checksum {
        Checksum {
            adler32: self.adler32,
            digest: self.digest.finalize(),
        }
    }
}

impl fmt::Debug for RunningChecksum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunningChecksum")
            .field("algorithm", &self.algorithm)
            .field("adler32", &self.adler32)
            .field("bytes", &self.bytes)
            .finish()
    }
}
