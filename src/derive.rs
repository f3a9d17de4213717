use {
    crate::{Identifier, Key},
    auto_impl::auto_impl,
    k256::{SecretKey, elliptic_curve::sec1::ToEncodedPoint},
    ripemd::Ripemd160,
    sha2::{Digest, Sha256},
    std::str::FromStr,
};

/// Turns a private key into the public identifier targets are matched against.
///
/// Implementations must be cheap to share between worker threads: a single
/// deriver serves every worker of a run.
#[auto_impl(&, Box, Arc)]
pub trait Deriver: Send + Sync {
    /// Public identifier of `key`.
    ///
    /// `None` for keys that have no public counterpart (for secp256k1: zero
    /// and anything at or above the curve order). Such keys are skipped.
    fn derive(&self, key: &Key) -> Option<Identifier>;

    /// Wallet import encoding of `key`, recorded next to a found key.
    fn wallet_import(&self, _key: &Key) -> Option<String> {
        None
    }
}

/// Identifier produced by [`Secp256k1Deriver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdentifierFormat {
    /// Hex of the 65-byte SEC1 point, `04 || x || y`.
    #[default]
    UncompressedHex,

    /// Hex of the 33-byte SEC1 point, `02/03 || x`.
    CompressedHex,

    /// Base58Check P2PKH address of the compressed public key.
    P2pkh,
}

impl FromStr for IdentifierFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uncompressed" => Ok(Self::UncompressedHex),
            "compressed" => Ok(Self::CompressedHex),
            "p2pkh" => Ok(Self::P2pkh),
            other => Err(format!("unknown identifier format: {other}")),
        }
    }
}

/// Bitcoin (secp256k1) key derivation.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Deriver {
    format: IdentifierFormat,
}

impl Secp256k1Deriver {
    pub fn new(format: IdentifierFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> IdentifierFormat {
        self.format
    }
}

impl Deriver for Secp256k1Deriver {
    fn derive(&self, key: &Key) -> Option<Identifier> {
        let secret = SecretKey::from_slice(&key.to_be_bytes::<32>()).ok()?;
        let public = secret.public_key();
        Some(match self.format {
            IdentifierFormat::UncompressedHex => {
                hex::encode(public.to_encoded_point(false).as_bytes())
            }
            IdentifierFormat::CompressedHex => hex::encode(public.to_encoded_point(true).as_bytes()),
            IdentifierFormat::P2pkh => {
                let hash = hash160(public.to_encoded_point(true).as_bytes());
                let mut payload = Vec::with_capacity(21);
                payload.push(0x00);
                payload.extend_from_slice(&hash);
                base58check(payload)
            }
        })
    }

    fn wallet_import(&self, key: &Key) -> Option<String> {
        Some(to_wif(key))
    }
}

/// Private key to compressed-key WIF.
pub fn to_wif(key: &Key) -> String {
    let mut payload = Vec::with_capacity(38);
    payload.push(0x80);
    payload.extend_from_slice(&key.to_be_bytes::<32>());
    payload.push(0x01);
    base58check(payload)
}

/// HASH160 = RIPEMD160(SHA256(data)).
fn hash160(data: &[u8]) -> [u8; 20] {
    let mut out = [0u8; 20];
    out.copy_from_slice(&Ripemd160::digest(Sha256::digest(data)));
    out
}

fn base58check(mut payload: Vec<u8>) -> String {
    let checksum = Sha256::digest(Sha256::digest(&payload));
    payload.extend_from_slice(&checksum[..4]);
    bs58::encode(payload).into_string()
}
