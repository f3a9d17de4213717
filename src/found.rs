use {
    crate::{Identifier, Key},
    serde::Serialize,
    std::{
        fs::OpenOptions,
        io::{self, Write},
        path::{Path, PathBuf},
    },
};

/// A private key whose identifier matched a target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundKey {
    pub private_key: Key,
    pub identifier: Identifier,
    /// Wallet import encoding, when the deriver provides one.
    pub wallet_import: Option<String>,
}

impl FoundKey {
    /// Private key as 64 hex digits.
    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key.to_be_bytes::<32>())
    }
}

#[derive(Serialize)]
struct FoundRecord<'a> {
    private_key: String,
    identifier: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    wif: Option<&'a str>,
}

/// Append-only file of found keys.
///
/// Each entry is a few human-readable lines followed by one JSON line with
/// the same data.
pub struct ResultSink {
    path: PathBuf,
}

impl ResultSink {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends `found` and syncs the file.
    pub fn write(&self, found: &FoundKey) -> io::Result<()> {
        let private_key = found.private_key_hex();
        let record = FoundRecord {
            private_key: private_key.clone(),
            identifier: &found.identifier,
            wif: found.wallet_import.as_deref(),
        };

        let mut entry = format!("Private key: {private_key}\n");
        if let Some(wif) = &found.wallet_import {
            entry.push_str(&format!("WIF: {wif}\n"));
        }
        entry.push_str(&format!("Public identifier: {}\n", found.identifier));
        entry.push_str(&serde_json::to_string(&record)?);
        entry.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(entry.as_bytes())?;
        file.sync_all()
    }
}
