//! Engine configuration
use super::error::{Result, StoreContext};
use chrono::{FixedOffset, Offset, Utc};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct Config {
    path: Option<PathBuf>,
    temporary: bool,
    utc_offset: FixedOffset,
    max_mint_attempts: u32,
    verify_contract_numbers: bool,
    lenient_revisions: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: None,
            temporary: false,
            utc_offset: Utc.fix(),
            max_mint_attempts: 16,
            verify_contract_numbers: false,
            lenient_revisions: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }
    /// The database is removed when dropped.
    pub fn set_temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }
    /// Business time zone used to date approvals.
    pub fn set_utc_offset(mut self, offset: FixedOffset) -> Self {
        self.utc_offset = offset;
        self
    }
    pub fn set_max_mint_attempts(mut self, attempts: u32) -> Self {
        self.max_mint_attempts = attempts;
        self
    }
    /// Check freshly minted contract numbers for collisions the way
    /// quotation numbers always are.
    pub fn set_verify_contract_numbers(mut self, verify: bool) -> Self {
        self.verify_contract_numbers = verify;
        self
    }
    /// Revise numbers that fail to parse positionally instead of rejecting them.
    pub fn set_lenient_revisions(mut self, lenient: bool) -> Self {
        self.lenient_revisions = lenient;
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
    pub fn utc_offset(&self) -> FixedOffset {
        self.utc_offset
    }
    pub fn max_mint_attempts(&self) -> u32 {
        self.max_mint_attempts.max(1)
    }
    pub fn verify_contract_numbers(&self) -> bool {
        self.verify_contract_numbers
    }
    pub fn lenient_revisions(&self) -> bool {
        self.lenient_revisions
    }

    pub fn open(&self) -> Result<sled::Db> {
        let mut config = sled::Config::new().temporary(self.temporary);
        if let Some(path) = &self.path {
            config = config.path(path);
        }
        config
            .open()
            .during(|| format!("opening database at {:?}", self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = Config::new();
        assert_eq!(config.utc_offset(), Utc.fix());
        assert_eq!(config.max_mint_attempts(), 16);
        assert!(!config.verify_contract_numbers());
        assert!(!config.lenient_revisions());
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        assert_eq!(Config::new().set_max_mint_attempts(0).max_mint_attempts(), 1);
    }

    #[test]
    fn opens_a_temporary_database() {
        let db = Config::new().set_temporary(true).open().unwrap();
        db.insert("k", "v").unwrap();
        assert!(db.contains_key("k").unwrap());
    }
}
