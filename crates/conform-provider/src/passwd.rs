use std::collections::BTreeMap;

use crate::error::ProviderError;

/// One password-database entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PwEntry {
    pub name: String,
    pub passwd: String,
    pub uid: u32,
    pub gid: u32,
    pub gecos: String,
    pub dir: String,
    pub shell: String,
}

/// One shadow-database entry. Ages are in days; `expire` is a day count
/// since the epoch. A password hash starting with `!` is a locked account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpEntry {
    pub name: String,
    pub passwd: String,
    pub min: u32,
    pub max: u32,
    pub warn: u32,
    pub inact: u32,
    pub expire: u32,
}

pub trait PasswdDb {
    fn get(&self, name: &str) -> Result<Option<PwEntry>, ProviderError>;
    fn create(&mut self, name: &str, uid: u32, gid: u32) -> Result<PwEntry, ProviderError>;
    fn put(&mut self, entry: &PwEntry) -> Result<(), ProviderError>;
    fn remove(&mut self, name: &str) -> Result<(), ProviderError>;

    fn lookup_uid(&self, name: &str) -> Result<Option<u32>, ProviderError> {
        Ok(self.get(name)?.map(|e| e.uid))
    }
}

pub trait ShadowDb {
    fn get(&self, name: &str) -> Result<Option<SpEntry>, ProviderError>;
    fn create(&mut self, name: &str) -> Result<SpEntry, ProviderError>;
    fn put(&mut self, entry: &SpEntry) -> Result<(), ProviderError>;
    fn remove(&mut self, name: &str) -> Result<(), ProviderError>;
}

// ── In-memory implementations ─────────────────────────────────────────────────

/// In-memory password database. All data is lost on drop; suitable for
/// tests and the simulated host.
#[derive(Debug, Clone, Default)]
pub struct MemoryPasswd {
    entries: BTreeMap<String, PwEntry>,
}

impl MemoryPasswd {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: PwEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl PasswdDb for MemoryPasswd {
    fn get(&self, name: &str) -> Result<Option<PwEntry>, ProviderError> {
        Ok(self.entries.get(name).cloned())
    }

    fn create(&mut self, name: &str, uid: u32, gid: u32) -> Result<PwEntry, ProviderError> {
        let entry = PwEntry {
            name: name.to_string(),
            passwd: "x".to_string(),
            uid,
            gid,
            gecos: String::new(),
            dir: String::new(),
            shell: String::new(),
        };
        self.entries.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    fn put(&mut self, entry: &PwEntry) -> Result<(), ProviderError> {
        self.entries.insert(entry.name.clone(), entry.clone());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), ProviderError> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProviderError::new("pwdb remove", format!("no such user '{}'", name)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryShadow {
    entries: BTreeMap<String, SpEntry>,
}

impl MemoryShadow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: SpEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }
}

impl ShadowDb for MemoryShadow {
    fn get(&self, name: &str) -> Result<Option<SpEntry>, ProviderError> {
        Ok(self.entries.get(name).cloned())
    }

    fn create(&mut self, name: &str) -> Result<SpEntry, ProviderError> {
        let entry = SpEntry {
            name: name.to_string(),
            passwd: String::new(),
            min: 0,
            max: 0,
            warn: 0,
            inact: 0,
            expire: 0,
        };
        self.entries.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    fn put(&mut self, entry: &SpEntry) -> Result<(), ProviderError> {
        self.entries.insert(entry.name.clone(), entry.clone());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), ProviderError> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProviderError::new("spdb remove", format!("no such user '{}'", name)))
    }
}
