use std::collections::BTreeMap;

use conform_domain::NameList;

use crate::error::ProviderError;

/// One group-database entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrEntry {
    pub name: String,
    pub passwd: String,
    pub gid: u32,
    pub members: NameList,
}

/// One gshadow-database entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SgEntry {
    pub name: String,
    pub passwd: String,
    pub admins: NameList,
    pub members: NameList,
}

pub trait GroupDb {
    fn get(&self, name: &str) -> Result<Option<GrEntry>, ProviderError>;
    fn create(&mut self, name: &str, gid: u32) -> Result<GrEntry, ProviderError>;
    fn put(&mut self, entry: &GrEntry) -> Result<(), ProviderError>;
    fn remove(&mut self, name: &str) -> Result<(), ProviderError>;

    fn lookup_gid(&self, name: &str) -> Result<Option<u32>, ProviderError> {
        Ok(self.get(name)?.map(|e| e.gid))
    }
}

pub trait GshadowDb {
    fn get(&self, name: &str) -> Result<Option<SgEntry>, ProviderError>;
    fn create(&mut self, name: &str) -> Result<SgEntry, ProviderError>;
    fn put(&mut self, entry: &SgEntry) -> Result<(), ProviderError>;
    fn remove(&mut self, name: &str) -> Result<(), ProviderError>;
}

// ── In-memory implementations ─────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct MemoryGroups {
    entries: BTreeMap<String, GrEntry>,
}

impl MemoryGroups {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: GrEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }
}

impl GroupDb for MemoryGroups {
    fn get(&self, name: &str) -> Result<Option<GrEntry>, ProviderError> {
        Ok(self.entries.get(name).cloned())
    }

    fn create(&mut self, name: &str, gid: u32) -> Result<GrEntry, ProviderError> {
        let entry = GrEntry {
            name: name.to_string(),
            passwd: "x".to_string(),
            gid,
            members: NameList::new(),
        };
        self.entries.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    fn put(&mut self, entry: &GrEntry) -> Result<(), ProviderError> {
        self.entries.insert(entry.name.clone(), entry.clone());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), ProviderError> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProviderError::new("grdb remove", format!("no such group '{}'", name)))
    }
}

#[derive(Debug, Clone, Default)]
pub struct MemoryGshadow {
    entries: BTreeMap<String, SgEntry>,
}

impl MemoryGshadow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, entry: SgEntry) {
        self.entries.insert(entry.name.clone(), entry);
    }
}

impl GshadowDb for MemoryGshadow {
    fn get(&self, name: &str) -> Result<Option<SgEntry>, ProviderError> {
        Ok(self.entries.get(name).cloned())
    }

    fn create(&mut self, name: &str) -> Result<SgEntry, ProviderError> {
        let entry = SgEntry {
            name: name.to_string(),
            passwd: String::new(),
            admins: NameList::new(),
            members: NameList::new(),
        };
        self.entries.insert(name.to_string(), entry.clone());
        Ok(entry)
    }

    fn put(&mut self, entry: &SgEntry) -> Result<(), ProviderError> {
        self.entries.insert(entry.name.clone(), entry.clone());
        Ok(())
    }

    fn remove(&mut self, name: &str) -> Result<(), ProviderError> {
        self.entries
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| ProviderError::new("sgdb remove", format!("no such group '{}'", name)))
    }
}
