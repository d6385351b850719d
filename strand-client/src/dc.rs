//! Static datacenter directory used to follow `*_MIGRATE_X` redirects.

use std::collections::HashMap;

/// Datacenter id → `host:port`.
#[derive(Clone, Debug, PartialEq)]
pub struct DcDirectory {
    addrs: HashMap<i32, String>,
}

impl DcDirectory {
    /// An empty directory.
    pub fn empty() -> Self {
        Self { addrs: HashMap::new() }
    }

    /// Add or replace the address of DC `id`.
    pub fn insert(&mut self, id: i32, addr: impl Into<String>) -> &mut Self {
        self.addrs.insert(id, addr.into());
        self
    }

    pub fn get(&self, id: i32) -> Option<&str> {
        self.addrs.get(&id).map(String::as_str)
    }

    pub fn len(&self) -> usize { self.addrs.len() }

    pub fn is_empty(&self) -> bool { self.addrs.is_empty() }
}

/// Production DCs 1–5.
impl Default for DcDirectory {
    fn default() -> Self {
        [
            (1, "149.154.175.53:443"),
            (2, "149.154.167.51:443"),
            (3, "149.154.175.100:443"),
            (4, "149.154.167.91:443"),
            (5, "91.108.56.130:443"),
        ]
        .into_iter()
        .collect()
    }
}

impl<S: Into<String>> FromIterator<(i32, S)> for DcDirectory {
    fn from_iter<I: IntoIterator<Item = (i32, S)>>(iter: I) -> Self {
        Self { addrs: iter.into_iter().map(|(id, addr)| (id, addr.into())).collect() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_covers_five_dcs() {
        let dcs = DcDirectory::default();
        assert_eq!(dcs.len(), 5);
        assert_eq!(dcs.get(2), Some("149.154.167.51:443"));
        assert_eq!(dcs.get(6), None);
    }

    #[test]
    fn entries_can_be_overridden() {
        let mut dcs = DcDirectory::default();
        dcs.insert(2, "127.0.0.1:4430");
        assert_eq!(dcs.get(2), Some("127.0.0.1:4430"));
    }
}
