use anyhow::anyhow;
use serde::{Deserialize, Serialize};
use std::{
    fmt::Display,
    hash::Hash,
    io::ErrorKind,
    str::FromStr,
    sync::{Arc, RwLock},
    time::Instant,
};

use crate::eid::Eid;

pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, Eq, Default, Serialize, Deserialize)]
pub struct Contact {
    pub id: u64,

    pub name: String,
    pub number: String,

    pub last_updated: String,
}

impl Hash for Contact {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state)
    }
}

impl PartialEq for Contact {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContactCreate {
    pub name: String,
    pub number: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ContactUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number: Option<String>,
}

impl ContactUpdate {
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.number.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub number: Option<String>,

    /// Free text matched against both name and number
    #[serde(default)]
    pub keyword: Option<String>,

    #[serde(default)]
    pub exact: bool,

    #[serde(default)]
    pub limit: Option<usize>,
}

impl SearchQuery {
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.name.is_none() && self.number.is_none() && self.keyword.is_none()
    }

    fn lowercase(&mut self) {
        self.name = self.name.as_ref().map(|name| name.to_lowercase());
        self.keyword = self.keyword.as_ref().map(|keyword| keyword.to_lowercase());
    }
}

/// Which table a contact lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sheet {
    #[default]
    Primary,
    Repeating,
}

impl Sheet {
    pub fn file_name(&self) -> &'static str {
        match self {
            Sheet::Primary => "contacts.csv",
            Sheet::Repeating => "repeating_contacts.csv",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sheet::Primary => "primary",
            Sheet::Repeating => "repeating",
        }
    }
}

impl Display for Sheet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Sheet {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" | "contacts" | "contacts.csv" => Ok(Sheet::Primary),
            "repeating" | "repeating_contacts" | "repeating_contacts.csv" => Ok(Sheet::Repeating),
            other => Err(anyhow!("unknown sheet {other:?}")),
        }
    }
}

/// Reduce a phone number to the characters that identify it:
/// digits plus a leading `+`.
pub fn normalize_number(number: &str) -> String {
    let number = number.trim();
    let mut out = String::with_capacity(number.len());
    if number.starts_with('+') {
        out.push('+');
    }
    out.extend(number.chars().filter(|c| c.is_ascii_digit()));
    out
}

pub fn now_timestamp() -> String {
    chrono::Local::now().format(TIMESTAMP_FORMAT).to_string()
}

pub trait ContactManager: Send + Sync {
    fn search(&self, query: SearchQuery) -> anyhow::Result<Vec<Contact>>;
    fn search_update(&self, query: SearchQuery, update: ContactUpdate) -> anyhow::Result<usize>;
    fn search_delete(&self, query: SearchQuery) -> anyhow::Result<usize>;
    fn create(&self, contact: ContactCreate) -> anyhow::Result<Contact>;
    fn update(&self, id: u64, update: ContactUpdate) -> anyhow::Result<Option<Contact>>;
    fn delete(&self, id: u64) -> anyhow::Result<Option<()>>;
    fn find_by_number(&self, number: &str) -> anyhow::Result<Option<Contact>>;
    fn total(&self) -> anyhow::Result<usize>;
    fn export(&self, dest: &str) -> anyhow::Result<usize>;
    fn path(&self) -> &str;
}

#[derive(Debug, Clone, Default)]
pub struct BackendCsv {
    list: Arc<RwLock<Vec<Contact>>>,
    path: String,
}

pub const CSV_HEADERS: [&str; 4] = ["id", "name", "number", "last_updated"];

impl BackendCsv {
    pub fn load(path: &str) -> anyhow::Result<Self> {
        if let Err(err) = std::fs::metadata(path) {
            match err.kind() {
                ErrorKind::NotFound => {
                    log::info!("Creating new table at {path}");
                    let mut csv_wrt = csv::Writer::from_path(path)?;
                    csv_wrt.write_record(CSV_HEADERS)?;
                    csv_wrt.flush()?;
                }
                _ => Err(err)?,
            }
        }

        let now = Instant::now();
        let mut csv_reader = csv::Reader::from_path(path)?;

        let mut contacts = vec![];
        for record in csv_reader.records() {
            let record = record?;
            let id = record
                .get(0)
                .ok_or(anyhow!("couldnt get record id"))?
                .parse::<u64>()?;
            let name = record
                .get(1)
                .ok_or(anyhow!("couldnt get record name"))?
                .to_string();
            let number = record
                .get(2)
                .ok_or(anyhow!("couldnt get record number"))?
                .to_string();
            let last_updated = record.get(3).unwrap_or_default().to_string();

            contacts.push(Contact {
                id,
                name,
                number,
                last_updated,
            });
        }

        log::debug!(
            "took {}ms to read {path}",
            now.elapsed().as_micros() as f64 / 1000.0
        );

        Ok(BackendCsv {
            list: Arc::new(RwLock::new(contacts)),
            path: path.to_string(),
        })
    }

    /// Rewrites the whole table.
    pub fn save(&self) -> anyhow::Result<()> {
        let contacts = self
            .list
            .read()
            .map_err(|_| anyhow!("contacts lock poisoned"))?;
        Self::write_csv(&self.path, &contacts)
    }

    fn write_csv(path: &str, contacts: &[Contact]) -> anyhow::Result<()> {
        let temp_path = format!("{path}-{}.tmp", Eid::new());

        if let Err(err) = Self::write_records(&temp_path, contacts) {
            let _ = std::fs::remove_file(&temp_path);
            return Err(err);
        }

        std::fs::rename(&temp_path, path)?;
        Ok(())
    }

    fn write_records(path: &str, contacts: &[Contact]) -> anyhow::Result<()> {
        let csv_wrt = csv::Writer::from_path(path)?;
        write_contacts(csv_wrt, contacts)?;
        Ok(())
    }

    fn write_lock(&self) -> anyhow::Result<std::sync::RwLockWriteGuard<'_, Vec<Contact>>> {
        self.list
            .write()
            .map_err(|_| anyhow!("contacts lock poisoned"))
    }

    fn read_lock(&self) -> anyhow::Result<std::sync::RwLockReadGuard<'_, Vec<Contact>>> {
        self.list
            .read()
            .map_err(|_| anyhow!("contacts lock poisoned"))
    }

    fn matches(contact: &Contact, query: &SearchQuery) -> bool {
        if let Some(id) = query.id {
            if contact.id != id {
                return false;
            }
        }

        if let Some(name) = &query.name {
            let is_match = if query.exact {
                contact.name.to_lowercase() == *name
            } else {
                contact.name.to_lowercase().contains(name.as_str())
            };
            if !is_match {
                return false;
            }
        }

        if let Some(number) = &query.number {
            let wanted = normalize_number(number);
            let have = normalize_number(&contact.number);
            let is_match = if wanted.is_empty() {
                false
            } else if query.exact {
                have == wanted
            } else {
                have.contains(&wanted)
            };
            if !is_match {
                return false;
            }
        }

        // every word must be found in either the name or the number
        if let Some(keyword) = &query.keyword {
            let name = contact.name.to_lowercase();
            let number = contact.number.to_lowercase();
            let digits = normalize_number(&contact.number);

            for word in keyword.split_whitespace() {
                if name.contains(word) || number.contains(word) {
                    continue;
                }

                let word_digits = normalize_number(word);
                if !word_digits.is_empty() && digits.contains(&word_digits) {
                    continue;
                }

                return false;
            }
        }

        true
    }

    #[cfg(test)]
    pub fn list(&self) -> Arc<RwLock<Vec<Contact>>> {
        self.list.clone()
    }
}

fn write_contacts<W: std::io::Write>(
    mut csv_wrt: csv::Writer<W>,
    contacts: &[Contact],
) -> anyhow::Result<W> {
    csv_wrt.write_record(CSV_HEADERS)?;
    for contact in contacts.iter() {
        csv_wrt.write_record([
            &contact.id.to_string(),
            &contact.name,
            &contact.number,
            &contact.last_updated,
        ])?;
    }
    csv_wrt.flush()?;
    csv_wrt
        .into_inner()
        .map_err(|err| anyhow!("couldnt flush csv: {err}"))
}

/// Render contacts as a CSV document, header included.
pub fn to_csv_bytes(contacts: &[Contact]) -> anyhow::Result<Vec<u8>> {
    write_contacts(csv::Writer::from_writer(vec![]), contacts)
}

fn apply_update(contact: &mut Contact, update: &ContactUpdate) {
    if let Some(name) = &update.name {
        contact.name = name.trim().to_string();
    }
    if let Some(number) = &update.number {
        contact.number = number.trim().to_string();
    }
    contact.last_updated = now_timestamp();
}

impl ContactManager for BackendCsv {
    fn create(&self, contact_create: ContactCreate) -> anyhow::Result<Contact> {
        let mut contacts = self.write_lock()?;

        let id = match contacts.last() {
            Some(last) => last
                .id
                .checked_add(1)
                .ok_or_else(|| anyhow!("no ids left after {} in {}", last.id, self.path))?,
            None => 0,
        };

        let contact = Contact {
            id,
            name: contact_create.name.trim().to_string(),
            number: contact_create.number.trim().to_string(),
            last_updated: now_timestamp(),
        };

        contacts.push(contact.clone());
        drop(contacts);

        self.save()?;

        Ok(contact)
    }

    fn delete(&self, id: u64) -> anyhow::Result<Option<()>> {
        let mut contacts = self.write_lock()?;
        let Some(idx) = contacts.iter().position(|c| c.id == id) else {
            return Ok(None);
        };
        contacts.remove(idx);
        drop(contacts);

        self.save()?;

        Ok(Some(()))
    }

    fn update(&self, id: u64, update: ContactUpdate) -> anyhow::Result<Option<Contact>> {
        let mut contacts = self.write_lock()?;

        let Some(contact) = contacts.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };

        apply_update(contact, &update);

        let result = contact.clone();
        drop(contacts);

        self.save()?;

        Ok(Some(result))
    }

    fn search_delete(&self, query: SearchQuery) -> anyhow::Result<usize> {
        let delete_ids = self
            .search(query)?
            .into_iter()
            .map(|c| c.id)
            .collect::<Vec<_>>();
        let count = delete_ids.len();

        if count == 0 {
            return Ok(0);
        }

        self.write_lock()?.retain(|c| !delete_ids.contains(&c.id));

        self.save()?;

        Ok(count)
    }

    fn search_update(&self, query: SearchQuery, update: ContactUpdate) -> anyhow::Result<usize> {
        let update_ids = self
            .search(query)?
            .into_iter()
            .map(|c| c.id)
            .collect::<Vec<_>>();
        let count = update_ids.len();

        if count == 0 {
            return Ok(0);
        }

        let mut contacts = self.write_lock()?;
        for contact in contacts.iter_mut() {
            if update_ids.contains(&contact.id) {
                apply_update(contact, &update);
            }
        }
        drop(contacts);

        self.save()?;

        Ok(count)
    }

    fn search(&self, query: SearchQuery) -> anyhow::Result<Vec<Contact>> {
        let contacts = self.read_lock()?;

        let mut query = query;
        query.lowercase();

        if query.is_empty() {
            let mut all = contacts.clone();
            if let Some(limit) = query.limit {
                all.truncate(limit);
            }
            return Ok(all);
        }

        let mut output = vec![];
        for contact in contacts.iter() {
            if !Self::matches(contact, &query) {
                continue;
            }

            output.push(contact.clone());

            let limit_reached = query.limit.is_some_and(|limit| output.len() >= limit);
            if query.id.is_some() || limit_reached {
                break;
            }
        }

        Ok(output)
    }

    fn find_by_number(&self, number: &str) -> anyhow::Result<Option<Contact>> {
        let wanted = normalize_number(number);
        if wanted.is_empty() {
            return Ok(None);
        }

        Ok(self
            .read_lock()?
            .iter()
            .find(|c| normalize_number(&c.number) == wanted)
            .cloned())
    }

    fn total(&self) -> anyhow::Result<usize> {
        Ok(self.read_lock()?.len())
    }

    /// Write a standalone copy of the table to `dest`.
    fn export(&self, dest: &str) -> anyhow::Result<usize> {
        let contacts = self.read_lock()?;
        Self::write_csv(dest, &contacts)?;
        Ok(contacts.len())
    }

    fn path(&self) -> &str {
        &self.path
    }
}
