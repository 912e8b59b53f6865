use crate::error::Result;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Integer key-value persistence used for scan affinity.
pub trait SettingsStore: Send {
    fn get_int(&self, key: &str) -> Option<u32>;
    fn put_int(&mut self, key: &str, value: u32) -> Result<()>;
}

/// Process-lifetime store.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, u32>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsStore for MemoryStore {
    fn get_int(&self, key: &str) -> Option<u32> {
        self.values.get(key).copied()
    }

    fn put_int(&mut self, key: &str, value: u32) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// A JSON object on disk, rewritten on every put.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    values: BTreeMap<String, u32>,
}

impl JsonFileStore {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let values = match File::open(&path) {
            Ok(file) => serde_json::from_reader(BufReader::new(file))?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(JsonFileStore { path, values })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self) -> Result<()> {
        let tmp = self.path.with_extension("tmp");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer_pretty(&mut writer, &self.values)?;
            writer.flush()?;
        }
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl SettingsStore for JsonFileStore {
    fn get_int(&self, key: &str) -> Option<u32> {
        self.values.get(key).copied()
    }

    fn put_int(&mut self, key: &str, value: u32) -> Result<()> {
        self.values.insert(key.to_string(), value);
        self.flush()
    }
}
