//! File-backed preferences in the shared-preferences XML format.
//!
//! ```xml
//! <?xml version='1.0' encoding='utf-8' standalone='yes' ?>
//! <map>
//!     <float name="speed" value="2.5" />
//!     <string name="label">fast</string>
//! </map>
//! ```
//!
//! Change detection follows the platform's reader: the file's modification time
//! and length are recorded at each reload, and any difference afterwards counts as
//! a change. A missing file reads as an empty map.

use std::{
    collections::HashMap,
    fmt, fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::RwLock,
    time::SystemTime,
};

use quick_xml::{
    events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event},
    Reader, Writer,
};

use tempfile::NamedTempFile;

use crate::{prefs::ConfigSource, Error, Result};

/// A typed preference value.
#[derive(Clone, Debug, PartialEq)]
pub enum PrefValue {
    /// `<boolean name=".." value=".." />`
    Bool(bool),
    /// `<int name=".." value=".." />`
    Int(i32),
    /// `<long name=".." value=".." />`
    Long(i64),
    /// `<float name=".." value=".." />`
    Float(f32),
    /// `<string name="..">text</string>`
    String(String),
}

impl PrefValue {
    fn tag(&self) -> &'static str {
        match self {
            PrefValue::Bool(_) => "boolean",
            PrefValue::Int(_) => "int",
            PrefValue::Long(_) => "long",
            PrefValue::Float(_) => "float",
            PrefValue::String(_) => "string",
        }
    }

    fn parse(tag: &[u8], literal: &str) -> Option<Self> {
        match tag {
            b"boolean" => literal.parse().ok().map(PrefValue::Bool),
            b"int" => literal.parse().ok().map(PrefValue::Int),
            b"long" => literal.parse().ok().map(PrefValue::Long),
            b"float" => literal.parse().ok().map(PrefValue::Float),
            _ => None,
        }
    }
}

impl fmt::Display for PrefValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrefValue::Bool(v) => write!(f, "{v}"),
            PrefValue::Int(v) => write!(f, "{v}"),
            PrefValue::Long(v) => write!(f, "{v}"),
            // Keep a fractional part so platform readers parse it back as a float
            PrefValue::Float(v) if v.is_finite() && v.fract() == 0.0 => write!(f, "{v:.1}"),
            PrefValue::Float(v) => write!(f, "{v}"),
            PrefValue::String(v) => write!(f, "{v}"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        fs::metadata(path).ok().map(|meta| FileStamp {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

#[derive(Debug, Default)]
struct Snapshot {
    values: HashMap<String, PrefValue>,
    stamp: Option<FileStamp>,
}

fn attribute(start: &BytesStart<'_>, key: &[u8]) -> Result<Option<String>> {
    for attr in start.attributes() {
        let attr = attr.map_err(quick_xml::Error::from)?;
        if attr.key.as_ref() == key {
            let value = attr.unescape_value().map_err(quick_xml::Error::from)?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

fn scalar(start: &BytesStart<'_>) -> Result<Option<(String, PrefValue)>> {
    let (Some(name), Some(literal)) = (attribute(start, b"name")?, attribute(start, b"value")?)
    else {
        return Ok(None);
    };

    match PrefValue::parse(start.name().as_ref(), &literal) {
        Some(value) => Ok(Some((name, value))),
        None => {
            log::debug!("skipping unreadable preference {name}={literal}");
            Ok(None)
        }
    }
}

/// Parses a shared-preferences XML document.
///
/// # Errors
///
/// Returns [`Error::XmlError`] if the document is not well-formed.
pub(crate) fn parse_document(text: &str) -> Result<HashMap<String, PrefValue>> {
    let mut reader = Reader::from_str(text);
    reader.config_mut().trim_text(true);

    let mut values = HashMap::new();
    let mut open_string: Option<String> = None;
    let mut string_text = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(start) if start.name().as_ref() == b"string" => {
                open_string = attribute(&start, b"name")?;
                string_text.clear();
            }
            Event::Start(start) | Event::Empty(start) => {
                if let Some((name, value)) = scalar(&start)? {
                    values.insert(name, value);
                }
            }
            Event::Text(text) if open_string.is_some() => {
                string_text.push_str(&text.unescape().map_err(quick_xml::Error::from)?);
            }
            Event::End(end) if end.name().as_ref() == b"string" => {
                if let Some(name) = open_string.take() {
                    values.insert(name, PrefValue::String(std::mem::take(&mut string_text)));
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(values)
}

/// Serializes preferences as a shared-preferences XML document. Keys are written
/// in sorted order so equal maps produce equal files.
pub(crate) fn write_document(values: &HashMap<String, PrefValue>) -> Result<String> {
    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 4);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), Some("yes"))))?;
    writer.write_event(Event::Start(BytesStart::new("map")))?;

    let mut keys: Vec<&String> = values.keys().collect();
    keys.sort();
    for key in keys {
        let value = &values[key];
        let mut element = BytesStart::new(value.tag());
        element.push_attribute(("name", key.as_str()));
        match value {
            PrefValue::String(text) => {
                writer.write_event(Event::Start(element))?;
                writer.write_event(Event::Text(BytesText::new(text)))?;
                writer.write_event(Event::End(BytesEnd::new("string")))?;
            }
            scalar => {
                let literal = scalar.to_string();
                element.push_attribute(("value", literal.as_str()));
                writer.write_event(Event::Empty(element))?;
            }
        }
    }

    writer.write_event(Event::End(BytesEnd::new("map")))?;
    String::from_utf8(writer.into_inner())
        .map_err(|e| Error::FileError(io::Error::new(io::ErrorKind::InvalidData, e)))
}

fn read_file(path: &Path) -> Result<(HashMap<String, PrefValue>, Option<FileStamp>)> {
    // Stamp first: a write racing with the read shows up as a change next time.
    let stamp = FileStamp::of(path);
    match fs::read_to_string(path) {
        Ok(text) => Ok((parse_document(&text)?, stamp)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok((HashMap::new(), None)),
        Err(e) => Err(e.into()),
    }
}

/// Read side of a shared-preferences file.
///
/// # Examples
///
/// ```rust,no_run
/// use speedlock::prefs::{ConfigSource, SharedPrefs, SPEED_KEY, DEFAULT_SPEED};
///
/// let prefs = SharedPrefs::open("/data/data/com.hook.bilibili.speed/shared_prefs/speed.xml")?;
/// if prefs.has_changed() {
///     prefs.reload()?;
/// }
/// let speed = prefs.get_float(SPEED_KEY, DEFAULT_SPEED);
/// # Ok::<(), speedlock::Error>(())
/// ```
#[derive(Debug)]
pub struct SharedPrefs {
    path: PathBuf,
    snapshot: RwLock<Snapshot>,
}

impl SharedPrefs {
    /// Opens the preference file at `path` and loads it.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed. A missing
    /// file is not an error.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (values, stamp) = read_file(&path)?;
        Ok(Self {
            path,
            snapshot: RwLock::new(Snapshot { values, stamp }),
        })
    }

    /// Opens `<dir>/<name>.xml`.
    ///
    /// # Errors
    ///
    /// See [`SharedPrefs::open`].
    pub fn in_dir(dir: impl AsRef<Path>, name: &str) -> Result<Self> {
        Self::open(dir.as_ref().join(format!("{name}.xml")))
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads any value from the in-memory view.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<PrefValue> {
        self.snapshot
            .read()
            .ok()
            .and_then(|snapshot| snapshot.values.get(key).cloned())
    }

    /// Starts an edit of the backing file.
    #[must_use]
    pub fn edit(&self) -> PrefsEditor {
        PrefsEditor::new(&self.path)
    }
}

impl ConfigSource for SharedPrefs {
    fn reload(&self) -> Result<()> {
        let (values, stamp) = read_file(&self.path)?;
        let mut snapshot = self.snapshot.write()?;
        snapshot.values = values;
        snapshot.stamp = stamp;
        Ok(())
    }

    fn get_float(&self, key: &str, default: f32) -> f32 {
        match self.get(key) {
            Some(PrefValue::Float(value)) => value,
            Some(other) => {
                log::debug!("preference {key} holds {other:?}, not a float");
                default
            }
            None => default,
        }
    }

    fn has_changed(&self) -> bool {
        let current = FileStamp::of(&self.path);
        match self.snapshot.read() {
            Ok(snapshot) => snapshot.stamp != current,
            Err(_) => true,
        }
    }
}

#[derive(Clone, Debug)]
enum EditOp {
    Put(String, PrefValue),
    Remove(String),
}

/// Write side of a shared-preferences file.
///
/// Edits are queued and applied in order on [`PrefsEditor::commit`], on top of the
/// file's current contents. The new document replaces the old one atomically.
///
/// ```rust,no_run
/// use speedlock::prefs::{PrefsEditor, SPEED_KEY};
///
/// PrefsEditor::new("/tmp/speed.xml")
///     .remove(SPEED_KEY)
///     .put_float(SPEED_KEY, 2.0)
///     .commit()?;
/// # Ok::<(), speedlock::Error>(())
/// ```
#[derive(Clone, Debug)]
pub struct PrefsEditor {
    path: PathBuf,
    clear: bool,
    ops: Vec<EditOp>,
}

impl PrefsEditor {
    /// Starts an edit of the file at `path`.
    #[must_use]
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            clear: false,
            ops: Vec::new(),
        }
    }

    /// Queues a float write.
    pub fn put_float(&mut self, key: &str, value: f32) -> &mut Self {
        self.put(key, PrefValue::Float(value))
    }

    /// Queues a write of any value.
    pub fn put(&mut self, key: &str, value: PrefValue) -> &mut Self {
        self.ops.push(EditOp::Put(key.to_string(), value));
        self
    }

    /// Queues a removal.
    pub fn remove(&mut self, key: &str) -> &mut Self {
        self.ops.push(EditOp::Remove(key.to_string()));
        self
    }

    /// Drops every existing key before the queued edits are applied.
    pub fn clear(&mut self) -> &mut Self {
        self.clear = true;
        self
    }

    /// Applies the queued edits and writes the file.
    ///
    /// The document is staged in a uniquely named file next to the target and
    /// renamed over it, so concurrent commits never see each other's staging
    /// file. An unreadable existing document is replaced rather than merged.
    ///
    /// # Errors
    ///
    /// Returns an error if the current file cannot be read or the new one cannot
    /// be written. The queue is kept on failure.
    pub fn commit(&mut self) -> Result<()> {
        let mut values = match read_file(&self.path) {
            Ok((values, _)) => values,
            Err(Error::XmlError(e)) => {
                log::warn!("discarding malformed {}: {e}", self.path.display());
                HashMap::new()
            }
            Err(e) => return Err(e),
        };
        if self.clear {
            values.clear();
        }
        for op in &self.ops {
            match op {
                EditOp::Put(key, value) => {
                    values.insert(key.clone(), value.clone());
                }
                EditOp::Remove(key) => {
                    values.remove(key);
                }
            }
        }

        let document = write_document(&values)?;
        let parent = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        // Dropping an unpersisted staging file deletes it.
        let mut staging = NamedTempFile::new_in(parent)?;
        staging.write_all(document.as_bytes())?;
        staging.as_file().sync_all()?;
        staging.persist(&self.path).map_err(|e| Error::FileError(e.error))?;

        self.clear = false;
        self.ops.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ANDROID_DOCUMENT: &str = r#"<?xml version='1.0' encoding='utf-8' standalone='yes' ?>
<map>
    <float name="speed" value="2.5" />
    <boolean name="enabled" value="true" />
    <int name="count" value="3" />
    <long name="stamp" value="1700000000000" />
    <string name="label">fast &amp; loud</string>
</map>
"#;

    #[test]
    fn test_parse_android_document() {
        let values = parse_document(ANDROID_DOCUMENT).unwrap();
        assert_eq!(values["speed"], PrefValue::Float(2.5));
        assert_eq!(values["enabled"], PrefValue::Bool(true));
        assert_eq!(values["count"], PrefValue::Int(3));
        assert_eq!(values["stamp"], PrefValue::Long(1_700_000_000_000));
        assert_eq!(values["label"], PrefValue::String("fast & loud".into()));
    }

    #[test]
    fn test_parse_skips_malformed_values() {
        let values = parse_document(r#"<map><float name="speed" value="fast" /></map>"#).unwrap();
        assert!(values.is_empty());
    }

    #[test]
    fn test_write_keeps_float_fraction() {
        let mut values = HashMap::new();
        values.insert("speed".to_string(), PrefValue::Float(1.0));
        let document = write_document(&values).unwrap();
        assert!(document.contains(r#"<float name="speed" value="1.0"/>"#));
        assert_eq!(parse_document(&document).unwrap(), values);
    }

    #[test]
    fn test_missing_file_reads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = SharedPrefs::in_dir(dir.path(), "speed").unwrap();
        assert_eq!(prefs.get_float("speed", 1.0), 1.0);
        assert!(!prefs.has_changed());
    }

    #[test]
    fn test_commit_then_reload() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = SharedPrefs::in_dir(dir.path(), "speed").unwrap();

        prefs.edit().remove("speed").put_float("speed", 2.5).commit().unwrap();
        assert!(prefs.has_changed());
        assert_eq!(prefs.get_float("speed", 1.0), 1.0);

        prefs.reload().unwrap();
        assert!(!prefs.has_changed());
        assert_eq!(prefs.get_float("speed", 1.0), 2.5);

        prefs.edit().put_float("speed", 0.75).commit().unwrap();
        assert!(prefs.has_changed());
        prefs.reload().unwrap();
        assert_eq!(prefs.get_float("speed", 1.0), 0.75);
    }

    #[test]
    fn test_commit_preserves_other_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speed.xml");
        fs::write(&path, ANDROID_DOCUMENT).unwrap();

        PrefsEditor::new(&path).put_float("speed", 4.0).commit().unwrap();
        let prefs = SharedPrefs::open(&path).unwrap();
        assert_eq!(prefs.get_float("speed", 1.0), 4.0);
        assert_eq!(prefs.get("label"), Some(PrefValue::String("fast & loud".into())));

        PrefsEditor::new(&path).clear().put_float("speed", 4.0).commit().unwrap();
        prefs.reload().unwrap();
        assert_eq!(prefs.get("label"), None);
    }

    #[test]
    fn test_non_float_value_reads_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speed.xml");
        fs::write(&path, r#"<map><int name="speed" value="2" /></map>"#).unwrap();

        let prefs = SharedPrefs::open(&path).unwrap();
        assert_eq!(prefs.get_float("speed", 1.0), 1.0);
    }

    #[test]
    fn test_concurrent_commits_all_succeed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speed.xml");

        for round in 0..20 {
            std::thread::scope(|scope| {
                let workers: Vec<_> = (0..4)
                    .map(|i| {
                        let path = &path;
                        scope.spawn(move || {
                            PrefsEditor::new(path)
                                .put_float("speed", 1.0 + (round * 4 + i) as f32 * 0.05)
                                .commit()
                        })
                    })
                    .collect();
                for worker in workers {
                    worker.join().unwrap().unwrap();
                }
            });
        }

        let prefs = SharedPrefs::open(&path).unwrap();
        assert!(matches!(prefs.get("speed"), Some(PrefValue::Float(_))));
        let entries = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_commit_replaces_malformed_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("speed.xml");
        fs::write(&path, r#"<map><float name="speed" value="2.0" /></wrong>"#).unwrap();
        assert!(matches!(SharedPrefs::open(&path), Err(Error::XmlError(_))));

        PrefsEditor::new(&path).put_float("speed", 3.0).commit().unwrap();
        let prefs = SharedPrefs::open(&path).unwrap();
        assert_eq!(prefs.get_float("speed", 1.0), 3.0);
    }
}
