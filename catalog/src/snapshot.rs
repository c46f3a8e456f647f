//! The filesystem store keeps the whole catalog in memory and writes a
//! compressed snapshot of it to disk after every change, so records survive
//! a restart of the process.
use crate::store::{CatalogData, CatalogStore, StoreError, Stored};
use crate::types::{Build, Project, ProjectId, Version, VersionFamily, VersionId};
use async_trait::async_trait;
use fs4::FileExt;
use parking_lot::RwLock;
use serde::Deserialize;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    None,
    #[default]
    Zstd1,
    Zstd3,
}

struct Codec {
    compression: Compression,
    config: bincode::config::Configuration,
}

impl Codec {
    fn new(compression: Compression) -> Self {
        Codec {
            compression,
            config: bincode::config::standard(),
        }
    }

    fn write<W: Write>(&self, writer: &mut W, data: &CatalogData) -> Result<usize, StoreError> {
        match self.compression {
            Compression::None => {
                let size = bincode::serde::encode_into_std_write(data, writer, self.config)?;
                writer.flush()?;
                Ok(size)
            }
            Compression::Zstd1 | Compression::Zstd3 => {
                let level = if self.compression == Compression::Zstd1 { 1 } else { 3 };
                let mut encoder = zstd::stream::write::Encoder::new(writer, level)?;
                let size = bincode::serde::encode_into_std_write(data, &mut encoder, self.config)?;
                encoder.finish()?.flush()?;
                Ok(size)
            }
        }
    }

    fn read<R: Read>(&self, mut reader: R) -> Result<CatalogData, StoreError> {
        match self.compression {
            Compression::None => Ok(bincode::serde::decode_from_std_read(
                &mut reader,
                self.config,
            )?),
            Compression::Zstd1 | Compression::Zstd3 => {
                let mut decoder = zstd::stream::read::Decoder::new(reader)?;
                Ok(bincode::serde::decode_from_std_read(
                    &mut decoder,
                    self.config,
                )?)
            }
        }
    }
}

/// Identifies the snapshot contents last seen by this process. Every write
/// replaces the file, so a changed stamp means another writer got there.
type Stamp = Option<(SystemTime, u64)>;

fn stamp_of(metadata: &fs::Metadata) -> io::Result<Stamp> {
    Ok(Some((metadata.modified()?, metadata.len())))
}

struct Loaded {
    data: CatalogData,
    stamp: Stamp,
}

/// Several processes may open the same snapshot. Mutations take an exclusive
/// lock on a sidecar `.lock` file, reload the snapshot under it and only
/// replace the in-memory copy once the new snapshot is on disk.
pub struct FilesystemCatalogStore {
    path: PathBuf,
    lock_path: PathBuf,
    codec: Codec,
    state: RwLock<Loaded>,
}

impl FilesystemCatalogStore {
    /// Opens the snapshot at `base_dir/filename`, starting empty if it does
    /// not exist yet.
    pub fn open(base_dir: &str, filename: &str, compression: Compression) -> Result<Self, StoreError> {
        let path = Path::new(base_dir).join(filename);
        let lock_path = Path::new(base_dir).join(format!("{filename}.lock"));
        let codec = Codec::new(compression);

        let loaded = load(&path, &codec)?;
        tracing::debug!(path = %path.display(), "Opened catalog snapshot");

        Ok(FilesystemCatalogStore {
            path,
            lock_path,
            codec,
            state: RwLock::new(loaded),
        })
    }

    fn lock(&self) -> Result<File, StoreError> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)?;
        file.lock_exclusive()?;
        Ok(file)
    }

    fn current_stamp(&self) -> Result<Stamp, StoreError> {
        match fs::metadata(&self.path) {
            Ok(metadata) => Ok(stamp_of(&metadata)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Runs `f` against the snapshot as it is on disk right now.
    fn read<T>(&self, f: impl FnOnce(&CatalogData) -> T) -> Result<T, StoreError> {
        let stamp = self.current_stamp()?;
        {
            let guard = self.state.read();
            if guard.stamp == stamp {
                return Ok(f(&guard.data));
            }
        }

        let mut guard = self.state.write();
        *guard = load(&self.path, &self.codec)?;
        Ok(f(&guard.data))
    }

    fn persist(&self, data: &CatalogData) -> Result<Stamp, StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let tmp = self
            .path
            .with_file_name(format!(".{name}.{}.tmp", Uuid::new_v4().simple()));

        let result = (|| {
            let mut writer = io::BufWriter::new(File::create(&tmp)?);
            let size = self.codec.write(&mut writer, data)?;
            writer.into_inner().map_err(|e| e.into_error())?.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            Ok::<_, StoreError>(size)
        })();

        let size = match result {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&tmp);
                return Err(e);
            }
        };

        tracing::debug!(path = %self.path.display(), bytes = size, "Stored catalog snapshot");
        Ok(stamp_of(&fs::metadata(&self.path)?)?)
    }

    /// Applies `f` to a freshly loaded copy of the snapshot while holding the
    /// inter-process lock. The copy is written out when `f` changed something
    /// and only then becomes the in-memory state.
    fn mutate<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut CatalogData) -> Result<(T, bool), StoreError>,
    {
        let mut guard = self.state.write();
        let _lock = self.lock()?;

        let mut loaded = load(&self.path, &self.codec)?;
        let (result, changed) = f(&mut loaded.data)?;
        if changed {
            loaded.stamp = self.persist(&loaded.data)?;
        }
        *guard = loaded;
        Ok(result)
    }

    fn insert<T, F>(&self, f: F) -> Result<Stored<T>, StoreError>
    where
        F: FnOnce(&mut CatalogData) -> Result<Stored<T>, StoreError>,
    {
        self.mutate(|data| {
            let stored = f(data)?;
            let created = stored.was_created();
            Ok((stored, created))
        })
    }
}

fn load(path: &Path, codec: &Codec) -> Result<Loaded, StoreError> {
    match File::open(path) {
        Ok(file) => {
            let stamp = stamp_of(&file.metadata()?)?;
            let data = codec.read(io::BufReader::new(file))?;
            Ok(Loaded { data, stamp })
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Loaded {
            data: CatalogData::default(),
            stamp: None,
        }),
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl CatalogStore for FilesystemCatalogStore {
    async fn find_project(&self, name: &str) -> Result<Option<Project>, StoreError> {
        self.read(|data| data.find_project(name))
    }

    async fn insert_project(&self, project: Project) -> Result<Stored<Project>, StoreError> {
        self.insert(|data| Ok(data.insert_project(project)))
    }

    async fn find_family(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<VersionFamily>, StoreError> {
        self.read(|data| data.find_family(project, name))
    }

    async fn insert_family(
        &self,
        family: VersionFamily,
    ) -> Result<Stored<VersionFamily>, StoreError> {
        self.insert(|data| data.insert_family(family))
    }

    async fn find_version(
        &self,
        project: ProjectId,
        name: &str,
    ) -> Result<Option<Version>, StoreError> {
        self.read(|data| data.find_version(project, name))
    }

    async fn insert_version(&self, version: Version) -> Result<Stored<Version>, StoreError> {
        self.insert(|data| data.insert_version(version))
    }

    async fn find_build(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
    ) -> Result<Option<Build>, StoreError> {
        self.read(|data| data.find_build(project, version, number))
    }

    async fn previous_build(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
    ) -> Result<Option<Build>, StoreError> {
        self.read(|data| data.previous_build(project, version, number))
    }

    async fn insert_build(&self, build: Build) -> Result<Stored<Build>, StoreError> {
        self.insert(|data| data.insert_build(build))
    }

    async fn set_promoted(
        &self,
        project: ProjectId,
        version: VersionId,
        number: u32,
        promoted: bool,
    ) -> Result<Option<Build>, StoreError> {
        self.mutate(|data| {
            let updated = data.set_promoted(project, version, number, promoted);
            let changed = updated.is_some();
            Ok((updated, changed))
        })
    }
}
