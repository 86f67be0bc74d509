use super::registry::ModelCatalog;
use super::source::{ArtifactSource, Download, HttpSource};
use super::types::{InstallationRecord, ModelDescriptor};
use crate::error::{Error, Result};
use crate::scoring::Checkpoint;
use flate2::read::MultiGzDecoder;
use sha2::{Digest, Sha256};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const CHUNK_SIZE: usize = 64 * 1024;

/// Installs catalog models into a local cache root, once per model.
pub struct ModelProvisioner<S = HttpSource> {
    catalog: ModelCatalog,
    cache_root: PathBuf,
    source: S,
}

impl ModelProvisioner<HttpSource> {
    pub fn with_http(catalog: ModelCatalog, cache_root: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(catalog, cache_root, HttpSource::new()?))
    }
}

impl<S: ArtifactSource> ModelProvisioner<S> {
    pub fn new(catalog: ModelCatalog, cache_root: impl Into<PathBuf>, source: S) -> Self {
        Self {
            catalog,
            cache_root: cache_root.into(),
            source,
        }
    }

    pub fn catalog(&self) -> &ModelCatalog {
        &self.catalog
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        InstallPaths::new(&self.cache_root, name).artifact
    }

    pub fn is_installed(&self, name: &str) -> bool {
        InstallPaths::new(&self.cache_root, name).marker.is_file()
    }

    /// Returns the local artifact path for `name`, downloading and verifying
    /// it first if no installation record exists yet.
    ///
    /// Unknown names yield `Ok(None)` without touching the filesystem.
    pub fn ensure_installed(&self, name: &str) -> Result<Option<PathBuf>> {
        let Some(descriptor) = self.catalog.get(name) else {
            return Ok(None);
        };
        validate_name(&descriptor.name)?;

        let paths = InstallPaths::new(&self.cache_root, &descriptor.name);
        if paths.marker.is_file() {
            debug!(model = %descriptor.name, path = %paths.artifact.display(), "Model already installed");
            return Ok(Some(paths.artifact));
        }

        fs::create_dir_all(&self.cache_root).map_err(|e| Error::storage(&self.cache_root, e))?;

        let lock = InstallLock::acquire(&paths.lock)?;

        // Another process may have finished while we waited on the lock
        if paths.marker.is_file() {
            info!(model = %descriptor.name, "Model was installed by another process");
            return Ok(Some(paths.artifact));
        }

        info!(model = %descriptor.name, "Installing model...");

        let result = self.install(descriptor, &paths);
        if result.is_err() {
            paths.discard_temporaries();
        }
        drop(lock);
        result?;

        info!(
            model = %descriptor.name,
            dir = %self.cache_root.display(),
            "Model successfully installed"
        );

        Ok(Some(paths.artifact))
    }

    fn install(&self, descriptor: &ModelDescriptor, paths: &InstallPaths) -> Result<()> {
        let digest = self.download(descriptor, &paths.compressed)?;

        if !descriptor.hash_matches(&digest) {
            warn!(
                model = %descriptor.name,
                expected = %descriptor.expected_hash,
                actual = %digest,
                "Downloaded artifact failed integrity check"
            );
            return Err(Error::Integrity {
                name: descriptor.name.clone(),
                expected: descriptor.expected_hash.clone(),
                actual: digest,
            });
        }
        debug!(model = %descriptor.name, sha256 = %digest, "Checksum verified");

        let size = decompress(&paths.compressed, &paths.partial)?;

        // A verified download is only recorded if it is also loadable
        let bytes = fs::read(&paths.partial).map_err(|e| Error::storage(&paths.partial, e))?;
        let definition = Checkpoint::read_definition(&bytes, &paths.artifact)?;
        drop(bytes);
        debug!(
            model = %descriptor.name,
            feature_dim = definition.feature_dim,
            "Checkpoint header accepted"
        );

        fs::rename(&paths.partial, &paths.artifact)
            .map_err(|e| Error::storage(&paths.artifact, e))?;
        fs::remove_file(&paths.compressed).map_err(|e| Error::storage(&paths.compressed, e))?;
        debug!(model = %descriptor.name, bytes = size, "Artifact decompressed");

        // Written last: its presence is the only "installed" signal
        let record = InstallationRecord {
            model: descriptor.name.clone(),
            sha256: digest,
            artifact: paths
                .artifact
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        };
        write_record(&record, &paths.marker_tmp, &paths.marker)
    }

    /// Streams the artifact to `dest` and returns the hex SHA-256 of the bytes written.
    fn download(&self, descriptor: &ModelDescriptor, dest: &Path) -> Result<String> {
        let url = descriptor.source_url.as_str();
        let Download { total, mut body } = self.source.open(url)?;

        let file = File::create(dest).map_err(|e| Error::storage(dest, e))?;
        let mut writer = BufWriter::new(file);
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];
        let mut downloaded: u64 = 0;
        let mut last_decile = 0;

        loop {
            let n = match body.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(Error::network(url, e)),
            };
            hasher.update(&buffer[..n]);
            writer
                .write_all(&buffer[..n])
                .map_err(|e| Error::storage(dest, e))?;
            downloaded += n as u64;

            if let Some(total) = total.filter(|t| *t > 0) {
                let decile = downloaded * 10 / total;
                if decile > last_decile {
                    last_decile = decile;
                    debug!(
                        model = %descriptor.name,
                        bytes = downloaded,
                        total,
                        "Download {}%",
                        (decile * 10).min(100)
                    );
                }
            }
        }

        if let Some(total) = total {
            if downloaded != total {
                return Err(Error::network(
                    url,
                    format!("body ended after {downloaded} of {total} bytes"),
                ));
            }
        }

        let file = writer
            .into_inner()
            .map_err(|e| Error::storage(dest, e.into_error()))?;
        file.sync_all().map_err(|e| Error::storage(dest, e))?;

        Ok(format!("{:x}", hasher.finalize()))
    }
}

fn validate_name(name: &str) -> Result<()> {
    let bad = name.is_empty()
        || name == "."
        || name == ".."
        || name.contains(['/', '\\'])
        || name.contains('\0');
    if bad {
        return Err(Error::Config(format!("invalid model name {name:?}")));
    }
    Ok(())
}

fn decompress(src: &Path, dest: &Path) -> Result<u64> {
    let input = File::open(src).map_err(|e| Error::storage(src, e))?;
    let mut decoder = MultiGzDecoder::new(BufReader::new(input));
    let mut writer = BufWriter::new(File::create(dest).map_err(|e| Error::storage(dest, e))?);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        let n = match decoder.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::corrupt(src, format!("gzip stream: {e}"))),
        };
        writer
            .write_all(&buffer[..n])
            .map_err(|e| Error::storage(dest, e))?;
        written += n as u64;
    }

    let file = writer
        .into_inner()
        .map_err(|e| Error::storage(dest, e.into_error()))?;
    file.sync_all().map_err(|e| Error::storage(dest, e))?;
    Ok(written)
}

fn write_record(record: &InstallationRecord, tmp: &Path, marker: &Path) -> Result<()> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| Error::storage(tmp, io::Error::other(e)))?;
    fs::write(tmp, json).map_err(|e| Error::storage(tmp, e))?;
    fs::rename(tmp, marker).map_err(|e| Error::storage(marker, e))
}

struct InstallPaths {
    artifact: PathBuf,
    compressed: PathBuf,
    partial: PathBuf,
    marker: PathBuf,
    marker_tmp: PathBuf,
    lock: PathBuf,
}

impl InstallPaths {
    fn new(root: &Path, name: &str) -> Self {
        Self {
            artifact: root.join(format!("{name}.ckpt")),
            compressed: root.join(format!("{name}.ckpt.gz")),
            partial: root.join(format!("{name}.ckpt.part")),
            marker: root.join(format!("{name}_installed.txt")),
            marker_tmp: root.join(format!("{name}_installed.txt.tmp")),
            lock: root.join(format!("{name}.lock")),
        }
    }

    fn discard_temporaries(&self) {
        for path in [&self.compressed, &self.partial, &self.marker_tmp] {
            match fs::remove_file(path) {
                Ok(()) => debug!(path = %path.display(), "Removed temporary file"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove temporary file"),
            }
        }
    }
}

/// Exclusive advisory lock held for the duration of one install.
struct InstallLock {
    file: File,
}

impl InstallLock {
    fn acquire(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| Error::storage(path, e))?;
        file.lock().map_err(|e| Error::storage(path, e))?;
        Ok(Self { file })
    }
}

impl Drop for InstallLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}
