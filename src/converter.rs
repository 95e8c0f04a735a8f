//! Batch conversion orchestration.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::bundle::{compose, DescriptorSource, EngineBundle};
use crate::icon::{materialize, IconOutcome};
use crate::locale::engine_id;
use crate::package::{create_archive, create_staging, ensure_absent, write_bundle};
use crate::{ConvertError, ConverterConfig, Result};

/// Outcome of converting one engine.
#[derive(Debug)]
pub enum EngineStatus {
    /// Bundle written and archived.
    Packaged {
        archive: PathBuf,
        locales: Vec<String>,
    },
    /// Engine skipped; the batch continues.
    Failed(ConvertError),
}

/// Per-engine status line.
#[derive(Debug)]
pub struct EngineReport {
    pub engine_id: String,
    pub status: EngineStatus,
    pub warnings: Vec<String>,
}

impl EngineReport {
    pub fn is_success(&self) -> bool {
        matches!(self.status, EngineStatus::Packaged { .. })
    }

    fn failed(engine_id: &str, error: ConvertError, warnings: Vec<String>) -> Self {
        warn!("Engine {} failed: {}", engine_id, error);
        Self {
            engine_id: engine_id.to_string(),
            status: EngineStatus::Failed(error),
            warnings,
        }
    }
}

impl fmt::Display for EngineReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.status {
            EngineStatus::Packaged { archive, locales } => write!(
                f,
                "{}: ok -> {} [{}]",
                self.engine_id,
                archive.display(),
                locales.join(", ")
            )?,
            EngineStatus::Failed(e) => write!(f, "{}: skipped ({})", self.engine_id, e)?,
        }
        if !self.warnings.is_empty() {
            write!(f, " ({} warning(s))", self.warnings.len())?;
        }
        Ok(())
    }
}

/// Converts descriptor files under a source tree into packaged bundles.
pub struct Converter {
    config: ConverterConfig,
    source_root: PathBuf,
    out_dir: PathBuf,
}

impl Converter {
    /// Creates a converter with the built-in configuration.
    pub fn new(source_root: impl Into<PathBuf>, out_dir: impl Into<PathBuf>) -> Self {
        Self {
            config: ConverterConfig::default(),
            source_root: source_root.into(),
            out_dir: out_dir.into(),
        }
    }

    /// Replaces the configuration.
    pub fn with_config(mut self, config: ConverterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &ConverterConfig {
        &self.config
    }

    /// Directory scanned for descriptor files.
    pub fn descriptor_dir(&self) -> PathBuf {
        self.source_root.join(&self.config.descriptor_dir)
    }

    /// Directory icon resources are resolved against.
    pub fn resource_dir(&self) -> PathBuf {
        self.source_root.join(&self.config.resource_dir)
    }

    /// Staging directory for an engine.
    pub fn staging_dir(&self, engine_id: &str) -> PathBuf {
        self.out_dir.join(engine_id)
    }

    /// Default archive path for an engine.
    pub fn archive_path(&self, engine_id: &str) -> PathBuf {
        self.out_dir.join(format!("{}.zip", engine_id))
    }

    /// Finds descriptor files and groups them by engine identity.
    ///
    /// Files within a group keep sorted path order, which fixes the
    /// representative file and the default-locale tie break.
    pub fn discover(&self) -> Result<BTreeMap<String, Vec<PathBuf>>> {
        let dir = glob::Pattern::escape(&self.descriptor_dir().to_string_lossy());
        let pattern = Path::new(&dir).join("*.xml");
        let pattern = pattern.to_string_lossy();

        let mut paths: Vec<PathBuf> = glob::glob(&pattern)
            .map_err(|e| ConvertError::InvalidPattern(e.to_string()))?
            .filter_map(|entry| match entry {
                Ok(path) => Some(path),
                Err(e) => {
                    warn!("Unreadable path during discovery: {}", e);
                    None
                }
            })
            .filter(|path| path.is_file())
            .collect();
        paths.sort();

        let mut groups: BTreeMap<String, Vec<PathBuf>> = BTreeMap::new();
        for path in paths {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let id = engine_id(&name);
            if id.is_empty() {
                warn!("Skipping {}: file name has no engine identity", path.display());
                continue;
            }
            groups.entry(id).or_default().push(path);
        }
        debug!("Discovered {} engines", groups.len());
        Ok(groups)
    }

    /// Converts every discovered engine.
    pub async fn convert_all(&self) -> Result<Vec<EngineReport>> {
        let groups = self.discover()?;
        let mut reports = Vec::with_capacity(groups.len());
        for (engine_id, files) in &groups {
            let archive = self.archive_path(engine_id);
            reports.push(self.convert_files(engine_id, files, &archive).await);
        }
        Ok(reports)
    }

    /// Converts a single engine, optionally to an explicit archive path.
    pub async fn convert_engine(
        &self,
        engine_id: &str,
        archive_path: Option<&Path>,
    ) -> Result<EngineReport> {
        let groups = self.discover()?;
        let files = groups.get(engine_id).cloned().unwrap_or_default();
        let archive = archive_path
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.archive_path(engine_id));
        Ok(self.convert_files(engine_id, &files, &archive).await)
    }

    async fn convert_files(
        &self,
        engine_id: &str,
        files: &[PathBuf],
        archive: &Path,
    ) -> EngineReport {
        if files.is_empty() {
            return EngineReport::failed(
                engine_id,
                ConvertError::NoInputFiles(engine_id.to_string()),
                Vec::new(),
            );
        }

        // Checked before anything is read or written for this engine.
        let staging = self.staging_dir(engine_id);
        if let Err(e) = ensure_absent(&staging).await {
            return EngineReport::failed(engine_id, e, Vec::new());
        }

        let mut warnings = Vec::new();
        let mut sources = Vec::with_capacity(files.len());
        for path in files {
            match tokio::fs::read(path).await {
                Ok(bytes) => sources.push(DescriptorSource::new(
                    path.to_string_lossy(),
                    String::from_utf8_lossy(&bytes),
                )),
                Err(e) => {
                    warn!("Cannot read {}: {}", path.display(), e);
                    warnings.push(format!("{}: {}", path.display(), e));
                }
            }
        }

        let bundle = match compose(engine_id, &sources, &self.config) {
            Ok(bundle) => bundle,
            Err(e) => return EngineReport::failed(engine_id, e, warnings),
        };

        warnings.extend(bundle.warnings().iter().cloned());
        let composed_warnings = bundle.warnings().len();

        // Icon-independent, so it runs before anything is written.
        if let Err(e) = bundle.check_references() {
            return EngineReport::failed(engine_id, e, warnings);
        }

        if let Err(e) = create_staging(&staging).await {
            return EngineReport::failed(engine_id, e, warnings);
        }

        match self.fill_staging(engine_id, bundle, &staging, archive).await {
            Ok((bundle, archive)) => {
                warnings.extend(bundle.warnings()[composed_warnings..].iter().cloned());
                info!(
                    "Packaged {} with {} locale(s)",
                    engine_id,
                    bundle.locales().len()
                );
                EngineReport {
                    engine_id: engine_id.to_string(),
                    status: EngineStatus::Packaged {
                        archive,
                        locales: bundle.locale_order().to_vec(),
                    },
                    warnings,
                }
            }
            Err(e) => {
                discard_staging(&staging).await;
                EngineReport::failed(engine_id, e, warnings)
            }
        }
    }

    /// Writes the icon, manifest and catalogs into a fresh staging
    /// directory and archives it.
    async fn fill_staging(
        &self,
        engine_id: &str,
        bundle: EngineBundle,
        staging: &Path,
        archive: &Path,
    ) -> Result<(EngineBundle, PathBuf)> {
        let bundle = match bundle.icon().cloned() {
            Some(icon) => match materialize(&icon, staging, &self.resource_dir()).await {
                Ok(outcome) => {
                    if let IconOutcome::Skipped(reason) = &outcome {
                        warn!("Engine {} has no icon: {}", engine_id, reason);
                    }
                    bundle.with_icon(&outcome)
                }
                Err(e) => {
                    warn!("Engine {} has no icon: {}", engine_id, e);
                    bundle.with_warning(format!("icon: {}", e))
                }
            },
            None => bundle,
        };

        write_bundle(&bundle, staging).await?;
        match create_archive(staging, archive).await {
            Ok(written) => Ok((bundle, written)),
            Err(e) => {
                if tokio::fs::remove_file(archive).await.is_ok() {
                    debug!("Removed partial archive {}", archive.display());
                }
                Err(e)
            }
        }
    }
}

/// Removes a staging directory left behind by a failed conversion.
async fn discard_staging(staging: &Path) {
    match tokio::fs::remove_dir_all(staging).await {
        Ok(()) => debug!("Removed partial staging directory {}", staging.display()),
        Err(e) => warn!(
            "Cannot remove partial staging directory {}: {}",
            staging.display(),
            e
        ),
    }
}
