use byteorder::{LittleEndian, ReadBytesExt};
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use log::{error, info, warn};
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Seek, Write};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

pub const STAGING_DIR: &str = "logs";
pub const ARCHIVE: &str = "logs.tar.gz";
pub const LOG_PATTERN: &str = "*.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Package,
    Extract,
    Unknown(String),
}

impl Mode {
    pub const PACKAGE_FLAG: &'static str = "-p";
    pub const EXTRACT_FLAG: &'static str = "-x";

    pub fn from_arg<S: AsRef<str>>(arg: S) -> Self {
        match arg.as_ref() {
            Self::PACKAGE_FLAG => Mode::Package,
            Self::EXTRACT_FLAG => Mode::Extract,
            other => Mode::Unknown(other.to_string()),
        }
    }

    pub fn from_os_arg<S: AsRef<OsStr>>(arg: S) -> Self {
        Self::from_arg(arg.as_ref().to_string_lossy())
    }
}

/// Locations shared by packaging and extraction.
///
/// `staging_dir` and `archive` are resolved against `workdir`. The staging
/// directory must stay relative, its name is what ends up inside the archive.
#[derive(Debug, Clone)]
pub struct Config {
    pub workdir: PathBuf,
    pub staging_dir: PathBuf,
    pub archive: PathBuf,
    pub pattern: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            workdir: PathBuf::from("."),
            staging_dir: PathBuf::from(STAGING_DIR),
            archive: PathBuf::from(ARCHIVE),
            pattern: LOG_PATTERN.to_string(),
        }
    }
}

impl Config {
    pub fn new<T: Into<PathBuf>>(workdir: T) -> Self {
        Self {
            workdir: workdir.into(),
            ..Self::default()
        }
    }

    pub fn with_staging_dir<T: Into<PathBuf>>(mut self, staging_dir: T) -> Self {
        self.staging_dir = staging_dir.into();
        self
    }

    pub fn with_archive<T: Into<PathBuf>>(mut self, archive: T) -> Self {
        self.archive = archive.into();
        self
    }

    pub fn with_pattern<T: Into<String>>(mut self, pattern: T) -> Self {
        self.pattern = pattern.into();
        self
    }

    pub fn staging_path(&self) -> PathBuf {
        self.workdir.join(&self.staging_dir)
    }

    pub fn archive_path(&self) -> PathBuf {
        self.workdir.join(&self.archive)
    }
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct Summary {
    pub created_staging: bool,
    /// Log files copied into the staging directory, as source paths.
    pub copied: Vec<PathBuf>,
    /// Entry names written to or read from the archive.
    pub entries: Vec<PathBuf>,
}

pub struct LogArchive {
    config: Config,
}

impl LogArchive {
    // 0x1f 0x8b read as little endian
    pub const GZIP_SIGNATURE: u16 = 0x8b1f;

    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn run(&self, mode: &Mode) -> io::Result<Summary> {
        info!("LogArchive.run <- {:?}", mode);
        let mut summary = Summary {
            created_staging: self.ensure_staging()?,
            ..Summary::default()
        };
        match mode {
            Mode::Package => {
                let packaged = self.package()?;
                summary.copied = packaged.copied;
                summary.entries = packaged.entries;
            }
            Mode::Extract => summary.entries = self.extract()?,
            Mode::Unknown(arg) => warn!("Unrecognized mode {arg:?}, nothing to do"),
        }
        info!(
            "LogArchive.run -> copied {}, entries {}",
            summary.copied.len(),
            summary.entries.len()
        );
        Ok(summary)
    }

    /// Returns `true` when the directory had to be created.
    pub fn ensure_staging(&self) -> io::Result<bool> {
        let staging = self.config.staging_path();
        if staging.is_dir() {
            return Ok(false);
        }
        println!("Creating directory {}", self.config.staging_dir.display());
        fs::create_dir_all(&staging).inspect_err(|e| error!("{}: {e}", staging.display()))?;
        Ok(true)
    }

    pub fn package(&self) -> io::Result<Summary> {
        info!(
            "LogArchive.package {} -> {}",
            self.config.staging_path().display(),
            self.config.archive_path().display()
        );
        let copied = self.collect()?;
        let entries = self.compress()?;
        Ok(Summary {
            created_staging: false,
            copied,
            entries,
        })
    }

    pub fn collect(&self) -> io::Result<Vec<PathBuf>> {
        let staging = self.config.staging_path();
        let mut copied = Vec::new();
        for source in self.log_files()? {
            let Some(name) = source.file_name() else {
                continue;
            };
            let target = staging.join(name);
            println!("{} -> {}", source.display(), target.display());
            fs::copy(&source, &target).inspect_err(|e| error!("{}: {e}", source.display()))?;
            copied.push(source);
        }
        Ok(copied)
    }

    pub fn log_files(&self) -> io::Result<Vec<PathBuf>> {
        let workdir = self.config.workdir.to_string_lossy();
        let pattern = Path::new(&glob::Pattern::escape(&workdir)).join(&self.config.pattern);
        let options = glob::MatchOptions {
            case_sensitive: true,
            require_literal_separator: true,
            require_literal_leading_dot: true,
        };
        let paths = glob::glob_with(&pattern.to_string_lossy(), options)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e.to_string()))?;

        let mut files = Vec::new();
        for path in paths {
            let path = path.map_err(glob::GlobError::into_error)?;
            if path.is_file() {
                files.push(path);
            }
        }
        files.sort();
        Ok(files)
    }

    /// Writes the whole staging directory, recursively, into the archive.
    pub fn compress(&self) -> io::Result<Vec<PathBuf>> {
        let staging = self.config.staging_path();
        let archive = self.config.archive_path();
        let file = File::create(&archive).inspect_err(|e| error!("{}: {e}", archive.display()))?;
        let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
        let mut builder = tar::Builder::new(encoder);

        let mut entries = Vec::new();
        for entry in WalkDir::new(&staging).sort_by_file_name() {
            let entry = entry?;
            let relative = entry
                .path()
                .strip_prefix(&staging)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
            let name = if relative.as_os_str().is_empty() {
                self.config.staging_dir.clone()
            } else {
                self.config.staging_dir.join(relative)
            };

            if entry.file_type().is_dir() {
                println!("{}/", name.display());
                builder.append_dir(&name, entry.path())?;
            } else {
                println!("{}", name.display());
                builder.append_path_with_name(entry.path(), &name)?;
            }
            entries.push(name);
        }

        let mut writer = builder.into_inner()?.finish()?;
        writer.flush()?;
        Ok(entries)
    }

    pub fn extract(&self) -> io::Result<Vec<PathBuf>> {
        let archive = self.config.archive_path();
        info!(
            "LogArchive.extract {} -> {}",
            archive.display(),
            self.config.workdir.display()
        );
        let mut file = File::open(&archive).inspect_err(|e| error!("{}: {e}", archive.display()))?;
        // reject up front so the error names the archive, not a tar/gzip decode failure
        let signature = match file.read_u16::<LittleEndian>() {
            Ok(signature) => signature,
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => 0,
            Err(e) => return Err(e),
        };
        if signature != Self::GZIP_SIGNATURE {
            let e = io::Error::new(
                io::ErrorKind::InvalidData,
                format!("{} is not a gzip archive", archive.display()),
            );
            error!("{e}");
            return Err(e);
        }
        file.rewind()?;

        let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
        let mut entries = Vec::new();
        for entry in tar.entries()? {
            let mut entry = entry?;
            let name = entry.path()?.into_owned();
            if !entry.unpack_in(&self.config.workdir)? {
                warn!("Skipped {}: outside of {}", name.display(), self.config.workdir.display());
                continue;
            }
            println!("{}", name.display());
            entries.push(name);
        }
        Ok(entries)
    }
}
