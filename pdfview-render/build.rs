use std::env;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use flate2::read::GzDecoder;
use tar::Archive;
use ureq::{AgentBuilder, Error as UreqError};
use walkdir::WalkDir;
use zip::read::ZipArchive;

const DEFAULT_PDFIUM_VERSION: &str = "7350";
const DEFAULT_BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";
const DOWNLOADS_DIR: &str = "downloads";

const WATCHED_ENV: &[&str] = &[
    "PDFVIEW_PDFIUM_SKIP_DOWNLOAD",
    "PDFVIEW_PDFIUM_ARCHIVE_PATH",
    "PDFVIEW_PDFIUM_VERSION",
    "PDFVIEW_PDFIUM_RELEASE_TAG",
    "PDFVIEW_PDFIUM_PLATFORM",
    "PDFVIEW_PDFIUM_BASE_URL",
    "PDFVIEW_PDFIUM_FORCE_DOWNLOAD",
    "PDFIUM_DYNAMIC_LIB_PATH",
    "PDFIUM_STATIC_LIB_PATH",
];

/// Where and how to obtain the pdfium shared library for this target.
struct FetchPlan {
    target_os: String,
    platform: String,
    version: String,
    release_tag: String,
    base_url: String,
    archive: Option<PathBuf>,
    force_download: bool,
}

impl FetchPlan {
    fn from_env() -> Result<Self> {
        let target_os = env::var("CARGO_CFG_TARGET_OS").context("CARGO_CFG_TARGET_OS missing")?;
        let target_arch =
            env::var("CARGO_CFG_TARGET_ARCH").context("CARGO_CFG_TARGET_ARCH missing")?;
        let version = env_or("PDFVIEW_PDFIUM_VERSION", DEFAULT_PDFIUM_VERSION);
        Ok(Self {
            platform: env::var("PDFVIEW_PDFIUM_PLATFORM")
                .unwrap_or_else(|_| platform_for(&target_os, &target_arch)),
            release_tag: env::var("PDFVIEW_PDFIUM_RELEASE_TAG")
                .unwrap_or_else(|_| format!("chromium/{version}")),
            base_url: env_or("PDFVIEW_PDFIUM_BASE_URL", DEFAULT_BASE_URL),
            archive: env::var_os("PDFVIEW_PDFIUM_ARCHIVE_PATH").map(PathBuf::from),
            force_download: env::var_os("PDFVIEW_PDFIUM_FORCE_DOWNLOAD").is_some(),
            version,
            target_os,
        })
    }

    fn library_name(&self) -> &'static str {
        match self.target_os.as_str() {
            "windows" => "pdfium.dll",
            "macos" => "libpdfium.dylib",
            _ => "libpdfium.so",
        }
    }

    fn archive_names(&self) -> [String; 4] {
        let (version, platform) = (&self.version, &self.platform);
        [
            format!("pdfium-{platform}.tgz"),
            format!("pdfium-{version}-{platform}.tgz"),
            format!("pdfium-{platform}.zip"),
            format!("pdfium-{version}-{platform}.zip"),
        ]
    }

    fn url_for(&self, file_name: &str) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            self.release_tag.trim_matches('/'),
            file_name
        )
    }
}

fn main() -> Result<()> {
    println!("cargo:rerun-if-changed=build.rs");
    for name in WATCHED_ENV {
        println!("cargo:rerun-if-env-changed={name}");
    }

    if env::var_os("PDFVIEW_PDFIUM_SKIP_DOWNLOAD").is_some()
        || env::var_os("PDFIUM_DYNAMIC_LIB_PATH").is_some()
        || env::var_os("PDFIUM_STATIC_LIB_PATH").is_some()
    {
        return Ok(());
    }

    let plan = FetchPlan::from_env()?;
    let out_dir = PathBuf::from(env::var("OUT_DIR").context("OUT_DIR not set")?);
    let staging = out_dir.join("pdfium");
    fs::create_dir_all(&staging).context("failed to create pdfium staging directory")?;

    if let Some(library) = find_library(&staging, plan.library_name()) {
        return export_library_path(&library);
    }

    let archive = match &plan.archive {
        Some(path) => path.clone(),
        None => download(&plan, &staging.join(DOWNLOADS_DIR))?,
    };
    unpack(&archive, &staging)?;

    let library = find_library(&staging, plan.library_name())
        .with_context(|| format!("{} missing from {:?}", plan.library_name(), archive))?;
    export_library_path(&library)
}

fn env_or(name: &str, fallback: &str) -> String {
    env::var(name).unwrap_or_else(|_| fallback.to_string())
}

fn platform_for(target_os: &str, target_arch: &str) -> String {
    let os = match target_os {
        "macos" => "mac",
        other => other,
    };
    let arch = match target_arch {
        "aarch64" => "arm64",
        "x86_64" => "x64",
        other => other,
    };
    format!("{os}-{arch}")
}

fn export_library_path(path: &Path) -> Result<()> {
    let path = path
        .to_str()
        .ok_or_else(|| anyhow!("library path {:?} is not UTF-8", path))?;
    println!("cargo:rustc-env=PDFVIEW_PDFIUM_LIBRARY_PATH={path}");
    Ok(())
}

fn find_library(root: &Path, file_name: &str) -> Option<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .find(|entry| entry.file_name().to_string_lossy() == file_name)
        .map(|entry| entry.into_path())
}

fn download(plan: &FetchPlan, cache_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(cache_dir).context("failed to create download cache")?;
    let agent = AgentBuilder::new()
        .timeout_read(Duration::from_secs(120))
        .timeout_write(Duration::from_secs(120))
        .build();

    let mut failures = Vec::new();
    for file_name in plan.archive_names() {
        let destination = cache_dir.join(&file_name);
        if destination.exists() && !plan.force_download {
            return Ok(destination);
        }
        let url = plan.url_for(&file_name);
        match fetch(&agent, &url, &destination) {
            Ok(()) => return Ok(destination),
            Err(err) => failures.push(err.to_string()),
        }
    }

    bail!(
        "no pdfium archive for {} (version {}): {}",
        plan.platform,
        plan.version,
        failures.join("; ")
    )
}

fn fetch(agent: &ureq::Agent, url: &str, destination: &Path) -> Result<()> {
    let response = agent.get(url).call().map_err(|err| match err {
        UreqError::Status(code, _) => anyhow!("GET {url} returned HTTP {code}"),
        other => anyhow!("GET {url} failed: {other}"),
    })?;

    let mut file =
        File::create(destination).with_context(|| format!("failed to create {:?}", destination))?;
    io::copy(&mut response.into_reader(), &mut file)
        .with_context(|| format!("failed to write {:?}", destination))?;
    file.flush().ok();
    Ok(())
}

/// Unpacks `archive` into `destination`, replacing a previous extraction but
/// keeping the download cache.
fn unpack(archive: &Path, destination: &Path) -> Result<()> {
    for entry in fs::read_dir(destination)? {
        let entry = entry?;
        if entry.file_name() == DOWNLOADS_DIR {
            continue;
        }
        let path = entry.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.with_context(|| format!("failed to remove stale {:?}", path))?;
    }

    let extension = archive
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let file = File::open(archive).with_context(|| format!("failed to open {:?}", archive))?;

    match extension.as_str() {
        "tgz" | "gz" => Archive::new(GzDecoder::new(file))
            .unpack(destination)
            .with_context(|| format!("failed to unpack {:?}", archive)),
        "zip" => ZipArchive::new(file)
            .with_context(|| format!("failed to read {:?}", archive))?
            .extract(destination)
            .with_context(|| format!("failed to extract {:?}", archive)),
        _ => bail!("unsupported archive format {:?}", archive),
    }
}
