//! Archive unpacking and installation of the transcoder executables
//!
//! Each platform ships ffmpeg differently, so the strategy is chosen once from
//! the archive layout. All strategies unpack into scratch directories created
//! inside the managed directory (same filesystem, so the final rename is
//! atomic) and only touch the final executable paths after a successful unpack.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use log::{debug, info, warn};
use walkdir::WalkDir;
use zip::ZipArchive;

use super::core::set_executable_best_effort;
use crate::process;
use crate::tools::ArchiveLayout;
use crate::{MediaError, Result};

/// How downloaded archives become installed executables
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStrategy {
    /// One zip per executable, quarantine attribute stripped after install
    MacOsZips,
    /// One bundled zip, PowerShell `Expand-Archive` as fallback
    WindowsZip,
    /// One bundled `.tar.xz` unpacked with the system `tar`
    LinuxTarXz,
}

impl InstallStrategy {
    /// Strategy for an archive layout; raw executables need none
    pub fn for_layout(layout: ArchiveLayout) -> Option<Self> {
        match layout {
            ArchiveLayout::RawExecutable => None,
            ArchiveLayout::ZipPerExecutable => Some(InstallStrategy::MacOsZips),
            ArchiveLayout::BundledZip => Some(InstallStrategy::WindowsZip),
            ArchiveLayout::BundledTarXz => Some(InstallStrategy::LinuxTarXz),
        }
    }
}

/// Installs executables out of downloaded archives into the managed directory
#[derive(Debug, Clone)]
pub struct ArchiveInstaller {
    managed_dir: PathBuf,
}

impl ArchiveInstaller {
    pub fn new(managed_dir: impl Into<PathBuf>) -> Self {
        Self {
            managed_dir: managed_dir.into(),
        }
    }

    /// Unpack `archives` and install every name in `executables` into the
    /// managed directory. Returns the installed paths in `executables` order.
    ///
    /// `MacOsZips` pairs `archives[i]` with `executables[i]`; the bundled
    /// strategies take a single archive holding all executables.
    pub async fn install(
        &self,
        strategy: InstallStrategy,
        archives: &[PathBuf],
        executables: &[String],
    ) -> Result<Vec<PathBuf>> {
        info!(
            "Installing {} from {} archive(s) using {:?}",
            executables.join(", "),
            archives.len(),
            strategy
        );
        tokio::fs::create_dir_all(&self.managed_dir).await?;

        match strategy {
            InstallStrategy::MacOsZips => self.install_mac_zips(archives, executables).await,
            InstallStrategy::WindowsZip => {
                let archive = single_archive(archives)?;
                self.install_windows_zip(archive, executables).await
            }
            InstallStrategy::LinuxTarXz => {
                let archive = single_archive(archives)?;
                self.install_linux_tar_xz(archive, executables).await
            }
        }
    }

    async fn install_mac_zips(
        &self,
        archives: &[PathBuf],
        executables: &[String],
    ) -> Result<Vec<PathBuf>> {
        if archives.len() != executables.len() {
            return Err(MediaError::Extract(format!(
                "expected {} archives, got {}",
                executables.len(),
                archives.len()
            )));
        }

        let mut installed = Vec::with_capacity(executables.len());
        for (archive, exe) in archives.iter().zip(executables) {
            let scratch = self.scratch_dir()?;
            unzip(archive, scratch.path()).await?;
            let found = find_file(scratch.path(), exe)?;
            let dest = self.install_executable(&found, exe).await?;
            remove_quarantine(&dest).await;
            installed.push(dest);
        }
        Ok(installed)
    }

    async fn install_windows_zip(
        &self,
        archive: &Path,
        executables: &[String],
    ) -> Result<Vec<PathBuf>> {
        let scratch = self.scratch_dir()?;
        if let Err(e) = unzip(archive, scratch.path()).await {
            warn!("In-process unzip failed ({e}), falling back to Expand-Archive");
            let fresh = self.scratch_dir()?;
            expand_archive_powershell(archive, fresh.path()).await?;
            return self.install_found(fresh.path(), executables).await;
        }
        self.install_found(scratch.path(), executables).await
    }

    async fn install_linux_tar_xz(
        &self,
        archive: &Path,
        executables: &[String],
    ) -> Result<Vec<PathBuf>> {
        // Fast path: pull only `<top>/bin/<exe>` straight into the scratch root
        let scratch = self.scratch_dir()?;
        let mut args: Vec<String> = vec![
            "-xf".into(),
            archive.display().to_string(),
            "-C".into(),
            scratch.path().display().to_string(),
            "--strip-components=2".into(),
            "--wildcards".into(),
        ];
        args.extend(executables.iter().map(|exe| format!("*/bin/{exe}")));

        match run_tar(&args).await {
            Ok(()) if executables.iter().all(|exe| scratch.path().join(exe).is_file()) => {
                let mut installed = Vec::with_capacity(executables.len());
                for exe in executables {
                    installed.push(
                        self.install_executable(&scratch.path().join(exe), exe)
                            .await?,
                    );
                }
                return Ok(installed);
            }
            Ok(()) => debug!("Selective tar extraction did not yield every executable"),
            Err(e) => debug!("Selective tar extraction failed: {e}"),
        }
        drop(scratch);

        info!("Falling back to full extraction of {}", archive.display());
        let full = self.scratch_dir()?;
        run_tar(&[
            "-xf".into(),
            archive.display().to_string(),
            "-C".into(),
            full.path().display().to_string(),
        ])
        .await?;

        let bin_dir = find_versioned_bin_dir(full.path()).ok_or_else(|| {
            MediaError::Extract("no ffmpeg-*/bin directory in archive".to_string())
        })?;
        if let Some(missing) = executables.iter().find(|exe| !bin_dir.join(exe).is_file()) {
            return Err(MediaError::Extract(format!(
                "{missing} not found in {}",
                bin_dir.display()
            )));
        }
        let mut installed = Vec::with_capacity(executables.len());
        for exe in executables {
            installed.push(self.install_executable(&bin_dir.join(exe), exe).await?);
        }
        Ok(installed)
    }

    /// Locate every executable anywhere below `root` and install it
    async fn install_found(&self, root: &Path, executables: &[String]) -> Result<Vec<PathBuf>> {
        // Resolve all of them before installing any, so a partial archive changes nothing
        let sources = executables
            .iter()
            .map(|exe| find_file(root, exe))
            .collect::<Result<Vec<_>>>()?;

        let mut installed = Vec::with_capacity(executables.len());
        for (src, exe) in sources.iter().zip(executables) {
            installed.push(self.install_executable(src, exe).await?);
        }
        Ok(installed)
    }

    /// Copy `src` to `<managed>/<name>` through a temporary sibling and a rename
    async fn install_executable(&self, src: &Path, name: &str) -> Result<PathBuf> {
        let dest = self.managed_dir.join(name);
        let staging = self.managed_dir.join(format!(".{name}.installing"));

        let result = async {
            tokio::fs::copy(src, &staging).await?;
            set_executable_best_effort(&staging).await;
            tokio::fs::rename(&staging, &dest).await?;
            Ok::<_, MediaError>(())
        }
        .await;

        if let Err(e) = result {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e);
        }
        debug!("Installed {} -> {}", src.display(), dest.display());
        Ok(dest)
    }

    /// Scratch directory inside the managed dir, removed on drop
    fn scratch_dir(&self) -> Result<tempfile::TempDir> {
        Ok(tempfile::Builder::new()
            .prefix(".extract-")
            .tempdir_in(&self.managed_dir)?)
    }
}

fn single_archive(archives: &[PathBuf]) -> Result<&Path> {
    match archives {
        [one] => Ok(one),
        other => Err(MediaError::Extract(format!(
            "expected exactly one archive, got {}",
            other.len()
        ))),
    }
}

/// Unpack a zip archive into `dest`
async fn unzip(archive: &Path, dest: &Path) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();

    // Zip inflation is CPU-bound
    tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&archive)?;
        let mut zip = ZipArchive::new(file)?;
        debug!("Unpacking {} ({} entries)", archive.display(), zip.len());
        zip.extract(&dest)?;
        Ok::<_, MediaError>(())
    })
    .await?
}

async fn expand_archive_powershell(archive: &Path, dest: &Path) -> Result<()> {
    let script = format!(
        "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
        archive.display(),
        dest.display()
    );
    let output = process::command("powershell")
        .args(["-NoProfile", "-NonInteractive", "-Command", &script])
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(MediaError::Extract(format!(
            "Expand-Archive failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

async fn run_tar(args: &[String]) -> Result<()> {
    debug!("tar {}", args.join(" "));
    let output = process::command("tar")
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await?;
    if !output.status.success() {
        return Err(MediaError::Extract(format!(
            "tar exited with {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

/// Shallowest regular file named `name` below `root`
fn find_file(root: &Path, name: &str) -> Result<PathBuf> {
    WalkDir::new(root)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == name)
        .min_by_key(|entry| entry.depth())
        .map(|entry| entry.into_path())
        .ok_or_else(|| {
            MediaError::Extract(format!("{name} not found in extracted archive"))
        })
}

/// The `ffmpeg-*/bin` directory of a fully extracted build archive
fn find_versioned_bin_dir(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .filter(|entry| entry.file_name().to_string_lossy().starts_with("ffmpeg-"))
        .map(|entry| entry.path().join("bin"))
        .find(|bin| bin.is_dir())
}

/// Strip the Gatekeeper quarantine flag; failures are logged and ignored
async fn remove_quarantine(path: &Path) {
    if !cfg!(target_os = "macos") {
        return;
    }
    match process::command("xattr")
        .args(["-d", "com.apple.quarantine"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
    {
        Ok(_) => debug!("Cleared quarantine attribute on {}", path.display()),
        Err(e) => warn!("Could not run xattr on {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = std::fs::File::create(path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let options =
            SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);
        for (name, body) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(body).unwrap();
        }
        zip.finish().unwrap();
    }

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn strategy_follows_platform_and_layout() {
        assert_eq!(
            InstallStrategy::for_layout(ArchiveLayout::ZipPerExecutable),
            Some(InstallStrategy::MacOsZips)
        );
        assert_eq!(
            InstallStrategy::for_layout(ArchiveLayout::BundledTarXz),
            Some(InstallStrategy::LinuxTarXz)
        );
        assert_eq!(InstallStrategy::for_layout(ArchiveLayout::RawExecutable), None);
        assert_eq!(
            InstallStrategy::for_layout(ArchiveLayout::BundledZip),
            Some(InstallStrategy::WindowsZip)
        );
    }

    #[tokio::test]
    async fn per_executable_zips_install_both_binaries() {
        let downloads = tempfile::tempdir().unwrap();
        let managed = tempfile::tempdir().unwrap();
        let ffmpeg_zip = downloads.path().join("ffmpeg.zip");
        let ffprobe_zip = downloads.path().join("ffprobe.zip");
        write_zip(&ffmpeg_zip, &[("ffmpeg", b"ffmpeg-bytes")]);
        write_zip(&ffprobe_zip, &[("__MACOSX/._x", b""), ("ffprobe", b"ffprobe-bytes")]);

        let installer = ArchiveInstaller::new(managed.path());
        let installed = installer
            .install(
                InstallStrategy::MacOsZips,
                &[ffmpeg_zip, ffprobe_zip],
                &["ffmpeg".to_string(), "ffprobe".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(installed[0], managed.path().join("ffmpeg"));
        assert_eq!(std::fs::read(&installed[1]).unwrap(), b"ffprobe-bytes");
        // Scratch directories and staging files are gone
        assert_eq!(entries(managed.path()), vec!["ffmpeg", "ffprobe"]);
    }

    #[tokio::test]
    async fn bundled_zip_is_searched_recursively() {
        let downloads = tempfile::tempdir().unwrap();
        let managed = tempfile::tempdir().unwrap();
        let archive = downloads.path().join("ffmpeg-master-latest-win64-gpl.zip");
        write_zip(
            &archive,
            &[
                ("ffmpeg-master-latest-win64-gpl/LICENSE.txt", b"gpl"),
                ("ffmpeg-master-latest-win64-gpl/bin/ffmpeg.exe", b"ff"),
                ("ffmpeg-master-latest-win64-gpl/bin/ffprobe.exe", b"fp"),
            ],
        );

        let installed = ArchiveInstaller::new(managed.path())
            .install(
                InstallStrategy::WindowsZip,
                &[archive],
                &["ffmpeg.exe".to_string(), "ffprobe.exe".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&installed[0]).unwrap(), b"ff");
        assert_eq!(entries(managed.path()), vec!["ffmpeg.exe", "ffprobe.exe"]);
    }

    #[tokio::test]
    async fn missing_executable_fails_without_touching_managed_dir() {
        let downloads = tempfile::tempdir().unwrap();
        let managed = tempfile::tempdir().unwrap();
        std::fs::write(managed.path().join("ffmpeg"), b"previous").unwrap();
        let archive = downloads.path().join("partial.zip");
        write_zip(&archive, &[("build/bin/ffmpeg", b"new")]);

        let err = ArchiveInstaller::new(managed.path())
            .install(
                InstallStrategy::WindowsZip,
                &[archive],
                &["ffmpeg".to_string(), "ffprobe".to_string()],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Extract(_)));
        assert_eq!(entries(managed.path()), vec!["ffmpeg"]);
        assert_eq!(std::fs::read(managed.path().join("ffmpeg")).unwrap(), b"previous");
    }

    /// `.tar.xz` of `files` below `top`, packed with the system `tar`.
    /// `dot_prefix` stores members as `./top/...` like some static builds do.
    #[cfg(unix)]
    fn write_tar_xz(archive: &Path, top: &str, files: &[(&str, &[u8])], dot_prefix: bool) {
        let src = tempfile::tempdir().unwrap();
        for (rel, body) in files {
            let path = src.path().join(top).join(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(path, body).unwrap();
        }
        let status = std::process::Command::new("tar")
            .arg("-cJf")
            .arg(archive)
            .arg("-C")
            .arg(src.path())
            .arg(if dot_prefix { "." } else { top })
            .status()
            .unwrap();
        assert!(status.success(), "tar -cJf failed");
    }

    #[cfg(unix)]
    fn assert_executable(path: &Path) {
        use std::os::unix::fs::PermissionsExt;
        let mode = std::fs::metadata(path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111, "{} is not executable", path.display());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tar_xz_selective_extraction_installs_bin_entries() {
        let downloads = tempfile::tempdir().unwrap();
        let managed = tempfile::tempdir().unwrap();
        let archive = downloads.path().join("ffmpeg-master-latest-linux64-gpl.tar.xz");
        write_tar_xz(
            &archive,
            "ffmpeg-master-latest-linux64-gpl",
            &[
                ("bin/ffmpeg", b"ffmpeg-bytes"),
                ("bin/ffprobe", b"ffprobe-bytes"),
                ("doc/ffmpeg.html", b"<html/>"),
            ],
            false,
        );

        let installed = ArchiveInstaller::new(managed.path())
            .install(
                InstallStrategy::LinuxTarXz,
                &[archive],
                &["ffmpeg".to_string(), "ffprobe".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(installed, vec![managed.path().join("ffmpeg"), managed.path().join("ffprobe")]);
        assert_eq!(std::fs::read(&installed[0]).unwrap(), b"ffmpeg-bytes");
        assert_eq!(std::fs::read(&installed[1]).unwrap(), b"ffprobe-bytes");
        installed.iter().for_each(|p| assert_executable(p));
        assert_eq!(entries(managed.path()), vec!["ffmpeg", "ffprobe"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tar_xz_falls_back_to_full_extraction() {
        let downloads = tempfile::tempdir().unwrap();
        let managed = tempfile::tempdir().unwrap();
        let archive = downloads.path().join("ffmpeg-7.1-amd64-static.tar.xz");
        // `./` members leave `bin/` behind after stripping two components
        write_tar_xz(
            &archive,
            "ffmpeg-7.1-amd64-static",
            &[("bin/ffmpeg", b"static-ffmpeg"), ("bin/ffprobe", b"static-ffprobe")],
            true,
        );

        let installed = ArchiveInstaller::new(managed.path())
            .install(
                InstallStrategy::LinuxTarXz,
                &[archive],
                &["ffmpeg".to_string(), "ffprobe".to_string()],
            )
            .await
            .unwrap();

        assert_eq!(std::fs::read(&installed[0]).unwrap(), b"static-ffmpeg");
        assert_eq!(std::fs::read(&installed[1]).unwrap(), b"static-ffprobe");
        installed.iter().for_each(|p| assert_executable(p));
        assert_eq!(entries(managed.path()), vec!["ffmpeg", "ffprobe"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn tar_xz_without_every_executable_keeps_previous_install() {
        let downloads = tempfile::tempdir().unwrap();
        let managed = tempfile::tempdir().unwrap();
        std::fs::write(managed.path().join("ffmpeg"), b"previous").unwrap();
        let archive = downloads.path().join("broken.tar.xz");
        write_tar_xz(&archive, "ffmpeg-broken", &[("bin/ffmpeg", b"new")], false);

        let err = ArchiveInstaller::new(managed.path())
            .install(
                InstallStrategy::LinuxTarXz,
                &[archive],
                &["ffmpeg".to_string(), "ffprobe".to_string()],
            )
            .await
            .unwrap_err();

        assert!(matches!(err, MediaError::Extract(_)), "{err}");
        assert_eq!(entries(managed.path()), vec!["ffmpeg"]);
        assert_eq!(std::fs::read(managed.path().join("ffmpeg")).unwrap(), b"previous");
    }

    #[tokio::test]
    async fn bundled_strategies_reject_multiple_archives() {
        let managed = tempfile::tempdir().unwrap();
        let err = ArchiveInstaller::new(managed.path())
            .install(
                InstallStrategy::LinuxTarXz,
                &[PathBuf::from("a"), PathBuf::from("b")],
                &["ffmpeg".to_string()],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::Extract(_)));
    }

    #[test]
    fn versioned_bin_dir_is_found_after_full_extraction() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(root.path().join("docs")).unwrap();
        std::fs::create_dir_all(root.path().join("ffmpeg-n7.1-latest-linux64-gpl-7.1/bin")).unwrap();
        assert_eq!(
            find_versioned_bin_dir(root.path()),
            Some(root.path().join("ffmpeg-n7.1-latest-linux64-gpl-7.1/bin"))
        );

        let empty = tempfile::tempdir().unwrap();
        assert_eq!(find_versioned_bin_dir(empty.path()), None);
    }
}
