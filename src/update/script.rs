//! Helper script rendering.
//!
//! The running app cannot overwrite itself, so the last install step is a
//! small script that waits for the app to exit, copies the new files into
//! place, cleans up, relaunches and deletes itself. Rendering is pure so
//! every variant can be checked byte for byte.

use crate::platform::Platform;
use crate::update::installer::{InstallPlan, PayloadKind};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Knobs for rendering and placing the helper script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOptions {
    /// Seconds to wait for the app to exit before touching its files.
    pub delay_secs: u32,
    /// Directory the script is written to.
    pub script_dir: PathBuf,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            delay_secs: 2,
            script_dir: std::env::temp_dir(),
        }
    }
}

impl ScriptOptions {
    /// Fixed script location for `platform`: `lexigen-update.sh` or
    /// `lexigen-update.bat` in [`script_dir`](Self::script_dir).
    pub fn script_path(&self, platform: Platform) -> PathBuf {
        self.script_dir
            .join(format!("lexigen-update.{}", platform.script_extension()))
    }
}

/// Render the helper script for `plan`.
///
/// Returns `None` when no script is needed and the artifact should be
/// launched directly (a Windows setup executable).
pub fn render_script(plan: &InstallPlan, options: &ScriptOptions) -> Option<String> {
    match plan.platform {
        Platform::Windows => render_batch(plan, options),
        Platform::Mac | Platform::Generic => Some(render_sh(plan, options)),
    }
}

fn render_sh(plan: &InstallPlan, options: &ScriptOptions) -> String {
    let artifact = sh_quote(&plan.artifact_path);
    let target = sh_quote(&plan.current_install_path);

    let mut s = String::from("#!/bin/sh\n# LexiGen update helper\n");
    let _ = writeln!(s, "sleep {}", options.delay_secs);

    match plan.payload_kind {
        PayloadKind::AppBundle => {
            let _ = writeln!(s, "rm -rf {target} || exit 1");
            let _ = writeln!(s, "cp -R {artifact} {target} || exit 1");
            if plan.platform == Platform::Mac {
                let _ = writeln!(s, "xattr -dr com.apple.quarantine {target} >/dev/null 2>&1");
            }
        }
        PayloadKind::Installer => {
            if plan.platform == Platform::Mac {
                let _ = writeln!(s, "open -W {artifact}");
            } else {
                let _ = writeln!(s, "{artifact}");
            }
        }
        PayloadKind::RawFiles => {
            let source = sh_quote(&plan.artifact_path.join("."));
            let dest = plan
                .current_install_path
                .parent()
                .unwrap_or_else(|| Path::new("/"))
                .join("");
            let _ = writeln!(s, "cp -R {source} {} || exit 1", sh_quote(&dest));
        }
        PayloadKind::Executable => {
            let _ = writeln!(s, "cp {artifact} {target} || exit 1");
            let _ = writeln!(s, "chmod +x {target} || exit 1");
        }
    }

    push_sh_cleanup(&mut s, plan);

    if plan.platform == Platform::Mac {
        let _ = writeln!(s, "open {target}");
    } else {
        let _ = writeln!(s, "nohup {target} >/dev/null 2>&1 &");
    }
    s.push_str("rm -f \"$0\"\n");
    s
}

fn push_sh_cleanup(s: &mut String, plan: &InstallPlan) {
    if let Some(mount) = &plan.mount_point {
        let _ = writeln!(s, "hdiutil detach {} -force >/dev/null 2>&1", sh_quote(mount));
        let _ = writeln!(s, "rm -rf {}", sh_quote(mount));
    }
    if let Some(work) = &plan.work_dir {
        let _ = writeln!(s, "rm -rf {}", sh_quote(work));
    }
    let _ = writeln!(s, "rm -f {}", sh_quote(&plan.download_path));
}

fn render_batch(plan: &InstallPlan, options: &ScriptOptions) -> Option<String> {
    let install = plan.current_install_path.display().to_string();
    let exe = bat_quote(&install);
    let artifact = bat_quote(&plan.artifact_path.display().to_string());

    let mut s = String::from("@echo off\r\n");
    s.push_str("echo Updating LexiGen...\r\n");
    // `timeout` refuses to run without a console; ping sleeps ~1s per extra echo.
    let _ = write!(s, "ping -n {} 127.0.0.1 >nul\r\n", options.delay_secs + 1);

    match plan.payload_kind {
        PayloadKind::Installer => return None,
        PayloadKind::Executable => {
            let _ = write!(s, "copy /Y {artifact} {exe} >nul\r\n");
        }
        PayloadKind::RawFiles | PayloadKind::AppBundle => {
            let dir = bat_quote(windows_parent(&install));
            let _ = write!(s, "xcopy {artifact} {dir} /E /I /Y /Q >nul\r\n");
        }
    }
    s.push_str("if errorlevel 1 (\r\n    echo LexiGen update failed.\r\n    exit /b 1\r\n)\r\n");

    if let Some(work) = &plan.work_dir {
        let _ = write!(
            s,
            "rmdir /S /Q {}\r\n",
            bat_quote(&work.display().to_string())
        );
    }
    let _ = write!(
        s,
        "del /F /Q {}\r\n",
        bat_quote(&plan.download_path.display().to_string())
    );
    let _ = write!(s, "start \"\" {exe}\r\n");
    s.push_str("del \"%~f0\"\r\n");
    Some(s)
}

/// Quote a path for POSIX `sh`: single quotes, embedded `'` as `'\''`.
pub fn sh_quote(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Quote a path for a batch file. `%` is doubled so it is not expanded.
pub fn bat_quote(path: &str) -> String {
    format!("\"{}\"", path.replace('"', "").replace('%', "%%"))
}

/// Parent of a Windows path, accepting either separator regardless of host.
fn windows_parent(path: &str) -> &str {
    match path.rfind(['\\', '/']) {
        Some(0) => &path[..1],
        Some(i) => &path[..i],
        None => ".",
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;
    use std::process::Command;

    fn plan(platform: Platform, kind: PayloadKind, artifact: &str, install: &str) -> InstallPlan {
        InstallPlan {
            platform,
            artifact_path: PathBuf::from(artifact),
            current_install_path: PathBuf::from(install),
            payload_kind: kind,
            mount_point: None,
            work_dir: None,
            download_path: PathBuf::from(artifact),
        }
    }

    #[test]
    fn mac_bundle_from_disk_image() {
        let mut p = plan(
            Platform::Mac,
            PayloadKind::AppBundle,
            "/tmp/lexigen-mount-1/LexiGen.app",
            "/Applications/LexiGen.app",
        );
        p.mount_point = Some(PathBuf::from("/tmp/lexigen-mount-1"));
        p.download_path = PathBuf::from("/tmp/lexigen-update-1.dmg");

        let script = render_script(&p, &ScriptOptions { delay_secs: 3, ..Default::default() }).unwrap();
        assert_eq!(
            script,
            "#!/bin/sh\n\
             # LexiGen update helper\n\
             sleep 3\n\
             rm -rf '/Applications/LexiGen.app' || exit 1\n\
             cp -R '/tmp/lexigen-mount-1/LexiGen.app' '/Applications/LexiGen.app' || exit 1\n\
             xattr -dr com.apple.quarantine '/Applications/LexiGen.app' >/dev/null 2>&1\n\
             hdiutil detach '/tmp/lexigen-mount-1' -force >/dev/null 2>&1\n\
             rm -rf '/tmp/lexigen-mount-1'\n\
             rm -f '/tmp/lexigen-update-1.dmg'\n\
             open '/Applications/LexiGen.app'\n\
             rm -f \"$0\"\n"
        );
    }

    #[test]
    fn mac_pkg_waits_for_installer() {
        let p = plan(
            Platform::Mac,
            PayloadKind::Installer,
            "/tmp/lexigen-update-2.pkg",
            "/Applications/LexiGen.app",
        );
        let script = render_script(&p, &ScriptOptions::default()).unwrap();
        assert!(script.contains("\nopen -W '/tmp/lexigen-update-2.pkg'\n"));
        assert!(script.ends_with("open '/Applications/LexiGen.app'\nrm -f \"$0\"\n"));
    }

    #[test]
    fn windows_setup_needs_no_script() {
        let p = plan(
            Platform::Windows,
            PayloadKind::Installer,
            r"C:\Temp\lexigen-update-3.exe",
            r"C:\Program Files\LexiGen\LexiGen.exe",
        );
        assert!(render_script(&p, &ScriptOptions::default()).is_none());
    }

    #[test]
    fn windows_portable_copies_tree() {
        let mut p = plan(
            Platform::Windows,
            PayloadKind::RawFiles,
            r"C:\Temp\lexigen-extract-4\LexiGen",
            r"C:\Apps\LexiGen\LexiGen.exe",
        );
        p.work_dir = Some(PathBuf::from(r"C:\Temp\lexigen-extract-4"));
        p.download_path = PathBuf::from(r"C:\Temp\lexigen-update-4.zip");

        let script = render_script(&p, &ScriptOptions { delay_secs: 2, ..Default::default() }).unwrap();
        assert_eq!(
            script,
            "@echo off\r\n\
             echo Updating LexiGen...\r\n\
             ping -n 3 127.0.0.1 >nul\r\n\
             xcopy \"C:\\Temp\\lexigen-extract-4\\LexiGen\" \"C:\\Apps\\LexiGen\" /E /I /Y /Q >nul\r\n\
             if errorlevel 1 (\r\n    echo LexiGen update failed.\r\n    exit /b 1\r\n)\r\n\
             rmdir /S /Q \"C:\\Temp\\lexigen-extract-4\"\r\n\
             del /F /Q \"C:\\Temp\\lexigen-update-4.zip\"\r\n\
             start \"\" \"C:\\Apps\\LexiGen\\LexiGen.exe\"\r\n\
             del \"%~f0\"\r\n"
        );
    }

    #[test]
    fn windows_executable_swap() {
        let p = plan(
            Platform::Windows,
            PayloadKind::Executable,
            r"C:\Temp\lexigen-update-5.exe",
            r"C:\Apps\LexiGen\LexiGen.exe",
        );
        let script = render_script(&p, &ScriptOptions::default()).unwrap();
        assert!(script.contains(
            "copy /Y \"C:\\Temp\\lexigen-update-5.exe\" \"C:\\Apps\\LexiGen\\LexiGen.exe\" >nul\r\n"
        ));
        assert!(script.contains("start \"\" \"C:\\Apps\\LexiGen\\LexiGen.exe\"\r\n"));
        assert!(script.ends_with("del \"%~f0\"\r\n"));
    }

    #[test]
    fn generic_raw_files_copy_contents() {
        let mut p = plan(
            Platform::Generic,
            PayloadKind::RawFiles,
            "/tmp/lexigen-extract-6/lexigen",
            "/opt/lexigen/lexigen",
        );
        p.work_dir = Some(PathBuf::from("/tmp/lexigen-extract-6"));
        p.download_path = PathBuf::from("/tmp/lexigen-update-6.zip");

        let script = render_script(&p, &ScriptOptions { delay_secs: 1, ..Default::default() }).unwrap();
        assert_eq!(
            script,
            "#!/bin/sh\n\
             # LexiGen update helper\n\
             sleep 1\n\
             cp -R '/tmp/lexigen-extract-6/lexigen/.' '/opt/lexigen/' || exit 1\n\
             rm -rf '/tmp/lexigen-extract-6'\n\
             rm -f '/tmp/lexigen-update-6.zip'\n\
             nohup '/opt/lexigen/lexigen' >/dev/null 2>&1 &\n\
             rm -f \"$0\"\n"
        );
    }

    #[test]
    fn generic_executable_swap_sets_mode() {
        let p = plan(
            Platform::Generic,
            PayloadKind::Executable,
            "/tmp/lexigen-update-7.AppImage",
            "/home/me/Apps/LexiGen.AppImage",
        );
        let script = render_script(&p, &ScriptOptions::default()).unwrap();
        assert!(script.contains(
            "cp '/tmp/lexigen-update-7.AppImage' '/home/me/Apps/LexiGen.AppImage' || exit 1\n\
             chmod +x '/home/me/Apps/LexiGen.AppImage' || exit 1\n"
        ));
        assert!(script.contains("nohup '/home/me/Apps/LexiGen.AppImage' >/dev/null 2>&1 &\n"));
    }

    #[cfg(unix)]
    #[test]
    fn failed_copy_keeps_download_and_skips_relaunch() {
        let dir = tempfile::tempdir().unwrap();
        let download = dir.path().join("lexigen-update-8.AppImage");
        std::fs::write(&download, b"new").unwrap();
        let install = dir.path().join("missing-dir").join("LexiGen.AppImage");
        let marker = dir.path().join("relaunched");

        let mut p = plan(
            Platform::Generic,
            PayloadKind::Executable,
            download.to_str().unwrap(),
            install.to_str().unwrap(),
        );
        p.download_path = download.clone();
        let script = render_script(&p, &ScriptOptions { delay_secs: 0, ..Default::default() })
            .unwrap()
            .replace("nohup", &format!("touch {} ; true", sh_quote(&marker)));
        let script_path = dir.path().join("lexigen-update.sh");
        std::fs::write(&script_path, script).unwrap();

        let status = Command::new("sh").arg(&script_path).status().unwrap();

        assert!(!status.success());
        assert!(download.exists());
        assert!(script_path.exists());
        assert!(!marker.exists());
    }

    #[test]
    fn windows_wait_works_without_console() {
        let p = plan(
            Platform::Windows,
            PayloadKind::Executable,
            r"C:\Temp\lexigen-update-9.exe",
            r"C:\Apps\LexiGen\LexiGen.exe",
        );
        let script = render_script(&p, &ScriptOptions { delay_secs: 4, ..Default::default() }).unwrap();
        assert!(script.contains("\r\nping -n 5 127.0.0.1 >nul\r\n"));
        assert!(!script.contains("timeout"));
    }

    #[test]
    fn script_path_is_fixed_per_platform() {
        let options = ScriptOptions {
            script_dir: PathBuf::from("/tmp"),
            ..Default::default()
        };
        assert_eq!(options.script_path(Platform::Mac), Path::new("/tmp/lexigen-update.sh"));
        assert_eq!(options.script_path(Platform::Generic), Path::new("/tmp/lexigen-update.sh"));
        assert_eq!(
            options.script_path(Platform::Windows),
            Path::new("/tmp/lexigen-update.bat")
        );
    }

    #[test]
    fn quoting() {
        assert_eq!(sh_quote(Path::new("/tmp/it's here")), r"'/tmp/it'\''s here'");
        assert_eq!(bat_quote(r"C:\100%\a"), r#""C:\100%%\a""#);
        assert_eq!(windows_parent(r"C:\Apps\LexiGen.exe"), r"C:\Apps");
        assert_eq!(windows_parent("C:/Apps/LexiGen.exe"), "C:/Apps");
        assert_eq!(windows_parent("LexiGen.exe"), ".");
    }
}
