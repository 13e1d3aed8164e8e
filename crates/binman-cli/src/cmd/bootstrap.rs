//! Bootstrap command
//!
//! Turns a git repository holding `binman.yaml` into an install root:
//! clone, seed the manifest, copy this executable into `bin/` and write the
//! first `.source`.

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context as _, Result, bail};
use binman_core::{InstallRoot, source};
use binman_schema::{MANIFEST_FILE, Manifest, ManifestEntry, Platform};
use crossterm::style::Stylize;

const GITIGNORE: &str = ".gitignore";
const IGNORED: [&str; 2] = ["bin", ".source"];

/// Default install location: `~/.binman`
pub fn default_location() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".binman")
}

fn prompt(question: &str) -> Result<String> {
    print!("{question}");
    io::stdout().flush()?;
    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Manifest written into a fresh root: binman managing itself, plus the
/// shell lines that put the root on `PATH`.
pub fn default_manifest() -> Manifest {
    let entry = ManifestEntry::new(
        "https://github.com/juliankr/binman/releases/download/${version}/bin-manager-${system}-${cpu}",
        "0.0.4",
    )
    .with_source("export PATH=${install-root}/bin:$PATH")
    .with_source("export BMAN_PATH=${install-root}");

    let mut manifest = Manifest::new();
    manifest.insert("binman", entry);
    manifest
}

/// New `.gitignore` content with `bin` and `.source` ignored, or `None` when
/// both are already listed.
pub fn gitignore_content(existing: Option<&str>) -> Option<String> {
    let existing = existing.unwrap_or_default();
    let listed = |pattern: &str| {
        existing.lines().any(|line| {
            let line = line.trim().trim_start_matches('/').trim_end_matches('/');
            line == pattern
        })
    };

    let missing: Vec<&str> = IGNORED.into_iter().filter(|p| !listed(*p)).collect();
    if missing.is_empty() {
        return None;
    }

    let mut content = existing.to_string();
    if !content.is_empty() && !content.ends_with('\n') {
        content.push('\n');
    }
    for pattern in missing {
        content.push_str(pattern);
        content.push('\n');
    }
    Some(content)
}

fn is_git_repo(location: &Path) -> bool {
    location.join(".git").exists()
}

fn clone_repository(gitrepo: &str, location: &Path) -> Result<()> {
    println!("Cloning {gitrepo} into {}", location.display());
    let status = Command::new("git")
        .arg("clone")
        .arg(gitrepo)
        .arg(location)
        .status()
        .context("Failed to run git")?;
    if !status.success() {
        bail!("git clone exited with {status}");
    }
    Ok(())
}

/// Write [`default_manifest`] unless a manifest exists. Returns whether one
/// was written.
pub fn ensure_manifest(root: &InstallRoot) -> Result<bool> {
    let path = root.manifest_path();
    if path.exists() {
        return Ok(false);
    }
    let yaml = default_manifest().to_yaml_string()?;
    std::fs::write(&path, yaml).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(true)
}

/// Copy `exe` to `<root>/bin/binman` unless something is already there.
pub fn install_self(root: &InstallRoot, exe: &Path) -> Result<Option<PathBuf>> {
    let dest = root.binary_path("binman", None);
    if dest.exists() {
        return Ok(None);
    }
    std::fs::create_dir_all(root.bin_dir())?;
    std::fs::copy(exe, &dest)
        .with_context(|| format!("Failed to copy {} to {}", exe.display(), dest.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&dest, std::fs::Permissions::from_mode(0o755))?;
    }
    Ok(Some(dest))
}

/// Make sure `.gitignore` ignores the generated parts of the root.
pub fn update_gitignore(root: &InstallRoot) -> Result<()> {
    let path = root.path().join(GITIGNORE);
    let existing = match std::fs::read_to_string(&path) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e).with_context(|| format!("Failed to read {}", path.display())),
    };
    if let Some(content) = gitignore_content(existing.as_deref()) {
        std::fs::write(&path, content)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    Ok(())
}

/// Write the first `.source` from the manifest in the root, falling back to
/// a plain `PATH` export when no entry contributes a line.
pub fn write_initial_source(root: &InstallRoot) -> Result<PathBuf> {
    let manifest_path = root.manifest_path();
    let content = std::fs::read_to_string(&manifest_path)
        .with_context(|| format!("Failed to read {}", manifest_path.display()))?;
    let manifest = Manifest::from_yaml_str(&content)
        .with_context(|| format!("Invalid {MANIFEST_FILE}"))?;

    let mut script = source::render(root, &Platform::current(), manifest.iter());
    if script.is_empty() {
        script = format!("export PATH=\"{}/bin:$PATH\"\n", root.path().display());
    }
    let path = root.source_script_path();
    std::fs::write(&path, script).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(path)
}

/// Set up an install root at `location` from `gitrepo`, prompting for
/// whichever is missing.
pub fn bootstrap(gitrepo: Option<&str>, location: Option<&Path>) -> Result<()> {
    if which::which("git").is_err() {
        bail!("git is not installed. Please install git and try again.");
    }

    let gitrepo = match gitrepo {
        Some(repo) => repo.to_string(),
        None => prompt("URL of the git repository containing binman.yaml: ")?,
    };
    let location = match location {
        Some(path) => path.to_path_buf(),
        None => {
            let default = default_location();
            let answer = prompt(&format!("Location for binaries [{}]: ", default.display()))?;
            if answer.is_empty() {
                default
            } else {
                PathBuf::from(answer)
            }
        }
    };

    std::fs::create_dir_all(&location)
        .with_context(|| format!("Failed to create {}", location.display()))?;

    if is_git_repo(&location) {
        println!("{} is already a git repository", location.display());
    } else {
        if gitrepo.is_empty() {
            bail!("No git repository given");
        }
        clone_repository(&gitrepo, &location)?;
    }

    let root = InstallRoot::new(&location);
    if ensure_manifest(&root)? {
        println!("Created {}", root.manifest_path().display());
    } else {
        println!("Keeping existing {}", root.manifest_path().display());
    }

    let exe = std::env::current_exe().context("Failed to locate the running executable")?;
    if let Some(dest) = install_self(&root, &exe)? {
        println!("Copied binman to {}", dest.display());
    }

    update_gitignore(&root)?;
    let script = write_initial_source(&root)?;

    println!();
    println!("{} Bootstrapped {}", "✓".green(), location.display());
    println!("Commit and push the changes to your repository.");
    println!("Then add {} to your shell profile:", script.display());
    println!("  bash: echo 'source {}' >> ~/.bashrc", script.display());
    println!("  zsh:  echo 'source {}' >> ~/.zshrc", script.display());
    Ok(())
}
