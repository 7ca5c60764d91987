//! The transaction driver: plan display, confirmation, the bulk download +
//! checksum gate, and ordered execution with the shared protected-files
//! set.

use anyhow::{anyhow, bail, Context, Result};
use log::{error, info, warn};
use std::collections::{HashMap, HashSet};
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use crate::api::Ctx;
use crate::checksum;
use crate::config::Config;
use crate::download;
use crate::fileset::Fileset;
use crate::info;
use crate::install::{install_pkg, upgrade_pkg};
use crate::interrupt;
use crate::pin;
use crate::remove::remove_pkg;
use crate::solver::deps::Constraint;
use crate::solver::{Job, Pool, SolverFlags, StepKind, Transaction};
use crate::status;

/// What a transaction will do, for display and for the confirm callback.
#[derive(Debug, Default)]
pub struct TxnSummary {
    pub install: Vec<(String, String)>,
    pub upgrade: Vec<(String, String)>,
    pub remove: Vec<(String, String)>,
}

impl TxnSummary {
    pub fn counts_line(&self) -> String {
        format!(
            "{} to install, {} to upgrade, {} to remove.",
            self.install.len(),
            self.upgrade.len(),
            self.remove.len()
        )
    }

    pub fn affected(&self) -> usize {
        self.install.len() + self.upgrade.len() + self.remove.len()
    }
}

pub fn summarize(pool: &Pool, txn: &Transaction) -> TxnSummary {
    let mut summary = TxnSummary::default();
    for step in &txn.steps {
        let s = pool.get(step.id);
        let entry = (s.name.clone(), s.version_str().to_string());
        match step.kind {
            StepKind::Install => summary.install.push(entry),
            StepKind::Upgrade { .. } | StepKind::Downgrade { .. } => {
                summary.upgrade.push(entry)
            }
            StepKind::Remove => summary.remove.push(entry),
            StepKind::Erased { .. } => {}
        }
    }
    summary
}

pub fn display(summary: &TxnSummary) {
    let groups = [
        ("The following packages will be INSTALLED:", &summary.install),
        ("The following packages will be UPGRADED:", &summary.upgrade),
        ("The following packages will be REMOVED:", &summary.remove),
    ];
    for (heading, entries) in groups {
        if entries.is_empty() {
            continue;
        }
        eprintln!("{}", heading);
        for (name, version) in entries {
            eprintln!("  {} {}", name, version);
        }
    }
    eprintln!();
    eprintln!("{}", summary.counts_line());
}

/// Ask the user (or the embedding program's callback) whether to proceed.
/// Non-interactive runs proceed.
pub fn confirm_continue(ctx: &Ctx, summary: &TxnSummary) -> bool {
    if let Some(callback) = &ctx.confirm {
        return callback(summary);
    }
    if ctx.config.non_interactive || !std::io::stdin().is_terminal() {
        return true;
    }
    dialoguer::Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()
        .unwrap_or(false)
}

/// Load every configured source index into the pool. With `strict`, a
/// missing index is an error; queries pass `false` and show what they can.
pub fn load_sources(cfg: &Config, pool: &mut Pool, strict: bool) -> Result<()> {
    for (index, source) in cfg.sources.iter().enumerate() {
        if !source.url.starts_with("https://") {
            warn!("source '{}' uses insecure transport", source.name);
        }

        let list_path = cfg.lists_dir.join(&source.name);
        match std::fs::read_to_string(&list_path) {
            Ok(content) => pool.load_repo(&source.name, &content, index)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !strict => continue,
            Err(e) => {
                return Err(anyhow!(
                    "cannot open package list '{}': {} (have you run 'aept update'?)",
                    list_path.display(),
                    e
                ))
            }
        }
    }
    Ok(())
}

/// Fetch one step's package into the cache and verify it against the
/// index-declared checksum. Local packages are used in place.
pub fn download_package(cfg: &Config, pool: &Pool, id: usize) -> Result<PathBuf> {
    let s = pool.get(id);

    if let Some(local) = &s.local_path {
        return Ok(local.clone());
    }

    let location = s
        .filename
        .as_ref()
        .ok_or_else(|| anyhow!("no download location for '{}'", s.name))?;
    let source_index = pool
        .source_index(id)
        .ok_or_else(|| anyhow!("unknown source for '{}'", s.name))?;
    let source = cfg
        .sources
        .get(source_index)
        .ok_or_else(|| anyhow!("unknown source for '{}'", s.name))?;

    let url = format!("{}/{}", source.url, location);
    let base = Path::new(location)
        .file_name()
        .ok_or_else(|| anyhow!("bad download location '{}'", location))?;

    std::fs::create_dir_all(&cfg.cache_dir)
        .with_context(|| format!("cannot create '{}'", cfg.cache_dir.display()))?;
    let dest = cfg.cache_dir.join(base);

    download::download(&url, &dest, &format!("{} {}", s.name, s.version_str()))?;

    if let Some((kind, expected)) = &s.checksum {
        checksum::verify(&dest, expected, *kind)?;
    }

    Ok(dest)
}

fn resolve_or_report(pool: &Pool, jobs: &[Job], flags: SolverFlags) -> Result<Transaction> {
    match pool.resolve(jobs, flags) {
        Ok(txn) => Ok(txn),
        Err(problems) => {
            error!("dependency problems:");
            for problem in &problems {
                error!("  - {}", problem);
            }
            bail!("cannot resolve transaction");
        }
    }
}

/// Shared driver for install / upgrade / downgrade. Empty inputs mean
/// upgrade-all.
pub fn run_install(ctx: &Ctx, names: &[String], local_paths: &[PathBuf]) -> Result<()> {
    let cfg = &ctx.config;

    let mut pool = Pool::new(&cfg.archs);
    pool.load_installed(&status::load(cfg)?)?;
    load_sources(cfg, &mut pool, true)?;

    let mut local_ids = Vec::new();
    for path in local_paths {
        local_ids.push(pool.load_local(path)?);
    }
    pool.rebuild_index();

    let mut jobs = Vec::new();
    if names.is_empty() && local_ids.is_empty() {
        jobs.push(Job::UpgradeAll);
    }
    for (name, _) in pin::load(cfg) {
        jobs.push(Job::Lock(name));
    }
    for name in names {
        match pin::lookup(cfg, name) {
            Some(pinned) => match pool.find_exact(name, &pinned) {
                Some(id) => jobs.push(Job::InstallExact(id)),
                None => bail!("pinned version {} of '{}' is not available", pinned, name),
            },
            None => jobs.push(Job::Install(Constraint::name_only(name))),
        }
    }
    for id in &local_ids {
        jobs.push(Job::InstallExact(*id));
    }

    let flags = SolverFlags {
        allow_downgrade: cfg.allow_downgrade,
        force_depends: cfg.force_depends,
    };
    let txn = resolve_or_report(&pool, &jobs, flags)?;

    if txn.is_empty() && !cfg.reinstall {
        info!("nothing to do");
        return Ok(());
    }

    let summary = summarize(&pool, &txn);
    if !txn.is_empty() {
        display(&summary);
    }

    if cfg.noaction {
        info!("dry run, not installing");
        return Ok(());
    }

    // Explicitly requested names, for auto-install marking.
    let mut requested: HashSet<String> = names.iter().cloned().collect();
    for id in &local_ids {
        requested.insert(pool.get(*id).name.clone());
    }

    if summary.affected() > requested.len() && !confirm_continue(ctx, &summary) {
        return Ok(());
    }

    // An explicit request makes a package (and its installed providers)
    // manually installed.
    for name in &requested {
        status::unmark_auto(cfg, name)?;
        for id in pool.installed_providers(&Constraint::name_only(name)) {
            status::unmark_auto(cfg, &pool.get(id).name)?;
        }
    }

    // Download phase: everything up front, abort before any disk change.
    let mut ipk_paths: HashMap<usize, PathBuf> = HashMap::new();
    if !cfg.no_cache {
        for (index, step) in txn.steps.iter().enumerate() {
            if step.needs_download() {
                ipk_paths.insert(index, download_package(cfg, &pool, step.id)?);
            }
        }
    }

    if cfg.download_only {
        info!("download complete");
        return Ok(());
    }

    let mut protected = Fileset::new();
    let mut covered: HashSet<String> = HashSet::new();

    for (index, step) in txn.steps.iter().enumerate() {
        if interrupt::interrupted() {
            bail!("interrupted, stopping before the next step");
        }

        let s = pool.get(step.id);
        match step.kind {
            StepKind::Erased { .. } => continue,
            StepKind::Remove => {
                protected.sort();
                if let Err(e) = remove_pkg(cfg, &s.name, None, Some(&protected)) {
                    if cfg.force_depends {
                        warn!("{:#}", e);
                    } else {
                        return Err(e);
                    }
                }
            }
            StepKind::Install => {
                let ipk = step_archive(cfg, &pool, &ipk_paths, index, step.id)?;
                install_pkg(cfg, &ipk, &s.name, None)?;

                for path in info::read_list_paths(cfg, &s.name)? {
                    protected.insert(&path);
                }

                let explicit = requested.contains(&s.name)
                    || requested
                        .iter()
                        .any(|r| s.satisfies(&Constraint::name_only(r)));
                if !explicit {
                    status::mark_auto(cfg, &s.name)?;
                }

                covered.insert(s.name.clone());
                discard_after_use(cfg, &pool, step.id, &ipk);
            }
            StepKind::Upgrade { old } | StepKind::Downgrade { old } => {
                let old_version = pool.get(old).version_str().to_string();
                let ipk = step_archive(cfg, &pool, &ipk_paths, index, step.id)?;
                protected.sort();
                upgrade_pkg(cfg, &ipk, &s.name, &old_version, s.version_str(), &mut protected)?;
                covered.insert(s.name.clone());
                discard_after_use(cfg, &pool, step.id, &ipk);
            }
        }
    }

    if cfg.reinstall {
        reinstall_pass(cfg, &pool, names, &covered, &mut protected)?;
    }

    Ok(())
}

/// The step's archive: from the bulk download, or fetched just-in-time
/// under `--no-cache`.
fn step_archive(
    cfg: &Config,
    pool: &Pool,
    ipk_paths: &HashMap<usize, PathBuf>,
    index: usize,
    id: usize,
) -> Result<PathBuf> {
    match ipk_paths.get(&index) {
        Some(path) => Ok(path.clone()),
        None => download_package(cfg, pool, id),
    }
}

fn discard_after_use(cfg: &Config, pool: &Pool, id: usize, ipk: &Path) {
    if cfg.no_cache && pool.get(id).local_path.is_none() {
        std::fs::remove_file(ipk).ok();
    }
}

/// Requested names the solver produced no install step for are reinstalled
/// at their current version, through the upgrade path so conffile
/// resolution runs with identical shipped hashes.
fn reinstall_pass(
    cfg: &Config,
    pool: &Pool,
    names: &[String],
    covered: &HashSet<String>,
    protected: &mut Fileset,
) -> Result<()> {
    for name in names {
        if covered.contains(name) {
            continue;
        }
        if interrupt::interrupted() {
            bail!("interrupted, stopping before the next step");
        }

        let Some(current) = pool.installed_version(name).map(str::to_string) else {
            warn!("{} is not installed, cannot reinstall", name);
            continue;
        };
        let Some(id) = pool.find_exact(name, &current) else {
            warn!("no candidate for reinstalling {} {}", name, current);
            continue;
        };

        let ipk = download_package(cfg, pool, id)?;
        protected.sort();
        upgrade_pkg(cfg, &ipk, name, &current, &current, protected)?;
        discard_after_use(cfg, pool, id, &ipk);
    }
    Ok(())
}

/// Driver for `remove`: pure erase jobs over the installed set.
pub fn run_remove(ctx: &Ctx, names: &[String]) -> Result<()> {
    let cfg = &ctx.config;

    let mut pool = Pool::new(&cfg.archs);
    pool.load_installed(&status::load(cfg)?)?;
    pool.rebuild_index();

    let jobs: Vec<Job> = names.iter().map(|n| Job::Erase(n.clone())).collect();
    let flags = SolverFlags {
        allow_downgrade: cfg.allow_downgrade,
        force_depends: cfg.force_depends,
    };
    let txn = resolve_or_report(&pool, &jobs, flags)?;

    if txn.is_empty() {
        info!("nothing to do");
        return Ok(());
    }

    let summary = summarize(&pool, &txn);
    display(&summary);

    if cfg.noaction {
        info!("dry run, not removing");
        return Ok(());
    }

    if summary.affected() > names.len() && !confirm_continue(ctx, &summary) {
        return Ok(());
    }

    for step in &txn.steps {
        if interrupt::interrupted() {
            bail!("interrupted, stopping before the next step");
        }
        if !matches!(step.kind, StepKind::Remove) {
            continue;
        }

        let name = &pool.get(step.id).name;
        if let Err(e) = remove_pkg(cfg, name, None, None) {
            if cfg.force_depends {
                warn!("{:#}", e);
            } else {
                return Err(e);
            }
        }
    }

    Ok(())
}
