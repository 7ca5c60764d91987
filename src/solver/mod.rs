//! Package pool and transaction resolution.
//!
//! The pool holds every known candidate: the installed set (from the status
//! file), one repo per configured source and a synthetic "commandline" repo
//! for local `.ipk` arguments. Jobs (install/erase/upgrade-all/lock) are
//! resolved into an ordered transaction of sum-type steps; `Erased` steps
//! are the erase side of an in-place replacement and are skipped during
//! execution, the replacing step handles both sides.

pub mod deps;
pub mod version;

use anyhow::{bail, Context, Result};
use log::{debug, info, warn};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use crate::archive;
use crate::checksum::ChecksumKind;
use crate::parser::{self, Paragraph};
use crate::pathsafe;

use deps::{Constraint, Dependency};
use version::Version;

pub type SolvableId = usize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoKind {
    Installed,
    Source(usize),
    Commandline,
}

#[derive(Debug, Clone)]
pub struct Solvable {
    pub name: String,
    pub version: Version,
    pub arch: String,
    pub repo: RepoKind,
    pub requires: Vec<Dependency>,
    pub provides: Vec<Constraint>,
    pub conflicts: Vec<Dependency>,
    pub obsoletes: Vec<Dependency>,
    pub filename: Option<String>,
    pub checksum: Option<(ChecksumKind, String)>,
    pub local_path: Option<PathBuf>,
    pub paragraph: Paragraph,
}

impl Solvable {
    fn from_paragraph(paragraph: Paragraph, repo: RepoKind) -> Option<Solvable> {
        let name = paragraph.get("Package")?.trim().to_string();
        let version: Version = paragraph.get("Version")?.trim().parse().ok()?;
        let arch = paragraph
            .get("Architecture")
            .map(|a| a.trim().to_string())
            .unwrap_or_else(|| "all".to_string());

        let requires = paragraph
            .get("Depends")
            .map(deps::parse_dep_list)
            .unwrap_or_default();
        let provides = paragraph
            .get("Provides")
            .map(deps::parse_provides)
            .unwrap_or_default();
        let conflicts = paragraph
            .get("Conflicts")
            .map(deps::parse_dep_list)
            .unwrap_or_default();
        let obsoletes = paragraph
            .get("Replaces")
            .map(deps::parse_dep_list)
            .unwrap_or_default();

        let filename = paragraph.get("Filename").map(|f| f.trim().to_string());
        // Prefer the strongest digest the record declares.
        let checksum = paragraph
            .get("SHA256")
            .map(|v| (ChecksumKind::Sha256, v.trim().to_ascii_lowercase()))
            .or_else(|| {
                paragraph
                    .get("MD5Sum")
                    .map(|v| (ChecksumKind::Md5, v.trim().to_ascii_lowercase()))
            });

        Some(Solvable {
            name,
            version,
            arch,
            repo,
            requires,
            provides,
            conflicts,
            obsoletes,
            filename,
            checksum,
            local_path: None,
            paragraph,
        })
    }

    pub fn version_str(&self) -> &str {
        self.version.as_str()
    }

    pub fn summary(&self) -> Option<&str> {
        self.paragraph.get_first_line("Description")
    }

    /// Does this solvable (by name or by one of its provides) satisfy the
    /// constraint?
    pub fn satisfies(&self, c: &Constraint) -> bool {
        if c.satisfied_by(&self.name, Some(&self.version)) {
            return true;
        }
        self.provides.iter().any(|p| {
            c.satisfied_by(&p.name, p.restriction.as_ref().map(|(_, v)| v))
        })
    }
}

#[derive(Default)]
pub struct Pool {
    pub solvables: Vec<Solvable>,
    pub archs: Vec<String>,
    whatprovides: HashMap<String, Vec<SolvableId>>,
}

impl Pool {
    pub fn new(archs: &[String]) -> Pool {
        Pool { archs: archs.to_vec(), ..Default::default() }
    }

    fn arch_ok(&self, arch: &str) -> bool {
        self.archs.is_empty()
            || arch == "all"
            || arch == "noarch"
            || self.archs.iter().any(|a| a == arch)
    }

    fn arch_priority(&self, arch: &str) -> usize {
        self.archs
            .iter()
            .position(|a| a == arch)
            .unwrap_or(self.archs.len())
    }

    fn add_paragraphs(&mut self, content: &str, repo: RepoKind) -> usize {
        let mut added = 0;
        for paragraph in parser::parse_paragraphs(content) {
            match Solvable::from_paragraph(paragraph, repo) {
                Some(s) => {
                    if repo != RepoKind::Installed && !self.arch_ok(&s.arch) {
                        debug!("skipping {} ({}): architecture not configured", s.name, s.arch);
                        continue;
                    }
                    self.solvables.push(s);
                    added += 1;
                }
                None => debug!("skipping record without Package/Version"),
            }
        }
        added
    }

    /// Load a `Packages` index; `source_index` ties each solvable back to
    /// the source it can be downloaded from.
    pub fn load_repo(&mut self, name: &str, content: &str, source_index: usize) -> Result<()> {
        let n = self.add_paragraphs(content, RepoKind::Source(source_index));
        debug!("loaded {} packages from source '{}'", n, name);
        Ok(())
    }

    /// Load the (already normalized) status stream as the installed repo.
    pub fn load_installed(&mut self, content: &str) -> Result<()> {
        let n = self.add_paragraphs(content, RepoKind::Installed);
        debug!("loaded {} installed packages", n);
        Ok(())
    }

    /// Load a local `.ipk` into the commandline repo.
    pub fn load_local(&mut self, path: &Path) -> Result<SolvableId> {
        let control = archive::read_control_file(path, "control")?
            .with_context(|| format!("no control file in '{}'", path.display()))?;

        let paragraph = parser::parse_paragraphs(&control)
            .into_iter()
            .next()
            .with_context(|| format!("empty control file in '{}'", path.display()))?;

        let mut solvable = Solvable::from_paragraph(paragraph, RepoKind::Commandline)
            .with_context(|| format!("bad control file in '{}'", path.display()))?;

        if !pathsafe::pkg_name_is_safe(&solvable.name) {
            bail!("refusing package with unsafe name '{}'", solvable.name);
        }

        solvable.local_path = Some(path.to_path_buf());
        self.solvables.push(solvable);
        Ok(self.solvables.len() - 1)
    }

    /// Build the name → candidates index. Call after the last load.
    pub fn rebuild_index(&mut self) {
        self.whatprovides.clear();
        for (id, s) in self.solvables.iter().enumerate() {
            self.whatprovides.entry(s.name.clone()).or_default().push(id);
            for p in &s.provides {
                if p.name != s.name {
                    self.whatprovides.entry(p.name.clone()).or_default().push(id);
                }
            }
        }
    }

    pub fn get(&self, id: SolvableId) -> &Solvable {
        &self.solvables[id]
    }

    pub fn installed_ids(&self) -> impl Iterator<Item = SolvableId> + '_ {
        self.solvables
            .iter()
            .enumerate()
            .filter(|(_, s)| s.repo == RepoKind::Installed)
            .map(|(id, _)| id)
    }

    pub fn installed_by_name(&self, name: &str) -> Option<SolvableId> {
        self.whatprovides
            .get(name)?
            .iter()
            .copied()
            .find(|&id| self.solvables[id].repo == RepoKind::Installed && self.solvables[id].name == name)
    }

    /// Installed solvables satisfying the constraint, by name or provides.
    pub fn installed_providers(&self, c: &Constraint) -> Vec<SolvableId> {
        self.whatprovides
            .get(&c.name)
            .map(|ids| {
                ids.iter()
                    .copied()
                    .filter(|&id| {
                        self.solvables[id].repo == RepoKind::Installed
                            && self.solvables[id].satisfies(c)
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn installed_version(&self, name: &str) -> Option<&str> {
        self.installed_by_name(name).map(|id| self.solvables[id].version_str())
    }

    /// Best non-installed candidate for a constraint: exact-name matches
    /// beat pure provides, then highest version, then native architecture,
    /// then lowest source index; a commandline solvable beats everything.
    pub fn best_candidate(&self, c: &Constraint) -> Option<SolvableId> {
        let ids = self.whatprovides.get(&c.name)?;
        ids.iter()
            .copied()
            .filter(|&id| {
                let s = &self.solvables[id];
                s.repo != RepoKind::Installed && s.satisfies(c)
            })
            .max_by(|&a, &b| {
                let sa = &self.solvables[a];
                let sb = &self.solvables[b];
                let local_a = sa.repo == RepoKind::Commandline;
                let local_b = sb.repo == RepoKind::Commandline;
                let name_a = sa.name == c.name;
                let name_b = sb.name == c.name;
                local_a
                    .cmp(&local_b)
                    .then(name_a.cmp(&name_b))
                    .then(sa.version.cmp(&sb.version))
                    .then_with(|| {
                        self.arch_priority(&sb.arch).cmp(&self.arch_priority(&sa.arch))
                    })
                    .then_with(|| sb.name.cmp(&sa.name))
                    .then(b.cmp(&a))
            })
    }

    /// Exact name + version candidate, used for pinned installs.
    pub fn find_exact(&self, name: &str, version: &str) -> Option<SolvableId> {
        let wanted: Version = version.parse().ok()?;
        self.whatprovides.get(name)?.iter().copied().find(|&id| {
            let s = &self.solvables[id];
            s.repo != RepoKind::Installed && s.name == name && s.version == wanted
        })
    }

    pub fn source_index(&self, id: SolvableId) -> Option<usize> {
        match self.solvables[id].repo {
            RepoKind::Source(i) => Some(i),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum Job {
    Install(Constraint),
    InstallExact(SolvableId),
    Erase(String),
    UpgradeAll,
    Lock(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SolverFlags {
    pub allow_downgrade: bool,
    pub force_depends: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Install,
    Upgrade { old: SolvableId },
    Downgrade { old: SolvableId },
    Remove,
    /// Erase side of an in-place replacement; skipped during execution.
    Erased { replaced_by: SolvableId },
}

#[derive(Debug, Clone, Copy)]
pub struct Step {
    pub id: SolvableId,
    pub kind: StepKind,
}

impl Step {
    /// Steps that require the package archive to be present.
    pub fn needs_download(&self) -> bool {
        matches!(
            self.kind,
            StepKind::Install | StepKind::Upgrade { .. } | StepKind::Downgrade { .. }
        )
    }
}

#[derive(Debug, Default)]
pub struct Transaction {
    pub steps: Vec<Step>,
}

impl Transaction {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// `(installs, upgrades, removes)` for the summary line; downgrades
    /// count as upgrades, `Erased` steps are not counted.
    pub fn counts(&self) -> (usize, usize, usize) {
        let mut counts = (0, 0, 0);
        for step in &self.steps {
            match step.kind {
                StepKind::Install => counts.0 += 1,
                StepKind::Upgrade { .. } | StepKind::Downgrade { .. } => counts.1 += 1,
                StepKind::Remove => counts.2 += 1,
                StepKind::Erased { .. } => {}
            }
        }
        counts
    }
}

struct Resolver<'a> {
    pool: &'a Pool,
    flags: SolverFlags,
    locked: HashSet<String>,
    chosen: BTreeMap<String, (SolvableId, Option<SolvableId>)>, // name -> (new, old)
    erase: BTreeMap<String, SolvableId>,
    queue: VecDeque<SolvableId>,
    problems: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn new(pool: &'a Pool, flags: SolverFlags) -> Self {
        Resolver {
            pool,
            flags,
            locked: HashSet::new(),
            chosen: BTreeMap::new(),
            erase: BTreeMap::new(),
            queue: VecDeque::new(),
            problems: Vec::new(),
        }
    }

    fn problem(&mut self, description: String, recoverable: bool) {
        if self.flags.force_depends && recoverable {
            warn!("{} (ignored, --force-depends)", description);
        } else {
            self.problems.push(description);
        }
    }

    fn schedule(&mut self, id: SolvableId) {
        let new = self.pool.get(id);
        let old = self.pool.installed_by_name(&new.name);

        if let Some(old_id) = old {
            let old_version = &self.pool.get(old_id).version;
            if *old_version == new.version {
                debug!("{} {} is already installed", new.name, new.version_str());
                return;
            }
            if new.version < *old_version && !self.flags.allow_downgrade {
                info!(
                    "not downgrading {} ({} installed, {} candidate)",
                    new.name,
                    old_version,
                    new.version_str()
                );
                return;
            }
        }

        match self.chosen.get(&new.name) {
            Some((existing, _)) if *existing == id => return,
            Some((existing, _)) => {
                // Two jobs picked different versions of one name; keep the
                // higher one.
                if self.pool.get(*existing).version >= new.version {
                    return;
                }
            }
            None => {}
        }

        self.erase.remove(&new.name);
        self.chosen.insert(new.name.clone(), (id, old));
        self.queue.push_back(id);
    }

    fn dep_satisfied(&self, dep: &Dependency) -> bool {
        for alt in &dep.alternatives {
            // A freshly chosen package satisfies the clause.
            let by_chosen = self
                .chosen
                .values()
                .any(|(id, _)| self.pool.get(*id).satisfies(alt));
            if by_chosen {
                return true;
            }

            // An installed package still counts unless it is being erased
            // or replaced by a version that no longer satisfies.
            let by_installed = self.pool.installed_providers(alt).iter().any(|&id| {
                let name = &self.pool.get(id).name;
                !self.erase.contains_key(name) && !self.chosen.contains_key(name)
            });
            if by_installed {
                return true;
            }
        }
        false
    }

    fn close_over_dependencies(&mut self) {
        while let Some(id) = self.queue.pop_front() {
            let requires = self.pool.get(id).requires.clone();
            for dep in &requires {
                if self.dep_satisfied(dep) {
                    continue;
                }

                let candidate = dep
                    .alternatives
                    .iter()
                    .find_map(|alt| self.pool.best_candidate(alt));

                match candidate {
                    Some(c) => self.schedule(c),
                    None => {
                        let name = &self.pool.get(id).name;
                        self.problem(
                            format!("nothing provides '{}' required by {}", dep, name),
                            true,
                        );
                    }
                }
            }
        }
    }

    /// Installed packages whose every provider of some dependency clause is
    /// being erased get erased as well (the solver is allowed to uninstall
    /// to keep the system consistent).
    fn close_over_dependents(&mut self) {
        loop {
            let mut grew = false;

            for id in self.pool.installed_ids() {
                let s = self.pool.get(id);
                if self.erase.contains_key(&s.name) || self.chosen.contains_key(&s.name) {
                    continue;
                }

                for dep in &s.requires {
                    let mut had_provider = false;
                    let mut has_provider = false;
                    for alt in &dep.alternatives {
                        for pid in self.pool.installed_providers(alt) {
                            had_provider = true;
                            let pname = &self.pool.get(pid).name;
                            if !self.erase.contains_key(pname) {
                                has_provider = true;
                            }
                        }
                        if self.dep_satisfied_by_chosen(alt) {
                            has_provider = true;
                        }
                    }

                    if had_provider && !has_provider {
                        info!("also removing {} (depends on a removed package)", s.name);
                        self.erase.insert(s.name.clone(), id);
                        grew = true;
                        break;
                    }
                }
            }

            if !grew {
                break;
            }
        }
    }

    fn dep_satisfied_by_chosen(&self, alt: &Constraint) -> bool {
        self.chosen.values().any(|(id, _)| self.pool.get(*id).satisfies(alt))
    }

    fn check_conflicts(&mut self) {
        let chosen: Vec<SolvableId> = self.chosen.values().map(|(id, _)| *id).collect();
        for id in chosen {
            let s = self.pool.get(id).clone();
            for conflict in &s.conflicts {
                for alt in &conflict.alternatives {
                    let conflicting: Vec<SolvableId> = self
                        .pool
                        .installed_providers(alt)
                        .into_iter()
                        .filter(|&cid| {
                            let name = &self.pool.get(cid).name;
                            *name != s.name
                                && !self.erase.contains_key(name)
                                && !self.chosen.contains_key(name)
                        })
                        .collect();

                    for cid in conflicting {
                        let cname = self.pool.get(cid).name.clone();
                        if self.flags.force_depends {
                            warn!(
                                "removing {} (conflicts with {}, --force-depends)",
                                cname, s.name
                            );
                            self.erase.insert(cname, cid);
                        } else {
                            self.problems.push(format!(
                                "{} conflicts with installed package {}",
                                s.name, cname
                            ));
                        }
                    }
                }
            }
        }
    }

    /// Installed packages obsoleted (`Replaces` + satisfied constraint) by
    /// a chosen one are erased as part of the replacement.
    fn check_obsoletes(&mut self) {
        let chosen: Vec<SolvableId> = self.chosen.values().map(|(id, _)| *id).collect();
        for id in chosen {
            let s = self.pool.get(id).clone();
            for obs in &s.obsoletes {
                for alt in &obs.alternatives {
                    for oid in self.pool.installed_providers(alt) {
                        let oname = self.pool.get(oid).name.clone();
                        if oname != s.name
                            && !self.erase.contains_key(&oname)
                            && !self.chosen.contains_key(&oname)
                        {
                            info!("{} replaces installed {}", s.name, oname);
                            self.erase.insert(oname, oid);
                        }
                    }
                }
            }
        }
    }

    /// Pure removals ordered dependents-first.
    fn order_erases(&self) -> Vec<SolvableId> {
        let names: Vec<&String> = self.erase.keys().collect();
        let ids: Vec<SolvableId> = names.iter().map(|n| self.erase[*n]).collect();

        // in-degree = number of erased packages that require this one
        let mut indegree: BTreeMap<SolvableId, usize> =
            ids.iter().map(|&id| (id, 0)).collect();
        let mut edges: Vec<(SolvableId, SolvableId)> = Vec::new(); // (dependent, dependency)

        for &a in &ids {
            for dep in &self.pool.get(a).requires {
                for alt in &dep.alternatives {
                    for b in self.pool.installed_providers(alt) {
                        if b != a && indegree.contains_key(&b) {
                            edges.push((a, b));
                            *indegree.get_mut(&b).unwrap() += 1;
                        }
                    }
                }
            }
        }

        let mut order = Vec::new();
        let mut ready: Vec<SolvableId> = indegree
            .iter()
            .filter(|(_, deg)| **deg == 0)
            .map(|(id, _)| *id)
            .collect();
        ready.sort_by(|&a, &b| self.pool.get(a).name.cmp(&self.pool.get(b).name));

        let mut remaining: HashSet<SolvableId> = ids.iter().copied().collect();
        while let Some(id) = ready.pop() {
            if !remaining.remove(&id) {
                continue;
            }
            order.push(id);
            for (a, b) in &edges {
                if *a == id {
                    let deg = indegree.get_mut(b).unwrap();
                    *deg -= 1;
                    if *deg == 0 {
                        ready.push(*b);
                        ready.sort_by(|&x, &y| {
                            self.pool.get(x).name.cmp(&self.pool.get(y).name)
                        });
                    }
                }
            }
        }
        // Dependency cycles: append whatever is left, stably.
        let mut rest: Vec<SolvableId> = remaining.into_iter().collect();
        rest.sort_by(|&a, &b| self.pool.get(a).name.cmp(&self.pool.get(b).name));
        order.extend(rest);

        order
    }

    /// Installs ordered dependencies-first.
    fn order_installs(&self) -> Vec<SolvableId> {
        let ids: Vec<SolvableId> = self.chosen.values().map(|(id, _)| *id).collect();
        let by_id: HashSet<SolvableId> = ids.iter().copied().collect();

        // edges dependent -> dependency, install dependency first
        let mut indegree: BTreeMap<SolvableId, usize> =
            ids.iter().map(|&id| (id, 0)).collect();
        let mut edges: Vec<(SolvableId, SolvableId)> = Vec::new();

        for &a in &ids {
            for dep in &self.pool.get(a).requires {
                for alt in &dep.alternatives {
                    for &b in &ids {
                        if b != a && self.pool.get(b).satisfies(alt) && by_id.contains(&b) {
                            edges.push((a, b));
                            *indegree.get_mut(&a).unwrap() += 1;
                        }
                    }
                }
            }
        }

        let mut order = Vec::new();
        let mut remaining: HashSet<SolvableId> = ids.iter().copied().collect();
        loop {
            let mut ready: Vec<SolvableId> = remaining
                .iter()
                .copied()
                .filter(|id| indegree[id] == 0)
                .collect();
            if ready.is_empty() {
                break;
            }
            ready.sort_by(|&a, &b| self.pool.get(a).name.cmp(&self.pool.get(b).name));
            for id in ready {
                remaining.remove(&id);
                order.push(id);
                for (a, b) in &edges {
                    if *b == id && remaining.contains(a) {
                        *indegree.get_mut(a).unwrap() -= 1;
                    }
                }
            }
        }
        let mut rest: Vec<SolvableId> = remaining.into_iter().collect();
        rest.sort_by(|&a, &b| self.pool.get(a).name.cmp(&self.pool.get(b).name));
        order.extend(rest);

        order
    }

    fn into_transaction(mut self) -> Result<Transaction, Vec<String>> {
        self.close_over_dependencies();
        self.check_conflicts();
        self.check_obsoletes();
        self.close_over_dependents();

        if !self.problems.is_empty() {
            return Err(std::mem::take(&mut self.problems));
        }

        let mut steps = Vec::new();

        for id in self.order_erases() {
            steps.push(Step { id, kind: StepKind::Remove });
        }

        for id in self.order_installs() {
            let (new_id, old) = self.chosen[&self.pool.get(id).name];
            debug_assert_eq!(new_id, id);
            match old {
                None => steps.push(Step { id, kind: StepKind::Install }),
                Some(old_id) => {
                    let newer =
                        self.pool.get(id).version > self.pool.get(old_id).version;
                    let kind = if newer {
                        StepKind::Upgrade { old: old_id }
                    } else {
                        StepKind::Downgrade { old: old_id }
                    };
                    steps.push(Step { id, kind });
                    steps.push(Step {
                        id: old_id,
                        kind: StepKind::Erased { replaced_by: id },
                    });
                }
            }
        }

        Ok(Transaction { steps })
    }
}

impl Pool {
    /// Resolve a job list into an ordered transaction. With
    /// `force_depends`, each problem's first suggested solution (skip the
    /// requirement, remove the conflicting package) is applied and the
    /// problem downgraded to a warning; anything that remains is fatal.
    pub fn resolve(&self, jobs: &[Job], flags: SolverFlags) -> Result<Transaction, Vec<String>> {
        let mut r = Resolver::new(self, flags);

        for job in jobs {
            if let Job::Lock(name) = job {
                r.locked.insert(name.clone());
            }
        }

        for job in jobs {
            match job {
                Job::Lock(_) => {}
                Job::Erase(name) => {
                    let constraint = Constraint::name_only(name);
                    let providers = self.installed_providers(&constraint);
                    if providers.is_empty() {
                        info!("{} is not installed", name);
                        continue;
                    }
                    for id in providers {
                        r.erase.insert(self.get(id).name.clone(), id);
                    }
                }
                Job::InstallExact(id) => r.schedule(*id),
                Job::Install(constraint) => {
                    match self.best_candidate(constraint) {
                        Some(id) => r.schedule(id),
                        None => {
                            if self.installed_providers(constraint).is_empty() {
                                r.problem(
                                    format!("cannot find package '{}'", constraint.name),
                                    true,
                                );
                            } else {
                                info!("{} is already installed", constraint.name);
                            }
                        }
                    }
                }
                Job::UpgradeAll => {
                    for id in self.installed_ids() {
                        let s = self.get(id);
                        if r.locked.contains(&s.name) {
                            debug!("{} is pinned, holding", s.name);
                            continue;
                        }
                        let constraint = Constraint::name_only(&s.name);
                        if let Some(cand) = self.best_candidate(&constraint) {
                            let newer = self.get(cand).version > s.version;
                            if newer || (flags.allow_downgrade && self.get(cand).version != s.version) {
                                r.schedule(cand);
                            }
                        }
                    }
                }
            }
        }

        r.into_transaction()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(repo: &str, installed: &str) -> Pool {
        let mut pool = Pool::new(&["noarch".to_string()]);
        pool.load_installed(installed).unwrap();
        pool.load_repo("main", repo, 0).unwrap();
        pool.rebuild_index();
        pool
    }

    const REPO: &str = "\
Package: hello
Version: 1.0
Architecture: noarch
Filename: hello_1.0_noarch.ipk
SHA256: aaaa

Package: world
Version: 1.0
Architecture: noarch
Depends: hello
Filename: world_1.0_noarch.ipk
SHA256: bbbb

Package: python
Version: 3.0
Architecture: noarch
Provides: interpreter
Filename: python_3.0_noarch.ipk
SHA256: cccc
";

    fn names(pool: &Pool, txn: &Transaction) -> Vec<(String, &'static str)> {
        txn.steps
            .iter()
            .map(|s| {
                let kind = match s.kind {
                    StepKind::Install => "install",
                    StepKind::Upgrade { .. } => "upgrade",
                    StepKind::Downgrade { .. } => "downgrade",
                    StepKind::Remove => "remove",
                    StepKind::Erased { .. } => "erased",
                };
                (pool.get(s.id).name.clone(), kind)
            })
            .collect()
    }

    #[test]
    fn test_install_pulls_dependency_first() {
        let pool = pool_with(REPO, "");
        let jobs = [Job::Install(Constraint::name_only("world"))];
        let txn = pool.resolve(&jobs, SolverFlags::default()).unwrap();
        assert_eq!(
            names(&pool, &txn),
            vec![("hello".to_string(), "install"), ("world".to_string(), "install")]
        );
    }

    #[test]
    fn test_install_satisfied_dep_not_repulled() {
        let installed = "Package: hello\nVersion: 1.0\nArchitecture: noarch\n";
        let pool = pool_with(REPO, installed);
        let jobs = [Job::Install(Constraint::name_only("world"))];
        let txn = pool.resolve(&jobs, SolverFlags::default()).unwrap();
        assert_eq!(names(&pool, &txn), vec![("world".to_string(), "install")]);
    }

    #[test]
    fn test_install_via_provides() {
        let pool = pool_with(REPO, "");
        let jobs = [Job::Install(Constraint::name_only("interpreter"))];
        let txn = pool.resolve(&jobs, SolverFlags::default()).unwrap();
        assert_eq!(names(&pool, &txn), vec![("python".to_string(), "install")]);
    }

    #[test]
    fn test_missing_dependency_is_problem() {
        let repo = "Package: broken\nVersion: 1\nArchitecture: noarch\nDepends: ghost\nFilename: broken_1.ipk\n";
        let pool = pool_with(repo, "");
        let jobs = [Job::Install(Constraint::name_only("broken"))];
        let problems = pool.resolve(&jobs, SolverFlags::default()).unwrap_err();
        assert!(problems[0].contains("ghost"));

        // force_depends turns it into a warning
        let flags = SolverFlags { force_depends: true, ..Default::default() };
        let txn = pool.resolve(&jobs, flags).unwrap();
        assert_eq!(names(&pool, &txn), vec![("broken".to_string(), "install")]);
    }

    #[test]
    fn test_upgrade_produces_pair() {
        let installed = "Package: hello\nVersion: 0.9\nArchitecture: noarch\n";
        let pool = pool_with(REPO, installed);
        let jobs = [Job::UpgradeAll];
        let txn = pool.resolve(&jobs, SolverFlags::default()).unwrap();
        assert_eq!(
            names(&pool, &txn),
            vec![("hello".to_string(), "upgrade"), ("hello".to_string(), "erased")]
        );
        assert_eq!(txn.counts(), (0, 1, 0));
    }

    #[test]
    fn test_pinned_package_held_on_upgrade() {
        let installed = "Package: hello\nVersion: 0.9\nArchitecture: noarch\n";
        let pool = pool_with(REPO, installed);
        let jobs = [Job::UpgradeAll, Job::Lock("hello".to_string())];
        let txn = pool.resolve(&jobs, SolverFlags::default()).unwrap();
        assert!(txn.is_empty());
    }

    #[test]
    fn test_no_downgrade_without_flag() {
        let installed = "Package: hello\nVersion: 2.0\nArchitecture: noarch\n";
        let pool = pool_with(REPO, installed);
        let jobs = [Job::Install(Constraint::name_only("hello"))];
        let txn = pool.resolve(&jobs, SolverFlags::default()).unwrap();
        assert!(txn.is_empty());

        let flags = SolverFlags { allow_downgrade: true, ..Default::default() };
        let txn = pool.resolve(&jobs, flags).unwrap();
        assert_eq!(
            names(&pool, &txn),
            vec![("hello".to_string(), "downgrade"), ("hello".to_string(), "erased")]
        );
    }

    #[test]
    fn test_erase_removes_dependents() {
        let installed = "\
Package: hello
Version: 1.0
Architecture: noarch

Package: world
Version: 1.0
Architecture: noarch
Depends: hello
";
        let pool = pool_with(REPO, installed);
        let jobs = [Job::Erase("hello".to_string())];
        let txn = pool.resolve(&jobs, SolverFlags::default()).unwrap();
        // dependent first, then the dependency
        assert_eq!(
            names(&pool, &txn),
            vec![("world".to_string(), "remove"), ("hello".to_string(), "remove")]
        );
    }

    #[test]
    fn test_erase_leaf_keeps_dependency() {
        let installed = "\
Package: hello
Version: 1.0
Architecture: noarch

Package: world
Version: 1.0
Architecture: noarch
Depends: hello
";
        let pool = pool_with(REPO, installed);
        let jobs = [Job::Erase("world".to_string())];
        let txn = pool.resolve(&jobs, SolverFlags::default()).unwrap();
        assert_eq!(names(&pool, &txn), vec![("world".to_string(), "remove")]);
    }

    #[test]
    fn test_conflict_reported() {
        let repo = "\
Package: alpha
Version: 1.0
Architecture: noarch
Conflicts: beta
Filename: alpha_1.0.ipk
";
        let installed = "Package: beta\nVersion: 1.0\nArchitecture: noarch\n";
        let pool = pool_with(repo, installed);
        let jobs = [Job::Install(Constraint::name_only("alpha"))];
        let problems = pool.resolve(&jobs, SolverFlags::default()).unwrap_err();
        assert!(problems[0].contains("conflicts"));

        let flags = SolverFlags { force_depends: true, ..Default::default() };
        let txn = pool.resolve(&jobs, flags).unwrap();
        assert_eq!(
            names(&pool, &txn),
            vec![("beta".to_string(), "remove"), ("alpha".to_string(), "install")]
        );
    }

    #[test]
    fn test_versioned_dependency_picks_matching() {
        let repo = "\
Package: lib
Version: 1.0
Architecture: noarch
Filename: lib_1.0.ipk

Package: lib
Version: 2.0
Architecture: noarch
Filename: lib_2.0.ipk

Package: app
Version: 1.0
Architecture: noarch
Depends: lib (<< 2.0)
Filename: app_1.0.ipk
";
        let pool = pool_with(repo, "");
        let jobs = [Job::Install(Constraint::name_only("app"))];
        let txn = pool.resolve(&jobs, SolverFlags::default()).unwrap();
        let lib_step = txn.steps.iter().find(|s| pool.get(s.id).name == "lib").unwrap();
        assert_eq!(pool.get(lib_step.id).version_str(), "1.0");
    }

    #[test]
    fn test_find_exact_for_pins() {
        let repo = "\
Package: lib
Version: 1.0
Architecture: noarch
Filename: lib_1.0.ipk

Package: lib
Version: 2.0
Architecture: noarch
Filename: lib_2.0.ipk
";
        let pool = pool_with(repo, "");
        let id = pool.find_exact("lib", "1.0").unwrap();
        assert_eq!(pool.get(id).version_str(), "1.0");
        assert!(pool.find_exact("lib", "3.0").is_none());
    }

    #[test]
    fn test_arch_filtering() {
        let repo = "\
Package: tool
Version: 1.0
Architecture: mips
Filename: tool_1.0_mips.ipk
";
        let mut pool = Pool::new(&["x86_64".to_string()]);
        pool.load_repo("main", repo, 0).unwrap();
        pool.rebuild_index();
        assert!(pool.best_candidate(&Constraint::name_only("tool")).is_none());
    }
}
