//! `autoremove`: walk the dependency graph from every manually-installed
//! package; auto-installed packages nothing reachable requires become
//! removal candidates.

use anyhow::{bail, Result};
use log::{info, warn};
use std::collections::HashSet;

use crate::api::Ctx;
use crate::interrupt;
use crate::remove::remove_pkg;
use crate::solver::{Pool, SolvableId};
use crate::status;
use crate::transaction::{self, TxnSummary};

fn mark_needed(pool: &Pool, id: SolvableId, needed: &mut HashSet<SolvableId>) {
    if !needed.insert(id) {
        return;
    }
    for dep in &pool.get(id).requires {
        for alt in &dep.alternatives {
            for provider in pool.installed_providers(alt) {
                mark_needed(pool, provider, needed);
            }
        }
    }
}

pub fn autoremove(ctx: &Ctx) -> Result<()> {
    let cfg = &ctx.config;

    let mut pool = Pool::new(&cfg.archs);
    pool.load_installed(&status::load(cfg)?)?;
    pool.rebuild_index();

    let auto_set = status::load_auto_set(cfg);
    if auto_set.is_empty() {
        info!("nothing to do");
        return Ok(());
    }
    log::debug!("{} auto-installed packages", auto_set.len());

    let mut needed = HashSet::new();
    for id in pool.installed_ids() {
        if !auto_set.contains(&pool.get(id).name) {
            mark_needed(&pool, id, &mut needed);
        }
    }

    let candidates: Vec<(String, String)> = pool
        .installed_ids()
        .filter(|id| !needed.contains(id))
        .map(|id| {
            let s = pool.get(id);
            (s.name.clone(), s.version_str().to_string())
        })
        .filter(|(name, _)| auto_set.contains(name))
        .collect();

    if candidates.is_empty() {
        info!("nothing to do");
        return Ok(());
    }

    let summary = TxnSummary { remove: candidates.clone(), ..Default::default() };
    transaction::display(&summary);

    if cfg.noaction {
        info!("dry run, not removing");
        return Ok(());
    }

    if !transaction::confirm_continue(ctx, &summary) {
        return Ok(());
    }

    for (name, _) in &candidates {
        if interrupt::interrupted() {
            bail!("interrupted, stopping before the next step");
        }
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
