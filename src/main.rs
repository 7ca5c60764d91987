use std::path::PathBuf;

use anyhow::{bail, Result};
use log::{error, warn};

mod cli;

use aept::api::Ctx;
use aept::config::{self, Config};
use aept::{interrupt, parser, query};

fn main() {
    let args: cli::Aept = argh::from_env();

    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    if let Err(err) = run(args) {
        error!("{:#}", err);
        std::process::exit(1);
    }
}

/// The config file defaults to `/etc/aept/aept.conf`, looked up inside
/// the offline root when one is given without an explicit `-c`.
fn load_config(args: &cli::Aept) -> Result<Config> {
    let explicit = args.conf.is_some();
    let path: PathBuf = match (&args.conf, &args.offline_root) {
        (Some(conf), _) => conf.into(),
        (None, Some(root)) => format!("{}{}", root, config::DEFAULT_CONF).into(),
        (None, None) => config::DEFAULT_CONF.into(),
    };

    let mut cfg = if path.exists() {
        Config::parse_config(&path)?
    } else if explicit {
        bail!("cannot access config file '{}'", path.display());
    } else {
        warn!("config file '{}' not found, using defaults", path.display());
        Config::default()
    };

    if let Some(root) = &args.offline_root {
        cfg.offline_root = Some(root.into());
    }
    cfg.apply_offline_root();

    Ok(cfg)
}

/// Arguments starting with `./` or `/` are local `.ipk` files.
fn split_install_args(args: &[String]) -> (Vec<String>, Vec<PathBuf>) {
    let mut names = Vec::new();
    let mut locals = Vec::new();
    for arg in args {
        if arg.starts_with("./") || arg.starts_with('/') {
            locals.push(PathBuf::from(arg));
        } else {
            names.push(arg.clone());
        }
    }
    (names, locals)
}

fn apply_conffile_flags(cfg: &mut Config, confnew: bool, confold: bool, non_interactive: bool) {
    cfg.force_confnew = confnew;
    cfg.force_confold = confold;
    cfg.non_interactive = non_interactive;
    if non_interactive && !confnew {
        cfg.force_confold = true;
    }
}

fn print_show_field(paragraph: &parser::Paragraph, label: &str, field: &str) {
    if let Some(value) = paragraph.get_first_line(field) {
        println!("{}: {}", label, value);
    }
}

fn run(args: cli::Aept) -> Result<()> {
    interrupt::install_handler()?;

    let mut cfg = load_config(&args)?;

    match args.command {
        cli::AeptCommand::Update(_) => Ctx::new(cfg).update(),

        cli::AeptCommand::Install(opts) => {
            cfg.force_depends = opts.force_depends;
            cfg.download_only = opts.download_only;
            cfg.noaction = opts.noaction;
            cfg.allow_downgrade |= opts.allow_downgrade;
            cfg.reinstall = opts.reinstall;
            cfg.no_cache = opts.no_cache;
            apply_conffile_flags(&mut cfg, opts.force_confnew, opts.force_confold, opts.non_interactive);

            if opts.packages.is_empty() {
                bail!("no packages given");
            }
            let (names, locals) = split_install_args(&opts.packages);
            Ctx::new(cfg).install(&names, &locals)
        }

        cli::AeptCommand::Upgrade(opts) => {
            cfg.force_depends = opts.force_depends;
            cfg.download_only = opts.download_only;
            cfg.noaction = opts.noaction;
            cfg.allow_downgrade |= opts.allow_downgrade;
            cfg.no_cache = opts.no_cache;
            apply_conffile_flags(&mut cfg, opts.force_confnew, opts.force_confold, opts.non_interactive);

            Ctx::new(cfg).upgrade()
        }

        cli::AeptCommand::Remove(opts) => {
            cfg.force_depends = opts.force_depends;
            cfg.noaction = opts.noaction;
            cfg.purge = opts.purge;
            cfg.non_interactive = opts.non_interactive;

            if opts.packages.is_empty() {
                bail!("no packages given");
            }
            Ctx::new(cfg).remove(&opts.packages)
        }

        cli::AeptCommand::Autoremove(opts) => {
            cfg.force_depends = opts.force_depends;
            cfg.noaction = opts.noaction;
            cfg.purge = opts.purge;
            cfg.non_interactive = opts.non_interactive;

            Ctx::new(cfg).autoremove()
        }

        cli::AeptCommand::List(opts) => {
            let entries =
                query::list(&cfg, opts.pattern.as_deref(), opts.installed, opts.upgradable)?;
            for entry in entries {
                let mut line = format!("{} - {}", entry.name, entry.version);
                if let Some(summary) = &entry.summary {
                    line.push_str(" - ");
                    line.push_str(summary);
                }
                if entry.upgradable {
                    line.push_str(" [upgradable]");
                } else if entry.installed {
                    line.push_str(" [installed]");
                }
                println!("{}", line);
            }
            Ok(())
        }

        cli::AeptCommand::Show(opts) => {
            let Some(info) = query::show(&cfg, &opts.package)? else {
                bail!("package '{}' not found", opts.package);
            };
            let p = &info.paragraph;
            print_show_field(p, "Package", "Package");
            print_show_field(p, "Version", "Version");
            print_show_field(p, "Architecture", "Architecture");
            print_show_field(p, "Installed-Size", "Installed-Size");
            print_show_field(p, "Pre-Depends", "Pre-Depends");
            print_show_field(p, "Depends", "Depends");
            print_show_field(p, "Recommends", "Recommends");
            print_show_field(p, "Suggests", "Suggests");
            print_show_field(p, "Provides", "Provides");
            print_show_field(p, "Conflicts", "Conflicts");
            print_show_field(p, "Replaces", "Replaces");
            print_show_field(p, "Homepage", "Homepage");
            print_show_field(p, "Filename", "Filename");
            if let Some(description) = p.get("Description") {
                println!("Description: {}", description.replace('\n', "\n "));
            }
            println!("Installed: {}", if info.installed { "yes" } else { "no" });
            Ok(())
        }

        cli::AeptCommand::Mark(opts) => {
            let ctx = Ctx::new(cfg);
            match opts.action.as_str() {
                "auto" => ctx.mark_auto(&opts.packages),
                "manual" if opts.all => ctx.mark_manual_all(),
                "manual" => ctx.mark_manual(&opts.packages),
                other => bail!("unknown mark action '{}' (use 'auto' or 'manual')", other),
            }
        }

        cli::AeptCommand::Pin(opts) => {
            if opts.specs.is_empty() {
                bail!("no packages given");
            }
            Ctx::new(cfg).pin(&opts.specs)
        }

        cli::AeptCommand::Unpin(opts) => {
            if opts.packages.is_empty() {
                bail!("no packages given");
            }
            Ctx::new(cfg).unpin(&opts.packages)
        }

        cli::AeptCommand::Clean(_) => Ctx::new(cfg).clean(),

        cli::AeptCommand::Files(opts) => {
            for path in query::files(&cfg, &opts.package)? {
                println!("{}", path);
            }
            Ok(())
        }

        cli::AeptCommand::Owns(opts) => {
            let owners = query::owns(&cfg, &opts.path)?;
            if owners.is_empty() {
                bail!("no package owns '{}'", opts.path);
            }
            for owner in owners {
                println!("{}", owner);
            }
            Ok(())
        }

        cli::AeptCommand::PrintArchitecture(_) => {
            for arch in query::architectures(&cfg) {
                println!("{}", arch);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_install_args() {
        let args = vec![
            "hello".to_string(),
            "./local.ipk".to_string(),
            "/tmp/other.ipk".to_string(),
            "world".to_string(),
        ];
        let (names, locals) = split_install_args(&args);
        assert_eq!(names, vec!["hello", "world"]);
        assert_eq!(locals, vec![PathBuf::from("./local.ipk"), PathBuf::from("/tmp/other.ipk")]);
    }

    #[test]
    fn test_conffile_flag_mapping() {
        let mut cfg = Config::default();
        apply_conffile_flags(&mut cfg, false, false, true);
        assert!(cfg.force_confold);
        assert!(cfg.non_interactive);

        let mut cfg = Config::default();
        apply_conffile_flags(&mut cfg, true, false, true);
        assert!(cfg.force_confnew);
        assert!(!cfg.force_confold);
    }
}
