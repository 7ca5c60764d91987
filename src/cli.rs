use argh::FromArgs;

#[derive(FromArgs, PartialEq, Debug)]
/// fetch package lists from all configured repositories
#[argh(subcommand, name = "update")]
pub(crate) struct AeptUpdate {}

#[derive(FromArgs, PartialEq, Debug)]
/// install packages and their dependencies; ./ or / prefixed arguments
/// are treated as local .ipk files
#[argh(subcommand, name = "install")]
pub(crate) struct AeptInstall {
    /// ignore dependency errors
    #[argh(switch, short = 'f')]
    pub force_depends: bool,
    /// only download, do not install
    #[argh(switch, short = 'd')]
    pub download_only: bool,
    /// dry run, show what would be done
    #[argh(switch, short = 'n')]
    pub noaction: bool,
    /// allow package downgrades
    #[argh(switch)]
    pub allow_downgrade: bool,
    /// reinstall already installed packages
    #[argh(switch)]
    pub reinstall: bool,
    /// download, install, and delete each package archive
    #[argh(switch)]
    pub no_cache: bool,
    /// always install new conffiles without asking
    #[argh(switch)]
    pub force_confnew: bool,
    /// always keep old conffiles without asking
    #[argh(switch)]
    pub force_confold: bool,
    /// do not prompt; implies --force-confold
    #[argh(switch)]
    pub non_interactive: bool,
    /// packages to install
    #[argh(positional)]
    pub packages: Vec<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// remove installed packages
#[argh(subcommand, name = "remove")]
pub(crate) struct AeptRemove {
    /// ignore dependency errors
    #[argh(switch, short = 'f')]
    pub force_depends: bool,
    /// dry run, show what would be done
    #[argh(switch, short = 'n')]
    pub noaction: bool,
    /// also remove modified conffiles
    #[argh(switch)]
    pub purge: bool,
    /// do not prompt
    #[argh(switch)]
    pub non_interactive: bool,
    /// packages to remove
    #[argh(positional)]
    pub packages: Vec<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// remove auto-installed packages that are no longer needed
#[argh(subcommand, name = "autoremove")]
pub(crate) struct AeptAutoremove {
    /// ignore dependency errors
    #[argh(switch, short = 'f')]
    pub force_depends: bool,
    /// dry run, show what would be done
    #[argh(switch, short = 'n')]
    pub noaction: bool,
    /// also remove modified conffiles
    #[argh(switch)]
    pub purge: bool,
    /// do not prompt
    #[argh(switch)]
    pub non_interactive: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
/// upgrade all installed packages
#[argh(subcommand, name = "upgrade")]
pub(crate) struct AeptUpgrade {
    /// ignore dependency errors
    #[argh(switch, short = 'f')]
    pub force_depends: bool,
    /// only download, do not install
    #[argh(switch, short = 'd')]
    pub download_only: bool,
    /// dry run, show what would be done
    #[argh(switch, short = 'n')]
    pub noaction: bool,
    /// allow package downgrades
    #[argh(switch)]
    pub allow_downgrade: bool,
    /// download, install, and delete each package archive
    #[argh(switch)]
    pub no_cache: bool,
    /// always install new conffiles without asking
    #[argh(switch)]
    pub force_confnew: bool,
    /// always keep old conffiles without asking
    #[argh(switch)]
    pub force_confold: bool,
    /// do not prompt; implies --force-confold
    #[argh(switch)]
    pub non_interactive: bool,
}

#[derive(FromArgs, PartialEq, Debug)]
/// list packages; an optional glob pattern filters by name
#[argh(subcommand, name = "list")]
pub(crate) struct AeptList {
    /// only show installed packages
    #[argh(switch)]
    pub installed: bool,
    /// only show upgradable packages
    #[argh(switch)]
    pub upgradable: bool,
    /// name pattern
    #[argh(positional)]
    pub pattern: Option<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// show package information
#[argh(subcommand, name = "show")]
pub(crate) struct AeptShow {
    /// package name
    #[argh(positional)]
    pub package: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// control auto-installed package marks
#[argh(subcommand, name = "mark")]
pub(crate) struct AeptMark {
    /// mark all packages (only with 'manual')
    #[argh(switch)]
    pub all: bool,
    /// action: 'auto' or 'manual'
    #[argh(positional)]
    pub action: String,
    /// packages to mark
    #[argh(positional)]
    pub packages: Vec<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// pin packages to a version; use name=version for a specific one
#[argh(subcommand, name = "pin")]
pub(crate) struct AeptPin {
    /// package specs
    #[argh(positional)]
    pub specs: Vec<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// remove version pins
#[argh(subcommand, name = "unpin")]
pub(crate) struct AeptUnpin {
    /// packages to unpin
    #[argh(positional)]
    pub packages: Vec<String>,
}

#[derive(FromArgs, PartialEq, Debug)]
/// remove cached package files
#[argh(subcommand, name = "clean")]
pub(crate) struct AeptClean {}

#[derive(FromArgs, PartialEq, Debug)]
/// list files belonging to an installed package
#[argh(subcommand, name = "files")]
pub(crate) struct AeptFiles {
    /// package name
    #[argh(positional)]
    pub package: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// find which installed package owns a file
#[argh(subcommand, name = "owns")]
pub(crate) struct AeptOwns {
    /// file path
    #[argh(positional)]
    pub path: String,
}

#[derive(FromArgs, PartialEq, Debug)]
/// show configured architectures
#[argh(subcommand, name = "print-architecture")]
pub(crate) struct AeptPrintArchitecture {}

#[derive(FromArgs, PartialEq, Debug)]
#[argh(subcommand)]
pub(crate) enum AeptCommand {
    Update(AeptUpdate),
    Install(AeptInstall),
    Remove(AeptRemove),
    Autoremove(AeptAutoremove),
    Upgrade(AeptUpgrade),
    List(AeptList),
    Show(AeptShow),
    Mark(AeptMark),
    Pin(AeptPin),
    Unpin(AeptUnpin),
    Clean(AeptClean),
    Files(AeptFiles),
    Owns(AeptOwns),
    PrintArchitecture(AeptPrintArchitecture),
}

#[derive(FromArgs, PartialEq, Debug)]
/// aept: signed-repository .ipk package manager
pub(crate) struct Aept {
    /// configuration file (default: /etc/aept/aept.conf)
    #[argh(option, short = 'c')]
    pub conf: Option<String>,
    /// use a directory as the package root
    #[argh(option, short = 'o')]
    pub offline_root: Option<String>,
    /// increase verbosity
    #[argh(switch, short = 'v')]
    pub verbose: bool,
    #[argh(subcommand)]
    pub command: AeptCommand,
}
