use std::path::PathBuf;

use clap::{ArgGroup, Args, Parser, Subcommand};
use mr_types::ContainerName;

#[derive(Parser)]
#[command(
    name = "mrcli",
    about = "Mediumroast command line: companies, interactions, and studies in a GitHub discovery repository",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Configuration file, INI or `.toml` (default: ~/.mediumroast/config.ini)
    #[arg(short = 'c', long = "conf-file", alias = "conf_file", global = true, value_name = "PATH")]
    pub conf_file: Option<PathBuf>,

    #[arg(short, long, global = true, value_enum, default_value = "text")]
    pub output: OutputFormat,

    #[arg(short, long, global = true)]
    pub verbose: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// List, find, add, update, or delete companies
    Company(ObjectArgs),
    /// List, find, add, update, or delete interactions
    Interaction(ObjectArgs),
    /// List, find, add, update, or delete studies
    Study(ObjectArgs),
    /// Inspect or clear container locks
    Locks(LocksArgs),
    /// Write a starter configuration file
    Setup(SetupArgs),
}

#[derive(Args, Debug, Default)]
#[command(group(
    ArgGroup::new("action")
        .args(["find_by_name", "find_by_x", "update", "delete", "add"])
        .multiple(false)
))]
pub struct ObjectArgs {
    /// Show objects with this name (case-insensitive)
    #[arg(long, alias = "find_by_name", value_name = "NAME")]
    pub find_by_name: Option<String>,

    /// Show objects whose ATTRIBUTE equals VALUE
    #[arg(long, alias = "find_by_x", num_args = 2, value_names = ["ATTRIBUTE", "VALUE"])]
    pub find_by_x: Option<Vec<String>>,

    /// Update the named object; pair with one or more --set
    #[arg(long, value_name = "NAME")]
    pub update: Option<String>,

    /// Field assignment for --update; VALUE is parsed as JSON when possible
    #[arg(long = "set", value_name = "KEY=VALUE", requires = "update")]
    pub set: Vec<String>,

    /// Delete the named object
    #[arg(long, value_name = "NAME")]
    pub delete: Option<String>,

    /// With --delete, leave linked objects in place
    #[arg(long, alias = "allow_orphans", requires = "delete")]
    pub allow_orphans: bool,

    /// Add the object(s) in a JSON file (one object or an array)
    #[arg(long, alias = "add_wizard", value_name = "FILE")]
    pub add: Option<PathBuf>,
}

/// What an object subcommand was asked to do.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ObjectAction {
    List,
    FindByName(String),
    FindByX { attribute: String, value: String },
    Update { name: String, assignments: Vec<String> },
    Delete { name: String, allow_orphans: bool },
    Add(PathBuf),
}

impl ObjectArgs {
    pub fn action(self) -> anyhow::Result<ObjectAction> {
        if let Some(name) = self.find_by_name {
            return Ok(ObjectAction::FindByName(name));
        }
        if let Some(pair) = self.find_by_x {
            let [attribute, value]: [String; 2] = pair
                .try_into()
                .map_err(|_| anyhow::anyhow!("--find-by-x takes an attribute and a value"))?;
            return Ok(ObjectAction::FindByX { attribute, value });
        }
        if let Some(name) = self.update {
            if self.set.is_empty() {
                anyhow::bail!("--update needs at least one --set KEY=VALUE");
            }
            return Ok(ObjectAction::Update {
                name,
                assignments: self.set,
            });
        }
        if let Some(name) = self.delete {
            return Ok(ObjectAction::Delete {
                name,
                allow_orphans: self.allow_orphans,
            });
        }
        if let Some(path) = self.add {
            return Ok(ObjectAction::Add(path));
        }
        Ok(ObjectAction::List)
    }
}

#[derive(Args)]
pub struct LocksArgs {
    #[command(subcommand)]
    pub action: LocksAction,
}

#[derive(Subcommand)]
pub enum LocksAction {
    /// Show the lock state of every container
    Status,
    /// Remove every lock file on a container, whoever holds it
    Clear {
        /// Companies, Interactions, or Studies
        container: ContainerName,
    },
}

#[derive(Args, Debug, Default)]
pub struct SetupArgs {
    /// GitHub organization owning the discovery repository
    #[arg(long)]
    pub org: Option<String>,

    /// Repository name (default: <org>_discovery)
    #[arg(long)]
    pub repo: Option<String>,

    /// Personal access token
    #[arg(long)]
    pub token: Option<String>,

    /// Use a local directory instead of GitHub
    #[arg(long, value_name = "DIR")]
    pub local_root: Option<PathBuf>,

    /// Overwrite an existing configuration file
    #[arg(long)]
    pub force: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn object_action(args: &[&str]) -> ObjectAction {
        let cli = Cli::try_parse_from(args).unwrap();
        match cli.command {
            Command::Company(a) | Command::Interaction(a) | Command::Study(a) => a.action().unwrap(),
            _ => panic!("expected object command"),
        }
    }

    #[test]
    fn parse_list() {
        assert_eq!(object_action(&["mrcli", "company"]), ObjectAction::List);
    }

    #[test]
    fn parse_find_by_name() {
        assert_eq!(
            object_action(&["mrcli", "study", "--find-by-name", "Q3 Review"]),
            ObjectAction::FindByName("Q3 Review".into())
        );
    }

    #[test]
    fn parse_find_by_x() {
        assert_eq!(
            object_action(&["mrcli", "company", "--find-by-x", "city", "Boston"]),
            ObjectAction::FindByX {
                attribute: "city".into(),
                value: "Boston".into()
            }
        );
    }

    #[test]
    fn parse_update_with_sets() {
        assert_eq!(
            object_action(&[
                "mrcli", "company", "--update", "Acme", "--set", "city=Boston", "--set", "status=1"
            ]),
            ObjectAction::Update {
                name: "Acme".into(),
                assignments: vec!["city=Boston".into(), "status=1".into()]
            }
        );
    }

    #[test]
    fn update_without_set_is_rejected() {
        let cli = Cli::try_parse_from(["mrcli", "company", "--update", "Acme"]).unwrap();
        let Command::Company(args) = cli.command else {
            panic!("expected company");
        };
        assert!(args.action().is_err());
    }

    #[test]
    fn parse_delete_allow_orphans() {
        assert_eq!(
            object_action(&["mrcli", "company", "--delete", "Acme", "--allow-orphans"]),
            ObjectAction::Delete {
                name: "Acme".into(),
                allow_orphans: true
            }
        );
    }

    #[test]
    fn actions_are_exclusive() {
        assert!(Cli::try_parse_from(["mrcli", "company", "--delete", "A", "--find-by-name", "B"]).is_err());
        assert!(Cli::try_parse_from(["mrcli", "company", "--allow-orphans"]).is_err());
        assert!(Cli::try_parse_from(["mrcli", "company", "--set", "a=b"]).is_err());
    }

    #[test]
    fn parse_globals() {
        let cli = Cli::try_parse_from([
            "mrcli", "interaction", "-c", "/tmp/mr.toml", "-o", "json", "-v",
        ])
        .unwrap();
        assert_eq!(cli.conf_file, Some(PathBuf::from("/tmp/mr.toml")));
        assert_eq!(cli.output, OutputFormat::Json);
        assert!(cli.verbose);
    }

    #[test]
    fn underscore_spellings_are_accepted() {
        assert_eq!(
            object_action(&["mrcli", "company", "--find_by_name", "Acme"]),
            ObjectAction::FindByName("Acme".into())
        );
        assert_eq!(
            object_action(&["mrcli", "interaction", "--find_by_x", "status", "1"]),
            ObjectAction::FindByX {
                attribute: "status".into(),
                value: "1".into()
            }
        );
        assert_eq!(
            object_action(&["mrcli", "study", "--add_wizard", "q3.json"]),
            ObjectAction::Add("q3.json".into())
        );
        assert_eq!(
            object_action(&["mrcli", "company", "--delete", "Acme", "--allow_orphans"]),
            ObjectAction::Delete {
                name: "Acme".into(),
                allow_orphans: true
            }
        );
        let cli = Cli::try_parse_from(["mrcli", "company", "--conf_file", "/tmp/config.ini"]).unwrap();
        assert_eq!(cli.conf_file, Some(PathBuf::from("/tmp/config.ini")));
    }

    #[test]
    fn parse_locks_clear() {
        let cli = Cli::try_parse_from(["mrcli", "locks", "clear", "interactions"]).unwrap();
        match cli.command {
            Command::Locks(LocksArgs {
                action: LocksAction::Clear { container },
            }) => assert_eq!(container, ContainerName::Interactions),
            _ => panic!("expected locks clear"),
        }
        assert!(Cli::try_parse_from(["mrcli", "locks", "clear", "users"]).is_err());
    }

    #[test]
    fn parse_setup() {
        let cli = Cli::try_parse_from(["mrcli", "setup", "--org", "acme", "--force"]).unwrap();
        let Command::Setup(args) = cli.command else {
            panic!("expected setup");
        };
        assert_eq!(args.org.as_deref(), Some("acme"));
        assert!(args.force);
    }
}
